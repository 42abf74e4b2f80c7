//! Codata: types defined by their observers, built lazily from a seed.
//!
//! Plain observers are recomputed on every access. Continuation observers
//! (observers whose value is the next instance of the same codata) are built
//! once per instance and shared afterwards, which keeps a chain of
//! observations from rebuilding the stream behind it. Parametric observers
//! resolve to one function value per instance.

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use refold_core::{
    DeclarationError, DispatchError, Error, HandlerShape, NameKind, Result, TypeTag, ValueError,
};

use crate::operator::OpSpec;
use crate::value::{Func, Value};

/// What an observer yields.
#[derive(Clone, Debug, PartialEq)]
pub enum Observer {
    /// A value, optionally checked against a tag.
    Value(Option<TypeTag>),
    /// A function of one argument.
    Parametric {
        input: Option<TypeTag>,
        output: Option<TypeTag>,
    },
    /// The next instance of the same codata, computed from a new seed.
    Continuation,
}

impl Observer {
    pub fn value(tag: TypeTag) -> Self {
        Observer::Value(Some(tag))
    }

    pub fn any() -> Self {
        Observer::Value(None)
    }

    pub fn parametric(input: TypeTag, output: TypeTag) -> Self {
        Observer::Parametric {
            input: Some(input),
            output: Some(output),
        }
    }

    /// An observer yielding the same codata type.
    pub fn this() -> Self {
        Observer::Continuation
    }
}

type SeedFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
type ParamFn = Arc<dyn Fn(&Value, Value) -> Result<Value> + Send + Sync>;

enum ObserverFn {
    Seed(SeedFn),
    Param(ParamFn),
}

/// A handler checked against the observer it serves.
enum Bound {
    Value(SeedFn, Option<TypeTag>),
    Continuation(SeedFn),
    Parametric(ParamFn, Option<TypeTag>, Option<TypeTag>),
}

/// The observer handlers of one unfold.
#[derive(Default)]
pub struct Observers {
    entries: Vec<(Arc<str>, ObserverFn)>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler for a value or continuation observer: a function of the seed.
    /// For a continuation it returns the next seed.
    pub fn on(
        mut self,
        observer: &str,
        f: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.entries
            .push((Arc::from(observer), ObserverFn::Seed(Arc::new(f))));
        self
    }

    /// Handler for a parametric observer: a function of the seed and the argument.
    pub fn on_param(
        mut self,
        observer: &str,
        f: impl Fn(&Value, Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.entries
            .push((Arc::from(observer), ObserverFn::Param(Arc::new(f))));
        self
    }
}

struct Unfold {
    name: Arc<str>,
    spec: OpSpec,
    /// One handler per observer, in observer order.
    handlers: Vec<Bound>,
}

/// A codata type. Cheap to clone.
#[derive(Clone)]
pub struct Codata(Arc<CodataInner>);

struct CodataInner {
    name: Arc<str>,
    observers: Vec<(Arc<str>, Observer)>,
    unfolds: DashMap<Arc<str>, Arc<Unfold>>,
}

impl Codata {
    pub fn builder(name: &str) -> CodataBuilder {
        CodataBuilder {
            name: name.to_string(),
            observers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn observers(&self) -> impl Iterator<Item = (&str, &Observer)> {
        self.0
            .observers
            .iter()
            .map(|(name, observer)| (&**name, observer))
    }

    fn observer_index(&self, name: &str) -> Result<usize> {
        self.0
            .observers
            .iter()
            .position(|(observer, _)| &**observer == name)
            .ok_or_else(|| {
                DispatchError::UnknownObserver {
                    codata: self.name().to_string(),
                    observer: name.to_string(),
                }
                .into()
            })
    }

    /// Declare a seed-driven constructor. Every observer needs exactly one
    /// handler of the matching shape.
    pub fn declare_unfold(&self, name: &str, spec: OpSpec, observers: Observers) -> Result<()> {
        NameKind::Generator.check(name)?;
        if self.0.unfolds.contains_key(name) {
            return Err(self.duplicate(name));
        }

        let op = name.to_string();
        for (observer, _) in &observers.entries {
            if !self.0.observers.iter().any(|(declared, _)| declared == observer) {
                return Err(DeclarationError::UnknownObserverHandler {
                    op,
                    observer: observer.to_string(),
                }
                .into());
            }
        }
        for (i, (observer, _)) in observers.entries.iter().enumerate() {
            if observers.entries[..i].iter().any(|(other, _)| other == observer) {
                return Err(DeclarationError::DuplicateHandler {
                    op,
                    variant: observer.to_string(),
                }
                .into());
            }
        }

        let mut handlers = Vec::with_capacity(self.0.observers.len());
        for (observer, kind) in &self.0.observers {
            let Some((_, handler)) = observers.entries.iter().find(|(name, _)| name == observer)
            else {
                return Err(DeclarationError::MissingObserverHandler {
                    op,
                    observer: observer.to_string(),
                }
                .into());
            };
            let shape = |expected| DeclarationError::ObserverHandlerShape {
                op: name.to_string(),
                observer: observer.to_string(),
                expected,
            };
            handlers.push(match (kind, handler) {
                (Observer::Value(tag), ObserverFn::Seed(f)) => {
                    Bound::Value(f.clone(), tag.clone())
                }
                (Observer::Continuation, ObserverFn::Seed(f)) => Bound::Continuation(f.clone()),
                (Observer::Parametric { input, output }, ObserverFn::Param(f)) => {
                    Bound::Parametric(f.clone(), input.clone(), output.clone())
                }
                (Observer::Parametric { .. }, ObserverFn::Seed(_)) => {
                    return Err(shape(HandlerShape::SeedAndArgument).into());
                }
                (_, ObserverFn::Param(_)) => return Err(shape(HandlerShape::Seed).into()),
            });
        }

        let unfold = Arc::new(Unfold {
            name: Arc::from(name),
            spec,
            handlers,
        });
        match self.0.unfolds.entry(unfold.name.clone()) {
            Entry::Occupied(_) => return Err(self.duplicate(name)),
            Entry::Vacant(entry) => {
                entry.insert(unfold);
            }
        }
        tracing::debug!(codata = %self.name(), unfold = %name, "Declared codata unfold");
        Ok(())
    }

    fn duplicate(&self, name: &str) -> Error {
        DeclarationError::DuplicateOperation {
            adt: self.name().to_string(),
            op: name.to_string(),
        }
        .into()
    }

    /// Build an instance from `seed`. Nothing is observed yet.
    pub fn make(&self, unfold: &str, seed: impl Into<Value>) -> Result<CodataInstance> {
        let Some(unfold) = self.0.unfolds.get(unfold).map(|entry| entry.value().clone()) else {
            return Err(DispatchError::UnknownUnfold {
                codata: self.name().to_string(),
                op: unfold.to_string(),
            }
            .into());
        };
        let seed = seed.into();
        if let Some(tag) = &unfold.spec.input {
            if !seed.matches_tag(tag) {
                return Err(ValueError::ArgumentType {
                    op: unfold.name.to_string(),
                    expected: tag.clone(),
                    found: seed.type_name(),
                }
                .into());
            }
        }
        Ok(CodataInstance::new(self.clone(), unfold, seed))
    }
}

impl fmt::Debug for Codata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codata")
            .field("name", &self.0.name)
            .field("observers", &self.0.observers)
            .finish()
    }
}

pub struct CodataBuilder {
    name: String,
    observers: Vec<(String, Observer)>,
}

impl CodataBuilder {
    pub fn observer(mut self, name: &str, observer: Observer) -> Self {
        self.observers.push((name.to_string(), observer));
        self
    }

    pub fn build(self) -> Result<Codata> {
        NameKind::Type.check(&self.name)?;
        if self.observers.is_empty() {
            return Err(DeclarationError::NoObservers { codata: self.name }.into());
        }
        for (i, (observer, _)) in self.observers.iter().enumerate() {
            NameKind::Observer.check(observer)?;
            if self.observers[..i].iter().any(|(other, _)| other == observer) {
                return Err(DeclarationError::DuplicateObserver {
                    codata: self.name.clone(),
                    observer: observer.clone(),
                }
                .into());
            }
        }
        tracing::debug!(codata = %self.name, observers = self.observers.len(), "Declared codata");
        Ok(Codata(Arc::new(CodataInner {
            name: Arc::from(self.name.as_str()),
            observers: self
                .observers
                .into_iter()
                .map(|(name, observer)| (Arc::from(name.as_str()), observer))
                .collect(),
            unfolds: DashMap::new(),
        })))
    }
}

/// A lazily observed codata value.
#[derive(Clone)]
pub struct CodataInstance(Arc<CodataData>);

struct CodataData {
    codata: Codata,
    unfold: Arc<Unfold>,
    seed: Value,
    /// Per observer: the continuation or the bound function, once computed.
    memo: Box<[OnceLock<Value>]>,
}

impl CodataInstance {
    fn new(codata: Codata, unfold: Arc<Unfold>, seed: Value) -> Self {
        let memo = (0..unfold.handlers.len()).map(|_| OnceLock::new()).collect();
        CodataInstance(Arc::new(CodataData {
            codata,
            unfold,
            seed,
            memo,
        }))
    }

    pub fn codata(&self) -> &Codata {
        &self.0.codata
    }

    pub fn unfold_name(&self) -> &str {
        &self.0.unfold.name
    }

    pub fn seed(&self) -> &Value {
        &self.0.seed
    }

    /// Read an observer.
    pub fn observe(&self, observer: &str) -> Result<Value> {
        let index = self.0.codata.observer_index(observer)?;
        let slot = &self.0.memo[index];

        match &self.0.unfold.handlers[index] {
            Bound::Value(f, tag) => {
                let value = (**f)(&self.0.seed)?;
                check_output(tag.as_ref(), &value)?;
                Ok(value)
            }
            Bound::Continuation(f) => {
                if let Some(next) = slot.get() {
                    return Ok(next.clone());
                }
                let next = CodataInstance::new(
                    self.0.codata.clone(),
                    self.0.unfold.clone(),
                    (**f)(&self.0.seed)?,
                );
                // First write wins; a racing reader gets the stored instance.
                Ok(slot.get_or_init(|| Value::Codata(next)).clone())
            }
            Bound::Parametric(f, input, output) => Ok(slot
                .get_or_init(|| bind(f, &self.0.seed, input.clone(), output.clone()))
                .clone()),
        }
    }

    /// Call a parametric observer.
    pub fn call(&self, observer: &str, arg: impl Into<Value>) -> Result<Value> {
        let index = self.0.codata.observer_index(observer)?;
        match &self.0.unfold.handlers[index] {
            Bound::Parametric(..) => self.observe(observer)?.call(arg),
            _ => Err(DispatchError::NotParametric {
                codata: self.0.codata.name().to_string(),
                observer: observer.to_string(),
            }
            .into()),
        }
    }

    /// Observers are read-only; every assignment is rejected.
    pub fn set(&self, observer: &str, _value: impl Into<Value>) -> Result<()> {
        self.0.codata.observer_index(observer)?;
        Err(DispatchError::ImmutableObserver {
            codata: self.0.codata.name().to_string(),
            observer: observer.to_string(),
        }
        .into())
    }

    pub fn ptr_eq(&self, other: &CodataInstance) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

fn bind(f: &ParamFn, seed: &Value, input: Option<TypeTag>, output: Option<TypeTag>) -> Value {
    let f = f.clone();
    let seed = seed.clone();
    Value::Func(Func::new(move |arg| {
        if let Some(tag) = &input {
            if !arg.matches_tag(tag) {
                return Err(Error::expected(tag, arg.type_name()));
            }
        }
        let value = (*f)(&seed, arg)?;
        check_output(output.as_ref(), &value)?;
        Ok(value)
    }))
}

fn check_output(tag: Option<&TypeTag>, value: &Value) -> Result<()> {
    match tag {
        Some(tag) if !value.matches_tag(tag) => Err(Error::expected(tag, value.type_name())),
        _ => Ok(()),
    }
}

impl Drop for CodataData {
    // A long observed chain of continuations would otherwise drop recursively.
    fn drop(&mut self) {
        let mut pending: Vec<Value> = self.memo.iter_mut().filter_map(OnceLock::take).collect();
        while let Some(value) = pending.pop() {
            if let Value::Codata(CodataInstance(data)) = value {
                if let Some(mut data) = Arc::into_inner(data) {
                    pending.extend(data.memo.iter_mut().filter_map(OnceLock::take));
                }
            }
        }
    }
}

impl fmt::Debug for CodataInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({})",
            self.0.codata.name(),
            self.0.unfold.name,
            self.0.seed
        )
    }
}

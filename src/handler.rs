//! Handler functions, the context they run in, and resolved handler tables.

use std::collections::HashMap;
use std::sync::Arc;

use refold_core::{DispatchError, Error, Result};

use crate::adt::Adt;
use crate::fields::Fields;
use crate::instance::Instance;
use crate::value::Value;
use crate::variant::Variant;

/// Fold and match handlers.
pub type CaseFn = Arc<dyn Fn(&Cx<'_, Value>) -> Result<Value> + Send + Sync>;
/// Map handlers: return the fields to replace.
pub type TransformFn = Arc<dyn Fn(&Cx<'_, Fields>) -> Result<Fields> + Send + Sync>;
/// Unfold guards: `Some(fields)` selects the guarded variant.
pub type GuardFn = Arc<dyn Fn(&Cx<'_, Option<Fields>>) -> Result<Option<Fields>> + Send + Sync>;

pub trait Handler: Clone + Send + Sync + 'static {
    type Out: Clone;

    fn call(&self, cx: &Cx<'_, Self::Out>) -> Result<Self::Out>;
}

impl Handler for CaseFn {
    type Out = Value;

    fn call(&self, cx: &Cx<'_, Value>) -> Result<Value> {
        (**self)(cx)
    }
}

impl Handler for TransformFn {
    type Out = Fields;

    fn call(&self, cx: &Cx<'_, Fields>) -> Result<Fields> {
        (**self)(cx)
    }
}

impl Handler for GuardFn {
    type Out = Option<Fields>;

    fn call(&self, cx: &Cx<'_, Option<Fields>>) -> Result<Option<Fields>> {
        (**self)(cx)
    }
}

/// Everything a handler can see.
///
/// `fields` are the destructured fields: folded results (or continuations for
/// parameterized folds) in recursive positions for a fold, raw values for a
/// match. `receiver` is the node being handled; it is absent inside fused
/// pipelines where the node is never built, and for unfold guards.
pub struct Cx<'a, Out> {
    pub(crate) op: &'a str,
    pub(crate) variant: &'a Variant,
    pub(crate) fields: &'a Fields,
    pub(crate) receiver: Option<&'a Instance>,
    pub(crate) arg: Option<&'a Value>,
    pub(crate) adt: &'a Adt,
    pub(crate) parent: Option<&'a Result<Out>>,
}

impl<'a, Out: Clone> Cx<'a, Out> {
    pub fn op(&self) -> &str {
        self.op
    }

    pub fn variant(&self) -> &str {
        self.variant.name()
    }

    pub fn variant_def(&self) -> &Variant {
        self.variant
    }

    pub fn fields(&self) -> &Fields {
        self.fields
    }

    pub fn field(&self, name: &str) -> Result<&Value> {
        self.fields.get(name).ok_or_else(|| {
            DispatchError::UnknownField {
                op: self.op.to_string(),
                variant: self.variant().to_string(),
                field: name.to_string(),
            }
            .into()
        })
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        self.field(name)?.as_int()
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        self.field(name)?.as_bool()
    }

    pub fn instance(&self, name: &str) -> Result<&Instance> {
        self.field(name)?.as_instance()
    }

    /// The raw node being handled.
    pub fn receiver(&self) -> Option<&Instance> {
        self.receiver
    }

    /// The extra argument of a parameterized operation.
    pub fn arg(&self) -> Result<&Value> {
        self.arg.ok_or_else(|| {
            DispatchError::MissingArgument {
                op: self.op.to_string(),
            }
            .into()
        })
    }

    /// The seed an unfold guard is deciding on.
    pub fn seed(&self) -> Result<&Value> {
        self.arg()
    }

    /// The most-derived generation this node is being interpreted through.
    pub fn adt(&self) -> &Adt {
        self.adt
    }

    /// What the overridden handler produced for this node.
    ///
    /// Computed once, before this handler ran.
    pub fn parent(&self) -> Result<Out> {
        match self.parent {
            Some(result) => result.clone(),
            None => Err(DispatchError::NoParentHandler {
                op: self.op.to_string(),
                variant: self.variant().to_string(),
            }
            .into()),
        }
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Run another parameterless operation on `value`, through this generation.
    pub fn get(&self, op: &str, value: &Value) -> Result<Value> {
        self.adt.invoke(op, value, None)
    }

    /// Run another parameterized operation on `value`, through this generation.
    pub fn call(&self, op: &str, value: &Value, arg: impl Into<Value>) -> Result<Value> {
        self.adt.invoke(op, value, Some(arg.into()))
    }

    /// A failure attributed to this handler.
    pub fn fail(&self, message: impl std::fmt::Display) -> Error {
        DispatchError::Handler {
            op: self.op.to_string(),
            variant: self.variant().to_string(),
            message: message.to_string(),
        }
        .into()
    }
}

/// One handler plus the handler it overrides, if any.
pub(crate) struct HandlerEntry<H> {
    pub(crate) handler: H,
    pub(crate) parent: Option<Arc<HandlerEntry<H>>>,
    /// Name of the generation that supplied the handler.
    pub(crate) generation: Arc<str>,
}

impl<H: Handler> HandlerEntry<H> {
    /// Run the overridden chain first, then this handler with the parent's
    /// result available.
    pub(crate) fn run(&self, cx: &Cx<'_, H::Out>) -> Result<H::Out> {
        let parent = self.parent.as_ref().map(|parent| parent.run(cx));
        let cx = Cx {
            parent: parent.as_ref(),
            ..*cx
        };
        self.handler.call(&cx)
    }
}

/// The effective handler table of one operator on one generation.
///
/// Variant-specific handlers always win over the wildcard.
pub(crate) struct HandlerTable<H> {
    pub(crate) specific: HashMap<Arc<str>, Arc<HandlerEntry<H>>>,
    pub(crate) wildcard: Option<Arc<HandlerEntry<H>>>,
}

impl<H> HandlerTable<H> {
    pub(crate) fn lookup(&self, variant: &str) -> Option<&Arc<HandlerEntry<H>>> {
        self.specific.get(variant).or(self.wildcard.as_ref())
    }
}

/// Handlers as declared for one operator, before extension resolution.
pub struct Handlers<H> {
    pub(crate) specific: Vec<(Arc<str>, H)>,
    pub(crate) wildcard: Option<H>,
}

pub type Cases = Handlers<CaseFn>;
pub type Transforms = Handlers<TransformFn>;
pub type Guards = Handlers<GuardFn>;

impl<H> Default for Handlers<H> {
    fn default() -> Self {
        Handlers {
            specific: Vec::new(),
            wildcard: None,
        }
    }
}

impl<H> Handlers<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.specific.is_empty() && self.wildcard.is_none()
    }
}

impl Cases {
    pub fn on(
        mut self,
        variant: &str,
        f: impl Fn(&Cx<'_, Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let f: CaseFn = Arc::new(f);
        self.specific.push((Arc::from(variant), f));
        self
    }

    /// Handler for every variant without a specific one (`_`).
    pub fn wildcard(
        mut self,
        f: impl Fn(&Cx<'_, Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let f: CaseFn = Arc::new(f);
        self.wildcard = Some(f);
        self
    }
}

impl Transforms {
    pub fn on(
        mut self,
        variant: &str,
        f: impl Fn(&Cx<'_, Fields>) -> Result<Fields> + Send + Sync + 'static,
    ) -> Self {
        let f: TransformFn = Arc::new(f);
        self.specific.push((Arc::from(variant), f));
        self
    }

    pub fn wildcard(
        mut self,
        f: impl Fn(&Cx<'_, Fields>) -> Result<Fields> + Send + Sync + 'static,
    ) -> Self {
        let f: TransformFn = Arc::new(f);
        self.wildcard = Some(f);
        self
    }
}

impl Guards {
    pub fn on(
        mut self,
        variant: &str,
        f: impl Fn(&Cx<'_, Option<Fields>>) -> Result<Option<Fields>> + Send + Sync + 'static,
    ) -> Self {
        let f: GuardFn = Arc::new(f);
        self.specific.push((Arc::from(variant), f));
        self
    }

    /// Guards have no variant to select on their own; declaring one is rejected.
    pub fn wildcard(
        mut self,
        f: impl Fn(&Cx<'_, Option<Fields>>) -> Result<Option<Fields>> + Send + Sync + 'static,
    ) -> Self {
        let f: GuardFn = Arc::new(f);
        self.wildcard = Some(f);
        self
    }
}

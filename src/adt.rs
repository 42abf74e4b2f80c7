//! ADT generations: variant registry, operation registry and the parent chain.
//!
//! Every `Adt` is one generation. `extend` produces a child generation that
//! shares its parent's variants by identity and resolves operations by walking
//! up the parent chain.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use refold_core::{
    Collision, Config, DeclarationError, DispatchError, NameKind, OperationKind, Result,
    ValueError,
};

use crate::dispatch;
use crate::extend;
use crate::fields::Fields;
use crate::handler::{Cases, Guards, Transforms};
use crate::instance::Instance;
use crate::merge;
use crate::operator::{OpSpec, Operator};
use crate::pool::Pool;
use crate::value::Value;
use crate::variant::{Field, Invariant, InvariantFn, Variant, VariantDef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AdtId(u64);

impl AdtId {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        AdtId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to one ADT generation. Cheap to clone.
#[derive(Clone)]
pub struct Adt(Arc<AdtInner>);

struct AdtInner {
    id: AdtId,
    name: Arc<str>,
    parent: Option<Adt>,
    config: Config,
    /// Every variant in the lineage, root generation first.
    variants: Vec<Variant>,
    index: HashMap<Arc<str>, usize>,
    /// Index of the first variant this generation declared.
    own_start: usize,
    operations: DashMap<Arc<str>, Arc<Operator>>,
    /// Set once a child generation exists; the operation table is frozen from then on.
    sealed: AtomicBool,
    pool: Pool,
}

impl Adt {
    pub fn builder(name: &str) -> AdtBuilder {
        AdtBuilder::new(name, None)
    }

    /// Start a child generation of this ADT.
    pub fn extend(&self, name: &str) -> AdtBuilder {
        AdtBuilder::new(name, Some(self.clone()))
    }

    pub fn id(&self) -> AdtId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&Adt> {
        self.0.parent.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// All variants visible from this generation, root generation first.
    pub fn variants(&self) -> &[Variant] {
        &self.0.variants
    }

    /// Variants declared by this generation itself.
    pub fn own_variants(&self) -> &[Variant] {
        &self.0.variants[self.0.own_start..]
    }

    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.0.index.get(name).map(|&i| &self.0.variants[i])
    }

    /// This generation followed by its ancestors.
    pub fn lineage(&self) -> impl Iterator<Item = &Adt> {
        std::iter::successors(Some(self), |adt| adt.parent())
    }

    /// Whether `ancestor` is this generation or one of its ancestors.
    pub fn descends_from(&self, ancestor: &Adt) -> bool {
        self.lineage().any(|adt| adt.id() == ancestor.id())
    }

    /// The more derived of two generations, preferring `self` when neither
    /// descends from the other.
    pub fn more_derived(&self, other: &Adt) -> Adt {
        if other.descends_from(self) {
            other.clone()
        } else {
            self.clone()
        }
    }

    /// Construct a variant from a named record.
    pub fn make(&self, variant: &str, fields: Fields) -> Result<Instance> {
        let variant = self.variant(variant).cloned().ok_or_else(|| ValueError::UnknownVariant {
            adt: self.name().to_string(),
            variant: variant.to_string(),
        })?;
        self.construct(&variant, fields)
    }

    /// Construct a variant from values in field declaration order.
    pub fn make_positional(
        &self,
        variant: &str,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Result<Instance> {
        let def = self.variant(variant).cloned().ok_or_else(|| ValueError::UnknownVariant {
            adt: self.name().to_string(),
            variant: variant.to_string(),
        })?;
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.len() != def.fields().len() {
            return Err(ValueError::Arity {
                variant: variant.to_string(),
                expected: def.fields().len(),
                found: values.len(),
            }
            .into());
        }
        let fields = def
            .fields()
            .iter()
            .map(|field| field.name_arc().clone())
            .zip(values)
            .collect();
        self.construct(&def, fields)
    }

    /// The canonical instance of a singleton variant.
    pub fn singleton(&self, variant: &str) -> Result<Instance> {
        self.make(variant, Fields::new())
    }

    /// Validate and build, reusing a pooled instance when one matches.
    pub(crate) fn construct(&self, variant: &Variant, fields: Fields) -> Result<Instance> {
        if variant.is_singleton() {
            if let Some(name) = fields.names().next() {
                return Err(ValueError::UnexpectedField {
                    variant: variant.name().to_string(),
                    field: name.to_string(),
                }
                .into());
            }
            // Singletons belong to the generation that declared them.
            let owner = self
                .lineage()
                .find(|adt| adt.id() == variant.owner())
                .unwrap_or(self);
            return Ok(owner.0.pool.intern(variant, Vec::new(), |values| {
                Instance::new(variant.clone(), owner.clone(), values)
            }));
        }

        let values = variant.validate(self, fields)?;
        if self.0.config.interning {
            Ok(self.0.pool.intern(variant, values, |values| {
                Instance::new(variant.clone(), self.clone(), values)
            }))
        } else {
            Ok(Instance::new(variant.clone(), self.clone(), values))
        }
    }

    /// Number of live instances interned by this generation.
    pub fn pooled_count(&self) -> usize {
        self.0.pool.live()
    }

    /// The operator `name` resolves to from this generation.
    pub fn operation(&self, name: &str) -> Option<Arc<Operator>> {
        self.lineage().find_map(|adt| adt.own_operation(name))
    }

    /// The operator declared or extended by this generation itself.
    pub fn own_operation(&self, name: &str) -> Option<Arc<Operator>> {
        self.0.operations.get(name).map(|entry| entry.value().clone())
    }

    pub(crate) fn resolve(&self, name: &str) -> Result<Arc<Operator>> {
        self.operation(name).ok_or_else(|| {
            DispatchError::UnknownOperation {
                adt: self.name().to_string(),
                op: name.to_string(),
            }
            .into()
        })
    }

    /// Names of every operation visible from this generation, sorted.
    pub fn operation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lineage()
            .flat_map(|adt| {
                adt.0
                    .operations
                    .iter()
                    .map(|entry| entry.key().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Declare a catamorphism, or extend the inherited one with the same name.
    pub fn declare_fold(&self, name: &str, spec: OpSpec, cases: Cases) -> Result<Arc<Operator>> {
        extend::declare_cases(self, OperationKind::Fold, name, spec, cases)
    }

    /// Declare a non-recursive case analysis.
    pub fn declare_match(&self, name: &str, spec: OpSpec, cases: Cases) -> Result<Arc<Operator>> {
        extend::declare_cases(self, OperationKind::Match, name, spec, cases)
    }

    pub fn declare_map(
        &self,
        name: &str,
        spec: OpSpec,
        transforms: Transforms,
    ) -> Result<Arc<Operator>> {
        extend::declare_map(self, name, spec, transforms)
    }

    /// Declare an anamorphism. Its name must be PascalCase.
    pub fn declare_unfold(
        &self,
        name: &str,
        spec: OpSpec,
        guards: Guards,
    ) -> Result<Arc<Operator>> {
        extend::declare_unfold(self, name, spec, guards)
    }

    /// Fuse `operations` (generator, transforms, consumer) into one traversal.
    pub fn declare_merge(&self, name: &str, operations: &[&str]) -> Result<Arc<Operator>> {
        merge::declare(self, name, operations)
    }

    /// Run an instance-bound operation on `value`, interpreting it through this
    /// generation or the generation it was built through, whichever is more
    /// derived.
    pub fn invoke(&self, op: &str, value: &Value, arg: Option<Value>) -> Result<Value> {
        dispatch::invoke(self, op, value, arg)
    }

    /// Run a seed-driven operation.
    pub fn generate(&self, op: &str, seed: impl Into<Value>) -> Result<Value> {
        dispatch::generate(self, op, seed.into())
    }

    pub(crate) fn install(&self, op: Operator) -> Result<Arc<Operator>> {
        self.check_unsealed(op.name())?;
        match self.0.operations.entry(op.name_arc().clone()) {
            Entry::Occupied(_) => Err(DeclarationError::DuplicateOperation {
                adt: self.name().to_string(),
                op: op.name().to_string(),
            }
            .into()),
            Entry::Vacant(entry) => {
                let op = Arc::new(op);
                entry.insert(op.clone());
                Ok(op)
            }
        }
    }

    fn check_unsealed(&self, op: &str) -> Result<()> {
        if self.0.sealed.load(Ordering::Acquire) {
            return Err(DeclarationError::Sealed {
                adt: self.name().to_string(),
                op: op.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Naming and collision rules shared by every operation declaration.
    pub(crate) fn check_operation_name(&self, name: &str, kind: NameKind) -> Result<()> {
        kind.check(name)?;
        self.check_unsealed(name)?;
        let collision = |with| DeclarationError::NameCollision {
            adt: self.name().to_string(),
            name: name.to_string(),
            with,
        };
        if self.variant(name).is_some() {
            return Err(collision(Collision::Variant).into());
        }
        if let Some(variant) = self
            .variants()
            .iter()
            .find(|variant| variant.field_index(name).is_some())
        {
            return Err(collision(Collision::Field(variant.name().to_string())).into());
        }
        if self.0.operations.contains_key(name) {
            let inherited = self.parent().is_some_and(|parent| parent.operation(name).is_some());
            return Err(if inherited {
                DeclarationError::AlreadyExtended {
                    adt: self.name().to_string(),
                    op: name.to_string(),
                }
            } else {
                DeclarationError::DuplicateOperation {
                    adt: self.name().to_string(),
                    op: name.to_string(),
                }
            }
            .into());
        }
        Ok(())
    }
}

impl PartialEq for Adt {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Adt {}

impl fmt::Debug for Adt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adt")
            .field("name", &self.0.name)
            .field("parent", &self.parent().map(Adt::name))
            .field("variants", &self.0.variants.len())
            .finish()
    }
}

/// Collects the variants and invariants of a new generation.
pub struct AdtBuilder {
    name: String,
    parent: Option<Adt>,
    variants: Vec<(String, Option<Vec<Field>>)>,
    invariants: Vec<(String, String, InvariantFn)>,
    config: Option<Config>,
}

impl AdtBuilder {
    fn new(name: &str, parent: Option<Adt>) -> Self {
        AdtBuilder {
            name: name.to_string(),
            parent,
            variants: Vec::new(),
            invariants: Vec::new(),
            config: None,
        }
    }

    pub fn singleton(mut self, name: &str) -> Self {
        self.variants.push((name.to_string(), None));
        self
    }

    pub fn variant(mut self, name: &str, fields: impl IntoIterator<Item = Field>) -> Self {
        self.variants
            .push((name.to_string(), Some(fields.into_iter().collect())));
        self
    }

    /// A cross-field check run after every field of `variant` has validated.
    pub fn invariant(
        mut self,
        variant: &str,
        name: &str,
        check: impl Fn(&Fields) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.invariants
            .push((variant.to_string(), name.to_string(), Arc::new(check)));
        self
    }

    /// Defaults to the parent's configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Adt> {
        NameKind::Type.check(&self.name)?;
        if self.parent.is_none() && self.variants.is_empty() {
            return Err(DeclarationError::NoVariants { adt: self.name }.into());
        }

        let inherited: &[Variant] = self.parent.as_ref().map_or(&[], |parent| parent.variants());
        let mut seen: Vec<&str> = Vec::new();
        for (variant, fields) in &self.variants {
            NameKind::Variant.check(variant)?;
            if seen.contains(&variant.as_str()) {
                return Err(DeclarationError::DuplicateVariant {
                    adt: self.name.clone(),
                    variant: variant.clone(),
                }
                .into());
            }
            if let Some(existing) = inherited.iter().find(|v| v.name() == variant) {
                return Err(DeclarationError::VariantCollision {
                    adt: self.name.clone(),
                    variant: variant.clone(),
                    ancestor: existing.owner_name().to_string(),
                }
                .into());
            }
            seen.push(variant);
            self.check_fields(variant, fields.as_deref().unwrap_or(&[]))?;
        }

        let mut invariants: HashMap<&str, Vec<Invariant>> = HashMap::new();
        for (variant, name, check) in &self.invariants {
            if !seen.contains(&variant.as_str()) {
                return Err(DeclarationError::UnknownVariant {
                    context: format!("invariant {name}"),
                    variant: variant.clone(),
                }
                .into());
            }
            invariants.entry(variant.as_str()).or_default().push(Invariant {
                name: Arc::from(name.as_str()),
                check: check.clone(),
            });
        }

        let id = AdtId::fresh();
        let name: Arc<str> = Arc::from(self.name.as_str());
        let mut variants = inherited.to_vec();
        let own_start = variants.len();
        for (variant, fields) in &self.variants {
            variants.push(Variant::new(VariantDef {
                name: Arc::from(variant.as_str()),
                owner: id,
                owner_name: name.clone(),
                fields: fields.clone(),
                invariants: invariants.remove(variant.as_str()).unwrap_or_default(),
            }));
        }
        let index = variants
            .iter()
            .enumerate()
            .map(|(i, variant)| (variant.name_arc().clone(), i))
            .collect();

        let config = self
            .config
            .or_else(|| self.parent.as_ref().map(|parent| *parent.config()))
            .unwrap_or_default();

        tracing::debug!(
            adt = %name,
            parent = ?self.parent.as_ref().map(Adt::name),
            variants = variants.len() - own_start,
            "Declared ADT generation"
        );

        if let Some(parent) = &self.parent {
            parent.0.sealed.store(true, Ordering::Release);
        }

        Ok(Adt(Arc::new(AdtInner {
            id,
            name,
            parent: self.parent,
            config,
            variants,
            index,
            own_start,
            operations: DashMap::new(),
            sealed: AtomicBool::new(false),
            pool: Pool::new(),
        })))
    }

    fn check_fields(&self, variant: &str, fields: &[Field]) -> Result<()> {
        for (i, field) in fields.iter().enumerate() {
            NameKind::Field.check(field.name())?;
            if fields[..i].iter().any(|other| other.name() == field.name()) {
                return Err(DeclarationError::DuplicateField {
                    variant: variant.to_string(),
                    field: field.name().to_string(),
                }
                .into());
            }
            let clashes = self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.operation(field.name()).is_some());
            if clashes {
                return Err(DeclarationError::NameCollision {
                    adt: self.name.clone(),
                    name: field.name().to_string(),
                    with: Collision::Operation,
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use refold_core::TypeTag;

    fn list() -> Adt {
        Adt::builder("List")
            .singleton("Nil")
            .variant("Cons", [Field::of("head", TypeTag::Int), Field::family("tail")])
            .build()
            .unwrap()
    }

    fn build(adt: &Adt, len: i64) -> Instance {
        let mut node = adt.singleton("Nil").unwrap();
        for head in 0..len {
            node = adt.make("Cons", fields! { head: head, tail: node }).unwrap();
        }
        node
    }

    #[test]
    fn test_pool_buckets_stay_bounded() {
        let adt = list();
        for _ in 0..3 {
            let xs = build(&adt, 10_000);
            assert_eq!(adt.pooled_count(), 10_001);
            drop(xs);
        }
        assert_eq!(adt.pooled_count(), 0);
        // Never more than twice the largest live population.
        assert!(adt.0.pool.bucket_count() <= 20_002);
    }
}

//! Variant shapes, field specifications and construction-time validation.

use std::fmt;
use std::sync::Arc;

use refold_core::{Result, TypeTag, ValueError};

use crate::adt::{Adt, AdtId};
use crate::fields::Fields;
use crate::instance::Instance;
use crate::value::Value;

pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type InvariantFn = Arc<dyn Fn(&Fields) -> bool + Send + Sync>;

/// What a field accepts.
#[derive(Clone)]
pub enum FieldSpec {
    Any,
    Tag(TypeTag),
    /// An instance of the given ADT or of one of its extensions.
    Adt(Adt),
    Predicate {
        name: Arc<str>,
        check: Predicate,
    },
    /// A recursive occurrence of the declaring ADT.
    Family,
}

impl FieldSpec {
    pub fn predicate(
        name: impl Into<Arc<str>>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        FieldSpec::Predicate {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn is_family(&self) -> bool {
        matches!(self, FieldSpec::Family)
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSpec::Any => f.write_str("Any"),
            FieldSpec::Tag(tag) => write!(f, "Tag({tag})"),
            FieldSpec::Adt(adt) => write!(f, "Adt({})", adt.name()),
            FieldSpec::Predicate { name, .. } => write!(f, "Predicate({name})"),
            FieldSpec::Family => f.write_str("Family"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Field {
    name: Arc<str>,
    spec: FieldSpec,
}

impl Field {
    pub fn new(name: impl Into<Arc<str>>, spec: FieldSpec) -> Self {
        Field {
            name: name.into(),
            spec,
        }
    }

    pub fn any(name: impl Into<Arc<str>>) -> Self {
        Field::new(name, FieldSpec::Any)
    }

    pub fn of(name: impl Into<Arc<str>>, tag: TypeTag) -> Self {
        Field::new(name, FieldSpec::Tag(tag))
    }

    pub fn family(name: impl Into<Arc<str>>) -> Self {
        Field::new(name, FieldSpec::Family)
    }

    pub fn adt(name: impl Into<Arc<str>>, adt: &Adt) -> Self {
        Field::new(name, FieldSpec::Adt(adt.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }
}

#[derive(Clone)]
pub(crate) struct Invariant {
    pub(crate) name: Arc<str>,
    pub(crate) check: InvariantFn,
}

pub(crate) struct VariantDef {
    pub(crate) name: Arc<str>,
    pub(crate) owner: AdtId,
    pub(crate) owner_name: Arc<str>,
    /// `None` for singletons.
    pub(crate) fields: Option<Vec<Field>>,
    pub(crate) invariants: Vec<Invariant>,
}

/// Borrowed view of a variant's shape.
#[derive(Clone, Copy, Debug)]
pub enum VariantShape<'a> {
    Singleton,
    Structured(&'a [Field]),
}

/// A variant constructor. Extensions share the parent's `Variant` by identity.
#[derive(Clone)]
pub struct Variant(Arc<VariantDef>);

impl Variant {
    pub(crate) fn new(def: VariantDef) -> Self {
        Variant(Arc::new(def))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.0.name
    }

    /// Name of the generation that declared this variant.
    pub fn owner_name(&self) -> &str {
        &self.0.owner_name
    }

    pub(crate) fn owner(&self) -> AdtId {
        self.0.owner
    }

    pub fn shape(&self) -> VariantShape<'_> {
        match &self.0.fields {
            None => VariantShape::Singleton,
            Some(fields) => VariantShape::Structured(fields),
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.0.fields.is_none()
    }

    pub fn fields(&self) -> &[Field] {
        self.0.fields.as_deref().unwrap_or(&[])
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|field| field.name() == name)
    }

    pub fn ptr_eq(&self, other: &Variant) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Check a named record against this variant and return the values in
    /// declaration order.
    ///
    /// Every field check runs before any invariant, so an invariant never sees
    /// a value that failed its field check.
    pub(crate) fn validate(&self, generation: &Adt, fields: Fields) -> Result<Vec<Value>> {
        for name in fields.names() {
            if self.field_index(name).is_none() {
                return Err(ValueError::UnexpectedField {
                    variant: self.name().to_string(),
                    field: name.to_string(),
                }
                .into());
            }
        }

        let mut values = Vec::with_capacity(self.fields().len());
        for field in self.fields() {
            let Some(value) = fields.get(field.name()) else {
                return Err(ValueError::MissingField {
                    variant: self.name().to_string(),
                    field: field.name().to_string(),
                }
                .into());
            };
            self.check_field(generation, field, value)?;
            values.push(value.clone());
        }

        for invariant in &self.0.invariants {
            if !(*invariant.check)(&fields) {
                return Err(ValueError::Invariant {
                    variant: self.name().to_string(),
                    invariant: invariant.name.to_string(),
                }
                .into());
            }
        }
        Ok(values)
    }

    fn check_field(&self, generation: &Adt, field: &Field, value: &Value) -> Result<()> {
        let (ok, expected) = match field.spec() {
            FieldSpec::Any => return Ok(()),
            FieldSpec::Tag(tag) => (value.matches_tag(tag), tag.to_string()),
            FieldSpec::Adt(adt) => (
                matches!(value, Value::Instance(instance) if instance.is_instance_of(adt)),
                adt.name().to_string(),
            ),
            FieldSpec::Predicate { name, check } => {
                ((**check)(value), format!("a value satisfying `{name}`"))
            }
            FieldSpec::Family => (
                matches!(value, Value::Instance(instance) if family_accepts(generation, instance)),
                generation.name().to_string(),
            ),
        };
        if ok {
            Ok(())
        } else {
            Err(ValueError::FieldType {
                variant: self.name().to_string(),
                field: field.name().to_string(),
                expected,
                found: value.type_name(),
            }
            .into())
        }
    }
}

/// A `Family` field of `generation` accepts instances of any variant in its
/// lineage, and anything built through one of its extensions.
fn family_accepts(generation: &Adt, instance: &Instance) -> bool {
    let owner = instance.variant().owner();
    generation.lineage().any(|adt| adt.id() == owner) || instance.origin().descends_from(generation)
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Variant {}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape() {
            VariantShape::Singleton => write!(f, "{}", self.name()),
            VariantShape::Structured(fields) => {
                let mut out = f.debug_struct(self.name());
                for field in fields {
                    out.field(field.name(), field.spec());
                }
                out.finish()
            }
        }
    }
}

//! ADT instances.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use refold_core::Result;

use crate::adt::{Adt, AdtId};
use crate::fields::Fields;
use crate::value::Value;
use crate::variant::{Variant, VariantShape};

/// Cache key for parameterless results: (operator id, interpreting generation).
pub(crate) type MemoKey = (u64, AdtId);

/// An immutable value of one variant, tagged with the generation it was
/// constructed through.
///
/// Equality and hashing are by identity. Structured instances are interned per
/// generation, so two instances built from equal fields through the same
/// generation are the same instance.
#[derive(Clone)]
pub struct Instance(Arc<InstanceData>);

pub(crate) struct InstanceData {
    variant: Variant,
    origin: Adt,
    values: Box<[Value]>,
    memo: OnceLock<DashMap<MemoKey, Value>>,
}

impl Instance {
    pub(crate) fn new(variant: Variant, origin: Adt, values: Vec<Value>) -> Self {
        Instance(Arc::new(InstanceData {
            variant,
            origin,
            values: values.into_boxed_slice(),
            memo: OnceLock::new(),
        }))
    }

    pub(crate) fn upgrade(weak: &Weak<InstanceData>) -> Option<Self> {
        weak.upgrade().map(Instance)
    }

    pub(crate) fn downgrade(&self) -> Weak<InstanceData> {
        Arc::downgrade(&self.0)
    }

    pub fn variant(&self) -> &Variant {
        &self.0.variant
    }

    pub fn variant_name(&self) -> &str {
        self.0.variant.name()
    }

    /// The generation this instance was constructed through.
    ///
    /// For singletons this is always the generation that declared the variant.
    pub fn origin(&self) -> &Adt {
        &self.0.origin
    }

    /// Field values in declaration order.
    pub fn values(&self) -> &[Value] {
        &self.0.values
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        let index = self.0.variant.field_index(name)?;
        self.0.values.get(index)
    }

    pub fn fields(&self) -> Fields {
        self.0
            .variant
            .fields()
            .iter()
            .zip(self.0.values.iter())
            .map(|(field, value)| (field.name_arc().clone(), value.clone()))
            .collect()
    }

    pub fn is_singleton(&self) -> bool {
        self.0.variant.is_singleton()
    }

    /// Whether this is an instance of the variant named `variant`.
    pub fn is(&self, variant: &str) -> bool {
        self.variant_name() == variant
    }

    /// Subtyping test.
    ///
    /// True when `adt` declared this instance's variant or is an ancestor of the
    /// generation that did. An inherited variant built through a child is an
    /// instance of the parent but not of the child.
    pub fn is_instance_of(&self, adt: &Adt) -> bool {
        let owner = self.0.variant.owner();
        self.0
            .origin
            .lineage()
            .skip_while(|generation| generation.id() != owner)
            .any(|generation| generation.id() == adt.id())
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Run a parameterless operation, resolved from this instance's generation.
    pub fn get(&self, op: &str) -> Result<Value> {
        self.0.origin.invoke(op, &Value::Instance(self.clone()), None)
    }

    /// Run a parameterized operation, resolved from this instance's generation.
    pub fn call(&self, op: &str, arg: impl Into<Value>) -> Result<Value> {
        self.0
            .origin
            .invoke(op, &Value::Instance(self.clone()), Some(arg.into()))
    }

    pub(crate) fn memo_get(&self, key: &MemoKey) -> Option<Value> {
        self.0
            .memo
            .get()
            .and_then(|memo| memo.get(key).map(|entry| entry.value().clone()))
    }

    pub(crate) fn memo_insert(&self, key: MemoKey, value: Value) {
        self.0.memo.get_or_init(DashMap::new).insert(key, value);
    }
}

impl Drop for InstanceData {
    // Long recursive structures would otherwise drop recursively.
    fn drop(&mut self) {
        let mut pending: Vec<Value> = std::mem::take(&mut self.values).into_vec();
        while let Some(value) = pending.pop() {
            if let Value::Instance(Instance(data)) = value {
                if let Some(mut data) = Arc::into_inner(data) {
                    pending.extend(std::mem::take(&mut data.values).into_vec());
                }
            }
        }
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.variant.shape() {
            VariantShape::Singleton => f.write_str(self.variant_name()),
            VariantShape::Structured(fields) => {
                write!(f, "{} {{ ", self.variant_name())?;
                for (i, (field, value)) in fields.iter().zip(self.0.values.iter()).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {value}", field.name())?;
                }
                f.write_str(" }")
            }
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{self}", self.0.origin.name())
    }
}

//! Runtime values flowing through constructors and handlers.
//!
//! Primitives compare structurally. Instances, codata and functions compare by
//! identity; structured instances are interned, so identity coincides with
//! structural equality inside one generation's pool.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use refold_core::{DispatchError, Error, Result, TypeTag};

use crate::codata::CodataInstance;
use crate::instance::Instance;

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    /// Compared and hashed by bit pattern.
    Float(f64),
    Str(Arc<str>),
    List(Arc<[Value]>),
    Instance(Instance),
    Codata(CodataInstance),
    Func(Func),
}

type FuncFn = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// A shared one-argument function value.
#[derive(Clone)]
pub struct Func(Arc<FuncFn>);

impl Func {
    pub fn new(f: impl Fn(Value) -> Result<Value> + Send + Sync + 'static) -> Self {
        Func(Arc::new(f))
    }

    pub fn call(&self, arg: impl Into<Value>) -> Result<Value> {
        (*self.0)(arg.into())
    }

    pub fn ptr_eq(&self, other: &Func) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<func {:p}>", Arc::as_ptr(&self.0) as *const ())
    }
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    /// Short description used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Unit => "unit".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::List(_) => "list".into(),
            Value::Instance(instance) => {
                format!("{}.{}", instance.origin().name(), instance.variant_name())
            }
            Value::Codata(instance) => instance.codata().name().to_string(),
            Value::Func(_) => "func".into(),
        }
    }

    /// Whether this value satisfies a primitive or named type tag.
    ///
    /// `Family` only checks that the value is an instance; lineage membership is
    /// checked by the constructing generation.
    pub fn matches_tag(&self, tag: &TypeTag) -> bool {
        match (tag, self) {
            (TypeTag::Unit, Value::Unit)
            | (TypeTag::Bool, Value::Bool(_))
            | (TypeTag::Int, Value::Int(_))
            | (TypeTag::Float, Value::Float(_))
            | (TypeTag::Str, Value::Str(_))
            | (TypeTag::List, Value::List(_))
            | (TypeTag::Func, Value::Func(_))
            | (TypeTag::Codata, Value::Codata(_))
            | (TypeTag::Instance, Value::Instance(_))
            | (TypeTag::Family, Value::Instance(_)) => true,
            (TypeTag::Named(name), Value::Instance(instance)) => {
                instance.origin().lineage().any(|adt| adt.name() == name.as_str())
            }
            (TypeTag::Named(name), Value::Codata(instance)) => {
                instance.codata().name() == name.as_str()
            }
            _ => false,
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(Error::expected("int", other.type_name())),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(x) => Ok(*x),
            other => Err(Error::expected("float", other.type_name())),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::expected("bool", other.type_name())),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(Error::expected("str", other.type_name())),
        }
    }

    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(Error::expected("list", other.type_name())),
        }
    }

    pub fn as_instance(&self) -> Result<&Instance> {
        match self {
            Value::Instance(instance) => Ok(instance),
            other => Err(Error::expected("instance", other.type_name())),
        }
    }

    pub fn as_codata(&self) -> Result<&CodataInstance> {
        match self {
            Value::Codata(instance) => Ok(instance),
            other => Err(Error::expected("codata", other.type_name())),
        }
    }

    pub fn as_func(&self) -> Result<&Func> {
        match self {
            Value::Func(func) => Ok(func),
            other => Err(Error::expected("func", other.type_name())),
        }
    }

    /// Apply a function value.
    pub fn call(&self, arg: impl Into<Value>) -> Result<Value> {
        match self {
            Value::Func(func) => func.call(arg),
            other => Err(DispatchError::NotCallable {
                found: other.type_name(),
            }
            .into()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => a == b,
            (Value::Codata(a), Value::Codata(b)) => a.ptr_eq(b),
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Unit => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Float(x) => x.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Instance(instance) => instance.hash(state),
            Value::Codata(instance) => instance.addr().hash(state),
            Value::Func(func) => (Arc::as_ptr(&func.0) as *const () as usize).hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Instance(instance) => write!(f, "{instance}"),
            Value::Codata(instance) => write!(f, "{instance:?}"),
            Value::Func(_) => f.write_str("<func>"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items.into())
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::Instance(instance)
    }
}

impl From<&Instance> for Value {
    fn from(instance: &Instance) -> Self {
        Value::Instance(instance.clone())
    }
}

impl From<CodataInstance> for Value {
    fn from(instance: CodataInstance) -> Self {
        Value::Codata(instance)
    }
}

impl From<Func> for Value {
    fn from(func: Func) -> Self {
        Value::Func(func)
    }
}

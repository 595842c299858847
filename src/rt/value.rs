//! Runtime values.
//!
//! Values are `Send`: a continuation may be driven by any carrier thread,
//! so object references are `Arc`-based and field maps are lock-guarded.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, WeftError};
use crate::names::Sym;
use crate::proc::ValueKind;

/// Opaque payload attaching native state (strand handles, test probes) to
/// an object.
pub type NativeHandle = Arc<dyn Any + Send + Sync>;

pub type ObjRef = Arc<Obj>;

/// A heap object: class tag, field map, optional native payload.
pub struct Obj {
    pub class: Sym,
    fields: Mutex<FxHashMap<Sym, Value>>,
    pub native: Option<NativeHandle>,
}

impl Obj {
    pub fn new(class: Sym) -> ObjRef {
        Arc::new(Obj {
            class,
            fields: Mutex::new(FxHashMap::default()),
            native: None,
        })
    }

    pub fn with_native(class: Sym, native: NativeHandle) -> ObjRef {
        Arc::new(Obj {
            class,
            fields: Mutex::new(FxHashMap::default()),
            native: Some(native),
        })
    }

    pub fn get_field(&self, name: Sym) -> Option<Value> {
        self.fields.lock().get(&name).cloned()
    }

    pub fn set_field(&self, name: Sym, value: Value) {
        self.fields.lock().insert(name, value);
    }

    /// Downcast the native payload.
    pub fn native_as<T: 'static>(&self) -> Option<&T> {
        self.native.as_ref().and_then(|n| n.downcast_ref::<T>())
    }

    /// Identity key (pointer identity), used by monitors and reference
    /// equality.
    pub fn key(this: &ObjRef) -> usize {
        Arc::as_ptr(this) as usize
    }
}

/// Reference equality: two objects are equal iff they are the same heap
/// allocation (pointer identity), matching `Value`'s reference semantics.
impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj").field("class", &self.class).finish()
    }
}

/// One runtime value, in one of the five lanes.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Ref(Option<ObjRef>),
}

impl Value {
    pub const NULL: Value = Value::Ref(None);

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Long(_) => ValueKind::Long,
            Value::Double(_) => ValueKind::Double,
            Value::Ref(_) => ValueKind::Ref,
        }
    }

    /// The default value of a lane.
    pub fn default_of(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Int => Value::Int(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Long => Value::Long(0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::Ref => Value::NULL,
        }
    }

    pub fn obj(o: ObjRef) -> Value {
        Value::Ref(Some(o))
    }

    /// A string constant: an object of the string class carrying the text
    /// as its native payload.
    pub fn string(string_class: Sym, text: &str) -> Value {
        Value::obj(Obj::with_native(string_class, Arc::new(text.to_string())))
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(WeftError::kind_mismatch("I", format!("{:?}", other))),
        }
    }

    pub fn as_long(&self) -> Result<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(WeftError::kind_mismatch("J", format!("{:?}", other))),
        }
    }

    pub fn as_ref(&self) -> Result<Option<ObjRef>> {
        match self {
            Value::Ref(r) => Ok(r.clone()),
            other => Err(WeftError::kind_mismatch("R", format!("{:?}", other))),
        }
    }

    /// Non-null reference or a null-reference error tagged with `at`.
    pub fn as_obj(&self, at: usize) -> Result<ObjRef> {
        self.as_ref()?.ok_or(WeftError::NullReference { at })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Ref(None))
    }

    /// The string text, when this is a string-class object.
    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::Ref(Some(o)) => o.native_as::<String>().cloned(),
            _ => None,
        }
    }
}

/// Value equality: numerics by value, references by identity (null equals
/// null).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Ref(None), Value::Ref(None)) => true,
            (Value::Ref(Some(a)), Value::Ref(Some(b))) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

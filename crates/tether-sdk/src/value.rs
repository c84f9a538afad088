//! Script value model
//!
//! Every slot of the evaluation stack holds a [`Value`]. Heap-resident values
//! (tables and foreign values) are referenced through copyable handles that
//! the runtime validates on every access, so a stale handle is detected
//! rather than dereferenced.

use std::fmt;
use std::sync::Arc;

use crate::context::ScriptStack;
use crate::error::MarshalResult;

/// Native function callable from scripts.
///
/// Arguments sit at stack positions `1..=top()`. The function pushes its
/// results and returns how many it pushed.
pub type NativeFn = Arc<dyn Fn(&mut dyn ScriptStack) -> MarshalResult<usize> + Send + Sync>;

/// Wrap a closure as a [`NativeFn`]
pub fn native_fn<F>(f: F) -> NativeFn
where
    F: Fn(&mut dyn ScriptStack) -> MarshalResult<usize> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handle to a table living on the runtime heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableRef {
    slot: u32,
    generation: u32,
}

/// Handle to a foreign value living on the runtime heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignRef {
    slot: u32,
    generation: u32,
}

macro_rules! heap_handle {
    ($name:ident) => {
        impl $name {
            /// Create a handle (runtime use)
            #[inline]
            pub const fn new(slot: u32, generation: u32) -> Self {
                Self { slot, generation }
            }

            /// Heap slot index
            #[inline]
            pub const fn slot(&self) -> u32 {
                self.slot
            }

            /// Generation of the slot when the handle was issued
            #[inline]
            pub const fn generation(&self) -> u32 {
                self.generation
            }
        }
    };
}

heap_handle!(TableRef);
heap_handle!(ForeignRef);

/// A script value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value
    #[default]
    Nil,
    /// Boolean
    Boolean(bool),
    /// Script number (IEEE double)
    Number(f64),
    /// Immutable string
    String(Arc<str>),
    /// Table
    Table(TableRef),
    /// Native function
    Function(NativeFn),
    /// Foreign value (typed memory block)
    Foreign(ForeignRef),
}

impl Value {
    /// Script-visible type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Foreign(_) => "cdata",
        }
    }

    /// Check if value is nil
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Extract number
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract string slice
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract table handle
    #[inline]
    pub fn as_table(&self) -> Option<TableRef> {
        match self {
            Value::Table(t) => Some(*t),
            _ => None,
        }
    }

    /// Extract foreign value handle
    #[inline]
    pub fn as_foreign(&self) -> Option<ForeignRef> {
        match self {
            Value::Foreign(r) => Some(*r),
            _ => None,
        }
    }

    /// Lua truthiness: everything except nil and false
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Identity comparison (strings and numbers by value)
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Foreign(a), Value::Foreign(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Value::Nil"),
            Value::Boolean(b) => write!(f, "Value::Boolean({})", b),
            Value::Number(n) => write!(f, "Value::Number({})", n),
            Value::String(s) => write!(f, "Value::String({:?})", s),
            Value::Table(t) => write!(f, "Value::Table({}:{})", t.slot(), t.generation()),
            Value::Function(func) => {
                write!(f, "Value::Function({:p})", Arc::as_ptr(func) as *const ())
            }
            Value::Foreign(r) => write!(f, "Value::Foreign({}:{})", r.slot(), r.generation()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<NativeFn> for Value {
    fn from(f: NativeFn) -> Self {
        Value::Function(f)
    }
}

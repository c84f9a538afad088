//! Foreign value allocation and inspection
//!
//! A foreign value is a fixed-size memory block tagged with the [`TypeId`] it
//! was allocated with. The runtime heap owns it; native code only ever sees
//! borrowed views whose lifetime is tied to the borrow of the runtime, so a
//! view cannot outlive the next operation that could collect the block.

use crate::context::ScriptStack;
use crate::error::{MarshalError, MarshalResult};
use crate::probe;
use crate::registry::{TypeId, MAX_TYPE_SIZE};
use crate::value::{ForeignRef, Value};

/// Allocate a foreign value of `type_id`, push it and return its memory.
///
/// The memory must be initialised by the caller; its initial contents are
/// unspecified. Fails for unknown types and types of unknown or oversized
/// size.
pub fn push_foreign(l: &mut dyn ScriptStack, type_id: TypeId) -> MarshalResult<&mut [u8]> {
    let size = l
        .registry()
        .with_ctype(type_id, |t| {
            t.size()
                .filter(|&size| size <= MAX_TYPE_SIZE)
                .ok_or_else(|| t.name().to_string())
        })
        .ok_or_else(|| MarshalError::mismatch("registered ctype", type_id.to_string()))?
        .map_err(MarshalError::IncompleteType)?;

    let r = l.alloc_foreign(type_id, size);
    tracing::trace!(type_id = type_id.as_u32(), size, "allocated foreign value");
    l.foreign_data_mut(r)
        .ok_or_else(|| MarshalError::Runtime("foreign value vanished after allocation".into()))
}

/// Handle of the foreign value at `idx`, raising a type mismatch otherwise
fn foreign_ref(l: &dyn ScriptStack, idx: i32) -> MarshalResult<ForeignRef> {
    match l.value(idx) {
        Some(Value::Foreign(r)) => Ok(r),
        Some(other) => Err(MarshalError::mismatch("cdata", other.type_name())),
        None => Err(MarshalError::mismatch("cdata", "no value")),
    }
}

/// Memory and TypeId of the foreign value at `idx`
pub fn check_foreign(l: &dyn ScriptStack, idx: i32) -> MarshalResult<(&[u8], TypeId)> {
    let r = foreign_ref(l, idx)?;
    let type_id = l
        .foreign_type(r)
        .ok_or_else(|| MarshalError::mismatch("cdata", "collected value"))?;
    let data = l
        .foreign_data(r)
        .ok_or_else(|| MarshalError::mismatch("cdata", "collected value"))?;
    Ok((data, type_id))
}

/// Mutable memory and TypeId of the foreign value at `idx`
pub fn check_foreign_mut(l: &mut dyn ScriptStack, idx: i32) -> MarshalResult<(&mut [u8], TypeId)> {
    let r = foreign_ref(l, idx)?;
    let type_id = l
        .foreign_type(r)
        .ok_or_else(|| MarshalError::mismatch("cdata", "collected value"))?;
    let data = l
        .foreign_data_mut(r)
        .ok_or_else(|| MarshalError::mismatch("cdata", "collected value"))?;
    Ok((data, type_id))
}

/// Whether the value at `idx` is a foreign value.
///
/// Never raises; use it to report a domain-specific error.
pub fn is_foreign(l: &dyn ScriptStack, idx: i32) -> bool {
    matches!(l.value(idx), Some(Value::Foreign(_)))
}

/// Attach the finalizer on top of the stack to the foreign value at `idx`.
///
/// The finalizer is popped. A nil finalizer removes any existing one.
pub fn set_finalizer(l: &mut dyn ScriptStack, idx: i32) -> MarshalResult<()> {
    let r = foreign_ref(l, idx)?;
    let finalizer = l.value(-1).unwrap_or_default();
    if !finalizer.is_nil() && !probe::is_callable(l, -1) {
        return Err(MarshalError::mismatch("function or nil", finalizer.type_name()));
    }
    l.pop(1);
    let finalizer = if finalizer.is_nil() { None } else { Some(finalizer) };
    l.set_foreign_finalizer(r, finalizer)
}

/// Push method `name` of the foreign value at `idx`.
///
/// Returns false (and pushes nothing) if the type has no such method.
pub fn push_method(l: &mut dyn ScriptStack, idx: i32, name: &str) -> MarshalResult<bool> {
    let (_, type_id) = check_foreign(l, idx)?;
    match l.registry().method(type_id, name) {
        Some(func) => {
            l.push(Value::Function(func));
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Push a NULL `void *` foreign value, usable in place of nil inside tables
pub fn push_null(l: &mut dyn ScriptStack) {
    let r = l.alloc_foreign(TypeId::VOID_PTR, std::mem::size_of::<usize>());
    if let Some(data) = l.foreign_data_mut(r) {
        data.fill(0);
    }
}

/// Whether the value at `idx` is nil, absent, or a NULL pointer foreign value
pub fn is_null(l: &dyn ScriptStack, idx: i32) -> bool {
    match l.value(idx) {
        None | Some(Value::Nil) => true,
        Some(Value::Foreign(r)) => {
            let is_pointer = l
                .foreign_type(r)
                .and_then(|id| l.registry().with_ctype(id, |t| t.is_pointer()))
                .unwrap_or(false);
            is_pointer
                && l
                    .foreign_data(r)
                    .map_or(false, |data| data.iter().all(|b| *b == 0))
        }
        Some(_) => false,
    }
}

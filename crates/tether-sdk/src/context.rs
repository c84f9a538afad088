//! ScriptStack trait: abstract runtime operations
//!
//! Defines the interface a scripting runtime implements. The marshalling
//! operations in this crate program against this trait without depending on
//! runtime internals.

use crate::error::MarshalResult;
use crate::registry::{TypeId, TypeRegistry};
use crate::value::{ForeignRef, TableRef, Value};

/// Pass as `nresults` to [`ScriptStack::call`] to keep every result
pub const MULTRET: usize = usize::MAX;

/// Abstract evaluation stack of one runtime instance.
///
/// Indices follow the usual embedding convention: positive indices are
/// 1-based from the base of the current call frame, negative indices count
/// from the top (`-1` is the topmost value). An index that does not name a
/// live slot reads as absent (`None`).
///
/// A runtime instance is single-threaded; the trait takes `&mut self` for
/// every operation that may touch the heap.
pub trait ScriptStack {
    // ========================================================================
    // Stack
    // ========================================================================

    /// Number of values in the current frame
    fn top(&self) -> usize;

    /// Read the value at `idx`
    fn value(&self, idx: i32) -> Option<Value>;

    /// Push a value
    fn push(&mut self, value: Value);

    /// Pop `n` values from the current frame
    fn pop(&mut self, n: usize);

    // ========================================================================
    // Types
    // ========================================================================

    /// The type registry this runtime was created with
    fn registry(&self) -> &TypeRegistry;

    // ========================================================================
    // Foreign values
    // ========================================================================

    /// Allocate a block of `size` bytes tagged with `type_id` and push it
    fn alloc_foreign(&mut self, type_id: TypeId, size: usize) -> ForeignRef;

    /// TypeId a foreign value was allocated with
    fn foreign_type(&self, r: ForeignRef) -> Option<TypeId>;

    /// Read-only view of a foreign value's memory
    fn foreign_data(&self, r: ForeignRef) -> Option<&[u8]>;

    /// Mutable view of a foreign value's memory
    fn foreign_data_mut(&mut self, r: ForeignRef) -> Option<&mut [u8]>;

    /// Replace (or clear, with `None`) the finalizer of a foreign value
    fn set_foreign_finalizer(&mut self, r: ForeignRef, finalizer: Option<Value>)
        -> MarshalResult<()>;

    // ========================================================================
    // Tables
    // ========================================================================

    /// Create an empty table (not pushed)
    fn new_table(&mut self) -> TableRef;

    /// Read a field without metamethods
    fn raw_get(&self, t: TableRef, key: &Value) -> MarshalResult<Value>;

    /// Write a field without metamethods (nil value removes the field)
    fn raw_set(&mut self, t: TableRef, key: Value, value: Value) -> MarshalResult<()>;

    /// Key/value pair following `key` in traversal order (`Nil` starts)
    fn next(&self, t: TableRef, key: &Value) -> MarshalResult<Option<(Value, Value)>>;

    /// Metatable of a table
    fn metatable(&self, t: TableRef) -> Option<TableRef>;

    /// Replace the metatable of a table
    fn set_metatable(&mut self, t: TableRef, mt: Option<TableRef>) -> MarshalResult<()>;

    // ========================================================================
    // Globals
    // ========================================================================

    /// Read a global variable
    fn global(&self, name: &str) -> Value;

    /// Write a global variable
    fn set_global(&mut self, name: &str, value: Value);

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call the value below the `nargs` topmost values.
    ///
    /// The callable and its arguments are replaced by `nresults` results
    /// (`MULTRET` keeps all of them). Errors unwind to the caller with the
    /// stack restored to the caller's frame.
    fn call(&mut self, nargs: usize, nresults: usize) -> MarshalResult<()>;
}

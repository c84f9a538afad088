//! Tether SDK - value marshalling for embedded scripting runtimes
//!
//! This crate moves values across the boundary between native code and a
//! dynamically-typed, garbage-collected scripting runtime. It programs against
//! the [`ScriptStack`] trait and never depends on a concrete runtime.
//!
//! - 64-bit integers that script numbers cannot hold ([`push_uint64`],
//!   [`check_int64`], ...)
//! - foreign values: typed memory blocks owned by the runtime heap
//!   ([`push_foreign`], [`check_foreign`], [`set_finalizer`])
//! - a process-wide [`TypeRegistry`] mapping native type declarations to
//!   stable [`TypeId`]s and binding [`MethodTable`]s to them
//! - probes ([`is_callable`], [`to_display_string`]) and module publishing
//!   ([`register_module`])
//!
//! # Example
//!
//! ```ignore
//! use tether_sdk::{check_uint64, native_fn, push_uint64, register_module};
//!
//! let inc = native_fn(|l| {
//!     let n = check_uint64(l, 1)?;
//!     push_uint64(l, n.wrapping_add(1));
//!     Ok(1)
//! });
//! register_module(l, "counter", &[("inc", inc)])?;
//! ```

#![warn(missing_docs)]

pub mod codec;
pub mod context;
pub mod ctype;
pub mod error;
pub mod foreign;
pub mod methods;
pub mod module;
pub mod probe;
pub mod registry;
pub mod table;
pub mod value;

pub use codec::{
    check_int64, check_uint64, push_int64, push_uint64, to_int64, to_uint64, to_uint64_wrapping,
};
pub use context::{ScriptStack, MULTRET};
pub use error::{ErrorKind, MarshalError, MarshalResult};
pub use foreign::{
    check_foreign, check_foreign_mut, is_foreign, is_null, push_foreign, push_method, push_null,
    set_finalizer,
};
pub use methods::{MethodTable, CALL_ENTRY, GC_ENTRY, TOSTRING_ENTRY};
pub use module::{register_module, NativeModule};
pub use probe::{is_callable, to_display_string};
pub use registry::{
    ctypeid, declare, register_type, CKind, CType, Field, RegistryConfig, TypeId, TypeRegistry,
    DEFAULT_MAX_TYPES, MAX_TYPE_SIZE,
};
pub use table::{array_len, map_len};
pub use value::{native_fn, ForeignRef, NativeFn, TableRef, Value};

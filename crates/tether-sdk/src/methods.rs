//! Method tables bound to foreign types

use std::fmt;

use crate::value::NativeFn;

/// Entry name that designates the finalizer in [`MethodTable::from_entries`]
pub const GC_ENTRY: &str = "__gc";

/// Entry name of the invocation behaviour
pub const CALL_ENTRY: &str = "__call";

/// Entry name of the stringification behaviour
pub const TOSTRING_ENTRY: &str = "__tostring";

/// Ordered set of native operations attached to one foreign type.
///
/// Built once, installed with the registry, immutable afterwards.
#[derive(Clone, Default)]
pub struct MethodTable {
    entries: Vec<(String, NativeFn)>,
    finalizer: Option<NativeFn>,
}

impl MethodTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, function)` pairs; a `"__gc"` entry becomes the finalizer
    pub fn from_entries(entries: &[(&str, NativeFn)]) -> Self {
        entries
            .iter()
            .fold(Self::new(), |table, (name, func)| {
                if *name == GC_ENTRY {
                    table.finalizer(func.clone())
                } else {
                    table.method(*name, func.clone())
                }
            })
    }

    /// Add a method; a later entry with the same name replaces the earlier one
    pub fn method(mut self, name: impl Into<String>, func: NativeFn) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = func,
            None => self.entries.push((name, func)),
        }
        self
    }

    /// Set the finalizer invoked when a value of this type is reclaimed
    pub fn finalizer(mut self, func: NativeFn) -> Self {
        self.finalizer = Some(func);
        self
    }

    /// Look up a method by name
    pub fn get(&self, name: &str) -> Option<&NativeFn> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    /// Finalizer, if any
    pub fn finalizer_fn(&self) -> Option<&NativeFn> {
        self.finalizer.as_ref()
    }

    /// Method names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of methods (finalizer excluded)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no methods
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.names().collect::<Vec<_>>())
            .field("finalizer", &self.finalizer.is_some())
            .finish()
    }
}

//! Native module registration
//!
//! A module is a flat table of native functions published under a global
//! name. Dotted names (`"net.http"`) publish into nested namespace tables.

use crate::context::ScriptStack;
use crate::error::{MarshalError, MarshalResult};
use crate::value::{NativeFn, TableRef, Value};

/// Native module definition.
///
/// Collects functions before they are published with [`NativeModule::install`].
#[derive(Clone, Default)]
pub struct NativeModule {
    name: String,
    functions: Vec<(String, NativeFn)>,
}

impl NativeModule {
    /// Create a module that will be published under `name`
    pub fn new(name: impl Into<String>) -> Self {
        NativeModule {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    /// Register a function with the module
    pub fn register_function(&mut self, name: impl Into<String>, func: NativeFn) {
        let name = name.into();
        match self.functions.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = func,
            None => self.functions.push((name, func)),
        }
    }

    /// Get module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get function by name
    pub fn get_function(&self, name: &str) -> Option<&NativeFn> {
        self.functions.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Get number of registered functions
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Publish the module into runtime `l`
    pub fn install(&self, l: &mut dyn ScriptStack) -> MarshalResult<TableRef> {
        let entries: Vec<(&str, NativeFn)> = self
            .functions
            .iter()
            .map(|(n, f)| (n.as_str(), f.clone()))
            .collect();
        register_module(l, &self.name, &entries)
    }
}

/// Install `functions` into the namespace table `name`, creating it if needed.
///
/// An existing namespace table is reused, so registering the same name twice
/// leaves a single table whose overlapping entries hold the last function
/// written. Fails if a path segment is bound to something other than a table.
pub fn register_module(
    l: &mut dyn ScriptStack,
    name: &str,
    functions: &[(&str, NativeFn)],
) -> MarshalResult<TableRef> {
    let mut segments = name.split('.');
    let root = segments.next().unwrap_or_default();
    if root.is_empty() {
        return Err(MarshalError::Runtime(format!("invalid module name '{}'", name)));
    }

    let mut table = match l.global(root) {
        Value::Table(t) => t,
        Value::Nil => {
            let t = l.new_table();
            l.set_global(root, Value::Table(t));
            t
        }
        other => return Err(name_conflict(root, &other)),
    };

    for segment in segments {
        if segment.is_empty() {
            return Err(MarshalError::Runtime(format!("invalid module name '{}'", name)));
        }
        let key = Value::from(segment);
        table = match l.raw_get(table, &key)? {
            Value::Table(t) => t,
            Value::Nil => {
                let t = l.new_table();
                l.raw_set(table, key, Value::Table(t))?;
                t
            }
            other => return Err(name_conflict(segment, &other)),
        };
    }

    for (fname, func) in functions {
        l.raw_set(table, Value::from(*fname), Value::Function(func.clone()))?;
    }
    tracing::debug!(module = name, functions = functions.len(), "registered module");
    Ok(table)
}

fn name_conflict(segment: &str, found: &Value) -> MarshalError {
    MarshalError::Runtime(format!(
        "name conflict for module '{}': bound to a {}",
        segment,
        found.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::native_fn;

    #[test]
    fn test_module_builder_replaces_duplicates() {
        let mut module = NativeModule::new("math");
        module.register_function("abs", native_fn(|_| Ok(0)));
        module.register_function("max", native_fn(|_| Ok(0)));
        let replacement = native_fn(|_| Ok(1));
        module.register_function("abs", replacement.clone());

        assert_eq!(module.name(), "math");
        assert_eq!(module.function_count(), 2);
        assert!(std::sync::Arc::ptr_eq(module.get_function("abs").unwrap(), &replacement));
        assert!(module.get_function("min").is_none());
    }
}

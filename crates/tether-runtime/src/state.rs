//! Runtime state
//!
//! One `State` is one single-threaded runtime instance: an evaluation stack
//! split into call frames, a heap of tables and foreign values, a globals
//! table and a collector. The type registry is shared with other instances.

use std::sync::Arc;

use tether_sdk::{
    ForeignRef, MarshalError, MarshalResult, NativeFn, ScriptStack, TableRef, TypeId,
    TypeRegistry, Value, CALL_ENTRY, MULTRET,
};
use tracing::{debug, warn};

use crate::collector::{self, GcStats};
use crate::config::RuntimeConfig;
use crate::heap::{Foreign, Heap, HeapObject, Table};

/// A runtime instance
pub struct State {
    registry: Arc<TypeRegistry>,
    config: RuntimeConfig,
    stack: Vec<Value>,
    /// Absolute index of the first slot of the current frame
    base: usize,
    depth: usize,
    heap: Heap,
    globals: TableRef,
    stats: GcStats,
}

impl State {
    /// Create a runtime with default limits
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(registry, RuntimeConfig::default())
    }

    /// Create a runtime with custom limits
    pub fn with_config(registry: Arc<TypeRegistry>, config: RuntimeConfig) -> Self {
        let mut heap = Heap::default();
        let (slot, generation) = heap.alloc(HeapObject::Table(Table::default()));
        debug!(
            stack_limit = config.stack_limit,
            max_call_depth = config.max_call_depth,
            "runtime created"
        );
        Self {
            registry,
            config,
            stack: Vec::new(),
            base: 0,
            depth: 0,
            heap,
            globals: TableRef::new(slot, generation),
            stats: GcStats::default(),
        }
    }

    /// The shared registry
    pub fn shared_registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The globals table
    pub fn globals(&self) -> TableRef {
        self.globals
    }

    /// Limits this runtime was created with
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Call like [`ScriptStack::call`], converting a failure into a value.
    ///
    /// On failure the callable and its arguments are replaced by the error
    /// message string, and the error is returned.
    pub fn pcall(&mut self, nargs: usize, nresults: usize) -> MarshalResult<()> {
        self.call(nargs, nresults).map_err(|err| {
            self.push(Value::from(err.to_string()));
            err
        })
    }

    /// Run a full collection cycle; returns the number of objects freed.
    ///
    /// Finalizers of values found unreachable run before this returns.
    pub fn collect_garbage(&mut self) -> usize {
        let roots = self
            .stack
            .iter()
            .cloned()
            .chain(std::iter::once(Value::Table(self.globals)));
        let cycle = collector::collect(&mut self.heap, roots);
        self.stats.record(&cycle, self.heap.live());
        debug!(
            marked = cycle.marked,
            freed = cycle.freed,
            finalizers = cycle.pending.len(),
            live = self.heap.live(),
            "collection finished"
        );
        self.run_finalizers(cycle.pending);
        cycle.freed
    }

    /// Collector statistics
    pub fn gc_stats(&self) -> &GcStats {
        &self.stats
    }

    /// Number of live heap objects (globals table included)
    pub fn heap_objects(&self) -> usize {
        self.heap.live()
    }

    fn run_finalizers(&mut self, pending: Vec<(ForeignRef, Value)>) {
        for (r, finalizer) in pending {
            let top = self.stack.len();
            self.push(finalizer);
            self.push(Value::Foreign(r));
            let outcome = self.call(1, 0);
            self.stack.truncate(top);
            self.stats.finalizers_run += 1;
            if let Err(err) = outcome {
                self.stats.finalizer_errors += 1;
                warn!(slot = r.slot(), error = %err, "finalizer failed");
            }
        }
    }

    /// Absolute stack position of `idx`, if it names a live slot of the frame
    fn position(&self, idx: i32) -> Option<usize> {
        let len = self.stack.len();
        let pos = match idx {
            0 => return None,
            i if i > 0 => self.base + (i as usize - 1),
            i => len.checked_sub(i.unsigned_abs() as usize)?,
        };
        (pos >= self.base && pos < len).then_some(pos)
    }

    /// Native function that handles a call of the value at `func_pos`.
    ///
    /// For tables and foreign values the `__call` handler takes the callee's
    /// slot and the callee becomes the first argument.
    fn resolve_callable(&mut self, func_pos: usize) -> MarshalResult<NativeFn> {
        let callee = self.stack[func_pos].clone();
        let handler = match &callee {
            Value::Function(f) => return Ok(f.clone()),
            Value::Table(t) => self
                .metatable(*t)
                .and_then(|mt| self.heap.table(mt))
                .map(|mt| mt.get(&Value::from(CALL_ENTRY))),
            Value::Foreign(r) => self
                .foreign_type(*r)
                .and_then(|id| self.registry.method(id, CALL_ENTRY))
                .map(Value::Function),
            _ => None,
        };
        match handler {
            Some(Value::Function(f)) => {
                self.stack[func_pos] = Value::Function(f.clone());
                self.stack.insert(func_pos + 1, callee);
                Ok(f)
            }
            _ => Err(MarshalError::Runtime(format!(
                "attempt to call a {} value",
                callee.type_name()
            ))),
        }
    }

    fn table_ref(&self, t: TableRef) -> MarshalResult<&Table> {
        self.heap
            .table(t)
            .ok_or_else(|| MarshalError::mismatch("table", "collected value"))
    }

    fn table_mut(&mut self, t: TableRef) -> MarshalResult<&mut Table> {
        self.heap
            .table_mut(t)
            .ok_or_else(|| MarshalError::mismatch("table", "collected value"))
    }
}

impl ScriptStack for State {
    fn top(&self) -> usize {
        self.stack.len() - self.base
    }

    fn value(&self, idx: i32) -> Option<Value> {
        self.position(idx).map(|pos| self.stack[pos].clone())
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self, n: usize) {
        let len = self.stack.len().saturating_sub(n).max(self.base);
        self.stack.truncate(len);
    }

    fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn alloc_foreign(&mut self, type_id: TypeId, size: usize) -> ForeignRef {
        let finalizer = self
            .registry
            .methods(type_id)
            .and_then(|m| m.finalizer_fn().cloned())
            .map(Value::Function);
        let (slot, generation) = self.heap.alloc(HeapObject::Foreign(Foreign {
            type_id,
            data: vec![0; size].into_boxed_slice(),
            finalizer,
        }));
        let r = ForeignRef::new(slot, generation);
        self.stack.push(Value::Foreign(r));
        r
    }

    fn foreign_type(&self, r: ForeignRef) -> Option<TypeId> {
        self.heap.foreign(r).map(|f| f.type_id)
    }

    fn foreign_data(&self, r: ForeignRef) -> Option<&[u8]> {
        self.heap.foreign(r).map(|f| &f.data[..])
    }

    fn foreign_data_mut(&mut self, r: ForeignRef) -> Option<&mut [u8]> {
        self.heap.foreign_mut(r).map(|f| &mut f.data[..])
    }

    fn set_foreign_finalizer(
        &mut self,
        r: ForeignRef,
        finalizer: Option<Value>,
    ) -> MarshalResult<()> {
        let foreign = self
            .heap
            .foreign_mut(r)
            .ok_or_else(|| MarshalError::mismatch("cdata", "collected value"))?;
        foreign.finalizer = finalizer;
        Ok(())
    }

    fn new_table(&mut self) -> TableRef {
        let (slot, generation) = self.heap.alloc(HeapObject::Table(Table::default()));
        TableRef::new(slot, generation)
    }

    fn raw_get(&self, t: TableRef, key: &Value) -> MarshalResult<Value> {
        Ok(self.table_ref(t)?.get(key))
    }

    fn raw_set(&mut self, t: TableRef, key: Value, value: Value) -> MarshalResult<()> {
        self.table_mut(t)?.set(key, value)
    }

    fn next(&self, t: TableRef, key: &Value) -> MarshalResult<Option<(Value, Value)>> {
        self.table_ref(t)?.next(key)
    }

    fn metatable(&self, t: TableRef) -> Option<TableRef> {
        self.heap.table(t)?.metatable
    }

    fn set_metatable(&mut self, t: TableRef, mt: Option<TableRef>) -> MarshalResult<()> {
        if let Some(mt) = mt {
            self.table_ref(mt)?;
        }
        self.table_mut(t)?.metatable = mt;
        Ok(())
    }

    fn global(&self, name: &str) -> Value {
        self.heap
            .table(self.globals)
            .map(|g| g.get(&Value::from(name)))
            .unwrap_or_default()
    }

    fn set_global(&mut self, name: &str, value: Value) {
        let globals = self.globals;
        if let Err(err) = self.raw_set(globals, Value::from(name), value) {
            warn!(name, error = %err, "failed to set global");
        }
    }

    fn call(&mut self, nargs: usize, nresults: usize) -> MarshalResult<()> {
        let func_pos = nargs
            .checked_add(1)
            .and_then(|n| self.stack.len().checked_sub(n))
            .filter(|&pos| pos >= self.base)
            .ok_or_else(|| {
                MarshalError::Runtime(format!("call needs a callable and {} arguments", nargs))
            })?;

        let func = if self.depth >= self.config.max_call_depth {
            Err(MarshalError::Runtime("C stack overflow".into()))
        } else if self.stack.len() >= self.config.stack_limit {
            Err(MarshalError::Runtime("stack overflow".into()))
        } else {
            self.resolve_callable(func_pos)
        };
        let func = match func {
            Ok(f) => f,
            Err(err) => {
                self.stack.truncate(func_pos);
                return Err(err);
            }
        };

        let saved_base = self.base;
        self.base = func_pos + 1;
        self.depth += 1;
        let l: &mut dyn ScriptStack = self;
        let result = func(l);
        self.depth -= 1;
        self.base = saved_base;

        match result {
            Ok(n) => {
                let n = n.min(self.stack.len() - (func_pos + 1));
                let first_result = self.stack.len() - n;
                self.stack.drain(func_pos..first_result);
                if nresults != MULTRET {
                    self.stack.resize(func_pos + nresults, Value::Nil);
                }
                Ok(())
            }
            Err(err) => {
                self.stack.truncate(func_pos);
                Err(err)
            }
        }
    }
}

impl Drop for State {
    /// Closing a runtime runs every finalizer that has not run yet
    fn drop(&mut self) {
        self.stack.clear();
        self.base = 0;
        self.depth = 0;
        loop {
            let pending = self.heap.take_all_finalizers();
            if pending.is_empty() {
                break;
            }
            self.run_finalizers(pending);
        }
        debug!(finalizers_run = self.stats.finalizers_run, "runtime closed");
    }
}

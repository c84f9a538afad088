//! Mark-sweep garbage collector
//!
//! Marks from the root set, schedules finalizers of unreachable foreign
//! values, then sweeps. A value with a finalizer survives the cycle that
//! schedules it (so the finalizer can receive it) and is freed by a later
//! cycle once it is unreachable again. The finalizer is moved out of the
//! value when scheduled, which is what makes it run at most once.

use std::time::{Duration, Instant};

use tether_sdk::{ForeignRef, Value};

use crate::heap::{Heap, HeapObject};

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total foreign bytes freed
    pub bytes_freed: usize,

    /// Total finalizers invoked
    pub finalizers_run: usize,

    /// Finalizers that raised an error
    pub finalizer_errors: usize,

    /// Total pause time across all collections
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,

    /// Objects marked in last collection
    pub last_marked_count: usize,

    /// Objects freed in last collection
    pub last_freed_count: usize,

    /// Live objects after last collection
    pub live_objects: usize,
}

impl GcStats {
    /// Average pause time
    pub fn avg_pause_time(&self) -> Duration {
        if self.collections == 0 {
            return Duration::ZERO;
        }
        self.total_pause_time / self.collections as u32
    }
}

/// Outcome of the mark and sweep phases of one cycle
pub(crate) struct Cycle {
    pub started: Instant,
    pub marked: usize,
    pub freed: usize,
    pub freed_bytes: usize,
    /// Finalizers to invoke, each with the value it belongs to
    pub pending: Vec<(ForeignRef, Value)>,
}

/// Run the mark and sweep phases.
///
/// Finalizers are returned rather than invoked: running them needs the whole
/// runtime, not just its heap.
pub(crate) fn collect(heap: &mut Heap, roots: impl IntoIterator<Item = Value>) -> Cycle {
    let started = Instant::now();

    heap.clear_marks();
    let mut marked = mark(heap, roots);
    let pending = heap.take_unreachable_finalizers();
    marked += pending.len();
    marked += mark(heap, pending.iter().map(|(_, f)| f.clone()));
    let (freed, freed_bytes) = heap.sweep();

    Cycle {
        started,
        marked,
        freed,
        freed_bytes,
        pending,
    }
}

/// Mark everything reachable from `roots`; returns the number of objects marked
fn mark(heap: &mut Heap, roots: impl IntoIterator<Item = Value>) -> usize {
    let mut worklist: Vec<Value> = roots.into_iter().collect();
    let mut marked = 0;

    while let Some(value) = worklist.pop() {
        let (slot, generation) = match &value {
            Value::Table(t) => (t.slot(), t.generation()),
            Value::Foreign(r) => (r.slot(), r.generation()),
            _ => continue,
        };
        let Some(object) = heap.mark(slot, generation) else {
            continue;
        };
        marked += 1;

        match object {
            HeapObject::Table(table) => {
                if let Some(mt) = table.metatable {
                    worklist.push(Value::Table(mt));
                }
                for (k, v) in table.live_entries() {
                    worklist.push(k.clone());
                    worklist.push(v.clone());
                }
            }
            // a finalizer may be a callable table
            HeapObject::Foreign(f) => worklist.extend(f.finalizer.clone()),
        }
    }
    marked
}

impl GcStats {
    pub(crate) fn record(&mut self, cycle: &Cycle, live_objects: usize) {
        let pause = cycle.started.elapsed();
        self.collections += 1;
        self.objects_freed += cycle.freed;
        self.bytes_freed += cycle.freed_bytes;
        self.total_pause_time += pause;
        self.last_pause_time = pause;
        self.last_marked_count = cycle.marked;
        self.last_freed_count = cycle.freed;
        self.live_objects = live_objects;
    }
}

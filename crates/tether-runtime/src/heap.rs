//! Runtime heap
//!
//! Slab of tables and foreign blocks. Handles carry the generation of the
//! slot they were issued for; freeing a slot bumps its generation, so a stale
//! handle resolves to nothing instead of aliasing a newer object.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tether_sdk::{ForeignRef, MarshalError, MarshalResult, TableRef, TypeId, Value};

/// Object stored in a heap slot
pub(crate) enum HeapObject {
    Table(Table),
    Foreign(Foreign),
}

/// Typed memory block
pub(crate) struct Foreign {
    pub type_id: TypeId,
    pub data: Box<[u8]>,
    /// Taken (not cloned) when scheduled, so it runs at most once
    pub finalizer: Option<Value>,
}

/// Hashable identity of a table key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TableKey {
    Boolean(bool),
    Number(u64),
    String(Arc<str>),
    Table(TableRef),
    Function(usize),
    Foreign(ForeignRef),
}

impl TableKey {
    fn new(key: &Value) -> MarshalResult<Self> {
        Ok(match key {
            Value::Nil => return Err(MarshalError::Runtime("table index is nil".into())),
            Value::Number(n) if n.is_nan() => {
                return Err(MarshalError::Runtime("table index is NaN".into()))
            }
            Value::Boolean(b) => TableKey::Boolean(*b),
            // 0.0 and -0.0 are the same key
            Value::Number(n) => TableKey::Number(if *n == 0.0 { 0 } else { n.to_bits() }),
            Value::String(s) => TableKey::String(s.clone()),
            Value::Table(t) => TableKey::Table(*t),
            Value::Function(f) => TableKey::Function(Arc::as_ptr(f) as *const () as usize),
            Value::Foreign(r) => TableKey::Foreign(*r),
        })
    }
}

/// Insertion-ordered hash table.
///
/// Removing a key leaves a tombstone (the key with a nil value) so a `next`
/// traversal can continue past it. Tombstones are compacted away only when a
/// new key is inserted.
#[derive(Default)]
pub(crate) struct Table {
    entries: Vec<(Value, Value)>,
    index: FxHashMap<TableKey, usize>,
    live: usize,
    pub metatable: Option<TableRef>,
}

impl Table {
    pub fn get(&self, key: &Value) -> Value {
        TableKey::new(key)
            .ok()
            .and_then(|k| self.index.get(&k))
            .map(|&i| self.entries[i].1.clone())
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: Value, value: Value) -> MarshalResult<()> {
        let k = TableKey::new(&key)?;
        if let Some(&i) = self.index.get(&k) {
            let slot = &mut self.entries[i].1;
            match (slot.is_nil(), value.is_nil()) {
                (true, false) => self.live += 1,
                (false, true) => self.live -= 1,
                _ => {}
            }
            *slot = value;
            return Ok(());
        }
        if value.is_nil() {
            return Ok(());
        }
        self.compact();
        self.index.insert(k, self.entries.len());
        self.entries.push((key, value));
        self.live += 1;
        Ok(())
    }

    pub fn next(&self, key: &Value) -> MarshalResult<Option<(Value, Value)>> {
        let start = if key.is_nil() {
            0
        } else {
            let k = TableKey::new(key)?;
            match self.index.get(&k) {
                Some(&i) => i + 1,
                None => return Err(MarshalError::Runtime("invalid key to 'next'".into())),
            }
        };
        Ok(self.entries[start..]
            .iter()
            .find(|(_, v)| !v.is_nil())
            .cloned())
    }

    /// Live keys and values
    pub fn live_entries(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter().filter(|(_, v)| !v.is_nil())
    }

    fn compact(&mut self) {
        let dead = self.entries.len() - self.live;
        if dead < 8 || dead < self.live {
            return;
        }
        self.entries.retain(|(_, v)| !v.is_nil());
        self.index.clear();
        for (i, (key, _)) in self.entries.iter().enumerate() {
            if let Ok(k) = TableKey::new(key) {
                self.index.insert(k, i);
            }
        }
    }
}

struct Slot {
    generation: u32,
    marked: bool,
    object: Option<HeapObject>,
}

/// Slab of heap objects
#[derive(Default)]
pub(crate) struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    /// Store an object, returning its slot and generation
    pub fn alloc(&mut self, object: HeapObject) -> (u32, u32) {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            return (index, slot.generation);
        }
        self.slots.push(Slot {
            generation: 0,
            marked: false,
            object: Some(object),
        });
        ((self.slots.len() - 1) as u32, 0)
    }

    fn get(&self, slot: u32, generation: u32) -> Option<&HeapObject> {
        self.slots
            .get(slot as usize)
            .filter(|s| s.generation == generation)?
            .object
            .as_ref()
    }

    fn get_mut(&mut self, slot: u32, generation: u32) -> Option<&mut HeapObject> {
        self.slots
            .get_mut(slot as usize)
            .filter(|s| s.generation == generation)?
            .object
            .as_mut()
    }

    pub fn table(&self, r: TableRef) -> Option<&Table> {
        match self.get(r.slot(), r.generation())? {
            HeapObject::Table(t) => Some(t),
            HeapObject::Foreign(_) => None,
        }
    }

    pub fn table_mut(&mut self, r: TableRef) -> Option<&mut Table> {
        match self.get_mut(r.slot(), r.generation())? {
            HeapObject::Table(t) => Some(t),
            HeapObject::Foreign(_) => None,
        }
    }

    pub fn foreign(&self, r: ForeignRef) -> Option<&Foreign> {
        match self.get(r.slot(), r.generation())? {
            HeapObject::Foreign(f) => Some(f),
            HeapObject::Table(_) => None,
        }
    }

    pub fn foreign_mut(&mut self, r: ForeignRef) -> Option<&mut Foreign> {
        match self.get_mut(r.slot(), r.generation())? {
            HeapObject::Foreign(f) => Some(f),
            HeapObject::Table(_) => None,
        }
    }

    /// Number of live objects
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    /// Mark a live object; returns its contents if it was not marked yet
    pub fn mark(&mut self, slot: u32, generation: u32) -> Option<&HeapObject> {
        let s = self.slots.get_mut(slot as usize)?;
        if s.generation != generation || s.marked || s.object.is_none() {
            return None;
        }
        s.marked = true;
        s.object.as_ref()
    }

    /// Take the finalizers of unmarked foreign values and mark those values,
    /// keeping them alive for one more cycle
    pub fn take_unreachable_finalizers(&mut self) -> Vec<(ForeignRef, Value)> {
        let mut pending = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.marked {
                continue;
            }
            if let Some(HeapObject::Foreign(f)) = &mut slot.object {
                if let Some(finalizer) = f.finalizer.take() {
                    slot.marked = true;
                    pending.push((ForeignRef::new(index as u32, slot.generation), finalizer));
                }
            }
        }
        pending
    }

    /// Take every remaining finalizer, reachable or not
    pub fn take_all_finalizers(&mut self) -> Vec<(ForeignRef, Value)> {
        let mut pending = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(HeapObject::Foreign(f)) = &mut slot.object {
                if let Some(finalizer) = f.finalizer.take() {
                    pending.push((ForeignRef::new(index as u32, slot.generation), finalizer));
                }
            }
        }
        pending
    }

    /// Free every unmarked object; returns (objects, bytes) freed
    pub fn sweep(&mut self) -> (usize, usize) {
        let mut freed = 0;
        let mut freed_bytes = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.marked || slot.object.is_none() {
                continue;
            }
            if let Some(HeapObject::Foreign(f)) = &slot.object {
                freed_bytes += f.data.len();
            }
            slot.object = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
            freed += 1;
        }
        self.live -= freed;
        (freed, freed_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foreign(size: usize) -> HeapObject {
        HeapObject::Foreign(Foreign {
            type_id: TypeId::UINT8,
            data: vec![0; size].into_boxed_slice(),
            finalizer: None,
        })
    }

    #[test]
    fn test_table_tombstones_keep_traversal_valid() {
        let mut t = Table::default();
        for i in 1..=4 {
            t.set(Value::from(i), Value::from(i * 10)).unwrap();
        }
        let (k1, _) = t.next(&Value::Nil).unwrap().unwrap();
        t.set(Value::from(2), Value::Nil).unwrap();
        let (k3, v3) = t.next(&k1).unwrap().unwrap();
        assert!(k3.raw_equal(&Value::from(3)));
        assert!(v3.raw_equal(&Value::from(30)));
        assert_eq!(t.live, 3);
    }

    #[test]
    fn test_table_rejects_bad_keys() {
        let mut t = Table::default();
        assert!(t.set(Value::Nil, Value::from(1)).is_err());
        assert!(t.set(Value::from(f64::NAN), Value::from(1)).is_err());
        assert!(t.get(&Value::Nil).is_nil());
    }

    #[test]
    fn test_table_negative_zero_key() {
        let mut t = Table::default();
        t.set(Value::from(0.0), Value::from("zero")).unwrap();
        assert_eq!(t.get(&Value::from(-0.0)).as_str(), Some("zero"));
    }

    #[test]
    fn test_table_compaction() {
        let mut t = Table::default();
        for i in 0..20 {
            t.set(Value::from(i), Value::from(true)).unwrap();
        }
        for i in 0..18 {
            t.set(Value::from(i), Value::Nil).unwrap();
        }
        t.set(Value::from("new"), Value::from(1)).unwrap();
        assert_eq!(t.entries.len(), 3);
        assert_eq!(t.live, 3);
        assert!(t.get(&Value::from(19)).is_truthy());
    }

    #[test]
    fn test_stale_handle_after_sweep() {
        let mut heap = Heap::default();
        let (slot, generation) = heap.alloc(foreign(4));
        let old = ForeignRef::new(slot, generation);
        assert!(heap.foreign(old).is_some());

        heap.clear_marks();
        assert_eq!(heap.sweep(), (1, 4));
        assert!(heap.foreign(old).is_none());

        let (slot2, generation2) = heap.alloc(foreign(2));
        assert_eq!(slot2, slot);
        assert_ne!(generation2, generation);
        assert!(heap.foreign(old).is_none());
        assert_eq!(heap.live(), 1);
    }

    #[test]
    fn test_handle_kind_checked() {
        let mut heap = Heap::default();
        let (slot, generation) = heap.alloc(HeapObject::Table(Table::default()));
        assert!(heap.table(TableRef::new(slot, generation)).is_some());
        assert!(heap.foreign(ForeignRef::new(slot, generation)).is_none());
    }
}

//! Fixed-capacity slot arena
//!
//! Every live message lives in exactly one slot. Handles carry the slot's
//! generation, so a handle kept past a release never resolves to whatever
//! reuses the slot afterwards.

/// Generation-checked handle into a [`SlotPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena with a capacity fixed at construction
#[derive(Debug)]
pub struct SlotPool<T> {
    slots: Vec<Slot<T>>,
    /// Free indices, popped from the back
    free: Vec<u32>,
    len: usize,
}

impl<T> SlotPool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        // Lowest index is handed out first
        let free = (0..capacity as u32).rev().collect();

        Self {
            slots,
            free,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Store `value` in a free slot, or hand it back when the pool is full
    pub fn allocate(&mut self, value: T) -> Result<SlotId, T> {
        let Some(index) = self.free.pop() else {
            return Err(value);
        };

        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.len += 1;

        Ok(SlotId {
            index,
            generation: slot.generation,
        })
    }

    /// Take the value out and retire the handle. Stale handles return `None`.
    pub fn release(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;

        Some(value)
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    /// Occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SlotId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_until_full() {
        let mut pool = SlotPool::with_capacity(2);
        assert!(pool.allocate("a").is_ok());
        assert!(pool.allocate("b").is_ok());
        assert!(pool.is_full());
        assert_eq!(pool.allocate("c"), Err("c"));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_stale_handle_does_not_alias() {
        let mut pool = SlotPool::with_capacity(1);
        let first = pool.allocate(1).unwrap();
        assert_eq!(pool.release(first), Some(1));

        let second = pool.allocate(2).unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);

        assert_eq!(pool.get(first), None);
        assert_eq!(pool.release(first), None);
        assert_eq!(pool.get(second), Some(&2));
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut pool = SlotPool::with_capacity(3);
        let a = pool.allocate('a').unwrap();
        let _b = pool.allocate('b').unwrap();
        pool.release(a);

        let values: Vec<char> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!['b']);
        assert!(!pool.is_empty());
    }

    #[test]
    fn test_zero_capacity() {
        let mut pool: SlotPool<u8> = SlotPool::with_capacity(0);
        assert!(pool.is_full());
        assert_eq!(pool.allocate(1), Err(1));
    }
}

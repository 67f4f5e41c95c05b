//! Specialized collection types

/// Index allocator that hands out recycled indices before appending new ones
///
/// Every slot carries a generation that is bumped when the index is freed, so
/// a `(index, generation)` pair taken before the free no longer matches once
/// the index has been recycled.
#[derive(Debug, Default)]
pub struct IndexAllocator {
    generations: Vec<u32>,
    live: Vec<bool>,
    free_indices: Vec<u32>,
}

impl IndexAllocator {
    /// Create an empty allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an index, preferring the most recently freed one
    pub fn allocate(&mut self) -> (u32, u32) {
        if let Some(index) = self.free_indices.pop() {
            let slot = index as usize;
            self.live[slot] = true;
            (index, self.generations[slot])
        } else {
            let index = u32::try_from(self.generations.len())
                .unwrap_or_else(|_| crate::foundation::contract::violation("index space exhausted"));
            self.generations.push(0);
            self.live.push(true);
            (index, 0)
        }
    }

    /// Return an index to the free list. Returns false if it was not live.
    pub fn free(&mut self, index: u32) -> bool {
        let slot = index as usize;
        match self.live.get_mut(slot) {
            Some(live) if *live => {
                *live = false;
                self.generations[slot] = self.generations[slot].wrapping_add(1);
                self.free_indices.push(index);
                true
            }
            _ => false,
        }
    }

    /// Whether `(index, generation)` names a currently live allocation
    pub fn is_live(&self, index: u32, generation: u32) -> bool {
        let slot = index as usize;
        self.live.get(slot).copied().unwrap_or(false) && self.generations[slot] == generation
    }

    /// Number of live indices
    pub fn live_count(&self) -> usize {
        self.generations.len() - self.free_indices.len()
    }

    /// Highest index ever handed out, plus one
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }
}

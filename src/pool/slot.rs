//! Worker slot table. Owned by the pool and only touched under its lock.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Idle,
    Busy,
    Initializing,
}

#[derive(Debug)]
pub(crate) struct WorkerSlot {
    pub id: usize,
    pub state: SlotState,
}

/// Result of one pass of the admission algorithm.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// An idle slot was claimed and is now busy.
    Assigned(usize),
    /// No idle slot; a new one was created and is initializing.
    Spawned(usize),
    /// At the ceiling with nothing idle.
    Full,
}

#[derive(Debug, Default)]
pub(crate) struct SlotTable {
    slots: Vec<WorkerSlot>,
    next_id: usize,
    peak: usize,
}

impl SlotTable {
    pub fn admit(&mut self, max_workers: usize) -> Admission {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.state == SlotState::Idle) {
            slot.state = SlotState::Busy;
            return Admission::Assigned(slot.id);
        }

        if self.slots.len() < max_workers {
            let id = self.next_id;
            self.next_id += 1;
            self.slots.push(WorkerSlot {
                id,
                state: SlotState::Initializing,
            });
            self.peak = self.peak.max(self.slots.len());
            return Admission::Spawned(id);
        }

        Admission::Full
    }

    /// Returns false if the slot no longer exists.
    pub fn set_state(&mut self, id: usize, state: SlotState) -> bool {
        match self.slots.iter_mut().find(|s| s.id == id) {
            Some(slot) => {
                slot.state = state;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: usize) -> bool {
        let before = self.slots.len();
        self.slots.retain(|s| s.id != id);
        self.slots.len() != before
    }

    /// Remove idle slots until at most `max_workers` remain; returns their ids.
    pub fn trim_idle(&mut self, max_workers: usize) -> Vec<usize> {
        let mut removed = Vec::new();
        while self.slots.len() > max_workers {
            let Some(pos) = self.slots.iter().position(|s| s.state == SlotState::Idle) else {
                break;
            };
            removed.push(self.slots.remove(pos).id);
        }
        removed
    }

    /// Remove busy and initializing slots, returning their ids.
    pub fn take_unfinished(&mut self) -> Vec<usize> {
        let mut taken = Vec::new();
        self.slots.retain(|s| {
            if s.state == SlotState::Idle {
                true
            } else {
                taken.push(s.id);
                false
            }
        });
        taken
    }

    /// Empty the table, returning every slot id.
    pub fn drain_ids(&mut self) -> Vec<usize> {
        self.slots.drain(..).map(|s| s.id).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn count(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|s| s.state == state).count()
    }

    pub fn peak(&self) -> usize {
        self.peak
    }
}

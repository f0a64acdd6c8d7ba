use crate::ports::outbound::IdSource;
use parking_lot::Mutex;
use rand::Rng;
use shared_types::MAX_RANDOM_ID;
use std::collections::VecDeque;

/// Uniform ids in `1..=MAX_RANDOM_ID` from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdSource;

impl IdSource for RandomIdSource {
    fn next_id(&self) -> u32 {
        rand::thread_rng().gen_range(1..=MAX_RANDOM_ID)
    }
}

/// Replays a fixed id sequence, then counts up from the last one.
///
/// Lets tests force collisions deterministically.
#[derive(Debug)]
pub struct ScriptedIdSource {
    queue: Mutex<VecDeque<u32>>,
    next: Mutex<u32>,
}

impl ScriptedIdSource {
    pub fn new(ids: impl IntoIterator<Item = u32>) -> Self {
        let queue: VecDeque<u32> = ids.into_iter().collect();
        let next = queue.back().copied().unwrap_or(0).saturating_add(1).max(1);
        Self {
            queue: Mutex::new(queue),
            next: Mutex::new(next),
        }
    }

    /// 1, 2, 3, ...
    pub fn sequential() -> Self {
        Self::new([])
    }
}

impl IdSource for ScriptedIdSource {
    fn next_id(&self) -> u32 {
        if let Some(id) = self.queue.lock().pop_front() {
            return id;
        }
        let mut next = self.next.lock();
        let id = *next;
        *next = if id >= MAX_RANDOM_ID { 1 } else { id + 1 };
        id
    }
}

use std::collections::BTreeMap;

use visible::TimerHandle;

/// Virtual millisecond clock with one-shot timers.
///
/// Timers due at the same instant fire in scheduling order.
pub(crate) struct Clock {
    now_ms: u64,
    next_handle: u64,
    // (deadline, handle) -> callback
    pending: BTreeMap<(u64, u64), Box<dyn FnOnce()>>,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_handle: 1,
            pending: BTreeMap::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn schedule(&mut self, delay_ms: u64, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        let deadline = self.now_ms.saturating_add(delay_ms);
        self.pending.insert((deadline, handle), callback);
        TimerHandle(handle)
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(_, h), _| *h != handle.0);
        self.pending.len() != before
    }

    /// Removes the earliest timer due at or before `until`, moving the clock to its deadline.
    pub fn pop_due(&mut self, until: u64) -> Option<(TimerHandle, Box<dyn FnOnce()>)> {
        let (&(deadline, handle), _) = self.pending.first_key_value()?;
        if deadline > until {
            return None;
        }
        let callback = self.pending.remove(&(deadline, handle))?;
        self.now_ms = self.now_ms.max(deadline);
        Some((TimerHandle(handle), callback))
    }

    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

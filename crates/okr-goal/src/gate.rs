// gate.rs - Per-repository write gate, re-entrant for the owning thread.
//
// Every repository operation enters the gate. A transaction holds it for
// its whole closure, so no other thread can read or write in between, and
// the calls the closure makes on the same thread pass straight through.

use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
pub(crate) struct Gate {
    /// Owning thread and how many times it has entered.
    owner: Mutex<Option<(ThreadId, usize)>>,
    released: Condvar,
}

/// Leaves the gate on drop.
pub(crate) struct GateGuard<'a> {
    gate: &'a Gate,
}

impl Gate {
    /// Block until the gate is free or already held by this thread.
    pub(crate) fn enter(&self) -> GateGuard<'_> {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match *owner {
                None => {
                    *owner = Some((me, 1));
                    break;
                }
                Some((id, depth)) if id == me => {
                    *owner = Some((id, depth + 1));
                    break;
                }
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
        GateGuard { gate: self }
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut owner = self.gate.owner.lock().unwrap_or_else(|e| e.into_inner());
        *owner = match *owner {
            Some((id, depth)) if depth > 1 => Some((id, depth - 1)),
            _ => None,
        };
        if owner.is_none() {
            self.gate.released.notify_all();
        }
    }
}

//! Named, cancellable single-shot timers
//!
//! Every delayed action in the engine (long-press detection, earcon-to-listen,
//! engine reinitialisation, volume restore...) is a named entry in a
//! [`TimerRegistry`]. At most one instance per name is pending: arming a name
//! that is already pending replaces its deadline.
//!
//! The registry never sleeps. The owner asks for [`TimerRegistry::next_deadline`]
//! and pops expired names with [`TimerRegistry::pop_due`], which keeps every
//! component deterministic under test.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Pending {
    deadline: Instant,
    /// Arm order, breaks ties between equal deadlines
    seq: u64,
}

/// Registry of pending timers keyed by name
#[derive(Debug)]
pub struct TimerRegistry<K> {
    pending: HashMap<K, Pending>,
    next_seq: u64,
}

impl<K> Default for TimerRegistry<K> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Copy + Eq + Hash + Debug> TimerRegistry<K> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `name` to fire `delay` after `now`.
    ///
    /// Returns `true` if a pending instance was replaced.
    pub fn arm(&mut self, name: K, now: Instant, delay: Duration) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;
        let replaced = self
            .pending
            .insert(
                name,
                Pending {
                    deadline: now + delay,
                    seq,
                },
            )
            .is_some();
        if replaced {
            tracing::debug!("Timer {:?} re-armed ({:?})", name, delay);
        } else {
            tracing::debug!("Timer {:?} armed ({:?})", name, delay);
        }
        replaced
    }

    /// Cancel `name`. Returns `true` if it was pending.
    pub fn cancel(&mut self, name: K) -> bool {
        let cancelled = self.pending.remove(&name).is_some();
        if cancelled {
            tracing::debug!("Timer {:?} cancelled", name);
        }
        cancelled
    }

    /// Cancel everything, returning how many timers were pending
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Whether a timer with this name is armed
    pub fn is_pending(&self, name: K) -> bool {
        self.pending.contains_key(&name)
    }

    /// Earliest deadline among pending timers
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return the earliest timer whose deadline is at or before `now`.
    ///
    /// Handlers may arm new timers between calls; a zero-delay timer armed
    /// while draining is returned by a later call with the same `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<K> {
        let name = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .min_by_key(|(_, p)| (p.deadline, p.seq))
            .map(|(name, _)| *name)?;
        self.pending.remove(&name);
        Some(name)
    }

    /// Number of armed timers
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

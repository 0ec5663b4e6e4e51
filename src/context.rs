//! Per-call state shared by every component of one pack.
//!
//! A `PackingContext` is a bundle of borrowed references: the configuration,
//! the memoization caches, the optional observer and the optional deadline.
//! It is `Copy`, so it is handed down by value. Caches are scoped to one
//! top-level pack call and never outlive it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{PackingError, Result};
use crate::events::{PackEvent, PackObserver};
use crate::model::Rotation;
use crate::packer::PackingConfig;
use crate::types::Dimensions;

/// Cache key for "does this item have a stable orientation in an empty box".
pub(crate) type StabilityKey = (Dimensions, Rotation, Dimensions);

/// Cache key for the additional-items lookahead.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct LookaheadKey {
    pub candidate: Dimensions,
    pub envelope: Dimensions,
    pub row_length: u32,
    pub items: Vec<(Dimensions, u32, Rotation)>,
}

/// Memoization caches for one pack call.
#[derive(Debug, Default)]
pub(crate) struct PackingCaches {
    stable_in_empty_box: Mutex<HashMap<StabilityKey, bool>>,
    lookahead: Mutex<HashMap<LookaheadKey, usize>>,
}

impl PackingCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stable_in_empty_box(&self, key: StabilityKey, compute: impl FnOnce() -> bool) -> bool {
        memoize(&self.stable_in_empty_box, key, compute)
    }

    pub fn lookahead(&self, key: LookaheadKey, compute: impl FnOnce() -> usize) -> usize {
        memoize(&self.lookahead, key, compute)
    }

    #[cfg(test)]
    pub fn lookahead_entries(&self) -> usize {
        self.lookahead.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Looks `key` up, computing and storing the value on a miss.
///
/// The lock is released while `compute` runs, so nested computations may use
/// the same cache. Two threads racing on one key both compute it; the values
/// are identical, so the second insert is harmless.
fn memoize<K, V>(cache: &Mutex<HashMap<K, V>>, key: K, compute: impl FnOnce() -> V) -> V
where
    K: Eq + Hash,
    V: Copy,
{
    if let Some(value) = cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return *value;
    }

    let value = compute();
    cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, value);
    value
}

/// Wall-clock budget for one pack call.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fails with [`PackingError::Timeout`] once the budget is spent.
    pub fn check(&self) -> Result<()> {
        let elapsed = self.elapsed();
        if elapsed > self.budget {
            return Err(PackingError::Timeout {
                elapsed,
                budget: self.budget,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub(crate) struct PackingContext<'a> {
    pub config: &'a PackingConfig,
    pub caches: &'a PackingCaches,
    observer: Option<&'a dyn PackObserver>,
    deadline: Option<&'a Deadline>,
}

impl<'a> PackingContext<'a> {
    pub fn new(config: &'a PackingConfig, caches: &'a PackingCaches) -> Self {
        Self {
            config,
            caches,
            observer: None,
            deadline: None,
        }
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn PackObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<&'a Deadline>) -> Self {
        self.deadline = deadline;
        self
    }

    /// The same context without observer and deadline, for simulations.
    pub fn quiet(self) -> Self {
        Self {
            observer: None,
            deadline: None,
            ..self
        }
    }

    /// The same context without observer; the deadline still applies.
    pub fn unobserved(self) -> Self {
        Self {
            observer: None,
            ..self
        }
    }

    pub fn is_observed(&self) -> bool {
        self.observer.is_some()
    }

    /// Sends an event to the observer. The event is only built if someone listens.
    pub fn emit(&self, event: impl FnOnce() -> PackEvent) {
        if let Some(observer) = self.observer {
            observer.on_event(&event());
        }
    }

    pub fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) => deadline.check(),
            None => Ok(()),
        }
    }
}

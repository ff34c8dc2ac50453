//! Generation counters for discarding superseded hydrations
//!
//! A hydration takes a ticket before its first suspension point and commits
//! only if the ticket is still current. Starting a newer hydration, or
//! invalidating the target (closing or switching a conversation), moves the
//! generation on and turns every outstanding ticket stale.

use std::collections::HashMap;
use std::hash::Hash;

/// Outcome of a hydration that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// The fetched snapshot was merged into the store
    Applied,
    /// A newer hydration or an invalidation superseded this one; nothing changed
    Stale,
}

impl Hydration {
    /// Whether the snapshot was merged
    pub fn is_applied(self) -> bool {
        matches!(self, Hydration::Applied)
    }
}

/// Proof that a hydration started at a given generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    /// Generation number this ticket was issued at
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic generation counter for one hydration target
#[derive(Debug, Default, Clone)]
pub struct Generation {
    current: u64,
}

impl Generation {
    /// Start a new hydration, superseding any in flight
    pub fn begin(&mut self) -> Ticket {
        self.current += 1;
        Ticket(self.current)
    }

    /// Supersede in-flight hydrations without starting a new one
    pub fn invalidate(&mut self) {
        self.current += 1;
    }

    /// Whether `ticket` may still commit
    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.current
    }

    /// Current generation number
    pub fn current(&self) -> u64 {
        self.current
    }
}

/// One [`Generation`] per key
#[derive(Debug, Clone)]
pub struct KeyedGenerations<K> {
    generations: HashMap<K, Generation>,
}

impl<K: Eq + Hash + Clone> KeyedGenerations<K> {
    /// Create an empty set of counters
    pub fn new() -> Self {
        Self {
            generations: HashMap::new(),
        }
    }

    /// Start a hydration of `key`
    pub fn begin(&mut self, key: &K) -> Ticket {
        self.generations.entry(key.clone()).or_default().begin()
    }

    /// Supersede in-flight hydrations of `key`
    pub fn invalidate(&mut self, key: &K) {
        self.generations.entry(key.clone()).or_default().invalidate();
    }

    /// Ticket for the current generation of `key` without superseding anything
    pub fn peek(&mut self, key: &K) -> Ticket {
        Ticket(self.generations.entry(key.clone()).or_default().current())
    }

    /// Whether `ticket` may still commit to `key`
    pub fn is_current(&self, key: &K, ticket: Ticket) -> bool {
        self.generations
            .get(key)
            .map_or(ticket.0 == 0, |g| g.is_current(ticket))
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedGenerations<K> {
    fn default() -> Self {
        Self::new()
    }
}

//! Tracked Token Registry
//!
//! Token addresses the application is watching. Positions (tokens actually
//! held) are a subset of tracked tokens and get the longest cache TTLs.

use parking_lot::RwLock;
use std::collections::HashSet;

/// TTL multiplier for a token held as an active position
pub const POSITION_TTL_FACTOR: f64 = 2.0;

/// TTL multiplier for a token under passive observation
pub const TRACKED_TTL_FACTOR: f64 = 1.2;

/// How the registry classifies a token address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMembership {
    Position,
    Tracked,
    Untracked,
}

impl TokenMembership {
    pub fn ttl_factor(&self) -> f64 {
        match self {
            TokenMembership::Position => POSITION_TTL_FACTOR,
            TokenMembership::Tracked => TRACKED_TTL_FACTOR,
            TokenMembership::Untracked => 1.0,
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    tracked: HashSet<String>,
    positions: HashSet<String>,
}

/// Thread-safe set of tracked and position tokens
#[derive(Debug, Default)]
pub struct TrackedTokenRegistry {
    inner: RwLock<Registry>,
}

impl TrackedTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a token; `is_position` also marks it as held
    ///
    /// Registering an existing position again without `is_position` keeps it
    /// a position.
    pub fn register(&self, address: &str, is_position: bool) {
        let mut registry = self.inner.write();
        registry.tracked.insert(address.to_string());
        if is_position {
            registry.positions.insert(address.to_string());
        }
    }

    /// Forget a token entirely; returns whether it was known
    pub fn unregister(&self, address: &str) -> bool {
        let mut registry = self.inner.write();
        let was_tracked = registry.tracked.remove(address);
        let was_position = registry.positions.remove(address);
        was_tracked || was_position
    }

    pub fn membership(&self, address: &str) -> TokenMembership {
        let registry = self.inner.read();
        if registry.positions.contains(address) {
            TokenMembership::Position
        } else if registry.tracked.contains(address) {
            TokenMembership::Tracked
        } else {
            TokenMembership::Untracked
        }
    }

    pub fn is_position(&self, address: &str) -> bool {
        self.inner.read().positions.contains(address)
    }

    pub fn is_tracked(&self, address: &str) -> bool {
        let registry = self.inner.read();
        registry.tracked.contains(address) || registry.positions.contains(address)
    }

    /// Sorted tracked addresses (positions included)
    pub fn tracked(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.inner.read().tracked.iter().cloned().collect();
        tokens.sort();
        tokens
    }

    /// Sorted position addresses
    pub fn positions(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.inner.read().positions.iter().cloned().collect();
        tokens.sort();
        tokens
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.read().tracked.len()
    }

    pub fn position_count(&self) -> usize {
        self.inner.read().positions.len()
    }
}

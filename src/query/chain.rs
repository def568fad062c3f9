//! Resolution chain - the cycle guard for one top-level parse
//!
//! The chain is an ordinary value owned by the caller of a top-level parse
//! and passed down by `&mut` through every nested expansion. Entering a
//! saved query returns a [`ChainGuard`]; dropping the guard leaves it again,
//! so membership stays balanced on success, error and unwind alike.

use std::ops::{Deref, DerefMut};

/// Names of the saved queries currently being expanded, outermost first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolutionChain {
    names: Vec<String>,
}

impl ResolutionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a name is currently being expanded
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Number of active expansions
    pub fn depth(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Active names, outermost first
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Mark `name` as active until the returned guard is dropped.
    ///
    /// Callers check [`contains`](Self::contains) first; entering a name
    /// twice is a logic error caught in debug builds.
    pub fn enter(&mut self, name: &str) -> ChainGuard<'_> {
        debug_assert!(!self.contains(name), "{} entered twice", name);
        self.names.push(name.to_string());
        ChainGuard { chain: self }
    }
}

impl std::fmt::Display for ResolutionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.names.join(" -> "))
    }
}

/// Scoped membership of one name in a [`ResolutionChain`].
///
/// Derefs to the chain so nested expansions can keep threading it.
#[derive(Debug)]
pub struct ChainGuard<'c> {
    chain: &'c mut ResolutionChain,
}

impl Deref for ChainGuard<'_> {
    type Target = ResolutionChain;

    fn deref(&self) -> &ResolutionChain {
        self.chain
    }
}

impl DerefMut for ChainGuard<'_> {
    fn deref_mut(&mut self) -> &mut ResolutionChain {
        self.chain
    }
}

impl Drop for ChainGuard<'_> {
    fn drop(&mut self) {
        self.chain.names.pop();
    }
}

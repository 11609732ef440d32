//! Cross-registry checks over a frozen copy of the hub.
//!
//! The connection and channel registries lock independently, so their
//! agreement can only be judged between operations. Tests freeze the hub into
//! a [`HubSnapshot`] after each step and hand it to an [`InvariantRegistry`],
//! which reports every rule that broke rather than stopping at the first.
//!
//! ```ignore
//! let invariants = InvariantRegistry::standard();
//! invariants.assert_all(&HubSnapshot::from_hub(&hub), "after detach");
//! ```

use std::fmt;

mod checks;
mod snapshot;

pub use checks::{ChannelIndexConsistency, NoOrphanMembership, UserIndexConsistency};
pub use snapshot::HubSnapshot;

/// Outcome of a single check.
pub type InvariantResult = Result<(), Violation>;

/// A broken rule, tagged with the check that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Check that failed
    pub invariant: &'static str,
    /// The offending ids and what was expected of them
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// One rule relating the two registries.
pub trait Invariant: Send + Sync {
    /// Short name shown in failure output.
    fn name(&self) -> &'static str;

    /// Judge `state`. Report the first offending id found.
    fn check(&self, state: &HubSnapshot) -> InvariantResult;
}

/// Ordered set of rules run together against one snapshot.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// No rules yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The rules every hub must satisfy between operations: channel members
    /// are attached ([`NoOrphanMembership`]), the user index mirrors the
    /// connection records ([`UserIndexConsistency`]), and the forward and
    /// reverse membership indexes agree ([`ChannelIndexConsistency`]).
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(NoOrphanMembership);
        registry.add(UserIndexConsistency);
        registry.add(ChannelIndexConsistency);
        registry
    }

    /// Append a rule; rules run in insertion order.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Run every rule and collect all violations.
    pub fn check_all(&self, state: &HubSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> =
            self.invariants.iter().filter_map(|rule| rule.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Like [`check_all`](Self::check_all), but panics with every violation
    /// listed under `context`.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &HubSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let lines: Vec<String> = violations.iter().map(ToString::to_string).collect();
            panic!("hub invariants broken {context}:\n  {}", lines.join("\n  "));
        }
    }

    /// Names of the registered rules, in run order.
    pub fn names(&self) -> Vec<&'static str> {
        self.invariants.iter().map(|rule| rule.name()).collect()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Whether no rule is registered.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

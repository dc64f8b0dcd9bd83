//! Target binding: how a driver writes values, and how collisions between
//! drivers on the same property are detected.
//!
//! The core takes a capability interface: callers supply a setter closure
//! plus an explicit identity for conflict detection. Expression- or
//! reflection-style binding layers are adapters built on top; their failure
//! modes are modeled by [`BindingError`] so the engine can handle them
//! uniformly (log remediation guidance, self-destruct the driver).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the object a driver writes to. Two drivers collide only when
/// they share an owner and a slot; [`OwnerKey::None`] is the shared
/// "no target" sentinel that opts a driver out of target-conflict checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OwnerKey {
    /// No owner: never participates in target-conflict resolution.
    #[default]
    None,
    /// An opaque numeric identity (e.g. an entity id or a pointer cast).
    Key(u64),
    /// A string identity for hosts without stable numeric ids.
    Name(String),
}

impl OwnerKey {
    /// Whether this is the no-target sentinel.
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// The (owner, slot) pair used to detect that two drivers act on the same
/// property.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ConflictDomain {
    pub owner: OwnerKey,
    /// Member/slot descriptor within the owner, e.g. `"position.x"`.
    pub slot: String,
}

impl ConflictDomain {
    pub fn new(owner: OwnerKey, slot: impl Into<String>) -> Self {
        Self {
            owner,
            slot: slot.into(),
        }
    }

    /// The shared no-target domain.
    pub fn detached() -> Self {
        Self::default()
    }
}

impl fmt::Display for ConflictDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            OwnerKey::None => write!(f, "<detached>"),
            OwnerKey::Key(k) => write!(f, "#{k}.{}", self.slot),
            OwnerKey::Name(n) => write!(f, "{n}.{}", self.slot),
        }
    }
}

/// Failure modes of external binding adapters (expression parsing,
/// reflection). The core never produces these itself; it consumes them by
/// logging and marking the affected driver destroy-pending.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BindingError {
    /// The expression resolves to a value-type owner; writes would mutate a
    /// copy, which is unsupported.
    #[error(
        "target owner of '{member}' is a value type; drive a field of a \
         reference-typed owner, or supply an explicit setter closure"
    )]
    ValueTypeOwner { member: String },

    /// The expression's owner could not be resolved at all.
    #[error(
        "could not resolve the owner of '{path}'; make sure the owner \
         outlives the driver and is captured by the binding adapter, or \
         supply an explicit setter closure with a ConflictDomain"
    )]
    UnresolvedOwner { path: String },

    /// The expression is neither a field nor a property access.
    #[error("'{path}' is not a field or property access and cannot be driven")]
    UnsupportedMember { path: String },
}

/// A resolved binding: where values go, and the identity used for conflict
/// detection.
pub struct TargetBinding<T> {
    pub(crate) setter: Box<dyn FnMut(T)>,
    pub(crate) domain: ConflictDomain,
    pub(crate) broken: bool,
}

impl<T> TargetBinding<T> {
    /// Bind a setter under an explicit conflict domain.
    pub fn new(domain: ConflictDomain, setter: impl FnMut(T) + 'static) -> Self {
        Self {
            setter: Box::new(setter),
            domain,
            broken: false,
        }
    }

    /// Bind a setter with no conflict domain; the driver never collides
    /// with others on target.
    pub fn detached(setter: impl FnMut(T) + 'static) -> Self {
        Self::new(ConflictDomain::detached(), setter)
    }

    /// Collapse an external binding adapter's result. A failure is logged
    /// with its remediation guidance and yields a broken binding: a driver
    /// built over it is discarded at start without corrupting the live set.
    pub fn from_result(result: std::result::Result<Self, BindingError>) -> Self {
        match result {
            Ok(binding) => binding,
            Err(err) => {
                log::error!("target binding failed: {err}");
                let mut binding = Self::detached(|_| {});
                binding.broken = true;
                binding
            }
        }
    }

    /// The conflict domain this binding writes into.
    #[inline]
    pub fn domain(&self) -> &ConflictDomain {
        &self.domain
    }
}

impl<T> fmt::Debug for TargetBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetBinding")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn setter_receives_values() {
        let slot = Rc::new(Cell::new(0.0f64));
        let sink = Rc::clone(&slot);
        let mut binding = TargetBinding::detached(move |v| sink.set(v));
        (binding.setter)(3.5);
        assert_eq!(slot.get(), 3.5);
    }

    #[test]
    fn detached_domain_is_the_sentinel() {
        let binding = TargetBinding::detached(|_: f64| {});
        assert!(binding.domain().owner.is_none());
    }

    #[test]
    fn failed_binding_collapses_to_a_broken_one() {
        let result: Result<TargetBinding<f64>, BindingError> = Err(BindingError::UnresolvedOwner {
            path: "player.health".into(),
        });
        let binding = TargetBinding::from_result(result);
        assert!(binding.broken);
        assert!(binding.domain().owner.is_none());

        let binding = TargetBinding::from_result(Ok(TargetBinding::detached(|_: f64| {})));
        assert!(!binding.broken);
    }

    #[test]
    fn domains_compare_by_owner_and_slot() {
        let a = ConflictDomain::new(OwnerKey::Key(7), "position.x");
        let b = ConflictDomain::new(OwnerKey::Key(7), "position.x");
        let c = ConflictDomain::new(OwnerKey::Key(7), "position.y");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

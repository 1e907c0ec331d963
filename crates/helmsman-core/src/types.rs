//! Shared types used across Helmsman crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// ── Stacks, scopes, slots ─────────────────────────────────────────

/// One of the two parallel deployment slots used for blue/green rollout.
///
/// Serialized as the bare integer `0` or `1`, which is also the first
/// character of a weight identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StackIndex {
    Zero,
    One,
}

impl StackIndex {
    pub const ALL: [StackIndex; 2] = [StackIndex::Zero, StackIndex::One];

    /// The opposite stack.
    pub fn other(self) -> Self {
        match self {
            StackIndex::Zero => StackIndex::One,
            StackIndex::One => StackIndex::Zero,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            StackIndex::Zero => 0,
            StackIndex::One => 1,
        }
    }
}

impl TryFrom<u8> for StackIndex {
    type Error = CoreError;

    fn try_from(value: u8) -> CoreResult<Self> {
        match value {
            0 => Ok(StackIndex::Zero),
            1 => Ok(StackIndex::One),
            other => Err(CoreError::InvalidStackIndex(other)),
        }
    }
}

impl From<StackIndex> for u8 {
    fn from(stack: StackIndex) -> u8 {
        stack.as_u8()
    }
}

impl fmt::Display for StackIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Traffic classification of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Internal,
    External,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Internal, Scope::External];

    /// Single-character code used in weight identifiers.
    pub fn code(self) -> char {
        match self {
            Scope::Internal => 'i',
            Scope::External => 'e',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'i' => Some(Scope::Internal),
            'e' => Some(Scope::External),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Internal => f.write_str("internal"),
            Scope::External => f.write_str("external"),
        }
    }
}

/// Sub-identity within a stack/scope pair.
///
/// `Stable` ("b") keeps the traffic that stayed on the previously serving
/// fleet; `Canary` ("g") carries traffic to the fleet rolled out on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Slot {
    #[serde(rename = "b")]
    Stable,
    #[serde(rename = "g")]
    Canary,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Stable, Slot::Canary];

    /// Single-character code used in weight identifiers.
    pub fn code(self) -> char {
        match self {
            Slot::Stable => 'b',
            Slot::Canary => 'g',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'b' => Some(Slot::Stable),
            'g' => Some(Slot::Canary),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Slot::Stable => Slot::Canary,
            Slot::Canary => Slot::Stable,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ── Routes and domains ────────────────────────────────────────────

/// A DNS zone that routes can live under. Immutable for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub dns_zone_id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub certificate_arn: Option<String>,
}

fn default_true() -> bool {
    true
}

/// A fully-qualified route name together with its traffic scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub fqdn: String,
    pub scope: Scope,
}

impl Route {
    pub fn new(fqdn: &str, scope: Scope) -> Self {
        Self {
            fqdn: fqdn.trim_end_matches('.').to_string(),
            scope,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.fqdn, self.scope)
    }
}

/// Find the domain a route belongs to.
///
/// The longest domain name that is a label-aligned suffix of the route
/// wins, so `api.eu.example.com` prefers `eu.example.com` over
/// `example.com`.
pub fn resolve_domain<'a>(domains: &'a [Domain], fqdn: &str) -> CoreResult<&'a Domain> {
    let fqdn = fqdn.trim_end_matches('.');
    domains
        .iter()
        .filter(|d| {
            let name = d.name.trim_end_matches('.');
            fqdn == name
                || fqdn
                    .strip_suffix(name)
                    .is_some_and(|head| head.ends_with('.'))
        })
        .max_by_key(|d| d.name.trim_end_matches('.').len())
        .ok_or_else(|| CoreError::DomainNotFound {
            route: fqdn.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(id: &str, name: &str) -> Domain {
        Domain {
            id: id.to_string(),
            dns_zone_id: format!("zone-{id}"),
            name: name.to_string(),
            is_active: true,
            certificate_arn: None,
        }
    }

    fn test_domains() -> Vec<Domain> {
        vec![
            domain("privateId", "dream11-load.local"),
            domain("publicId", "d11load.com"),
        ]
    }

    #[test]
    fn resolves_route_to_matching_domain() {
        let domains = test_domains();
        let d = resolve_domain(&domains, "test-route.dream11-load.local").unwrap();
        assert_eq!(d.id, "privateId");
    }

    #[test]
    fn unknown_domain_is_not_found() {
        let domains = test_domains();
        let err = resolve_domain(&domains, "test-route.nonexistent.com").unwrap_err();
        assert!(matches!(err, CoreError::DomainNotFound { .. }));
    }

    #[test]
    fn longest_suffix_wins() {
        let domains = vec![domain("root", "example.com"), domain("eu", "eu.example.com")];
        assert_eq!(resolve_domain(&domains, "api.eu.example.com").unwrap().id, "eu");
        assert_eq!(resolve_domain(&domains, "api.us.example.com").unwrap().id, "root");
    }

    #[test]
    fn suffix_must_align_to_label() {
        let domains = vec![domain("short", "load.com")];
        assert!(resolve_domain(&domains, "api.d11load.com").is_err());
        assert!(resolve_domain(&domains, "api.load.com.").is_ok());
    }

    #[test]
    fn stack_index_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&StackIndex::One).unwrap(), "1");
        let back: StackIndex = serde_json::from_str("0").unwrap();
        assert_eq!(back, StackIndex::Zero);
        assert!(serde_json::from_str::<StackIndex>("2").is_err());
    }

    #[test]
    fn codes_roundtrip() {
        for scope in Scope::ALL {
            assert_eq!(Scope::from_code(scope.code()), Some(scope));
        }
        for slot in Slot::ALL {
            assert_eq!(Slot::from_code(slot.code()), Some(slot));
        }
        assert_eq!(StackIndex::Zero.other(), StackIndex::One);
        assert_eq!(Slot::Stable.other(), Slot::Canary);
    }
}

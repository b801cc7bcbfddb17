use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Upper bound on tenant and discriminator length
pub const MAX_COMPONENT_LEN: usize = 256;

const KEY_PREFIX: &str = "t";

/// Kind of room a key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomScope {
    /// Per end-user conversation channel
    User,
    /// Per operator notification channel
    Agent,
    /// Per work-queue aggregate channel
    Queue,
    /// Tenant-wide broadcast channel
    Tenant,
}

impl RoomScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomScope::User => "user",
            RoomScope::Agent => "agent",
            RoomScope::Queue => "queue",
            RoomScope::Tenant => "tenant",
        }
    }

    fn segment(&self) -> &'static str {
        match self {
            RoomScope::Tenant => "global",
            other => other.as_str(),
        }
    }

    pub fn requires_discriminator(&self) -> bool {
        !matches!(self, RoomScope::Tenant)
    }
}

impl FromStr for RoomScope {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(RoomScope::User),
            "agent" => Ok(RoomScope::Agent),
            "queue" => Ok(RoomScope::Queue),
            "tenant" => Ok(RoomScope::Tenant),
            other => Err(RelayError::InvalidTarget(format!("unknown scope: {}", other))),
        }
    }
}

impl fmt::Display for RoomScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical, tenant-scoped room identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    canonical: String,
    tenant: String,
    scope: RoomScope,
    discriminator: Option<String>,
}

impl RoomKey {
    pub fn user(tenant: &str, user_id: &str) -> Result<Self, RelayError> {
        Self::derive(tenant, RoomScope::User, Some(user_id))
    }

    pub fn agent(tenant: &str, principal: &str) -> Result<Self, RelayError> {
        Self::derive(tenant, RoomScope::Agent, Some(principal))
    }

    pub fn queue(tenant: &str, queue: &str) -> Result<Self, RelayError> {
        Self::derive(tenant, RoomScope::Queue, Some(queue))
    }

    pub fn tenant(tenant: &str) -> Result<Self, RelayError> {
        Self::derive(tenant, RoomScope::Tenant, None)
    }

    /// Derive the key for `(tenant, scope, discriminator)`.
    ///
    /// Tenant rooms take no discriminator; every other scope requires one.
    pub fn derive(
        tenant: &str,
        scope: RoomScope,
        discriminator: Option<&str>,
    ) -> Result<Self, RelayError> {
        validate_component("tenant", tenant)?;

        let mut canonical = format!("{}:{}:{}", KEY_PREFIX, escape(tenant), scope.segment());

        match (scope.requires_discriminator(), discriminator) {
            (true, Some(d)) => {
                validate_component("discriminator", d)?;
                canonical.push(':');
                canonical.push_str(&escape(d));
            }
            (true, None) => {
                return Err(RelayError::InvalidTarget(format!(
                    "{} scope requires a discriminator",
                    scope
                )));
            }
            (false, Some(_)) => {
                return Err(RelayError::InvalidTarget(format!(
                    "{} scope takes no discriminator",
                    scope
                )));
            }
            (false, None) => {}
        }

        Ok(Self {
            canonical,
            tenant: tenant.to_string(),
            scope,
            discriminator: discriminator.map(String::from),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Tenant embedded in this key
    pub fn tenant_id(&self) -> &str {
        &self.tenant
    }

    pub fn scope(&self) -> RoomScope {
        self.scope
    }

    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    pub fn to_target(&self) -> RoomTarget {
        RoomTarget::new(self.tenant.clone(), self.scope, self.discriminator.clone())
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// A requested routing target, as submitted by a producer or a joining client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTarget {
    pub tenant_id: String,
    pub scope: RoomScope,
    #[serde(default)]
    pub discriminator: Option<String>,
}

impl RoomTarget {
    pub fn new(
        tenant_id: impl Into<String>,
        scope: RoomScope,
        discriminator: Option<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            scope,
            discriminator,
        }
    }

    pub fn resolve(&self) -> Result<RoomKey, RelayError> {
        RoomKey::derive(&self.tenant_id, self.scope, self.discriminator.as_deref())
    }
}

fn validate_component(what: &str, value: &str) -> Result<(), RelayError> {
    if value.is_empty() {
        return Err(RelayError::InvalidTarget(format!("{} is empty", what)));
    }
    if value.len() > MAX_COMPONENT_LEN {
        return Err(RelayError::InvalidTarget(format!(
            "{} exceeds {} bytes",
            what, MAX_COMPONENT_LEN
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(RelayError::InvalidTarget(format!(
            "{} contains control characters",
            what
        )));
    }
    Ok(())
}

fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_canonical_forms() {
        assert_eq!(RoomKey::user("acme", "U1").unwrap().as_str(), "t:acme:user:U1");
        assert_eq!(
            RoomKey::agent("acme", "ana@acme.com").unwrap().as_str(),
            "t:acme:agent:ana@acme.com"
        );
        assert_eq!(RoomKey::queue("acme", "Sales").unwrap().as_str(), "t:acme:queue:Sales");
        assert_eq!(RoomKey::tenant("acme").unwrap().as_str(), "t:acme:global");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            RoomKey::user("acme", "U1").unwrap(),
            RoomKey::user("acme", "U1").unwrap()
        );
    }

    #[test]
    fn test_tenants_never_collide() {
        let tenants = ["acme", "beta", "acme:user", "acme%3Auser", "a", "a:b"];
        let discs = ["U1", "user:U1", "global", "x:y:z", "%3A"];
        let mut seen = std::collections::HashSet::new();
        for t in tenants {
            for d in discs {
                for scope in [RoomScope::User, RoomScope::Agent, RoomScope::Queue] {
                    let key = RoomKey::derive(t, scope, Some(d)).unwrap();
                    assert!(seen.insert(key.as_str().to_string()), "collision: {}", key);
                }
            }
            let key = RoomKey::tenant(t).unwrap();
            assert!(seen.insert(key.as_str().to_string()), "collision: {}", key);
        }
    }

    #[test]
    fn test_delimiter_cannot_forge_other_room() {
        // tenant "acme:user" + queue room must not alias tenant "acme" user room
        let forged = RoomKey::queue("acme", "x:user:U1").unwrap();
        let real = RoomKey::user("acme", "U1").unwrap();
        assert_ne!(forged, real);

        let forged = RoomKey::user("acme:global", "x").unwrap();
        assert_ne!(forged.as_str(), RoomKey::tenant("acme").unwrap().as_str());
        assert!(!forged.as_str().starts_with("t:acme:"));
    }

    #[test]
    fn test_escape_is_injective_on_percent() {
        let a = RoomKey::user("acme", "%3A").unwrap();
        let b = RoomKey::user("acme", ":").unwrap();
        assert_ne!(a, b);
        assert_eq!(b.as_str(), "t:acme:user:%3A");
        assert_eq!(a.as_str(), "t:acme:user:%253A");
    }

    #[test]
    fn test_malformed_targets_rejected() {
        assert!(matches!(RoomKey::user("", "U1"), Err(RelayError::InvalidTarget(_))));
        assert!(matches!(RoomKey::user("acme", ""), Err(RelayError::InvalidTarget(_))));
        assert!(matches!(
            RoomKey::derive("acme", RoomScope::User, None),
            Err(RelayError::InvalidTarget(_))
        ));
        assert!(matches!(
            RoomKey::derive("acme", RoomScope::Tenant, Some("x")),
            Err(RelayError::InvalidTarget(_))
        ));
        assert_err!(RoomKey::user("acme", "bad\nid"));
        assert_err!(RoomKey::user("acme", &"u".repeat(MAX_COMPONENT_LEN + 1)));
        assert_ok!(RoomKey::user("acme", &"u".repeat(MAX_COMPONENT_LEN)));
    }

    #[test]
    fn test_key_carries_tenant() {
        let key = RoomTarget::new("acme", RoomScope::Queue, Some("Sales".into()))
            .resolve()
            .unwrap();
        assert_eq!(key.tenant_id(), "acme");
        assert_eq!(key.scope(), RoomScope::Queue);
        assert_eq!(key.to_target().resolve().unwrap(), key);
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("agent".parse::<RoomScope>().unwrap(), RoomScope::Agent);
        assert!(matches!(
            "fila".parse::<RoomScope>(),
            Err(RelayError::InvalidTarget(_))
        ));
    }
}

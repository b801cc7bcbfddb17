use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role name granting event-injection rights
pub const WORKER_ROLE: &str = "worker";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Granted roles
    #[serde(default)]
    pub roles: Vec<String>,
    /// Tenant the token is bound to
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Operator email, used as the agent principal
    #[serde(default)]
    pub email: Option<String>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref().filter(|t| !t.is_empty())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Worker grant: the worker role plus a concrete tenant binding
    pub fn is_worker(&self) -> bool {
        self.has_role(WORKER_ROLE) && self.tenant_id().is_some()
    }

    /// Principal identifier: email when present, subject otherwise
    pub fn principal(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(roles: &[&str], tenant: Option<&str>) -> Claims {
        Claims {
            sub: "svc-1".to_string(),
            exp: 0,
            iat: 0,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            tenant_id: tenant.map(String::from),
            email: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_worker_requires_tenant() {
        assert!(claims(&["worker"], Some("acme")).is_worker());
        assert!(!claims(&["worker"], None).is_worker());
        assert!(!claims(&["worker"], Some("")).is_worker());
        assert!(!claims(&["agent"], Some("acme")).is_worker());
    }

    #[test]
    fn test_principal_prefers_email() {
        let mut c = claims(&[], Some("acme"));
        assert_eq!(c.principal(), "svc-1");
        c.email = Some("ana@acme.com".to_string());
        assert_eq!(c.principal(), "ana@acme.com");
    }
}

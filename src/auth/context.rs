use serde::Serialize;

/// Role bound to a connection or ingress call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Anonymous,
    Client,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Anonymous => "anonymous",
            Role::Client => "client",
            Role::Worker => "worker",
        }
    }
}

/// Identity derived once per connection or per HTTP ingress call.
///
/// Immutable after creation: there are no setters, so the tenant binding and
/// role hold for the lifetime of whatever owns the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    tenant_id: String,
    role: Role,
    principal: Option<String>,
}

impl AuthContext {
    pub fn new(tenant_id: impl Into<String>, role: Role, principal: Option<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            role,
            principal,
        }
    }

    pub fn anonymous(tenant_id: impl Into<String>) -> Self {
        Self::new(tenant_id, Role::Anonymous, None)
    }

    pub fn worker(tenant_id: impl Into<String>) -> Self {
        Self::new(tenant_id, Role::Worker, None)
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn is_worker(&self) -> bool {
        self.role == Role::Worker
    }
}

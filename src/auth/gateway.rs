use crate::config::{AuthMode, Settings};
use crate::error::RelayError;
use crate::room::RoomKey;

use super::{AuthContext, JwtValidator, Role};

/// Derives an [`AuthContext`] from inbound credentials.
///
/// Live connections go through [`AuthGateway::authenticate_connection`], HTTP
/// ingress through [`AuthGateway::authenticate_ingress`]. The auth mode is
/// fixed at construction.
pub struct AuthGateway {
    validator: JwtValidator,
    mode: AuthMode,
    anonymous_tenant: bool,
    emit_secret: Option<String>,
}

impl AuthGateway {
    pub fn new(settings: &Settings) -> Self {
        Self {
            validator: JwtValidator::new(&settings.jwt),
            mode: settings.auth.mode,
            anonymous_tenant: settings.auth.anonymous,
            emit_secret: settings.emit.secret.clone().filter(|s| !s.is_empty()),
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Whether anonymous connections may declare their own tenant
    pub fn allows_anonymous_tenant(&self) -> bool {
        self.anonymous_tenant || self.mode == AuthMode::Disabled
    }

    /// Authenticate a live connection at accept time.
    ///
    /// `Ok(None)` means the connection is anonymous and not yet bound to a
    /// tenant; it holds no room privileges until a tenant is bound. A present
    /// but invalid token is always an error, never an anonymous downgrade.
    pub fn authenticate_connection(
        &self,
        token: Option<&str>,
        declared_tenant: Option<&str>,
    ) -> Result<Option<AuthContext>, RelayError> {
        let token = match self.mode {
            AuthMode::Disabled => None,
            _ => token,
        };

        match token {
            Some(token) => self.authenticate_token(token).map(Some),
            None if self.mode == AuthMode::Required => {
                Err(RelayError::AuthFailed("missing token".to_string()))
            }
            None => match declared_tenant {
                Some(tenant) => self.bind_anonymous(tenant).map(Some),
                None => Ok(None),
            },
        }
    }

    /// Bind an anonymous connection to a self-declared tenant.
    ///
    /// Only honored when anonymous tenant binding is enabled for the deployment.
    pub fn bind_anonymous(&self, tenant: &str) -> Result<AuthContext, RelayError> {
        if !self.allows_anonymous_tenant() {
            return Err(RelayError::AuthFailed(
                "anonymous tenant binding is not enabled".to_string(),
            ));
        }
        RoomKey::tenant(tenant)
            .map_err(|_| RelayError::AuthFailed("invalid tenant declaration".to_string()))?;
        Ok(AuthContext::anonymous(tenant))
    }

    fn authenticate_token(&self, token: &str) -> Result<AuthContext, RelayError> {
        let claims = self.validator.validate(token)?;

        let tenant = claims
            .tenant_id()
            .ok_or_else(|| RelayError::AuthFailed("token carries no tenant".to_string()))?;

        let role = if claims.is_worker() {
            Role::Worker
        } else {
            Role::Client
        };

        Ok(AuthContext::new(
            tenant,
            role,
            Some(claims.principal().to_string()),
        ))
    }

    /// Authenticate an HTTP ingress call by its static bearer secret.
    ///
    /// A matching secret yields a worker context bound to `tenant`, the tenant
    /// the caller declared for itself.
    pub fn authenticate_ingress(
        &self,
        bearer: Option<&str>,
        tenant: &str,
    ) -> Result<AuthContext, RelayError> {
        let expected = self
            .emit_secret
            .as_deref()
            .ok_or_else(|| RelayError::AuthFailed("ingress secret not configured".to_string()))?;

        match bearer {
            Some(provided) if constant_time_eq(provided.as_bytes(), expected.as_bytes()) => {
                Ok(AuthContext::worker(tenant))
            }
            Some(_) => Err(RelayError::AuthFailed("invalid bearer secret".to_string())),
            None => Err(RelayError::AuthFailed("missing bearer secret".to_string())),
        }
    }

    /// Check the bearer secret alone, before any request body is read
    pub fn verify_ingress_secret(&self, bearer: Option<&str>) -> Result<(), RelayError> {
        self.authenticate_ingress(bearer, "").map(|_| ())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

//! Authentication: token verification and the per-connection / per-request
//! [`AuthContext`] derived from it.

mod claims;
mod context;
mod gateway;
mod jwt;

pub use claims::{Claims, WORKER_ROLE};
pub use context::{AuthContext, Role};
pub use gateway::AuthGateway;
pub use jwt::JwtValidator;

//! Room identifiers.
//!
//! Every room is scoped by tenant. Keys are derived deterministically from
//! `(tenant, scope, discriminator)` and have the canonical form
//! `t:<tenant>:<scope>[:<discriminator>]`, with `%` and `:` percent-escaped in
//! the tenant and discriminator so that no input can alias another room.

mod key;

pub use key::{RoomKey, RoomScope, RoomTarget, MAX_COMPONENT_LEN};

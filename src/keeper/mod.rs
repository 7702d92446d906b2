//! SPIKE Keeper: holds a replica of the root key for Nexus to recover from.
//!
//! Exposes two endpoints, both restricted to trusted Nexus identities:
//! - `POST /key` overwrites the held key
//! - `GET /key` returns the held key, or an empty string

pub mod custody;
pub mod routes;

pub use custody::KeeperCustody;
pub use routes::{keeper_router, KeeperState};

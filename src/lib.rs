pub mod audit;
pub mod config;
pub mod error;
pub mod keeper;
pub mod key;
pub mod nexus;
pub mod transport;

pub use config::{KeeperConfig, NexusConfig};
pub use error::{ApiError, AppError, AppResult};
pub use key::{RootKey, VersionedRootKey};

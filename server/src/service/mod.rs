pub mod config;
pub mod handle;

pub use config::{ServerConfig, StoreBackend};
pub use handle::SpecService;

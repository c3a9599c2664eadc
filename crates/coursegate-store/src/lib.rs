//! coursegate-store: Storage backends and service wiring.
//!
//! Implements `ProgressStore` and `UserDirectory` in memory and as a JSON
//! state file, loads `coursegate.toml`, and builds a ready `GatingService`.

pub mod config;
pub mod file;
pub mod memory;

pub use config::{build_service, create_backend, load_config, Backend, CoursegateConfig, StorageConfig};
pub use file::FileStore;
pub use memory::MemoryStore;

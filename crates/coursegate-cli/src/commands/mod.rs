//! Command implementations.

pub mod admin;
pub mod attempt;
pub mod gate;
pub mod init;
pub mod progress;
pub mod request;
pub mod tier;
pub mod validate;

use anyhow::Result;

use coursegate_core::api::{self, ApiRequest, ApiResponse};
use coursegate_core::engine::GatingService;
use coursegate_store::config::load_config_from;
use coursegate_store::{build_service, CoursegateConfig, StorageConfig};

use crate::GlobalArgs;

/// Load the config and apply command-line overrides.
pub fn settings(global: &GlobalArgs) -> Result<CoursegateConfig> {
    let mut config = load_config_from(global.config.as_deref())?;
    if let Some(dir) = &global.courses {
        config.catalog_dir = dir.clone();
    }
    if let Some(path) = &global.state {
        config.storage = StorageConfig::File { path: path.clone() };
    }
    Ok(config)
}

pub fn service(global: &GlobalArgs) -> Result<GatingService> {
    build_service(&settings(global)?)
}

/// Run one request against a freshly built service and print the envelope.
pub async fn dispatch(global: &GlobalArgs, request: ApiRequest) -> Result<()> {
    let service = service(global)?;
    let response = api::handle(&service, request).await;
    emit(&response)
}

/// Print an envelope; unsuccessful responses exit with status 1.
pub fn emit(response: &ApiResponse) -> Result<()> {
    println!("{}", response.to_json_pretty()?);
    if !response.success {
        tracing::debug!("request failed with status {}", response.status);
        std::process::exit(1);
    }
    Ok(())
}

//! The `coursegate request` command.

use std::io::Read;

use anyhow::{Context, Result};

use coursegate_core::api;

use crate::GlobalArgs;

pub async fn execute(global: &GlobalArgs, body: Option<String>) -> Result<()> {
    let body = match body.as_deref() {
        Some("-") | None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
        Some(body) => body.to_string(),
    };

    let service = super::service(global)?;
    let response = api::handle_json(&service, &body).await;
    super::emit(&response)
}

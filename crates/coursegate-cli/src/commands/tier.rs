//! The `coursegate tier` command.

use anyhow::Result;

use coursegate_core::api::{ApiResponse, TierPayload};

pub fn execute(score: f64) -> Result<()> {
    super::emit(&ApiResponse::ok(&TierPayload::for_score(score)))
}

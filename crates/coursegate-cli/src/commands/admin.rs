//! Administrative commands: reset, force-complete, abandon, skill and users.

use anyhow::Result;

use coursegate_core::api::{ApiRequest, ApiResponse};
use coursegate_core::engine::MAX_SKILL_OVERRIDE;
use coursegate_core::skill::MIN_SKILL;
use coursegate_store::create_backend;

use crate::GlobalArgs;

pub async fn reset(global: &GlobalArgs, user_id: String, course_id: String) -> Result<()> {
    super::dispatch(global, ApiRequest::ResetProgress { user_id, course_id }).await
}

pub async fn force_complete(global: &GlobalArgs, user_id: String, course_id: String) -> Result<()> {
    super::dispatch(global, ApiRequest::ForceComplete { user_id, course_id }).await
}

pub async fn abandon(global: &GlobalArgs, user_id: String, course_id: String) -> Result<()> {
    super::dispatch(global, ApiRequest::Abandon { user_id, course_id }).await
}

pub async fn get_skill(global: &GlobalArgs, user_id: String) -> Result<()> {
    super::dispatch(global, ApiRequest::GetSkill { user_id }).await
}

pub async fn set_skill(global: &GlobalArgs, user_id: String, value: f64) -> Result<()> {
    super::dispatch(global, ApiRequest::SetSkill { user_id, value }).await
}

/// Create a user in the configured user directory.
pub async fn add_user(global: &GlobalArgs, user_id: String, skill: Option<f64>) -> Result<()> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return super::emit(&ApiResponse::error(400, "invalid request: user_id is required"));
    }
    if let Some(value) = skill {
        if !(MIN_SKILL..=MAX_SKILL_OVERRIDE).contains(&value) {
            return super::emit(&ApiResponse::error(
                400,
                format!("invalid request: skill must be between {MIN_SKILL} and {MAX_SKILL_OVERRIDE}"),
            ));
        }
    }

    let backend = create_backend(&super::settings(global)?.storage)?;
    let user = backend.users.upsert_user(user_id, skill).await?;
    tracing::info!("user {user_id} saved");
    super::emit(&ApiResponse::ok(&user))
}

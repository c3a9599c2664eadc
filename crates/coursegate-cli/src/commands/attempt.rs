//! The `complete-module` and `complete-final` commands.

use anyhow::Result;

use coursegate_core::api::ApiRequest;

use crate::GlobalArgs;

pub async fn module(
    global: &GlobalArgs,
    user_id: String,
    course_id: String,
    module_index: usize,
    score: f64,
    lockout_minutes: Option<u32>,
) -> Result<()> {
    super::dispatch(
        global,
        ApiRequest::CompleteModule {
            user_id,
            course_id,
            module_index,
            score,
            lockout_minutes,
        },
    )
    .await
}

pub async fn final_evaluation(
    global: &GlobalArgs,
    user_id: String,
    course_id: String,
    score: f64,
    lockout_minutes: Option<u32>,
) -> Result<()> {
    super::dispatch(
        global,
        ApiRequest::CompleteFinal {
            user_id,
            course_id,
            score,
            lockout_minutes,
        },
    )
    .await
}

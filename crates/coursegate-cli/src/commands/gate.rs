//! The `can-take-final` and `check-lock` commands.

use anyhow::Result;

use coursegate_core::api::{ApiRequest, LockScope};

use crate::GlobalArgs;

pub async fn can_take_final(
    global: &GlobalArgs,
    user_id: String,
    course_id: String,
    total_modules: Option<usize>,
) -> Result<()> {
    super::dispatch(
        global,
        ApiRequest::CanTakeFinal {
            user_id,
            course_id,
            total_modules,
        },
    )
    .await
}

pub async fn check_lock(
    global: &GlobalArgs,
    user_id: String,
    course_id: String,
    module_index: Option<usize>,
    final_eval: bool,
) -> Result<()> {
    let scope = if final_eval {
        LockScope::Final
    } else {
        LockScope::Module
    };
    super::dispatch(
        global,
        ApiRequest::CheckLock {
            user_id,
            course_id,
            scope,
            module_index,
        },
    )
    .await
}

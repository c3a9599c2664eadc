//! JSON request/response surface.
//!
//! Every operation takes a tagged request (`"op"` field) and answers with an
//! envelope `{ "success": bool, ...payload, "error"?: string }` plus an
//! HTTP-style status kept out of the JSON body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::GatingService;
use crate::error::GateError;
use crate::model::{EvaluationScope, ProgressRecord};
use crate::tiering::{tier_for, Tier};

/// Scope selector for lock checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockScope {
    Module,
    Final,
}

/// An operation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    Progress {
        user_id: String,
        course_id: String,
    },
    ListProgress {
        user_id: String,
    },
    RecordContentViewed {
        user_id: String,
        course_id: String,
        module_index: usize,
        content_index: usize,
    },
    CompleteModule {
        user_id: String,
        course_id: String,
        module_index: usize,
        score: f64,
        #[serde(default)]
        lockout_minutes: Option<u32>,
    },
    CompleteFinal {
        user_id: String,
        course_id: String,
        score: f64,
        #[serde(default)]
        lockout_minutes: Option<u32>,
    },
    CanTakeFinal {
        user_id: String,
        course_id: String,
        #[serde(default)]
        total_modules: Option<usize>,
    },
    CheckLock {
        user_id: String,
        course_id: String,
        scope: LockScope,
        #[serde(default)]
        module_index: Option<usize>,
    },
    ResetProgress {
        user_id: String,
        course_id: String,
    },
    ForceComplete {
        user_id: String,
        course_id: String,
    },
    Abandon {
        user_id: String,
        course_id: String,
    },
    GetSkill {
        user_id: String,
    },
    SetSkill {
        user_id: String,
        value: f64,
    },
    Tier {
        score: f64,
    },
}

/// Response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    /// HTTP-style status code.
    #[serde(skip)]
    pub status: u16,
    pub success: bool,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct ProgressPayload {
    progress: Option<ProgressRecord>,
}

#[derive(Serialize)]
struct ProgressListPayload {
    user_id: String,
    progress: Vec<ProgressRecord>,
}

/// Tier lookup result.
#[derive(Debug, Serialize)]
pub struct TierPayload {
    pub score: f64,
    pub tier: Tier,
}

impl TierPayload {
    pub fn for_score(score: f64) -> Self {
        Self {
            score,
            tier: tier_for(score),
        }
    }
}

impl ApiResponse {
    /// Successful response; object payloads are flattened into the envelope,
    /// anything else goes under `data`.
    pub fn ok<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => Self {
                status: 200,
                success: true,
                payload: map,
                error: None,
            },
            Ok(other) => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                Self {
                    status: 200,
                    success: true,
                    payload: map,
                    error: None,
                }
            }
            Err(e) => Self::error(500, format!("failed to encode response: {e}")),
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            success: false,
            payload: Map::new(),
            error: Some(message.into()),
        }
    }

    pub fn from_error(err: &GateError) -> Self {
        Self::error(err.status_code(), err.to_string())
    }

    fn from_result<T: Serialize>(result: Result<T, GateError>) -> Self {
        match result {
            Ok(payload) => Self::ok(&payload),
            Err(e) => {
                if e.is_client_error() {
                    tracing::debug!("request rejected: {e}");
                } else {
                    tracing::error!("request failed: {e}");
                }
                Self::from_error(&e)
            }
        }
    }

    /// Pretty-printed JSON body.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Look up a payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }
}

/// Parse a JSON request body and dispatch it.
pub async fn handle_json(service: &GatingService, body: &str) -> ApiResponse {
    match serde_json::from_str::<ApiRequest>(body) {
        Ok(request) => handle(service, request).await,
        Err(e) => ApiResponse::error(400, format!("invalid request: {e}")),
    }
}

/// Dispatch a typed request to the gating service.
pub async fn handle(service: &GatingService, request: ApiRequest) -> ApiResponse {
    match request {
        ApiRequest::Progress { user_id, course_id } => ApiResponse::from_result(
            service
                .progress(&user_id, &course_id)
                .await
                .map(|progress| ProgressPayload { progress }),
        ),
        ApiRequest::ListProgress { user_id } => ApiResponse::from_result(
            service
                .list_progress(&user_id)
                .await
                .map(|progress| ProgressListPayload { user_id, progress }),
        ),
        ApiRequest::RecordContentViewed {
            user_id,
            course_id,
            module_index,
            content_index,
        } => ApiResponse::from_result(
            service
                .record_content_viewed(&user_id, &course_id, module_index, content_index)
                .await
                .map(|record| ProgressPayload {
                    progress: Some(record),
                }),
        ),
        ApiRequest::CompleteModule {
            user_id,
            course_id,
            module_index,
            score,
            lockout_minutes,
        } => ApiResponse::from_result(
            service
                .complete_module(&user_id, &course_id, module_index, score, lockout_minutes)
                .await,
        ),
        ApiRequest::CompleteFinal {
            user_id,
            course_id,
            score,
            lockout_minutes,
        } => ApiResponse::from_result(
            service
                .complete_final(&user_id, &course_id, score, lockout_minutes)
                .await,
        ),
        ApiRequest::CanTakeFinal {
            user_id,
            course_id,
            total_modules,
        } => ApiResponse::from_result(
            service
                .can_take_final(&user_id, &course_id, total_modules)
                .await,
        ),
        ApiRequest::CheckLock {
            user_id,
            course_id,
            scope,
            module_index,
        } => {
            let scope = match (scope, module_index) {
                (LockScope::Final, _) => EvaluationScope::Final,
                (LockScope::Module, Some(i)) => EvaluationScope::Module(i),
                (LockScope::Module, None) => {
                    return ApiResponse::from_error(&GateError::Validation(
                        "module_index is required for module scope".into(),
                    ))
                }
            };
            ApiResponse::from_result(service.check_lock(&user_id, &course_id, scope).await)
        }
        ApiRequest::ResetProgress { user_id, course_id } => ApiResponse::from_result(
            service
                .reset_progress(&user_id, &course_id)
                .await
                .map(|progress| ProgressPayload { progress }),
        ),
        ApiRequest::ForceComplete { user_id, course_id } => ApiResponse::from_result(
            service
                .force_complete(&user_id, &course_id)
                .await
                .map(|record| ProgressPayload {
                    progress: Some(record),
                }),
        ),
        ApiRequest::Abandon { user_id, course_id } => ApiResponse::from_result(
            service
                .abandon(&user_id, &course_id)
                .await
                .map(|progress| ProgressPayload { progress }),
        ),
        ApiRequest::GetSkill { user_id } => ApiResponse::from_result(service.skill(&user_id).await),
        ApiRequest::SetSkill { user_id, value } => {
            ApiResponse::from_result(service.set_skill(&user_id, value).await)
        }
        ApiRequest::Tier { score } => ApiResponse::ok(&TierPayload::for_score(score)),
    }
}

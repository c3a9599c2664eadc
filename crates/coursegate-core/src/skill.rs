//! Skill adjustment after graded evaluations.
//!
//! `skill_delta` is the pure rule table; `SkillAdjuster` applies it to a user
//! through the [`UserDirectory`] and decides whether the change is worth
//! persisting.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::Level;
use crate::traits::UserDirectory;

/// Lowest skill value.
pub const MIN_SKILL: f64 = 1.0;
/// Highest skill value.
pub const MAX_SKILL: f64 = 5.0;
/// Smallest change that gets written back.
pub const PERSIST_THRESHOLD: f64 = 0.1;

const FINAL_BONUS: f64 = 0.2;
const FINAL_FAILURE_PENALTY: f64 = 0.5;
const ADVANCED_FAILURE_PENALTY: f64 = 0.3;

/// What kind of evaluation produced the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationKind {
    Module,
    Final,
}

/// Outcome of a skill adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillAdjustment {
    pub user_id: String,
    /// Skill before the adjustment (1 if it was unset).
    pub previous: f64,
    /// Reported skill: the persisted rounded value, or `previous` untouched.
    pub value: f64,
    /// Change applied after clamping.
    pub delta: f64,
    pub persisted: bool,
}

/// Skill ceiling up to which a course of this level can raise the skill.
pub fn level_ceiling(level: Level) -> f64 {
    match level {
        Level::Basic => 3.0,
        Level::Intermediate => 4.0,
        Level::Advanced => 5.0,
    }
}

/// Raw skill change for one graded result, before clamping.
pub fn skill_delta(current: f64, level: Level, score: f64, kind: EvaluationKind) -> f64 {
    let mut delta = 0.0;

    if current < level_ceiling(level) {
        delta += match (level, score) {
            (Level::Advanced, s) if s >= 90.0 => 0.5,
            (Level::Intermediate, s) if s >= 90.0 => 0.4,
            (Level::Basic, s) if s >= 90.0 => 0.3,
            (Level::Advanced, s) if s >= 80.0 => 0.3,
            (Level::Intermediate, s) if s >= 80.0 => 0.2,
            (Level::Basic, s) if s >= 80.0 => 0.15,
            (Level::Advanced, s) if s >= 70.0 => 0.2,
            (Level::Intermediate, s) if s >= 70.0 => 0.1,
            _ => 0.0,
        };
    }

    if score < 60.0 {
        if kind == EvaluationKind::Final {
            delta -= FINAL_FAILURE_PENALTY;
        } else if level == Level::Advanced && current > 3.0 {
            delta -= ADVANCED_FAILURE_PENALTY;
        }
    }

    if kind == EvaluationKind::Final && score >= 80.0 {
        delta += FINAL_BONUS;
    }

    delta
}

/// Round to one decimal place.
pub fn round_skill(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Applies skill rules against a user directory.
#[derive(Clone)]
pub struct SkillAdjuster {
    users: Arc<dyn UserDirectory>,
}

impl SkillAdjuster {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    /// Adjust a user's skill after a graded evaluation.
    ///
    /// Returns `Ok(None)` when the user does not exist. At most one write is
    /// issued, and only when the clamped change reaches [`PERSIST_THRESHOLD`].
    pub async fn adjust(
        &self,
        user_id: &str,
        level: Level,
        score: f64,
        kind: EvaluationKind,
    ) -> Result<Option<SkillAdjustment>, StoreError> {
        let Some(user) = self.users.user(user_id).await? else {
            tracing::debug!("skill adjustment skipped, unknown user {user_id}");
            return Ok(None);
        };

        let current = user.skill.unwrap_or(MIN_SKILL);
        let raw = skill_delta(current, level, score, kind);
        let next = (current + raw).clamp(MIN_SKILL, MAX_SKILL);
        let applied = next - current;

        // Tolerate float noise such as 0.1 - 1e-16.
        if applied.abs() + 1e-9 < PERSIST_THRESHOLD {
            return Ok(Some(SkillAdjustment {
                user_id: user_id.to_string(),
                previous: current,
                value: current,
                delta: 0.0,
                persisted: false,
            }));
        }

        let value = round_skill(next);
        if !self.users.set_skill(user_id, value).await? {
            // User vanished between read and write.
            return Ok(None);
        }
        tracing::info!(
            "skill for {user_id}: {current:.2} -> {value:.1} ({kind:?}, {level}, score {score})"
        );

        Ok(Some(SkillAdjustment {
            user_id: user_id.to_string(),
            previous: current,
            value,
            delta: applied,
            persisted: true,
        }))
    }
}

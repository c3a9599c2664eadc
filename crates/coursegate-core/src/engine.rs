//! Gating service.
//!
//! Owns every progress record transition: content views, module and final
//! attempts, lockout checks, resets. Each mutating operation is a
//! read-modify-write on one record, serialized per `(user, course)` key; the
//! skill update runs after the record is committed and never fails the
//! operation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::GateError;
use crate::model::{
    CourseStructure, EvaluationScope, Level, ProgressKey, ProgressRecord, UserRecord,
};
use crate::progress::{compute_progress, DEFAULT_PENDING_FINAL_CAP};
use crate::skill::{round_skill, EvaluationKind, SkillAdjuster, SkillAdjustment, MIN_SKILL};
use crate::tiering::{tier_for, Tier};
use crate::traits::{CourseCatalog, ProgressStore, UserDirectory};

/// Upper bound of the admin skill override.
pub const MAX_SKILL_OVERRIDE: f64 = 5.0;

/// Configuration for the gating service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ceiling for the progress percentage while a final evaluation is pending.
    #[serde(default = "default_pending_final_cap")]
    pub pending_final_cap: u8,
    /// Reject module/final attempts made inside a lockout window.
    #[serde(default)]
    pub enforce_lockouts: bool,
}

fn default_pending_final_cap() -> u8 {
    DEFAULT_PENDING_FINAL_CAP
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pending_final_cap: default_pending_final_cap(),
            enforce_lockouts: false,
        }
    }
}

/// Wall-clock source. Swappable so lockout expiry can be tested.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Result of a module quiz attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleOutcome {
    pub progress: ProgressRecord,
    pub tier: Tier,
    pub skill: Option<SkillAdjustment>,
    /// Module the learner should work on next.
    pub next_module_index: usize,
    pub passed: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Result of a final evaluation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalOutcome {
    pub progress: ProgressRecord,
    pub tier: Tier,
    pub skill: Option<SkillAdjustment>,
    pub passed: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Lock state of one evaluation scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockStatus {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_message: Option<String>,
}

impl LockStatus {
    fn unlocked() -> Self {
        Self {
            locked: false,
            remaining_minutes: None,
            locked_until: None,
            tier_message: None,
        }
    }
}

/// Whether the final evaluation may be attempted, with diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalEligibility {
    pub can_take_final: bool,
    pub modules_completed: usize,
    pub total_modules: usize,
    pub final_completed: bool,
    pub final_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-key async mutexes. An entry is dropped with the last guard or waiter
/// holding it.
#[derive(Default)]
struct KeyLocks {
    inner: DashMap<ProgressKey, Arc<Mutex<()>>>,
}

impl KeyLocks {
    async fn lock(&self, key: &ProgressKey) -> KeyGuard<'_> {
        // Clone the Arc out so no map shard guard is held across the await.
        let mutex = {
            let entry = self
                .inner
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        KeyGuard {
            guard: Some(mutex.lock_owned().await),
            locks: &self.inner,
            key: key.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

struct KeyGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<ProgressKey, Arc<Mutex<()>>>,
    key: ProgressKey,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// The gating service.
pub struct GatingService {
    catalog: Arc<dyn CourseCatalog>,
    progress: Arc<dyn ProgressStore>,
    users: Arc<dyn UserDirectory>,
    skills: SkillAdjuster,
    config: EngineConfig,
    locks: KeyLocks,
    clock: Clock,
}

impl GatingService {
    pub fn new(
        catalog: Arc<dyn CourseCatalog>,
        progress: Arc<dyn ProgressStore>,
        users: Arc<dyn UserDirectory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            progress,
            skills: SkillAdjuster::new(Arc::clone(&users)),
            users,
            config,
            locks: KeyLocks::default(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn course(&self, course_id: &str) -> Result<CourseStructure, GateError> {
        self.catalog
            .course(course_id)
            .ok_or_else(|| GateError::NotFound(format!("course '{course_id}'")))
    }

    fn cap(&self) -> u8 {
        self.config.pending_final_cap
    }

    /// Serialized read-modify-write of one record.
    ///
    /// With `create`, a missing record starts empty; otherwise a missing
    /// record yields `Ok(None)` and nothing is written. If `f` fails the
    /// record is not saved.
    async fn mutate<T, F>(
        &self,
        key: &ProgressKey,
        create: bool,
        f: F,
    ) -> Result<Option<(ProgressRecord, T)>, GateError>
    where
        T: Send,
        F: FnOnce(&mut ProgressRecord, DateTime<Utc>) -> Result<T, GateError> + Send,
    {
        let _guard = self.locks.lock(key).await;
        let now = self.now();
        let mut f = Some(f);
        let mut outcome: Option<Result<(ProgressRecord, T), GateError>> = None;

        let mut apply = |current: Option<ProgressRecord>| {
            let mut record = match current {
                Some(record) => record,
                None if create => ProgressRecord::new(key, now),
                None => return None,
            };
            let f = f.take()?;
            match f(&mut record, now) {
                Ok(out) => {
                    outcome = Some(Ok((record.clone(), out)));
                    Some(record)
                }
                Err(e) => {
                    outcome = Some(Err(e));
                    None
                }
            }
        };
        self.progress.update(key, &mut apply).await?;
        outcome.transpose()
    }

    /// Skill adjustment that logs and swallows storage failures.
    async fn adjust_skill(
        &self,
        user_id: &str,
        level: Level,
        score: f64,
        kind: EvaluationKind,
    ) -> Option<SkillAdjustment> {
        match self.skills.adjust(user_id, level, score, kind).await {
            Ok(adjustment) => adjustment,
            Err(e) => {
                tracing::warn!("skill adjustment for {user_id} failed, continuing: {e}");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Current record, or `None` if the user never started the course.
    pub async fn progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<ProgressRecord>, GateError> {
        let key = key_for(user_id, course_id)?;
        Ok(self.progress.load(&key).await?)
    }

    /// Every record of a user.
    pub async fn list_progress(&self, user_id: &str) -> Result<Vec<ProgressRecord>, GateError> {
        let user_id = require_id("user_id", user_id)?;
        Ok(self.progress.list_for_user(user_id).await?)
    }

    /// Lock state of an evaluation scope. Never mutates.
    pub async fn check_lock(
        &self,
        user_id: &str,
        course_id: &str,
        scope: EvaluationScope,
    ) -> Result<LockStatus, GateError> {
        let key = key_for(user_id, course_id)?;
        if let (EvaluationScope::Module(i), Some(course)) = (scope, self.catalog.course(&key.course_id))
        {
            check_module_index(&course, i)?;
        }

        let Some(record) = self.progress.load(&key).await? else {
            return Ok(LockStatus::unlocked());
        };
        let status = lock_status(&record, scope, self.now());
        tracing::debug!("lock check {key} {scope}: locked={}", status.locked);
        Ok(status)
    }

    /// Whether the final evaluation can be attempted now.
    ///
    /// `total_modules` overrides the catalog's module count when given.
    pub async fn can_take_final(
        &self,
        user_id: &str,
        course_id: &str,
        total_modules: Option<usize>,
    ) -> Result<FinalEligibility, GateError> {
        let key = key_for(user_id, course_id)?;
        let course = self.course(&key.course_id)?;
        if total_modules == Some(0) {
            return Err(GateError::Validation(
                "total_modules must be at least 1".into(),
            ));
        }
        let total = total_modules.unwrap_or_else(|| course.module_count());

        let mut eligibility = FinalEligibility {
            can_take_final: false,
            modules_completed: 0,
            total_modules: total,
            final_completed: false,
            final_locked: false,
            remaining_minutes: None,
            reason: None,
        };

        if !course.has_final {
            eligibility.reason = Some("course has no final evaluation".into());
            return Ok(eligibility);
        }
        let Some(record) = self.progress.load(&key).await? else {
            eligibility.reason = Some("no progress yet".into());
            return Ok(eligibility);
        };

        let lock = lock_status(&record, EvaluationScope::Final, self.now());
        eligibility.modules_completed = record.completed_module_count(total);
        eligibility.final_completed = record.final_evaluation.completed;
        eligibility.final_locked = lock.locked;
        eligibility.remaining_minutes = lock.remaining_minutes;

        eligibility.reason = if eligibility.modules_completed < total {
            Some(format!(
                "{} of {} modules completed",
                eligibility.modules_completed, total
            ))
        } else if eligibility.final_completed {
            Some("final evaluation already passed".into())
        } else if eligibility.final_locked {
            Some("final evaluation is locked".into())
        } else {
            None
        };
        eligibility.can_take_final = eligibility.reason.is_none();
        Ok(eligibility)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Mark a content item as viewed and move the cursor to it.
    pub async fn record_content_viewed(
        &self,
        user_id: &str,
        course_id: &str,
        module_index: usize,
        content_index: usize,
    ) -> Result<ProgressRecord, GateError> {
        let key = key_for(user_id, course_id)?;
        let course = self.course(&key.course_id)?;
        let items = check_module_index(&course, module_index)?;
        if content_index >= items {
            return Err(GateError::Validation(format!(
                "content_index {content_index} out of range for module {module_index} ({items} items)"
            )));
        }

        let cap = self.cap();
        let (record, ()) = self
            .mutate(&key, true, |record, now| {
                record.mark_viewed(module_index, content_index, now);
                record.refresh_progress(compute_progress(record, &course, cap));
                Ok(())
            })
            .await?
            .ok_or_else(|| GateError::NotFound(format!("progress {key}")))?;

        tracing::debug!(
            "viewed {key} module {module_index} item {content_index}, progress {}%",
            record.progress_percent
        );
        Ok(record)
    }

    /// Record a module quiz attempt.
    pub async fn complete_module(
        &self,
        user_id: &str,
        course_id: &str,
        module_index: usize,
        score: f64,
        lockout_minutes: Option<u32>,
    ) -> Result<ModuleOutcome, GateError> {
        let key = key_for(user_id, course_id)?;
        check_score(score)?;
        let course = self.course(&key.course_id)?;
        check_module_index(&course, module_index)?;

        let tier = tier_for(score);
        let minutes = lockout_minutes.unwrap_or(tier.lockout_minutes);
        let module_count = course.module_count();
        let enforce = self.config.enforce_lockouts;
        let cap = self.cap();
        let scope = EvaluationScope::Module(module_index);

        let (record, (passed, next_module_index, locked_until)) = self
            .mutate(&key, true, |record, now| {
                if enforce {
                    reject_if_locked(record, scope, now)?;
                }
                let locked_until = lockout_deadline(now, minutes);
                let passed = record.record_module_attempt(module_index, score, locked_until, now);
                let next = record.move_cursor_after_attempt(module_index, tier.can_advance, module_count);
                if !course.has_final && record.completed_module_count(module_count) == module_count {
                    record.mark_completed(now);
                }
                record.refresh_progress(compute_progress(record, &course, cap));
                Ok((passed, next, locked_until))
            })
            .await?
            .ok_or_else(|| GateError::NotFound(format!("progress {key}")))?;

        tracing::info!(
            "module {module_index} attempt {key}: score {score}, passed {passed}, next module {next_module_index}, progress {}%",
            record.progress_percent
        );

        let skill = self
            .adjust_skill(
                &key.user_id,
                course.module_level(module_index),
                score,
                EvaluationKind::Module,
            )
            .await;

        Ok(ModuleOutcome {
            progress: record,
            tier,
            skill,
            next_module_index,
            passed,
            locked_until,
        })
    }

    /// Record a final evaluation attempt. Rejected once the final is passed.
    pub async fn complete_final(
        &self,
        user_id: &str,
        course_id: &str,
        score: f64,
        lockout_minutes: Option<u32>,
    ) -> Result<FinalOutcome, GateError> {
        let key = key_for(user_id, course_id)?;
        check_score(score)?;
        let course = self.course(&key.course_id)?;
        if !course.has_final {
            return Err(GateError::Validation(format!(
                "course '{}' has no final evaluation",
                key.course_id
            )));
        }

        let tier = tier_for(score);
        let minutes = lockout_minutes.unwrap_or(tier.lockout_minutes);
        let enforce = self.config.enforce_lockouts;
        let cap = self.cap();

        let (record, (passed, locked_until)) = self
            .mutate(&key, true, |record, now| {
                if record.final_evaluation.completed {
                    return Err(GateError::Validation(
                        "final evaluation already passed".into(),
                    ));
                }
                if enforce {
                    reject_if_locked(record, EvaluationScope::Final, now)?;
                }
                let locked_until = lockout_deadline(now, minutes);
                let passed = record.record_final_attempt(score, locked_until, now);
                record.refresh_progress(compute_progress(record, &course, cap));
                Ok((passed, locked_until))
            })
            .await?
            .ok_or_else(|| GateError::NotFound(format!("progress {key}")))?;

        tracing::info!(
            "final attempt {key}: score {score}, passed {passed}, progress {}%",
            record.progress_percent
        );

        let skill = self
            .adjust_skill(&key.user_id, course.level, score, EvaluationKind::Final)
            .await;

        Ok(FinalOutcome {
            progress: record,
            tier,
            skill,
            passed,
            locked_until,
        })
    }

    /// Clear a record back to its initial state. `None` if it never existed.
    pub async fn reset_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<ProgressRecord>, GateError> {
        let key = key_for(user_id, course_id)?;
        let reset = self
            .mutate(&key, false, |record, now| {
                record.reset(now);
                Ok(())
            })
            .await?
            .map(|(record, ())| record);

        if reset.is_some() {
            tracing::info!("progress reset for {key}");
        }
        Ok(reset)
    }

    /// Mark the course completed regardless of evaluations.
    pub async fn force_complete(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<ProgressRecord, GateError> {
        let key = key_for(user_id, course_id)?;
        self.course(&key.course_id)?;
        let (record, ()) = self
            .mutate(&key, true, |record, now| {
                record.mark_completed(now);
                Ok(())
            })
            .await?
            .ok_or_else(|| GateError::NotFound(format!("progress {key}")))?;

        tracing::info!("course force-completed for {key}");
        Ok(record)
    }

    /// Mark an uncompleted course as abandoned. `None` if it never existed.
    pub async fn abandon(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<ProgressRecord>, GateError> {
        let key = key_for(user_id, course_id)?;
        Ok(self
            .mutate(&key, false, |record, now| {
                record.abandon(now);
                Ok(())
            })
            .await?
            .map(|(record, ())| record))
    }

    // -----------------------------------------------------------------------
    // Skill administration
    // -----------------------------------------------------------------------

    pub async fn skill(&self, user_id: &str) -> Result<UserRecord, GateError> {
        let user_id = require_id("user_id", user_id)?;
        self.users
            .user(user_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("user '{user_id}'")))
    }

    /// Admin override of a user's skill, clamped to `[1, 5]`.
    pub async fn set_skill(&self, user_id: &str, value: f64) -> Result<UserRecord, GateError> {
        let user_id = require_id("user_id", user_id)?;
        if !value.is_finite() {
            return Err(GateError::Validation("skill must be a finite number".into()));
        }
        let value = round_skill(value.clamp(MIN_SKILL, MAX_SKILL_OVERRIDE));
        if !self.users.set_skill(user_id, value).await? {
            return Err(GateError::NotFound(format!("user '{user_id}'")));
        }
        tracing::info!("skill for {user_id} overridden to {value:.1}");
        self.skill(user_id).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_id<'a>(field: &str, value: &'a str) -> Result<&'a str, GateError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GateError::Validation(format!("{field} is required")));
    }
    Ok(trimmed)
}

fn key_for(user_id: &str, course_id: &str) -> Result<ProgressKey, GateError> {
    Ok(ProgressKey::new(
        require_id("user_id", user_id)?,
        require_id("course_id", course_id)?,
    ))
}

fn check_score(score: f64) -> Result<(), GateError> {
    if !(0.0..=100.0).contains(&score) {
        return Err(GateError::Validation(format!(
            "score must be between 0 and 100, got {score}"
        )));
    }
    Ok(())
}

/// Returns the module's content count if the index is valid.
fn check_module_index(course: &CourseStructure, module_index: usize) -> Result<usize, GateError> {
    course.content_count(module_index).ok_or_else(|| {
        GateError::Validation(format!(
            "module_index {module_index} out of range for course '{}' ({} modules)",
            course.id,
            course.module_count()
        ))
    })
}

fn lockout_deadline(now: DateTime<Utc>, minutes: u32) -> Option<DateTime<Utc>> {
    (minutes > 0).then(|| now + Duration::minutes(i64::from(minutes)))
}

fn remaining_minutes(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (until - now).num_milliseconds().max(0);
    (ms + 59_999) / 60_000
}

fn lock_status(record: &ProgressRecord, scope: EvaluationScope, now: DateTime<Utc>) -> LockStatus {
    match record.locked_until(scope) {
        Some(until) if now < until => LockStatus {
            locked: true,
            remaining_minutes: Some(remaining_minutes(until, now)),
            locked_until: Some(until),
            tier_message: record.last_score(scope).map(|s| tier_for(s).message),
        },
        _ => LockStatus::unlocked(),
    }
}

fn reject_if_locked(
    record: &ProgressRecord,
    scope: EvaluationScope,
    now: DateTime<Utc>,
) -> Result<(), GateError> {
    match lock_status(record, scope, now) {
        LockStatus {
            locked: true,
            remaining_minutes: Some(minutes),
            ..
        } => Err(GateError::Locked {
            remaining_minutes: minutes,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_minutes_rounds_up() {
        let now = Utc::now();
        assert_eq!(remaining_minutes(now + Duration::minutes(1), now), 1);
        assert_eq!(remaining_minutes(now + Duration::seconds(61), now), 2);
        assert_eq!(remaining_minutes(now + Duration::milliseconds(1), now), 1);
        assert_eq!(remaining_minutes(now, now), 0);
    }

    #[test]
    fn zero_minutes_means_no_lock() {
        let now = Utc::now();
        assert_eq!(lockout_deadline(now, 0), None);
        assert_eq!(lockout_deadline(now, 15), Some(now + Duration::minutes(15)));
    }

    #[test]
    fn score_bounds() {
        assert!(check_score(0.0).is_ok());
        assert!(check_score(100.0).is_ok());
        assert!(check_score(-0.5).is_err());
        assert!(check_score(f64::NAN).is_err());
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(matches!(key_for(" ", "c"), Err(GateError::Validation(_))));
        assert!(matches!(key_for("u", ""), Err(GateError::Validation(_))));
        assert_eq!(key_for(" u ", "c").unwrap(), ProgressKey::new("u", "c"));
    }

    #[tokio::test]
    async fn key_locks_are_dropped_with_their_guards() {
        let locks = KeyLocks::default();
        {
            let _a = locks.lock(&ProgressKey::new("u", "c1")).await;
            let _b = locks.lock(&ProgressKey::new("u", "c2")).await;
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn key_lock_survives_while_a_waiter_holds_it() {
        let locks = KeyLocks::default();
        let key = ProgressKey::new("u", "c");
        let first = locks.lock(&key).await;
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(locks.len(), 1);
            drop(first);
        };

        let (second, ()) = tokio::join!(locks.lock(&key), release);
        assert_eq!(locks.len(), 1);
        drop(second);
        assert_eq!(locks.len(), 0);
    }
}

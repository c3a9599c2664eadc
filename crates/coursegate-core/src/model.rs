//! Core data model types for coursegate.
//!
//! Course structure is read-only input from the catalog. `ProgressRecord` is
//! the per-(user, course) aggregate; every change to it goes through one of
//! its named transition methods.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum score (percent) that counts as a pass.
pub const PASSING_SCORE: f64 = 70.0;

/// Difficulty tag of a course or module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Basic,
    Intermediate,
    Advanced,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Basic => write!(f, "basic"),
            Level::Intermediate => write!(f, "intermediate"),
            Level::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" | "beginner" => Ok(Level::Basic),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

/// A single content item inside a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// Display title.
    pub title: String,
    /// Free-form kind tag (e.g. "video", "text").
    #[serde(default)]
    pub kind: Option<String>,
}

/// One ordered module of a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Display title.
    pub title: String,
    /// Module-specific level; falls back to the course level.
    #[serde(default)]
    pub level: Option<Level>,
    /// Ordered content items.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Whether the module ends with a quiz.
    #[serde(default)]
    pub has_quiz: bool,
}

/// Immutable course structure as supplied by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseStructure {
    /// Unique course identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Course-wide difficulty.
    pub level: Level,
    /// Ordered modules.
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
    /// Whether the course ends with a final evaluation.
    #[serde(default)]
    pub has_final: bool,
}

impl CourseStructure {
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Content item count for a module, or `None` if the index is out of range.
    pub fn content_count(&self, module_index: usize) -> Option<usize> {
        self.modules.get(module_index).map(|m| m.content.len())
    }

    /// Effective level of a module (its own tag, else the course level).
    pub fn module_level(&self, module_index: usize) -> Level {
        self.modules
            .get(module_index)
            .and_then(|m| m.level)
            .unwrap_or(self.level)
    }
}

/// Identity of a progress record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgressKey {
    pub user_id: String,
    pub course_id: String,
}

impl ProgressKey {
    pub fn new(user_id: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            course_id: course_id.into(),
        }
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.course_id)
    }
}

/// Lifecycle status of a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CourseStatus::InProgress => write!(f, "in_progress"),
            CourseStatus::Completed => write!(f, "completed"),
            CourseStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Which evaluation a lockout or attempt refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationScope {
    Module(usize),
    Final,
}

impl fmt::Display for EvaluationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationScope::Module(i) => write!(f, "module {i}"),
            EvaluationScope::Final => write!(f, "final"),
        }
    }
}

/// Ledger entry for one module quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleCompletion {
    /// Set by the first passing attempt; sticky until reset.
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_score: f64,
    pub best_score: f64,
    pub attempts: u32,
    pub last_attempt_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Ledger entry for one viewed content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentView {
    pub module_index: usize,
    pub content_index: usize,
    pub viewed: bool,
    pub viewed_at: DateTime<Utc>,
}

/// State of the course's final evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalEvaluation {
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_score: Option<f64>,
    #[serde(default)]
    pub best_score: Option<f64>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked_until: Option<DateTime<Utc>>,
}

/// The per-(user, course) progress aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: String,
    pub current_module_index: usize,
    pub current_content_index: usize,
    #[serde(default)]
    pub module_completions: BTreeMap<usize, ModuleCompletion>,
    #[serde(default)]
    pub content_viewed: Vec<ContentView>,
    #[serde(default)]
    pub final_evaluation: FinalEvaluation,
    pub progress_percent: u8,
    pub course_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: CourseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Create an empty record for a key.
    pub fn new(key: &ProgressKey, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: key.user_id.clone(),
            course_id: key.course_id.clone(),
            current_module_index: 0,
            current_content_index: 0,
            module_completions: BTreeMap::new(),
            content_viewed: Vec::new(),
            final_evaluation: FinalEvaluation::default(),
            progress_percent: 0,
            course_completed: false,
            completed_at: None,
            status: CourseStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.user_id.clone(), self.course_id.clone())
    }

    /// Bump `updated_at` and revive an abandoned course.
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        if self.status == CourseStatus::Abandoned {
            self.status = CourseStatus::InProgress;
        }
    }

    /// Upsert a content view and move the cursor to it.
    pub fn mark_viewed(&mut self, module_index: usize, content_index: usize, now: DateTime<Utc>) {
        match self
            .content_viewed
            .iter_mut()
            .find(|v| v.module_index == module_index && v.content_index == content_index)
        {
            Some(view) => {
                view.viewed = true;
                view.viewed_at = now;
            }
            None => self.content_viewed.push(ContentView {
                module_index,
                content_index,
                viewed: true,
                viewed_at: now,
            }),
        }
        self.current_module_index = module_index;
        self.current_content_index = content_index;
        self.touch(now);
    }

    /// Record a module quiz attempt. Returns `true` if this attempt passed.
    pub fn record_module_attempt(
        &mut self,
        module_index: usize,
        score: f64,
        locked_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let passed = score >= PASSING_SCORE;
        let entry = self
            .module_completions
            .entry(module_index)
            .or_insert_with(|| ModuleCompletion {
                completed: false,
                completed_at: None,
                last_score: score,
                best_score: score,
                attempts: 0,
                last_attempt_at: now,
                locked_until: None,
            });

        if passed && !entry.completed {
            entry.completed = true;
            entry.completed_at = Some(now);
        }
        entry.last_score = score;
        entry.best_score = entry.best_score.max(score);
        entry.attempts += 1;
        entry.last_attempt_at = now;
        entry.locked_until = locked_until;
        self.touch(now);
        passed
    }

    /// Position the cursor after a module attempt and return the module the
    /// learner should work on next.
    pub fn move_cursor_after_attempt(
        &mut self,
        module_index: usize,
        can_advance: bool,
        module_count: usize,
    ) -> usize {
        let next = if can_advance && module_index + 1 < module_count {
            module_index + 1
        } else {
            module_index
        };
        if next != self.current_module_index {
            self.current_content_index = 0;
        }
        self.current_module_index = next;
        next
    }

    /// Record a final evaluation attempt. Returns `true` if this attempt passed.
    pub fn record_final_attempt(
        &mut self,
        score: f64,
        locked_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let passed = score >= PASSING_SCORE;
        let fe = &mut self.final_evaluation;
        if passed && !fe.completed {
            fe.completed = true;
            fe.completed_at = Some(now);
        }
        fe.last_score = Some(score);
        fe.best_score = Some(fe.best_score.map_or(score, |b| b.max(score)));
        fe.attempts += 1;
        fe.last_attempt_at = Some(now);
        fe.locked_until = locked_until;
        self.touch(now);
        if passed {
            self.mark_completed(now);
        }
        passed
    }

    /// Mark the whole course as completed.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        if !self.course_completed {
            self.course_completed = true;
            self.completed_at = Some(now);
        }
        self.status = CourseStatus::Completed;
        self.progress_percent = 100;
        self.updated_at = now;
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) {
        if self.status != CourseStatus::Completed {
            self.status = CourseStatus::Abandoned;
        }
        self.updated_at = now;
    }

    /// Clear everything except identity and creation time.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.current_module_index = 0;
        self.current_content_index = 0;
        self.module_completions.clear();
        self.content_viewed.clear();
        self.final_evaluation = FinalEvaluation::default();
        self.progress_percent = 0;
        self.course_completed = false;
        self.completed_at = None;
        self.status = CourseStatus::InProgress;
        self.updated_at = now;
    }

    /// Store a freshly computed percentage. The cached value never moves
    /// backwards; only `reset` lowers it.
    pub fn refresh_progress(&mut self, computed: u8) {
        self.progress_percent = self.progress_percent.max(computed.min(100));
    }

    /// Number of completed modules with an index below `total`.
    pub fn completed_module_count(&self, total: usize) -> usize {
        self.module_completions
            .iter()
            .filter(|(idx, c)| **idx < total && c.completed)
            .count()
    }

    /// Number of viewed content items in a module.
    pub fn viewed_in_module(&self, module_index: usize) -> usize {
        self.content_viewed
            .iter()
            .filter(|v| v.module_index == module_index && v.viewed)
            .count()
    }

    pub fn is_module_completed(&self, module_index: usize) -> bool {
        self.module_completions
            .get(&module_index)
            .is_some_and(|c| c.completed)
    }

    /// Lockout deadline for a scope, if one was set.
    pub fn locked_until(&self, scope: EvaluationScope) -> Option<DateTime<Utc>> {
        match scope {
            EvaluationScope::Module(i) => self.module_completions.get(&i)?.locked_until,
            EvaluationScope::Final => self.final_evaluation.locked_until,
        }
    }

    /// Last recorded score for a scope.
    pub fn last_score(&self, scope: EvaluationScope) -> Option<f64> {
        match scope {
            EvaluationScope::Module(i) => self.module_completions.get(&i).map(|c| c.last_score),
            EvaluationScope::Final => self.final_evaluation.last_score,
        }
    }
}

/// A user as seen through the user directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    /// Skill scalar; `None` until a placement or first adjustment sets it.
    #[serde(default)]
    pub skill: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

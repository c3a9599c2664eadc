//! Course progress percentage.
//!
//! Completed modules are worth 70% of the course split evenly; the remaining
//! 30% is spread across modules and only the current module's share is
//! credited, in proportion to the content viewed in it.

use crate::model::{CourseStructure, ProgressRecord};

/// Weight of completed modules in the percentage.
pub const MODULE_WEIGHT: f64 = 70.0;
/// Weight of in-module content viewing in the percentage.
pub const CONTENT_WEIGHT: f64 = 30.0;
/// Default ceiling while a final evaluation is pending.
pub const DEFAULT_PENDING_FINAL_CAP: u8 = 99;

/// Compute the progress percentage of a record against its course.
///
/// Returns 100 once the final evaluation is passed or the course is marked
/// completed. For a course with a final evaluation that has not been passed
/// the result never exceeds `pending_final_cap`.
pub fn compute_progress(
    record: &ProgressRecord,
    course: &CourseStructure,
    pending_final_cap: u8,
) -> u8 {
    let total = course.module_count();
    if total == 0 {
        return 0;
    }
    if record.final_evaluation.completed || record.course_completed {
        return 100;
    }

    let completed = record.completed_module_count(total) as f64;
    let module_part = completed / total as f64 * MODULE_WEIGHT;

    let current = record.current_module_index;
    let items = course.content_count(current).unwrap_or(0).max(1);
    let viewed = record.viewed_in_module(current).min(items);
    let content_part = viewed as f64 / items as f64 * (CONTENT_WEIGHT / total as f64);

    let pct = (module_part + content_part).round().clamp(0.0, 100.0) as u8;
    if course.has_final {
        pct.min(pending_final_cap.min(99))
    } else {
        pct
    }
}

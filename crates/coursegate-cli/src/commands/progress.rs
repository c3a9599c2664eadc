//! The `coursegate progress` and `coursegate view` commands.

use anyhow::Result;

use coursegate_core::api::ApiRequest;
use coursegate_core::model::ProgressRecord;

use crate::GlobalArgs;

pub async fn execute(
    global: &GlobalArgs,
    user_id: String,
    course_id: Option<String>,
    table: bool,
) -> Result<()> {
    match (course_id, table) {
        (Some(course_id), false) => {
            super::dispatch(global, ApiRequest::Progress { user_id, course_id }).await
        }
        (None, false) => super::dispatch(global, ApiRequest::ListProgress { user_id }).await,
        (course_id, true) => {
            let service = super::service(global)?;
            let records: Vec<ProgressRecord> = service
                .list_progress(&user_id)
                .await?
                .into_iter()
                .filter(|r| course_id.as_deref().map_or(true, |c| r.course_id == c))
                .collect();

            if records.is_empty() {
                println!("No progress recorded for {user_id}.");
            } else {
                print_table(&records);
            }
            Ok(())
        }
    }
}

pub async fn view(
    global: &GlobalArgs,
    user_id: String,
    course_id: String,
    module_index: usize,
    content_index: usize,
) -> Result<()> {
    super::dispatch(
        global,
        ApiRequest::RecordContentViewed {
            user_id,
            course_id,
            module_index,
            content_index,
        },
    )
    .await
}

fn print_table(records: &[ProgressRecord]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Course",
        "Status",
        "Progress",
        "Modules Passed",
        "Final",
        "Updated",
    ]);

    for record in records {
        let passed = record
            .module_completions
            .values()
            .filter(|c| c.completed)
            .count();
        let final_eval = &record.final_evaluation;
        let final_cell = match (final_eval.completed, final_eval.best_score) {
            (true, Some(best)) => format!("passed ({best:.0})"),
            (true, None) => "passed".to_string(),
            (false, Some(best)) => format!("{} attempt(s), best {best:.0}", final_eval.attempts),
            (false, None) => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(&record.course_id),
            Cell::new(record.status),
            Cell::new(format!("{}%", record.progress_percent)),
            Cell::new(passed),
            Cell::new(final_cell),
            Cell::new(record.updated_at.format("%Y-%m-%d %H:%M")),
        ]);
    }

    println!("{table}");
}

//! The `coursegate validate` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use coursegate_core::catalog::{load_course_directory, parse_course, validate_courses};

use crate::GlobalArgs;

pub fn execute(global: &GlobalArgs, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => super::settings(global)?.catalog_dir,
    };

    let mut courses = if path.is_dir() {
        load_course_directory(&path)?
    } else {
        vec![parse_course(&path)?]
    };
    courses.sort_by(|a, b| a.id.cmp(&b.id));

    let mut table = Table::new();
    table.set_header(vec!["Course", "Name", "Level", "Modules", "Items", "Final"]);
    for course in &courses {
        let items: usize = course.modules.iter().map(|m| m.content.len()).sum();
        table.add_row(vec![
            Cell::new(&course.id),
            Cell::new(&course.name),
            Cell::new(course.level),
            Cell::new(course.module_count()),
            Cell::new(items),
            Cell::new(if course.has_final { "yes" } else { "no" }),
        ]);
    }
    println!("{table}");
    println!("{} course(s) loaded", courses.len());

    let warnings = validate_courses(&courses);
    for w in &warnings {
        let location = match w.module_index {
            Some(i) => format!("[{} / module {i}]", w.course_id),
            None => format!("[{}]", w.course_id),
        };
        println!("  {location} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("All courses valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}

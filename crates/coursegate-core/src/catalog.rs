//! TOML course catalog.
//!
//! Loads course structure from TOML files and directories, validates it, and
//! serves it to the engine through [`CourseCatalog`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{ContentItem, CourseStructure, Level, ModuleSpec};
use crate::traits::CourseCatalog;

/// Intermediate TOML structure for parsing course files.
#[derive(Debug, Deserialize)]
struct TomlCourseFile {
    course: TomlCourseHeader,
    #[serde(default)]
    modules: Vec<TomlModule>,
}

#[derive(Debug, Deserialize)]
struct TomlCourseHeader {
    id: String,
    name: String,
    #[serde(default = "default_level_str")]
    level: String,
    #[serde(default)]
    has_final: bool,
}

fn default_level_str() -> String {
    "basic".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlModule {
    title: String,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    content: Vec<TomlContent>,
    #[serde(default = "default_true")]
    has_quiz: bool,
}

fn default_true() -> bool {
    true
}

/// Content entries may be a bare title or a table.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TomlContent {
    Title(String),
    Item {
        title: String,
        #[serde(default)]
        kind: Option<String>,
    },
}

/// Parse a single TOML file into a `CourseStructure`.
pub fn parse_course(path: &Path) -> Result<CourseStructure> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read course file: {}", path.display()))?;

    parse_course_str(&content, path)
}

/// Parse a TOML string into a `CourseStructure`.
pub fn parse_course_str(content: &str, source_path: &Path) -> Result<CourseStructure> {
    let parsed: TomlCourseFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let level: Level = parsed
        .course
        .level
        .parse()
        .map_err(|e: String| anyhow::anyhow!("{}", e))?;

    let modules = parsed
        .modules
        .into_iter()
        .map(|m| {
            let level = m
                .level
                .map(|l| l.parse().map_err(|e: String| anyhow::anyhow!("{}", e)))
                .transpose()?;

            let content = m
                .content
                .into_iter()
                .map(|c| match c {
                    TomlContent::Title(title) => ContentItem { title, kind: None },
                    TomlContent::Item { title, kind } => ContentItem { title, kind },
                })
                .collect();

            Ok(ModuleSpec {
                title: m.title,
                level,
                content,
                has_quiz: m.has_quiz,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CourseStructure {
        id: parsed.course.id,
        name: parsed.course.name,
        level,
        modules,
        has_final: parsed.course.has_final,
    })
}

/// Recursively load all `.toml` course files from a directory.
pub fn load_course_directory(dir: &Path) -> Result<Vec<CourseStructure>> {
    let mut courses = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            courses.extend(load_course_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_course(&path) {
                Ok(course) => courses.push(course),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(courses)
}

/// A warning from course validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The course ID.
    pub course_id: String,
    /// The module index (if applicable).
    pub module_index: Option<usize>,
    /// Warning message.
    pub message: String,
}

/// Validate a set of courses for common issues.
pub fn validate_courses(courses: &[CourseStructure]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for course in courses {
        if !seen_ids.insert(course.id.as_str()) {
            warnings.push(ValidationWarning {
                course_id: course.id.clone(),
                module_index: None,
                message: format!("duplicate course ID: {}", course.id),
            });
        }

        if course.modules.is_empty() {
            warnings.push(ValidationWarning {
                course_id: course.id.clone(),
                module_index: None,
                message: "course has no modules".into(),
            });
        }

        for (i, module) in course.modules.iter().enumerate() {
            if module.content.is_empty() {
                warnings.push(ValidationWarning {
                    course_id: course.id.clone(),
                    module_index: Some(i),
                    message: format!("module '{}' has no content items", module.title),
                });
            }
        }
    }

    warnings
}

/// In-memory catalog keyed by course id.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    courses: BTreeMap<String, CourseStructure>,
}

impl StaticCatalog {
    pub fn new(courses: impl IntoIterator<Item = CourseStructure>) -> Self {
        let mut map = BTreeMap::new();
        for course in courses {
            if map.contains_key(&course.id) {
                tracing::warn!("duplicate course id '{}', keeping the last one", course.id);
            }
            map.insert(course.id.clone(), course);
        }
        Self { courses: map }
    }

    /// Load every course under a directory.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        Ok(Self::new(load_course_directory(dir)?))
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

impl CourseCatalog for StaticCatalog {
    fn course(&self, course_id: &str) -> Option<CourseStructure> {
        self.courses.get(course_id).cloned()
    }

    fn course_ids(&self) -> Vec<String> {
        self.courses.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[course]
id = "rust-101"
name = "Rust 101"
level = "intermediate"
has_final = true

[[modules]]
title = "Ownership"
content = ["Moves", "Borrows", { title = "Lifetimes video", kind = "video" }]

[[modules]]
title = "Traits"
level = "advanced"
content = ["Trait objects", "Generics"]
"#;

    #[test]
    fn parse_valid_toml() {
        let course = parse_course_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(course.id, "rust-101");
        assert_eq!(course.level, Level::Intermediate);
        assert!(course.has_final);
        assert_eq!(course.module_count(), 2);
        assert_eq!(course.content_count(0), Some(3));
        assert_eq!(course.modules[0].content[2].kind.as_deref(), Some("video"));
        assert_eq!(course.module_level(0), Level::Intermediate);
        assert_eq!(course.module_level(1), Level::Advanced);
        assert!(course.modules[0].has_quiz);
    }

    #[test]
    fn parse_missing_optional_fields() {
        let toml = r#"
[course]
id = "minimal"
name = "Minimal"
"#;
        let course = parse_course_str(toml, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(course.level, Level::Basic);
        assert!(!course.has_final);
        assert!(course.modules.is_empty());
    }

    #[test]
    fn parse_unknown_level_fails() {
        let toml = r#"
[course]
id = "bad"
name = "Bad"
level = "wizard"
"#;
        assert!(parse_course_str(toml, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_course_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn validate_reports_problems() {
        let toml = r#"
[course]
id = "dup"
name = "Dup"

[[modules]]
title = "Empty"
"#;
        let course = parse_course_str(toml, &PathBuf::from("test.toml")).unwrap();
        let empty = CourseStructure {
            modules: vec![],
            ..course.clone()
        };
        let warnings = validate_courses(&[course, empty]);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate")));
        assert!(warnings.iter().any(|w| w.message.contains("no content")));
        assert!(warnings.iter().any(|w| w.message.contains("no modules")));
    }

    #[test]
    fn load_directory_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "nope {").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = StaticCatalog::from_directory(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.course("rust-101").is_some());
        assert!(catalog.course("missing").is_none());
        assert_eq!(catalog.course_ids(), vec!["rust-101".to_string()]);
    }
}

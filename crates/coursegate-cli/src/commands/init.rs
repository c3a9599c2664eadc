//! The `coursegate init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("coursegate.toml").exists() {
        println!("coursegate.toml already exists, skipping.");
    } else {
        std::fs::write("coursegate.toml", SAMPLE_CONFIG)?;
        println!("Created coursegate.toml");
    }

    std::fs::create_dir_all("courses")?;
    let example_path = std::path::Path::new("courses/example.toml");
    if example_path.exists() {
        println!("courses/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_COURSE)?;
        println!("Created courses/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: coursegate validate courses");
    println!("  2. Run: coursegate user add --user alice --skill 2");
    println!("  3. Run: coursegate view --user alice --course rust-intro --module 0 --item 0");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# coursegate configuration

catalog_dir = "./courses"

[storage]
type = "file"
path = "./coursegate-state.json"

[engine]
# Highest progress percentage shown while the final evaluation is pending.
pending_final_cap = 99
# Reject quiz attempts made inside a lockout window.
enforce_lockouts = false
"#;

const EXAMPLE_COURSE: &str = r#"[course]
id = "rust-intro"
name = "Introduction to Rust"
level = "basic"
has_final = true

[[modules]]
title = "Getting started"
content = ["Installing the toolchain", "Hello, world", "Cargo basics"]

[[modules]]
title = "Ownership"
level = "intermediate"
content = [
    { title = "Moves and copies", kind = "text" },
    { title = "Borrowing", kind = "video" },
]
"#;

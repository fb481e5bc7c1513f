// Task specification loading for the runner
use anyhow::{bail, Context, Result};
use assay_common::types::{TaskInput, TaskSpec};
use std::fs;
use std::path::Path;

/// Load and validate `config/test.json`.
pub fn load_task_spec(path: &Path) -> Result<TaskSpec> {
    if !path.exists() {
        bail!("Task specification not found: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_task_spec(&content).with_context(|| format!("Invalid task specification {}", path.display()))
}

pub fn parse_task_spec(content: &str) -> Result<TaskSpec> {
    let spec: TaskSpec = serde_json::from_str(content).context("Failed to parse task specification")?;
    spec.validate()?;
    Ok(spec)
}

/// Parse the learner's task input. Trailing NUL padding is ignored.
pub fn parse_task_input(raw: &str) -> Result<TaskInput> {
    let cleaned = raw.trim_end_matches('\0');
    let input: TaskInput = serde_json::from_str(cleaned).context("Failed to parse task input")?;
    if input.tid.trim().is_empty() {
        bail!("Task input has an empty tid");
    }
    Ok(input)
}

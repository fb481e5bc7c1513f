// Runtime settings shared by every pipeline stage
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_WORK_DIR: &str = "/tmp/work";
pub const DEFAULT_TASK_DIR: &str = "/task";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Location of the task specification, relative to the task directory.
pub const TASK_SPEC_FILE: &str = "config/test.json";

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub work_dir: PathBuf,
    pub task_dir: PathBuf,
    pub timeout_ms: u64,
    pub seed: Option<u64>,
}

impl RunnerSettings {
    pub fn new() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            task_dir: PathBuf::from(DEFAULT_TASK_DIR),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            seed: None,
        }
    }

    /// Defaults overridden by `ASSAY_WORK_DIR`, `ASSAY_TASK_DIR`,
    /// `ASSAY_TIMEOUT_MS` and `ASSAY_SEED`. An unparsable number is
    /// reported and the default kept.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RunnerSettings::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::new();
        if let Some(dir) = lookup("ASSAY_WORK_DIR") {
            settings.work_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("ASSAY_TASK_DIR") {
            settings.task_dir = PathBuf::from(dir);
        }
        if let Some(ms) = parse_var(&lookup, "ASSAY_TIMEOUT_MS") {
            settings.timeout_ms = ms;
        }
        settings.seed = parse_var(&lookup, "ASSAY_SEED");
        settings
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn task_spec_path(&self) -> PathBuf {
        self.task_dir.join(TASK_SPEC_FILE)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = key, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::new()
    }
}

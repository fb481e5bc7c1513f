use crate::codec;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{Actor, TestDataset, ExecutionOutcome};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Working-area layout. Paths are fixed and relative to the attempt root so
/// that every stage (and every external collaborator) agrees on them.
pub const TASK_ID_FILE: &str = "tid";
pub const INPUT_DIR: &str = "input";
pub const OUTPUT_DIR: &str = "output";
pub const DATASET_FILE: &str = "input/data.csv";

/// Per-attempt working area shared by the pipeline stages.
///
/// Every artifact is write-once: a second write of the same file fails with
/// [`PipelineError::AlreadyWritten`] instead of silently replacing data that
/// a later stage aligns against.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn task_id_path(&self) -> PathBuf {
        self.root.join(TASK_ID_FILE)
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.root.join(DATASET_FILE)
    }

    pub fn outcomes_path(&self, actor: Actor) -> PathBuf {
        self.root.join(OUTPUT_DIR).join(format!("{}.res", actor))
    }

    pub fn source_dir(&self, actor: Actor) -> PathBuf {
        self.root.join(actor.source_dir())
    }

    /// Wipe the area and recreate its directory skeleton.
    pub fn reset(&self) -> PipelineResult<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(PipelineError::io(&self.root, e)),
        }
        for dir in [
            self.root.clone(),
            self.root.join(INPUT_DIR),
            self.root.join(OUTPUT_DIR),
            self.source_dir(Actor::Submission),
            self.source_dir(Actor::Reference),
        ] {
            fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }
        debug!(root = %self.root.display(), "Working area prepared");
        Ok(())
    }

    pub fn save_task_id(&self, tid: &str) -> PipelineResult<()> {
        write_once(&self.task_id_path(), tid)
    }

    pub fn load_task_id(&self) -> PipelineResult<String> {
        read(&self.task_id_path())
    }

    pub fn store_dataset(&self, dataset: &TestDataset) -> PipelineResult<()> {
        write_once(&self.dataset_path(), &codec::encode_dataset(dataset))
    }

    pub fn load_dataset(&self) -> PipelineResult<TestDataset> {
        codec::decode_dataset(&read(&self.dataset_path())?)
    }

    pub fn has_outcomes(&self, actor: Actor) -> bool {
        self.outcomes_path(actor).is_file()
    }

    pub fn store_outcomes(&self, actor: Actor, outcomes: &[ExecutionOutcome]) -> PipelineResult<()> {
        write_once(&self.outcomes_path(actor), &codec::encode_outcomes(outcomes))
    }

    pub fn load_outcomes(&self, actor: Actor) -> PipelineResult<Vec<ExecutionOutcome>> {
        let path = self.outcomes_path(actor);
        codec::decode_outcomes(&format!("{}.res", actor), &read(&path)?)
    }
}

fn read(path: &Path) -> PipelineResult<String> {
    fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))
}

fn write_once(path: &Path, content: &str) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(PipelineError::AlreadyWritten(path.to_path_buf()))
        }
        Err(e) => return Err(PipelineError::io(path, e)),
    };
    file.write_all(content.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| PipelineError::io(path, e))?;
    debug!(path = %path.display(), bytes = content.len(), "Artifact written");
    Ok(())
}

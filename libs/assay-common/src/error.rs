use std::path::PathBuf;

/// Failures that abort the current pipeline invocation.
///
/// A program under test that crashes, raises or prints to stderr is never
/// reported through this type: that is an [`ExecutionOutcome`] and is folded
/// into the grading comparison instead.
///
/// [`ExecutionOutcome`]: crate::types::ExecutionOutcome
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("malformed generator descriptor '{0}'")]
    MalformedDescriptor(String),

    #[error("malformed task specification: {0}")]
    MalformedSpec(String),

    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with status {exit_code} without any diagnostic output")]
    SilentFailure { command: String, exit_code: i32 },

    #[error("{actor} failed to compile and there are no records to report it on: {detail}")]
    CompilationFailed { actor: String, detail: String },

    #[error("{what} has {actual} entries but the dataset has {expected} records")]
    LengthMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("{} was already written for this attempt", .0.display())]
    AlreadyWritten(PathBuf),

    #[error("corrupt {file} at line {line}: {reason}")]
    CorruptFile {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

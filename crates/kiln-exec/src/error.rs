use kiln_core::ports::{BuildError, PushError};
use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("non-zero exit code: {code}{}", tail_suffix(.stderr))]
    NonZeroExit { code: i32, stderr: String },
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("killed by signal")]
    KilledBySignal,
    #[error("missing program")]
    MissingProgram,
    #[error("io error: {0}")]
    Io(String),
    #[error("cancelled")]
    Cancelled,
}

fn tail_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<ExecError> for BuildError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Cancelled => BuildError::Cancelled,
            ExecError::NonZeroExit { .. } | ExecError::MissingProgram => {
                BuildError::Failed(e.to_string())
            }
            ExecError::Spawn(_) | ExecError::KilledBySignal | ExecError::Io(_) => {
                BuildError::Transient(e.to_string())
            }
        }
    }
}

impl ExecError {
    /// Push outcome; exit codes listed in `transient_codes` are worth another attempt.
    pub fn into_push_error(self, transient_codes: &[i32]) -> PushError {
        match self {
            ExecError::Cancelled => PushError::Cancelled,
            ExecError::NonZeroExit { code, .. } if transient_codes.contains(&code) => {
                PushError::Transient(self.to_string())
            }
            ExecError::NonZeroExit { .. } | ExecError::MissingProgram => {
                PushError::Rejected(self.to_string())
            }
            ExecError::Spawn(_) | ExecError::KilledBySignal | ExecError::Io(_) => {
                PushError::Transient(self.to_string())
            }
        }
    }
}

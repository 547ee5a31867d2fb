use thiserror::Error;

use crate::app::builder::BuildError;
use crate::app::config::ConfigError;
use crate::domain::errors::{DispatchError, JobDescriptorError, TransitionError};

/// Crate-level error for callers that do not care which layer failed.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Descriptor(#[from] JobDescriptorError),

    #[error("failed to start the runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

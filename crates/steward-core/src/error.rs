use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{DescriptorError, TaskIdentity};
use crate::ports::StoreError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown task identity '{0}'")]
    UnknownTask(TaskIdentity),

    #[error("invalid task descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

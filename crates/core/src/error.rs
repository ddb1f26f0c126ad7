use thiserror::Error;

use crate::task::{TaskId, TaskStatus};

#[derive(Error, Debug)]
pub enum TaskqError {
    #[error("priority {0} is outside the accepted range 1..=10")]
    InvalidPriority(i64),

    #[error("priority is not a number: {0:?}")]
    MalformedPriority(String),

    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("task {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}

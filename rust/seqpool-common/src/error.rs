use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn out_of_sequence(expected: u64, actual: u64) -> Error {
        Error(ErrorKind::OutOfSequence { expected, actual }.into())
    }

    pub fn pool_closed() -> Error {
        Error(ErrorKind::PoolClosed.into())
    }

    pub fn duplicate_completion(id: u64) -> Error {
        Error(ErrorKind::DuplicateCompletion { id }.into())
    }

    pub fn undelivered(cursor: Option<u64>, pending: Vec<u64>) -> Error {
        Error(ErrorKind::UndeliveredCompletions { cursor, pending }.into())
    }

    pub fn engine_failed(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::EngineFailed {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("work unit submitted out of sequence: expected id {expected}, got {actual}")]
    OutOfSequence { expected: u64, actual: u64 },

    #[error("pool is closed, no worker will accept further work")]
    PoolClosed,

    #[error("completion for id {id} was delivered more than once")]
    DuplicateCompletion { id: u64 },

    #[error(
        "completion channel closed with {} undelivered record(s) after cursor {}: {pending:?}",
        pending.len(),
        display_cursor(*cursor))]
    UndeliveredCompletions {
        cursor: Option<u64>,
        pending: Vec<u64>,
    },

    #[error("reorder engine failed: {message}")]
    EngineFailed { message: String },

    #[error("IO error for '{context}': {source}'")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

fn display_cursor(cursor: Option<u64>) -> String {
    cursor.map_or_else(|| "-1".to_string(), |c| c.to_string())
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

//! Completion records: the `(id, value)` result of executing one work unit.

use thiserror::Error;

/// Failure of a single work unit.
///
/// A failing unit does not disturb the pool: its record still takes its place
/// in the ordered stream, carrying this error instead of a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("work unit {id} panicked: {message}")]
    Panicked { id: u64, message: String },
}

/// The outcome of one work unit, tagged with the unit's sequence id.
///
/// Exactly one record is produced per submitted unit.
#[derive(Debug)]
pub struct Completion<R> {
    id: u64,
    value: Result<R, TaskError>,
}

impl<R> Completion<R> {
    pub fn new(id: u64, value: R) -> Self {
        Completion { id, value: Ok(value) }
    }

    pub fn failed(id: u64, error: TaskError) -> Self {
        Completion {
            id,
            value: Err(error),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_ok(&self) -> bool {
        self.value.is_ok()
    }

    pub fn value(&self) -> Result<&R, &TaskError> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Result<R, TaskError> {
        self.value
    }

    pub fn into_parts(self) -> (u64, Result<R, TaskError>) {
        (self.id, self.value)
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

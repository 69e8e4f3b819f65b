use std::fmt;

/// The own result type where the error part is an async friendly error.
pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand of a boxed Send, Sync error.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Errors a queue operation can surface to its caller.
///
/// Race losses during acquisition and redelivery-limit breaches are internal
/// signals handled by the delivery path, they never show up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    ExclusiveConsumerConflict = 403,
    NotFound = 404,
    PreconditionFailed = 406,
    QueueDeleted = 530,
    Internal = 541,
}

#[derive(Debug, Default)]
pub struct RuntimeError {
    pub queue: String,
    pub code: u16,
    pub text: String,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for RuntimeError {}

impl<T> From<RuntimeError> for Result<T> {
    fn from(value: RuntimeError) -> Self {
        Err(Box::new(value))
    }
}

impl QueueError {
    pub fn into_runtime_error(self, queue: &str, text: &str) -> RuntimeError {
        RuntimeError {
            queue: queue.to_owned(),
            code: self as u16,
            text: text.to_owned(),
        }
    }

    pub fn into_result<T>(self, queue: &str, text: &str) -> Result<T> {
        self.into_runtime_error(queue, text).into()
    }
}

/// Converts all errors as `RuntimeError`. Unknown errors are wrapped as
/// internal errors.
pub fn to_runtime_error(err: Error) -> RuntimeError {
    match err.downcast::<RuntimeError>() {
        Ok(rte) => *rte,
        Err(e) => RuntimeError {
            queue: "".to_owned(),
            code: QueueError::Internal as u16,
            text: format!("Internal error: {e}"),
        },
    }
}

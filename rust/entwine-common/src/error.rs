use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

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

    /// A mapping-time configuration fault: invalid dependency path, unknown
    /// type or property. Never recovered at runtime.
    pub fn configuration(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Configuration {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn resolution(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Resolution {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn derivation(key: impl Into<String>, reason: impl Into<String>) -> Error {
        Error(
            ErrorKind::Derivation {
                key: key.into(),
                reason: reason.into(),
            }
            .into(),
        )
    }

    pub fn loading(type_name: impl Into<String>, reason: impl Into<String>) -> Error {
        Error(
            ErrorKind::Loading {
                type_name: type_name.into(),
                reason: reason.into(),
            }
            .into(),
        )
    }

    pub fn queue_full() -> Error {
        Error(ErrorKind::QueueFull.into())
    }

    /// The unit of work driving a scroll or flush is no longer active.
    pub fn not_active(context: impl Into<String>) -> Error {
        Error(
            ErrorKind::NotActive {
                context: context.into(),
            }
            .into(),
        )
    }

    /// A worker, channel endpoint or completion handle disappeared before
    /// delivering its result.
    pub fn interrupted(context: impl Into<String>) -> Error {
        Error(
            ErrorKind::Interrupted {
                context: context.into(),
            }
            .into(),
        )
    }

    pub fn backend<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::Backend {
                context: context.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid mapping configuration for '{element}': {message}")]
    Configuration { element: String, message: String },

    #[error("reindexing resolution failed: {message}")]
    Resolution { message: String },

    #[error("failed to derive document for '{key}': {reason}")]
    Derivation { key: String, reason: String },

    #[error("failed to load entities of type '{type_name}': {reason}")]
    Loading { type_name: String, reason: String },

    #[error("operation queue is at capacity")]
    QueueFull,

    #[error("unit of work is no longer active: {context}")]
    NotActive { context: String },

    #[error("interrupted while waiting for '{context}'")]
    Interrupted { context: String },

    #[error("backend error: {context}")]
    Backend {
        context: String,
        source: StdErrorBoxed,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        // Failure outcomes fan out to multiple reporters; sources do not
        // survive the clone, only the rendered context does.
        match self.kind() {
            ErrorKind::InvalidArgument { name, message } => {
                Error::invalid_arg(name.clone(), message.clone())
            }
            ErrorKind::Configuration { element, message } => {
                Error::configuration(element.clone(), message.clone())
            }
            ErrorKind::Resolution { message } => Error::resolution(message.clone()),
            ErrorKind::Derivation { key, reason } => {
                Error::derivation(key.clone(), reason.clone())
            }
            ErrorKind::Loading { type_name, reason } => {
                Error::loading(type_name.clone(), reason.clone())
            }
            ErrorKind::QueueFull => Error::queue_full(),
            ErrorKind::NotActive { context } => Error::not_active(context.clone()),
            ErrorKind::Interrupted { context } => Error::interrupted(context.clone()),
            ErrorKind::Backend { context, source } => Error(
                ErrorKind::Backend {
                    context: format!("{context}: {source}"),
                    source: Box::new(ClonedSource),
                }
                .into(),
            ),
        }
    }
}

#[derive(Debug, Error)]
#[error("see context")]
struct ClonedSource;

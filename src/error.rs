//! Error types.

use derive_more::{Display, From};

use crate::models::{BoardId, PostId, Role, ThreadId};

/// Our error type.
#[derive(Debug, Display, From)]
pub enum Error {
    #[display(fmt = "Board #{} not found", board_id)]
    BoardNotFound { board_id: BoardId },
    #[display(fmt = "Thread #{} not found", thread_id)]
    ThreadNotFound { thread_id: ThreadId },
    #[display(fmt = "Post #{} not found", post_id)]
    PostNotFound { post_id: PostId },
    #[display(
        fmt = "Thread title must be between 3 and 200 characters, got {}",
        len
    )]
    TitleOutOfBounds { len: usize },
    #[display(
        fmt = "Post body must be between {} and 50000 characters, got {}",
        min,
        len
    )]
    BodyOutOfBounds { len: usize, min: usize },
    #[display(fmt = "Cannot add a post to a locked thread")]
    ThreadLocked,
    #[display(fmt = "Only the author of post #{} may edit it", post_id)]
    NotPostAuthor { post_id: PostId },
    #[display(fmt = "This action requires the {} role", required)]
    InsufficientRole { required: Role },
    #[display(fmt = "Database connection pool error: {}", _0)]
    #[from]
    R2d2Error(r2d2::Error),
    #[display(fmt = "Database error: {}", _0)]
    #[from]
    DatabaseError(diesel::result::Error),
    #[display(fmt = "Database migration error: {}", _0)]
    MigrationError(String),
    #[display(fmt = "Couldn't connect to the PostgreSQL database: {}", _0)]
    #[from]
    ConnectionError(diesel::ConnectionError),
    #[display(fmt = "YAML error: {}", _0)]
    #[from]
    YamlError(serde_yaml::Error),
    #[display(fmt = "JSON error: {}", _0)]
    #[from]
    JsonError(serde_json::Error),
    #[display(fmt = "Couldn't initialize logging: {}", _0)]
    #[from]
    LogError(log::SetLoggerError),
    #[display(fmt = "I/O error: {}", _0)]
    #[from]
    IoError(std::io::Error),
    #[display(fmt = "I/O error: {}: {}", msg, cause)]
    IoErrorMsg { cause: std::io::Error, msg: String },
}

impl Error {
    pub fn from_io_error<S>(cause: std::io::Error, msg: S) -> Error
    where
        S: Into<String>,
    {
        Error::IoErrorMsg {
            cause,
            msg: msg.into(),
        }
    }

    /// Whether this error means the target row doesn't exist (or was
    /// already soft-deleted). The moderation router treats these as "not
    /// applicable" rather than failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::BoardNotFound { .. }
                | Error::ThreadNotFound { .. }
                | Error::PostNotFound { .. }
        )
    }
}

impl std::error::Error for Error {}

/// Our result type.
pub type Result<T> = std::result::Result<T, Error>;

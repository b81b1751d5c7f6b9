//! Error taxonomy for every layer of the server. Each enum maps onto
//! the status code its layer surfaces to the client (see
//! [`HandlerError::status_code`]) rather than onto a bare `int` return
//! code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("i/o error while reading request: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request title line")]
    MalformedTitle,
    #[error("malformed header line")]
    MalformedHeader,
    #[error("malformed query string")]
    MalformedQuery,
    #[error("connection closed before any bytes were read")]
    EmptyRead,
}

#[derive(Debug, Error)]
pub enum MultiplexerError {
    #[error("file descriptor {0} exceeds the readiness ceiling")]
    Overflow(i32),
    #[error("multiplexer mutex poisoned")]
    Poisoned,
    #[error("readiness wait failed: {0}")]
    Select(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker is not alive")]
    NotAlive,
    #[error("worker is already active")]
    Active,
    #[error("unable to send to worker mailbox")]
    SendError,
    #[error("no idle worker available")]
    Overload,
    #[error("worker mutex poisoned")]
    Lock,
    #[error("error while reading request: {0}")]
    Read(#[from] RequestError),
    #[error("no handler matched the request")]
    WrongAction,
    #[error("handler returned an error: {0}")]
    InAction(#[from] HandlerError),
    #[error("completion callback failed: {0}")]
    Callback(std::io::Error),
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("requested path not found")]
    NotFound,
    #[error("requested path escapes the server root")]
    Forbidden,
}

impl HandlerError {
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::Io(_) => 500,
            HandlerError::NotFound => 404,
            HandlerError::Forbidden => 404,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("multiplexer error: {0}")]
    Multiplexer(#[from] MultiplexerError),
    #[error("server mutex poisoned")]
    Lock,
}

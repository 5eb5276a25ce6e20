use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid game entry: {0}")]
    InvalidEntry(String),

    #[error("Error while launching game \"{game}\": {message}")]
    Launch { game: String, message: String },

    #[error("Game \"{0}\" is already running")]
    AlreadyRunning(String),

    #[error("Process {0} does not exist")]
    ProcessNotFound(u32),

    #[error("Signal error: {0}")]
    Signal(String),
}

impl Error {
    /// True for an IO error of kind `NotFound`, e.g. deleting a record twice.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

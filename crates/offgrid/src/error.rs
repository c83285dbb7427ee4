use thiserror::Error;

#[derive(Error, Debug)]
pub enum OffgridError {
    #[error("Data error: {0}")]
    Data(#[from] offgrid_data::DataError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Engine has been shut down")]
    EngineShutDown,
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),
}

pub type Result<T> = std::result::Result<T, OffgridError>;

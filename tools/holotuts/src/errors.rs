use thiserror::Error;

#[derive(Debug, Error)]
pub enum HoloTutsError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("provider failure: {0}")]
    Provider(String),
    #[error("tutorial store is corrupt: {0}")]
    StoreCorrupt(String),
}

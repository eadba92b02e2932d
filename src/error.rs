use thiserror::Error;

#[derive(Debug, Error)]
pub enum SafeZoneError {
    #[error("not a clanzone data directory (run `clanzone init` first)")]
    NotInitialized,

    #[error("clanzone already initialized in this directory")]
    AlreadyInitialized,

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("no claim recorded for group '{0}'")]
    ClaimNotFound(String),

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("scenario error: {0}")]
    Scenario(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl SafeZoneError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::InvalidPolicy(_) => "invalid_policy",
            Self::ClaimNotFound(_) => "claim_not_found",
            Self::Locked(_) => "locked",
            Self::Scenario(_) => "scenario_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
            Self::Db(_) => "db_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, SafeZoneError>;

use thiserror::Error;

pub type AggrResult<T> = Result<T, AggrError>;

/// Top-level error type for the aggregation core.
///
/// Each variant wraps one subsystem's own error enum so call sites can
/// match narrowly while `?` still composes across layers.
#[derive(Debug, Error)]
pub enum AggrError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Configuration loading failures. Always `StartupFatal`: the process
/// exits before doing any work.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("SYMBOLS must list at least one symbol")]
    NoSymbols,

    #[error("invalid symbol '{0}': {1}")]
    InvalidSymbol(String, String),

    #[error("invalid listen address '{0}'")]
    InvalidAddr(String),
}

/// Errors from the upstream exchange websocket adapter.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to connect to upstream stream: {0}")]
    Connect(String),

    #[error("upstream connection terminated: {0}")]
    Disconnected(String),

    #[error("failed to decode upstream message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("upstream sent an invalid symbol '{0}'")]
    InvalidSymbol(String),
}

/// Errors from converting or writing a bar to the database.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("failed to parse decimal '{value}' for column {column}")]
    Decimal {
        column: &'static str,
        value: String,
    },

    #[error("failed to write bar: {0}")]
    Write(#[from] sqlx::Error),
}

/// Errors surfaced on the `Candlesticks1MStream` RPC.
///
/// Carries the `tonic::Code` the handler should report, so
/// `From<RpcError> for tonic::Status` is mechanical.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request_id must not be empty")]
    EmptyRequestId,

    #[error("symbols must not be empty")]
    EmptySymbols,

    #[error("unsupported symbol: {0}")]
    UnsupportedSymbol(String),

    #[error("request_id changed mid-stream: expected '{expected}', got '{got}'")]
    RequestIdChanged { expected: String, got: String },

    #[error("transport error while receiving request: {0}")]
    Transport(#[source] tonic::Status),

    #[error("failed to receive the initial subscription request: {0}")]
    FirstReceiveFailed(#[source] tonic::Status),
}

impl RpcError {
    pub fn code(&self) -> tonic::Code {
        match self {
            RpcError::EmptyRequestId
            | RpcError::EmptySymbols
            | RpcError::UnsupportedSymbol(_)
            | RpcError::RequestIdChanged { .. } => tonic::Code::InvalidArgument,
            RpcError::Transport(_) => tonic::Code::Unknown,
            RpcError::FirstReceiveFailed(_) => tonic::Code::FailedPrecondition,
        }
    }
}

impl From<RpcError> for tonic::Status {
    fn from(err: RpcError) -> Self {
        tonic::Status::new(err.code(), err.to_string())
    }
}

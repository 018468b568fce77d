use thiserror::Error;

/// Fatal or transient errors raised while the engine is wired up or while it
/// talks to the store. Configuration and schema errors abort the process;
/// store errors surface to the transport layer without corrupting
/// in-memory state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database file is created by newer version of mqtt-db-logger (db_version > 1)")]
    SchemaTooNew,

    #[error("schema upgrade failed: {0}")]
    UpgradeFailed(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Errors returned to an RPC caller. The connection stays open; only this
/// one request fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("no channels specified")]
    NoChannels,

    #[error("'channels' items must be an arrays of size two")]
    BadChannelItem,

    #[error("unsupported request version")]
    UnsupportedVersion,
}

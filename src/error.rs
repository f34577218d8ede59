//! Crate-wide error taxonomy.

use thiserror::Error;

/// Errors raised by the metric store adapter. Always `TransientIO` in the
/// taxonomy: the caller logs and retries next tick.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no row found for {0}")]
    NotFound(String),
}

/// Errors raised while talking to the hypervisor control plane. `Lookup`
/// failures are per-entity (the caller drops that entity and continues);
/// `Connection` failures are transient or, at startup, fatal.
#[derive(Error, Debug)]
pub enum HypervisorError {
    #[error("hypervisor connection error: {0}")]
    Connection(String),
    #[error("lookup failed for {0}")]
    Lookup(String),
}

/// Configuration errors, always fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required config key: {0}")]
    MissingKey(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level error type for the whole crate.
///
/// Maps onto the error taxonomy: `Store`/`Hypervisor` cover `TransientIO`
/// and `PerEntityFailure`, `MigrationTimeout` and `CounterAnomaly` are their
/// own variants, `Config` covers `InvalidConfig`, and `Io`/`Process` cover
/// ad-hoc I/O failures (file rotation, SSH/ether-wake subprocess spawn).
#[derive(Error, Debug)]
pub enum TerracottaError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),

    #[error("migration of {vm} to {destination} timed out")]
    MigrationTimeout { vm: String, destination: String },

    /// Only the fatal branch of CounterAnomaly (negative host MHz) reaches
    /// this variant; a CPU-time counter reset is handled inline by reusing
    /// the previous sample.
    #[error("counter anomaly: {0}")]
    CounterAnomaly(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("subprocess {command} failed: {reason}")]
    Process { command: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TerracottaError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse cluster status JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Invalid cluster status snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Colocation constraints form a cycle between resources: {}", .0.join(" -> "))]
    ColocationCycle(Vec<String>),

    #[error("Allocation did not converge after {0} passes (colocation scores keep moving resources)")]
    AllocationDiverged(usize),

    #[error("Ordering constraints form a cycle between actions: {}", .0.join(" -> "))]
    OrderingCycle(Vec<String>),

    #[error("Invalid membership bitmap: {0}")]
    MembershipCodec(String),

    #[error("Fencing of node '{node}' failed: {source}")]
    Fencing { node: String, source: FenceError },

    #[error("Fencing device setup failed: {0}")]
    FencingSetup(FenceError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl Error {
    /// True for errors that mean the configuration itself is broken, as opposed to I/O or input syntax.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidSnapshot(_)
                | Error::ColocationCycle(_)
                | Error::AllocationDiverged(_)
                | Error::OrderingCycle(_)
                | Error::Conversion(_)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Unknown no-quorum policy '{0}'")]
    UnknownNoQuorumPolicy(String),

    #[error("Unknown resource role '{0}'")]
    UnknownRole(String),

    #[error("Unknown action task '{0}'")]
    UnknownTask(String),

    #[error("Unknown ordering kind '{0}'")]
    UnknownOrderKind(String),

    #[error("Unknown stonith action '{0}'")]
    UnknownStonithAction(String),

    #[error("Unknown recovery type '{0}'")]
    UnknownRecoveryType(String),

    #[error("Unknown restart type '{0}'")]
    UnknownRestartType(String),

    #[error("Unknown on-fail policy '{0}'")]
    UnknownOnFail(String),

    #[error("Unknown quorum rule '{0}'")]
    UnknownQuorumRule(String),

    #[error("Unknown score '{0}'")]
    InvalidScore(String),
}

/// Outcome codes of a fencing device operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FenceError {
    #[error("bad device configuration: {0}")]
    BadConfig(String),

    #[error("cannot access fencing device")]
    Access,

    #[error("device does not control host '{0}'")]
    BadHost(String),

    #[error("reset failed")]
    ResetFailed,

    #[error("timed out talking to the device")]
    Timeout,

    #[error("no fencing device is configured")]
    NoDevice,

    #[error("unexpected device failure: {0}")]
    Oops(String),
}

pub type Result<T> = std::result::Result<T, Error>;

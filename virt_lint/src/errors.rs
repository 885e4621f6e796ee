//! Error types for the validator engine

use crate::logging::codes;
use crate::logging::Code;
use std::path::PathBuf;

pub type VirtLintResult<T> = Result<T, VirtLintError>;

/// Validator search and metadata problems
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Validator location '{path}' could not be read: {reason}")]
    UnreadableLocation { path: PathBuf, reason: String },

    #[error("Malformed validator metadata in '{path}' at line {line}: {reason}")]
    MalformedMetadata {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Validator '{id}' is registered more than once")]
    DuplicateValidator { id: String },

    #[error("Validator '{id}' declares no tags")]
    MissingTags { id: String },
}

/// Errors surfaced by the engine facade
#[derive(Debug, thiserror::Error)]
pub enum VirtLintError {
    #[error("Unable to parse {what} XML: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("Validator discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Validator '{validator}' requires a connection")]
    ConnectionRequired { validator: String },

    #[error("Validator '{validator}' failed: {reason}")]
    ValidatorExecution { validator: String, reason: String },

    #[error("Session has been released")]
    Closed,

    #[error("Connection '{uri}' failed: {reason}")]
    Connection { uri: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VirtLintError {
    pub fn parse(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            what,
            reason: reason.into(),
        }
    }

    pub fn execution(validator: &str, reason: impl std::fmt::Display) -> Self {
        Self::ValidatorExecution {
            validator: validator.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller can retry with different input on the same session
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Closed | Self::Discovery(_))
    }

    /// Log code for this error
    pub fn code(&self) -> Code {
        match self {
            Self::Parse { .. } => codes::input::MALFORMED_XML,
            Self::Discovery(DiscoveryError::MalformedMetadata { .. })
            | Self::Discovery(DiscoveryError::MissingTags { .. }) => {
                codes::discovery::MALFORMED_METADATA
            }
            Self::Discovery(DiscoveryError::DuplicateValidator { .. }) => {
                codes::discovery::DUPLICATE_VALIDATOR
            }
            Self::Discovery(DiscoveryError::UnreadableLocation { .. }) => {
                codes::discovery::DISCOVERY_FAILED
            }
            Self::ConnectionRequired { .. } => codes::validation::CONNECTION_REQUIRED,
            Self::ValidatorExecution { .. } => codes::validation::VALIDATOR_FAILED,
            Self::Closed => codes::validation::SESSION_CLOSED,
            Self::Connection { .. } => codes::validation::CONNECTION_FAILED,
            Self::Configuration { .. } => codes::system::CONFIGURATION_ERROR,
            Self::Io(_) => codes::system::IO_ERROR,
        }
    }

    /// Short hint printed by the CLI after the error itself
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::ConnectionRequired { .. } => Some(
                "connect to a host or restrict the run to tags whose validators work offline",
            ),
            Self::Discovery(_) => Some("check the validator search path"),
            Self::Parse { .. } => Some("the input must be a well-formed XML document"),
            _ => None,
        }
    }
}

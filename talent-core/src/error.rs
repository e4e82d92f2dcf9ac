//! Error taxonomy shared by the gateway and the orchestration layer.
//!
//! | Kind | Variant | Reaches a remote service | Retry eligible |
//! |------|---------|--------------------------|----------------|
//! | Validation | `ServiceError::Validation` | never | no |
//! | Application | `ServiceError::Rejected` | yes (or local authorization precheck) | no |
//! | Transport | `ServiceError::Transport` | attempted | yes, except malformed replies |
//! | Invariant | `ServiceError::Invariant` | never | no |

use std::fmt;

use thiserror::Error;

use crate::gateway::ServiceEndpoint;
use crate::models::Principal;

/// Coarse classification used by callers to decide on retries and messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Application,
    Transport,
    Invariant,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: String,
        reason: RejectReason,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl ServiceError {
    pub fn rejected(operation: impl Into<String>, reason: RejectReason) -> Self {
        ServiceError::Rejected {
            operation: operation.into(),
            reason,
        }
    }

    pub fn not_authorized(operation: impl Into<String>) -> Self {
        Self::rejected(operation, RejectReason::NotAuthorized)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Rejected { .. } => ErrorKind::Application,
            ServiceError::Transport(_) => ErrorKind::Transport,
            ServiceError::Invariant(_) => ErrorKind::Invariant,
        }
    }

    /// Whether re-issuing the whole operation from its first step may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport(err) => err.is_retryable(),
            ServiceError::Rejected { reason, .. } => {
                matches!(reason, RejectReason::TemporarilyUnavailable)
            }
            _ => false,
        }
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            ServiceError::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn is_not_authorized(&self) -> bool {
        matches!(self.reject_reason(), Some(RejectReason::NotAuthorized))
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(ValidationError::Fields(err))
    }
}

/// Input problems caught before any network call.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("amount must be a positive integer")]
    NonPositiveAmount,

    #[error("invalid amount {0:?}")]
    InvalidAmount(String),

    #[error("amount overflows the ledger's natural number range")]
    AmountOverflow,

    #[error("token has no unit price and cannot be bought")]
    UnpricedToken,

    #[error("malformed principal {text:?}: {message}")]
    MalformedPrincipal { text: String, message: &'static str },

    #[error("module payload is empty")]
    EmptyModule,

    #[error("{0}")]
    Fields(validator::ValidationErrors),
}

/// The call could not be completed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{endpoint} unreachable: {message}")]
    Unreachable {
        endpoint: ServiceEndpoint,
        message: String,
    },

    #[error("{endpoint} timed out")]
    Timeout { endpoint: ServiceEndpoint },

    #[error("{endpoint} answered HTTP {status}: {body}")]
    Status {
        endpoint: ServiceEndpoint,
        status: u16,
        body: String,
    },

    #[error("malformed reply to {operation}: {message}")]
    MalformedResponse { operation: String, message: String },
}

impl TransportError {
    pub fn malformed(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        TransportError::MalformedResponse {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Unreachable { .. } | TransportError::Timeout { .. } => true,
            // 4xx means the request itself was refused by the HTTP layer
            TransportError::Status { status, .. } => *status >= 500 || *status == 429,
            TransportError::MalformedResponse { .. } => false,
        }
    }
}

/// Locally detected inconsistencies.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("no active session")]
    NoActiveSession,

    #[error("session ended while the operation was in flight")]
    StaleSession,

    #[error("request {request_id} is already {status}")]
    RequestNotPending {
        request_id: Principal,
        status: crate::models::RequestStatus,
    },

    #[error("request {request_id} is not in the local view; refresh first")]
    UnknownRequest { request_id: Principal },
}

/// Structured reason attached to an application-level rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NotAuthorized,
    AlreadyHasAdmin,
    AdminNotRegistered,
    RequestNotFound,
    NotFound(String),
    AlreadyExists(String),
    InsufficientAllowance { allowance: Option<u128> },
    InsufficientFunds { balance: Option<u128> },
    AllowanceChanged { current_allowance: Option<u128> },
    BadFee { expected_fee: Option<u128> },
    Expired,
    TooOld,
    CreatedInFuture,
    Duplicate,
    TemporarilyUnavailable,
    TransferFailed(String),
    Generic { code: Option<u128>, message: String },
    Other(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotAuthorized => write!(f, "NotAuthorized"),
            RejectReason::AlreadyHasAdmin => write!(f, "AlreadyHasAdmin"),
            RejectReason::AdminNotRegistered => write!(f, "AdminNotRegistered"),
            RejectReason::RequestNotFound => write!(f, "RequestNotFound"),
            RejectReason::NotFound(what) => write!(f, "NotFound: {}", what),
            RejectReason::AlreadyExists(what) => write!(f, "AlreadyExists: {}", what),
            RejectReason::InsufficientAllowance { allowance } => match allowance {
                Some(a) => write!(f, "InsufficientAllowance (allowance {})", a),
                None => write!(f, "InsufficientAllowance"),
            },
            RejectReason::InsufficientFunds { balance } => match balance {
                Some(b) => write!(f, "InsufficientFunds (balance {})", b),
                None => write!(f, "InsufficientFunds"),
            },
            RejectReason::AllowanceChanged { .. } => write!(f, "AllowanceChanged"),
            RejectReason::BadFee { expected_fee } => match expected_fee {
                Some(fee) => write!(f, "BadFee (expected {})", fee),
                None => write!(f, "BadFee"),
            },
            RejectReason::Expired => write!(f, "Expired"),
            RejectReason::TooOld => write!(f, "TooOld"),
            RejectReason::CreatedInFuture => write!(f, "CreatedInFuture"),
            RejectReason::Duplicate => write!(f, "Duplicate"),
            RejectReason::TemporarilyUnavailable => write!(f, "TemporarilyUnavailable"),
            RejectReason::TransferFailed(msg) => write!(f, "TransferFailed: {}", msg),
            RejectReason::Generic { code, message } => match code {
                Some(c) => write!(f, "GenericError {}: {}", c, message),
                None => write!(f, "GenericError: {}", message),
            },
            RejectReason::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Failures while assembling configuration or transports.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint url {url:?}: {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("Tracing setup failed: {0}")]
    Tracing(anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

//! Faucet request records.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Principal, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    /// Approved and Rejected never change again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requester's faucet record as mirrored on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub requester: Principal,
    pub current_amount_requested: u128,
    pub total_requests_count: u32,
    pub total_amount_granted: u128,
    pub status: RequestStatus,
}

impl FaucetRequest {
    pub fn id(&self) -> &RequestId {
        &self.requester
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

//! Domain records exchanged with the marketplace services.

mod faucet;
mod principal;
mod profile;
mod token;

pub use faucet::{FaucetRequest, RequestStatus};
pub use principal::{Principal, RequestId, TokenId};
pub use profile::{Profile, UserStats};
pub use token::{TalentToken, TokenBalance, TokenMetadata, TokenSpec};

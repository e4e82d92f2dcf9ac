//! talent-core: Shared infrastructure for the talent marketplace client.
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod observability;

pub use async_trait;
pub use secrecy;
pub use serde_json;
pub use tracing;
pub use validator;

pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use gateway::{ServiceEndpoint, ServiceGateway, Transport};

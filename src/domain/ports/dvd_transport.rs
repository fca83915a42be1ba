//! DVD Transport Port
//!
//! The wire contract between the customer service and the DVD service.
//! A request carries a DVD id; a response carries an error string that is
//! empty on success.

use crate::domain::errors::ServiceError;
use crate::infrastructure::CallContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Remote DVD operations reachable over the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteMethod {
    RentDvd,
    ReturnDvd,
}

impl RemoteMethod {
    /// Path of the method on the DVD service.
    pub fn path(&self) -> &'static str {
        match self {
            RemoteMethod::RentDvd => "/dvd/v1/rent",
            RemoteMethod::ReturnDvd => "/dvd/v1/return",
        }
    }
}

/// Wire request: `{"id": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: String,
}

/// Wire response: `{"err": ""}` on success, `{"err": "<message>"}` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    #[serde(default)]
    pub err: String,
}

impl WireResponse {
    /// Encode a local result into the wire representation.
    pub fn from_result(result: &Result<(), ServiceError>) -> Self {
        match result {
            Ok(()) => Self { err: String::new() },
            Err(e) => Self { err: e.to_string() },
        }
    }
}

/// Tagged remote result, decoded from the wire's string channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Success,
    Failed(String),
}

impl RemoteOutcome {
    pub fn into_result(self) -> Result<(), ServiceError> {
        match self {
            RemoteOutcome::Success => Ok(()),
            RemoteOutcome::Failed(message) => Err(ServiceError::remote(message)),
        }
    }
}

impl From<WireResponse> for RemoteOutcome {
    fn from(resp: WireResponse) -> Self {
        if resp.err.is_empty() {
            RemoteOutcome::Success
        } else {
            RemoteOutcome::Failed(resp.err)
        }
    }
}

/// Raw transport to the DVD service.
///
/// Transport failures (unreachable, non-success status, timeout) are
/// returned as errors; in-band remote errors arrive inside `WireResponse`.
#[async_trait]
pub trait DvdTransport: Send + Sync {
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: RemoteMethod,
        request: WireRequest,
    ) -> Result<WireResponse, ServiceError>;
}

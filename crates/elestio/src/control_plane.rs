use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

mod client;
mod endpoints;
mod envelope;


pub use client::HttpControlPlane;
pub use endpoints::Endpoint;
pub use envelope::RemoteList;
pub(crate) use envelope::response_message;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// An authenticated caller of the Elestio control-plane API.
///
/// Implementations attach the session token themselves and re-authenticate
/// once when the remote side rejects it.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// # Errors
    ///
    /// Returns [`crate::ElestioError::RemoteCallFailed`] on HTTP errors, explicit
    /// `KO`/`error` statuses, malformed bodies, or a second auth rejection.
    async fn call(&self, endpoint: Endpoint, method: Method, body: Value) -> Result<Value>;
}

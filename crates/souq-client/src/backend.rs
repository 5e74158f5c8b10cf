//! The hosted backend, as the client sees it.

use std::future::Future;

use serde_json::Value as JsonValue;

use crate::error::ClientError;

/// Remote procedure calls against the hosted database.
pub trait Backend: Send + Sync {
    /// Call `function` with named JSON `params`, returning its JSON result.
    fn rpc(
        &self,
        function: &str,
        params: JsonValue,
    ) -> impl Future<Output = Result<JsonValue, ClientError>> + Send;
}

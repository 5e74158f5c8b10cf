//! Promoting a post to an audience of users.

use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::ClientError;

/// RPC that queues promotion notifications.
pub const PROMOTE_POST_RPC: &str = "promote_post";

/// Who receives a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Users(u32),
}

impl Audience {
    /// Build an audience from the promote form: the "send to all" toggle
    /// and the raw user-count field.
    ///
    /// The field is read like a browser number input: the leading integer
    /// counts and anything after it (`"12.5"`, `"100 users"`) is ignored.
    pub fn parse(send_to_all: bool, raw: &str) -> Result<Self, ClientError> {
        if send_to_all {
            return Ok(Self::All);
        }
        let invalid = || ClientError::InvalidAudience(raw.to_string());

        let text = raw.trim_start();
        let (negative, unsigned) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let digits = unsigned
            .find(|c: char| !c.is_ascii_digit())
            .map_or(unsigned, |end| &unsigned[..end]);
        let count: u32 = digits.parse().map_err(|_| invalid())?;

        match count {
            0 => Ok(Self::All),
            _ if negative => Err(invalid()),
            count => Ok(Self::Users(count)),
        }
    }

    /// Wire value; 0 means every user.
    pub fn target_user_count(&self) -> u32 {
        match self {
            Self::All => 0,
            Self::Users(count) => *count,
        }
    }
}

/// A promotion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoteRequest {
    pub post_id: String,
    pub audience: Audience,
}

impl PromoteRequest {
    pub fn new(post_id: impl Into<String>, audience: Audience) -> Self {
        Self {
            post_id: post_id.into(),
            audience,
        }
    }

    /// Named RPC parameters.
    pub fn params(&self) -> JsonValue {
        json!({
            "post_id_to_promote": self.post_id,
            "target_user_count": self.audience.target_user_count(),
        })
    }
}

/// Ask the backend to promote a post.
pub async fn promote_post<B: Backend>(backend: &B, request: &PromoteRequest) -> Result<(), ClientError> {
    match backend.rpc(PROMOTE_POST_RPC, request.params()).await {
        Ok(_) => {
            info!(post = %request.post_id, audience = ?request.audience, "Promotion queued");
            Ok(())
        }
        Err(ClientError::Backend(err)) if err.is_missing_function(PROMOTE_POST_RPC) => {
            warn!(post = %request.post_id, "promote_post RPC is not provisioned");
            Err(ClientError::NotProvisioned(PROMOTE_POST_RPC.to_string()))
        }
        Err(e) => {
            warn!(post = %request.post_id, error = %e, "Promotion failed");
            Err(e)
        }
    }
}

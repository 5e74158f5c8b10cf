//! Client error types and their user-facing messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the backend's REST/RPC layer.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct BackendError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// The RPC function `name` has not been created in the database.
    pub fn is_missing_function(&self, name: &str) -> bool {
        let needle = format!("function public.{name}");
        let message = self.message.to_lowercase();
        (message.contains(&needle) && message.contains("does not exist"))
            || (self.code.as_deref() == Some("PGRST202") && message.contains(name))
    }

    /// A single-row query matched no rows.
    pub fn is_no_rows(&self) -> bool {
        self.code.as_deref() == Some("PGRST116") || self.message.contains("PGRST116")
    }
}

/// Errors surfaced to the UI layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Invalid audience size: {0:?}")]
    InvalidAudience(String),

    #[error("RPC function {0} is not provisioned")]
    NotProvisioned(String),

    #[error("Post not found")]
    PostNotFound,

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Message to show the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidAudience(_) => "الرجاء إدخال عدد مستخدمين صالح.".to_string(),
            Self::NotProvisioned(name) => format!(
                "ميزة الترويج غير مفعلة في قاعدة البيانات. يرجى إنشاء دالة RPC باسم '{name}'."
            ),
            Self::PostNotFound => "لم يتم العثور على المنشور.".to_string(),
            Self::Backend(err) => err.message.clone(),
            Self::Transport(msg) => msg.clone(),
        }
    }

    /// Classify a failed single-post load.
    pub fn from_post_load(err: BackendError) -> Self {
        if err.is_no_rows() {
            Self::PostNotFound
        } else {
            Self::Backend(err)
        }
    }
}

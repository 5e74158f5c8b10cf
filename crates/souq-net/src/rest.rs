//! REST/RPC transport for the hosted database.

use reqwest::{Client, StatusCode};
use serde_json::Value as JsonValue;
use souq_client::{Backend, BackendError, ClientError, Comment, Post, PostDetail};
use tracing::{debug, warn};
use url::Url;

use crate::{LoaderConfig, NetError};

/// Join for a single post: author, group, likes and the comment count.
/// `profiles` is reached through `user_id` explicitly since more than one
/// foreign key points at it.
pub const POST_SELECT: &str =
    "*,profiles!user_id(full_name,avatar_url),groups!group_id(name),likes(user_id),comments(count)";

/// Join for a post's comments with their authors.
pub const COMMENT_SELECT: &str = "*,profiles!user_id(full_name,avatar_url)";

/// Media type asking for exactly one row instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Backend over the database's `/rest/v1` endpoint.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base: Url,
    api_key: String,
    access_token: Option<String>,
}

impl RestBackend {
    /// `base` is the project URL, e.g. `https://xyz.supabase.co`.
    pub fn new(base: &str, api_key: impl Into<String>, config: LoaderConfig) -> Result<Self, NetError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: config.build_client()?,
            base,
            api_key: api_key.into(),
            access_token: None,
        })
    }

    /// Authenticate as a signed-in user instead of the anonymous key.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn rpc_url(&self, function: &str) -> Result<Url, NetError> {
        Ok(self.base.join(&format!("rest/v1/rpc/{function}"))?)
    }

    fn table_url(&self, table: &str) -> Result<Url, NetError> {
        Ok(self.base.join(&format!("rest/v1/{table}"))?)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.api_key);
        builder.header("apikey", &self.api_key).bearer_auth(token)
    }

    /// Load one post with its author, group, likes and comment count.
    pub async fn fetch_post(&self, post_id: &str) -> Result<Post, ClientError> {
        let url = self.table_url("posts").map_err(transport)?;
        let request = self
            .authorize(self.client.get(url))
            .query(&[("id", format!("eq.{post_id}")), ("select", POST_SELECT.to_string())])
            .header(http::header::ACCEPT, SINGLE_OBJECT);

        match read_json(request).await {
            Ok(row) => serde_json::from_value(row).map_err(transport),
            Err(ClientError::Backend(err)) => Err(ClientError::from_post_load(err)),
            Err(e) => Err(e),
        }
    }

    /// Load a post's comments, oldest first.
    pub async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>, ClientError> {
        let url = self.table_url("comments").map_err(transport)?;
        let request = self.authorize(self.client.get(url)).query(&[
            ("post_id", format!("eq.{post_id}")),
            ("select", COMMENT_SELECT.to_string()),
            ("order", "created_at.asc".to_string()),
        ]);
        match read_json(request).await? {
            JsonValue::Null => Ok(Vec::new()),
            rows => serde_json::from_value(rows).map_err(transport),
        }
    }

    /// Load everything a post-detail page starts from.
    pub async fn fetch_post_detail(&self, post_id: &str) -> Result<PostDetail, ClientError> {
        let post = self.fetch_post(post_id).await?;
        let comments = self.fetch_comments(post_id).await?;
        Ok(PostDetail::new(post, comments))
    }
}

impl Backend for RestBackend {
    async fn rpc(&self, function: &str, params: JsonValue) -> Result<JsonValue, ClientError> {
        let url = self.rpc_url(function).map_err(transport)?;
        debug!(function, url = %url, "Calling RPC");
        read_json(self.authorize(self.client.post(url)).json(&params)).await
    }
}

/// Send `request` and decode its JSON body, or the backend error body for
/// non-2xx replies.
async fn read_json(request: reqwest::RequestBuilder) -> Result<JsonValue, ClientError> {
    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let body = response.bytes().await.map_err(transport)?;

    if status.is_success() {
        if body.is_empty() || status == StatusCode::NO_CONTENT {
            return Ok(JsonValue::Null);
        }
        return serde_json::from_slice(&body).map_err(transport);
    }

    let mut err = serde_json::from_slice::<BackendError>(&body).unwrap_or_default();
    if err.message.is_empty() {
        err.message = match String::from_utf8_lossy(&body).trim() {
            "" => format!("HTTP {}", status.as_u16()),
            text => text.to_string(),
        };
    }
    warn!(status = status.as_u16(), code = ?err.code, message = %err.message, "Backend rejected request");
    Err(ClientError::Backend(err))
}

fn transport(err: impl std::fmt::Display) -> ClientError {
    ClientError::transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_url_keeps_base_path() {
        let backend = RestBackend::new("https://db.example/project", "anon", LoaderConfig::default()).unwrap();
        assert_eq!(
            backend.rpc_url("promote_post").unwrap().as_str(),
            "https://db.example/project/rest/v1/rpc/promote_post"
        );
    }
}

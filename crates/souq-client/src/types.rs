//! Rows of the backend tables, as the client reads them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Public profile fields joined onto posts and comments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub user_id: String,
    #[serde(default)]
    pub post_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, rename = "profiles")]
    pub author: Option<Profile>,
}

/// A post with its joined likes and comment count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub likes: Vec<Like>,
    /// Read from a plain `comment_count` column or a `comments(count)` embed.
    #[serde(default, alias = "comments", deserialize_with = "count_column")]
    pub comment_count: u32,
    /// Columns the client does not interpret (group, media, timestamps...).
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Post {
    /// Overlay the columns of an updated row.
    pub fn merge(&mut self, row: &JsonValue) {
        let Some(fields) = row.as_object() else {
            return;
        };
        for (key, value) in fields {
            match key.as_str() {
                // Identity and joined collections are never taken from a row update.
                "id" | "likes" | "comments" | "comment_count" => {}
                "user_id" => {
                    if let Some(user_id) = value.as_str() {
                        self.user_id = user_id.to_string();
                    }
                }
                "content" => {
                    if let Some(content) = value.as_str() {
                        self.content = content.to_string();
                    }
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }

    pub fn liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|l| l.user_id == user_id)
    }
}

/// An aggregate embed comes back as `[{ "count": n }]`.
fn count_column<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    struct Aggregate {
        count: u32,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Plain(u32),
        Embedded(Vec<Aggregate>),
    }

    Ok(match Count::deserialize(deserializer)? {
        Count::Plain(count) => count,
        Count::Embedded(rows) => rows.first().map_or(0, |row| row.count),
    })
}

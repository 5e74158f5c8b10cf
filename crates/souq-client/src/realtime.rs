//! Realtime updates for a post-detail page.
//!
//! The page subscribes to row changes on `comments`, `likes` and `posts`
//! filtered to one post and folds each event into [`PostDetail`].

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::types::{Comment, Like, Post, Profile};

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change event from the realtime stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub new: JsonValue,
    #[serde(default)]
    pub old: JsonValue,
}

fn default_schema() -> String {
    "public".to_string()
}

impl ChangeEvent {
    pub fn new(table: &str, kind: ChangeKind, new: JsonValue, old: JsonValue) -> Self {
        Self {
            schema: default_schema(),
            table: table.to_string(),
            kind,
            new,
            old,
        }
    }

    /// The row the event is about: `new` for inserts/updates, `old` for deletes.
    pub fn row(&self) -> &JsonValue {
        match self.kind {
            ChangeKind::Delete => &self.old,
            ChangeKind::Insert | ChangeKind::Update => &self.new,
        }
    }

    fn field(&self, column: &str) -> Option<&str> {
        self.row().get(column).and_then(JsonValue::as_str)
    }
}

/// One `postgres_changes` binding of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub event: ChangeKind,
    pub schema: String,
    pub table: String,
    /// Row filter in `column=eq.value` form.
    pub filter: String,
}

impl Binding {
    fn new(event: ChangeKind, table: &str, column: &str, value: &str) -> Self {
        Self {
            event,
            schema: default_schema(),
            table: table.to_string(),
            filter: format!("{column}=eq.{value}"),
        }
    }

    /// Whether `event` is delivered through this binding.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if self.event != event.kind || self.table != event.table || self.schema != event.schema {
            return false;
        }
        match self.filter.split_once("=eq.") {
            // Deletes may only carry the primary key; trust the server filter then.
            Some((column, value)) => match event.field(column) {
                Some(actual) => actual == value,
                None => event.kind == ChangeKind::Delete,
            },
            None => true,
        }
    }
}

/// A realtime channel and its bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub channel: String,
    pub bindings: Vec<Binding>,
}

impl Subscription {
    /// Everything a post-detail page listens to.
    pub fn for_post(post_id: &str) -> Self {
        use ChangeKind::*;
        Self {
            channel: format!("post-details-{post_id}"),
            bindings: vec![
                Binding::new(Insert, "comments", "post_id", post_id),
                Binding::new(Delete, "comments", "post_id", post_id),
                Binding::new(Insert, "likes", "post_id", post_id),
                Binding::new(Delete, "likes", "post_id", post_id),
                Binding::new(Update, "posts", "id", post_id),
                Binding::new(Delete, "posts", "id", post_id),
            ],
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.bindings.iter().any(|b| b.matches(event))
    }
}

/// What applying an event did to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Updated,
    /// The post itself was deleted; the page should leave.
    PostDeleted,
}

/// State of a post-detail page.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
    subscription: Subscription,
}

impl PostDetail {
    pub fn new(post: Post, comments: Vec<Comment>) -> Self {
        let subscription = Subscription::for_post(&post.id);
        Self {
            post,
            comments,
            subscription,
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Fold one realtime event into the page.
    pub fn apply(&mut self, event: &ChangeEvent) -> Outcome {
        if !self.subscription.matches(event) {
            trace!(table = %event.table, kind = ?event.kind, "Ignoring event for another row");
            return Outcome::Unchanged;
        }
        debug!(post = %self.post.id, table = %event.table, kind = ?event.kind, "Applying change");

        match (event.table.as_str(), event.kind) {
            ("comments", ChangeKind::Insert) => match serde_json::from_value::<Comment>(event.new.clone()) {
                Ok(comment) => {
                    if self.insert_comment(comment) {
                        self.post.comment_count += 1;
                        Outcome::Updated
                    } else {
                        Outcome::Unchanged
                    }
                }
                Err(_) => Outcome::Unchanged,
            },
            ("comments", ChangeKind::Delete) => match event.field("id") {
                Some(id) => {
                    self.comments.retain(|c| c.id != id);
                    self.post.comment_count = self.post.comment_count.saturating_sub(1);
                    Outcome::Updated
                }
                None => Outcome::Unchanged,
            },
            ("likes", ChangeKind::Insert) => match serde_json::from_value::<Like>(event.new.clone()) {
                Ok(like) if !self.post.liked_by(&like.user_id) => {
                    self.post.likes.push(like);
                    Outcome::Updated
                }
                _ => Outcome::Unchanged,
            },
            ("likes", ChangeKind::Delete) => match event.field("user_id") {
                Some(user_id) => {
                    let before = self.post.likes.len();
                    self.post.likes.retain(|l| l.user_id != user_id);
                    if self.post.likes.len() == before {
                        Outcome::Unchanged
                    } else {
                        Outcome::Updated
                    }
                }
                None => Outcome::Unchanged,
            },
            ("posts", ChangeKind::Update) => {
                self.post.merge(&event.new);
                Outcome::Updated
            }
            ("posts", ChangeKind::Delete) => Outcome::PostDeleted,
            _ => Outcome::Unchanged,
        }
    }

    /// Attach the author profile fetched for a realtime comment.
    pub fn attach_author(&mut self, comment_id: &str, profile: Profile) {
        if let Some(comment) = self.comments.iter_mut().find(|c| c.id == comment_id) {
            comment.author = Some(profile);
        }
    }

    /// Optimistic add after the user posts a comment; the realtime echo is
    /// then a no-op.
    pub fn comment_created(&mut self, comment: Comment) {
        if self.insert_comment(comment) {
            self.post.comment_count += 1;
        }
    }

    /// Local edit: only the content changes.
    pub fn comment_updated(&mut self, updated: &Comment) {
        if let Some(comment) = self.comments.iter_mut().find(|c| c.id == updated.id) {
            comment.content = updated.content.clone();
        }
    }

    pub fn comment_deleted(&mut self, comment_id: &str) {
        self.comments.retain(|c| c.id != comment_id);
    }

    fn insert_comment(&mut self, comment: Comment) -> bool {
        if self.comments.iter().any(|c| c.id == comment.id) {
            return false;
        }
        self.comments.push(comment);
        true
    }
}

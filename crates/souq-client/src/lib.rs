//! # Souq Client
//!
//! The parts of the Souq web client that talk to the hosted backend and
//! carry logic of their own:
//!
//! - **Promotions**: audience validation, the `promote_post` RPC call, and
//!   translation of backend failures into messages a user can act on
//! - **Realtime**: the subscription for a post-detail page and the reducer
//!   that folds change events into the page state
//!
//! Transport is behind the [`Backend`] trait; `souq-net` provides the HTTP
//! implementation.

pub mod backend;
pub mod error;
pub mod promote;
pub mod realtime;
pub mod types;

pub use backend::Backend;
pub use error::{BackendError, ClientError};
pub use promote::{promote_post, Audience, PromoteRequest};
pub use realtime::{Binding, ChangeEvent, ChangeKind, Outcome, PostDetail, Subscription};
pub use types::{Comment, Like, Post, Profile};

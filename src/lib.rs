pub mod actors;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod projection;
pub mod snapshot;
pub mod state;

pub use auth::AuthContext;
pub use config::{EngineOptions, SyncConfig};
pub use conversation::{ConversationSummary, MessageSummary, MessageType, Participant, UserProfile};
pub use state::{InboxState, InboxStateBuilder};

use tokio::sync::oneshot;

use crate::conversation::{ConversationSummary, MessageSummary};

#[derive(Debug)]
pub enum EngineMessage {
    SnapshotLoaded {
        conversations: Vec<ConversationSummary>,
    },
    MessageReceived {
        conversation_id: String,
        message: MessageSummary,
    },
    ConversationCreated {
        conversation: ConversationSummary,
    },
    MarkRead {
        conversation_id: String,
    },
    GetConversations {
        respond_to: oneshot::Sender<Vec<ConversationSummary>>,
    },
    GetTotalUnread {
        respond_to: oneshot::Sender<u64>,
    },
}

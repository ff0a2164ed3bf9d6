use tokio::sync::mpsc;
use tracing::info;

use super::messages::EngineMessage;
use crate::config::EngineOptions;
use crate::projection::Projection;

pub struct ProjectionEngine {
    pub receiver: mpsc::UnboundedReceiver<EngineMessage>,
    pub projection: Projection,
}

impl ProjectionEngine {
    pub fn new(
        current_user: i64,
        options: EngineOptions,
    ) -> (Self, mpsc::UnboundedSender<EngineMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let engine = Self {
            receiver,
            projection: Projection::new(current_user, options),
        };
        (engine, sender)
    }

    pub async fn run(mut self) {
        info!("Projection engine started");

        while let Some(message) = self.receiver.recv().await {
            match message {
                EngineMessage::SnapshotLoaded { conversations } => {
                    self.handle_snapshot_loaded(conversations);
                }
                EngineMessage::MessageReceived {
                    conversation_id,
                    message,
                } => {
                    self.handle_message_received(conversation_id, message);
                }
                EngineMessage::ConversationCreated { conversation } => {
                    self.handle_conversation_created(conversation);
                }
                EngineMessage::MarkRead { conversation_id } => {
                    self.handle_mark_read(conversation_id);
                }
                EngineMessage::GetConversations { respond_to } => {
                    let _ = respond_to.send(self.projection.conversations().to_vec());
                }
                EngineMessage::GetTotalUnread { respond_to } => {
                    let _ = respond_to.send(self.projection.total_unread());
                }
            }
        }

        info!("Projection engine stopped");
    }
}

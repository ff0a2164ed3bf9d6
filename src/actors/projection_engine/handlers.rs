use tracing::{debug, info, warn};

use super::engine::ProjectionEngine;
use crate::conversation::{ConversationSummary, MessageSummary};
use crate::metrics::Metrics;
use crate::projection::{ApplyOutcome, SnapshotOutcome};

impl ProjectionEngine {
    pub fn handle_snapshot_loaded(&mut self, conversations: Vec<ConversationSummary>) {
        let incoming = conversations.len();
        match self.projection.apply_snapshot(conversations) {
            SnapshotOutcome::Seeded(merge) => {
                info!(
                    "Projection seeded with {} conversations ({} unread): {} re-inserted, {} replayed, {} stale, {} dropped",
                    self.projection.conversations().len(),
                    self.projection.total_unread(),
                    merge.reinserted,
                    merge.replayed,
                    merge.stale,
                    merge.dropped_unknown
                );
                if merge.dropped_unknown > 0 {
                    Metrics::events_dropped("unknown_at_seed", merge.dropped_unknown);
                }
                Metrics::set_unread_total(self.projection.total_unread());
            }
            SnapshotOutcome::AlreadySeeded => {
                warn!(
                    "Ignoring snapshot of {} conversations, projection already seeded",
                    incoming
                );
            }
        }
    }

    pub fn handle_message_received(&mut self, conversation_id: String, message: MessageSummary) {
        match self.projection.apply_message(&conversation_id, message) {
            ApplyOutcome::Applied => {
                Metrics::event_applied("new_message");
                Metrics::set_unread_total(self.projection.total_unread());
                debug!("Applied message to conversation {}", conversation_id);
            }
            ApplyOutcome::Buffered { evicted_oldest } => {
                Metrics::event_buffered();
                if evicted_oldest {
                    Metrics::events_dropped("buffer_evicted", 1);
                    warn!("Pending buffer full, evicted oldest buffered event");
                }
                debug!(
                    "Buffered message for conversation {} until snapshot arrives",
                    conversation_id
                );
            }
            ApplyOutcome::UnknownConversation => {
                Metrics::events_dropped("unknown_conversation", 1);
                debug!("Dropped message for unknown conversation {}", conversation_id);
            }
            // apply_message never reports a duplicate
            _ => {}
        }
    }

    pub fn handle_conversation_created(&mut self, conversation: ConversationSummary) {
        let id = conversation.id.clone();
        match self.projection.apply_new_conversation(conversation) {
            ApplyOutcome::Applied => {
                Metrics::event_applied("new_conversation");
                Metrics::set_unread_total(self.projection.total_unread());
                info!("Added conversation {} to projection", id);
            }
            ApplyOutcome::Duplicate => {
                Metrics::events_dropped("duplicate_conversation", 1);
                debug!("Ignoring duplicate new-conversation event for {}", id);
            }
            _ => {}
        }
    }

    pub fn handle_mark_read(&mut self, conversation_id: String) {
        match self.projection.mark_read(&conversation_id) {
            ApplyOutcome::Applied => {
                Metrics::set_unread_total(self.projection.total_unread());
                debug!("Marked conversation {} as read", conversation_id);
            }
            ApplyOutcome::UnknownConversation => {
                debug!("Mark-read for unknown conversation {}", conversation_id);
            }
            _ => {}
        }
    }
}

use std::collections::VecDeque;

use crate::config::EngineOptions;
use crate::conversation::{ConversationSummary, MessageSummary};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Buffered { evicted_oldest: bool },
    Duplicate,
    UnknownConversation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Seeded(MergeSummary),
    AlreadySeeded,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub reinserted: usize,
    pub replayed: usize,
    pub stale: usize,
    pub dropped_unknown: usize,
}

// Ordered conversation list plus the running unread total. All mutation goes
// through the apply_* methods so the unread total never drifts from the sum
// of the per-conversation counts.
pub struct Projection {
    current_user: i64,
    options: EngineOptions,
    conversations: Vec<ConversationSummary>,
    total_unread: u64,
    seeded: bool,
    pending: VecDeque<(String, MessageSummary)>,
    early_created: Vec<String>,
}

impl Projection {
    pub fn new(current_user: i64, options: EngineOptions) -> Self {
        Self {
            current_user,
            options,
            conversations: Vec::new(),
            total_unread: 0,
            seeded: false,
            pending: VecDeque::new(),
            early_created: Vec::new(),
        }
    }

    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub fn total_unread(&self) -> u64 {
        self.total_unread
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn unread_sum(&self) -> u64 {
        self.conversations
            .iter()
            .map(|c| u64::from(c.unread_count))
            .sum()
    }

    // Wholesale replace: the server page wins over anything applied so far,
    // except conversations created by channel events while the fetch was in
    // flight, which are merged back in. Buffered early messages replay after
    // the merge in arrival order, each landing at its sorted position.
    pub fn apply_snapshot(&mut self, conversations: Vec<ConversationSummary>) -> SnapshotOutcome {
        if self.seeded {
            return SnapshotOutcome::AlreadySeeded;
        }
        self.seeded = true;

        let prior = std::mem::replace(&mut self.conversations, conversations);
        let mut merge = MergeSummary::default();

        for id in std::mem::take(&mut self.early_created) {
            let Some(local) = prior.iter().find(|c| c.id == id) else {
                continue;
            };
            match self.position(&id) {
                // the page already covers this conversation with newer state
                Some(i) if self.conversations[i].updated_at >= local.updated_at => {}
                Some(i) => {
                    self.conversations.remove(i);
                    self.sorted_insert(local.clone());
                    merge.reinserted += 1;
                }
                None => {
                    self.sorted_insert(local.clone());
                    merge.reinserted += 1;
                }
            }
        }

        self.total_unread = self.unread_sum();

        for (conversation_id, message) in std::mem::take(&mut self.pending) {
            match self.position(&conversation_id) {
                None => merge.dropped_unknown += 1,
                Some(i) if message.created_at <= self.conversations[i].updated_at => {
                    merge.stale += 1;
                }
                Some(i) => {
                    self.touch_replayed(i, message);
                    merge.replayed += 1;
                }
            }
        }

        SnapshotOutcome::Seeded(merge)
    }

    // A message event never introduces a conversation; unknown ids are
    // buffered until the snapshot lands, or dropped once it has.
    pub fn apply_message(&mut self, conversation_id: &str, message: MessageSummary) -> ApplyOutcome {
        match self.position(conversation_id) {
            Some(i) => {
                self.touch(i, message);
                ApplyOutcome::Applied
            }
            None if self.options.buffer_early_events && !self.seeded => {
                let evicted_oldest = self.buffer_push(conversation_id, message);
                ApplyOutcome::Buffered { evicted_oldest }
            }
            None => ApplyOutcome::UnknownConversation,
        }
    }

    pub fn apply_new_conversation(&mut self, mut conversation: ConversationSummary) -> ApplyOutcome {
        if self.position(&conversation.id).is_some() {
            return ApplyOutcome::Duplicate;
        }
        if self.options.count_self_created && conversation.unread_count == 0 {
            conversation.unread_count = 1;
        }
        self.total_unread += u64::from(conversation.unread_count);
        if !self.seeded && self.options.buffer_early_events {
            self.early_created.push(conversation.id.clone());
        }

        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        self.replay_pending_for(&id);
        ApplyOutcome::Applied
    }

    pub fn mark_read(&mut self, conversation_id: &str) -> ApplyOutcome {
        match self.position(conversation_id) {
            Some(i) => {
                let entry = &mut self.conversations[i];
                self.total_unread -= u64::from(entry.unread_count);
                entry.unread_count = 0;
                ApplyOutcome::Applied
            }
            None => ApplyOutcome::UnknownConversation,
        }
    }

    fn position(&self, conversation_id: &str) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == conversation_id)
    }

    // Core update step: pull the entry out, refresh its preview and sort
    // key, count unread for messages from other users. Callers decide where
    // the entry re-enters the list.
    fn refresh_entry(&mut self, index: usize, message: MessageSummary) -> ConversationSummary {
        let mut entry = self.conversations.remove(index);
        let incoming = message.sender_id != self.current_user;
        entry.updated_at = message.created_at;
        entry.last_message = Some(message);
        if incoming {
            entry.unread_count += 1;
            self.total_unread += 1;
        }
        entry
    }

    // Live events prepend: the message that just arrived is the newest
    // activity, so the front is already the sorted position.
    fn touch(&mut self, index: usize, message: MessageSummary) {
        let entry = self.refresh_entry(index, message);
        self.conversations.insert(0, entry);
    }

    // Replayed events carry historical timestamps that may be older than
    // other entries, so the entry goes back at its sorted position.
    fn touch_replayed(&mut self, index: usize, message: MessageSummary) {
        let entry = self.refresh_entry(index, message);
        self.sorted_insert(entry);
    }

    // Insert keeping updated_at descending; ties go in front of equal
    // entries, the same order live updates produce.
    fn sorted_insert(&mut self, entry: ConversationSummary) {
        let at = self
            .conversations
            .partition_point(|c| c.updated_at > entry.updated_at);
        self.conversations.insert(at, entry);
    }

    fn buffer_push(&mut self, conversation_id: &str, message: MessageSummary) -> bool {
        let evicted = if self.pending.len() >= self.options.pending_buffer_cap {
            self.pending.pop_front();
            true
        } else {
            false
        };
        self.pending.push_back((conversation_id.to_string(), message));
        evicted
    }

    fn replay_pending_for(&mut self, conversation_id: &str) {
        if self.pending.is_empty() {
            return;
        }
        let matching: Vec<MessageSummary> = {
            let mut kept = VecDeque::with_capacity(self.pending.len());
            let mut matching = Vec::new();
            for (id, message) in std::mem::take(&mut self.pending) {
                if id == conversation_id {
                    matching.push(message);
                } else {
                    kept.push_back((id, message));
                }
            }
            self.pending = kept;
            matching
        };
        for message in matching {
            if let Some(i) = self.position(conversation_id) {
                if message.created_at > self.conversations[i].updated_at {
                    self.touch_replayed(i, message);
                }
            }
        }
    }
}

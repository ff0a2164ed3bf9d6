use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::actors::channel_client::ChannelClient;
use crate::actors::projection_engine::{EngineMessage, ProjectionEngine};
use crate::auth::AuthContext;
use crate::config::SyncConfig;
use crate::conversation::ConversationSummary;
use crate::error::SyncError;
use crate::snapshot::SnapshotLoader;

pub struct InboxState {
    engine_sender: mpsc::UnboundedSender<EngineMessage>,
    cancel: CancellationToken,
    engine_task: JoinHandle<()>,
    channel_task: JoinHandle<()>,
    snapshot_task: JoinHandle<()>,
}

impl InboxState {
    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        let (respond_to, response) = oneshot::channel();
        if self
            .engine_sender
            .send(EngineMessage::GetConversations { respond_to })
            .is_err()
        {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    pub async fn total_unread(&self) -> u64 {
        let (respond_to, response) = oneshot::channel();
        if self
            .engine_sender
            .send(EngineMessage::GetTotalUnread { respond_to })
            .is_err()
        {
            return 0;
        }
        response.await.unwrap_or(0)
    }

    pub fn mark_read(&self, conversation_id: &str) {
        let _ = self.engine_sender.send(EngineMessage::MarkRead {
            conversation_id: conversation_id.to_string(),
        });
    }

    // Seam for embedding applications that drive the engine directly.
    pub fn engine_sender(&self) -> mpsc::UnboundedSender<EngineMessage> {
        self.engine_sender.clone()
    }

    pub async fn shutdown(self) {
        info!("Inbox state shutting down");
        self.cancel.cancel();
        let _ = self.channel_task.await;
        let _ = self.snapshot_task.await;
        // the engine stops once every sender is gone
        drop(self.engine_sender);
        let _ = self.engine_task.await;
        info!("Inbox state shut down");
    }
}

#[derive(Default)]
pub struct InboxStateBuilder {
    config: Option<SyncConfig>,
    auth: Option<AuthContext>,
}

impl InboxStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn build(self) -> Result<InboxState, SyncError> {
        let config = self
            .config
            .ok_or_else(|| SyncError::Config("sync configuration is required".to_string()))?;
        let auth = self
            .auth
            .ok_or_else(|| SyncError::Config("auth context is required".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let cancel = CancellationToken::new();
        let (engine, engine_sender) = ProjectionEngine::new(auth.user_id(), config.options);
        let engine_task = tokio::spawn(engine.run());

        let loader = SnapshotLoader::new(http.clone(), config.api_base_url.clone(), auth.clone());
        let snapshot_sender = engine_sender.clone();
        let snapshot_cancel = cancel.clone();
        let (limit, offset) = (config.page_limit, config.page_offset);
        let snapshot_task = tokio::spawn(async move {
            tokio::select! {
                _ = snapshot_cancel.cancelled() => {
                    debug!("Snapshot fetch cancelled before completion");
                }
                result = loader.fetch(limit, offset) => match result {
                    Ok(conversations) => {
                        if snapshot_sender
                            .send(EngineMessage::SnapshotLoaded { conversations })
                            .is_err()
                        {
                            debug!("Projection already torn down, discarding snapshot");
                        }
                    }
                    Err(e) => {
                        error!("Snapshot load failed, projection stays empty: {}", e);
                    }
                },
            }
        });

        let channel = ChannelClient::new(
            config,
            auth,
            http,
            engine_sender.clone(),
            cancel.clone(),
        );
        let channel_task = tokio::spawn(channel.run());

        Ok(InboxState {
            engine_sender,
            cancel,
            engine_task,
            channel_task,
            snapshot_task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

    fn test_auth() -> AuthContext {
        let token = format!(
            "header.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"user_id":7}"#)
        );
        AuthContext::from_bearer_token(&token).unwrap()
    }

    #[test]
    fn build_requires_config_and_auth() {
        assert!(matches!(
            InboxStateBuilder::new().build(),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            InboxStateBuilder::new()
                .with_config(SyncConfig::default())
                .build(),
            Err(SyncError::Config(_))
        ));
    }

    // Default config points at local ports with nothing listening, so the
    // channel client sits in its connect/handshake phase when the token
    // fires. Shutdown has to come back promptly anyway.
    #[tokio::test]
    async fn shutdown_returns_promptly_during_startup() {
        let state = InboxStateBuilder::new()
            .with_config(SyncConfig::default())
            .with_auth(test_auth())
            .build()
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), state.shutdown())
            .await
            .expect("shutdown stalled behind a startup wait");
    }
}

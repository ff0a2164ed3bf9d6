use std::time::Instant;

use serde::Deserialize;
use tracing::debug;

use crate::auth::AuthContext;
use crate::conversation::ConversationSummary;
use crate::error::SnapshotError;
use crate::metrics::Metrics;

pub const CONVERSATIONS_PATH: &str = "/conversations";

#[derive(Debug, Deserialize)]
struct SnapshotEnvelope {
    data: SnapshotData,
}

#[derive(Debug, Deserialize)]
struct SnapshotData {
    #[serde(default)]
    conversations: Vec<ConversationSummary>,
}

pub struct SnapshotLoader {
    http: reqwest::Client,
    api_base_url: String,
    auth: AuthContext,
}

impl SnapshotLoader {
    pub fn new(http: reqwest::Client, api_base_url: String, auth: AuthContext) -> Self {
        Self {
            http,
            api_base_url,
            auth,
        }
    }

    pub async fn fetch(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, SnapshotError> {
        let started = Instant::now();
        match self.fetch_page(limit, offset).await {
            Ok(conversations) => {
                Metrics::snapshot_fetch("ok", started.elapsed());
                debug!("snapshot returned {} conversations", conversations.len());
                Ok(conversations)
            }
            Err(e) => {
                Metrics::snapshot_fetch("error", started.elapsed());
                Err(e)
            }
        }
    }

    async fn fetch_page(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationSummary>, SnapshotError> {
        let url = format!(
            "{}{}",
            self.api_base_url.trim_end_matches('/'),
            CONVERSATIONS_PATH
        );
        let response = self
            .http
            .get(url)
            .bearer_auth(self.auth.bearer_token())
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SnapshotError::Status(response.status()));
        }

        let envelope: SnapshotEnvelope = response.json().await?;
        Ok(envelope.data.conversations)
    }
}

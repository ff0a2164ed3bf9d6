use std::time::Duration;

use inbox_sync::{AuthContext, InboxStateBuilder, SyncConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SyncConfig::from_env();
    let token = std::env::var("INBOX_BEARER_TOKEN").unwrap();

    let auth = match AuthContext::from_bearer_token(&token) {
        Ok(auth) => auth,
        Err(e) => {
            tracing::error!("Cannot derive user identity from bearer token: {}", e);
            return;
        }
    };

    tracing::info!("Starting inbox sync for user {}", auth.user_id());

    let state = match InboxStateBuilder::new()
        .with_config(config)
        .with_auth(auth)
        .build()
    {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to build InboxState: {:?}", e);
            return;
        }
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let conversations = state.conversations().await;
                let total = state.total_unread().await;
                tracing::info!("{} conversations, {} unread", conversations.len(), total);
                if let Some(front) = conversations.first() {
                    tracing::info!(
                        "Most recent: {} (unread {})",
                        front.id,
                        front.unread_count
                    );
                }
            }
        }
    }

    state.shutdown().await;
}

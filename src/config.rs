use std::{env, fmt::Display, str::FromStr};

use tracing::warn;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub realtime_url: String,
    pub page_limit: u32,
    pub page_offset: u32,
    pub request_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub max_connect_attempts: u32,
    pub options: EngineOptions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    // legacy badge behavior: a freshly created conversation counts as unread
    pub count_self_created: bool,
    // queue events for unknown conversations until the snapshot lands
    pub buffer_early_events: bool,
    pub pending_buffer_cap: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            count_self_created: false,
            buffer_early_events: true,
            pending_buffer_cap: 256,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api".to_string(),
            realtime_url: "ws://127.0.0.1:6001/app/local?protocol=7".to_string(),
            page_limit: 20,
            page_offset: 0,
            request_timeout_secs: 30,
            handshake_timeout_secs: 10,
            max_connect_attempts: 3,
            options: EngineOptions::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            api_base_url: require("INBOX_API_URL"),
            realtime_url: require("INBOX_REALTIME_URL"),
            page_limit: try_load("INBOX_PAGE_LIMIT", "20"),
            page_offset: try_load("INBOX_PAGE_OFFSET", "0"),
            request_timeout_secs: try_load("INBOX_REQUEST_TIMEOUT_SECS", "30"),
            handshake_timeout_secs: try_load("INBOX_HANDSHAKE_TIMEOUT_SECS", "10"),
            max_connect_attempts: try_load("INBOX_CONNECT_ATTEMPTS", "3"),
            options: EngineOptions {
                count_self_created: try_load("INBOX_COUNT_SELF_CREATED", "false"),
                buffer_early_events: try_load("INBOX_BUFFER_EARLY_EVENTS", "true"),
                pending_buffer_cap: try_load("INBOX_PENDING_BUFFER_CAP", "256"),
            },
        }
    }
}

fn require(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{} must be set", key))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        warn!("{} not set, defaulting to {}", key, default);
        default.to_string()
    });
    raw.parse().unwrap_or_else(|e| {
        panic!("{} has unparseable value {:?}: {}", key, raw, e);
    })
}

use std::sync::LazyLock;
use std::time::Duration;

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, TextEncoder, histogram_opts, opts,
    register_counter, register_counter_vec, register_gauge, register_histogram,
};

static CHANNEL_EVENTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        opts!(
            "inbox_channel_events_total",
            "Application events received on the private channel"
        ),
        &["event"]
    )
    .unwrap()
});

static EVENTS_APPLIED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        opts!(
            "inbox_events_applied_total",
            "Channel events applied to the projection"
        ),
        &["event"]
    )
    .unwrap()
});

static EVENTS_DROPPED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        opts!(
            "inbox_events_dropped_total",
            "Channel events discarded without touching the projection"
        ),
        &["reason"]
    )
    .unwrap()
});

static EVENTS_BUFFERED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!(
        "inbox_events_buffered_total",
        "Events queued for conversations not yet known to the projection"
    ))
    .unwrap()
});

static SNAPSHOT_RESULTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        opts!(
            "inbox_snapshot_results_total",
            "Conversation snapshot fetches by outcome"
        ),
        &["outcome"]
    )
    .unwrap()
});

static SNAPSHOT_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        histogram_opts!(
            "inbox_snapshot_fetch_duration_seconds",
            "Time spent fetching the conversation snapshot"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap()
});

static CHANNEL_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(opts!(
        "inbox_channel_connected",
        "Whether the private channel subscription is currently live"
    ))
    .unwrap()
});

static UNREAD_TOTAL: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(opts!(
        "inbox_unread_total",
        "Running unread total across all conversations"
    ))
    .unwrap()
});

pub struct Metrics;

impl Metrics {
    pub fn channel_event(event: &str) {
        CHANNEL_EVENTS_TOTAL.with_label_values(&[event]).inc();
    }

    pub fn event_applied(event: &str) {
        EVENTS_APPLIED_TOTAL.with_label_values(&[event]).inc();
    }

    pub fn events_dropped(reason: &str, count: usize) {
        EVENTS_DROPPED_TOTAL
            .with_label_values(&[reason])
            .inc_by(count as f64);
    }

    pub fn event_buffered() {
        EVENTS_BUFFERED_TOTAL.inc();
    }

    pub fn snapshot_fetch(outcome: &str, duration: Duration) {
        SNAPSHOT_RESULTS_TOTAL.with_label_values(&[outcome]).inc();
        SNAPSHOT_FETCH_DURATION.observe(duration.as_secs_f64());
    }

    pub fn channel_connected() {
        CHANNEL_CONNECTED.set(1.0);
    }

    pub fn channel_disconnected() {
        CHANNEL_CONNECTED.set(0.0);
    }

    pub fn set_unread_total(total: u64) {
        UNREAD_TOTAL.set(total as f64);
    }
}

pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metrics() {
        Metrics::event_applied("new_message");
        Metrics::set_unread_total(4);
        let text = render().unwrap();
        assert!(text.contains("inbox_events_applied_total"));
        assert!(text.contains("inbox_unread_total"));
    }
}

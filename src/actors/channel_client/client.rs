use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol;
use crate::actors::projection_engine::EngineMessage;
use crate::auth::{AuthContext, authorize_channel};
use crate::config::SyncConfig;
use crate::error::ChannelError;
use crate::metrics::Metrics;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SessionEnd {
    Cancelled,
    SocketClosed,
}

// Owns the realtime connection for the user's private channel. Each session
// walks the full handshake (connection_established, token exchange,
// subscribe, subscription_succeeded) before any event reaches the engine.
pub struct ChannelClient {
    config: SyncConfig,
    auth: AuthContext,
    http: reqwest::Client,
    engine_sender: mpsc::UnboundedSender<EngineMessage>,
    cancel: CancellationToken,
}

impl ChannelClient {
    pub fn new(
        config: SyncConfig,
        auth: AuthContext,
        http: reqwest::Client,
        engine_sender: mpsc::UnboundedSender<EngineMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            auth,
            http,
            engine_sender,
            cancel,
        }
    }

    pub async fn run(self) {
        let channel_name = self.auth.channel_name();
        info!("Channel client started for {}", channel_name);

        let max_attempts = self.config.max_connect_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            attempt += 1;

            match self.session(&channel_name).await {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::SocketClosed) => {
                    warn!("Channel connection for {} dropped, reconnecting", channel_name);
                    // the subscription had succeeded, count failures afresh
                    attempt = 0;
                }
                Err(e) => {
                    warn!(
                        "Channel session attempt {}/{} failed: {}",
                        attempt, max_attempts, e
                    );
                    if attempt >= max_attempts {
                        error!(
                            "Giving up on {} after {} attempts, projection continues snapshot-only",
                            channel_name, max_attempts
                        );
                        break;
                    }
                }
            }

            let backoff = Duration::from_millis(250 * u64::from(attempt.max(1)));
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        info!("Channel client stopped for {}", channel_name);
    }

    async fn session(&self, channel_name: &str) -> Result<SessionEnd, ChannelError> {
        debug!("Connecting to {}", self.config.realtime_url);
        let (mut socket, _) = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            connected = connect_async(self.config.realtime_url.as_str()) => {
                connected.map_err(ChannelError::Connect)?
            }
        };

        let result = self.subscribed_session(&mut socket, channel_name).await;
        // teardown runs on every exit path, repeated closes are harmless
        self.teardown(&mut socket, channel_name).await;
        result
    }

    async fn subscribed_session(
        &self,
        socket: &mut Socket,
        channel_name: &str,
    ) -> Result<SessionEnd, ChannelError> {
        let handshake = Duration::from_secs(self.config.handshake_timeout_secs);

        // shutdown must not sit out the handshake timeout, so every wait
        // below also races the cancellation token
        let established = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            waited = timeout(
                handshake,
                await_event(socket, protocol::CONNECTION_ESTABLISHED),
            ) => waited.map_err(|_| ChannelError::HandshakeTimeout(handshake))??,
        };
        let connection: protocol::ConnectionEstablished = established
            .data_as()
            .map_err(|e| ChannelError::Protocol(e.to_string()))?;
        debug!("Connection established with socket id {}", connection.socket_id);

        let authorization = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            authorized = authorize_channel(
                &self.http,
                &self.config.api_base_url,
                &self.auth,
                &connection.socket_id,
                channel_name,
            ) => authorized?,
        };

        send_frame(socket, &protocol::subscribe(channel_name, &authorization)).await?;

        tokio::select! {
            _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            waited = timeout(
                handshake,
                await_event(socket, protocol::SUBSCRIPTION_SUCCEEDED),
            ) => {
                waited.map_err(|_| ChannelError::HandshakeTimeout(handshake))??;
            }
        }

        info!("Subscribed to {}", channel_name);
        Metrics::channel_connected();
        let end = self.pump(socket).await;
        Metrics::channel_disconnected();
        end
    }

    async fn pump(&self, socket: &mut Socket) -> Result<SessionEnd, ChannelError> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                frame = socket.next() => {
                    match frame {
                        None => return Ok(SessionEnd::SocketClosed),
                        Some(Err(e)) => {
                            warn!("Websocket read failed: {}", e);
                            return Ok(SessionEnd::SocketClosed);
                        }
                        Some(Ok(message)) => {
                            if let Some(end) = self.handle_frame(socket, message).await {
                                return Ok(end);
                            }
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, socket: &mut Socket, message: Message) -> Option<SessionEnd> {
        match message {
            Message::Text(text) => {
                let envelope = match protocol::Envelope::parse(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!("Unparseable channel frame: {}", e);
                        return None;
                    }
                };
                self.handle_envelope(socket, envelope).await
            }
            Message::Ping(payload) => {
                if let Err(e) = socket.send(Message::Pong(payload)).await {
                    warn!("Failed to answer websocket ping: {}", e);
                }
                None
            }
            Message::Close(_) => {
                debug!("Server closed the websocket");
                Some(SessionEnd::SocketClosed)
            }
            _ => None,
        }
    }

    async fn handle_envelope(
        &self,
        socket: &mut Socket,
        envelope: protocol::Envelope,
    ) -> Option<SessionEnd> {
        match envelope.event.as_str() {
            protocol::PING => {
                if let Err(e) = send_frame(socket, &protocol::pong()).await {
                    warn!("Failed to answer channel ping: {}", e);
                }
            }
            protocol::PROTOCOL_ERROR => {
                warn!("Channel error frame: {}", protocol::error_detail(&envelope));
            }
            protocol::NEW_MESSAGE | protocol::NEW_CONVERSATION => {
                Metrics::channel_event(&envelope.event);
                match protocol::map_event(&envelope, Utc::now()) {
                    Ok(Some(message)) => {
                        if self.engine_sender.send(message).is_err() {
                            debug!("Projection engine is gone, ending channel session");
                            return Some(SessionEnd::Cancelled);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Malformed {} payload: {}", envelope.event, e),
                }
            }
            other => debug!("Ignoring channel event {}", other),
        }
        None
    }

    async fn teardown(&self, socket: &mut Socket, channel_name: &str) {
        if let Ok(json) = serde_json::to_string(&protocol::unsubscribe(channel_name)) {
            let _ = socket.send(Message::Text(json.into())).await;
        }
        let _ = socket.close(None).await;
        debug!("Channel teardown complete for {}", channel_name);
    }
}

async fn await_event(socket: &mut Socket, wanted: &str) -> Result<protocol::Envelope, ChannelError> {
    while let Some(frame) = socket.next().await {
        match frame? {
            Message::Text(text) => {
                let envelope = match protocol::Envelope::parse(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!("Unparseable frame during handshake: {}", e);
                        continue;
                    }
                };
                if envelope.event == wanted {
                    return Ok(envelope);
                }
                if envelope.event == protocol::PROTOCOL_ERROR {
                    return Err(ChannelError::SubscriptionRejected(protocol::error_detail(
                        &envelope,
                    )));
                }
                debug!("Ignoring {} while waiting for {}", envelope.event, wanted);
            }
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload)).await;
            }
            Message::Close(_) => return Err(ChannelError::ClosedDuringHandshake),
            _ => {}
        }
    }
    Err(ChannelError::ClosedDuringHandshake)
}

async fn send_frame<T: Serialize>(socket: &mut Socket, frame: &T) -> Result<(), ChannelError> {
    let json =
        serde_json::to_string(frame).map_err(|e| ChannelError::Protocol(e.to_string()))?;
    socket.send(Message::Text(json.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use tokio::net::TcpListener;

    fn test_auth() -> AuthContext {
        let token = format!(
            "header.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"user_id":7}"#)
        );
        AuthContext::from_bearer_token(&token).unwrap()
    }

    // A server that completes the websocket upgrade and then goes silent
    // leaves the client waiting for pusher:connection_established. Cancelling
    // must end the run loop without waiting out the handshake timeout.
    #[tokio::test]
    async fn cancel_interrupts_silent_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let config = SyncConfig {
            realtime_url: format!("ws://{}", addr),
            handshake_timeout_secs: 30,
            ..SyncConfig::default()
        };
        let (engine_sender, _engine_receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let client = ChannelClient::new(
            config,
            test_auth(),
            reqwest::Client::new(),
            engine_sender,
            cancel.clone(),
        );

        let run = tokio::spawn(client.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run loop stalled in the handshake")
            .unwrap();
        server.abort();
    }
}

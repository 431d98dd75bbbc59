//! Realtime channel client for Markboard.
//!
//! Speaks the Phoenix-channel protocol used by Supabase Realtime: join a
//! `realtime:{channel}` topic with a `postgres_changes` config, keep the socket
//! alive with heartbeats on the `phoenix` topic, forward row changes as
//! [`RawChange`]s, and leave the topic when the channel is closed.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::types::change::{ChangeKind, FeedFilter, RawChange};
use crate::types::config::RealtimeConfig;
use crate::types::errors::BackendError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

const JOIN_REF: &str = "1";

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A row change for our topic.
    Change(RawChange),
    /// Reply to one of our pushes.
    Reply {
        reference: String,
        status: String,
        response: Value,
    },
    /// The server closed our topic.
    Closed,
    /// The server reported an error on our topic.
    Error(String),
    /// Anything else (presence, system messages, other topics).
    Other,
}

/// Builds the websocket URL for a project base URL.
pub fn socket_url(base_url: &str, anon_key: &str) -> Result<String, BackendError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| BackendError::RealtimeError(format!("invalid base url: {}", e)))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(BackendError::RealtimeError(format!(
                "unsupported scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| BackendError::RealtimeError("cannot switch to websocket scheme".to_string()))?;
    let path = format!("{}/realtime/v1/websocket", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url.to_string())
}

pub fn topic_for(filter: &FeedFilter) -> String {
    format!("realtime:{}", filter.channel)
}

fn event_name(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Insert => "INSERT",
        ChangeKind::Delete => "DELETE",
    }
}

/// The `phx_join` push subscribing to row changes of one owner.
pub fn join_message(filter: &FeedFilter, access_token: &str) -> Value {
    let changes: Vec<Value> = filter
        .events
        .iter()
        .map(|kind| {
            json!({
                "event": event_name(*kind),
                "schema": "public",
                "table": filter.table,
                "filter": filter.row_filter(),
            })
        })
        .collect();

    json!({
        "topic": topic_for(filter),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": changes,
            },
            "access_token": access_token,
        },
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
    })
}

pub fn heartbeat_message(reference: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string(),
    })
}

pub fn leave_message(topic: &str, reference: u64) -> Value {
    json!({
        "topic": topic,
        "event": "phx_leave",
        "payload": {},
        "ref": reference.to_string(),
        "join_ref": JOIN_REF,
    })
}

/// Decodes one text frame as seen by a subscriber of `topic`.
pub fn parse_frame(text: &str, topic: &str) -> Frame {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Frame::Error(format!("unparseable frame: {}", text));
    };
    let event = value.get("event").and_then(Value::as_str).unwrap_or_default();
    let frame_topic = value.get("topic").and_then(Value::as_str).unwrap_or_default();
    let payload = value.get("payload").cloned().unwrap_or(Value::Null);

    if event == "phx_reply" {
        return Frame::Reply {
            reference: value
                .get("ref")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: payload
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            response: payload.get("response").cloned().unwrap_or(Value::Null),
        };
    }
    if frame_topic != topic {
        return Frame::Other;
    }

    match event {
        "postgres_changes" => {
            let data = payload.get("data").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<RawChange>(data) {
                Ok(change) => Frame::Change(change),
                Err(e) => Frame::Error(format!("bad postgres_changes payload: {}", e)),
            }
        }
        "phx_close" => Frame::Closed,
        "phx_error" => Frame::Error(payload.to_string()),
        _ => Frame::Other,
    }
}

/// One joined realtime topic with its connection task.
pub struct RealtimeChannel {
    topic: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    /// Connects, joins the topic for `filter`, and starts forwarding changes.
    pub async fn connect(
        socket_url: &str,
        access_token: &str,
        filter: &FeedFilter,
        config: &RealtimeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RawChange>), BackendError> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let (stream, _response) = timeout(connect_timeout, connect_async(socket_url))
            .await
            .map_err(|_| {
                BackendError::RealtimeError(format!(
                    "connection timeout after {:?}",
                    connect_timeout
                ))
            })?
            .map_err(|e| BackendError::RealtimeError(e.to_string()))?;
        let (mut writer, mut reader) = stream.split();

        let topic = topic_for(filter);
        send_json(&mut writer, &join_message(filter, access_token)).await?;
        timeout(connect_timeout, await_join(&mut reader, &topic))
            .await
            .map_err(|_| BackendError::RealtimeError("join timed out".to_string()))??;
        debug!(topic = %topic, "realtime topic joined");

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let heartbeat = Duration::from_secs(config.heartbeat_secs.max(1));
        let task = tokio::spawn(run_channel(
            writer,
            reader,
            topic.clone(),
            tx,
            shutdown_rx,
            heartbeat,
        ));

        Ok((
            Self {
                topic,
                shutdown: Some(shutdown),
                task,
            },
            rx,
        ))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Asks the connection task to leave the topic and close the socket. Does not wait.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already have exited; nothing to do then.
            let _ = shutdown.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn send_json(writer: &mut WsWriter, value: &Value) -> Result<(), BackendError> {
    writer
        .send(Message::Text(value.to_string()))
        .await
        .map_err(|e| BackendError::RealtimeError(e.to_string()))
}

async fn await_join(reader: &mut WsReader, topic: &str) -> Result<(), BackendError> {
    while let Some(message) = reader.next().await {
        let message = message.map_err(|e| BackendError::RealtimeError(e.to_string()))?;
        let Message::Text(text) = message else {
            continue;
        };
        match parse_frame(&text, topic) {
            Frame::Reply {
                reference,
                status,
                response,
            } if reference == JOIN_REF => {
                return if status == "ok" {
                    Ok(())
                } else {
                    Err(BackendError::RealtimeError(format!(
                        "join rejected: {}",
                        response
                    )))
                };
            }
            Frame::Closed => {
                return Err(BackendError::RealtimeError("topic closed during join".to_string()))
            }
            _ => {}
        }
    }
    Err(BackendError::RealtimeError("socket closed during join".to_string()))
}

async fn run_channel(
    mut writer: WsWriter,
    mut reader: WsReader,
    topic: String,
    tx: mpsc::UnboundedSender<RawChange>,
    mut shutdown: oneshot::Receiver<()>,
    heartbeat: Duration,
) {
    let mut next_ref: u64 = 2;
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = send_json(&mut writer, &leave_message(&topic, next_ref)).await;
                let _ = writer.close().await;
                debug!(topic = %topic, "realtime topic left");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = send_json(&mut writer, &heartbeat_message(next_ref)).await {
                    warn!(topic = %topic, error = %e, "heartbeat failed");
                    break;
                }
                next_ref += 1;
            }
            message = reader.next() => match message {
                Some(Ok(Message::Text(text))) => match parse_frame(&text, &topic) {
                    Frame::Change(change) => {
                        if tx.send(change).is_err() {
                            break;
                        }
                    }
                    Frame::Closed => {
                        warn!(topic = %topic, "server closed realtime topic");
                        break;
                    }
                    Frame::Error(e) => warn!(topic = %topic, error = %e, "realtime error"),
                    Frame::Reply { status, response, .. } if status != "ok" => {
                        warn!(topic = %topic, %response, "realtime push rejected");
                    }
                    _ => {}
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = writer.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    warn!(topic = %topic, "realtime socket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(topic = %topic, error = %e, "realtime socket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

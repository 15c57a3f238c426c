// src/ws.rs
//! WebSocket endpoint plugins connect to.
//!
//! Protocol: the client opens `/ws/{session_id}` and sends a `hello`
//! declaring its capabilities. The server confirms the session, then
//! pushes `file_ready` notifications as matching files land. Heartbeats
//! keep the session from being marked stale, and a `generation_request`
//! submits work whose completion is reported back on the same socket.

use crate::context::ServerContext;
use crate::routes::ChordProgressionBody;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use bandmaster_core::dispatch::spawn_drain_task;
use bandmaster_core::eventbus::OrchestratorEvent;
use bandmaster_core::models::{
    FailureReason, FileId, GenerationParams, RequestId, SessionId, TrackType,
};
use bandmaster_core::sessions::{FileNotification, NotificationTransport};
use bandmaster_core::Error;
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum ClientMessage {
    Hello {
        #[serde(default)]
        capabilities: Vec<TrackType>,
    },
    Heartbeat {
        #[serde(default)]
        timestamp: Option<String>,
    },
    GenerationRequest {
        chord_progression: ChordProgressionBody,
        #[serde(default = "crate::routes::default_track_types")]
        track_types: Vec<TrackType>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum ServerMessage {
    ConnectionConfirmed {
        session_id: SessionId,
        resumed: bool,
        pending: usize,
    },
    FileReady {
        file_id: FileId,
    },
    GenerationComplete {
        request_id: RequestId,
        files: Vec<FileId>,
        warnings: Vec<String>,
    },
    HeartbeatResponse {
        timestamp: String,
    },
    Error {
        reason: String,
    },
}

/// One message headed for the socket. The ack channel, when present,
/// reports whether the sink write actually succeeded.
struct Outbound {
    msg: ServerMessage,
    ack: Option<oneshot::Sender<Result<(), Error>>>,
}

impl Outbound {
    fn post(msg: ServerMessage) -> Self {
        Self { msg, ack: None }
    }
}

/// Bridges the session's notification queue onto this connection's
/// outbound writer. `send` resolves only after the writer task reports
/// the sink write, so a notification acked here has reached the wire;
/// anything still buffered when the socket dies stays queued on the
/// session for redelivery after a resume.
struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl NotificationTransport for WsTransport {
    async fn send(&self, notification: FileNotification) -> Result<(), Error> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound
            .send(Outbound {
                msg: ServerMessage::FileReady {
                    file_id: notification.file_id,
                },
                ack: Some(ack_tx),
            })
            .map_err(|_| Error::Transport("websocket writer closed".into()))?;
        match ack_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport("websocket write unconfirmed".into())),
        }
    }
}

/// Serialize and write outbound messages, acking each confirmed write.
/// A sink error fails the pending ack and ends the task; acks still
/// buffered behind it resolve as unconfirmed when the receiver drops.
async fn run_writer<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    while let Some(out) = rx.recv().await {
        let json = match serde_json::to_string(&out.msg) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize outbound message: {e}");
                if let Some(ack) = out.ack {
                    let _ = ack.send(Err(Error::Transport(e.to_string())));
                }
                continue;
            }
        };
        match sink.send(Message::Text(json.into())).await {
            Ok(()) => {
                if let Some(ack) = out.ack {
                    let _ = ack.send(Ok(()));
                }
            }
            Err(e) => {
                if let Some(ack) = out.ack {
                    let _ = ack.send(Err(Error::Transport(e.to_string())));
                }
                break;
            }
        }
    }
}

/// Watch the bus for the terminal event of `request_id` and report it
/// on the session's socket.
fn notify_on_completion(
    mut events: mpsc::Receiver<OrchestratorEvent>,
    request_id: RequestId,
    tx: mpsc::UnboundedSender<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                OrchestratorEvent::RequestCompleted { id, files, warnings }
                    if id == request_id =>
                {
                    let _ = tx.send(Outbound::post(ServerMessage::GenerationComplete {
                        request_id,
                        files,
                        warnings,
                    }));
                    break;
                }
                OrchestratorEvent::RequestFailed { id, reason } if id == request_id => {
                    let reason = match reason {
                        FailureReason::GeneratorUnavailable => "generator unavailable",
                        FailureReason::GeneratorTimeout => "generator timed out",
                    };
                    let _ = tx.send(Outbound::post(ServerMessage::Error {
                        reason: format!("request {request_id} failed: {reason}"),
                    }));
                    break;
                }
                _ => {}
            }
        }
    })
}

pub async fn session_socket(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(ctx): State<Arc<ServerContext>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, SessionId(session_id), ctx))
}

async fn handle_socket(socket: WebSocket, session_id: SessionId, ctx: Arc<ServerContext>) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();

    let writer = tokio::spawn(run_writer(sink, rx));

    let Some(capabilities) = read_hello(&mut stream).await else {
        let _ = tx.send(Outbound::post(ServerMessage::Error {
            reason: "expected hello as first message".into(),
        }));
        drop(tx);
        let _ = writer.await;
        return;
    };

    let transport = Arc::new(WsTransport {
        outbound: tx.clone(),
    });
    let outcome = match ctx
        .sessions
        .connect(session_id.clone(), capabilities, transport)
    {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = tx.send(Outbound::post(ServerMessage::Error {
                reason: e.to_string(),
            }));
            drop(tx);
            let _ = writer.await;
            return;
        }
    };

    let _ = tx.send(Outbound::post(ServerMessage::ConnectionConfirmed {
        session_id: session_id.clone(),
        resumed: outcome.resumed,
        pending: outcome.session.pending_len(),
    }));
    ctx.event_bus
        .publish(OrchestratorEvent::SessionConnected {
            id: session_id.clone(),
            resumed: outcome.resumed,
        })
        .await;

    let drain = spawn_drain_task(
        outcome.session.clone(),
        outcome.epoch,
        ctx.event_bus.shutdown_rx.clone(),
        ctx.config.drain_retry_delay,
    );

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Heartbeat { .. }) => {
                    let _ = ctx.sessions.heartbeat(&session_id);
                    let _ = tx.send(Outbound::post(ServerMessage::HeartbeatResponse {
                        timestamp: chrono::Utc::now().to_rfc3339(),
                    }));
                }
                Ok(ClientMessage::GenerationRequest {
                    chord_progression,
                    track_types,
                }) => {
                    let params = GenerationParams {
                        chords: chord_progression.chords,
                        tempo: chord_progression.tempo,
                        key: chord_progression.key,
                        duration_beats: chord_progression.duration,
                        track_types,
                        session_id: Some(session_id.clone()),
                    };
                    // Subscribe before submitting so a fast completion
                    // cannot slip past the watcher.
                    let events = ctx.event_bus.subscribe(None);
                    match ctx.coordinator.submit(params) {
                        Ok(id) => {
                            notify_on_completion(events, id, tx.clone());
                        }
                        Err(e) => {
                            let _ = tx.send(Outbound::post(ServerMessage::Error {
                                reason: e.to_string(),
                            }));
                        }
                    }
                }
                Ok(ClientMessage::Hello { .. }) => {
                    warn!("session {session_id} sent a second hello; ignoring");
                }
                Err(e) => {
                    debug!("session {session_id} sent unparseable message: {e}");
                    let _ = tx.send(Outbound::post(ServerMessage::Error {
                        reason: format!("unrecognized message: {e}"),
                    }));
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    ctx.sessions.disconnect(&session_id);
    ctx.event_bus
        .publish(OrchestratorEvent::SessionDisconnected { id: session_id })
        .await;
    drop(tx);
    let _ = writer.await;
    drain.abort();
}

async fn read_hello(stream: &mut SplitStream<WebSocket>) -> Option<HashSet<TrackType>> {
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                return match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Hello { capabilities }) => {
                        Some(capabilities.into_iter().collect())
                    }
                    _ => None,
                };
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandmaster_core::sessions::SessionRegistry;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::watch;

    fn caps(types: &[TrackType]) -> HashSet<TrackType> {
        types.iter().copied().collect()
    }

    /// Sink that records what was written.
    fn collecting_sink(
        collected: Arc<Mutex<Vec<Message>>>,
    ) -> impl Sink<Message, Error = std::io::Error> {
        futures_util::sink::unfold(collected, |collected, item| async move {
            collected.lock().unwrap().push(item);
            Ok(collected)
        })
    }

    /// Sink that fails every write, like a torn connection.
    fn broken_sink() -> impl Sink<Message, Error = std::io::Error> {
        futures_util::sink::unfold((), |_, _item: Message| async move {
            Err(std::io::Error::other("wire down"))
        })
    }

    #[tokio::test]
    async fn send_confirms_only_after_wire_write() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = WsTransport { outbound: tx };

        let collected = Arc::new(Mutex::new(Vec::new()));
        let writer = tokio::spawn(run_writer(
            Box::pin(collecting_sink(collected.clone())),
            rx,
        ));

        transport
            .send(FileNotification {
                file_id: FileId("a.mid".into()),
            })
            .await
            .unwrap();
        // The ack resolved, so the write must already be on the sink.
        assert_eq!(collected.lock().unwrap().len(), 1);
        writer.abort();
    }

    #[tokio::test]
    async fn send_fails_when_sink_write_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = WsTransport { outbound: tx };
        let writer = tokio::spawn(run_writer(Box::pin(broken_sink()), rx));

        let err = transport
            .send(FileNotification {
                file_id: FileId("a.mid".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn unconfirmed_write_leaves_notification_queued_for_resume() {
        let sessions = Arc::new(SessionRegistry::new(Duration::from_secs(60)));
        let sid = SessionId("p1".into());

        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = sessions
            .connect(
                sid.clone(),
                caps(&[TrackType::Bass]),
                Arc::new(WsTransport { outbound: tx }),
            )
            .unwrap();
        let writer = tokio::spawn(run_writer(Box::pin(broken_sink()), rx));

        outcome.session.enqueue(FileId("a.mid".into()));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let drain = spawn_drain_task(
            outcome.session.clone(),
            outcome.epoch,
            shutdown_rx,
            Duration::from_millis(5),
        );

        // Every send fails at the sink, so the queue must not drain.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(outcome.session.pending_len(), 1);
        drain.abort();
        writer.abort();

        // Resume over a healthy socket and verify redelivery.
        sessions.disconnect(&sid);
        let (tx2, rx2) = mpsc::unbounded_channel();
        let resumed = sessions
            .connect(
                sid.clone(),
                caps(&[TrackType::Bass]),
                Arc::new(WsTransport { outbound: tx2 }),
            )
            .unwrap();
        assert!(resumed.resumed);
        assert_eq!(resumed.session.pending_len(), 1);

        let collected = Arc::new(Mutex::new(Vec::new()));
        let writer2 = tokio::spawn(run_writer(
            Box::pin(collecting_sink(collected.clone())),
            rx2,
        ));
        let (_shutdown_tx2, shutdown_rx2) = watch::channel(false);
        let drain2 = spawn_drain_task(
            resumed.session.clone(),
            resumed.epoch,
            shutdown_rx2,
            Duration::from_millis(5),
        );

        for _ in 0..100 {
            if resumed.session.pending_len() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(resumed.session.pending_len(), 0);
        assert_eq!(collected.lock().unwrap().len(), 1);
        drain2.abort();
        writer2.abort();
    }

    #[tokio::test]
    async fn completion_watcher_reports_matching_request_only() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let target = RequestId::new();
        let watcher = notify_on_completion(event_rx, target, out_tx);

        event_tx
            .send(OrchestratorEvent::RequestCompleted {
                id: RequestId::new(),
                files: vec![FileId("other.mid".into())],
                warnings: vec![],
            })
            .await
            .unwrap();
        event_tx
            .send(OrchestratorEvent::RequestCompleted {
                id: target,
                files: vec![FileId("mine.mid".into())],
                warnings: vec![],
            })
            .await
            .unwrap();

        let out = out_rx.recv().await.unwrap();
        match out.msg {
            ServerMessage::GenerationComplete {
                request_id, files, ..
            } => {
                assert_eq!(request_id, target);
                assert_eq!(files, vec![FileId("mine.mid".into())]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        watcher.await.unwrap();
    }

    #[test]
    fn client_messages_parse_from_tagged_json() {
        let hello = r#"{"type":"hello","data":{"capabilities":["bass","drums"]}}"#;
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(hello).unwrap(),
            ClientMessage::Hello { capabilities } if capabilities.len() == 2
        ));

        let generate = r#"{
            "type": "generation_request",
            "data": {
                "chord_progression": {
                    "chords": [{"chord": "C", "start_beat": 0.0, "duration": 4.0}],
                    "tempo": 100
                }
            }
        }"#;
        match serde_json::from_str::<ClientMessage>(generate).unwrap() {
            ClientMessage::GenerationRequest {
                chord_progression,
                track_types,
            } => {
                assert_eq!(chord_progression.tempo, 100);
                assert_eq!(chord_progression.key, "C");
                assert_eq!(track_types, vec![TrackType::Bass, TrackType::Drums]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

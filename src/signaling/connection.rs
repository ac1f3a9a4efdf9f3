//! Per-connection signaling handler
//!
//! One task per WebSocket connection. Requests are processed in arrival
//! order; each gets exactly one acknowledgement. Push events queued by the
//! relay are interleaved onto the same socket. On disconnect the handler
//! runs best-effort cleanup of everything the connection owns.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::Result;
use crate::relay::Relay;

use super::message::{PushEvent, Request, RequestBody, ResponsePayload, ServerMessage};

/// State for one signaling connection
pub struct Connection {
    id: u64,
    peer_addr: SocketAddr,
    relay: Arc<Relay>,
    /// Joined room, if any; set once by `joinRoom`
    room: Option<String>,
}

impl Connection {
    pub fn new(id: u64, peer_addr: SocketAddr, relay: Arc<Relay>) -> Self {
        Self {
            id,
            peer_addr,
            relay,
            room: None,
        }
    }

    /// Drive the connection until the peer goes away, then clean up
    pub async fn run(mut self, ws: WebSocketStream<TcpStream>) -> Result<()> {
        let (mut sink, mut stream) = ws.split();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<PushEvent>();

        let result: Result<()> = loop {
            tokio::select! {
                Some(event) = push_rx.recv() => {
                    let msg = ServerMessage::Event { event };
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            // A push has no caller to report back to
                            tracing::error!(connection = self.id, error = %e, "Push encode failed");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break Err(e.into());
                    }
                }
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            let reply = self.handle_text(&text, &push_tx).await;
                            if let Some(reply) = reply {
                                let text = match serde_json::to_string(&reply) {
                                    Ok(text) => text,
                                    Err(e) => break Err(e.into()),
                                };
                                if let Err(e) = sink.send(Message::Text(text)).await {
                                    break Err(e.into());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break Ok(()),
                        Some(Ok(_)) => {} // binary/pong ignored
                        Some(Err(e)) => break Err(e.into()),
                    }
                }
            }
        };

        self.relay.disconnect(self.id, self.room.as_deref()).await;
        tracing::info!(connection = self.id, peer = %self.peer_addr, "Connection cleaned up");
        result
    }

    /// Parse and dispatch one request; malformed frames get no reply
    /// (there is no correlation id to answer with).
    async fn handle_text(
        &mut self,
        text: &str,
        push_tx: &mpsc::UnboundedSender<PushEvent>,
    ) -> Option<ServerMessage> {
        let request: Request = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(connection = self.id, error = %e, "Malformed request dropped");
                return None;
            }
        };

        let id = request.id;
        Some(match self.dispatch(request.body, push_tx).await {
            Ok(payload) => ServerMessage::ok(id, payload),
            Err(message) => {
                tracing::debug!(connection = self.id, request = id, %message, "Request failed");
                ServerMessage::error(id, message)
            }
        })
    }

    /// All relay errors surface here as structured acknowledgement
    /// errors; nothing a client sends can fault the server.
    async fn dispatch(
        &mut self,
        body: RequestBody,
        push_tx: &mpsc::UnboundedSender<PushEvent>,
    ) -> std::result::Result<ResponsePayload, String> {
        match body {
            RequestBody::GetRouterCapabilities => Ok(ResponsePayload::RouterCapabilities(
                self.relay.router_capabilities(),
            )),

            RequestBody::JoinRoom { room_id } => {
                if let Some(existing) = &self.room {
                    return Err(format!("Already joined room: {}", existing));
                }
                let producers = self
                    .relay
                    .join_room(self.id, &room_id, push_tx.clone())
                    .await;
                self.room = Some(room_id);
                Ok(ResponsePayload::Joined { producers })
            }

            RequestBody::CreateTransport { direction } => {
                let descriptor = self
                    .relay
                    .create_transport(self.id, direction)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ResponsePayload::TransportCreated(descriptor))
            }

            RequestBody::ConnectTransport {
                transport_id,
                dtls_parameters,
            } => {
                self.relay
                    .connect_transport(self.id, transport_id, dtls_parameters)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ResponsePayload::TransportConnected)
            }

            RequestBody::Produce {
                transport_id,
                kind,
                rtp_parameters,
                room_id,
            } => {
                let producer_id = self
                    .relay
                    .produce(self.id, &room_id, transport_id, kind, rtp_parameters)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ResponsePayload::Produced { producer_id })
            }

            RequestBody::Consume {
                transport_id,
                producer_id,
                rtp_capabilities,
            } => {
                let data = self
                    .relay
                    .consume(self.id, transport_id, producer_id, &rtp_capabilities)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ResponsePayload::Consumed(data))
            }

            RequestBody::ConsumeRoom {
                transport_id,
                rtp_capabilities,
            } => {
                let room = self.room.clone().ok_or("Not joined to any room")?;
                let consumers = self
                    .relay
                    .consume_room(self.id, &room, transport_id, &rtp_capabilities)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ResponsePayload::ConsumedRoom { consumers })
            }

            RequestBody::EndLecture => {
                let room = self.room.clone().ok_or("Not joined to any room")?;
                let closed_producers = self
                    .relay
                    .end_lecture(self.id, &room)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(ResponsePayload::LectureEnded { closed_producers })
            }

            RequestBody::ChatMessage { text } => {
                let room = self.room.clone().ok_or("Not joined to any room")?;
                self.relay.chat(self.id, &room, text).await;
                Ok(ResponsePayload::ChatSent)
            }
        }
    }
}

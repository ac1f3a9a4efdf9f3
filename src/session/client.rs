//! Signaling client
//!
//! Request/acknowledgement RPC over one WebSocket, with server pushes
//! surfaced as an event stream. Correlation ids are assigned by an I/O
//! task that owns the socket and the pending-request map; callers await a
//! oneshot for their acknowledgement.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::engine::{
    DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, TransportDirection,
};
use crate::error::{Error, Result};
use crate::relay::ProducerInfo;
use crate::signaling::message::{
    ConsumerData, PushEvent, Request, RequestBody, ResponsePayload, ServerMessage,
    TransportDescriptor,
};

/// What a session controller sees from the signaling channel
#[derive(Debug)]
pub enum SessionEvent {
    /// Server-initiated push
    Push(PushEvent),
    /// The connection dropped; no further events will arrive
    Disconnected,
}

enum Outbound {
    Request {
        body: RequestBody,
        reply: oneshot::Sender<Result<ResponsePayload>>,
    },
    Close,
}

/// Client half of the signaling protocol
pub struct SignalingClient {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SignalingClient {
    /// Connect to a signaling server.
    ///
    /// Returns the client and the stream of pushes/disconnect events.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(io_loop(ws, outbound_rx, event_tx));

        Ok((Self { outbound }, event_rx))
    }

    /// Send one request and await its acknowledgement
    pub async fn request(&self, body: RequestBody) -> Result<ResponsePayload> {
        let (reply, rx) = oneshot::channel();
        self.outbound
            .send(Outbound::Request { body, reply })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Close the connection
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    pub async fn get_router_capabilities(&self) -> Result<RtpCapabilities> {
        match self.request(RequestBody::GetRouterCapabilities).await? {
            ResponsePayload::RouterCapabilities(caps) => Ok(caps),
            other => Err(unexpected("routerCapabilities", &other)),
        }
    }

    pub async fn join_room(&self, room_id: &str) -> Result<Vec<ProducerInfo>> {
        let body = RequestBody::JoinRoom {
            room_id: room_id.into(),
        };
        match self.request(body).await? {
            ResponsePayload::Joined { producers } => Ok(producers),
            other => Err(unexpected("joined", &other)),
        }
    }

    pub async fn create_transport(
        &self,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor> {
        match self.request(RequestBody::CreateTransport { direction }).await? {
            ResponsePayload::TransportCreated(descriptor) => Ok(descriptor),
            other => Err(unexpected("transportCreated", &other)),
        }
    }

    pub async fn connect_transport(
        &self,
        transport_id: Uuid,
        dtls_parameters: DtlsParameters,
    ) -> Result<()> {
        let body = RequestBody::ConnectTransport {
            transport_id,
            dtls_parameters,
        };
        match self.request(body).await? {
            ResponsePayload::TransportConnected => Ok(()),
            other => Err(unexpected("transportConnected", &other)),
        }
    }

    pub async fn produce(
        &self,
        transport_id: Uuid,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        room_id: &str,
    ) -> Result<Uuid> {
        let body = RequestBody::Produce {
            transport_id,
            kind,
            rtp_parameters,
            room_id: room_id.into(),
        };
        match self.request(body).await? {
            ResponsePayload::Produced { producer_id } => Ok(producer_id),
            other => Err(unexpected("produced", &other)),
        }
    }

    pub async fn consume(
        &self,
        transport_id: Uuid,
        producer_id: Uuid,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerData> {
        let body = RequestBody::Consume {
            transport_id,
            producer_id,
            rtp_capabilities,
        };
        match self.request(body).await? {
            ResponsePayload::Consumed(data) => Ok(data),
            other => Err(unexpected("consumed", &other)),
        }
    }

    pub async fn consume_room(
        &self,
        transport_id: Uuid,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<Vec<ConsumerData>> {
        let body = RequestBody::ConsumeRoom {
            transport_id,
            rtp_capabilities,
        };
        match self.request(body).await? {
            ResponsePayload::ConsumedRoom { consumers } => Ok(consumers),
            other => Err(unexpected("consumedRoom", &other)),
        }
    }

    pub async fn end_lecture(&self) -> Result<usize> {
        match self.request(RequestBody::EndLecture).await? {
            ResponsePayload::LectureEnded { closed_producers } => Ok(closed_producers),
            other => Err(unexpected("lectureEnded", &other)),
        }
    }

    pub async fn chat(&self, text: &str) -> Result<()> {
        let body = RequestBody::ChatMessage { text: text.into() };
        match self.request(body).await? {
            ResponsePayload::ChatSent => Ok(()),
            other => Err(unexpected("chatSent", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &ResponsePayload) -> Error {
    Error::Protocol(format!("expected {} ack, got {:?}", expected, got))
}

/// Owns the socket: writes requests, routes acknowledgements to their
/// oneshots, forwards pushes. On teardown every pending request fails
/// with `ConnectionClosed` and a final `Disconnected` event is emitted.
async fn io_loop(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<u64, oneshot::Sender<Result<ResponsePayload>>> = HashMap::new();
    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Request { body, reply }) => {
                    let id = next_id;
                    next_id += 1;
                    let request = Request { id, body };
                    match serde_json::to_string(&request) {
                        Ok(text) => {
                            pending.insert(id, reply);
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e.into()));
                        }
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::Response { id, ok, error }) => {
                        if let Some(reply) = pending.remove(&id) {
                            let result = match (ok, error) {
                                (Some(payload), _) => Ok(payload),
                                (None, Some(message)) => Err(Error::Rejected(message)),
                                (None, None) => {
                                    Err(Error::Protocol("empty acknowledgement".into()))
                                }
                            };
                            let _ = reply.send(result);
                        } else {
                            tracing::warn!(id, "Acknowledgement for unknown request");
                        }
                    }
                    Ok(ServerMessage::Event { event }) => {
                        let _ = events.send(SessionEvent::Push(event));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed server message dropped");
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Signaling socket error");
                    break;
                }
            }
        }
    }

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(Error::ConnectionClosed));
    }
    let _ = events.send(SessionEvent::Disconnected);
}

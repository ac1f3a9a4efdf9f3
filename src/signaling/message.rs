//! Signaling wire vocabulary
//!
//! Every client request carries a correlation id and receives exactly one
//! acknowledgement: an `ok` payload or a structured `error` string. Push
//! events flow server → client with no correlation id and no reply.
//!
//! All payloads are tagged serde variants validated at the boundary; an
//! unknown or malformed message never reaches the relay.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{
    DtlsParameters, IceCandidate, IceParameters, MediaKind, RtpCapabilities, RtpParameters,
    TransportDirection,
};
use crate::relay::ProducerInfo;

/// Client → server request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed verbatim in the acknowledgement
    pub id: u64,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// Client → server request bodies, one variant per method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "data", rename_all = "camelCase")]
pub enum RequestBody {
    GetRouterCapabilities,
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    #[serde(rename_all = "camelCase")]
    CreateTransport { direction: TransportDirection },
    #[serde(rename_all = "camelCase")]
    ConnectTransport {
        transport_id: Uuid,
        dtls_parameters: DtlsParameters,
    },
    #[serde(rename_all = "camelCase")]
    Produce {
        transport_id: Uuid,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Consume {
        transport_id: Uuid,
        producer_id: Uuid,
        rtp_capabilities: RtpCapabilities,
    },
    /// Bulk consume of every producer currently live in the joined room
    #[serde(rename_all = "camelCase")]
    ConsumeRoom {
        transport_id: Uuid,
        rtp_capabilities: RtpCapabilities,
    },
    EndLecture,
    #[serde(rename_all = "camelCase")]
    ChatMessage { text: String },
}

/// Server → client messages: acknowledgements and pushes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Acknowledgement for one request; exactly one of `ok`/`error` is set
    Response {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        ok: Option<ResponsePayload>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Unsolicited push; no acknowledgement expected
    Event {
        #[serde(flatten)]
        event: PushEvent,
    },
}

impl ServerMessage {
    pub fn ok(id: u64, payload: ResponsePayload) -> Self {
        ServerMessage::Response {
            id,
            ok: Some(payload),
            error: None,
        }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        ServerMessage::Response {
            id,
            ok: None,
            error: Some(message.into()),
        }
    }
}

/// Success payloads, one variant per request method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponsePayload {
    RouterCapabilities(RtpCapabilities),
    #[serde(rename_all = "camelCase")]
    Joined { producers: Vec<ProducerInfo> },
    TransportCreated(TransportDescriptor),
    TransportConnected,
    #[serde(rename_all = "camelCase")]
    Produced { producer_id: Uuid },
    Consumed(ConsumerData),
    #[serde(rename_all = "camelCase")]
    ConsumedRoom { consumers: Vec<ConsumerData> },
    #[serde(rename_all = "camelCase")]
    LectureEnded { closed_producers: usize },
    ChatSent,
}

/// Server-initiated push events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum PushEvent {
    /// A new producer went live in the room
    NewProducer(ProducerInfo),
    /// A producer closed; viewers prune dependent consumers
    #[serde(rename_all = "camelCase")]
    ProducerClosed { producer_id: Uuid },
    /// Chat fan-out
    #[serde(rename_all = "camelCase")]
    Chat { from: u64, text: String },
}

/// Everything a client needs to mirror a server-side transport locally
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    pub id: Uuid,
    pub direction: TransportDirection,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

/// Everything a client needs to attach one consumed track
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerData {
    pub id: Uuid,
    pub producer_id: Uuid,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MediaKind;

    #[test]
    fn test_request_round_trip() {
        let req = Request {
            id: 7,
            body: RequestBody::JoinRoom {
                room_id: "abc123".into(),
            },
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"method\":\"joinRoom\""));
        assert!(json.contains("\"roomId\":\"abc123\""));

        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 7);
        assert!(matches!(back.body, RequestBody::JoinRoom { room_id } if room_id == "abc123"));
    }

    #[test]
    fn test_unit_request_needs_no_data() {
        let back: Request =
            serde_json::from_str(r#"{"id":1,"method":"getRouterCapabilities"}"#).unwrap();
        assert!(matches!(back.body, RequestBody::GetRouterCapabilities));
    }

    #[test]
    fn test_push_event_wire_shape() {
        let msg = ServerMessage::Event {
            event: PushEvent::NewProducer(ProducerInfo {
                id: Uuid::new_v4(),
                kind: MediaKind::Video,
            }),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"], "newProducer");
        assert_eq!(json["data"]["kind"], "video");
    }

    #[test]
    fn test_error_ack_shape() {
        let msg = ServerMessage::error(3, "Transport not found");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "response");
        assert_eq!(json["id"], 3);
        assert_eq!(json["error"], "Transport not found");
        assert!(json.get("ok").is_none());
    }

    #[test]
    fn test_malformed_request_is_rejected() {
        let result = serde_json::from_str::<Request>(r#"{"id":1,"method":"stealRoom"}"#);
        assert!(result.is_err());
    }
}

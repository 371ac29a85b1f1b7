//! Wire types for Scrawly room channels.
//!
//! Frames use the Phoenix V2 JSON serializer: every message is a five-element
//! array `[join_ref, ref, topic, event, payload]`. `join_ref` identifies the
//! channel instance a frame belongs to and `ref` correlates a request with
//! its `phx_reply`.
//!
//! The game itself speaks a small set of named events on the `game:<code>`
//! topic; the outbound half is [`GameAction`] and the inbound half is
//! [`InboundEvent`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Reserved event names ────────────────────────────────────────────

/// Join request sent when entering a room channel.
pub const PHX_JOIN: &str = "phx_join";
/// Leave request sent when exiting a room channel.
pub const PHX_LEAVE: &str = "phx_leave";
/// Server reply to any request carrying a `ref`.
pub const PHX_REPLY: &str = "phx_reply";
/// The server-side channel process crashed.
pub const PHX_ERROR: &str = "phx_error";
/// The server closed the channel.
pub const PHX_CLOSE: &str = "phx_close";
/// Topic reserved for socket-level heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";
/// Heartbeat event name.
pub const HEARTBEAT: &str = "heartbeat";
/// Full presence roster pushed right after a join.
pub const PRESENCE_STATE: &str = "presence_state";
/// Incremental presence change.
pub const PRESENCE_DIFF: &str = "presence_diff";

/// Serializer version appended to the socket URL.
pub const PROTOCOL_VSN: &str = "2.0.0";

/// Returns `true` for the channel lifecycle events owned by Phoenix itself.
pub fn is_lifecycle_event(event: &str) -> bool {
    matches!(event, PHX_JOIN | PHX_LEAVE | PHX_REPLY | PHX_ERROR | PHX_CLOSE)
}

// ── Frame ───────────────────────────────────────────────────────────

/// A single Phoenix channel message.
///
/// Serializes as the V2 array form:
///
/// ```
/// use scrawly_client::protocol::Frame;
///
/// let frame = Frame::new("game:ROOM1", "chat_message", serde_json::json!({"message": "hi"}))
///     .with_join_ref("1")
///     .with_ref("2");
/// let json = serde_json::to_string(&frame).unwrap();
/// assert_eq!(json, r#"["1","2","game:ROOM1","chat_message",{"message":"hi"}]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFrame", into = "RawFrame")]
pub struct Frame {
    /// Reference of the join that opened the channel instance.
    pub join_ref: Option<String>,
    /// Request reference used to correlate replies.
    pub msg_ref: Option<String>,
    /// Channel topic, e.g. `game:ROOM1`.
    pub topic: String,
    /// Event name.
    pub event: String,
    /// Arbitrary JSON payload.
    pub payload: Value,
}

#[derive(Serialize, Deserialize)]
struct RawFrame(Option<String>, Option<String>, String, String, Value);

impl From<RawFrame> for Frame {
    fn from(RawFrame(join_ref, msg_ref, topic, event, payload): RawFrame) -> Self {
        Self {
            join_ref,
            msg_ref,
            topic,
            event,
            payload,
        }
    }
}

impl From<Frame> for RawFrame {
    fn from(frame: Frame) -> Self {
        RawFrame(
            frame.join_ref,
            frame.msg_ref,
            frame.topic,
            frame.event,
            frame.payload,
        )
    }
}

impl Frame {
    /// Create a frame without any references.
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            join_ref: None,
            msg_ref: None,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Attach the channel instance's join reference.
    #[must_use]
    pub fn with_join_ref(mut self, join_ref: impl Into<String>) -> Self {
        self.join_ref = Some(join_ref.into());
        self
    }

    /// Attach a request reference.
    #[must_use]
    pub fn with_ref(mut self, msg_ref: impl Into<String>) -> Self {
        self.msg_ref = Some(msg_ref.into());
        self
    }

    /// Build the heartbeat frame for the given reference.
    pub fn heartbeat(msg_ref: impl Into<String>) -> Self {
        Self::new(PHOENIX_TOPIC, HEARTBEAT, empty_payload()).with_ref(msg_ref)
    }

    /// Decode the payload of a `phx_reply` frame.
    ///
    /// Returns `None` when the frame is not a reply or the payload does not
    /// have the `{status, response}` shape.
    pub fn reply(&self) -> Option<Reply> {
        if self.event != PHX_REPLY {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// An empty JSON object, the payload of every argument-less event.
pub fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

// ── Replies ─────────────────────────────────────────────────────────

/// Status half of a `phx_reply` payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// The request was accepted.
    Ok,
    /// The request was rejected.
    Error,
}

/// Payload of a `phx_reply` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Whether the server accepted the request.
    pub status: ReplyStatus,
    /// Server-supplied response body; `{}` when none was sent.
    #[serde(default = "empty_payload")]
    pub response: Value,
}

impl Reply {
    /// Returns `true` if the server accepted the request.
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

// ── Outbound game actions ───────────────────────────────────────────

/// Coordinates of a pointer sample on the drawing canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawingPoint {
    pub x: f64,
    pub y: f64,
}

/// Events the client pushes to a room channel.
///
/// # Example
///
/// ```
/// use scrawly_client::protocol::GameAction;
///
/// let action = GameAction::StartRound { round_number: 3 };
/// assert_eq!(action.event_name(), "round_start");
/// assert_eq!(action.payload(), serde_json::json!({"round_number": 3}));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum GameAction {
    /// The local player put the pen down.
    DrawingStart(DrawingPoint),
    /// The pen moved while down.
    DrawingMove(DrawingPoint),
    /// The pen was lifted.
    DrawingStop {},
    /// A chat line (also used for guesses).
    ChatMessage { message: String },
    /// Ask the server to start the game.
    StartGame {},
    /// Ask the server to end the game.
    EndGame {},
    /// Begin the given round.
    #[serde(rename = "round_start")]
    StartRound { round_number: u32 },
    /// Finish the given round.
    #[serde(rename = "round_end")]
    EndRound { round_number: u32 },
    /// Hand the pen to another player.
    #[serde(rename = "turn_change")]
    ChangeTurn { drawer_id: Value },
}

impl GameAction {
    /// The channel event name this action is pushed as.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::DrawingStart(_) => "drawing_start",
            Self::DrawingMove(_) => "drawing_move",
            Self::DrawingStop {} => "drawing_stop",
            Self::ChatMessage { .. } => "chat_message",
            Self::StartGame {} => "start_game",
            Self::EndGame {} => "end_game",
            Self::StartRound { .. } => "round_start",
            Self::EndRound { .. } => "round_end",
            Self::ChangeTurn { .. } => "turn_change",
        }
    }

    /// The JSON payload pushed with this action, taken from its serde
    /// `payload` content.
    pub fn payload(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut tagged)) => tagged.remove("payload").unwrap_or_else(empty_payload),
            _ => empty_payload(),
        }
    }
}

// ── Inbound game events ─────────────────────────────────────────────

/// Events the server broadcasts on a room channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundEvent {
    DrawingStart,
    DrawingMove,
    DrawingStop,
    ChatMessage,
    GameStarted,
    GameEnded,
    RoundStarted,
    RoundEnded,
    TurnChanged,
}

impl InboundEvent {
    /// All inbound events, in wire-table order.
    pub const ALL: [InboundEvent; 9] = [
        Self::DrawingStart,
        Self::DrawingMove,
        Self::DrawingStop,
        Self::ChatMessage,
        Self::GameStarted,
        Self::GameEnded,
        Self::RoundStarted,
        Self::RoundEnded,
        Self::TurnChanged,
    ];

    /// Look up an inbound event by its wire name.
    pub fn from_name(event: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == event)
    }

    /// The wire name of this event.
    pub fn name(self) -> &'static str {
        match self {
            Self::DrawingStart => "drawing_start",
            Self::DrawingMove => "drawing_move",
            Self::DrawingStop => "drawing_stop",
            Self::ChatMessage => "chat_message",
            Self::GameStarted => "game_started",
            Self::GameEnded => "game_ended",
            Self::RoundStarted => "round_started",
            Self::RoundEnded => "round_ended",
            Self::TurnChanged => "turn_changed",
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_decodes_null_refs() {
        let frame: Frame =
            serde_json::from_str(r#"[null,null,"game:AB","drawing_move",{"x":1,"y":2}]"#).unwrap();
        assert_eq!(frame.join_ref, None);
        assert_eq!(frame.msg_ref, None);
        assert_eq!(frame.topic, "game:AB");
        assert_eq!(frame.event, "drawing_move");
        assert_eq!(frame.payload, json!({"x": 1, "y": 2}));
    }

    #[test]
    fn frame_rejects_object_form() {
        let result = serde_json::from_str::<Frame>(
            r#"{"topic":"game:AB","event":"x","payload":{},"ref":null}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn heartbeat_frame_shape() {
        let json = serde_json::to_string(&Frame::heartbeat("7")).unwrap();
        assert_eq!(json, r#"[null,"7","phoenix","heartbeat",{}]"#);
    }

    #[test]
    fn reply_is_parsed_from_phx_reply() {
        let frame: Frame = serde_json::from_str(
            r#"["1","1","game:AB","phx_reply",{"status":"ok","response":{"score":0}}]"#,
        )
        .unwrap();
        let reply = frame.reply().unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.response, json!({"score": 0}));
    }

    #[test]
    fn reply_without_response_defaults_to_empty_object() {
        let frame = Frame::new("game:AB", PHX_REPLY, json!({"status": "error"}));
        let reply = frame.reply().unwrap();
        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.response, json!({}));
    }

    #[test]
    fn reply_is_none_for_other_events() {
        let frame = Frame::new("game:AB", "chat_message", json!({"status": "ok"}));
        assert!(frame.reply().is_none());
    }

    #[test]
    fn game_action_payloads() {
        let start = GameAction::DrawingStart(DrawingPoint { x: 1.5, y: 2.0 });
        assert_eq!(start.event_name(), "drawing_start");
        assert_eq!(start.payload(), json!({"x": 1.5, "y": 2.0}));

        assert_eq!(GameAction::DrawingStop {}.payload(), json!({}));
        assert_eq!(GameAction::StartGame {}.event_name(), "start_game");
        assert_eq!(GameAction::StartGame {}.payload(), json!({}));
        assert_eq!(GameAction::EndGame {}.event_name(), "end_game");

        let chat = GameAction::ChatMessage {
            message: "hi".into(),
        };
        assert_eq!(chat.payload(), json!({"message": "hi"}));

        let end = GameAction::EndRound { round_number: 2 };
        assert_eq!(end.event_name(), "round_end");
        assert_eq!(end.payload(), json!({"round_number": 2}));

        let turn = GameAction::ChangeTurn {
            drawer_id: json!(42),
        };
        assert_eq!(turn.event_name(), "turn_change");
        assert_eq!(turn.payload(), json!({"drawer_id": 42}));
    }

    #[test]
    fn serde_tag_matches_event_name() {
        let actions = [
            GameAction::DrawingMove(DrawingPoint { x: 0.0, y: 0.0 }),
            GameAction::StartRound { round_number: 1 },
            GameAction::ChangeTurn {
                drawer_id: json!("u1"),
            },
            GameAction::DrawingStop {},
        ];
        for action in actions {
            let value = serde_json::to_value(&action).unwrap();
            assert_eq!(value["event"], action.event_name());
        }
    }

    #[test]
    fn inbound_event_names_round_trip() {
        for event in InboundEvent::ALL {
            assert_eq!(InboundEvent::from_name(event.name()), Some(event));
        }
        assert_eq!(InboundEvent::from_name("start_game"), None);
        assert_eq!(InboundEvent::from_name(PRESENCE_DIFF), None);
    }

    #[test]
    fn lifecycle_events_are_recognised() {
        assert!(is_lifecycle_event(PHX_REPLY));
        assert!(is_lifecycle_event(PHX_CLOSE));
        assert!(!is_lifecycle_event("chat_message"));
        assert!(!is_lifecycle_event(PRESENCE_STATE));
    }
}

//! JSON event frames exchanged over the WebSocket.
//!
//! Every frame is a text message `{"event": "<name>", "data": {...}}`.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::db::models::{Feedback, Question, QuestionType};
use crate::quiz::stats::QuestionStats;
use crate::session::RoomRole;

/// Inbound events (client to server).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Join(JoinRequest),
    Leave,
    Feedback(FeedbackRequest),
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinRequest {
    pub presentation_id: i64,
    pub role: RoomRole,
    /// Bearer credential. Optional when the socket authenticated with `?token=`.
    #[serde(default, alias = "token")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    /// Defaults to the room the connection has joined.
    #[serde(default, rename = "presentationId")]
    pub presentation_id: Option<i64>,
    #[serde(rename = "feedbackType")]
    pub feedback_type: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SpeakerChanged,
    ListenerJoined,
    ListenerLeft,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listeners_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionPayload {
    pub id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub is_active: bool,
}

impl From<&Question> for QuestionPayload {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_text: q.question_text.clone(),
            question_type: q.question_type,
            options: q.options.clone(),
            is_active: q.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackPayload {
    pub id: i64,
    #[serde(rename = "feedbackType")]
    pub feedback_type: String,
    pub content: Option<String>,
    pub timestamp: String,
    pub user_id: i64,
    pub username: String,
}

impl FeedbackPayload {
    pub fn new(feedback: &Feedback, username: &str) -> Self {
        Self {
            id: feedback.id,
            feedback_type: feedback.feedback_type.clone(),
            content: feedback.content.clone(),
            timestamp: feedback.created_at.clone(),
            user_id: feedback.user_id,
            username: username.to_string(),
        }
    }
}

/// Outbound events (server to client).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Joined {
        presentation_id: i64,
        role: RoomRole,
    },
    Left {
        presentation_id: i64,
    },
    RoomInfo {
        listeners_count: usize,
    },
    Notification(Notification),
    NewQuestion(QuestionPayload),
    QuestionDeactivated {
        question_id: i64,
        presentation_id: i64,
    },
    QuestionStatsUpdate(QuestionStats),
    ReceiveFeedback(FeedbackPayload),
    FeedbackResult {
        success: bool,
        message: String,
        delivered: bool,
    },
    Error {
        msg: String,
    },
}

impl ServerEvent {
    pub fn error(msg: impl Into<String>) -> Self {
        ServerEvent::Error { msg: msg.into() }
    }

    pub fn notification(kind: NotificationKind, message: impl Into<String>, listeners_count: Option<usize>) -> Self {
        ServerEvent::Notification(Notification {
            kind,
            message: message.into(),
            listeners_count,
        })
    }

    /// Event name as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Joined { .. } => "joined",
            ServerEvent::Left { .. } => "left",
            ServerEvent::RoomInfo { .. } => "room_info",
            ServerEvent::Notification(_) => "notification",
            ServerEvent::NewQuestion(_) => "new_question",
            ServerEvent::QuestionDeactivated { .. } => "question_deactivated",
            ServerEvent::QuestionStatsUpdate(_) => "question_stats_update",
            ServerEvent::ReceiveFeedback(_) => "receive_feedback",
            ServerEvent::FeedbackResult { .. } => "feedback_result",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(event = self.name(), error = %e, "Failed to encode event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn encode(event: &ServerEvent) -> Value {
        serde_json::to_value(event).unwrap()
    }

    #[test]
    fn test_parse_join_with_token_alias() {
        let raw = r#"{"event":"join","data":{"presentation_id":3,"role":"speaker","token":"abc"}}"#;
        match serde_json::from_str::<ClientEvent>(raw).unwrap() {
            ClientEvent::Join(req) => {
                assert_eq!(req.presentation_id, 3);
                assert_eq!(req.role, RoomRole::Speaker);
                assert_eq!(req.credential.as_deref(), Some("abc"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_join_without_credential() {
        let raw = r#"{"event":"join","data":{"presentation_id":3,"role":"listener"}}"#;
        let ClientEvent::Join(req) = serde_json::from_str::<ClientEvent>(raw).unwrap() else {
            panic!("expected join");
        };
        assert!(req.credential.is_none());
    }

    #[test]
    fn test_parse_leave_and_feedback() {
        assert!(matches!(
            serde_json::from_str::<ClientEvent>(r#"{"event":"leave"}"#).unwrap(),
            ClientEvent::Leave
        ));
        let raw = r#"{"event":"feedback","data":{"presentationId":9,"feedbackType":"too_fast"}}"#;
        let ClientEvent::Feedback(req) = serde_json::from_str::<ClientEvent>(raw).unwrap() else {
            panic!("expected feedback");
        };
        assert_eq!(req.presentation_id, Some(9));
        assert_eq!(req.feedback_type, "too_fast");
        assert!(req.content.is_none());
    }

    #[test]
    fn test_parse_feedback_without_presentation() {
        let raw = r#"{"event":"feedback","data":{"feedbackType":"too_fast"}}"#;
        let ClientEvent::Feedback(req) = serde_json::from_str::<ClientEvent>(raw).unwrap() else {
            panic!("expected feedback");
        };
        assert_eq!(req.presentation_id, None);
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"shout","data":{}}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(
            r#"{"event":"join","data":{"presentation_id":1,"role":"organizer"}}"#
        )
        .is_err());
    }

    #[test]
    fn test_notification_wire_shape() {
        let event = ServerEvent::notification(NotificationKind::ListenerJoined, "A listener joined", Some(2));
        assert_eq!(
            encode(&event),
            json!({"event": "notification", "data": {"type": "listener_joined", "message": "A listener joined", "listeners_count": 2}})
        );

        let event = ServerEvent::notification(NotificationKind::SpeakerChanged, "replaced", None);
        assert_eq!(encode(&event)["data"].get("listeners_count"), None);
    }

    #[test]
    fn test_joined_and_error_wire_shape() {
        assert_eq!(
            encode(&ServerEvent::Joined { presentation_id: 4, role: RoomRole::Listener }),
            json!({"event": "joined", "data": {"presentation_id": 4, "role": "listener"}})
        );
        assert_eq!(
            encode(&ServerEvent::error("nope")),
            json!({"event": "error", "data": {"msg": "nope"}})
        );
    }

    #[test]
    fn test_receive_feedback_uses_camel_case_type() {
        let fb = Feedback {
            id: 1,
            presentation_id: 2,
            user_id: 3,
            feedback_type: "too_slow".into(),
            content: None,
            created_at: "2026-01-01T00:00:00+00:00".into(),
        };
        let value = encode(&ServerEvent::ReceiveFeedback(FeedbackPayload::new(&fb, "ann")));
        assert_eq!(value["event"], "receive_feedback");
        assert_eq!(value["data"]["feedbackType"], "too_slow");
        assert_eq!(value["data"]["username"], "ann");
        assert_eq!(value["data"]["timestamp"], "2026-01-01T00:00:00+00:00");
    }
}

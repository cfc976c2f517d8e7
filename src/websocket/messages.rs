use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{PlayCommand, PlaySnapshot};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Host action; rejected for spectators
    Command { command: PlayCommand },
    /// Ask for the current snapshot again
    Refresh,
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot {
        session_id: Uuid,
        snapshot: PlaySnapshot,
    },
    SessionEnded {
        session_id: Uuid,
    },
    Pong,
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_message_deserialization() {
        let json = r#"{"type": "command", "command": {"action": "select", "category": 0, "question": 3}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();

        match msg {
            ClientMessage::Command { command } => assert_eq!(
                command,
                PlayCommand::Select {
                    category: 0,
                    question: 3
                }
            ),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_simple_client_messages() {
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type": "ping"}"#).unwrap(),
            ClientMessage::Ping
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type": "refresh"}"#).unwrap(),
            ClientMessage::Refresh
        ));
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "dance"}"#).is_err());
    }

    #[test]
    fn test_server_message_serialization() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ServerMessage::SessionEnded { session_id: id }).unwrap();
        assert_eq!(json["type"], "session_ended");
        assert_eq!(json["session_id"], id.to_string());

        let json = serde_json::to_value(ServerMessage::Error {
            message: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "nope");
    }
}

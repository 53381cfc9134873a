use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! persisted_id {
    ($name:ident) => {
        /// UUIDv7 — time-sortable, aids log correlation and DB index locality.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

macro_rules! ephemeral_id {
    ($name:ident) => {
        /// Random UUIDv4 — not persisted, lives only for the connection/request.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

persisted_id!(UserId);
persisted_id!(AgentId);
persisted_id!(ConversationId);
persisted_id!(FrameId);
persisted_id!(MessageId);
persisted_id!(SkillId);
persisted_id!(McpServerId);
persisted_id!(FaceIdentityId);
persisted_id!(FacePhotoId);

ephemeral_id!(ConnId);
ephemeral_id!(ApprovalId);

/// The reserved per-user agent used by the orchestrator for routing.
/// Cannot be renamed or deleted; its `excluded_tools` set may not grow
/// beyond the routing tools (`route_to_agent`, `route_to_user`).
pub const ADMINISTRATOR_AGENT_NAME: &str = "Administrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// Risk classification controlling whether a tool call requires approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    High,
}

/// MCP server transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    Sse,
    Stdio,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_ids_are_uuid_v7() {
        let a = UserId::new();
        let parsed = Uuid::parse_str(a.as_str()).expect("valid uuid");
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn ephemeral_ids_are_uuid_v4() {
        let a = ConnId::new();
        let parsed = Uuid::parse_str(a.as_str()).expect("valid uuid");
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn message_role_round_trips_through_string() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::Tool] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(parsed, role);
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Who authored a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire-format name, as used by completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Model tier used for a completion call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTier {
    /// Small, cheap model for classification and routine summarization.
    #[default]
    Fast,
    /// Larger model used as fallback or for final synthesis.
    Powerful,
}

/// Explicit knowledge-base lifecycle command attached to a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KbCommand {
    /// Flush the knowledge base and ingest the attached documents fresh.
    Create,
    /// Append the attached documents to the existing knowledge base.
    Update,
}

// =============================================================================
// Core records
// =============================================================================

/// A chunk of source-document text.
///
/// Immutable once stored; created during ingestion, read-only afterward.
/// The stored form in the index carries the embedding alongside.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: Uuid,
    /// Name of the document this fragment was cut from.
    pub source: String,
    /// Ordinal position of the fragment within its source document.
    pub position: usize,
    pub text: String,
}

impl Fragment {
    /// Create a fragment with a fresh ID.
    pub fn new(source: impl Into<String>, position: usize, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            position,
            text: text.into(),
        }
    }
}

/// One message in the conversation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_llm_tier_default_is_fast() {
        assert_eq!(LlmTier::default(), LlmTier::Fast);
    }

    #[test]
    fn test_fragment_new_assigns_id() {
        let a = Fragment::new("doc.md", 0, "first chunk");
        let b = Fragment::new("doc.md", 1, "second chunk");
        assert_ne!(a.id, b.id);
        assert_eq!(a.source, "doc.md");
        assert_eq!(a.position, 0);
        assert_eq!(b.position, 1);
    }

    #[test]
    fn test_fragment_serde_round_trip() {
        let frag = Fragment::new("notes.txt", 3, "some text");
        let json = serde_json::to_string(&frag).unwrap();
        let back: Fragment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frag);
    }

    #[test]
    fn test_message_constructors() {
        let m = Message::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content, "hello");

        let m = Message::assistant("hi");
        assert_eq!(m.role, Role::Assistant);

        let m = Message::system("rules");
        assert_eq!(m.role, Role::System);
    }

    #[test]
    fn test_kb_command_serde_names() {
        let json = serde_json::to_string(&KbCommand::Create).unwrap();
        assert_eq!(json, "\"create\"");
        let back: KbCommand = serde_json::from_str("\"update\"").unwrap();
        assert_eq!(back, KbCommand::Update);
    }
}

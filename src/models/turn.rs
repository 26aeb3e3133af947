//! Conversation turn model.
//!
//! Turns are append-only: once recorded they are never mutated or
//! reordered. Ordering is positional within the owning session's
//! transcript; the timestamp is informational.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The caregiver or child being assessed.
    Subject,
    /// The assessment system (model responses, prompts).
    System,
}

/// Payload carried by a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TurnPayload {
    /// Free-text utterance.
    Text {
        /// The utterance itself.
        content: String,
    },
    /// Reference to an uploaded image (drawing, photo).
    Image {
        /// Opaque reference resolvable by the chat surface.
        reference: String,
    },
}

/// A single timestamped entry in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConversationTurn {
    /// Who produced the turn.
    pub role: TurnRole,
    /// Text or image payload.
    pub payload: TurnPayload,
    /// When the turn was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// Construct a text turn stamped now.
    #[must_use]
    pub fn text(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            payload: TurnPayload::Text {
                content: content.into(),
            },
            recorded_at: Utc::now(),
        }
    }

    /// Construct an image-reference turn stamped now.
    #[must_use]
    pub fn image(role: TurnRole, reference: impl Into<String>) -> Self {
        Self {
            role,
            payload: TurnPayload::Image {
                reference: reference.into(),
            },
            recorded_at: Utc::now(),
        }
    }

    /// Render the turn for inclusion in a synthesis prompt.
    #[must_use]
    pub fn render(&self) -> String {
        let speaker = match self.role {
            TurnRole::Subject => "caregiver",
            TurnRole::System => "assistant",
        };
        match &self.payload {
            TurnPayload::Text { content } => format!("{speaker}: {content}"),
            TurnPayload::Image { reference } => format!("{speaker}: [image: {reference}]"),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a comment, which also decides who may read it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    FromRequester,
    FromTechnician,
    /// Technician-only note; never shown to the requester
    Internal,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub kind: CommentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Comment {
    pub const SYSTEM_AUTHOR: &'static str = "System";

    pub fn new(
        author: impl Into<String>,
        text: impl Into<String>,
        kind: CommentKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            created_at,
            kind,
            email: None,
        }
    }

    pub fn system(text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(Self::SYSTEM_AUTHOR, text, CommentKind::System, created_at)
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn is_visible_to_requester(&self) -> bool {
        self.kind != CommentKind::Internal
    }
}

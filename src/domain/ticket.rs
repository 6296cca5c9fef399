use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::domain::comment::Comment;
use crate::error::SoportechError;

/// Which persistence backend owns a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Remote,
    Local,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Opaque ticket identifier (e.g., `local_1718000000000000`, `9f1c2e...`)
///
/// Local ids always carry the `local_` prefix so the owning backend can be
/// told apart without querying backend state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(String);

impl TicketId {
    pub const LOCAL_PREFIX: &'static str = "local_";

    /// Creates a local ticket id from a counter or timestamp
    pub fn local(n: i64) -> Self {
        Self(format!("{}{}", Self::LOCAL_PREFIX, n))
    }

    /// Wraps an id assigned by the remote document store
    pub fn remote(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn origin(&self) -> Backend {
        if self.0.starts_with(Self::LOCAL_PREFIX) {
            Backend::Local
        } else {
            Backend::Remote
        }
    }
}

impl FromStr for TicketId {
    type Err = SoportechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(SoportechError::InvalidTicketId(s.to_string()));
        }
        if trimmed == Self::LOCAL_PREFIX {
            return Err(SoportechError::InvalidTicketId(s.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a support ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn toggled(self) -> Self {
        match self {
            Self::Open => Self::Closed,
            Self::Closed => Self::Open,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub email: String,
}

/// Technician a ticket is assigned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Assignee {
    pub const UNASSIGNED: &'static str = "unassigned";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Payload for creating a ticket; everything except id and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    pub requester: Requester,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<Assignee>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl NewTicket {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            requester: Requester {
                name: name.into(),
                email: email.into(),
            },
            subject: subject.into(),
            body: body.into(),
            priority: Priority::default(),
            assignee: None,
            comments: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_comment(mut self, comment: Comment) -> Self {
        self.comments.push(comment);
        self
    }

    /// Checks that every required field is non-empty
    pub fn validate(&self) -> Result<(), SoportechError> {
        let missing: Vec<String> = [
            ("name", &self.requester.name),
            ("email", &self.requester.email),
            ("subject", &self.subject),
            ("body", &self.body),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field.to_string())
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SoportechError::Validation { missing })
        }
    }
}

/// Partial update applied with per-field overwrite semantics
///
/// Comments are absent: they only grow through `add_comment` or
/// `update_with_comment`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketPatch {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    /// `Some(None)` clears the assignment
    pub assignee: Option<Option<Assignee>>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub attachments: Option<Vec<String>>,
}

impl TicketPatch {
    pub fn status(status: TicketStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn assign(assignee: Assignee) -> Self {
        Self {
            assignee: Some(Some(assignee)),
            ..Self::default()
        }
    }
}

/// A support ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub requester: Requester,
    pub subject: String,
    pub body: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub assignee: Option<Assignee>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl Ticket {
    /// Materializes a creation payload; new tickets always start Open
    pub fn from_new(id: TicketId, new: NewTicket, now: DateTime<Utc>) -> Self {
        Self {
            id,
            requester: new.requester,
            subject: new.subject,
            body: new.body,
            status: TicketStatus::Open,
            priority: new.priority,
            assignee: new.assignee,
            created_at: now,
            updated_at: now,
            comments: new.comments,
            attachments: new.attachments,
        }
    }

    /// Applies a patch, overwriting only the fields it carries
    pub fn apply(&mut self, patch: TicketPatch, now: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(assignee) = patch.assignee {
            self.assignee = assignee;
        }
        if let Some(subject) = patch.subject {
            self.subject = subject;
        }
        if let Some(body) = patch.body {
            self.body = body;
        }
        if let Some(attachments) = patch.attachments {
            self.attachments = attachments;
        }
        self.updated_at = now;
    }

    pub fn push_comment(&mut self, comment: Comment, now: DateTime<Utc>) {
        self.comments.push(comment);
        self.updated_at = now;
    }

    /// Name shown for the assignee, `unassigned` when nobody has it
    pub fn assignee_name(&self) -> &str {
        self.assignee
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or(Assignee::UNASSIGNED)
    }

    /// Comments a requester is allowed to see
    pub fn requester_comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter().filter(|c| c.is_visible_to_requester())
    }

    pub fn origin(&self) -> Backend {
        self.id.origin()
    }
}

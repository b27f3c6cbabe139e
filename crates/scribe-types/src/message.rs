use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    General,
    JobRelated,
    System,
    Support,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub stored_path: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Everything the sender chooses; ids and read-state are filled in by [`Message::compose`].
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub recipient_id: Uuid,
    pub subject: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub priority: Priority,
    pub message_type: MessageType,
    pub related_job: Option<Uuid>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub message_type: MessageType,
    pub related_job: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Storage revision, maintained by the persistence layer.
    #[serde(skip)]
    pub revision: i64,
}

impl Message {
    pub fn compose(sender_id: Uuid, draft: Draft) -> DomainResult<Self> {
        let subject = draft.subject.trim();
        if subject.is_empty() {
            return Err(DomainError::validation("message subject is required"));
        }
        if draft.content.trim().is_empty() {
            return Err(DomainError::validation("message content is required"));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            sender_id,
            recipient_id: draft.recipient_id,
            subject: subject.to_string(),
            content: draft.content,
            attachments: draft.attachments,
            is_read: false,
            read_at: None,
            priority: draft.priority,
            message_type: draft.message_type,
            related_job: draft.related_job,
            parent_id: draft.parent_id,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }

    /// Whether `user` is the sender or the recipient.
    pub fn involves(&self, user: Uuid) -> bool {
        self.sender_id == user || self.recipient_id == user
    }

    /// Mark as read. Returns `false` if it already was; `read_at` keeps the first read.
    pub fn mark_as_read(&mut self) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(Utc::now());
        true
    }

    pub fn soft_delete(&mut self) {
        if !self.is_deleted {
            self.is_deleted = true;
            self.deleted_at = Some(Utc::now());
        }
    }
}

//! Database row types — these map directly to SQLite rows.
//! Distinct from courier-types API models to keep the DB layer independent.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_types::models::{MessageRecord, UserSummary};

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub password: String,
    pub image: Option<String>,
    pub created_at: String,
}

/// A message joined with both participants' public profile columns.
pub struct MessageRow {
    pub id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_image: Option<String>,
    pub receiver_id: String,
    pub receiver_name: String,
    pub receiver_image: Option<String>,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(MessageRecord {
            id: parse_id(&row.id)?,
            content: row.content,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .with_context(|| format!("corrupt created_at '{}' on message {}", row.created_at, row.id))?
                .with_timezone(&Utc),
            is_read: row.is_read,
            sender: UserSummary {
                id: parse_id(&row.sender_id)?,
                name: row.sender_name,
                image: row.sender_image,
            },
            receiver: UserSummary {
                id: parse_id(&row.receiver_id)?,
                name: row.receiver_name,
                image: row.receiver_image,
            },
        })
    }
}

impl TryFrom<UserRow> for UserSummary {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(UserSummary {
            id: parse_id(&row.id)?,
            name: row.name,
            image: row.image,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

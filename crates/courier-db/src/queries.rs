use crate::models::{MessageRow, UserRow};
use crate::Database;
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row};

/// Shared projection for message reads: the message plus both participants.
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.content, m.is_read, m.created_at,
           s.id, s.name, s.image,
           r.id, r.name, r.image
    FROM messages m
    JOIN users s ON m.sender_id = s.id
    JOIN users r ON m.receiver_id = r.id";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        password_hash: &str,
        image: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, password, image) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, name, password_hash, image],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_name(&self, name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "name", name))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Messages --

    /// Persist a new unread message and read it back joined with both
    /// participants. The returned row is the canonical copy for delivery.
    pub fn create_message(
        &self,
        id: &str,
        content: &str,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<MessageRow> {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, content, sender_id, receiver_id, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                rusqlite::params![id, content, sender_id, receiver_id, created_at],
            )?;

            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            let row = conn.query_row(&sql, [id], map_message)?;
            Ok(row)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            conn.query_row(&sql, [id], map_message).optional()
        })
    }

    /// Both directions between two users, oldest first.
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
                    OR (m.sender_id = ?2 AND m.receiver_id = ?1)
                 ORDER BY m.created_at ASC, m.rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_a, user_b], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip every unread message in the sender -> receiver direction.
    /// Returns how many rows changed.
    pub fn mark_read(&self, sender_id: &str, receiver_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                [sender_id, receiver_id],
            )?;
            Ok(updated)
        })
    }

    /// Live count of unread messages from sender to receiver. Never cached.
    pub fn count_unread(&self, sender_id: &str, receiver_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                [sender_id, receiver_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT id, name, password, image, created_at FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            name: row.get(1)?,
            password: row.get(2)?,
            image: row.get(3)?,
            created_at: row.get(4)?,
        })
    })
    .optional()
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        content: row.get(1)?,
        is_read: row.get(2)?,
        created_at: row.get(3)?,
        sender_id: row.get(4)?,
        sender_name: row.get(5)?,
        sender_image: row.get(6)?,
        receiver_id: row.get(7)?,
        receiver_name: row.get(8)?,
        receiver_image: row.get(9)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::models::MessageRecord;

    fn db_with_users() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("a", "alice", "hash", Some("/alice.png")).unwrap();
        db.create_user("b", "bob", "hash", None).unwrap();
        db
    }

    #[test]
    fn created_message_is_unread_and_joined() {
        let db = db_with_users();

        let row = db.create_message("m1", "hello", "b", "a").unwrap();

        assert!(!row.is_read);
        assert_eq!(row.content, "hello");
        assert_eq!(row.sender_name, "bob");
        assert_eq!(row.receiver_name, "alice");
        assert_eq!(row.receiver_image.as_deref(), Some("/alice.png"));
        assert!(db.get_message("m1").unwrap().is_some());
    }

    #[test]
    fn message_to_unknown_user_fails() {
        let db = db_with_users();
        assert!(db.create_message("m1", "x", "b", "nobody").is_err());
        assert!(db.get_message("m1").unwrap().is_none());
    }

    #[test]
    fn conversation_includes_both_directions_in_order() {
        let db = db_with_users();
        db.create_user("c", "carol", "hash", None).unwrap();
        db.create_message("m1", "one", "a", "b").unwrap();
        db.create_message("m2", "two", "b", "a").unwrap();
        db.create_message("m3", "elsewhere", "a", "c").unwrap();
        db.create_message("m4", "three", "a", "b").unwrap();

        let contents: Vec<String> = db
            .get_conversation("b", "a")
            .unwrap()
            .into_iter()
            .map(|r| r.content)
            .collect();

        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn unread_count_tracks_direction_and_mark_read() {
        let db = db_with_users();
        db.create_message("m1", "1", "b", "a").unwrap();
        db.create_message("m2", "2", "b", "a").unwrap();
        db.create_message("m3", "3", "a", "b").unwrap();

        assert_eq!(db.count_unread("b", "a").unwrap(), 2);
        assert_eq!(db.count_unread("a", "b").unwrap(), 1);

        assert_eq!(db.mark_read("b", "a").unwrap(), 2);
        assert_eq!(db.count_unread("b", "a").unwrap(), 0);
        // other direction untouched
        assert_eq!(db.count_unread("a", "b").unwrap(), 1);

        db.create_message("m4", "4", "b", "a").unwrap();
        assert_eq!(db.count_unread("b", "a").unwrap(), 1);
        assert_eq!(db.mark_read("b", "a").unwrap(), 1);
        assert_eq!(db.mark_read("b", "a").unwrap(), 0);
    }

    #[test]
    fn row_converts_to_record() {
        let db = db_with_users();
        db.create_user("00000000-0000-0000-0000-0000000000a1", "ann", "hash", None).unwrap();
        db.create_user("00000000-0000-0000-0000-0000000000b2", "ben", "hash", None).unwrap();

        let row = db
            .create_message(
                "00000000-0000-0000-0000-0000000000c3",
                "hey",
                "00000000-0000-0000-0000-0000000000b2",
                "00000000-0000-0000-0000-0000000000a1",
            )
            .unwrap();
        let record = MessageRecord::try_from(row).unwrap();

        assert_eq!(record.sender.name, "ben");
        assert_eq!(record.receiver.name, "ann");
        assert!(!record.is_read);
    }
}

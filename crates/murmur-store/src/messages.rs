use rusqlite::params;
use uuid::Uuid;

use crate::database::{format_ts, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{Message, UserId};

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.sender_id.as_str(),
                message.receiver_id.as_str(),
                message.text,
                message.image_url,
                format_ts(&message.created_at),
            ],
        )?;
        Ok(())
    }

    /// Every message exchanged between `a` and `b`, in either direction,
    /// oldest first.
    pub fn get_conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, receiver_id, text, image_url, created_at
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, seq ASC",
        )?;

        let rows = stmt.query_map(params![a.as_str(), b.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Delete the whole conversation between `a` and `b`. Returns the number
    /// of removed messages; an already-empty conversation yields `0`.
    pub fn delete_conversation(&self, a: &UserId, b: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)",
            params![a.as_str(), b.as_str()],
        )?;
        Ok(affected)
    }

    pub fn count_messages(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_id: String = row.get(1)?;
    let receiver_id: String = row.get(2)?;
    let ts_str: String = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id,
        sender_id: UserId(sender_id),
        receiver_id: UserId(receiver_id),
        text: row.get(3)?,
        image_url: row.get(4)?,
        created_at: parse_ts(5, &ts_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::{DateTime, Duration, SubsecRound, Utc};

    fn msg(from: &str, to: &str, text: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: from.into(),
            receiver_id: to.into(),
            text: Some(text.into()),
            image_url: None,
            created_at: at.trunc_subsecs(6),
        }
    }

    #[test]
    fn conversation_is_pairwise_and_ascending() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc::now();

        let second = msg("u2", "u1", "second", t0 + Duration::seconds(1));
        let first = msg("u1", "u2", "first", t0);
        let other = msg("u1", "u3", "elsewhere", t0);
        db.insert_message(&second).unwrap();
        db.insert_message(&first).unwrap();
        db.insert_message(&other).unwrap();

        let convo = db.get_conversation(&"u2".into(), &"u1".into()).unwrap();
        assert_eq!(convo, vec![first, second]);
    }

    #[test]
    fn same_timestamp_keeps_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc::now();
        let a = msg("u1", "u2", "a", t0);
        let b = msg("u2", "u1", "b", t0);
        db.insert_message(&a).unwrap();
        db.insert_message(&b).unwrap();

        let texts: Vec<_> = db
            .get_conversation(&"u1".into(), &"u2".into())
            .unwrap()
            .into_iter()
            .filter_map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn image_only_message_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let mut m = msg("u1", "u2", "", Utc::now());
        m.text = None;
        m.image_url = Some("http://localhost:5000/media/abc.png".into());
        db.insert_message(&m).unwrap();

        let stored = db.get_conversation(&"u2".into(), &"u1".into()).unwrap();
        assert_eq!(stored, vec![m]);
    }

    #[test]
    fn empty_message_rejected_by_schema() {
        let db = Database::open_in_memory().unwrap();
        let mut m = msg("u1", "u2", "", Utc::now());
        m.text = Some(String::new());
        assert!(db.insert_message(&m).is_err());
    }

    #[test]
    fn delete_conversation_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.insert_message(&msg("u1", "u2", "a", now)).unwrap();
        db.insert_message(&msg("u2", "u1", "b", now)).unwrap();
        db.insert_message(&msg("u1", "u3", "c", now)).unwrap();

        assert_eq!(db.delete_conversation(&"u1".into(), &"u2".into()).unwrap(), 2);
        assert_eq!(db.count_messages().unwrap(), 1);

        // Clearing again is a no-op, not an error.
        assert_eq!(db.delete_conversation(&"u2".into(), &"u1".into()).unwrap(), 0);
    }

    #[test]
    fn delete_user_removes_their_messages() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&User {
            id: "u1".into(),
            full_name: "One".into(),
            email: "one@example.com".into(),
            password_hash: "$argon2id$dummy".into(),
            profile_pic: None,
            created_at: Utc::now(),
        })
        .unwrap();
        let now = Utc::now();
        db.insert_message(&msg("u1", "u2", "a", now)).unwrap();
        db.insert_message(&msg("u3", "u1", "b", now)).unwrap();
        db.insert_message(&msg("u2", "u3", "c", now)).unwrap();

        assert!(db.delete_user(&"u1".into()).unwrap());
        assert_eq!(db.count_messages().unwrap(), 1);
        assert!(!db.delete_user(&"u1".into()).unwrap());
    }
}

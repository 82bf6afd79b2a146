//! CRUD operations for [`User`] records.

use rusqlite::{params, OptionalExtension};

use crate::database::{format_ts, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{ProfileUpdate, User, UserId};

const USER_COLUMNS: &str = "id, full_name, email, password_hash, profile_pic, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user. Fails with [`StoreError::Duplicate`] when the email
    /// is already registered.
    pub fn create_user(&self, user: &User) -> Result<()> {
        if self.get_user_by_email(&user.email)?.is_some() {
            return Err(StoreError::Duplicate(user.email.clone()));
        }

        self.conn().execute(
            "INSERT INTO users (id, full_name, email, password_hash, profile_pic, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.as_str(),
                user.full_name,
                user.email,
                user.password_hash,
                user.profile_pic,
                format_ts(&user.created_at),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single user by id.
    pub fn get_user(&self, id: &UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.as_str()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Look up a user by login email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                row_to_user,
            )
            .optional()?)
    }

    /// Every user except `exclude`, newest first. Feeds the roster.
    pub fn list_users_except(&self, exclude: &UserId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS}
             FROM users
             WHERE id <> ?1
             ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(params![exclude.as_str()], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Apply the non-empty fields of `update` and return the updated user.
    pub fn update_user_profile(&self, id: &UserId, update: &ProfileUpdate) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users
             SET full_name   = COALESCE(?2, full_name),
                 profile_pic = COALESCE(?3, profile_pic)
             WHERE id = ?1",
            params![id.as_str(), update.full_name, update.profile_pic],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a user together with every message they sent or received.
    /// Returns `true` if the user existed.
    pub fn delete_user(&self, id: &UserId) -> Result<bool> {
        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE sender_id = ?1 OR receiver_id = ?1",
            params![id.as_str()],
        )?;
        let affected = tx.execute("DELETE FROM users WHERE id = ?1", params![id.as_str()])?;
        tx.commit()?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let created_str: String = row.get(5)?;

    Ok(User {
        id: UserId(id),
        full_name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        profile_pic: row.get(4)?,
        created_at: parse_ts(5, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SubsecRound, Utc};

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.into(),
            full_name: format!("User {id}"),
            email: email.into(),
            password_hash: "$argon2id$dummy".into(),
            profile_pic: None,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    #[test]
    fn create_and_fetch() {
        let db = Database::open_in_memory().unwrap();
        let u = user("u1", "u1@example.com");
        db.create_user(&u).unwrap();

        assert_eq!(db.get_user(&"u1".into()).unwrap(), u);
        assert_eq!(db.get_user_by_email("u1@example.com").unwrap(), Some(u));
        assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());
        assert!(matches!(db.get_user(&"nope".into()), Err(StoreError::NotFound)));
    }

    #[test]
    fn duplicate_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", "same@example.com")).unwrap();
        let err = db.create_user(&user("u2", "same@example.com")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn roster_excludes_self_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let mut old = user("old", "old@example.com");
        old.created_at = Utc::now() - Duration::days(2);
        db.create_user(&old).unwrap();
        let mut me = user("me", "me@example.com");
        me.created_at = Utc::now() - Duration::days(1);
        db.create_user(&me).unwrap();
        db.create_user(&user("new", "new@example.com")).unwrap();

        let ids: Vec<String> = db
            .list_users_except(&"me".into())
            .unwrap()
            .into_iter()
            .map(|u| u.id.0)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn partial_profile_update() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", "u1@example.com")).unwrap();

        let updated = db
            .update_user_profile(
                &"u1".into(),
                &ProfileUpdate {
                    full_name: None,
                    profile_pic: Some("http://localhost/media/a.png".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.full_name, "User u1");
        assert_eq!(
            updated.profile_pic.as_deref(),
            Some("http://localhost/media/a.png")
        );

        let missing = db.update_user_profile(
            &"ghost".into(),
            &ProfileUpdate {
                full_name: Some("Ghost".into()),
                profile_pic: None,
            },
        );
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }
}

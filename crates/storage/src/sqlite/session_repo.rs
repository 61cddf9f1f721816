use academy_core::model::{Identity, SessionRecord, SessionToken};
use sqlx::Row;

use super::{SqliteRepository, mapping::conn, mapping::ser};
use crate::repository::{SessionRepository, StorageError};

fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, StorageError> {
    let token: String = row.try_get("active_session_id").map_err(ser)?;
    let last_login = row.try_get("last_login").map_err(ser)?;
    Ok(SessionRecord::new(SessionToken::from_raw(token), last_login))
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn get_session(
        &self,
        identity: &Identity,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT active_session_id, last_login
                FROM sessions
                WHERE identity = ?1
            ",
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn upsert_session(
        &self,
        identity: &Identity,
        record: &SessionRecord,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO sessions (identity, active_session_id, last_login)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(identity) DO UPDATE SET
                    active_session_id = excluded.active_session_id,
                    last_login = excluded.last_login
            ",
        )
        .bind(identity.as_str())
        .bind(record.active_session_id().as_str())
        .bind(record.last_login())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn delete_session(&self, identity: &Identity) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM sessions WHERE identity = ?1")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        Ok(())
    }
}

//! [`ShareStore`](super::ShareStore) implementation over SQLite.

use chrono::Utc;

use super::{NewShare, ShareStore, Store};
use crate::error::Result;
use crate::models::{File, FileWithShare, Share};

#[async_trait::async_trait]
impl ShareStore for Store {
    async fn get_by_token(&self, token: &str) -> Result<Option<Share>> {
        let share = sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE token = ?")
            .bind(token)
            .fetch_optional(self.pool())
            .await?;
        Ok(share)
    }

    async fn get_file_by_share_token(&self, token: &str) -> Result<Option<FileWithShare>> {
        let Some(share) = self.get_by_token(token).await? else {
            return Ok(None);
        };
        let file = sqlx::query_as::<_, File>("SELECT * FROM files WHERE id = ?")
            .bind(share.file_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(file.map(|file| FileWithShare { file, share }))
    }

    async fn upsert(&self, share: NewShare) -> Result<Share> {
        let now = Utc::now();
        let existing = sqlx::query_as::<_, Share>("SELECT * FROM shares WHERE token = ?")
            .bind(&share.token)
            .fetch_optional(self.pool())
            .await?;

        if existing.is_some() {
            sqlx::query(
                r#"
                UPDATE shares SET
                    syno_share_id = ?, file_id = ?, password = ?, expires_at = ?,
                    sharing_link = ?, url = ?, updated_at = ?
                WHERE token = ?
                "#,
            )
            .bind(&share.syno_share_id)
            .bind(share.file_id)
            .bind(&share.password)
            .bind(share.expires_at)
            .bind(&share.sharing_link)
            .bind(&share.url)
            .bind(now)
            .bind(&share.token)
            .execute(self.pool())
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO shares
                    (token, syno_share_id, file_id, password, expires_at, revoked,
                     sharing_link, url, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
                "#,
            )
            .bind(&share.token)
            .bind(&share.syno_share_id)
            .bind(share.file_id)
            .bind(&share.password)
            .bind(share.expires_at)
            .bind(&share.sharing_link)
            .bind(&share.url)
            .bind(now)
            .bind(now)
            .execute(self.pool())
            .await?;
        }

        self.get_by_token(&share.token)
            .await?
            .ok_or(crate::error::Error::NotFound)
    }

    async fn count_active(&self) -> Result<i64> {
        let now = Utc::now();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shares WHERE revoked = 0 AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }
}

//! The `assets` table, one row at a time.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    error::LibraryError,
    models::{fold_case, user::UserId},
};

use super::AssetId;

/// An asset exactly as stored. Kind-specific columns are `None` for the
/// other kinds.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct AssetRow {
    pub id: AssetId,
    pub kind: String,
    pub name: String,
    pub description: String,
    pub creator_id: UserId,
    pub is_global: bool,
    pub shared_by_id: Option<UserId>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub payload_path: Option<String>,
    pub size: Option<i64>,
    pub extension: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub copyright_holder: Option<String>,
    pub copyright_date: Option<String>,
    pub contents: Option<String>,
}

impl AssetRow {
    pub(crate) async fn fetch(
        conn: &mut SqliteConnection,
        id: AssetId,
    ) -> Result<Option<AssetRow>, LibraryError> {
        let row = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .inspect_err(|e| tracing::warn!("Failed to fetch asset `{id}`. err: {e}"))?;

        Ok(row)
    }

    /// Stores this row as a new asset. `id` is ignored; the new one is
    /// returned.
    #[tracing::instrument(skip_all, fields(kind = %self.kind, name = %self.name))]
    pub(crate) async fn insert(&self, conn: &mut SqliteConnection) -> Result<AssetId, LibraryError> {
        let result = sqlx::query(
            "INSERT INTO assets (kind, name, name_folded, description, creator_id, is_global, \
            shared_by_id, date_created, date_modified, payload_path, size, extension, width, \
            height, copyright_holder, copyright_date, contents) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(&self.kind)
        .bind(&self.name)
        .bind(fold_case(&self.name))
        .bind(&self.description)
        .bind(self.creator_id)
        .bind(self.is_global)
        .bind(self.shared_by_id)
        .bind(self.date_created)
        .bind(self.date_modified)
        .bind(&self.payload_path)
        .bind(self.size)
        .bind(&self.extension)
        .bind(self.width)
        .bind(self.height)
        .bind(&self.copyright_holder)
        .bind(&self.copyright_date)
        .bind(&self.contents)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Failed to insert asset. err: {e}"))?;

        let id = AssetId(result.last_insert_rowid());
        tracing::debug!("inserted asset `{id}`");
        Ok(id)
    }

    /// Writes every mutable column back. `kind`, `creator_id` and
    /// `date_created` stay as they are.
    #[tracing::instrument(skip_all, fields(id = %self.id))]
    pub(crate) async fn update(&self, conn: &mut SqliteConnection) -> Result<(), LibraryError> {
        sqlx::query(
            "UPDATE assets SET name = $1, name_folded = $2, description = $3, is_global = $4, \
            shared_by_id = $5, date_modified = $6, payload_path = $7, size = $8, extension = $9, \
            width = $10, height = $11, copyright_holder = $12, copyright_date = $13, \
            contents = $14 WHERE id = $15",
        )
        .bind(&self.name)
        .bind(fold_case(&self.name))
        .bind(&self.description)
        .bind(self.is_global)
        .bind(self.shared_by_id)
        .bind(self.date_modified)
        .bind(&self.payload_path)
        .bind(self.size)
        .bind(&self.extension)
        .bind(self.width)
        .bind(self.height)
        .bind(&self.copyright_holder)
        .bind(&self.copyright_date)
        .bind(&self.contents)
        .bind(self.id)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Failed to update asset `{}`. err: {e}", self.id))?;

        Ok(())
    }

    /// Removes the row. Tag links go with it.
    pub(crate) async fn delete(conn: &mut SqliteConnection, id: AssetId) -> Result<(), LibraryError> {
        sqlx::query("DELETE FROM assets WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .inspect_err(|e| tracing::warn!("Failed to delete asset `{id}`. err: {e}"))?;

        Ok(())
    }

    pub(crate) async fn set_payload_path(
        conn: &mut SqliteConnection,
        id: AssetId,
        path: &str,
    ) -> Result<(), LibraryError> {
        sqlx::query("UPDATE assets SET payload_path = $1 WHERE id = $2")
            .bind(path)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}

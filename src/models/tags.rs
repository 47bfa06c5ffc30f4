//! Represents tags in all their glory.
//!
//! Tags are plain names. They're made on demand when an asset asks for one
//! and are never deleted automatically.

use std::collections::HashMap;

use sea_query::*;
use sea_query_binder::SqlxBinder as _;
use sqlx::SqliteConnection;

use crate::{
    database::{AssetTags, Tags},
    error::LibraryError,
    models::asset::AssetId,
};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct TagId(pub i64);

impl core::fmt::Display for TagId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    sqlx::FromRow,
)]
pub struct Tag {
    pub id: TagId,
    /// Unique and never empty.
    pub name: String,
}

/// A tag plus how many assets (of some selection) carry it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
pub struct TagUsage {
    pub id: TagId,
    pub name: String,
    pub count: i64,
}

/// Tag counts for one listing source.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct TagFacets {
    /// Ordered by tag name.
    pub tags: Vec<TagUsage>,
    /// Assets with no tags at all.
    pub untagged: i64,
}

/// Splits comma-separated tag input into clean, distinct names.
///
/// Order of first appearance is kept.
pub fn parse_tag_names(input: &str) -> Vec<String> {
    clean_tag_names(&input.split(',').collect::<Vec<_>>())
}

/// Trims, drops empties and de-duplicates an already-split list.
pub(crate) fn clean_tag_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut clean: Vec<String> = Vec::new();
    for name in names.iter().map(|n| n.as_ref().trim()).filter(|n| !n.is_empty()) {
        if !clean.iter().any(|n| n == name) {
            clean.push(name.to_string());
        }
    }
    clean
}

impl Tag {
    /// Finds the tag with this name, making it first if it's new.
    ///
    /// Two callers racing on the same name get the same row.
    #[tracing::instrument(skip(conn))]
    pub(crate) async fn get_or_create(
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Tag, LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::invalid("tags", "tag names can't be empty"));
        }

        sqlx::query("INSERT INTO tags (name) VALUES ($1) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *conn)
            .await
            .inspect_err(|e| tracing::warn!("Failed to insert tag `{name}`. err: {e}"))?;

        let tag = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = $1")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;

        Ok(tag)
    }

    pub(crate) async fn exists(
        conn: &mut SqliteConnection,
        id: TagId,
    ) -> Result<bool, LibraryError> {
        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(found.is_some())
    }

    /// The tags on one asset, by name.
    pub(crate) async fn for_asset(
        conn: &mut SqliteConnection,
        asset: AssetId,
    ) -> Result<Vec<Tag>, LibraryError> {
        let mut map = Self::for_assets(conn, &[asset]).await?;
        Ok(map.remove(&asset).unwrap_or_default())
    }

    /// The tags on each of the given assets, by name. Untagged assets are
    /// left out of the map.
    pub(crate) async fn for_assets(
        conn: &mut SqliteConnection,
        assets: &[AssetId],
    ) -> Result<HashMap<AssetId, Vec<Tag>>, LibraryError> {
        if assets.is_empty() {
            return Ok(HashMap::new());
        }

        let (select, values) = Query::select()
            .column((AssetTags::Table, AssetTags::AssetId))
            .column((Tags::Table, Tags::Id))
            .column((Tags::Table, Tags::Name))
            .from(AssetTags::Table)
            .inner_join(
                Tags::Table,
                Expr::col((Tags::Table, Tags::Id)).equals((AssetTags::Table, AssetTags::TagId)),
            )
            .and_where(
                Expr::col((AssetTags::Table, AssetTags::AssetId))
                    .is_in(assets.iter().map(|a| a.0)),
            )
            .order_by((Tags::Table, Tags::Name), Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        let rows = sqlx::query_as_with::<_, (AssetId, TagId, String), _>(&select, values)
            .fetch_all(&mut *conn)
            .await
            .inspect_err(|e| tracing::warn!("Failed to load tags for assets. err: {e}"))?;

        let mut map: HashMap<AssetId, Vec<Tag>> = HashMap::new();
        for (asset, id, name) in rows {
            map.entry(asset).or_default().push(Tag { id, name });
        }

        Ok(map)
    }

    /// Replaces an asset's tags with the named ones, creating any that are
    /// missing.
    #[tracing::instrument(skip(conn))]
    pub(crate) async fn set_for_asset(
        conn: &mut SqliteConnection,
        asset: AssetId,
        names: &[String],
    ) -> Result<Vec<Tag>, LibraryError> {
        sqlx::query("DELETE FROM asset_tags WHERE asset_id = $1")
            .bind(asset)
            .execute(&mut *conn)
            .await?;

        let mut tags = Vec::with_capacity(names.len());
        for name in clean_tag_names(names) {
            let tag = Self::get_or_create(conn, &name).await?;

            sqlx::query("INSERT OR IGNORE INTO asset_tags (asset_id, tag_id) VALUES ($1, $2)")
                .bind(asset)
                .bind(tag.id)
                .execute(&mut *conn)
                .await
                .inspect_err(|e| {
                    tracing::warn!("Failed to tag asset `{asset}` with `{name}`. err: {e}")
                })?;

            tags.push(tag);
        }

        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    /// Gives `to` the same tag links as `from`.
    pub(crate) async fn copy_links(
        conn: &mut SqliteConnection,
        from: AssetId,
        to: AssetId,
    ) -> Result<(), LibraryError> {
        sqlx::query(
            "INSERT OR IGNORE INTO asset_tags (asset_id, tag_id) \
            SELECT $1, tag_id FROM asset_tags WHERE asset_id = $2",
        )
        .bind(to)
        .bind(from)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Failed to copy tags from `{from}` to `{to}`. err: {e}"))?;

        Ok(())
    }
}

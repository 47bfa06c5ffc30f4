//! Sharing: copying an asset into someone else's inbox, and what they do
//! with it there.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    config::Config,
    error::LibraryError,
    models::{tags::Tag, user::UserId},
    storage,
};

use super::{Asset, AssetId, AssetRow};

/// Checks that `by` may share `asset` with `with`.
pub fn check_can_share(asset: &Asset, by: UserId, with: UserId) -> Result<(), LibraryError> {
    if !asset.is_visible_to(by) {
        return Err(LibraryError::not_found(format!("asset {}", asset.id)));
    }
    if by == with {
        return Err(LibraryError::invalid(
            "shared_with",
            "You can't share an asset with yourself.",
        ));
    }
    if asset.is_global {
        return Err(LibraryError::denied("global assets can't be shared"));
    }
    if asset.creator != by {
        return Err(LibraryError::denied("only the creator may share an asset"));
    }
    Ok(())
}

/// Checks that `asset` is waiting in `user`'s inbox.
///
/// Other people's assets look missing.
pub fn check_in_inbox(asset: &Asset, user: UserId) -> Result<(), LibraryError> {
    if asset.creator != user {
        return Err(LibraryError::not_found(format!("asset {}", asset.id)));
    }
    if asset.shared_by.is_none() {
        return Err(LibraryError::NotShared(asset.id));
    }
    Ok(())
}

/// The result of copying an asset for someone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SharedCopy {
    pub id: AssetId,
    /// Written to disk already. Remove it if the transaction fails.
    pub payload: Option<Utf8PathBuf>,
}

/// Inserts an independent copy of `asset` into `with`'s inbox.
///
/// Fields, tag links and payload are all copied. The copy is never global
/// and gets fresh timestamps.
#[tracing::instrument(skip(conn, config, asset), fields(asset = %asset.id))]
pub(crate) async fn insert_shared_copy(
    conn: &mut SqliteConnection,
    config: &Config,
    asset: &Asset,
    by: UserId,
    with: UserId,
    now: DateTime<Utc>,
) -> Result<SharedCopy, LibraryError> {
    let mut row = asset.to_row();
    row.creator_id = with;
    row.shared_by_id = Some(by);
    row.is_global = false;
    row.date_created = now;
    row.date_modified = now;
    row.payload_path = None;

    let id = row.insert(conn).await?;
    Tag::copy_links(conn, asset.id, id).await?;

    let payload = match asset.payload_path() {
        Some(from) => {
            let copied = storage::copy_payload(config, from, asset.kind(), id).await?;
            if let Err(e) = AssetRow::set_payload_path(conn, id, copied.as_str()).await {
                _ = storage::remove_payload(config, &copied).await.inspect_err(|e| {
                    tracing::warn!("Failed to clean up copied payload `{copied}`. err: {e}")
                });
                return Err(e);
            }
            Some(copied)
        }
        None => None,
    };

    tracing::debug!("shared asset `{}` with `{with}` as `{id}`", asset.id);
    Ok(SharedCopy { id, payload })
}

/// Takes an asset out of the inbox.
pub(crate) async fn mark_accepted(
    conn: &mut SqliteConnection,
    id: AssetId,
    now: DateTime<Utc>,
) -> Result<(), LibraryError> {
    sqlx::query("UPDATE assets SET shared_by_id = NULL, date_modified = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await
        .inspect_err(|e| tracing::warn!("Failed to accept asset `{id}`. err: {e}"))?;

    Ok(())
}

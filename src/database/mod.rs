//! Helps to connect to the database.
//!
//! Also names the tables and columns for `sea-query`.

use std::time::Duration;

use sea_query::Iden;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite, Transaction,
};

use crate::{config::Config, error::LibraryError};

/// Opens (creating if needed) the database described by `config` and brings
/// its schema up to date.
#[tracing::instrument(skip_all, fields(path = %config.database_path))]
pub async fn connect(config: &Config) -> Result<Pool<Sqlite>, LibraryError> {
    let options = SqliteConnectOptions::new()
        .filename(config.database_path.as_std_path())
        .create_if_missing(true)
        // readers don't block the single writer
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .inspect_err(|e| tracing::error!("Failed to connect to the asset database. err: {e}"))?;

    // we'll also run migrations here real quick
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .inspect_err(|e| {
            tracing::error!(
                "Database connection succeeded, but migrating the database failed! err: {e}"
            )
        })?;

    tracing::debug!("database is ready");
    Ok(pool)
}

/// Starts a transaction that takes the write lock up front.
///
/// A deferred transaction that reads before writing can't wait for the lock
/// when another writer got there first, so every write path goes through
/// here instead of `Pool::begin`.
pub async fn begin_write(
    pool: &Pool<Sqlite>,
) -> Result<Transaction<'static, Sqlite>, LibraryError> {
    pool.begin_with("BEGIN IMMEDIATE")
        .await
        .inspect_err(|e| tracing::warn!("Failed to start a write transaction. err: {e}"))
        .map_err(LibraryError::from)
}

/// the asset table
#[derive(Clone, Copy, Debug, Iden)]
pub enum Assets {
    Table,
    Id,
    Kind,
    Name,
    NameFolded,
    Description,
    CreatorId,
    IsGlobal,
    SharedById,
    DateCreated,
    DateModified,
    PayloadPath,
    Size,
    Extension,
    Width,
    Height,
    CopyrightHolder,
    CopyrightDate,
    Contents,
}

#[derive(Clone, Copy, Debug, Iden)]
pub enum Tags {
    Table,
    Id,
    Name,
}

/// links assets to their tags
#[derive(Clone, Copy, Debug, Iden)]
pub enum AssetTags {
    Table,
    AssetId,
    TagId,
}

#[derive(Clone, Copy, Debug, Iden)]
pub enum Users {
    Table,
    Id,
    Username,
    FirstName,
    LastName,
    Email,
    SearchText,
}

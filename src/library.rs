//! The library itself: one handle that owns the database pool, the config
//! and the permission rules, and runs every operation against them.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::{
    config::Config,
    database,
    error::LibraryError,
    models::{
        asset::{
            share::{self, SharedCopy},
            Asset, AssetChanges, AssetId, AssetKind, AssetRow, NewAsset, Upload,
        },
        permissions::GlobalPermissions,
        tags::{Tag, TagFacets, TagUsage},
        user::{User, UserId, UserMatch},
    },
    search::{
        facets, AssetFilter, AssetPage, FilterSpec, Modifier, Ordering, Pagination, Source,
    },
    storage,
    transfer::{self, Thumbnail, TransformParams, TransformedImage},
    validation,
};

#[derive(Clone)]
pub struct Library {
    pool: Pool<Sqlite>,
    config: Config,
    permissions: Arc<dyn GlobalPermissions>,
}

impl Library {
    /// Validates the config, makes the media root and connects to (and
    /// migrates) the database.
    #[tracing::instrument(skip_all)]
    pub async fn open(
        mut config: Config,
        permissions: impl GlobalPermissions + 'static,
    ) -> Result<Self, LibraryError> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.media_root)
            .await
            .inspect_err(|e| {
                tracing::error!("Failed to create media root `{}`. err: {e}", config.media_root)
            })
            .map_err(|e| LibraryError::storage(&config.media_root, e))?;

        let pool = database::connect(&config).await?;
        Ok(Self {
            pool,
            config,
            permissions: Arc::new(permissions),
        })
    }

    /// Wraps an existing pool. The schema must already be migrated.
    ///
    /// The config is validated (and normalized) just like in [`Self::open`].
    pub fn new(
        pool: Pool<Sqlite>,
        mut config: Config,
        permissions: impl GlobalPermissions + 'static,
    ) -> Result<Self, LibraryError> {
        config.validate()?;

        Ok(Self {
            pool,
            config,
            permissions: Arc::new(permissions),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Inserts a user or refreshes their details.
    pub async fn register_user(&self, user: &User) -> Result<(), LibraryError> {
        let mut conn = self.pool.acquire().await?;
        user.upsert(&mut conn).await
    }

    /// Up to ten users whose display name contains `query`, by name.
    pub async fn search_users(
        &self,
        query: &str,
        exclude: Option<UserId>,
    ) -> Result<Vec<UserMatch>, LibraryError> {
        let mut conn = self.pool.acquire().await?;
        User::search(&mut conn, query, exclude).await
    }

    /// One page of the assets `user` may see that match `spec`.
    #[tracing::instrument(skip(self, pagination))]
    pub async fn list_assets(
        &self,
        spec: &FilterSpec,
        pagination: &Pagination,
        user: UserId,
    ) -> Result<AssetPage, LibraryError> {
        let kinds = self.kinds_for(spec.kind)?;
        let mut conn = self.pool.acquire().await?;

        if let (false, Some(tag)) = (spec.untagged, spec.tag) {
            if !Tag::exists(&mut conn, tag).await? {
                return Err(LibraryError::InvalidFilter(format!(
                    "there's no tag with id `{tag}`"
                )));
            }
        }

        let filter = AssetFilter::from_spec(spec, &kinds, user);
        let total = filter.count(&mut conn).await?;
        let window = pagination.window(total, &spec.page, spec.page_size);

        let assets = match window.offset {
            Some(offset) => {
                let ordering = Ordering::new(spec.sort_by, spec.order_by);
                let rows = filter
                    .fetch(&mut conn, &ordering, u64::from(window.meta.page_size), offset)
                    .await?;
                Asset::load_rows(&mut conn, rows).await?
            }
            None => Vec::new(),
        };

        tracing::debug!(
            "listing page {} of {} ({} assets)",
            window.meta.page,
            window.meta.total_pages,
            assets.len()
        );
        Ok(AssetPage {
            assets,
            meta: window.meta,
        })
    }

    /// An asset `user` may see.
    #[tracing::instrument(skip(self))]
    pub async fn get_asset(&self, id: AssetId, user: UserId) -> Result<Asset, LibraryError> {
        let mut conn = self.pool.acquire().await?;
        visible_asset(&mut conn, id, user).await
    }

    /// Validates and stores a new asset (and its payload) for `user`.
    #[tracing::instrument(skip(self, new), fields(kind = %new.kind, name = %new.name))]
    pub async fn create_asset(&self, mut new: NewAsset, user: UserId) -> Result<Asset, LibraryError> {
        new.validate(&self.config)?;
        let kind = new.kind;

        if new.is_global && !self.permissions.can_manage_global(user, kind) {
            return Err(LibraryError::denied(format!(
                "user `{user}` can't make global {kind} assets"
            )));
        }

        let new = tokio::task::spawn_blocking(move || {
            if let Some(upload) = &new.upload {
                new.derived.populate(kind, upload)?;
            }
            Ok::<_, LibraryError>(new)
        })
        .await??;

        let (row, tag_names, upload) = new.into_row(user, Utc::now())?;

        let mut tx = database::begin_write(&self.pool).await?;
        if !User::exists(&mut tx, user).await? {
            return Err(LibraryError::not_found(format!("user {user}")));
        }

        let mut written = None;
        let inserted = insert_asset(
            &mut tx,
            &self.config,
            &row,
            &tag_names,
            upload.as_ref(),
            &mut written,
        )
        .await;

        let id = match inserted {
            Ok(id) => tx.commit().await.map(|()| id).map_err(LibraryError::from),
            Err(e) => Err(e),
        };
        let id = match id {
            Ok(id) => id,
            Err(e) => {
                self.discard_payload(written.as_deref()).await;
                return Err(e);
            }
        };

        tracing::info!("created {kind} asset `{id}`");
        let mut conn = self.pool.acquire().await?;
        Asset::load(&mut conn, id).await?.ok_or_else(|| {
            LibraryError::InvariantViolation(format!("asset `{id}` vanished after creation"))
        })
    }

    /// Applies `changes` to an asset `user` may edit.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update_asset(
        &self,
        id: AssetId,
        changes: AssetChanges,
        user: UserId,
    ) -> Result<Asset, LibraryError> {
        let mut tx = database::begin_write(&self.pool).await?;
        let mut asset = visible_asset(&mut tx, id, user).await?;
        self.ensure_can_edit(&asset, user)?;

        if let Some(is_global) = changes.is_global {
            if is_global != asset.is_global {
                if !self.permissions.can_manage_global(user, asset.kind()) {
                    return Err(LibraryError::denied(format!(
                        "user `{user}` can't change whether {} assets are global",
                        asset.kind()
                    )));
                }
                if is_global && asset.is_in_inbox() {
                    return Err(LibraryError::invalid(
                        "is_global",
                        "Accept the asset before making it global.",
                    ));
                }
                asset.is_global = is_global;
            }
        }

        changes.apply(&mut asset, Utc::now())?;
        asset.to_row().update(&mut tx).await?;
        if let Some(tags) = &changes.tags {
            Tag::set_for_asset(&mut tx, id, tags).await?;
        }
        tx.commit().await?;

        let mut conn = self.pool.acquire().await?;
        Asset::load(&mut conn, id).await?.ok_or_else(|| {
            LibraryError::InvariantViolation(format!("asset `{id}` vanished after an update"))
        })
    }

    /// Deletes an asset `user` may edit, along with its payload.
    #[tracing::instrument(skip(self))]
    pub async fn delete_asset(&self, id: AssetId, user: UserId) -> Result<(), LibraryError> {
        let mut tx = database::begin_write(&self.pool).await?;
        let asset = visible_asset(&mut tx, id, user).await?;
        self.ensure_can_edit(&asset, user)?;

        AssetRow::delete(&mut tx, id).await?;
        tx.commit().await?;

        self.remove_files(&asset).await?;
        tracing::info!("deleted asset `{id}`");
        Ok(())
    }

    /// Copies an asset into `recipient`'s inbox. Returns the copy's id.
    #[tracing::instrument(skip(self))]
    pub async fn share_asset(
        &self,
        id: AssetId,
        recipient: UserId,
        user: UserId,
    ) -> Result<AssetId, LibraryError> {
        let mut tx = database::begin_write(&self.pool).await?;
        let asset = Asset::load(&mut tx, id)
            .await?
            .ok_or_else(|| LibraryError::not_found(format!("asset {id}")))?;
        share::check_can_share(&asset, user, recipient)?;

        if !User::exists(&mut tx, recipient).await? {
            return Err(LibraryError::not_found(format!("user {recipient}")));
        }

        let SharedCopy { id: copy, payload } =
            share::insert_shared_copy(&mut tx, &self.config, &asset, user, recipient, Utc::now())
                .await?;

        if let Err(e) = tx.commit().await {
            self.discard_payload(payload.as_deref()).await;
            return Err(e.into());
        }

        tracing::info!("shared asset `{id}` with `{recipient}` as `{copy}`");
        Ok(copy)
    }

    /// Keeps an asset from the inbox.
    #[tracing::instrument(skip(self))]
    pub async fn accept_shared(&self, id: AssetId, user: UserId) -> Result<(), LibraryError> {
        let mut tx = database::begin_write(&self.pool).await?;
        let asset = inbox_asset(&mut tx, id, user).await?;

        share::mark_accepted(&mut tx, asset.id, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Throws away an asset from the inbox, payload and all.
    #[tracing::instrument(skip(self))]
    pub async fn reject_shared(&self, id: AssetId, user: UserId) -> Result<(), LibraryError> {
        let mut tx = database::begin_write(&self.pool).await?;
        let asset = inbox_asset(&mut tx, id, user).await?;

        AssetRow::delete(&mut tx, id).await?;
        tx.commit().await?;

        self.remove_files(&asset).await
    }

    /// Copies an asset's payload into a destination. Returns the copy's URI.
    #[tracing::instrument(skip(self))]
    pub async fn select_asset(
        &self,
        id: AssetId,
        destination: &str,
        user: UserId,
    ) -> Result<String, LibraryError> {
        let destination = validation::validate_destination_path(destination, &self.config)?;
        let asset = self.get_asset(id, user).await?;
        transfer::select_payload(&asset, &destination, &self.config).await
    }

    /// Stores an upload as a new asset and selects it right away.
    ///
    /// Without a `kind`, one is guessed from the upload. Nothing is stored
    /// if validation fails.
    #[tracing::instrument(skip(self, upload), fields(file = %upload.filename))]
    pub async fn upload_and_select(
        &self,
        upload: Upload,
        destination: &str,
        kind: Option<AssetKind>,
        user: UserId,
    ) -> Result<(Asset, String), LibraryError> {
        let destination = validation::validate_destination_path(destination, &self.config)?;

        let kind = match kind {
            Some(kind) => kind,
            None => transfer::detect_upload_kind(&upload, &self.config)?,
        };

        let file_name = storage::sanitize_file_name(&upload.filename);
        let name = Utf8Path::new(&file_name)
            .file_stem()
            .filter(|s| !s.is_empty())
            .unwrap_or(file_name.as_str())
            .to_string();

        let new = match kind {
            AssetKind::Image => NewAsset::image(name, upload),
            AssetKind::File => NewAsset::file(name, upload),
            AssetKind::Snippet => {
                return Err(LibraryError::invalid(
                    "asset_type",
                    "Snippets can't be uploaded.",
                ))
            }
        };

        let asset = self.create_asset(new, user).await?;
        let uri = transfer::select_payload(&asset, &destination, &self.config).await?;
        Ok((asset, uri))
    }

    /// Removes files in a destination that aren't listed in `keep`.
    pub async fn clean_destination(
        &self,
        keep: &[String],
        destination: &str,
    ) -> Result<Vec<Utf8PathBuf>, LibraryError> {
        let destination = validation::validate_destination_path(destination, &self.config)?;
        storage::clean_destination(keep, &destination, &self.config).await
    }

    /// Crops, rotates or grays an image under the media root into a new
    /// file.
    #[tracing::instrument(skip(self))]
    pub async fn transform_image(
        &self,
        src: &str,
        params: &TransformParams,
        user: UserId,
    ) -> Result<TransformedImage, LibraryError> {
        let transformation = params.parse()?;

        let relative = storage::media_uri_to_path(src, false, &self.config);
        if relative.as_str().is_empty() || !validation::stays_inside(&relative) {
            return Err(LibraryError::invalid("src", "Not an existing path."));
        }

        let source = self.config.media_root.join(&relative);
        let exists = tokio::fs::try_exists(&source)
            .await
            .inspect_err(|e| tracing::warn!("Couldn't check for `{source}`. err: {e}"))
            .map_err(|e| LibraryError::storage(&source, e))?;
        if !exists {
            return Err(LibraryError::invalid("src", "Not an existing path."));
        }

        transfer::transform::transform_file(source, transformation, &self.config).await
    }

    /// The URI of an image asset's thumbnail, making it if needed.
    #[tracing::instrument(skip(self))]
    pub async fn image_thumbnail(&self, id: AssetId, user: UserId) -> Result<String, LibraryError> {
        let asset = self.get_asset(id, user).await?;
        let thumbnail = Thumbnail::new(&asset, &self.config)
            .ok_or_else(|| LibraryError::invalid("asset", "Only images have thumbnails."))?;

        thumbnail.create(&self.config).await?;
        thumbnail.uri(&self.config)
    }

    /// Tags on the assets `user` may see, with how often each is used.
    #[tracing::instrument(skip(self))]
    pub async fn list_tags(&self, user: UserId) -> Result<Vec<TagUsage>, LibraryError> {
        let filter = AssetFilter::new([
            Modifier::Kinds(self.config.enabled_kinds()),
            Modifier::VisibleTo(user),
        ]);

        let mut conn = self.pool.acquire().await?;
        facets::tag_usage(&mut conn, &filter).await
    }

    /// Tag counts for one listing source.
    #[tracing::instrument(skip(self))]
    pub async fn tag_facets(
        &self,
        source: Option<Source>,
        user: UserId,
    ) -> Result<TagFacets, LibraryError> {
        let filter = AssetFilter::new([
            Modifier::Kinds(self.config.enabled_kinds()),
            Modifier::Source(source, user),
        ]);

        let mut conn = self.pool.acquire().await?;
        facets::tag_facets(&mut conn, filter).await
    }

    /// Every extension in use among the assets of `spec`'s kind(s) that are
    /// global or belong to `user`.
    #[tracing::instrument(skip(self))]
    pub async fn used_extensions(
        &self,
        spec: &FilterSpec,
        user: UserId,
    ) -> Result<Vec<String>, LibraryError> {
        let kinds = self.kinds_for(spec.kind)?;
        let mut filter = AssetFilter::new([Modifier::Kinds(kinds), Modifier::VisibleTo(user)]);
        if !spec.extensions.is_empty() {
            filter = filter.and(Modifier::Extension(spec.extensions.clone()));
        }

        let mut conn = self.pool.acquire().await?;
        filter.extensions(&mut conn).await
    }
}

impl Library {
    /// The asked-for kind if it's enabled, or every enabled kind.
    fn kinds_for(&self, kind: Option<AssetKind>) -> Result<Vec<AssetKind>, LibraryError> {
        match kind {
            Some(kind) if self.config.is_enabled(kind) => Ok(vec![kind]),
            Some(kind) => Err(LibraryError::KindDisabled(kind)),
            None => Ok(self.config.enabled_kinds()),
        }
    }

    fn ensure_can_edit(&self, asset: &Asset, user: UserId) -> Result<(), LibraryError> {
        if asset.can_edit(user, self.permissions.as_ref()) {
            Ok(())
        } else {
            Err(LibraryError::denied(format!(
                "user `{user}` can't change asset `{}`",
                asset.id
            )))
        }
    }

    /// Removes a deleted asset's payload and cached thumbnail.
    async fn remove_files(&self, asset: &Asset) -> Result<(), LibraryError> {
        if let Some(payload) = asset.payload_path() {
            storage::remove_payload(&self.config, payload).await?;
        }

        if let Some(thumbnail) = Thumbnail::new(asset, &self.config) {
            let path = self.config.media_root.join(thumbnail.path());
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(LibraryError::storage(&path, e)),
            }
        }

        Ok(())
    }

    /// Best-effort cleanup of a payload whose row never made it.
    async fn discard_payload(&self, payload: Option<&Utf8Path>) {
        if let Some(payload) = payload {
            _ = storage::remove_payload(&self.config, payload)
                .await
                .inspect_err(|e| tracing::warn!("Failed to clean up payload `{payload}`. err: {e}"));
        }
    }
}

/// Loads an asset if `user` can see it. Otherwise, it doesn't exist.
async fn visible_asset(
    conn: &mut SqliteConnection,
    id: AssetId,
    user: UserId,
) -> Result<Asset, LibraryError> {
    match Asset::load(conn, id).await? {
        Some(asset) if asset.is_visible_to(user) => Ok(asset),
        _ => Err(LibraryError::not_found(format!("asset {id}"))),
    }
}

/// Loads an asset waiting in `user`'s inbox.
async fn inbox_asset(
    conn: &mut SqliteConnection,
    id: AssetId,
    user: UserId,
) -> Result<Asset, LibraryError> {
    let asset = Asset::load(conn, id)
        .await?
        .ok_or_else(|| LibraryError::not_found(format!("asset {id}")))?;
    share::check_in_inbox(&asset, user)?;
    Ok(asset)
}

/// Inserts the row, its tags and its payload. `written` is set as soon as a
/// payload lands on disk.
async fn insert_asset(
    conn: &mut SqliteConnection,
    config: &Config,
    row: &AssetRow,
    tag_names: &[String],
    upload: Option<&Upload>,
    written: &mut Option<Utf8PathBuf>,
) -> Result<AssetId, LibraryError> {
    let id = row.insert(conn).await?;
    Tag::set_for_asset(conn, id, tag_names).await?;

    if let Some(upload) = upload {
        let kind = row
            .kind
            .parse::<AssetKind>()
            .map_err(|k| LibraryError::InvariantViolation(format!("unknown asset kind `{k}`")))?;

        let stored = storage::store_payload(config, kind, id, &upload.filename, &upload.data).await?;
        *written = Some(stored.clone());
        AssetRow::set_payload_path(conn, id, stored.as_str()).await?;
    }

    Ok(id)
}

//! Handles thumbnails for image assets.
//!
//! Thumbnails are made on first request and cached next to the payloads.

use std::io::BufWriter;

use camino::{Utf8Path, Utf8PathBuf};
use image::{imageops::FilterType, ImageFormat, ImageReader};

use crate::{
    config::Config,
    error::LibraryError,
    models::asset::{Asset, AssetDetails, AssetId},
    storage,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thumbnail {
    /// Relative to the media root. Static for an asset id and size.
    path: Utf8PathBuf,

    /// Relative path of the original image.
    source: Utf8PathBuf,

    /// the id of the original image asset.
    asset_id: AssetId,

    width: u32,
    height: u32,
    format: ImageFormat,
}

impl Thumbnail {
    /// Creates a new thumbnail representation for an image asset.
    ///
    /// Other kinds don't get thumbnails.
    pub fn new(asset: &Asset, config: &Config) -> Option<Self> {
        let AssetDetails::Image(image) = &asset.details else {
            return None;
        };

        let size = config.thumbnail_size;
        // pngs stay pngs so transparency survives
        let format = if image.extension == "PNG" {
            ImageFormat::Png
        } else {
            ImageFormat::Jpeg
        };

        Some(Self {
            path: Self::make_path(asset.id, size.width, size.height, format),
            source: image.payload_path.clone(),
            asset_id: asset.id,
            width: size.width,
            height: size.height,
            format,
        })
    }

    /// Grabs the path to the thumbnail, relative to the media root.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Grabs the ID of the original image.
    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    pub fn uri(&self, config: &Config) -> Result<String, LibraryError> {
        storage::path_to_media_uri(&self.path, config)
    }

    /// Makes a real thumbnail file for this representation, unless one's
    /// already on disk.
    #[tracing::instrument(skip(config))]
    pub async fn create(&self, config: &Config) -> Result<(), LibraryError> {
        let target = config.media_root.join(&self.path);

        // avoid recreating thumbnails
        let exists = tokio::fs::try_exists(&target)
            .await
            .map_err(|e| LibraryError::storage(&target, e))?;
        if exists {
            tracing::trace!("attempted to create thumbnail, but it already exists");
            return Ok(());
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LibraryError::storage(parent, e))?;
        }

        let source = config.media_root.join(&self.source);
        let (width, height, format) = (self.width, self.height, self.format);

        tokio::task::spawn_blocking(move || -> Result<(), LibraryError> {
            let image_err = |err| LibraryError::Image {
                path: source.to_string(),
                err,
            };

            let img = ImageReader::open(&source)
                .map_err(|e| LibraryError::storage(&source, e))?
                .with_guessed_format()
                .map_err(|e| LibraryError::storage(&source, e))?
                .decode()
                .map_err(image_err)?;

            let thumbnail = img.resize(width, height, FilterType::Triangle);
            let thumbnail = match format {
                ImageFormat::Jpeg => image::DynamicImage::ImageRgb8(thumbnail.to_rgb8()),
                _ => thumbnail,
            };

            let file = std::fs::File::create(&target)
                .map_err(|e| LibraryError::storage(&target, e))?;
            let mut writer = BufWriter::new(file);
            thumbnail.write_to(&mut writer, format).map_err(image_err)
        })
        .await??;

        tracing::debug!("generated thumbnail for asset `{}`", self.asset_id);
        Ok(())
    }
}

impl Thumbnail {
    /// `asset_library/thumbnails/<id>_<w>x<h>.<png|jpg>`
    fn make_path(id: AssetId, width: u32, height: u32, format: ImageFormat) -> Utf8PathBuf {
        let ext = match format {
            ImageFormat::Png => "png",
            _ => "jpg",
        };
        Utf8PathBuf::from("asset_library/thumbnails").join(format!("{id}_{width}x{height}.{ext}"))
    }
}

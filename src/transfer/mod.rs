//! Moving assets out of the library: selecting them into other
//! applications' storage, and transforming images.

pub mod thumbnail;
pub mod transform;

use std::io::Cursor;

use crate::{
    config::Config,
    error::LibraryError,
    models::asset::{Asset, AssetKind, Upload},
    storage,
    validation::{self, Destination},
};

pub use thumbnail::Thumbnail;
pub use transform::{TransformParams, TransformedImage, Transformation};

/// Copies an asset's payload into a destination. Returns the copy's URI.
///
/// Snippets have nothing to copy.
#[tracing::instrument(skip(asset, config), fields(asset = %asset.id))]
pub async fn select_payload(
    asset: &Asset,
    destination: &Destination,
    config: &Config,
) -> Result<String, LibraryError> {
    let payload = asset.payload_path().ok_or_else(|| {
        LibraryError::invalid("asset", format!("{} assets can't be selected", asset.kind()))
    })?;

    let source = config.media_root.join(payload);
    storage::copy_into_destination(&source, destination, config).await
}

/// Guesses what kind of asset an upload should become.
///
/// Anything that's an allowed image becomes one (if images are on).
/// Otherwise, an allowed file suffix makes it a file (if files are on).
pub fn detect_upload_kind(upload: &Upload, config: &Config) -> Result<AssetKind, LibraryError> {
    if config.is_enabled(AssetKind::Image) {
        let mut payload = Cursor::new(&upload.data[..]);
        if validation::validate_image_extension(&mut payload, &config.image_extensions).is_ok() {
            return Ok(AssetKind::Image);
        }
    }

    if config.is_enabled(AssetKind::File) {
        validation::validate_file_extension(&upload.filename, &config.file_extensions)?;
        return Ok(AssetKind::File);
    }

    Err(LibraryError::InvalidExtension(validation::extension_of(
        &upload.filename,
    )))
}

//! Checks on uploads and destinations before anything touches the disk.

use std::io::{BufRead, Seek, SeekFrom};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use image::{ImageFormat, ImageReader};

use crate::{config::Config, error::LibraryError, storage};

/// The uppercased suffix after the last dot. Empty when there isn't one.
pub fn extension_of(filename: &str) -> String {
    Utf8Path::new(filename)
        .extension()
        .unwrap_or_default()
        .to_uppercase()
}

/// Checks a filename's suffix against an allow-list, ignoring case.
///
/// Returns the uppercased extension.
pub fn validate_file_extension(filename: &str, allowed: &[String]) -> Result<String, LibraryError> {
    let extension = extension_of(filename);

    if allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
        Ok(extension)
    } else {
        tracing::debug!("extension `{extension}` of `{filename}` isn't allowed");
        Err(LibraryError::InvalidExtension(extension))
    }
}

/// Checks that the payload really is an image of an allowed format.
///
/// The name of the upload doesn't matter here. Only its content does. The
/// stream is rewound to the start whatever happens.
///
/// Returns the detected format, like `PNG`.
pub fn validate_image_extension<R: BufRead + Seek>(
    payload: &mut R,
    allowed: &[String],
) -> Result<String, LibraryError> {
    let probed = probe_image_format(payload);
    let rewound = payload.seek(SeekFrom::Start(0));

    let format = probed?;
    rewound.map_err(|e| LibraryError::storage("upload", e))?;

    let name = format_name(format);
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(name)) {
        Ok(name.to_string())
    } else {
        tracing::debug!("image format `{name}` isn't allowed");
        Err(LibraryError::InvalidExtension(name.to_string()))
    }
}

/// Sniffs the format from the magic bytes and makes sure the header
/// decodes.
fn probe_image_format<R: BufRead + Seek>(payload: &mut R) -> Result<ImageFormat, LibraryError> {
    payload
        .seek(SeekFrom::Start(0))
        .map_err(|e| LibraryError::storage("upload", e))?;

    let reader = ImageReader::new(&mut *payload)
        .with_guessed_format()
        .map_err(|e| LibraryError::NotAnImage(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| LibraryError::NotAnImage("unrecognized image format".into()))?;

    reader
        .into_dimensions()
        .map_err(|e| LibraryError::NotAnImage(e.to_string()))?;

    Ok(format)
}

/// The canonical uppercase name for a format.
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "PNG",
        ImageFormat::Jpeg => "JPEG",
        ImageFormat::Gif => "GIF",
        ImageFormat::WebP => "WEBP",
        ImageFormat::Pnm => "PPM",
        ImageFormat::Tiff => "TIFF",
        ImageFormat::Tga => "TGA",
        ImageFormat::Dds => "DDS",
        ImageFormat::Bmp => "BMP",
        ImageFormat::Ico => "ICO",
        ImageFormat::Hdr => "HDR",
        ImageFormat::OpenExr => "EXR",
        ImageFormat::Farbfeld => "FARBFELD",
        ImageFormat::Avif => "AVIF",
        ImageFormat::Qoi => "QOI",
        _ => "UNKNOWN",
    }
}

/// A checked destination, like `email/1/2`, relative to the media root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination(Utf8PathBuf);

impl Destination {
    pub fn as_path(&self) -> &Utf8Path {
        &self.0
    }

    /// The leading `<type>` segment.
    pub fn kind(&self) -> &str {
        self.0.as_str().split('/').next().unwrap_or_default()
    }
}

impl core::fmt::Display for Destination {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Checks that a destination stays inside the media root and looks like
/// `<type>/<digits>/<digits>`.
///
/// A media URL prefix, whitespace and surrounding slashes are fine.
pub fn validate_destination_path(
    destination: &str,
    config: &Config,
) -> Result<Destination, LibraryError> {
    let invalid = || LibraryError::InvalidDestination(destination.to_string());

    let relative = storage::media_uri_to_path(destination, false, config);
    if !stays_inside(&relative) {
        tracing::warn!("destination `{destination}` would escape the media root");
        return Err(invalid());
    }

    let segments = relative.as_str().split('/').collect::<Vec<_>>();
    match segments.as_slice() {
        [kind, first, second]
            if is_type_segment(kind) && is_digits(first) && is_digits(second) =>
        {
            Ok(Destination(relative))
        }
        _ => {
            tracing::debug!("destination `{destination}` has the wrong shape");
            Err(invalid())
        }
    }
}

/// Whether a relative path, joined onto some root, stays below it.
pub(crate) fn stays_inside(relative: &Utf8Path) -> bool {
    let mut depth: usize = 0;
    for component in relative.components() {
        match component {
            Utf8Component::Normal(_) => depth += 1,
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Utf8Component::RootDir | Utf8Component::Prefix(_) => return false,
        }
    }
    true
}

fn is_type_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

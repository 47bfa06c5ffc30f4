//! Everything needed to make (or change) an asset.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::ImageReader;

use crate::{
    config::Config,
    error::{FieldErrors, LibraryError},
    models::{tags::parse_tag_names, user::UserId},
    validation::{self, format_name},
};

use super::{Asset, AssetDetails, AssetId, AssetKind, AssetRow};

/// An uploaded file, held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    /// What the uploader called it. Only the final component is kept on disk.
    pub filename: String,
    pub data: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

impl core::fmt::Debug for Upload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Fields worked out from the payload itself.
///
/// Anything already set is left alone, so explicit values win.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DerivedFields {
    /// The uppercased format (images) or filename suffix (files).
    pub extension: Option<String>,

    /// How large the payload is, in bytes.
    pub size: Option<i64>,

    /// The image's width, in pixels.
    pub width: Option<u32>,

    /// The image's height, in pixels.
    pub height: Option<u32>,
}

impl DerivedFields {
    /// Fills in whatever's missing for an asset of `kind` with this upload.
    ///
    /// Running it twice changes nothing.
    #[tracing::instrument(skip(self))]
    pub fn populate(&mut self, kind: AssetKind, upload: &Upload) -> Result<(), LibraryError> {
        if self.size.is_none() {
            self.size = Some(upload.data.len() as i64);
        }

        match kind {
            AssetKind::Image => self.apply_image(upload),
            AssetKind::File => {
                if self.extension.is_none() {
                    self.extension = Some(validation::extension_of(&upload.filename));
                }
                Ok(())
            }
            AssetKind::Snippet => Ok(()),
        }
    }

    /// Grabs the true format and the dimensions with the `image` crate.
    fn apply_image(&mut self, upload: &Upload) -> Result<(), LibraryError> {
        if self.extension.is_some() && self.width.is_some() && self.height.is_some() {
            return Ok(());
        }

        let reader = ImageReader::new(Cursor::new(&upload.data[..]))
            .with_guessed_format()
            .map_err(|e| LibraryError::NotAnImage(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| LibraryError::NotAnImage("unrecognized image format".into()))?;
        let (width, height) = reader.into_dimensions().map_err(|e| LibraryError::Image {
            path: upload.filename.clone(),
            err: e,
        })?;
        tracing::debug!("got image dimensions from image crate: {width}x{height}");

        self.extension.get_or_insert_with(|| format_name(format).to_string());
        self.width.get_or_insert(width);
        self.height.get_or_insert(height);
        Ok(())
    }
}

/// A request to make an asset.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAsset {
    pub kind: AssetKind,
    pub name: String,
    pub description: String,
    /// Tag names. Missing tags are created.
    pub tags: Vec<String>,
    pub is_global: bool,
    /// Required for images and files.
    pub upload: Option<Upload>,
    /// Required for snippets.
    pub contents: Option<String>,
    pub copyright_holder: Option<String>,
    pub copyright_date: Option<String>,
    pub derived: DerivedFields,
}

impl NewAsset {
    fn new(kind: AssetKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            is_global: false,
            upload: None,
            contents: None,
            copyright_holder: None,
            copyright_date: None,
            derived: DerivedFields::default(),
        }
    }

    pub fn image(name: impl Into<String>, upload: Upload) -> Self {
        Self {
            upload: Some(upload),
            ..Self::new(AssetKind::Image, name)
        }
    }

    pub fn file(name: impl Into<String>, upload: Upload) -> Self {
        Self {
            upload: Some(upload),
            ..Self::new(AssetKind::File, name)
        }
    }

    pub fn snippet(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            contents: Some(contents.into()),
            ..Self::new(AssetKind::Snippet, name)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Takes tags the way a form does: `"cats, dogs"`.
    pub fn with_tag_input(mut self, input: &str) -> Self {
        self.tags = parse_tag_names(input);
        self
    }

    pub fn with_copyright(mut self, holder: impl Into<String>, date: impl Into<String>) -> Self {
        self.copyright_holder = Some(holder.into());
        self.copyright_date = Some(date.into());
        self
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    /// Checks the request against the config. Nothing is written.
    ///
    /// Field problems are reported together. Payload type problems come
    /// after, as their own errors.
    pub fn validate(&self, config: &Config) -> Result<(), LibraryError> {
        if !config.is_enabled(self.kind) {
            return Err(LibraryError::KindDisabled(self.kind));
        }

        let mut errors = FieldErrors::default();
        if self.name.trim().is_empty() {
            errors.push("name", "This field is required.");
        }

        match (self.kind, &self.upload) {
            (AssetKind::Image | AssetKind::File, None) => {
                errors.push("upload", "This field is required.");
            }
            (AssetKind::Image | AssetKind::File, Some(upload)) if upload.data.is_empty() => {
                errors.push("upload", "The submitted file is empty.");
            }
            (AssetKind::Snippet, Some(_)) => {
                errors.push("upload", "Snippets don't take a file.");
            }
            _ => {}
        }

        if self.kind == AssetKind::Snippet && self.contents.is_none() {
            errors.push("contents", "This field is required.");
        }
        if self.kind != AssetKind::Image
            && (self.copyright_holder.is_some() || self.copyright_date.is_some())
        {
            errors.push("copyright_holder", "Only images carry copyright details.");
        }
        errors.finish(())?;

        let allowed = config.allowed_extensions(self.kind);
        match (self.kind, &self.upload) {
            (AssetKind::Image, Some(upload)) => {
                validation::validate_image_extension(&mut Cursor::new(&upload.data[..]), allowed)?;
            }
            (AssetKind::File, Some(upload)) => {
                validation::validate_file_extension(&upload.filename, allowed)?;
            }
            _ => {}
        }

        Ok(())
    }

    /// The row for this asset, minus its payload path, plus the upload to
    /// store.
    ///
    /// `derived` must already be populated.
    pub(crate) fn into_row(
        self,
        creator: UserId,
        now: DateTime<Utc>,
    ) -> Result<(AssetRow, Vec<String>, Option<Upload>), LibraryError> {
        let missing = |field: &str| {
            LibraryError::InvariantViolation(format!(
                "derived field `{field}` wasn't populated for a new {}",
                self.kind
            ))
        };

        let mut row = AssetRow {
            id: AssetId(0),
            kind: self.kind.as_str().to_string(),
            name: self.name.trim().to_string(),
            description: self.description.clone(),
            creator_id: creator,
            is_global: self.is_global,
            shared_by_id: None,
            date_created: now,
            date_modified: now,
            payload_path: None,
            size: None,
            extension: None,
            width: None,
            height: None,
            copyright_holder: None,
            copyright_date: None,
            contents: None,
        };

        match self.kind {
            AssetKind::Image => {
                row.size = Some(self.derived.size.ok_or_else(|| missing("size"))?);
                row.extension = Some(
                    self.derived
                        .extension
                        .clone()
                        .ok_or_else(|| missing("extension"))?,
                );
                row.width = Some(i64::from(self.derived.width.ok_or_else(|| missing("width"))?));
                row.height = Some(i64::from(
                    self.derived.height.ok_or_else(|| missing("height"))?,
                ));
                row.copyright_holder = self.copyright_holder.clone();
                row.copyright_date = self.copyright_date.clone();
            }
            AssetKind::File => {
                row.size = Some(self.derived.size.ok_or_else(|| missing("size"))?);
                row.extension = Some(
                    self.derived
                        .extension
                        .clone()
                        .ok_or_else(|| missing("extension"))?,
                );
            }
            AssetKind::Snippet => {
                row.contents = Some(self.contents.clone().unwrap_or_default());
            }
        }

        Ok((row, self.tags, self.upload))
    }
}

/// A partial update. `None` leaves a field as it is.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct AssetChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replaces every tag.
    pub tags: Option<Vec<String>>,
    pub is_global: Option<bool>,
    /// Images only. Empty clears it.
    pub copyright_holder: Option<String>,
    /// Images only. Empty clears it.
    pub copyright_date: Option<String>,
    /// Snippets only.
    pub contents: Option<String>,
}

impl AssetChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the scalar changes to `asset` and bumps its modification
    /// date. Tags and `is_global` are left to the caller.
    pub(crate) fn apply(&self, asset: &mut Asset, now: DateTime<Utc>) -> Result<(), LibraryError> {
        let mut errors = FieldErrors::default();

        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                errors.push("name", "This field is required.");
            }
        }

        let wants_copyright = self.copyright_holder.is_some() || self.copyright_date.is_some();
        match &mut asset.details {
            AssetDetails::Image(image) => {
                if let Some(holder) = &self.copyright_holder {
                    image.copyright_holder = non_empty(holder);
                }
                if let Some(date) = &self.copyright_date {
                    image.copyright_date = non_empty(date);
                }
                if self.contents.is_some() {
                    errors.push("contents", "Only snippets have contents.");
                }
            }
            AssetDetails::Snippet(snippet) => {
                if let Some(contents) = &self.contents {
                    snippet.contents.clone_from(contents);
                }
                if wants_copyright {
                    errors.push("copyright_holder", "Only images carry copyright details.");
                }
            }
            AssetDetails::File(_) => {
                if self.contents.is_some() {
                    errors.push("contents", "Only snippets have contents.");
                }
                if wants_copyright {
                    errors.push("copyright_holder", "Only images carry copyright details.");
                }
            }
        }
        errors.finish(())?;

        if let Some(name) = &self.name {
            asset.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            asset.description.clone_from(description);
        }
        asset.date_modified = now;

        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

//! Assets: images, files and text snippets.
//!
//! Every kind shares one record. The kind-specific parts live in
//! [`AssetDetails`], picked by the row's `kind` column.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    error::LibraryError,
    models::{permissions::GlobalPermissions, tags::Tag, user::UserId},
};

pub mod builder;
pub mod row;
pub mod share;
pub mod view;

pub use builder::{AssetChanges, DerivedFields, NewAsset, Upload};
pub use row::AssetRow;
pub use view::AssetView;

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
pub struct AssetId(pub i64);

impl core::fmt::Display for AssetId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of an asset. It never changes after creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    File,
    Snippet,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [AssetKind::Image, AssetKind::File, AssetKind::Snippet];

    /// The value stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::File => "file",
            AssetKind::Snippet => "snippet",
        }
    }

    /// Where payloads of this kind live, relative to the media root.
    ///
    /// Snippets don't have payloads.
    pub fn payload_dir(&self) -> Option<&'static str> {
        match self {
            AssetKind::Image => Some("asset_library/images"),
            AssetKind::File => Some("asset_library/files"),
            AssetKind::Snippet => None,
        }
    }

    pub fn has_payload(&self) -> bool {
        self.payload_dir().is_some()
    }
}

impl core::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AssetKind {
    type Err = String;

    /// Takes both the singular and the plural form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" | "images" => Ok(AssetKind::Image),
            "file" | "files" => Ok(AssetKind::File),
            "snippet" | "snippets" => Ok(AssetKind::Snippet),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub description: String,
    /// Sorted by name.
    pub tags: Vec<Tag>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub creator: UserId,
    pub is_global: bool,
    /// Set only while the asset waits in its creator's inbox.
    pub shared_by: Option<UserId>,
    pub details: AssetDetails,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetDetails {
    Image(ImageDetails),
    File(FileDetails),
    Snippet(SnippetDetails),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ImageDetails {
    /// Relative to the media root.
    pub payload_path: Utf8PathBuf,
    pub width: u32,
    pub height: u32,
    /// Bytes.
    pub size: i64,
    /// The decoded format, like `JPEG`.
    pub extension: String,
    pub copyright_holder: Option<String>,
    pub copyright_date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct FileDetails {
    /// Relative to the media root.
    pub payload_path: Utf8PathBuf,
    /// Bytes.
    pub size: i64,
    /// The filename suffix, uppercased.
    pub extension: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SnippetDetails {
    pub contents: String,
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        match self.details {
            AssetDetails::Image(_) => AssetKind::Image,
            AssetDetails::File(_) => AssetKind::File,
            AssetDetails::Snippet(_) => AssetKind::Snippet,
        }
    }

    /// The stored payload, relative to the media root.
    pub fn payload_path(&self) -> Option<&Utf8Path> {
        match &self.details {
            AssetDetails::Image(image) => Some(&image.payload_path),
            AssetDetails::File(file) => Some(&file.payload_path),
            AssetDetails::Snippet(_) => None,
        }
    }

    pub fn extension(&self) -> Option<&str> {
        match &self.details {
            AssetDetails::Image(image) => Some(&image.extension),
            AssetDetails::File(file) => Some(&file.extension),
            AssetDetails::Snippet(_) => None,
        }
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_in_inbox(&self) -> bool {
        self.shared_by.is_some()
    }

    pub fn is_visible_to(&self, user: UserId) -> bool {
        self.is_global || self.creator == user
    }

    /// Whether `user` may change or delete this asset.
    pub fn can_edit(&self, user: UserId, permissions: &dyn GlobalPermissions) -> bool {
        if self.is_global {
            permissions.can_manage_global(user, self.kind())
        } else {
            self.creator == user
        }
    }

    /// Loads an asset with its tags.
    pub(crate) async fn load(
        conn: &mut SqliteConnection,
        id: AssetId,
    ) -> Result<Option<Asset>, LibraryError> {
        let Some(row) = AssetRow::fetch(conn, id).await? else {
            return Ok(None);
        };

        let tags = Tag::for_asset(conn, id).await?;
        Ok(Some(Asset::from_row(row, tags)?))
    }

    /// Turns many rows into assets, fetching all of their tags at once.
    pub(crate) async fn load_rows(
        conn: &mut SqliteConnection,
        rows: Vec<AssetRow>,
    ) -> Result<Vec<Asset>, LibraryError> {
        let ids = rows.iter().map(|r| r.id).collect::<Vec<_>>();
        let mut tags = Tag::for_assets(conn, &ids).await?;

        rows.into_iter()
            .map(|row| {
                let row_tags = tags.remove(&row.id).unwrap_or_default();
                Asset::from_row(row, row_tags)
            })
            .collect()
    }

    /// Builds the asset a row describes.
    ///
    /// A row that's missing a column its kind needs is corrupt.
    pub fn from_row(row: AssetRow, tags: Vec<Tag>) -> Result<Asset, LibraryError> {
        let kind = row
            .kind
            .parse::<AssetKind>()
            .map_err(|k| LibraryError::InvariantViolation(format!("unknown asset kind `{k}`")))?;

        let missing = |column: &str| {
            LibraryError::InvariantViolation(format!(
                "{kind} asset `{}` has no `{column}`",
                row.id
            ))
        };

        let dimension = |value: Option<i64>, column: &str| {
            value
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| missing(column))
        };

        let details = match kind {
            AssetKind::Image => AssetDetails::Image(ImageDetails {
                payload_path: row
                    .payload_path
                    .clone()
                    .map(Utf8PathBuf::from)
                    .ok_or_else(|| missing("payload_path"))?,
                width: dimension(row.width, "width")?,
                height: dimension(row.height, "height")?,
                size: row.size.ok_or_else(|| missing("size"))?,
                extension: row.extension.clone().ok_or_else(|| missing("extension"))?,
                copyright_holder: row.copyright_holder.clone(),
                copyright_date: row.copyright_date.clone(),
            }),
            AssetKind::File => AssetDetails::File(FileDetails {
                payload_path: row
                    .payload_path
                    .clone()
                    .map(Utf8PathBuf::from)
                    .ok_or_else(|| missing("payload_path"))?,
                size: row.size.ok_or_else(|| missing("size"))?,
                extension: row.extension.clone().ok_or_else(|| missing("extension"))?,
            }),
            AssetKind::Snippet => AssetDetails::Snippet(SnippetDetails {
                contents: row.contents.clone().ok_or_else(|| missing("contents"))?,
            }),
        };

        if row.is_global && row.shared_by_id.is_some() {
            return Err(LibraryError::InvariantViolation(format!(
                "asset `{}` is both global and shared",
                row.id
            )));
        }

        Ok(Asset {
            id: row.id,
            name: row.name,
            description: row.description,
            tags,
            date_created: row.date_created,
            date_modified: row.date_modified,
            creator: row.creator_id,
            is_global: row.is_global,
            shared_by: row.shared_by_id,
            details,
        })
    }

    /// The row that stores this asset.
    pub fn to_row(&self) -> AssetRow {
        let mut row = AssetRow {
            id: self.id,
            kind: self.kind().as_str().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            creator_id: self.creator,
            is_global: self.is_global,
            shared_by_id: self.shared_by,
            date_created: self.date_created,
            date_modified: self.date_modified,
            payload_path: None,
            size: None,
            extension: None,
            width: None,
            height: None,
            copyright_holder: None,
            copyright_date: None,
            contents: None,
        };

        match &self.details {
            AssetDetails::Image(image) => {
                row.payload_path = Some(image.payload_path.to_string());
                row.size = Some(image.size);
                row.extension = Some(image.extension.clone());
                row.width = Some(i64::from(image.width));
                row.height = Some(i64::from(image.height));
                row.copyright_holder = image.copyright_holder.clone();
                row.copyright_date = image.copyright_date.clone();
            }
            AssetDetails::File(file) => {
                row.payload_path = Some(file.payload_path.to_string());
                row.size = Some(file.size);
                row.extension = Some(file.extension.clone());
            }
            AssetDetails::Snippet(snippet) => {
                row.contents = Some(snippet.contents.clone());
            }
        }

        row
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::permissions::{GlobalManagers, NoGlobalPermissions};

    pub(crate) fn snippet(id: i64, creator: i64) -> Asset {
        let now = Utc::now();
        Asset {
            id: AssetId(id),
            name: format!("snippet {id}"),
            description: String::new(),
            tags: Vec::new(),
            date_created: now,
            date_modified: now,
            creator: UserId(creator),
            is_global: false,
            shared_by: None,
            details: AssetDetails::Snippet(SnippetDetails {
                contents: "hello".into(),
            }),
        }
    }

    #[test]
    fn kinds_parse_both_forms() {
        assert_eq!("images".parse::<AssetKind>(), Ok(AssetKind::Image));
        assert_eq!(" File ".parse::<AssetKind>(), Ok(AssetKind::File));
        assert_eq!("snippet".parse::<AssetKind>(), Ok(AssetKind::Snippet));
        assert!("video".parse::<AssetKind>().is_err());
    }

    #[test]
    fn edit_rules() {
        let mut asset = snippet(1, 10);
        assert!(asset.is_visible_to(UserId(10)));
        assert!(!asset.is_visible_to(UserId(11)));
        assert!(asset.can_edit(UserId(10), &NoGlobalPermissions));
        assert!(!asset.can_edit(UserId(11), &GlobalManagers(vec![UserId(11)])));

        asset.is_global = true;
        assert!(asset.is_visible_to(UserId(11)));
        assert!(!asset.can_edit(UserId(10), &NoGlobalPermissions));
        assert!(asset.can_edit(UserId(11), &GlobalManagers(vec![UserId(11)])));
    }

    #[test]
    fn rows_round_trip_through_details() {
        let asset = snippet(4, 2);
        let back = Asset::from_row(asset.to_row(), Vec::new()).unwrap();
        assert_eq!(asset, back);
    }

    #[test]
    fn broken_rows_are_invariant_violations() {
        let mut row = snippet(5, 2).to_row();
        row.kind = "image".into();

        let err = Asset::from_row(row, Vec::new()).unwrap_err();
        assert!(matches!(err, LibraryError::InvariantViolation(_)));
    }
}

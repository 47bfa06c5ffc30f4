//! The serializable shape of an asset that API layers hand out.

use chrono::{DateTime, Utc};

use crate::{config::Config, models::user::UserId, storage};

use super::{Asset, AssetDetails, AssetId, AssetKind};

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct AssetView {
    pub id: AssetId,
    pub kind: AssetKind,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub creator: UserId,
    pub is_global: bool,
    pub shared_by: Option<UserId>,

    // images + files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    // images
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright_holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright_date: Option<String>,

    // snippets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    /// In characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

impl Asset {
    pub fn view(&self, config: &Config) -> AssetView {
        let mut view = AssetView {
            id: self.id,
            kind: self.kind(),
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.iter().map(|t| t.name.clone()).collect(),
            date_created: self.date_created,
            date_modified: self.date_modified,
            creator: self.creator,
            is_global: self.is_global,
            shared_by: self.shared_by,
            url: None,
            filename: None,
            size: None,
            extension: None,
            width: None,
            height: None,
            copyright_holder: None,
            copyright_date: None,
            contents: None,
            length: None,
        };

        if let Some(path) = self.payload_path() {
            // stored paths are always relative, so this can't fail
            view.url = storage::path_to_media_uri(path, config).ok();
            view.filename = path.file_name().map(str::to_string);
        }

        match &self.details {
            AssetDetails::Image(image) => {
                view.size = Some(image.size);
                view.extension = Some(image.extension.clone());
                view.width = Some(image.width);
                view.height = Some(image.height);
                view.copyright_holder.clone_from(&image.copyright_holder);
                view.copyright_date.clone_from(&image.copyright_date);
            }
            AssetDetails::File(file) => {
                view.size = Some(file.size);
                view.extension = Some(file.extension.clone());
            }
            AssetDetails::Snippet(snippet) => {
                view.length = Some(snippet.contents.chars().count());
                view.contents = Some(snippet.contents.clone());
            }
        }

        view
    }
}

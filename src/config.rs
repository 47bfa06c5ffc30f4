use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    error::ConfigError,
    models::asset::AssetKind,
    search::page::{OnInvalidPage, Pagination},
};

/// Everything the library needs to know about its surroundings.
///
/// There's no global copy of this. Build one (or read one from disk) and
/// hand it to [`crate::Library`], which threads it to everything else.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// The directory that public media URIs map onto.
    pub media_root: Utf8PathBuf,

    /// The public URL prefix for everything inside `media_root`.
    ///
    /// Always starts and ends with a slash once validated.
    pub media_url: String,

    /// Path to the SQLite database file.
    pub database_path: Utf8PathBuf,

    /// Upper bound on pooled database connections.
    pub max_connections: u32,

    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,

    /// Which kinds of asset the library serves.
    pub enabled_kinds: EnabledKinds,

    /// True image formats (as decoded, not as named) that may be uploaded.
    pub image_extensions: Vec<String>,

    /// Filename suffixes that may be uploaded as file assets.
    pub file_extensions: Vec<String>,

    /// The box image thumbnails are fit into.
    pub thumbnail_size: ThumbnailSize,

    /// Paging for the browsable library.
    pub ui_pagination: Pagination,

    /// Paging for the JSON API.
    pub api_pagination: Pagination,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media_root: Utf8PathBuf::from("media"),
            media_url: String::from("/media/"),
            database_path: Utf8PathBuf::from("asset_library.sqlite"),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            enabled_kinds: EnabledKinds::default(),
            image_extensions: [
                "BMP", "GIF", "IM", "JPEG", "JPG", "MSP", "PCX", "PNG", "PPM", "SPIDER", "TIF",
                "TIFF", "XBM",
            ]
            .map(String::from)
            .to_vec(),
            file_extensions: ["DOC", "RTF", "PDF", "CSV", "XLS", "ZIP", "EPS", "JPEG"]
                .map(String::from)
                .to_vec(),
            thumbnail_size: ThumbnailSize::default(),
            ui_pagination: Pagination {
                default_page_size: 10,
                max_page_size: 50,
                on_invalid_page: OnInvalidPage::ClampToFirst,
            },
            api_pagination: Pagination {
                default_page_size: 20,
                max_page_size: 100,
                on_invalid_page: OnInvalidPage::Empty,
            },
        }
    }
}

impl Config {
    /// Creates a config rooted at the given media directory and database
    /// file. Everything else uses the defaults.
    pub fn new(media_root: impl Into<Utf8PathBuf>, database_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Attempts to read a `Config` from a TOML file on disk.
    ///
    /// Missing keys fall back to their defaults.
    #[tracing::instrument]
    pub async fn from_disk(path: &Utf8Path) -> Result<Self, ConfigError> {
        let s = tokio::fs::read_to_string(path)
            .await
            .inspect_err(|e| tracing::warn!("Failed to read config file at `{path}`. err: {e}"))
            .map_err(ConfigError::ReadFailed)?;

        let mut config: Self = toml::from_str(&s).map_err(ConfigError::ParseFailed)?;
        config.validate()?;

        tracing::debug!("loaded config from `{path}`");
        Ok(config)
    }

    /// Checks the config for nonsense and normalizes the media URL.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.media_root.as_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "media_root".into(),
                reason: "must not be empty".into(),
            });
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_connections".into(),
                reason: "must be at least one".into(),
            });
        }

        for (field, pagination) in [
            ("ui_pagination", &self.ui_pagination),
            ("api_pagination", &self.api_pagination),
        ] {
            if pagination.default_page_size == 0
                || pagination.default_page_size > pagination.max_page_size
            {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    reason: "default page size must be between 1 and the maximum".into(),
                });
            }
        }

        // always `/something/`
        let trimmed = self.media_url.trim().trim_matches('/');
        self.media_url = if trimmed.is_empty() {
            String::from("/")
        } else {
            format!("/{trimmed}/")
        };

        Ok(())
    }

    /// Whether the given kind of asset is served.
    pub fn is_enabled(&self, kind: AssetKind) -> bool {
        match kind {
            AssetKind::Image => self.enabled_kinds.images,
            AssetKind::File => self.enabled_kinds.files,
            AssetKind::Snippet => self.enabled_kinds.snippets,
        }
    }

    /// All enabled kinds, in a stable order.
    pub fn enabled_kinds(&self) -> Vec<AssetKind> {
        AssetKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    /// The upload allow-list for a kind. Snippets don't have one.
    pub fn allowed_extensions(&self, kind: AssetKind) -> &[String] {
        match kind {
            AssetKind::Image => &self.image_extensions,
            AssetKind::File => &self.file_extensions,
            AssetKind::Snippet => &[],
        }
    }
}

/// Switches for each kind of asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EnabledKinds {
    pub images: bool,
    pub files: bool,
    pub snippets: bool,
}

impl EnabledKinds {
    /// Every kind switched on.
    pub fn all() -> Self {
        Self {
            images: true,
            files: true,
            snippets: true,
        }
    }
}

impl Default for EnabledKinds {
    /// Only images, like a fresh install.
    fn default() -> Self {
        Self {
            images: true,
            files: false,
            snippets: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ThumbnailSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ThumbnailSize {
    fn default() -> Self {
        Self {
            width: 150,
            height: 150,
        }
    }
}

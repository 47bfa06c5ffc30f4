use core::error::Error;
use pisserror::Error;

use crate::models::asset::{AssetId, AssetKind};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("The request was invalid. See: {_0}")]
    Validation(FieldErrors),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Couldn't find {what}.")]
    NotFound { what: String },

    #[error("Asset `{_0}` isn't waiting in anyone's inbox.")]
    NotShared(AssetId),

    #[error("Assets of kind `{_0}` are disabled.")]
    KindDisabled(AssetKind),

    #[error("The filter can't be applied: {_0}")]
    InvalidFilter(String),

    #[error("Refusing to use `{_0}` as a destination.")]
    InvalidDestination(String),

    #[error("There's no transformation called `{_0}`.")]
    UnknownTransformation(String),

    #[error("Missing required parameters: {_0}")]
    MissingParameter(FieldList),

    #[error("The upload isn't an image. See: {_0}")]
    NotAnImage(String),

    #[error("The extension `{_0}` isn't allowed here.")]
    InvalidExtension(String),

    #[error("A storage operation failed at `{path}`. See: `{err}`")]
    Storage { path: String, err: std::io::Error },

    #[error("The database has encountered an error. See: `{_0}`")]
    Database(#[from] sqlx::Error),

    #[error("Failed to migrate the database. See: `{_0}`")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("An error occured when processing the image at `{path}`. See: `{err}`")]
    Image { path: String, err: image::ImageError },

    #[error("Stored data broke an invariant: {_0}")]
    InvariantViolation(String),

    #[error("The configuration is unusable. See: `{_0}`")]
    Config(#[from] ConfigError),

    #[error("A `tokio` task unexpectedly panicked. See: `{_0}`")]
    TaskPanicked(#[from] tokio::task::JoinError),
}

impl LibraryError {
    /// A single-field validation error.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::default();
        errors.push(field, message);
        Self::Validation(errors)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }

    pub fn storage(path: impl ToString, err: std::io::Error) -> Self {
        Self::Storage {
            path: path.to_string(),
            err,
        }
    }

    /// Buckets the error for whatever status mapping the caller uses.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_)
            | Self::NotShared(_)
            | Self::KindDisabled(_)
            | Self::InvalidFilter(_)
            | Self::InvalidDestination(_)
            | Self::UnknownTransformation(_)
            | Self::MissingParameter(_)
            | Self::NotAnImage(_)
            | Self::InvalidExtension(_) => ErrorClass::Client,

            Self::PermissionDenied { .. } => ErrorClass::Forbidden,
            Self::NotFound { .. } => ErrorClass::NotFound,

            Self::Storage { .. }
            | Self::Database(_)
            | Self::Migration(_)
            | Self::Image { .. }
            | Self::InvariantViolation(_)
            | Self::Config(_)
            | Self::TaskPanicked(_) => ErrorClass::Server,
        }
    }
}

/// Coarse grouping of [`LibraryError`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The caller sent something bad.
    Client,
    /// The caller isn't allowed to do that.
    Forbidden,
    /// The thing doesn't exist, or the caller can't see it.
    NotFound,
    /// Our fault.
    Server,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read the config file. See: `{_0}`")]
    ReadFailed(std::io::Error),

    #[error("The config file isn't valid TOML for this library. See: `{_0}`")]
    ParseFailed(toml::de::Error),

    #[error("Config value `{field}` is invalid: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// One complaint about one input field.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every bad field in a request, gathered up so they're reported together.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether some error mentions the given field.
    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// `Ok(value)` when nothing was pushed, a `Validation` error otherwise.
    pub fn finish<T>(self, value: T) -> Result<T, LibraryError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(LibraryError::Validation(self))
        }
    }
}

impl core::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let parts = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>();
        f.write_str(&parts.join("; "))
    }
}

/// Names of fields that were expected but absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct FieldList(pub Vec<String>);

impl FieldList {
    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|f| f == field)
    }
}

impl core::fmt::Display for FieldList {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

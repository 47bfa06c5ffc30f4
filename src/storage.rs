//! Paths, URIs and files under the media root.

use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::{fs::OpenOptions, io::AsyncWriteExt as _};
use uuid::Uuid;

use crate::{
    config::Config,
    error::LibraryError,
    models::asset::{AssetId, AssetKind},
    validation::{self, Destination},
};

/// How many fresh names we try before giving up on a collision.
const UNIQUE_NAME_ATTEMPTS: usize = 3;

/// Turns a public media URI (or bare relative path) into a path.
///
/// Scheme, host, query and fragment are dropped, then the media URL prefix
/// and any surrounding slashes. With `absolute`, the result is joined onto
/// the media root. Nothing here checks containment.
pub fn media_uri_to_path(uri: &str, absolute: bool, config: &Config) -> Utf8PathBuf {
    let uri = uri.trim();

    let path = match uri.find("://") {
        Some(i) => {
            let rest = &uri[i + 3..];
            rest.find('/').map(|j| &rest[j..]).unwrap_or_default()
        }
        None => uri,
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_matches('/');

    let prefix = config.media_url.trim_matches('/');
    let relative = if prefix.is_empty() {
        path
    } else if path == prefix {
        ""
    } else {
        match path.strip_prefix(prefix) {
            Some(rest) if rest.starts_with('/') => rest.trim_matches('/'),
            _ => path,
        }
    };

    if absolute {
        config.media_root.join(relative)
    } else {
        Utf8PathBuf::from(relative)
    }
}

/// The public URI for a path under the media root.
pub fn path_to_media_uri(path: &Utf8Path, config: &Config) -> Result<String, LibraryError> {
    let outside = || {
        LibraryError::InvariantViolation(format!(
            "`{path}` isn't inside the media root `{}`",
            config.media_root
        ))
    };

    let relative = if path.is_absolute() || path.starts_with(&config.media_root) {
        path.strip_prefix(&config.media_root).map_err(|_| outside())?
    } else {
        path
    };

    // the strip above is lexical, so `..` can still climb out
    if !validation::stays_inside(relative) {
        return Err(outside());
    }

    let joined = relative
        .components()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("/");

    Ok(format!("{}{joined}", config.media_url))
}

/// A sibling of `path` with the same extension and a random name.
pub fn create_unique_name(path: &Utf8Path) -> Utf8PathBuf {
    let name = Uuid::new_v4().simple().to_string();
    let file_name = match path.extension() {
        Some(ext) => format!("{name}.{ext}"),
        None => name,
    };

    match path.parent() {
        Some(dir) => dir.join(file_name),
        None => Utf8PathBuf::from(file_name),
    }
}

/// Copies `source` into the destination directory under a fresh name.
///
/// Existing files are never overwritten. Returns the copy's public URI.
#[tracing::instrument(skip(config))]
pub async fn copy_into_destination(
    source: &Utf8Path,
    destination: &Destination,
    config: &Config,
) -> Result<String, LibraryError> {
    let dir = config.media_root.join(destination.as_path());
    create_dir(&dir).await?;

    let file_name = source.file_name().unwrap_or("payload");
    let target = copy_to_new_file(source, &dir.join(file_name)).await?;

    tracing::debug!("copied `{source}` to `{target}`");
    path_to_media_uri(&target, config)
}

/// Removes every file directly inside the destination that isn't in
/// `keep`. URIs pointing elsewhere are ignored.
///
/// Returns the removed paths, relative to the media root.
#[tracing::instrument(skip(config))]
pub async fn clean_destination(
    keep: &[String],
    destination: &Destination,
    config: &Config,
) -> Result<Vec<Utf8PathBuf>, LibraryError> {
    let dir = config.media_root.join(destination.as_path());

    let keep = keep
        .iter()
        .map(|uri| media_uri_to_path(uri, false, config))
        .filter(|p| p.parent() == Some(destination.as_path()))
        .collect::<Vec<_>>();

    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LibraryError::storage(&dir, e)),
    };

    let mut removed = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LibraryError::storage(&dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| LibraryError::storage(&dir, e))?;
        if !file_type.is_file() {
            continue;
        }

        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!("skipping non-UTF-8 file in `{dir}`");
            continue;
        };

        let relative = destination.as_path().join(&name);
        if keep.contains(&relative) {
            continue;
        }

        let absolute = dir.join(&name);
        tokio::fs::remove_file(&absolute)
            .await
            .inspect_err(|e| tracing::warn!("Failed to clean `{absolute}`. err: {e}"))
            .map_err(|e| LibraryError::storage(&absolute, e))?;
        removed.push(relative);
    }

    removed.sort();
    Ok(removed)
}

/// The final component of an uploaded file's name. Never a directory part
/// and never `..`.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if last.is_empty() || last == "." || last == ".." {
        String::from("payload")
    } else {
        last.to_string()
    }
}

/// `asset_library/<images|files>/<id>`, relative to the media root.
pub(crate) fn payload_dir(kind: AssetKind, id: AssetId) -> Result<Utf8PathBuf, LibraryError> {
    let base = kind.payload_dir().ok_or_else(|| {
        LibraryError::InvariantViolation(format!("{kind} assets don't have payloads"))
    })?;
    Ok(Utf8PathBuf::from(base).join(id.to_string()))
}

/// Writes an asset's payload into its own directory.
///
/// Returns the path relative to the media root.
#[tracing::instrument(skip(data, config))]
pub(crate) async fn store_payload(
    config: &Config,
    kind: AssetKind,
    id: AssetId,
    file_name: &str,
    data: &[u8],
) -> Result<Utf8PathBuf, LibraryError> {
    let relative = payload_dir(kind, id)?.join(sanitize_file_name(file_name));
    let absolute = config.media_root.join(&relative);

    if let Some(parent) = absolute.parent() {
        create_dir(parent).await?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&absolute)
        .await
        .inspect_err(|e| tracing::warn!("Failed to create payload at `{absolute}`. err: {e}"))
        .map_err(|e| LibraryError::storage(&absolute, e))?;

    let written = async {
        file.write_all(data).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        _ = tokio::fs::remove_file(&absolute).await;
        return Err(LibraryError::storage(&absolute, e));
    }

    Ok(relative)
}

/// Copies one asset's payload into another asset's directory.
#[tracing::instrument(skip(config))]
pub(crate) async fn copy_payload(
    config: &Config,
    from: &Utf8Path,
    kind: AssetKind,
    to: AssetId,
) -> Result<Utf8PathBuf, LibraryError> {
    let file_name = from.file_name().unwrap_or("payload");
    let relative = payload_dir(kind, to)?.join(sanitize_file_name(file_name));
    let absolute = config.media_root.join(&relative);

    if let Some(parent) = absolute.parent() {
        create_dir(parent).await?;
    }

    let source = config.media_root.join(from);
    let mut reader = tokio::fs::File::open(&source)
        .await
        .map_err(|e| LibraryError::storage(&source, e))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&absolute)
        .await
        .map_err(|e| LibraryError::storage(&absolute, e))?;

    if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
        _ = tokio::fs::remove_file(&absolute).await;
        return Err(LibraryError::storage(&absolute, e));
    }

    Ok(relative)
}

/// Removes a payload file and its directory, if that's now empty.
///
/// A payload that's already gone is fine.
#[tracing::instrument(skip(config))]
pub(crate) async fn remove_payload(config: &Config, relative: &Utf8Path) -> Result<(), LibraryError> {
    let absolute = config.media_root.join(relative);

    match tokio::fs::remove_file(&absolute).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("payload `{absolute}` was already gone");
        }
        Err(e) => {
            tracing::warn!("Failed to remove payload `{absolute}`. err: {e}");
            return Err(LibraryError::storage(&absolute, e));
        }
    }

    if let Some(parent) = absolute.parent() {
        let empty = match tokio::fs::read_dir(parent).await {
            Ok(mut entries) => entries
                .next_entry()
                .await
                .map_err(|e| LibraryError::storage(parent, e))?
                .is_none(),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(LibraryError::storage(parent, e)),
        };

        if empty {
            tokio::fs::remove_dir(parent)
                .await
                .map_err(|e| LibraryError::storage(parent, e))?;
        }
    }

    Ok(())
}

/// `create_dir_all`, where "already exists" is fine.
async fn create_dir(dir: &Utf8Path) -> Result<(), LibraryError> {
    match tokio::fs::create_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => {
            tracing::warn!("Failed to create directory `{dir}`. err: {e}");
            Err(LibraryError::storage(dir, e))
        }
    }
}

/// Copies `source` to a unique sibling of `wanted`, never overwriting.
async fn copy_to_new_file(source: &Utf8Path, wanted: &Utf8Path) -> Result<Utf8PathBuf, LibraryError> {
    let mut reader = tokio::fs::File::open(source)
        .await
        .inspect_err(|e| tracing::warn!("Failed to open `{source}` for copying. err: {e}"))
        .map_err(|e| LibraryError::storage(source, e))?;

    let mut last_err = None;
    for _ in 0..UNIQUE_NAME_ATTEMPTS {
        let target = create_unique_name(wanted);

        let mut writer = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(w) => w,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                last_err = Some(LibraryError::storage(&target, e));
                continue;
            }
            Err(e) => return Err(LibraryError::storage(&target, e)),
        };

        if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
            _ = tokio::fs::remove_file(&target).await;
            return Err(LibraryError::storage(&target, e));
        }

        return Ok(target);
    }

    Err(last_err.unwrap_or_else(|| {
        LibraryError::InvariantViolation(format!("couldn't find a free name next to `{wanted}`"))
    }))
}

#[cfg(test)]
mod tests {
    use temp_dir::TempDir;

    use super::*;
    use crate::validation::validate_destination_path;

    fn config_in(dir: &TempDir) -> Config {
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        Config::new(root.join("media"), root.join("db.sqlite"))
    }

    #[test]
    fn uris_become_paths() {
        let config = Config::new("/srv/media", "db.sqlite");

        assert_eq!(
            media_uri_to_path("https://example.org/media/a/b.png?x=1#top", false, &config),
            Utf8PathBuf::from("a/b.png")
        );
        assert_eq!(
            media_uri_to_path("media/a/b.png", true, &config),
            Utf8PathBuf::from("/srv/media/a/b.png")
        );
        assert_eq!(
            media_uri_to_path(" /media/a/ ", false, &config),
            Utf8PathBuf::from("a")
        );
        // only a whole segment counts as the prefix
        assert_eq!(
            media_uri_to_path("/mediation/a", false, &config),
            Utf8PathBuf::from("mediation/a")
        );
    }

    #[test]
    fn paths_become_uris() {
        let config = Config::new("/srv/media", "db.sqlite");

        assert_eq!(
            path_to_media_uri(Utf8Path::new("/srv/media/email/1/1/x.png"), &config).unwrap(),
            "/media/email/1/1/x.png"
        );
        assert_eq!(
            path_to_media_uri(Utf8Path::new("a/b.txt"), &config).unwrap(),
            "/media/a/b.txt"
        );
        for outside in ["/etc/passwd", "../etc/passwd", "a/../../b", "/srv/media/../x"] {
            assert!(
                matches!(
                    path_to_media_uri(Utf8Path::new(outside), &config),
                    Err(LibraryError::InvariantViolation(_))
                ),
                "{outside}"
            );
        }
    }

    #[test]
    fn unique_names_keep_dir_and_extension() {
        let path = Utf8Path::new("a/b/photo.jpg");
        let first = create_unique_name(path);
        let second = create_unique_name(path);

        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(Utf8Path::new("a/b")));
        assert_eq!(first.extension(), Some("jpg"));
        assert_eq!(first.file_stem().map(str::len), Some(32));

        assert_eq!(create_unique_name(Utf8Path::new("noext")).extension(), None);
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\photos\\cat.png"), "cat.png");
        assert_eq!(sanitize_file_name(".."), "payload");
        assert_eq!(sanitize_file_name("dir/"), "payload");
    }

    #[tokio::test]
    async fn copies_never_overwrite() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let source = config.media_root.join("source.txt");
        tokio::fs::create_dir_all(&config.media_root).await.unwrap();
        tokio::fs::write(&source, b"hello").await.unwrap();

        let dest = validate_destination_path("email/1/1", &config).unwrap();
        let first = copy_into_destination(&source, &dest, &config).await.unwrap();
        let second = copy_into_destination(&source, &dest, &config).await.unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("/media/email/1/1/"));
        assert!(first.ends_with(".txt"));

        let copied = media_uri_to_path(&first, true, &config);
        assert_eq!(tokio::fs::read(&copied).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn cleaning_keeps_listed_files() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let source = config.media_root.join("source.txt");
        tokio::fs::create_dir_all(&config.media_root).await.unwrap();
        tokio::fs::write(&source, b"hello").await.unwrap();

        let dest = validate_destination_path("email/2/3", &config).unwrap();
        let keep = copy_into_destination(&source, &dest, &config).await.unwrap();
        let gone = copy_into_destination(&source, &dest, &config).await.unwrap();

        let removed = clean_destination(
            &[keep.clone(), String::from("/media/elsewhere/1/1/x.txt")],
            &dest,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(removed, vec![media_uri_to_path(&gone, false, &config)]);
        assert!(media_uri_to_path(&keep, true, &config).exists());
        assert!(!media_uri_to_path(&gone, true, &config).exists());

        // missing directories are fine
        let empty = validate_destination_path("email/9/9", &config).unwrap();
        assert!(clean_destination(&[], &empty, &config).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn payloads_live_in_their_own_dir() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let stored = store_payload(&config, AssetKind::File, AssetId(7), "../x/report.pdf", b"%PDF")
            .await
            .unwrap();
        assert_eq!(stored, Utf8PathBuf::from("asset_library/files/7/report.pdf"));

        let copied = copy_payload(&config, &stored, AssetKind::File, AssetId(8))
            .await
            .unwrap();
        assert_eq!(copied, Utf8PathBuf::from("asset_library/files/8/report.pdf"));

        remove_payload(&config, &stored).await.unwrap();
        assert!(!config.media_root.join("asset_library/files/7").exists());
        assert!(config.media_root.join(&copied).exists());

        // twice is fine
        remove_payload(&config, &stored).await.unwrap();
        assert!(store_payload(&config, AssetKind::Snippet, AssetId(1), "a", b"")
            .await
            .is_err());
    }
}

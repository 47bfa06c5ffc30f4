//! This module tests the database and config plumbing.

mod common;

#[cfg(test)]
mod tests {
    use asset_library::{
        config::{Config, EnabledKinds},
        database,
        error::ConfigError,
        models::{asset::AssetKind, permissions::NoGlobalPermissions},
        search::OnInvalidPage,
        Library, LibraryError,
    };
    use camino::Utf8PathBuf;
    use temp_dir::TempDir;

    fn temp() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    /// Connecting makes and migrates the database. Doing it twice is fine.
    #[tokio::test]
    async fn connect_migrates() {
        let (_dir, base) = temp();
        let config = Config::new(base.join("media"), base.join("nested/library.sqlite"));

        tokio::fs::create_dir_all(base.join("nested")).await.unwrap();
        let pool = database::connect(&config).await.expect("first connect");

        let tables = sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' AND name != 'sqlite_sequence' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables, ["asset_tags", "assets", "tags", "users"]);

        // readers shouldn't wait on writers
        let journal = sqlx::query_scalar::<_, String>("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(journal, "wal");
        pool.close().await;

        database::connect(&config).await.expect("second connect");
    }

    /// Opening a library makes its media root.
    #[tokio::test]
    async fn open_makes_media_root() {
        let (_dir, base) = temp();
        let config = Config::new(base.join("deep/media"), base.join("library.sqlite"));

        let library = Library::open(config, NoGlobalPermissions).await.unwrap();
        assert!(base.join("deep/media").is_dir());
        assert_eq!(library.config().media_url, "/media/");
    }

    /// Wrapping an existing pool checks the config the same way `open` does.
    #[tokio::test]
    async fn new_validates_the_config() {
        let (_dir, base) = temp();
        let mut config = Config::new(base.join("media"), base.join("library.sqlite"));
        let pool = database::connect(&config).await.unwrap();

        config.media_url = "media".into();
        let library = Library::new(pool.clone(), config.clone(), NoGlobalPermissions).unwrap();
        assert_eq!(library.config().media_url, "/media/");

        config.max_connections = 0;
        assert!(matches!(
            Library::new(pool, config, NoGlobalPermissions),
            Err(LibraryError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    /// Configs come from TOML, with defaults for anything left out.
    #[tokio::test]
    async fn config_from_disk() {
        let (_dir, base) = temp();
        let path = base.join("library.toml");

        tokio::fs::write(
            &path,
            r#"
media_root = "/srv/media"
media_url = "static"

[enabled_kinds]
images = true
files = true
snippets = false

[api_pagination]
default_page_size = 5
max_page_size = 50
on_invalid_page = "clamp_to_first"
"#,
        )
        .await
        .unwrap();

        let config = Config::from_disk(&path).await.unwrap();
        assert_eq!(config.media_root, "/srv/media");
        assert_eq!(config.media_url, "/static/");
        assert_eq!(
            config.enabled_kinds,
            EnabledKinds {
                images: true,
                files: true,
                snippets: false,
            }
        );
        assert_eq!(config.enabled_kinds(), [AssetKind::Image, AssetKind::File]);
        assert_eq!(config.api_pagination.default_page_size, 5);
        assert_eq!(
            config.api_pagination.on_invalid_page,
            OnInvalidPage::ClampToFirst
        );
        assert_eq!(config.ui_pagination, Config::default().ui_pagination);
    }

    /// Broken configs are refused before anything is opened.
    #[tokio::test]
    async fn bad_configs() {
        let (_dir, base) = temp();

        let path = base.join("broken.toml");
        tokio::fs::write(&path, "max_connections = \"lots\"").await.unwrap();
        assert!(matches!(
            Config::from_disk(&path).await,
            Err(ConfigError::ParseFailed(_))
        ));

        assert!(matches!(
            Config::from_disk(&base.join("missing.toml")).await,
            Err(ConfigError::ReadFailed(_))
        ));

        let mut config = Config::new(base.join("media"), base.join("library.sqlite"));
        config.max_connections = 0;
        assert!(matches!(
            Library::open(config, NoGlobalPermissions).await,
            Err(LibraryError::Config(ConfigError::InvalidValue { .. }))
        ));
    }
}

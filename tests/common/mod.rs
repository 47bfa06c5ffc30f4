//! The parent of the other tests.
//!
//! Mostly to import the setup stuff below.

use std::{io::Cursor, str::FromStr as _};

use asset_library::{
    config::{Config, EnabledKinds},
    models::{
        asset::{Asset, NewAsset},
        permissions::GlobalManagers,
        user::{User, UserId},
    },
    Library,
};
use camino::Utf8PathBuf;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use temp_dir::TempDir;
use tracing_subscriber::{filter, layer::SubscriberExt as _, util::SubscriberInitExt as _, Layer};

#[allow(dead_code, reason = "it's used in the other tests")]
pub const ALICE: UserId = UserId(1);
#[allow(dead_code, reason = "it's used in the other tests")]
pub const BOB: UserId = UserId(2);
#[allow(dead_code, reason = "it's used in the other tests")]
pub const CAROL: UserId = UserId(3);
/// Manages global assets of every kind.
#[allow(dead_code, reason = "it's used in the other tests")]
pub const ADMIN: UserId = UserId(100);

/// A library in its own temp directory.
///
/// The directory goes away when this is dropped.
#[allow(dead_code, reason = "it's used in the other tests")]
pub struct Setup {
    pub library: Library,
    pub media_root: Utf8PathBuf,
    _dir: TempDir,
}

/// call this at the top of any new test func! :)
#[allow(dead_code, reason = "it's used in the other tests")]
pub async fn setup() -> Setup {
    setup_with(|_| ()).await
}

/// Like [`setup`], but lets the test change the config first.
#[allow(dead_code, reason = "it's used in the other tests")]
pub async fn setup_with(tweak: impl FnOnce(&mut Config)) -> Setup {
    // start logging. other tests in this binary may have beaten us to it
    _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_test_writer()
                .with_filter(filter::EnvFilter::from_str("DEBUG,sqlx=INFO").unwrap()),
        )
        .try_init();

    let dir = TempDir::new().expect("create temp dir");
    let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp dir is utf-8");
    let media_root = base.join("media");

    let mut config = Config::new(media_root.clone(), base.join("library.sqlite"));
    config.enabled_kinds = EnabledKinds::all();
    tweak(&mut config);

    let library = Library::open(config, GlobalManagers(vec![ADMIN]))
        .await
        .expect("open library");

    for (id, username, first, last) in [
        (ALICE, "alice", "Alice", "Smith"),
        (BOB, "bob", "Bob", "Jones"),
        (CAROL, "carol", "Carol", "Smithers"),
        (ADMIN, "admin", "", ""),
    ] {
        library
            .register_user(&User {
                id,
                username: username.into(),
                first_name: first.into(),
                last_name: last.into(),
                email: format!("{username}@example.com"),
            })
            .await
            .expect("register user");
    }

    Setup {
        library,
        media_root,
        _dir: dir,
    }
}

/// Makes a snippet asset for `user`.
#[allow(dead_code, reason = "it's used in the other tests")]
pub async fn snippet(library: &Library, name: &str, user: UserId) -> Asset {
    library
        .create_asset(NewAsset::snippet(name, format!("contents of {name}")), user)
        .await
        .expect("create snippet")
}

/// An encoded JPEG with a red left half and a blue right half.
#[allow(dead_code, reason = "it's used in the other tests")]
pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    });

    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

/// An encoded PNG with an opaque red top-left pixel and transparency
/// everywhere else.
#[allow(dead_code, reason = "it's used in the other tests")]
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        if x == 0 && y == 0 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });

    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).expect("encode test image");
    buf.into_inner()
}

//! Selecting assets into other storage and transforming images.

mod common;

#[cfg(test)]
mod tests {
    use asset_library::{
        models::asset::{AssetKind, NewAsset, Upload},
        search::FilterSpec,
        transfer::TransformParams,
        LibraryError,
    };
    use camino::Utf8PathBuf;

    use crate::common::{self, Setup, ALICE, BOB};

    /// The path under the media root that a media URI points at.
    fn on_disk(setup: &Setup, uri: &str) -> Utf8PathBuf {
        let relative = uri
            .strip_prefix(setup.library.config().media_url.as_str())
            .expect("uri should start with the media url");
        setup.media_root.join(relative)
    }

    /// Selecting copies the payload into the destination.
    #[tokio::test]
    async fn select() {
        let setup = common::setup().await;
        let library = &setup.library;

        let data = b"a,b\n1,2".to_vec();
        let file = library
            .create_asset(
                NewAsset::file("sheet", Upload::new("sheet.csv", data.clone())),
                ALICE,
            )
            .await
            .unwrap();

        let uri = library
            .select_asset(file.id, "/media/email/1/2/", ALICE)
            .await
            .unwrap();
        assert!(uri.starts_with("/media/email/1/2/"), "uri was `{uri}`");
        assert!(uri.ends_with(".csv"), "uri was `{uri}`");
        assert_eq!(std::fs::read(on_disk(&setup, &uri)).unwrap(), data);

        // selecting twice never overwrites the first copy
        let again = library.select_asset(file.id, "email/1/2", ALICE).await.unwrap();
        assert_ne!(uri, again);
        assert!(on_disk(&setup, &uri).exists());
        assert!(on_disk(&setup, &again).exists());

        // cleaning keeps what's still referenced
        let removed = library
            .clean_destination(&[uri.clone()], "email/1/2")
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert!(on_disk(&setup, &uri).exists());
        assert!(!on_disk(&setup, &again).exists());

        // other people can't select alice's stuff
        assert!(matches!(
            library.select_asset(file.id, "email/1/2", BOB).await,
            Err(LibraryError::NotFound { .. })
        ));
    }

    /// Bad destinations and payload-less assets can't be selected.
    #[tokio::test]
    async fn select_rejects() {
        let setup = common::setup().await;
        let library = &setup.library;

        let snippet = common::snippet(library, "hello", ALICE).await;
        assert!(matches!(
            library.select_asset(snippet.id, "email/1/2", ALICE).await,
            Err(LibraryError::Validation(_))
        ));

        let file = library
            .create_asset(
                NewAsset::file("sheet", Upload::new("sheet.csv", b"a".to_vec())),
                ALICE,
            )
            .await
            .unwrap();
        for destination in ["../../etc", "email/1", "email/../../1/2", "email/x/2", ""] {
            assert!(
                matches!(
                    library.select_asset(file.id, destination, ALICE).await,
                    Err(LibraryError::InvalidDestination(_))
                ),
                "`{destination}` should be rejected"
            );
        }

        // nothing escaped the media root
        assert!(!setup.media_root.join("../etc").exists());
    }

    /// Uploads become assets by their content, then get selected.
    #[tokio::test]
    async fn upload_and_select() {
        let setup = common::setup().await;
        let library = &setup.library;

        // a png pretending to be a jpeg is still a png
        let (asset, uri) = library
            .upload_and_select(
                Upload::new("logo.jpg", common::png(12, 8)),
                "newsletter/3/4",
                None,
                ALICE,
            )
            .await
            .unwrap();
        assert_eq!(asset.kind(), AssetKind::Image);
        assert_eq!(asset.name, "logo");
        assert_eq!(asset.extension(), Some("PNG"));
        assert!(uri.starts_with("/media/newsletter/3/4/"));
        assert!(on_disk(&setup, &uri).exists());

        let (asset, _) = library
            .upload_and_select(
                Upload::new("data.csv", b"x,y".to_vec()),
                "newsletter/3/4",
                None,
                ALICE,
            )
            .await
            .unwrap();
        assert_eq!(asset.kind(), AssetKind::File);
        assert_eq!(asset.extension(), Some("CSV"));

        // claiming an image that isn't one
        assert!(library
            .upload_and_select(
                Upload::new("fake.png", b"not an image".to_vec()),
                "newsletter/3/4",
                Some(AssetKind::Image),
                ALICE,
            )
            .await
            .is_err());

        // disallowed extensions and bad destinations store nothing
        assert!(matches!(
            library
                .upload_and_select(
                    Upload::new("run.exe", b"MZ".to_vec()),
                    "newsletter/3/4",
                    None,
                    ALICE,
                )
                .await,
            Err(LibraryError::InvalidExtension(_))
        ));
        assert!(matches!(
            library
                .upload_and_select(
                    Upload::new("ok.csv", b"1".to_vec()),
                    "../newsletter/3/4",
                    None,
                    ALICE,
                )
                .await,
            Err(LibraryError::InvalidDestination(_))
        ));

        let page = library
            .list_assets(
                &FilterSpec::default(),
                &library.config().ui_pagination,
                ALICE,
            )
            .await
            .unwrap();
        assert_eq!(page.meta.total_items, 2);
    }

    /// Rotations swap dimensions and never touch the source.
    #[tokio::test]
    async fn rotate() {
        let setup = common::setup().await;
        let library = &setup.library;

        let image = library
            .create_asset(
                NewAsset::image("wide", Upload::new("wide.jpg", common::jpeg(230, 219))),
                ALICE,
            )
            .await
            .unwrap();
        let selected = library
            .select_asset(image.id, "email/1/1", ALICE)
            .await
            .unwrap();
        let before = std::fs::read(on_disk(&setup, &selected)).unwrap();

        let rotated = library
            .transform_image(&selected, &TransformParams::rotate(90), ALICE)
            .await
            .unwrap();
        assert_eq!((rotated.width, rotated.height), (219, 230));
        assert_ne!(rotated.uri, selected);
        assert!(rotated.uri.starts_with("/media/email/1/1/"));
        assert!(rotated.uri.ends_with(".jpg"));

        let saved = image::open(on_disk(&setup, &rotated.uri)).unwrap();
        assert_eq!((saved.width(), saved.height()), (219, 230));

        let upside_down = library
            .transform_image(&selected, &TransformParams::rotate(-180), ALICE)
            .await
            .unwrap();
        assert_eq!((upside_down.width, upside_down.height), (230, 219));

        assert_eq!(std::fs::read(on_disk(&setup, &selected)).unwrap(), before);
    }

    /// Crops keep the asked-for box, and grayscale keeps the size.
    #[tokio::test]
    async fn crop_and_grayscale() {
        let setup = common::setup().await;
        let library = &setup.library;

        let image = library
            .create_asset(
                NewAsset::image("pic", Upload::new("pic.png", common::png(50, 40))),
                ALICE,
            )
            .await
            .unwrap();
        let selected = library.select_asset(image.id, "page/7/7", ALICE).await.unwrap();

        let cropped = library
            .transform_image(&selected, &TransformParams::crop(0, 0, 10, 5), ALICE)
            .await
            .unwrap();
        assert_eq!((cropped.width, cropped.height), (10, 5));
        assert!(cropped.uri.ends_with(".png"));

        // the top-left pixel is the only opaque one, and it survives
        let saved = image::open(on_disk(&setup, &cropped.uri)).unwrap().to_rgba8();
        assert_eq!(saved.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(saved.get_pixel(1, 1).0[3], 0);

        let gray = library
            .transform_image(&selected, &TransformParams::grayscale(), ALICE)
            .await
            .unwrap();
        assert_eq!((gray.width, gray.height), (50, 40));
    }

    /// Missing and bad parameters are reported before any file is read.
    #[tokio::test]
    async fn bad_transformations() {
        let setup = common::setup().await;
        let library = &setup.library;

        let image = library
            .create_asset(
                NewAsset::image("pic", Upload::new("pic.jpg", common::jpeg(10, 10))),
                ALICE,
            )
            .await
            .unwrap();
        let selected = library.select_asset(image.id, "page/1/1", ALICE).await.unwrap();

        let crop_without_corners = TransformParams {
            transformation: Some("crop".into()),
            x1: Some(0),
            ..Default::default()
        };
        let Err(LibraryError::MissingParameter(missing)) = library
            .transform_image(&selected, &crop_without_corners, ALICE)
            .await
        else {
            panic!("expected missing parameters");
        };
        assert!(missing.contains("y1") && missing.contains("x2") && missing.contains("y2"));
        assert!(!missing.contains("x1"));

        let blur = TransformParams {
            transformation: Some("blur".into()),
            ..Default::default()
        };
        assert!(matches!(
            library.transform_image(&selected, &blur, ALICE).await,
            Err(LibraryError::UnknownTransformation(name)) if name == "blur"
        ));

        for src in ["/media/../../etc/passwd", "/media/page/1/1/missing.jpg", ""] {
            assert!(
                matches!(
                    library.transform_image(src, &TransformParams::rotate(90), ALICE).await,
                    Err(LibraryError::Validation(errors)) if errors.contains("src")
                ),
                "`{src}` should be rejected"
            );
        }

        // a file can't have children. that's a filesystem failure, not a
        // missing path
        let under_a_file = format!("{selected}/inner.jpg");
        assert!(matches!(
            library
                .transform_image(&under_a_file, &TransformParams::rotate(90), ALICE)
                .await,
            Err(LibraryError::Storage { .. })
        ));
    }

    /// Thumbnails are made once, for images only.
    #[tokio::test]
    async fn thumbnails() {
        let setup = common::setup().await;
        let library = &setup.library;

        let image = library
            .create_asset(
                NewAsset::image("big", Upload::new("big.jpg", common::jpeg(600, 300))),
                ALICE,
            )
            .await
            .unwrap();

        let uri = library.image_thumbnail(image.id, ALICE).await.unwrap();
        assert_eq!(
            uri,
            format!("/media/asset_library/thumbnails/{}_150x150.jpg", image.id)
        );

        let thumbnail = image::open(on_disk(&setup, &uri)).unwrap();
        assert_eq!((thumbnail.width(), thumbnail.height()), (150, 75));
        assert_eq!(library.image_thumbnail(image.id, ALICE).await.unwrap(), uri);

        // deleting the image takes its thumbnail along
        library.delete_asset(image.id, ALICE).await.unwrap();
        assert!(!on_disk(&setup, &uri).exists());

        let snippet = common::snippet(library, "words", ALICE).await;
        assert!(matches!(
            library.image_thumbnail(snippet.id, ALICE).await,
            Err(LibraryError::Validation(_))
        ));
    }
}

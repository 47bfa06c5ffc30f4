//! Crops, rotations and grayscale, each written to a new file.

use std::io::{Cursor, Write as _};

use camino::{Utf8Path, Utf8PathBuf};
use image::{DynamicImage, GenericImageView as _, ImageFormat, ImageReader, Rgba, RgbaImage};

use crate::{
    config::Config,
    error::{FieldErrors, FieldList, LibraryError},
    storage,
};

/// Transformation parameters as they came in.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct TransformParams {
    pub transformation: Option<String>,
    pub x1: Option<i64>,
    pub y1: Option<i64>,
    pub x2: Option<i64>,
    pub y2: Option<i64>,
    pub angle: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transformation {
    /// Keeps the box from `(x1, y1)` up to, not including, `(x2, y2)`.
    Crop { x1: u32, y1: u32, x2: u32, y2: u32 },
    /// Clockwise, in `0..360`.
    Rotate { degrees: u32 },
    Grayscale,
}

/// The saved result of a transformation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct TransformedImage {
    pub uri: String,
    pub width: u32,
    pub height: u32,
}

impl TransformParams {
    pub fn crop(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self {
            transformation: Some("crop".into()),
            x1: Some(x1),
            y1: Some(y1),
            x2: Some(x2),
            y2: Some(y2),
            ..Default::default()
        }
    }

    pub fn rotate(angle: i64) -> Self {
        Self {
            transformation: Some("rotate".into()),
            angle: Some(angle),
            ..Default::default()
        }
    }

    pub fn grayscale() -> Self {
        Self {
            transformation: Some("grayscale".into()),
            ..Default::default()
        }
    }

    /// Works out which transformation was asked for.
    ///
    /// Every missing parameter is reported at once.
    pub fn parse(&self) -> Result<Transformation, LibraryError> {
        let name = self
            .transformation
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LibraryError::MissingParameter(FieldList(vec!["transformation".into()])))?;

        match name.to_lowercase().as_str() {
            "crop" => self.parse_crop(),
            "rotate" => {
                let angle = self.angle.ok_or_else(|| {
                    LibraryError::MissingParameter(FieldList(vec!["angle".into()]))
                })?;
                Ok(Transformation::Rotate {
                    degrees: angle.rem_euclid(360) as u32,
                })
            }
            "grayscale" => Ok(Transformation::Grayscale),
            _ => Err(LibraryError::UnknownTransformation(name.to_string())),
        }
    }

    fn parse_crop(&self) -> Result<Transformation, LibraryError> {
        let fields = [
            ("x1", self.x1),
            ("y1", self.y1),
            ("x2", self.x2),
            ("y2", self.y2),
        ];

        let missing = fields
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(f, _)| f.to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(LibraryError::MissingParameter(FieldList(missing)));
        }

        let mut errors = FieldErrors::default();
        let mut coords = [0_u32; 4];
        for (slot, (field, value)) in coords.iter_mut().zip(fields) {
            match value.map(u32::try_from) {
                Some(Ok(v)) => *slot = v,
                _ => errors.push(field, "Must be a non-negative number."),
            }
        }
        let [x1, y1, x2, y2] = coords;

        if errors.is_empty() {
            if x2 < x1 {
                errors.push("x2", "Must not be left of x1.");
            }
            if y2 < y1 {
                errors.push("y2", "Must not be above y1.");
            }
        }

        errors.finish(Transformation::Crop { x1, y1, x2, y2 })
    }
}

/// Applies a transformation to a decoded image.
///
/// `format` is the source's format, which decides whether there's an alpha
/// channel to keep.
pub fn apply(img: &DynamicImage, transformation: Transformation, format: ImageFormat) -> DynamicImage {
    match transformation {
        Transformation::Crop { x1, y1, x2, y2 } => img.crop_imm(x1, y1, x2 - x1, y2 - y1),
        Transformation::Rotate { degrees } => {
            // positive angles turn clockwise
            let counter_clockwise = (-(i64::from(degrees))).rem_euclid(360) as u32;
            rotate_counter_clockwise(img, counter_clockwise)
        }
        Transformation::Grayscale => {
            if supports_alpha(format) {
                DynamicImage::ImageLumaA8(img.to_luma_alpha8())
            } else {
                DynamicImage::ImageLuma8(img.to_luma8())
            }
        }
    }
}

/// Formats we keep transparency for.
pub fn supports_alpha(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png
            | ImageFormat::WebP
            | ImageFormat::Tiff
            | ImageFormat::Ico
            | ImageFormat::Qoi
            | ImageFormat::Avif
    )
}

fn rotate_counter_clockwise(img: &DynamicImage, degrees: u32) -> DynamicImage {
    match degrees {
        0 => img.clone(),
        90 => img.rotate270(),
        180 => img.rotate180(),
        270 => img.rotate90(),
        _ => rotate_expanded(img, degrees),
    }
}

/// Rotates by any angle, growing the canvas to fit the rotated corners.
///
/// Uncovered pixels are transparent. Sampling is nearest-neighbour.
fn rotate_expanded(img: &DynamicImage, degrees: u32) -> DynamicImage {
    let src = img.to_rgba8();
    let (w, h) = (f64::from(src.width()), f64::from(src.height()));
    let (sin, cos) = f64::from(degrees).to_radians().sin_cos();

    let new_w = (w * cos.abs() + h * sin.abs()).round().max(1.0);
    let new_h = (w * sin.abs() + h * cos.abs()).round().max(1.0);

    let out = RgbaImage::from_fn(new_w as u32, new_h as u32, |x, y| {
        let dx = f64::from(x) + 0.5 - new_w / 2.0;
        let dy = f64::from(y) + 0.5 - new_h / 2.0;

        // undo the rotation to find the source pixel (y points down)
        let sx = dx * cos - dy * sin + w / 2.0;
        let sy = dx * sin + dy * cos + h / 2.0;

        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Rgba([0, 0, 0, 0])
        }
    });

    DynamicImage::ImageRgba8(out)
}

/// Drops alpha for formats that can't store it. Transparent areas turn
/// black.
fn prepare_for_format(img: DynamicImage, format: ImageFormat) -> DynamicImage {
    if supports_alpha(format) || !img.color().has_alpha() {
        return img;
    }

    match img {
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(img.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

/// Decodes `source`, transforms it and saves the result next to it under a
/// fresh name, in the same format. The source is left alone.
#[tracing::instrument(skip(config))]
pub async fn transform_file(
    source: Utf8PathBuf,
    transformation: Transformation,
    config: &Config,
) -> Result<TransformedImage, LibraryError> {
    let (target, width, height) = tokio::task::spawn_blocking(move || {
        transform_blocking(&source, transformation)
    })
    .await??;

    tracing::debug!("saved transformed image to `{target}`");
    Ok(TransformedImage {
        uri: storage::path_to_media_uri(&target, config)?,
        width,
        height,
    })
}

fn transform_blocking(
    source: &Utf8Path,
    transformation: Transformation,
) -> Result<(Utf8PathBuf, u32, u32), LibraryError> {
    let image_err = |err| LibraryError::Image {
        path: source.to_string(),
        err,
    };

    let reader = ImageReader::open(source)
        .map_err(|e| LibraryError::storage(source, e))?
        .with_guessed_format()
        .map_err(|e| LibraryError::storage(source, e))?;
    let format = reader
        .format()
        .ok_or_else(|| LibraryError::NotAnImage(format!("`{source}` has an unknown format")))?;
    let img = reader.decode().map_err(image_err)?;

    let transformed = prepare_for_format(apply(&img, transformation, format), format);
    let (width, height) = transformed.dimensions();

    let mut encoded = Cursor::new(Vec::new());
    transformed.write_to(&mut encoded, format).map_err(image_err)?;

    let target = storage::create_unique_name(source);
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .map_err(|e| LibraryError::storage(&target, e))?;
    if let Err(e) = file.write_all(encoded.get_ref()) {
        _ = std::fs::remove_file(&target);
        return Err(LibraryError::storage(&target, e));
    }

    Ok((target, width, height))
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView as _, Rgb, RgbImage};

    use super::*;

    fn sample(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn missing_crop_fields_come_together() {
        let params = TransformParams {
            transformation: Some("crop".into()),
            x1: Some(0),
            ..Default::default()
        };

        let Err(LibraryError::MissingParameter(missing)) = params.parse() else {
            panic!("expected missing parameters");
        };
        assert_eq!(missing, FieldList(vec!["y1".into(), "x2".into(), "y2".into()]));
    }

    #[test]
    fn bad_crops() {
        let Err(LibraryError::Validation(errors)) = TransformParams::crop(-1, 0, 5, -2).parse()
        else {
            panic!("expected field errors");
        };
        assert!(errors.contains("x1"));
        assert!(errors.contains("y2"));

        assert!(matches!(
            TransformParams::crop(10, 0, 5, 5).parse(),
            Err(LibraryError::Validation(e)) if e.contains("x2")
        ));
    }

    #[test]
    fn names_and_angles() {
        assert!(matches!(
            TransformParams {
                transformation: Some("blur".into()),
                ..Default::default()
            }
            .parse(),
            Err(LibraryError::UnknownTransformation(t)) if t == "blur"
        ));
        assert!(matches!(
            TransformParams::default().parse(),
            Err(LibraryError::MissingParameter(_))
        ));
        assert_eq!(
            TransformParams::rotate(-90).parse().unwrap(),
            Transformation::Rotate { degrees: 270 }
        );
        assert_eq!(
            TransformParams::rotate(720).parse().unwrap(),
            Transformation::Rotate { degrees: 0 }
        );
    }

    #[test]
    fn right_angles_swap_dimensions() {
        let img = sample(230, 219);

        let quarter = apply(&img, Transformation::Rotate { degrees: 90 }, ImageFormat::Jpeg);
        assert_eq!(quarter.dimensions(), (219, 230));

        let half = apply(&img, Transformation::Rotate { degrees: 180 }, ImageFormat::Jpeg);
        assert_eq!(half.dimensions(), (230, 219));
    }

    #[test]
    fn clockwise_means_clockwise() {
        // a single red pixel in the top-left corner
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let img = DynamicImage::ImageRgb8(img);

        // turned clockwise, it lands in the top-right corner
        let turned = apply(&img, Transformation::Rotate { degrees: 90 }, ImageFormat::Png);
        assert_eq!(turned.dimensions(), (2, 4));
        assert_eq!(turned.to_rgb8().get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn odd_angles_grow_the_canvas() {
        let img = sample(100, 50);
        let turned = apply(&img, Transformation::Rotate { degrees: 45 }, ImageFormat::Png);

        let (w, h) = turned.dimensions();
        assert_eq!((w, h), (106, 106));
        assert!(turned.color().has_alpha());
        // corners aren't covered by the source
        assert_eq!(turned.to_rgba8().get_pixel(0, 0)[3], 0);

        let flattened = prepare_for_format(turned, ImageFormat::Jpeg);
        assert!(!flattened.color().has_alpha());
    }

    #[test]
    fn crops_clip_to_the_image() {
        let img = sample(20, 10);
        let cropped = apply(
            &img,
            Transformation::Crop {
                x1: 5,
                y1: 5,
                x2: 50,
                y2: 50,
            },
            ImageFormat::Png,
        );
        assert_eq!(cropped.dimensions(), (15, 5));
    }

    #[test]
    fn grayscale_keeps_alpha_when_it_can() {
        let img = sample(3, 3);
        assert_eq!(
            apply(&img, Transformation::Grayscale, ImageFormat::Png).color(),
            image::ColorType::La8
        );
        assert_eq!(
            apply(&img, Transformation::Grayscale, ImageFormat::Jpeg).color(),
            image::ColorType::L8
        );
    }
}

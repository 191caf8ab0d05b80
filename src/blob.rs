use std::{
    fmt,
    fs,
    path::{Component, Path, PathBuf},
};

use image::{imageops::FilterType, DynamicImage, ImageError, ImageReader};
use tracing::instrument;

use crate::{
    ground_truth::read_ground_truth_file,
    rescale::{rescale_image, RescaleBounds, RescaleResult},
    Blob, BlobCollection, Error, ImageInfo, Result, SkippedEntry,
};

/// Maps an image path to the path of its annotation file.
pub trait AnnotationPairing {
    fn annotation_path(&self, image_path: &Path) -> PathBuf;
}

impl<F> AnnotationPairing for F
where
    F: Fn(&Path) -> PathBuf,
{
    fn annotation_path(&self, image_path: &Path) -> PathBuf {
        self(image_path)
    }
}

/// Swaps a directory token and the file extension, e.g.
/// `data/image_1000/img_1.jpg` -> `data/txt_1000/img_1.txt`.
///
/// The token is replaced once, in the nearest ancestor directory whose name contains it. When
/// no directory contains it the annotation is looked up next to the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPairing {
    pub image_token: String,
    pub annotation_token: String,
    pub extension: String,
}

impl TokenPairing {
    pub fn new(
        image_token: impl Into<String>,
        annotation_token: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            image_token: image_token.into(),
            annotation_token: annotation_token.into(),
            extension: extension.into(),
        }
    }
}

impl Default for TokenPairing {
    fn default() -> Self {
        Self::new("image", "txt", "txt")
    }
}

impl AnnotationPairing for TokenPairing {
    fn annotation_path(&self, image_path: &Path) -> PathBuf {
        let components = image_path.components().collect::<Vec<_>>();
        let dirs = components.len().saturating_sub(1);
        let replace_at = if self.image_token.is_empty() {
            None
        } else {
            components[..dirs].iter().rposition(|component| {
                matches!(component, Component::Normal(name) if name.to_string_lossy().contains(&self.image_token))
            })
        };

        let mut path = PathBuf::new();
        for (index, component) in components.iter().enumerate() {
            match component {
                Component::Normal(name) if Some(index) == replace_at => path.push(
                    name.to_string_lossy()
                        .replacen(&self.image_token, &self.annotation_token, 1),
                ),
                other => path.push(other.as_os_str()),
            }
        }
        path.set_extension(&self.extension);
        path
    }
}

pub struct BlobAssemblerBuilder {
    pairing: Box<dyn AnnotationPairing + Send + Sync>,
    bounds: RescaleBounds,
    filter: FilterType,
}

impl BlobAssemblerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairing(mut self, pairing: impl AnnotationPairing + Send + Sync + 'static) -> Self {
        self.pairing = Box::new(pairing);
        self
    }

    pub fn bounds(mut self, bounds: RescaleBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn min_side(mut self, min_side: u32) -> Self {
        self.bounds.min_side = min_side;
        self
    }

    pub fn max_side(mut self, max_side: u32) -> Self {
        self.bounds.max_side = max_side;
        self
    }

    pub fn filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn build(self) -> BlobAssembler {
        BlobAssembler {
            pairing: self.pairing,
            bounds: self.bounds,
            filter: self.filter,
        }
    }
}

impl Default for BlobAssemblerBuilder {
    fn default() -> Self {
        Self {
            pairing: Box::new(TokenPairing::default()),
            bounds: RescaleBounds::default(),
            filter: FilterType::Triangle,
        }
    }
}

/// Turns image/annotation pairs into [`Blob`]s. Holds configuration only; every call reads
/// from the filesystem and nothing else.
pub struct BlobAssembler {
    pairing: Box<dyn AnnotationPairing + Send + Sync>,
    bounds: RescaleBounds,
    filter: FilterType,
}

impl BlobAssembler {
    pub fn builder() -> BlobAssemblerBuilder {
        BlobAssemblerBuilder::new()
    }

    pub fn bounds(&self) -> RescaleBounds {
        self.bounds
    }

    pub fn annotation_path(&self, image_path: &Path) -> PathBuf {
        self.pairing.annotation_path(image_path)
    }

    /// Assembles the blob for one image.
    #[instrument(level = "debug", skip(self))]
    pub fn assemble(&self, image_path: &Path) -> Result<Blob> {
        let image = read_image(image_path)?;
        let gt_list = read_ground_truth_file(&self.annotation_path(image_path))?;
        let RescaleResult { image, scale } = rescale_image(&image, self.bounds, self.filter)?;

        Ok(Blob {
            im_info: ImageInfo {
                height: image.height(),
                width: image.width(),
                scale,
            },
            data: image,
            gt_list,
            source: image_path.to_path_buf(),
        })
    }

    /// Assembles a blob for every entry of `dir`, in lexicographic path order.
    ///
    /// Entries that fail on their own (unreadable image, missing or malformed annotation) are
    /// logged and recorded in [`BlobCollection::skipped`]; the rest are still assembled. Only a
    /// failure to list the directory is returned as an error.
    #[instrument(skip(self))]
    pub fn assemble_dir(&self, dir: &Path) -> Result<BlobCollection> {
        let mut entries = fs::read_dir(dir)
            .and_then(|entries| {
                entries
                    .map(|entry| entry.map(|entry| entry.path()))
                    .collect::<std::io::Result<Vec<_>>>()
            })
            .map_err(|source| Error::io(Some(dir.to_path_buf()), source))?;
        entries.sort();

        let mut blobs = Vec::with_capacity(entries.len());
        let mut skipped = Vec::new();
        for path in entries {
            match self.assemble(&path) {
                Ok(blob) => blobs.push(blob),
                Err(error) if error.is_per_item() => {
                    log::warn!("Skipping {}: {error}", path.display());
                    skipped.push(SkippedEntry { path, error });
                }
                Err(error) => return Err(error),
            }
        }
        log::info!(
            "Assembled {} blobs from {} ({} skipped)",
            blobs.len(),
            dir.display(),
            skipped.len()
        );
        Ok(BlobCollection::new(blobs, skipped))
    }
}

/// Decodes by content rather than extension and converts to 8-bit RGB.
fn read_image(path: &Path) -> Result<DynamicImage> {
    let decoded = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(ImageError::IoError)
        .and_then(|reader| reader.decode())
        .map_err(|source| Error::UnreadableImage {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(DynamicImage::ImageRgb8(decoded.into_rgb8()))
}

impl fmt::Debug for BlobAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobAssembler")
            .field("bounds", &self.bounds)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use image::{ColorType, GrayImage, RgbImage};

    use super::*;

    #[test]
    fn token_pairing_swaps_directory_and_extension() {
        let pairing = TokenPairing::default();
        assert_eq!(
            pairing.annotation_path(Path::new("data/image_1000/img_1.jpg")),
            PathBuf::from("data/txt_1000/img_1.txt")
        );
        assert_eq!(
            pairing.annotation_path(Path::new("/srv/images/train/image/a.b.jpg")),
            PathBuf::from("/srv/images/train/txt/a.b.txt")
        );
    }

    #[test]
    fn token_pairing_without_token_stays_in_place() {
        let pairing = TokenPairing::default();
        assert_eq!(
            pairing.annotation_path(Path::new("scans/image.jpg")),
            PathBuf::from("scans/image.txt")
        );
    }

    #[test]
    fn closure_pairing() {
        let assembler = BlobAssembler::builder()
            .pairing(|path: &Path| path.with_extension("gt"))
            .build();
        assert_eq!(
            assembler.annotation_path(Path::new("a/b.jpg")),
            PathBuf::from("a/b.gt")
        );
    }

    #[test]
    fn assemble_single_sample() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("sample.png");
        DynamicImage::ImageRgb8(RgbImage::new(400, 300))
            .save(&image_path)
            .unwrap();
        fs::write(dir.path().join("sample.txt"), "0,0,0,10,10,10,10,0,label\n").unwrap();

        let assembler = BlobAssembler::builder()
            .pairing(|path: &Path| path.with_extension("txt"))
            .build();
        let blob = assembler.assemble(&image_path).unwrap();
        assert_eq!(blob.im_info.scale, 2.0);
        assert_eq!((blob.im_info.height, blob.im_info.width), (600, 800));
        assert_eq!((blob.data.height(), blob.data.width()), (600, 800));
        assert_eq!(blob.gt_list.len(), 1);
        // ground truth stays in the original frame
        assert!((blob.gt_list[0].cx - 5.0).abs() < 1e-6);
        assert_eq!(blob.source, image_path);
    }

    #[test]
    fn decodes_by_content_as_rgb8() {
        let dir = tempfile::tempdir().unwrap();
        let png_path = dir.path().join("sample.png");
        DynamicImage::ImageLuma8(GrayImage::new(40, 30))
            .save(&png_path)
            .unwrap();
        // png bytes behind a jpg extension
        let image_path = dir.path().join("sample.jpg");
        fs::rename(&png_path, &image_path).unwrap();
        fs::write(dir.path().join("sample.txt"), "0,0,0,10,10,10,10,0\n").unwrap();

        let assembler = BlobAssembler::builder()
            .pairing(|path: &Path| path.with_extension("txt"))
            .build();
        let blob = assembler.assemble(&image_path).unwrap();
        assert_eq!(blob.data.color(), ColorType::Rgb8);
        assert_eq!(blob.im_info.scale, 20.0);
        assert_eq!((blob.data.height(), blob.data.width()), (600, 800));
        assert_eq!(blob.gt_list.len(), 1);
    }

    #[test]
    fn assemble_reports_missing_pieces() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = BlobAssembler::builder()
            .pairing(|path: &Path| path.with_extension("txt"))
            .build();

        let image_path = dir.path().join("missing.png");
        assert!(matches!(
            assembler.assemble(&image_path),
            Err(Error::UnreadableImage { .. })
        ));

        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .save(&image_path)
            .unwrap();
        assert!(matches!(
            assembler.assemble(&image_path),
            Err(Error::MissingAnnotationFile { .. })
        ));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let assembler = BlobAssembler::builder().build();
        assert!(matches!(
            assembler.assemble_dir(Path::new("no/such/dir")),
            Err(Error::Io { .. })
        ));
    }
}

use std::path::PathBuf;

use image::DynamicImage;
use ndarray::{Array2, Array3};

use crate::{util, Error};

/// Canonical oriented box `(cx, cy, h, w, theta)`.
///
/// `h` is the short side and `w` the long side, so `h <= w` always holds. `theta` is the
/// direction of the short side in degrees, folded into `[-45, 135)`. The center lives in the
/// original, unscaled image frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub cx: f64,
    pub cy: f64,
    pub h: f64,
    pub w: f64,
    pub theta: f64,
}

impl OrientedBox {
    /// Maps the box into an image resized by `scale`. The angle is unaffected by isotropic
    /// scaling.
    pub fn scaled(&self, scale: f64) -> Self {
        Self {
            cx: self.cx * scale,
            cy: self.cy * scale,
            h: self.h * scale,
            w: self.w * scale,
            theta: self.theta,
        }
    }

    /// Corner points, walking around the rectangle.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let (sin, cos) = self.theta.to_radians().sin_cos();
        let (ux, uy) = (cos * self.h / 2.0, sin * self.h / 2.0);
        let (vx, vy) = (-sin * self.w / 2.0, cos * self.w / 2.0);
        [
            (self.cx - ux - vx, self.cy - uy - vy),
            (self.cx + ux - vx, self.cy + uy - vy),
            (self.cx + ux + vx, self.cy + uy + vy),
            (self.cx - ux + vx, self.cy - uy + vy),
        ]
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.cx, self.cy, self.h, self.w, self.theta]
    }
}

/// Resize metadata stored next to the resized image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageInfo {
    pub height: u32,
    pub width: u32,
    pub scale: f64,
}

impl ImageInfo {
    /// `[resized_height, resized_width, scale_factor]`
    pub fn to_array(&self) -> [f64; 3] {
        [self.height as f64, self.width as f64, self.scale]
    }
}

/// One self-contained training sample.
///
/// `data` is the resized image, always 8-bit RGB when built by a
/// [`BlobAssembler`](crate::BlobAssembler), but `gt_list` stays in the ORIGINAL image frame.
/// Boxes are not multiplied by `im_info.scale`; consumers comparing boxes against `data` must
/// apply the scale themselves, e.g. through [`Blob::scaled_gt_list`].
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: DynamicImage,
    pub gt_list: Vec<OrientedBox>,
    pub im_info: ImageInfo,
    pub source: PathBuf,
}

impl Blob {
    pub fn scaled_gt_list(&self) -> Vec<OrientedBox> {
        self.gt_list
            .iter()
            .map(|gt| gt.scaled(self.im_info.scale))
            .collect()
    }

    /// Resized image as a `(3, im_info.height, im_info.width)` tensor with per-channel mean
    /// subtraction and scaling applied to `[0, 1]` RGB values.
    pub fn data_array(&self, mean_vals: &[f32; 3], norm_vals: &[f32; 3]) -> Array3<f32> {
        match self.data.as_rgb8() {
            Some(rgb) => util::rgb8_to_chw(rgb, mean_vals, norm_vals),
            None => util::rgb8_to_chw(&self.data.to_rgb8(), mean_vals, norm_vals),
        }
    }

    /// Unscaled ground truth as an `(N, 5)` array of `cx, cy, h, w, theta` rows.
    pub fn gt_array(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.gt_list.len(), 5), |(row, col)| {
            self.gt_list[row].to_array()[col] as f32
        })
    }
}

/// Directory entry that failed assembly and was left out of a [`BlobCollection`].
#[derive(Debug)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub error: Error,
}

/// Blobs assembled from a directory, in sorted entry order.
#[derive(Debug, Default)]
pub struct BlobCollection {
    blobs: Vec<Blob>,
    skipped: Vec<SkippedEntry>,
}

impl BlobCollection {
    pub(crate) fn new(blobs: Vec<Blob>, skipped: Vec<SkippedEntry>) -> Self {
        Self { blobs, skipped }
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Blob> {
        self.blobs.iter()
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    pub fn into_blobs(self) -> Vec<Blob> {
        self.blobs
    }
}

impl From<Vec<Blob>> for BlobCollection {
    fn from(blobs: Vec<Blob>) -> Self {
        Self::new(blobs, Vec::new())
    }
}

impl<'a> IntoIterator for &'a BlobCollection {
    type Item = &'a Blob;
    type IntoIter = std::slice::Iter<'a, Blob>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for BlobCollection {
    type Item = Blob;
    type IntoIter = std::vec::IntoIter<Blob>;

    fn into_iter(self) -> Self::IntoIter {
        self.blobs.into_iter()
    }
}

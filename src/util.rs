use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use ndarray::Array3;
use tracing::instrument;

use crate::Blob;

/// ImageNet channel means for `[0, 1]` RGB input.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Reciprocal ImageNet channel standard deviations.
pub const IMAGENET_NORM: [f32; 3] = [1.0 / 0.229, 1.0 / 0.224, 1.0 / 0.225];

const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Normalizes 8-bit RGB into a `(3, height, width)` tensor: each channel becomes
/// `(value / 255 - mean) * norm`.
#[instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
pub(crate) fn rgb8_to_chw(
    image: &RgbImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array3<f32> {
    let mut tensor = Array3::<f32>::zeros((3, image.height() as usize, image.width() as usize));
    for (x, y, Rgb(channels)) in image.enumerate_pixels() {
        for (ch, value) in channels.iter().enumerate() {
            tensor[[ch, y as usize, x as usize]] =
                (f32::from(*value) / 255.0 - mean_vals[ch]) * norm_vals[ch];
        }
    }
    tensor
}

/// Draws the blob's ground truth, scaled into the resized frame, on top of its image.
pub fn draw_overlay(blob: &Blob) -> RgbImage {
    let mut canvas = blob.data.to_rgb8();
    for gt in blob.scaled_gt_list() {
        let corners = gt.corners();
        for (i, start) in corners.iter().enumerate() {
            let end = corners[(i + 1) % corners.len()];
            draw_line_segment_mut(
                &mut canvas,
                (start.0 as f32, start.1 as f32),
                (end.0 as f32, end.1 as f32),
                OVERLAY_COLOR,
            );
        }
    }
    canvas
}

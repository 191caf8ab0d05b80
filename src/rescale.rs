use image::{imageops::FilterType, DynamicImage};
use tracing::instrument;

use crate::{Error, Result};

/// Target for the short image side.
pub const MIN_BOUND: u32 = 600;
/// Cap for the long image side.
pub const MAX_BOUND: u32 = 2000;

/// Dual bounds for isotropic rescaling. The long-side cap wins when both can't be met, so the
/// short side may end up below `min_side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescaleBounds {
    pub min_side: u32,
    pub max_side: u32,
}

impl Default for RescaleBounds {
    fn default() -> Self {
        Self {
            min_side: MIN_BOUND,
            max_side: MAX_BOUND,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub factor: f64,
    pub target_width: u32,
    pub target_height: u32,
}

#[derive(Debug, Clone)]
pub struct RescaleResult {
    pub image: DynamicImage,
    pub scale: f64,
}

/// `min(min_side / min(h, w), max_side / max(h, w))`, or `None` for an empty image.
pub fn scale_factor(height: u32, width: u32, bounds: RescaleBounds) -> Option<f64> {
    let short = height.min(width);
    let long = height.max(width);
    if short == 0 {
        return None;
    }
    let to_min = bounds.min_side as f64 / short as f64;
    let to_max = bounds.max_side as f64 / long as f64;
    Some(to_min.min(to_max))
}

pub fn scale_isotropic(height: u32, width: u32, bounds: RescaleBounds) -> Option<Scale> {
    let factor = scale_factor(height, width, bounds)?;
    let target_width = (width as f64 * factor).round().max(1.0) as u32;
    let target_height = (height as f64 * factor).round().max(1.0) as u32;
    log::debug!("Resize will change image dimensions from (w: {width}, h: {height}) to (w: {target_width}, h: {target_height}) with scaling factor {factor}.");
    Some(Scale {
        factor,
        target_width,
        target_height,
    })
}

/// Resizes `image` by a single factor on both axes and returns it with the factor.
#[instrument(level = "debug", skip(image), fields(width = image.width(), height = image.height()))]
pub fn rescale_image(
    image: &DynamicImage,
    bounds: RescaleBounds,
    filter: FilterType,
) -> Result<RescaleResult> {
    let (width, height) = (image.width(), image.height());
    let Scale {
        factor,
        target_width,
        target_height,
    } = scale_isotropic(height, width, bounds).ok_or(Error::EmptyImage { width, height })?;

    let image = if (target_width, target_height) == (width, height) {
        image.clone()
    } else {
        image.resize_exact(target_width, target_height, filter)
    };
    Ok(RescaleResult {
        image,
        scale: factor,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn long_side_cap_binds() {
        let scale = scale_factor(300, 3000, RescaleBounds::default()).unwrap();
        assert_relative_eq!(scale, 2000.0 / 3000.0);

        let image = DynamicImage::new_luma8(3000, 300);
        let RescaleResult { image, scale } =
            rescale_image(&image, RescaleBounds::default(), FilterType::Triangle).unwrap();
        assert_relative_eq!(scale, 2.0 / 3.0);
        assert_eq!(image.height(), 200);
        assert_eq!(image.width(), 2000);
    }

    #[test]
    fn short_side_target_binds() {
        let scale = scale_isotropic(300, 400, RescaleBounds::default()).unwrap();
        assert_eq!(scale.factor, 2.0);
        assert_eq!((scale.target_height, scale.target_width), (600, 800));
    }

    #[test]
    fn already_in_bounds() {
        assert_eq!(scale_factor(600, 600, RescaleBounds::default()), Some(1.0));

        let image = DynamicImage::new_rgb8(600, 600);
        let result = rescale_image(&image, RescaleBounds::default(), FilterType::Triangle).unwrap();
        assert_eq!(result.scale, 1.0);
        assert_eq!((result.image.width(), result.image.height()), (600, 600));
    }

    #[test]
    fn custom_bounds() {
        let bounds = RescaleBounds {
            min_side: 10,
            max_side: 30,
        };
        let scale = scale_isotropic(20, 50, bounds).unwrap();
        assert_relative_eq!(scale.factor, 0.5);
        assert_eq!((scale.target_height, scale.target_width), (10, 25));
    }

    #[test]
    fn empty_image() {
        assert_eq!(scale_factor(0, 10, RescaleBounds::default()), None);
        let image = DynamicImage::new_rgb8(0, 10);
        assert!(matches!(
            rescale_image(&image, RescaleBounds::default(), FilterType::Triangle),
            Err(Error::EmptyImage { width: 0, height: 10 })
        ));
    }
}

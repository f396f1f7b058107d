//! Mask/image dimension reconciliation

use std::borrow::Cow;

use image::GrayImage;
use image::imageops::{self, FilterType};

use super::types::ComposeError;

/// Whether `mask` can be resized to `image` without visible distortion
///
/// Aspect ratios may differ by at most `tolerance`, relative to the image's.
pub fn aspect_compatible(mask: (u32, u32), image: (u32, u32), tolerance: f32) -> bool {
    if mask.0 == 0 || mask.1 == 0 || image.0 == 0 || image.1 == 0 {
        return false;
    }
    if mask == image {
        return true;
    }
    let mask_ratio = mask.0 as f32 / mask.1 as f32;
    let image_ratio = image.0 as f32 / image.1 as f32;
    ((mask_ratio - image_ratio) / image_ratio).abs() <= tolerance
}

/// Bring a mask to exactly `width` x `height`
///
/// Already-matching masks are returned untouched, so reconciling twice is the
/// same as reconciling once. Resizing uses a smooth filter to keep soft edges.
pub fn reconcile_mask(
    mask: &GrayImage,
    width: u32,
    height: u32,
    tolerance: f32,
) -> Result<Cow<'_, GrayImage>, ComposeError> {
    if mask.dimensions() == (width, height) {
        return Ok(Cow::Borrowed(mask));
    }
    if !aspect_compatible(mask.dimensions(), (width, height), tolerance) {
        return Err(ComposeError::Irreconcilable {
            mask: mask.dimensions(),
            image: (width, height),
        });
    }

    let resized = imageops::resize(mask, width, height, FilterType::Triangle);
    if resized.dimensions() != (width, height) {
        return Err(ComposeError::Irreconcilable {
            mask: resized.dimensions(),
            image: (width, height),
        });
    }
    Ok(Cow::Owned(resized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_aspect_compatible() {
        assert!(aspect_compatible((400, 300), (800, 600), 0.05));
        assert!(aspect_compatible((320, 241), (800, 600), 0.05));
        assert!(!aspect_compatible((300, 300), (800, 600), 0.05));
        assert!(!aspect_compatible((0, 300), (800, 600), 0.05));
        assert!(aspect_compatible((7, 3), (7, 3), 0.0));
    }

    #[test]
    fn test_matching_mask_is_borrowed() {
        let mask = GrayImage::from_pixel(8, 6, Luma([255]));
        let reconciled = reconcile_mask(&mask, 8, 6, 0.05).unwrap();
        assert!(matches!(reconciled, Cow::Borrowed(_)));
    }

    #[test]
    fn test_upscale_to_image_size() {
        let mut mask = GrayImage::new(400, 300);
        for y in 100..200 {
            for x in 100..300 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let reconciled = reconcile_mask(&mask, 800, 600, 0.05).unwrap();
        assert_eq!(reconciled.dimensions(), (800, 600));
        assert_eq!(reconciled.get_pixel(400, 300).0, [255]);
        assert_eq!(reconciled.get_pixel(20, 20).0, [0]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mask = GrayImage::from_fn(40, 30, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let once = reconcile_mask(&mask, 80, 60, 0.05).unwrap().into_owned();
        let twice = reconcile_mask(&once, 80, 60, 0.05).unwrap();
        assert_eq!(*twice, once);
    }

    #[test]
    fn test_distorting_resize_is_refused() {
        let mask = GrayImage::new(100, 100);
        assert!(matches!(
            reconcile_mask(&mask, 800, 600, 0.05),
            Err(ComposeError::Irreconcilable { .. })
        ));
    }
}

//! Background removal behind detected text.

use anyhow::Result;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use image::{DynamicImage, GenericImageView, Rgba};

use crate::geometry::Position;

pub trait Inpainter: Send + Sync {
    /// Returns `image` with the pixels under `regions` replaced by background.
    fn remove_regions<'a>(
        &'a self,
        image: &'a DynamicImage,
        regions: &'a [Position],
    ) -> BoxFuture<'a, Result<DynamicImage>>;
}

/// Leaves the image untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityInpainter;

impl Inpainter for IdentityInpainter {
    fn remove_regions<'a>(
        &'a self,
        image: &'a DynamicImage,
        _regions: &'a [Position],
    ) -> BoxFuture<'a, Result<DynamicImage>> {
        async move { Ok(image.clone()) }.boxed()
    }
}

/// Paints every region with the mean color of the pixels framing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatFillInpainter;

impl Inpainter for FlatFillInpainter {
    fn remove_regions<'a>(
        &'a self,
        image: &'a DynamicImage,
        regions: &'a [Position],
    ) -> BoxFuture<'a, Result<DynamicImage>> {
        async move {
            let mut output = image.to_rgba8();
            for region in regions {
                let Some(bounds) = clamp(region, image) else {
                    continue;
                };
                let fill = frame_color(&output, bounds);
                for y in bounds.top..bounds.bottom {
                    for x in bounds.left..bounds.right {
                        output.put_pixel(x as u32, y as u32, fill);
                    }
                }
            }
            Ok(DynamicImage::ImageRgba8(output))
        }
        .boxed()
    }
}

fn clamp(region: &Position, image: &DynamicImage) -> Option<Position> {
    let (width, height) = image.dimensions();
    let bounds = Position::new(
        region.top.max(0),
        region.left.max(0),
        region.bottom.min(height as i32),
        region.right.min(width as i32),
    );
    (bounds.width() > 0 && bounds.height() > 0).then_some(bounds)
}

fn frame_color(image: &image::RgbaImage, bounds: Position) -> Rgba<u8> {
    let (width, height) = image.dimensions();
    let mut sum = [0u64; 4];
    let mut count = 0u64;
    let mut add = |x: i32, y: i32| {
        if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
            return;
        }
        let pixel = image.get_pixel(x as u32, y as u32);
        for (total, channel) in sum.iter_mut().zip(pixel.0) {
            *total += u64::from(channel);
        }
        count += 1;
    };
    for x in bounds.left - 1..=bounds.right {
        add(x, bounds.top - 1);
        add(x, bounds.bottom);
    }
    for y in bounds.top..bounds.bottom {
        add(bounds.left - 1, y);
        add(bounds.right, y);
    }
    if count == 0 {
        return Rgba([255, 255, 255, 255]);
    }
    Rgba(sum.map(|total| (total / count) as u8))
}

//! Decoded input image in the color mode requested by the caller.

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

use crate::backend::ColorMode;

/// A decoded image, either full RGB or single-channel luma.
///
/// Luma pictures read the same value on all three channels, which is how a
/// grayscale input is fed to networks that expect RGB.
#[derive(Debug, Clone)]
pub enum Picture {
    Rgb(RgbImage),
    Luma(GrayImage),
}

impl Picture {
    /// Decode any format the `image` crate understands.
    pub fn decode(bytes: &[u8], color: ColorMode) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(match color {
            ColorMode::Color => Picture::Rgb(decoded.to_rgb8()),
            ColorMode::Grayscale => Picture::Luma(decoded.to_luma8()),
        })
    }

    pub fn width(&self) -> u32 {
        match self {
            Picture::Rgb(img) => img.width(),
            Picture::Luma(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Picture::Rgb(img) => img.height(),
            Picture::Luma(img) => img.height(),
        }
    }

    /// RGB value at `(x, y)`. Coordinates must be in bounds.
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        match self {
            Picture::Rgb(img) => img.get_pixel(x, y).0,
            Picture::Luma(img) => {
                let v = img.get_pixel(x, y).0[0];
                [v, v, v]
            }
        }
    }

    /// Bilinear sample at sub-pixel `(x, y)`. Out-of-bounds neighbours are black.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> [f32; 3] {
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let (w, h) = (self.width() as i64, self.height() as i64);
        let at = |px: i64, py: i64| -> [f32; 3] {
            if px >= 0 && px < w && py >= 0 && py < h {
                self.rgb(px as u32, py as u32).map(f32::from)
            } else {
                [0.0; 3]
            }
        };

        let (tl, tr, bl, br) = (at(x0, y0), at(x0 + 1, y0), at(x0, y0 + 1), at(x0 + 1, y0 + 1));
        std::array::from_fn(|c| {
            tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy
        })
    }

    /// Resize with a triangle (bilinear) filter, keeping the color mode.
    pub fn resized(&self, width: u32, height: u32) -> Picture {
        match self {
            Picture::Rgb(img) => Picture::Rgb(imageops::resize(img, width, height, FilterType::Triangle)),
            Picture::Luma(img) => Picture::Luma(imageops::resize(img, width, height, FilterType::Triangle)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, Rgb};
    use std::io::Cursor;

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_color() {
        let img = RgbImage::from_pixel(4, 3, Rgb([200, 10, 30]));
        let picture = Picture::decode(&png_bytes(&img), ColorMode::Color).unwrap();
        assert!(matches!(picture, Picture::Rgb(_)));
        assert_eq!((picture.width(), picture.height()), (4, 3));
        assert_eq!(picture.rgb(1, 1), [200, 10, 30]);
    }

    #[test]
    fn test_decode_grayscale_replicates_channel() {
        let img = RgbImage::from_pixel(2, 2, Rgb([200, 10, 30]));
        let picture = Picture::decode(&png_bytes(&img), ColorMode::Grayscale).unwrap();
        assert!(matches!(picture, Picture::Luma(_)));
        let [r, g, b] = picture.rgb(0, 0);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Picture::decode(b"definitely not an image", ColorMode::Color).is_err());
        assert!(Picture::decode(b"definitely not an image", ColorMode::Grayscale).is_err());
    }

    #[test]
    fn test_sample_bilinear_midpoint() {
        let mut img = GrayImage::from_pixel(2, 1, Luma([0]));
        img.put_pixel(1, 0, Luma([100]));
        let picture = Picture::Luma(img);
        let v = picture.sample_bilinear(0.5, 0.0);
        assert!((v[0] - 50.0).abs() < 1e-4, "got {v:?}");
    }

    #[test]
    fn test_sample_bilinear_out_of_bounds_is_black() {
        let picture = Picture::Luma(GrayImage::from_pixel(2, 2, Luma([255])));
        assert_eq!(picture.sample_bilinear(-5.0, -5.0), [0.0; 3]);
        assert_eq!(picture.sample_bilinear(10.0, 1.0), [0.0; 3]);
    }

    #[test]
    fn test_resized_uniform_stays_uniform() {
        let picture = Picture::Luma(GrayImage::from_pixel(100, 100, Luma([128])));
        let resized = picture.resized(200, 50);
        assert_eq!((resized.width(), resized.height()), (200, 50));
        let Picture::Luma(img) = resized else { panic!("color mode changed") };
        assert!(img.pixels().all(|p| p.0[0] == 128));
    }
}

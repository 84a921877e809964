//! Face alignment via 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the ArcFace reference layout with a
//! least-squares similarity (scale, rotation, translation) and warps the face
//! into a 112×112 RGB crop.

use image::{Rgb, RgbImage};

use crate::picture::Picture;

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [[a, -b], [b, a]] * src + [tx, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit from `src` to `dst`.
    ///
    /// Degenerate input (all source points coincide) yields `None`.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let (mut spread, mut dot, mut cross) = (0.0f32, 0.0f32, 0.0f32);
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - msx, sy - msy);
            let (dx, dy) = (dx - mdx, dy - mdy);
            spread += sx * sx + sy * sy;
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
        }

        if spread < 1e-12 {
            return None;
        }

        let a = dot / spread;
        let b = cross / spread;
        Some(Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        })
    }

    #[cfg(test)]
    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Map a destination point back to the source. `None` for a zero-scale transform.
    fn invert(&self, (x, y): (f32, f32)) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Warp `picture` into an `out_size`² crop with bilinear sampling.
///
/// Pixels that fall outside the source are black.
fn warp(picture: &Picture, transform: &Similarity, out_size: u32) -> RgbImage {
    RgbImage::from_fn(out_size, out_size, |ox, oy| match transform.invert((ox as f32, oy as f32)) {
        Some((sx, sy)) => Rgb(picture.sample_bilinear(sx, sy).map(|v| v.round().clamp(0.0, 255.0) as u8)),
        None => Rgb([0, 0, 0]),
    })
}

/// Align a detected face to a canonical 112×112 RGB crop.
///
/// Luma pictures produce a crop with identical channels.
pub fn align_face(picture: &Picture, landmarks: &[(f32, f32); 5]) -> RgbImage {
    match Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112) {
        Some(transform) => warp(picture, &transform, ALIGNED_SIZE),
        None => {
            tracing::warn!(?landmarks, "degenerate landmarks, returning blank crop");
            RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE)
        }
    }
}

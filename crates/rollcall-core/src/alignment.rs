//! Face alignment via a 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical ArcFace 112×112 layout using the
//! five InsightFace reference landmarks.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [[a, -b], [b, a]] * src + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit mapping `src` onto `dst`.
    ///
    /// Centering both point sets decouples translation from the rotation and
    /// scale terms, so no linear system has to be solved.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - smx, sy - smy);
            let (dx, dy) = (dx - dmx, dy - dmy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }

        if norm < 1e-12 {
            // Degenerate landmarks: translate only.
            return Self { a: 1.0, b: 0.0, tx: dmx - smx, ty: dmy - smy };
        }

        let a = dot / norm;
        let b = cross / norm;
        Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        }
    }

    /// Map a destination pixel back into source coordinates.
    fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let dx = x - self.tx;
        let dy = y - self.ty;
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Bilinear RGB sample; out-of-bounds neighbours contribute black.
fn sample_bilinear(image: &RgbImage, sx: f32, sy: f32) -> Rgb<u8> {
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;
    let (w, h) = (image.width() as i64, image.height() as i64);

    let texel = |x: i64, y: i64| -> [f32; 3] {
        if x >= 0 && x < w && y >= 0 && y < h {
            let p = image.get_pixel(x as u32, y as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    let (tl, tr) = (texel(x0, y0), texel(x0 + 1, y0));
    let (bl, br) = (texel(x0, y0 + 1), texel(x0 + 1, y0 + 1));

    let mut out = [0u8; 3];
    for c in 0..3 {
        let val = tl[c] * (1.0 - fx) * (1.0 - fy)
            + tr[c] * fx * (1.0 - fy)
            + bl[c] * (1.0 - fx) * fy
            + br[c] * fx * fy;
        out[c] = val.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

fn warp(image: &RgbImage, transform: &Similarity, out_size: u32) -> RgbImage {
    RgbImage::from_fn(out_size, out_size, |ox, oy| {
        match transform.invert_point(ox as f32, oy as f32) {
            Some((sx, sy)) => sample_bilinear(image, sx, sy),
            None => Rgb([0, 0, 0]),
        }
    })
}

/// Align a detected face to a canonical 112×112 RGB crop suitable for
/// ArcFace embedding extraction.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let transform = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112);
    warp(image, &transform, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let t = Similarity::estimate(&pts, &pts);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_scaled_transform() {
        // Source landmarks at 2x scale → a ≈ 0.5
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let t = Similarity::estimate(&src, &REFERENCE_LANDMARKS_112);
        assert!((t.a - 0.5).abs() < 1e-3, "a = {}", t.a);
        assert!(t.b.abs() < 1e-3);
    }

    #[test]
    fn test_rotated_transform() {
        // Rotate reference points by 90°: (x, y) → (-y, x). Inverse rotation has b ≈ -1.
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (-y, x));
        let t = Similarity::estimate(&src, &REFERENCE_LANDMARKS_112);
        assert!(t.a.abs() < 1e-3, "a = {}", t.a);
        assert!((t.b + 1.0).abs() < 1e-3, "b = {}", t.b);
    }

    #[test]
    fn test_align_face_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS_112);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let mut image = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        // Paint a 5x5 red patch at the left eye.
        let (lx, ly) = (src[0].0 as u32, src[0].1 as u32);
        for y in ly - 2..=ly + 2 {
            for x in lx - 2..=lx + 2 {
                image.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }

        let aligned = align_face(&image, &src);

        let rx = REFERENCE_LANDMARKS_112[0].0.round() as u32;
        let ry = REFERENCE_LANDMARKS_112[0].1.round() as u32;
        let mut max_red = 0u8;
        for y in ry - 1..=ry + 1 {
            for x in rx - 1..=rx + 1 {
                max_red = max_red.max(aligned.get_pixel(x, y).0[0]);
            }
        }
        assert!(max_red > 100, "expected red patch near ({rx}, {ry}), max={max_red}");
        // Green channel stays dark: channels are warped independently.
        assert_eq!(aligned.get_pixel(rx, ry).0[1], 0);
    }
}

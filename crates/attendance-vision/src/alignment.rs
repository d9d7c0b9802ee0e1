//! Landmark alignment to the ArcFace 112×112 template.
//!
//! A similarity transform (uniform scale, rotation, translation) is fitted
//! from the five detected landmarks to the reference points, then the frame
//! is resampled through its inverse.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 crop:
/// left eye, right eye, nose, left mouth corner, right mouth corner.
pub(crate) const TEMPLATE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub(crate) const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [a -b; b a] * src + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit of `src` onto `dst`. `None` if `src` is degenerate.
    fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0, y + p.1));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let (mut dot, mut cross, mut var) = (0.0f32, 0.0f32, 0.0f32);
        for (s, d) in src.iter().zip(dst) {
            let (sx, sy) = (s.0 - msx, s.1 - msy);
            let (dx, dy) = (d.0 - mdx, d.1 - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            var += sx * sx + sy * sy;
        }
        if var < 1e-6 {
            return None;
        }

        let a = dot / var;
        let b = cross / var;
        Some(Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        })
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (a, b) = (self.a / det, -self.b / det);
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Bilinear sample; pixels outside the frame read as black.
fn sample(frame: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let at = |px: f32, py: f32| -> [f32; 3] {
        if px < 0.0 || py < 0.0 || px >= frame.width() as f32 || py >= frame.height() as f32 {
            return [0.0; 3];
        }
        let p = frame.get_pixel(px as u32, py as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let (p00, p10) = (at(x0, y0), at(x0 + 1.0, y0));
    let (p01, p11) = (at(x0, y0 + 1.0), at(x0 + 1.0, y0 + 1.0));
    let mut out = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] * (1.0 - fx) * (1.0 - fy)
            + p10[c] * fx * (1.0 - fy)
            + p01[c] * (1.0 - fx) * fy
            + p11[c] * fx * fy;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Warp the face described by `landmarks` into an aligned 112×112 crop.
///
/// `None` if the landmarks collapse to a point.
pub fn align_face(frame: &RgbImage, landmarks: &[(f32, f32); 5]) -> Option<RgbImage> {
    let inverse = Similarity::fit(landmarks, &TEMPLATE_112)?.inverse()?;
    Some(RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        let (sx, sy) = inverse.apply(ox as f32, oy as f32);
        sample(frame, sx, sy)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_identity() {
        let t = Similarity::fit(&TEMPLATE_112, &TEMPLATE_112).unwrap();
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3);
    }

    #[test]
    fn test_fit_recovers_scale_and_shift() {
        let src = TEMPLATE_112.map(|(x, y)| (x * 2.0 + 100.0, y * 2.0 + 40.0));
        let t = Similarity::fit(&src, &TEMPLATE_112).unwrap();
        assert!((t.a - 0.5).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4);
        let (x, y) = t.apply(src[2].0, src[2].1);
        assert!((x - TEMPLATE_112[2].0).abs() < 1e-2);
        assert!((y - TEMPLATE_112[2].1).abs() < 1e-2);
    }

    #[test]
    fn test_fit_recovers_rotation() {
        // 90 degrees: (x, y) -> (-y, x).
        let dst = TEMPLATE_112.map(|(x, y)| (-y, x));
        let t = Similarity::fit(&TEMPLATE_112, &dst).unwrap();
        assert!(t.a.abs() < 1e-4, "a = {}", t.a);
        assert!((t.b - 1.0).abs() < 1e-4, "b = {}", t.b);
    }

    #[test]
    fn test_inverse_round_trips_point() {
        let src = TEMPLATE_112.map(|(x, y)| (x * 1.5 + 7.0, y * 1.5 - 3.0));
        let t = Similarity::fit(&src, &TEMPLATE_112).unwrap();
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(210.0, 95.0);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 210.0).abs() < 1e-2 && (by - 95.0).abs() < 1e-2);
    }

    #[test]
    fn test_degenerate_landmarks() {
        let frame = RgbImage::new(64, 64);
        assert!(align_face(&frame, &[(10.0, 10.0); 5]).is_none());
    }

    #[test]
    fn test_align_output_size_and_border() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([200, 100, 50]));
        let landmarks = TEMPLATE_112.map(|(x, y)| (x + 300.0, y + 200.0));
        let aligned = align_face(&frame, &landmarks).unwrap();
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        assert_eq!(*aligned.get_pixel(56, 56), Rgb([200, 100, 50]));

        // Landmarks near the frame corner pull black border into the crop.
        let corner = TEMPLATE_112.map(|(x, y)| (x - 30.0, y - 40.0));
        let aligned = align_face(&frame, &corner).unwrap();
        assert_eq!(*aligned.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_left_eye_lands_on_template() {
        let mut frame = RgbImage::new(200, 200);
        let landmarks = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        for y in 58..63 {
            for x in 78..83 {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }

        let aligned = align_face(&frame, &landmarks).unwrap();
        let (ex, ey) = (TEMPLATE_112[0].0.round() as u32, TEMPLATE_112[0].1.round() as u32);
        let brightest = (ey - 1..=ey + 1)
            .flat_map(|y| (ex - 1..=ex + 1).map(move |x| (x, y)))
            .map(|(x, y)| aligned.get_pixel(x, y)[0])
            .max()
            .unwrap();
        assert!(brightest > 100, "left eye patch missing: {brightest}");
    }
}

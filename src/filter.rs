//! Resampling kernels and image scaling.
//!
//! Captions are scaled in premultiplied RGBA so that transparent pixels do
//! not bleed their (meaningless) colour into the glyph edges. Bilinear
//! scaling samples the four nearest pixels directly; every other
//! [`ScalingFilter`] runs a separable convolution whose support widens when
//! shrinking.

use std::f64::consts::PI;

use image::{Rgba, RgbaImage};

use crate::configuration::ScalingFilter;

/// A separable reconstruction kernel.
#[derive(Clone, Copy)]
pub struct Kernel {
    /// Radius beyond which the weight is zero.
    pub support: f64,
    /// Weight at distance `x` (in source pixels) from the sample centre.
    pub weight: fn(f64) -> f64,
}

impl Kernel {
    /// The convolution kernel for `filter`, or `None` for plain bilinear
    /// sampling.
    pub fn for_filter(filter: ScalingFilter) -> Option<Kernel> {
        let (support, weight): (f64, fn(f64) -> f64) = match filter {
            ScalingFilter::Bilinear => return None,
            ScalingFilter::Triangle => (1.0, triangle),
            ScalingFilter::Bicubic => (2.0, bicubic),
            ScalingFilter::Bell => (1.5, bell),
            ScalingFilter::Hermite => (1.0, hermite),
            ScalingFilter::Lanczos3 => (3.0, lanczos3),
            ScalingFilter::Mitchell => (2.0, mitchell),
            ScalingFilter::BSpline => (2.0, bspline),
        };
        Some(Kernel { support, weight })
    }
}

fn triangle(x: f64) -> f64 {
    let x = x.abs();
    if x < 1.0 { 1.0 - x } else { 0.0 }
}

fn bicubic(x: f64) -> f64 {
    const A: f64 = -0.5;
    let x = x.abs();
    if x <= 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
    } else {
        0.0
    }
}

fn bell(x: f64) -> f64 {
    let x = x.abs();
    if x < 0.5 {
        0.75 - x * x
    } else if x < 1.5 {
        let t = x - 1.5;
        0.5 * t * t
    } else {
        0.0
    }
}

fn hermite(x: f64) -> f64 {
    let x = x.abs();
    if x < 1.0 {
        (2.0 * x - 3.0) * x * x + 1.0
    } else {
        0.0
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

fn lanczos3(x: f64) -> f64 {
    let x = x.abs();
    if x < 3.0 { sinc(x) * sinc(x / 3.0) } else { 0.0 }
}

fn mitchell(x: f64) -> f64 {
    const B: f64 = 1.0 / 3.0;
    const C: f64 = 1.0 / 3.0;
    let x = x.abs();
    let x2 = x * x;
    let x3 = x2 * x;
    if x < 1.0 {
        ((12.0 - 9.0 * B - 6.0 * C) * x3 + (-18.0 + 12.0 * B + 6.0 * C) * x2 + (6.0 - 2.0 * B))
            / 6.0
    } else if x < 2.0 {
        ((-B - 6.0 * C) * x3 + (6.0 * B + 30.0 * C) * x2 + (-12.0 * B - 48.0 * C) * x
            + (8.0 * B + 24.0 * C))
            / 6.0
    } else {
        0.0
    }
}

fn bspline(x: f64) -> f64 {
    let x = x.abs();
    if x < 1.0 {
        0.5 * x * x * x - x * x + 2.0 / 3.0
    } else if x < 2.0 {
        let t = 2.0 - x;
        t * t * t / 6.0
    } else {
        0.0
    }
}

type Pixel = [f32; 4];

fn premultiply(Rgba([r, g, b, a]): Rgba<u8>) -> Pixel {
    let alpha = a as f32 / 255.0;
    [r as f32 * alpha, g as f32 * alpha, b as f32 * alpha, a as f32]
}

fn unpremultiply([r, g, b, a]: Pixel) -> Rgba<u8> {
    let a = a.clamp(0.0, 255.0);
    if a < 0.5 {
        return Rgba([0, 0, 0, 0]);
    }
    let alpha = a / 255.0;
    let channel = |c: f32| (c / alpha).round().clamp(0.0, 255.0) as u8;
    Rgba([channel(r), channel(g), channel(b), a.round() as u8])
}

/// Scale `image` to `width`×`height` with `filter`.
///
/// Returns a copy when the size is unchanged, and an empty image when
/// either side of the source or target is zero.
pub fn resample(image: &RgbaImage, width: u32, height: u32, filter: ScalingFilter) -> RgbaImage {
    let (src_width, src_height) = image.dimensions();
    if src_width == 0 || src_height == 0 || width == 0 || height == 0 {
        return RgbaImage::new(width, height);
    }
    if (src_width, src_height) == (width, height) {
        return image.clone();
    }

    let source: Vec<Pixel> = image.pixels().map(|&p| premultiply(p)).collect();
    let scaled = match Kernel::for_filter(filter) {
        None => bilinear(&source, src_width, src_height, width, height),
        Some(kernel) => convolve(&source, src_width, src_height, width, height, kernel),
    };

    RgbaImage::from_fn(width, height, |x, y| {
        unpremultiply(scaled[y as usize * width as usize + x as usize])
    })
}

fn bilinear(source: &[Pixel], src_width: u32, src_height: u32, width: u32, height: u32) -> Vec<Pixel> {
    let sx = src_width as f64 / width as f64;
    let sy = src_height as f64 / height as f64;
    let mut out = vec![[0.0f32; 4]; width as usize * height as usize];

    for_each_row(&mut out, width as usize, |y, row| {
        let fy = ((y as f64 + 0.5) * sy - 0.5).clamp(0.0, (src_height - 1) as f64);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(src_height as usize - 1);
        let wy = (fy - y0 as f64) as f32;
        for (x, pixel) in row.iter_mut().enumerate() {
            let fx = ((x as f64 + 0.5) * sx - 0.5).clamp(0.0, (src_width - 1) as f64);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(src_width as usize - 1);
            let wx = (fx - x0 as f64) as f32;
            let at = |xx: usize, yy: usize| source[yy * src_width as usize + xx];
            let (p00, p10, p01, p11) = (at(x0, y0), at(x1, y0), at(x0, y1), at(x1, y1));
            for c in 0..4 {
                let top = p00[c] + (p10[c] - p00[c]) * wx;
                let bottom = p01[c] + (p11[c] - p01[c]) * wx;
                pixel[c] = top + (bottom - top) * wy;
            }
        }
    });
    out
}

struct Contribution {
    start: usize,
    weights: Vec<f32>,
}

fn contributions(src_len: u32, dst_len: u32, kernel: Kernel) -> Vec<Contribution> {
    let scale = dst_len as f64 / src_len as f64;
    let widen = if scale < 1.0 { 1.0 / scale } else { 1.0 };
    let support = kernel.support * widen;

    (0..dst_len)
        .map(|i| {
            let center = (i as f64 + 0.5) / scale;
            let left = ((center - support).floor() as i64).max(0);
            let right = ((center + support).ceil() as i64).min(src_len as i64 - 1);
            let mut weights: Vec<f64> = (left..=right)
                .map(|j| (kernel.weight)((j as f64 + 0.5 - center) / widen))
                .collect();
            let sum: f64 = weights.iter().sum();
            if sum.abs() < f64::EPSILON {
                // Nothing under the kernel: take the nearest source pixel.
                let nearest = (center.floor() as i64).clamp(0, src_len as i64 - 1);
                return Contribution {
                    start: nearest as usize,
                    weights: vec![1.0],
                };
            }
            weights.iter_mut().for_each(|w| *w /= sum);
            Contribution {
                start: left as usize,
                weights: weights.into_iter().map(|w| w as f32).collect(),
            }
        })
        .collect()
}

fn convolve(
    source: &[Pixel],
    src_width: u32,
    src_height: u32,
    width: u32,
    height: u32,
    kernel: Kernel,
) -> Vec<Pixel> {
    let horizontal = contributions(src_width, width, kernel);
    let vertical = contributions(src_height, height, kernel);

    let mut wide = vec![[0.0f32; 4]; width as usize * src_height as usize];
    for_each_row(&mut wide, width as usize, |y, row| {
        let line = &source[y * src_width as usize..(y + 1) * src_width as usize];
        for (pixel, contribution) in row.iter_mut().zip(&horizontal) {
            *pixel = weighted_sum(contribution, |k| line[k]);
        }
    });

    let mut out = vec![[0.0f32; 4]; width as usize * height as usize];
    for_each_row(&mut out, width as usize, |y, row| {
        let contribution = &vertical[y];
        for (x, pixel) in row.iter_mut().enumerate() {
            *pixel = weighted_sum(contribution, |k| wide[k * width as usize + x]);
        }
    });
    out
}

fn weighted_sum(contribution: &Contribution, sample: impl Fn(usize) -> Pixel) -> Pixel {
    let mut acc = [0.0f32; 4];
    for (offset, &weight) in contribution.weights.iter().enumerate() {
        let p = sample(contribution.start + offset);
        for c in 0..4 {
            acc[c] += p[c] * weight;
        }
    }
    acc
}

#[cfg(feature = "rayon")]
fn for_each_row<F>(buffer: &mut [Pixel], width: usize, f: F)
where
    F: Fn(usize, &mut [Pixel]) + Sync,
{
    crate::rayon::for_each_row(buffer, width, f);
}

#[cfg(not(feature = "rayon"))]
fn for_each_row<F>(buffer: &mut [Pixel], width: usize, f: F)
where
    F: Fn(usize, &mut [Pixel]),
{
    for (y, row) in buffer.chunks_mut(width).enumerate() {
        f(y, row);
    }
}

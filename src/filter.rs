//! Image-space kernels shared by the normal map chain and the smoothness
//! post-filter.

use crate::config::BlurSettings;
use crate::texture::Texture;
use rayon::prelude::*;

/// Binomial approximation of a Gaussian, taps at `-2..=2` times the sample
/// factor. The weights are powers of two so that blurring a constant signal
/// reproduces it exactly.
const GAUSSIAN_WEIGHTS: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

/// Values that can be filtered channel-wise.
pub trait Channels: Copy + PartialEq + Send + Sync {
    fn zero() -> Self;
    fn add_scaled(self, other: Self, weight: f32) -> Self;
}

impl Channels for f32 {
    fn zero() -> Self {
        0.0
    }

    fn add_scaled(self, other: Self, weight: f32) -> Self {
        self + other * weight
    }
}

impl Channels for [f32; 3] {
    fn zero() -> Self {
        [0.0; 3]
    }

    fn add_scaled(self, other: Self, weight: f32) -> Self {
        [
            self[0] + other[0] * weight,
            self[1] + other[1] * weight,
            self[2] + other[2] * weight,
        ]
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Blurs `texture` in place, `scratch` must have the same dimensions and
/// receives garbage.
pub fn gaussian_blur<T: Channels>(
    texture: &mut Texture<T>,
    scratch: &mut Texture<T>,
    settings: BlurSettings,
) {
    debug_assert!(texture.same_size(scratch));

    for _ in 0..settings.iterations {
        blur_pass(texture, scratch, Axis::Horizontal, settings.sample_factor);
        blur_pass(scratch, texture, Axis::Vertical, settings.sample_factor);
    }
}

fn blur_pass<T: Channels>(src: &Texture<T>, dst: &mut Texture<T>, axis: Axis, sample_factor: f32) {
    let width = src.width();
    let sample_factor = if sample_factor.is_finite() { sample_factor.max(0.0) } else { 1.0 };

    dst.as_mut_slice()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = T::zero();
                for (tap, &weight) in GAUSSIAN_WEIGHTS.iter().enumerate() {
                    let offset = (tap as f32 - 2.0) * sample_factor;
                    let value = match axis {
                        Axis::Horizontal => sample_axis(src, x as f32 + offset, y as f32, axis),
                        Axis::Vertical => sample_axis(src, x as f32, y as f32 + offset, axis),
                    };
                    acc = acc.add_scaled(value, weight);
                }
                *out = acc;
            }
        });
}

/// Linear interpolation along one axis with clamped edges.
fn sample_axis<T: Channels>(src: &Texture<T>, x: f32, y: f32, axis: Axis) -> T {
    let (along, fixed) = match axis {
        Axis::Horizontal => (x, y as isize),
        Axis::Vertical => (y, x as isize),
    };

    let lower = along.floor();
    let t = along - lower;
    let lower = lower as isize;

    let (a, b) = match axis {
        Axis::Horizontal => (*src.get_clamped(lower, fixed), *src.get_clamped(lower + 1, fixed)),
        Axis::Vertical => (*src.get_clamped(fixed, lower), *src.get_clamped(fixed, lower + 1)),
    };

    if t == 0.0 || a == b {
        a
    } else {
        a.add_scaled(a, -t).add_scaled(b, t)
    }
}

/// Converts heights into unit tangent-space normals with a Sobel gradient.
///
/// `x` of the normal points along the tangent, `y` along the bitangent, so a
/// flat height field yields exactly `[0, 0, 1]`.
pub fn sobel_normals(heights: &Texture<f32>, normals: &mut Texture<[f32; 3]>, bump_effect: f32) {
    debug_assert!(heights.same_size(normals));
    let width = heights.width();

    normals
        .as_mut_slice()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as isize;
            for (x, out) in row.iter_mut().enumerate() {
                let x = x as isize;
                let h = |dx: isize, dy: isize| *heights.get_clamped(x + dx, y + dy);

                let gx = (h(1, -1) + 2.0 * h(1, 0) + h(1, 1))
                    - (h(-1, -1) + 2.0 * h(-1, 0) + h(-1, 1));
                let gy = (h(-1, 1) + 2.0 * h(0, 1) + h(1, 1))
                    - (h(-1, -1) + 2.0 * h(0, -1) + h(1, -1));

                *out = normalize([-gx * bump_effect, -gy * bump_effect, 1.0]);
            }
        });
}

/// Unit length version of `v`, or the neutral normal if that is impossible.
pub fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 0.0 && len.is_finite() {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 0.0, 1.0]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn blur(settings: BlurSettings, values: Vec<f32>, width: usize) -> Vec<f32> {
        let height = values.len() / width;
        let mut tex = Texture::from_vec(width, height, values).unwrap();
        let mut scratch = Texture::filled("scratch", width, height, 0.0).unwrap();
        gaussian_blur(&mut tex, &mut scratch, settings);
        tex.into_vec()
    }

    #[test]
    fn test_blur_keeps_constant_signal_exact() {
        let settings = BlurSettings { iterations: 3, sample_factor: 1.7 };
        let out = blur(settings, vec![0.25; 36], 6);
        assert!(out.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_blur_spreads_impulse_and_keeps_mass_inside() {
        let mut values = vec![0.0; 81];
        values[40] = 1.0;
        let out = blur(BlurSettings { iterations: 1, sample_factor: 1.0 }, values, 9);

        assert_relative_eq!(out[40], 0.375 * 0.375);
        assert_relative_eq!(out.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(out[39] > 0.0 && out[31] > 0.0);
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let values = vec![0.0, 1.0, 0.5, 0.25];
        assert_eq!(blur(BlurSettings::none(), values.clone(), 2), values);
    }

    #[test]
    fn test_sobel_on_flat_heights_is_neutral() {
        let heights = Texture::filled("heights", 5, 5, 0.7).unwrap();
        let mut normals = Texture::filled("normals", 5, 5, [0.0; 3]).unwrap();
        sobel_normals(&heights, &mut normals, 10.0);

        assert!(normals.as_slice().iter().all(|n| *n == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_sobel_tilts_away_from_slope() {
        // Heights increase along +x
        let values = (0..25).map(|i| (i % 5) as f32 * 0.1).collect();
        let heights = Texture::from_vec(5, 5, values).unwrap();
        let mut normals = Texture::filled("normals", 5, 5, [0.0; 3]).unwrap();
        sobel_normals(&heights, &mut normals, 1.0);

        let n = *normals.get(2, 2);
        assert!(n[0] < 0.0);
        assert_relative_eq!(n[1], 0.0);
        assert_relative_eq!(n[0] * n[0] + n[1] * n[1] + n[2] * n[2], 1.0, epsilon = 1e-6);
    }
}

use crate::error::{alloc_filled, Error, Result};
use image::{GrayImage, RgbaImage};

/// RGBA with 8 bits per channel, the storage format of all derived maps.
pub type Rgba8 = [u8; 4];

/// Row-major 2D buffer addressed in texels.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Clone> Texture<T> {
    /// Allocates a texture with every texel set to `value`.
    pub fn filled(what: &'static str, width: usize, height: usize, value: T) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptySurface);
        }

        Ok(Texture {
            width,
            height,
            data: alloc_filled(what, width * height, value)?,
        })
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptySurface);
        }

        if data.len() != width * height {
            return Err(Error::SizeMismatch {
                what: "texture data",
                expected_width: width,
                expected_height: height,
                actual_width: data.len(),
                actual_height: 1,
            });
        }

        Ok(Texture { width, height, data })
    }

    /// Overwrites every texel with `value`.
    pub fn fill(&mut self, value: T) {
        for texel in self.data.iter_mut() {
            *texel = value.clone();
        }
    }
}

impl<T> Texture<T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn same_size<U>(&self, other: &Texture<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[y * self.width + x]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = y * self.width + x;
        &mut self.data[idx]
    }

    /// Texel at signed coordinates, clamped to the edge.
    pub fn get_clamped(&self, x: isize, y: isize) -> &T {
        let x = x.max(0).min(self.width as isize - 1) as usize;
        let y = y.max(0).min(self.height as isize - 1) as usize;
        self.get(x, y)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl Texture<f32> {
    /// Bilinear sample at normalized coordinates, `(0, 0)` being the top left
    /// corner of the first texel. Samples outside `[0, 1]` are zero.
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        if !(u >= 0.0 && u <= 1.0 && v >= 0.0 && v <= 1.0) {
            return 0.0;
        }

        let x = u * self.width as f32 - 0.5;
        let y = v * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;
        let (x0, y0) = (x0 as isize, y0 as isize);

        let top = lerp(*self.get_clamped(x0, y0), *self.get_clamped(x0 + 1, y0), tx);
        let bottom = lerp(*self.get_clamped(x0, y0 + 1), *self.get_clamped(x0 + 1, y0 + 1), tx);
        lerp(top, bottom, ty)
    }

    /// Nearest texel at normalized coordinates, `None` outside `[0, 1)`.
    pub fn sample_nearest(&self, u: f32, v: f32) -> Option<f32> {
        if !(u >= 0.0 && u < 1.0 && v >= 0.0 && v < 1.0) {
            return None;
        }

        let x = ((u * self.width as f32) as usize).min(self.width - 1);
        let y = ((v * self.height as f32) as usize).min(self.height - 1);
        Some(*self.get(x, y))
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    pub fn max_value(&self) -> f32 {
        self.data.iter().cloned().fold(0.0, f32::max)
    }

    /// Interprets a greyscale image as values in `0..=1`.
    pub fn from_luma(image: &GrayImage) -> Result<Self> {
        let data = image.pixels().map(|p| p.0[0] as f32 / 255.0).collect();
        Texture::from_vec(image.width() as usize, image.height() as usize, data)
    }
}

impl Texture<Rgba8> {
    pub fn to_image(&self) -> RgbaImage {
        let bytes = self.data.iter().flat_map(|p| p.iter().cloned()).collect();
        // The buffer length always matches the dimensions
        RgbaImage::from_raw(self.width as u32, self.height as u32, bytes)
            .unwrap_or_else(|| RgbaImage::new(self.width as u32, self.height as u32))
    }
}

impl Texture<u8> {
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_raw(self.width as u32, self.height as u32, self.data.clone())
            .unwrap_or_else(|| GrayImage::new(self.width as u32, self.height as u32))
    }
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn clamp01(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.max(0.0).min(1.0)
    }
}

/// Quantizes a value in `0..=1` to a byte.
#[inline]
pub fn to_unorm8(v: f32) -> u8 {
    (clamp01(v) * 255.0).round() as u8
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bilinear_sample_in_texel_centers() {
        let tex = Texture::from_vec(2, 1, vec![0.0, 1.0]).unwrap();

        assert_relative_eq!(tex.sample(0.25, 0.5), 0.0);
        assert_relative_eq!(tex.sample(0.75, 0.5), 1.0);
        assert_relative_eq!(tex.sample(0.5, 0.5), 0.5);
        assert_eq!(tex.sample(1.5, 0.5), 0.0);
        assert_eq!(tex.sample(::std::f32::NAN, 0.5), 0.0);
    }

    #[test]
    fn test_clamped_access() {
        let tex = Texture::from_vec(2, 2, vec![1, 2, 3, 4]).unwrap();

        assert_eq!(*tex.get_clamped(-3, -1), 1);
        assert_eq!(*tex.get_clamped(5, 0), 2);
        assert_eq!(*tex.get_clamped(1, 9), 4);
    }

    #[test]
    fn test_empty_texture_rejected() {
        match Texture::filled("test", 0, 4, 0.0f32) {
            Err(Error::EmptySurface) => {}
            other => panic!("expected empty surface error, got {:?}", other),
        }

        assert!(Texture::from_vec(2, 2, vec![0.0f32; 3]).is_err());
    }

    #[test]
    fn test_unorm_quantization() {
        assert_eq!(to_unorm8(0.5), 128);
        assert_eq!(to_unorm8(1.0), 255);
        assert_eq!(to_unorm8(-2.0), 0);
        assert_eq!(to_unorm8(::std::f32::NAN), 0);
    }
}

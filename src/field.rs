use crate::error::{alloc_filled, Error, Result};
use crate::texture::Texture;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Two equally sized buffers, one being read while the other is written.
///
/// Several GPU back-ends forbid sampling a texture that is bound for writing
/// in the same dispatch. Kernels borrow `previous` shared and `current`
/// exclusively through `split`, which makes that aliasing unrepresentable.
#[derive(Debug, Clone)]
pub struct PingPong {
    current: Vec<f32>,
    previous: Vec<f32>,
}

impl PingPong {
    fn new(values: Vec<f32>) -> Result<Self> {
        let mut previous = alloc_filled("previous thickness", values.len(), 0.0)?;
        previous.copy_from_slice(&values);
        Ok(PingPong {
            current: values,
            previous,
        })
    }

    pub fn current(&self) -> &[f32] {
        &self.current
    }

    pub fn previous(&self) -> &[f32] {
        &self.previous
    }

    /// Makes the current state the read-only source of the next passes.
    pub fn commit(&mut self) {
        self.previous.copy_from_slice(&self.current);
    }

    /// `(source, destination)` of a pass.
    pub fn split(&mut self) -> (&[f32], &mut [f32]) {
        (&self.previous, &mut self.current)
    }

    fn overwrite(&mut self, values: &[f32]) {
        self.current.copy_from_slice(values);
        self.previous.copy_from_slice(values);
    }
}

/// Accumulated wet coat thickness per texel.
#[derive(Debug, Clone)]
pub struct ThicknessField {
    width: usize,
    height: usize,
    buffers: PingPong,
    /// State restored by `reset`.
    baseline: Vec<f32>,
}

impl ThicknessField {
    /// An unpainted field.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptySurface);
        }

        let values = alloc_filled("thickness", width * height, 0.0)?;
        ThicknessField::from_values(width, height, values)
    }

    /// A field starting out as `values`, which also become the baseline.
    pub fn from_values(width: usize, height: usize, mut values: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptySurface);
        }

        if values.len() != width * height {
            return Err(Error::SizeMismatch {
                what: "thickness values",
                expected_width: width,
                expected_height: height,
                actual_width: values.len(),
                actual_height: 1,
            });
        }

        let repaired = sanitize(&mut values);
        if repaired > 0 {
            warn!("Replaced {} negative or non-finite thickness values with zero", repaired);
        }

        let mut baseline = alloc_filled("thickness baseline", values.len(), 0.0)?;
        baseline.copy_from_slice(&values);

        Ok(ThicknessField {
            width,
            height,
            buffers: PingPong::new(values)?,
            baseline,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        self.buffers.current()
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.buffers.current()[y * self.width + x]
    }

    pub fn baseline(&self) -> &[f32] {
        &self.baseline
    }

    /// Total thickness over all texels.
    pub fn mass(&self) -> f64 {
        self.values().iter().map(|&v| v as f64).sum()
    }

    pub(crate) fn buffers_mut(&mut self) -> &mut PingPong {
        &mut self.buffers
    }

    /// Adds `deposit` to the field. A texel is never raised above
    /// `max_alpha` and never lowered, even if it is already thicker than
    /// `max_alpha` from runs. Returns the thickness actually added.
    pub fn blend_deposit(&mut self, deposit: &Texture<f32>, max_alpha: f32) -> Result<f64> {
        if deposit.width() != self.width || deposit.height() != self.height {
            return Err(Error::SizeMismatch {
                what: "deposit",
                expected_width: self.width,
                expected_height: self.height,
                actual_width: deposit.width(),
                actual_height: deposit.height(),
            });
        }

        let mut added = 0.0;
        for (texel, &amount) in self.buffers.current.iter_mut().zip(deposit.as_slice()) {
            if !(amount > 0.0) || !amount.is_finite() {
                continue;
            }

            let old = *texel;
            let new = old.max((old + amount).min(max_alpha));
            added += (new - old) as f64;
            *texel = new;
        }

        Ok(added)
    }

    /// Restores the baseline captured at creation or at the last snapshot import.
    pub fn reset(&mut self) {
        let ThicknessField {
            ref mut buffers,
            ref baseline,
            ..
        } = *self;
        buffers.overwrite(baseline);
    }

    /// Replaces the field and its baseline, e.g. with a preset.
    pub fn load(&mut self, values: &[f32]) -> Result<()> {
        if values.len() != self.width * self.height {
            return Err(Error::SizeMismatch {
                what: "thickness values",
                expected_width: self.width,
                expected_height: self.height,
                actual_width: values.len(),
                actual_height: 1,
            });
        }

        self.baseline.copy_from_slice(values);
        let repaired = sanitize(&mut self.baseline);
        if repaired > 0 {
            warn!("Replaced {} negative or non-finite thickness values with zero", repaired);
        }

        let ThicknessField {
            ref mut buffers,
            ref baseline,
            ..
        } = *self;
        buffers.overwrite(baseline);
        Ok(())
    }

    /// Encodes the current field as a PNG whose four channels carry the
    /// little-endian bytes of each texel's `f32`, so that decoding is exact.
    pub fn export_snapshot(&self) -> Result<Vec<u8>> {
        let bytes = self
            .values()
            .iter()
            .flat_map(|v| v.to_le_bytes().to_vec())
            .collect();

        let image = RgbaImage::from_raw(self.width as u32, self.height as u32, bytes)
            .ok_or_else(|| Error::Snapshot("field does not fit into an image".to_string()))?;

        let mut encoded = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image).write_to(&mut encoded, ImageFormat::Png)?;
        Ok(encoded.into_inner())
    }

    /// Decodes a snapshot written by `export_snapshot` into its dimensions
    /// and texel values.
    pub fn decode_snapshot(encoded: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
        let image = match image::load_from_memory_with_format(encoded, ImageFormat::Png)? {
            DynamicImage::ImageRgba8(image) => image,
            other => {
                return Err(Error::Snapshot(format!(
                    "expected 8 bit RGBA, got {:?}",
                    other.color()
                )))
            }
        };

        let (width, height) = (image.width() as usize, image.height() as usize);
        let values = image
            .into_raw()
            .chunks(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok((width, height, values))
    }

    /// Replaces field and baseline with a snapshot of the same dimensions.
    pub fn import_snapshot(&mut self, encoded: &[u8]) -> Result<()> {
        let (width, height, values) = ThicknessField::decode_snapshot(encoded)?;
        if width != self.width || height != self.height {
            return Err(Error::SizeMismatch {
                what: "snapshot",
                expected_width: self.width,
                expected_height: self.height,
                actual_width: width,
                actual_height: height,
            });
        }

        self.load(&values)
    }
}

/// Zeroes negative and non-finite texels, returning how many were changed.
pub(crate) fn sanitize(values: &mut [f32]) -> usize {
    let mut repaired = 0;
    for v in values.iter_mut() {
        if !(*v >= 0.0) || !v.is_finite() {
            *v = 0.0;
            repaired += 1;
        }
    }
    repaired
}

use crate::config::NormalMapSettings;
use crate::error::{Error, Result};
use crate::filter::{gaussian_blur, normalize, sobel_normals};
use crate::texture::{clamp01, to_unorm8, Rgba8, Texture};

/// Encoding of the unperturbed normal `[0, 0, 1]`.
pub const NEUTRAL_NORMAL: Rgba8 = [128, 128, 255, 255];

/// Maps a unit normal from `-1..=1` into the bytes of a normal map.
pub fn encode_normal(n: [f32; 3]) -> Rgba8 {
    [
        to_unorm8(n[0] * 0.5 + 0.5),
        to_unorm8(n[1] * 0.5 + 0.5),
        to_unorm8(n[2] * 0.5 + 0.5),
        255,
    ]
}

pub fn decode_normal(texel: Rgba8) -> [f32; 3] {
    let unpack = |b: u8| b as f32 / 255.0 * 2.0 - 1.0;
    [unpack(texel[0]), unpack(texel[1]), unpack(texel[2])]
}

/// Filter chain turning a greyscale signal into tangent-space normals:
/// height extraction, pre-blur, Sobel, post-blur.
///
/// All intermediate textures are allocated once on construction.
pub struct NormalMapGenerator {
    settings: NormalMapSettings,
    heights: Texture<f32>,
    height_scratch: Texture<f32>,
    normals: Texture<[f32; 3]>,
    normal_scratch: Texture<[f32; 3]>,
}

impl NormalMapGenerator {
    pub fn new(width: usize, height: usize, settings: NormalMapSettings) -> Result<Self> {
        Ok(NormalMapGenerator {
            settings,
            heights: Texture::filled("normal map heights", width, height, 0.0)?,
            height_scratch: Texture::filled("normal map scratch", width, height, 0.0)?,
            normals: Texture::filled("normal vectors", width, height, [0.0, 0.0, 1.0])?,
            normal_scratch: Texture::filled("normal vector scratch", width, height, [0.0; 3])?,
        })
    }

    pub fn settings(&self) -> &NormalMapSettings {
        &self.settings
    }

    /// Runs the whole chain on `greyscale`, values outside `0..=1` are
    /// clamped. Returns unit normals, blended and quantized by the caller.
    pub fn generate(&mut self, greyscale: &[f32]) -> Result<&Texture<[f32; 3]>> {
        if greyscale.len() != self.heights.len() {
            return Err(Error::SizeMismatch {
                what: "greyscale",
                expected_width: self.heights.width(),
                expected_height: self.heights.height(),
                actual_width: greyscale.len(),
                actual_height: 1,
            });
        }

        let scale = self.settings.height_scale;
        for (height, &grey) in self.heights.as_mut_slice().iter_mut().zip(greyscale) {
            *height = clamp01(grey) * scale;
        }
        trace!("Extracted heights with scale {}", scale);

        gaussian_blur(&mut self.heights, &mut self.height_scratch, self.settings.pre_blur);
        sobel_normals(&self.heights, &mut self.normals, self.settings.bump_effect);
        gaussian_blur(&mut self.normals, &mut self.normal_scratch, self.settings.post_blur);

        for n in self.normals.as_mut_slice().iter_mut() {
            *n = normalize(*n);
        }

        Ok(&self.normals)
    }

    /// Unit normals of the last generation.
    pub fn normals(&self) -> &Texture<[f32; 3]> {
        &self.normals
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::BlurSettings;

    #[test]
    fn test_neutral_normal_encoding() {
        assert_eq!(encode_normal([0.0, 0.0, 1.0]), NEUTRAL_NORMAL);
        assert_eq!(encode_normal([-0.0, -0.0, 1.0]), NEUTRAL_NORMAL);

        let decoded = decode_normal(NEUTRAL_NORMAL);
        assert_relative_eq!(decoded[2], 1.0);
        assert!(decoded[0].abs() < 0.01);
    }

    fn encoded(normals: &Texture<[f32; 3]>) -> Vec<Rgba8> {
        normals.as_slice().iter().map(|&n| encode_normal(n)).collect()
    }

    #[test]
    fn test_flat_input_gives_neutral_map() {
        let mut generator = NormalMapGenerator::new(8, 8, NormalMapSettings::paint()).unwrap();
        let normals = generator.generate(&vec![0.3; 64]).unwrap();

        assert!(encoded(normals).iter().all(|&n| n == NEUTRAL_NORMAL));
    }

    #[test]
    fn test_bump_is_visible_and_flat_input_restores_neutral() {
        let settings = NormalMapSettings {
            height_scale: 1.0,
            pre_blur: BlurSettings::none(),
            bump_effect: 2.0,
            post_blur: BlurSettings::none(),
        };
        let mut generator = NormalMapGenerator::new(9, 9, settings).unwrap();
        let mut grey = vec![0.0; 81];
        grey[40] = 1.0;

        let normals = generator.generate(&grey).unwrap();
        // Left of the bump the surface rises towards +x, so the normal leans to -x
        assert!(normals.get(3, 4)[0] < 0.0);
        assert!(normals.get(5, 4)[0] > 0.0);
        assert_eq!(encode_normal(*normals.get(0, 0)), NEUTRAL_NORMAL);

        let normals = generator.generate(&vec![0.0; 81]).unwrap();
        assert!(encoded(normals).iter().all(|&n| n == NEUTRAL_NORMAL));
    }

    #[test]
    fn test_size_mismatch_is_reported() {
        let mut generator = NormalMapGenerator::new(4, 4, NormalMapSettings::runs()).unwrap();
        assert!(generator.generate(&[0.0; 3]).is_err());
    }
}

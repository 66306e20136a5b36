use crate::config::{AppearanceConfig, BlurSettings, CoatParameters, Finish};
use crate::error::Result;
use crate::filter::{gaussian_blur, normalize};
use crate::normal::{encode_normal, NEUTRAL_NORMAL};
use crate::texture::{clamp01, lerp, to_unorm8, Rgba8, Texture};
use rand::{Rng, SeedableRng, XorShiftRng};
use rayon::prelude::*;
use std::path::Path;

/// Visible material channels, regenerated from scratch every tick.
/// Renderers must treat them as read-only.
#[derive(Debug, Clone)]
pub struct DerivedMaps {
    color: Texture<Rgba8>,
    /// Metallic in RGB, smoothness in alpha.
    metallic: Texture<Rgba8>,
    normal: Texture<Rgba8>,
    occlusion: Texture<u8>,
}

impl DerivedMaps {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        Ok(DerivedMaps {
            color: Texture::filled("color map", width, height, [0; 4])?,
            metallic: Texture::filled("metallic map", width, height, [0; 4])?,
            normal: Texture::filled("normal map", width, height, NEUTRAL_NORMAL)?,
            occlusion: Texture::filled("occlusion map", width, height, 255)?,
        })
    }

    pub fn color(&self) -> &Texture<Rgba8> {
        &self.color
    }

    pub fn metallic(&self) -> &Texture<Rgba8> {
        &self.metallic
    }

    pub fn normal(&self) -> &Texture<Rgba8> {
        &self.normal
    }

    pub fn occlusion(&self) -> &Texture<u8> {
        &self.occlusion
    }

    /// Writes all four maps as PNG files into `dir`.
    pub fn save_png<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        self.color.to_image().save(dir.join("color.png"))?;
        self.metallic.to_image().save(dir.join("metallic.png"))?;
        self.normal.to_image().save(dir.join("normal.png"))?;
        self.occlusion.to_image().save(dir.join("occlusion.png"))?;
        Ok(())
    }
}

/// Opacity ramp of the coat, a smoothstep reaching one at `full_opacity`.
pub fn opacity(thickness: f32, full_opacity: f32) -> f32 {
    let t = ramp(thickness, full_opacity);
    t * t * (3.0 - 2.0 * t)
}

/// Gloss and metallic buildup, `clamp01(thickness / threshold) ^ power`.
pub fn gloss_curve(thickness: f32, threshold: f32, power: f32) -> f32 {
    ramp(thickness, threshold).powf(power)
}

/// `clamp01(thickness / threshold)`, a step at zero thickness for a zero
/// threshold.
fn ramp(thickness: f32, threshold: f32) -> f32 {
    if threshold > 0.0 {
        clamp01(thickness / threshold)
    } else if thickness > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Per-texel transforms from thickness to material channels.
pub struct MapDerivationPipeline {
    coat: CoatParameters,
    appearance: AppearanceConfig,
    smoothness: Texture<f32>,
    smoothness_scratch: Texture<f32>,
    /// Static roughness perturbation in tangent space, only `x` and `y` are used.
    roughness: Texture<[f32; 3]>,
}

impl MapDerivationPipeline {
    pub fn new(
        width: usize,
        height: usize,
        coat: &CoatParameters,
        appearance: AppearanceConfig,
        seed: u32,
    ) -> Result<Self> {
        Ok(MapDerivationPipeline {
            coat: coat.clone(),
            appearance,
            smoothness: Texture::filled("smoothness", width, height, 0.0)?,
            smoothness_scratch: Texture::filled("smoothness scratch", width, height, 0.0)?,
            roughness: roughness_texture(width, height, seed)?,
        })
    }

    pub fn set_coat(&mut self, coat: &CoatParameters) {
        self.coat = coat.clone();
    }

    pub fn appearance(&self) -> &AppearanceConfig {
        &self.appearance
    }

    pub fn set_finish(&mut self, finish: Finish) {
        self.appearance.finish = finish;
    }

    /// Input of the blander paint texture normal map: wet thickness relative
    /// to the upper end of the wet target range.
    pub fn paint_greyscale(&self, thickness: &[f32], greyscale: &mut [f32]) {
        let range = self.coat.target_max_thickness_wet;
        greyscale
            .par_iter_mut()
            .zip(thickness.par_iter())
            .for_each(|(grey, &h)| *grey = ramp(h, range));
    }

    /// Regenerates every channel of `maps`.
    ///
    /// `paint_normals` and `runs_normals` are unit tangent-space normals,
    /// `runs_greyscale` gates the roughness perturbation and is absent on
    /// surfaces that do not run.
    pub fn derive(
        &mut self,
        thickness: &[f32],
        paint_normals: &Texture<[f32; 3]>,
        runs_normals: &Texture<[f32; 3]>,
        runs_greyscale: Option<&Texture<f32>>,
        maps: &mut DerivedMaps,
    ) {
        let coat = &self.coat;
        let appearance = &self.appearance;

        maps.color
            .as_mut_slice()
            .par_iter_mut()
            .zip(thickness.par_iter())
            .for_each(|(out, &h)| {
                let t = opacity(h, coat.full_opacity_min_thickness_wet);
                *out = [
                    to_unorm8(lerp(appearance.base_color[0], coat.color[0], t)),
                    to_unorm8(lerp(appearance.base_color[1], coat.color[1], t)),
                    to_unorm8(lerp(appearance.base_color[2], coat.color[2], t)),
                    to_unorm8(lerp(appearance.base_color[3], coat.color[3], t)),
                ];
            });

        maps.occlusion
            .as_mut_slice()
            .par_iter_mut()
            .zip(thickness.par_iter())
            .for_each(|(out, &h)| {
                let t = opacity(h, coat.full_opacity_min_thickness_wet);
                *out = to_unorm8(lerp(appearance.base_occlusion, 1.0, t));
            });

        // Metallic is written directly, smoothness goes through the blur first
        let gloss = appearance.finish.gloss(coat);
        maps.metallic
            .as_mut_slice()
            .par_iter_mut()
            .zip(self.smoothness.as_mut_slice().par_iter_mut())
            .zip(thickness.par_iter())
            .for_each(|((out, smoothness), &h)| {
                let t = gloss_curve(h, coat.full_gloss_min_thickness_wet, coat.gloss_power);
                let metallic = to_unorm8(lerp(appearance.initial_metallic, coat.max_metallic, t));
                *out = [metallic, metallic, metallic, 0];
                *smoothness = lerp(appearance.base_smoothness, gloss, t);
            });

        gaussian_blur(
            &mut self.smoothness,
            &mut self.smoothness_scratch,
            appearance.smoothness_blur,
        );
        for (out, &smoothness) in maps
            .metallic
            .as_mut_slice()
            .iter_mut()
            .zip(self.smoothness.as_slice())
        {
            out[3] = to_unorm8(smoothness);
        }

        let threshold = coat.min_flow_heightmap_threshold;
        let strength = coat.roughness_strength;
        let roughness = self.roughness.as_slice();
        let paint = paint_normals.as_slice();
        let runs = runs_normals.as_slice();
        let greyscale = runs_greyscale.map(|g| g.as_slice());

        maps.normal
            .as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, out)| {
                let (p, r) = (paint[idx], runs[idx]);
                // Whiteout blend of the paint texture and the runs
                let mut n = [p[0] + r[0], p[1] + r[1], p[2] * r[2]];

                let running = greyscale.map(|g| g[idx] > threshold).unwrap_or(false);
                if running {
                    n[0] += roughness[idx][0] * strength;
                    n[1] += roughness[idx][1] * strength;
                }

                *out = encode_normal(normalize(n));
            });

        trace!("Derived color, occlusion, metallic and normal maps");
    }
}

/// Deterministic tangent-space noise standing in for a roughness texture.
fn roughness_texture(width: usize, height: usize, seed: u32) -> Result<Texture<[f32; 3]>> {
    let mut rng: XorShiftRng =
        SeedableRng::from_seed([seed ^ 0x85eb_ca6b, 0xc2b2_ae35, seed, 0x27d4_eb2f]);
    let mut texture = Texture::filled("roughness", width, height, [0.0, 0.0, 1.0])?;
    for texel in texture.as_mut_slice().iter_mut() {
        let x = rng.gen::<f32>() * 2.0 - 1.0;
        let y = rng.gen::<f32>() * 2.0 - 1.0;
        *texel = [x, y, 1.0];
    }

    let mut scratch = Texture::filled("roughness scratch", width, height, [0.0; 3])?;
    gaussian_blur(&mut texture, &mut scratch, BlurSettings { iterations: 1, sample_factor: 1.0 });
    Ok(texture)
}

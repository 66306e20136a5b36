use cgmath::Vector3;
use crate::config::Finish;

/// Tuning of a surface that is independent of the coat being sprayed.
#[derive(Debug, Clone)]
pub struct Config {
    pub spray: SprayConfig,
    /// `None` for surfaces that do not run, e.g. a flat test card.
    pub flow: Option<FlowConfig>,
    /// Normal map visualizing runs.
    pub runs_normals: NormalMapSettings,
    /// Blander normal map giving the layer itself some texture.
    pub paint_normals: NormalMapSettings,
    pub appearance: AppearanceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spray: SprayConfig::default(),
            flow: Some(FlowConfig::default()),
            runs_normals: NormalMapSettings::runs(),
            paint_normals: NormalMapSettings::paint(),
            appearance: AppearanceConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SprayConfig {
    /// Thickness added per tick under a full-intensity cookie texel at
    /// the closest valid distance.
    pub deposit_rate: f32,
    /// Deposition never raises a texel above this thickness.
    pub max_alpha: f32,
    /// Clamps deposition at the full opacity thickness of the coat instead
    /// of `max_alpha`.
    pub stop_at_full_opacity: bool,
    /// Stretches the cookie along fast nozzle movement, `None` to disable.
    pub motion_scaling: Option<MotionScaling>,
    /// Slack when comparing a texel's distance against the depth map.
    pub depth_bias: f32,
    /// Resolution of the procedural cookie and of captured depth maps.
    pub cookie_size: usize,
    /// Fraction of the cookie radius with full intensity.
    pub cookie_hardness: f32,
    /// Seed of all procedural textures of a surface.
    pub seed: u32,
}

impl Default for SprayConfig {
    fn default() -> Self {
        SprayConfig {
            deposit_rate: 0.05,
            max_alpha: 2.0,
            stop_at_full_opacity: false,
            motion_scaling: Some(MotionScaling::default()),
            depth_bias: 0.01,
            cookie_size: 64,
            cookie_hardness: 0.5,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MotionScaling {
    /// Stretch per radian of angular movement between two ticks.
    pub gain: f32,
    /// Upper bound of the stretch, `1.0` allows doubling the footprint.
    pub max_increase: f32,
}

impl Default for MotionScaling {
    fn default() -> Self {
        MotionScaling {
            gain: 8.0,
            max_increase: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Fraction of the excess thickness a texel at full viscosity sends
    /// downhill per tick on a vertical wall.
    pub rate: f32,
    pub gravity: Vector3<f32>,
    /// Excess thickness mapped to white in the runs greyscale.
    pub greyscale_range: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            rate: 0.1,
            gravity: Vector3::new(0.0, -1.0, 0.0),
            greyscale_range: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurSettings {
    pub iterations: usize,
    /// Distance between kernel taps in texels.
    pub sample_factor: f32,
}

impl BlurSettings {
    pub fn none() -> Self {
        BlurSettings {
            iterations: 0,
            sample_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalMapSettings {
    pub height_scale: f32,
    pub pre_blur: BlurSettings,
    pub bump_effect: f32,
    pub post_blur: BlurSettings,
}

impl NormalMapSettings {
    pub fn runs() -> Self {
        NormalMapSettings {
            height_scale: 1.0,
            pre_blur: BlurSettings {
                iterations: 2,
                sample_factor: 1.0,
            },
            bump_effect: 4.0,
            post_blur: BlurSettings {
                iterations: 1,
                sample_factor: 1.0,
            },
        }
    }

    pub fn paint() -> Self {
        NormalMapSettings {
            height_scale: 0.5,
            pre_blur: BlurSettings {
                iterations: 3,
                sample_factor: 2.0,
            },
            bump_effect: 1.0,
            post_blur: BlurSettings {
                iterations: 2,
                sample_factor: 1.5,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppearanceConfig {
    /// Linear RGBA color of the unpainted substrate.
    pub base_color: [f32; 4],
    pub initial_metallic: f32,
    pub base_smoothness: f32,
    /// Occlusion of the unpainted substrate, `1.0` meaning unoccluded.
    pub base_occlusion: f32,
    pub smoothness_blur: BlurSettings,
    pub finish: Finish,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        AppearanceConfig {
            base_color: [0.55, 0.55, 0.55, 1.0],
            initial_metallic: 0.0,
            base_smoothness: 0.2,
            base_occlusion: 0.8,
            smoothness_blur: BlurSettings {
                iterations: 1,
                sample_factor: 1.0,
            },
            finish: Finish::Wet,
        }
    }
}

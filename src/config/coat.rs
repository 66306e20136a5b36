use crate::error::{Error, Result};

/// Read-only description of the coat being sprayed.
///
/// Instances can only be obtained through `CoatParametersBuilder::build`,
/// which rejects inconsistent values, and are read through getters.
/// Everything downstream assumes validated input.
#[derive(Debug, Clone, PartialEq)]
pub struct CoatParameters {
    /// How readily thickness above the run threshold moves downhill,
    /// zero disables runs entirely.
    pub(crate) viscosity: f32,
    /// Nozzle distance below which nothing is deposited.
    pub(crate) min_spray_distance: f32,
    /// Nozzle distance beyond which nothing is deposited.
    pub(crate) max_spray_distance: f32,
    pub(crate) wet_gloss: f32,
    pub(crate) dry_gloss: f32,
    pub(crate) target_min_thickness_wet: f32,
    pub(crate) target_max_thickness_wet: f32,
    pub(crate) target_min_thickness_dry: f32,
    pub(crate) target_max_thickness_dry: f32,
    /// Wet thickness at which the coat fully hides the substrate.
    pub(crate) full_opacity_min_thickness_wet: f32,
    /// Wet thickness at which the coat reaches its full gloss.
    pub(crate) full_gloss_min_thickness_wet: f32,
    /// Thickness above which paint starts to run.
    pub(crate) min_flow_thickness: f32,
    /// Runs greyscale above which the roughness texture perturbs the normal.
    pub(crate) min_flow_heightmap_threshold: f32,
    pub(crate) roughness_strength: f32,
    /// Linear RGBA color of a fully opaque layer.
    pub(crate) color: [f32; 4],
    pub(crate) max_metallic: f32,
    /// Exponent of the thickness to gloss/metallic curve.
    pub(crate) gloss_power: f32,
}

impl CoatParameters {
    pub fn viscosity(&self) -> f32 {
        self.viscosity
    }

    pub fn min_spray_distance(&self) -> f32 {
        self.min_spray_distance
    }

    pub fn max_spray_distance(&self) -> f32 {
        self.max_spray_distance
    }

    pub fn wet_gloss(&self) -> f32 {
        self.wet_gloss
    }

    pub fn dry_gloss(&self) -> f32 {
        self.dry_gloss
    }

    pub fn target_min_thickness_wet(&self) -> f32 {
        self.target_min_thickness_wet
    }

    pub fn target_max_thickness_wet(&self) -> f32 {
        self.target_max_thickness_wet
    }

    pub fn target_min_thickness_dry(&self) -> f32 {
        self.target_min_thickness_dry
    }

    pub fn target_max_thickness_dry(&self) -> f32 {
        self.target_max_thickness_dry
    }

    pub fn full_opacity_min_thickness_wet(&self) -> f32 {
        self.full_opacity_min_thickness_wet
    }

    pub fn full_gloss_min_thickness_wet(&self) -> f32 {
        self.full_gloss_min_thickness_wet
    }

    pub fn min_flow_thickness(&self) -> f32 {
        self.min_flow_thickness
    }

    pub fn min_flow_heightmap_threshold(&self) -> f32 {
        self.min_flow_heightmap_threshold
    }

    pub fn roughness_strength(&self) -> f32 {
        self.roughness_strength
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    pub fn max_metallic(&self) -> f32 {
        self.max_metallic
    }

    pub fn gloss_power(&self) -> f32 {
        self.gloss_power
    }
}

/// Whether appearance and evaluation treat the layer as freshly sprayed or
/// as cured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    Wet,
    Dry,
}

impl Finish {
    pub fn gloss(self, coat: &CoatParameters) -> f32 {
        match self {
            Finish::Wet => coat.wet_gloss,
            Finish::Dry => coat.dry_gloss,
        }
    }

    /// Acceptable thickness range for the finish, in its own units.
    pub fn target_range(self, coat: &CoatParameters) -> (f32, f32) {
        match self {
            Finish::Wet => (coat.target_min_thickness_wet, coat.target_max_thickness_wet),
            Finish::Dry => (coat.target_min_thickness_dry, coat.target_max_thickness_dry),
        }
    }

    /// Converts simulated wet thickness into the thickness of this finish.
    /// Curing shrinks the layer by the ratio of the target maxima.
    pub fn thickness(self, coat: &CoatParameters, wet_thickness: f32) -> f32 {
        match self {
            Finish::Wet => wet_thickness,
            Finish::Dry => {
                if coat.target_max_thickness_wet > 0.0 {
                    wet_thickness * coat.target_max_thickness_dry / coat.target_max_thickness_wet
                } else {
                    wet_thickness
                }
            }
        }
    }
}

pub struct CoatParametersBuilder {
    coat: CoatParameters,
}

impl CoatParametersBuilder {
    pub fn new() -> CoatParametersBuilder {
        CoatParametersBuilder {
            coat: CoatParameters {
                viscosity: 0.5,
                min_spray_distance: 0.1,
                max_spray_distance: 0.5,
                wet_gloss: 0.9,
                dry_gloss: 0.6,
                target_min_thickness_wet: 0.3,
                target_max_thickness_wet: 0.6,
                target_min_thickness_dry: 0.15,
                target_max_thickness_dry: 0.3,
                full_opacity_min_thickness_wet: 0.25,
                full_gloss_min_thickness_wet: 0.4,
                min_flow_thickness: 0.7,
                min_flow_heightmap_threshold: 0.05,
                roughness_strength: 0.3,
                color: [0.8, 0.1, 0.1, 1.0],
                max_metallic: 0.0,
                gloss_power: 2.0,
            },
        }
    }

    pub fn viscosity(mut self, viscosity: f32) -> Self {
        self.coat.viscosity = viscosity;
        self
    }

    pub fn spray_distance(mut self, min: f32, max: f32) -> Self {
        self.coat.min_spray_distance = min;
        self.coat.max_spray_distance = max;
        self
    }

    pub fn gloss(mut self, wet: f32, dry: f32) -> Self {
        self.coat.wet_gloss = wet;
        self.coat.dry_gloss = dry;
        self
    }

    pub fn target_thickness_wet(mut self, min: f32, max: f32) -> Self {
        self.coat.target_min_thickness_wet = min;
        self.coat.target_max_thickness_wet = max;
        self
    }

    pub fn target_thickness_dry(mut self, min: f32, max: f32) -> Self {
        self.coat.target_min_thickness_dry = min;
        self.coat.target_max_thickness_dry = max;
        self
    }

    pub fn full_opacity_thickness(mut self, thickness: f32) -> Self {
        self.coat.full_opacity_min_thickness_wet = thickness;
        self
    }

    pub fn full_gloss_thickness(mut self, thickness: f32) -> Self {
        self.coat.full_gloss_min_thickness_wet = thickness;
        self
    }

    pub fn min_flow_thickness(mut self, thickness: f32) -> Self {
        self.coat.min_flow_thickness = thickness;
        self
    }

    pub fn min_flow_heightmap_threshold(mut self, threshold: f32) -> Self {
        self.coat.min_flow_heightmap_threshold = threshold;
        self
    }

    pub fn roughness_strength(mut self, strength: f32) -> Self {
        self.coat.roughness_strength = strength;
        self
    }

    pub fn color(mut self, color: [f32; 4]) -> Self {
        self.coat.color = color;
        self
    }

    pub fn max_metallic(mut self, metallic: f32) -> Self {
        self.coat.max_metallic = metallic;
        self
    }

    pub fn gloss_power(mut self, power: f32) -> Self {
        self.coat.gloss_power = power;
        self
    }

    pub fn build(self) -> Result<CoatParameters> {
        let coat = self.coat;

        let scalars = [
            ("viscosity", coat.viscosity),
            ("min_spray_distance", coat.min_spray_distance),
            ("max_spray_distance", coat.max_spray_distance),
            ("wet_gloss", coat.wet_gloss),
            ("dry_gloss", coat.dry_gloss),
            ("target_min_thickness_wet", coat.target_min_thickness_wet),
            ("target_max_thickness_wet", coat.target_max_thickness_wet),
            ("target_min_thickness_dry", coat.target_min_thickness_dry),
            ("target_max_thickness_dry", coat.target_max_thickness_dry),
            ("full_opacity_min_thickness_wet", coat.full_opacity_min_thickness_wet),
            ("full_gloss_min_thickness_wet", coat.full_gloss_min_thickness_wet),
            ("min_flow_thickness", coat.min_flow_thickness),
            ("min_flow_heightmap_threshold", coat.min_flow_heightmap_threshold),
            ("roughness_strength", coat.roughness_strength),
            ("max_metallic", coat.max_metallic),
            ("gloss_power", coat.gloss_power),
        ];

        for &(name, value) in scalars.iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidCoat(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }

        for &(name, value) in [
            ("wet_gloss", coat.wet_gloss),
            ("dry_gloss", coat.dry_gloss),
            ("max_metallic", coat.max_metallic),
        ].iter()
        {
            if value > 1.0 {
                return Err(Error::InvalidCoat(format!(
                    "{} must not exceed 1, got {}",
                    name, value
                )));
            }
        }

        if coat.color.iter().any(|c| !(*c >= 0.0 && *c <= 1.0)) {
            return Err(Error::InvalidCoat(format!(
                "color channels must be within 0..1, got {:?}",
                coat.color
            )));
        }

        if coat.min_spray_distance >= coat.max_spray_distance {
            return Err(Error::InvalidCoat(format!(
                "spray distance range {}..{} is empty",
                coat.min_spray_distance, coat.max_spray_distance
            )));
        }

        if coat.target_min_thickness_wet > coat.target_max_thickness_wet {
            return Err(Error::InvalidCoat(format!(
                "wet target thickness {} exceeds maximum {}",
                coat.target_min_thickness_wet, coat.target_max_thickness_wet
            )));
        }

        if coat.target_min_thickness_dry > coat.target_max_thickness_dry {
            return Err(Error::InvalidCoat(format!(
                "dry target thickness {} exceeds maximum {}",
                coat.target_min_thickness_dry, coat.target_max_thickness_dry
            )));
        }

        Ok(coat)
    }
}

impl Default for CoatParametersBuilder {
    fn default() -> Self {
        CoatParametersBuilder::new()
    }
}

use crate::config::{CoatParameters, Finish};
use crate::cookie::Projection;
use crate::field::ThicknessField;
use crate::texture::Texture;

/// Thickness statistics against the target range of a finish.
///
/// Only painted texels, those with non-zero thickness, are classified and
/// contribute to the mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoverageReport {
    pub painted: usize,
    pub under: usize,
    pub within: usize,
    pub over: usize,
    /// Mean thickness of painted texels in units of the finish.
    pub mean_thickness: f32,
    pub max_thickness: f32,
}

impl CoverageReport {
    /// Share of painted texels inside the target range, zero if nothing is
    /// painted.
    pub fn within_ratio(&self) -> f32 {
        if self.painted == 0 {
            0.0
        } else {
            self.within as f32 / self.painted as f32
        }
    }

    fn classify<I>(thicknesses: I, coat: &CoatParameters, finish: Finish) -> Self
    where
        I: Iterator<Item = f32>,
    {
        let (min, max) = finish.target_range(coat);
        let mut report = CoverageReport::default();
        let mut sum = 0.0_f64;

        for wet in thicknesses.filter(|&h| h > 0.0) {
            let h = finish.thickness(coat, wet);
            report.painted += 1;
            sum += h as f64;
            report.max_thickness = report.max_thickness.max(h);

            if h < min {
                report.under += 1;
            } else if h > max {
                report.over += 1;
            } else {
                report.within += 1;
            }
        }

        if report.painted > 0 {
            report.mean_thickness = (sum / report.painted as f64) as f32;
        }
        report
    }
}

/// Coverage of the whole surface.
pub fn evaluate(field: &ThicknessField, coat: &CoatParameters, finish: Finish) -> CoverageReport {
    CoverageReport::classify(field.values().iter().cloned(), coat, finish)
}

/// What a spray would do, computed without touching the field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProbeReading {
    pub projection: Projection,
    /// Coverage of the footprint as it is now.
    pub current: CoverageReport,
    /// Coverage of the footprint if the spray were applied.
    pub predicted: CoverageReport,
}

impl ProbeReading {
    pub(crate) fn new(
        field: &ThicknessField,
        deposit: &Texture<f32>,
        projection: Projection,
        max_alpha: f32,
        coat: &CoatParameters,
        finish: Finish,
    ) -> Self {
        let footprint = || {
            field
                .values()
                .iter()
                .zip(deposit.as_slice())
                .filter(|&(_, &d)| d > 0.0)
        };

        let current = CoverageReport::classify(footprint().map(|(&h, _)| h), coat, finish);
        let predicted = CoverageReport::classify(
            footprint().map(|(&h, &d)| h.max((h + d).min(max_alpha))),
            coat,
            finish,
        );

        ProbeReading {
            projection,
            current,
            predicted,
        }
    }
}

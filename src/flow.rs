//! Gravity driven runs of wet paint.
//!
//! Every tick runs the same four passes in a fixed order: outflow, reduction,
//! smoothing and greyscale extraction. The first two operate on the ping-pong
//! buffers of the thickness field, the last two on buffers owned by the
//! simulator.

use cgmath::prelude::*;
use crate::config::{CoatParameters, FlowConfig};
use crate::error::{alloc_filled, Error, Result};
use crate::field::ThicknessField;
use crate::geometry::SurfaceGeometry;
use crate::texture::{clamp01, Texture};
use rayon::prelude::*;

/// Upper bound for the fraction of its excess a texel sends per tick,
/// larger values make the explicit scheme oscillate.
const MAX_OUTFLOW_FRACTION: f32 = 0.5;
/// Tangential gravity below this is treated as a level surface.
const MIN_STEEPNESS: f32 = 1.0e-6;

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    source: usize,
    weight: f32,
}

/// Texels sending paint into one texel, at most one per direct neighbour.
#[derive(Debug, Clone, Copy, Default)]
struct Inflow {
    links: [Link; 4],
    len: u8,
}

impl Inflow {
    fn push(&mut self, source: usize, weight: f32) {
        self.links[self.len as usize] = Link { source, weight };
        self.len += 1;
    }

    fn links(&self) -> &[Link] {
        &self.links[..self.len as usize]
    }
}

/// Mass moved by one tick of flow.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowReport {
    /// Thickness that left its texel.
    pub moved: f64,
    /// Thickness that left the field over its border or into invalid
    /// texels. This is the only way the field loses mass through flow.
    pub leaked: f64,
}

pub struct FlowSimulator {
    width: usize,
    height: usize,
    config: FlowConfig,
    viscosity: f32,
    min_flow_thickness: f32,
    /// Steepness of each texel times the flow rate.
    conductance: Vec<f32>,
    /// Share of a texel's outflow without a receiving neighbour.
    leak_fraction: Vec<f32>,
    inflow: Vec<Inflow>,
    /// Copy of the outflow pass result read by the reduction pass.
    last_result: Vec<f32>,
    row_reports: Vec<FlowReport>,
    smoothed: Texture<f32>,
    greyscale: Texture<f32>,
}

impl FlowSimulator {
    /// Precomputes downhill routes for `geometry`.
    pub fn new(
        geometry: &SurfaceGeometry,
        config: FlowConfig,
        coat: &CoatParameters,
    ) -> Result<Self> {
        let (width, height) = (geometry.width(), geometry.height());
        let texels = width * height;

        let mut conductance = alloc_filled("flow conductance", texels, 0.0)?;
        let mut leak_fraction = alloc_filled("flow leak fraction", texels, 0.0)?;
        let mut inflow = alloc_filled("flow inflow links", texels, Inflow::default())?;

        let gravity_len2 = config.gravity.magnitude2();
        let gravity = if gravity_len2 > 0.0 && gravity_len2.is_finite() {
            config.gravity.normalize()
        } else {
            warn!("Flow gravity {:?} is degenerate, paint will not run", config.gravity);
            cgmath::Vector3::zero()
        };

        let mut level = 0;
        for (idx, frame) in geometry.frames().iter().enumerate() {
            if !frame.is_usable() || frame.normal.magnitude2() == 0.0 {
                continue;
            }

            let normal = frame.normal.normalize();
            let downhill = gravity - normal * normal.dot(gravity);
            let du = downhill.dot(normalize_or_zero(frame.tangent));
            let dv = downhill.dot(normalize_or_zero(frame.bitangent));
            let steepness = (du * du + dv * dv).sqrt();

            if !(steepness > MIN_STEEPNESS) {
                level += 1;
                continue;
            }

            conductance[idx] = config.rate.max(0.0) * steepness.min(1.0);

            let (x, y) = ((idx % width) as isize, (idx / width) as isize);
            let sum = du.abs() + dv.abs();
            let shares = [
                (x + du.signum() as isize, y, du.abs() / sum),
                (x, y + dv.signum() as isize, dv.abs() / sum),
            ];

            for &(tx, ty, weight) in shares.iter() {
                if weight <= 0.0 {
                    continue;
                }

                let inside = tx >= 0 && ty >= 0 && (tx as usize) < width && (ty as usize) < height;
                if inside && geometry.frame(tx as usize, ty as usize).is_usable() {
                    inflow[ty as usize * width + tx as usize].push(idx, weight);
                } else {
                    leak_fraction[idx] += weight;
                }
            }
        }

        debug!(
            "Prepared flow routes for {}x{} texels, {} level texels do not run",
            width, height, level
        );

        Ok(FlowSimulator {
            width,
            height,
            config,
            viscosity: coat.viscosity,
            min_flow_thickness: coat.min_flow_thickness,
            conductance,
            leak_fraction,
            inflow,
            last_result: alloc_filled("flow last result", texels, 0.0)?,
            row_reports: alloc_filled("flow row reports", height, FlowReport::default())?,
            smoothed: Texture::filled("smoothed thickness", width, height, 0.0)?,
            greyscale: Texture::filled("runs greyscale", width, height, 0.0)?,
        })
    }

    /// Re-applies coat constants after the coat changed.
    pub fn set_coat(&mut self, coat: &CoatParameters) {
        self.viscosity = coat.viscosity;
        self.min_flow_thickness = coat.min_flow_thickness;
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Smoothed thickness of the last tick.
    pub fn smoothed(&self) -> &Texture<f32> {
        &self.smoothed
    }

    /// Normalized excess thickness of the last tick, input of the runs
    /// normal map.
    pub fn greyscale(&self) -> &Texture<f32> {
        &self.greyscale
    }

    /// Runs all four passes on `field`.
    pub fn step(&mut self, field: &mut ThicknessField) -> Result<FlowReport> {
        self.check_size(field)?;

        let viscosity = self.viscosity;
        let min_flow = self.min_flow_thickness;
        let width = self.width;
        let conductance = &self.conductance;
        let inflow = &self.inflow;

        let buffers = field.buffers_mut();
        buffers.commit();

        // Outflow: every texel gathers what its uphill neighbours send
        {
            let (previous, current) = buffers.split();
            current
                .par_chunks_mut(width)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, out) in row.iter_mut().enumerate() {
                        let idx = y * width + x;
                        let received = inflow[idx]
                            .links()
                            .iter()
                            .map(|l| {
                                let source = l.source;
                                let sent = outflow(
                                    previous[source],
                                    conductance[source],
                                    viscosity,
                                    min_flow,
                                );
                                l.weight * sent
                            })
                            .fold(0.0, |acc, v| acc + v);
                        *out = previous[idx] + received;
                    }
                });
        }
        trace!("Outflow pass complete");

        // Reduction: subtract what was sent, reading a copy of the outflow result
        self.last_result.copy_from_slice(buffers.current());
        {
            let last_result = &self.last_result;
            let leak_fraction = &self.leak_fraction;
            let (previous, current) = buffers.split();

            current
                .par_chunks_mut(width)
                .zip(self.row_reports.par_iter_mut())
                .enumerate()
                .for_each(|(y, (row, report))| {
                    *report = FlowReport::default();
                    for (x, out) in row.iter_mut().enumerate() {
                        let idx = y * width + x;
                        let sent = outflow(previous[idx], conductance[idx], viscosity, min_flow);
                        *out = (last_result[idx] - sent).max(0.0);
                        report.moved += sent as f64;
                        report.leaked += (sent * leak_fraction[idx]) as f64;
                    }
                });
        }
        trace!("Reduction pass complete");

        // Rows are summed in order so reports are reproducible
        let report = self.row_reports.iter().fold(FlowReport::default(), |acc, row| FlowReport {
            moved: acc.moved + row.moved,
            leaked: acc.leaked + row.leaked,
        });

        #[cfg(feature = "debug_kernels")]
        check_non_negative(buffers.current());

        self.refresh(field);

        Ok(report)
    }

    /// Recomputes smoothing and greyscale from `field` without moving any
    /// paint, used after resets and for the initial state.
    pub fn refresh(&mut self, field: &ThicknessField) {
        let width = self.width;
        let height = self.height;
        let values = field.values();

        // Smoothing: 3x3 binomial filter with clamped edges
        self.smoothed
            .as_mut_slice()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let mut acc = 0.0;
                    for dy in -1isize..=1 {
                        for dx in -1isize..=1 {
                            let sx = (x as isize + dx).max(0).min(width as isize - 1) as usize;
                            let sy = (y as isize + dy).max(0).min(height as isize - 1) as usize;
                            let weight = (2 - dx.abs()) * (2 - dy.abs());
                            acc += values[sy * width + sx] * weight as f32;
                        }
                    }
                    *out = acc / 16.0;
                }
            });
        trace!("Smoothing pass complete");

        let min_flow = self.min_flow_thickness;
        let range = self.config.greyscale_range;
        let smoothed = self.smoothed.as_slice();
        self.greyscale
            .as_mut_slice()
            .par_iter_mut()
            .zip(smoothed.par_iter())
            .for_each(|(grey, &thickness)| {
                let excess = thickness - min_flow;
                *grey = if range > 0.0 {
                    clamp01(excess / range)
                } else if excess > 0.0 {
                    1.0
                } else {
                    0.0
                };
            });
        trace!("Greyscale pass complete");
    }

    fn check_size(&self, field: &ThicknessField) -> Result<()> {
        if field.width() != self.width || field.height() != self.height {
            return Err(Error::SizeMismatch {
                what: "thickness field",
                expected_width: self.width,
                expected_height: self.height,
                actual_width: field.width(),
                actual_height: field.height(),
            });
        }
        Ok(())
    }
}

/// Thickness a texel sends downhill in one tick. Anything non-finite sends
/// nothing.
#[inline]
fn outflow(thickness: f32, conductance: f32, viscosity: f32, min_flow: f32) -> f32 {
    let excess = thickness - min_flow;
    if !(excess > 0.0) || !thickness.is_finite() {
        return 0.0;
    }

    let fraction = (viscosity * conductance).min(MAX_OUTFLOW_FRACTION);
    if !(fraction > 0.0) {
        return 0.0;
    }

    (fraction * excess).min(excess)
}

fn normalize_or_zero(v: cgmath::Vector3<f32>) -> cgmath::Vector3<f32> {
    if v.magnitude2() > 0.0 {
        v.normalize()
    } else {
        v
    }
}

#[cfg(feature = "debug_kernels")]
fn check_non_negative(values: &[f32]) {
    let negative = values.iter().filter(|&&v| v < 0.0).count();
    let mass: f64 = values.iter().map(|&v| v as f64).sum();
    debug!("Flow produced mass {:.6}", mass);
    assert_eq!(negative, 0, "Flow produced {} negative texels", negative);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::CoatParametersBuilder;
    use cgmath::{Point3, Vector3};

    const SIZE: usize = 32;

    /// Vertical wall, texel rows increase downward.
    fn wall() -> SurfaceGeometry {
        SurfaceGeometry::plane(
            SIZE,
            SIZE,
            Point3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
        ).unwrap()
    }

    fn floor() -> SurfaceGeometry {
        SurfaceGeometry::plane(
            SIZE,
            SIZE,
            Point3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, -1.0),
        ).unwrap()
    }

    fn coat(viscosity: f32) -> CoatParameters {
        CoatParametersBuilder::new()
            .viscosity(viscosity)
            .min_flow_thickness(0.1)
            .build()
            .unwrap()
    }

    /// Single footprint with peak 0.8 at `(16, 10)` deposited into an empty field.
    fn footprint_field() -> ThicknessField {
        let mut field = ThicknessField::new(SIZE, SIZE).unwrap();
        let mut deposit = Texture::filled("deposit", SIZE, SIZE, 0.0).unwrap();
        *deposit.get_mut(16, 10) = 0.8;
        for &(x, y) in [(15, 10), (17, 10), (16, 9), (16, 11)].iter() {
            *deposit.get_mut(x, y) = 0.2;
        }
        field.blend_deposit(&deposit, 2.0).unwrap();
        field
    }

    #[test]
    fn test_runs_move_paint_downhill() {
        let mut sim = FlowSimulator::new(&wall(), FlowConfig::default(), &coat(0.5)).unwrap();
        let mut field = footprint_field();
        let initial_mass = field.mass();

        let mut center = field.get(16, 10);
        let mut below = field.get(16, 11);
        let mut leaked = 0.0;

        for _ in 0..10 {
            let report = sim.step(&mut field).unwrap();
            leaked += report.leaked;

            let now_center = field.get(16, 10);
            let now_below = field.get(16, 11);
            assert!(now_center < center, "center went from {} to {}", center, now_center);
            assert!(now_below > below, "downhill went from {} to {}", below, now_below);
            center = now_center;
            below = now_below;
        }

        // Nothing reached the border within ten ticks
        assert_eq!(leaked, 0.0);
        assert_relative_eq!(field.mass(), initial_mass, epsilon = 1e-5);
        // Uphill texels only drain
        assert!(field.get(16, 8) == 0.0);
        assert!(field.values().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_zero_viscosity_is_identity() {
        let mut sim = FlowSimulator::new(&wall(), FlowConfig::default(), &coat(0.0)).unwrap();
        let mut field = footprint_field();
        let before = field.values().to_vec();

        for _ in 0..5 {
            let report = sim.step(&mut field).unwrap();
            assert_eq!(report.moved, 0.0);
        }

        assert_eq!(field.values(), &before[..]);
    }

    #[test]
    fn test_thin_paint_does_not_run() {
        let mut sim = FlowSimulator::new(&wall(), FlowConfig::default(), &coat(1.0)).unwrap();
        let values = vec![0.09; SIZE * SIZE];
        let mut field = ThicknessField::from_values(SIZE, SIZE, values.clone()).unwrap();

        sim.step(&mut field).unwrap();
        assert_eq!(field.values(), &values[..]);
    }

    #[test]
    fn test_level_floor_does_not_run() {
        let mut sim = FlowSimulator::new(&floor(), FlowConfig::default(), &coat(1.0)).unwrap();
        let mut field = footprint_field();
        let before = field.values().to_vec();

        sim.step(&mut field).unwrap();
        assert_eq!(field.values(), &before[..]);
    }

    #[test]
    fn test_bottom_row_leaks_over_border() {
        let mut sim = FlowSimulator::new(&wall(), FlowConfig::default(), &coat(1.0)).unwrap();
        let mut values = vec![0.0; SIZE * SIZE];
        values[(SIZE - 1) * SIZE + 4] = 1.0;
        let mut field = ThicknessField::from_values(SIZE, SIZE, values).unwrap();
        let before = field.mass();

        let report = sim.step(&mut field).unwrap();

        assert!(report.leaked > 0.0);
        assert_relative_eq!(before - field.mass(), report.leaked, epsilon = 1e-6);
        // Rate 0.1 at viscosity 1 sends a tenth of the excess
        assert_relative_eq!(report.leaked, 0.09, epsilon = 1e-6);
    }

    #[test]
    fn test_slanted_surface_splits_flow() {
        // Wall rotated so that downhill points diagonally in texture space
        let s = 0.5f32.sqrt();
        let geometry = SurfaceGeometry::plane(
            SIZE,
            SIZE,
            Point3::new(0.0, 0.0, 0.0),
            Vector3::new(s, -s, 0.0),
            Vector3::new(-s, -s, 0.0),
        ).unwrap();
        let mut sim = FlowSimulator::new(&geometry, FlowConfig::default(), &coat(1.0)).unwrap();
        let mut values = vec![0.0; SIZE * SIZE];
        values[16 * SIZE + 16] = 1.0;
        let mut field = ThicknessField::from_values(SIZE, SIZE, values).unwrap();

        sim.step(&mut field).unwrap();

        assert!(field.get(17, 16) > 0.0);
        assert!(field.get(16, 17) > 0.0);
        assert_relative_eq!(field.get(17, 16), field.get(16, 17), epsilon = 1e-6);
    }

    #[test]
    fn test_greyscale_marks_excess_only() {
        let mut sim = FlowSimulator::new(&wall(), FlowConfig::default(), &coat(0.5)).unwrap();
        let field = footprint_field();
        sim.refresh(&field);

        assert!(*sim.greyscale().get(16, 10) > 0.0);
        assert_eq!(*sim.greyscale().get(2, 2), 0.0);
        assert!(sim.greyscale().as_slice().iter().all(|&g| g >= 0.0 && g <= 1.0));
        // Smoothing never touches the field itself
        assert_eq!(field.get(16, 10), 0.8);
    }

    #[test]
    fn test_non_finite_geometry_does_not_spread() {
        let mut frames = wall().frames().to_vec();
        frames[10 * SIZE + 16].normal = Vector3::new(::std::f32::NAN, 0.0, 0.0);
        let geometry = SurfaceGeometry::from_frames(SIZE, SIZE, frames).unwrap();
        let mut sim = FlowSimulator::new(&geometry, FlowConfig::default(), &coat(1.0)).unwrap();
        let mut field = footprint_field();

        sim.step(&mut field).unwrap();

        assert!(field.values().iter().all(|v| v.is_finite() && *v >= 0.0));
        // The malformed texel neither sends nor receives
        assert_eq!(field.get(16, 10), 0.8);
    }
}

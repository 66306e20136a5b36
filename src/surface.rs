use crate::config::{CoatParameters, Config, Finish};
use crate::cookie::{Cookie, CookieProjector, Projection, SprayInput};
use crate::error::{alloc_filled, Error, Result};
use crate::field::ThicknessField;
use crate::flow::{FlowReport, FlowSimulator};
use crate::geometry::SurfaceGeometry;
use crate::inspect::{self, CoverageReport, ProbeReading};
use crate::maps::{DerivedMaps, MapDerivationPipeline};
use crate::normal::NormalMapGenerator;
use crate::texture::Texture;
use std::fs;
use std::path::Path;

/// What happened during a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    /// Footprint of the spray, `None` if the trigger was not pressed.
    pub projection: Option<Projection>,
    /// Thickness actually added after clamping at the blend limit.
    pub deposited: f64,
    /// `None` for surfaces that do not run.
    pub flow: Option<FlowReport>,
}

/// A paintable surface with everything needed to simulate and display its
/// coat.
///
/// All buffers are allocated in `new`, ticking never allocates apart from
/// motion-stretched cookies.
pub struct Surface {
    geometry: SurfaceGeometry,
    coat: CoatParameters,
    config: Config,
    field: ThicknessField,
    projector: CookieProjector,
    flow: Option<FlowSimulator>,
    paint_greyscale: Vec<f32>,
    paint_normals: NormalMapGenerator,
    runs_normals: NormalMapGenerator,
    pipeline: MapDerivationPipeline,
    maps: DerivedMaps,
    ticks: u64,
    poisoned: bool,
    /// Makes the next tick fail once the field has changed.
    #[cfg(test)]
    fail_after_deposit: bool,
}

impl Surface {
    pub fn new(geometry: SurfaceGeometry, coat: CoatParameters, config: Config) -> Result<Surface> {
        let (width, height) = (geometry.width(), geometry.height());
        let field = ThicknessField::new(width, height)?;

        let cookie = Cookie::radial(
            config.spray.cookie_size,
            config.spray.cookie_hardness,
            config.spray.seed,
        )?;
        let projector = CookieProjector::new(width, height, cookie, &config.spray)?;

        let flow = match config.flow {
            Some(ref flow) => Some(FlowSimulator::new(&geometry, flow.clone(), &coat)?),
            None => None,
        };

        let mut surface = Surface {
            paint_greyscale: alloc_filled("paint greyscale", width * height, 0.0)?,
            paint_normals: NormalMapGenerator::new(width, height, config.paint_normals)?,
            runs_normals: NormalMapGenerator::new(width, height, config.runs_normals)?,
            pipeline: MapDerivationPipeline::new(
                width,
                height,
                &coat,
                config.appearance.clone(),
                config.spray.seed,
            )?,
            maps: DerivedMaps::new(width, height)?,
            geometry,
            coat,
            config,
            field,
            projector,
            flow,
            ticks: 0,
            poisoned: false,
            #[cfg(test)]
            fail_after_deposit: false,
        };
        surface.refresh()?;

        info!(
            "Created {}x{} surface, runs {}",
            width,
            height,
            if surface.flow.is_some() { "enabled" } else { "disabled" }
        );
        Ok(surface)
    }

    /// Advances the simulation by one tick: deposition of `spray` if the
    /// trigger is pressed, flow, then derivation of all maps.
    ///
    /// Invalid spray input is rejected without side effects. A failure after
    /// the field started changing poisons the surface.
    pub fn tick(&mut self, spray: Option<&SprayInput>) -> Result<TickReport> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }

        let projection = match spray {
            Some(input) => Some(self.projector.project(&self.geometry, &self.coat, input, true)?),
            None => {
                self.projector.reset();
                None
            }
        };

        match self.advance(projection) {
            Ok(report) => {
                self.ticks += 1;
                debug!(
                    "Tick {}: deposited {:.5}, flowed {:.5}, leaked {:.5}",
                    self.ticks,
                    report.deposited,
                    report.flow.map(|f| f.moved).unwrap_or(0.0),
                    report.flow.map(|f| f.leaked).unwrap_or(0.0)
                );
                Ok(report)
            }
            Err(err) => {
                error!("Tick {} failed, surface is poisoned: {}", self.ticks + 1, err);
                self.poisoned = true;
                Err(err)
            }
        }
    }

    fn advance(&mut self, projection: Option<Projection>) -> Result<TickReport> {
        let deposited = match projection {
            Some(_) => {
                let max_alpha = self.max_alpha();
                self.field.blend_deposit(self.projector.deposit(), max_alpha)?
            }
            None => 0.0,
        };

        #[cfg(test)]
        {
            if self.fail_after_deposit {
                self.fail_after_deposit = false;
                return Err(Error::Allocation {
                    what: "injected fault",
                    texels: 0,
                });
            }
        }

        let flow = match self.flow {
            Some(ref mut flow) => Some(flow.step(&mut self.field)?),
            None => None,
        };

        self.derive()?;

        Ok(TickReport {
            projection,
            deposited,
            flow,
        })
    }

    /// Runs the projector for `spray` and reports what it would do, without
    /// touching the field or the motion tracking of the nozzle.
    pub fn probe(&mut self, spray: &SprayInput) -> Result<ProbeReading> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }

        let projection = self.projector.project(&self.geometry, &self.coat, spray, false)?;
        Ok(ProbeReading::new(
            &self.field,
            self.projector.deposit(),
            projection,
            self.max_alpha(),
            &self.coat,
            self.config.appearance.finish,
        ))
    }

    /// Restores the baseline thickness and rederives all maps, leaving the
    /// surface exactly as it was after creation or the last import.
    pub fn reset(&mut self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }

        self.field.reset();
        self.projector.reset();
        self.ticks = 0;
        self.refresh()?;
        info!("Reset surface to its baseline");
        Ok(())
    }

    /// Reallocates every buffer from the current geometry, coat and config,
    /// keeping the baseline and the cookie. Clears a poisoned state.
    pub fn reinitialize(&mut self) -> Result<()> {
        let mut fresh =
            Surface::new(self.geometry.clone(), self.coat.clone(), self.config.clone())?;
        fresh.projector.set_cookie(self.projector.cookie().clone());
        fresh.field.load(self.field.baseline())?;
        fresh.refresh()?;

        *self = fresh;
        info!("Reinitialized surface");
        Ok(())
    }

    /// Applies a different coat to the existing thickness.
    pub fn set_coat(&mut self, coat: CoatParameters) -> Result<()> {
        if let Some(ref mut flow) = self.flow {
            flow.set_coat(&coat);
        }
        self.pipeline.set_coat(&coat);
        self.coat = coat;
        self.refresh()
    }

    pub fn set_finish(&mut self, finish: Finish) -> Result<()> {
        self.config.appearance.finish = finish;
        self.pipeline.set_finish(finish);
        self.derive()
    }

    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.projector.set_cookie(cookie);
    }

    /// Encodes the current thickness as a lossless PNG.
    pub fn export_snapshot(&self) -> Result<Vec<u8>> {
        let encoded = self.field.export_snapshot()?;
        info!("Exported snapshot of {} bytes", encoded.len());
        Ok(encoded)
    }

    /// Replaces thickness and baseline with a snapshot exported from a
    /// surface of the same size.
    ///
    /// The motion history of the nozzle is not part of a snapshot: the first
    /// tick after an import is never stretched, even if the exporting surface
    /// would have stretched it.
    pub fn import_snapshot(&mut self, encoded: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }

        self.field.import_snapshot(encoded)?;
        self.projector.reset();
        self.ticks = 0;

        if let Err(err) = self.refresh() {
            self.poisoned = true;
            return Err(err);
        }

        info!("Imported snapshot of {} bytes", encoded.len());
        Ok(())
    }

    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.export_snapshot()?)?;
        Ok(())
    }

    pub fn load_snapshot<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let encoded = fs::read(path)?;
        self.import_snapshot(&encoded)
    }

    /// Coverage of the whole surface in the configured finish.
    pub fn coverage(&self) -> CoverageReport {
        inspect::evaluate(&self.field, &self.coat, self.config.appearance.finish)
    }

    pub fn geometry(&self) -> &SurfaceGeometry {
        &self.geometry
    }

    pub fn coat(&self) -> &CoatParameters {
        &self.coat
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn field(&self) -> &ThicknessField {
        &self.field
    }

    pub fn maps(&self) -> &DerivedMaps {
        &self.maps
    }

    /// Deposit of the last tick or probe.
    pub fn deposit(&self) -> &Texture<f32> {
        self.projector.deposit()
    }

    /// Normalized excess thickness, `None` for surfaces that do not run.
    pub fn runs_greyscale(&self) -> Option<&Texture<f32>> {
        self.flow.as_ref().map(|f| f.greyscale())
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Tears the surface down, handing out the final thickness.
    pub fn release(self) -> ThicknessField {
        info!(
            "Released {}x{} surface after {} ticks",
            self.field.width(),
            self.field.height(),
            self.ticks
        );
        self.field
    }

    #[cfg(test)]
    pub(crate) fn fail_next_tick(&mut self) {
        self.fail_after_deposit = true;
    }

    fn max_alpha(&self) -> f32 {
        if self.config.spray.stop_at_full_opacity {
            self.coat.full_opacity_min_thickness_wet
        } else {
            self.config.spray.max_alpha
        }
    }

    /// Recomputes flow outputs and maps from the field without simulating.
    fn refresh(&mut self) -> Result<()> {
        if let Some(ref mut flow) = self.flow {
            flow.refresh(&self.field);
        }
        self.derive()
    }

    fn derive(&mut self) -> Result<()> {
        self.pipeline.paint_greyscale(self.field.values(), &mut self.paint_greyscale);
        self.paint_normals.generate(&self.paint_greyscale)?;

        let runs_greyscale = match self.flow {
            Some(ref flow) => {
                self.runs_normals.generate(flow.greyscale().as_slice())?;
                Some(flow.greyscale())
            }
            None => None,
        };

        self.pipeline.derive(
            self.field.values(),
            self.paint_normals.normals(),
            self.runs_normals.normals(),
            runs_greyscale,
            &mut self.maps,
        );
        Ok(())
    }
}

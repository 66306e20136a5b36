use cgmath::prelude::*;
use cgmath::{Deg, Matrix4, Point3, Vector2, Vector3};
use crate::config::{CoatParameters, MotionScaling, SprayConfig};
use crate::error::{Error, Result};
use crate::geometry::SurfaceGeometry;
use crate::texture::{clamp01, Texture};
use image::GrayImage;
use rand::{Rng, SeedableRng, XorShiftRng};
use rayon::prelude::*;
use std::f32::INFINITY;

/// Depth as seen from the nozzle, euclidean distance per pixel, `INFINITY`
/// where nothing was hit.
pub type DepthMap = Texture<f32>;

const NEAR_PLANE: f32 = 0.001;
const FAR_PLANE: f32 = 1000.0;
/// Below this angular step between two ticks the cookie is not stretched.
const MIN_MOTION: f32 = 1.0e-5;
/// Image-space distance, in depth pixels, between a texel and the closest
/// sample its depth lookup can return: the 3×3 splat plus rounding.
const DEPTH_SLOPE_PIXELS: f32 = 4.0;
/// Grazing incidence is clamped to this cosine when widening the depth
/// tolerance.
const MIN_INCIDENCE_COS: f32 = 0.1;

/// One tick worth of sprayer state.
#[derive(Debug, Clone, Copy)]
pub struct SprayInput<'a> {
    pub position: Point3<f32>,
    pub forward: Vector3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view of the spray cone.
    pub fov_degrees: f32,
    /// Trigger pressure in `0..=1`.
    pub intensity: f32,
    /// Depth captured from the nozzle, rendered from the surface geometry
    /// if absent.
    pub depth: Option<&'a DepthMap>,
}

impl<'a> SprayInput<'a> {
    pub fn new(position: Point3<f32>, forward: Vector3<f32>) -> Self {
        SprayInput {
            position,
            forward,
            up: Vector3::unit_y(),
            fov_degrees: 30.0,
            intensity: 1.0,
            depth: None,
        }
    }

    fn validate(&self) -> Result<()> {
        let finite = |v: Vector3<f32>| v.x.is_finite() && v.y.is_finite() && v.z.is_finite();

        if !finite(self.position.to_vec()) || !finite(self.forward) || !finite(self.up) {
            return Err(Error::InvalidSpray("non-finite nozzle pose".to_string()));
        }

        if self.forward.magnitude2() == 0.0 {
            return Err(Error::InvalidSpray("forward direction is zero".to_string()));
        }

        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(Error::InvalidSpray(format!(
                "field of view must be within 0..180 degrees, got {}",
                self.fov_degrees
            )));
        }

        if !self.intensity.is_finite() {
            return Err(Error::InvalidSpray("non-finite intensity".to_string()));
        }

        if let Some(depth) = self.depth {
            if depth.is_empty() {
                return Err(Error::InvalidSpray("empty depth map".to_string()));
            }
        }

        Ok(())
    }
}

/// Camera-like transform from world space into the image of the nozzle.
#[derive(Debug, Clone)]
pub struct Projector {
    position: Point3<f32>,
    forward: Vector3<f32>,
    right: Vector3<f32>,
    up: Vector3<f32>,
    view_projection: Matrix4<f32>,
}

impl Projector {
    pub fn new(
        position: Point3<f32>,
        forward: Vector3<f32>,
        up: Vector3<f32>,
        fov_degrees: f32,
        aspect: f32,
    ) -> Self {
        let forward = forward.normalize();
        let mut right = forward.cross(up);
        if right.magnitude2() < 1.0e-12 {
            // Looking along up, any perpendicular will do
            let fallback = if forward.y.abs() < 0.99 {
                Vector3::unit_y()
            } else {
                Vector3::unit_z()
            };
            right = forward.cross(fallback);
        }
        let right = right.normalize();
        let up = right.cross(forward);

        let view = Matrix4::look_at_rh(position, position + forward, up);
        let projection = cgmath::perspective(Deg(fov_degrees), aspect, NEAR_PLANE, FAR_PLANE);

        Projector {
            position,
            forward,
            right,
            up,
            view_projection: projection * view,
        }
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.forward
    }

    /// Normalized image coordinates of `point`, `(0, 0)` being the top left
    /// corner. Points beside the frustum map outside of `0..=1`, points
    /// behind the nozzle yield `None`.
    pub fn project(&self, point: Point3<f32>) -> Option<Vector2<f32>> {
        let clip = self.view_projection * point.to_vec().extend(1.0);
        if !(clip.w > NEAR_PLANE) {
            return None;
        }

        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        Some(Vector2::new(ndc_x * 0.5 + 0.5, 0.5 - ndc_y * 0.5))
    }

    /// Direction of a world-space vector in image coordinates, not normalized.
    pub fn image_direction(&self, world: Vector3<f32>) -> Vector2<f32> {
        Vector2::new(world.dot(self.right), -world.dot(self.up))
    }

    /// Renders the distance of every usable texel facing the nozzle into
    /// `depth`, splatting each into its 3×3 neighbourhood to close holes.
    pub fn capture_depth(&self, geometry: &SurfaceGeometry, depth: &mut DepthMap) {
        depth.fill(INFINITY);
        let (width, height) = (depth.width() as isize, depth.height() as isize);

        for frame in geometry.frames().iter().filter(|f| f.is_usable()) {
            let to_nozzle = self.position - frame.position;
            if frame.normal.dot(to_nozzle) <= 0.0 {
                continue;
            }

            let uv = match self.project(frame.position) {
                Some(uv) if uv.x >= 0.0 && uv.x < 1.0 && uv.y >= 0.0 && uv.y < 1.0 => uv,
                _ => continue,
            };

            let px = (uv.x * width as f32) as isize;
            let py = (uv.y * height as f32) as isize;
            let distance = to_nozzle.magnitude();

            for y in (py - 1).max(0)..(py + 2).min(height) {
                for x in (px - 1).max(0)..(px + 2).min(width) {
                    let texel = depth.get_mut(x as usize, y as usize);
                    if distance < *texel {
                        *texel = distance;
                    }
                }
            }
        }
    }
}

/// Footprint of a single spray deposit.
///
/// `extent` is the size of the cookie image relative to the projector's
/// frustum, larger than one after motion stretching.
#[derive(Debug, Clone)]
pub struct Cookie {
    texture: Texture<f32>,
    extent: Vector2<f32>,
}

impl Cookie {
    pub fn from_texture(texture: Texture<f32>) -> Self {
        Cookie {
            texture,
            extent: Vector2::new(1.0, 1.0),
        }
    }

    pub fn from_luma(image: &GrayImage) -> Result<Self> {
        Ok(Cookie::from_texture(Texture::from_luma(image)?))
    }

    /// Soft disc touching the image borders, full intensity up to `hardness`
    /// times its radius, with a deterministic droplet speckle.
    pub fn radial(size: usize, hardness: f32, seed: u32) -> Result<Self> {
        let mut texture = Texture::filled("cookie", size, size, 0.0)?;
        let mut rng: XorShiftRng =
            SeedableRng::from_seed([seed, seed ^ 0x9e37_79b9, 0x243f_6a88, 0xb7e1_5162]);
        let hardness = clamp01(hardness);

        for y in 0..size {
            for x in 0..size {
                let dx = (x as f32 + 0.5) / size as f32 - 0.5;
                let dy = (y as f32 + 0.5) / size as f32 - 0.5;
                let r = (dx * dx + dy * dy).sqrt() * 2.0;
                let speckle = 0.8 + 0.2 * rng.gen::<f32>();

                let falloff = if r <= hardness {
                    1.0
                } else if r < 1.0 {
                    let t = (r - hardness) / (1.0 - hardness);
                    1.0 - t * t * (3.0 - 2.0 * t)
                } else {
                    0.0
                };

                *texture.get_mut(x, y) = falloff * speckle;
            }
        }

        Ok(Cookie::from_texture(texture))
    }

    pub fn texture(&self) -> &Texture<f32> {
        &self.texture
    }

    pub fn extent(&self) -> Vector2<f32> {
        self.extent
    }

    /// Cookie intensity at normalized frustum coordinates.
    pub fn sample(&self, uv: Vector2<f32>) -> f32 {
        let u = (uv.x - 0.5) / self.extent.x + 0.5;
        let v = (uv.y - 0.5) / self.extent.y + 0.5;
        self.texture.sample(u, v)
    }

    /// A newly allocated cookie stretched by `scale` along the unit image
    /// direction `direction`. Intensity is divided by `scale` so that the
    /// stretched footprint carries the same amount of paint.
    pub fn stretched(&self, direction: Vector2<f32>, scale: f32) -> Result<Cookie> {
        let extent = Vector2::new(
            self.extent.x * (1.0 + (scale - 1.0) * direction.x.abs()),
            self.extent.y * (1.0 + (scale - 1.0) * direction.y.abs()),
        );
        let width = (self.texture.width() as f32 * extent.x / self.extent.x).ceil() as usize;
        let height = (self.texture.height() as f32 * extent.y / self.extent.y).ceil() as usize;
        let mut texture = Texture::filled("stretched cookie", width, height, 0.0)?;

        for y in 0..height {
            for x in 0..width {
                // Frustum coordinates of the texel center, relative to the center
                let offset = Vector2::new(
                    ((x as f32 + 0.5) / width as f32 - 0.5) * extent.x,
                    ((y as f32 + 0.5) / height as f32 - 0.5) * extent.y,
                );
                let along = offset.dot(direction);
                let across = offset - direction * along;
                let source = Vector2::new(0.5, 0.5) + across + direction * (along / scale);

                *texture.get_mut(x, y) = self.sample(source) / scale;
            }
        }

        Ok(Cookie { texture, extent })
    }
}

/// Derives per-tick cookie stretching from the angular motion of the nozzle.
#[derive(Debug, Clone)]
pub struct CookieScaler {
    settings: MotionScaling,
    last_forward: Option<Vector3<f32>>,
}

impl CookieScaler {
    pub fn new(settings: MotionScaling) -> Self {
        CookieScaler {
            settings,
            last_forward: None,
        }
    }

    /// Stretch for the current tick as unit image direction and scale,
    /// `None` if the nozzle did not turn noticeably.
    pub fn stretch(&self, projector: &Projector) -> Option<(Vector2<f32>, f32)> {
        let last = self.last_forward?;
        let forward = projector.forward();
        let angle = forward.dot(last).max(-1.0).min(1.0).acos();
        if !(angle > MIN_MOTION) {
            return None;
        }

        let direction = projector.image_direction(forward - last);
        if direction.magnitude2() == 0.0 {
            return None;
        }

        let scale = 1.0 + (self.settings.gain * angle).min(self.settings.max_increase).max(0.0);
        Some((direction.normalize(), scale))
    }

    pub fn track(&mut self, projector: &Projector) {
        self.last_forward = Some(projector.forward());
    }

    pub fn reset(&mut self) {
        self.last_forward = None;
    }
}

/// Summary of one projected footprint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Projection {
    /// Texels receiving a non-zero deposit.
    pub covered_texels: usize,
    /// Sum of the deposit over all texels.
    pub total: f64,
    /// Stretch applied to the cookie, `1.0` if none.
    pub stretch: f32,
}

/// Projects the spray cookie onto the surface, producing the deposit of the
/// current tick. The thickness field itself is never touched.
pub struct CookieProjector {
    cookie: Cookie,
    scaler: Option<CookieScaler>,
    deposit: Texture<f32>,
    depth: DepthMap,
    deposit_rate: f32,
    depth_bias: f32,
}

impl CookieProjector {
    pub fn new(width: usize, height: usize, cookie: Cookie, spray: &SprayConfig) -> Result<Self> {
        Ok(CookieProjector {
            cookie,
            scaler: spray.motion_scaling.map(CookieScaler::new),
            deposit: Texture::filled("deposit", width, height, 0.0)?,
            depth: Texture::filled(
                "captured depth",
                spray.cookie_size.max(1),
                spray.cookie_size.max(1),
                INFINITY,
            )?,
            deposit_rate: spray.deposit_rate,
            depth_bias: spray.depth_bias,
        })
    }

    pub fn cookie(&self) -> &Cookie {
        &self.cookie
    }

    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.cookie = cookie;
    }

    /// Deposit written by the last call to `project`.
    pub fn deposit(&self) -> &Texture<f32> {
        &self.deposit
    }

    /// Forgets the nozzle motion, e.g. after a reset.
    pub fn reset(&mut self) {
        if let Some(ref mut scaler) = self.scaler {
            scaler.reset();
        }
        self.deposit.fill(0.0);
    }

    /// Computes the deposit of `input` on `geometry`.
    ///
    /// With `track_motion` the nozzle orientation is remembered for motion
    /// stretching in the next tick; probes pass `false` to leave no trace.
    pub fn project(
        &mut self,
        geometry: &SurfaceGeometry,
        coat: &CoatParameters,
        input: &SprayInput,
        track_motion: bool,
    ) -> Result<Projection> {
        input.validate()?;

        if geometry.width() != self.deposit.width() || geometry.height() != self.deposit.height() {
            return Err(Error::SizeMismatch {
                what: "geometry",
                expected_width: self.deposit.width(),
                expected_height: self.deposit.height(),
                actual_width: geometry.width(),
                actual_height: geometry.height(),
            });
        }

        let aspect = match input.depth {
            Some(depth) => depth.width() as f32 / depth.height() as f32,
            None => self.depth.width() as f32 / self.depth.height() as f32,
        };
        let projector = Projector::new(
            input.position,
            input.forward,
            input.up,
            input.fov_degrees,
            aspect,
        );

        let stretched = match self.scaler.as_ref().and_then(|s| s.stretch(&projector)) {
            Some((direction, scale)) => Some((self.cookie.stretched(direction, scale)?, scale)),
            None => None,
        };
        if track_motion {
            if let Some(ref mut scaler) = self.scaler {
                scaler.track(&projector);
            }
        }

        let depth = match input.depth {
            Some(depth) => depth,
            None => {
                projector.capture_depth(geometry, &mut self.depth);
                &self.depth
            }
        };

        let (cookie, stretch) = match stretched {
            Some((ref cookie, scale)) => (cookie, scale),
            None => (&self.cookie, 1.0),
        };

        let strength = clamp01(input.intensity) * self.deposit_rate;
        let (min_distance, max_distance) = (coat.min_spray_distance, coat.max_spray_distance);
        let depth_bias = self.depth_bias;
        // Angle covered by one depth pixel at the image center, where pixels are widest
        let pixel_angle =
            2.0 * (input.fov_degrees.to_radians() * 0.5).tan() / depth.height() as f32;
        let width = geometry.width();
        let frames = geometry.frames();

        self.deposit
            .as_mut_slice()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let frame = &frames[y * width + x];
                    *out = 0.0;

                    if strength == 0.0 || !frame.is_usable() {
                        continue;
                    }

                    let to_nozzle = projector.position() - frame.position;
                    let facing = frame.normal.dot(to_nozzle);
                    if facing <= 0.0 {
                        continue;
                    }

                    let distance = to_nozzle.magnitude();
                    if distance < min_distance || distance > max_distance {
                        continue;
                    }

                    let uv = match projector.project(frame.position) {
                        Some(uv) => uv,
                        None => continue,
                    };

                    if let Some(visible) = depth.sample_nearest(uv.x, uv.y) {
                        // Neighbours on a slanted surface sit closer to the nozzle
                        // than the texel itself, so the tolerance grows with the slope
                        let cos_incidence = facing / (frame.normal.magnitude() * distance);
                        let slope = distance * pixel_angle * DEPTH_SLOPE_PIXELS
                            / cos_incidence.max(MIN_INCIDENCE_COS);
                        if distance > visible + depth_bias + slope {
                            continue;
                        }
                    }

                    let attenuation = (max_distance - distance) / (max_distance - min_distance);
                    let amount = cookie.sample(uv) * attenuation * strength;
                    if amount.is_finite() && amount > 0.0 {
                        *out = amount;
                    }
                }
            });

        let projection = Projection {
            covered_texels: self.deposit.as_slice().iter().filter(|&&v| v > 0.0).count(),
            total: self.deposit.sum(),
            stretch,
        };
        trace!(
            "Projected cookie onto {} texels, total deposit {:.4}, stretch {:.2}",
            projection.covered_texels,
            projection.total,
            projection.stretch
        );

        Ok(projection)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::CoatParametersBuilder;

    /// 1x1 m wall in the z = 0 plane facing -z, y pointing down in texels.
    fn wall(resolution: usize) -> SurfaceGeometry {
        SurfaceGeometry::plane(
            resolution,
            resolution,
            Point3::new(-0.5, 0.5, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
        ).unwrap()
    }

    fn projector(resolution: usize, spray: &SprayConfig) -> CookieProjector {
        let cookie = Cookie::radial(32, 0.5, 7).unwrap();
        CookieProjector::new(resolution, resolution, cookie, spray).unwrap()
    }

    fn spray_from(distance: f32) -> SprayInput<'static> {
        let mut input = SprayInput::new(Point3::new(0.0, 0.0, -distance), Vector3::unit_z());
        input.fov_degrees = 60.0;
        input
    }

    fn coat() -> CoatParameters {
        CoatParametersBuilder::new().spray_distance(0.1, 0.5).build().unwrap()
    }

    #[test]
    fn test_projector_center_maps_to_image_center() {
        let projector = Projector::new(
            Point3::new(0.0, 0.0, -1.0),
            Vector3::unit_z(),
            Vector3::unit_y(),
            60.0,
            1.0,
        );
        let uv = projector.project(Point3::new(0.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(uv, Vector2::new(0.5, 0.5), epsilon = 1e-5);

        // Up in the world is up in the image
        let above = projector.project(Point3::new(0.0, 0.1, 0.0)).unwrap();
        assert!(above.y < 0.5);

        assert!(projector.project(Point3::new(0.0, 0.0, -2.0)).is_none());
    }

    #[test]
    fn test_radial_cookie_is_deterministic() {
        let a = Cookie::radial(16, 0.5, 3).unwrap();
        let b = Cookie::radial(16, 0.5, 3).unwrap();
        assert_eq!(a.texture(), b.texture());
        assert!(a.sample(Vector2::new(0.5, 0.5)) > 0.7);
        assert_eq!(a.sample(Vector2::new(0.02, 0.02)), 0.0);
    }

    #[test]
    fn test_deposit_centered_in_front_of_nozzle() {
        let geometry = wall(32);
        let mut projector = projector(32, &SprayConfig::default());

        let projection = projector.project(&geometry, &coat(), &spray_from(0.2), true).unwrap();
        let deposit = projector.deposit();

        assert!(projection.covered_texels > 0);
        assert!(*deposit.get(16, 16) > 0.0);
        assert_eq!(*deposit.get(0, 0), 0.0);
        assert_eq!(projection.stretch, 1.0);
    }

    #[test]
    fn test_out_of_range_nozzle_deposits_nothing() {
        let geometry = wall(16);
        let mut projector = projector(16, &SprayConfig::default());

        for &distance in [0.05, 0.6, 3.0].iter() {
            let projection = projector
                .project(&geometry, &coat(), &spray_from(distance), true)
                .unwrap();
            assert_eq!(projection.covered_texels, 0);
            assert_eq!(projection.total, 0.0);
        }
    }

    #[test]
    fn test_closer_spray_deposits_more() {
        let geometry = wall(32);
        let mut projector = projector(32, &SprayConfig::default());
        let coat = coat();

        projector.project(&geometry, &coat, &spray_from(0.15), true).unwrap();
        let near = *projector.deposit().get(16, 16);
        projector.project(&geometry, &coat, &spray_from(0.4), true).unwrap();
        let far = *projector.deposit().get(16, 16);

        assert!(near > far);
    }

    #[test]
    fn test_back_side_receives_nothing() {
        let geometry = wall(16);
        let mut projector = projector(16, &SprayConfig::default());
        let input = SprayInput::new(Point3::new(0.0, 0.0, 0.2), -Vector3::unit_z());

        let projection = projector.project(&geometry, &coat(), &input, true).unwrap();
        assert_eq!(projection.covered_texels, 0);
    }

    #[test]
    fn test_occluded_texels_receive_nothing() {
        let geometry = wall(16);
        let mut projector = projector(16, &SprayConfig::default());
        // Something sits right in front of the nozzle
        let depth = Texture::filled("depth", 8, 8, 0.02).unwrap();
        let mut input = spray_from(0.2);
        input.depth = Some(&depth);

        let projection = projector.project(&geometry, &coat(), &input, true).unwrap();
        assert_eq!(projection.covered_texels, 0);
    }

    /// Square panel of edge `size` centered at the origin, its normal tilted
    /// `degrees` away from the -z axis towards -y.
    fn tilted_panel(resolution: usize, size: f32, degrees: f32) -> SurfaceGeometry {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let u = Vector3::new(size, 0.0, 0.0);
        let v = Vector3::new(0.0, -cos, sin) * size;
        let origin = Point3::new(0.0, 0.0, 0.0) - u * 0.5 - v * 0.5;
        SurfaceGeometry::plane(resolution, resolution, origin, u, v).unwrap()
    }

    #[test]
    fn test_slanted_panel_does_not_occlude_itself() {
        let coat = CoatParametersBuilder::new().spray_distance(0.1, 1.5).build().unwrap();
        let open = Texture::filled("open depth", 64, 64, INFINITY).unwrap();
        let cases = [(64, 0.5, 60.0, 0.3, 60.0), (128, 1.0, 70.0, 0.7, 30.0)];

        for &(resolution, size, degrees, distance, fov) in cases.iter() {
            let geometry = tilted_panel(resolution, size, degrees);
            let mut projector = projector(resolution, &SprayConfig::default());
            let mut input = SprayInput::new(Point3::new(0.0, 0.0, -distance), Vector3::unit_z());
            input.fov_degrees = fov;

            let captured = projector.project(&geometry, &coat, &input, false).unwrap();
            input.depth = Some(&open);
            let unblocked = projector.project(&geometry, &coat, &input, false).unwrap();

            assert!(unblocked.covered_texels > 0);
            assert_eq!(captured.covered_texels, unblocked.covered_texels);
            assert_relative_eq!(captured.total, unblocked.total);
        }
    }

    #[test]
    fn test_fast_motion_stretches_cookie_and_keeps_volume() {
        let geometry = wall(64);
        let mut spray = SprayConfig::default();
        spray.motion_scaling = Some(MotionScaling { gain: 10.0, max_increase: 1.0 });
        let mut projector = projector(64, &spray);
        let coat = coat();

        let still = projector.project(&geometry, &coat, &spray_from(0.2), true).unwrap();
        let mut turned = spray_from(0.2);
        turned.forward = Vector3::new(0.05, 0.0, 1.0).normalize();
        let moving = projector.project(&geometry, &coat, &turned, true).unwrap();

        assert!(moving.stretch > 1.0 && moving.stretch <= 2.0);
        assert!(moving.covered_texels > still.covered_texels);
        assert_relative_eq!(moving.total, still.total, max_relative = 0.25);
    }

    #[test]
    fn test_stretched_cookie_grows_along_motion() {
        let cookie = Cookie::radial(16, 0.5, 1).unwrap();
        let stretched = cookie.stretched(Vector2::new(1.0, 0.0), 2.0).unwrap();

        assert_eq!(stretched.texture().width(), 32);
        assert_eq!(stretched.texture().height(), 16);
        assert_relative_eq!(stretched.extent(), Vector2::new(2.0, 1.0));
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let geometry = wall(8);
        let mut projector = projector(8, &SprayConfig::default());
        let mut input = spray_from(0.2);
        input.fov_degrees = 0.0;
        assert!(projector.project(&geometry, &coat(), &input, true).is_err());

        let mut input = spray_from(0.2);
        input.forward = Vector3::new(0.0, 0.0, 0.0);
        assert!(projector.project(&geometry, &coat(), &input, true).is_err());
    }
}

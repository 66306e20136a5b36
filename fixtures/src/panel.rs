use cgmath::{Point3, Vector3};
use sim::{CoatParameters, CoatParametersBuilder, Config, SprayInput, Surface, SurfaceGeometry};

/// Texels per side of the fixture panels.
pub const RESOLUTION: usize = 32;

/// Upright 1x1 m panel in the z = 0 plane, facing a nozzle at negative z.
/// Texel `y` grows downwards, so paint runs towards higher rows.
pub fn wall_geometry() -> SurfaceGeometry {
    SurfaceGeometry::plane(
        RESOLUTION,
        RESOLUTION,
        Point3::new(-0.5, 0.5, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, -1.0, 0.0),
    ).unwrap()
}

/// Level 1x1 m panel in the y = 0 plane facing up, paint never runs on it.
pub fn floor_geometry() -> SurfaceGeometry {
    SurfaceGeometry::plane(
        RESOLUTION,
        RESOLUTION,
        Point3::new(-0.5, 0.0, 0.5),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
    ).unwrap()
}

/// A runny red coat sprayable between 10 and 50 cm.
pub fn make_coat() -> CoatParameters {
    CoatParametersBuilder::new()
        .viscosity(0.5)
        .spray_distance(0.1, 0.5)
        .min_flow_thickness(0.3)
        .color([0.8, 0.1, 0.1, 1.0])
        .build()
        .unwrap()
}

pub fn make_wall() -> Surface {
    Surface::new(wall_geometry(), make_coat(), Config::default()).unwrap()
}

pub fn make_floor() -> Surface {
    Surface::new(floor_geometry(), make_coat(), Config::default()).unwrap()
}

/// Nozzle `distance` metres in front of the wall center, aiming at it.
pub fn spray_at_wall(distance: f32) -> SprayInput<'static> {
    let mut input = SprayInput::new(Point3::new(0.0, 0.0, -distance), Vector3::unit_z());
    input.fov_degrees = 60.0;
    input
}

/// Nozzle `distance` metres above the floor center, aiming down.
pub fn spray_at_floor(distance: f32) -> SprayInput<'static> {
    let mut input = SprayInput::new(Point3::new(0.0, distance, 0.0), -Vector3::unit_y());
    input.up = Vector3::unit_z();
    input.fov_degrees = 60.0;
    input
}

/// Sweeps the nozzle across the wall from left to right over `ticks` ticks.
pub fn sweep_wall(surface: &mut Surface, distance: f32, ticks: usize) {
    for i in 0..ticks {
        let t = i as f32 / (ticks.max(2) - 1) as f32;
        let mut input = spray_at_wall(distance);
        input.position.x = -0.4 + 0.8 * t;
        surface.tick(Some(&input)).unwrap();
    }
}

extern crate fixtures;
extern crate spraycoat_sim as sim;
#[macro_use]
extern crate approx;

use fixtures::panel::{
    floor_geometry, make_coat, make_floor, make_wall, spray_at_floor, spray_at_wall, wall_geometry,
    RESOLUTION,
};
use sim::{CoatParametersBuilder, Config, Surface};

fn without_runs() -> Config {
    let mut config = Config::default();
    config.flow = None;
    config
}

/// Thickness summed over the rows below the horizontal center line.
fn lower_mass(surface: &Surface) -> f64 {
    surface.field().values()[RESOLUTION * RESOLUTION / 2..]
        .iter()
        .map(|&h| h as f64)
        .sum()
}

#[test]
fn paint_runs_down_the_wall() {
    let mut running = Surface::new(wall_geometry(), make_coat(), Config::default()).unwrap();
    let mut still = Surface::new(wall_geometry(), make_coat(), without_runs()).unwrap();
    let mut leaked = 0.0;

    for _ in 0..40 {
        let report = running.tick(Some(&spray_at_wall(0.2))).unwrap();
        leaked += report.flow.unwrap().leaked;
        still.tick(Some(&spray_at_wall(0.2))).unwrap();
    }
    for _ in 0..40 {
        leaked += running.tick(None).unwrap().flow.unwrap().leaked;
        still.tick(None).unwrap();
    }

    assert!(lower_mass(&running) > lower_mass(&still));
    assert_relative_eq!(
        running.field().mass() + leaked,
        still.field().mass(),
        epsilon = 1.0e-3
    );

    let runs = running.runs_greyscale().unwrap();
    assert!(runs.as_slice().iter().any(|&g| g > 0.0));
    assert!(still.runs_greyscale().is_none());
}

#[test]
fn paint_on_the_floor_stays_put() {
    let mut running = make_floor();
    let mut still = Surface::new(floor_geometry(), make_coat(), without_runs()).unwrap();

    for _ in 0..40 {
        let report = running.tick(Some(&spray_at_floor(0.2))).unwrap();
        assert_eq!(report.flow.unwrap().moved, 0.0);
        still.tick(Some(&spray_at_floor(0.2))).unwrap();
    }

    assert!(running.field().mass() > 0.0);
    assert_eq!(running.field().values(), still.field().values());
}

#[test]
fn thin_coats_do_not_run() {
    let mut surface = Surface::new(wall_geometry(), make_coat(), Config::default()).unwrap();
    surface.tick(Some(&spray_at_wall(0.45))).unwrap();

    let runs = surface.runs_greyscale().unwrap();
    assert!(surface.field().mass() > 0.0);
    assert!(runs.as_slice().iter().all(|&g| g == 0.0));
}

#[test]
fn runs_slow_down_over_time() {
    let mut surface = Surface::new(wall_geometry(), make_coat(), Config::default()).unwrap();
    for _ in 0..40 {
        surface.tick(Some(&spray_at_wall(0.2))).unwrap();
    }

    let first = surface.tick(None).unwrap().flow.unwrap().moved;
    let mut last = first;
    for _ in 0..200 {
        let moved = surface.tick(None).unwrap().flow.unwrap().moved;
        assert!(moved <= last + 1.0e-4);
        last = moved;
    }

    assert!(first > 0.0);
    assert!(last < first);
}

#[test]
fn runs_stop_when_the_coat_stiffens() {
    let mut surface = make_wall();
    for _ in 0..40 {
        surface.tick(Some(&spray_at_wall(0.2))).unwrap();
    }
    assert!(surface.tick(None).unwrap().flow.unwrap().moved > 0.0);

    let stiff = CoatParametersBuilder::new()
        .viscosity(0.0)
        .spray_distance(0.1, 0.5)
        .min_flow_thickness(0.3)
        .build()
        .unwrap();
    surface.set_coat(stiff).unwrap();
    let before = surface.field().values().to_vec();

    for _ in 0..10 {
        assert_eq!(surface.tick(None).unwrap().flow.unwrap().moved, 0.0);
    }
    assert_eq!(surface.field().values(), &before[..]);
}

#[test]
fn raising_the_run_threshold_clears_the_runs_greyscale() {
    let mut surface = make_wall();
    for _ in 0..40 {
        surface.tick(Some(&spray_at_wall(0.2))).unwrap();
    }
    assert!(surface.runs_greyscale().unwrap().as_slice().iter().any(|&g| g > 0.0));

    let thick = CoatParametersBuilder::new()
        .viscosity(0.5)
        .spray_distance(0.1, 0.5)
        .min_flow_thickness(5.0)
        .build()
        .unwrap();
    let before = surface.field().values().to_vec();
    surface.set_coat(thick).unwrap();

    assert!(surface.runs_greyscale().unwrap().as_slice().iter().all(|&g| g == 0.0));
    assert_eq!(surface.field().values(), &before[..]);
}

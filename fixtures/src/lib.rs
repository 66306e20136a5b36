/// Contains functionality to create representative test surfaces.
///
/// Provides shared functionality for integration tests.
extern crate cgmath;
extern crate spraycoat_sim as sim;

pub mod panel;

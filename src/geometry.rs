use cgmath::prelude::*;
use cgmath::{Point3, Vector3};
use crate::error::{Error, Result};

/// World-space frame of one texel of the paintable surface.
///
/// The tangent points along increasing texel `x`, the bitangent along
/// increasing texel `y`. Both are expected to lie in the tangential plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexelFrame {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub tangent: Vector3<f32>,
    pub bitangent: Vector3<f32>,
    /// Texels outside of the UV islands of the mesh are invalid and never
    /// receive or exchange paint.
    pub valid: bool,
}

impl TexelFrame {
    pub fn invalid() -> Self {
        TexelFrame {
            position: Point3::new(0.0, 0.0, 0.0),
            normal: Vector3::zero(),
            tangent: Vector3::zero(),
            bitangent: Vector3::zero(),
            valid: false,
        }
    }

    /// A frame is usable if it is valid and all of its vectors are finite.
    pub fn is_usable(&self) -> bool {
        self.valid
            && finite3(self.position.to_vec())
            && finite3(self.normal)
            && finite3(self.tangent)
            && finite3(self.bitangent)
    }
}

/// Texture-space layout of a paintable surface, the baked equivalent of a
/// mesh rendered into its own UV space.
#[derive(Debug, Clone)]
pub struct SurfaceGeometry {
    width: usize,
    height: usize,
    frames: Vec<TexelFrame>,
}

impl SurfaceGeometry {
    pub fn from_frames(width: usize, height: usize, frames: Vec<TexelFrame>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptySurface);
        }

        if frames.len() != width * height {
            return Err(Error::SizeMismatch {
                what: "texel frames",
                expected_width: width,
                expected_height: height,
                actual_width: frames.len(),
                actual_height: 1,
            });
        }

        let degenerate = frames.iter().filter(|f| f.valid && !f.is_usable()).count();
        if degenerate > 0 {
            warn!(
                "{} texel frames contain non-finite vectors and take no part in painting",
                degenerate
            );
        }

        Ok(SurfaceGeometry { width, height, frames })
    }

    /// A rectangular card spanning `origin + s * u_extent + t * v_extent` for
    /// `s, t` in `0..1`, sampled at texel centers.
    ///
    /// The normal is `u_extent × v_extent`, so a card with `u` pointing along +x
    /// and `v` pointing down faces -z.
    pub fn plane(
        width: usize,
        height: usize,
        origin: Point3<f32>,
        u_extent: Vector3<f32>,
        v_extent: Vector3<f32>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptySurface);
        }

        let normal = u_extent.cross(v_extent).normalize();
        let tangent = u_extent.normalize();
        let bitangent = v_extent.normalize();

        let frames = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| {
                let s = (x as f32 + 0.5) / width as f32;
                let t = (y as f32 + 0.5) / height as f32;
                TexelFrame {
                    position: origin + u_extent * s + v_extent * t,
                    normal,
                    tangent,
                    bitangent,
                    valid: true,
                }
            })
            .collect();

        SurfaceGeometry::from_frames(width, height, frames)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn frames(&self) -> &[TexelFrame] {
        &self.frames
    }

    pub fn frame(&self, x: usize, y: usize) -> &TexelFrame {
        &self.frames[y * self.width + x]
    }

    /// Marks every texel for which `keep` returns false as invalid, e.g. to
    /// cut out UV seams or holes.
    pub fn mask<F>(mut self, keep: F) -> Self
    where
        F: Fn(usize, usize) -> bool,
    {
        let width = self.width;
        for (idx, frame) in self.frames.iter_mut().enumerate() {
            if !keep(idx % width, idx / width) {
                frame.valid = false;
            }
        }
        self
    }
}

fn finite3(v: Vector3<f32>) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_plane_frames() {
        let geometry = SurfaceGeometry::plane(
            4,
            2,
            Point3::new(0.0, 1.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
        ).unwrap();

        let frame = geometry.frame(0, 0);
        assert_relative_eq!(frame.position, Point3::new(0.25, 0.75, 0.0));
        assert_relative_eq!(frame.normal, Vector3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(frame.tangent, Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(frame.bitangent, Vector3::new(0.0, -1.0, 0.0));

        let frame = geometry.frame(3, 1);
        assert_relative_eq!(frame.position, Point3::new(1.75, 0.25, 0.0));
    }

    #[test]
    fn test_mask_invalidates_texels() {
        let geometry = SurfaceGeometry::plane(
            3,
            3,
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_x(),
            Vector3::unit_z(),
        ).unwrap()
            .mask(|x, y| x != 1 || y != 1);

        assert!(!geometry.frame(1, 1).valid);
        assert_eq!(geometry.frames().iter().filter(|f| f.valid).count(), 8);
    }

    #[test]
    fn test_degenerate_frames_are_not_usable() {
        let mut frame = TexelFrame {
            position: Point3::new(0.0, 0.0, 0.0),
            normal: Vector3::unit_y(),
            tangent: Vector3::unit_x(),
            bitangent: Vector3::unit_z(),
            valid: true,
        };
        assert!(frame.is_usable());

        frame.normal.y = ::std::f32::NAN;
        assert!(!frame.is_usable());
        assert!(!TexelFrame::invalid().is_usable());
    }
}

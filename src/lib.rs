#[cfg(test)]
#[macro_use]
extern crate approx;
extern crate cgmath;
extern crate image;
extern crate rand;
extern crate rayon;
extern crate thiserror;
#[macro_use]
extern crate log;

mod config;
mod cookie;
mod error;
mod field;
mod filter;
mod flow;
mod geometry;
mod inspect;
mod maps;
mod normal;
mod surface;
mod texture;

pub use config::{
    AppearanceConfig, BlurSettings, CoatParameters, CoatParametersBuilder, Config, Finish,
    FlowConfig, MotionScaling, NormalMapSettings, SprayConfig,
};
pub use cookie::{
    Cookie, CookieProjector, CookieScaler, DepthMap, Projection, Projector, SprayInput,
};
pub use error::{Error, Result};
pub use field::{PingPong, ThicknessField};
pub use filter::{gaussian_blur, sobel_normals, Channels};
pub use flow::{FlowReport, FlowSimulator};
pub use geometry::{SurfaceGeometry, TexelFrame};
pub use inspect::{evaluate, CoverageReport, ProbeReading};
pub use maps::{gloss_curve, opacity, DerivedMaps, MapDerivationPipeline};
pub use normal::{decode_normal, encode_normal, NormalMapGenerator, NEUTRAL_NORMAL};
pub use surface::{Surface, TickReport};
pub use texture::{Rgba8, Texture};

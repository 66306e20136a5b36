mod coat;
mod settings;

pub use self::coat::{CoatParameters, CoatParametersBuilder, Finish};
pub use self::settings::{
    AppearanceConfig, BlurSettings, Config, FlowConfig, MotionScaling, NormalMapSettings,
    SprayConfig,
};

#[macro_use]
extern crate tracing;

mod app;
pub mod batch;
pub mod dumper;
mod errors;
mod logging;
pub mod transform;

pub use app::App;
pub use batch::BatchAccumulator;
pub use dumper::{
    Dumper,
    DumperError,
    PipelineStats,
};
pub use errors::init_errors;
pub use logging::init_logging;
pub use statistics_dumper_config::{
    Args,
    Config,
};
pub use transform::PointTransformer;

//! Writing derived statistics rows into InfluxDB.

#[macro_use]
extern crate tracing;

pub mod client;
pub mod error;
pub mod line_protocol;
pub mod point;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod writer;

pub use client::{
    InfluxClient,
    SeriesStore,
};
pub use error::{
    SchemaSetupError,
    StoreError,
    WriteError,
};
pub use point::{
    Batch,
    DerivedPoint,
    Fields,
    Tags,
};
pub use writer::{
    RetentionPolicy,
    StoreWriter,
};

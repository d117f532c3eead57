pub mod client;
pub mod models;
pub mod source;

pub use client::DataloaderClient;
pub use models::{DataPoint, ResultId, SamplingFeature, SeriesMetadata};
pub use source::DataSource;

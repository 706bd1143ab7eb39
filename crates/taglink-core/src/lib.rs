pub mod constants;
pub mod error;
pub mod normalize;
pub mod types;

pub use error::{Error, Result};
pub use normalize::{MalformedReading, NormalizerConfig, TimestampUnit, normalize, normalize_batch};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Configuration descriptors for Resound.
//!
//! - [`StreamingDesc`]: buffer ring size and streaming-thread timing
//! - [`SpatialDesc`]: distance/doppler scaling and output speaker layout
//! - [`LimiterSettings`]: validated mastering limiter parameters

mod limiter;
mod spatial_desc;
mod streaming_desc;

pub use limiter::LimiterSettings;
pub use spatial_desc::SpatialDesc;
pub use streaming_desc::StreamingDesc;

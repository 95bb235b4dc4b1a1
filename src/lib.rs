//! # framewire
//!
//! Streaming frame extraction for telemetry byte streams.
//!
//! Bytes arrive from a serial port, socket or file in arbitrary chunks.
//! framewire buffers them per connection, cuts them into frames by
//! delimiter, verifies an optional checksum trailer and runs a
//! user-supplied transform over every frame on a bounded worker pool.
//!
//! ## Architecture
//!
//! - **Buffer** ([`buffer`]): fixed-capacity ring buffer that overwrites
//!   the oldest bytes on overflow, with KMP search across the wrap point
//! - **Frames** ([`frame`]): delimiter-driven extraction in four detection
//!   modes, checksum verification per frame
//! - **Workers** ([`pool`]): bounded pool running a [`transform::Transform`]
//!   on blocking threads, failures isolated per frame
//! - **Pipeline** ([`pipeline`]): connections, backpressure and events
//!
//! ## Example
//!
//! ```
//! use framewire::frame::FrameDetectionConfig;
//! use framewire::pipeline::{ConnectionId, Pipeline, PipelineEvent};
//!
//! #[tokio::main]
//! async fn main() -> framewire::Result<()> {
//!     let pipeline = Pipeline::builder()
//!         .detection(FrameDetectionConfig::quick_plot())
//!         .max_workers(2)
//!         .build()?;
//!     let mut events = pipeline.subscribe();
//!
//!     let port = ConnectionId(0);
//!     pipeline.open(port)?;
//!     pipeline.feed(port, b"21.5,40\r\n")?;
//!
//!     if let Some(PipelineEvent::Dataset { values, .. }) = events.recv().await {
//!         println!("{values:?}");
//!     }
//!
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backpressure;
pub mod buffer;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod pool;
pub mod settings;
pub mod transform;

pub use buffer::RingBuffer;
pub use checksum::ChecksumAlgorithm;
pub use error::{FramewireError, Result};
pub use frame::{Frame, FrameDetection, FrameDetectionConfig, FrameExtractor};
pub use pipeline::{ConnectionId, Pipeline, PipelineBuilder, PipelineEvent, PipelineListener};
pub use pool::{Dataset, PoolConfig, WorkerPool};
pub use transform::{Transform, Value};

//! Pipeline builder.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use super::coordinator::Pipeline;
use super::events::PipelineListener;
use crate::backpressure::DEFAULT_MAX_PENDING;
use crate::buffer::DEFAULT_CAPACITY;
use crate::error::{FramewireError, Result};
use crate::frame::FrameDetectionConfig;
use crate::pool::PoolConfig;
use crate::settings::PipelineSettings;
use crate::transform::{SplitTransform, Transform};

/// Default capacity of each event subscription channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Default time `close` waits for a connection's in-flight frames.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fluent configuration for a [`Pipeline`].
///
/// # Example
///
/// ```
/// use framewire::pipeline::Pipeline;
/// use framewire::frame::FrameDetectionConfig;
/// use framewire::transform::JsonTransform;
///
/// # #[tokio::main]
/// # async fn main() -> framewire::Result<()> {
/// let pipeline = Pipeline::builder()
///     .transform(JsonTransform::new())
///     .detection(FrameDetectionConfig::device_json())
///     .max_workers(4)
///     .buffer_capacity(16 * 1024)
///     .build()?;
///
/// pipeline.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct PipelineBuilder {
    pub(super) transform: Option<Arc<dyn Transform>>,
    pub(super) pool: PoolConfig,
    pub(super) detection: FrameDetectionConfig,
    pub(super) buffer_capacity: usize,
    pub(super) max_pending_frames: usize,
    pub(super) discard_corrupt_frames: bool,
    pub(super) close_timeout: Duration,
    pub(super) event_capacity: usize,
    pub(super) listeners: Vec<Arc<dyn PipelineListener>>,
    pub(super) runtime: Option<Handle>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            transform: None,
            pool: PoolConfig::default(),
            detection: FrameDetectionConfig::default(),
            buffer_capacity: DEFAULT_CAPACITY,
            max_pending_frames: DEFAULT_MAX_PENDING,
            discard_corrupt_frames: false,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            listeners: Vec::new(),
            runtime: None,
        }
    }

    /// Start from persisted settings. Fails fast on invalid settings.
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self> {
        settings.validate()?;

        Ok(Self::new()
            .detection(settings.detection_config()?)
            .pool_config(settings.pool_config()?)
            .buffer_capacity(settings.buffer_capacity)
            .max_pending_frames(settings.max_pending_frames)
            .discard_corrupt_frames(settings.discard_corrupt_frames))
    }

    /// Frame-to-dataset transform. Default: [`SplitTransform::csv`].
    pub fn transform<T: Transform>(mut self, transform: T) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn transform_arc(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool = config;
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.pool.max_workers = max_workers;
        self
    }

    /// Per-frame transform timeout. Default: 5 seconds
    pub fn transform_timeout(mut self, timeout: Duration) -> Self {
        self.pool.transform_timeout = timeout;
        self
    }

    /// Detection config for connections opened with [`Pipeline::open`].
    pub fn detection(mut self, config: FrameDetectionConfig) -> Self {
        self.detection = config;
        self
    }

    /// Ring buffer capacity per connection.
    ///
    /// Default: 8 KiB. Powers of two keep the modulo cheap.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Frames allowed to wait for a worker before new ones are dropped.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.max_pending_frames = limit;
        self
    }

    /// Drop frames whose checksum failed instead of transforming them.
    ///
    /// A checksum warning is published either way. Default: false
    pub fn discard_corrupt_frames(mut self, discard: bool) -> Self {
        self.discard_corrupt_frames = discard;
        self
    }

    /// Default: 5 seconds
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Capacity of each [`Pipeline::subscribe`] channel. Default: 1024
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn listener<L: PipelineListener>(mut self, listener: L) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn listener_arc(mut self, listener: Arc<dyn PipelineListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Runtime used for dispatch tasks. Default: the current runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Validate and build.
    ///
    /// Without an explicit [`runtime`](Self::runtime) this must be called
    /// from inside a Tokio runtime.
    pub fn build(self) -> Result<Pipeline> {
        if self.buffer_capacity == 0 {
            return Err(FramewireError::InvalidSettings(
                "buffer capacity must be greater than zero".into(),
            ));
        }
        self.detection.validate_for_capacity(self.buffer_capacity)?;
        if self.max_pending_frames == 0 {
            return Err(FramewireError::InvalidSettings(
                "max pending frames must be greater than zero".into(),
            ));
        }
        if self.pool.max_workers == 0 {
            return Err(FramewireError::InvalidSettings(
                "max workers must be at least 1".into(),
            ));
        }

        let runtime = match self.runtime.clone() {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                FramewireError::InvalidSettings(
                    "pipeline must be built inside a Tokio runtime or given one".into(),
                )
            })?,
        };

        let transform = self
            .transform
            .clone()
            .unwrap_or_else(|| Arc::new(SplitTransform::csv()));

        Ok(Pipeline::from_parts(self, transform, runtime))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

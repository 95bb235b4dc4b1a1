//! Persisted project settings.
//!
//! [`PipelineSettings`] is the serde shape of the pipeline section of a
//! project file. Every field has a default, so a partial or empty object
//! is valid. Conversion into runtime configuration happens in
//! [`PipelineSettings::detection_config`] and friends, which fail fast on
//! anything the pipeline could not run.
//!
//! # Example
//!
//! ```
//! use framewire::settings::PipelineSettings;
//! use framewire::frame::FrameDetection;
//!
//! let settings = PipelineSettings::from_json(r#"{
//!     "operationMode": "project-file",
//!     "frameDetection": "start-end-delimiter",
//!     "startSequence": "$",
//!     "endSequence": "\\r\\n",
//!     "checksum": "CRC-16"
//! }"#).unwrap();
//!
//! let config = settings.detection_config().unwrap();
//! assert_eq!(config.mode, FrameDetection::StartAndEndDelimiter);
//! assert_eq!(config.end_sequence.as_deref(), Some(&b"\r\n"[..]));
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::backpressure::DEFAULT_MAX_PENDING;
use crate::buffer::DEFAULT_CAPACITY;
use crate::checksum::ChecksumAlgorithm;
use crate::error::{FramewireError, Result};
use crate::frame::{parse_escaped, FrameDetection, FrameDetectionConfig};
use crate::pool::PoolConfig;

/// How the stream is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationMode {
    /// Delimiters and checksum come from the project settings.
    ProjectFile,
    /// Line-oriented CSV.
    #[default]
    QuickPlot,
    /// `/*` ... `*/` wrapped JSON frames.
    DeviceJson,
}

/// Frame detection mode as stored in project files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameDetectionSetting {
    #[default]
    EndDelimiter,
    StartDelimiter,
    StartEndDelimiter,
    NoDelimiters,
}

impl From<FrameDetectionSetting> for FrameDetection {
    fn from(setting: FrameDetectionSetting) -> Self {
        match setting {
            FrameDetectionSetting::EndDelimiter => FrameDetection::EndDelimiterOnly,
            FrameDetectionSetting::StartDelimiter => FrameDetection::StartDelimiterOnly,
            FrameDetectionSetting::StartEndDelimiter => FrameDetection::StartAndEndDelimiter,
            FrameDetectionSetting::NoDelimiters => FrameDetection::NoDelimiters,
        }
    }
}

/// A delimiter written as escaped text or as raw byte values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceSetting {
    Text(String),
    Bytes(Vec<u8>),
}

impl SequenceSetting {
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            SequenceSetting::Text(text) => parse_escaped(text),
            SequenceSetting::Bytes(raw) => Ok(Bytes::copy_from_slice(raw)),
        }
    }
}

impl From<&str> for SequenceSetting {
    fn from(text: &str) -> Self {
        SequenceSetting::Text(text.to_string())
    }
}

/// Pipeline section of a project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    pub operation_mode: OperationMode,
    pub frame_detection: FrameDetectionSetting,
    pub start_sequence: SequenceSetting,
    pub end_sequence: SequenceSetting,
    /// Algorithm name, e.g. `"CRC-16"`. Empty means none.
    pub checksum: String,
    pub fixed_frame_length: Option<usize>,
    pub flush_size: Option<usize>,
    pub max_workers: Option<usize>,
    pub buffer_capacity: usize,
    pub max_pending_frames: usize,
    pub discard_corrupt_frames: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            operation_mode: OperationMode::default(),
            frame_detection: FrameDetectionSetting::default(),
            start_sequence: "$".into(),
            end_sequence: ";".into(),
            checksum: String::new(),
            fixed_frame_length: None,
            flush_size: None,
            max_workers: None,
            buffer_capacity: DEFAULT_CAPACITY,
            max_pending_frames: DEFAULT_MAX_PENDING,
            discard_corrupt_frames: false,
        }
    }
}

impl PipelineSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn checksum_algorithm(&self) -> Result<ChecksumAlgorithm> {
        self.checksum.parse()
    }

    /// Build and validate the frame detection config.
    ///
    /// `checksum`, `fixedFrameLength` and `flushSize` only apply in
    /// project-file mode. The algorithm name is still checked in every mode.
    pub fn detection_config(&self) -> Result<FrameDetectionConfig> {
        let checksum = self.checksum_algorithm()?;

        let mut config = match self.operation_mode {
            OperationMode::QuickPlot => FrameDetectionConfig::quick_plot(),
            OperationMode::DeviceJson => FrameDetectionConfig::device_json(),
            OperationMode::ProjectFile => match self.frame_detection {
                FrameDetectionSetting::EndDelimiter => {
                    FrameDetectionConfig::end_delimited(self.end_sequence.to_bytes()?)
                }
                FrameDetectionSetting::StartDelimiter => {
                    FrameDetectionConfig::start_delimited(self.start_sequence.to_bytes()?)
                }
                FrameDetectionSetting::StartEndDelimiter => FrameDetectionConfig::start_end_delimited(
                    self.start_sequence.to_bytes()?,
                    self.end_sequence.to_bytes()?,
                ),
                FrameDetectionSetting::NoDelimiters => FrameDetectionConfig::no_delimiters(),
            },
        };

        // Presets carry no checksum trailer or fixed length.
        if self.operation_mode == OperationMode::ProjectFile {
            config.checksum = checksum;
            config.fixed_frame_length = self.fixed_frame_length;
            config.flush_size = self.flush_size;
        }
        config.validate()?;

        Ok(config)
    }

    /// Pool config with `maxWorkers` applied over the defaults.
    pub fn pool_config(&self) -> Result<PoolConfig> {
        match self.max_workers {
            Some(0) => Err(FramewireError::InvalidSettings(
                "maxWorkers must be at least 1".into(),
            )),
            Some(n) => Ok(PoolConfig::default().with_max_workers(n)),
            None => Ok(PoolConfig::default()),
        }
    }

    /// Check every field without building anything else.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(FramewireError::InvalidSettings(
                "bufferCapacity must be greater than zero".into(),
            ));
        }
        if self.max_pending_frames == 0 {
            return Err(FramewireError::InvalidSettings(
                "maxPendingFrames must be greater than zero".into(),
            ));
        }
        if !self.buffer_capacity.is_power_of_two() {
            tracing::debug!(
                capacity = self.buffer_capacity,
                "buffer capacity is not a power of two"
            );
        }
        self.detection_config()?
            .validate_for_capacity(self.buffer_capacity)?;
        self.pool_config()?;
        Ok(())
    }
}

//! Replay - feed a captured byte stream through a pipeline.
//!
//! This example demonstrates:
//! - Loading pipeline settings from a project file
//! - Feeding a recording in small chunks, as a serial port would deliver it
//! - Writing every event to stdout as JSON lines
//!
//! # Running
//!
//! ```text
//! cargo run --example replay -- capture.bin [settings.json]
//! RUST_LOG=framewire=debug cargo run --example replay -- capture.bin
//! ```

use std::io::Write;
use std::time::Duration;

use framewire::codec::JsonCodec;
use framewire::pipeline::{ConnectionId, PipelineBuilder};
use framewire::settings::PipelineSettings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CHUNK_SIZE: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "framewire=info,replay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let capture = args.next().ok_or("usage: replay <capture> [settings.json]")?;
    let settings = match args.next() {
        Some(path) => PipelineSettings::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => PipelineSettings::default(),
    };

    let bytes = tokio::fs::read(&capture).await?;
    tracing::info!(capture, bytes = bytes.len(), mode = ?settings.operation_mode, "replaying");

    let pipeline = PipelineBuilder::from_settings(&settings)?.build()?;
    let mut events = pipeline.subscribe();

    let writer = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(event) = events.recv().await {
            match JsonCodec::encode_line(&event) {
                Ok(line) => {
                    if std::io::stdout().write_all(&line).is_err() {
                        break;
                    }
                    count += 1;
                }
                Err(e) => tracing::error!(error = %e, "failed to encode event"),
            }
        }
        count
    });

    let port = ConnectionId(0);
    pipeline.open(port)?;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        pipeline.feed(port, chunk)?;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    pipeline.flush(port)?;

    let stats = pipeline.connection_stats(port)?;
    pipeline.shutdown().await;
    let written = writer.await?;

    tracing::info!(
        events = written,
        frames = stats.extractor.frames,
        checksum_failures = stats.extractor.checksum_failures,
        overwritten = stats.buffer.overwritten_bytes,
        "replay finished"
    );

    Ok(())
}

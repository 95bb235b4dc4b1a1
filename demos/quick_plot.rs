//! Quick Plot - line-oriented CSV from a simulated device.
//!
//! This example demonstrates:
//! - The quick-plot preset (`\n`, `\r\n` or `\r` terminated lines)
//! - A listener receiving datasets on the worker threads
//! - Re-sorting datasets by sequence, since workers finish out of order
//!
//! # Running
//!
//! ```text
//! cargo run --example quick_plot
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use framewire::frame::FrameDetectionConfig;
use framewire::pipeline::{ConnectionId, Pipeline, PipelineListener};
use framewire::transform::Value;
use parking_lot::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Collects datasets as they complete.
#[derive(Default)]
struct Plot {
    points: Mutex<Vec<(u64, Vec<f64>)>>,
}

impl PipelineListener for Plot {
    fn on_dataset(
        &self,
        _connection: ConnectionId,
        sequence: u64,
        values: &[Value],
        _timestamp: SystemTime,
    ) {
        let row = values.iter().filter_map(Value::as_f64).collect();
        self.points.lock().push((sequence, row));
    }
}

/// Two channels of a fake sensor, with mixed line endings.
fn simulated_device(samples: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..samples {
        let t = i as f64 / 10.0;
        let ending = ["\n", "\r\n", "\r"][i % 3];
        out.extend_from_slice(format!("{:.3},{:.3}{ending}", t.sin(), t.cos()).as_bytes());
    }
    out
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "framewire=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let plot = Arc::new(Plot::default());
    let pipeline = Pipeline::builder()
        .detection(FrameDetectionConfig::quick_plot())
        .listener_arc(plot.clone())
        .max_workers(4)
        .build()?;

    let port = ConnectionId(1);
    pipeline.open(port)?;

    // Irregular chunk sizes, as a UART driver hands them over.
    let stream = simulated_device(200);
    let mut offset = 0;
    for size in [1usize, 7, 13, 29, 64].iter().cycle() {
        if offset >= stream.len() {
            break;
        }
        let end = (offset + size).min(stream.len());
        pipeline.feed(port, &stream[offset..end])?;
        offset = end;
        tokio::time::sleep(Duration::from_micros(200)).await;
    }

    let stats = pipeline.stats();
    pipeline.shutdown().await;

    let mut points = std::mem::take(&mut *plot.points.lock());
    points.sort_by_key(|(sequence, _)| *sequence);

    for (sequence, row) in points.iter().take(5) {
        println!("{sequence:>4}: {row:?}");
    }
    println!(
        "{} datasets, {} workers at peak, average latency {:?}",
        points.len(),
        stats.pool.peak_workers,
        stats.pool.average_latency
    );

    Ok(())
}

//! Integration tests for framewire.
//!
//! These tests drive buffer, extractor, pool and pipeline together
//! through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use framewire::buffer::RingBuffer;
use framewire::checksum::{self, ChecksumAlgorithm};
use framewire::codec::JsonCodec;
use framewire::frame::{Frame, FrameDetectionConfig, FrameExtractor};
use framewire::pipeline::{ConnectionId, Pipeline, PipelineEvent};
use framewire::pool::{PoolConfig, WorkerPool};
use framewire::settings::PipelineSettings;
use framewire::transform::{from_fn, TransformError, Value};

fn fast_pool(max_workers: usize) -> PoolConfig {
    PoolConfig::default()
        .with_max_workers(max_workers)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(1))
}

#[test]
fn test_overwrite_keeps_most_recent_bytes() {
    let mut ring = RingBuffer::new(16);
    ring.append(b"AAAAAAAAAAAAAAAA");
    let lost = ring.append(b"BBBB");

    assert_eq!(lost, 4);
    assert_eq!(&ring.peek(16)[..], b"AAAAAAAAAAAABBBB");
    assert!(ring.is_full());
    assert_eq!(ring.utilization(), 100.0);

    // Arbitrary append sequences never exceed capacity.
    let mut ring = RingBuffer::new(7);
    let mut all = Vec::new();
    for chunk in [&b"abc"[..], b"defghij", b"", b"k", b"lmnopqrstu"] {
        ring.append(chunk);
        all.extend_from_slice(chunk);
        assert!(ring.len() <= ring.capacity());
    }
    assert_eq!(&ring.peek(7)[..], &all[all.len() - 7..]);
}

#[test]
fn test_peek_then_read_identical() {
    let mut ring = RingBuffer::new(8);
    ring.append(b"12345");

    let peeked = ring.peek(3);
    let read = ring.read(3);
    assert_eq!(peeked, read);
    assert_eq!(ring.len(), 2);

    assert_eq!(&ring.read(10)[..], b"45");
    assert!(ring.is_empty());
}

#[test]
fn test_find_pattern_across_wraparound() {
    let mut ring = RingBuffer::new(10);
    ring.append(b"xxxxxxxxST");
    ring.discard(8);
    ring.append(b"OP;yz");

    // "STOP" occupies physical slots 8, 9, 0, 1.
    assert_eq!(ring.find_pattern(b"STOP", 0), Some(0));
    assert_eq!(ring.find_pattern(b"P;", 0), Some(3));
    assert_eq!(&ring.peek(5)[..], b"STOP;");
}

#[test]
fn test_end_delimited_round_trip() {
    let payload = b"12.5,-3,7";
    let mut extractor =
        FrameExtractor::new(FrameDetectionConfig::end_delimited("\r\n")).unwrap();
    let mut ring = RingBuffer::new(1024);

    for _ in 0..20 {
        ring.append(payload);
        ring.append(b"\r\n");
    }
    let before = ring.len();
    let frames = extractor.drain(&mut ring);

    assert_eq!(frames.len(), 20);
    assert!(frames.iter().all(|f| f.payload() == payload && f.checksum_valid));
    assert_eq!(before - ring.len(), 20 * (payload.len() + 2));
    let sequences: Vec<_> = frames.iter().map(|f| f.sequence).collect();
    assert_eq!(sequences, (0..20).collect::<Vec<_>>());
}

#[test]
fn test_start_end_partial_frame_retained() {
    let mut extractor =
        FrameExtractor::new(FrameDetectionConfig::start_end_delimited("$", ";")).unwrap();
    let mut ring = RingBuffer::new(64);

    ring.append(b"$10,20");
    assert!(extractor.drain(&mut ring).is_empty());
    assert_eq!(ring.len(), 6);

    ring.append(b";");
    let frames = extractor.drain(&mut ring);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload(), b"10,20");
    assert!(ring.is_empty());
}

#[test]
fn test_corrupt_checksum_does_not_stall() {
    let config = FrameDetectionConfig::end_delimited("\n").with_checksum(ChecksumAlgorithm::Xor);
    let mut extractor = FrameExtractor::new(config).unwrap();
    let mut ring = RingBuffer::new(64);

    let mut bad = b"1,2".to_vec();
    bad.push(checksum::xor8(b"1,2") ^ 0x01);
    bad.push(b'\n');
    let mut good = b"3,4".to_vec();
    good.extend(checksum::compute(ChecksumAlgorithm::Xor, b"3,4"));
    good.push(b'\n');

    ring.append(&bad);
    ring.append(&good);
    let frames = extractor.drain(&mut ring);

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].payload(), b"1,2");
    assert!(!frames[0].checksum_valid);
    assert_eq!(frames[1].payload(), b"3,4");
    assert!(frames[1].checksum_valid);
    assert!(ring.is_empty());
    assert_eq!(extractor.stats().checksum_failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_admission_bound_under_load() {
    let max_workers = 3;
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let transform = {
        let running = running.clone();
        let peak = peak.clone();
        from_fn(move |payload: &[u8]| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![Value::Number(payload.len() as f64)])
        })
    };
    let pool = WorkerPool::new(transform, fast_pool(max_workers));

    let submitters: Vec<_> = (0..(max_workers as u64 * 12))
        .map(|seq| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let frame = Frame::new(Bytes::from_static(b"frame"), seq, true);
                pool.submit(frame).await.unwrap().await
            })
        })
        .collect();

    for submitter in submitters {
        assert!(submitter.await.unwrap().is_ok());
    }

    let stats = pool.stats();
    assert_eq!(stats.processed_frames, 36);
    assert!(stats.peak_workers <= max_workers);
    assert!(peak.load(Ordering::SeqCst) <= max_workers);

    pool.destroy().await;
}

#[tokio::test]
async fn test_batch_isolates_failing_item() {
    let pool = WorkerPool::new(
        from_fn(|payload: &[u8]| {
            if payload == b"bad" {
                return Err(TransformError::failed("rejected"));
            }
            Ok(vec![Value::Text(String::from_utf8_lossy(payload).into_owned())])
        }),
        fast_pool(2),
    );

    let frames: Vec<_> = ["a", "b", "bad", "c", "d"]
        .iter()
        .enumerate()
        .map(|(i, p)| Frame::new(Bytes::copy_from_slice(p.as_bytes()), i as u64, true))
        .collect();

    let outcome = pool.submit_batch(frames).await;

    assert_eq!(outcome.results.len(), 4);
    assert_eq!(outcome.failed(), 1);
    assert_eq!(outcome.last_error().map(|f| f.sequence), Some(2));
    assert_eq!(pool.stats().dropped_or_failed_frames, 1);

    pool.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_fragmented_streams() {
    let settings = PipelineSettings::from_json(
        r#"{
            "operationMode": "project-file",
            "frameDetection": "start-end-delimiter",
            "startSequence": "$",
            "endSequence": ";",
            "maxWorkers": 2
        }"#,
    )
    .unwrap();
    let pipeline = framewire::PipelineBuilder::from_settings(&settings)
        .unwrap()
        .pool_config(fast_pool(2))
        .build()
        .unwrap();
    let mut events = pipeline.subscribe();

    let ports = [ConnectionId(1), ConnectionId(2)];
    for port in ports {
        pipeline.open(port).unwrap();
    }

    // Leading noise, then ten frames per port split into 3-byte chunks.
    let mut stream = b"noise".to_vec();
    for i in 0..10 {
        stream.extend_from_slice(format!("${i},{}\n;", i * 10).as_bytes());
    }
    for chunk in stream.chunks(3) {
        for port in ports {
            pipeline.feed(port, chunk).unwrap();
        }
    }

    let mut received: Vec<(ConnectionId, u64, Vec<Value>)> = Vec::new();
    while received.len() < 20 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out")
            .expect("closed");
        match event {
            PipelineEvent::Dataset {
                connection,
                sequence,
                values,
                ..
            } => received.push((connection, sequence, values)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    received.sort_by_key(|(c, s, _)| (*c, *s));
    for (i, (connection, sequence, values)) in received.iter().enumerate() {
        let n = (i % 10) as u64;
        assert_eq!(*connection, ports[i / 10]);
        assert_eq!(*sequence, n);
        assert_eq!(values, &vec![Value::Number(n as f64), Value::Number(n as f64 * 10.0)]);
    }

    let stats = pipeline.stats();
    assert_eq!(stats.connections.len(), 2);
    assert!(stats.connections.iter().all(|c| c.extractor.frames == 10));
    assert_eq!(stats.pool.processed_frames, 20);

    pipeline.shutdown().await;
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn test_events_encode_for_remote_consumer() {
    let pipeline = Pipeline::builder()
        .detection(FrameDetectionConfig::end_delimited(";"))
        .pool_config(fast_pool(1))
        .build()
        .unwrap();
    let mut events = pipeline.subscribe();
    pipeline.open(ConnectionId(4)).unwrap();
    pipeline.feed(ConnectionId(4), b"1.5,on;").unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    let line = JsonCodec::encode_line(&event).unwrap();
    let decoded: serde_json::Value = serde_json::from_slice(&line).unwrap();

    assert_eq!(decoded["type"], "dataset");
    assert_eq!(decoded["connection"], 4);
    assert_eq!(decoded["sequence"], 0);
    assert_eq!(decoded["values"], serde_json::json!([1.5, "on"]));
    assert_eq!(decoded["checksumValid"], true);

    pipeline.shutdown().await;
}

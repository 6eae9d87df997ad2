//! Stress tests for eventvault-storage
//!
//! These tests verify the persistence layer under sustained appends,
//! concurrent writers, large payloads and restarts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use eventvault_core::{Event, EventId, StreamId, StreamType};
use eventvault_storage::{PersistenceConfig, PersistenceCoordinator, RAW_HEADER_SIZE};
use futures::StreamExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn coordinator(temp: &TempDir) -> PersistenceCoordinator {
    PersistenceCoordinator::new(PersistenceConfig {
        base_dir: temp.path().to_path_buf(),
        delete_retry_delay: Duration::from_millis(1),
        ..Default::default()
    })
}

fn event(timestamp: i64, payload_len: usize) -> Event {
    Event::new(
        EventId::new(timestamp, 0),
        format!("evt-{}", timestamp % 7),
        Bytes::from(vec![(timestamp % 251) as u8; payload_len]),
    )
}

async fn read_range(
    coord: &PersistenceCoordinator,
    id: &StreamId,
    skip: Option<u64>,
    take: Option<u64>,
) -> Vec<Event> {
    coord
        .read(id, skip, take, &CancellationToken::new())
        .await
        .expect("Failed to open stream")
        .map(|e| e.expect("Failed to read event"))
        .collect()
        .await
}

// ============================================================================
// Throughput Tests
// ============================================================================

/// Append 10,000 events in batches and read them back
#[tokio::test]
async fn test_append_throughput() {
    let temp = TempDir::new().unwrap();
    let coord = coordinator(&temp);
    let id = StreamId::random(StreamType::new("throughput").unwrap());
    let cancel = CancellationToken::new();
    let event_count: i64 = 10_000;
    let batch_size: i64 = 100;

    let start = Instant::now();

    for batch_start in (0..event_count).step_by(batch_size as usize) {
        let batch: Vec<Event> = (batch_start..batch_start + batch_size)
            .map(|i| event(i, 32))
            .collect();
        coord
            .append(&id, &batch, &cancel)
            .await
            .expect("Failed to append batch");
    }

    let duration = start.elapsed();
    println!(
        "Appended {} events in {:?} ({:.2} events/sec)",
        event_count,
        duration,
        event_count as f64 / duration.as_secs_f64()
    );

    assert_eq!(
        coord.stream_length(&id).await.unwrap(),
        Some(event_count as u64)
    );

    let start = Instant::now();
    let events = read_range(&coord, &id, None, None).await;
    println!("Read {} events in {:?}", events.len(), start.elapsed());

    assert_eq!(events.len(), event_count as usize);
    for (i, e) in events.iter().enumerate() {
        assert_eq!(e.id.timestamp, i as i64);
    }
}

/// Random-access pages across a large stream
#[tokio::test]
async fn test_paged_reads_over_large_stream() {
    let temp = TempDir::new().unwrap();
    let coord = coordinator(&temp);
    let id = StreamId::random(StreamType::new("paged").unwrap());
    let batch: Vec<Event> = (0..5_000).map(|i| event(i, (i % 50) as usize)).collect();
    coord
        .append(&id, &batch, &CancellationToken::new())
        .await
        .unwrap();

    for skip in [0u64, 1, 999, 2_500, 4_990] {
        let page = read_range(&coord, &id, Some(skip), Some(100)).await;
        let expected_len = (5_000 - skip).min(100) as usize;
        assert_eq!(page.len(), expected_len, "page at {}", skip);
        assert_eq!(page[..], batch[skip as usize..skip as usize + expected_len]);
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

/// Many writers appending to the same stream never interleave records
#[tokio::test]
async fn test_concurrent_appends_same_stream() {
    let temp = TempDir::new().unwrap();
    let coord = Arc::new(coordinator(&temp));
    let id = StreamId::random(StreamType::new("contended").unwrap());
    let writers: i64 = 16;
    let batches_per_writer: i64 = 20;
    let batch_size: i64 = 5;

    let start = Instant::now();
    let mut handles = Vec::new();
    for writer in 0..writers {
        let coord = coord.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            for b in 0..batches_per_writer {
                let base = (writer * batches_per_writer + b) * batch_size;
                let batch: Vec<Event> =
                    (base..base + batch_size).map(|i| event(i, 16)).collect();
                coord
                    .append(&id, &batch, &CancellationToken::new())
                    .await
                    .expect("Failed to append");
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = (writers * batches_per_writer * batch_size) as usize;
    println!("{} concurrent appends completed in {:?}", total, start.elapsed());

    let events = read_range(&coord, &id, None, None).await;
    assert_eq!(events.len(), total);

    // Each batch lands contiguously and every payload still matches its id
    for chunk in events.chunks(batch_size as usize) {
        let first = chunk[0].id.timestamp;
        assert_eq!(first % batch_size, 0);
        for (offset, e) in chunk.iter().enumerate() {
            assert_eq!(e.id.timestamp, first + offset as i64);
            assert!(e.data.iter().all(|b| *b == (e.id.timestamp % 251) as u8));
        }
    }
}

/// Independent streams progress in parallel
#[tokio::test]
async fn test_concurrent_appends_many_streams() {
    let temp = TempDir::new().unwrap();
    let coord = Arc::new(coordinator(&temp));
    let stream_type = StreamType::new("fanout").unwrap();
    let ids: Vec<StreamId> = (0..50)
        .map(|_| StreamId::random(stream_type.clone()))
        .collect();

    let mut handles = Vec::new();
    for id in ids.clone() {
        let coord = coord.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..20 {
                coord
                    .append(&id, &[event(i, 8)], &CancellationToken::new())
                    .await
                    .expect("Failed to append");
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let listed = coord.list_streams(Some(&stream_type)).await.unwrap();
    assert_eq!(listed.len(), ids.len());
    for id in &ids {
        assert_eq!(coord.stream_length(id).await.unwrap(), Some(20));
    }
}

/// Readers running while a writer appends only ever see whole records
#[tokio::test]
async fn test_reads_during_appends() {
    let temp = TempDir::new().unwrap();
    let coord = Arc::new(coordinator(&temp));
    let id = StreamId::random(StreamType::new("live").unwrap());

    let writer = {
        let coord = coord.clone();
        let id = id.clone();
        tokio::spawn(async move {
            for i in 0..500 {
                coord
                    .append(&id, &[event(i, 64)], &CancellationToken::new())
                    .await
                    .unwrap();
            }
        })
    };

    let mut last_seen = 0usize;
    while !writer.is_finished() {
        let events = read_range(&coord, &id, None, None).await;
        assert!(events.len() >= last_seen);
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.id.timestamp, i as i64);
        }
        last_seen = events.len();
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();

    assert_eq!(read_range(&coord, &id, None, None).await.len(), 500);
}

// ============================================================================
// Durability Tests
// ============================================================================

/// A fresh coordinator over the same directory sees everything written
#[tokio::test]
async fn test_restart_recovers_streams() {
    let temp = TempDir::new().unwrap();
    let id = StreamId::random(StreamType::new("durable").unwrap());
    let batch: Vec<Event> = (0..300).map(|i| event(i, 100)).collect();

    {
        let coord = coordinator(&temp);
        coord
            .append(&id, &batch, &CancellationToken::new())
            .await
            .unwrap();
    }

    let coord = coordinator(&temp);
    let listed = coord.list_streams(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].stream_id, id);
    assert_eq!(read_range(&coord, &id, None, None).await, batch);
}

/// A torn header write after a crash is ignored on the next open
#[tokio::test]
async fn test_torn_header_tail_after_crash() {
    let temp = TempDir::new().unwrap();
    let id = StreamId::random(StreamType::new("torn").unwrap());
    let batch: Vec<Event> = (0..10).map(|i| event(i, 10)).collect();

    let coord = coordinator(&temp);
    coord
        .append(&id, &batch, &CancellationToken::new())
        .await
        .unwrap();

    let headers_path = coord.layout().extent_for(&id).headers_path;
    let mut bytes = tokio::fs::read(&headers_path).await.unwrap();
    bytes.extend_from_slice(&[0xAB; RAW_HEADER_SIZE / 2]);
    tokio::fs::write(&headers_path, bytes).await.unwrap();

    let coord = coordinator(&temp);
    assert_eq!(coord.stream_length(&id).await.unwrap(), Some(10));
    assert_eq!(read_range(&coord, &id, None, None).await, batch);
}

/// Large payloads round trip intact
#[tokio::test]
async fn test_large_payloads() {
    let temp = TempDir::new().unwrap();
    let coord = coordinator(&temp);
    let id = StreamId::random(StreamType::new("large").unwrap());
    let batch: Vec<Event> = (0..8).map(|i| event(i, 256 * 1024)).collect();

    coord
        .append(&id, &batch, &CancellationToken::new())
        .await
        .unwrap();

    let events = read_range(&coord, &id, Some(6), None).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[..], batch[6..]);
}

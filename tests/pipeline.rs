use pretty_assertions::assert_eq;
use serde_json::json;
use statistics_dumper::{
    Dumper,
    DumperError,
    PipelineStats,
    PointTransformer,
};
use statistics_dumper_queue::{
    testing::{
        Event,
        MemoryQueue,
    },
    ConnectionPool,
    HttpRefresher,
    PoolConfig,
    QueueConsumer,
    QueueNames,
};
use statistics_dumper_store::{
    testing::MemoryStore,
    RetentionPolicy,
    StoreError,
    StoreWriter,
};
use std::time::Duration;

const SHORT: &str = "statistics:300";
const LONG: &str = "statistics:3600";

type TestDumper = Dumper<MemoryQueue, HttpRefresher, MemoryStore>;

fn dumper(queue: &MemoryQueue, store: &MemoryStore, batch_size: usize) -> TestDumper {
    let pool = ConnectionPool::<MemoryQueue>::new(queue.clone(), None, PoolConfig::default());
    Dumper::new(
        QueueConsumer::new(pool, QueueNames::new(SHORT, LONG)),
        PointTransformer::new("box", Some("@".to_string())),
        StoreWriter::new(store.clone(), "statistics", RetentionPolicy::new("dumper", "5d")),
        batch_size,
        Duration::from_secs(1),
    )
}

fn sample(key: &str, start: i64) -> String {
    json!({
        "Avg": 2.5,
        "Total": 10,
        "Max": 5,
        "Count": 4,
        "Start": start,
        "Key": key,
        "Tags": "host=x",
    })
    .to_string()
}

fn written_lines(store: &MemoryStore) -> Vec<Vec<String>> {
    store
        .writes()
        .into_iter()
        .map(|write| write.body.lines().map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn short_sample_becomes_minute_average_and_total() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    queue.push(SHORT, sample("cpu", 1000));
    let mut dumper = dumper(&queue, &store, 1000);

    dumper.pump().await.unwrap();
    assert!(store.writes().is_empty());
    assert_eq!(dumper.pending(), 2);

    // The empty read flushes the partial batch.
    dumper.pump().await.unwrap();
    assert_eq!(
        written_lines(&store),
        vec![vec![
            "cpu|m,host=x,node=box value=2.5,max=5 1000".to_string(),
            "cpu|t,host=x,node=box value=10,max=5 1000".to_string(),
        ]]
    );
    assert_eq!(store.writes()[0].policy, "dumper");
    assert_eq!(
        dumper.stats(),
        PipelineStats {
            samples: 1,
            points: 2,
            batches_written: 1,
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn long_sample_becomes_hourly_average() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    queue.push(LONG, sample("load@pid.7", 3600));
    let mut dumper = dumper(&queue, &store, 1000);

    dumper.pump().await.unwrap();
    dumper.pump().await.unwrap();
    assert_eq!(
        written_lines(&store),
        vec![vec!["load|h,host=x,node=box value=2.5,max=5 3600".to_string()]]
    );
}

#[tokio::test]
async fn full_batch_is_flushed_before_the_next_read() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    queue.push(SHORT, sample("a", 60));
    queue.push(SHORT, sample("b", 60));
    let mut dumper = dumper(&queue, &store, 3);

    dumper.pump().await.unwrap();
    assert_eq!(dumper.pending(), 2);

    dumper.pump().await.unwrap();
    assert_eq!(store.writes().len(), 1);
    assert_eq!(dumper.pending(), 1);

    dumper.pump().await.unwrap();
    let batches = written_lines(&store);
    assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 1]);
    assert_eq!(batches[1], vec!["b|t,host=x,node=box value=10,max=5 60".to_string()]);
}

#[tokio::test]
async fn empty_read_without_points_writes_nothing() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    let mut dumper = dumper(&queue, &store, 1000);

    for _ in 0..3 {
        dumper.pump().await.unwrap();
    }
    assert!(store.writes().is_empty());
    assert_eq!(dumper.stats(), PipelineStats::default());
}

#[tokio::test]
async fn queue_connection_is_checked_once_per_connection() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    for start in [60, 120, 180] {
        queue.push(SHORT, sample("cpu", start));
    }
    let mut dumper = dumper(&queue, &store, 1000);

    for _ in 0..4 {
        dumper.pump().await.unwrap();
    }

    let events = queue.events();
    let count = |wanted: fn(&Event) -> bool| events.iter().filter(|&event| wanted(event)).count();
    assert_eq!(count(|event| matches!(event, Event::Pop(_))), 4);
    assert_eq!(count(|event| matches!(event, Event::Ping(_))), 1);
    assert_eq!(queue.connections(), 1);
    assert_eq!(dumper.stats().samples, 3);
}

#[tokio::test]
async fn malformed_payload_is_skipped_without_losing_the_batch() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    queue.push(SHORT, sample("a", 60));
    queue.push(SHORT, "{\"Avg\": ");
    queue.push(SHORT, sample("b", 60));
    let mut dumper = dumper(&queue, &store, 1000);

    for _ in 0..4 {
        dumper.pump().await.unwrap();
    }

    assert_eq!(dumper.stats().decode_errors, 1);
    assert_eq!(dumper.stats().samples, 2);
    let batches = written_lines(&store);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 4);
}

#[tokio::test]
async fn failed_write_drops_the_batch_and_continues() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    let mut dumper = dumper(&queue, &store, 1000);

    store.fail_writes(true);
    queue.push(SHORT, sample("lost", 60));
    dumper.pump().await.unwrap();
    dumper.pump().await.unwrap();
    assert_eq!(dumper.stats().batches_dropped, 1);
    assert_eq!(dumper.pending(), 0);

    store.fail_writes(false);
    queue.push(LONG, sample("kept", 3600));
    dumper.pump().await.unwrap();
    dumper.pump().await.unwrap();

    assert_eq!(
        written_lines(&store),
        vec![vec!["kept|h,host=x,node=box value=2.5,max=5 3600".to_string()]]
    );
    assert_eq!(dumper.stats().batches_written, 1);
}

#[tokio::test]
async fn lost_queue_connection_is_fatal() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    queue.fail_pop(true);
    let mut dumper = dumper(&queue, &store, 1000);

    assert!(matches!(dumper.run().await, Err(DumperError::Queue(_))));
    assert_eq!(store.queries().len(), 2);
}

#[tokio::test]
async fn unreachable_queue_is_fatal() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    queue.fail_connect(true);
    let mut dumper = dumper(&queue, &store, 1000);

    assert!(matches!(dumper.pump().await, Err(DumperError::Queue(_))));
}

#[tokio::test]
async fn schema_failure_stops_before_reading() {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    store.fail_queries_with(Some(StoreError::Status {
        status: 503,
        body: "unavailable".to_string(),
    }));
    queue.push(SHORT, sample("a", 60));
    let mut dumper = dumper(&queue, &store, 1000);

    assert!(matches!(dumper.run().await, Err(DumperError::Schema(_))));
    assert_eq!(queue.len(SHORT), 1);
}

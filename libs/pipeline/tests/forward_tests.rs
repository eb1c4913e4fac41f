//! Сценарии pipeline'а против in-process broker'а.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use broker_memory::{BrokerEvent, MemoryBroker};
use pipeline::config::FollowConfig;
use pipeline::{
    ForwardPipeline, PipelineError, PipelineOutcome, PrefixTransformer, RetryPolicy, Route,
    Stage, Stages, follow, provision_topics,
};
use relay_api::{
    CommitError, ConsumerPosition, Deadline, FetchError, OffsetCommitter, ProvisionError, Record,
    TargetWriter, TopicSpec, WriteError,
};

const SOURCE: &str = "demo-topic";
const TARGET: &str = "demo-topic-forwarded";
const GROUP: &str = "forwarder-group";
const TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Harness
// =============================================================================

fn specs() -> Vec<TopicSpec> {
    vec![
        TopicSpec::new(SOURCE, 1, 1).unwrap(),
        TopicSpec::new(TARGET, 1, 1).unwrap(),
    ]
}

async fn broker_with_topics() -> Arc<MemoryBroker> {
    let broker = Arc::new(MemoryBroker::new());
    let report = provision_topics(&*broker, &specs(), &RetryPolicy::none()).await;
    assert!(report.all_ready(), "{:?}", report.failed);
    broker
}

fn route() -> Route {
    Route {
        group_id: GROUP.into(),
        source_topic: SOURCE.into(),
        target_topic: TARGET.into(),
    }
}

fn pipeline_with_committer(
    broker: &Arc<MemoryBroker>,
    committer: Arc<dyn OffsetCommitter>,
) -> ForwardPipeline {
    ForwardPipeline::new(
        Stages {
            reader: broker.clone(),
            transformer: Arc::new(PrefixTransformer::default()),
            writer: broker.clone(),
            committer,
        },
        route(),
    )
}

fn pipeline(broker: &Arc<MemoryBroker>) -> ForwardPipeline {
    pipeline_with_committer(broker, broker.clone())
}

async fn publish(broker: &MemoryBroker, key: &str, value: &str) {
    broker
        .append(SOURCE, &Record::outgoing(SOURCE, key, value), Deadline::after(TIMEOUT))
        .await
        .unwrap();
}

async fn committed(broker: &MemoryBroker) -> Option<i64> {
    broker.committed(GROUP, SOURCE, 0).await.unwrap().committed_offset
}

fn values(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.value_lossy().into_owned()).collect()
}

/// Committer, считающий вызовы commit поверх настоящего broker'а.
struct CountingCommitter {
    inner: Arc<MemoryBroker>,
    commits: AtomicU32,
}

impl OffsetCommitter for CountingCommitter {
    fn commit<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        partition: i32,
        offset: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), CommitError>> + Send + 'a>> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(group_id, topic, partition, offset)
    }

    fn committed<'a>(
        &'a self,
        group_id: &'a str,
        topic: &'a str,
        partition: i32,
    ) -> Pin<Box<dyn Future<Output = Result<ConsumerPosition, CommitError>> + Send + 'a>> {
        self.inner.committed(group_id, topic, partition)
    }
}

/// Committer, который никогда не отвечает.
struct HangingCommitter;

impl OffsetCommitter for HangingCommitter {
    fn commit<'a>(
        &'a self,
        _group_id: &'a str,
        _topic: &'a str,
        _partition: i32,
        _offset: i64,
    ) -> Pin<Box<dyn Future<Output = Result<(), CommitError>> + Send + 'a>> {
        Box::pin(std::future::pending())
    }

    fn committed<'a>(
        &'a self,
        _group_id: &'a str,
        _topic: &'a str,
        _partition: i32,
    ) -> Pin<Box<dyn Future<Output = Result<ConsumerPosition, CommitError>> + Send + 'a>> {
        Box::pin(std::future::pending())
    }
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_end_to_end_forwards_single_record() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;

    let outcome = pipeline(&broker).run(TIMEOUT, &CancellationToken::new()).await;

    assert_eq!(
        outcome,
        PipelineOutcome::Forwarded {
            partition: 0,
            offset: 0,
            committed_offset: 1
        }
    );
    let target = broker.records(TARGET).await;
    assert_eq!(target.len(), 1);
    assert_eq!(target[0].key, b"k1".to_vec());
    assert_eq!(target[0].value, b"forwarded: hello".to_vec());
    assert_eq!(committed(&broker).await, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_write_ack_precedes_commit() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;

    pipeline(&broker).run(TIMEOUT, &CancellationToken::new()).await;

    let journal = broker.journal().await;
    let appended = journal
        .iter()
        .position(|e| matches!(e, BrokerEvent::Appended { topic, .. } if topic == TARGET))
        .expect("target append");
    let commit = journal
        .iter()
        .position(|e| matches!(e, BrokerEvent::Committed { .. }))
        .expect("commit");
    assert!(appended < commit, "{journal:?}");
}

#[tokio::test(start_paused = true)]
async fn test_sequential_runs_follow_source_order() {
    let broker = broker_with_topics().await;
    for value in ["a", "b", "c"] {
        publish(&broker, "k1", value).await;
    }

    let pipeline = pipeline(&broker);
    let token = CancellationToken::new();
    for expected in 0..3 {
        match pipeline.run(TIMEOUT, &token).await {
            PipelineOutcome::Forwarded { offset, .. } => assert_eq!(offset, expected),
            other => panic!("unexpected: {other:?}"),
        }
    }

    assert_eq!(
        values(&broker.records(TARGET).await),
        vec!["forwarded: a", "forwarded: b", "forwarded: c"]
    );
    assert_eq!(committed(&broker).await, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_custom_prefix() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;

    let pipeline = ForwardPipeline::new(
        Stages {
            reader: broker.clone(),
            transformer: Arc::new(PrefixTransformer::new("relayed: ")),
            writer: broker.clone(),
            committer: broker.clone(),
        },
        route(),
    );
    assert!(pipeline.run(TIMEOUT, &CancellationToken::new()).await.is_forwarded());
    assert_eq!(values(&broker.records(TARGET).await), vec!["relayed: hello"]);
}

// =============================================================================
// Provisioning
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_provisioning_is_idempotent() {
    let broker = Arc::new(MemoryBroker::new());
    for _ in 0..2 {
        let report = provision_topics(&*broker, &specs(), &RetryPolicy::none()).await;
        assert!(report.all_ready());
        assert_eq!(report.ready, vec![SOURCE.to_string(), TARGET.to_string()]);
    }
    let created = broker
        .journal()
        .await
        .into_iter()
        .filter(|e| matches!(e, BrokerEvent::Created { .. }))
        .count();
    assert_eq!(created, 2);
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_failure_is_reported_not_fatal() {
    let broker = Arc::new(MemoryBroker::new());
    broker
        .fail_next_provision(ProvisionError::Rejected {
            topic: SOURCE.into(),
            reason: "authorization failed".into(),
        })
        .await;

    let report = provision_topics(&*broker, &specs(), &RetryPolicy::default()).await;

    assert!(!report.all_ready());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, SOURCE);
    assert_eq!(report.ready, vec![TARGET.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_provisioning_retries_unreachable_controller() {
    let broker = Arc::new(MemoryBroker::new());
    broker
        .fail_next_provision(ProvisionError::Unreachable("connection refused".into()))
        .await;

    let report = provision_topics(&*broker, &specs(), &RetryPolicy::default()).await;

    assert!(report.all_ready());
    assert!(broker.topic_spec(SOURCE).await.is_some());
}

// =============================================================================
// Failure semantics
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_write_failure_never_commits_and_redelivers() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    broker
        .fail_next_write(WriteError::Unreachable("connection reset".into()))
        .await;

    let counting = Arc::new(CountingCommitter {
        inner: broker.clone(),
        commits: AtomicU32::new(0),
    });
    let pipeline = pipeline_with_committer(&broker, counting.clone());
    let token = CancellationToken::new();

    let first = pipeline.run(TIMEOUT, &token).await;
    assert!(
        matches!(first, PipelineOutcome::WriteFailed { offset: 0, .. }),
        "{first:?}"
    );
    assert_eq!(counting.commits.load(Ordering::SeqCst), 0);
    assert_eq!(committed(&broker).await, None);
    assert!(broker.records(TARGET).await.is_empty());

    let second = pipeline.run(TIMEOUT, &token).await;
    assert!(
        matches!(second, PipelineOutcome::Forwarded { offset: 0, .. }),
        "{second:?}"
    );
    assert_eq!(counting.commits.load(Ordering::SeqCst), 1);
    assert_eq!(broker.records(TARGET).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_commit_failure_duplicates_on_rerun() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    broker.fail_next_commit(CommitError::Timeout).await;

    let pipeline = pipeline(&broker);
    let token = CancellationToken::new();

    let first = pipeline.run(TIMEOUT, &token).await;
    assert!(first.may_duplicate());
    assert_eq!(first.failed_stage(), Some(Stage::Committing));
    assert_eq!(committed(&broker).await, None);

    let second = pipeline.run(TIMEOUT, &token).await;
    assert!(second.is_forwarded());

    assert_eq!(
        values(&broker.records(TARGET).await),
        vec!["forwarded: hello", "forwarded: hello"]
    );
    assert_eq!(committed(&broker).await, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_commit_expires_at_deadline() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    let pipeline = pipeline_with_committer(&broker, Arc::new(HangingCommitter));
    let start = Instant::now();

    let outcome = tokio::time::timeout(
        Duration::from_secs(3600),
        pipeline.run(Duration::from_secs(1), &CancellationToken::new()),
    )
    .await
    .expect("commit must not outlive the run deadline");

    assert_eq!(
        outcome,
        PipelineOutcome::CommitFailed {
            partition: 0,
            offset: 0,
            cause: CommitError::Timeout
        }
    );
    assert!(outcome.may_duplicate());
    assert!(start.elapsed() <= Duration::from_secs(1));
    assert_eq!(values(&broker.records(TARGET).await), vec!["forwarded: hello"]);
    assert_eq!(committed(&broker).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_mutates_nothing() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    broker
        .fail_next_fetch(FetchError::BrokerUnavailable("coordinator not available".into()))
        .await;

    let outcome = pipeline(&broker).run(TIMEOUT, &CancellationToken::new()).await;

    assert!(matches!(outcome, PipelineOutcome::FetchFailed { .. }), "{outcome:?}");
    assert!(broker.records(TARGET).await.is_empty());
    assert_eq!(committed(&broker).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_write_retry_recovers_transient_failure() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    broker
        .fail_next_write(WriteError::Unreachable("leader not available".into()))
        .await;

    let pipeline = pipeline(&broker).with_write_retry(RetryPolicy {
        max_attempts: 3,
        ..RetryPolicy::default()
    });
    let outcome = pipeline.run(TIMEOUT, &CancellationToken::new()).await;

    assert!(outcome.is_forwarded(), "{outcome:?}");
    assert_eq!(broker.records(TARGET).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_write_retry_skips_permanent_errors() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    broker
        .fail_next_write(WriteError::Rejected("message too large".into()))
        .await;

    let pipeline = pipeline(&broker).with_write_retry(RetryPolicy::default());
    let outcome = pipeline.run(TIMEOUT, &CancellationToken::new()).await;

    assert!(
        matches!(
            outcome,
            PipelineOutcome::WriteFailed {
                cause: WriteError::Rejected(_),
                ..
            }
        ),
        "{outcome:?}"
    );
    assert!(broker.records(TARGET).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_target_topic_fails_write() {
    let broker = Arc::new(MemoryBroker::new());
    let source = TopicSpec::new(SOURCE, 1, 1).unwrap();
    provision_topics(&*broker, &[source], &RetryPolicy::none()).await;
    publish(&broker, "k1", "hello").await;

    let outcome = pipeline(&broker).run(TIMEOUT, &CancellationToken::new()).await;

    assert_eq!(
        outcome,
        PipelineOutcome::WriteFailed {
            partition: 0,
            offset: 0,
            cause: WriteError::UnknownTopic(TARGET.into())
        }
    );
    assert_eq!(committed(&broker).await, None);
}

// =============================================================================
// Deadline & cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_source_times_out_at_deadline() {
    let broker = broker_with_topics().await;
    let start = Instant::now();

    let outcome = pipeline(&broker)
        .run(Duration::from_secs(2), &CancellationToken::new())
        .await;

    assert_eq!(outcome, PipelineOutcome::FetchTimedOut);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetch_does_not_block_past_deadline() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    broker.set_fetch_latency(Duration::from_secs(30)).await;
    let start = Instant::now();

    let outcome = pipeline(&broker)
        .run(Duration::from_secs(1), &CancellationToken::new())
        .await;

    assert_eq!(outcome, PipelineOutcome::FetchTimedOut);
    assert!(start.elapsed() <= Duration::from_secs(1));
    assert!(broker.records(TARGET).await.is_empty());
    assert_eq!(committed(&broker).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_slow_write_times_out_and_leaves_offset() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    broker.set_write_latency(Duration::from_secs(30)).await;

    let outcome = pipeline(&broker)
        .run(Duration::from_secs(1), &CancellationToken::new())
        .await;

    assert_eq!(
        outcome,
        PipelineOutcome::WriteFailed {
            partition: 0,
            offset: 0,
            cause: WriteError::Timeout
        }
    );
    assert_eq!(committed(&broker).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_waiting_fetch() {
    let broker = broker_with_topics().await;
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    let start = Instant::now();

    let outcome = pipeline(&broker).run(Duration::from_secs(30), &token).await;

    assert_eq!(
        outcome,
        PipelineOutcome::Cancelled {
            stage: Stage::Fetching
        }
    );
    assert!(!outcome.may_duplicate());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_write_skips_commit() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    broker.set_write_latency(Duration::from_secs(5)).await;
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let outcome = pipeline(&broker).run(TIMEOUT, &token).await;

    assert_eq!(
        outcome,
        PipelineOutcome::Cancelled {
            stage: Stage::Writing
        }
    );
    assert_eq!(committed(&broker).await, None);
}

// =============================================================================
// Follow loop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_follow_drains_source_until_max_runs() {
    let broker = broker_with_topics().await;
    for value in ["a", "b", "c"] {
        publish(&broker, "k1", value).await;
    }
    let cfg = FollowConfig {
        idle_ms: 0,
        max_runs: Some(4),
        ..FollowConfig::default()
    };

    let summary = follow(&pipeline(&broker), TIMEOUT, &cfg, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.runs, 4);
    assert_eq!(summary.forwarded, 3);
    assert_eq!(summary.idle, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(broker.records(TARGET).await.len(), 3);
    assert_eq!(committed(&broker).await, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_follow_gives_up_after_consecutive_failures() {
    let broker = broker_with_topics().await;
    publish(&broker, "k1", "hello").await;
    for _ in 0..3 {
        broker
            .fail_next_write(WriteError::Unreachable("broker down".into()))
            .await;
    }
    let cfg = FollowConfig {
        max_consecutive_failures: 2,
        ..FollowConfig::default()
    };

    let err = follow(&pipeline(&broker), TIMEOUT, &cfg, &CancellationToken::new())
        .await
        .unwrap_err();

    let PipelineError::GaveUp { failures, last } = err;
    assert_eq!(failures, 2);
    assert_eq!(last.failed_stage(), Some(Stage::Writing));
    assert_eq!(committed(&broker).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_follow_stops_on_cancel() {
    let broker = broker_with_topics().await;
    let token = CancellationToken::new();
    token.cancel();

    let summary = follow(&pipeline(&broker), TIMEOUT, &FollowConfig::default(), &token)
        .await
        .unwrap();

    assert_eq!(summary.runs, 0);
}

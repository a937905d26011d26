//! Topology assembly and run lifecycle
//!
//! ```text
//! Source ─┬─▶ Mapper[0] ─┐              ┌─▶ Reducer[k0] ─┐
//!         ├─▶ Mapper[1] ─┼─▶ Shuffler ──┤                ├─▶ Sink
//!         └─▶ Mapper[n] ─┘              └─▶ Reducer[kK] ─┘
//! ```
//!
//! Every arrow is a bounded stream closed by its producer. The run is
//! complete when the sink returns; the runner then joins every other task
//! so nothing outlives the call.

use crate::classify::Classifier;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::input::SequenceSource;
use crate::pipeline::channel;
use crate::pipeline::lifecycle::{StageId, StageReport};
use crate::pipeline::mapper::run_mapper;
use crate::pipeline::reducer::run_reducer;
use crate::pipeline::shuffle::{run_shuffler, ShuffleReport};
use crate::pipeline::sink::{run_sink, SinkReport};
use crate::pipeline::source::spawn_sources;
use crate::pipeline::task::{join_barrier, partition_results, root_cause, spawn_stage};
use crate::pipeline::types::{KeySet, Sequence, Summary};
use crate::render::{Renderer, TracingRenderer};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything observed during one successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// One summary per key that produced one, in key-set order
    pub summaries: Vec<Summary>,
    /// Sources, mappers, shuffler, shuffle drains, reducers, sink drains
    pub stages: Vec<StageReport>,
    /// Aggregate entries dropped for carrying an undeclared key
    pub dropped_values: u64,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn summary(&self, key: &str) -> Option<&Summary> {
        self.summaries.iter().find(|s| s.key == key)
    }

    pub fn stage(&self, stage: &StageId) -> Option<&StageReport> {
        self.stages.iter().find(|s| &s.stage == stage)
    }
}

/// A configured MapReduce topology
///
/// One `Pipeline` may be run several times; each run gets a fresh child of
/// the pipeline's cancellation token.
pub struct Pipeline {
    config: PipelineConfig,
    keys: Arc<KeySet>,
    classifier: Arc<dyn Classifier>,
    renderer: Arc<dyn Renderer>,
    cancellation_token: CancellationToken,
}

impl Pipeline {
    /// Validate `config` and build a pipeline with its default classifier
    /// and a tracing renderer
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        let keys = Arc::new(config.key_set()?);
        let classifier = config.classifier()?;
        Ok(Self {
            config,
            keys,
            classifier,
            renderer: Arc::new(TracingRenderer),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Token that aborts any in-flight run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Load sequences from `source` and run them to completion
    ///
    /// The deadline, if any, covers loading as well as the run itself.
    pub async fn run(&self, source: &dyn SequenceSource) -> PipelineResult<RunReport> {
        let started = Instant::now();
        let cancel = self.cancellation_token.child_token();
        let expires = self.expiry(started);

        let sequences = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage: StageId::Loader }),
            _ = until(expires) => Err(self.deadline_exceeded()),
            loaded = source.load() => loaded,
        }?;
        self.execute(sequences, cancel, started, expires).await
    }

    /// Run the topology over already-loaded sequences, one mapper each
    pub async fn run_sequences(&self, sequences: Vec<Sequence>) -> PipelineResult<RunReport> {
        let started = Instant::now();
        let cancel = self.cancellation_token.child_token();
        let expires = self.expiry(started);
        self.execute(sequences, cancel, started, expires).await
    }

    fn expiry(&self, started: Instant) -> Option<Instant> {
        self.config.deadline.map(|deadline| started + deadline)
    }

    fn deadline_exceeded(&self) -> PipelineError {
        PipelineError::DeadlineExceeded {
            deadline: self.config.deadline.unwrap_or_default(),
        }
    }

    async fn execute(
        &self,
        sequences: Vec<Sequence>,
        cancel: CancellationToken,
        started: Instant,
        expires: Option<Instant>,
    ) -> PipelineResult<RunReport> {
        self.check_sequence_count(sequences.len())?;

        let capacity = self.config.buffer_capacity;
        let mapper_count = sequences.len();
        info!(
            mappers = mapper_count,
            reducers = self.keys.len(),
            capacity,
            "pipeline run starting"
        );

        // Source -> mappers
        let (symbol_rxs, source_handles) = spawn_sources(sequences, capacity, &cancel);

        // Mappers -> shuffler
        let (aggregate_txs, aggregate_rxs) = channel::streams(mapper_count, capacity);
        let mapper_handles = symbol_rxs
            .into_iter()
            .zip(aggregate_txs)
            .enumerate()
            .map(|(index, (input, output))| {
                let classifier = Arc::clone(&self.classifier);
                let stage_cancel = cancel.clone();
                spawn_stage(StageId::Mapper(index), &cancel, async move {
                    run_mapper(index, input, output, classifier, stage_cancel).await
                })
            })
            .collect::<Vec<_>>();

        // Shuffler -> reducers
        let (partition_txs, partition_rxs) = channel::streams(self.keys.len(), capacity);
        let shuffle_handle = {
            let keys = Arc::clone(&self.keys);
            let policy = self.config.unknown_keys;
            let stage_cancel = cancel.clone();
            spawn_stage(StageId::Shuffler, &cancel, async move {
                run_shuffler(aggregate_rxs, partition_txs, keys, policy, stage_cancel).await
            })
        };

        // Reducers -> sink
        let (summary_txs, summary_rxs) = channel::streams(self.keys.len(), capacity);
        let reducer_handles = self
            .keys
            .iter()
            .zip(partition_rxs.into_iter().zip(summary_txs))
            .map(|(key, (input, output))| {
                let key = key.to_string();
                let policy = self.config.empty_partitions;
                let stage_cancel = cancel.clone();
                spawn_stage(StageId::Reducer(key.clone()), &cancel, async move {
                    run_reducer(key, input, output, policy, stage_cancel).await
                })
            })
            .collect::<Vec<_>>();

        let sink_inputs = self
            .keys
            .iter()
            .map(str::to_string)
            .zip(summary_rxs)
            .collect::<Vec<_>>();
        let (_, mut sink_handle) = {
            let renderer = Arc::clone(&self.renderer);
            let stage_cancel = cancel.clone();
            spawn_stage(StageId::Sink, &cancel, async move {
                run_sink(sink_inputs, renderer, stage_cancel).await
            })
        };

        // The sink returning is the completion point; the deadline races it
        let mut deadline_hit = false;
        let sink_joined = tokio::select! {
            joined = &mut sink_handle => joined,
            _ = until(expires) => {
                warn!(deadline = ?self.config.deadline, "pipeline deadline elapsed, cancelling");
                deadline_hit = true;
                cancel.cancel();
                sink_handle.await
            }
        };
        let sink_result = sink_joined.unwrap_or_else(|source| {
            Err(PipelineError::StageFailed {
                stage: StageId::Sink,
                source,
            })
        });

        // Join everything else so no task outlives the run
        let (sources, mut errors) = partition_results(join_barrier(source_handles).await);
        let (mappers, mapper_errors) = partition_results(join_barrier(mapper_handles).await);
        let (shuffles, shuffle_errors) =
            partition_results(join_barrier(vec![shuffle_handle]).await);
        let (reducers, reducer_errors) = partition_results(join_barrier(reducer_handles).await);
        errors.extend(mapper_errors);
        errors.extend(shuffle_errors);
        errors.extend(reducer_errors);

        let sink = match sink_result {
            Ok(sink) => Some(sink),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        if let Some(error) = root_cause(errors) {
            let error = if deadline_hit && error.is_cancellation() {
                self.deadline_exceeded()
            } else {
                error
            };
            warn!(error = %error, "pipeline run failed");
            return Err(error);
        }

        // Every stage succeeded, so all of these are present
        let (Some(shuffle), Some(sink)) = (shuffles.into_iter().next(), sink) else {
            return Err(PipelineError::Cancelled {
                stage: StageId::Shuffler,
            });
        };

        let report = assemble_report(sources, mappers, shuffle, reducers, sink, started);
        info!(
            summaries = report.summaries.len(),
            dropped = report.dropped_values,
            elapsed = ?report.elapsed,
            "pipeline run finished"
        );
        Ok(report)
    }

    fn check_sequence_count(&self, count: usize) -> PipelineResult<()> {
        if count == 0 {
            return Err(PipelineError::invalid_config(
                "mappers",
                "the source supplied no input sequences",
            ));
        }
        if let Some(expected) = self.config.mappers {
            if expected != count {
                return Err(PipelineError::invalid_config(
                    "mappers",
                    format!("expected {} input sequences, source supplied {}", expected, count),
                ));
            }
        }
        debug!(sequences = count, "sequence count accepted");
        Ok(())
    }
}

/// Resolve at `expires`, or never when there is no deadline
async fn until(expires: Option<Instant>) {
    match expires {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn assemble_report(
    sources: Vec<StageReport>,
    mappers: Vec<StageReport>,
    shuffle: ShuffleReport,
    reducers: Vec<StageReport>,
    sink: SinkReport,
    started: Instant,
) -> RunReport {
    let mut stages = Vec::with_capacity(
        sources.len() + mappers.len() + shuffle.stages.len() + reducers.len() + sink.stages.len(),
    );
    stages.extend(sources);
    stages.extend(mappers);
    stages.extend(shuffle.stages);
    stages.extend(reducers);
    stages.extend(sink.stages);

    RunReport {
        summaries: sink.summaries,
        stages,
        dropped_values: shuffle.dropped_values,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MemorySource;
    use crate::pipeline::lifecycle::StageState;
    use crate::pipeline::types::{EmptyPartitionPolicy, UnknownKeyPolicy};
    use crate::render::CollectingRenderer;
    use crate::testing::fixtures::{reference_source, tagged_sequences, PendingSource};

    #[tokio::test]
    async fn test_reference_scenario() {
        let renderer = Arc::new(CollectingRenderer::default());
        let pipeline = Pipeline::new(PipelineConfig::default())
            .unwrap()
            .with_renderer(renderer.clone());

        let report = pipeline.run(&reference_source()).await.unwrap();

        let noun = report.summary("noun").unwrap();
        assert_eq!((noun.sum, noun.count), (8, 3));
        assert!((noun.mean - 8.0 / 3.0).abs() < 1e-9);
        let verb = report.summary("verb").unwrap();
        assert_eq!((verb.sum, verb.count), (7, 3));
        assert!((verb.mean - 7.0 / 3.0).abs() < 1e-9);

        assert_eq!(renderer.summaries().len(), 2);
        assert_eq!(report.dropped_values, 0);
        // 3 sources, 3 mappers, shuffler + 3 drains, 2 reducers, 2 sink drains
        assert_eq!(report.stages.len(), 14);
        assert!(report.stages.iter().all(|s| s.state == StageState::Closed));
    }

    #[tokio::test]
    async fn test_every_mapper_and_reducer_emits_once() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline.run(&reference_source()).await.unwrap();

        for index in 0..3 {
            assert_eq!(report.stage(&StageId::Mapper(index)).unwrap().emitted, 1);
        }
        for key in ["noun", "verb"] {
            let reducer = report.stage(&StageId::Reducer(key.to_string())).unwrap();
            assert_eq!(reducer.received, 3);
            assert_eq!(reducer.emitted, 1);
        }
    }

    #[tokio::test]
    async fn test_mapper_count_is_enforced() {
        let config = PipelineConfig {
            mappers: Some(2),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let err = pipeline.run(&reference_source()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration { .. }));
    }

    #[tokio::test]
    async fn test_empty_source_is_rejected() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.run(&MemorySource::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration { .. }));
    }

    #[tokio::test]
    async fn test_undeclared_keys_dropped_by_default() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let source = MemorySource::from_words(&[&["noun", "adverb", "verb"][..]]);
        let report = pipeline.run(&source).await.unwrap();
        assert_eq!(report.dropped_values, 1);
        assert_eq!(report.summaries.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_key_fails_run() {
        let config = PipelineConfig {
            unknown_keys: UnknownKeyPolicy::Reject,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let source = MemorySource::from_words(&[&["noun"][..], &["adverb"][..]]);
        let err = pipeline.run(&source).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownKey { mapper: 1, .. }));
    }

    #[tokio::test]
    async fn test_empty_partition_policy_applies() {
        let config = PipelineConfig {
            empty_partitions: EmptyPartitionPolicy::Skip,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let source = MemorySource::from_words(&[&["noun", "noun"][..]]);
        let report = pipeline.run(&source).await.unwrap();
        assert_eq!(report.summaries.len(), 1);
        assert!(report.summary("verb").is_none());
        assert_eq!(
            report
                .stage(&StageId::Reducer("verb".to_string()))
                .unwrap()
                .emitted,
            0
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_run() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        pipeline.cancellation_token().cancel();
        let err = pipeline.run(&reference_source()).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_source_hits_deadline() {
        let config = PipelineConfig {
            deadline: Some(Duration::from_secs(5)),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let err = pipeline.run(&PendingSource).await.unwrap_err();
        assert!(
            matches!(err, PipelineError::DeadlineExceeded { deadline } if deadline == Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_cancel_while_loading() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let token = pipeline.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let err = pipeline.run(&PendingSource).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: StageId::Loader
            }
        ));
    }

    #[tokio::test]
    async fn test_pipeline_is_reusable() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let first = pipeline.run(&reference_source()).await.unwrap();
        let second = pipeline.run(&reference_source()).await.unwrap();
        assert_eq!(first.summaries, second.summaries);
    }

    #[tokio::test]
    async fn test_terminates_for_every_capacity() {
        for capacity in 1..=4 {
            let config = PipelineConfig {
                buffer_capacity: capacity,
                ..PipelineConfig::default()
            };
            let pipeline = Pipeline::new(config).unwrap();
            let sequences = tagged_sequences(8, 50, &["noun", "verb"]);

            let report = tokio::time::timeout(
                Duration::from_secs(10),
                pipeline.run_sequences(sequences),
            )
            .await
            .expect("run terminates")
            .unwrap();

            let noun = report.summary("noun").unwrap();
            let verb = report.summary("verb").unwrap();
            assert_eq!(noun.sum + verb.sum, 8 * 50, "capacity {capacity}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_cancels_running_topology() {
        let config = PipelineConfig {
            deadline: Some(Duration::from_millis(5)),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(config).unwrap();
        let sequences = tagged_sequences(8, 100_000, &["noun", "verb"]);

        let err = tokio::time::timeout(
            Duration::from_secs(30),
            pipeline.run_sequences(sequences),
        )
        .await
        .expect("run returns once the deadline cancels it")
        .unwrap_err();

        assert!(
            matches!(err, PipelineError::DeadlineExceeded { deadline } if deadline == Duration::from_millis(5))
        );
        // Only the run's child token is cancelled
        assert!(!pipeline.cancellation_token().is_cancelled());
    }

    struct EverythingIsANoun;

    impl Classifier for EverythingIsANoun {
        fn classify(&self, _symbol: &crate::pipeline::types::Symbol) -> Option<String> {
            Some("noun".to_string())
        }
    }

    #[tokio::test]
    async fn test_custom_classifier_decides_keys() {
        let pipeline = Pipeline::new(PipelineConfig::default())
            .unwrap()
            .with_classifier(Arc::new(EverythingIsANoun));

        let report = pipeline.run(&reference_source()).await.unwrap();

        let noun = report.summary("noun").unwrap();
        assert_eq!((noun.sum, noun.count), (15, 3));
        assert!((noun.mean - 5.0).abs() < 1e-9);
        let verb = report.summary("verb").unwrap();
        assert_eq!(verb.count, 0);
        assert!(verb.mean.is_nan());
    }
}

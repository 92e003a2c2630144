use crate::features::sampler::Sampler;
use crate::features::snapshot::Snapshot;
use crate::shared::config::AgentConfig;
use crate::shared::error::{AgentError, CollectionError};
use crate::shared::traits::{DataCollector, MetricSource, Reporter};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Sampling,
    Reporting,
}

/// How a single tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Delivered,
    SamplingFailed,
    EncodingFailed,
    DeliveryFailed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleStats {
    pub cycles: u64,
    pub delivered: u64,
    pub sampling_failures: u64,
    pub delivery_failures: u64,
    pub last_delivery: Option<DateTime<Utc>>,
}

/// Sample, encode, report; once per tick, never overlapping.
pub struct AgentLoop<S, R> {
    sampler: Arc<Mutex<Sampler<S>>>,
    reporter: R,
    interval: Duration,
    state: AgentState,
    stats: CycleStats,
}

impl<S, R> AgentLoop<S, R>
where
    S: MetricSource + Send + 'static,
    R: Reporter + Send + Sync,
{
    pub fn new(config: &AgentConfig, sampler: Sampler<S>, reporter: R) -> Self {
        Self::with_interval(config.interval(), sampler, reporter)
    }

    /// A zero `interval` is raised to one millisecond; tokio timers need a non-zero period.
    pub fn with_interval(interval: Duration, sampler: Sampler<S>, reporter: R) -> Self {
        let interval = if interval.is_zero() {
            warn!("Zero collection interval requested, using {:?}", MIN_INTERVAL);
            MIN_INTERVAL
        } else {
            interval
        };
        Self {
            sampler: Arc::new(Mutex::new(sampler)),
            reporter,
            interval,
            state: AgentState::Idle,
            stats: CycleStats::default(),
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Runs until `cancel` fires. A cycle in flight is always finished first.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Agent loop started, collecting every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }

        info!(
            "Agent loop stopped after {} cycles ({} delivered)",
            self.stats.cycles, self.stats.delivered
        );
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.cycles += 1;
        let outcome = self.attempt().await;
        self.state = AgentState::Idle;
        outcome
    }

    async fn attempt(&mut self) -> CycleOutcome {
        self.state = AgentState::Sampling;
        let snapshot = match self.sample().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.sampling_failures += 1;
                warn!("Skipping cycle {}: {}", self.stats.cycles, e);
                return CycleOutcome::SamplingFailed;
            }
        };

        self.state = AgentState::Reporting;
        let payload = match snapshot.encode() {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.delivery_failures += 1;
                warn!("Dropping snapshot for cycle {}: {}", self.stats.cycles, AgentError::from(e));
                return CycleOutcome::EncodingFailed;
            }
        };

        match self.reporter.report(payload).await {
            Ok(()) => {
                self.stats.delivered += 1;
                self.stats.last_delivery = Some(Utc::now());
                debug!("Delivered snapshot for cycle {}", self.stats.cycles);
                CycleOutcome::Delivered
            }
            Err(e) => {
                self.stats.delivery_failures += 1;
                warn!("Snapshot for cycle {} not delivered: {}", self.stats.cycles, AgentError::from(e));
                CycleOutcome::DeliveryFailed
            }
        }
    }

    /// The sampler blocks (CPU window, OS queries), so it runs on the blocking pool.
    async fn sample(&self) -> Result<Snapshot, AgentError> {
        let sampler = Arc::clone(&self.sampler);
        let snapshot = tokio::task::spawn_blocking(move || {
            // a panic in an earlier cycle must not stop later ones
            let mut sampler = sampler.lock().unwrap_or_else(PoisonError::into_inner);
            sampler.collect()
        })
        .await
        .map_err(|e| CollectionError::Aborted(format!("sampler task failed: {}", e)))??;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sampler::StubSource;
    use crate::features::snapshot::Bandwidth;
    use crate::shared::error::{DeliveryError, Metric};
    use async_trait::async_trait;
    use std::path::Path;

    #[derive(Debug, Clone)]
    struct Call {
        started: Instant,
        finished: Instant,
        body: Vec<u8>,
    }

    /// Records every POST; optionally cancels the loop after `stop_after` calls.
    #[derive(Default)]
    struct RecordingReporter {
        calls: Mutex<Vec<Call>>,
        reject: bool,
        slow_first: Duration,
        stop_after: Option<(usize, CancellationToken)>,
    }

    impl RecordingReporter {
        fn stopping_after(count: usize, cancel: CancellationToken) -> Self {
            Self {
                stop_after: Some((count, cancel)),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Reporter for RecordingReporter {
        async fn report(&self, payload: Vec<u8>) -> Result<(), DeliveryError> {
            let started = Instant::now();
            let mut delay = Duration::from_millis(5);
            if self.calls.lock().unwrap().is_empty() {
                delay += self.slow_first;
            }
            tokio::time::sleep(delay).await;
            let count = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Call {
                    started,
                    finished: Instant::now(),
                    body: payload,
                });
                calls.len()
            };
            if let Some((limit, cancel)) = &self.stop_after {
                if count >= *limit {
                    cancel.cancel();
                }
            }
            if self.reject {
                return Err(DeliveryError::Rejected(reqwest::StatusCode::SERVICE_UNAVAILABLE));
            }
            Ok(())
        }
    }

    /// Fails the CPU read for the first `failures` cycles.
    struct FlakyCpuSource {
        inner: StubSource,
        failures: usize,
    }

    impl MetricSource for FlakyCpuSource {
        fn cpu_utilization(&mut self, window: Duration) -> Result<f64, CollectionError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(CollectionError::unavailable(Metric::Cpu, "permission denied"));
            }
            self.inner.cpu_utilization(window)
        }

        fn memory_utilization(&mut self) -> Result<f64, CollectionError> {
            self.inner.memory_utilization()
        }

        fn disk_usage(&mut self, mount: &Path) -> Result<f64, CollectionError> {
            self.inner.disk_usage(mount)
        }

        fn bandwidth(&mut self) -> Result<Bandwidth, CollectionError> {
            self.inner.bandwidth()
        }
    }

    fn agent<S: MetricSource + Send + 'static>(
        source: S,
        interval: Duration,
        reporter: RecordingReporter,
    ) -> AgentLoop<S, RecordingReporter> {
        AgentLoop::with_interval(interval, Sampler::new(source, "/", Duration::ZERO), reporter)
    }

    #[tokio::test]
    async fn delivers_exact_payload_as_one_post() {
        let mut agent = agent(StubSource::healthy(), Duration::from_secs(60), RecordingReporter::default());

        assert_eq!(agent.run_cycle().await, CycleOutcome::Delivered);

        let calls = agent.reporter().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            String::from_utf8(calls[0].body.clone()).unwrap(),
            r#"{"cpu_utilization":42.5,"memory_utilization":60.0,"disk_usage":75.3,"bandwidth_usage":{"bytes_sent":1000,"bytes_recv":2000}}"#
        );
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.stats().delivered, 1);
        assert!(agent.stats().last_delivery.is_some());
    }

    #[tokio::test]
    async fn failed_read_sends_nothing() {
        let mut source = StubSource::healthy();
        source.cpu = None;
        let mut agent = agent(source, Duration::from_secs(60), RecordingReporter::default());

        assert_eq!(agent.run_cycle().await, CycleOutcome::SamplingFailed);
        assert!(agent.reporter().calls().is_empty());
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.stats().sampling_failures, 1);
    }

    #[tokio::test]
    async fn delivery_failure_is_counted_not_fatal() {
        let reporter = RecordingReporter {
            reject: true,
            ..RecordingReporter::default()
        };
        let mut agent = agent(StubSource::healthy(), Duration::from_secs(60), reporter);

        assert_eq!(agent.run_cycle().await, CycleOutcome::DeliveryFailed);
        assert_eq!(agent.run_cycle().await, CycleOutcome::DeliveryFailed);
        assert_eq!(agent.reporter().calls().len(), 2);
        assert_eq!(agent.stats().delivery_failures, 2);
        assert_eq!(agent.stats().last_delivery, None);
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn loop_survives_failed_cycles() {
        let cancel = CancellationToken::new();
        let source = FlakyCpuSource {
            inner: StubSource::healthy(),
            failures: 2,
        };
        let mut agent = agent(
            source,
            Duration::from_millis(10),
            RecordingReporter::stopping_after(1, cancel.clone()),
        );

        tokio::time::timeout(Duration::from_secs(5), agent.run(cancel))
            .await
            .expect("loop did not stop");

        assert_eq!(agent.stats().cycles, 3);
        assert_eq!(agent.stats().sampling_failures, 2);
        assert_eq!(agent.stats().delivered, 1);
        assert_eq!(agent.reporter().calls().len(), 1);
    }

    #[tokio::test]
    async fn one_post_per_tick_without_overlap() {
        let cancel = CancellationToken::new();
        let period = Duration::from_millis(20);
        let mut agent = agent(
            StubSource::healthy(),
            period,
            RecordingReporter::stopping_after(4, cancel.clone()),
        );

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(5), agent.run(cancel))
            .await
            .expect("loop did not stop");

        let calls = agent.reporter().calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(agent.stats().cycles, 4);
        for pair in calls.windows(2) {
            assert!(pair[0].finished <= pair[1].started, "cycles overlapped");
        }
        assert!(calls[0].started >= started + period);
    }

    #[tokio::test]
    async fn cancelled_before_first_tick_runs_no_cycle() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut agent = agent(StubSource::healthy(), Duration::from_millis(10), RecordingReporter::default());

        agent.run(cancel).await;

        assert_eq!(agent.stats().cycles, 0);
        assert!(agent.reporter().calls().is_empty());
    }

    /// Panics on the first CPU read, then behaves.
    struct PanicOnceSource {
        inner: StubSource,
        panicked: bool,
    }

    impl MetricSource for PanicOnceSource {
        fn cpu_utilization(&mut self, window: Duration) -> Result<f64, CollectionError> {
            if !self.panicked {
                self.panicked = true;
                panic!("driver fault");
            }
            self.inner.cpu_utilization(window)
        }

        fn memory_utilization(&mut self) -> Result<f64, CollectionError> {
            self.inner.memory_utilization()
        }

        fn disk_usage(&mut self, mount: &Path) -> Result<f64, CollectionError> {
            self.inner.disk_usage(mount)
        }

        fn bandwidth(&mut self) -> Result<Bandwidth, CollectionError> {
            self.inner.bandwidth()
        }
    }

    #[tokio::test]
    async fn sampler_panic_only_costs_one_cycle() {
        let source = PanicOnceSource {
            inner: StubSource::healthy(),
            panicked: false,
        };
        let mut agent = agent(source, Duration::from_secs(60), RecordingReporter::default());

        assert_eq!(agent.run_cycle().await, CycleOutcome::SamplingFailed);
        assert_eq!(agent.run_cycle().await, CycleOutcome::Delivered);
        assert_eq!(agent.run_cycle().await, CycleOutcome::Delivered);
        assert_eq!(agent.reporter().calls().len(), 2);
        assert_eq!(agent.stats().sampling_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cycle_is_not_followed_by_catch_up_ticks() {
        let cancel = CancellationToken::new();
        let period = Duration::from_millis(20);
        let reporter = RecordingReporter {
            slow_first: Duration::from_millis(100),
            ..RecordingReporter::stopping_after(4, cancel.clone())
        };
        let mut agent = agent(StubSource::healthy(), period, reporter);

        let started = Instant::now();
        agent.run(cancel).await;
        let elapsed = started.elapsed();

        let calls = agent.reporter().calls();
        assert_eq!(calls.len(), 4);
        // the first cycle overran five periods; later cycles stay one period apart
        for pair in calls[1..].windows(2) {
            assert!(
                pair[1].started - pair[0].started >= period,
                "missed ticks were replayed back to back"
            );
        }
        let ticks_that_fit = (elapsed.as_millis() / period.as_millis()) as u64;
        assert!(agent.stats().cycles <= ticks_that_fit);
    }

    #[tokio::test]
    async fn zero_interval_does_not_panic() {
        let cancel = CancellationToken::new();
        let mut agent = agent(
            StubSource::healthy(),
            Duration::ZERO,
            RecordingReporter::stopping_after(2, cancel.clone()),
        );

        tokio::time::timeout(Duration::from_secs(5), agent.run(cancel))
            .await
            .expect("loop did not stop");

        assert_eq!(agent.stats().delivered, 2);
    }
}

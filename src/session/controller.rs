use std::{
    collections::BTreeMap,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use futures::FutureExt;
use uuid::Uuid;

use crate::{
    aggregation::{summarize, EnergySummary},
    carbon::{budget, BudgetStatus, CarbonFootprint, FootprintCalculator},
    metrics::Measurement,
    sensing::{Sampler, SamplerConfig},
};

use super::state::{SessionReport, SessionState, SessionStatus, WorkloadOutcome};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub name: String,
    /// When set, every finished session is checked against this daily budget.
    pub daily_budget_kg: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "ML Training".into(),
            daily_budget_kg: None,
        }
    }
}

/// Brackets a workload with energy sampling and turns what was sampled into
/// a footprint once the workload ends.
///
/// Each `track` (or `start`/`stop` pair) is one session with a fresh sample
/// buffer and exactly one report. Emissions accumulate across sessions for the
/// budget check.
pub struct CarbonSession {
    config: SessionConfig,
    sampler: Sampler,
    calculator: FootprintCalculator,
    state: SessionState,
    report: Option<SessionReport>,
    cumulative_kg: f64,
    /// Set while a `track` call owns the running session.
    tracking: bool,
}

impl CarbonSession {
    pub fn new(config: SessionConfig, sampler: Sampler, calculator: FootprintCalculator) -> Self {
        Self {
            config,
            sampler,
            calculator,
            state: SessionState::new(),
            report: None,
            cumulative_kg: 0.0,
            tracking: false,
        }
    }

    pub fn with_hardware(
        config: SessionConfig,
        sampler_config: SamplerConfig,
        calculator: FootprintCalculator,
    ) -> Self {
        Self::new(config, Sampler::with_hardware(sampler_config), calculator)
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn elapsed(&self) -> Duration {
        self.state.elapsed()
    }

    /// Run `workload` inside a session.
    ///
    /// Sampling stops and the footprint is computed on every exit path: `Ok`,
    /// `Err` or panic. The workload's result is returned untouched and a panic
    /// is resumed after accounting.
    ///
    /// If the returned future is dropped before the workload finishes,
    /// sampling halts at once and the session is closed as
    /// [`WorkloadOutcome::Abandoned`] by the next `track` or `stop`.
    ///
    /// Blocking work should go through `spawn_blocking` so the sampler keeps
    /// its runtime thread.
    pub async fn track<F, T, E>(&mut self, workload: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        if self.state.status == SessionStatus::Running {
            log_warn!(
                "closing unfinished carbon session '{}' before tracking a new workload",
                self.config.name
            );
            let outcome = self.pending_outcome();
            self.finish(outcome).await;
        }

        self.start().await;
        self.tracking = true;

        let guard = self.sampler.halt_guard();
        let result = AssertUnwindSafe(workload).catch_unwind().await;
        guard.disarm();
        let outcome = match &result {
            Ok(Ok(_)) => WorkloadOutcome::Succeeded,
            Ok(Err(_)) => WorkloadOutcome::Failed,
            Err(_) => WorkloadOutcome::Panicked,
        };

        self.finish(outcome).await;

        match result {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Begin a session by hand. Returns `false` if one is already running.
    pub async fn start(&mut self) -> bool {
        if self.state.status == SessionStatus::Running {
            log_warn!(
                "carbon session '{}' already running, ignoring start",
                self.config.name
            );
            return false;
        }

        let session_id = Uuid::new_v4().to_string();
        log_info!(
            "starting carbon-aware session '{}' ({session_id})",
            self.config.name
        );

        self.log_current_intensity().await;

        self.state.begin(session_id, Utc::now(), Instant::now());
        if !self.sampler.start() {
            log_warn!("energy sampling did not start; the session will report no consumption");
        }
        true
    }

    /// End a session started with [`start`](Self::start).
    pub async fn stop(&mut self) -> Option<&SessionReport> {
        let outcome = self.pending_outcome();
        self.finish(outcome).await;
        self.report.as_ref()
    }

    fn pending_outcome(&self) -> WorkloadOutcome {
        if self.tracking {
            WorkloadOutcome::Abandoned
        } else {
            WorkloadOutcome::Unknown
        }
    }

    async fn finish(&mut self, outcome: WorkloadOutcome) {
        if self.state.status != SessionStatus::Running {
            log_warn!("carbon session '{}' is not running", self.config.name);
            return;
        }

        let stop_outcome = self.sampler.stop().await;
        let measurements = self.sampler.snapshot();
        let summary = summarize(&measurements);
        let footprint = self.compute_footprint(summary).await;

        self.cumulative_kg += footprint.total_co2_kg();
        let budget = self.config.daily_budget_kg.map(|daily_budget_kg| {
            let status = budget::status(self.cumulative_kg, Some(daily_budget_kg));
            if status.exceeded {
                log_warn!(
                    "carbon budget exceeded! used {:.6}kg, budget was {:.6}kg",
                    status.used_kg,
                    status.daily_budget_kg
                );
            }
            status
        });

        let session_id = self.state.session_id.clone().unwrap_or_default();
        let started_at = self.state.started_at.unwrap_or_else(Utc::now);
        self.state.complete();
        self.tracking = false;

        log_info!(
            "session '{}' completed ({:?}, {} samples)",
            self.config.name,
            outcome,
            summary.sample_count
        );
        log_info!("{footprint}");

        self.report = Some(SessionReport {
            id: session_id,
            name: self.config.name.clone(),
            started_at,
            ended_at: Utc::now(),
            outcome,
            summary,
            footprint,
            budget,
            stop_outcome,
            system: self.sampler.info().clone(),
        });
    }

    async fn compute_footprint(&self, summary: EnergySummary) -> CarbonFootprint {
        if tokio::runtime::Handle::try_current().is_err() {
            return self.calculator.calculate(&summary, None);
        }

        // The cache may block on an upstream request.
        let calculator = self.calculator.clone();
        match tokio::task::spawn_blocking(move || calculator.calculate(&summary, None)).await {
            Ok(footprint) => footprint,
            Err(err) => {
                log_error!("footprint calculation failed, using static intensity: {err}");
                self.calculator.calculate_offline(&summary)
            }
        }
    }

    async fn log_current_intensity(&self) {
        let cache = Arc::clone(self.calculator.cache());
        let region = self.calculator.region().to_string();
        let lookup_region = region.clone();

        let lookup = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime.spawn_blocking(move || cache.get(&lookup_region)).await,
            Err(_) => Ok(cache.get(&lookup_region)),
        };

        match lookup {
            Ok(Some(intensity)) => {
                log_info!("initial carbon intensity in {region}: {intensity} gCO2eq/kWh")
            }
            Ok(None) => log_info!("carbon intensity for {region} currently unavailable"),
            Err(err) => log_warn!("carbon intensity lookup failed: {err}"),
        }
    }

    pub fn report(&self) -> Option<&SessionReport> {
        self.report.as_ref()
    }

    pub fn summary(&self) -> Option<&EnergySummary> {
        self.report.as_ref().map(|report| &report.summary)
    }

    /// Footprint of the last finished session, `None` until one has run.
    pub fn footprint(&self) -> Option<&CarbonFootprint> {
        let footprint = self.report.as_ref().map(|report| &report.footprint);
        if footprint.is_none() {
            log_warn!("no carbon session has completed yet, footprint unavailable");
        }
        footprint
    }

    pub fn budget(&self) -> Option<&BudgetStatus> {
        self.report.as_ref().and_then(|report| report.budget.as_ref())
    }

    pub fn equivalents(&self) -> BTreeMap<&'static str, String> {
        self.report
            .as_ref()
            .map(|report| report.footprint.equivalents())
            .unwrap_or_default()
    }

    /// Latest sample of the running (or last) session.
    pub fn latest_measurement(&self) -> Option<Measurement> {
        self.sampler.latest()
    }

    pub fn cumulative_kg(&self) -> f64 {
        self.cumulative_kg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carbon::{IntensityCache, IntensitySource, StaticIntensityProvider};
    use crate::metrics::Reading;
    use crate::sensing::{MeasurementSource, StopOutcome};

    struct SteadyLoad;

    impl MeasurementSource for SteadyLoad {
        fn sample(&mut self) -> anyhow::Result<Reading> {
            Ok(Reading {
                cpu_power_w: 100.0,
                cpu_util_pct: 80.0,
                memory_gb: 2.0,
                ..Reading::default()
            })
        }
    }

    #[derive(Debug, PartialEq)]
    struct TrainingDiverged(u32);

    /// Answers promptly a few times, then hangs on every read.
    struct WedgedAfter {
        prompt_reads: usize,
    }

    impl MeasurementSource for WedgedAfter {
        fn sample(&mut self) -> anyhow::Result<Reading> {
            if self.prompt_reads == 0 {
                std::thread::sleep(Duration::from_millis(800));
            } else {
                self.prompt_reads -= 1;
            }
            Ok(Reading {
                cpu_power_w: 100.0,
                ..Reading::default()
            })
        }
    }

    fn session(daily_budget_kg: Option<f64>) -> CarbonSession {
        let sampler = Sampler::new(
            SteadyLoad,
            SamplerConfig {
                interval: Duration::from_millis(20),
                stop_timeout: Duration::from_secs(2),
            },
        );
        session_with(sampler, daily_budget_kg)
    }

    fn session_with(sampler: Sampler, daily_budget_kg: Option<f64>) -> CarbonSession {
        let provider = StaticIntensityProvider::new().with_region("GB", 400.0);
        let cache = Arc::new(IntensityCache::with_default_ttl(Arc::new(provider)));
        CarbonSession::new(
            SessionConfig {
                name: "unit".into(),
                daily_budget_kg,
            },
            sampler,
            FootprintCalculator::new("GB", cache),
        )
    }

    #[tokio::test]
    async fn footprint_is_unavailable_before_any_session() {
        let session = session(None);
        assert!(session.footprint().is_none());
        assert!(session.summary().is_none());
        assert!(session.equivalents().is_empty());
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn successful_workload_is_accounted() {
        let mut session = session(None);
        let value = session
            .track(async {
                tokio::time::sleep(Duration::from_millis(120)).await;
                Ok::<_, TrainingDiverged>(7)
            })
            .await;

        assert_eq!(value, Ok(7));
        assert_eq!(session.status(), SessionStatus::Completed);

        let report = session.report().unwrap();
        assert_eq!(report.outcome, WorkloadOutcome::Succeeded);
        assert_eq!(report.stop_outcome, StopOutcome::Stopped);
        assert!(report.summary.sample_count >= 2);
        assert!(report.summary.energy.total_kwh > 0.0);

        let footprint = session.footprint().unwrap();
        assert_eq!(footprint.avg_carbon_intensity(), 400.0);
        assert_eq!(footprint.intensity_source(), Some(IntensitySource::Cache));
        assert!(footprint.total_co2_grams() > 0.0);
        assert!(session.budget().is_none());
        assert!(!session.equivalents().is_empty());
    }

    #[tokio::test]
    async fn failing_workload_still_produces_a_footprint() {
        let mut session = session(None);
        let result: Result<(), TrainingDiverged> = session
            .track(async {
                tokio::time::sleep(Duration::from_millis(60)).await;
                Err(TrainingDiverged(3))
            })
            .await;

        assert_eq!(result, Err(TrainingDiverged(3)));
        let report = session.report().unwrap();
        assert_eq!(report.outcome, WorkloadOutcome::Failed);
        assert!(report.summary.sample_count >= 1);
        assert!(session.footprint().is_some());
    }

    #[tokio::test]
    async fn panicking_workload_is_accounted_then_resumed() {
        let mut session = session(None);
        let caught = AssertUnwindSafe(session.track(async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            if true {
                panic!("loss is NaN");
            }
            Ok::<(), TrainingDiverged>(())
        }))
        .catch_unwind()
        .await;

        assert!(caught.is_err());
        let report = session.report().unwrap();
        assert_eq!(report.outcome, WorkloadOutcome::Panicked);
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn budget_exceedance_is_reported_not_raised() {
        let mut session = session(Some(1e-12));
        let result = session
            .track(async {
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok::<_, TrainingDiverged>(())
            })
            .await;

        assert!(result.is_ok());
        let budget = session.budget().unwrap();
        assert!(budget.exceeded);
        assert_eq!(budget.remaining_kg, 0.0);
    }

    #[tokio::test]
    async fn emissions_accumulate_across_sessions() {
        let mut session = session(Some(10.0));
        for _ in 0..2 {
            session
                .track(async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, TrainingDiverged>(())
                })
                .await
                .unwrap();
        }

        let last = session.footprint().unwrap().total_co2_kg();
        assert!(session.cumulative_kg() > last);
        assert_eq!(session.budget().unwrap().used_kg, session.cumulative_kg());
    }

    #[tokio::test]
    async fn manual_start_and_stop() {
        let mut session = session(None);
        assert!(session.start().await);
        assert!(!session.start().await);
        assert_eq!(session.status(), SessionStatus::Running);

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(session.latest_measurement().is_some());

        let report = session.stop().await.unwrap();
        assert_eq!(report.outcome, WorkloadOutcome::Unknown);
        assert!(report.summary.sample_count >= 2);
    }

    #[tokio::test]
    async fn stop_without_start_reports_nothing() {
        let mut session = session(None);
        assert!(session.stop().await.is_none());
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn dropped_track_halts_sampling_and_is_not_merged() {
        let mut session = session(None);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(80),
            session.track(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, TrainingDiverged>(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(session.status(), SessionStatus::Running);

        let halted = session.latest_measurement();
        assert!(halted.is_some());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.latest_measurement(), halted);

        let value = session
            .track(async { Ok::<_, TrainingDiverged>(1) })
            .await;
        assert_eq!(value, Ok(1));

        let report = session.report().unwrap();
        assert_eq!(report.outcome, WorkloadOutcome::Succeeded);
        assert!(report.summary.sample_count <= 2);
        assert!(report.summary.duration_seconds < 0.05);
        // The abandoned run was accounted on its own.
        assert!(session.cumulative_kg() > report.footprint.total_co2_kg());
    }

    #[tokio::test]
    async fn stop_closes_an_abandoned_track() {
        let mut session = session(None);
        let _ = tokio::time::timeout(
            Duration::from_millis(80),
            session.track(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, TrainingDiverged>(())
            }),
        )
        .await;

        let report = session.stop().await.unwrap();
        assert_eq!(report.outcome, WorkloadOutcome::Abandoned);
        assert_eq!(report.stop_outcome, StopOutcome::Stopped);
        assert!(report.summary.sample_count >= 2);
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn stop_timeout_still_accounts_collected_samples() {
        let sampler = Sampler::new(
            WedgedAfter { prompt_reads: 3 },
            SamplerConfig {
                interval: Duration::from_millis(10),
                stop_timeout: Duration::from_millis(100),
            },
        );
        let mut session = session_with(sampler, None);

        let began = Instant::now();
        let result = session
            .track(async {
                tokio::time::sleep(Duration::from_millis(80)).await;
                Ok::<_, TrainingDiverged>(())
            })
            .await;
        let waited = began.elapsed();

        assert!(result.is_ok());
        assert!(waited < Duration::from_millis(600), "track took {waited:?}");

        let report = session.report().unwrap();
        assert_eq!(report.stop_outcome, StopOutcome::TimedOut);
        assert!(report.summary.sample_count >= 2);
        assert!(report.summary.energy.total_kwh > 0.0);
        assert!(session.footprint().unwrap().total_co2_grams() > 0.0);
    }

    #[test]
    fn track_without_tokio_runtime_reports_no_consumption() {
        let mut session = session(None);
        let value = futures::executor::block_on(
            session.track(async { Ok::<_, TrainingDiverged>(1) }),
        );
        assert_eq!(value, Ok(1));

        let report = session.report().unwrap();
        assert_eq!(report.outcome, WorkloadOutcome::Succeeded);
        assert_eq!(report.stop_outcome, StopOutcome::NotRunning);
        assert_eq!(report.summary.sample_count, 0);
        assert_eq!(report.footprint.total_co2_kg(), 0.0);
    }
}

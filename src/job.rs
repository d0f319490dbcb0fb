//! Calculation job: one timed, scored invocation of the packing engine.
//!
//! A job can run synchronously ([`CalculationJob::run`]) or on tokio's
//! blocking pool ([`CalculationJob::spawn`]). A spawned job can be polled for
//! its status, streamed for progress events and awaited for its result.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::model::{Container, Item, Placement, ValidationError};
use crate::optimizer::{
    PackEvent, PackingConfig, PackingResult, UnplacedItem, count_by_line, pack_with_progress,
};
use crate::types::Dimensional;

/// Algorithm tag reported with every result.
pub const ALGORITHM: &str = "maxspace-bssf/1";

/// Status of a calculation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl CalculationStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, CalculationStatus::Completed | CalculationStatus::Failed)
    }
}

/// Weights of volume and weight utilization in the efficiency score.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub volume: f64,
    pub weight: f64,
}

impl ScoreWeights {
    pub const DEFAULT_VOLUME: f64 = 0.7;
    pub const DEFAULT_WEIGHT: f64 = 0.3;

    pub fn new(volume: f64, weight: f64) -> Result<Self, ValidationError> {
        let weights = Self { volume, weight };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let valid = |w: f64| w.is_finite() && w >= 0.0;
        if !valid(self.volume) || !valid(self.weight) {
            return Err(ValidationError::InvalidConfiguration(format!(
                "score weights must be non-negative, got volume={} weight={}",
                self.volume, self.weight
            )));
        }
        if self.volume + self.weight <= 0.0 {
            return Err(ValidationError::InvalidConfiguration(
                "score weights must not both be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Weighted average of the two utilizations.
    pub fn combine(&self, volume_utilization: f64, weight_utilization: f64) -> f64 {
        (self.volume * volume_utilization + self.weight * weight_utilization)
            / (self.volume + self.weight)
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            volume: Self::DEFAULT_VOLUME,
            weight: Self::DEFAULT_WEIGHT,
        }
    }
}

/// Outcome of one calculation. Superseded, never mutated, by a recalculation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalculationResult {
    pub job_id: Uuid,
    pub algorithm: String,
    pub status: CalculationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    /// Placed volume / container volume (0..=1)
    pub volume_utilization: f64,
    /// Placed weight / container payload (0..=1)
    pub weight_utilization: f64,
    pub efficiency_score: f64,
    pub placed_weight: f64,
    pub placed_volume: f64,
    pub placements: Vec<Placement>,
    pub unplaced: Vec<UnplacedItem>,
    /// Why the calculation could not run, for failed results
    pub error: Option<String>,
}

impl CalculationResult {
    fn completed(
        job_id: Uuid,
        started_at: DateTime<Utc>,
        container: &Container,
        weights: &ScoreWeights,
        packing: PackingResult,
    ) -> Self {
        let finished_at = Utc::now();
        let placed_weight = packing.placed_weight();
        let placed_volume = packing.placed_volume();
        let volume_utilization = placed_volume / container.volume();
        let weight_utilization = placed_weight / container.max_weight;

        Self {
            job_id,
            algorithm: ALGORITHM.to_string(),
            status: CalculationStatus::Completed,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            volume_utilization,
            weight_utilization,
            efficiency_score: weights.combine(volume_utilization, weight_utilization),
            placed_weight,
            placed_volume,
            placements: packing.placements,
            unplaced: packing.unplaced,
            error: None,
        }
    }

    fn failed(job_id: Uuid, started_at: DateTime<Utc>, error: String) -> Self {
        let finished_at = Utc::now();
        Self {
            job_id,
            algorithm: ALGORITHM.to_string(),
            status: CalculationStatus::Failed,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            volume_utilization: 0.0,
            weight_utilization: 0.0,
            efficiency_score: 0.0,
            placed_weight: 0.0,
            placed_volume: 0.0,
            placements: Vec::new(),
            unplaced: Vec::new(),
            error: Some(error),
        }
    }

    pub fn duration(&self) -> TimeDelta {
        self.finished_at - self.started_at
    }

    pub fn placed_count(&self) -> usize {
        self.placements.len()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }

    /// Number of unplaced units per source line.
    pub fn unplaced_by_line(&self) -> BTreeMap<String, u32> {
        count_by_line(&self.unplaced)
    }
}

/// Failure of a spawned job's task (not of the calculation itself).
#[derive(Debug, Error)]
pub enum JobError {
    #[error("calculation {0} was aborted before it finished")]
    Aborted(Uuid),
    #[error("calculation {0} panicked")]
    Panicked(Uuid),
}

/// One pending invocation of the packing engine.
#[derive(Clone, Debug)]
pub struct CalculationJob {
    id: Uuid,
    container: Container,
    items: Vec<Item>,
    config: PackingConfig,
    weights: ScoreWeights,
}

impl CalculationJob {
    /// Creates a job with a fresh id, default packing config and default score weights.
    pub fn new(container: Container, items: Vec<Item>) -> Self {
        Self {
            id: Uuid::new_v4(),
            container,
            items,
            config: PackingConfig::default(),
            weights: ScoreWeights::default(),
        }
    }

    pub fn with_config(mut self, config: PackingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Runs the calculation on the current thread.
    ///
    /// Never fails: input errors come back as a result with status `failed`.
    pub fn run(self) -> CalculationResult {
        self.run_with_progress(|_| {})
    }

    pub fn run_with_progress(self, on_event: impl FnMut(&PackEvent)) -> CalculationResult {
        let started_at = Utc::now();
        info!(
            "calculation {} started: {} items, container {}x{}x{} mm / {} kg",
            self.id,
            self.items.len(),
            self.container.length,
            self.container.width,
            self.container.height,
            self.container.max_weight
        );

        let outcome = self
            .weights
            .validate()
            .and_then(|_| pack_with_progress(&self.container, &self.items, &self.config, on_event));

        match outcome {
            Ok(packing) => {
                let result = CalculationResult::completed(
                    self.id,
                    started_at,
                    &self.container,
                    &self.weights,
                    packing,
                );
                info!(
                    "calculation {} completed in {} ms: {} placed, {} unplaced, volume {:.1}%, efficiency {:.3}",
                    self.id,
                    result.duration_ms,
                    result.placed_count(),
                    result.unplaced_count(),
                    result.volume_utilization * 100.0,
                    result.efficiency_score
                );
                result
            }
            Err(err) => {
                warn!("calculation {} failed: {}", self.id, err);
                CalculationResult::failed(self.id, started_at, err.to_string())
            }
        }
    }

    /// Runs the calculation on tokio's blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> JobHandle {
        let id = self.id;
        let (status_tx, status_rx) = watch::channel(CalculationStatus::Queued);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<PackEvent>();

        let task = tokio::task::spawn_blocking(move || {
            status_tx.send_replace(CalculationStatus::Running);
            let result = self.run_with_progress(|event| {
                // the receiver may be gone; the calculation still runs to completion
                let _ = event_tx.send(event.clone());
            });
            status_tx.send_replace(result.status);
            result
        });

        JobHandle {
            id,
            status: status_rx,
            events: Some(event_rx),
            task,
        }
    }
}

/// Handle of a spawned calculation.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    status: watch::Receiver<CalculationStatus>,
    events: Option<mpsc::UnboundedReceiver<PackEvent>>,
    task: JoinHandle<CalculationResult>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current status of the job.
    pub fn status(&self) -> CalculationStatus {
        *self.status.borrow()
    }

    /// A receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<CalculationStatus> {
        self.status.clone()
    }

    /// Takes the progress event stream. Returns `None` after the first call.
    pub fn events(&mut self) -> Option<UnboundedReceiverStream<PackEvent>> {
        self.events.take().map(UnboundedReceiverStream::new)
    }

    /// Abandons the job. A job already running keeps going, but its result is never delivered.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the result.
    pub async fn wait(self) -> Result<CalculationResult, JobError> {
        let id = self.id;
        self.task.await.map_err(|err| {
            if err.is_cancelled() {
                JobError::Aborted(id)
            } else {
                JobError::Panicked(id)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlanLine, expand_lines};
    use tokio_stream::StreamExt;

    fn cube_job(quantity: u32) -> CalculationJob {
        let container = Container::new((1000.0, 1000.0, 1000.0), 1000.0).unwrap();
        let items = expand_lines(&[PlanLine::new("crate", (400.0, 400.0, 400.0), 50.0)
            .quantity(quantity)
            .allow_rotation(false)])
        .unwrap();
        CalculationJob::new(container, items)
    }

    #[test]
    fn run_scores_utilization() {
        let job = cube_job(2);
        let id = job.id();
        let result = job.run();

        assert_eq!(result.job_id, id);
        assert_eq!(result.algorithm, ALGORITHM);
        assert_eq!(result.status, CalculationStatus::Completed);
        assert!(result.status.is_finished());
        assert!((result.volume_utilization - 0.128).abs() < 1e-9);
        assert!((result.weight_utilization - 0.1).abs() < 1e-9);
        assert!((result.efficiency_score - (0.7 * 0.128 + 0.3 * 0.1)).abs() < 1e-9);
        assert_eq!(
            result
                .placements
                .iter()
                .map(|p| p.step_number)
                .collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(result.finished_at >= result.started_at);
        assert_eq!(result.duration().num_milliseconds(), result.duration_ms);
        assert!(result.error.is_none());
    }

    #[test]
    fn run_reports_input_errors_as_failed() {
        let container = Container::new((10.0, 10.0, 10.0), 10.0).unwrap();
        let result = CalculationJob::new(container, Vec::new()).run();

        assert_eq!(result.status, CalculationStatus::Failed);
        assert!(result.placements.is_empty());
        assert_eq!(result.error.as_deref(), Some("No items to pack"));
    }

    #[test]
    fn custom_weights_change_efficiency() {
        let volume_only = ScoreWeights::new(1.0, 0.0).unwrap();
        let result = cube_job(2).with_weights(volume_only).run();
        assert!((result.efficiency_score - 0.128).abs() < 1e-9);
    }

    #[test]
    fn score_weights_validation() {
        assert!(ScoreWeights::new(0.0, 0.0).is_err());
        assert!(ScoreWeights::new(-1.0, 1.0).is_err());
        assert!(ScoreWeights::new(f64::NAN, 1.0).is_err());
        assert!(ScoreWeights::new(0.0, 2.0).is_ok());
        assert!((ScoreWeights::default().combine(1.0, 0.0) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn result_serializes_status_and_timestamps() {
        let result = cube_job(1).run();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["algorithm"], "maxspace-bssf/1");
        assert!(json["started_at"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn spawned_job_streams_events_and_completes() {
        let mut handle = cube_job(3).spawn();
        let events = handle.events().expect("event stream");
        assert!(handle.events().is_none());

        let status = handle.subscribe();
        let result = handle.wait().await.unwrap();
        assert_eq!(result.status, CalculationStatus::Completed);
        assert_eq!(*status.borrow(), CalculationStatus::Completed);

        let events: Vec<PackEvent> = events.collect().await;
        let placed = events
            .iter()
            .filter(|e| matches!(e, PackEvent::ItemPlaced { .. }))
            .count();
        assert_eq!(placed, result.placed_count());
        assert!(matches!(events.last(), Some(PackEvent::Finished { .. })));
    }

    #[tokio::test]
    async fn spawned_job_without_listener_still_finishes() {
        let handle = cube_job(4).spawn();
        let result = handle.wait().await.unwrap();
        assert_eq!(result.placed_count(), 4);
        assert!(result.unplaced.is_empty());
    }
}

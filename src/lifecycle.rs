//! Load plan lifecycle.
//!
//! [`advance`] is the whole state machine as a pure function. [`Plan`] owns a
//! container, its lines and at most one current calculation result, and routes
//! every mutation through [`advance`] so a rejected event never changes it.

use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::job::{CalculationJob, CalculationResult, CalculationStatus, ScoreWeights};
use crate::model::{Container, PlanLine, ValidationError, expand_lines};
use crate::optimizer::PackingConfig;
use crate::placement_id::{CodecError, PlacementLabel, ScanVerdict, placement_labels, verify_scan};

/// Status of a load plan.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    /// Initial; lines may be edited freely.
    Draft,
    /// A calculation was requested and is not resolved yet.
    InProgress,
    /// Resolved with every unit placed.
    Completed,
    /// Resolved with some units unplaced.
    Partial,
    /// The calculation could not run or placed nothing.
    Failed,
    /// Terminal.
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        self == PlanStatus::Cancelled
    }

    /// Whether a calculation has been resolved for this status.
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Partial | PlanStatus::Failed
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanStatus::Draft => "DRAFT",
            PlanStatus::InProgress => "IN_PROGRESS",
            PlanStatus::Completed => "COMPLETED",
            PlanStatus::Partial => "PARTIAL",
            PlanStatus::Failed => "FAILED",
            PlanStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// How an engine run resolves a plan.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Completed,
    Partial,
    Failed,
}

impl Resolution {
    /// Classifies a calculation: nothing placed (or not run) fails, any unplaced unit is partial.
    pub fn from_result(result: &CalculationResult) -> Self {
        if result.status == CalculationStatus::Failed || result.placements.is_empty() {
            Resolution::Failed
        } else if result.unplaced.is_empty() {
            Resolution::Completed
        } else {
            Resolution::Partial
        }
    }

    fn status(self) -> PlanStatus {
        match self {
            Resolution::Completed => PlanStatus::Completed,
            Resolution::Partial => PlanStatus::Partial,
            Resolution::Failed => PlanStatus::Failed,
        }
    }
}

/// Events driving the lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlanEvent {
    /// (Re)calculation requested.
    Calculate,
    /// The engine run finished.
    Resolve(Resolution),
    /// Explicit user cancel.
    Cancel,
    /// Lines or container edited.
    Edit,
}

impl PlanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlanEvent::Calculate => "calculate",
            PlanEvent::Resolve(_) => "resolve",
            PlanEvent::Cancel => "cancel",
            PlanEvent::Edit => "edit",
        }
    }
}

/// Rejected lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cannot {0} while a calculation is in progress")]
    Conflict(&'static str),
    #[error("plan is {0} and accepts no further events")]
    Terminal(PlanStatus),
    #[error("cannot {event} a plan in status {status}")]
    InvalidTransition {
        status: PlanStatus,
        event: &'static str,
    },
    #[error("result of calculation {0} does not belong to the calculation in flight")]
    StaleResult(Uuid),
}

/// Applies `event` to `status`.
///
/// # Example
/// ```
/// use load_it_now::lifecycle::{advance, LifecycleError, PlanEvent, PlanStatus};
///
/// assert_eq!(advance(PlanStatus::Draft, PlanEvent::Calculate), Ok(PlanStatus::InProgress));
/// assert_eq!(
///     advance(PlanStatus::InProgress, PlanEvent::Calculate),
///     Err(LifecycleError::Conflict("calculate"))
/// );
/// ```
pub fn advance(status: PlanStatus, event: PlanEvent) -> Result<PlanStatus, LifecycleError> {
    use PlanStatus::*;

    if status.is_terminal() {
        return Err(LifecycleError::Terminal(status));
    }

    match (status, event) {
        (InProgress, PlanEvent::Calculate | PlanEvent::Edit) => {
            Err(LifecycleError::Conflict(event.name()))
        }
        (_, PlanEvent::Calculate) => Ok(InProgress),
        (InProgress, PlanEvent::Resolve(resolution)) => Ok(resolution.status()),
        (_, PlanEvent::Resolve(_)) => Err(LifecycleError::InvalidTransition {
            status,
            event: event.name(),
        }),
        (_, PlanEvent::Cancel) => Ok(Cancelled),
        (_, PlanEvent::Edit) => Ok(status),
    }
}

/// Any failure of a plan operation.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A load plan: container, lines, status and the current calculation.
#[derive(Clone, Debug, Serialize)]
pub struct Plan {
    id: String,
    container: Container,
    lines: Vec<PlanLine>,
    status: PlanStatus,
    calculation: Option<CalculationResult>,
    /// The stored result predates an edit
    stale: bool,
    /// Job id of the calculation in flight
    in_flight: Option<Uuid>,
}

impl Plan {
    pub fn new(id: impl Into<String>, container: Container) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::InvalidIdentifier(
                "Plan id must not be empty".to_string(),
            ));
        }
        container.validate()?;
        Ok(Self {
            id,
            container,
            lines: Vec::new(),
            status: PlanStatus::Draft,
            calculation: None,
            stale: false,
            in_flight: None,
        })
    }

    /// Creates a plan with a random UUID as id.
    pub fn with_random_id(container: Container) -> Result<Self, ValidationError> {
        Self::new(Uuid::new_v4().to_string(), container)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn lines(&self) -> &[PlanLine] {
        &self.lines
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    /// The latest resolved calculation, even if stale.
    pub fn calculation(&self) -> Option<&CalculationResult> {
        self.calculation.as_ref()
    }

    /// Whether the stored calculation still reflects the plan's lines and container.
    pub fn is_result_current(&self) -> bool {
        self.calculation.is_some() && !self.stale
    }

    pub fn in_flight(&self) -> Option<Uuid> {
        self.in_flight
    }

    fn apply(&self, event: PlanEvent) -> Result<PlanStatus, LifecycleError> {
        match advance(self.status, event) {
            Ok(next) => Ok(next),
            Err(err) => {
                warn!("plan {}: {} rejected: {}", self.id, event.name(), err);
                Err(err)
            }
        }
    }

    fn edit(&mut self, change: impl FnOnce(&mut Self) -> Result<(), PlanError>) -> Result<(), PlanError> {
        self.apply(PlanEvent::Edit)?;
        change(self)?;
        if self.calculation.is_some() {
            self.stale = true;
        }
        Ok(())
    }

    /// Adds a line. Line ids are unique within a plan.
    pub fn add_line(&mut self, line: PlanLine) -> Result<(), PlanError> {
        self.edit(|plan| {
            line.validate()?;
            if plan.lines.iter().any(|l| l.id == line.id) {
                return Err(ValidationError::InvalidIdentifier(format!(
                    "Line {} already exists",
                    line.id
                ))
                .into());
            }
            plan.lines.push(line);
            Ok(())
        })
    }

    /// Replaces the line with the same id.
    pub fn update_line(&mut self, line: PlanLine) -> Result<(), PlanError> {
        self.edit(|plan| {
            line.validate()?;
            let slot = plan
                .lines
                .iter_mut()
                .find(|l| l.id == line.id)
                .ok_or_else(|| {
                    ValidationError::InvalidIdentifier(format!("Unknown line {}", line.id))
                })?;
            *slot = line;
            Ok(())
        })
    }

    pub fn remove_line(&mut self, line_id: &str) -> Result<PlanLine, PlanError> {
        let mut removed = None;
        self.edit(|plan| {
            let index = plan
                .lines
                .iter()
                .position(|l| l.id == line_id)
                .ok_or_else(|| {
                    ValidationError::InvalidIdentifier(format!("Unknown line {line_id}"))
                })?;
            removed = Some(plan.lines.remove(index));
            Ok(())
        })?;
        removed.ok_or_else(|| {
            ValidationError::InvalidIdentifier(format!("Unknown line {line_id}")).into()
        })
    }

    pub fn set_container(&mut self, container: Container) -> Result<(), PlanError> {
        self.edit(|plan| {
            container.validate()?;
            plan.container = container;
            Ok(())
        })
    }

    /// Moves the plan to `IN_PROGRESS` and returns the job to run.
    ///
    /// The job id is remembered; only its result is accepted by
    /// [`Plan::complete_calculation`].
    pub fn begin_calculation(
        &mut self,
        config: PackingConfig,
        weights: ScoreWeights,
    ) -> Result<CalculationJob, PlanError> {
        let next = self.apply(PlanEvent::Calculate)?;
        let items = expand_lines(&self.lines)?;
        let job = CalculationJob::new(self.container.clone(), items)
            .with_config(config)
            .with_weights(weights);

        info!(
            "plan {}: {} -> {} (calculation {})",
            self.id,
            self.status,
            next,
            job.id()
        );
        self.status = next;
        self.in_flight = Some(job.id());
        Ok(job)
    }

    /// Resolves the in-flight calculation with `result`.
    ///
    /// A result from any other job is rejected and leaves the plan untouched.
    pub fn complete_calculation(
        &mut self,
        result: CalculationResult,
    ) -> Result<PlanStatus, PlanError> {
        if self.status.is_terminal() {
            return Err(LifecycleError::Terminal(self.status).into());
        }
        if self.in_flight != Some(result.job_id) {
            warn!(
                "plan {}: dropping result of calculation {}",
                self.id, result.job_id
            );
            return Err(LifecycleError::StaleResult(result.job_id).into());
        }

        let resolution = Resolution::from_result(&result);
        let next = self.apply(PlanEvent::Resolve(resolution))?;
        info!(
            "plan {}: {} -> {} ({} placed, {} unplaced)",
            self.id,
            self.status,
            next,
            result.placed_count(),
            result.unplaced_count()
        );

        self.status = next;
        self.calculation = Some(result);
        self.stale = false;
        self.in_flight = None;
        Ok(next)
    }

    /// Runs a calculation synchronously and resolves the plan with it.
    pub fn calculate(
        &mut self,
        config: PackingConfig,
        weights: ScoreWeights,
    ) -> Result<PlanStatus, PlanError> {
        let job = self.begin_calculation(config, weights)?;
        self.complete_calculation(job.run())
    }

    /// Cancels the plan. Any result still in flight will be rejected.
    pub fn cancel(&mut self) -> Result<(), PlanError> {
        let next = self.apply(PlanEvent::Cancel)?;
        info!("plan {}: {} -> {}", self.id, self.status, next);
        self.status = next;
        self.in_flight = None;
        Ok(())
    }

    /// One label per placement of the current calculation, in step order.
    pub fn placement_labels(&self) -> Result<Vec<PlacementLabel>, PlanError> {
        match &self.calculation {
            Some(result) => Ok(placement_labels(&self.id, &result.placements)?),
            None => Ok(Vec::new()),
        }
    }

    /// Checks a scanned placement identifier against this plan.
    ///
    /// Fails when the placement at the scanned step cannot carry an identifier.
    pub fn verify_scan(
        &self,
        code: &str,
        expected_step: Option<u32>,
    ) -> Result<ScanVerdict, PlanError> {
        let placements = self
            .calculation
            .as_ref()
            .map(|result| result.placements.as_slice())
            .unwrap_or_default();
        Ok(verify_scan(&self.id, placements, code, expected_step)?)
    }
}

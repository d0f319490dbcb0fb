//! JSON request and response shapes of the command-line binary.
//!
//! A [`CalculationRequest`] is validated into a [`Plan`] plus the packing
//! options to run it with; a [`CalculationResponse`] flattens a calculated
//! plan for output.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::OptimizerConfig;
use crate::job::{CalculationStatus, ScoreWeights};
use crate::lifecycle::{Plan, PlanError, PlanStatus};
use crate::model::{Container, PlanLine, ValidationError};
use crate::optimizer::{ItemOrder, PackingConfig};
use crate::placement_id::encode_placement_id;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ContainerRequest {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub max_weight: f64,
}

impl ContainerRequest {
    fn into_container(self) -> Result<Container, ValidationError> {
        Container::new((self.length, self.width, self.height), self.max_weight)
    }
}

fn default_quantity() -> u32 {
    1
}

fn default_allow_rotation() -> bool {
    true
}

/// One plan line of a request.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct LineRequest {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default = "default_allow_rotation")]
    pub allow_rotation: bool,
    #[serde(default)]
    pub stacking_limit: Option<u32>,
}

impl LineRequest {
    fn into_line(self) -> PlanLine {
        let mut line = PlanLine::new(self.id, (self.length, self.width, self.height), self.weight)
            .quantity(self.quantity)
            .allow_rotation(self.allow_rotation);
        if let Some(label) = self.label {
            line = line.label(label);
        }
        if let Some(limit) = self.stacking_limit {
            line = line.stacking_limit(limit);
        }
        line
    }
}

/// Per-request overrides of the configured engine options.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct OptionsRequest {
    #[serde(default)]
    pub item_order: Option<ItemOrder>,
    #[serde(default)]
    pub max_free_spaces: Option<usize>,
    #[serde(default)]
    pub support_ratio: Option<f64>,
    #[serde(default)]
    pub score_weights: Option<ScoreWeights>,
}

/// Input of `load-it-now calculate`.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CalculationRequest {
    /// Plan identifier; a random UUID is used when absent
    #[serde(default)]
    pub plan_id: Option<String>,
    pub container: ContainerRequest,
    pub items: Vec<LineRequest>,
    #[serde(default)]
    pub options: OptionsRequest,
}

/// Errors while reading or validating a request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("at least one item must be specified")]
    MissingItems,
    #[error("invalid plan: {0}")]
    InvalidPlan(#[source] ValidationError),
    #[error("invalid container: {0}")]
    InvalidContainer(#[source] ValidationError),
    #[error("invalid item {id}: {source}")]
    InvalidLine {
        id: String,
        #[source]
        source: PlanError,
    },
    #[error("invalid options: {0}")]
    InvalidOptions(#[source] ValidationError),
}

/// A request turned into a draft plan and the options to calculate it with.
#[derive(Debug)]
pub struct ValidatedRequest {
    pub plan: Plan,
    pub packing: PackingConfig,
    pub weights: ScoreWeights,
}

/// Reads and parses a request file.
pub fn read_request(path: &Path) -> Result<CalculationRequest, RequestError> {
    let raw = fs::read_to_string(path).map_err(|source| RequestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_request(&raw)
}

pub fn parse_request(raw: &str) -> Result<CalculationRequest, RequestError> {
    Ok(serde_json::from_str(raw)?)
}

impl CalculationRequest {
    /// Validates the request, filling unset options from `defaults`.
    pub fn into_validated(self, defaults: &OptimizerConfig) -> Result<ValidatedRequest, RequestError> {
        if self.items.is_empty() {
            return Err(RequestError::MissingItems);
        }

        let container = self
            .container
            .into_container()
            .map_err(RequestError::InvalidContainer)?;
        let plan_id = self
            .plan_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut plan = Plan::new(plan_id, container).map_err(RequestError::InvalidPlan)?;

        for item in self.items {
            let id = item.id.clone();
            plan.add_line(item.into_line())
                .map_err(|source| RequestError::InvalidLine { id, source })?;
        }

        let base = defaults.packing_config();
        let mut builder = PackingConfig::builder()
            .item_order(self.options.item_order.unwrap_or(base.item_order))
            .support_ratio(self.options.support_ratio.unwrap_or(base.support_ratio));
        if let Some(cap) = self.options.max_free_spaces.or(base.max_free_spaces) {
            builder = builder.max_free_spaces(cap);
        }
        let packing = builder.build();
        packing.validate().map_err(RequestError::InvalidOptions)?;

        let weights = self
            .options
            .score_weights
            .unwrap_or_else(|| defaults.score_weights());
        weights.validate().map_err(RequestError::InvalidOptions)?;

        Ok(ValidatedRequest {
            plan,
            packing,
            weights,
        })
    }
}

/// Output of `load-it-now calculate`.
#[derive(Serialize, Debug)]
pub struct CalculationResponse {
    pub plan_id: String,
    pub plan_status: PlanStatus,
    pub is_complete: bool,
    pub calculation: Option<CalculationSummary>,
    pub placements: Vec<PlacedItemResponse>,
    pub unplaced: Vec<UnplacedItemResponse>,
    pub unplaced_by_line: BTreeMap<String, u32>,
}

#[derive(Serialize, Debug)]
pub struct CalculationSummary {
    pub job_id: Uuid,
    pub algorithm: String,
    pub status: CalculationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub volume_utilization: f64,
    pub weight_utilization: f64,
    pub efficiency_score: f64,
    pub placed_weight: f64,
    pub placed_volume: f64,
    pub error: Option<String>,
}

/// Single placed unit in the response.
///
/// # Fields
/// * `step` - 1-based loading step
/// * `code` - placement identifier, absent when the plan or line id is too short to encode
/// * `pos` - minimum corner (x, y, z) in the container
/// * `dims` - extents along (x, y, z) after rotation
/// * `rotation` - rotation code 0..=5
#[derive(Serialize, Debug)]
pub struct PlacedItemResponse {
    pub step: u32,
    pub code: Option<String>,
    pub line_id: String,
    pub ordinal: u32,
    pub label: Option<String>,
    pub pos: (f64, f64, f64),
    pub dims: (f64, f64, f64),
    pub rotation: u8,
    pub weight: f64,
}

#[derive(Serialize, Debug)]
pub struct UnplacedItemResponse {
    pub line_id: String,
    pub ordinal: u32,
    pub weight: f64,
    pub dims: (f64, f64, f64),
    pub reason_code: String,
    pub reason: String,
}

impl CalculationResponse {
    pub fn from_plan(plan: &Plan) -> Self {
        let Some(result) = plan.calculation() else {
            return Self {
                plan_id: plan.id().to_string(),
                plan_status: plan.status(),
                is_complete: false,
                calculation: None,
                placements: Vec::new(),
                unplaced: Vec::new(),
                unplaced_by_line: BTreeMap::new(),
            };
        };

        Self {
            plan_id: plan.id().to_string(),
            plan_status: plan.status(),
            is_complete: plan.status() == PlanStatus::Completed,
            calculation: Some(CalculationSummary {
                job_id: result.job_id,
                algorithm: result.algorithm.clone(),
                status: result.status,
                started_at: result.started_at,
                finished_at: result.finished_at,
                duration_ms: result.duration_ms,
                volume_utilization: result.volume_utilization,
                weight_utilization: result.weight_utilization,
                efficiency_score: result.efficiency_score,
                placed_weight: result.placed_weight,
                placed_volume: result.placed_volume,
                error: result.error.clone(),
            }),
            placements: result
                .placements
                .iter()
                .map(|p| PlacedItemResponse {
                    step: p.step_number,
                    code: encode_placement_id(plan.id(), p.step_number, &p.item.reference.line_id)
                        .ok(),
                    line_id: p.item.reference.line_id.clone(),
                    ordinal: p.item.reference.ordinal,
                    label: p.item.label.clone(),
                    pos: (p.position.x, p.position.y, p.position.z),
                    dims: (p.extents.x, p.extents.y, p.extents.z),
                    rotation: p.orientation.index(),
                    weight: p.item.weight,
                })
                .collect(),
            unplaced: result
                .unplaced
                .iter()
                .map(|entry| UnplacedItemResponse {
                    line_id: entry.item.reference.line_id.clone(),
                    ordinal: entry.item.reference.ordinal,
                    weight: entry.item.weight,
                    dims: (entry.item.length, entry.item.width, entry.item.height),
                    reason_code: entry.reason.code().to_string(),
                    reason: entry.reason.to_string(),
                })
                .collect(),
            unplaced_by_line: result.unplaced_by_line(),
        }
    }
}

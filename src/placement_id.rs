//! Placement identifiers: a scannable key binding a plan, a loading step and an item.
//!
//! Grammar: `PLAN-{plan8}-STEP-{step3}-{item8}`, where `plan8`/`item8` are the
//! first 8 characters of the plan and item identifiers and `step3` is the
//! step number zero-padded to three digits. Steps therefore range over
//! `1..=999`; larger steps cannot be encoded.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Placement;
use crate::types::Vec3;

/// Number of identifier characters carried by a placement identifier.
pub const SHORT_ID_LEN: usize = 8;
/// Largest step number the three-digit step field can hold.
pub const MAX_STEP: u32 = 999;

const PLAN_TOKEN: &str = "PLAN";
const STEP_TOKEN: &str = "STEP";
const STEP_DIGITS: usize = 3;

/// Reasons an identifier cannot be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Step {0} is outside the encodable range 1..=999")]
    StepOutOfRange(u32),
    #[error("{field} identifier must have at least 8 characters, got {len}")]
    IdentifierTooShort { field: &'static str, len: usize },
    #[error("{field} identifier contains a character that cannot be encoded: {ch:?}")]
    InvalidIdentifierChar { field: &'static str, ch: char },
}

/// A decoded placement identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacementId {
    pub plan8: String,
    pub step: u32,
    pub item8: String,
}

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PLAN_TOKEN}-{}-{STEP_TOKEN}-{:03}-{}",
            self.plan8, self.step, self.item8
        )
    }
}

fn is_short_id_char(ch: char) -> bool {
    ch.is_ascii_graphic() && ch != '-'
}

fn short_id(id: &str, field: &'static str) -> Result<String, CodecError> {
    let len = id.chars().count();
    if len < SHORT_ID_LEN {
        return Err(CodecError::IdentifierTooShort { field, len });
    }
    let prefix: String = id.chars().take(SHORT_ID_LEN).collect();
    if let Some(ch) = prefix.chars().find(|&ch| !is_short_id_char(ch)) {
        return Err(CodecError::InvalidIdentifierChar { field, ch });
    }
    Ok(prefix)
}

/// Encodes the identifier of the placement at `step` of `item_id` in `plan_id`.
///
/// # Example
/// ```
/// use load_it_now::placement_id::encode_placement_id;
///
/// let code = encode_placement_id(
///     "a3f2e8b1-c4d9-4f2a-b1c8-3d9e8f7a6b5c",
///     1,
///     "c4d9f2a3-8b1c-4e5f-9a2b-6d7e8f9a0b1c",
/// )
/// .unwrap();
/// assert_eq!(code, "PLAN-a3f2e8b1-STEP-001-c4d9f2a3");
/// ```
pub fn encode_placement_id(plan_id: &str, step: u32, item_id: &str) -> Result<String, CodecError> {
    if step == 0 || step > MAX_STEP {
        return Err(CodecError::StepOutOfRange(step));
    }
    let id = PlacementId {
        plan8: short_id(plan_id, "plan")?,
        step,
        item8: short_id(item_id, "item")?,
    };
    Ok(id.to_string())
}

/// Decodes a placement identifier, returning `None` for anything off-grammar.
pub fn decode_placement_id(code: &str) -> Option<PlacementId> {
    let parts: Vec<&str> = code.split('-').collect();
    let [plan_token, plan8, step_token, step, item8] = parts.as_slice() else {
        return None;
    };
    if *plan_token != PLAN_TOKEN || *step_token != STEP_TOKEN {
        return None;
    }

    let is_short_id = |s: &str| s.len() == SHORT_ID_LEN && s.chars().all(is_short_id_char);
    if !is_short_id(*plan8) || !is_short_id(*item8) {
        return None;
    }
    if step.len() != STEP_DIGITS || !step.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let step: u32 = step.parse().ok()?;
    if step == 0 {
        return None;
    }

    Some(PlacementId {
        plan8: plan8.to_string(),
        step,
        item8: item8.to_string(),
    })
}

/// Printable label for one placement of a resolved plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementLabel {
    pub code: String,
    pub step: u32,
    pub line_id: String,
    pub ordinal: u32,
    pub label: Option<String>,
    pub position: Vec3,
    pub extents: Vec3,
    pub rotation: u8,
}

/// Builds the labels for `placements` of `plan_id`, sorted by step.
pub fn placement_labels(
    plan_id: &str,
    placements: &[Placement],
) -> Result<Vec<PlacementLabel>, CodecError> {
    let mut labels = placements
        .iter()
        .map(|p| {
            Ok(PlacementLabel {
                code: encode_placement_id(plan_id, p.step_number, &p.item.reference.line_id)?,
                step: p.step_number,
                line_id: p.item.reference.line_id.clone(),
                ordinal: p.item.reference.ordinal,
                label: p.item.label.clone(),
                position: p.position,
                extents: p.extents,
                rotation: p.orientation.index(),
            })
        })
        .collect::<Result<Vec<_>, CodecError>>()?;
    labels.sort_by_key(|label| label.step);
    Ok(labels)
}

/// Outcome of checking a scanned identifier against a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanVerdict {
    /// The scan does not follow the identifier grammar.
    InvalidFormat,
    /// The identifier belongs to another plan.
    WrongPlan { plan8: String },
    /// The plan has no placement at this step.
    UnknownStep { step: u32 },
    /// The step exists, but holds a different item.
    ItemMismatch { step: u32, expected_item8: String },
    /// Valid for the plan, but not the step being loaded.
    OutOfSequence { expected: u32, scanned: u32 },
    Matched { step: u32 },
}

impl ScanVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, ScanVerdict::Matched { .. })
    }
}

/// Checks `code` against the placements of `plan_id`.
///
/// The scanned step is looked up directly, so steps of a plan longer than
/// [`MAX_STEP`] do not affect the verdict. Fails when the placement at the
/// scanned step belongs to a line whose id cannot be encoded.
///
/// With `expected_step` set, a scan of any other step is out of sequence.
pub fn verify_scan(
    plan_id: &str,
    placements: &[Placement],
    code: &str,
    expected_step: Option<u32>,
) -> Result<ScanVerdict, CodecError> {
    let Some(scanned) = decode_placement_id(code) else {
        return Ok(ScanVerdict::InvalidFormat);
    };

    if !plan_id.starts_with(&scanned.plan8) {
        return Ok(ScanVerdict::WrongPlan {
            plan8: scanned.plan8,
        });
    }

    let Some(placement) = placements.iter().find(|p| p.step_number == scanned.step) else {
        return Ok(ScanVerdict::UnknownStep { step: scanned.step });
    };

    let expected_item8 = short_id(&placement.item.reference.line_id, "item")?;
    if expected_item8 != scanned.item8 {
        return Ok(ScanVerdict::ItemMismatch {
            step: scanned.step,
            expected_item8,
        });
    }

    Ok(match expected_step {
        Some(expected) if expected != scanned.step => ScanVerdict::OutOfSequence {
            expected,
            scanned: scanned.step,
        },
        _ => ScanVerdict::Matched { step: scanned.step },
    })
}

use std::env;

use log::{info, warn};

use crate::job::ScoreWeights;
use crate::optimizer::{ItemOrder, PackingConfig};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub optimizer: OptimizerConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    /// Creates a configuration from an arbitrary variable source.
    ///
    /// `lookup` returns the raw value of a variable, or `None` if it is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            optimizer: OptimizerConfig::from_lookup(&lookup),
            output: OutputConfig::from_lookup(&lookup),
        }
    }
}

/// Configuration for the packing engine and result scoring.
#[derive(Clone, Debug, Default)]
pub struct OptimizerConfig {
    packing: PackingConfig,
    weights: ScoreWeights,
}

impl OptimizerConfig {
    const MAX_FREE_SPACES_VAR: &'static str = "LOAD_IT_NOW_MAX_FREE_SPACES";
    const ITEM_ORDER_VAR: &'static str = "LOAD_IT_NOW_ITEM_ORDER";
    const SUPPORT_RATIO_VAR: &'static str = "LOAD_IT_NOW_SUPPORT_RATIO";
    const SCORE_VOLUME_VAR: &'static str = "LOAD_IT_NOW_SCORE_VOLUME_WEIGHT";
    const SCORE_WEIGHT_VAR: &'static str = "LOAD_IT_NOW_SCORE_WEIGHT_WEIGHT";

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let max_free_spaces = match env_string(lookup, Self::MAX_FREE_SPACES_VAR) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        "Could not parse {} ('{}'): {}. Using unbounded free-space set.",
                        Self::MAX_FREE_SPACES_VAR,
                        raw,
                        err
                    );
                    0
                }
            },
            None => 0,
        };

        let item_order = match env_string(lookup, Self::ITEM_ORDER_VAR) {
            Some(raw) => ItemOrder::parse(&raw).unwrap_or_else(|| {
                warn!(
                    "{} must be one of volume, weight, input (got '{}'). Using volume.",
                    Self::ITEM_ORDER_VAR,
                    raw
                );
                ItemOrder::default()
            }),
            None => ItemOrder::default(),
        };

        let support_ratio = load_f64_with_warning(
            lookup,
            Self::SUPPORT_RATIO_VAR,
            PackingConfig::DEFAULT_SUPPORT_RATIO,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Minimum support enabled; items above the floor need resting area below them",
        );

        let packing = PackingConfig::builder()
            .item_order(item_order)
            .max_free_spaces(max_free_spaces)
            .support_ratio(support_ratio)
            .build();

        let non_negative = |value: f64| value.is_finite() && value >= 0.0;
        let volume = load_f64_with_warning(
            lookup,
            Self::SCORE_VOLUME_VAR,
            ScoreWeights::DEFAULT_VOLUME,
            non_negative,
            "must be a non-negative number",
            "Efficiency score uses a custom volume weight",
        );
        let weight = load_f64_with_warning(
            lookup,
            Self::SCORE_WEIGHT_VAR,
            ScoreWeights::DEFAULT_WEIGHT,
            non_negative,
            "must be a non-negative number",
            "Efficiency score uses a custom weight weight",
        );
        let weights = ScoreWeights::new(volume, weight).unwrap_or_else(|err| {
            warn!("{}. Using default score weights.", err);
            ScoreWeights::default()
        });

        Self { packing, weights }
    }

    /// Returns the configured PackingConfig.
    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }

    /// Returns the weights of the efficiency score.
    pub fn score_weights(&self) -> ScoreWeights {
        self.weights
    }
}

/// Configuration for the binary's JSON output.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    pretty: bool,
}

impl OutputConfig {
    const PRETTY_VAR: &'static str = "LOAD_IT_NOW_PRETTY_OUTPUT";
    const DEFAULT_PRETTY: bool = true;

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let pretty = env_string(lookup, Self::PRETTY_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PRETTY_VAR))
            .unwrap_or(Self::DEFAULT_PRETTY);
        Self { pretty }
    }

    /// Whether JSON output is indented.
    pub fn pretty(&self) -> bool {
        self.pretty
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: Self::DEFAULT_PRETTY,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => Some(value),
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn env_string(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn load_f64_with_warning(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> f64 {
    match env_string(lookup, var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) => {
                if !validator(value) {
                    warn!(
                        "{} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                } else {
                    let tolerance = (default.abs().max(1.0)) * 1e-9;
                    if (value - default).abs() > tolerance {
                        info!("{} ({} = {}).", notice, var_name, value);
                    }
                    value
                }
            }
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

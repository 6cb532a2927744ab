use crate::error::ConfigError;
use crate::scoring::{MatchStrategy, Signal, WeightTable};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_CANDIDATE_LIMIT: usize = 50;
pub const DEFAULT_ACCEPTANCE_FLOOR: f64 = 0.6;

/// Matching knobs. The weight table is one configurable default shared by
/// every job.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub weights: WeightTable,
    pub normalize: bool,
    /// Floor passed to FindSimilar.
    pub similarity_threshold: f64,
    /// `k` passed to FindSimilar.
    pub candidate_limit: usize,
    /// Composite score a pair must reach before the qualitative evaluator
    /// sees it.
    pub acceptance_floor: f64,
    pub strategy: MatchStrategy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            weights: WeightTable::default(),
            normalize: true,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            acceptance_floor: DEFAULT_ACCEPTANCE_FLOOR,
            strategy: MatchStrategy::default(),
        }
    }
}

impl MatchConfig {
    /// Reads `MATCH_*` overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(threshold) = parse_var::<f64>(&lookup, "MATCH_SIMILARITY_THRESHOLD")? {
            config.similarity_threshold = similarity_floor(threshold)?;
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "MATCH_CANDIDATE_LIMIT")? {
            config.candidate_limit = limit;
        }
        if let Some(floor) = parse_var::<f64>(&lookup, "MATCH_ACCEPTANCE_FLOOR")? {
            config.acceptance_floor = unit_interval("MATCH_ACCEPTANCE_FLOOR", floor)?;
        }
        if let Some(normalize) = parse_var::<bool>(&lookup, "MATCH_NORMALIZE")? {
            config.normalize = normalize;
        }
        match lookup("MATCH_STRATEGY").as_deref().map(str::trim) {
            None | Some("") => {}
            Some("set_overlap") => config.strategy = MatchStrategy::SetOverlap,
            Some("semantic") => {}
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "MATCH_STRATEGY".to_string(),
                    value: other.to_string(),
                    reason: "expected `semantic` or `set_overlap`".to_string(),
                })
            }
        }
        if let MatchStrategy::Semantic { threshold } = &mut config.strategy {
            if let Some(value) = parse_var::<f64>(&lookup, "MATCH_SEMANTIC_THRESHOLD")? {
                *threshold = unit_interval("MATCH_SEMANTIC_THRESHOLD", value)?;
            }
        }

        for signal in Signal::ALL {
            let key = format!("MATCH_WEIGHT_{}", signal.as_str().to_uppercase());
            if let Some(weight) = parse_var::<f64>(&lookup, &key)? {
                config.weights = config.weights.with_weight(signal, weight)?;
            }
        }

        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkflowConfig {
    /// Upper bound on any single stage's external call.
    pub stage_timeout: Duration,
    /// Characters of profile text sent to the embedder.
    pub max_embedding_chars: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(180),
            max_embedding_chars: 8_000,
        }
    }
}

/// Caller-side polling schedule: `initial`, doubling up to `max`, at most
/// `max_attempts` reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
            factor: 2,
            max_attempts: 720,
        }
    }
}

impl PollConfig {
    /// Delay before read number `attempt` (0-based) is repeated.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.factor.max(1);
        let mut delay = self.initial;
        for _ in 0..attempt {
            delay = delay.saturating_mul(factor);
            if delay >= self.max {
                return self.max;
            }
        }
        delay.min(self.max)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|error| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.clone(),
            reason: error.to_string(),
        })
}

fn unit_interval(key: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must lie in [0, 1]".to_string(),
        })
    }
}

/// FindSimilar floor; must lie in (0, 1].
fn similarity_floor(value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key: "MATCH_SIMILARITY_THRESHOLD".to_string(),
            value: value.to_string(),
            reason: "must lie in (0, 1]".to_string(),
        })
    }
}

//! Runtime tunables for the interpreter and the local/remote recognizers.
//!
//! Mirrors the documented defaults for each tunable; an embedder may load
//! overrides from its own configuration format (YAML, TOML, env) and construct
//! these structs directly, since they only depend on `serde`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for [`crate::recognizer::local::LocalRecognizer`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecognizerConfig {
    /// Minimum Levenshtein similarity for a fuzzy keyword match.
    pub fuzzy_threshold: f64,
    /// Combined score below which no candidate is reported.
    pub min_confidence: f64,
    /// Weight applied to `keyword_score`.
    pub keyword_weight: f64,
    /// Weight applied to `max(similarity_score, example_score)`.
    pub similarity_weight: f64,
    /// Weight applied to `pattern_score`.
    pub pattern_weight: f64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.6,
            min_confidence: 0.3,
            keyword_weight: 0.4,
            similarity_weight: 0.3,
            pattern_weight: 0.3,
        }
    }
}

/// Tunables for [`crate::recognizer::remote::RemoteRecognizer`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteRecognizerConfig {
    /// Per-request timeout before the call is treated as failed.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Backoff delays applied between retries, in order.
    #[serde(with = "duration_secs_vec")]
    pub retry_backoff: Vec<Duration>,
}

impl Default for RemoteRecognizerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry_backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

/// Tunables for [`crate::interpreter::Interpreter`] step execution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Hard cap on `While` loop iterations before a session transitions to `ERROR`.
    pub max_loop_iterations: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1000,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs_f64(f64::deserialize(d)?))
    }
}

mod duration_secs_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ds: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        let secs: Vec<f64> = ds.iter().map(Duration::as_secs_f64).collect();
        secs.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        Ok(Vec::<f64>::deserialize(d)?
            .into_iter()
            .map(Duration::from_secs_f64)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizer_defaults_match_spec() {
        let cfg = RecognizerConfig::default();
        assert_eq!(cfg.fuzzy_threshold, 0.6);
        assert_eq!(cfg.min_confidence, 0.3);
        assert_eq!((cfg.keyword_weight, cfg.similarity_weight, cfg.pattern_weight), (0.4, 0.3, 0.3));
    }

    #[test]
    fn remote_defaults_match_spec() {
        let cfg = RemoteRecognizerConfig::default();
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(
            cfg.retry_backoff,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn runtime_default_loop_cap_is_1000() {
        assert_eq!(RuntimeConfig::default().max_loop_iterations, 1000);
    }
}

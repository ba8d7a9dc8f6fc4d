// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ExperimentError, ExperimentResult};
use crate::random::RandomSource;

pub const ALLOW_DOC_OPT_IN_KEY: &str = "allow-doc-opt-in";
pub const ALLOW_URL_OPT_IN_KEY: &str = "allow-url-opt-in";
pub const CANARY_KEY: &str = "canary";
pub const BINARY_TYPE_KEY: &str = "type";
pub const DEFAULT_BINARY_TYPE: &str = "unknown";

/// Activation setting for one experiment in host configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frequency {
    Fixed(bool),
    /// Threshold in the open interval (0, 1).
    Probability(f64),
}

impl Frequency {
    /// Accepts `true`/`false`, `1`/`0` (numeric or string) and numbers in [0, 1).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(on) => Some(Self::Fixed(*on)),
            Value::Number(n) => {
                let f = n.as_f64()?;
                if f == 1.0 {
                    Some(Self::Fixed(true))
                } else if f == 0.0 {
                    Some(Self::Fixed(false))
                } else if f > 0.0 && f < 1.0 {
                    Some(Self::Probability(f))
                } else {
                    None
                }
            }
            Value::String(s) => match s.trim() {
                "1" | "true" => Some(Self::Fixed(true)),
                "0" | "false" => Some(Self::Fixed(false)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Resolves to on/off. A probability consumes exactly one draw and is on
    /// only when the draw is strictly greater than the threshold.
    pub fn resolve(self, random: &mut dyn RandomSource) -> bool {
        match self {
            Self::Fixed(on) => on,
            Self::Probability(threshold) => random.next_f64() > threshold,
        }
    }
}

impl Serialize for Frequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Fixed(on) => serializer.serialize_bool(*on),
            Self::Probability(p) => serializer.serialize_f64(*p),
        }
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid experiment frequency: {value}")))
    }
}

/// Host-supplied static configuration with allow-lists split out of the
/// experiment namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub experiments: BTreeMap<String, Frequency>,
    pub allow_doc_opt_in: BTreeSet<String>,
    pub allow_url_opt_in: BTreeSet<String>,
    pub canary: bool,
    pub binary_type: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            experiments: BTreeMap::new(),
            allow_doc_opt_in: BTreeSet::new(),
            allow_url_opt_in: BTreeSet::new(),
            canary: false,
            binary_type: DEFAULT_BINARY_TYPE.to_string(),
        }
    }
}

impl HostConfig {
    /// Splits a flat host mapping (experiment names mixed with reserved keys).
    ///
    /// Unusable experiment values are skipped with a warning; only a non-object
    /// root or a malformed allow-list is an error.
    pub fn from_amp_config(value: &Value) -> ExperimentResult<Self> {
        let Value::Object(map) = value else {
            return Err(ExperimentError::InvalidConfig(
                "host config must be a JSON object".to_string(),
            ));
        };
        let mut config = Self::default();
        for (key, entry) in map {
            match key.as_str() {
                ALLOW_DOC_OPT_IN_KEY => config.allow_doc_opt_in = parse_allow_list(key, entry)?,
                ALLOW_URL_OPT_IN_KEY => config.allow_url_opt_in = parse_allow_list(key, entry)?,
                CANARY_KEY => config.canary = is_truthy(entry),
                BINARY_TYPE_KEY => {
                    if let Some(kind) = entry.as_str().filter(|kind| !kind.is_empty()) {
                        config.binary_type = kind.to_string();
                    }
                }
                _ => match Frequency::from_value(entry) {
                    Some(frequency) => {
                        config.experiments.insert(key.clone(), frequency);
                    }
                    None => {
                        tracing::warn!(experiment = %key, value = %entry, "ignoring unusable experiment frequency");
                    }
                },
            }
        }
        Ok(config)
    }

    pub fn from_amp_config_str(raw: &str) -> ExperimentResult<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| ExperimentError::InvalidConfig(err.to_string()))?;
        Self::from_amp_config(&value)
    }

    /// Reads a flat host mapping from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ExperimentResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_amp_config_str(&raw)
    }

    pub fn with_experiment(mut self, name: impl Into<String>, frequency: Frequency) -> Self {
        self.experiments.insert(name.into(), frequency);
        self
    }

    pub fn frequency(&self, name: &str) -> Option<Frequency> {
        self.experiments.get(name).copied()
    }

    pub fn allows_doc_opt_in(&self, name: &str) -> bool {
        self.allow_doc_opt_in.contains(name)
    }

    pub fn allows_url_opt_in(&self, name: &str) -> bool {
        self.allow_url_opt_in.contains(name)
    }

    pub fn is_canary(&self) -> bool {
        self.canary
    }

    pub fn binary_type(&self) -> &str {
        &self.binary_type
    }
}

fn parse_allow_list(key: &str, value: &Value) -> ExperimentResult<BTreeSet<String>> {
    let Value::Array(items) = value else {
        return Err(ExperimentError::InvalidConfig(format!(
            "{key} must be an array of experiment names"
        )));
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                ExperimentError::InvalidConfig(format!("{key} entries must be strings"))
            })
        })
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

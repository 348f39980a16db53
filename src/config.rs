//! Panel configuration shared by the core and the job-file parser

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with rows whose group key is blank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullKeyPolicy {
    /// Blank-key rows belong to no group and always come out `Absent`
    #[default]
    Exclude,
    /// Every blank-key row is its own single-row group
    Isolate,
    /// All blank-key rows share one group
    Group,
    /// Blank keys fail the run with a configuration error
    Reject,
}

impl FromStr for NullKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclude" => Ok(NullKeyPolicy::Exclude),
            "isolate" => Ok(NullKeyPolicy::Isolate),
            "group" => Ok(NullKeyPolicy::Group),
            "reject" => Ok(NullKeyPolicy::Reject),
            other => Err(format!(
                "unknown null key policy '{}' (expected exclude, isolate, group or reject)",
                other
            )),
        }
    }
}

impl fmt::Display for NullKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NullKeyPolicy::Exclude => "exclude",
            NullKeyPolicy::Isolate => "isolate",
            NullKeyPolicy::Group => "group",
            NullKeyPolicy::Reject => "reject",
        };
        f.write_str(name)
    }
}

/// Which columns identify an entity and its periods
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Identifier column; `None` treats the whole table as one entity
    #[serde(default, rename = "id_column")]
    pub group_key_column: Option<String>,

    /// Period column, carried into the output and used when merging sources
    #[serde(default)]
    pub time_column: Option<String>,

    #[serde(default)]
    pub null_keys: NullKeyPolicy,
}

impl PanelConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn grouped_by(column: impl Into<String>) -> Self {
        Self {
            group_key_column: Some(column.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_null_keys(mut self, policy: NullKeyPolicy) -> Self {
        self.null_keys = policy;
        self
    }
}

/// Execution knobs that never change results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalcOptions {
    /// Evaluate groups concurrently (needs the `parallel` feature)
    pub parallel: bool,
}

impl Default for CalcOptions {
    fn default() -> Self {
        Self {
            parallel: cfg!(feature = "parallel"),
        }
    }
}

impl CalcOptions {
    #[must_use]
    pub fn sequential() -> Self {
        Self { parallel: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_str() {
        assert_eq!("exclude".parse::<NullKeyPolicy>(), Ok(NullKeyPolicy::Exclude));
        assert_eq!("Isolate".parse::<NullKeyPolicy>(), Ok(NullKeyPolicy::Isolate));
        assert_eq!("group".parse::<NullKeyPolicy>(), Ok(NullKeyPolicy::Group));
        assert_eq!("REJECT".parse::<NullKeyPolicy>(), Ok(NullKeyPolicy::Reject));
        assert!("drop".parse::<NullKeyPolicy>().is_err());
    }

    #[test]
    fn test_panel_config_from_yaml() {
        let yaml = "id_column: Firm\ntime_column: Year\nnull_keys: reject\n";
        let config: PanelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.group_key_column.as_deref(), Some("Firm"));
        assert_eq!(config.time_column.as_deref(), Some("Year"));
        assert_eq!(config.null_keys, NullKeyPolicy::Reject);
    }

    #[test]
    fn test_panel_config_defaults() {
        let config: PanelConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, PanelConfig::new());
        assert_eq!(config.null_keys, NullKeyPolicy::Exclude);
        assert_eq!(config.null_keys.to_string(), "exclude");
    }
}

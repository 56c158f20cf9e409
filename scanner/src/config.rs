// config.rs — Analysis tunables
//
// Every threshold that was chosen empirically (field-count tolerance,
// re-synchronization lookahead, confidence bands) lives here with a
// documented default, loadable from a JSON file. Missing keys take defaults.
//
// Preconditions: none.
// Postconditions: a validated config has 0 <= floor <= confident <= 1,
//                 a positive weight sum, lookahead >= 1 and at least one
//                 stage variant.
// Failure modes: unreadable or malformed files and invalid values are
//                `ConfigError`s.
// Side effects: `load` reads one file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decl::Stage;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Structural aligner tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlignConfig {
    /// Max difference between shader field count and host non-padding field
    /// count for a host declaration to be a candidate.
    pub field_count_tolerance: usize,
    /// How far ahead (in fields, per side) re-synchronization may search.
    pub lookahead: usize,
    pub type_weight: f64,
    pub name_weight: f64,
    /// Added per field whose explicit offsets agree, scaled by field count.
    pub offset_bonus: f64,
    /// Weight of declaration-name similarity added on top of the layout
    /// score. Ranks same-layout candidates by how close their names are.
    pub decl_name_weight: f64,
    /// Added when declaration names are equal after normalization.
    pub decl_name_bonus: f64,
    /// Minimum pair score for a field pair to anchor re-synchronization.
    pub resync_threshold: f64,
    pub confident_threshold: f64,
    /// Candidates below this never take part in an ambiguity.
    pub ambiguous_floor: f64,
    /// Scores within this distance of the best are ambiguous with it.
    pub ambiguity_band: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        AlignConfig {
            field_count_tolerance: 4,
            lookahead: 3,
            type_weight: 0.6,
            name_weight: 0.4,
            offset_bonus: 0.05,
            decl_name_weight: 0.1,
            decl_name_bonus: 0.1,
            resync_threshold: 0.75,
            confident_threshold: 0.85,
            ambiguous_floor: 0.5,
            ambiguity_band: 0.05,
        }
    }
}

/// Declaration extractor tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Shader declarations whose name ends with one of these (compared
    /// case-insensitively) are stage IO structs, not buffers.
    pub skip_name_suffixes: Vec<String>,
    /// Drop host structs that hold pointers or references.
    pub skip_host_pointer_structs: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            skip_name_suffixes: vec!["_INPUT".to_string(), "_OUTPUT".to_string()],
            skip_host_pointer_structs: true,
        }
    }
}

impl ExtractConfig {
    pub fn is_skipped_name(&self, name: &str) -> bool {
        let upper = name.to_ascii_uppercase();
        self.skip_name_suffixes
            .iter()
            .any(|s| upper.ends_with(&s.to_ascii_uppercase()))
    }
}

// ── Stage variants ──────────────────────────────────────────────────────────

/// One preprocessing pass over every shader file: the defines it expands
/// with and the stage whose compilation it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageVariant {
    pub stage: Stage,
    /// `NAME` or `NAME=VALUE`.
    #[serde(default)]
    pub defines: Vec<String>,
}

impl StageVariant {
    pub fn new(stage: Stage, defines: &[&str]) -> Self {
        StageVariant {
            stage,
            defines: defines.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// The pixel/vertex sweep, each with and without `VR`.
    pub fn default_sweep() -> Vec<StageVariant> {
        vec![
            StageVariant::new(Stage::Pixel, &["PSHADER"]),
            StageVariant::new(Stage::Pixel, &["PSHADER", "VR"]),
            StageVariant::new(Stage::Vertex, &["VSHADER"]),
            StageVariant::new(Stage::Vertex, &["VSHADER", "VR"]),
        ]
    }
}

/// `stage` or `stage:NAME,NAME=VALUE` (the `--variant` spelling).
impl FromStr for StageVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stage, defines) = match s.split_once(':') {
            Some((stage, defines)) => (stage, defines),
            None => (s, ""),
        };
        Ok(StageVariant {
            stage: stage.trim().parse()?,
            defines: defines
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect(),
        })
    }
}

impl fmt::Display for StageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stage)?;
        if !self.defines.is_empty() {
            write!(f, ":{}", self.defines.join(","))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub align: AlignConfig,
    pub extract: ExtractConfig,
    /// Scan worker count; `None` uses one worker per core.
    pub jobs: Option<usize>,
    /// Every shader file is expanded once per variant.
    pub variants: Vec<StageVariant>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            align: AlignConfig::default(),
            extract: ExtractConfig::default(),
            jobs: None,
            variants: StageVariant::default_sweep(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AnalysisConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.align;
        let unit = [
            ("resync_threshold", a.resync_threshold),
            ("confident_threshold", a.confident_threshold),
            ("ambiguous_floor", a.ambiguous_floor),
            ("ambiguity_band", a.ambiguity_band),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "align.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if a.ambiguous_floor > a.confident_threshold {
            return Err(ConfigError::Invalid(format!(
                "align.ambiguous_floor ({}) exceeds align.confident_threshold ({})",
                a.ambiguous_floor, a.confident_threshold
            )));
        }
        if a.type_weight < 0.0 || a.name_weight < 0.0 || a.type_weight + a.name_weight <= 0.0 {
            return Err(ConfigError::Invalid(
                "align.type_weight and align.name_weight must be non-negative with a positive sum"
                    .to_string(),
            ));
        }
        if a.offset_bonus < 0.0 || a.decl_name_weight < 0.0 || a.decl_name_bonus < 0.0 {
            return Err(ConfigError::Invalid(
                "alignment bonuses must be non-negative".to_string(),
            ));
        }
        if a.lookahead == 0 {
            return Err(ConfigError::Invalid(
                "align.lookahead must be at least 1".to_string(),
            ));
        }
        if self.jobs == Some(0) {
            return Err(ConfigError::Invalid("jobs must be at least 1".to_string()));
        }
        if self.variants.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one stage variant is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{ "align": { "lookahead": 5 } }"#).unwrap();
        assert_eq!(config.align.lookahead, 5);
        assert_eq!(config.align.field_count_tolerance, 4);
        assert_eq!(config.extract.skip_name_suffixes, vec!["_INPUT", "_OUTPUT"]);
        assert_eq!(config.jobs, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<AnalysisConfig>(r#"{ "align": { "lookahed": 5 } }"#).is_err());
    }

    #[test]
    fn floor_above_confident_is_invalid() {
        let mut config = AnalysisConfig::default();
        config.align.ambiguous_floor = 0.9;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ambiguous_floor"));
    }

    #[test]
    fn zero_weights_are_invalid() {
        let mut config = AnalysisConfig::default();
        config.align.type_weight = 0.0;
        config.align.name_weight = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn variants_parse_from_json_and_flags() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{ "variants": [{ "stage": "ps", "defines": ["PSHADER"] }, { "stage": "compute" }] }"#,
        )
        .unwrap();
        assert_eq!(
            config.variants,
            vec![
                StageVariant::new(Stage::Pixel, &["PSHADER"]),
                StageVariant::new(Stage::Compute, &[]),
            ]
        );
        let v: StageVariant = "vertex:VSHADER, VR=1".parse().unwrap();
        assert_eq!(v, StageVariant::new(Stage::Vertex, &["VSHADER", "VR=1"]));
        assert_eq!(v.to_string(), "vertex:VSHADER,VR=1");
        assert!("tesselation".parse::<StageVariant>().is_err());
    }

    #[test]
    fn empty_variant_list_is_invalid() {
        let config = AnalysisConfig {
            variants: Vec::new(),
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn io_suffixes_match_case_insensitively() {
        let config = ExtractConfig::default();
        assert!(config.is_skipped_name("VS_OUTPUT"));
        assert!(config.is_skipped_name("PS_Input"));
        assert!(!config.is_skipped_name("PerFrame"));
    }

    #[test]
    fn load_reports_path() {
        let err = AnalysisConfig::load(Path::new("/no/such/bufscan.json")).unwrap_err();
        assert!(err.to_string().contains("bufscan.json"));
    }
}

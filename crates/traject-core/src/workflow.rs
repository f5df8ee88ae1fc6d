use crate::error::{Result, TrajectError};
use crate::types::Tone;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One ordered step in a supervision pipeline.
///
/// `tone` drives the status-distribution chart classification and `review`
/// marks the stage as part of the "awaiting review" subset. Both are
/// configuration on the stage itself rather than string matches on labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub review: bool,
}

impl Stage {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            tone: Tone::Neutral,
            review: false,
        }
    }

    fn tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    fn review(mut self) -> Self {
        self.review = true;
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// Ordered, runtime-immutable list of stages for one student category.
/// Position in the list is the total order used for all progress
/// comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowDefinition {
    stages: Vec<Stage>,
}

impl WorkflowDefinition {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.key == key)
    }

    pub fn stage(&self, key: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn first(&self) -> Option<&Stage> {
        self.stages.first()
    }

    pub fn last(&self) -> Option<&Stage> {
        self.stages.last()
    }

    /// Chart classification for a status key; unmapped keys are neutral.
    pub fn tone_for(&self, key: &str) -> Tone {
        self.stage(key).map(|s| s.tone).unwrap_or_default()
    }

    pub fn is_review(&self, key: &str) -> bool {
        self.stage(key).map(|s| s.review).unwrap_or(false)
    }

    pub fn review_keys(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().filter(|s| s.review).map(|s| s.key.as_str())
    }
}

/// The seven-stage supervision pipeline shared by the placement and thesis
/// categories: intake through completion, with a resit escape stage.
pub fn default_definition() -> WorkflowDefinition {
    WorkflowDefinition::new(vec![
        Stage::new("intake", "Intake").tone(Tone::Info),
        Stage::new("plan", "Project plan").tone(Tone::Warning),
        Stage::new("first_draft", "First draft report")
            .tone(Tone::Primary)
            .review(),
        Stage::new("second_draft", "Second draft report")
            .tone(Tone::Primary)
            .review(),
        Stage::new("final_version", "Final report")
            .tone(Tone::Success)
            .review(),
        Stage::new("resit", "Resit").tone(Tone::Danger),
        Stage::new("completed", "Completed").tone(Tone::Success),
    ])
}

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// WorkflowConfig
// ---------------------------------------------------------------------------

/// Per-category workflow definitions plus the default every unknown
/// category falls back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_definition")]
    pub default: WorkflowDefinition,
    /// Category key ("placement", "thesis", ...) → definition.
    #[serde(default)]
    pub categories: BTreeMap<String, WorkflowDefinition>,
}

fn default_version() -> u32 {
    1
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let default = default_definition();
        let mut categories = BTreeMap::new();
        categories.insert("placement".to_string(), default.clone());
        categories.insert("thesis".to_string(), default.clone());
        Self {
            version: 1,
            default,
            categories,
        }
    }
}

impl WorkflowConfig {
    /// Total lookup: unknown categories fall back to the default pipeline.
    pub fn stages_for(&self, category: &str) -> &WorkflowDefinition {
        self.categories.get(category).unwrap_or(&self.default)
    }

    /// Strict lookup used by the aggregation engine. An unknown category
    /// corrupts the stage-ordering invariant there, so it is an error
    /// rather than a silent fallback.
    pub fn definition_for(&self, category: &str) -> Result<&WorkflowDefinition> {
        self.categories
            .get(category)
            .ok_or_else(|| TrajectError::UnknownCategory(category.to_string()))
    }

    pub fn is_known_category(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: WorkflowConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(path, data.as_bytes())
    }

    /// Load the config at `path`, or the built-in default when the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let mut check = |name: &str, def: &WorkflowDefinition| {
            if def.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("workflow '{name}' has no stages"),
                });
                return;
            }
            let mut seen = std::collections::HashSet::new();
            for stage in def.stages() {
                if !seen.insert(stage.key.as_str()) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("workflow '{name}' has duplicate stage key '{}'", stage.key),
                    });
                }
                if stage.key.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("workflow '{name}' has a stage with an empty key"),
                    });
                }
            }
            if def.review_keys().next().is_none() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("workflow '{name}' marks no stage as review"),
                });
            }
        };

        check("default", &self.default);
        for (category, def) in &self.categories {
            check(category, def);
        }

        warnings
    }
}

/// Write `data` to `path` via a tempfile in the same directory, so a crash
/// mid-write cannot leave a truncated config behind.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_pipeline_order() {
        let def = default_definition();
        assert_eq!(def.len(), 7);
        assert_eq!(def.first().unwrap().key, "intake");
        assert_eq!(def.last().unwrap().key, "completed");
        assert!(def.position("plan").unwrap() < def.position("final_version").unwrap());
    }

    #[test]
    fn review_subset_is_the_draft_phases() {
        let def = default_definition();
        let review: Vec<_> = def.review_keys().collect();
        assert_eq!(review, vec!["first_draft", "second_draft", "final_version"]);
        assert!(!def.is_review("intake"));
    }

    #[test]
    fn tone_for_unmapped_key_is_neutral() {
        let def = default_definition();
        assert_eq!(def.tone_for("intake"), Tone::Info);
        assert_eq!(def.tone_for("no-such-stage"), Tone::Neutral);
    }

    #[test]
    fn stages_for_unknown_category_falls_back() {
        let cfg = WorkflowConfig::default();
        let def = cfg.stages_for("unheard-of");
        assert_eq!(def, &cfg.default);
    }

    #[test]
    fn definition_for_unknown_category_errors() {
        let cfg = WorkflowConfig::default();
        assert!(cfg.definition_for("placement").is_ok());
        assert!(matches!(
            cfg.definition_for("unheard-of"),
            Err(TrajectError::UnknownCategory(c)) if c == "unheard-of"
        ));
    }

    #[test]
    fn config_yaml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workflows.yaml");

        let cfg = WorkflowConfig::default();
        cfg.save(&path).unwrap();

        let loaded = WorkflowConfig::load(&path).unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.categories.len(), 2);
        assert_eq!(loaded.stages_for("thesis"), cfg.stages_for("thesis"));
    }

    #[test]
    fn load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        let cfg = WorkflowConfig::load_or_default(&dir.path().join("missing.yaml")).unwrap();
        assert!(cfg.is_known_category("placement"));
    }

    #[test]
    fn validate_default_config_clean() {
        let warnings = WorkflowConfig::default().validate();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn validate_flags_duplicate_keys() {
        let mut cfg = WorkflowConfig::default();
        cfg.categories.insert(
            "broken".to_string(),
            WorkflowDefinition::new(vec![
                Stage::new("intake", "Intake"),
                Stage::new("intake", "Intake again"),
            ]),
        );
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("duplicate stage key")));
    }

    #[test]
    fn validate_flags_empty_definition() {
        let mut cfg = WorkflowConfig::default();
        cfg.categories
            .insert("empty".to_string(), WorkflowDefinition::new(vec![]));
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("'empty' has no stages")));
    }
}

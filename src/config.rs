use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone)]
pub struct RunConfig {
    pub description: Option<String>,
    pub authority: PathBuf,
    pub dictionary: Option<PathBuf>,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub sources: Vec<SourceConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SourceConfig {
    pub description: Option<String>,
    pub path: String,
    pub source_name: Option<String>,
    pub kind: Option<SourceKind>,
    #[serde(default)]
    pub period_mode: PeriodMode,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Weekly,
    General,
    Causes,
}

impl SourceKind {
    pub fn infer(source_name: &str) -> Self {
        let lower = source_name.to_lowercase();
        if lower.contains("cause") {
            SourceKind::Causes
        } else if lower.contains("general") {
            SourceKind::General
        } else {
            SourceKind::Weekly
        }
    }
}

/// `Register` sources may add new periods to the index; `Link` sources only
/// attach to periods that already exist.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PeriodMode {
    #[default]
    Register,
    Link,
}

/// Exclusive year bounds, matching the bills database constraint.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    #[serde(default = "default_min_year")]
    pub min_year: i32,
    #[serde(default = "default_max_year")]
    pub max_year: i32,
}

fn default_min_year() -> i32 { 1400 }
fn default_max_year() -> i32 { 1800 }

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { min_year: default_min_year(), max_year: default_max_year() }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open run configuration file: {}", path.display()))?;
        let mut config: RunConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse run configuration YAML from {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Paths in the run config are relative to the config file, not the working directory.
    fn resolve_relative_to(&mut self, base: &Path) {
        if self.authority.is_relative() {
            self.authority = base.join(&self.authority);
        }
        if let Some(dictionary) = self.dictionary.as_mut() {
            if dictionary.is_relative() {
                *dictionary = base.join(&*dictionary);
            }
        }
        for source in &mut self.sources {
            if Path::new(&source.path).is_relative() {
                source.path = base.join(&source.path).to_string_lossy().to_string();
            }
        }
    }
}

const DATASET_PATTERNS: [(&str, &[&str]); 20] = [
    ("wellcome_causes", &["wellcome", "causes"]),
    ("wellcome_parishes", &["wellcome", "parishes"]),
    ("laxton_causes", &["laxton", "causes"]),
    ("laxton_parishes", &["laxton", "parishes"]),
    ("bodleian_causes", &["bodleian", "causes"]),
    ("bodleian_parishes", &["bodleian", "parishes"]),
    ("blv1_parishes", &["blv1", "parishes"]),
    ("blv2_parishes", &["blv2", "parishes"]),
    ("blv3_parishes", &["blv3", "parishes"]),
    ("blv4_parishes_original", &["blv4", "originaldataset"]),
    ("blv4_parishes_missing", &["blv4", "missingbillsdataset"]),
    ("heh_parishes", &["heh", "parishes"]),
    ("millar_parishes", &["millar", "parishes"]),
    ("qc_parishes", &["qc", "parishes"]),
    ("qc_causes", &["qc", "causes"]),
    ("datascribe_parishes", &["datascribe", "dataset"]),
    ("bl_parishes", &["bl1877", "minus3foldbill"]),
    ("bl_special", &["bl1877"]),
    ("laxton_foodstuffs", &["laxton", "foodstuffs"]),
    ("laxton_gender", &["laxton", "gender"]),
];

/// Names a dataset from its file name: each pattern's fragments must appear in order.
pub fn detect_source_name(path: &Path) -> String {
    let file_name = path.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
    for (name, fragments) in DATASET_PATTERNS.iter() {
        let mut rest = file_name.as_str();
        let matched = fragments.iter().all(|fragment| match rest.find(fragment) {
            Some(pos) => { rest = &rest[pos + fragment.len()..]; true }
            None => false,
        });
        if matched {
            return name.to_string();
        }
    }
    if file_name.contains("cause") {
        "causes_unknown".to_string()
    } else if file_name.contains("parish") {
        "parishes_unknown".to_string()
    } else {
        file_name.trim_end_matches(".gz").trim_end_matches(".csv").to_string()
    }
}

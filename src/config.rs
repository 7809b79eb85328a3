use crate::error::{AutomationError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Immutable process configuration, built once at startup and passed by
/// reference into the orchestrator and processor. Core logic never reads
/// configuration from ambient scope.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub monitoring: MonitoringConfig,
    pub classification: ClassificationConfig,
    pub ledger: LedgerConfig,
    pub build_file: BuildFileConfig,
    pub assessment: AssessmentConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// How far back to look for events, in days
    pub lookback_days: i64,
    /// How far ahead to look for events, in days
    pub lookahead_days: i64,
    /// JSON feed URLs, one calendar source each
    pub calendar_feeds: Vec<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            lookahead_days: 30,
            calendar_feeds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Checked first; an event matching both lists classifies as Phase 1
    pub phase1_keywords: Vec<String>,
    pub phase2_keywords: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            phase1_keywords: vec!["phase 1".to_string(), "leadership intensive".to_string()],
            phase2_keywords: vec!["phase 2".to_string(), "group debrief".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite database path for the processed-events ledger
    pub path: String,
    /// Rows whose event date is older than this are pruned
    pub retention_days: i64,
    /// When false every event is treated as new (ledger reads are bypassed)
    pub dedupe_enabled: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: "data/ledger.db".to_string(),
            retention_days: 365,
            dedupe_enabled: true,
        }
    }
}

/// Fixed cell layout of a Build File. Sections are sheet names; rows are
/// positions within the single value column each section carries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildFileConfig {
    /// Template copied for every new leader
    pub template_id: String,
    /// Root directory of the filesystem-backed store
    pub storage_dir: String,
    pub phase1_section: String,
    pub phase2_section: String,
    pub rows: FieldRows,
}

impl Default for BuildFileConfig {
    fn default() -> Self {
        Self {
            template_id: "build-file-template".to_string(),
            storage_dir: "data/build_files".to_string(),
            phase1_section: "Phase 1".to_string(),
            phase2_section: "Phase 2".to_string(),
            rows: FieldRows::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldRows {
    pub date: u32,
    pub time: u32,
    pub leader_name: u32,
    pub zoom_link: u32,
    pub login_code: u32,
    pub response_url: u32,
}

impl Default for FieldRows {
    fn default() -> Self {
        Self {
            date: 2,
            time: 3,
            leader_name: 4,
            zoom_link: 5,
            login_code: 7,
            response_url: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Store the full response URL alongside the login code
    pub store_response_url: bool,
    /// Deadline for the link-creation call
    pub timeout_seconds: u64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            store_response_url: true,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub notify_on_success: bool,
    pub notify_on_failure: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            notify_on_success: true,
            notify_on_failure: true,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AutomationError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.classification.phase1_keywords.is_empty()
            || self.classification.phase2_keywords.is_empty()
        {
            return Err(AutomationError::Config(
                "both phase keyword lists must be non-empty".to_string(),
            ));
        }
        if self.monitoring.lookback_days < 0 || self.monitoring.lookahead_days < 0 {
            return Err(AutomationError::Config(
                "monitoring window durations must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

pub mod fs;
pub mod memory;

pub use fs::FsBuildFileStore;
pub use memory::MemoryBuildFileStore;

use crate::error::Result;
use crate::extract::LeadInfo;
use async_trait::async_trait;

/// Handle to a per-leader Build File (templated document plus its containing
/// folder) living in external storage. Field values stay in the store and
/// are addressed by (section, row).
#[derive(Debug, Clone)]
pub struct BuildFile {
    pub id: String,
    pub folder_id: String,
    pub leader_key: String,
    pub leader_name: String,
    pub company: String,
}

/// Deterministic name-derived identifier for a leader's Build File.
/// "Ava Brooks" and "ava  brooks" collapse to the same key.
pub fn leader_key(full_name: &str) -> String {
    full_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Storage trait for Build Files and their folders.
///
/// The store has no uniqueness constraint of its own beyond name matching;
/// create-at-most-once per leader is enforced by the processor.
#[async_trait]
pub trait BuildFileStore: Send + Sync {
    async fn find_by_leader_key(&self, leader_key: &str) -> Result<Option<BuildFile>>;

    async fn create_from_template(&self, template_id: &str, lead: &LeadInfo) -> Result<BuildFile>;

    async fn get_by_id(&self, file_id: &str) -> Result<Option<BuildFile>>;

    /// Structural search: company folder, then leader folder, then the named
    /// file. The slow correctness-preserving fallback behind the ledger's
    /// email index.
    async fn find_structural(&self, company: &str, leader_name: &str)
        -> Result<Option<BuildFile>>;

    /// Read a cell; unset cells read as the empty string.
    async fn get_field(&self, file_id: &str, section: &str, row: u32) -> Result<String>;

    async fn set_field(&self, file_id: &str, section: &str, row: u32, value: &str) -> Result<()>;
}

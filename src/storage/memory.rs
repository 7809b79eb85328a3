use super::{leader_key, BuildFile, BuildFileStore};
use crate::error::{AutomationError, Result};
use crate::extract::LeadInfo;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

struct StoredFile {
    meta: BuildFile,
    cells: HashMap<(String, u32), String>,
}

/// In-memory Build File store for development and testing, standing in for
/// the Drive/Sheets collaborator behind the same trait.
pub struct MemoryBuildFileStore {
    files: Mutex<HashMap<String, StoredFile>>,
    /// Folder ids keyed by "company/leader" path, lowercased
    folders: Mutex<HashMap<String, String>>,
}

impl MemoryBuildFileStore {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            folders: Mutex::new(HashMap::new()),
        }
    }

    fn folder_for(&self, company: &str, leader_name: &str) -> String {
        let path = format!("{}/{}", company.to_lowercase(), leader_name.to_lowercase());
        let mut folders = self.folders.lock().unwrap();
        folders
            .entry(path)
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }
}

impl Default for MemoryBuildFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildFileStore for MemoryBuildFileStore {
    async fn find_by_leader_key(&self, leader_key: &str) -> Result<Option<BuildFile>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .values()
            .find(|f| f.meta.leader_key == leader_key)
            .map(|f| f.meta.clone()))
    }

    async fn create_from_template(&self, template_id: &str, lead: &LeadInfo) -> Result<BuildFile> {
        if template_id.is_empty() {
            return Err(AutomationError::FileCreation(
                "no template configured".to_string(),
            ));
        }
        let key = leader_key(&lead.full_name);
        let folder_id = self.folder_for(&lead.company_name, &lead.full_name);
        let meta = BuildFile {
            id: Uuid::new_v4().to_string(),
            folder_id,
            leader_key: key,
            leader_name: lead.full_name.clone(),
            company: lead.company_name.clone(),
        };

        let mut files = self.files.lock().unwrap();
        files.insert(
            meta.id.clone(),
            StoredFile {
                meta: meta.clone(),
                cells: HashMap::new(),
            },
        );
        debug!(file_id = %meta.id, leader = %meta.leader_name, "Created Build File from template");
        Ok(meta)
    }

    async fn get_by_id(&self, file_id: &str) -> Result<Option<BuildFile>> {
        let files = self.files.lock().unwrap();
        Ok(files.get(file_id).map(|f| f.meta.clone()))
    }

    async fn find_structural(
        &self,
        company: &str,
        leader_name: &str,
    ) -> Result<Option<BuildFile>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .values()
            .find(|f| {
                f.meta.company.eq_ignore_ascii_case(company)
                    && f.meta.leader_name.eq_ignore_ascii_case(leader_name)
            })
            .map(|f| f.meta.clone()))
    }

    async fn get_field(&self, file_id: &str, section: &str, row: u32) -> Result<String> {
        let files = self.files.lock().unwrap();
        let file = files
            .get(file_id)
            .ok_or_else(|| AutomationError::Storage(format!("unknown Build File '{file_id}'")))?;
        Ok(file
            .cells
            .get(&(section.to_string(), row))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_field(&self, file_id: &str, section: &str, row: u32, value: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let file = files
            .get_mut(file_id)
            .ok_or_else(|| AutomationError::Storage(format!("unknown Build File '{file_id}'")))?;
        file.cells
            .insert((section.to_string(), row), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(name: &str, company: &str) -> LeadInfo {
        LeadInfo {
            first_name: String::new(),
            last_name: String::new(),
            full_name: name.to_string(),
            email: "lead@example.com".to_string(),
            company_name: company.to_string(),
            phone: String::new(),
            formatted_date: "January 10, 2025".to_string(),
            formatted_time: "6:00 PM".to_string(),
            zoom_link: "https://zoom.us/j/1".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_find_by_leader_key() {
        let store = MemoryBuildFileStore::new();
        let created = store
            .create_from_template("tpl", &lead("Ava Brooks", "Acme Co"))
            .await
            .unwrap();
        let found = store.find_by_leader_key("ava-brooks").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(!found.folder_id.is_empty());
    }

    #[tokio::test]
    async fn structural_search_matches_case_insensitively() {
        let store = MemoryBuildFileStore::new();
        let created = store
            .create_from_template("tpl", &lead("Ava Brooks", "Acme Co"))
            .await
            .unwrap();
        let found = store
            .find_structural("acme co", "AVA BROOKS")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert!(store
            .find_structural("Acme Co", "Nobody")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn cells_read_back_and_default_to_empty() {
        let store = MemoryBuildFileStore::new();
        let file = store
            .create_from_template("tpl", &lead("Ava Brooks", "Acme Co"))
            .await
            .unwrap();
        assert_eq!(store.get_field(&file.id, "Phase 1", 2).await.unwrap(), "");
        store
            .set_field(&file.id, "Phase 1", 2, "January 10, 2025")
            .await
            .unwrap();
        assert_eq!(
            store.get_field(&file.id, "Phase 1", 2).await.unwrap(),
            "January 10, 2025"
        );
    }

    #[tokio::test]
    async fn same_company_folder_is_reused() {
        let store = MemoryBuildFileStore::new();
        let a = store
            .create_from_template("tpl", &lead("Ava Brooks", "Acme Co"))
            .await
            .unwrap();
        let b = store
            .create_from_template("tpl", &lead("Ava Brooks", "Acme Co"))
            .await
            .unwrap();
        // Same leader, same folder; distinct file ids (no store-level
        // uniqueness, the processor owns create-at-most-once)
        assert_eq!(a.folder_id, b.folder_id);
        assert_ne!(a.id, b.id);
    }
}

use super::{leader_key, BuildFile, BuildFileStore};
use crate::error::{AutomationError, Result};
use crate::extract::LeadInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// On-disk document for one Build File. Cells are keyed "section:row".
#[derive(Debug, Serialize, Deserialize)]
struct FileDoc {
    id: String,
    folder_id: String,
    leader_key: String,
    leader_name: String,
    company: String,
    template_id: String,
    cells: HashMap<String, String>,
}

impl FileDoc {
    fn meta(&self) -> BuildFile {
        BuildFile {
            id: self.id.clone(),
            folder_id: self.folder_id.clone(),
            leader_key: self.leader_key.clone(),
            leader_name: self.leader_name.clone(),
            company: self.company.clone(),
        }
    }
}

fn cell_key(section: &str, row: u32) -> String {
    format!("{section}:{row}")
}

/// Filesystem-backed Build File store: one JSON document per file under a
/// root directory. Suitable for single-batch sequential use; the Drive
/// collaborator slots in behind the same trait.
pub struct FsBuildFileStore {
    root: PathBuf,
}

impl FsBuildFileStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn doc_path(&self, file_id: &str) -> PathBuf {
        self.root.join(format!("{file_id}.json"))
    }

    fn load(&self, file_id: &str) -> Result<Option<FileDoc>> {
        let path = self.doc_path(file_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, doc: &FileDoc) -> Result<()> {
        let content = serde_json::to_string_pretty(doc)?;
        fs::write(self.doc_path(&doc.id), content)?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<FileDoc>> {
        let mut docs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let content = fs::read_to_string(&path)?;
                docs.push(serde_json::from_str(&content)?);
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl BuildFileStore for FsBuildFileStore {
    async fn find_by_leader_key(&self, key: &str) -> Result<Option<BuildFile>> {
        Ok(self
            .load_all()?
            .iter()
            .find(|d| d.leader_key == key)
            .map(FileDoc::meta))
    }

    async fn create_from_template(&self, template_id: &str, lead: &LeadInfo) -> Result<BuildFile> {
        if template_id.is_empty() {
            return Err(AutomationError::FileCreation(
                "no template configured".to_string(),
            ));
        }
        let key = leader_key(&lead.full_name);
        // Reuse the leader's folder when another of their files already
        // carries one
        let folder_id = self
            .load_all()?
            .iter()
            .find(|d| {
                d.company.eq_ignore_ascii_case(&lead.company_name)
                    && d.leader_name.eq_ignore_ascii_case(&lead.full_name)
            })
            .map(|d| d.folder_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let doc = FileDoc {
            id: Uuid::new_v4().to_string(),
            folder_id,
            leader_key: key,
            leader_name: lead.full_name.clone(),
            company: lead.company_name.clone(),
            template_id: template_id.to_string(),
            cells: HashMap::new(),
        };
        self.save(&doc)?;
        debug!(file_id = %doc.id, leader = %doc.leader_name, "Created Build File on disk");
        Ok(doc.meta())
    }

    async fn get_by_id(&self, file_id: &str) -> Result<Option<BuildFile>> {
        Ok(self.load(file_id)?.map(|d| d.meta()))
    }

    async fn find_structural(
        &self,
        company: &str,
        leader_name: &str,
    ) -> Result<Option<BuildFile>> {
        Ok(self
            .load_all()?
            .iter()
            .find(|d| {
                d.company.eq_ignore_ascii_case(company)
                    && d.leader_name.eq_ignore_ascii_case(leader_name)
            })
            .map(FileDoc::meta))
    }

    async fn get_field(&self, file_id: &str, section: &str, row: u32) -> Result<String> {
        let doc = self.load(file_id)?.ok_or_else(|| {
            AutomationError::Storage(format!("unknown Build File '{file_id}'"))
        })?;
        Ok(doc
            .cells
            .get(&cell_key(section, row))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_field(&self, file_id: &str, section: &str, row: u32, value: &str) -> Result<()> {
        let mut doc = self.load(file_id)?.ok_or_else(|| {
            AutomationError::Storage(format!("unknown Build File '{file_id}'"))
        })?;
        doc.cells.insert(cell_key(section, row), value.to_string());
        self.save(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

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
    async fn documents_survive_reopen() {
        let dir = tempdir().unwrap();
        let file_id = {
            let store = FsBuildFileStore::open(dir.path()).unwrap();
            let file = store
                .create_from_template("tpl", &lead("Ava Brooks", "Acme Co"))
                .await
                .unwrap();
            store
                .set_field(&file.id, "Phase 1", 7, "LC-1")
                .await
                .unwrap();
            file.id
        };

        let store = FsBuildFileStore::open(dir.path()).unwrap();
        let found = store.find_by_leader_key("ava-brooks").await.unwrap().unwrap();
        assert_eq!(found.id, file_id);
        assert_eq!(
            store.get_field(&file_id, "Phase 1", 7).await.unwrap(),
            "LC-1"
        );
    }

    #[tokio::test]
    async fn structural_search_and_missing_file_handling() {
        let dir = tempdir().unwrap();
        let store = FsBuildFileStore::open(dir.path()).unwrap();
        store
            .create_from_template("tpl", &lead("Ava Brooks", "Acme Co"))
            .await
            .unwrap();

        assert!(store
            .find_structural("ACME CO", "ava brooks")
            .await
            .unwrap()
            .is_some());
        assert!(store.get_by_id("no-such-id").await.unwrap().is_none());
        assert!(store.set_field("no-such-id", "Phase 1", 2, "x").await.is_err());
    }
}

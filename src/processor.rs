use crate::assessment::AssessmentApi;
use crate::config::{ClassificationConfig, Config};
use crate::error::{AutomationError, Result};
use crate::extract::{extract_lead_info, LeadInfo};
use crate::ledger::EventLedger;
use crate::storage::{leader_key, BuildFile, BuildFileStore};
use crate::types::{CalendarEvent, Phase};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Classify an event by keyword match against its description text.
///
/// The Phase 1 list is checked first, so an event whose text matches both
/// lists classifies as Phase 1. The original system never defined what a
/// dual match should mean; this preserves its observed behavior.
pub fn classify(event: &CalendarEvent, config: &ClassificationConfig) -> Option<Phase> {
    let text = event.description.to_lowercase();
    if config
        .phase1_keywords
        .iter()
        .any(|kw| text.contains(&kw.to_lowercase()))
    {
        return Some(Phase::Phase1);
    }
    if config
        .phase2_keywords
        .iter()
        .any(|kw| text.contains(&kw.to_lowercase()))
    {
        return Some(Phase::Phase2);
    }
    None
}

/// Runs a best-effort secondary write that must not abort the primary
/// operation. Failures are logged and discarded.
async fn non_critical<F>(what: &str, op: F)
where
    F: Future<Output = Result<()>>,
{
    if let Err(e) = op.await {
        warn!("Non-critical step '{}' failed: {}", what, e);
    }
}

#[derive(Debug)]
pub struct Phase1Outcome {
    pub lead: LeadInfo,
    pub file_id: String,
    pub folder_id: String,
    /// Whether this run minted the Build File (and its login code)
    pub created: bool,
}

#[derive(Debug)]
pub struct Phase2Outcome {
    pub lead: LeadInfo,
    /// Resolved for the update; Phase 2 never mints a new artifact
    pub file_id: String,
}

/// Drives the idempotent create-or-update workflow for classified events.
pub struct SessionProcessor {
    files: Arc<dyn BuildFileStore>,
    assessment: Arc<dyn AssessmentApi>,
    config: Arc<Config>,
}

impl SessionProcessor {
    pub fn new(
        files: Arc<dyn BuildFileStore>,
        assessment: Arc<dyn AssessmentApi>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            files,
            assessment,
            config,
        }
    }

    /// Phase 1: create or update the leader's Build File.
    ///
    /// The assessment API is called only when this run creates the file; an
    /// existing file keeps its login code no matter what (regenerating would
    /// invalidate the link already sent to the client).
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn process_phase1(&self, event: &CalendarEvent) -> Result<Phase1Outcome> {
        let lead = extract_lead_info(event)?;
        let key = leader_key(&lead.full_name);
        let build = &self.config.build_file;

        let (file, created) = match self.files.find_by_leader_key(&key).await? {
            Some(existing) => {
                info!(file_id = %existing.id, "Updating existing Build File");
                (existing, false)
            }
            None => {
                let file = self
                    .files
                    .create_from_template(&build.template_id, &lead)
                    .await?;
                info!(file_id = %file.id, leader = %lead.full_name, "Created Build File");
                (file, true)
            }
        };

        self.write_phase1_fields(&file, &lead).await?;

        if created {
            let link = self.assessment.create_link(&lead).await?;
            self.files
                .set_field(
                    &file.id,
                    &build.phase1_section,
                    build.rows.login_code,
                    &link.login_code,
                )
                .await?;
            if self.config.assessment.store_response_url {
                if let Some(url) = &link.response_url {
                    self.files
                        .set_field(&file.id, &build.phase1_section, build.rows.response_url, url)
                        .await?;
                }
            }
            non_critical(
                "propagate login code to Phase 2 section",
                self.files.set_field(
                    &file.id,
                    &build.phase2_section,
                    build.rows.login_code,
                    &link.login_code,
                ),
            )
            .await;
        }

        self.validate_phase1(&file).await?;

        Ok(Phase1Outcome {
            lead,
            file_id: file.id,
            folder_id: file.folder_id,
            created,
        })
    }

    /// Phase 2: resolve the Build File minted by Phase 1 and update its
    /// session fields. Resolution is two-tier: the ledger's email index
    /// first, then a structural folder search.
    #[instrument(skip(self, event, ledger), fields(event_id = %event.id))]
    pub async fn process_phase2(
        &self,
        event: &CalendarEvent,
        ledger: &EventLedger,
    ) -> Result<Phase2Outcome> {
        let lead = extract_lead_info(event)?;
        let file = self.resolve_build_file(&lead, ledger).await?;
        let build = &self.config.build_file;

        self.files
            .set_field(
                &file.id,
                &build.phase2_section,
                build.rows.date,
                &lead.formatted_date,
            )
            .await?;
        self.files
            .set_field(
                &file.id,
                &build.phase2_section,
                build.rows.time,
                &lead.formatted_time,
            )
            .await?;
        self.files
            .set_field(
                &file.id,
                &build.phase2_section,
                build.rows.zoom_link,
                &lead.zoom_link,
            )
            .await?;

        // Keep the Phase 2 section's login code in step with Phase 1
        match self
            .files
            .get_field(&file.id, &build.phase1_section, build.rows.login_code)
            .await
        {
            Ok(code) if !code.is_empty() => {
                non_critical(
                    "copy login code into Phase 2 section",
                    self.files.set_field(
                        &file.id,
                        &build.phase2_section,
                        build.rows.login_code,
                        &code,
                    ),
                )
                .await;
            }
            Ok(_) => warn!(file_id = %file.id, "Login code empty during Phase 2 update"),
            Err(e) => warn!(file_id = %file.id, "Could not read login code: {}", e),
        }

        info!(file_id = %file.id, "Updated Build File for Phase 2");
        Ok(Phase2Outcome {
            lead,
            file_id: file.id,
        })
    }

    async fn resolve_build_file(
        &self,
        lead: &LeadInfo,
        ledger: &EventLedger,
    ) -> Result<BuildFile> {
        if let Some(record) = ledger
            .find_by_email(&lead.email, Some(lead.full_name.as_str()))
            .await
        {
            if let Some(file_id) = record.build_file_id.as_deref() {
                match self.files.get_by_id(file_id).await? {
                    Some(file) => {
                        debug!(%file_id, "Resolved Build File via ledger email index");
                        return Ok(file);
                    }
                    None => {
                        warn!(
                            %file_id,
                            "Ledger points at a Build File that no longer exists, \
                             falling back to structural search"
                        );
                    }
                }
            }
        }

        if let Some(file) = self
            .files
            .find_structural(&lead.company_name, &lead.full_name)
            .await?
        {
            info!(file_id = %file.id, "Resolved Build File via structural search");
            return Ok(file);
        }

        Err(AutomationError::BuildFileNotFound {
            leader: lead.full_name.clone(),
            email: lead.email.clone(),
        })
    }

    async fn write_phase1_fields(&self, file: &BuildFile, lead: &LeadInfo) -> Result<()> {
        let build = &self.config.build_file;
        let section = &build.phase1_section;
        self.files
            .set_field(&file.id, section, build.rows.date, &lead.formatted_date)
            .await?;
        self.files
            .set_field(&file.id, section, build.rows.time, &lead.formatted_time)
            .await?;
        self.files
            .set_field(&file.id, section, build.rows.leader_name, &lead.full_name)
            .await?;
        self.files
            .set_field(&file.id, section, build.rows.zoom_link, &lead.zoom_link)
            .await?;
        Ok(())
    }

    /// Critical-path checkpoint: re-read the fields Phase 2 depends on and
    /// refuse to report success while any is empty. Runs before the
    /// orchestrator is allowed to mark the event processed, so the ledger
    /// can never record a Build File that is missing its login code.
    async fn validate_phase1(&self, file: &BuildFile) -> Result<()> {
        let build = &self.config.build_file;
        let critical = [
            ("date", build.rows.date),
            ("time", build.rows.time),
            ("leader name", build.rows.leader_name),
            ("zoom link", build.rows.zoom_link),
            ("login code", build.rows.login_code),
        ];
        for (name, row) in critical {
            let value = self
                .files
                .get_field(&file.id, &build.phase1_section, row)
                .await?;
            if value.trim().is_empty() {
                return Err(AutomationError::Validation {
                    file_id: file.id.clone(),
                    reason: format!("field '{name}' is empty"),
                });
            }
        }
        debug!(file_id = %file.id, "Build File passed validation");
        Ok(())
    }
}

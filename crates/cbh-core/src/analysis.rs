//! Quota-gated chart analysis pipeline.
//!
//! quota gate → download to a transient file → read → vision model → report.
//! The transient file is owned by a [`TransientFile`] guard for the whole
//! pipeline so it is removed on every exit path.

use std::{path::PathBuf, sync::Arc};

use tracing::{error, info, warn};

use crate::{
    domain::{Language, UserId},
    errors::AdapterError,
    formatting::strip_wrapping_fences,
    ports::{ImageSource, VisionAnalyzer},
    quota::{Gate, QuotaLedger},
    utils::TransientFile,
};

/// One photo handed to the orchestrator.
#[derive(Clone, Debug)]
pub struct PhotoSubmission {
    pub user_id: UserId,
    pub file_id: String,
    pub file_unique_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalysisFailure {
    /// No vision credential configured.
    ConfigurationMissing,
    /// Today's quota is used up; carries the current count.
    QuotaExceeded(u32),
    /// Download or model call failed.
    Upstream(AdapterError),
}

impl AnalysisFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisFailure::ConfigurationMissing => "configuration_missing",
            AnalysisFailure::QuotaExceeded(_) => "quota_exceeded",
            AnalysisFailure::Upstream(_) => "upstream_error",
        }
    }
}

pub type AnalysisResult = std::result::Result<String, AnalysisFailure>;

pub struct AnalysisOrchestrator {
    ledger: QuotaLedger,
    vision: Option<Arc<dyn VisionAnalyzer>>,
    temp_dir: PathBuf,
}

impl AnalysisOrchestrator {
    pub fn new(
        ledger: QuotaLedger,
        vision: Option<Arc<dyn VisionAnalyzer>>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ledger,
            vision,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    pub async fn analyze(
        &self,
        submission: &PhotoSubmission,
        language: Language,
        images: &dyn ImageSource,
    ) -> AnalysisResult {
        let user_id = submission.user_id;

        // Checked before charging quota so a misconfigured bot never burns a slot.
        let Some(vision) = self.vision.as_ref() else {
            warn!(user = %user_id, "analysis requested but no vision credential is configured");
            return Err(AnalysisFailure::ConfigurationMissing);
        };

        match self.ledger.gate(user_id).await {
            Gate::Denied(count) => {
                info!(user = %user_id, count, "analysis denied: daily quota exhausted");
                return Err(AnalysisFailure::QuotaExceeded(count));
            }
            Gate::Allowed(count) => {
                info!(user = %user_id, count, limit = self.ledger.limit(), "analysis quota granted");
            }
            Gate::Unenforced => {}
        }

        let file = TransientFile::reserve(&self.temp_dir, "chart", &submission.file_unique_id, "jpg");
        let result = self
            .run_pipeline(&file, submission, language, &**vision, images)
            .await;

        if let Err(e) = file.release().await {
            warn!(user = %user_id, error = %e, "failed to remove transient chart image");
        }

        result.map_err(|e| {
            error!(user = %user_id, operation = "analyze_chart", error = %e, "chart analysis failed");
            AnalysisFailure::Upstream(e)
        })
    }

    async fn run_pipeline(
        &self,
        file: &TransientFile,
        submission: &PhotoSubmission,
        language: Language,
        vision: &dyn VisionAnalyzer,
        images: &dyn ImageSource,
    ) -> Result<String, AdapterError> {
        images.download(&submission.file_id, file.path()).await?;

        let bytes = tokio::fs::read(file.path())
            .await
            .map_err(|e| AdapterError::TransportFailure(format!("read downloaded image: {e}")))?;
        if bytes.is_empty() {
            return Err(AdapterError::NoData);
        }

        let report = vision.analyze(&bytes, language).await?;
        let report = strip_wrapping_fences(&report);
        if report.is_empty() {
            return Err(AdapterError::NoData);
        }
        Ok(report)
    }
}

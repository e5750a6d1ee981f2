//! PDF import wizard.
//!
//! ```text
//! Upload -> Processing -> Review -> BatchCreating -> Complete
//!   ^           |           |                          |
//!   +-----------+-----------+--------------------------+
//! ```
//!
//! Extraction failures abort back to `Upload`. During batch creation every
//! record is attempted in order and its outcome recorded on its own; one
//! failed record never stops the rest.

use crate::cache::{QueryCache, QueryKey};
use crate::error::{ApiError, ApiResult};
use crate::model::{
    CreateMachineRequest, ExtractedMachine, Machine, MachineStatus, MagazineProperties,
    PdfExtractionResponse,
};
use crate::services::{MachineService, PdfService, PdfUpload};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportStep {
    Upload,
    Processing,
    Review,
    BatchCreating,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordBadge {
    Invalid,
    Duplicate,
    Ready,
}

impl RecordBadge {
    pub fn of(machine: &ExtractedMachine) -> Self {
        if !machine.is_valid {
            RecordBadge::Invalid
        } else if machine.already_exists {
            RecordBadge::Duplicate
        } else {
            RecordBadge::Ready
        }
    }

    pub fn label_de(self) -> &'static str {
        match self {
            RecordBadge::Invalid => "Ungültig",
            RecordBadge::Duplicate => "Bereits vorhanden",
            RecordBadge::Ready => "Bereit",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub index: usize,
    pub badge: RecordBadge,
    pub selected: bool,
    pub machine: ExtractedMachine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub machine_number: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub successfully_created: usize,
    pub failed: usize,
    pub total_machines: usize,
    pub results: Vec<RecordOutcome>,
}

impl BatchSummary {
    fn from_results(results: Vec<RecordOutcome>) -> Self {
        let successfully_created = results.iter().filter(|r| r.success).count();
        Self {
            successfully_created,
            failed: results.len() - successfully_created,
            total_machines: results.len(),
            results,
        }
    }
}

/// Published before each record is sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    /// One-based position in the batch.
    pub current: usize,
    pub total: usize,
    pub machine_number: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Bitte wählen Sie eine PDF-Datei aus: {0}")]
    NotPdf(String),

    #[error("Keine Datei ausgewählt.")]
    NoFile,

    #[error("operation not available in step {actual:?}")]
    WrongStep { actual: ImportStep },

    #[error("{0}")]
    NoRecords(String),

    #[error("{}", .0.user_message())]
    Extraction(ApiError),

    #[error("Keine Maschinen ausgewählt.")]
    NothingSelected,

    #[error("record {0} cannot be selected")]
    NotSelectable(usize),

    #[error("record {0} does not exist")]
    UnknownRecord(usize),
}

/// Backend calls the wizard depends on.
#[async_trait]
pub trait ImportBackend: Send + Sync {
    async fn extract(&self, upload: &PdfUpload) -> ApiResult<PdfExtractionResponse>;
    async fn create_machine(&self, req: &CreateMachineRequest) -> ApiResult<Machine>;
    async fn update_magazine(&self, machine_id: i64, props: &MagazineProperties) -> ApiResult<()>;
}

pub struct ApiImportBackend {
    pdf: PdfService,
    machines: MachineService,
}

impl ApiImportBackend {
    pub fn new(pdf: PdfService, machines: MachineService) -> Self {
        Self { pdf, machines }
    }
}

#[async_trait]
impl ImportBackend for ApiImportBackend {
    async fn extract(&self, upload: &PdfUpload) -> ApiResult<PdfExtractionResponse> {
        self.pdf.extract_machines(upload).await
    }

    async fn create_machine(&self, req: &CreateMachineRequest) -> ApiResult<Machine> {
        self.machines.create(req).await
    }

    async fn update_magazine(&self, machine_id: i64, props: &MagazineProperties) -> ApiResult<()> {
        self.machines.update_magazine(machine_id, props).await
    }
}

/// Request body for an extracted record. Missing fields fall back to an
/// empty type, zero hours and today's date.
pub fn create_request(machine: &ExtractedMachine) -> CreateMachineRequest {
    CreateMachineRequest {
        number: machine.machine_number.trim().to_string(),
        machine_type: machine.machine_type.clone().unwrap_or_default(),
        operating_hours: machine.operating_hours.unwrap_or(0),
        installation_date: machine.installation_date.unwrap_or_else(Utc::now),
        status: MachineStatus::Active,
    }
}

pub struct ImportWizard {
    backend: Arc<dyn ImportBackend>,
    batch_delay: Duration,
    step: ImportStep,
    file: Option<PdfUpload>,
    extraction: Option<PdfExtractionResponse>,
    selected: BTreeSet<usize>,
    error: Option<String>,
    summary: Option<BatchSummary>,
    progress: watch::Sender<Option<BatchProgress>>,
}

impl ImportWizard {
    pub fn new(backend: Arc<dyn ImportBackend>, batch_delay: Duration) -> Self {
        let (progress, _) = watch::channel(None);
        Self {
            backend,
            batch_delay,
            step: ImportStep::Upload,
            file: None,
            extraction: None,
            selected: BTreeSet::new(),
            error: None,
            summary: None,
            progress,
        }
    }

    pub fn step(&self) -> ImportStep {
        self.step
    }

    /// Message to show on the current step, if the last action failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn file(&self) -> Option<&PdfUpload> {
        self.file.as_ref()
    }

    pub fn extraction(&self) -> Option<&PdfExtractionResponse> {
        self.extraction.as_ref()
    }

    pub fn summary(&self) -> Option<&BatchSummary> {
        self.summary.as_ref()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Option<BatchProgress>> {
        self.progress.subscribe()
    }

    fn machines(&self) -> &[ExtractedMachine] {
        self.extraction
            .as_ref()
            .map(|e| e.extracted_machines.as_slice())
            .unwrap_or_default()
    }

    pub fn records(&self) -> Vec<ReviewRecord> {
        self.machines()
            .iter()
            .enumerate()
            .map(|(index, m)| ReviewRecord {
                index,
                badge: RecordBadge::of(m),
                selected: self.selected.contains(&index),
                machine: m.clone(),
            })
            .collect()
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    fn expect_step(&self, step: ImportStep) -> Result<(), ImportError> {
        if self.step == step {
            Ok(())
        } else {
            Err(ImportError::WrongStep { actual: self.step })
        }
    }

    // -----------------------------------------------------------------------
    // Upload
    // -----------------------------------------------------------------------

    /// Replace the chosen file. Non-PDF files are rejected and leave no file
    /// selected.
    pub fn select_file(&mut self, upload: PdfUpload) -> Result<(), ImportError> {
        self.expect_step(ImportStep::Upload)?;
        if !upload.is_pdf() {
            let err = ImportError::NotPdf(upload.file_name.clone());
            self.file = None;
            self.error = Some(err.to_string());
            return Err(err);
        }
        self.file = Some(upload);
        self.error = None;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    pub async fn process(&mut self) -> Result<&PdfExtractionResponse, ImportError> {
        self.expect_step(ImportStep::Upload)?;
        let Some(upload) = self.file.clone() else {
            return Err(ImportError::NoFile);
        };
        self.step = ImportStep::Processing;
        self.error = None;

        let response = match self.backend.extract(&upload).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(file = %upload.file_name, error = %e, "PDF extraction failed");
                let err = ImportError::Extraction(e);
                self.step = ImportStep::Upload;
                self.error = Some(err.to_string());
                return Err(err);
            }
        };

        if !response.success || response.extracted_machines.is_empty() {
            let message = response
                .message
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Keine Maschinen in der PDF-Datei gefunden.".to_string());
            tracing::info!(file = %upload.file_name, "extraction returned no machines");
            self.step = ImportStep::Upload;
            self.error = Some(message.clone());
            return Err(ImportError::NoRecords(message));
        }

        self.selected = response
            .extracted_machines
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_selectable())
            .map(|(i, _)| i)
            .collect();
        tracing::info!(
            file = %upload.file_name,
            found = response.extracted_machines.len(),
            preselected = self.selected.len(),
            "extraction complete"
        );
        self.step = ImportStep::Review;
        Ok(&*self.extraction.insert(response))
    }

    // -----------------------------------------------------------------------
    // Review
    // -----------------------------------------------------------------------

    fn selectable(&self, index: usize) -> Result<(), ImportError> {
        self.expect_step(ImportStep::Review)?;
        let machine = self
            .machines()
            .get(index)
            .ok_or(ImportError::UnknownRecord(index))?;
        if !machine.is_selectable() {
            return Err(ImportError::NotSelectable(index));
        }
        Ok(())
    }

    /// Flip the selection of one record. Returns the new selection state.
    pub fn toggle(&mut self, index: usize) -> Result<bool, ImportError> {
        self.selectable(index)?;
        if self.selected.remove(&index) {
            Ok(false)
        } else {
            self.selected.insert(index);
            Ok(true)
        }
    }

    /// Add one record to the selection; selecting it again is a no-op.
    pub fn select(&mut self, index: usize) -> Result<(), ImportError> {
        self.selectable(index)?;
        self.selected.insert(index);
        Ok(())
    }

    pub fn select_all_valid(&mut self) -> Result<(), ImportError> {
        self.expect_step(ImportStep::Review)?;
        self.selected = self
            .machines()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_selectable())
            .map(|(i, _)| i)
            .collect();
        Ok(())
    }

    pub fn clear_selection(&mut self) -> Result<(), ImportError> {
        self.expect_step(ImportStep::Review)?;
        self.selected.clear();
        Ok(())
    }

    /// Back to `Upload` with nothing kept. Not allowed mid-batch.
    pub fn reset(&mut self) -> Result<(), ImportError> {
        if matches!(self.step, ImportStep::Processing | ImportStep::BatchCreating) {
            return Err(ImportError::WrongStep { actual: self.step });
        }
        self.step = ImportStep::Upload;
        self.file = None;
        self.extraction = None;
        self.selected.clear();
        self.error = None;
        self.summary = None;
        self.progress.send_replace(None);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Batch creation
    // -----------------------------------------------------------------------

    pub async fn create_selected(&mut self) -> Result<&BatchSummary, ImportError> {
        self.expect_step(ImportStep::Review)?;
        let batch: Vec<ExtractedMachine> = self
            .selected
            .iter()
            .filter_map(|&i| self.machines().get(i))
            .filter(|m| m.is_selectable())
            .cloned()
            .collect();
        if batch.is_empty() {
            self.error = Some(ImportError::NothingSelected.to_string());
            return Err(ImportError::NothingSelected);
        }

        self.step = ImportStep::BatchCreating;
        self.error = None;
        let total = batch.len();
        let mut results = Vec::with_capacity(total);

        for (i, machine) in batch.iter().enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            self.progress.send_replace(Some(BatchProgress {
                current: i + 1,
                total,
                machine_number: machine.machine_number.clone(),
            }));
            results.push(self.create_one(machine).await);
        }

        let summary = BatchSummary::from_results(results);
        tracing::info!(
            created = summary.successfully_created,
            failed = summary.failed,
            total = summary.total_machines,
            "batch import finished"
        );
        self.step = ImportStep::Complete;
        Ok(&*self.summary.insert(summary))
    }

    async fn create_one(&self, machine: &ExtractedMachine) -> RecordOutcome {
        let number = machine.machine_number.clone();
        let created = match self.backend.create_machine(&create_request(machine)).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(number = %number, error = %e, "machine creation failed");
                return RecordOutcome {
                    machine_number: number,
                    success: false,
                    machine_id: None,
                    error: Some(e.user_message()),
                };
            }
        };

        if machine.magazine.is_present() {
            if let Err(e) = self
                .backend
                .update_magazine(created.id, &machine.magazine)
                .await
            {
                tracing::warn!(number = %number, id = created.id, error = %e, "magazine update failed");
                return RecordOutcome {
                    machine_number: number,
                    success: false,
                    machine_id: Some(created.id),
                    error: Some(format!(
                        "Maschine angelegt, Magazindaten fehlgeschlagen: {}",
                        e.user_message()
                    )),
                };
            }
        }

        RecordOutcome {
            machine_number: number,
            success: true,
            machine_id: Some(created.id),
            error: None,
        }
    }

    // -----------------------------------------------------------------------
    // Complete
    // -----------------------------------------------------------------------

    /// Leave the wizard for the machine list, which must re-fetch.
    pub fn finish_to_list(&mut self, cache: &QueryCache) -> Result<(), ImportError> {
        self.expect_step(ImportStep::Complete)?;
        cache.invalidate(QueryKey::Machines);
        self.reset()
    }

    pub fn process_another(&mut self) -> Result<(), ImportError> {
        self.expect_step(ImportStep::Complete)?;
        self.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        extraction: Mutex<Option<ApiResult<PdfExtractionResponse>>>,
        fail_numbers: Vec<String>,
        created: Mutex<Vec<String>>,
        magazines: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl ImportBackend for FakeBackend {
        async fn extract(&self, _upload: &PdfUpload) -> ApiResult<PdfExtractionResponse> {
            self.extraction
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ApiError::Network("no response".into())))
        }

        async fn create_machine(&self, req: &CreateMachineRequest) -> ApiResult<Machine> {
            if self.fail_numbers.contains(&req.number) {
                return Err(ApiError::Conflict("Maschinennummer existiert bereits".into()));
            }
            let mut created = self.created.lock().unwrap();
            created.push(req.number.clone());
            Ok(serde_json::from_value(serde_json::json!({
                "id": created.len() as i64 * 10,
                "number": req.number,
                "type": req.machine_type,
                "operatingHours": req.operating_hours,
                "installationDate": "2020-01-01T00:00:00Z",
                "status": "Active"
            }))
            .unwrap())
        }

        async fn update_magazine(&self, id: i64, _props: &MagazineProperties) -> ApiResult<()> {
            self.magazines.lock().unwrap().push(id);
            Ok(())
        }
    }

    fn record(number: &str, valid: bool, exists: bool) -> serde_json::Value {
        serde_json::json!({
            "machineNumber": number,
            "machineType": "CTX beta 800",
            "operatingHours": 1200,
            "installationDate": "2019-05-01",
            "isValid": valid,
            "alreadyExists": exists
        })
    }

    fn extraction(records: Vec<serde_json::Value>) -> PdfExtractionResponse {
        serde_json::from_value(serde_json::json!({
            "success": true,
            "extractedMachines": records,
            "totalMachinesFound": 0
        }))
        .unwrap()
    }

    fn pdf() -> PdfUpload {
        PdfUpload {
            file_name: "maschinen.pdf".into(),
            content_type: Some("application/pdf".into()),
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    fn wizard(backend: FakeBackend, response: PdfExtractionResponse) -> (ImportWizard, Arc<FakeBackend>) {
        *backend.extraction.lock().unwrap() = Some(Ok(response));
        let backend = Arc::new(backend);
        let wizard = ImportWizard::new(backend.clone(), Duration::ZERO);
        (wizard, backend)
    }

    #[tokio::test]
    async fn test_batch_counts_with_failures() {
        let numbers = ["M-1", "M-2", "M-3", "M-4", "M-5"];
        let backend = FakeBackend {
            fail_numbers: vec!["M-2".into(), "M-5".into()],
            ..Default::default()
        };
        let records = numbers.iter().map(|n| record(n, true, false)).collect();
        let (mut w, backend) = wizard(backend, extraction(records));

        w.select_file(pdf()).unwrap();
        w.process().await.unwrap();
        assert_eq!(w.selected_indices(), vec![0, 1, 2, 3, 4]);

        let summary = w.create_selected().await.unwrap().clone();
        assert_eq!(summary.successfully_created, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total_machines, 5);
        assert_eq!(summary.results.len(), 5);
        assert!(!summary.results[1].success);
        assert!(summary.results[1].error.is_some());
        assert_eq!(
            *backend.created.lock().unwrap(),
            vec!["M-1".to_string(), "M-3".into(), "M-4".into()]
        );
        assert_eq!(w.step(), ImportStep::Complete);
    }

    #[tokio::test]
    async fn test_invalid_and_duplicate_are_never_selected() {
        let records = vec![
            record("M-100", true, false),
            record("M-101", true, true),
            record("M-102", false, false),
        ];
        let (mut w, _) = wizard(FakeBackend::default(), extraction(records));
        w.select_file(pdf()).unwrap();
        w.process().await.unwrap();

        assert_eq!(w.selected_indices(), vec![0]);
        let badges: Vec<_> = w.records().iter().map(|r| r.badge).collect();
        assert_eq!(
            badges,
            vec![RecordBadge::Ready, RecordBadge::Duplicate, RecordBadge::Invalid]
        );

        assert!(matches!(w.toggle(1), Err(ImportError::NotSelectable(1))));
        assert!(matches!(w.toggle(2), Err(ImportError::NotSelectable(2))));
        w.clear_selection().unwrap();
        w.select_all_valid().unwrap();
        assert_eq!(w.selected_indices(), vec![0]);
        assert!(!w.toggle(0).unwrap());
        assert!(matches!(w.create_selected().await, Err(ImportError::NothingSelected)));
        assert_eq!(w.step(), ImportStep::Review);
    }

    #[tokio::test]
    async fn test_select_is_idempotent() {
        let records = vec![
            record("M-1", true, false),
            record("M-2", true, false),
            record("M-3", true, true),
        ];
        let (mut w, _) = wizard(FakeBackend::default(), extraction(records));
        w.select_file(pdf()).unwrap();
        w.process().await.unwrap();

        w.clear_selection().unwrap();
        for i in [0, 1, 0] {
            w.select(i).unwrap();
        }
        assert_eq!(w.selected_indices(), vec![0, 1]);
        assert!(matches!(w.select(2), Err(ImportError::NotSelectable(2))));
        assert!(matches!(w.select(9), Err(ImportError::UnknownRecord(9))));
    }

    #[tokio::test]
    async fn test_magazine_call_only_when_present() {
        let mut with_magazine = record("M-7", true, false);
        with_magazine["magazineType"] = "LNS Express".into();
        let mut blank_magazine = record("M-8", true, false);
        blank_magazine["feedChannel"] = "  ".into();
        let (mut w, backend) = wizard(
            FakeBackend::default(),
            extraction(vec![with_magazine, blank_magazine]),
        );
        w.select_file(pdf()).unwrap();
        w.process().await.unwrap();
        w.create_selected().await.unwrap();
        assert_eq!(*backend.magazines.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_rejects_non_pdf() {
        let (mut w, _) = wizard(FakeBackend::default(), extraction(vec![]));
        let err = w
            .select_file(PdfUpload {
                file_name: "liste.xlsx".into(),
                content_type: None,
                bytes: vec![1, 2, 3],
            })
            .unwrap_err();
        assert!(matches!(err, ImportError::NotPdf(_)));
        assert!(w.file().is_none());
        assert!(w.error().is_some());
        assert!(matches!(w.process().await, Err(ImportError::NoFile)));
    }

    #[tokio::test]
    async fn test_empty_or_failed_extraction_returns_to_upload() {
        let (mut w, backend) = wizard(FakeBackend::default(), extraction(vec![]));
        w.select_file(pdf()).unwrap();
        assert!(matches!(w.process().await, Err(ImportError::NoRecords(_))));
        assert_eq!(w.step(), ImportStep::Upload);

        // The fake has no further extraction queued and reports a network error.
        assert!(backend.extraction.lock().unwrap().is_none());
        let err = w.process().await.unwrap_err();
        assert!(matches!(err, ImportError::Extraction(ApiError::Network(_))));
        assert_eq!(w.step(), ImportStep::Upload);
        assert!(w.error().unwrap().contains("Internetverbindung"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_are_spaced_by_delay() {
        let records = vec![
            record("M-1", true, false),
            record("M-2", true, false),
            record("M-3", true, false),
        ];
        let backend = Arc::new(FakeBackend::default());
        *backend.extraction.lock().unwrap() = Some(Ok(extraction(records)));
        let mut w = ImportWizard::new(backend, Duration::from_millis(200));
        let progress = w.subscribe_progress();
        w.select_file(pdf()).unwrap();
        w.process().await.unwrap();

        let started = tokio::time::Instant::now();
        w.create_selected().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(400));
        assert_eq!(
            *progress.borrow(),
            Some(BatchProgress {
                current: 3,
                total: 3,
                machine_number: "M-3".into()
            })
        );
    }

    #[tokio::test]
    async fn test_finish_invalidates_machine_list() {
        let (mut w, _) = wizard(
            FakeBackend::default(),
            extraction(vec![record("M-1", true, false)]),
        );
        let cache = QueryCache::new(Duration::from_secs(60));
        let mut events = cache.subscribe();
        w.select_file(pdf()).unwrap();
        w.process().await.unwrap();
        w.create_selected().await.unwrap();
        w.finish_to_list(&cache).unwrap();
        assert_eq!(events.try_recv().unwrap(), QueryKey::Machines);
        assert_eq!(w.step(), ImportStep::Upload);
        assert!(w.summary().is_none());
    }
}

use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};
use crate::model::PdfExtractionResponse;
use reqwest::multipart::{Form, Part};
use std::path::Path;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub file_name: String,
    /// MIME type as reported by the picker, if any.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl PdfUpload {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());
        Ok(Self {
            file_name,
            content_type: None,
            bytes,
        })
    }

    /// Accepts `application/pdf`, or a `.pdf` name when no type was reported.
    pub fn is_pdf(&self) -> bool {
        match self.content_type.as_deref() {
            Some(ct) => ct.eq_ignore_ascii_case(PDF_CONTENT_TYPE),
            None => self.file_name.to_ascii_lowercase().ends_with(".pdf"),
        }
    }
}

#[derive(Clone)]
pub struct PdfService {
    client: ApiClient,
}

impl PdfService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn extract_machines(&self, upload: &PdfUpload) -> ApiResult<PdfExtractionResponse> {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(PDF_CONTENT_TYPE)
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        let form = Form::new().part("pdfFile", part);
        tracing::info!(file = %upload.file_name, size = upload.bytes.len(), "submitting PDF for extraction");
        self.client
            .post_multipart("/api/Pdf/extract-machines", form)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, ct: Option<&str>) -> PdfUpload {
        PdfUpload {
            file_name: name.into(),
            content_type: ct.map(String::from),
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    #[test]
    fn test_pdf_detection() {
        assert!(upload("Maschinenliste.PDF", None).is_pdf());
        assert!(upload("scan", Some("application/pdf")).is_pdf());
        assert!(!upload("liste.pdf", Some("image/png")).is_pdf());
        assert!(!upload("liste.xlsx", None).is_pdf());
    }
}

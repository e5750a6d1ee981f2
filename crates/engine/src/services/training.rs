use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};
use crate::model::{CustomModel, PrebuiltModel, TrainingOperation};
use crate::services::pdf::{PdfUpload, PDF_CONTENT_TYPE};
use reqwest::multipart::{Form, Part};

const MAX_MODEL_NAME: usize = 64;

/// Reduce a user-entered model name to `[a-z0-9-]`.
///
/// Letters are lowercased, every other character becomes `-`, runs of `-`
/// collapse and leading/trailing `-` are dropped. Returns `None` when
/// nothing usable remains.
pub fn sanitize_model_name(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    out.truncate(MAX_MODEL_NAME);
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Clone)]
pub struct TrainingService {
    client: ApiClient,
}

impl TrainingService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn custom_models(&self) -> ApiResult<Vec<CustomModel>> {
        self.client.get("/api/ModelTraining/models").await
    }

    pub async fn prebuilt_models(&self) -> ApiResult<Vec<PrebuiltModel>> {
        self.client.get("/api/ModelTraining/prebuilt").await
    }

    /// Start training a custom model from sample documents.
    pub async fn train(
        &self,
        name: &str,
        description: Option<&str>,
        samples: &[PdfUpload],
    ) -> ApiResult<TrainingOperation> {
        let model_name = sanitize_model_name(name).ok_or_else(|| {
            ApiError::InvalidInput(
                "Der Modellname darf nur Kleinbuchstaben, Ziffern und Bindestriche enthalten."
                    .to_string(),
            )
        })?;
        if samples.is_empty() {
            return Err(ApiError::InvalidInput(
                "Mindestens ein Trainingsdokument ist erforderlich.".to_string(),
            ));
        }
        if let Some(bad) = samples.iter().find(|s| !s.is_pdf()) {
            return Err(ApiError::InvalidInput(format!(
                "{} ist keine PDF-Datei.",
                bad.file_name
            )));
        }

        let mut form = Form::new().text("modelName", model_name.clone());
        if let Some(d) = description {
            form = form.text("description", d.to_string());
        }
        for sample in samples {
            let part = Part::bytes(sample.bytes.clone())
                .file_name(sample.file_name.clone())
                .mime_str(PDF_CONTENT_TYPE)
                .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
            form = form.part("files", part);
        }

        tracing::info!(model = %model_name, samples = samples.len(), "starting model training");
        self.client.post_multipart("/api/ModelTraining/train", form).await
    }

    pub async fn operation(&self, operation_id: &str) -> ApiResult<TrainingOperation> {
        let path = self
            .client
            .path_with_segment("/api/ModelTraining/operations", operation_id)?;
        self.client.get(&path).await
    }

    pub async fn delete_model(&self, model_id: &str) -> ApiResult<()> {
        let path = self
            .client
            .path_with_segment("/api/ModelTraining/models", model_id)?;
        self.client.delete(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_model_name() {
        assert_eq!(sanitize_model_name("Wartung Q3 2024").as_deref(), Some("wartung-q3-2024"));
        assert_eq!(sanitize_model_name("--Index__Liste--").as_deref(), Some("index-liste"));
        assert_eq!(sanitize_model_name("Übersicht").as_deref(), Some("bersicht"));
        assert_eq!(sanitize_model_name("???"), None);
        assert_eq!(sanitize_model_name(""), None);
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_model_name(&long).unwrap().len(), MAX_MODEL_NAME);
        let dashed = format!("{}-b", "a".repeat(63));
        assert_eq!(sanitize_model_name(&dashed).unwrap(), "a".repeat(63));
    }
}

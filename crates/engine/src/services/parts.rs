use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};
use crate::model::{CategoryEncoding, MaintenancePart, PartRequest};

#[derive(Clone)]
pub struct PartService {
    client: ApiClient,
}

impl PartService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<MaintenancePart>> {
        self.client.get("/api/MaintenanceParts").await
    }

    pub async fn get(&self, id: i64) -> ApiResult<MaintenancePart> {
        self.client.get(&format!("/api/MaintenanceParts/id/{}", id)).await
    }

    pub async fn get_by_number(&self, part_number: &str) -> ApiResult<MaintenancePart> {
        let path = self
            .client
            .path_with_segment("/api/MaintenanceParts/partnumber", part_number)?;
        self.client.get(&path).await
    }

    /// Create with the category by name; older backends answer 400 to that,
    /// in which case the request is repeated once with the integer code.
    pub async fn create(&self, req: &PartRequest) -> ApiResult<MaintenancePart> {
        match self
            .client
            .post("/api/MaintenanceParts", &req.to_wire(CategoryEncoding::Name))
            .await
        {
            Err(ApiError::Validation { message, .. }) => {
                tracing::info!(
                    part_number = %req.part_number,
                    reason = %message,
                    "category name rejected, retrying with integer code"
                );
                self.client
                    .post("/api/MaintenanceParts", &req.to_wire(CategoryEncoding::Code))
                    .await
            }
            other => other,
        }
    }

    /// Same category fallback as [`create`](Self::create).
    pub async fn update(&self, id: i64, req: &PartRequest) -> ApiResult<()> {
        let path = format!("/api/MaintenanceParts/{}", id);
        match self
            .client
            .put_discard(&path, &req.to_wire(CategoryEncoding::Name))
            .await
        {
            Err(ApiError::Validation { .. }) => {
                tracing::info!(id, "category name rejected, retrying update with integer code");
                self.client
                    .put_discard(&path, &req.to_wire(CategoryEncoding::Code))
                    .await
            }
            other => other,
        }
    }

    pub async fn delete(&self, id: i64) -> ApiResult<()> {
        self.client
            .delete(&format!("/api/MaintenanceParts/{}", id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::platform::MemoryStorage;
    use crate::retry::RetryPolicy;
    use crate::session::SessionStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_part_number_is_sent_as_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/MaintenanceParts/partnumber/VS%2F20%2040"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 3, "partNumber": "VS/20 40", "name": "Dichtung",
                "category": "WearPart", "price": 4.2, "stockQuantity": 30
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut api = EngineConfig::defaults().unwrap().api;
        api.base_url = server.uri();
        let session = SessionStore::new(Box::new(MemoryStorage::new()));
        let parts = PartService::new(ApiClient::new(&api, RetryPolicy::none(), session).unwrap());

        let part = parts.get_by_number("VS/20 40").await.unwrap();
        assert_eq!(part.id, 3);
    }
}

use crate::client::ApiClient;
use crate::error::ApiResult;
use crate::model::{Compatibility, CompatibilityRequest, MachineSearch, MaintenancePart};

const BASE: &str = "/api/MachinePartCompatibility";

#[derive(Clone)]
pub struct CompatibilityService {
    client: ApiClient,
}

impl CompatibilityService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<Compatibility>> {
        self.client.get(BASE).await
    }

    pub async fn get(&self, id: i64) -> ApiResult<Compatibility> {
        self.client.get(&format!("{}/{}", BASE, id)).await
    }

    pub async fn for_part(&self, part_id: i64) -> ApiResult<Vec<Compatibility>> {
        self.client.get(&format!("{}/part/{}", BASE, part_id)).await
    }

    /// Distinct machine series known to the backend.
    pub async fn series(&self) -> ApiResult<Vec<String>> {
        self.client.get(&format!("{}/series", BASE)).await
    }

    /// Parts compatible with the machine described by `search`.
    pub async fn search(&self, search: &MachineSearch) -> ApiResult<Vec<MaintenancePart>> {
        self.client
            .get_query(&format!("{}/search", BASE), search)
            .await
    }

    pub async fn create(&self, req: &CompatibilityRequest) -> ApiResult<Compatibility> {
        self.client.post(BASE, req).await
    }

    pub async fn update(&self, id: i64, req: &CompatibilityRequest) -> ApiResult<()> {
        self.client.put_discard(&format!("{}/{}", BASE, id), req).await
    }

    pub async fn delete(&self, id: i64) -> ApiResult<()> {
        self.client.delete(&format!("{}/{}", BASE, id)).await
    }
}

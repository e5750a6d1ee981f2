use crate::client::ApiClient;
use crate::error::ApiResult;
use crate::model::{
    CreateMachineRequest, Machine, MachineStatus, MagazineProperties, UpdateMachineRequest,
    UpdateStatusRequest,
};

#[derive(Clone)]
pub struct MachineService {
    client: ApiClient,
}

impl MachineService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<Machine>> {
        self.client.get("/api/Machines").await
    }

    pub async fn get(&self, id: i64) -> ApiResult<Machine> {
        self.client.get(&format!("/api/Machines/{}", id)).await
    }

    pub async fn create(&self, req: &CreateMachineRequest) -> ApiResult<Machine> {
        let machine: Machine = self.client.post("/api/Machines", req).await?;
        tracing::info!(id = machine.id, number = %machine.number, "machine created");
        Ok(machine)
    }

    pub async fn update(&self, id: i64, req: &UpdateMachineRequest) -> ApiResult<()> {
        self.client.put_discard(&format!("/api/Machines/{}", id), req).await
    }

    pub async fn update_magazine(&self, id: i64, props: &MagazineProperties) -> ApiResult<()> {
        self.client
            .put_discard(&format!("/api/Machines/{}/magazine", id), props)
            .await
    }

    pub async fn update_status(&self, id: i64, status: MachineStatus) -> ApiResult<()> {
        self.client
            .put_discard(
                &format!("/api/Machines/{}/status", id),
                &UpdateStatusRequest { status },
            )
            .await
    }
}

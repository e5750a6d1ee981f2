use crate::client::ApiClient;
use crate::error::ApiResult;
use crate::model::{
    ChangePasswordRequest, CreateUserRequest, ResetPasswordRequest, UpdateUserRequest, User,
};

#[derive(Clone)]
pub struct UserService {
    client: ApiClient,
}

impl UserService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<User>> {
        self.client.get("/api/users").await
    }

    pub async fn get(&self, id: i64) -> ApiResult<User> {
        self.client.get(&format!("/api/users/{}", id)).await
    }

    pub async fn create(&self, req: &CreateUserRequest) -> ApiResult<User> {
        let user: User = self.client.post("/api/users", req).await?;
        tracing::info!(id = user.id, username = %user.username, role = %user.role, "user created");
        Ok(user)
    }

    pub async fn update(&self, id: i64, req: &UpdateUserRequest) -> ApiResult<()> {
        self.client.put_discard(&format!("/api/users/{}", id), req).await
    }

    /// Soft delete; the account can be brought back with [`restore`](Self::restore).
    pub async fn delete(&self, id: i64) -> ApiResult<()> {
        self.client.delete(&format!("/api/users/{}", id)).await
    }

    pub async fn change_password(&self, id: i64, current: &str, new: &str) -> ApiResult<()> {
        let req = ChangePasswordRequest {
            current_password: current.to_string(),
            new_password: new.to_string(),
        };
        self.action(id, "change-password", Some(&req)).await
    }

    pub async fn reset_password(&self, id: i64, new: &str) -> ApiResult<()> {
        let req = ResetPasswordRequest {
            new_password: new.to_string(),
        };
        self.action(id, "reset-password", Some(&req)).await
    }

    pub async fn activate(&self, id: i64) -> ApiResult<()> {
        self.action::<()>(id, "activate", None).await
    }

    pub async fn deactivate(&self, id: i64) -> ApiResult<()> {
        self.action::<()>(id, "deactivate", None).await
    }

    pub async fn restore(&self, id: i64) -> ApiResult<()> {
        self.action::<()>(id, "restore", None).await
    }

    async fn action<B: serde::Serialize>(&self, id: i64, verb: &str, body: Option<&B>) -> ApiResult<()> {
        self.client
            .post_discard(&format!("/api/users/{}/{}", id, verb), body)
            .await?;
        tracing::info!(id, action = verb, "user updated");
        Ok(())
    }
}

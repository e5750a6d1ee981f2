use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};
use crate::model::{LoginRequest, LoginResponse, RefreshRequest, User};
use crate::session::{Session, SessionStore};

#[derive(Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn session(&self) -> &SessionStore {
        self.client.session()
    }

    /// Authenticate and persist the returned session.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<User> {
        let req = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp: LoginResponse = self
            .client
            .post("/api/auth/login", &req)
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized => ApiError::InvalidInput(
                    "Ungültiger Benutzername oder Passwort.".to_string(),
                ),
                other => other,
            })?;
        let user = resp.user.clone();
        self.store(resp)?;
        tracing::info!(user = %user.username, role = %user.role, "logged in");
        Ok(user)
    }

    /// Exchange the stored refresh token for a new token pair.
    pub async fn refresh(&self) -> ApiResult<()> {
        let refresh_token = self.client.session().refresh_token().ok_or_else(|| {
            ApiError::InvalidInput("Keine aktive Sitzung vorhanden.".to_string())
        })?;
        let resp: LoginResponse = self
            .client
            .post("/api/auth/refresh", &RefreshRequest { refresh_token })
            .await?;
        self.store(resp)?;
        tracing::info!("session refreshed");
        Ok(())
    }

    /// Tell the backend (best effort) and drop the local session.
    pub async fn logout(&self) -> ApiResult<()> {
        if self.client.session().is_authenticated() {
            if let Err(e) = self
                .client
                .post_discard::<serde_json::Value>("/api/auth/logout", None)
                .await
            {
                tracing::debug!(error = %e, "server-side logout failed, clearing locally");
            }
        }
        self.client
            .session()
            .clear()
            .map_err(|e| ApiError::InvalidInput(format!("Abmelden fehlgeschlagen: {}", e)))
    }

    pub async fn me(&self) -> ApiResult<User> {
        self.client.get("/api/auth/me").await
    }

    fn store(&self, resp: LoginResponse) -> ApiResult<()> {
        self.client
            .session()
            .set(Session {
                access_token: resp.access_token,
                refresh_token: resp.refresh_token,
                user: resp.user,
            })
            .map_err(|e| ApiError::InvalidInput(format!("Sitzung konnte nicht gespeichert werden: {}", e)))
    }
}

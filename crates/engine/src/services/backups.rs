use crate::client::ApiClient;
use crate::error::ApiResult;
use crate::model::{BackupInfo, BackupProgress, BackupStarted, BackupStatus};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct BackupService {
    client: ApiClient,
}

impl BackupService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<BackupInfo>> {
        self.client.get("/api/backup/list").await
    }

    pub async fn status(&self) -> ApiResult<BackupStatus> {
        self.client.get("/api/backup/status").await
    }

    /// Backup jobs currently in flight.
    pub async fn active(&self) -> ApiResult<Vec<BackupProgress>> {
        self.client.get("/api/backup/active").await
    }

    /// Database-only backup.
    pub async fn create(&self) -> ApiResult<BackupStarted> {
        let started: BackupStarted = self.client.post_empty("/api/backup/create").await?;
        tracing::info!(backup_id = %started.backup_id, "database backup started");
        Ok(started)
    }

    /// Database plus files and models.
    pub async fn create_complete(&self) -> ApiResult<BackupStarted> {
        let started: BackupStarted = self.client.post_empty("/api/backup/create-complete").await?;
        tracing::info!(backup_id = %started.backup_id, "complete backup started");
        Ok(started)
    }

    pub async fn restore(&self, file_name: &str) -> ApiResult<()> {
        tracing::warn!(file = file_name, "restoring backup");
        let path = self.client.path_with_segment("/api/backup/restore", file_name)?;
        self.client.post_discard::<()>(&path, None).await
    }

    pub async fn delete(&self, file_name: &str) -> ApiResult<()> {
        let path = self.client.path_with_segment("/api/backup", file_name)?;
        self.client.delete(&path).await
    }

    pub async fn progress(&self, backup_id: &str) -> ApiResult<BackupProgress> {
        let path = self.client.path_with_segment("/api/backup/progress", backup_id)?;
        self.client.get(&path).await
    }

    /// Poll the progress of `backup_id` every `interval` until it reaches a
    /// terminal status. Transient failures (network, timeout, 5xx) are
    /// retried on the next tick; any other error is published and ends
    /// polling. Dropping the returned handle stops polling.
    pub fn watch(&self, backup_id: &str, interval: Duration) -> BackupWatch {
        let (tx, rx) = watch::channel(None);
        let service = self.clone();
        let id = backup_id.to_string();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match service.progress(&id).await {
                    Ok(p) => {
                        let done = p.status.is_terminal();
                        tracing::debug!(backup_id = %id, percentage = p.percentage, status = ?p.status, "backup progress");
                        if tx.send(Some(Ok(p))).is_err() || done {
                            break;
                        }
                    }
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(backup_id = %id, error = %e, "backup progress poll failed, retrying")
                    }
                    Err(e) => {
                        tracing::warn!(backup_id = %id, error = %e, "backup progress unavailable, stopping");
                        let _ = tx.send(Some(Err(e)));
                        break;
                    }
                }
            }
        });
        BackupWatch { rx, task }
    }
}

/// Live view of a backup job; owns the polling task.
pub struct BackupWatch {
    rx: watch::Receiver<Option<ApiResult<BackupProgress>>>,
    task: JoinHandle<()>,
}

impl BackupWatch {
    pub fn latest(&self) -> Option<ApiResult<BackupProgress>> {
        self.rx.borrow().clone()
    }

    /// Wait for the next update. `None` once polling has ended; an `Err` is
    /// always the last update.
    pub async fn changed(&mut self) -> Option<ApiResult<BackupProgress>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for BackupWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ApiError;
    use crate::model::BackupRunStatus;
    use crate::platform::MemoryStorage;
    use crate::retry::RetryPolicy;
    use crate::session::SessionStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> BackupService {
        let mut api = EngineConfig::defaults().unwrap().api;
        api.base_url = server.uri();
        let session = SessionStore::new(Box::new(MemoryStorage::new()));
        BackupService::new(ApiClient::new(&api, RetryPolicy::none(), session).unwrap())
    }

    #[tokio::test]
    async fn test_watch_stops_at_terminal_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/backup/progress/b-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "backupId": "b-1", "type": "Complete", "percentage": 40, "status": "Running",
                "currentStep": "Dateien"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/backup/progress/b-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "backupId": "b-1", "type": "Complete", "percentage": 100, "status": "Completed"
            })))
            .mount(&server)
            .await;

        let mut watch = service(&server).watch("b-1", Duration::from_millis(50));
        let first = watch.changed().await.unwrap().unwrap();
        assert_eq!(first.status, BackupRunStatus::Running);
        let last = watch.changed().await.unwrap().unwrap();
        assert_eq!(last.percentage, 100);
        // Sender dropped after the terminal update.
        assert!(watch.changed().await.is_none());
        assert_eq!(
            watch.latest().unwrap().unwrap().status,
            BackupRunStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_watch_ends_on_unknown_backup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/backup/progress/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let mut watch = service(&server).watch("missing", Duration::from_millis(20));
        let update = tokio::time::timeout(Duration::from_secs(1), watch.changed())
            .await
            .expect("watch should not hang on a 404");
        assert!(matches!(update, Some(Err(ApiError::NotFound(_)))));
        let end = tokio::time::timeout(Duration::from_secs(1), watch.changed())
            .await
            .unwrap();
        assert!(end.is_none());
        assert!(matches!(watch.latest(), Some(Err(ApiError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_watch_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/backup/progress/b-2"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/backup/progress/b-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "backupId": "b-2", "type": "Database", "percentage": 100, "status": "Completed"
            })))
            .mount(&server)
            .await;

        let mut watch = service(&server).watch("b-2", Duration::from_millis(20));
        let update = tokio::time::timeout(Duration::from_secs(2), watch.changed())
            .await
            .unwrap();
        assert_eq!(update.unwrap().unwrap().status, BackupRunStatus::Completed);
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/backup/create-complete"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"backupId": "b-9"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/backup/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"fileName": "backup_20241001.zip", "type": "Complete", "sizeBytes": 1048576,
                 "createdAt": "2024-10-01T02:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let svc = service(&server);
        assert_eq!(svc.create_complete().await.unwrap().backup_id, "b-9");
        let list = svc.list().await.unwrap();
        assert_eq!(list[0].size_bytes, 1_048_576);
    }
}

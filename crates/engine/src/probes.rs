//! Environment probes: backend reachability, session storage, token state.

use crate::context::AppContext;
use crate::error::ApiError;
use crate::monitor::SessionState;
use crate::traits::StorageError;
use crate::types::*;
use std::collections::BTreeMap;
use std::time::Instant;

pub const PROBES: [&str; 3] = ["backend", "storage", "session"];

/// Path requested by the backend probe. Any HTTP response counts as reachable.
const HEALTH_PATH: &str = "/health";

const PROXY_VARS: [&str; 6] = [
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "NO_PROXY",
    "no_proxy",
];

pub async fn run_probe(name: &str, ctx: &AppContext) -> CommandResult {
    let run = Run::start("probe", name);
    match name {
        "backend" => probe_backend(run, ctx).await,
        "storage" => probe_storage(run, ctx),
        "session" => probe_session(run, ctx),
        _ => run.error(
            ErrorCode::InvalidInput,
            format!("unknown probe: {} (available: {})", name, PROBES.join(", ")),
        ),
    }
}

async fn probe_backend(mut run: Run, ctx: &AppContext) -> CommandResult {
    let base_url = ctx.client().base_url().to_string();

    let t = Instant::now();
    let outcome = ctx.client().reachability(HEALTH_PATH).await;
    run.record("http_get", t);

    match outcome {
        Ok(status) => run.pass().with_data(serde_json::json!({
            "base_url": base_url,
            "http_status": status,
            "proxy_env": proxy_env(),
        })),
        Err(e) => {
            let code = if matches!(e, ApiError::Timeout) {
                ErrorCode::Timeout
            } else {
                ErrorCode::NetworkError
            };
            run.error(code, format!("{} unreachable: {}", base_url, e))
                .with_details(serde_json::json!({ "proxy_env": proxy_env() }))
        }
    }
}

fn proxy_env() -> BTreeMap<&'static str, String> {
    PROXY_VARS
        .into_iter()
        .filter_map(|k| std::env::var(k).ok().map(|v| (k, v)))
        .collect()
}

/// Write, read back and remove a scratch key in the session store.
fn probe_storage(mut run: Run, ctx: &AppContext) -> CommandResult {
    let storage = ctx.session().storage();
    let key = format!("probe:{}", &run.run_id()[..8]);
    let payload = "maintctl storage probe";

    let t = Instant::now();
    if let Err(e) = storage.set(&key, payload) {
        return storage_failure(run, "write", e);
    }
    run.record("write", t);

    let t = Instant::now();
    let read = storage.get(&key);
    if !matches!(read, Ok(Some(ref v)) if v == payload) {
        let _ = storage.remove(&key);
        return match read {
            Err(e) => storage_failure(run, "read", e),
            _ => run.error(
                ErrorCode::InternalError,
                "read-back value does not match written value",
            ),
        };
    }
    run.record("read_verify", t);

    let t = Instant::now();
    if let Err(e) = storage.remove(&key) {
        return storage_failure(run, "remove", e);
    }
    run.record("remove", t);

    run.pass().with_data(serde_json::json!({
        "storage_path": ctx.config().session.storage_path,
    }))
}

fn storage_failure(run: Run, step: &str, err: StorageError) -> CommandResult {
    let code = match &err {
        StorageError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        StorageError::Io(_) => ErrorCode::IoError,
        _ => ErrorCode::InternalError,
    };
    run.error(code, format!("storage probe failed at {}: {}", step, err))
}

/// Local token state only; nothing is sent to the backend.
fn probe_session(run: Run, ctx: &AppContext) -> CommandResult {
    let Some(session) = ctx.session().get() else {
        return run.skip("not signed in");
    };

    let state = ctx.session_monitor().state();
    let data = serde_json::json!({
        "user": session.user.username,
        "role": session.user.role,
        "expires_at": session.expires_at(),
        "session": state,
    });

    let result = if state == SessionState::Expired {
        run.fail(ErrorCode::Unauthenticated, "access token has expired")
    } else {
        run.pass()
    };
    result
        .with_data(data)
        .with_user(Some(session.user.username))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::Role;
    use crate::session::sample_session;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx_for(base_url: &str) -> AppContext {
        let mut config = EngineConfig::defaults().unwrap();
        config.api.base_url = base_url.to_string();
        AppContext::in_memory(config).unwrap()
    }

    #[tokio::test]
    async fn test_storage_probe_round_trips() {
        let ctx = ctx_for("http://127.0.0.1:9");
        let r = run_probe("storage", &ctx).await;
        assert_eq!(r.status, Status::Pass);
        assert!(r.timing_ms.steps.contains_key("read_verify"));
    }

    #[tokio::test]
    async fn test_session_probe_states() {
        let ctx = ctx_for("http://127.0.0.1:9");
        assert_eq!(run_probe("session", &ctx).await.status, Status::Skip);

        ctx.session().set(sample_session(Role::Viewer, 4_000_000_000)).unwrap();
        let r = run_probe("session", &ctx).await;
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.data.unwrap()["session"]["state"], "active");

        ctx.session().set(sample_session(Role::Viewer, 1_000)).unwrap();
        let r = run_probe("session", &ctx).await;
        assert_eq!(r.status, Status::Fail);
        assert_eq!(r.error.unwrap().code, ErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn test_backend_probe_accepts_any_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let r = run_probe("backend", &ctx_for(&server.uri())).await;
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.data.unwrap()["http_status"], 404);
    }

    #[tokio::test]
    async fn test_backend_probe_unreachable() {
        let r = run_probe("backend", &ctx_for("http://127.0.0.1:9")).await;
        assert_eq!(r.status, Status::Error);
    }

    #[tokio::test]
    async fn test_unknown_probe() {
        let r = run_probe("clipboard", &ctx_for("http://127.0.0.1:9")).await;
        assert_eq!(r.error.unwrap().code, ErrorCode::InvalidInput);
    }
}

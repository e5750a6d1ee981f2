use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use engine::model::Role;
use engine::session::Session;
use engine::{AppContext, EngineConfig};

/// Unsigned JWT carrying only `sub` and `exp`.
pub fn token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"7","exp":{}}}"#, exp));
    format!("{}.{}.c2ln", header, payload)
}

pub fn signed_in(base_url: &str, role: Role) -> AppContext {
    let mut config = EngineConfig::defaults().unwrap();
    config.api.base_url = base_url.to_string();
    config.retry.max_retries = 0;
    config.import.batch_delay_ms = 0;
    let ctx = AppContext::in_memory(config).unwrap();
    ctx.session()
        .set(Session {
            access_token: token(4_000_000_000),
            refresh_token: "refresh-7".into(),
            user: serde_json::from_value(serde_json::json!({
                "id": 7, "username": "weber", "email": "weber@werk.de", "role": role
            }))
            .unwrap(),
        })
        .unwrap();
    ctx
}

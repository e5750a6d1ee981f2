//! Scripted command sequences loaded from YAML.
//!
//! A call step passes when its status (and error code, if one is expected)
//! matches. A probe step passes on pass or skip. Every step runs even after
//! an earlier one failed, so a report always lists the whole sequence.

use crate::commands::CommandRegistry;
use crate::context::AppContext;
use crate::probes;
use crate::types::*;
use std::time::Duration;

pub fn load_scenario(yaml: &str) -> Result<Scenario, String> {
    serde_yaml::from_str(yaml).map_err(|e| format!("failed to parse scenario YAML: {}", e))
}

pub async fn run_scenario(
    scenario: &Scenario,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> ScenarioResult {
    let mut step_results = Vec::with_capacity(scenario.steps.len());
    let mut overall = Status::Pass;

    for (i, step) in scenario.steps.iter().enumerate() {
        let (result, met) = match step {
            ScenarioStep::Call {
                call,
                args,
                expect_status,
                expect_code,
                timeout_ms,
            } => {
                let result = run_call(call, args, *timeout_ms, ctx, registry).await;
                let met = result.status == *expect_status
                    && expect_code.is_none_or(|code| result.error_code() == Some(code));
                if !met {
                    tracing::warn!(
                        step = i,
                        call = %call,
                        expected = %expect_status,
                        actual = %result.status,
                        code = ?result.error_code(),
                        "scenario step did not meet expectation"
                    );
                }
                (result, met)
            }
            ScenarioStep::Probe { probe } => {
                let result = probes::run_probe(probe, ctx).await;
                let met = result.status.is_success();
                (result, met)
            }
        };
        if !met {
            overall = Status::Fail;
        }
        step_results.push(result);
    }

    ScenarioResult {
        run_id: uuid::Uuid::new_v4().to_string(),
        name: scenario.name.clone(),
        overall_status: overall,
        step_results,
    }
}

async fn run_call(
    call: &str,
    args: &serde_json::Value,
    timeout_ms: u64,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> CommandResult {
    let limit = Duration::from_millis(timeout_ms);
    let run = Run::start("call", call);
    match tokio::time::timeout(limit, registry.execute(call, args.clone(), ctx)).await {
        Ok(result) => result,
        Err(_) => run.error(
            ErrorCode::Timeout,
            format!("step exceeded {} ms", timeout_ms),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn ctx() -> AppContext {
        let mut config = EngineConfig::defaults().unwrap();
        config.api.base_url = "http://127.0.0.1:9".into();
        AppContext::in_memory(config).unwrap()
    }

    #[test]
    fn test_parse_scenario() {
        let yaml = r#"
name: smoke
steps:
  - call: "ping"
    args: {}
    expect_status: "pass"
    timeout_ms: 5000
  - probe: "storage"
"#;
        let s = load_scenario(yaml).expect("should parse");
        assert_eq!(s.name, Some("smoke".into()));
        assert_eq!(s.steps.len(), 2);
    }

    #[test]
    fn test_bundled_smoke_scenario_parses() {
        let s = load_scenario(include_str!("../../../scenarios/smoke.yaml")).unwrap();
        let names = CommandRegistry::new();
        for step in &s.steps {
            match step {
                ScenarioStep::Call { call, .. } => {
                    assert!(names.list().contains(&call.as_str()), "{}", call)
                }
                ScenarioStep::Probe { probe } => {
                    assert!(probes::PROBES.contains(&probe.as_str()), "{}", probe)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_run_scenario_ping_and_storage() {
        let yaml = r#"
steps:
  - call: "ping"
    args: {}
    expect_status: "pass"
    timeout_ms: 1000
  - probe: "storage"
"#;
        let scenario = load_scenario(yaml).unwrap();
        let reg = CommandRegistry::new();
        let result = run_scenario(&scenario, &ctx(), &reg).await;
        assert_eq!(result.overall_status, Status::Pass);
        assert_eq!(result.step_results.len(), 2);
    }

    #[test]
    fn test_expect_code_parses_wire_name() {
        let s = load_scenario(
            "steps:\n  - call: users.list\n    expect_status: error\n    expect_code: PERMISSION_DENIED\n",
        )
        .unwrap();
        match &s.steps[0] {
            ScenarioStep::Call {
                expect_status,
                expect_code,
                timeout_ms,
                ..
            } => {
                assert_eq!(*expect_status, Status::Error);
                assert_eq!(*expect_code, Some(ErrorCode::PermissionDenied));
                assert_eq!(*timeout_ms, 30_000);
            }
            ScenarioStep::Probe { .. } => panic!("expected a call step"),
        }
    }

    #[tokio::test]
    async fn test_wrong_error_code_fails_step() {
        let yaml = r#"
steps:
  - call: "machines.list"
    expect_status: "error"
    expect_code: "PERMISSION_DENIED"
  - call: "ping"
"#;
        let scenario = load_scenario(yaml).unwrap();
        let reg = CommandRegistry::new();
        let result = run_scenario(&scenario, &ctx(), &reg).await;
        assert_eq!(result.overall_status, Status::Fail);
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(result.step_results[1].status, Status::Pass);
    }

    #[tokio::test]
    async fn test_expected_error_status_passes() {
        let yaml = r#"
steps:
  - call: "machines.list"
    expect_status: "error"
"#;
        let scenario = load_scenario(yaml).unwrap();
        let reg = CommandRegistry::new();
        let result = run_scenario(&scenario, &ctx(), &reg).await;
        assert_eq!(result.overall_status, Status::Pass);
        assert_eq!(
            result.step_results[0].error.as_ref().unwrap().code,
            ErrorCode::Unauthenticated
        );
    }
}

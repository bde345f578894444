//! Collector tests against a scripted runner

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::mock::MockRunner;
use super::*;
use crate::config::AuthMode;
use crate::error::TriageError;

fn collector(runner: MockRunner) -> (Collector, Arc<MockRunner>) {
    let runner = Arc::new(runner);
    (Collector::new(runner.clone()), runner)
}

fn fast_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        max_attempts,
        delay: Duration::from_millis(1),
    }
}

#[test]
fn test_invocation_renders_copy_pasteable_command() {
    let inv = Invocation::new("az")
        .args(["monitor", "metrics", "list"])
        .arg("--resource")
        .arg("/subscriptions/abc/resourceGroups/rg")
        .arg("--query")
        .arg("value[?name.value=='CpuPercentage']");

    assert_eq!(
        inv.to_string(),
        "az monitor metrics list --resource /subscriptions/abc/resourceGroups/rg \
         --query 'value[?name.value=='\\''CpuPercentage'\\'']'"
    );
}

#[test]
fn test_opt_flag_skips_missing_values() {
    let inv = Invocation::new("kubectl")
        .arg("get")
        .opt_flag("--context", None)
        .opt_flag("-n", Some("default"));
    assert_eq!(inv.to_string(), "kubectl get -n default");
}

#[tokio::test]
async fn test_list_failure_is_fatal() {
    let (collector, _) = collector(
        MockRunner::new().on("plan list", CommandOutput::failure(1, "ResourceGroupNotFound")),
    );
    let inv = Invocation::new("az").args(["appservice", "plan", "list"]);

    let err = collector
        .list::<serde_json::Value>("app service plans", &inv)
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::ListFailed { .. }));
}

#[tokio::test]
async fn test_auth_failure_is_fatal_even_per_resource() {
    let (collector, _) = collector(MockRunner::new().on(
        "metrics",
        CommandOutput::failure(1, "ERROR: Please run 'az login' to setup account."),
    ));
    let inv = Invocation::new("az").args(["monitor", "metrics", "list"]);

    let err = collector.fetch::<serde_json::Value>(&inv).await.unwrap_err();
    assert!(matches!(err, TriageError::Authentication(_)));
}

#[tokio::test]
async fn test_collect_each_continues_past_failures() {
    let (collector, runner) = collector(
        MockRunner::new()
            .on_json("--pool-id 1", json!([{"name": "a"}]))
            .on("--pool-id 2", CommandOutput::failure(1, "pool not found"))
            .on_json("--pool-id 3", json!([])),
    );

    let results = collector
        .collect_each::<u32, serde_json::Value, _>(vec![1, 2, 3], |id| {
            Invocation::new("az")
                .args(["pipelines", "agent", "list", "--pool-id"])
                .arg(id.to_string())
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(matches!(results[0].result, Collected::Payload(_)));
    match &results[1].result {
        Collected::Failed { stderr } => assert_eq!(stderr, "pool not found"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(matches!(results[2].result, Collected::Payload(_)));
    assert_eq!(runner.calls().len(), 3);
}

#[tokio::test]
async fn test_unparsable_output_degrades() {
    let (collector, _) = collector(MockRunner::new().on("ingress", CommandOutput::success("not json")));
    let inv = Invocation::new("kubectl").args(["get", "ingress"]);

    let result = collector.fetch::<serde_json::Value>(&inv).await.unwrap();
    assert!(matches!(result, Collected::Failed { .. }));
}

#[tokio::test]
async fn test_poll_until_times_out_after_budget() {
    let mut seen = 0;
    let err = poll_until(fast_policy(3), "provider", |_| {
        seen += 1;
        async { Ok(false) }
    })
    .await
    .unwrap_err();

    assert_eq!(seen, 3);
    match err {
        TriageError::WaitTimedOut { what, attempts } => {
            assert_eq!(what, "provider");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_poll_until_reports_successful_attempt() {
    let attempt = tokio_test::block_on(poll_until(fast_policy(5), "ready", |n| async move {
        Ok(n == 2)
    }));
    assert_eq!(attempt.unwrap(), 2);
}

#[tokio::test]
async fn test_provider_registration_polls_until_registered() {
    let (collector, runner) = collector(
        MockRunner::new()
            .on("provider show", CommandOutput::success("NotRegistered\n"))
            .on("provider show", CommandOutput::success("Registering\n"))
            .on("provider show", CommandOutput::success("Registered\n"))
            .on("provider register", CommandOutput::success("")),
    );

    ensure_provider_registered(&collector, "Microsoft.Insights", fast_policy(5))
        .await
        .unwrap();

    let calls = runner.calls();
    assert!(calls.iter().any(|c| c.contains("provider register")));
    assert_eq!(calls.iter().filter(|c| c.contains("provider show")).count(), 3);
}

#[tokio::test]
async fn test_provider_registration_times_out() {
    let (collector, _) = collector(
        MockRunner::new()
            .on("provider show", CommandOutput::success("Registering\n"))
            .on("provider register", CommandOutput::success("")),
    );

    let err = ensure_provider_registered(&collector, "Microsoft.Insights", fast_policy(2))
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::WaitTimedOut { attempts: 2, .. }));
}

#[tokio::test]
async fn test_missing_extension_is_prerequisite_error() {
    let (collector, _) = collector(MockRunner::new().on(
        "extension show",
        CommandOutput::failure(1, "The extension azure-devops is not installed."),
    ));

    let err = require_az_extension(&collector, "azure-devops").await.unwrap_err();
    assert!(matches!(err, TriageError::MissingPrerequisite(_)));
}

#[tokio::test]
async fn test_pat_auth_requires_token() {
    let (collector, runner) = collector(MockRunner::new());

    let err = verify_auth(&collector, AuthMode::Pat, false).await.unwrap_err();
    assert!(matches!(err, TriageError::MissingConfig(_)));
    verify_auth(&collector, AuthMode::Pat, true).await.unwrap();
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_cli_runner_reports_missing_binary() {
    let runner = CliRunner::new(Duration::from_secs(5));
    let err = runner
        .run(&Invocation::new("definitely-not-a-real-binary-for-triage"))
        .await
        .unwrap_err();
    assert!(matches!(err, crate::error::CollectError::Spawn { .. }));
}

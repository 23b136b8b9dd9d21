//! Verb-level tests against a fake `terraform` script.
//!
//! The fake records each invocation's arguments, which lets these tests check the
//! exact command lines and how many attempts the retry loop made.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tfdrive::error::Error;
use tfdrive::exit_codes::{DEFAULT_SUCCESS_EXIT_CODE, PLAN_CHANGES_PRESENT};
use tfdrive::io::agent::SocketPathAgent;
use tfdrive::io::process::Stream;
use tfdrive::test_support::{CapturedLogs, FakeTool};
use tfdrive::{OrFail, Value};

#[test]
fn apply_passes_vars_files_and_targets() {
    let tool = FakeTool::new("echo applied").expect("fake tool");
    let mut options = tool.options();
    options.vars.insert("count".into(), Value::from(2));
    options.vars.insert("enabled".into(), Value::from(true));
    options.var_files = vec!["test.tfvars".into()];
    options.targets = vec!["module.web".into()];

    let out = tool.driver().apply(&options).expect("apply");
    assert_eq!(out, "applied");
    assert_eq!(
        tool.calls(),
        vec![
            "apply -input=false -lock=false -auto-approve -var count=\"2\" -var enabled=\"1\" \
             -var-file test.tfvars -target module.web"
        ]
    );
    assert_eq!(tool.sink().lines(Stream::Stdout), vec!["applied"]);
}

#[test]
fn destroy_uses_destroy_flags() {
    let tool = FakeTool::new("true").expect("fake tool");
    let mut options = tool.options();
    options.no_color = true;
    tool.driver().destroy(&options).expect("destroy");
    assert_eq!(
        tool.calls(),
        vec!["destroy -auto-approve -input=false -lock=false -no-color"]
    );
}

#[test]
fn init_and_apply_runs_init_get_apply() {
    let tool = FakeTool::new("true").expect("fake tool");
    let mut options = tool.options();
    options.upgrade = true;
    options
        .backend_config
        .insert("bucket".into(), Value::from("state"));

    tool.driver().init_and_apply(&options).expect("init and apply");
    assert_eq!(
        tool.calls(),
        vec![
            "init -upgrade=true -backend-config bucket=\"state\"",
            "get -update",
            "apply -input=false -lock=false -auto-approve",
        ]
    );
}

#[test]
fn init_failure_stops_init_and_apply() {
    let tool = FakeTool::new("echo 'Error: no backend' >&2; exit 1").expect("fake tool");
    let err = tool.driver().init_and_apply(&tool.options()).unwrap_err();
    assert!(matches!(err, Error::Fatal { .. }), "{err:?}");
    assert_eq!(tool.calls(), vec!["init -upgrade=false"]);
}

#[test]
fn retryable_error_is_retried_until_exhausted() {
    let tool =
        FakeTool::new("echo 'Error: read tcp: connection reset by peer' >&2; exit 1")
            .expect("fake tool");
    let mut options = tool.options();
    options
        .retryable_terraform_errors
        .insert("connection reset".into(), "transient network blip".into());
    options.max_retries = 3;
    options.time_between_retries = Duration::from_millis(10);

    let err = tool.driver().apply(&options).unwrap_err();
    match &err {
        Error::RetriesExhausted { attempts, source, .. } => {
            assert_eq!(*attempts, 3);
            assert_eq!(source.exit_code(), Some(1));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(tool.calls().len(), 3);
}

#[test]
fn matched_explanation_is_logged_for_each_failed_attempt() {
    let tool = FakeTool::new("echo 'Error: read tcp: connection reset by peer' >&2; exit 1")
        .expect("fake tool");
    let mut options = tool.options();
    options
        .retryable_terraform_errors
        .insert("connection reset".into(), "transient network blip".into());
    options.max_retries = 3;
    options.time_between_retries = Duration::from_millis(1);

    let logs = CapturedLogs::default();
    let result = tracing::subscriber::with_default(logs.subscriber(), || {
        tool.driver().apply(&options)
    });
    assert!(matches!(result, Err(Error::RetriesExhausted { .. })), "{result:?}");

    let text = logs.contents();
    let explained: Vec<&str> = text
        .lines()
        .filter(|line| line.contains("transient network blip"))
        .collect();
    assert_eq!(explained.len(), 3, "{text}");
    assert!(explained.iter().all(|line| line.contains("WARN")), "{text}");
    assert!(explained[0].contains("connection reset"), "{text}");
    assert_eq!(text.matches("before retrying").count(), 2, "{text}");
}

#[test]
fn unmatched_error_is_fatal_after_one_attempt() {
    let tool = FakeTool::new("echo 'Error: Invalid reference' >&2; exit 1").expect("fake tool");
    let mut options = tool.options();
    options
        .retryable_terraform_errors
        .insert("connection reset".into(), "transient network blip".into());
    options.max_retries = 5;

    let err = tool.driver().apply(&options).unwrap_err();
    assert!(matches!(err, Error::Fatal { .. }), "{err:?}");
    assert_eq!(tool.calls().len(), 1);
    let output = err.run_error().and_then(|e| e.output()).expect("output");
    assert!(output.contains("Invalid reference"));
}

#[test]
fn transient_failure_then_success() {
    let tool = FakeTool::new(
        r#"if [ "$CALLS" -lt 3 ]; then echo "Error installing provider" >&2; exit 1; fi
echo "Apply complete!""#,
    )
    .expect("fake tool");
    let mut options = tool.options().with_default_retryable_errors();
    options.time_between_retries = Duration::from_millis(1);

    let out = tool.driver().apply(&options).expect("apply");
    assert_eq!(out, "Apply complete!");
    assert_eq!(tool.calls().len(), 3);
}

#[test]
fn missing_binary_is_fatal_even_with_retries() {
    let tool = FakeTool::new("true").expect("fake tool");
    let mut options = tool.options();
    options.terraform_binary = tool.path().join("missing").to_string_lossy().into_owned();
    options.max_retries = 3;
    options
        .retryable_terraform_errors
        .insert("failed".into(), "never".into());

    let err = tool.driver().apply(&options).unwrap_err();
    assert!(matches!(
        err,
        Error::Fatal {
            source: tfdrive::error::RunError::Spawn { .. },
            ..
        }
    ));
}

#[test]
fn plan_exit_code_reports_detailed_code() {
    let tool = FakeTool::new("echo 'Plan: 1 to add'; exit 2").expect("fake tool");
    let code = tool.driver().plan_exit_code(&tool.options()).expect("plan");
    assert_eq!(code, PLAN_CHANGES_PRESENT);
    assert_eq!(
        tool.calls(),
        vec!["plan -input=false -lock=true -detailed-exitcode"]
    );
}

#[test]
fn plan_without_changes_is_success_code() {
    let tool = FakeTool::new("echo 'No changes.'").expect("fake tool");
    let code = tool.driver().init_and_plan(&tool.options()).expect("plan");
    assert_eq!(code, DEFAULT_SUCCESS_EXIT_CODE);
    assert_eq!(tool.calls().len(), 2);
}

#[test]
fn plan_killed_by_signal_is_undeterminable() {
    let tool = FakeTool::new("kill -9 $$").expect("fake tool");
    let err = tool.driver().plan_exit_code(&tool.options()).unwrap_err();
    assert!(matches!(err, Error::UndeterminableExitCode(_)), "{err:?}");
}

#[test]
fn env_vars_and_agent_socket_reach_the_child() {
    let tool = FakeTool::new("echo \"$TF_VAR_region $SSH_AUTH_SOCK\"").expect("fake tool");
    let mut options = tool.options();
    options
        .env_vars
        .insert("TF_VAR_region".into(), "eu-west-1".into());
    options.ssh_agent = Some(Arc::new(SocketPathAgent::new("/tmp/test-agent.sock")));

    let out = tool
        .driver()
        .run_command(&options, &["version"])
        .expect("run");
    assert_eq!(out, "eu-west-1 /tmp/test-agent.sock");
    assert!(!options.env_vars.contains_key("SSH_AUTH_SOCK"));
}

#[test]
fn shared_options_across_threads() {
    let tool = FakeTool::new("echo \"$SSH_AUTH_SOCK\"").expect("fake tool");
    let mut options = tool.options();
    options.ssh_agent = Some(Arc::new(SocketPathAgent::new("/tmp/shared.sock")));
    let driver = tool.driver();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| driver.run_command(&options, &["version"])))
            .collect();
        for handle in handles {
            let out = handle.join().expect("join").expect("run");
            assert_eq!(out, "/tmp/shared.sock");
        }
    });
    assert_eq!(tool.calls().len(), 4);
}

#[test]
#[should_panic(expected = "failed")]
fn or_fail_panics_on_fatal_error() {
    let tool = FakeTool::new("exit 1").expect("fake tool");
    tool.driver().apply(&tool.options()).or_fail();
}

//! Integration tests for the eval dispatcher against real child processes.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{sh_eval_config, write_script, EVAL_NAME, ROBOT};
use kodachrome_core::{EvalConfig, EvalDispatcher, RenderBackend, TIMEOUT_EXIT_CODE};

/// Test: arguments are passed positionally in the documented order
#[tokio::test]
async fn test_argument_layout() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("runs");
    let script = write_script(dir.path(), "args.sh", r#"echo "$1|$2|$3|$4""#);

    let dispatcher = EvalDispatcher::new(sh_eval_config(&out_dir));
    let output = dispatcher.run(&script).await.expect("dispatch failed");

    assert_eq!(output.exit_code, 0);
    assert_eq!(
        output.stdout.trim(),
        format!("{ROBOT}|{EVAL_NAME}|--out|{}", out_dir.display())
    );
    assert!(output.success());
}

/// Test: nonzero exit codes and both streams are captured
#[tokio::test]
async fn test_nonzero_exit_captured() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "fail.sh", "echo out\necho err >&2\nexit 3");

    let dispatcher = EvalDispatcher::new(sh_eval_config(dir.path()));
    let output = dispatcher.run(&script).await.expect("dispatch failed");

    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stdout, "out\n");
    assert_eq!(output.stderr, "err\n");
    assert!(!output.timed_out);
    assert_eq!(dispatcher.metrics().failed(), 1);
}

/// Test: undecodable bytes are replaced instead of failing
#[tokio::test]
async fn test_output_decoded_lossily() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "bytes.sh", r"printf 'ok \377\376 done'");

    let dispatcher = EvalDispatcher::new(sh_eval_config(dir.path()));
    let output = dispatcher.run(&script).await.expect("dispatch failed");

    assert!(output.stdout.starts_with("ok "));
    assert!(output.stdout.ends_with(" done"));
    assert!(output.stdout.contains('\u{FFFD}'));
}

/// Test: render backend overrides reach the child environment
#[tokio::test]
async fn test_render_environment_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "env.sh",
        r#"echo "$MUJOCO_GL $PYOPENGL_PLATFORM $LIBGL_ALWAYS_SOFTWARE""#,
    );

    let config = EvalConfig {
        render_backend: RenderBackend::Egl,
        software_gl: true,
        ..sh_eval_config(dir.path())
    };
    let dispatcher = EvalDispatcher::new(config);
    let output = dispatcher.run(&script).await.expect("dispatch failed");

    assert_eq!(output.stdout.trim(), "egl egl 1");
}

/// Test: a run past the timeout is killed, reaped and reported as rc=124
#[tokio::test]
async fn test_timeout_kills_child() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "hang.sh",
        "echo $$ > \"$4/pid\"\necho partial\nexec sleep 30",
    );

    let config = EvalConfig {
        timeout: Duration::from_millis(500),
        ..sh_eval_config(dir.path())
    };
    let dispatcher = EvalDispatcher::new(config);

    let start = Instant::now();
    let output = dispatcher.run(&script).await.expect("dispatch failed");

    assert!(start.elapsed() < Duration::from_secs(10), "timeout not enforced");
    assert_eq!(output.exit_code, TIMEOUT_EXIT_CODE);
    assert!(output.stdout.is_empty(), "timeout result carries no stdout");
    assert_eq!(output.stderr, "Timed out (EVAL_TIMEOUT_S)");
    assert!(output.timed_out);
    assert_eq!(dispatcher.metrics().timed_out(), 1);
    assert_eq!(dispatcher.metrics().active(), 0);
    assert_eq!(dispatcher.available_slots(), 1);

    #[cfg(target_os = "linux")]
    {
        let pid = std::fs::read_to_string(dir.path().join("pid")).unwrap();
        let proc_dir = std::path::Path::new("/proc").join(pid.trim());
        assert!(!proc_dir.exists(), "child {} still alive", pid.trim());
    }
}

/// Test: with cap C and N > C simultaneous requests, at most C children run
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_cap() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "busy.sh",
        concat!(
            "mkdir -p \"$4/active\"\n",
            "touch \"$4/active/$$\"\n",
            "ls \"$4/active\" | wc -l >> \"$4/counts\"\n",
            "sleep 0.3\n",
            "rm \"$4/active/$$\"",
        ),
    );

    let cap = 2;
    let config = EvalConfig {
        max_concurrency: cap,
        ..sh_eval_config(dir.path())
    };
    let dispatcher = Arc::new(EvalDispatcher::new(config));

    let runs = (0..6).map(|_| {
        let dispatcher = Arc::clone(&dispatcher);
        let script = script.clone();
        tokio::spawn(async move { dispatcher.run(&script).await })
    });
    let outputs = futures::future::join_all(runs).await;

    for output in outputs {
        let output = output.expect("task panicked").expect("dispatch failed");
        assert_eq!(output.exit_code, 0, "stderr: {}", output.stderr);
    }

    let counts = std::fs::read_to_string(dir.path().join("counts")).unwrap();
    let observed: Vec<usize> = counts.lines().map(|l| l.trim().parse().unwrap()).collect();
    assert_eq!(observed.len(), 6);
    assert!(
        observed.iter().all(|&n| n <= cap),
        "observed concurrency {observed:?} exceeds cap {cap}"
    );
    assert!(dispatcher.metrics().peak_active() <= cap);
    assert_eq!(dispatcher.metrics().started(), 6);
    assert_eq!(dispatcher.metrics().active(), 0);
}

/// Test: the default cap of one strictly serializes runs
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_default_cap_serializes() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "nap.sh", "sleep 0.2");

    let dispatcher = Arc::new(EvalDispatcher::new(sh_eval_config(dir.path())));
    let runs = (0..3).map(|_| {
        let dispatcher = Arc::clone(&dispatcher);
        let script = script.clone();
        tokio::spawn(async move { dispatcher.run(&script).await })
    });

    let start = Instant::now();
    for result in futures::future::join_all(runs).await {
        result.unwrap().unwrap();
    }

    assert!(start.elapsed() >= Duration::from_millis(600));
    assert_eq!(dispatcher.metrics().peak_active(), 1);
}

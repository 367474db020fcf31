mod common;

use pretty_assertions::assert_eq;

use runcell_core::ExecConfig;
use runcell_core::ExecError;
use runcell_core::run_one_shot;

use common::python_bin;

fn config() -> Option<ExecConfig> {
    python_bin().map(|interpreter| ExecConfig {
        interpreter,
        ..Default::default()
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn successful_run_aggregates_stdout() {
    let Some(config) = config() else {
        eprintln!("skipping: no python interpreter on PATH");
        return;
    };

    let response = run_one_shot(&config, "print('hello')", None)
        .await
        .expect("one-shot run");
    assert!(response.success);
    assert_eq!(response.output, "hello\n");
    assert_eq!(response.error, "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nonzero_exit_surfaces_stderr() {
    let Some(config) = config() else {
        eprintln!("skipping: no python interpreter on PATH");
        return;
    };

    let code = "import sys\nsys.stderr.write('bad input\\n')\nsys.exit(2)\n";
    let response = run_one_shot(&config, code, None).await.expect("one-shot run");
    assert!(!response.success);
    assert_eq!(response.error, "bad input\n");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_kills_the_process() {
    let Some(config) = config() else {
        eprintln!("skipping: no python interpreter on PATH");
        return;
    };

    let started = std::time::Instant::now();
    let response = run_one_shot(&config, "import time\ntime.sleep(5)\n", Some(1))
        .await
        .expect("one-shot run");
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
    assert!(!response.success);
    assert!(response.error.contains("Timeout"), "{}", response.error);
}

#[tokio::test]
async fn validation_errors_reject_before_spawning() {
    let config = ExecConfig::default();

    assert!(matches!(
        run_one_shot(&config, "  \n", None).await,
        Err(ExecError::EmptyCode)
    ));
    assert!(matches!(
        run_one_shot(&config, "print(1)", Some(0)).await,
        Err(ExecError::TimeoutOutOfRange { requested: 0 })
    ));
    assert!(matches!(
        run_one_shot(&config, "print(1)", Some(120)).await,
        Err(ExecError::TimeoutOutOfRange { requested: 120 })
    ));
}

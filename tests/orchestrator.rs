// Development server lifecycle through the controller

mod common;

use common::harness::{quiet_config, Harness};
use sandbox_ide::services::process::{ProcessError, ServerState};
use sandbox_ide::services::sandbox::{MemorySandbox, ProcessScript, SandboxError, KILLED_EXIT_CODE};
use std::time::Duration;

const INSTALL: &str = "npm install";
const START: &str = "npm start";

/// Harness whose install step succeeds and whose server keeps running
fn serving() -> Harness {
    let sandbox = MemorySandbox::new();
    sandbox.script(INSTALL, ProcessScript::exits(0, &["added 12 packages\n"]));
    sandbox.script(START, ProcessScript::running(&["> dev server\n"]));
    Harness::with_sandbox(sandbox, quiet_config())
}

async fn wait_for_state(h: &Harness, expected: ServerState) {
    let mut states = h.controller.subscribe_server_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| *state == expected),
    )
    .await
    .expect("state not reached")
    .expect("state channel closed");
}

#[tokio::test]
async fn test_start_ready_stop_sequence() {
    let h = serving();
    let mut states = h.controller.subscribe_server_state();

    h.controller.run_project().await.unwrap();
    h.settle().await;
    assert_eq!(h.controller.server_state(), ServerState::Starting);
    assert_eq!(h.sandbox.metrics().spawns, vec![INSTALL, START]);

    h.sandbox.announce_server(3000, "https://x.local");
    assert_eq!(
        h.controller.server_state(),
        ServerState::Running {
            url: "https://x.local".to_string()
        }
    );
    assert_eq!(h.controller.server_state().url(), Some("https://x.local"));
    assert!(states.has_changed().unwrap());

    h.controller.stop_project().await.unwrap();
    assert_eq!(h.controller.server_state(), ServerState::Idle);
    assert_eq!(h.controller.server_state().url(), None);
    assert_eq!(h.sandbox.live_processes(), 0);
    h.settle().await;

    let output = h.output();
    assert!(output.starts_with("Installing dependencies...\nadded 12 packages\n"));
    assert!(output.contains("\nStarting development server...\n"));
    assert!(output.contains("[OK] Development server is running at https://x.local\n$ "));
    assert!(output.ends_with("Stopping server...\n[OK] Server stopped\n"));
    assert!(!output.contains("Server exited"));
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let h = serving();
    h.controller.run_project().await.unwrap();

    assert_eq!(
        h.controller.run_project().await,
        Err(ProcessError::AlreadyRunning)
    );
    assert_eq!(h.sandbox.metrics().spawns, vec![INSTALL, START]);
    assert_eq!(h.sandbox.live_processes(), 1);
    assert_eq!(h.output().matches("Server is already running!").count(), 1);
    assert!(h.output().contains("[ERROR] Server is already running!\n$ "));
}

#[tokio::test]
async fn test_stop_when_idle_reports_and_keeps_state() {
    let h = Harness::new();
    let states = h.controller.subscribe_server_state();

    assert_eq!(
        h.controller.stop_project().await,
        Err(ProcessError::NothingToStop)
    );
    assert_eq!(h.controller.server_state(), ServerState::Idle);
    assert!(!states.has_changed().unwrap());
    assert_eq!(h.output(), "No server is running\n");
    assert_eq!(h.sandbox.metrics().kills, 0);
}

#[tokio::test]
async fn test_server_exiting_on_its_own_returns_to_idle() {
    let h = serving();
    h.controller.run_project().await.unwrap();
    h.sandbox.announce_server(3000, "https://x.local");

    assert!(h.sandbox.finish(START, 1));
    wait_for_state(&h, ServerState::Idle).await;
    h.settle().await;

    assert!(h.output().ends_with("[ERROR] Server exited with code 1\n$ "));

    // A fresh start is allowed again
    h.controller.run_project().await.unwrap();
    assert_eq!(h.sandbox.live_processes(), 1);
}

#[tokio::test]
async fn test_ready_event_without_a_server_is_ignored() {
    let h = serving();
    h.sandbox.announce_server(3000, "https://stale.local");
    assert_eq!(h.controller.server_state(), ServerState::Idle);

    h.controller.run_project().await.unwrap();
    h.controller.stop_project().await.unwrap();
    h.sandbox.announce_server(3000, "https://late.local");

    assert_eq!(h.controller.server_state(), ServerState::Idle);
    assert!(!h.output().contains("late.local"));
}

#[tokio::test]
async fn test_stop_during_install_cancels_the_start() {
    let sandbox = MemorySandbox::new();
    sandbox.script(INSTALL, ProcessScript::running(&["resolving...\n"]));
    sandbox.script(START, ProcessScript::running(&[]));
    let h = Harness::with_sandbox(sandbox, quiet_config());

    let (started, stopped) = tokio::join!(h.controller.run_project(), async {
        let mut states = h.controller.subscribe_server_state();
        states
            .wait_for(|state| *state == ServerState::Installing)
            .await
            .unwrap();
        h.controller.stop_project().await
    });

    assert_eq!(started, Err(ProcessError::Cancelled));
    assert_eq!(stopped, Ok(()));
    assert_eq!(h.controller.server_state(), ServerState::Idle);
    assert_eq!(h.sandbox.metrics().spawns, vec![INSTALL]);
    assert_eq!(h.sandbox.metrics().kills, 1);
    assert_eq!(h.sandbox.live_processes(), 0);
}

#[tokio::test]
async fn test_failed_install_still_starts_the_server() {
    let sandbox = MemorySandbox::new();
    sandbox.script(INSTALL, ProcessScript::exits(1, &["npm ERR! offline\n"]));
    sandbox.script(START, ProcessScript::running(&[]));
    let h = Harness::with_sandbox(sandbox, quiet_config());

    h.controller.run_project().await.unwrap();
    assert_eq!(h.controller.server_state(), ServerState::Starting);
    assert!(h
        .output()
        .contains("[ERROR] Dependency install exited with code 1\n\nStarting development server...\n"));
}

#[tokio::test]
async fn test_failed_install_aborts_when_configured() {
    let sandbox = MemorySandbox::new();
    sandbox.script(INSTALL, ProcessScript::exits(1, &[]));
    let mut config = quiet_config();
    config.server.abort_on_install_failure = true;
    let h = Harness::with_sandbox(sandbox, config);

    assert_eq!(
        h.controller.run_project().await,
        Err(ProcessError::InstallFailed(1))
    );
    assert_eq!(h.controller.server_state(), ServerState::Idle);
    assert_eq!(h.sandbox.metrics().spawns, vec![INSTALL]);
    assert_eq!(h.sandbox.live_processes(), 0);
}

#[tokio::test]
async fn test_spawn_failure_returns_to_idle() {
    let sandbox = MemorySandbox::new();
    sandbox.fail_spawn(START, "npm: not found");
    let h = Harness::with_sandbox(sandbox, quiet_config());

    let err = h.controller.run_project().await.unwrap_err();
    assert!(matches!(err, ProcessError::Spawn(SandboxError::Spawn { .. })));
    assert_eq!(h.controller.server_state(), ServerState::Idle);
    assert!(h
        .output()
        .ends_with("[ERROR] Failed to start server: failed to spawn npm start: npm: not found\n$ "));
}

#[tokio::test]
async fn test_kill_failure_keeps_the_server_owned() {
    let h = serving();
    h.controller.run_project().await.unwrap();
    h.settle().await;
    h.sandbox.fail_kills("permission denied");

    let err = h.controller.stop_project().await.unwrap_err();
    assert!(matches!(err, ProcessError::Kill(_)));
    assert_eq!(h.controller.server_state(), ServerState::Starting);
    assert!(h
        .output()
        .ends_with("[ERROR] Failed to stop server: failed to kill process: permission denied\n"));

    // The ready event still lands on the owned server
    h.sandbox.announce_server(3000, "https://x.local");
    assert!(h.controller.server_state().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_install_exiting_during_a_failed_kill_returns_to_idle() {
    let sandbox = MemorySandbox::new();
    sandbox.script(INSTALL, ProcessScript::running(&[]));
    sandbox.script(START, ProcessScript::running(&[]));
    sandbox.fail_kills("permission denied");
    sandbox.set_kill_delay(Duration::from_millis(100));
    let h = Harness::with_sandbox(sandbox, quiet_config());

    let (started, stopped) = tokio::join!(h.controller.run_project(), async {
        let mut states = h.controller.subscribe_server_state();
        states
            .wait_for(|state| *state == ServerState::Installing)
            .await
            .unwrap();
        let (stopped, _) = tokio::join!(h.controller.stop_project(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(h.sandbox.finish(INSTALL, 0));
        });
        stopped
    });

    assert_eq!(started, Err(ProcessError::Cancelled));
    assert!(matches!(stopped, Err(ProcessError::Kill(_))));
    assert_eq!(h.controller.server_state(), ServerState::Idle);
    assert_eq!(h.sandbox.metrics().spawns, vec![INSTALL]);
    assert_eq!(h.sandbox.live_processes(), 0);

    // Not wedged: a new start is accepted
    h.sandbox.script(INSTALL, ProcessScript::exits(0, &[]));
    h.controller.run_project().await.unwrap();
    assert_eq!(h.controller.server_state(), ServerState::Starting);
}

#[tokio::test(start_paused = true)]
async fn test_server_exiting_during_a_failed_kill_returns_to_idle() {
    let h = serving();
    h.controller.run_project().await.unwrap();
    h.settle().await;
    h.sandbox.fail_kills("permission denied");
    h.sandbox.set_kill_delay(Duration::from_millis(100));

    let (stopped, _) = tokio::join!(h.controller.stop_project(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.sandbox.finish(START, 0));
    });

    assert!(matches!(stopped, Err(ProcessError::Kill(_))));
    assert_eq!(h.controller.server_state(), ServerState::Idle);
    h.sandbox.announce_server(3000, "https://x.local");
    assert_eq!(h.controller.server_state(), ServerState::Idle);
}

#[tokio::test]
async fn test_concurrent_starts_only_run_once() {
    let sandbox = MemorySandbox::new();
    sandbox.script(INSTALL, ProcessScript::running(&[]));
    sandbox.script(START, ProcessScript::running(&[]));
    let h = Harness::with_sandbox(sandbox, quiet_config());

    let (first, second) = tokio::join!(h.controller.run_project(), async {
        let result = h.controller.run_project().await;
        assert_eq!(h.controller.server_state(), ServerState::Installing);
        assert!(h.sandbox.finish(INSTALL, 0));
        result
    });

    assert_eq!(first, Ok(()));
    assert_eq!(second, Err(ProcessError::AlreadyRunning));
    assert_eq!(h.sandbox.metrics().spawns, vec![INSTALL, START]);
    assert_eq!(h.controller.server_state(), ServerState::Starting);
    assert_eq!(h.output().matches("Server is already running!").count(), 1);

    h.controller.stop_project().await.unwrap();
    assert_eq!(h.sandbox.live_processes(), 0);
}

#[tokio::test]
async fn test_terminal_aliases_drive_the_server() {
    let h = serving();

    h.controller.handle_terminal_input("npm start\r").await.unwrap();
    h.settle().await;
    assert_eq!(h.controller.server_state(), ServerState::Starting);

    h.controller.handle_terminal_input("stop\r").await.unwrap();
    assert_eq!(h.controller.server_state(), ServerState::Idle);
    assert!(h.output().ends_with("[OK] Server stopped\n$ "));
}

#[tokio::test]
async fn test_bare_start_keyword_starts_the_server() {
    let h = serving();

    h.controller.handle_terminal_input("start\r").await.unwrap();
    h.settle().await;
    assert_eq!(h.sandbox.metrics().spawns, vec![INSTALL, START]);
    assert_eq!(h.controller.server_state(), ServerState::Starting);

    h.controller.handle_terminal_input("exit\r").await.unwrap();
    assert_eq!(h.controller.server_state(), ServerState::Idle);
}

#[tokio::test]
async fn test_interrupt_stops_the_server() {
    let h = serving();
    h.controller.run_project().await.unwrap();
    h.settle().await;

    let echo = h.controller.handle_terminal_input("\u{3}").await.unwrap();
    assert_eq!(echo, "^C\r\n");
    assert_eq!(h.controller.server_state(), ServerState::Idle);
    wait_for_state(&h, ServerState::Idle).await;
    h.settle().await;
    assert!(h.output().ends_with("[OK] Server stopped\n$ "));
    assert!(!h.output().contains(&format!("code {KILLED_EXIT_CODE}")));
}

#[tokio::test]
async fn test_interrupt_when_idle_only_prompts() {
    let h = Harness::new();
    h.controller.handle_terminal_input("ls\u{3}").await.unwrap();
    assert_eq!(h.output(), "$ ");
    assert_eq!(h.controller.terminal_line(), "");
    assert!(h.sandbox.metrics().spawns.is_empty());
}

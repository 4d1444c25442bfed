//! End-to-end tests against the `ccm-bridge` binary.
//!
//! The handler program is swapped for `true`, `false` or a small script, so
//! no cluster manager is needed.

#![cfg(unix)]

use std::process::Stdio;
use std::time::Duration;

use ccm_bridge::config::{ENV_LOG, ENV_LOG_FILE, ENV_PROGRAM};
use ccm_bridge::{BridgeClient, ClientConfig, ClientError, Invocation};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

const BIN: &str = env!("CARGO_BIN_EXE_ccm-bridge");
const DEADLINE: Duration = Duration::from_secs(10);

fn bridge(program: &str) -> ClientConfig {
    ClientConfig::new(BIN)
        .with_env(ENV_PROGRAM, program)
        .with_ready_timeout(DEADLINE)
}

fn frame(args: &[&str]) -> Vec<u8> {
    let payload = Invocation::new(args.iter().map(|s| s.to_string()).collect())
        .unwrap()
        .encode()
        .unwrap();
    let mut out = u16::try_from(payload.len()).unwrap().to_ne_bytes().to_vec();
    out.extend(payload);
    out
}

fn sigterm(child: &Child) {
    let pid = i32::try_from(child.id().unwrap()).unwrap();
    kill(Pid::from_raw(pid), Signal::SIGTERM).unwrap();
}

#[tokio::test]
async fn raw_pipe_sees_ready_then_one_ack_per_command() {
    let mut child = Command::new(BIN)
        .env(ENV_PROGRAM, "true")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let mut stderr = child.stderr.take().unwrap();

    let mut wire = frame(&["create", "-n", "1", "test"]);
    wire.extend(frame(&["node1", "start"]));
    stdin.write_all(&wire).await.unwrap();
    stdin.flush().await.unwrap();

    let mut sentinels = [0xffu8; 3];
    timeout(DEADLINE, stderr.read_exact(&mut sentinels))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sentinels, [0x00, 0x01, 0x01]);

    sigterm(&child);
    let status = timeout(DEADLINE, child.wait()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(0));

    let mut rest = Vec::new();
    stderr.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty(), "stderr carries sentinels only: {rest:?}");
    drop(stdin);
}

#[tokio::test]
async fn client_runs_cluster_and_node_commands() {
    let mut client = BridgeClient::spawn(bridge("true")).await.unwrap();
    client.exec(["create", "-n", "3", "-b", "test"]).await.unwrap();
    client.exec(["updateconf", "'authenticator: PasswordAuthenticator'"]).await.unwrap();
    client.exec(["node1", "cqlsh", "-v", "-x", "SELECT 1"]).await.unwrap();
    client.exec(["NODE2", "Stop"]).await.unwrap();

    let status = timeout(DEADLINE, client.terminate()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(0));
}

#[tokio::test]
async fn failed_command_kills_the_worker_without_ack() {
    let mut client = BridgeClient::spawn(bridge("false")).await.unwrap();
    let err = client.exec(["status"]).await.unwrap_err();

    match err {
        ClientError::WorkerExited {
            status,
            diagnostics,
        } => {
            assert!(!status.success());
            assert!(diagnostics.contains("status exited with"), "{diagnostics}");
        }
        other => panic!("expected WorkerExited, got {other}"),
    }
}

#[tokio::test]
async fn unknown_command_is_reported() {
    let mut client = BridgeClient::spawn(bridge("true")).await.unwrap();
    let err = client.exec(["node1", "explode"]).await.unwrap_err();

    match err {
        ClientError::WorkerExited { diagnostics, .. } => assert!(
            diagnostics.contains("unknown node command 'explode'"),
            "{diagnostics}"
        ),
        other => panic!("expected WorkerExited, got {other}"),
    }
}

#[tokio::test]
async fn closing_stdin_ends_the_worker() {
    let mut child = Command::new(BIN)
        .env(ENV_PROGRAM, "true")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    drop(child.stdin.take());

    let status = timeout(DEADLINE, child.wait()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(1));
}

#[tokio::test]
async fn sigterm_mid_command_exits_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("slow-ccm");
    std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(
        &script,
        std::os::unix::fs::PermissionsExt::from_mode(0o755),
    )
    .unwrap();

    let mut child = Command::new(BIN)
        .env(ENV_PROGRAM, &script)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let mut stderr = child.stderr.take().unwrap();

    let ready = timeout(DEADLINE, stderr.read_u8()).await.unwrap().unwrap();
    assert_eq!(ready, 0x00);
    stdin.write_all(&frame(&["start"])).await.unwrap();
    stdin.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    sigterm(&child);
    let status = timeout(DEADLINE, child.wait()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(0));
}

#[tokio::test]
async fn command_leaving_a_background_process_is_acked() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("daemonizing-ccm");
    std::fs::write(&script, "#!/bin/sh\nsleep 20 &\nexit 0\n").unwrap();
    std::fs::set_permissions(
        &script,
        std::os::unix::fs::PermissionsExt::from_mode(0o755),
    )
    .unwrap();

    let mut client = BridgeClient::spawn(bridge(script.to_str().unwrap())).await.unwrap();
    timeout(Duration::from_secs(5), client.exec(["node1", "start"]))
        .await
        .expect("ack must follow the command's exit")
        .unwrap();
    client.exec(["node1", "status"]).await.unwrap();

    let status = timeout(DEADLINE, client.terminate()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(0));
}

#[tokio::test]
async fn logs_go_to_the_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("bridge.log");

    let config = bridge("true")
        .with_env(ENV_LOG_FILE, &log)
        .with_env(ENV_LOG, "debug");
    let mut client = BridgeClient::spawn(config).await.unwrap();
    client.exec(["node1", "ring"]).await.unwrap();
    let status = timeout(DEADLINE, client.terminate()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(0));

    let contents = std::fs::read_to_string(&log).unwrap();
    assert!(contents.contains("Worker ready"), "{contents}");
    assert!(contents.contains("Command completed"), "{contents}");
    assert!(contents.contains("SIGTERM"), "{contents}");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn inherited_descriptors_are_closed() {
    use std::io::Read;
    use std::os::fd::AsRawFd;

    use nix::fcntl::OFlag;
    use nix::unistd::pipe2;

    const INHERITED_FD: i32 = 9;

    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).unwrap();
    let write_raw = write_end.as_raw_fd();

    let mut command = Command::new(BIN);
    command
        .env(ENV_PROGRAM, "true")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Safety: dup2 is async-signal-safe. The copy at INHERITED_FD has no
    // FD_CLOEXEC, so it survives exec like a descriptor leaked by a parent.
    unsafe {
        command.pre_exec(move || {
            if libc::dup2(write_raw, INHERITED_FD) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    let mut child = command.spawn().unwrap();
    drop(write_end);

    let mut stderr = child.stderr.take().unwrap();
    let ready = timeout(DEADLINE, stderr.read_u8()).await.unwrap().unwrap();
    assert_eq!(ready, 0x00);

    // The worker held the last write end; once it is closed the pipe is at EOF.
    let read = tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::from(read_end);
        let mut buf = [0u8; 1];
        file.read(&mut buf)
    });
    let n = timeout(DEADLINE, read).await.unwrap().unwrap().unwrap();
    assert_eq!(n, 0);

    sigterm(&child);
    let status = timeout(DEADLINE, child.wait()).await.unwrap().unwrap();
    assert_eq!(status.code(), Some(0));
}

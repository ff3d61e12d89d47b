use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn fsgate_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fsgate"))
}

fn command(home: &TempDir) -> Command {
    let mut cmd = Command::new(fsgate_bin());
    cmd.env("FSGATE_HOME", home.path())
        .env_remove("FSGATE_ALLOW")
        .env_remove("FSGATE_DENY")
        .env_remove("FSGATE_CONFIG")
        .env_remove("FSGATE_AUDIT_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn run_cli(home: &TempDir, args: &[&str]) -> Output {
    command(home)
        .args(args)
        .output()
        .expect("failed to execute fsgate CLI")
}

fn describe(output: &Output) -> String {
    format!(
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

/// Pipe requests into `fsgate serve`, close stdin, collect the responses.
fn serve_session(home: &TempDir, args: &[&str], requests: &[Value]) -> (Output, Vec<Value>) {
    let mut child = command(home)
        .arg("serve")
        .arg("--no-log-file")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn fsgate serve");

    {
        let mut stdin = child.stdin.take().unwrap();
        for request in requests {
            writeln!(stdin, "{}", request).unwrap();
        }
    }

    let output = child.wait_with_output().unwrap();
    let responses = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| {
            serde_json::from_str(line)
                .unwrap_or_else(|e| panic!("stdout is not JSON-RPC ({}): {}", e, line))
        })
        .collect();
    (output, responses)
}

#[test]
fn test_check_prints_policy() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("private")).unwrap();

    let allow = root.path().to_string_lossy().into_owned();
    let deny = root.path().join("private").to_string_lossy().into_owned();
    let output = run_cli(&home, &["check", "--allow", &allow, "--deny", &deny]);

    assert!(output.status.success(), "{}", describe(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&allow), "{}", describe(&output));
    assert!(stdout.contains(&deny), "{}", describe(&output));
    assert!(stdout.contains("Policy OK"), "{}", describe(&output));
}

#[test]
fn test_check_path_refused_exits_nonzero() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("private")).unwrap();
    fs::write(root.path().join("private").join("key"), "k").unwrap();

    let allow = root.path().to_string_lossy().into_owned();
    let deny = root.path().join("private").to_string_lossy().into_owned();
    let target = root.path().join("private").join("key").to_string_lossy().into_owned();
    let output = run_cli(
        &home,
        &["check", "--allow", &allow, "--deny", &deny, "--path", &target],
    );

    assert!(!output.status.success(), "{}", describe(&output));
    assert!(
        String::from_utf8_lossy(&output.stdout).contains("DENIED"),
        "{}",
        describe(&output)
    );
}

#[test]
fn test_missing_root_fails_startup() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let missing = root.path().join("gone").to_string_lossy().into_owned();

    let output = run_cli(&home, &["check", "--allow", &missing]);

    assert!(!output.status.success(), "{}", describe(&output));
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("Invalid policy"),
        "{}",
        describe(&output)
    );
}

#[test]
fn test_no_roots_fails_with_suggestions() {
    let home = TempDir::new().unwrap();
    let output = run_cli(&home, &["serve", "--no-log-file"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No allowed directories"), "{}", describe(&output));
    assert!(stderr.contains("TRY:"), "{}", describe(&output));
}

#[test]
fn test_serve_stdio_session() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("hello.txt"), "hi there").unwrap();
    let allow = root.path().to_string_lossy().into_owned();
    let target = root.path().join("hello.txt").to_string_lossy().into_owned();

    let (output, responses) = serve_session(
        &home,
        &["--allow", &allow],
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2024-11-05", "capabilities": {}
            }}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
                "name": "read-file", "arguments": {"path": target}
            }}),
        ],
    );

    assert!(output.status.success(), "{}", describe(&output));
    assert_eq!(responses.len(), 2, "{}", describe(&output));

    let read = responses
        .iter()
        .find(|r| r["id"] == 2)
        .expect("no response to read-file");
    assert_eq!(
        read["result"]["content"][0]["text"],
        "<fileContent>hi there</fileContent>"
    );
}

#[test]
fn test_serve_writes_audit_log() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let allow = root.path().to_string_lossy().into_owned();
    let audit = home.path().join("audit").join("fsgate.ndjson");
    let audit_arg = audit.to_string_lossy().into_owned();

    let (output, _) = serve_session(
        &home,
        &["--allow", &allow, "--audit-log", &audit_arg],
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2024-11-05", "capabilities": {}
            }}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
                "name": "list-allowed-directories", "arguments": {}
            }}),
        ],
    );

    assert!(output.status.success(), "{}", describe(&output));
    let log = fs::read_to_string(&audit).unwrap();
    assert!(log.lines().any(|line| line.contains("\"type\":\"tool_call\"")));
}

#![cfg(feature = "cli")]

use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

struct Server(Child);

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind should work");
    listener.local_addr().expect("listener should have an address")
}

fn wait_for_listener(addr: SocketAddr, timeout: Duration) {
    let start = Instant::now();
    loop {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("listener on {addr} did not come up");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child status should be readable") {
            return status;
        }
        if start.elapsed() >= timeout {
            panic!("process did not exit");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn spawn_server(args: &[&str], addr: SocketAddr) -> Server {
    let child = Command::new(env!("CARGO_BIN_EXE_h2duplex"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .arg(addr.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("server command should start");
    wait_for_listener(addr, Duration::from_secs(5));
    Server(child)
}

fn send(url: &str, extra: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_h2duplex"))
        .arg("--log-level")
        .arg("error")
        .arg("send")
        .arg(url)
        .args(extra)
        .output()
        .expect("send should run")
}

#[test]
fn send_wait_prints_uppercased_echo() {
    let addr = free_addr();
    let _server = spawn_server(&["echo"], addr);

    let output = send(
        &format!("http://{addr}/"),
        &["--data", "hello", "--wait", "--format", "raw"],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout), "HELLO\n");
}

#[test]
fn send_wait_json_output_against_verbatim_echo() {
    let addr = free_addr();
    let _server = spawn_server(&["echo", "--verbatim"], addr);

    let output = send(
        &format!("http://{addr}/"),
        &["--json", "{\"n\": 1}", "--wait", "--format", "json"],
    );

    assert!(output.status.success());
    let line = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value =
        serde_json::from_str(line.trim()).expect("output should be valid json");
    assert_eq!(value["event"], "message-received");
    assert_eq!(value["payload"], "{\"n\":1}");
    assert_eq!(value["size"], 7);
}

#[test]
fn listen_prints_received_message_and_exits_after_count() {
    let addr = free_addr();
    let server = spawn_server(&["--format", "pretty", "listen", "--count", "1"], addr);

    let output = send(&format!("http://{addr}/"), &["--data", "ping"]);
    assert!(output.status.success());

    let mut server = server;
    let status = wait_for_exit(&mut server.0, Duration::from_secs(5));
    assert!(status.success());

    let mut stdout = String::new();
    server
        .0
        .stdout
        .take()
        .expect("stdout should be piped")
        .read_to_string(&mut stdout)
        .expect("stdout should be readable");
    assert!(stdout.contains("payload=ping"), "stdout: {stdout}");
}

#[test]
fn send_to_closed_port_is_transport_error() {
    let addr = free_addr();

    let output = send(
        &format!("http://{addr}/"),
        &["--data", "x", "--connect-timeout", "3s"],
    );
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn invalid_json_payload_is_usage_error() {
    let output = send("http://127.0.0.1:9/", &["--json", "{bad"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_h2duplex"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("h2duplex {}", env!("CARGO_PKG_VERSION")));
}

//! End-to-end PHD2 scenarios (spec §8, E1-E4): a real `phd2::Client`
//! talking newline-delimited JSON-RPC to an in-process mock PHD2 server,
//! the same in-process `TcpListener` shape the transport's own unit tests
//! use, standing in for PHD2 since no real binary is available in CI.

use astro_device_plane::config::Phd2ClientConfig;
use astro_device_plane::phd2::{Client, SettleParameters};
use astro_device_plane::task::simple_tasks::DitherTask;
use astro_device_plane::task::workflows::GuidedSession;
use astro_device_plane::task::{Task, TaskErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

async fn bind_loopback() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (listener, port)
}

#[tokio::test]
async fn e1_connect_then_read_property() {
    let (listener, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("mock accept");
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let request = lines
            .next_line()
            .await
            .expect("mock read")
            .expect("one request line");
        assert!(request.contains("\"method\":\"get_exposure\""));
        assert!(request.contains("\"id\":1"));
        write_half
            .write_all(b"{\"jsonrpc\":\"2.0\",\"result\":2000,\"id\":1}\n")
            .await
            .expect("mock write");
    });

    let client = Client::new(Phd2ClientConfig::default());
    client
        .connect_to("127.0.0.1", port, Duration::from_secs(1))
        .await
        .expect("connect");

    let exposure_ms = client.get_exposure_ms().await.expect("get_exposure");
    assert_eq!(exposure_ms, 2000);

    server.await.expect("mock server task");
    client.disconnect().await;
}

/// Drives the mock through `SettleBegin` -> three `Settling` -> `SettleDone`,
/// acknowledging the triggering RPC first as a real PHD2 server would.
async fn run_settle_mock(listener: TcpListener, expected_method: &'static str, status: i32, error: &str) {
    let (socket, _) = listener.accept().await.expect("mock accept");
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let request = lines
        .next_line()
        .await
        .expect("mock read")
        .expect("one request line");
    assert!(request.contains(&format!("\"method\":\"{expected_method}\"")));

    write_half
        .write_all(b"{\"jsonrpc\":\"2.0\",\"result\":0,\"id\":1}\n")
        .await
        .expect("mock ack write");
    write_half
        .write_all(b"{\"Event\":\"SettleBegin\",\"Timestamp\":1.0,\"Host\":\"h\",\"Inst\":1}\n")
        .await
        .expect("mock event write");
    for _ in 0..3 {
        write_half
            .write_all(
                b"{\"Event\":\"Settling\",\"Timestamp\":1.0,\"Host\":\"h\",\"Inst\":1,\
\"Distance\":1.0,\"Time\":1.0,\"SettleTime\":10.0,\"StarLocked\":true}\n",
            )
            .await
            .expect("mock event write");
    }
    let done = format!(
        "{{\"Event\":\"SettleDone\",\"Timestamp\":1.0,\"Host\":\"h\",\"Inst\":1,\
\"Status\":{status},\"Error\":\"{error}\",\"TotalFrames\":10,\"DroppedFrames\":0}}\n"
    );
    write_half
        .write_all(done.as_bytes())
        .await
        .expect("mock event write");

    // Give the client's dispatcher a moment to drain the events before the
    // connection closes underneath it.
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn e2_settle_happy_path_dither() {
    let (listener, port) = bind_loopback().await;
    let server = tokio::spawn(run_settle_mock(listener, "dither", 0, ""));

    let client = Client::new(Phd2ClientConfig::default());
    client
        .connect_to("127.0.0.1", port, Duration::from_secs(1))
        .await
        .expect("connect");

    let settle = SettleParameters {
        pixels: 2.0,
        time_s: 10.0,
        timeout_s: 60.0,
    };
    let future = client.dither(5.0, false, settle).await.expect("dither rpc");
    let result = future.wait(Duration::from_secs(5)).await.expect("settle wait");
    assert!(result.success);

    server.await.expect("mock server task");
    client.disconnect().await;
}

/// Drives a `GuidedSession` through one `LostLock` -> recovery -> `Guiding`
/// cycle, then lets the session's own `duration_minutes` deadline end it.
/// Time is paused so the 1-minute-granularity deadline and the 1 s monitor
/// interval both resolve without the test actually waiting a minute; real
/// socket I/O against the mock is unaffected by the paused clock.
#[tokio::test(start_paused = true)]
async fn e4_guided_session_recovers_from_lost_lock() {
    let (listener, port) = bind_loopback().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("mock accept");
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let mut lost_lock_sent = false;
        while let Some(line) = lines.next_line().await.expect("mock read") {
            if line.trim().is_empty() {
                continue;
            }
            let request: serde_json::Value =
                serde_json::from_str(&line).expect("valid json-rpc request");
            let id = request["id"].as_u64().expect("request id");
            let method = request["method"].as_str().expect("request method");

            match method {
                "get_app_state" => {
                    let state = if lost_lock_sent { "Guiding" } else { "LostLock" };
                    lost_lock_sent = true;
                    write_half
                        .write_all(format!("{{\"result\":\"{state}\",\"id\":{id}}}\n").as_bytes())
                        .await
                        .expect("mock write");
                }
                "guide" => {
                    write_half
                        .write_all(format!("{{\"result\":0,\"id\":{id}}}\n").as_bytes())
                        .await
                        .expect("mock write");
                    write_half
                        .write_all(
                            b"{\"Event\":\"SettleDone\",\"Timestamp\":1.0,\"Host\":\"h\",\"Inst\":1,\
\"Status\":0,\"Error\":\"\",\"TotalFrames\":1,\"DroppedFrames\":0}\n",
                        )
                        .await
                        .expect("mock write");
                }
                other => panic!("unexpected method {other}"),
            }
        }
    });

    let client = Arc::new(Client::new(Phd2ClientConfig::default()));
    client
        .connect_to("127.0.0.1", port, Duration::from_secs(1))
        .await
        .expect("connect");

    let task = Task::new(Box::new(GuidedSession {
        client: Arc::clone(&client),
    }));
    let result = task
        .execute(serde_json::json!({
            "duration_minutes": 1,
            "monitor_interval": 1,
            "auto_recovery": true,
            "recovery_attempts": 2,
        }))
        .await
        .expect("guided session should complete once its deadline elapses");

    assert_eq!(result["recovery_attempts"], 1);
    assert_eq!(result["final_state"], "Guiding");

    client.disconnect().await;
    server.await.expect("mock server task");
}

#[tokio::test]
async fn e3_settle_failure_surfaces_as_device_error() {
    let (listener, port) = bind_loopback().await;
    let server = tokio::spawn(run_settle_mock(listener, "dither", 1, "Star lost"));

    let client = Arc::new(Client::new(Phd2ClientConfig::default()));
    client
        .connect_to("127.0.0.1", port, Duration::from_secs(1))
        .await
        .expect("connect");

    let task = Task::new(Box::new(DitherTask {
        client: Arc::clone(&client),
    }));
    let outcome = task
        .execute(serde_json::json!({ "amount": 5.0 }))
        .await;
    assert!(outcome.is_err(), "expected the dither task to fail, got {outcome:?}");
    assert_eq!(task.error_kind().await, Some(TaskErrorKind::DeviceError));

    server.await.expect("mock server task");
    client.disconnect().await;
}

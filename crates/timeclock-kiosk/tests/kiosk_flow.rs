//! End-to-end tests of the kiosk event loop
//!
//! The runtime runs against a routing HTTP stub on a local TcpListener with
//! real time and short intervals. Card events and answers are injected
//! through the same channels the binary uses.

use serde_json::{Value, json};
use std::time::Duration;
use timeclock_core::{CardEvent, Config, ConfigStore};
use timeclock_hardware::event_channel;
use timeclock_kiosk::{
    ErrorIcon, Input, Intervals, KioskSettings, KioskState, Orchestrator, RecordingPower,
    RecordingView, Runtime, StaticHost, TokenManager, ViewUpdate,
};
use timeclock_network::{ApiClient, ApiClientConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

/// One request seen by the stub.
#[derive(Debug, Clone)]
struct Seen {
    line: String,
    body: Value,
}

/// Serve every connection with a response chosen by request line.
async fn serve_routes() -> (String, mpsc::UnboundedReceiver<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let (line, body) = read_request(&mut stream).await;
                let (status, response) = route(&line);
                let _ = tx.send(Seen { line, body });
                let text = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response}",
                    response.len()
                );
                stream.write_all(text.as_bytes()).await.ok();
                stream.shutdown().await.ok();
            });
        }
    });

    (format!("http://{addr}/api/"), rx)
}

fn route(line: &str) -> (&'static str, String) {
    let target = line.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
    match target.as_str() {
        "POST /api/auth/token/" => ("200 OK", json!({"token": "abc"}).to_string()),
        "GET /api/attendance/7/01020304/" => (
            "200 OK",
            json!({"data": [{"id": 1, "question": "Home office?", "options": {"y": "Ja", "n": "Nein"}}]})
                .to_string(),
        ),
        "POST /api/attendance/7/01020304/" => {
            ("200 OK", json!({"data": ["Kommen 08:00"]}).to_string())
        }
        "PATCH /api/v1/attendance/terminal/7/" => ("200 OK", "{}".to_string()),
        _ => (
            "404 Not Found",
            json!({"detail": "Unbekannte Karte"}).to_string(),
        ),
    }
}

async fn read_request(stream: &mut TcpStream) -> (String, Value) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buffer);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap())
                })
                .unwrap_or(0);
            if buffer.len() >= end + 4 + content_length {
                let line = text.lines().next().unwrap_or_default().to_string();
                let body = serde_json::from_slice(&buffer[end + 4..]).unwrap_or(Value::Null);
                return (line, body);
            }
        }
    }
    (String::new(), Value::Null)
}

struct Kiosk {
    view: RecordingView,
    events: timeclock_hardware::EventSender,
    inputs: mpsc::UnboundedSender<Input>,
    seen: mpsc::UnboundedReceiver<Seen>,
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<Orchestrator>,
}

async fn start_kiosk() -> Kiosk {
    let (base_url, seen) = serve_routes().await;
    let client = ApiClient::new(ApiClientConfig {
        base_url,
        timeout: Duration::from_secs(2),
    })
    .unwrap();

    let config = Config::from_toml("[api]\nterminal = 7\n[terminal]\nadmin_keys = \"CAFE\"\n").unwrap();
    let view = RecordingView::new();
    let settings = KioskSettings {
        error: Duration::from_millis(200),
        confirmation: Duration::from_millis(200),
        ..KioskSettings::from_config(&config).unwrap()
    };
    let orchestrator = Orchestrator::new(settings, TokenManager::new("user", "pass"), Box::new(view.clone()))
        .with_display_power(Box::new(RecordingPower::new()))
        .with_host_info(Box::new(StaticHost::default()));

    let hour = Duration::from_secs(3600);
    let intervals = Intervals {
        card_poll: Duration::from_millis(20),
        clock: hour,
        network: hour,
        token: hour,
        upload: hour,
        screensaver: hour,
    };

    let (events, events_rx) = event_channel();
    let (inputs, inputs_rx) = mpsc::unbounded_channel();
    let (stop, stop_rx) = oneshot::channel();
    let runtime = Runtime::new(orchestrator, client, events_rx, ConfigStore::new(config))
        .with_intervals(intervals)
        .with_inputs(inputs_rx);
    let task = tokio::spawn(runtime.run(async move {
        let _ = stop_rx.await;
    }));

    Kiosk {
        view,
        events,
        inputs,
        seen,
        stop,
        task,
    }
}

impl Kiosk {
    /// Wait until a request with the given line prefix reaches the stub.
    async fn expect_request(&mut self, prefix: &str) -> Seen {
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                let seen = self.seen.recv().await.unwrap();
                if seen.line.starts_with(prefix) {
                    return seen;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no request starting with {prefix}"))
    }

    /// Wait until the view has rendered a matching update.
    async fn expect_view(&self, predicate: impl Fn(&ViewUpdate) -> bool) {
        for _ in 0..300 {
            if self.view.updates().iter().any(&predicate) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("view never matched: {:?}", self.view.updates());
    }

    async fn shutdown(self) -> Orchestrator {
        let _ = self.stop.send(());
        self.task.await.unwrap()
    }
}

/// Test a card with one question goes through to confirmation and back
#[tokio::test]
async fn test_booking_with_question() {
    let mut kiosk = start_kiosk().await;
    kiosk.expect_request("POST /api/auth/token/").await;
    // Token completion is handled on the next loop turn.
    tokio::time::sleep(Duration::from_millis(50)).await;

    kiosk.events.send(CardEvent::new(vec![1, 2, 3, 4, 5])).unwrap();
    kiosk.expect_request("GET /api/attendance/7/01020304/").await;
    kiosk
        .expect_view(|u| matches!(u, ViewUpdate::Question(q) if q.id == "1"))
        .await;

    kiosk.inputs.send(Input::Answer("y".to_string())).unwrap();
    let clock = kiosk.expect_request("POST /api/attendance/7/01020304/").await;
    assert_eq!(clock.body, json!({"1": "y"}));

    kiosk
        .expect_view(|u| *u == ViewUpdate::Confirmation("Kommen 08:00".to_string()))
        .await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let orchestrator = kiosk.shutdown().await;
    assert_eq!(orchestrator.state(), KioskState::Idle);
    assert!(orchestrator.has_token());
}

/// Test an unknown card shows the backend detail and resets
#[tokio::test]
async fn test_unknown_card() {
    let mut kiosk = start_kiosk().await;
    kiosk.expect_request("POST /api/auth/token/").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    kiosk.events.send(CardEvent::new(vec![0xDE, 0xAD, 0xBE, 0xEF])).unwrap();
    kiosk.expect_request("GET /api/attendance/7/DEADBEEF/").await;
    kiosk
        .expect_view(|u| {
            *u == ViewUpdate::Error {
                message: "Unbekannte Karte".to_string(),
                icon: ErrorIcon::UnknownCard,
            }
        })
        .await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let orchestrator = kiosk.shutdown().await;
    assert_eq!(orchestrator.state(), KioskState::Idle);
}

/// Test only the newest of several queued cards is booked
#[tokio::test]
async fn test_queued_cards_coalesce() {
    let mut kiosk = start_kiosk().await;
    kiosk.expect_request("POST /api/auth/token/").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for uid in [[9, 9, 9, 1], [9, 9, 9, 2], [1, 2, 3, 4]] {
        kiosk.events.send(CardEvent::new(uid.to_vec())).unwrap();
    }
    let preflight = kiosk.expect_request("GET /api/attendance/").await;
    assert!(preflight.line.starts_with("GET /api/attendance/7/01020304/"));

    let orchestrator = kiosk.shutdown().await;
    assert_eq!(orchestrator.session().card_id().unwrap().as_str(), "01020304");
}

/// Test the admin card and runtime settings changes
#[tokio::test]
async fn test_admin_card_and_settings() {
    let mut kiosk = start_kiosk().await;
    kiosk.expect_request("POST /api/auth/token/").await;

    kiosk
        .events
        .send(CardEvent::new(vec![1, 1, 1, 1]).with_sector(vec![0xCA, 0xFE, 0, 0]))
        .unwrap();
    kiosk
        .expect_view(|u| *u == ViewUpdate::Screen(KioskState::Admin))
        .await;

    kiosk
        .inputs
        .send(Input::Set {
            section: "api".to_string(),
            key: "screenshots".to_string(),
            value: "true".to_string(),
        })
        .unwrap();
    kiosk
        .inputs
        .send(Input::Set {
            section: "api".to_string(),
            key: "terminal".to_string(),
            value: "9".to_string(),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let orchestrator = kiosk.shutdown().await;
    assert_eq!(orchestrator.state(), KioskState::Admin);
    assert!(orchestrator.settings().screenshots);
    assert_eq!(orchestrator.settings().terminal, 7);
}

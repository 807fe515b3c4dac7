use futures_util::{SinkExt, StreamExt};
use sensor_dashboard::clock::Clock;
use sensor_dashboard::{serve, AppState, DashboardConfig, SensorUpdate, Store};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (SocketAddr, AppState) {
    let mut config = DashboardConfig::default();
    config.broadcast.interval_ms = 50;
    config.broadcast.batch_size = 2;

    let state = AppState::new(Store::open_in_memory().unwrap(), &config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_state = state.clone();
    tokio::spawn(async move {
        serve(listener, server_state).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
}

/// Wait for the next update that satisfies `accept`.
async fn next_update(client: &mut Client, accept: impl Fn(&SensorUpdate) -> bool) -> SensorUpdate {
    let wait = async {
        loop {
            let msg = client.next().await.unwrap().unwrap();
            let Message::Text(text) = msg else { continue };
            let frame: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(frame["event"], "updateSensorData");
            let update: SensorUpdate = serde_json::from_value(frame["data"].clone()).unwrap();
            if accept(&update) {
                return update;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap()
}

fn seed(state: &AppState, values: &[f64]) -> Vec<i64> {
    let clock = Clock::default();
    values
        .iter()
        .map(|v| state.store.insert(*v, &clock.now()).unwrap().id)
        .collect()
}

#[tokio::test]
async fn connection_starts_loop_and_receives_latest() {
    let (addr, state) = start().await;
    let ids = seed(&state, &[1.0, 2.0, 3.0]);
    assert!(!state.broadcaster.is_running());

    let mut client = connect(addr).await;
    let update = next_update(&mut client, |u| !u.is_empty()).await;

    assert!(state.broadcaster.is_running());
    // batch_size = 2, newest first
    assert_eq!(update.ids, vec![ids[2], ids[1]]);
    assert_eq!(update.values, vec![3.0, 2.0]);
    assert_eq!(update.dates.len(), 2);
    assert!(update.dates[0].contains('T'));
}

#[tokio::test]
async fn sort_order_change_reaches_every_client() {
    let (addr, state) = start().await;
    let ids = seed(&state, &[1.0, 2.0, 3.0]);

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    next_update(&mut b, |u| !u.is_empty()).await;

    let frame = json!({ "event": "changeSortOrder", "data": "asc" }).to_string();
    a.send(Message::Text(frame)).await.unwrap();

    let expected = vec![ids[0], ids[1]];
    let seen = next_update(&mut b, |u| u.ids == expected).await;
    assert_eq!(seen.values, vec![1.0, 2.0]);
}

#[tokio::test]
async fn filter_excludes_and_reset_restores() {
    let (addr, state) = start().await;
    seed(&state, &[4.0]);

    let mut client = connect(addr).await;
    next_update(&mut client, |u| u.len() == 1).await;

    let future = json!({
        "event": "applyFilter",
        "data": { "start_date": "2999-01-01", "end_date": "" }
    });
    client.send(Message::Text(future.to_string())).await.unwrap();
    next_update(&mut client, |u| u.is_empty()).await;

    let reset = json!({ "event": "applyFilter", "data": { "start_date": "", "end_date": "" } });
    client.send(Message::Text(reset.to_string())).await.unwrap();
    let update = next_update(&mut client, |u| u.len() == 1).await;
    assert_eq!(update.values, vec![4.0]);
}

#[tokio::test]
async fn garbage_frames_leave_settings_alone() {
    let (addr, state) = start().await;
    seed(&state, &[1.0]);

    let mut client = connect(addr).await;
    client.send(Message::Text("not json".into())).await.unwrap();
    let bad_filter = json!({ "event": "applyFilter", "data": { "start_date": "soon" } });
    client.send(Message::Text(bad_filter.to_string())).await.unwrap();

    // still connected and still unfiltered
    let update = next_update(&mut client, |u| !u.is_empty()).await;
    assert_eq!(update.values, vec![1.0]);
    assert!(state.view.read().await.filter.is_empty());
}

#[tokio::test]
async fn ping_is_answered_with_matching_pong() {
    let (addr, _) = start().await;
    let mut client = connect(addr).await;

    client.send(Message::Ping(b"still there?".to_vec())).await.unwrap();

    let wait = async {
        loop {
            match client.next().await.unwrap().unwrap() {
                Message::Pong(payload) => return payload,
                // pushes may arrive first
                Message::Text(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    };
    let payload = tokio::time::timeout(Duration::from_secs(5), wait).await.unwrap();
    assert_eq!(payload, b"still there?".to_vec());
}

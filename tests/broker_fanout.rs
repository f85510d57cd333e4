//! End-to-end relay tests against a real broker bound on loopback.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use live_relay::broker::{BoundAddrs, BrokerServer, BrokerState};
use live_relay::cancel::CancelSignal;
use live_relay::channel::{Dispatcher, Endpoint, WsConnector};
use live_relay::config::{BrokerConfig, ClientConfig};
use live_relay::error::RelayError;
use live_relay::protocol::{Envelope, Method, PeerRole, codec};
use live_relay::session::{ConnectionState, Locator, Session, SessionTiming};
use live_relay::tool::{ToolClient, ToolEvent};
use live_relay::unit::UnitId;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Running {
    addrs: BoundAddrs,
    state: BrokerState,
    shutdown: CancelSignal,
    served: JoinHandle<Result<(), RelayError>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.cancel();
        let stopped = tokio::time::timeout(Duration::from_secs(5), self.served).await;
        assert!(matches!(stopped, Ok(Ok(Ok(())))));
    }
}

fn any_addr() -> SocketAddr {
    let Ok(any) = "127.0.0.1:0".parse::<SocketAddr>() else {
        panic!("bad address");
    };
    any
}

async fn start_broker() -> Running {
    start_broker_on(any_addr()).await
}

async fn start_broker_on(loopback: SocketAddr) -> Running {
    let any = any_addr();
    let config = BrokerConfig {
        loopback_addr: loopback,
        lan_addr: any,
        discovery_addr: any,
        ..BrokerConfig::default()
    };
    let Ok(server) = BrokerServer::bind(&config).await else {
        panic!("broker failed to bind");
    };
    let Ok(addrs) = server.local_addrs() else {
        panic!("no local addresses");
    };
    let state = server.state().clone();
    let shutdown = CancelSignal::new();
    let served = tokio::spawn(server.serve(shutdown.clone()));
    Running {
        addrs,
        state,
        shutdown,
        served,
    }
}

async fn connect(addr: SocketAddr, role: &str) -> Socket {
    let url = format!("ws://{addr}/hub?role={role}");
    let Ok((socket, _)) = tokio_tungstenite::connect_async(url).await else {
        panic!("handshake failed");
    };
    socket
}

async fn wait_for_peers(state: &BrokerState, count: usize) {
    for _ in 0..200 {
        if state.registry.len().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("broker never reached {count} peers");
}

async fn send(socket: &mut Socket, envelope: &Envelope) {
    let Ok(json) = envelope.to_json() else {
        panic!("serialize failed");
    };
    if socket.send(Message::text(json)).await.is_err() {
        panic!("send failed");
    }
}

async fn recv(socket: &mut Socket) -> Option<Envelope> {
    let next = tokio::time::timeout(Duration::from_millis(500), socket.next()).await;
    match next {
        Ok(Some(Ok(Message::Text(text)))) => Envelope::from_json(text.as_str()).ok(),
        _ => None,
    }
}

fn unit(name: &str) -> UnitId {
    let Ok(unit) = name.parse() else {
        panic!("invalid unit");
    };
    unit
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn message_reaches_every_other_peer_but_not_the_sender() {
    let broker = start_broker().await;
    let mut tool = connect(broker.addrs.loopback, "tool").await;
    let mut app_b = connect(broker.addrs.loopback, "application").await;
    let mut app_c = connect(broker.addrs.lan, "application").await;
    wait_for_peers(&broker.state, 3).await;

    send(&mut tool, &Envelope::register_tool("session-1")).await;

    for app in [&mut app_b, &mut app_c] {
        let Some(envelope) = recv(app).await else {
            panic!("application did not receive the registration");
        };
        assert_eq!(envelope.method, Method::RegisterTool);
    }
    assert!(recv(&mut tool).await.is_none());

    let mut late = connect(broker.addrs.loopback, "application").await;
    wait_for_peers(&broker.state, 4).await;
    assert!(recv(&mut late).await.is_none());

    broker.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_frames_are_dropped() {
    let broker = start_broker().await;
    let mut tool = connect(broker.addrs.loopback, "tool").await;
    let mut app = connect(broker.addrs.loopback, "application").await;
    wait_for_peers(&broker.state, 2).await;

    assert!(tool.send(Message::text("not an envelope")).await.is_ok());
    assert!(recv(&mut app).await.is_none());

    send(&mut tool, &Envelope::unregister_tool("session-1")).await;
    let Some(envelope) = recv(&mut app).await else {
        panic!("connection should survive a malformed frame");
    };
    assert_eq!(envelope.method, Method::UnregisterTool);

    broker.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_reports_peer_counts() {
    let broker = start_broker().await;
    let _tool = connect(broker.addrs.loopback, "tool").await;
    let _app = connect(broker.addrs.lan, "application").await;
    wait_for_peers(&broker.state, 2).await;

    let url = format!("http://{}/health", broker.addrs.loopback);
    let Ok(response) = reqwest::get(url).await else {
        panic!("health request failed");
    };
    assert!(response.status().is_success());
    let Ok(body) = response.json::<serde_json::Value>().await else {
        panic!("health body is not json");
    };
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["peers"], 2);
    assert_eq!(body["tools"], 1);
    assert_eq!(body["applications"], 1);

    broker.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tool_client_round_trip_through_broker() {
    let broker = start_broker().await;
    let mut app = connect(broker.addrs.loopback, "application").await;
    wait_for_peers(&broker.state, 1).await;

    let config = ClientConfig {
        loopback_port: broker.addrs.loopback.port(),
        pid_file: std::env::temp_dir().join(format!("live-relay-it-{}.pid", uuid::Uuid::new_v4())),
        ..ClientConfig::default()
    };
    let tool = ToolClient::new(&config);
    let mut events = tool.subscribe();
    assert!(tool.start().await.is_ok());

    let Some(registration) = recv(&mut app).await else {
        panic!("expected register-tool");
    };
    assert_eq!(registration.method, Method::RegisterTool);

    assert!(tool.push_page(&unit("Views.Home"), "<Home/>", true).await.is_ok());
    let Some(push) = recv(&mut app).await else {
        panic!("expected push-page");
    };
    assert_eq!(push.method, Method::PushPage);
    let markup = push.bytes(1).ok().and_then(|b| codec::decompress_text(b).ok());
    assert_eq!(markup.as_deref(), Some("<Home/>"));

    send(&mut app, &Envelope::page_visible(&unit("Views.Home"))).await;
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv()).await;
    let Ok(Ok(ToolEvent::PageVisible { unit, .. })) = event else {
        panic!("expected page-visible event");
    };
    assert_eq!(unit, "Views.Home");

    tool.stop().await;
    let Some(farewell) = recv(&mut app).await else {
        panic!("expected unregister-tool");
    };
    assert_eq!(farewell.method, Method::UnregisterTool);

    broker.shutdown.cancel();
}

fn ws_session(role: PeerRole, peer_id: &str, addr: SocketAddr) -> Session {
    Session::new(
        role,
        peer_id,
        Locator::Fixed(Endpoint::new(addr, "/hub")),
        Arc::new(WsConnector::default()),
        Arc::new(Dispatcher::new()),
        SessionTiming {
            retry_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(200),
        },
    )
}

async fn reach(session: &Session, state: ConnectionState) {
    let reached = tokio::time::timeout(Duration::from_secs(5), session.wait_for_state(state)).await;
    assert!(reached.is_ok(), "session never reached {state}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sessions_reconnect_to_a_restarted_broker() {
    let first = start_broker().await;
    let loopback = first.addrs.loopback;
    let tool = ws_session(PeerRole::Tool, "session-1", loopback);
    let app = ws_session(PeerRole::Application, "RXID-1", loopback);
    assert!(tool.connect().await.is_ok());
    assert!(app.connect().await.is_ok());
    assert_eq!(tool.state(), ConnectionState::Connected);
    assert_eq!(app.state(), ConnectionState::Connected);
    wait_for_peers(&first.state, 2).await;

    first.stop().await;
    reach(&tool, ConnectionState::Reconnecting).await;
    reach(&app, ConnectionState::Reconnecting).await;

    // The first probe after the drop fails fast; the next one is a full
    // retry interval away, which leaves room to attach an observer.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let second = start_broker_on(loopback).await;
    let mut observer = connect(loopback, "application").await;

    reach(&tool, ConnectionState::Connected).await;
    reach(&app, ConnectionState::Connected).await;

    let mut announced = Vec::new();
    for _ in 0..2 {
        let next = tokio::time::timeout(Duration::from_secs(3), observer.next()).await;
        let Ok(Some(Ok(Message::Text(text)))) = next else {
            panic!("expected a reconnection announcement");
        };
        let Ok(envelope) = Envelope::from_json(text.as_str()) else {
            panic!("announcement is not an envelope");
        };
        announced.push(envelope);
    }
    let Some(registration) = announced.iter().find(|e| e.method == Method::RegisterTool) else {
        panic!("tool did not register again");
    };
    assert_eq!(registration.text(0).ok(), Some("session-1"));
    assert!(announced.iter().any(|e| e.method == Method::ToolRestored));

    tool.close().await;
    app.close().await;
    second.stop().await;
}

//! End-to-end tests of the supervisor against a scripted loopback gateway
//!
//! The gateway is a real UDP socket on 127.0.0.1 that answers handshakes with
//! a fixed parameter string and reports everything it receives. Interfaces
//! come from a mock provider so no privileges are needed.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;
use wicket_engine::{
    ChannelEventHandler, Config, InterfaceProvider, InterfaceRequest, Result, Supervisor,
    TimingConfig, TunnelConfig, VpnEvent, VpnState,
};
use wicket_protocol::transport::mock::{MockInterface, MockInterfaceHandle};
use wicket_protocol::{wire, Datagram, VirtualInterface};

const SECRET: &str = "test";
const WAIT: Duration = Duration::from_secs(5);

/// What the gateway saw
#[derive(Debug, PartialEq, Eq)]
enum Seen {
    Handshake,
    Keepalive,
    Data(Vec<u8>),
}

struct Gateway {
    socket: Arc<UdpSocket>,
    seen: mpsc::UnboundedReceiver<Seen>,
    peer: Arc<Mutex<Option<SocketAddr>>>,
}

impl Gateway {
    /// Start a gateway that answers handshakes with `params` (or stays silent
    /// when `None`) and echoes keepalives when `echo_keepalives` is set
    async fn start(params: Option<&'static str>, echo_keepalives: bool) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let (tx, seen) = mpsc::unbounded_channel();
        let peer = Arc::new(Mutex::new(None));

        let rx_socket = socket.clone();
        let rx_peer = peer.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65536];
            while let Ok((n, from)) = rx_socket.recv_from(&mut buf).await {
                *rx_peer.lock().unwrap() = Some(from);
                let seen = match Datagram::classify(&buf[..n]) {
                    Some(Datagram::Control(b"")) => {
                        if echo_keepalives {
                            let _ = rx_socket.send_to(&wire::KEEPALIVE, from).await;
                        }
                        Seen::Keepalive
                    }
                    Some(Datagram::Control(secret)) if secret == SECRET.as_bytes() => {
                        if let Some(params) = params {
                            let _ = rx_socket.send_to(&wire::handshake_response(params), from).await;
                        }
                        Seen::Handshake
                    }
                    Some(Datagram::Control(_)) | None => continue,
                    Some(Datagram::Data(packet)) => Seen::Data(packet.to_vec()),
                };
                if tx.send(seen).is_err() {
                    break;
                }
            }
        });

        Self { socket, seen, peer }
    }

    fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    async fn next(&mut self) -> Seen {
        timeout(WAIT, self.seen.recv())
            .await
            .expect("gateway saw nothing")
            .expect("gateway stopped")
    }

    /// Wait for the next datagram other than handshakes and keepalives
    async fn next_data(&mut self) -> Vec<u8> {
        loop {
            if let Seen::Data(packet) = self.next().await {
                return packet;
            }
        }
    }

    async fn send_to_client(&self, datagram: &[u8]) {
        let peer = self.peer.lock().unwrap().expect("no client yet");
        self.socket.send_to(datagram, peer).await.unwrap();
    }
}

#[derive(Default)]
struct MockProvider {
    handles: Mutex<Vec<MockInterfaceHandle>>,
    requests: Mutex<Vec<InterfaceRequest>>,
    /// For each establish, how many earlier interfaces were still alive
    live_before: Mutex<Vec<usize>>,
}

impl MockProvider {
    fn take_handle(&self, index: usize) -> MockInterfaceHandle {
        let mut handles = self.handles.lock().unwrap();
        assert!(handles.len() > index, "interface {} was never created", index);
        handles.remove(index)
    }
}

#[async_trait]
impl InterfaceProvider for MockProvider {
    fn check_application(&self, id: &str) -> bool {
        !id.starts_with("missing.")
    }

    async fn establish(&self, request: InterfaceRequest) -> Result<Box<dyn VirtualInterface>> {
        let (iface, handle) = MockInterface::new("tun-mock");
        let mut handles = self.handles.lock().unwrap();
        let live = handles.iter().filter(|h| !h.is_released()).count();
        self.live_before.lock().unwrap().push(live);
        handles.push(handle);
        drop(handles);
        self.requests.lock().unwrap().push(request);
        Ok(Box::new(iface))
    }
}

fn fast_config(port: u16) -> Config {
    let mut config = Config::new(TunnelConfig::new("127.0.0.1", port, SECRET));
    config.timing = TimingConfig {
        idle_interval_ms: 20,
        keepalive_interval_secs: 1,
        receive_timeout_secs: 2,
        handshake_attempts: 10,
        handshake_sends: 3,
        reconnect_delay_secs: 1,
        max_attempts: 3,
    };
    config
}

fn ipv4_packet(tag: u8) -> Vec<u8> {
    vec![0x45, 0x00, 0x00, 0x15, tag, 0, 0, 0, 64, 17, 0, 0, 10, 0, 0, 2, 10, 0, 0, 1, tag]
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<VpnEvent>) -> VpnEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("no event")
        .expect("event channel closed")
}

fn supervisor(provider: Arc<MockProvider>) -> (Supervisor, mpsc::UnboundedReceiver<VpnEvent>) {
    let (events, rx) = ChannelEventHandler::channel();
    let supervisor = Supervisor::builder(provider)
        .event_handler(Arc::new(events))
        .build();
    (supervisor, rx)
}

#[tokio::test]
async fn test_connect_relay_and_disconnect() {
    let mut gateway = Gateway::start(Some("m,1400 a,10.0.0.2,24 r,0.0.0.0,0 d,8.8.8.8"), true).await;
    let provider = Arc::new(MockProvider::default());
    let (supervisor, mut events) = supervisor(provider.clone());

    let config = fast_config(gateway.port());
    let tunnel = config.tunnel.clone().with_applications(true, ["com.example", "missing.app"]);
    let config = Config { tunnel, ..config };

    let id = supervisor.connect(config).await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        VpnEvent::Connecting {
            id,
            server: "127.0.0.1".into()
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        VpnEvent::Connected {
            id,
            interface: "tun-mock".into()
        }
    );
    assert_eq!(supervisor.status().await, VpnState::Connected);

    {
        let requests = provider.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.params.mtu, Some(1400));
        assert_eq!(request.session, "127.0.0.1");
        assert_eq!(request.applications.applications, vec!["com.example".to_string()]);
    }

    let mut host = provider.take_handle(0);

    // Interface to gateway
    host.inject(ipv4_packet(1));
    assert_eq!(gateway.next_data().await, ipv4_packet(1));

    // Gateway to interface; control datagrams are dropped on the way
    gateway.send_to_client(&[0, 1, 2]).await;
    gateway.send_to_client(&ipv4_packet(2)).await;
    let delivered = timeout(WAIT, host.next_delivered()).await.unwrap();
    assert_eq!(delivered, Some(ipv4_packet(2)));

    supervisor.disconnect().await;
    assert!(matches!(next_event(&mut events).await, VpnEvent::Disconnected { .. }));
    assert!(host.is_closed());
    assert_eq!(supervisor.status().await, VpnState::Disconnected);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_superseded_attempt_never_connects() {
    let silent = Gateway::start(None, false).await;
    let live = Gateway::start(Some("m,1400 a,10.0.0.2,24"), true).await;
    let provider = Arc::new(MockProvider::default());
    let (supervisor, mut events) = supervisor(provider.clone());

    let first = supervisor.connect(fast_config(silent.port())).await.unwrap();
    let second = supervisor.connect(fast_config(live.port())).await.unwrap();
    assert!(second > first);

    assert!(matches!(next_event(&mut events).await, VpnEvent::Connecting { id, .. } if id == first));
    assert!(matches!(next_event(&mut events).await, VpnEvent::Connecting { id, .. } if id == second));
    assert!(matches!(next_event(&mut events).await, VpnEvent::Connected { id, .. } if id == second));

    // Long enough for the first attempt to have exhausted its handshake
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(supervisor.established_id().await, Some(second));
    assert_eq!(provider.handles.lock().unwrap().len(), 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_malformed_parameters_end_connection() {
    let mut gateway = Gateway::start(Some("m,1400 a,10.0.0.2,notanumber"), false).await;
    let provider = Arc::new(MockProvider::default());
    let (supervisor, mut events) = supervisor(provider.clone());

    supervisor.connect(fast_config(gateway.port())).await.unwrap();
    assert!(matches!(next_event(&mut events).await, VpnEvent::Connecting { .. }));

    match next_event(&mut events).await {
        VpnEvent::Disconnected { reason } => assert!(reason.contains("notanumber"), "{}", reason),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(supervisor.status().await, VpnState::Disconnected);
    assert!(provider.handles.lock().unwrap().is_empty());

    // One handshake burst and no retry
    for _ in 0..3 {
        assert_eq!(gateway.next().await, Seen::Handshake);
    }
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(gateway.seen.try_recv().is_err());
}

#[tokio::test]
async fn test_silent_gateway_triggers_reconnect() {
    // Answers handshakes but never keepalives, so the relay times out
    let mut gateway = Gateway::start(Some("m,1400 a,10.0.0.2,24"), false).await;
    let provider = Arc::new(MockProvider::default());
    let (supervisor, mut events) = supervisor(provider.clone());

    let id = supervisor.connect(fast_config(gateway.port())).await.unwrap();
    assert!(matches!(next_event(&mut events).await, VpnEvent::Connecting { .. }));
    assert!(matches!(next_event(&mut events).await, VpnEvent::Connected { .. }));

    for _ in 0..3 {
        assert_eq!(gateway.next().await, Seen::Handshake);
    }
    // Keepalives from 1 s, receive timeout at 2 s, new handshake 1 s later
    let mut keepalives = 0;
    loop {
        match gateway.next().await {
            Seen::Keepalive => keepalives += 1,
            Seen::Handshake => break,
            Seen::Data(packet) => panic!("unexpected data: {:?}", packet),
        }
    }
    assert!(keepalives >= 3, "{}", keepalives);
    for _ in 0..2 {
        assert_eq!(gateway.next().await, Seen::Handshake);
    }

    // Same connection re-established with a fresh interface
    assert!(matches!(next_event(&mut events).await, VpnEvent::Connected { id: again, .. } if again == id));
    assert_eq!(supervisor.established_id().await, Some(id));
    {
        let handles = provider.handles.lock().unwrap();
        assert_eq!(handles.len(), 2);
        assert!(handles[0].is_closed());
        assert!(handles[0].is_released());
        assert!(!handles[1].is_closed());
    }
    // The first interface was gone before the second one was created
    assert_eq!(*provider.live_before.lock().unwrap(), vec![0, 0]);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_when_idle_is_noop() {
    let provider = Arc::new(MockProvider::default());
    let (supervisor, mut events) = supervisor(provider);

    supervisor.disconnect().await;
    supervisor.disconnect().await;
    assert!(events.try_recv().is_err());
    assert_eq!(supervisor.status().await, VpnState::Disconnected);
}

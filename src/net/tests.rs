use super::*;
use crate::id::Id;
use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::thread;
use std::time::{Duration, Instant};

/// Hands out one byte per call, reporting `WouldBlock` in between.
struct Trickle<'a> {
    data: &'a [u8],
    pos: usize,
    blocked: bool,
}

impl<'a> Trickle<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            blocked: false,
        }
    }
}

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.blocked {
            self.blocked = false;
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.blocked = true;
        if self.pos == self.data.len() || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.data[self.pos];
        self.pos += 1;
        Ok(1)
    }
}

/// Accepts one byte per call, reporting `WouldBlock` in between.
#[derive(Default)]
struct Sink {
    data: Vec<u8>,
    blocked: bool,
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.blocked {
            self.blocked = false;
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.blocked = true;
        self.data.push(buf[0]);
        Ok(1)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn frame(nonce: Id, tag: Tag, payload: &[u8]) -> Vec<u8> {
    let header = Header {
        nonce,
        tag,
        length: payload.len() as u16,
    };
    let mut out = header.encode().to_vec();
    out.extend_from_slice(payload);
    out
}

fn receive_all<R: Read>(event: &mut Event, reader: &mut R) -> Progress {
    for _ in 0..100_000 {
        match event.receive(reader).unwrap() {
            Progress::Pending => continue,
            done => return done,
        }
    }
    panic!("frame never completed");
}

fn loopback() -> Host {
    Host::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
}

fn small_config() -> NetworkConfig {
    NetworkConfig {
        inbound_buffers: 8,
        outbound_buffers: 8,
        buffer_size: 1024,
        ..NetworkConfig::default()
    }
}

fn poll_until(network: &Network, deadline: Duration) -> Option<EventHandle> {
    let start = Instant::now();
    while start.elapsed() < deadline {
        match network.poll() {
            Ok(Some(handle)) => return Some(handle),
            Ok(None) | Err(NetError::TryAgain) => thread::sleep(Duration::from_millis(5)),
            Err(e) => panic!("poll failed: {}", e),
        }
    }
    None
}

// ============================================================================
// Host
// ============================================================================

#[test]
fn test_host_display() {
    let mut none = Host::UNSPECIFIED;
    none.port = 12345;
    assert_eq!(none.to_string(), "?/? ?:12345");

    let v4 = Host::new(IpAddr::V4(Ipv4Addr::new(192, 168, 2, 3)), 60543);
    assert_eq!(v4.to_string(), "IPv4/TCP 192.168.2.3:60543");

    let v6 = Host::new(
        IpAddr::V6("fde4:8dba:82e1:f1f2:f3f4:1526:3748:5960".parse().unwrap()),
        22345,
    );
    assert_eq!(
        v6.to_string(),
        "IPv6/TCP [fde4:8dba:82e1:f1f2:f3f4:1526:3748:5960]:22345"
    );

    let compressed = Host::new(IpAddr::V6("fde4:8dba:8200::3748:5960".parse().unwrap()), 1);
    assert_eq!(compressed.to_string(), "IPv6/TCP [fde4:8dba:8200::3748:5960]:1");
}

#[test]
fn test_host_parse() {
    let host: Host = "IPv4/TCP 127.0.0.1:19002".parse().unwrap();
    assert_eq!(host, Host::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 19002));

    let host: Host = "ipv6/tcp [::1]:19002".parse().unwrap();
    assert_eq!(host, Host::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 19002));

    // Protocol guessed from brackets, transport and port defaulted.
    let host: Host = "  [::1] ".parse().unwrap();
    assert_eq!(host.internet, Internet::Ipv6);
    assert_eq!(host.transport, Transport::Tcp);
    assert_eq!(host.port, 0);

    let host: Host = "10.0.0.1:80".parse().unwrap();
    assert_eq!(host.internet, Internet::Ipv4);
    assert_eq!(&host.address[..4], &[10, 0, 0, 1]);
    assert_eq!(host.port, 80);

    // Omitted address.
    let host: Host = "IPv6/TCP [::]:0".parse().unwrap();
    assert_eq!(host.address, [0u8; ADDRESS_SIZE]);
    let host: Host = "IPv4 :8080".parse().unwrap();
    assert_eq!(host.address, [0u8; ADDRESS_SIZE]);
    assert_eq!(host.port, 8080);

    let host: Host = "none/none".parse().unwrap();
    assert_eq!(host, Host::UNSPECIFIED);
}

#[test]
fn test_host_parse_errors() {
    assert!(matches!(
        "IPv4/UDP 1.2.3.4".parse::<Host>(),
        Err(HostParseError::UnknownTransport(_))
    ));
    assert!(matches!(
        "IPv4 1.2.3".parse::<Host>(),
        Err(HostParseError::InvalidAddress { .. })
    ));
    assert!(matches!(
        "1.2.3.4:99999".parse::<Host>(),
        Err(HostParseError::InvalidPort(_))
    ));
    assert!(matches!(
        "1.2.3.4:80 extra".parse::<Host>(),
        Err(HostParseError::TrailingInput(_))
    ));
}

#[test]
fn test_host_parse_rejects_unterminated_bracket() {
    assert_eq!(
        "[::1:5".parse::<Host>(),
        Err(HostParseError::InvalidAddress {
            internet: "IPv6",
            text: "[::1:5".to_string(),
        })
    );
    assert!(matches!(
        "IPv6/TCP [::1 :19002".parse::<Host>(),
        Err(HostParseError::InvalidAddress { .. })
    ));
    assert!("[::1]:5".parse::<Host>().is_ok());
}

#[test]
fn test_host_display_parses_back() {
    for text in ["IPv4/TCP 127.0.0.1:19002", "IPv6/TCP [::1]:19002", "IPv6/TCP [::]:0"] {
        let host: Host = text.parse().unwrap();
        assert_eq!(host.to_string(), text);
    }
}

#[test]
fn test_host_wire_encoding() {
    let host = Host::new(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 0x1234);
    let mut buf = BytesMut::new();
    host.encode(&mut buf);
    assert_eq!(buf.len(), HOST_WIRE_SIZE);
    assert_eq!(&buf[..6], &[1, 1, 1, 2, 3, 4]);
    assert_eq!(&buf[HOST_WIRE_SIZE - 2..], &[0x12, 0x34]);

    let mut bytes = &buf[..];
    assert_eq!(Host::decode(&mut bytes).unwrap(), host);

    let mut short = &buf[..HOST_WIRE_SIZE - 1];
    assert_eq!(Host::decode(&mut short), Err(HostParseError::Truncated));

    buf[0] = 9;
    let mut bad = &buf[..];
    assert_eq!(Host::decode(&mut bad), Err(HostParseError::UnknownProtocol(9)));
}

#[test]
fn test_host_socket_addr() {
    let addr: SocketAddr = "[::1]:4000".parse().unwrap();
    let host = Host::from(addr);
    assert_eq!(host.socket_addr(), Some(addr));
    assert_eq!(Host::UNSPECIFIED.socket_addr(), None);
    assert!(Host::UNSPECIFIED.is_unspecified());
}

// ============================================================================
// Framing
// ============================================================================

#[test]
fn test_tag_names() {
    assert_eq!(Tag::NONE.name(), "NONE");
    assert_eq!(Tag::FIND_NODE.name(), "FIND_NODE");
    assert_eq!(Tag::VALUE.name(), "VALUE");
    assert_eq!(Tag(9).name(), "Unknown");
    assert_eq!(Tag::PONG.to_string(), "PONG");
}

#[test]
fn test_header_layout() {
    let nonce = Id::hash(b"nonce");
    let bytes = Header {
        nonce,
        tag: Tag::PING,
        length: 0x0102,
    }
    .encode();

    assert_eq!(bytes.len(), HEADER_SIZE);
    assert_eq!(&bytes[..crate::constants::ID_BYTES], nonce.as_bytes());
    assert_eq!(&bytes[HEADER_SIZE - 4..], &[0x00, 0x05, 0x01, 0x02]);

    let header = Header::decode(&bytes);
    assert_eq!(header.nonce, nonce);
    assert_eq!(header.tag, Tag::PING);
    assert_eq!(header.length, 0x0102);
}

#[test]
fn test_receive_one_byte_at_a_time() {
    let nonce = Id::random();
    let data = frame(nonce, Tag::STORE, b"some payload");
    let mut reader = Trickle::new(&data);
    let mut event = Event::new(1024);

    assert_eq!(receive_all(&mut event, &mut reader), Progress::Complete);
    assert_eq!(event.kind(), EventKind::Message);
    assert_eq!(event.nonce(), nonce);
    assert_eq!(event.tag(), Tag::STORE);
    assert_eq!(event.payload(), b"some payload");
}

#[test]
fn test_receive_empty_payload() {
    let data = frame(Id::ZERO, Tag::PING, b"");
    let mut event = Event::new(1024);
    assert_eq!(event.receive(&mut &data[..]).unwrap(), Progress::Complete);
    assert!(event.payload().is_empty());
}

#[test]
fn test_receive_clamps_oversized_length() {
    let mut data = frame(Id::ZERO, Tag::VALUE, b"");
    let len = data.len();
    data[len - 2..].copy_from_slice(&0xFFFFu16.to_be_bytes());
    data.extend_from_slice(b"trailing");

    let mut event = Event::new(HEADER_SIZE + 16);
    let mut reader = &data[..];
    assert_eq!(event.receive(&mut reader).unwrap(), Progress::Complete);
    assert!(event.payload().is_empty());
    assert_eq!(reader, b"trailing");
}

#[test]
fn test_receive_eof() {
    let mut event = Event::new(1024);
    let mut empty: &[u8] = &[];
    assert_eq!(event.receive(&mut empty).unwrap(), Progress::Closed);

    let data = frame(Id::ZERO, Tag::PING, b"abc");
    let mut event = Event::new(1024);
    let mut truncated = &data[..data.len() - 1];
    let err = event.receive(&mut truncated).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

    let report = event.report(Failure::from(&err));
    assert_eq!(report.tag, Tag::PING);
    assert_eq!(report.nonce, Some(Id::ZERO));
}

#[test]
fn test_failure_before_header_has_no_nonce() {
    let data = frame(Id::random(), Tag::PING, b"");
    let mut event = Event::new(1024);
    let mut partial = &data[..5];
    assert!(event.receive(&mut partial).is_err());

    let report = event.report(Failure::Closed);
    assert_eq!(report.nonce, None);
    assert_eq!(report.tag, Tag::NONE);
}

#[test]
fn test_transmit_one_byte_at_a_time() {
    let mut message = Message::new(1024);
    message.reset(Instant::now());
    message.nonce = Id::hash(b"n");
    message.tag = Tag::FIND_NODE;
    message.write(b"hello ").unwrap();
    message.write(b"world").unwrap();

    let mut sink = Sink::default();
    let mut passes = 0;
    while message.transmit(&mut sink).unwrap() == Progress::Pending {
        passes += 1;
    }
    assert!(passes > HEADER_SIZE);
    assert_eq!(sink.data, frame(Id::hash(b"n"), Tag::FIND_NODE, b"hello world"));

    // Decoding what was written gives the message back.
    let mut event = Event::new(1024);
    let mut reader = Trickle::new(&sink.data);
    assert_eq!(receive_all(&mut event, &mut reader), Progress::Complete);
    assert_eq!(event.nonce(), message.nonce);
    assert_eq!(event.payload(), message.payload());
}

#[test]
fn test_message_payload_limit() {
    let mut message = Message::new(HEADER_SIZE + 4);
    message.write(b"abcd").unwrap();
    assert_eq!(message.remaining(), 0);
    assert!(matches!(
        message.write(b"e"),
        Err(NetError::PayloadTooLarge { size: 5, limit: 4 })
    ));
    assert_eq!(message.payload(), b"abcd");

    message.clear();
    assert_eq!(message.remaining(), 4);
}

#[test]
fn test_write_zero_is_an_error() {
    let mut message = Message::new(1024);
    let mut full: &mut [u8] = &mut [];
    let err = message.transmit(&mut full).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::WriteZero);
}

// ============================================================================
// Server
// ============================================================================

#[test]
fn test_server_open_resolves_port() {
    let mut server = Server::open(&loopback(), 8).unwrap();
    let interface = server.interface();
    assert_eq!(interface.internet, Internet::Ipv4);
    assert_eq!(interface.transport, Transport::Tcp);
    assert_ne!(interface.port, 0);

    server.close();
    assert!(!server.is_open());
}

#[test]
fn test_server_rejects_cross_protocol_connect() {
    let mut server = Server::open(&loopback(), 8).unwrap();
    let v6 = Host::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 1);
    assert!(matches!(
        server.connect(&v6),
        Err(NetError::NotCompatible { .. })
    ));
    assert!(server.is_empty());
}

#[test]
fn test_server_accepts_pending_connections() {
    let mut listening = Server::open(&loopback(), 8).unwrap();
    let mut dialing = Server::open(&loopback(), 8).unwrap();
    let target = listening.interface();

    dialing.connect(&target).unwrap();
    dialing.connect(&target).unwrap();

    let start = Instant::now();
    let mut accepted = 0;
    while accepted < 2 && start.elapsed() < Duration::from_secs(5) {
        if listening.poll_readable().unwrap().listener {
            accepted += listening.accept().unwrap();
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(accepted, 2);
    assert_eq!(listening.len(), 2);
}

#[test]
fn test_server_reaps_idle_watched_sockets() {
    let mut listening = Server::open(&loopback(), 8).unwrap();
    let mut dialing = Server::open(&loopback(), 8).unwrap();
    let socket = dialing.connect(&listening.interface()).unwrap();

    assert_eq!(dialing.reap_idle(Duration::ZERO), 0);
    dialing.watch(socket, true);
    assert_eq!(dialing.reap_idle(Duration::ZERO), 1);
    assert!(!dialing.contains(socket));

    listening.close();
}

// ============================================================================
// Network
// ============================================================================

#[test]
fn test_poll_idle_network() {
    let network = Network::open(loopback(), &small_config()).unwrap();
    assert!(matches!(network.poll(), Ok(None)));
}

#[test]
fn test_poll_try_again_while_busy() {
    let network = Network::open(loopback(), &small_config()).unwrap();
    let guard = network.io.lock();
    assert!(matches!(network.poll(), Err(NetError::TryAgain)));
    drop(guard);
    assert!(matches!(network.poll(), Ok(None)));
}

#[test]
fn test_outbound_pool_exhaustion() {
    let network = Network::open(loopback(), &small_config()).unwrap();
    let handles: Vec<_> = (0..8).map(|_| network.new_message().unwrap()).collect();
    assert!(matches!(
        network.new_message(),
        Err(NetError::PoolExhausted(_))
    ));

    network.discard_message(handles[0]);
    assert!(network.new_message().is_ok());
    assert!(network.message(handles[0]).is_none());
}

#[test]
fn test_ping_and_pong_share_a_nonce() {
    let a = Network::open(loopback(), &small_config()).unwrap();
    let b = Network::open(loopback(), &small_config()).unwrap();
    let nonce = Id::random();

    let ping = a.new_message().unwrap();
    {
        let mut message = a.message(ping).unwrap();
        message.nonce = nonce;
        message.tag = Tag::PING;
        message.receiver = b.interface();
        message.write(b"ping").unwrap();
    }
    a.send(ping).unwrap();

    let start = Instant::now();
    let mut request = None;
    while request.is_none() && start.elapsed() < Duration::from_secs(5) {
        let _ = a.poll();
        request = b.poll().ok().flatten();
        thread::sleep(Duration::from_millis(2));
    }
    let request = request.expect("B never received the PING");
    {
        let event = b.event(request).unwrap();
        assert_eq!(event.kind(), EventKind::Message);
        assert_eq!(event.tag(), Tag::PING);
        assert_eq!(event.nonce(), nonce);
        assert_eq!(event.payload(), b"ping");
        assert_eq!(event.host().address, a.interface().address);
    }

    let pong = b.new_response(request).unwrap();
    {
        let mut message = b.message(pong).unwrap();
        assert_eq!(message.nonce, nonce);
        message.tag = Tag::PONG;
    }
    b.send(pong).unwrap();
    b.free_event(request);

    let start = Instant::now();
    let mut reply = None;
    while reply.is_none() && start.elapsed() < Duration::from_secs(5) {
        let _ = b.poll();
        reply = a.poll().ok().flatten();
        thread::sleep(Duration::from_millis(2));
    }
    let reply = reply.expect("A never received the PONG");
    {
        let event = a.event(reply).unwrap();
        assert_eq!(event.kind(), EventKind::Message);
        assert_eq!(event.tag(), Tag::PONG);
        assert_eq!(event.nonce(), nonce);
    }
    a.free_event(reply);
}

#[test]
fn test_unreachable_peer_yields_error_event() {
    let a = Network::open(loopback(), &small_config()).unwrap();
    let closed = {
        let b = Network::open(loopback(), &small_config()).unwrap();
        let port = b.interface().port;
        b.close();
        port
    };

    let message = a.new_message().unwrap();
    {
        let mut m = a.message(message).unwrap();
        m.nonce = Id::hash(b"lost");
        m.tag = Tag::FIND_NODE;
        m.receiver = Host::new(IpAddr::V4(Ipv4Addr::LOCALHOST), closed);
    }
    a.send(message).unwrap();

    let handle = poll_until(&a, Duration::from_secs(5)).expect("no error event");
    let event = a.event(handle).unwrap();
    assert!(event.failure().is_some());
    assert_eq!(event.tag(), Tag::FIND_NODE);
    assert_eq!(event.nonce(), Id::hash(b"lost"));
    assert_eq!(event.host().port, closed);
}

fn outbound(network: &Network, nonce: Id, tag: Tag, receiver: Host, payload: &[u8]) {
    let handle = network.new_message().unwrap();
    {
        let mut message = network.message(handle).unwrap();
        message.nonce = nonce;
        message.tag = tag;
        message.receiver = receiver;
        message.write(payload).unwrap();
    }
    network.send(handle).unwrap();
}

#[test]
fn test_reset_after_request_reports_its_nonce() {
    let peer = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = peer.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut stream, _) = peer.accept().unwrap();
        let mut request = vec![0u8; HEADER_SIZE + 4];
        stream.read_exact(&mut request).unwrap();
        // Let the sender settle into waiting for the reply.
        thread::sleep(Duration::from_millis(100));
        let socket = socket2::Socket::from(stream);
        socket.set_linger(Some(Duration::ZERO)).unwrap();
    });

    let a = Network::open(loopback(), &small_config()).unwrap();
    let nonce = Id::hash(b"reset");
    let receiver = Host::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    outbound(&a, nonce, Tag::FIND_VALUE, receiver, b"key!");

    let handle = poll_until(&a, Duration::from_secs(5)).expect("no error event");
    server.join().unwrap();
    let event = a.event(handle).unwrap();
    assert_eq!(
        event.kind(),
        EventKind::Error(Failure::Io(io::ErrorKind::ConnectionReset))
    );
    assert_eq!(event.nonce(), nonce);
    assert_eq!(event.tag(), Tag::FIND_VALUE);
    assert_eq!(event.host().port, port);
}

#[test]
fn test_stalled_connect_times_out() {
    // A backlog of zero admits one connection; further SYNs are dropped.
    let listener = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None).unwrap();
    listener
        .bind(&SocketAddr::from((Ipv4Addr::LOCALHOST, 0)).into())
        .unwrap();
    listener.listen(0).unwrap();
    let target = listener.local_addr().unwrap().as_socket().unwrap();
    let _filler = std::net::TcpStream::connect(target).unwrap();
    thread::sleep(Duration::from_millis(50));

    let config = NetworkConfig {
        send_timeout: Duration::from_millis(200),
        ..small_config()
    };
    let a = Network::open(loopback(), &config).unwrap();
    let nonce = Id::hash(b"stalled connect");
    let receiver = Host::new(IpAddr::V4(Ipv4Addr::LOCALHOST), target.port());
    outbound(&a, nonce, Tag::PING, receiver, b"");

    let handle = poll_until(&a, Duration::from_secs(5)).expect("no timeout event");
    let event = a.event(handle).unwrap();
    assert_eq!(event.failure(), Some(Failure::Timeout));
    assert_eq!(event.nonce(), nonce);
    assert_eq!(event.tag(), Tag::PING);
    assert_eq!(event.host(), receiver);
}

#[test]
fn test_stalled_write_times_out() {
    // The peer never reads, so a large frame outgrows both kernel buffers.
    let listener = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None).unwrap();
    listener.set_recv_buffer_size(4096).unwrap();
    listener
        .bind(&SocketAddr::from((Ipv4Addr::LOCALHOST, 0)).into())
        .unwrap();
    listener.listen(8).unwrap();
    let target = listener.local_addr().unwrap().as_socket().unwrap();

    let config = NetworkConfig {
        buffer_size: 65_536,
        send_timeout: Duration::from_millis(300),
        send_buffer_size: Some(4096),
        ..small_config()
    };
    let a = Network::open(loopback(), &config).unwrap();
    let nonce = Id::hash(b"stalled write");
    let receiver = Host::new(IpAddr::V4(Ipv4Addr::LOCALHOST), target.port());
    outbound(&a, nonce, Tag::STORE, receiver, &vec![7u8; 60_000]);

    let handle = poll_until(&a, Duration::from_secs(5)).expect("no timeout event");
    let event = a.event(handle).unwrap();
    assert_eq!(event.failure(), Some(Failure::Timeout));
    assert_eq!(event.nonce(), nonce);
    assert_eq!(event.tag(), Tag::STORE);
    drop(listener);
}

#[test]
fn test_free_event_while_busy_defers_close() {
    let a = Network::open(loopback(), &small_config()).unwrap();
    let b = Network::open(loopback(), &small_config()).unwrap();
    outbound(&a, Id::hash(b"deferred"), Tag::PING, b.interface(), b"");

    let start = Instant::now();
    let mut request = None;
    while request.is_none() && start.elapsed() < Duration::from_secs(5) {
        let _ = a.poll();
        request = b.poll().ok().flatten();
        thread::sleep(Duration::from_millis(2));
    }
    let request = request.expect("B never received the PING");
    assert_eq!(b.io.lock().len(), 1);

    let guard = b.io.lock();
    b.free_event(request);
    assert_eq!(guard.len(), 1);
    drop(guard);

    assert!(matches!(b.poll(), Ok(None)));
    assert!(b.io.lock().is_empty());
}

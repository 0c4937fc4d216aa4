use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use super::error::NetError;
use super::frame::Tag;
use super::host::{Host, Internet, Transport};
use crate::id::Id;

/// Identifies one connection tracked by a [`Server`]. Never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl fmt::Debug for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Socket#{}", self.0)
    }
}

#[derive(Debug)]
struct Tracked {
    stream: TcpStream,
    peer: Host,
    /// Whether the socket is polled for inbound data.
    watch: bool,
    /// Nonce and tag of the request sent on this socket, if any.
    request: Option<(Id, Tag)>,
    last_active: Instant,
}

/// Sockets found ready by one readiness check.
#[derive(Debug, Default)]
pub struct ReadySet {
    pub listener: bool,
    sockets: HashSet<SocketId>,
}

impl ReadySet {
    pub fn contains(&self, socket: SocketId) -> bool {
        self.sockets.contains(&socket)
    }

    /// Removes `socket`, returning whether it was ready.
    pub fn take(&mut self, socket: SocketId) -> bool {
        self.sockets.remove(&socket)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = SocketId> + '_ {
        self.sockets.drain()
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.listener && self.sockets.is_empty()
    }
}

/// Owns the listening socket and every connection made through it.
///
/// All sockets are non-blocking. Readiness is discovered with a zero-timeout
/// `poll(2)`, so no method ever waits on the network.
#[derive(Debug)]
pub struct Server {
    listener: Option<TcpListener>,
    interface: Host,
    sockets: HashMap<SocketId, Tracked>,
    next_id: u64,
    send_buffer_size: Option<usize>,
}

impl Server {
    /// Binds and listens on `interface`.
    ///
    /// An unspecified internet or transport protocol becomes IPv6/TCP. The
    /// interface reported afterwards carries the address and port actually
    /// bound.
    pub fn open(interface: &Host, backlog: i32) -> Result<Self, NetError> {
        let mut requested = *interface;
        if requested.internet == Internet::None {
            requested.internet = Internet::Ipv6;
        }
        if requested.transport == Transport::None {
            requested.transport = Transport::Tcp;
        }
        let addr = requested
            .socket_addr()
            .ok_or(NetError::Unaddressable(requested))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog)?;

        let listener: TcpListener = socket.into();
        let bound = Host::from(listener.local_addr()?);

        Ok(Self {
            listener: Some(listener),
            interface: bound,
            sockets: HashMap::new(),
            next_id: 0,
            send_buffer_size: None,
        })
    }

    /// Closes the listener and every tracked socket.
    pub fn close(&mut self) {
        self.listener = None;
        self.sockets.clear();
    }

    pub fn is_open(&self) -> bool {
        self.listener.is_some()
    }

    pub fn interface(&self) -> Host {
        self.interface
    }

    /// Send buffer size requested for outbound connections. `None` leaves
    /// the system default.
    pub fn set_send_buffer_size(&mut self, size: Option<usize>) {
        self.send_buffer_size = size;
    }

    /// Accepts every pending inbound connection. Accepted sockets are
    /// watched for inbound data.
    pub fn accept(&mut self) -> Result<usize, NetError> {
        let Self {
            listener,
            sockets,
            next_id,
            ..
        } = self;
        let Some(listener) = listener else {
            return Ok(0);
        };

        let mut accepted = 0;
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(true)?;
                    let id = SocketId(*next_id);
                    *next_id += 1;
                    let peer = Host::from(peer);
                    debug!("Accepted {:?} from {}", id, peer);
                    sockets.insert(
                        id,
                        Tracked {
                            stream,
                            peer,
                            watch: true,
                            request: None,
                            last_active: Instant::now(),
                        },
                    );
                    accepted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(accepted)
    }

    /// Starts connecting to `host` without waiting for the handshake to
    /// finish. The socket becomes writable once connected.
    pub fn connect(&mut self, host: &Host) -> Result<SocketId, NetError> {
        if host.internet != self.interface.internet || host.transport != self.interface.transport {
            return Err(NetError::NotCompatible {
                host: *host,
                interface: self.interface,
            });
        }
        let addr = host.socket_addr().ok_or(NetError::Unaddressable(*host))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        match socket.connect(&addr.into()) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(Errno::EINPROGRESS as i32) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }

        let id = self.track(socket.into(), *host);
        debug!("Connecting {:?} to {}", id, host);
        Ok(id)
    }

    fn track(&mut self, stream: TcpStream, peer: Host) -> SocketId {
        let id = SocketId(self.next_id);
        self.next_id += 1;
        self.sockets.insert(
            id,
            Tracked {
                stream,
                peer,
                watch: false,
                request: None,
                last_active: Instant::now(),
            },
        );
        id
    }

    /// Stops tracking `socket` and closes it.
    pub fn close_socket(&mut self, socket: SocketId) -> bool {
        self.sockets.remove(&socket).is_some()
    }

    pub fn contains(&self, socket: SocketId) -> bool {
        self.sockets.contains_key(&socket)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Address of the remote end of `socket`, as known when it was
    /// accepted or connected. Stays available after the peer hangs up.
    pub fn resolve_peer(&self, socket: SocketId) -> io::Result<Host> {
        let tracked = self.sockets.get(&socket).ok_or(io::ErrorKind::NotConnected)?;
        Ok(tracked.peer)
    }

    /// Stream of `socket`, marking it active.
    pub fn stream(&mut self, socket: SocketId) -> Option<&mut TcpStream> {
        let tracked = self.sockets.get_mut(&socket)?;
        tracked.last_active = Instant::now();
        Some(&mut tracked.stream)
    }

    pub fn watch(&mut self, socket: SocketId, watch: bool) {
        if let Some(tracked) = self.sockets.get_mut(&socket) {
            tracked.watch = watch;
            tracked.last_active = Instant::now();
        }
    }

    /// Watches `socket` for the reply to the request identified by `nonce`
    /// and `tag`, which has just been sent on it.
    pub fn await_reply(&mut self, socket: SocketId, nonce: Id, tag: Tag) {
        if let Some(tracked) = self.sockets.get_mut(&socket) {
            tracked.watch = true;
            tracked.request = Some((nonce, tag));
            tracked.last_active = Instant::now();
        }
    }

    /// Nonce and tag of the request last sent on `socket`.
    pub fn request(&self, socket: SocketId) -> Option<(Id, Tag)> {
        self.sockets.get(&socket)?.request
    }

    pub fn shutdown_write(&mut self, socket: SocketId) -> io::Result<()> {
        let tracked = self.sockets.get(&socket).ok_or(io::ErrorKind::NotConnected)?;
        tracked.stream.shutdown(Shutdown::Write)
    }

    /// Closes watched sockets that have seen no activity for `timeout`.
    pub fn reap_idle(&mut self, timeout: Duration) -> usize {
        let now = Instant::now();
        let before = self.sockets.len();
        self.sockets.retain(|id, tracked| {
            let idle = tracked.watch && now.duration_since(tracked.last_active) >= timeout;
            if idle {
                debug!("Closing idle {:?}", id);
            }
            !idle
        });
        before - self.sockets.len()
    }

    /// Checks the listener and every watched socket for inbound data.
    pub fn poll_readable(&self) -> Result<ReadySet, NetError> {
        let mut fds = Vec::with_capacity(self.sockets.len() + 1);
        let mut ids = Vec::with_capacity(self.sockets.len());
        if let Some(listener) = &self.listener {
            fds.push(PollFd::new(listener.as_fd(), PollFlags::POLLIN));
        }
        for (id, tracked) in &self.sockets {
            if tracked.watch {
                fds.push(PollFd::new(tracked.stream.as_fd(), PollFlags::POLLIN));
                ids.push(*id);
            }
        }

        let mut ready = ReadySet::default();
        if !poll_now(&mut fds)? {
            return Ok(ready);
        }

        let mut fds = fds.iter();
        if self.listener.is_some() {
            ready.listener = fds.next().is_some_and(|fd| is_ready(fd, PollFlags::POLLIN));
        }
        let mask = PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP;
        ready.sockets = ids
            .into_iter()
            .zip(fds)
            .filter(|(_, fd)| is_ready(fd, mask))
            .map(|(id, _)| id)
            .collect();
        Ok(ready)
    }

    /// Checks every tracked socket for outbound space. A socket that failed
    /// to connect reports ready, so the failure surfaces on the next write.
    pub fn poll_writable(&self) -> Result<ReadySet, NetError> {
        let (ids, mut fds): (Vec<SocketId>, Vec<PollFd<'_>>) = self
            .sockets
            .iter()
            .map(|(id, tracked)| (*id, PollFd::new(tracked.stream.as_fd(), PollFlags::POLLOUT)))
            .unzip();

        let mut ready = ReadySet::default();
        if !poll_now(&mut fds)? {
            return Ok(ready);
        }

        let mask = PollFlags::POLLOUT | PollFlags::POLLERR | PollFlags::POLLHUP;
        ready.sockets = ids
            .into_iter()
            .zip(fds.iter())
            .filter(|(_, fd)| is_ready(fd, mask))
            .map(|(id, _)| id)
            .collect();
        Ok(ready)
    }
}

fn is_ready(fd: &PollFd<'_>, mask: PollFlags) -> bool {
    fd.revents().is_some_and(|revents| revents.intersects(mask))
}

/// Zero-timeout `poll(2)`. Returns `false` if interrupted by a signal.
fn poll_now(fds: &mut [PollFd<'_>]) -> io::Result<bool> {
    if fds.is_empty() {
        return Ok(true);
    }
    match poll(fds, PollTimeout::ZERO) {
        Ok(_) => Ok(true),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::error::{Failure, FailureSink, NetError};
use super::event::{Message, Progress};
use super::server::{ReadySet, Server, SocketId};
use crate::pool::{Handle, IndexQueue, Pool, PoolRef};

/// Writes queued outbound messages to their receivers.
///
/// Connections are opened lazily on the first drive cycle that sees a
/// message. A message that cannot make progress before its deadline fails
/// with a timeout.
#[derive(Debug)]
pub(crate) struct Sender {
    messages: Pool<Message>,
    queue: IndexQueue<Handle<Message>>,
    timeout: Duration,
}

impl Sender {
    pub fn new(count: usize, buffer_size: usize, timeout: Duration) -> Self {
        Self {
            messages: Pool::new(count, || Message::new(buffer_size)),
            queue: IndexQueue::new(count + 1),
            timeout,
        }
    }

    pub fn allocate_message(&self) -> Option<Handle<Message>> {
        let handle = self.messages.allocate()?;
        if let Some(mut message) = self.messages.get(handle) {
            message.reset(Instant::now() + self.timeout);
        }
        Some(handle)
    }

    pub fn message(&self, handle: Handle<Message>) -> Option<PoolRef<'_, Message>> {
        self.messages.get(handle)
    }

    pub fn enqueue(&self, handle: Handle<Message>) -> Result<(), NetError> {
        if self.messages.get(handle).is_none() {
            return Err(NetError::InvalidHandle);
        }
        if !self.queue.push(handle) {
            return Err(NetError::QueueFull("outbound"));
        }
        Ok(())
    }

    /// Frees a message that will not be sent, handing back its socket.
    pub fn discard(&self, handle: Handle<Message>) -> Option<SocketId> {
        let socket = self.messages.get(handle)?.socket.take();
        self.messages.free(handle);
        socket
    }

    /// Runs one send cycle over the messages queued when it starts.
    pub fn send(&self, server: &mut Server, sink: &impl FailureSink) -> Result<(), NetError> {
        let pending = self.queue.len();
        if pending == 0 {
            return Ok(());
        }
        let writable = server.poll_writable()?;
        let now = Instant::now();

        for _ in 0..pending {
            let Some(handle) = self.queue.pop() else {
                break;
            };
            self.send_one(server, &writable, now, handle, sink);
        }
        Ok(())
    }

    fn send_one(
        &self,
        server: &mut Server,
        writable: &ReadySet,
        now: Instant,
        handle: Handle<Message>,
        sink: &impl FailureSink,
    ) {
        let Some(mut message) = self.messages.get(handle) else {
            return;
        };

        let connected = message.socket;
        let fresh = connected.is_none();
        let socket = match connected {
            Some(socket) => {
                if !server.contains(socket) {
                    drop(message);
                    self.fail(server, handle, Failure::Closed, sink);
                    return;
                }
                if !writable.contains(socket) {
                    let expired = message.is_expired(now);
                    drop(message);
                    if expired {
                        self.fail(server, handle, Failure::Timeout, sink);
                    } else {
                        self.requeue(server, handle, sink);
                    }
                    return;
                }
                socket
            }
            // Written to in the same cycle; the handshake may still be pending.
            None => match server.connect(&message.receiver) {
                Ok(socket) => {
                    message.socket = Some(socket);
                    socket
                }
                Err(e) => {
                    drop(message);
                    self.fail(server, handle, Failure::from(&e), sink);
                    return;
                }
            },
        };

        let outcome = match server.stream(socket) {
            Some(stream) => match message.transmit(stream) {
                Err(e) if fresh && e.kind() == ErrorKind::NotConnected => Ok(Progress::Pending),
                outcome => outcome,
            },
            None => Err(ErrorKind::NotConnected.into()),
        };

        match outcome {
            Ok(Progress::Complete) => {
                let (nonce, tag) = (message.nonce, message.tag);
                drop(message);
                // Keep reading: the peer may answer on this connection.
                if let Err(e) = server.shutdown_write(socket) {
                    debug!("Half-close of {:?} failed: {}", socket, e);
                    self.fail(server, handle, Failure::from(&e), sink);
                    return;
                }
                server.await_reply(socket, nonce, tag);
                if let Some(mut message) = self.messages.get(handle) {
                    message.socket = None;
                }
                self.messages.free(handle);
            }
            Ok(_) => {
                let expired = message.is_expired(now);
                drop(message);
                if expired {
                    self.fail(server, handle, Failure::Timeout, sink);
                } else {
                    self.requeue(server, handle, sink);
                }
            }
            Err(e) => {
                drop(message);
                self.fail(server, handle, Failure::from(&e), sink);
            }
        }
    }

    fn requeue(&self, server: &mut Server, handle: Handle<Message>, sink: &impl FailureSink) {
        if !self.queue.push(handle) {
            warn!("Outbound queue is full, dropping message");
            self.fail(server, handle, Failure::Io(ErrorKind::OutOfMemory), sink);
        }
    }

    fn fail(&self, server: &mut Server, handle: Handle<Message>, failure: Failure, sink: &impl FailureSink) {
        let Some(mut message) = self.messages.get(handle) else {
            return;
        };
        let report = message.report(failure);
        let socket = message.socket.take();
        drop(message);

        if let Some(socket) = socket {
            server.close_socket(socket);
        }
        self.messages.free(handle);
        sink.report(report);
    }
}

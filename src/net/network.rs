use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::error::NetError;
use super::event::{Event, Message};
use super::host::Host;
use super::receiver::Receiver;
use super::sender::Sender;
use super::server::{Server, SocketId};
use crate::constants::{
    BUFFER_SIZE, IDLE_TIMEOUT, INBOUND_BUFFERS, LISTEN_BACKLOG, OUTBOUND_BUFFERS, SEND_TIMEOUT,
};
use crate::pool::{Handle, PoolRef};

pub type EventHandle = Handle<Event>;
pub type MessageHandle = Handle<Message>;

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Inbound events, received or in flight, held at once.
    pub inbound_buffers: usize,
    /// Outbound messages, queued or in flight, held at once.
    pub outbound_buffers: usize,
    /// Largest frame, header included.
    pub buffer_size: usize,
    pub backlog: i32,
    pub send_timeout: Duration,
    pub idle_timeout: Duration,
    /// Kernel send buffer for outbound connections. `None` keeps the
    /// system default.
    pub send_buffer_size: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            inbound_buffers: INBOUND_BUFFERS,
            outbound_buffers: OUTBOUND_BUFFERS,
            buffer_size: BUFFER_SIZE,
            backlog: LISTEN_BACKLOG,
            send_timeout: SEND_TIMEOUT,
            idle_timeout: IDLE_TIMEOUT,
            send_buffer_size: None,
        }
    }
}

/// A peer-to-peer network endpoint.
///
/// Any number of threads may call [`poll`](Self::poll) at once. Socket I/O
/// happens inside a single critical section guarded by a try-lock: one
/// caller at a time drives sends and receives, and every other caller gets
/// [`NetError::TryAgain`] instead of waiting.
pub struct Network {
    pub(super) io: Mutex<Server>,
    interface: Host,
    sender: Sender,
    receiver: Receiver,
    /// Sockets released outside the critical section, closed on its next run.
    closing: ArrayQueue<SocketId>,
    idle_timeout: Duration,
}

impl Network {
    pub fn open(interface: Host, config: &NetworkConfig) -> Result<Self, NetError> {
        let mut server = Server::open(&interface, config.backlog)?;
        server.set_send_buffer_size(config.send_buffer_size);
        let interface = server.interface();
        info!("Listening on {}", interface);

        Ok(Self {
            io: Mutex::new(server),
            interface,
            sender: Sender::new(config.outbound_buffers, config.buffer_size, config.send_timeout),
            receiver: Receiver::new(config.inbound_buffers, config.buffer_size),
            // One entry per event and message slot.
            closing: ArrayQueue::new((config.inbound_buffers + config.outbound_buffers).max(1)),
            idle_timeout: config.idle_timeout,
        })
    }

    /// Closes the listener and every connection. Waits for a thread inside
    /// [`poll`](Self::poll) to leave first.
    pub fn close(&self) {
        self.io.lock().close();
        info!("Closed {}", self.interface);
    }

    /// The interface actually bound, with its concrete address and port.
    pub fn interface(&self) -> Host {
        self.interface
    }

    /// Returns the next received event, if any.
    ///
    /// Ready events are handed out without touching any socket. Otherwise
    /// the caller runs one send and receive cycle, unless another thread is
    /// already doing so, in which case this returns `TryAgain`.
    pub fn poll(&self) -> Result<Option<EventHandle>, NetError> {
        if let Some(handle) = self.receiver.pop_received() {
            return Ok(Some(handle));
        }

        {
            let Some(mut server) = self.io.try_lock() else {
                return Err(NetError::TryAgain);
            };
            if !server.is_open() {
                return Ok(None);
            }
            while let Some(socket) = self.closing.pop() {
                server.close_socket(socket);
            }
            self.sender.send(&mut server, &self.receiver)?;
            self.receiver.receive(&mut server, self.idle_timeout)?;
        }

        Ok(self.receiver.pop_received())
    }

    pub fn event(&self, handle: EventHandle) -> Option<PoolRef<'_, Event>> {
        self.receiver.event(handle)
    }

    /// Returns an event to the pool, closing its connection unless a
    /// response took it over.
    pub fn free_event(&self, handle: EventHandle) {
        if let Some(socket) = self.receiver.free_event(handle) {
            self.release(socket);
        }
    }

    pub fn new_message(&self) -> Result<MessageHandle, NetError> {
        self.sender
            .allocate_message()
            .ok_or(NetError::PoolExhausted("outbound"))
    }

    /// Creates a response to `request`, to be sent over the connection the
    /// request arrived on. The nonce and receiver are copied from the
    /// request.
    pub fn new_response(&self, request: EventHandle) -> Result<MessageHandle, NetError> {
        let handle = self.new_message()?;

        let Some(mut event) = self.receiver.event(request) else {
            self.discard_message(handle);
            return Err(NetError::InvalidHandle);
        };
        let socket = event.socket.take();
        let (nonce, host) = (event.nonce(), event.host());
        drop(event);

        if let Some(mut message) = self.sender.message(handle) {
            message.nonce = nonce;
            message.receiver = host;
            message.socket = socket;
        }
        Ok(handle)
    }

    pub fn message(&self, handle: MessageHandle) -> Option<PoolRef<'_, Message>> {
        self.sender.message(handle)
    }

    /// Queues a message for sending. The message slot is freed automatically
    /// once the message has been sent or has failed.
    pub fn send(&self, handle: MessageHandle) -> Result<(), NetError> {
        self.sender.enqueue(handle)
    }

    /// Frees a message that will not be sent.
    pub fn discard_message(&self, handle: MessageHandle) {
        if let Some(socket) = self.sender.discard(handle) {
            self.release(socket);
        }
    }

    fn release(&self, socket: SocketId) {
        let Err(socket) = self.closing.push(socket) else {
            return;
        };
        match self.io.try_lock() {
            Some(mut server) => {
                server.close_socket(socket);
            }
            None => warn!("Close queue is full, {:?} stays open until the network closes", socket),
        }
    }
}

use std::io;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::{Failure, FailureReport, FailureSink, NetError};
use super::event::{Event, Progress};
use super::server::{Server, SocketId};
use crate::pool::{Handle, IndexQueue, Pool, PoolRef};

/// Decodes inbound frames into pooled events.
///
/// Completed events wait in the ready queue until the owner pops them.
/// Events with a partially read frame wait in the unready queue until their
/// socket has more data.
#[derive(Debug)]
pub(crate) struct Receiver {
    events: Pool<Event>,
    ready: IndexQueue<Handle<Event>>,
    unready: IndexQueue<Handle<Event>>,
}

impl Receiver {
    pub fn new(count: usize, buffer_size: usize) -> Self {
        Self {
            events: Pool::new(count, || Event::new(buffer_size)),
            ready: IndexQueue::new(count + 1),
            unready: IndexQueue::new(count + 1),
        }
    }

    pub fn pop_received(&self) -> Option<Handle<Event>> {
        self.ready.pop()
    }

    pub fn event(&self, handle: Handle<Event>) -> Option<PoolRef<'_, Event>> {
        self.events.get(handle)
    }

    /// Returns the event's slot, handing back the socket it still owned.
    pub fn free_event(&self, handle: Handle<Event>) -> Option<SocketId> {
        let socket = self.events.get(handle)?.socket.take();
        self.events.free(handle);
        socket
    }

    /// Runs one receive cycle: continues partial reads, starts new ones,
    /// accepts pending connections and closes idle sockets.
    pub fn receive(&self, server: &mut Server, idle_timeout: Duration) -> Result<(), NetError> {
        let mut ready = server.poll_readable()?;

        for _ in 0..self.unready.len() {
            let Some(handle) = self.unready.pop() else {
                break;
            };
            let Some(socket) = self.events.get(handle).and_then(|event| event.socket) else {
                self.events.free(handle);
                continue;
            };
            if !server.contains(socket) {
                self.fail(handle, Failure::Closed);
                continue;
            }
            if !ready.take(socket) {
                self.unready.push(handle);
                continue;
            }
            self.receive_one(server, handle, socket);
        }

        for socket in ready.drain() {
            let Some(handle) = self.events.allocate() else {
                warn!("All receiver message buffers are full");
                break;
            };
            if let Some(mut event) = self.events.get(handle) {
                event.reset();
                event.socket = Some(socket);
            }
            self.receive_one(server, handle, socket);
        }

        if ready.listener {
            server.accept()?;
        }
        server.reap_idle(idle_timeout);
        Ok(())
    }

    fn receive_one(&self, server: &mut Server, handle: Handle<Event>, socket: SocketId) {
        let Some(mut event) = self.events.get(handle) else {
            return;
        };

        let outcome = advance(server, &mut event, socket);

        match outcome {
            Ok(Progress::Pending) => {
                drop(event);
                self.unready.push(handle);
            }
            Ok(Progress::Complete) => {
                drop(event);
                server.watch(socket, false);
                if !self.ready.push(handle) {
                    warn!("Receiver ready queue is full");
                    server.close_socket(socket);
                    self.events.free(handle);
                }
            }
            Ok(Progress::Closed) => {
                drop(event);
                debug!("{:?} closed by peer", socket);
                server.close_socket(socket);
                self.events.free(handle);
            }
            Err(e) => {
                event.socket = None;
                let mut report = event.report(Failure::from(&e));
                drop(event);
                // Nothing was decoded yet: attribute the error to the
                // request this socket is waiting to hear back on.
                if report.nonce.is_none() {
                    if let Some((nonce, tag)) = server.request(socket) {
                        report.nonce = Some(nonce);
                        report.tag = tag;
                    }
                }
                server.close_socket(socket);
                self.events.free(handle);
                self.report(report);
            }
        }
    }

    fn fail(&self, handle: Handle<Event>, failure: Failure) {
        let Some(mut event) = self.events.get(handle) else {
            return;
        };
        event.socket = None;
        let report = event.report(failure);
        drop(event);
        self.events.free(handle);
        self.report(report);
    }
}

fn advance(server: &mut Server, event: &mut Event, socket: SocketId) -> io::Result<Progress> {
    if event.received() == 0 {
        event.set_host(server.resolve_peer(socket)?);
    }
    match server.stream(socket) {
        Some(stream) => event.receive(stream),
        None => Ok(Progress::Closed),
    }
}

impl FailureSink for Receiver {
    /// Publishes the failure as an error event.
    fn report(&self, report: FailureReport) {
        debug!(
            "{} of {} with {} failed: {}",
            report.tag, report.nonce.unwrap_or_default(), report.host, report.failure
        );
        let Some(handle) = self.events.allocate() else {
            warn!(
                "Dropping {} error for {}: all receiver message buffers are full",
                report.failure, report.host
            );
            return;
        };
        if let Some(mut event) = self.events.get(handle) {
            event.reset();
            event.set_failure(&report);
        }
        if !self.ready.push(handle) {
            self.events.free(handle);
        }
    }
}

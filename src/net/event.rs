use std::io::{self, Read, Write};
use std::time::Instant;

use bytes::BytesMut;

use super::error::{Failure, FailureReport, NetError};
use super::frame::{Header, Tag, HEADER_SIZE, MAX_PAYLOAD};
use super::host::Host;
use super::server::SocketId;
use crate::id::Id;

/// Outcome of one resumable read or write pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The socket would block; resume from the saved offset later.
    Pending,
    /// The whole frame has been transferred.
    Complete,
    /// The peer closed the connection before sending anything.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    Error(Failure),
}

/// An inbound message, or a failure of a message in either direction.
///
/// Events are pooled: the buffer is allocated once and reused by every
/// frame decoded into it.
#[derive(Debug)]
pub struct Event {
    kind: EventKind,
    nonce: Id,
    host: Host,
    tag: Tag,
    buffer: BytesMut,
    payload_len: usize,
    pub(crate) socket: Option<SocketId>,
    received: usize,
}

impl Event {
    pub(crate) fn new(buffer_size: usize) -> Self {
        Self {
            kind: EventKind::Message,
            nonce: Id::ZERO,
            host: Host::UNSPECIFIED,
            tag: Tag::NONE,
            buffer: BytesMut::zeroed(buffer_size.max(HEADER_SIZE)),
            payload_len: 0,
            socket: None,
            received: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.kind = EventKind::Message;
        self.nonce = Id::ZERO;
        self.host = Host::UNSPECIFIED;
        self.tag = Tag::NONE;
        self.payload_len = 0;
        self.socket = None;
        self.received = 0;
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn failure(&self) -> Option<Failure> {
        match self.kind {
            EventKind::Error(failure) => Some(failure),
            EventKind::Message => None,
        }
    }

    /// Message nonce. Zero for error events that failed before the header
    /// was complete.
    pub fn nonce(&self) -> Id {
        self.nonce
    }

    /// The sender of a message, or the peer of a failed message.
    pub fn host(&self) -> Host {
        self.host
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[HEADER_SIZE..HEADER_SIZE + self.payload_len]
    }

    fn payload_capacity(&self) -> usize {
        (self.buffer.len() - HEADER_SIZE).min(MAX_PAYLOAD)
    }

    pub(crate) fn received(&self) -> usize {
        self.received
    }

    pub(crate) fn set_host(&mut self, host: Host) {
        self.host = host;
    }

    pub(crate) fn set_failure(&mut self, report: &FailureReport) {
        self.kind = EventKind::Error(report.failure);
        self.nonce = report.nonce.unwrap_or(Id::ZERO);
        self.host = report.host;
        self.tag = report.tag;
        self.payload_len = 0;
    }

    /// Describes a failure of this event, with whatever the header had
    /// revealed before it.
    pub(crate) fn report(&self, failure: Failure) -> FailureReport {
        let header_done = self.received >= HEADER_SIZE;
        FailureReport {
            nonce: header_done.then_some(self.nonce),
            host: self.host,
            tag: if header_done { self.tag } else { Tag::NONE },
            failure,
        }
    }

    /// Reads as much of the frame as `reader` has available.
    ///
    /// The header is accumulated first, then exactly the declared payload.
    /// A declared payload larger than the buffer is clamped to zero. End of
    /// stream before the first byte is a clean close; anywhere later it is
    /// an `UnexpectedEof` error.
    pub(crate) fn receive<R: Read>(&mut self, reader: &mut R) -> io::Result<Progress> {
        loop {
            let target = if self.received < HEADER_SIZE {
                HEADER_SIZE
            } else {
                HEADER_SIZE + self.payload_len
            };
            if self.received == target {
                return Ok(Progress::Complete);
            }

            match reader.read(&mut self.buffer[self.received..target]) {
                Ok(0) if self.received == 0 => return Ok(Progress::Closed),
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    let header_pending = self.received < HEADER_SIZE;
                    self.received += n;
                    if header_pending && self.received == HEADER_SIZE {
                        self.decode_header();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Progress::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn decode_header(&mut self) {
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.buffer[..HEADER_SIZE]);
        let header = Header::decode(&raw);
        self.nonce = header.nonce;
        self.tag = header.tag;
        self.payload_len = header.length as usize;
        if self.payload_len > self.payload_capacity() {
            self.payload_len = 0;
        }
    }
}

/// An outbound message.
///
/// Set `nonce`, `tag` and `receiver`, write the payload, then hand the
/// message to [`Network::send`](super::Network::send).
#[derive(Debug)]
pub struct Message {
    /// Random for requests; copied from the request for responses.
    pub nonce: Id,
    pub tag: Tag,
    pub receiver: Host,
    payload: BytesMut,
    limit: usize,
    pub(crate) socket: Option<SocketId>,
    sent: usize,
    deadline: Instant,
}

impl Message {
    pub(crate) fn new(buffer_size: usize) -> Self {
        let limit = buffer_size.saturating_sub(HEADER_SIZE).min(MAX_PAYLOAD);
        Self {
            nonce: Id::ZERO,
            tag: Tag::NONE,
            receiver: Host::UNSPECIFIED,
            payload: BytesMut::with_capacity(limit),
            limit,
            socket: None,
            sent: 0,
            deadline: Instant::now(),
        }
    }

    pub(crate) fn reset(&mut self, deadline: Instant) {
        self.nonce = Id::ZERO;
        self.tag = Tag::NONE;
        self.receiver = Host::UNSPECIFIED;
        self.payload.clear();
        self.socket = None;
        self.sent = 0;
        self.deadline = deadline;
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Bytes that can still be appended to the payload.
    pub fn remaining(&self) -> usize {
        self.limit - self.payload.len()
    }

    /// Appends `bytes` to the payload, or fails without writing anything if
    /// they do not fit.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        let size = self.payload.len() + bytes.len();
        if size > self.limit {
            return Err(NetError::PayloadTooLarge {
                size,
                limit: self.limit,
            });
        }
        self.payload.extend_from_slice(bytes);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.payload.clear();
    }

    pub fn header(&self) -> Header {
        Header {
            nonce: self.nonce,
            tag: self.tag,
            length: self.payload.len() as u16,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub(crate) fn report(&self, failure: Failure) -> FailureReport {
        FailureReport {
            nonce: Some(self.nonce),
            host: self.receiver,
            tag: self.tag,
            failure,
        }
    }

    /// Writes as much of the frame as `writer` accepts.
    ///
    /// One running counter spans header and payload, so a write may stop
    /// and resume anywhere in the frame.
    pub(crate) fn transmit<W: Write>(&mut self, writer: &mut W) -> io::Result<Progress> {
        let header = self.header().encode();
        let total = HEADER_SIZE + self.payload.len();

        while self.sent < total {
            let chunk = if self.sent < HEADER_SIZE {
                &header[self.sent..]
            } else {
                &self.payload[self.sent - HEADER_SIZE..]
            };
            match writer.write(chunk) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.sent += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Progress::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Progress::Complete)
    }
}

//! Newline-delimited JSON frames over a TCP stream.
//!
//! The Criteria Party listens and the Data Party connects.

use crate::linalg::Matrix;
use crate::transport::{Deadline, Frame, POLL_INTERVAL, Phase, Transport, TransportError};

use log::{debug, info};

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

/// Upper bound on a single connection attempt.
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest frame accepted from a peer, not counting the trailing newline.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// A connected TCP endpoint.
#[derive(Debug)]
pub struct TcpTransport {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    /// Bytes of a frame whose terminating newline has not arrived yet.
    pending: Vec<u8>,
    max_frame_bytes: usize,
}

impl TcpTransport {
    /// Binds `addr` and waits for a single peer to connect.
    ///
    /// `phase` names the first exchange the connection is for; it only shows up in
    /// timeout and cancellation errors.
    pub fn listen(
        addr: impl ToSocketAddrs,
        phase: Phase,
        deadline: &Deadline,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        info!("Waiting for peer on {}", listener.local_addr()?);
        Self::accept(&listener, phase, deadline)
    }

    /// Accepts one peer on an already bound listener.
    pub fn accept(
        listener: &TcpListener,
        phase: Phase,
        deadline: &Deadline,
    ) -> Result<Self, TransportError> {
        listener.set_nonblocking(true)?;
        let accepted = loop {
            deadline.check(phase)?;
            match listener.accept() {
                Ok((stream, peer)) => break (stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(deadline.next_wait())
                }
                Err(e) => return Err(e.into()),
            }
        };
        listener.set_nonblocking(false)?;

        let (stream, peer) = accepted;
        info!("Peer connected from {}", peer);
        Self::from_stream(stream)
    }

    /// Connects to a listening peer, retrying refused connections until `deadline`.
    pub fn connect(
        addr: impl ToSocketAddrs,
        phase: Phase,
        deadline: &Deadline,
    ) -> Result<Self, TransportError> {
        let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(
                io::Error::new(ErrorKind::InvalidInput, "address resolved to nothing").into(),
            );
        }

        loop {
            deadline.check(phase)?;
            for addr in &addrs {
                let attempt_timeout = deadline
                    .remaining()
                    .map_or(CONNECT_ATTEMPT_TIMEOUT, |left| left.min(CONNECT_ATTEMPT_TIMEOUT))
                    .max(POLL_INTERVAL);
                match TcpStream::connect_timeout(addr, attempt_timeout) {
                    Ok(stream) => {
                        info!("Connected to peer at {}", addr);
                        return Self::from_stream(stream);
                    }
                    Err(e) if is_retryable(&e) => {
                        debug!("Peer at {} not reachable yet: {}", addr, e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            thread::sleep(deadline.next_wait());
        }
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        // accepted sockets inherit non-blocking mode from the listener on some platforms
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            writer: stream,
            reader,
            pending: Vec::new(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        })
    }

    /// Caps the size of a received frame; longer frames fail with `FrameTooLarge`.
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.writer.peer_addr()?)
    }
}

impl Transport for TcpTransport {
    fn send_table(
        &mut self,
        phase: Phase,
        table: &Matrix,
        deadline: &Deadline,
    ) -> Result<(), TransportError> {
        deadline.check(phase)?;
        let bytes = Frame::new(phase, table.clone()).encode()?;
        debug!("Sending {} ({} bytes)", phase, bytes.len());

        self.writer
            .set_write_timeout(deadline.remaining().filter(|d| !d.is_zero()))?;
        match self.writer.write_all(&bytes).and_then(|_| self.writer.flush()) {
            Ok(()) => Ok(()),
            Err(e) if is_timeout(&e) => Err(TransportError::TimedOut { phase }),
            Err(e) if is_disconnect(&e) => Err(TransportError::Closed { phase }),
            Err(e) => Err(e.into()),
        }
    }

    fn receive_table(
        &mut self,
        phase: Phase,
        deadline: &Deadline,
    ) -> Result<Matrix, TransportError> {
        loop {
            deadline.check(phase)?;
            self.reader
                .get_ref()
                .set_read_timeout(Some(deadline.next_wait()))?;

            // read_until keeps partial data in `pending` across timeouts;
            // `pending` never exceeds the limit plus one byte
            let budget = (self.max_frame_bytes + 1).saturating_sub(self.pending.len());
            match (&mut self.reader)
                .take(budget as u64)
                .read_until(b'\n', &mut self.pending)
            {
                Ok(0) => return Err(TransportError::Closed { phase }),
                Ok(_) if self.pending.last() == Some(&b'\n') => {
                    let frame = Frame::decode(&self.pending);
                    self.pending.clear();
                    return frame?.into_table(phase);
                }
                Ok(_) if self.pending.len() > self.max_frame_bytes => {
                    self.pending.clear();
                    return Err(TransportError::FrameTooLarge {
                        phase,
                        limit: self.max_frame_bytes,
                    });
                }
                // EOF in the middle of a frame
                Ok(_) => return Err(TransportError::Closed { phase }),
                Err(e) if is_timeout(&e) || e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect(&e) => return Err(TransportError::Closed { phase }),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}

fn is_retryable(e: &io::Error) -> bool {
    is_timeout(e) || matches!(e.kind(), ErrorKind::ConnectionRefused)
}

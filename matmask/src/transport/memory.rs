//! In-process transport over a pair of byte channels.

use crate::linalg::Matrix;
use crate::transport::{Deadline, Frame, Phase, Transport, TransportError};

use log::debug;

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};

/// One endpoint of an in-process connection; frames are encoded exactly as on TCP.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Creates two connected endpoints.
    ///
    /// Dropping one endpoint makes pending and future receives on the other fail with
    /// `TransportError::Closed`.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = channel();
        let (b_tx, a_rx) = channel();
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }
}

impl Transport for MemoryTransport {
    fn send_table(
        &mut self,
        phase: Phase,
        table: &Matrix,
        deadline: &Deadline,
    ) -> Result<(), TransportError> {
        deadline.check(phase)?;
        let bytes = Frame::new(phase, table.clone()).encode()?;
        debug!("Sending {} ({} bytes)", phase, bytes.len());
        self.tx
            .send(bytes)
            .map_err(|_| TransportError::Closed { phase })
    }

    fn receive_table(
        &mut self,
        phase: Phase,
        deadline: &Deadline,
    ) -> Result<Matrix, TransportError> {
        loop {
            deadline.check(phase)?;
            match self.rx.recv_timeout(deadline.next_wait()) {
                Ok(bytes) => return Frame::decode(&bytes)?.into_table(phase),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::Closed { phase });
                }
            }
        }
    }
}

//! L2CAP connection session
//!
//! A session is one established byte stream to one remote device over one
//! PSM. It walks `Opening -> Open -> Closed`; nothing leaves `Closed`.

use std::fmt;
use std::io;

use log::{debug, trace};

use super::psm::Psm;
use super::stream::ChannelStream;
use super::types::{Direction, SessionState};
use crate::device::RemoteDevice;
use crate::error::{ChannelError, L2capResult};

/// Default number of bytes fetched by a single read
pub const DEFAULT_READ_BUFFER_SIZE: usize = 50;

/// Snapshot of a session for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub psm: Psm,
    pub remote: RemoteDevice,
    pub direction: Direction,
    pub state: SessionState,
}

/// One full-duplex session bound to a remote device and a PSM
pub struct ConnectionSession {
    psm: Psm,
    remote: RemoteDevice,
    direction: Direction,
    state: SessionState,
    stream: Box<dyn ChannelStream>,
    read_buffer: Vec<u8>,
}

impl ConnectionSession {
    /// Create a session in the `Opening` state
    pub fn new(
        psm: Psm,
        remote: RemoteDevice,
        direction: Direction,
        stream: Box<dyn ChannelStream>,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            psm,
            remote,
            direction,
            state: SessionState::Opening,
            stream,
            read_buffer: vec![0; read_buffer_size.max(1)],
        }
    }

    pub fn psm(&self) -> Psm {
        self.psm
    }

    pub fn remote(&self) -> &RemoteDevice {
        &self.remote
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            psm: self.psm,
            remote: self.remote.clone(),
            direction: self.direction,
            state: self.state,
        }
    }

    /// Open both stream halves. On failure the session is `Closed` and must
    /// be discarded.
    pub fn open(&mut self) -> io::Result<()> {
        if self.state != SessionState::Opening {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("cannot open session in state {}", self.state),
            ));
        }

        debug!("Opening streams for {} / psm {}", self.remote.id, self.psm);
        match self.stream.open() {
            Ok(()) => {
                self.state = SessionState::Open;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                let _ = self.stream.close();
                Err(e)
            }
        }
    }

    /// Perform a single bounded read. Zero bytes means nothing is available.
    pub fn read(&mut self) -> L2capResult<Vec<u8>> {
        if self.state != SessionState::Open {
            return Err(ChannelError::StreamReadFailed(not_open(self.state)));
        }

        let count = self
            .stream
            .read(&mut self.read_buffer)
            .map_err(ChannelError::StreamReadFailed)?;
        trace!("Read {} bytes from {} / psm {}", count, self.remote.id, self.psm);

        Ok(self.read_buffer[..count].to_vec())
    }

    /// Write `data`, stopping early if the stream stops accepting bytes
    pub fn write(&mut self, data: &[u8]) -> L2capResult<usize> {
        if self.state != SessionState::Open {
            return Err(ChannelError::StreamWriteFailed(not_open(self.state)));
        }

        let mut written = 0;
        while written < data.len() {
            let count = self
                .stream
                .write(&data[written..])
                .map_err(ChannelError::StreamWriteFailed)?;
            if count == 0 {
                break;
            }
            written += count;
        }
        trace!("Sent {} of {} bytes to {}", written, data.len(), self.remote.id);

        Ok(written)
    }

    /// Close both stream halves. Idempotent.
    pub fn close(&mut self) -> io::Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.stream.close()
    }
}

fn not_open(state: SessionState) -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, format!("session is {}", state))
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("psm", &self.psm)
            .field("remote", &self.remote)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

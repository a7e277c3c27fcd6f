//! Byte stream abstraction for established L2CAP channels
//!
//! A `ChannelStream` is the readable/writable handle a radio stack hands over
//! once a connection-oriented channel is up. Reads never block: a read with
//! nothing buffered returns zero bytes.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Full-duplex byte stream of one L2CAP session
pub trait ChannelStream: Send {
    /// Open both stream halves
    fn open(&mut self) -> io::Result<()>;

    /// Read whatever is available into `buf`, returning the byte count
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much of `data` as the stream accepts, returning the byte count
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Close both stream halves
    fn close(&mut self) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct Pipe {
    buffer: VecDeque<u8>,
    /// Set once either end closes
    closed: bool,
}

/// One end of an in-memory duplex stream
///
/// Created in pairs by [`MemoryStream::pair`]; bytes written on one end are
/// read on the other, in order.
#[derive(Debug)]
pub struct MemoryStream {
    incoming: Arc<Mutex<Pipe>>,
    outgoing: Arc<Mutex<Pipe>>,
    /// Maximum bytes buffered in the outgoing direction
    capacity: usize,
    opened: bool,
}

fn lock(pipe: &Arc<Mutex<Pipe>>) -> MutexGuard<'_, Pipe> {
    // A panic while holding a pipe lock leaves the buffer intact
    pipe.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStream {
    /// Create a connected pair with unbounded buffering
    pub fn pair() -> (MemoryStream, MemoryStream) {
        Self::pair_with_capacity(usize::MAX)
    }

    /// Create a connected pair that buffers at most `capacity` bytes per direction
    pub fn pair_with_capacity(capacity: usize) -> (MemoryStream, MemoryStream) {
        let a_to_b = Arc::new(Mutex::new(Pipe::default()));
        let b_to_a = Arc::new(Mutex::new(Pipe::default()));

        let a = MemoryStream {
            incoming: b_to_a.clone(),
            outgoing: a_to_b.clone(),
            capacity,
            opened: false,
        };
        let b = MemoryStream {
            incoming: a_to_b,
            outgoing: b_to_a,
            capacity,
            opened: false,
        };
        (a, b)
    }

    /// Bytes waiting to be read on this end
    pub fn available(&self) -> usize {
        lock(&self.incoming).buffer.len()
    }

    /// Whether either end has closed the stream
    pub fn is_closed(&self) -> bool {
        lock(&self.incoming).closed || lock(&self.outgoing).closed
    }

    /// Drain everything currently buffered for this end
    pub fn read_available(&mut self) -> Vec<u8> {
        lock(&self.incoming).buffer.drain(..).collect()
    }
}

impl ChannelStream for MemoryStream {
    fn open(&mut self) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "stream already closed"));
        }
        self.opened = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.opened {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "stream not open"));
        }
        let mut pipe = lock(&self.incoming);
        let count = buf.len().min(pipe.buffer.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.buffer.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.opened {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "stream not open"));
        }
        let mut pipe = lock(&self.outgoing);
        if pipe.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed the stream"));
        }
        let room = self.capacity.saturating_sub(pipe.buffer.len());
        let count = data.len().min(room);
        pipe.buffer.extend(&data[..count]);
        Ok(count)
    }

    fn close(&mut self) -> io::Result<()> {
        self.opened = false;
        lock(&self.incoming).closed = true;
        lock(&self.outgoing).closed = true;
        Ok(())
    }
}

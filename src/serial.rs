use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Byte-oriented link to the host.
pub trait Channel {
    /// Fills as much of `buf` as arrives before `timeout` elapses and returns
    /// the count, which is short when the deadline passes first. A closed
    /// link with nothing read is `UnexpectedEof`.
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Serial link emulated over TCP.
impl Channel for TcpStream {
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0usize;
        while filled < buf.len() {
            let now = Instant::now();
            if now >= deadline { break; }
            self.set_read_timeout(Some(deadline - now))?;
            match self.read(&mut buf[filled..]) {
                Ok(0) => {
                    if filled == 0 { return Err(io::ErrorKind::UnexpectedEof.into()); }
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }
}

/// In-memory link: scripted host bytes in, device bytes captured.
///
/// A read returns whatever is queued (possibly short, as if the timeout
/// elapsed); an empty queue behaves like a closed link.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl MemoryChannel {
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        Self { input: input.into().into(), output: Vec::new() }
    }

    pub fn push_input(&mut self, bytes: &[u8]) { self.input.extend(bytes); }

    pub fn pending(&self) -> usize { self.input.len() }

    pub fn output(&self) -> &[u8] { &self.output }

    pub fn take_output(&mut self) -> Vec<u8> { std::mem::take(&mut self.output) }
}

impl Channel for MemoryChannel {
    fn read_bytes(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() { return Ok(0); }
        if self.input.is_empty() { return Err(io::ErrorKind::UnexpectedEof.into()); }
        let n = buf.len().min(self.input.len());
        for (dst, src) in buf.iter_mut().zip(self.input.drain(..n)) { *dst = src; }
        Ok(n)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.extend_from_slice(bytes);
        Ok(())
    }
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> { (**self).read_bytes(buf, timeout) }
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> { (**self).write_bytes(bytes) }
}

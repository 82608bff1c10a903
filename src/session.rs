use std::io;
use std::sync::atomic::{compiler_fence, Ordering};
use std::time::Duration;

use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::clock::CycleCounter;
use crate::mlp::network::{Engine, Precision};
use crate::mlp::INPUT_LEN;
use crate::protocol::{self, Command, Response, INPUT_BYTES, MSG_ERROR, MSG_READY, MSG_WAITING};
use crate::serial::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    AwaitCommand,
    ReadInput,
    RunInference,
    Report,
}

/// What to do when the input block arrives short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortReadPolicy {
    /// Emit the error line and drop the request.
    #[default]
    Abort,
    /// Emit the error line, then infer on whatever the input buffer holds.
    InferAnyway,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-byte wait while polling for an opcode.
    pub command_poll: Duration,
    /// Wait for the full input block.
    pub input_timeout: Duration,
    pub short_read: ShortReadPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_poll: Duration::from_millis(50),
            input_timeout: Duration::from_secs(100),
            short_read: ShortReadPolicy::Abort,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("host disconnected")]
    Disconnected,
    #[error("serial i/o failed: {0}")]
    Io(#[from] io::Error),
}

fn link_error(e: io::Error) -> SessionError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => SessionError::Disconnected,
        _ => SessionError::Io(e),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub precision: Precision,
    pub class: usize,
    pub cycles: u32,
    /// Input bytes received for this request.
    pub received: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Reported(Report),
    Aborted { precision: Precision, received: usize },
}

/// One device serving one host: await command, read input, infer, report.
pub struct Session<C: Channel, T: CycleCounter> {
    channel: C,
    counter: T,
    engine: Engine,
    config: SessionConfig,
    state: State,
    input_bytes: Box<[u8; INPUT_BYTES]>,
    input: [f32; INPUT_LEN],
    served: u64,
}

impl<C: Channel, T: CycleCounter> Session<C, T> {
    pub fn new(channel: C, counter: T, engine: Engine, config: SessionConfig) -> Self {
        Self {
            channel,
            counter,
            engine,
            config,
            state: State::Idle,
            input_bytes: Box::new([0u8; INPUT_BYTES]),
            input: [0.0; INPUT_LEN],
            served: 0,
        }
    }

    pub fn state(&self) -> State { self.state }
    pub fn engine(&self) -> &Engine { &self.engine }
    pub fn channel(&self) -> &C { &self.channel }
    pub fn channel_mut(&mut self) -> &mut C { &mut self.channel }
    pub fn served(&self) -> u64 { self.served }
    pub fn into_channel(self) -> C { self.channel }

    /// Announces readiness. Called implicitly by the first [`Session::step`].
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.write(MSG_READY)?;
        self.state = State::AwaitCommand;
        info!("session ready");
        Ok(())
    }

    /// Serves until the host goes away.
    pub fn run(&mut self) -> Result<(), SessionError> {
        loop {
            match self.step() {
                Ok(_) => {}
                Err(SessionError::Disconnected) => {
                    info!("host disconnected after {} requests", self.served);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One pass through the protocol, ending back in `AwaitCommand`.
    pub fn step(&mut self) -> Result<Outcome, SessionError> {
        if self.state == State::Idle { self.start()?; }

        let precision = self.await_command()?;
        let received = self.read_input()?;
        if received != INPUT_BYTES {
            warn!("short input read: {} of {} bytes", received, INPUT_BYTES);
            self.write(MSG_ERROR)?;
            if self.config.short_read == ShortReadPolicy::Abort {
                self.state = State::AwaitCommand;
                return Ok(Outcome::Aborted { precision, received });
            }
        }

        let (class, cycles) = self.run_inference(precision);
        self.report(class, cycles)?;
        self.served += 1;
        debug!("{} inference -> class {} in {} cycles", precision, class, cycles);
        Ok(Outcome::Reported(Report { precision, class, cycles, received }))
    }

    fn await_command(&mut self) -> Result<Precision, SessionError> {
        self.state = State::AwaitCommand;
        self.write(MSG_WAITING)?;
        let mut byte = [0u8; 1];
        loop {
            let n = self.channel.read_bytes(&mut byte, self.config.command_poll).map_err(link_error)?;
            if n == 0 { continue; }
            match Command::decode(byte[0]) {
                Command::Infer(p) => return Ok(p),
                Command::Noop => trace!("ignoring byte {:#04x}", byte[0]),
            }
        }
    }

    /// Reads into the persistent byte buffer; bytes that do not arrive keep
    /// their previous contents.
    fn read_input(&mut self) -> Result<usize, SessionError> {
        self.state = State::ReadInput;
        let received = self
            .channel
            .read_bytes(&mut self.input_bytes[..], self.config.input_timeout)
            .or_else(|e| if e.kind() == io::ErrorKind::UnexpectedEof { Ok(0) } else { Err(e) })
            .map_err(link_error)?;
        protocol::decode_input(&self.input_bytes, &mut self.input);
        Ok(received)
    }

    fn run_inference(&mut self, precision: Precision) -> (usize, u32) {
        self.state = State::RunInference;
        compiler_fence(Ordering::SeqCst);
        let begin = self.counter.now();
        compiler_fence(Ordering::SeqCst);
        let class = self.engine.infer(precision, &self.input);
        compiler_fence(Ordering::SeqCst);
        let end = self.counter.now();
        compiler_fence(Ordering::SeqCst);
        (class, end.wrapping_sub(begin))
    }

    fn report(&mut self, class: usize, cycles: u32) -> Result<(), SessionError> {
        self.state = State::Report;
        let response = Response { class: class as i32, cycles: cycles as i32 };
        self.write(&response.encode())?;
        self.state = State::AwaitCommand;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.channel.write_bytes(bytes).map_err(link_error)
    }
}

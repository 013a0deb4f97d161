// Blocking receive loop over any byte transport

use crate::engine::ProtocolEngine;
use serialdisk_core::SerialDiskResult;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, trace};

const READ_BUFFER_SIZE: usize = 4096;

/// Asks a running listener to stop once its current read returns.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn is_pending(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Write side of the transport. A write timeout only means the remote has not
/// drained its buffer yet, so writes block until accepted or the listener stops.
struct BlockingWriter<'a, W: Write> {
    inner: &'a mut W,
    stop: &'a StopHandle,
}

impl<W: Write> BlockingWriter<'_, W> {
    fn retry<R>(&mut self, mut op: impl FnMut(&mut W) -> io::Result<R>) -> io::Result<R> {
        loop {
            match op(self.inner) {
                Err(e) if is_pending(&e) => {
                    if self.stop.is_stopped() {
                        return Err(io::Error::new(ErrorKind::Other, "listener stopped during write"));
                    }
                    trace!("Transport write pending: {}", e);
                }
                result => return result,
            }
        }
    }
}

impl<W: Write> Write for BlockingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.retry(|inner| inner.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.retry(|inner| inner.flush())
    }
}

pub struct Listener<T: Read + Write> {
    transport: T,
    engine: ProtocolEngine,
    stop: StopHandle,
}

impl<T: Read + Write> Listener<T> {
    pub fn new(transport: T, engine: ProtocolEngine) -> Self {
        Self {
            transport,
            engine,
            stop: StopHandle(Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    pub fn into_parts(self) -> (T, ProtocolEngine) {
        (self.transport, self.engine)
    }

    /// Run until stopped, the transport closes or a fatal error occurs.
    /// Read and write timeouts only mean that the remote is not ready yet.
    pub fn run(&mut self) -> SerialDiskResult<()> {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        info!("Listening for commands");

        while !self.stop.is_stopped() {
            self.engine.refresh_if_media_changed()?;

            let received = match self.transport.read(&mut buffer) {
                Ok(0) => {
                    info!("Transport closed");
                    break;
                }
                Ok(n) => n,
                Err(e) if is_pending(&e) => continue,
                Err(e) => {
                    error!("Transport read failed: {}", e);
                    return Err(e.into());
                }
            };

            trace!("Received {} bytes", received);
            let mut output = BlockingWriter { inner: &mut self.transport, stop: &self.stop };
            for &byte in &buffer[..received] {
                if let Err(e) = self.engine.process_byte(byte, &mut output) {
                    error!("Stopping listener in state {}: {}", self.engine.state().name(), e);
                    self.stop.stop();
                    return Err(e);
                }
            }
        }

        info!("Listener stopped");
        Ok(())
    }
}

//! Printer transports
//!
//! A transport only moves bytes. Failures are reported once and never
//! retried; the caller re-runs the whole pipeline if it wants another try.
//! Chunk pacing lives in [`send_print_job`] so the delay between chunks
//! suspends the task instead of blocking the runtime thread.

use crate::{PrintError, PrintJob, PrinterConfig, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Byte-stream link to a printer
pub trait PrinterTransport {
    /// Whether a connection is currently open
    fn connection_status(&self) -> bool;

    /// Address of the open connection, if any
    fn address(&self) -> Option<&str>;

    /// Open a connection to `address`, replacing any open one
    fn connect(&mut self, address: &str) -> Result<()>;

    /// Write and flush one chunk over the open connection
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
}

fn transport_err(context: impl std::fmt::Display, err: io::Error) -> crate::Error {
    PrintError::Transport(format!("{}: {}", context, err)).into()
}

fn write_flush<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    w.write_all(bytes)?;
    w.flush()
}

/// Printer reachable through a device node, e.g. an RFCOMM channel bound to
/// the printer's Bluetooth address (`rfcomm bind 0 <MAC>` → `/dev/rfcomm0`)
/// or a USB/serial line printer.
#[derive(Default)]
pub struct DeviceTransport {
    device: Option<File>,
    address: Option<String>,
}

impl DeviceTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrinterTransport for DeviceTransport {
    fn connection_status(&self) -> bool {
        self.device.is_some()
    }

    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    fn connect(&mut self, address: &str) -> Result<()> {
        self.device = None;
        self.address = None;
        // The device node must already exist; never create files here.
        let device = OpenOptions::new()
            .write(true)
            .open(address)
            .map_err(|e| transport_err(address, e))?;
        log::info!("connected to printer device {}", address);
        self.device = Some(device);
        self.address = Some(address.to_string());
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| PrintError::Transport("not connected".into()))?;
        if let Err(e) = write_flush(device, bytes) {
            self.device = None;
            return Err(transport_err("write failed", e));
        }
        Ok(())
    }
}

/// Network printer speaking raw ESC/POS, usually on port 9100
pub struct TcpTransport {
    stream: Option<TcpStream>,
    address: Option<String>,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(config: &PrinterConfig) -> Self {
        Self {
            stream: None,
            address: None,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }
}

impl PrinterTransport for TcpTransport {
    fn connection_status(&self) -> bool {
        self.stream.is_some()
    }

    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    fn connect(&mut self, address: &str) -> Result<()> {
        self.stream = None;
        self.address = None;
        let addr = address
            .to_socket_addrs()
            .map_err(|e| transport_err(address, e))?
            .next()
            .ok_or_else(|| PrintError::Transport(format!("{}: no address resolved", address)))?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| transport_err(address, e))?;
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("could not disable Nagle on {}: {}", addr, e);
        }
        log::info!("connected to network printer {}", addr);
        self.stream = Some(stream);
        self.address = Some(address.to_string());
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PrintError::Transport("not connected".into()))?;
        if let Err(e) = write_flush(stream, bytes) {
            self.stream = None;
            return Err(transport_err("write failed", e));
        }
        Ok(())
    }
}

/// Connect to `address` unless already connected there, then write the job
/// once in `config.chunk_size` pieces, sleeping `config.chunk_delay_ms`
/// between them.
pub async fn send_print_job<T>(
    transport: &mut T,
    address: &str,
    job: &PrintJob,
    config: &PrinterConfig,
) -> Result<()>
where
    T: PrinterTransport + ?Sized,
{
    if !transport.connection_status() || transport.address() != Some(address) {
        transport.connect(address)?;
    }

    let delay = Duration::from_millis(config.chunk_delay_ms);
    let mut chunks = job.bytes().chunks(config.chunk_size.max(1)).peekable();
    while let Some(chunk) = chunks.next() {
        transport.write_bytes(chunk)?;
        if !delay.is_zero() && chunks.peek().is_some() {
            tokio::time::sleep(delay).await;
        }
    }

    log::info!(
        "sent print job {} ({} bytes, {}x{} dots)",
        job.fingerprint(),
        job.len(),
        job.width_dots(),
        job.height_dots()
    );
    Ok(())
}

//! Modbus transports
//!
//! One trait over the request/response exchange, with TCP and serial RTU
//! implementations. A transport owns exactly one socket or serial port;
//! exchange is strictly sequential per transport, which matches the Modbus
//! master model. Connection sharing between devices is handled a level up
//! by the connection manager.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

use crate::error::{AcqError, AcqResult};
use crate::model::{InterfaceConfig, InterfaceKind, Parity};
use gridlink_modbus::{Pdu, RtuFramer, TcpFramer, MAX_RTU_FRAME_LEN, MBAP_HEADER_LEN};

/// A connected Modbus master endpoint.
#[async_trait]
pub trait ModbusTransport: Send {
    /// Send one request PDU to the given unit and wait for its response PDU.
    async fn exchange(&mut self, unit_id: u8, request: &Pdu) -> AcqResult<Pdu>;

    /// Close the underlying connection.
    async fn close(&mut self);
}

/// Opens transports for interfaces. The service uses [`NetFactory`];
/// tests substitute simulated devices.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, interface: &InterfaceConfig) -> AcqResult<Box<dyn ModbusTransport>>;
}

/// Production factory: TCP sockets and serial ports.
#[derive(Debug, Default)]
pub struct NetFactory;

#[async_trait]
impl TransportFactory for NetFactory {
    async fn connect(&self, interface: &InterfaceConfig) -> AcqResult<Box<dyn ModbusTransport>> {
        let io_timeout = Duration::from_millis(interface.timeout_ms);
        match &interface.kind {
            InterfaceKind::Tcp { host, port } => {
                let transport = TcpTransport::connect(host, *port, io_timeout).await?;
                Ok(Box::new(transport))
            },
            InterfaceKind::Serial {
                port,
                baud_rate,
                data_bits,
                stop_bits,
                parity,
            } => {
                let transport = SerialTransport::open(
                    port,
                    *baud_rate,
                    *data_bits,
                    *stop_bits,
                    *parity,
                    io_timeout,
                )?;
                Ok(Box::new(transport))
            },
        }
    }
}

/// Modbus TCP transport with MBAP framing.
pub struct TcpTransport {
    stream: TcpStream,
    framer: TcpFramer,
    timeout: Duration,
    peer: String,
}

impl TcpTransport {
    pub async fn connect(host: &str, port: u16, io_timeout: Duration) -> AcqResult<Self> {
        let peer = format!("{host}:{port}");
        let stream = timeout(io_timeout, TcpStream::connect(&peer))
            .await
            .map_err(|_| AcqError::timeout(format!("Connect to {peer} timed out")))?
            .map_err(|e| AcqError::connection(format!("Failed to connect to {peer}: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| AcqError::connection(format!("Failed to set nodelay on {peer}: {e}")))?;
        debug!(peer = %peer, "TCP transport connected");
        Ok(Self {
            stream,
            framer: TcpFramer::new(),
            timeout: io_timeout,
            peer,
        })
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    async fn exchange(&mut self, unit_id: u8, request: &Pdu) -> AcqResult<Pdu> {
        let (frame, transaction_id) = self.framer.encode(unit_id, request)?;

        timeout(self.timeout, self.stream.write_all(&frame))
            .await
            .map_err(|_| AcqError::timeout(format!("Send to {} timed out", self.peer)))?
            .map_err(|e| AcqError::connection(format!("Send to {} failed: {e}", self.peer)))?;

        // Header first so we know how many body bytes follow
        let mut header = [0u8; MBAP_HEADER_LEN];
        timeout(self.timeout, self.stream.read_exact(&mut header))
            .await
            .map_err(|_| AcqError::timeout(format!("Response from {} timed out", self.peer)))?
            .map_err(|e| AcqError::connection(format!("Read from {} failed: {e}", self.peer)))?;

        let (_, body_len) = self.framer.parse_header(&header)?;
        let mut body = vec![0u8; body_len];
        timeout(self.timeout, self.stream.read_exact(&mut body))
            .await
            .map_err(|_| AcqError::timeout(format!("Response from {} timed out", self.peer)))?
            .map_err(|e| AcqError::connection(format!("Read from {} failed: {e}", self.peer)))?;

        Ok(self.framer.decode(transaction_id, unit_id, &header, &body)?)
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
        debug!(peer = %self.peer, "TCP transport closed");
    }
}

/// Modbus RTU transport over a serial line.
pub struct SerialTransport {
    port: tokio_serial::SerialStream,
    framer: RtuFramer,
    timeout: Duration,
    /// Silent time marking end of frame, 3.5 character times
    frame_gap: Duration,
    port_name: String,
}

impl SerialTransport {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        data_bits: u8,
        stop_bits: u8,
        parity: Parity,
        io_timeout: Duration,
    ) -> AcqResult<Self> {
        let data_bits = match data_bits {
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };
        let stop_bits = match stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };
        let parity = match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        };

        let port = tokio_serial::new(port_name, baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(io_timeout)
            .open_native_async()
            .map_err(|e| {
                AcqError::connection(format!("Failed to open serial port {port_name}: {e}"))
            })?;

        // 11 bits per character on the wire, gap is 3.5 character times
        let char_time_us = u64::from(11_000_000 / baud_rate.max(1));
        let frame_gap = Duration::from_micros((char_time_us * 35 / 10).max(750));

        debug!(port = port_name, baud_rate, "Serial transport opened");
        Ok(Self {
            port,
            framer: RtuFramer::new(),
            timeout: io_timeout,
            frame_gap,
            port_name: port_name.to_string(),
        })
    }

    /// Read bytes until the inter-frame gap elapses with nothing arriving.
    async fn read_frame(&mut self) -> AcqResult<Vec<u8>> {
        let mut frame = Vec::new();
        let mut byte = [0u8; 1];
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            let wait = if frame.is_empty() {
                // Nothing received yet: wait up to the response timeout
                deadline.saturating_duration_since(tokio::time::Instant::now())
            } else {
                self.frame_gap
            };
            if wait.is_zero() {
                break;
            }
            match timeout(wait, self.port.read_exact(&mut byte)).await {
                Ok(Ok(_)) => {
                    frame.push(byte[0]);
                    if frame.len() > MAX_RTU_FRAME_LEN {
                        return Err(AcqError::protocol(format!(
                            "RTU frame from {} exceeds maximum length",
                            self.port_name
                        )));
                    }
                },
                Ok(Err(e)) => {
                    return Err(AcqError::connection(format!(
                        "Serial read on {} failed: {e}",
                        self.port_name
                    )));
                },
                // Gap elapsed: frame complete (or overall timeout with no data)
                Err(_) => break,
            }
        }

        if frame.is_empty() {
            return Err(AcqError::timeout(format!(
                "No response on {} within {:?}",
                self.port_name, self.timeout
            )));
        }
        Ok(frame)
    }
}

#[async_trait]
impl ModbusTransport for SerialTransport {
    async fn exchange(&mut self, unit_id: u8, request: &Pdu) -> AcqResult<Pdu> {
        // Respect the inter-frame silence before transmitting
        tokio::time::sleep(self.frame_gap).await;

        let frame = self.framer.encode(unit_id, request)?;
        timeout(self.timeout, self.port.write_all(&frame))
            .await
            .map_err(|_| AcqError::timeout(format!("Send on {} timed out", self.port_name)))?
            .map_err(|e| {
                AcqError::connection(format!("Send on {} failed: {e}", self.port_name))
            })?;
        let _ = self.port.flush().await;

        let response = self.read_frame().await?;
        Ok(self.framer.decode(unit_id, &response)?)
    }

    async fn close(&mut self) {
        // Dropping the stream releases the port
        debug!(port = %self.port_name, "Serial transport closed");
    }
}

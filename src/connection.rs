use crate::config::AmpConfig;
use crate::error::{AmpError, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;

const READ_CHUNK: usize = 256;

/// Ordered stream of received, delimiter-stripped lines
pub type LineReceiver = mpsc::UnboundedReceiver<String>;

/// A line-oriented, half-duplex link to the amplifier
#[async_trait]
pub trait LineChannel: Send + Sync {
    /// Send one command line; the implementation appends the delimiter
    async fn send(&self, command: &str) -> Result<()>;
}

/// Line channel over a serial device (or any byte stream)
///
/// Writes go straight to the underlying writer so I/O failures reach the
/// caller. A background task splits incoming bytes on the delimiter and
/// forwards each line, in arrival order, to the [`LineReceiver`] returned
/// alongside the connection.
pub struct SerialConnection {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    delimiter: String,
    reader_task: JoinHandle<()>,
}

impl SerialConnection {
    /// Open the configured serial port at the configured baud rate
    ///
    /// The port is put in raw mode (8N1, no flow control), so the delimiter
    /// reaches the reader untranslated.
    pub async fn open(config: &AmpConfig) -> Result<(Self, LineReceiver)> {
        tracing::info!(
            "Opening {} @ {} baud",
            config.port_path.display(),
            config.baud_rate
        );

        let port = tokio_serial::new(config.port_path.to_string_lossy(), config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;

        let (reader, writer) = tokio::io::split(port);
        Ok(Self::from_stream(reader, writer, config.delimiter.clone()))
    }

    /// Build a connection over an arbitrary reader/writer pair
    pub fn from_stream<R, W>(reader: R, writer: W, delimiter: impl Into<String>) -> (Self, LineReceiver)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let delimiter = delimiter.into();
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(read_lines(reader, delimiter.clone().into_bytes(), line_tx));

        let connection = Self {
            writer: Mutex::new(Box::new(writer)),
            delimiter,
            reader_task,
        };
        (connection, line_rx)
    }
}

#[async_trait]
impl LineChannel for SerialConnection {
    async fn send(&self, command: &str) -> Result<()> {
        tracing::debug!("Sending: {}", command);
        let wire = format!("{command}{}", self.delimiter);

        let mut writer = self.writer.lock().await;
        writer
            .write_all(wire.as_bytes())
            .await
            .map_err(AmpError::TransportSend)?;
        writer.flush().await.map_err(AmpError::TransportSend)
    }
}

impl Drop for SerialConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Read until EOF, forwarding each complete line
async fn read_lines<R>(mut reader: R, delimiter: Vec<u8>, line_tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut pending = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                tracing::info!("Serial link closed");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Serial read error: {}", e);
                break;
            }
        };

        pending.extend_from_slice(&chunk[..n]);
        for line in drain_lines(&mut pending, &delimiter) {
            tracing::debug!("Received: {}", line);
            if line_tx.send(line).is_err() {
                tracing::debug!("Line receiver dropped, stopping reader");
                return;
            }
        }
    }
}

/// Remove every complete line from `buffer`, leaving any partial tail
///
/// Lines are decoded lossily, trimmed, and dropped when empty.
fn drain_lines(buffer: &mut Vec<u8>, delimiter: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    if delimiter.is_empty() {
        return lines;
    }

    while let Some(pos) = buffer
        .windows(delimiter.len())
        .position(|window| window == delimiter)
    {
        let raw: Vec<u8> = buffer.drain(..pos + delimiter.len()).take(pos).collect();
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

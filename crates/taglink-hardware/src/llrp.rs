//! LLRP reader driver.
//!
//! Speaks the header level of LLRP over TCP:
//!
//! 1. TCP connect to the reader (port 5084 unless given).
//! 2. Wait for the reader's first `READER_EVENT_NOTIFICATION`; it is the
//!    definitive signal that the reader accepted the client. Steps 1 and 2
//!    share one bounded wait.
//! 3. Send the decoder's startup frames (inventory configuration).
//! 4. Read loop: answer `KEEPALIVE` with `KEEPALIVE_ACK`, hand
//!    `RO_ACCESS_REPORT` frames to the [`ReportDecoder`].
//! 5. On disconnect, send `CLOSE_CONNECTION` (best effort) and stop.
//!
//! A read error or EOF while connected is reported once as
//! [`DriverReport::Fault`].

use crate::error::{HardwareError, Result};
use crate::traits::ReaderDriver;
use crate::types::{DriverReport, ReaderAddress, ReportCallback};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use taglink_core::RawReading;
use taglink_core::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use taglink_protocol::{LlrpCodec, LlrpFrame, MessageType};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

type LlrpStream = Framed<TcpStream, LlrpCodec>;

/// Decoding of LLRP message bodies into raw readings.
///
/// Parameter-level LLRP decoding is vendor territory; this seam lets a
/// deployment plug one in without touching the link handling.
pub trait ReportDecoder: Send + Sync + 'static {
    /// Frames sent once the reader has accepted the connection, in order.
    ///
    /// Message ids are assigned by the driver.
    fn startup_frames(&self) -> Vec<LlrpFrame> {
        Vec::new()
    }

    /// Extract readings from an `RO_ACCESS_REPORT`.
    fn decode(&self, frame: &LlrpFrame) -> Vec<RawReading>;
}

/// Decoder that configures nothing and decodes nothing.
///
/// Keeps the link alive (keepalives are still answered) and logs each
/// report it cannot interpret.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueReportDecoder;

impl ReportDecoder for OpaqueReportDecoder {
    fn decode(&self, frame: &LlrpFrame) -> Vec<RawReading> {
        debug!(
            message_id = frame.message_id,
            payload_len = frame.payload.len(),
            "RO_ACCESS_REPORT left undecoded"
        );
        Vec::new()
    }
}

/// LLRP link settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LlrpConfig {
    /// Bound on TCP connect plus the wait for the first reader event.
    pub connect_timeout: Duration,

    /// Bound on sending `CLOSE_CONNECTION` during disconnect.
    pub close_timeout: Duration,

    /// Maximum accepted LLRP frame size.
    pub max_frame_size: usize,
}

impl Default for LlrpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            close_timeout: Duration::from_millis(500),
            max_frame_size: 1024 * 1024,
        }
    }
}

impl LlrpConfig {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

struct Link {
    address: ReaderAddress,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Driver for LLRP readers.
pub struct LlrpDriver {
    config: LlrpConfig,
    decoder: Arc<dyn ReportDecoder>,
    callback: Option<ReportCallback>,
    link: Option<Link>,
}

impl LlrpDriver {
    pub fn new(config: LlrpConfig) -> Self {
        Self::with_decoder(config, Arc::new(OpaqueReportDecoder))
    }

    pub fn with_decoder(config: LlrpConfig, decoder: Arc<dyn ReportDecoder>) -> Self {
        Self {
            config,
            decoder,
            callback: None,
            link: None,
        }
    }

    pub fn config(&self) -> &LlrpConfig {
        &self.config
    }

    /// Connect and wait for the reader's first event notification.
    async fn handshake(&self, address: &ReaderAddress) -> Result<LlrpStream> {
        let stream = TcpStream::connect((address.host.as_str(), address.port))
            .await
            .map_err(|e| HardwareError::connection_failed(address.to_string(), e.to_string()))?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {} - report latency may be impacted", e);
        }

        let mut framed = Framed::new(stream, LlrpCodec::with_max_frame_size(self.config.max_frame_size));

        loop {
            match framed.next().await {
                Some(Ok(frame)) => match frame.message_type {
                    MessageType::ReaderEventNotification => {
                        debug!(message_id = frame.message_id, "reader accepted connection");
                        return Ok(framed);
                    }
                    MessageType::Keepalive => {
                        framed.send(LlrpFrame::keepalive_ack(frame.message_id)).await?;
                    }
                    other => {
                        trace!(message_type = %other, "ignoring frame before reader event");
                    }
                },
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(HardwareError::connection_failed(
                        address.to_string(),
                        "reader closed the connection during handshake",
                    ));
                }
            }
        }
    }

    async fn read_loop(
        mut framed: LlrpStream,
        decoder: Arc<dyn ReportDecoder>,
        callback: ReportCallback,
        cancel: CancellationToken,
        close_timeout: Duration,
        mut next_id: u32,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let close = framed.send(LlrpFrame::close_connection(next_id));
                    match tokio::time::timeout(close_timeout, close).await {
                        Ok(Ok(())) => debug!("CLOSE_CONNECTION sent"),
                        Ok(Err(e)) => warn!("Error sending CLOSE_CONNECTION: {}", e),
                        Err(_) => warn!("CLOSE_CONNECTION timeout ({}ms)", close_timeout.as_millis()),
                    }
                    return;
                }
                frame = framed.next() => match frame {
                    Some(Ok(frame)) => {
                        if let Err(e) = Self::handle_frame(&mut framed, frame, decoder.as_ref(), &callback).await {
                            error!(error = %e, "LLRP link failed");
                            callback(DriverReport::Fault { message: e.to_string() });
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "LLRP stream error");
                        callback(DriverReport::Fault { message: e.to_string() });
                        return;
                    }
                    None => {
                        warn!("Reader closed the connection");
                        callback(DriverReport::Fault {
                            message: "reader closed the connection".to_string(),
                        });
                        return;
                    }
                },
            }
            next_id = next_id.wrapping_add(1);
        }
    }

    async fn handle_frame(
        framed: &mut LlrpStream,
        frame: LlrpFrame,
        decoder: &dyn ReportDecoder,
        callback: &ReportCallback,
    ) -> Result<()> {
        match frame.message_type {
            MessageType::Keepalive => {
                trace!(message_id = frame.message_id, "answering KEEPALIVE");
                framed.send(LlrpFrame::keepalive_ack(frame.message_id)).await?;
            }
            MessageType::RoAccessReport => {
                let readings = decoder.decode(&frame);
                if !readings.is_empty() {
                    trace!(count = readings.len(), "tag report decoded");
                    callback(DriverReport::Readings(readings));
                }
            }
            MessageType::ErrorMessage => {
                warn!(message_id = frame.message_id, "reader sent ERROR_MESSAGE");
            }
            other => {
                trace!(message_type = %other, message_id = frame.message_id, "unhandled LLRP frame");
            }
        }
        Ok(())
    }
}

impl Default for LlrpDriver {
    fn default() -> Self {
        Self::new(LlrpConfig::default())
    }
}

// A driver dropped mid-session (e.g. an aborted connect task) must not
// leave its read loop running
impl Drop for LlrpDriver {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            link.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for LlrpDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlrpDriver")
            .field("config", &self.config)
            .field("address", &self.link.as_ref().map(|l| l.address.to_string()))
            .finish()
    }
}

impl ReaderDriver for LlrpDriver {
    fn register_callback(&mut self, callback: ReportCallback) {
        self.callback = Some(callback);
    }

    async fn connect(&mut self, address: &str) -> Result<()> {
        if self.link.is_some() {
            return Ok(());
        }

        let callback = self
            .callback
            .clone()
            .ok_or_else(|| HardwareError::configuration("callback must be registered before connect"))?;
        let address: ReaderAddress = address.parse()?;

        info!("Connecting to LLRP reader at {}", address);

        let timeout = self.config.connect_timeout;
        let mut framed = match tokio::time::timeout(timeout, self.handshake(&address)).await {
            Ok(Ok(framed)) => framed,
            Ok(Err(e)) => {
                error!("Connection failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                warn!("Connection timeout after {}ms", timeout.as_millis());
                return Err(HardwareError::timeout(timeout.as_millis() as u64));
            }
        };

        let mut next_id = 1u32;
        for mut frame in self.decoder.startup_frames() {
            frame.message_id = next_id;
            next_id = next_id.wrapping_add(1);
            framed.send(frame).await?;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::read_loop(
            framed,
            self.decoder.clone(),
            callback,
            cancel.clone(),
            self.config.close_timeout,
            next_id,
        ));

        info!("Connected to LLRP reader at {}", address);
        self.link = Some(Link {
            address,
            cancel,
            task,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(link) = self.link.take() {
            info!("Closing connection to {}", link.address);
            link.cancel.cancel();
            if let Err(e) = link.task.await {
                debug!(error = %e, "LLRP read loop ended abnormally");
            }
        }

        self.callback = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| !link.task.is_finished())
    }

    fn name(&self) -> &str {
        "llrp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = LlrpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.close_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_opaque_decoder_yields_nothing() {
        let decoder = OpaqueReportDecoder;
        let frame = LlrpFrame::new(MessageType::RoAccessReport, 1, vec![0u8; 16]);
        assert!(decoder.decode(&frame).is_empty());
        assert!(decoder.startup_frames().is_empty());
    }

    #[tokio::test]
    async fn test_connect_without_callback_fails() {
        let mut driver = LlrpDriver::default();
        let result = driver.connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(HardwareError::ConfigurationError { .. })));
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let mut driver = LlrpDriver::default();
        driver.register_callback(Arc::new(|_| {}));
        let result = driver.connect("reader:notaport").await;
        assert!(matches!(result, Err(HardwareError::InvalidAddress(_))));
    }
}

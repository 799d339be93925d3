//! Network sender seam

use crate::Result;

/// Transmits framed stream records off the recorder.
///
/// Implementations own their link; the recorder never retries a failed send.
#[async_trait::async_trait]
pub trait NetworkSender: Send + Sync + 'static {
    /// Send one framed record under `message_id`.
    async fn send(&self, message_id: u16, bytes: Vec<u8>) -> Result<()>;
}

/// Sender for recorders without a network link. Accepts and discards.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSender;

#[async_trait::async_trait]
impl NetworkSender for NullSender {
    async fn send(&self, _message_id: u16, _bytes: Vec<u8>) -> Result<()> {
        Ok(())
    }
}

use crate::error::{AmpError, Result};
use crate::status::ZoneStatus;
use tokio::sync::broadcast;

/// Receiver for decoded status replies
///
/// Every status line the amplifier sends is delivered, whether or not a
/// query is waiting on it.
pub struct StatusReceiver {
    rx: broadcast::Receiver<ZoneStatus>,
}

impl StatusReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<ZoneStatus>) -> Self {
        Self { rx }
    }

    /// Receive the next status update
    ///
    /// Fails with [`AmpError::ConnectionClosed`] once the monitor is gone and
    /// with [`AmpError::Lagged`] if this receiver fell behind.
    pub async fn recv(&mut self) -> Result<ZoneStatus> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => AmpError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => AmpError::Lagged(n),
        })
    }

    /// Try to receive a status update without waiting
    pub fn try_recv(&mut self) -> Result<Option<ZoneStatus>> {
        match self.rx.try_recv() {
            Ok(status) => Ok(Some(status)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(AmpError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(AmpError::Lagged(n)),
        }
    }
}

//! ZifController -- the [`ZifSocket`] implementation.
//!
//! A thin translator from the device-family calls to frames run through
//! the [`ZifIo`] task.

use async_trait::async_trait;

use labwire_core::device::ZifSocket;
use labwire_core::error::Result;
use labwire_core::transport::Transport;

use crate::frame::{self, Frame};
use crate::io::{ZifConfig, ZifIo};

/// A ZIF socket controller on one serial link.
pub struct ZifController {
    io: ZifIo,
}

impl ZifController {
    /// Take ownership of `transport` and start the IO task.
    pub fn new(transport: Box<dyn Transport>, config: ZifConfig) -> Self {
        ZifController {
            io: ZifIo::spawn(transport, config),
        }
    }

    /// Stop the IO task and return the closed transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        self.io.shutdown().await
    }
}

#[async_trait]
impl ZifSocket for ZifController {
    async fn version(&self) -> Result<String> {
        let data = self.io.exchange(Frame::version()).await?;
        frame::parse_version(&data)
    }

    async fn serial_number(&self) -> Result<u32> {
        let data = self.io.exchange(Frame::serial_number()).await?;
        frame::parse_serial_number(&data)
    }

    async fn set_active(&self, socket: u8, on: bool) -> Result<()> {
        tracing::debug!(socket, on, "set socket active");
        self.io.exchange(Frame::set_active(socket, on)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labwire_core::error::Error;
    use labwire_test_harness::MockTransport;

    fn controller(mock: MockTransport) -> ZifController {
        ZifController::new(Box::new(mock), ZifConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn version_reports_major_dot_minor() {
        let mut mock = MockTransport::new();
        mock.expect(&[0xC2], &[0x06, 0x01, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(controller(mock).version().await.unwrap(), "1.2");
    }

    #[tokio::test(start_paused = true)]
    async fn serial_number_is_little_endian() {
        let mut mock = MockTransport::new();
        let data = [0x78, 0x56, 0x34, 0x12];
        let sum = frame::checksum(0xC4, &data);
        mock.expect(&[0xC4], &[0x06, 0x78, 0x56, 0x34, 0x12, sum]);
        assert_eq!(controller(mock).serial_number().await.unwrap(), 0x1234_5678);
    }

    #[tokio::test(start_paused = true)]
    async fn set_active_sends_checksummed_frame() {
        let mut mock = MockTransport::new();
        mock.expect(&[0xC3, 0x02, 0x00, 0xC5], &[0x06]);
        let sent = mock.sent_log();
        controller(mock).set_active(2, false).await.unwrap();
        assert_eq!(sent.commands(), vec![vec![0xC3, 0x02, 0x00, 0xC5]]);
    }

    #[tokio::test(start_paused = true)]
    async fn set_active_nak_propagates() {
        let mut mock = MockTransport::new();
        mock.expect(&[0xC3, 0x09, 0x01, 0xCD], &[0x15]);
        let result = controller(mock).set_active(9, true).await;
        assert!(matches!(result, Err(Error::Nak)));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_succeeds_with_version() {
        let mut mock = MockTransport::new();
        mock.expect(&[0xC2], &[0x06, 0x0A, 0x00, 0x00, 0x00, 0x01]);
        let result = controller(mock).probe().await;
        assert!(result.successful);
        assert_eq!(result.detail, "10.1");
    }

    #[tokio::test(start_paused = true)]
    async fn probe_swallows_failure() {
        let mut mock = MockTransport::new();
        mock.expect(&[0xC2], &[0x99]);
        let result = controller(mock).probe().await;
        assert!(!result.successful);
        assert!(result.detail.contains("0x99"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_transport() {
        let transport = controller(MockTransport::new()).shutdown().await.unwrap();
        assert!(!transport.is_connected());
    }
}

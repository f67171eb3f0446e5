//! RefMeter -- the [`ReferenceMeter`] implementation.
//!
//! The adapter builds requests with [`commands`], hands them to a
//! [`Dispatcher`] and parses the replies. It never touches the transport.
//!
//! The meter cannot report which measurement mode is active, so the adapter
//! remembers the last mode it set successfully. That value is assumed state:
//! if someone switches the mode at the front panel, the cache is stale.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use labwire_core::device::ReferenceMeter;
use labwire_core::dispatcher::Dispatcher;
use labwire_core::error::{Error, Result};
use labwire_core::transport::Transport;
use labwire_core::types::*;
use labwire_text_io::{Connection, IoConfig};

use crate::{commands, models};

/// A reference meter driven through a dispatcher.
///
/// `D` is normally the text [`Connection`]; tests may plug in any
/// [`Dispatcher`].
pub struct RefMeter<D = Connection> {
    dispatcher: D,
    actual_mode: Mutex<Option<MeasurementMode>>,
}

impl<D: Dispatcher> RefMeter<D> {
    pub fn new(dispatcher: D) -> Self {
        RefMeter {
            dispatcher,
            actual_mode: Mutex::new(None),
        }
    }

    /// The dispatcher this meter submits to.
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    fn cached_mode(&self) -> Option<MeasurementMode> {
        *self.actual_mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cache_mode(&self, mode: MeasurementMode) {
        *self.actual_mode.lock().unwrap_or_else(|e| e.into_inner()) = Some(mode);
    }
}

impl RefMeter<Connection> {
    /// Start a dispatcher over `transport` and wrap it.
    pub fn from_transport(transport: Box<dyn Transport>, config: IoConfig) -> Self {
        RefMeter::new(Connection::spawn(transport, config))
    }

    /// Stop the dispatcher and return the closed transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        self.dispatcher.shutdown().await
    }
}

#[async_trait]
impl<D: Dispatcher> ReferenceMeter for RefMeter<D> {
    async fn version(&self) -> Result<DeviceVersion> {
        let reply = self.dispatcher.execute_one(commands::req_version()).await?;
        commands::parse_version(&reply)
    }

    async fn measure(&self) -> Result<MeasuredValues> {
        let reply = self.dispatcher.execute_one(commands::req_measure()).await?;
        commands::parse_measurement(&reply)
    }

    async fn supported_measurement_modes(&self) -> Result<Vec<MeasurementMode>> {
        let reply = self
            .dispatcher
            .execute_one(commands::req_measurement_modes()?)
            .await?;
        commands::parse_measurement_modes(&reply)
    }

    async fn set_actual_measurement_mode(&self, mode: MeasurementMode) -> Result<()> {
        let code = models::code_for_mode(mode)
            .ok_or_else(|| Error::Unsupported(format!("no device code for mode {mode}")))?;
        self.dispatcher
            .execute_one(commands::req_set_measurement_mode(code))
            .await?;
        debug!(mode = %mode, code = %code, "measurement mode set");
        self.cache_mode(mode);
        Ok(())
    }

    fn actual_measurement_mode(&self) -> Option<MeasurementMode> {
        self.cached_mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use labwire_core::request::{PendingReply, Reply, TextRequest};
    use labwire_test_harness::MockTransport;

    fn meter(mock: MockTransport) -> RefMeter {
        RefMeter::from_transport(Box::new(mock), IoConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn version_from_aav() {
        let mut mock = MockTransport::new();
        mock.expect(b"AAV\r", b"MT786V06.27\rAAVACK\r");
        let v = meter(mock).version().await.unwrap();
        assert_eq!(v, DeviceVersion::new("MT786", "06.27"));
    }

    #[tokio::test(start_paused = true)]
    async fn measure_from_ame() {
        let mut mock = MockTransport::new();
        mock.expect(b"AME\r", b"0;230.0\r3;5.0\r24;50.00\rAMEACK\r");
        let values = meter(mock).measure().await.unwrap();
        assert_eq!(values.voltages[0], 230.0);
        assert_eq!(values.currents[0], 5.0);
        assert_eq!(values.frequency, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn modes_skip_noise_and_unsupported_codes() {
        let mut mock = MockTransport::new();
        mock.expect(b"MI\r", b"MIxxx\rERR\rjunk\rMI3LW;4LX;MQBase;\r");
        let modes = meter(mock).supported_measurement_modes().await.unwrap();
        assert_eq!(
            modes,
            vec![MeasurementMode::ThreeWireActivePower, MeasurementMode::MqBase]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn set_mode_round_trips_through_cache() {
        let mut mock = MockTransport::new();
        mock.expect(b"MA3LW\r", b"OKMA\r");
        let sent = mock.sent_log();
        let meter = meter(mock);

        assert_eq!(meter.actual_measurement_mode(), None);
        meter
            .set_actual_measurement_mode(MeasurementMode::ThreeWireActivePower)
            .await
            .unwrap();
        assert_eq!(
            meter.actual_measurement_mode(),
            Some(MeasurementMode::ThreeWireActivePower)
        );
        assert_eq!(sent.lines(), vec!["MA3LW"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_set_keeps_previous_mode() {
        let mut mock = MockTransport::new();
        mock.expect(b"MA4LW\r", b"OKMA\r");
        mock.expect(b"MA2LS\r", b"");
        let meter = meter(mock);

        meter
            .set_actual_measurement_mode(MeasurementMode::FourWireActivePower)
            .await
            .unwrap();
        let result = meter
            .set_actual_measurement_mode(MeasurementMode::TwoWireApparentPower)
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(
            meter.actual_measurement_mode(),
            Some(MeasurementMode::FourWireActivePower)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_transport() {
        let transport = meter(MockTransport::new()).shutdown().await.unwrap();
        assert!(!transport.is_connected());
    }

    /// Answers every request with a fixed reply, recording the commands.
    struct CannedDispatcher {
        lines: Vec<String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Dispatcher for CannedDispatcher {
        async fn execute(&self, requests: Vec<TextRequest>) -> Result<Vec<PendingReply>> {
            let mut pending = Vec::new();
            for request in requests {
                self.seen.lock().unwrap().push(request.command().to_string());
                let (tx, rx) = PendingReply::channel();
                tx.send(Ok(Reply::new(self.lines.clone()))).unwrap();
                pending.push(rx);
            }
            Ok(pending)
        }
    }

    #[tokio::test]
    async fn works_over_any_dispatcher() {
        let meter = RefMeter::new(CannedDispatcher {
            lines: vec!["FG301V1.04".into(), "AAVACK".into()],
            seen: Mutex::new(Vec::new()),
        });
        let v = tokio::time::timeout(Duration::from_secs(1), meter.version())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(v.model_name, "FG301");
        assert_eq!(*meter.dispatcher().seen.lock().unwrap(), vec!["AAV"]);
    }
}

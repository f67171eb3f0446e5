//! SourceDevice -- the [`Source`] implementation.
//!
//! Loadpoints are validated against the model limits before anything is
//! sent, then programmed as one batch of four requests. The batch is
//! submitted in one go so no other caller's command can interleave with it.
//!
//! The source has no readback for its outputs. [`Source::current_loadpoint`]
//! returns what this adapter last programmed successfully; after a failed
//! batch the output state is unknown and the cache is cleared.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use labwire_core::device::Source;
use labwire_core::dispatcher::Dispatcher;
use labwire_core::error::Result;
use labwire_core::transport::Transport;
use labwire_core::types::*;
use labwire_text_io::{Connection, IoConfig};

use crate::{commands, models};

/// A programmable source driven through a dispatcher.
pub struct SourceDevice<D = Connection> {
    dispatcher: D,
    capabilities: Mutex<Option<SourceCapabilities>>,
    loadpoint: Mutex<Option<Loadpoint>>,
}

impl<D: Dispatcher> SourceDevice<D> {
    pub fn new(dispatcher: D) -> Self {
        SourceDevice {
            dispatcher,
            capabilities: Mutex::new(None),
            loadpoint: Mutex::new(None),
        }
    }

    /// The dispatcher this source submits to.
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    fn store_loadpoint(&self, loadpoint: Option<Loadpoint>) {
        *self.loadpoint.lock().unwrap_or_else(|e| e.into_inner()) = loadpoint;
    }
}

impl SourceDevice<Connection> {
    /// Start a dispatcher over `transport` and wrap it.
    pub fn from_transport(transport: Box<dyn Transport>, config: IoConfig) -> Self {
        SourceDevice::new(Connection::spawn(transport, config))
    }

    /// Stop the dispatcher and return the closed transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        self.dispatcher.shutdown().await
    }
}

#[async_trait]
impl<D: Dispatcher> Source for SourceDevice<D> {
    async fn version(&self) -> Result<DeviceVersion> {
        let reply = self.dispatcher.execute_one(commands::req_version()).await?;
        let line = reply.body().last().map(String::as_str).unwrap_or_default();
        DeviceVersion::parse(line)
    }

    /// Looked up once from the reported model name, then cached.
    async fn capabilities(&self) -> Result<SourceCapabilities> {
        let cached = self
            .capabilities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(caps) = cached {
            return Ok(caps);
        }
        let version = self.version().await?;
        let caps = models::capabilities_for(&version.model_name)?;
        debug!(model = %caps.model, "source capabilities resolved");
        *self.capabilities.lock().unwrap_or_else(|e| e.into_inner()) = Some(caps.clone());
        Ok(caps)
    }

    async fn set_loadpoint(&self, loadpoint: &Loadpoint) -> Result<()> {
        let caps = self.capabilities().await?;
        commands::validate_loadpoint(loadpoint, &caps)?;

        let result = self
            .dispatcher
            .execute_all(commands::loadpoint_requests(loadpoint))
            .await;
        match result {
            Ok(_) => {
                debug!(frequency = loadpoint.frequency, "loadpoint programmed");
                self.store_loadpoint(Some(*loadpoint));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "loadpoint programming failed, output state unknown");
                self.store_loadpoint(None);
                Err(e)
            }
        }
    }

    fn current_loadpoint(&self) -> Option<Loadpoint> {
        *self.loadpoint.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn turn_off(&self) -> Result<()> {
        self.dispatcher.execute_one(commands::req_turn_off()).await?;
        debug!("source outputs switched off");
        self.store_loadpoint(None);
        Ok(())
    }
}

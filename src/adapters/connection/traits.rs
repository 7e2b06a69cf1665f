//! Connection capability
//!
//! Every transport implements the same receive/send contract. A connection
//! is opened per transfer by [`super::ConnectionFactory::connect`] (or
//! supplied by the caller, for RPC) and closed when the transfer ends.

use crate::adapters::store::Session;
use crate::config::schema::{GatewayConfig, PathConfig};
use crate::domain::{Attachment, Result, Transfer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// What a backend may touch while serving one transfer
pub struct TransferContext<'a> {
    pub session: &'a mut dyn Session,
    pub gateway: &'a GatewayConfig,
    pub transfer: &'a Transfer,
    /// Reference time for age windows
    pub now: DateTime<Utc>,
}

/// An open transport
#[async_trait]
pub trait Connection: Send {
    /// Fetches new inputs on `path` and stores them as attachments
    async fn receive_inputs(
        &mut self,
        cx: &mut TransferContext<'_>,
        path: &PathConfig,
    ) -> Result<Vec<Attachment>>;

    /// Delivers eligible outputs to `path`, returning the ones actually sent
    async fn send_outputs(
        &mut self,
        cx: &mut TransferContext<'_>,
        path: &PathConfig,
    ) -> Result<Vec<Attachment>>;

    /// Releases the transport
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

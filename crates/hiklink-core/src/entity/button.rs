// ── Call buttons ──
//
// Answer, cancel and hang up an intercom call on an indoor station.

use std::sync::Arc;

use tracing::info;

use hiklink_api::{CallOperation, Device, HikConnectApi};

use super::{Entity, Platform, unique_id};
use crate::entry::EntryContext;
use crate::error::CoreError;
use crate::registry::DeviceIdentifier;

pub struct CallButton<A: HikConnectApi> {
    ctx: Arc<EntryContext<A>>,
    device: Device,
    operation: CallOperation,
}

impl<A: HikConnectApi> CallButton<A> {
    pub fn new(ctx: Arc<EntryContext<A>>, device: Device, operation: CallOperation) -> Self {
        Self {
            ctx,
            device,
            operation,
        }
    }

    /// One button per call operation.
    pub fn all_for(ctx: &Arc<EntryContext<A>>, device: &Device) -> Vec<Self> {
        CallOperation::ALL
            .into_iter()
            .map(|op| Self::new(Arc::clone(ctx), device.clone(), op))
            .collect()
    }

    pub fn operation(&self) -> CallOperation {
        self.operation
    }

    pub async fn press(&self) -> Result<(), CoreError> {
        self.ctx
            .api()
            .call_operation(&self.device.serial, self.operation)
            .await?;
        info!(serial = %self.device.serial, operation = %self.operation, "call operation sent");
        Ok(())
    }
}

impl<A: HikConnectApi> Entity for CallButton<A> {
    fn platform(&self) -> Platform {
        Platform::Button
    }

    fn unique_id(&self) -> String {
        unique_id(&[&self.device.id, &format!("{}-call", self.operation)])
    }

    fn name(&self) -> String {
        format!("{} {} call", self.device.name, self.operation)
    }

    fn icon(&self) -> &'static str {
        match self.operation {
            CallOperation::Answer => "mdi:phone",
            CallOperation::Cancel | CallOperation::Hangup => "mdi:phone-hangup",
        }
    }

    fn device_identifier(&self) -> DeviceIdentifier {
        DeviceIdentifier::new(self.device.id.clone())
    }
}

//! Discrete proximity switch. One detector per GPIO pin.

use async_trait::async_trait;

use super::PresenceSource;
use crate::hardware::{offload, BinarySwitch, HardwareError, Shared};
use crate::types::SourceId;

pub struct ProximitySwitch {
    pin: u8,
    switch: Shared<dyn BinarySwitch>,
}

impl ProximitySwitch {
    pub fn new(pin: u8, switch: Shared<dyn BinarySwitch>) -> Self {
        Self { pin, switch }
    }
}

#[async_trait]
impl PresenceSource for ProximitySwitch {
    async fn poll_presence(&mut self) -> Result<bool, HardwareError> {
        offload(&self.switch, |s| s.read()).await
    }

    fn source_id(&self) -> SourceId {
        SourceId::Proximity { pin: self.pin }
    }
}

use super::{AdapterFactory, BusAdapter, EventSink, InterfaceName};
use crate::error::BusError;

/// Factory for platforms without any CAN transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHardware;

impl AdapterFactory for NoHardware {
    fn create(
        &self,
        interface: &InterfaceName,
        _events: EventSink,
    ) -> Result<Box<dyn BusAdapter>, BusError> {
        Err(BusError::DeviceCreationFailed {
            interface: interface.to_string(),
            reason: "no CAN bus support available".to_string(),
        })
    }
}

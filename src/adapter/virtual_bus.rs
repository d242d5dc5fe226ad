//! In-process CAN segments.
//!
//! A [`VirtualBus`] is a table of named segments (`vcan0`, `vcan1`, ...).
//! Adapters created through it join a segment on `connect`; [`VirtualPeer`]
//! nodes stand in for the other ECUs on the wire. A frame sent by any node
//! reaches every other node on the same segment, never the sender itself.

use super::{AdapterEvent, AdapterFactory, BusAdapter, DeviceState, EventSink, InterfaceName};
use crate::error::BusError;
use crate::frame::CanFrame;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

type NodeId = u64;

#[derive(Debug)]
enum NodeLink {
    Adapter(EventSink),
    Peer(mpsc::UnboundedSender<CanFrame>),
}

#[derive(Debug, Default)]
struct Segment {
    nodes: Vec<(NodeId, NodeLink)>,
    refuse_connect: bool,
}

impl Segment {
    fn deliver(&mut self, from: NodeId, frame: CanFrame) -> usize {
        let mut delivered = 0;
        self.nodes.retain(|(node, link)| {
            if *node == from {
                return true;
            }
            let alive = match link {
                NodeLink::Adapter(sink) => sink.emit(AdapterEvent::FramesReceived(vec![frame])),
                NodeLink::Peer(tx) => tx.send(frame).is_ok(),
            };
            if alive {
                delivered += 1;
            }
            alive
        });
        delivered
    }

    fn notify_adapters(&self, event: &AdapterEvent) {
        for (_, link) in &self.nodes {
            if let NodeLink::Adapter(sink) = link {
                sink.emit(event.clone());
            }
        }
    }
}

#[derive(Debug, Default)]
struct BusTable {
    segments: HashMap<String, Segment>,
    next_node: NodeId,
}

impl BusTable {
    fn segment(&mut self, interface: &str) -> Result<&mut Segment, BusError> {
        self.segments
            .get_mut(interface)
            .ok_or_else(|| BusError::Bus(format!("interface {interface} is down")))
    }

    fn allocate_node(&mut self) -> NodeId {
        self.next_node += 1;
        self.next_node
    }

    fn detach(&mut self, interface: &str, node: NodeId) {
        if let Some(segment) = self.segments.get_mut(interface) {
            segment.nodes.retain(|(id, _)| *id != node);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VirtualBus {
    table: Arc<Mutex<BusTable>>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus with the given interfaces already up.
    pub fn with_interfaces<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let bus = Self::new();
        for name in names {
            bus.add_interface(name);
        }
        bus
    }

    fn lock(&self) -> MutexGuard<'_, BusTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_interface(&self, name: &str) {
        self.lock().segments.entry(name.to_string()).or_default();
    }

    /// Take an interface down. Connected adapters see the link drop.
    pub fn remove_interface(&self, name: &str) {
        if let Some(segment) = self.lock().segments.remove(name) {
            segment.notify_adapters(&AdapterEvent::StateChanged(DeviceState::Unconnected));
        }
    }

    /// Make connection handshakes on `name` fail.
    pub fn set_refuse_connect(&self, name: &str, refuse: bool) {
        if let Some(segment) = self.lock().segments.get_mut(name) {
            segment.refuse_connect = refuse;
        }
    }

    pub fn has_interface(&self, name: &str) -> bool {
        self.lock().segments.contains_key(name)
    }

    /// Number of adapters currently joined to `name`.
    pub fn adapter_count(&self, name: &str) -> usize {
        self.lock().segments.get(name).map_or(0, |segment| {
            segment
                .nodes
                .iter()
                .filter(|(_, link)| matches!(link, NodeLink::Adapter(_)))
                .count()
        })
    }

    /// Join `interface` as a plain node.
    pub fn peer(&self, interface: &str) -> Result<VirtualPeer, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut table = self.lock();
        let node = table.allocate_node();
        table.segment(interface)?.nodes.push((node, NodeLink::Peer(tx)));
        Ok(VirtualPeer {
            bus: self.clone(),
            interface: interface.to_string(),
            node,
            rx,
        })
    }
}

impl AdapterFactory for VirtualBus {
    fn create(
        &self,
        interface: &InterfaceName,
        events: EventSink,
    ) -> Result<Box<dyn BusAdapter>, BusError> {
        if !self.has_interface(interface) {
            return Err(BusError::DeviceCreationFailed {
                interface: interface.to_string(),
                reason: "no such virtual interface".to_string(),
            });
        }
        Ok(Box::new(VirtualAdapter {
            bus: self.clone(),
            interface: *interface,
            node: None,
            events,
        }))
    }

    fn available_interfaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().segments.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug)]
pub struct VirtualAdapter {
    bus: VirtualBus,
    interface: InterfaceName,
    node: Option<NodeId>,
    events: EventSink,
}

impl BusAdapter for VirtualAdapter {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn connect(&mut self) -> Result<(), BusError> {
        if self.node.is_some() {
            return Ok(());
        }
        let mut table = self.bus.lock();
        let node = table.allocate_node();
        let segment = table.segment(&self.interface).map_err(|e| BusError::ConnectFailed {
            interface: self.interface.to_string(),
            reason: e.to_string(),
        })?;
        if segment.refuse_connect {
            return Err(BusError::ConnectFailed {
                interface: self.interface.to_string(),
                reason: "handshake refused".to_string(),
            });
        }
        segment
            .nodes
            .push((node, NodeLink::Adapter(self.events.clone())));
        drop(table);

        self.node = Some(node);
        debug!("Virtual adapter joined {} as node {}", self.interface, node);
        self.events
            .emit(AdapterEvent::StateChanged(DeviceState::Connecting));
        self.events
            .emit(AdapterEvent::StateChanged(DeviceState::Connected));
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(node) = self.node.take() {
            self.bus.lock().detach(&self.interface, node);
            debug!("Virtual adapter left {}", self.interface);
            self.events
                .emit(AdapterEvent::StateChanged(DeviceState::Unconnected));
        }
    }

    fn send(&mut self, frame: &CanFrame) -> Result<(), BusError> {
        let node = self
            .node
            .ok_or_else(|| BusError::Bus("adapter not connected".to_string()))?;
        let delivered = self.bus.lock().segment(&self.interface)?.deliver(node, *frame);
        trace!("{} delivered to {} node(s)", frame, delivered);
        Ok(())
    }
}

impl Drop for VirtualAdapter {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            self.bus.lock().detach(&self.interface, node);
        }
    }
}

/// Another node on a virtual segment.
#[derive(Debug)]
pub struct VirtualPeer {
    bus: VirtualBus,
    interface: String,
    node: NodeId,
    rx: mpsc::UnboundedReceiver<CanFrame>,
}

impl VirtualPeer {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Put a frame on the wire. Returns how many nodes received it.
    pub fn send(&self, frame: CanFrame) -> Result<usize, BusError> {
        Ok(self.bus.lock().segment(&self.interface)?.deliver(self.node, frame))
    }

    /// Next frame sent by another node, if one is waiting.
    pub fn try_recv(&mut self) -> Option<CanFrame> {
        self.rx.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<CanFrame> {
        self.rx.recv().await
    }

    /// Report a bus fault to every adapter on the segment.
    pub fn inject_error(&self, message: &str) -> Result<(), BusError> {
        self.bus
            .lock()
            .segment(&self.interface)?
            .notify_adapters(&AdapterEvent::ErrorOccurred(message.to_string()));
        Ok(())
    }
}

impl Drop for VirtualPeer {
    fn drop(&mut self) {
        self.bus.lock().detach(&self.interface, self.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{interface_name, SessionEvent, SessionId};

    fn open(bus: &VirtualBus, name: &str) -> (Box<dyn BusAdapter>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = bus
            .create(&interface_name(name).unwrap(), EventSink::new(SessionId(1), tx))
            .unwrap();
        (adapter, rx)
    }

    #[test]
    fn test_create_unknown_interface_fails() {
        let bus = VirtualBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = bus.create(&interface_name("vcan9").unwrap(), EventSink::new(SessionId(1), tx));
        assert!(matches!(result, Err(BusError::DeviceCreationFailed { .. })));
    }

    #[test]
    fn test_connect_reports_state() {
        let bus = VirtualBus::with_interfaces(["vcan0"]);
        let (mut adapter, mut rx) = open(&bus, "vcan0");
        adapter.connect().unwrap();
        assert_eq!(bus.adapter_count("vcan0"), 1);
        assert_eq!(
            rx.try_recv().unwrap().event,
            AdapterEvent::StateChanged(DeviceState::Connecting)
        );
        assert_eq!(
            rx.try_recv().unwrap().event,
            AdapterEvent::StateChanged(DeviceState::Connected)
        );
        adapter.disconnect();
        assert_eq!(bus.adapter_count("vcan0"), 0);
    }

    #[test]
    fn test_refused_handshake() {
        let bus = VirtualBus::with_interfaces(["vcan0"]);
        bus.set_refuse_connect("vcan0", true);
        let (mut adapter, _rx) = open(&bus, "vcan0");
        assert!(matches!(adapter.connect(), Err(BusError::ConnectFailed { .. })));
        assert_eq!(bus.adapter_count("vcan0"), 0);
    }

    #[test]
    fn test_frames_cross_between_adapter_and_peer() {
        let bus = VirtualBus::with_interfaces(["vcan0"]);
        let mut peer = bus.peer("vcan0").unwrap();
        let (mut adapter, mut rx) = open(&bus, "vcan0");
        adapter.connect().unwrap();
        while rx.try_recv().is_ok() {}

        let frame = CanFrame::new(0x123, [1, 2, 3, 4, 5, 6, 7, 8]);
        adapter.send(&frame).unwrap();
        assert_eq!(peer.try_recv(), Some(frame));

        assert_eq!(peer.send(frame).unwrap(), 1);
        assert_eq!(
            rx.try_recv().unwrap().event,
            AdapterEvent::FramesReceived(vec![frame])
        );
        // No echo back to the sender
        assert_eq!(peer.try_recv(), None);
    }

    #[test]
    fn test_dropping_adapter_leaves_segment() {
        let bus = VirtualBus::with_interfaces(["vcan0"]);
        let (mut adapter, _rx) = open(&bus, "vcan0");
        adapter.connect().unwrap();
        drop(adapter);
        assert_eq!(bus.adapter_count("vcan0"), 0);
    }

    #[test]
    fn test_available_interfaces_sorted() {
        let bus = VirtualBus::with_interfaces(["vcan1", "vcan0"]);
        assert_eq!(bus.available_interfaces(), vec!["vcan0", "vcan1"]);
    }
}

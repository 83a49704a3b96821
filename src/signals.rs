//! Synchronous notification hub.
//!
//! Handlers are keyed by [`SignalKind`] and run in registration order on the
//! thread that emits. A handler only sees the payload; it cannot re-enter the
//! emitter.

use std::rc::Rc;

use tracing::trace;

use crate::device::tool::DeviceTool;
use crate::device::DeviceId;
use crate::seat::SeatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    DeviceAdded(DeviceId),
    DeviceRemoved(DeviceId),
    DeviceChanged(DeviceId),
    SeatAdded(SeatId),
    SeatRemoved(SeatId),
    /// A slave joined a seat.
    SeatDeviceAdded { seat: SeatId, device: DeviceId },
    SeatDeviceRemoved { seat: SeatId, device: DeviceId },
    ToolAdded { seat: SeatId, tool: Rc<DeviceTool> },
    ToolRemoved { seat: SeatId, tool: Rc<DeviceTool> },
    MonitorAdded(MonitorId),
    MonitorRemoved(MonitorId),
    /// A device's axes or keys changed.
    Changed(DeviceId),
    ToolChanged {
        device: DeviceId,
        tool: Option<Rc<DeviceTool>>,
    },
    KeysChanged,
    StateChanged,
    DirectionChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    DeviceAdded,
    DeviceRemoved,
    DeviceChanged,
    SeatAdded,
    SeatRemoved,
    SeatDeviceAdded,
    SeatDeviceRemoved,
    ToolAdded,
    ToolRemoved,
    MonitorAdded,
    MonitorRemoved,
    Changed,
    ToolChanged,
    KeysChanged,
    StateChanged,
    DirectionChanged,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::DeviceAdded(_) => SignalKind::DeviceAdded,
            Signal::DeviceRemoved(_) => SignalKind::DeviceRemoved,
            Signal::DeviceChanged(_) => SignalKind::DeviceChanged,
            Signal::SeatAdded(_) => SignalKind::SeatAdded,
            Signal::SeatRemoved(_) => SignalKind::SeatRemoved,
            Signal::SeatDeviceAdded { .. } => SignalKind::SeatDeviceAdded,
            Signal::SeatDeviceRemoved { .. } => SignalKind::SeatDeviceRemoved,
            Signal::ToolAdded { .. } => SignalKind::ToolAdded,
            Signal::ToolRemoved { .. } => SignalKind::ToolRemoved,
            Signal::MonitorAdded(_) => SignalKind::MonitorAdded,
            Signal::MonitorRemoved(_) => SignalKind::MonitorRemoved,
            Signal::Changed(_) => SignalKind::Changed,
            Signal::ToolChanged { .. } => SignalKind::ToolChanged,
            Signal::KeysChanged => SignalKind::KeysChanged,
            Signal::StateChanged => SignalKind::StateChanged,
            Signal::DirectionChanged => SignalKind::DirectionChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Box<dyn FnMut(&Signal)>;

#[derive(Default)]
pub struct Signals {
    handlers: Vec<(HandlerId, Option<SignalKind>, Handler)>,
    next_id: u64,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for signals of `kind`.
    pub fn connect(&mut self, kind: SignalKind, handler: impl FnMut(&Signal) + 'static) -> HandlerId {
        self.insert(Some(kind), Box::new(handler))
    }

    /// Registers `handler` for every signal.
    pub fn connect_all(&mut self, handler: impl FnMut(&Signal) + 'static) -> HandlerId {
        self.insert(None, Box::new(handler))
    }

    fn insert(&mut self, kind: Option<SignalKind>, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, kind, handler));
        id
    }

    pub fn disconnect(&mut self, id: HandlerId) -> bool {
        let len = self.handlers.len();
        self.handlers.retain(|(handler_id, _, _)| *handler_id != id);
        self.handlers.len() != len
    }

    pub fn emit(&mut self, signal: Signal) {
        trace!("emitting {signal:?}");

        let kind = signal.kind();
        for (_, filter, handler) in &mut self.handlers {
            if filter.map_or(true, |filter| filter == kind) {
                handler(&signal);
            }
        }
    }
}

impl std::fmt::Debug for Signals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signals")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn handlers_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut signals = Signals::new();

        let first = log.clone();
        signals.connect(SignalKind::DeviceAdded, move |_| first.borrow_mut().push("first"));
        let second = log.clone();
        let id = signals.connect_all(move |_| second.borrow_mut().push("second"));
        let third = log.clone();
        signals.connect(SignalKind::DeviceAdded, move |_| third.borrow_mut().push("third"));

        signals.emit(Signal::DeviceAdded(DeviceId(1)));
        signals.emit(Signal::DeviceRemoved(DeviceId(1)));
        assert_eq!(*log.borrow(), ["first", "second", "third", "second"]);

        assert!(signals.disconnect(id));
        assert!(!signals.disconnect(id));
        signals.emit(Signal::DeviceRemoved(DeviceId(1)));
        assert_eq!(log.borrow().len(), 4);
    }
}

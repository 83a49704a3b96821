//! Seats: one user's master pair plus the slaves and tools feeding it.

use std::rc::Rc;

use bitflags::bitflags;

use crate::device::{DeviceId, DeviceTool, InputSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeatId(pub u32);

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SeatCapabilities: u32 {
        const POINTER = 1 << 0;
        const TOUCH = 1 << 1;
        const TABLET_STYLUS = 1 << 2;
        const KEYBOARD = 1 << 3;
        const ALL_POINTING = Self::POINTER.bits() | Self::TOUCH.bits() | Self::TABLET_STYLUS.bits();
        const ALL = Self::ALL_POINTING.bits() | Self::KEYBOARD.bits();
    }
}

impl SeatCapabilities {
    /// Capability contributed by a slave of the given source.
    ///
    /// Pads contribute nothing; they are still tracked as pointing slaves.
    pub fn for_source(source: InputSource) -> Self {
        match source {
            InputSource::Keyboard => Self::KEYBOARD,
            InputSource::Touchscreen => Self::TOUCH,
            InputSource::Pen | InputSource::Eraser | InputSource::Cursor => Self::TABLET_STYLUS,
            InputSource::Mouse | InputSource::Touchpad | InputSource::Trackpoint => Self::POINTER,
            InputSource::TabletPad => Self::empty(),
        }
    }
}

#[derive(Debug)]
pub struct Seat {
    id: SeatId,
    master_pointer: DeviceId,
    master_keyboard: DeviceId,
    /// Additional masters owned by the seat (touch master, one per tablet).
    extra_masters: Vec<(DeviceId, SeatCapabilities)>,
    slaves: Vec<(DeviceId, SeatCapabilities)>,
    tools: Vec<Rc<DeviceTool>>,
    /// Capabilities covered by the most recent grab.
    grabbed: SeatCapabilities,
}

impl Seat {
    pub(crate) fn new(id: SeatId, master_pointer: DeviceId, master_keyboard: DeviceId) -> Self {
        Self {
            id,
            master_pointer,
            master_keyboard,
            extra_masters: Vec::new(),
            slaves: Vec::new(),
            tools: Vec::new(),
            grabbed: SeatCapabilities::empty(),
        }
    }

    pub fn id(&self) -> SeatId {
        self.id
    }

    pub fn pointer(&self) -> DeviceId {
        self.master_pointer
    }

    pub fn keyboard(&self) -> DeviceId {
        self.master_keyboard
    }

    pub fn capabilities(&self) -> SeatCapabilities {
        let masters = self
            .extra_masters
            .iter()
            .fold(SeatCapabilities::POINTER | SeatCapabilities::KEYBOARD, |caps, (_, c)| {
                caps | *c
            });
        self.slaves
            .iter()
            .fold(masters, |caps, (_, slave_caps)| caps | *slave_caps)
    }

    /// Whether the device is one of this seat's masters or slaves.
    pub fn contains(&self, device: DeviceId) -> bool {
        self.is_master(device) || self.slaves.iter().any(|(id, _)| *id == device)
    }

    pub fn is_master(&self, device: DeviceId) -> bool {
        device == self.master_pointer
            || device == self.master_keyboard
            || self.extra_masters.iter().any(|(id, _)| *id == device)
    }

    /// The master matching exactly `caps`.
    pub fn get_master(&self, caps: SeatCapabilities) -> Option<DeviceId> {
        if caps == SeatCapabilities::POINTER {
            Some(self.master_pointer)
        } else if caps == SeatCapabilities::KEYBOARD {
            Some(self.master_keyboard)
        } else {
            self.extra_masters
                .iter()
                .find(|(_, c)| *c == caps)
                .map(|(id, _)| *id)
        }
    }

    /// Pointing masters whose capability intersects `caps`.
    pub fn get_master_pointers(&self, caps: SeatCapabilities) -> Vec<DeviceId> {
        let mut masters = Vec::new();
        if caps.contains(SeatCapabilities::POINTER) {
            masters.push(self.master_pointer);
        }
        masters.extend(
            self.extra_masters
                .iter()
                .filter(|(_, c)| c.intersects(caps))
                .map(|(id, _)| *id),
        );
        masters
    }

    /// Slaves whose capability intersects `caps`.
    pub fn get_slaves(&self, caps: SeatCapabilities) -> Vec<DeviceId> {
        self.slaves
            .iter()
            .filter(|(_, slave_caps)| {
                slave_caps.intersects(caps)
                    || (slave_caps.is_empty() && caps.contains(SeatCapabilities::POINTER))
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn slaves(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.slaves.iter().map(|(id, _)| *id)
    }

    pub fn tools(&self) -> &[Rc<DeviceTool>] {
        &self.tools
    }

    /// Looks up a tool by its serial and hardware id.
    pub fn get_tool(&self, serial: u64, hw_id: u64) -> Option<Rc<DeviceTool>> {
        self.tools
            .iter()
            .find(|tool| tool.matches(serial, hw_id))
            .cloned()
    }

    pub fn grabbed(&self) -> SeatCapabilities {
        self.grabbed
    }

    // =========================================================================
    // Mutation, driven by the device manager and the display
    // =========================================================================

    pub(crate) fn add_master(&mut self, device: DeviceId, caps: SeatCapabilities) {
        if !self.is_master(device) {
            self.extra_masters.push((device, caps));
        }
    }

    pub(crate) fn remove_master(&mut self, device: DeviceId) -> bool {
        let len = self.extra_masters.len();
        self.extra_masters.retain(|(id, _)| *id != device);
        self.extra_masters.len() != len
    }

    pub(crate) fn add_slave(&mut self, device: DeviceId, source: InputSource) -> bool {
        if self.slaves.iter().any(|(id, _)| *id == device) {
            return false;
        }
        self.slaves
            .push((device, SeatCapabilities::for_source(source)));
        true
    }

    pub(crate) fn remove_slave(&mut self, device: DeviceId) -> bool {
        let len = self.slaves.len();
        self.slaves.retain(|(id, _)| *id != device);
        self.slaves.len() != len
    }

    pub(crate) fn add_tool(&mut self, tool: Rc<DeviceTool>) -> bool {
        if self.tools.iter().any(|t| Rc::ptr_eq(t, &tool)) {
            return false;
        }
        self.tools.push(tool);
        true
    }

    pub(crate) fn remove_tool(&mut self, tool: &Rc<DeviceTool>) -> bool {
        let len = self.tools.len();
        self.tools.retain(|t| !Rc::ptr_eq(t, tool));
        self.tools.len() != len
    }

    pub(crate) fn set_grabbed(&mut self, caps: SeatCapabilities) {
        self.grabbed = caps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AxisFlags, DeviceToolType};

    #[test]
    fn capabilities_union_slaves_and_masters() {
        let mut seat = Seat::new(SeatId(1), DeviceId(2), DeviceId(3));
        assert_eq!(
            seat.capabilities(),
            SeatCapabilities::POINTER | SeatCapabilities::KEYBOARD
        );

        seat.add_slave(DeviceId(10), InputSource::Touchscreen);
        seat.add_slave(DeviceId(11), InputSource::Pen);
        seat.add_slave(DeviceId(12), InputSource::TabletPad);
        assert_eq!(seat.capabilities(), SeatCapabilities::ALL);

        assert_eq!(seat.get_slaves(SeatCapabilities::TOUCH), [DeviceId(10)]);
        assert_eq!(
            seat.get_slaves(SeatCapabilities::ALL_POINTING),
            [DeviceId(10), DeviceId(11), DeviceId(12)]
        );
        assert!(seat.get_slaves(SeatCapabilities::KEYBOARD).is_empty());

        assert!(seat.remove_slave(DeviceId(10)));
        assert!(!seat.remove_slave(DeviceId(10)));
        assert!(!seat.capabilities().contains(SeatCapabilities::TOUCH));
    }

    #[test]
    fn extra_masters() {
        let mut seat = Seat::new(SeatId(1), DeviceId(2), DeviceId(3));
        seat.add_master(DeviceId(4), SeatCapabilities::TOUCH);
        seat.add_master(DeviceId(5), SeatCapabilities::TABLET_STYLUS);

        assert_eq!(seat.get_master(SeatCapabilities::TOUCH), Some(DeviceId(4)));
        assert_eq!(
            seat.get_master_pointers(SeatCapabilities::ALL_POINTING),
            [DeviceId(2), DeviceId(4), DeviceId(5)]
        );
        assert_eq!(
            seat.get_master_pointers(SeatCapabilities::TABLET_STYLUS),
            [DeviceId(5)]
        );
        assert!(seat.is_master(DeviceId(5)));

        seat.remove_master(DeviceId(5));
        assert!(!seat.contains(DeviceId(5)));
    }

    #[test]
    fn tool_lookup_returns_existing() {
        let mut seat = Seat::new(SeatId(1), DeviceId(2), DeviceId(3));
        let tool = Rc::new(DeviceTool::new(
            0x1234,
            0x802,
            DeviceToolType::Pen,
            AxisFlags::PRESSURE,
        ));
        assert!(seat.add_tool(tool.clone()));
        assert!(!seat.add_tool(tool.clone()));

        let found = seat.get_tool(0x1234, 0x802).unwrap();
        assert!(Rc::ptr_eq(&found, &tool));
        assert!(seat.get_tool(0x1234, 0x803).is_none());
    }
}

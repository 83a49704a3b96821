//! Per-display registry of devices and seats.
//!
//! The manager owns every [`Device`] and [`Seat`]. Relations between them are
//! ids, so the master pairing and the master/slave edges never form ownership
//! cycles. All hierarchy mutation goes through here so both ends of an edge
//! stay in sync and the matching signals are emitted.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::device::{Device, DeviceId, DeviceTool, DeviceType, InputMode};
use crate::seat::{Seat, SeatCapabilities, SeatId};
use crate::signals::{Signal, Signals};

#[derive(Debug, Default)]
pub struct DeviceManager {
    devices: HashMap<DeviceId, Device>,
    /// Devices in insertion order.
    order: Vec<DeviceId>,
    seats: Vec<Seat>,
    signals: Signals,
    next_device_id: u32,
    next_seat_id: u32,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            next_device_id: 1,
            next_seat_id: 1,
            ..Default::default()
        }
    }

    pub fn signals(&mut self) -> &mut Signals {
        &mut self.signals
    }

    pub(crate) fn emit(&mut self, signal: Signal) {
        self.signals.emit(signal);
    }

    /// Allocates an id for backends that do not name their devices.
    pub fn alloc_device_id(&mut self) -> DeviceId {
        loop {
            let id = DeviceId(self.next_device_id);
            self.next_device_id += 1;
            if !self.devices.contains_key(&id) {
                return id;
            }
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    /// All devices in the order they were added.
    pub fn devices(&self) -> impl Iterator<Item = &Device> + '_ {
        self.order.iter().filter_map(|id| self.devices.get(id))
    }

    pub fn list_devices(&self, device_type: DeviceType) -> Vec<DeviceId> {
        self.devices()
            .filter(|device| device.device_type() == device_type)
            .map(|device| device.id())
            .collect()
    }

    pub fn seat(&self, id: SeatId) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.id() == id)
    }

    pub(crate) fn seat_mut(&mut self, id: SeatId) -> Option<&mut Seat> {
        self.seats.iter_mut().find(|seat| seat.id() == id)
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    /// The first seat created.
    pub fn default_seat(&self) -> Option<&Seat> {
        self.seats.first()
    }

    pub fn seat_for_device(&self, device: DeviceId) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.contains(device))
    }

    /// The master the device routes through, or the device itself.
    pub fn master_of(&self, device: DeviceId) -> DeviceId {
        match self.devices.get(&device) {
            Some(dev) if dev.device_type() == DeviceType::Slave => {
                dev.associated_device().unwrap_or(device)
            }
            _ => device,
        }
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Registers a device and emits `device-added`.
    pub fn add_device(&mut self, device: Device) -> DeviceId {
        let id = device.id();
        debug!("adding {id} ({:?}, {:?})", device.name(), device.source());

        if self.devices.insert(id, device).is_none() {
            self.order.push(id);
        } else {
            warn!("replacing existing {id}");
        }
        self.next_device_id = self.next_device_id.max(id.0 + 1);

        self.emit(Signal::DeviceAdded(id));
        id
    }

    /// Unregisters a device and emits `device-removed`.
    ///
    /// A removed master takes its seat with it and re-floats its partner. A
    /// removed slave leaves its master and seat.
    pub fn remove_device(&mut self, id: DeviceId) -> Option<Device> {
        let device = self.devices.get(&id)?;
        debug!("removing {id}");

        match device.device_type() {
            DeviceType::Master => {
                let partner = device.associated_device();
                let slaves = device.list_slave_devices().to_vec();

                let seat = self
                    .seats
                    .iter()
                    .find(|seat| seat.is_master(id))
                    .map(|seat| (seat.id(), seat.pointer() == id || seat.keyboard() == id));
                match seat {
                    Some((seat, true)) => {
                        self.remove_seat(seat);
                    }
                    Some((seat, false)) => self.seat_remove_master(seat, id),
                    None => (),
                }

                if let Some(partner) = partner.and_then(|partner| self.devices.get_mut(&partner)) {
                    if partner.associated_device() == Some(id) {
                        partner.set_associated(None);
                    }
                }

                for slave in slaves {
                    if let Some(slave) = self.devices.get_mut(&slave) {
                        slave.set_associated(None);
                    }
                }
            }
            DeviceType::Slave | DeviceType::Floating => {
                self.detach_slave(id);
                if let Some(seat) = self.seats.iter_mut().find(|seat| seat.contains(id)) {
                    let seat_id = seat.id();
                    seat.remove_slave(id);
                    self.emit(Signal::SeatDeviceRemoved {
                        seat: seat_id,
                        device: id,
                    });
                }
            }
        }

        self.order.retain(|other| *other != id);
        let device = self.devices.remove(&id);
        self.emit(Signal::DeviceRemoved(id));
        device
    }

    /// Pairs a master pointer with a master keyboard.
    pub fn pair_masters(&mut self, pointer: DeviceId, keyboard: DeviceId) {
        for (a, b) in [(pointer, keyboard), (keyboard, pointer)] {
            let Some(device) = self.devices.get_mut(&a) else {
                warn!("cannot pair missing {a}");
                continue;
            };
            if !device.is_master() {
                warn!("cannot pair non-master {a}");
                continue;
            }
            device.set_associated(Some(b));
        }
    }

    /// Attaches a slave to `master`, detaching it from any previous master
    /// first. Emits `device-changed` on the master.
    pub fn attach_slave(&mut self, slave: DeviceId, master: DeviceId) {
        let is_master = self.devices.get(&master).is_some_and(Device::is_master);
        if !is_master || !self.devices.contains_key(&slave) {
            warn!("cannot attach {slave} to {master}");
            return;
        }

        let previous = self
            .devices
            .get(&slave)
            .filter(|device| device.device_type() == DeviceType::Slave)
            .and_then(Device::associated_device);
        if previous == Some(master) {
            return;
        }
        if previous.is_some() {
            self.detach_slave(slave);
        }

        if let Some(device) = self.devices.get_mut(&slave) {
            device.set_associated(Some(master));
        }
        if let Some(device) = self.devices.get_mut(&master) {
            device.add_slave(slave);
        }

        let seat = self.devices.get(&master).and_then(Device::seat);
        if let Some(seat) = seat {
            self.seat_add_slave(seat, slave);
        }

        self.emit(Signal::DeviceChanged(master));
    }

    /// Detaches a slave from its master, leaving it floating. Emits
    /// `device-changed` on the old master.
    pub fn detach_slave(&mut self, slave: DeviceId) -> Option<DeviceId> {
        let master = self
            .devices
            .get(&slave)
            .filter(|device| device.device_type() == DeviceType::Slave)?
            .associated_device()?;

        if let Some(device) = self.devices.get_mut(&slave) {
            device.set_associated(None);
        }
        if let Some(device) = self.devices.get_mut(&master) {
            device.remove_slave(slave);
        }

        let seat = self.devices.get(&master).and_then(Device::seat);
        if let Some(seat) = seat {
            self.seat_remove_slave(seat, slave);
        }

        self.emit(Signal::DeviceChanged(master));
        Some(master)
    }

    /// Sets the input mode; disabling a master is refused.
    pub fn set_device_mode(&mut self, id: DeviceId, mode: InputMode) -> bool {
        let Some(device) = self.devices.get_mut(&id) else {
            return false;
        };
        let changed = device.mode() != mode;
        if !device.set_mode(mode) {
            return false;
        }
        if changed {
            self.emit(Signal::DeviceChanged(id));
        }
        true
    }

    /// Makes `tool` the device's current tool; emits `tool-changed` when it
    /// differs from the previous one.
    pub fn update_tool(&mut self, id: DeviceId, tool: Option<Rc<DeviceTool>>) {
        let Some(device) = self.devices.get_mut(&id) else {
            return;
        };
        if device.set_last_tool(tool.clone()) {
            self.emit(Signal::ToolChanged { device: id, tool });
        }
    }

    // =========================================================================
    // Seats
    // =========================================================================

    /// Creates a seat for a master pair and emits `seat-added`.
    pub fn create_seat(&mut self, pointer: DeviceId, keyboard: DeviceId) -> SeatId {
        if let Some(seat) = self
            .seats
            .iter()
            .find(|seat| seat.pointer() == pointer && seat.keyboard() == keyboard)
        {
            return seat.id();
        }

        let id = SeatId(self.next_seat_id);
        self.next_seat_id += 1;
        debug!("creating seat {id:?} for {pointer} and {keyboard}");

        self.pair_masters(pointer, keyboard);
        for master in [pointer, keyboard] {
            if let Some(device) = self.devices.get_mut(&master) {
                device.set_seat(Some(id));
            }
        }

        self.seats.push(Seat::new(id, pointer, keyboard));
        self.emit(Signal::SeatAdded(id));
        id
    }

    /// Removes a seat and emits `seat-removed`. Its devices stay registered.
    pub fn remove_seat(&mut self, id: SeatId) -> Option<Seat> {
        let index = self.seats.iter().position(|seat| seat.id() == id)?;
        let seat = self.seats.remove(index);
        debug!("removing seat {id:?}");

        for device in self.devices.values_mut() {
            if device.seat() == Some(id) {
                device.set_seat(None);
            }
        }

        self.emit(Signal::SeatRemoved(id));
        Some(seat)
    }

    /// Registers an additional master (touch master, tablet master) on the
    /// seat.
    pub fn seat_add_master(&mut self, seat: SeatId, device: DeviceId, caps: SeatCapabilities) {
        let Some(seat_ref) = self.seat_mut(seat) else {
            return;
        };
        seat_ref.add_master(device, caps);
        if let Some(device) = self.devices.get_mut(&device) {
            device.set_seat(Some(seat));
        }
    }

    pub fn seat_remove_master(&mut self, seat: SeatId, device: DeviceId) {
        if let Some(seat) = self.seat_mut(seat) {
            seat.remove_master(device);
        }
        if let Some(device) = self.devices.get_mut(&device) {
            device.set_seat(None);
        }
    }

    pub fn seat_add_slave(&mut self, seat: SeatId, device: DeviceId) {
        let Some(source) = self.devices.get(&device).map(Device::source) else {
            return;
        };
        let Some(seat_ref) = self.seat_mut(seat) else {
            return;
        };
        if seat_ref.add_slave(device, source) {
            if let Some(device) = self.devices.get_mut(&device) {
                device.set_seat(Some(seat));
            }
            self.emit(Signal::SeatDeviceAdded { seat, device });
        }
    }

    pub fn seat_remove_slave(&mut self, seat: SeatId, device: DeviceId) {
        let Some(seat_ref) = self.seat_mut(seat) else {
            return;
        };
        if seat_ref.remove_slave(device) {
            if let Some(device) = self.devices.get_mut(&device) {
                device.set_seat(None);
            }
            self.emit(Signal::SeatDeviceRemoved { seat, device });
        }
    }

    pub fn seat_add_tool(&mut self, seat: SeatId, tool: Rc<DeviceTool>) {
        let Some(seat_ref) = self.seat_mut(seat) else {
            return;
        };
        if seat_ref.add_tool(tool.clone()) {
            self.emit(Signal::ToolAdded { seat, tool });
        }
    }

    pub fn seat_remove_tool(&mut self, seat: SeatId, tool: &Rc<DeviceTool>) {
        let Some(seat_ref) = self.seat_mut(seat) else {
            return;
        };
        if seat_ref.remove_tool(tool) {
            self.emit(Signal::ToolRemoved {
                seat,
                tool: tool.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::device::{AxisFlags, DeviceToolType, InputSource};
    use crate::signals::SignalKind;

    fn master(id: u32, source: InputSource) -> Device {
        Device::new(
            DeviceId(id),
            format!("master {id}"),
            DeviceType::Master,
            source,
            InputMode::Screen,
            source != InputSource::Keyboard,
        )
    }

    fn floating(id: u32, source: InputSource) -> Device {
        Device::new(
            DeviceId(id),
            format!("slave {id}"),
            DeviceType::Floating,
            source,
            InputMode::Disabled,
            false,
        )
    }

    fn setup() -> (DeviceManager, SeatId) {
        let mut manager = DeviceManager::new();
        manager.add_device(master(2, InputSource::Mouse));
        manager.add_device(master(3, InputSource::Keyboard));
        let seat = manager.create_seat(DeviceId(2), DeviceId(3));
        (manager, seat)
    }

    fn record(manager: &mut DeviceManager) -> Rc<RefCell<Vec<Signal>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        manager
            .signals()
            .connect_all(move |signal| log2.borrow_mut().push(signal.clone()));
        log
    }

    #[test]
    fn seat_pairs_masters() {
        let (manager, seat) = setup();
        let pointer = manager.device(DeviceId(2)).unwrap();
        let keyboard = manager.device(DeviceId(3)).unwrap();
        assert_eq!(pointer.associated_device(), Some(DeviceId(3)));
        assert_eq!(keyboard.associated_device(), Some(DeviceId(2)));
        assert_eq!(pointer.seat(), Some(seat));
        assert_eq!(manager.default_seat().unwrap().keyboard(), DeviceId(3));
    }

    #[test]
    fn attach_and_detach() {
        let (mut manager, seat) = setup();
        manager.add_device(floating(10, InputSource::Mouse));
        let log = record(&mut manager);

        manager.attach_slave(DeviceId(10), DeviceId(2));
        let slave = manager.device(DeviceId(10)).unwrap();
        assert_eq!(slave.device_type(), DeviceType::Slave);
        assert_eq!(slave.seat(), Some(seat));
        assert_eq!(
            manager.device(DeviceId(2)).unwrap().list_slave_devices(),
            [DeviceId(10)]
        );
        assert_eq!(manager.master_of(DeviceId(10)), DeviceId(2));

        assert_eq!(manager.detach_slave(DeviceId(10)), Some(DeviceId(2)));
        let slave = manager.device(DeviceId(10)).unwrap();
        assert_eq!(slave.device_type(), DeviceType::Floating);
        assert_eq!(slave.associated_device(), None);
        assert!(manager
            .device(DeviceId(2))
            .unwrap()
            .list_slave_devices()
            .is_empty());

        assert_eq!(
            *log.borrow(),
            [
                Signal::SeatDeviceAdded {
                    seat,
                    device: DeviceId(10)
                },
                Signal::DeviceChanged(DeviceId(2)),
                Signal::SeatDeviceRemoved {
                    seat,
                    device: DeviceId(10)
                },
                Signal::DeviceChanged(DeviceId(2)),
            ]
        );
    }

    #[test]
    fn removing_master_removes_seat_and_refloats() {
        let (mut manager, seat) = setup();
        manager.add_device(floating(10, InputSource::Mouse));
        manager.attach_slave(DeviceId(10), DeviceId(2));
        let log = record(&mut manager);

        manager.remove_device(DeviceId(2));

        assert!(manager.seat(seat).is_none());
        let keyboard = manager.device(DeviceId(3)).unwrap();
        assert_eq!(keyboard.associated_device(), None);
        assert_eq!(keyboard.seat(), None);
        let slave = manager.device(DeviceId(10)).unwrap();
        assert_eq!(slave.device_type(), DeviceType::Floating);
        assert_eq!(
            *log.borrow(),
            [
                Signal::SeatRemoved(seat),
                Signal::DeviceRemoved(DeviceId(2))
            ]
        );
    }

    #[test]
    fn removing_slave_leaves_seat() {
        let (mut manager, seat) = setup();
        manager.add_device(floating(10, InputSource::Touchscreen));
        manager.attach_slave(DeviceId(10), DeviceId(2));
        assert!(manager
            .seat(seat)
            .unwrap()
            .capabilities()
            .contains(SeatCapabilities::TOUCH));

        manager.remove_device(DeviceId(10));
        assert!(!manager
            .seat(seat)
            .unwrap()
            .capabilities()
            .contains(SeatCapabilities::TOUCH));
        assert!(manager.device(DeviceId(10)).is_none());
        assert_eq!(manager.list_devices(DeviceType::Master).len(), 2);
    }

    #[test]
    fn tool_changed_only_on_change() {
        let (mut manager, seat) = setup();
        manager.add_device(floating(10, InputSource::Pen));
        let changes = Rc::new(RefCell::new(0));
        let changes2 = changes.clone();
        manager
            .signals()
            .connect(SignalKind::ToolChanged, move |_| *changes2.borrow_mut() += 1);

        let tool = Rc::new(DeviceTool::new(1, 2, DeviceToolType::Pen, AxisFlags::empty()));
        manager.seat_add_tool(seat, tool.clone());
        manager.update_tool(DeviceId(10), Some(tool.clone()));
        manager.update_tool(DeviceId(10), Some(tool));
        manager.update_tool(DeviceId(10), None);
        assert_eq!(*changes.borrow(), 2);
        assert_eq!(manager.seat(seat).unwrap().tools().len(), 1);
    }

    #[test]
    fn mode_change_on_master() {
        let (mut manager, _) = setup();
        assert!(!manager.set_device_mode(DeviceId(2), InputMode::Disabled));
        assert!(manager.set_device_mode(DeviceId(2), InputMode::Window));
        assert_eq!(
            manager.device(DeviceId(2)).unwrap().mode(),
            InputMode::Window
        );
    }
}

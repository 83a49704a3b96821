//! XI2 device hierarchy: startup enumeration, hotplug and tool tracking.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::device::tool::{DeviceTool, DeviceToolType};
use crate::device::{AxisFlags, AxisUse, Device, DeviceType, InputMode, InputSource};
use crate::display::Display;
use crate::event::{ModifierType, ScrollDirection};
use crate::signals::Signal;

use super::device::Xi2Device;
use super::protocol::{
    DeviceClass, DeviceUse, HierarchyFlags, HierarchyInfo, PropertyChange, ScrollType, TouchMode,
    XiDeviceChangedEvent, XiDeviceInfo, XiEventBits, XiEventMask, XiHierarchyEvent,
    XiPropertyEvent, ALL_DEVICES,
};
use super::{device_id, X11Backend};

/// Names of virtual absolute devices that should stay mice.
const NOT_TOUCHSCREENS: [&str; 5] = [
    "mouse",
    "pointer",
    "qemu usb tablet",
    "spice vdagent tablet",
    "virtualbox usb tablet",
];

fn axis_use_for_label(label: &str) -> AxisUse {
    match label {
        "Abs X" | "Rel X" => AxisUse::X,
        "Abs Y" | "Rel Y" => AxisUse::Y,
        "Abs Pressure" => AxisUse::Pressure,
        "Abs Tilt X" => AxisUse::XTilt,
        "Abs Tilt Y" => AxisUse::YTilt,
        "Abs Wheel" => AxisUse::Wheel,
        _ => AxisUse::Ignore,
    }
}

impl X11Backend {
    /// Selects hierarchy events and registers every enabled device, then
    /// builds seats for the master pairs and attaches the slaves.
    pub fn init_devices(&mut self, display: &mut Display) {
        let root = display.windows().root();
        let mask = XiEventMask {
            deviceid: ALL_DEVICES,
            mask: XiEventBits::HIERARCHY_CHANGED
                | XiEventBits::DEVICE_CHANGED
                | XiEventBits::PROPERTY_EVENT,
        };
        self.server.select_events(root, &[mask]);

        let infos: Vec<_> = self
            .server
            .query_device(ALL_DEVICES)
            .into_iter()
            .filter(|info| info.enabled)
            .collect();

        for info in &infos {
            self.add_device(display, info);
        }

        for info in infos.iter().filter(|info| info.device_use.is_master()) {
            self.relate_masters(display, info);
        }
        for info in infos.iter().filter(|info| !info.device_use.is_master()) {
            self.relate_slave(display, info);
        }

        let n_seats = display.list_seats().len();
        debug!("initialized {} XI2 devices, {n_seats} seats", infos.len());
    }

    fn add_device(&mut self, display: &mut Display, info: &XiDeviceInfo) {
        let device = self.create_device(info);
        let id = device.id();
        display.devices_mut().add_device(device);
        self.devices.insert(id, Xi2Device::default());

        // Axes need both the device and its XI2 state in place.
        self.translate_device_classes(display, info.deviceid, &info.classes);
    }

    fn relate_masters(&mut self, display: &mut Display, info: &XiDeviceInfo) {
        let (pointer, keyboard) = match info.device_use {
            DeviceUse::MasterPointer => (info.deviceid, info.attachment),
            DeviceUse::MasterKeyboard => (info.attachment, info.deviceid),
            _ => return,
        };
        let (pointer, keyboard) = (device_id(pointer), device_id(keyboard));

        let devices = display.devices_mut();
        if !devices.contains(pointer) || !devices.contains(keyboard) {
            warn!("master pair {pointer}/{keyboard} is incomplete");
            return;
        }
        devices.create_seat(pointer, keyboard);
    }

    fn relate_slave(&mut self, display: &mut Display, info: &XiDeviceInfo) {
        if !matches!(
            info.device_use,
            DeviceUse::SlavePointer | DeviceUse::SlaveKeyboard
        ) {
            return;
        }

        display
            .devices_mut()
            .attach_slave(device_id(info.deviceid), device_id(info.attachment));
    }

    fn create_device(&mut self, info: &XiDeviceInfo) -> Device {
        let source = self.guess_source(info);
        let id = device_id(info.deviceid);

        let (device_type, mode) = match info.device_use {
            DeviceUse::MasterPointer | DeviceUse::MasterKeyboard => {
                (DeviceType::Master, InputMode::Screen)
            }
            // Slaves float until attached.
            _ => (DeviceType::Floating, InputMode::Disabled),
        };
        let has_cursor = info.device_use == DeviceUse::MasterPointer;

        let num_touches = info
            .classes
            .iter()
            .find_map(|class| match class {
                DeviceClass::Touch { num_touches, .. } => Some(*num_touches),
                _ => None,
            })
            .unwrap_or(0);

        let (vendor_id, product_id) = if info.device_use.is_master() {
            (None, None)
        } else {
            self.device_ids(info.deviceid)
        };

        Device::new(id, info.name.clone(), device_type, source, mode, has_cursor)
            .with_ids(vendor_id, product_id)
            .with_num_touches(num_touches)
    }

    fn guess_source(&mut self, info: &XiDeviceInfo) -> InputSource {
        if matches!(
            info.device_use,
            DeviceUse::MasterKeyboard | DeviceUse::SlaveKeyboard
        ) {
            return InputSource::Keyboard;
        }

        if info.device_use == DeviceUse::SlavePointer {
            if self.is_touchpad(info.deviceid) {
                return InputSource::Touchpad;
            }

            let touch_mode = info.classes.iter().find_map(|class| match class {
                DeviceClass::Touch { mode, .. } => Some(*mode),
                _ => None,
            });
            match touch_mode {
                Some(TouchMode::Direct) => return InputSource::Touchscreen,
                Some(TouchMode::Dependent) => return InputSource::Touchpad,
                None => (),
            }
        }

        let name = info.name.to_lowercase();
        if name.contains("eraser") {
            InputSource::Eraser
        } else if name.contains("cursor") {
            InputSource::Cursor
        } else if name.contains(" pad") {
            InputSource::TabletPad
        } else if name.contains("wacom") || name.contains("pen") {
            InputSource::Pen
        } else if !NOT_TOUCHSCREENS.iter().any(|other| name.contains(other))
            && self.has_abs_xy(&info.classes)
        {
            InputSource::Touchscreen
        } else if name.contains("trackpoint") || name.contains("dualpoint stick") {
            InputSource::Trackpoint
        } else {
            InputSource::Mouse
        }
    }

    fn is_touchpad(&mut self, deviceid: u16) -> bool {
        self.get_device_property(deviceid, "libinput Tapping Enabled")
            .is_some_and(|prop| prop.format == 8 && prop.items.len() == 1)
    }

    fn has_abs_xy(&self, classes: &[DeviceClass]) -> bool {
        let mut has_x = false;
        let mut has_y = false;
        for class in classes {
            let DeviceClass::Valuator { label, .. } = class else {
                continue;
            };
            match self.server.atom_name(*label).as_deref() {
                Some("Abs X") => has_x = true,
                Some("Abs Y") => has_y = true,
                _ => (),
            }
        }
        has_x && has_y
    }

    /// Vendor and product ids, formatted as four hex digits each.
    fn device_ids(&mut self, deviceid: u16) -> (Option<String>, Option<String>) {
        match self.get_device_property(deviceid, "Device Product ID") {
            Some(prop) if prop.format == 32 && prop.items.len() == 2 => (
                Some(format!("{:04x}", prop.items[0])),
                Some(format!("{:04x}", prop.items[1])),
            ),
            _ => (None, None),
        }
    }

    /// Rebuilds keys, axes and scroll valuators from XI2 classes. Scroll
    /// classes refer to valuators, so they are handled in a second pass.
    pub(super) fn translate_device_classes(
        &mut self,
        display: &mut Display,
        deviceid: u16,
        classes: &[DeviceClass],
    ) {
        let id = device_id(deviceid);

        for class in classes {
            match class {
                DeviceClass::Key { keycodes } => {
                    let Some(device) = display.devices_mut().device_mut(id) else {
                        return;
                    };
                    device.set_keys(keycodes.len());
                    for (index, keycode) in keycodes.iter().enumerate() {
                        device.set_key(index, *keycode, ModifierType::empty());
                    }
                }
                DeviceClass::Valuator {
                    label,
                    min,
                    max,
                    resolution,
                    ..
                } => {
                    let label = self.server.atom_name(*label);
                    let axis_use = label.as_deref().map_or(AxisUse::Ignore, axis_use_for_label);

                    let Some(device) = display.devices_mut().device_mut(id) else {
                        return;
                    };
                    if let Err(err) =
                        device.add_axis(label, axis_use, *min, *max, f64::from(*resolution))
                    {
                        debug!("skipping valuator of {id}: {err}");
                    }
                }
                _ => (),
            }
        }

        let n_axes = display.devices().device(id).map_or(0, Device::n_axes);
        let Some(xi_device) = self.devices.get_mut(&id) else {
            return;
        };
        for class in classes {
            let DeviceClass::Scroll {
                number,
                scroll_type,
                increment,
            } = class
            else {
                continue;
            };

            let number = usize::from(*number);
            if number >= n_axes {
                warn!("scroll class of {id} names missing valuator {number}");
                continue;
            }

            let direction = match scroll_type {
                ScrollType::Vertical => ScrollDirection::Down,
                ScrollType::Horizontal => ScrollDirection::Right,
            };
            xi_device.add_scroll_valuator(number, direction, *increment);
        }
    }

    // =========================================================================
    // Hotplug
    // =========================================================================

    pub(super) fn handle_hierarchy_changed(&mut self, display: &mut Display, ev: &XiHierarchyEvent) {
        if ev.flags.contains(HierarchyFlags::DEVICE_ENABLED) {
            for info in &ev.info {
                if info.flags.contains(HierarchyFlags::DEVICE_ENABLED) {
                    self.device_enabled(display, info);
                }
            }
        }

        if ev.flags.contains(HierarchyFlags::DEVICE_DISABLED) {
            for info in &ev.info {
                if info.flags.contains(HierarchyFlags::DEVICE_DISABLED) {
                    let id = device_id(info.deviceid);
                    debug!("{id} disabled");
                    display.remove_device(id);
                    self.devices.remove(&id);
                }
            }
        }

        if ev
            .flags
            .intersects(HierarchyFlags::SLAVE_ATTACHED | HierarchyFlags::SLAVE_DETACHED)
        {
            for info in &ev.info {
                if info
                    .flags
                    .intersects(HierarchyFlags::SLAVE_ATTACHED | HierarchyFlags::SLAVE_DETACHED)
                {
                    self.slave_reattached(display, info);
                }
            }
        }
    }

    fn device_enabled(&mut self, display: &mut Display, info: &HierarchyInfo) {
        let Some(full) = self.server.query_device(info.deviceid).into_iter().next() else {
            debug!("enabled device {} vanished", info.deviceid);
            return;
        };

        self.add_device(display, &full);

        if full.device_use.is_master() {
            self.relate_masters(display, &full);
        } else {
            self.relate_slave(display, &full);
        }
    }

    fn slave_reattached(&mut self, display: &mut Display, info: &HierarchyInfo) {
        let slave = device_id(info.deviceid);
        if !display.devices().contains(slave) {
            return;
        }

        display.devices_mut().detach_slave(slave);

        if info.flags.contains(HierarchyFlags::SLAVE_ATTACHED) {
            let attachment = self
                .server
                .query_device(info.deviceid)
                .into_iter()
                .next()
                .map_or(info.attachment, |full| full.attachment);
            display
                .devices_mut()
                .attach_slave(slave, device_id(attachment));
        }

        display.devices_mut().emit(Signal::DeviceChanged(slave));
    }

    pub(super) fn handle_device_changed(&mut self, display: &mut Display, ev: &XiDeviceChangedEvent) {
        let id = device_id(ev.deviceid);
        let Some(device) = display.devices_mut().device_mut(id) else {
            return;
        };
        device.reset_axes();

        if let Some(xi_device) = self.devices.get_mut(&id) {
            xi_device.unset_scroll_valuators();
            xi_device.store_axes(None);
        }

        self.translate_device_classes(display, ev.deviceid, &ev.classes);
        display.devices_mut().emit(Signal::Changed(id));

        if let Some(source) = self.devices.get_mut(&device_id(ev.sourceid)) {
            source.reset_scroll_valuators();
        }
    }

    // =========================================================================
    // Tools
    // =========================================================================

    pub(super) fn handle_property_change(&mut self, display: &mut Display, ev: &XiPropertyEvent) {
        if self.server.atom_name(ev.property).as_deref() != Some("Wacom Serial IDs") {
            return;
        }

        let id = device_id(ev.deviceid);
        if !display.devices().contains(id) {
            return;
        }

        let tool = if ev.what == PropertyChange::Deleted {
            None
        } else {
            self.tool_for_serial_ids(display, ev.deviceid)
        };

        display.devices_mut().update_tool(id, tool);
    }

    fn tool_for_serial_ids(&mut self, display: &mut Display, deviceid: u16) -> Option<Rc<DeviceTool>> {
        let prop = self.get_device_property(deviceid, "Wacom Serial IDs")?;
        if prop.items.len() < 5 {
            return None;
        }
        let serial = u64::from(prop.items[3]);
        let hw_id = u64::from(prop.items[4]);

        let id = device_id(deviceid);
        let seat = display.devices().seat_for_device(id)?;
        if let Some(tool) = seat.get_tool(serial, hw_id) {
            return Some(tool);
        }
        if serial == 0 {
            return None;
        }

        let seat = seat.id();
        let tool_type = self.tool_type(deviceid);
        if tool_type == DeviceToolType::Unknown {
            debug!("unknown tool type on {id}");
            return None;
        }

        let tool = Rc::new(DeviceTool::new(serial, hw_id, tool_type, AxisFlags::empty()));
        display.devices_mut().seat_add_tool(seat, tool.clone());
        Some(tool)
    }

    fn tool_type(&mut self, deviceid: u16) -> DeviceToolType {
        let Some(prop) = self.get_device_property(deviceid, "Wacom Tool Type") else {
            return DeviceToolType::Unknown;
        };
        let Some(atom) = prop.items.first() else {
            return DeviceToolType::Unknown;
        };

        match self
            .server
            .atom_name(super::protocol::Atom(*atom))
            .as_deref()
        {
            Some("STYLUS") => DeviceToolType::Pen,
            Some("CURSOR") => DeviceToolType::Mouse,
            Some("ERASER") => DeviceToolType::Eraser,
            _ => DeviceToolType::Unknown,
        }
    }
}

//! Per-seat state and the device hierarchy a `wl_seat` maps to.
//!
//! Every seat gets a master pointer and master keyboard up front. Slaves
//! follow the advertised capabilities; touch brings its own master pointer
//! so touch emulation does not fight the real pointer.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::backend::TimerKind;
use crate::cursor::{Cursor, CursorAnimation};
use crate::device::{
    AxisFlags, AxisUse, Device, DeviceId, DeviceTool, DeviceType, InputMode, InputSource,
};
use crate::display::Display;
use crate::event::{Event, ModifierType};
use crate::seat::{SeatCapabilities, SeatId};
use crate::selection::PendingSelection;
use crate::window::{WindowId, WindowTree};

use super::keyboard::KeyRepeat;
use super::protocol::{AxisSource, Capability, GlobalName, PadId, TabletId, ToolId, ToolType};
use super::WaylandBackend;

/// Scroll contributions collected until the next `wl_pointer.frame`.
#[derive(Debug, Default)]
pub(super) struct PointerFrame {
    /// Non-scroll event waiting for the frame.
    pub event: Option<Event>,
    pub delta_x: f64,
    pub delta_y: f64,
    pub discrete_x: i32,
    pub discrete_y: i32,
    pub is_scroll_stop: bool,
    pub source: Option<AxisSource>,
}

/// Pointer-like state shared by the seat pointer, the touch master and
/// every tablet master.
#[derive(Debug, Default)]
pub(super) struct PointerData {
    pub focus: Option<WindowId>,
    pub surface_x: f64,
    pub surface_y: f64,
    pub button_modifiers: ModifierType,
    pub time: u32,
    pub enter_serial: u32,
    pub press_serial: u32,
    pub grab_window: Option<WindowId>,
    pub grab_time: u32,
    pub animation: CursorAnimation,
    pub frame: PointerFrame,
}

impl PointerData {
    /// Surface and root coordinates of the pointer.
    pub fn coords(&self, windows: &dyn WindowTree) -> (f64, f64, f64, f64) {
        let (x, y) = (self.surface_x, self.surface_y);
        let (x_root, y_root) = match self.focus {
            Some(focus) => windows.root_coords(focus, x, y),
            None => (x, y),
        };
        (x, y, x_root, y_root)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct TouchData {
    pub id: i32,
    pub window: WindowId,
    pub x: f64,
    pub y: f64,
    pub down_serial: u32,
    /// The first finger down; it drives the touch master's pointer.
    pub initial: bool,
}

#[derive(Debug)]
pub(super) struct TabletData {
    pub id: TabletId,
    pub name: String,
    pub vid: u32,
    pub pid: u32,
    pub path: String,
    pub master: Option<DeviceId>,
    pub stylus: Option<DeviceId>,
    pub eraser: Option<DeviceId>,
    pub current_device: Option<DeviceId>,
    pub current_tool: Option<ToolId>,
    /// Axis values of the current device, in its axis order.
    pub axes: Vec<f64>,
    pub axis_indices: HashMap<AxisUse, usize>,
    pub pointer: PointerData,
    pub pads: Vec<PadId>,
}

impl TabletData {
    pub fn new(id: TabletId) -> Self {
        Self {
            id,
            name: String::new(),
            vid: 0,
            pid: 0,
            path: String::new(),
            master: None,
            stylus: None,
            eraser: None,
            current_device: None,
            current_tool: None,
            axes: Vec::new(),
            axis_indices: HashMap::new(),
            pointer: PointerData::default(),
            pads: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(super) struct ToolData {
    pub id: ToolId,
    pub tool_type: Option<ToolType>,
    pub hardware_serial: u64,
    pub hardware_id: u64,
    pub axes: AxisFlags,
    pub tool: Option<Rc<DeviceTool>>,
    pub current_tablet: Option<TabletId>,
}

#[derive(Debug, Default)]
pub(super) struct PadAxisData {
    pub value: f64,
    pub is_stop: bool,
}

#[derive(Debug, Default)]
pub(super) struct PadGroupData {
    pub buttons: Vec<u32>,
    pub rings: Vec<PadAxisData>,
    pub strips: Vec<PadAxisData>,
    pub n_modes: u32,
    pub current_mode: u32,
    pub mode_switch_serial: u32,
}

#[derive(Debug)]
pub(super) struct PadData {
    pub id: PadId,
    pub device: Option<DeviceId>,
    pub path: String,
    pub n_buttons: u32,
    pub groups: Vec<PadGroupData>,
    pub current_tablet: Option<TabletId>,
}

impl PadData {
    /// The group owning `button`, with its index.
    pub fn button_group(&self, button: u32) -> Option<(u32, &PadGroupData)> {
        self.groups
            .iter()
            .enumerate()
            .find(|(_, group)| group.buttons.contains(&button))
            .map(|(index, group)| (index as u32, group))
    }
}

#[derive(Debug)]
pub(super) struct WaylandSeat {
    pub name: GlobalName,
    pub version: u32,
    pub id: SeatId,
    pub seat_name: Option<String>,
    pub capabilities: Capability,
    pub master_pointer: DeviceId,
    pub master_keyboard: DeviceId,
    pub pointer: Option<DeviceId>,
    pub keyboard: Option<DeviceId>,
    pub touch_master: Option<DeviceId>,
    pub touch: Option<DeviceId>,
    pub wheel_scrolling: Option<DeviceId>,
    pub finger_scrolling: Option<DeviceId>,
    pub continuous_scrolling: Option<DeviceId>,
    pub has_gestures: bool,
    pub gesture_n_fingers: u32,

    pub pointer_info: PointerData,
    pub touch_info: PointerData,
    pub touches: BTreeMap<i32, TouchData>,

    pub keyboard_focus: Option<WindowId>,
    pub key_modifiers: ModifierType,
    pub keyboard_time: u32,
    pub repeat: KeyRepeat,

    pub grab_cursor: Option<Cursor>,

    pub tablets: Vec<TabletData>,
    pub tools: Vec<ToolData>,
    pub pads: Vec<PadData>,

    pub pending_selection: PendingSelection,
}

impl WaylandSeat {
    pub fn tablet(&self, id: TabletId) -> Option<&TabletData> {
        self.tablets.iter().find(|tablet| tablet.id == id)
    }

    pub fn tablet_mut(&mut self, id: TabletId) -> Option<&mut TabletData> {
        self.tablets.iter_mut().find(|tablet| tablet.id == id)
    }

    pub fn tool(&self, id: ToolId) -> Option<&ToolData> {
        self.tools.iter().find(|tool| tool.id == id)
    }

    pub fn tool_mut(&mut self, id: ToolId) -> Option<&mut ToolData> {
        self.tools.iter_mut().find(|tool| tool.id == id)
    }

    pub fn pad(&self, id: PadId) -> Option<&PadData> {
        self.pads.iter().find(|pad| pad.id == id)
    }

    pub fn pad_mut(&mut self, id: PadId) -> Option<&mut PadData> {
        self.pads.iter_mut().find(|pad| pad.id == id)
    }

    /// Pointer state behind a master pointer of this seat.
    pub fn pointer_data(&self, device: DeviceId) -> Option<&PointerData> {
        if device == self.master_pointer {
            return Some(&self.pointer_info);
        }
        if self.touch_master == Some(device) {
            return Some(&self.touch_info);
        }
        self.tablets
            .iter()
            .find(|tablet| tablet.master == Some(device))
            .map(|tablet| &tablet.pointer)
    }

    pub fn pointer_data_mut(&mut self, device: DeviceId) -> Option<&mut PointerData> {
        if device == self.master_pointer {
            return Some(&mut self.pointer_info);
        }
        if self.touch_master == Some(device) {
            return Some(&mut self.touch_info);
        }
        self.tablets
            .iter_mut()
            .find(|tablet| tablet.master == Some(device))
            .map(|tablet| &mut tablet.pointer)
    }

    pub fn owns_master(&self, device: DeviceId) -> bool {
        device == self.master_keyboard || self.pointer_data(device).is_some()
    }

    /// Where the device's events currently go.
    pub fn focus(&self, device: DeviceId) -> Option<WindowId> {
        if device == self.master_keyboard {
            return self.keyboard_focus;
        }
        self.pointer_data(device).and_then(|pointer| pointer.focus)
    }

    /// Keyboard modifiers plus the buttons held on `device`.
    pub fn modifiers(&self, device: DeviceId) -> ModifierType {
        let buttons = self
            .pointer_data(device)
            .map_or(ModifierType::empty(), |pointer| pointer.button_modifiers);
        self.key_modifiers | buttons
    }
}

/// Registers a device and attaches it to `master`.
pub(super) fn add_slave(display: &mut Display, master: DeviceId, device: Device) -> DeviceId {
    let devices = display.devices_mut();
    let id = devices.add_device(device);
    devices.attach_slave(id, master);
    id
}

/// Registers an extra master on `seat`, paired one way with `keyboard`.
pub(super) fn add_master(
    display: &mut Display,
    seat: SeatId,
    keyboard: DeviceId,
    name: String,
    caps: SeatCapabilities,
) -> DeviceId {
    let devices = display.devices_mut();
    let id = devices.alloc_device_id();
    let master = devices.add_device(Device::new(
        id,
        name,
        DeviceType::Master,
        InputSource::Mouse,
        InputMode::Screen,
        true,
    ));
    if let Some(device) = devices.device_mut(master) {
        device.set_associated(Some(keyboard));
    }
    devices.seat_add_master(seat, master, caps);
    master
}

pub(super) fn new_slave(display: &mut Display, name: &str, source: InputSource, has_cursor: bool) -> Device {
    let id = display.devices_mut().alloc_device_id();
    Device::new(
        id,
        name,
        DeviceType::Floating,
        source,
        InputMode::Screen,
        has_cursor,
    )
}

impl WaylandBackend {
    pub(super) fn handle_seat_global(&mut self, display: &mut Display, name: GlobalName, version: u32) {
        if self.seats.iter().any(|seat| seat.name == name) {
            warn!("seat global {name:?} announced twice");
            return;
        }

        let devices = display.devices_mut();
        let pointer_id = devices.alloc_device_id();
        let master_pointer = devices.add_device(Device::new(
            pointer_id,
            "Core Pointer",
            DeviceType::Master,
            InputSource::Mouse,
            InputMode::Screen,
            true,
        ));
        let keyboard_id = devices.alloc_device_id();
        let master_keyboard = devices.add_device(Device::new(
            keyboard_id,
            "Core Keyboard",
            DeviceType::Master,
            InputSource::Keyboard,
            InputMode::Screen,
            false,
        ));
        let id = devices.create_seat(master_pointer, master_keyboard);
        debug!("seat global {name:?} (v{version}) is {id:?}");

        self.seats.push(WaylandSeat {
            name,
            version,
            id,
            seat_name: None,
            capabilities: Capability::empty(),
            master_pointer,
            master_keyboard,
            pointer: None,
            keyboard: None,
            touch_master: None,
            touch: None,
            wheel_scrolling: None,
            finger_scrolling: None,
            continuous_scrolling: None,
            has_gestures: false,
            gesture_n_fingers: 0,
            pointer_info: PointerData::default(),
            touch_info: PointerData::default(),
            touches: BTreeMap::new(),
            keyboard_focus: None,
            key_modifiers: ModifierType::empty(),
            keyboard_time: 0,
            repeat: KeyRepeat::default(),
            grab_cursor: None,
            tablets: Vec::new(),
            tools: Vec::new(),
            pads: Vec::new(),
            pending_selection: PendingSelection::default(),
        });
    }

    pub(super) fn handle_seat_global_removed(&mut self, display: &mut Display, name: GlobalName) {
        let Some(index) = self.seats.iter().position(|seat| seat.name == name) else {
            return;
        };

        self.handle_capabilities(display, name, Capability::empty());

        let tablets: Vec<_> = self.seats[index].tablets.iter().map(|tablet| tablet.id).collect();
        for tablet in tablets {
            self.remove_tablet(display, name, tablet);
        }
        let pads: Vec<_> = self.seats[index].pads.iter().map(|pad| pad.id).collect();
        for pad in pads {
            self.remove_pad(display, name, pad);
        }

        let seat = self.seats.remove(index);
        debug!("seat global {name:?} removed");

        self.scheduler.cancel(TimerKind::KeyRepeat(seat.id));
        self.scheduler
            .cancel(TimerKind::CursorAnimation(seat.master_pointer));

        let devices = display.devices_mut();
        devices.remove_device(seat.master_pointer);
        devices.remove_device(seat.master_keyboard);
    }

    pub(super) fn handle_capabilities(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        caps: Capability,
    ) {
        let has_gestures = self.compositor.has_pointer_gestures();
        let Some(seat) = self.seats.iter_mut().find(|seat| seat.name == name) else {
            return;
        };
        debug!("seat {:?} capabilities: {caps:?}", seat.id);
        seat.capabilities = caps;

        if caps.contains(Capability::POINTER) && seat.pointer.is_none() {
            let device = new_slave(display, "Wayland Pointer", InputSource::Mouse, true);
            seat.pointer = Some(add_slave(display, seat.master_pointer, device));
            seat.has_gestures = has_gestures;
        } else if !caps.contains(Capability::POINTER) && seat.pointer.is_some() {
            let removed = [
                seat.pointer.take(),
                seat.wheel_scrolling.take(),
                seat.finger_scrolling.take(),
                seat.continuous_scrolling.take(),
            ];
            seat.has_gestures = false;
            for device in removed.into_iter().flatten() {
                display.devices_mut().remove_device(device);
            }
        }

        if caps.contains(Capability::KEYBOARD) && seat.keyboard.is_none() {
            let device = new_slave(display, "Wayland Keyboard", InputSource::Keyboard, false);
            seat.keyboard = Some(add_slave(display, seat.master_keyboard, device));
        } else if !caps.contains(Capability::KEYBOARD) {
            if let Some(keyboard) = seat.keyboard.take() {
                seat.repeat.stop();
                self.scheduler.cancel(TimerKind::KeyRepeat(seat.id));
                display.devices_mut().remove_device(keyboard);
            }
        }

        if caps.contains(Capability::TOUCH) && seat.touch_master.is_none() {
            let master = add_master(
                display,
                seat.id,
                seat.master_keyboard,
                String::from("Wayland Touch Master Pointer"),
                SeatCapabilities::TOUCH,
            );
            let device = new_slave(display, "Wayland Touch", InputSource::Touchscreen, false);
            seat.touch = Some(add_slave(display, master, device));
            seat.touch_master = Some(master);
        } else if !caps.contains(Capability::TOUCH) && seat.touch_master.is_some() {
            seat.touches.clear();
            let removed = [seat.touch.take(), seat.touch_master.take()];
            for device in removed.into_iter().flatten() {
                display.devices_mut().remove_device(device);
            }
        }
    }

    /// The slave a scroll with the given axis source is attributed to,
    /// created on first use.
    pub(super) fn scroll_device(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        source: Option<AxisSource>,
    ) -> Option<DeviceId> {
        let seat = self.seats.iter_mut().find(|seat| seat.name == name)?;
        let pointer = seat.pointer?;
        let master = seat.master_pointer;

        let (slot, device_name, input_source) = match source {
            Some(AxisSource::Wheel) => (
                &mut seat.wheel_scrolling,
                "Wayland Wheel Scrolling",
                InputSource::Mouse,
            ),
            Some(AxisSource::Finger) => (
                &mut seat.finger_scrolling,
                "Wayland Finger Scrolling",
                InputSource::Touchpad,
            ),
            Some(AxisSource::Continuous) => (
                &mut seat.continuous_scrolling,
                "Wayland Continuous Scrolling",
                InputSource::Trackpoint,
            ),
            Some(AxisSource::WheelTilt) | None => return Some(pointer),
        };

        if let Some(device) = *slot {
            return Some(device);
        }

        let device = new_slave(display, device_name, input_source, true);
        let device = add_slave(display, master, device);
        *slot = Some(device);
        Some(device)
    }
}

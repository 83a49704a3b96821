//! X11 backend on XInput2.
//!
//! [`X11Backend`] keeps the XI2 side of the device hierarchy in sync with the
//! display's [`DeviceManager`](crate::device_manager::DeviceManager),
//! translates XI2 and core traffic into [`Event`]s and implements the
//! [`DeviceBackend`] capability set with XI2 requests. XI2 device ids are
//! used as [`DeviceId`]s unchanged.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::backend::{DeviceBackend, DeviceState, PointerState, WindowAtPosition};
use crate::cursor::Cursor;
use crate::device::{AxisUse, CoordSpace, DeviceId, DeviceType, InputMode};
use crate::display::Display;
use crate::error::GrabStatus;
use crate::error_trap::{handle_error, push_error_trap, ErrorTraps, TrapDisplay};
use crate::event::{Event, EventMask, ModifierType, OwnerChange};
use crate::keymap::Keymap;
use crate::selection::OwnerChangeInfo;
use crate::window::{WindowId, WindowType};

pub mod device;
mod device_manager;
mod legacy;
pub mod protocol;
mod translate;


use device::{translate_event_mask, translate_state, Xi2Device};
use protocol::{
    grab_reply, DeviceProperty, SelectionNotify, SelectionNotifySubtype, XEvent, XServer,
    XiEvent, XiEventMask, ALL_MASTER_DEVICES,
};

pub(crate) fn device_id(xi: u16) -> DeviceId {
    DeviceId(u32::from(xi))
}

pub(crate) fn xi_id(device: DeviceId) -> u16 {
    device.0 as u16
}

fn grab_status(reply: u8) -> GrabStatus {
    match reply {
        grab_reply::SUCCESS => GrabStatus::Success,
        grab_reply::ALREADY_GRABBED => GrabStatus::AlreadyGrabbed,
        grab_reply::INVALID_TIME => GrabStatus::InvalidTime,
        grab_reply::NOT_VIEWABLE => GrabStatus::NotViewable,
        grab_reply::FROZEN => GrabStatus::Frozen,
        _ => GrabStatus::Failed,
    }
}

pub struct X11Backend {
    server: Box<dyn XServer>,
    keymap: Box<dyn Keymap>,
    devices: HashMap<DeviceId, Xi2Device>,
    traps: ErrorTraps,
    window_scale: f64,
}

impl std::fmt::Debug for X11Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X11Backend")
            .field("devices", &self.devices)
            .field("traps", &self.traps)
            .field("window_scale", &self.window_scale)
            .finish_non_exhaustive()
    }
}

impl X11Backend {
    pub fn new(server: Box<dyn XServer>, keymap: Box<dyn Keymap>) -> Self {
        Self {
            server,
            keymap,
            devices: HashMap::new(),
            traps: ErrorTraps::default(),
            window_scale: 1.,
        }
    }

    pub fn server(&self) -> &dyn XServer {
        &*self.server
    }

    pub fn server_mut(&mut self) -> &mut dyn XServer {
        &mut *self.server
    }

    /// Integer scale between device pixels and window coordinates.
    pub fn set_window_scale(&mut self, scale: i32) {
        self.window_scale = f64::from(scale.max(1));
    }

    pub fn xi_device(&self, device: DeviceId) -> Option<&Xi2Device> {
        self.devices.get(&device)
    }

    /// Handles one event read from the connection.
    pub fn dispatch(&mut self, display: &mut Display, event: XEvent) {
        match event {
            XEvent::Error(err) => handle_error(self, err.serial, err.error_code),
            XEvent::SelectionNotify(notify) => self.handle_selection_notify(display, &notify),
            XEvent::Core(event) => {
                if let Some(event) = self.translate_core_event(display, &event) {
                    self.deliver(display, event);
                }
            }
            XEvent::Xi(XiEvent::Hierarchy(event)) => self.handle_hierarchy_changed(display, &event),
            XEvent::Xi(XiEvent::DeviceChanged(event)) => self.handle_device_changed(display, &event),
            XEvent::Xi(XiEvent::Property(event)) => self.handle_property_change(display, &event),
            XEvent::Xi(XiEvent::Device(event)) => {
                if let Some(event) = self.translate_device_event(display, &event) {
                    self.deliver(display, event);
                }
            }
            XEvent::Xi(XiEvent::Enter(event)) => {
                if let Some(event) = self.translate_enter_event(display, &event) {
                    self.deliver(display, event);
                }
            }
        }
    }

    fn deliver(&self, display: &mut Display, event: Event) {
        if event.kind.is_crossing() {
            display.handle_focus_crossing(&event);
        }
        display.process_event(self, event);
    }

    /// Reads a device property inside an error trap; a device that vanished
    /// meanwhile reads as having no such property.
    fn get_device_property(&mut self, deviceid: u16, name: &str) -> Option<DeviceProperty> {
        let property = self.server.intern_atom(name);

        let mut trap = push_error_trap(self);
        let reply = trap.server.get_device_property(deviceid, property);
        if let Some(code) = trap.pop() {
            debug!("error {code} reading {name:?} of device {deviceid}");
            return None;
        }

        reply
    }

    fn handle_selection_notify(&mut self, display: &mut Display, notify: &SelectionNotify) {
        let Some(keyboard) = display.get_default_seat().map(|seat| seat.keyboard()) else {
            debug!("selection owner change without a seat");
            return;
        };
        if display.windows().window_type(notify.window).is_none() {
            return;
        }

        let Some(selection) = self.server.atom_name(notify.selection) else {
            warn!("selection notify for unknown atom {:?}", notify.selection);
            return;
        };

        let reason = match notify.subtype {
            SelectionNotifySubtype::SetOwner => OwnerChange::NewOwner,
            SelectionNotifySubtype::WindowDestroy => OwnerChange::Destroy,
            SelectionNotifySubtype::ClientClose => OwnerChange::Close,
        };

        let info = OwnerChangeInfo {
            selection,
            owner: notify.owner,
            reason,
            time: notify.timestamp,
            selection_time: notify.selection_timestamp,
        };
        display.emit_owner_change(notify.window, keyboard, None, info);
    }

    fn coord_space(display: &Display, window: WindowId) -> CoordSpace {
        let windows = display.windows();
        let (width, height) = windows.size(window);
        let (screen_width, screen_height) = windows.screen_size();
        CoordSpace {
            window_width: f64::from(width),
            window_height: f64::from(height),
            screen_width: f64::from(screen_width),
            screen_height: f64::from(screen_height),
        }
    }

    fn is_known_window(display: &Display, window: WindowId) -> bool {
        let windows = display.windows();
        windows.window_type(window).is_some() && !windows.is_destroyed(window)
    }
}

impl TrapDisplay for X11Backend {
    fn error_traps(&mut self) -> &mut ErrorTraps {
        &mut self.traps
    }

    fn next_request(&self) -> u64 {
        self.server.next_request()
    }

    fn last_processed(&self) -> u64 {
        self.server.last_processed()
    }

    fn sync(&mut self) {
        for err in self.server.sync() {
            handle_error(self, err.serial, err.error_code);
        }
    }
}

impl DeviceBackend for X11Backend {
    fn get_state(
        &self,
        display: &Display,
        device: DeviceId,
        window: WindowId,
    ) -> Option<DeviceState> {
        let dev = display.devices().device(device)?;
        let mut axes = vec![0.; dev.n_axes()];

        if !axes.is_empty() {
            let space = Self::coord_space(display, window);
            let (origin_x, origin_y) = display.windows().root_coords(window, 0., 0.);

            let classes = self
                .server
                .query_device(xi_id(device))
                .into_iter()
                .next()
                .map(|info| info.classes)
                .unwrap_or_default();

            for class in classes {
                let protocol::DeviceClass::Valuator { number, value, .. } = class else {
                    continue;
                };
                let index = usize::from(number);
                let Some(axis) = axes.get_mut(index) else {
                    continue;
                };

                let translated = match dev.axis_use(index) {
                    AxisUse::X | AxisUse::Y | AxisUse::Ignore => {
                        if dev.mode() == InputMode::Window {
                            dev.translate_window_coord(index, value, space)
                        } else {
                            dev.translate_screen_coord(index, value, origin_x, origin_y, space)
                        }
                    }
                    _ => dev.translate_axis(index, value),
                };
                if let Some(translated) = translated {
                    *axis = translated;
                }
            }
        }

        let mask = self
            .query_state(display, device, Some(window))
            .map_or(ModifierType::empty(), |state| state.mask);

        Some(DeviceState { axes, mask })
    }

    fn set_window_cursor(
        &mut self,
        display: &Display,
        device: DeviceId,
        window: WindowId,
        cursor: Option<Cursor>,
    ) {
        // Slaves have no cursor of their own.
        let is_master = display
            .devices()
            .device(device)
            .is_some_and(|dev| dev.is_master());
        if !is_master {
            return;
        }

        self.server
            .define_cursor(xi_id(device), window, cursor.as_ref());
    }

    fn warp(&mut self, display: &Display, device: DeviceId, x: f64, y: f64) -> GrabStatus {
        let root = display.windows().root();
        let x = (x * self.window_scale).round() as i32;
        let y = (y * self.window_scale).round() as i32;
        self.server.warp_pointer(xi_id(device), root, x, y);
        GrabStatus::Success
    }

    fn query_state(
        &self,
        display: &Display,
        device: DeviceId,
        window: Option<WindowId>,
    ) -> Option<PointerState> {
        let dev = display.devices().device(device)?;
        if dev.device_type() == DeviceType::Slave {
            let master = dev.associated_device()?;
            return self.query_state(display, master, window);
        }

        let window = window.unwrap_or_else(|| display.windows().root());
        let reply = self.server.query_pointer(xi_id(device), window)?;
        let scale = self.window_scale;

        Some(PointerState {
            root: reply.root,
            child: reply
                .child
                .filter(|child| Self::is_known_window(display, *child)),
            root_x: reply.root_x / scale,
            root_y: reply.root_y / scale,
            win_x: reply.win_x / scale,
            win_y: reply.win_y / scale,
            mask: translate_state(Some(&reply.mods), Some(&reply.buttons), Some(&reply.group)),
        })
    }

    fn grab(
        &mut self,
        _display: &mut Display,
        device: DeviceId,
        window: WindowId,
        owner_events: bool,
        event_mask: EventMask,
        cursor: Option<Cursor>,
        time: u32,
    ) -> GrabStatus {
        let deviceid = xi_id(device);
        let mask = XiEventMask {
            deviceid,
            mask: translate_event_mask(event_mask, self.server.xi_minor_version()),
        };

        let reply = self.server.grab_device(
            deviceid,
            window,
            time,
            cursor.as_ref(),
            owner_events,
            mask,
        );
        grab_status(reply)
    }

    fn ungrab(&mut self, _display: &mut Display, device: DeviceId, time: u32) {
        self.server.ungrab_device(xi_id(device), time);
    }

    fn window_at_position(
        &self,
        display: &Display,
        device: DeviceId,
        get_toplevel: bool,
    ) -> Option<WindowAtPosition> {
        let windows = display.windows();
        let root = windows.root();
        let deviceid = xi_id(device);

        // Walk down from the root through the children containing the
        // pointer, stopping at our toplevel when asked to.
        let mut reply = self.server.query_pointer(deviceid, root)?;
        let mut last = root;
        while let Some(child) = reply.child {
            let Some(next) = self.server.query_pointer(deviceid, child) else {
                break;
            };
            last = child;
            reply = next;

            let ours = matches!(windows.window_type(last), Some(kind) if kind != WindowType::Foreign);
            if get_toplevel && ours {
                break;
            }
        }

        if !Self::is_known_window(display, last) {
            return None;
        }

        Some(WindowAtPosition {
            window: last,
            x: reply.win_x / self.window_scale,
            y: reply.win_y / self.window_scale,
            mask: translate_state(Some(&reply.mods), Some(&reply.buttons), Some(&reply.group)),
        })
    }

    fn select_window_events(&mut self, _display: &Display, window: WindowId, event_mask: EventMask) {
        let mask = XiEventMask {
            deviceid: ALL_MASTER_DEVICES,
            mask: translate_event_mask(event_mask, self.server.xi_minor_version()),
        };
        self.server.select_events(window, &[mask]);
    }
}

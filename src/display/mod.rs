//! Per-connection state shared by the backends: the device hierarchy, the
//! grab table, pointer bookkeeping and the event queue.

use std::collections::{HashMap, VecDeque};

use inputcore_config::Config;

use crate::backend::{DeviceBackend, DeviceState};
use crate::cursor::Cursor;
use crate::device::{DeviceId, DeviceType, InputMode, InputSource, TimeCoord};
use crate::device_manager::DeviceManager;
use crate::error::GrabStatus;
use crate::event::Event;
use crate::seat::{Seat, SeatCapabilities, SeatId};
use crate::signals::{MonitorId, Signal};
use crate::utils::{round_half_up, Clock};
use crate::window::{WindowId, WindowTree};

mod clicks;
mod crossing;
pub mod focus;
pub mod grabs;
mod pipeline;
pub mod pointer_info;
mod seat_grab;

pub use crossing::CrossingSource;
pub use focus::{FocusDetail, FocusMode, FocusTracker};
pub use grabs::{GrabInfo, GrabOwnership, TouchGrabInfo};
pub use pointer_info::PointerWindowInfo;

use clicks::MultipleClickInfo;
use tracing::{debug, warn};

pub struct Display {
    windows: Box<dyn WindowTree>,
    devices: DeviceManager,
    clock: Clock,
    config: Config,
    serial: u64,
    queue: VecDeque<Event>,
    device_grabs: HashMap<DeviceId, Vec<GrabInfo>>,
    touch_grabs: Vec<TouchGrabInfo>,
    pointers: HashMap<DeviceId, PointerWindowInfo>,
    clicks: HashMap<DeviceId, MultipleClickInfo>,
    focus: FocusTracker,
    last_event_time: u32,
    monitors: Vec<MonitorId>,
}

impl std::fmt::Debug for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Display")
            .field("serial", &self.serial)
            .field("queue", &self.queue.len())
            .field("device_grabs", &self.device_grabs)
            .field("touch_grabs", &self.touch_grabs)
            .field("last_event_time", &self.last_event_time)
            .finish_non_exhaustive()
    }
}

impl Display {
    pub fn new(windows: Box<dyn WindowTree>, config: Config, clock: Clock) -> Self {
        Self {
            windows,
            devices: DeviceManager::new(),
            clock,
            config,
            serial: 0,
            queue: VecDeque::new(),
            device_grabs: HashMap::new(),
            touch_grabs: Vec::new(),
            pointers: HashMap::new(),
            clicks: HashMap::new(),
            focus: FocusTracker::default(),
            last_event_time: 0,
            monitors: Vec::new(),
        }
    }

    pub fn windows(&self) -> &dyn WindowTree {
        &*self.windows
    }

    pub fn windows_mut(&mut self) -> &mut dyn WindowTree {
        &mut *self.windows
    }

    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceManager {
        &mut self.devices
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Allocates the serial of the next request or event.
    pub fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    /// The most recently allocated serial.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Time of the last event that carried one.
    pub fn last_event_time(&self) -> u32 {
        self.last_event_time
    }

    pub(crate) fn update_last_event_time(&mut self, time: u32) {
        if time != 0 {
            self.last_event_time = time;
        }
    }

    // =========================================================================
    // Event queue
    // =========================================================================

    /// Appends an event to the queue without processing it.
    pub fn put_event(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    pub fn get_event(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    pub fn peek_event(&self) -> Option<&Event> {
        self.queue.front()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.queue.drain(..).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    // =========================================================================
    // Devices and seats
    // =========================================================================

    pub fn list_devices(&self) -> Vec<DeviceId> {
        self.devices.devices().map(|device| device.id()).collect()
    }

    pub fn get_default_seat(&self) -> Option<&Seat> {
        self.devices.default_seat()
    }

    pub fn list_seats(&self) -> Vec<SeatId> {
        self.devices.seats().iter().map(Seat::id).collect()
    }

    pub(crate) fn is_keyboard(&self, device: DeviceId) -> bool {
        self.devices
            .device(device)
            .is_some_and(|device| device.source() == InputSource::Keyboard)
    }

    /// Removes a device along with its grabs and pointer state.
    pub fn remove_device(&mut self, device: DeviceId) {
        self.device_grabs.remove(&device);
        self.touch_grabs.retain(|info| info.device != device);
        self.pointers.remove(&device);
        self.clicks.remove(&device);
        self.devices.remove_device(device);
    }

    pub fn monitor_added(&mut self, monitor: MonitorId) {
        debug!("monitor {monitor:?} added");
        self.monitors.push(monitor);
        self.devices.emit(Signal::MonitorAdded(monitor));
    }

    pub fn monitor_removed(&mut self, monitor: MonitorId) {
        debug!("monitor {monitor:?} removed");
        self.monitors.retain(|other| *other != monitor);
        self.devices.emit(Signal::MonitorRemoved(monitor));
    }

    pub fn monitors(&self) -> &[MonitorId] {
        &self.monitors
    }

    // =========================================================================
    // Pointer info
    // =========================================================================

    /// Keyboards share the pointer state of their paired pointer.
    fn pointer_key(&self, device: DeviceId) -> DeviceId {
        match self.devices.device(device) {
            Some(dev) if dev.source() == InputSource::Keyboard => {
                dev.associated_device().unwrap_or(device)
            }
            _ => device,
        }
    }

    pub fn pointer_info(&self, device: DeviceId) -> PointerWindowInfo {
        self.pointers
            .get(&self.pointer_key(device))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn pointer_info_mut(&mut self, device: DeviceId) -> &mut PointerWindowInfo {
        let key = self.pointer_key(device);
        self.pointers.entry(key).or_default()
    }

    pub(crate) fn set_window_under_pointer(&mut self, device: DeviceId, window: Option<WindowId>) {
        self.pointer_info_mut(device).window_under_pointer = window;
    }

    /// Drops every reference to a window that is going away: grabs on it end
    /// as implicit ungrabs, and pointers stop tracking it.
    pub fn withdraw_window(&mut self, backend: &dyn DeviceBackend, window: WindowId) {
        let serial = self.serial;
        let devices: Vec<_> = self.device_grabs.keys().copied().collect();

        for device in devices {
            let inside = self
                .has_device_grab(device, serial)
                .is_some_and(|grab| self.windows.is_event_parent_of(window, grab.window));
            if inside {
                self.end_device_grab(device, serial, Some(window), true);
                self.device_grab_update(backend, device, None, serial);
            }
        }

        let touch: Vec<_> = self
            .touch_grabs
            .iter()
            .filter(|info| self.windows.is_event_parent_of(window, info.window))
            .map(|info| (info.device, info.sequence))
            .collect();
        for (device, sequence) in touch {
            self.end_touch_grab(device, sequence);
        }

        for info in self.pointers.values_mut() {
            if info.toplevel_under_pointer == Some(window) {
                info.toplevel_under_pointer = None;
            }
            if info
                .window_under_pointer
                .is_some_and(|under| self.windows.is_event_parent_of(window, under))
            {
                info.window_under_pointer = None;
            }
        }

        self.focus.forget(window);
    }

    // =========================================================================
    // Grab queries
    // =========================================================================

    /// Window and owner_events of the device's most recent grab.
    pub fn device_grab_info(&self, device: DeviceId) -> Option<(WindowId, bool)> {
        self.get_last_device_grab(device)
            .map(|grab| (grab.window, grab.owner_events))
    }

    /// Whether the device has an explicit grab.
    pub fn device_is_grabbed(&self, device: DeviceId) -> bool {
        self.get_last_device_grab(device)
            .is_some_and(|grab| !grab.implicit)
    }

    /// Whether any seat pointer has an explicit grab.
    pub fn pointer_is_grabbed(&self) -> bool {
        self.devices.seats().iter().any(|seat| {
            seat.get_master_pointers(SeatCapabilities::ALL_POINTING)
                .into_iter()
                .any(|pointer| self.device_is_grabbed(pointer))
        })
    }

    // =========================================================================
    // Device queries
    // =========================================================================

    fn check_pointing(&self, device: DeviceId, op: &str) -> bool {
        let Some(dev) = self.devices.device(device) else {
            warn!("{op}: unknown {device}");
            return false;
        };

        if dev.source() == InputSource::Keyboard {
            warn!("{op}: {device} is a keyboard");
            return false;
        }

        if dev.device_type() == DeviceType::Slave && !self.device_is_grabbed(device) {
            warn!("{op}: {device} is an ungrabbed slave");
            return false;
        }

        true
    }

    /// Axes and modifier state of a device relative to `window`.
    pub fn get_device_state(
        &self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
        window: WindowId,
    ) -> Option<DeviceState> {
        if !self.check_pointing(device, "get_state") {
            return None;
        }
        backend.get_state(self, device, window)
    }

    /// Root coordinates of the device.
    pub fn get_device_position_double(
        &self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
    ) -> Option<(f64, f64)> {
        if !self.check_pointing(device, "get_position") {
            return None;
        }
        let state = backend.query_state(self, device, None)?;
        Some((state.root_x, state.root_y))
    }

    pub fn get_device_position(
        &self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
    ) -> Option<(i32, i32)> {
        let (x, y) = self.get_device_position_double(backend, device)?;
        Some((round_half_up(x), round_half_up(y)))
    }

    /// The deepest window under the device, with the position relative to it.
    pub fn get_window_at_device_position_double(
        &self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
    ) -> Option<(WindowId, f64, f64)> {
        if !self.check_pointing(device, "get_window_at_position") {
            return None;
        }

        let found = backend.window_at_position(self, device, false)?;
        Some(
            self.windows
                .find_descendant_at(found.window, found.x, found.y),
        )
    }

    pub fn get_window_at_device_position(
        &self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
    ) -> Option<(WindowId, i32, i32)> {
        let (window, x, y) = self.get_window_at_device_position_double(backend, device)?;
        Some((window, round_half_up(x), round_half_up(y)))
    }

    /// The window under the default seat's pointer.
    pub fn get_window_at_pointer(
        &self,
        backend: &dyn DeviceBackend,
    ) -> Option<(WindowId, i32, i32)> {
        let pointer = self.devices.default_seat()?.pointer();
        self.get_window_at_device_position(backend, pointer)
    }

    pub fn get_device_history(
        &self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
        window: WindowId,
        start: u32,
        stop: u32,
    ) -> Vec<TimeCoord> {
        if self.is_keyboard(device) {
            warn!("get_history: {device} is a keyboard");
            return Vec::new();
        }
        if self.windows.is_destroyed(window) {
            return Vec::new();
        }
        backend.get_history(self, device, window, start, stop)
    }

    /// The window that received the device's last pointer event.
    pub fn get_last_event_window(&self, device: DeviceId) -> Option<WindowId> {
        if self.is_keyboard(device) {
            warn!("get_last_event_window: {device} is a keyboard");
            return None;
        }
        self.pointer_info(device).window_under_pointer
    }

    pub fn set_device_mode(&mut self, device: DeviceId, mode: InputMode) -> bool {
        self.devices.set_device_mode(device, mode)
    }

    pub fn warp_device(
        &self,
        backend: &mut dyn DeviceBackend,
        device: DeviceId,
        x: f64,
        y: f64,
    ) -> GrabStatus {
        if self.is_keyboard(device) {
            warn!("warp: {device} is a keyboard");
            return GrabStatus::Failed;
        }
        backend.warp(self, device, x, y)
    }

    pub fn set_device_cursor(
        &self,
        backend: &mut dyn DeviceBackend,
        device: DeviceId,
        window: WindowId,
        cursor: Option<Cursor>,
    ) {
        if self.is_keyboard(device) {
            warn!("set_cursor: {device} is a keyboard");
            return;
        }
        backend.set_window_cursor(self, device, window, cursor);
    }
}

//! Wayland backend.
//!
//! There is no server-side device hierarchy on Wayland, so [`WaylandBackend`]
//! builds one from the seat capabilities: a master pointer and keyboard per
//! `wl_seat`, a slave per capability, a touch master, and a master per tablet.
//! Grabs are purely client side; the compositor only ever sees cursor
//! changes.

use tracing::{debug, trace, warn};

use crate::backend::{
    DeviceBackend, DeviceState, PointerState, Scheduler, TimerKind, WindowAtPosition,
};
use crate::cursor::{AnimationStep, Cursor};
use crate::device::DeviceId;
use crate::display::{Display, GrabOwnership};
use crate::error::GrabStatus;
use crate::event::{
    CrossingEvent, CrossingMode, Event, EventData, EventMask, EventType, FocusEvent,
    ModifierType, NotifyType,
};
use crate::keymap::Keymap;
use crate::seat::{SeatCapabilities, SeatId};
use crate::window::{WindowId, WindowType};

mod keyboard;
mod pad;
mod pointer;
pub mod protocol;
mod seat;
mod tablet;
mod touch;

#[cfg(test)]
mod tests;

use protocol::{Compositor, CursorTarget, GlobalName, SeatEvent, WlEvent};
use seat::WaylandSeat;

fn find_seat(seats: &[WaylandSeat], name: GlobalName) -> Option<&WaylandSeat> {
    seats.iter().find(|seat| seat.name == name)
}

fn find_seat_mut(seats: &mut [WaylandSeat], name: GlobalName) -> Option<&mut WaylandSeat> {
    seats.iter_mut().find(|seat| seat.name == name)
}

pub struct WaylandBackend {
    compositor: Box<dyn Compositor>,
    keymap: Box<dyn Keymap>,
    scheduler: Box<dyn Scheduler>,
    seats: Vec<WaylandSeat>,
    default_cursor: Option<Cursor>,
}

impl std::fmt::Debug for WaylandBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaylandBackend")
            .field("seats", &self.seats)
            .field("default_cursor", &self.default_cursor)
            .finish_non_exhaustive()
    }
}

impl WaylandBackend {
    pub fn new(
        compositor: Box<dyn Compositor>,
        keymap: Box<dyn Keymap>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self {
            compositor,
            keymap,
            scheduler,
            seats: Vec::new(),
            default_cursor: None,
        }
    }

    pub fn keymap(&self) -> &dyn Keymap {
        &*self.keymap
    }

    /// Cursor shown on windows that did not set one. `None` hides the
    /// pointer on such windows.
    pub fn set_default_cursor(&mut self, cursor: Option<Cursor>) {
        self.default_cursor = cursor;
    }

    /// The display seat created for a `wl_seat` global.
    pub fn seat_id(&self, name: GlobalName) -> Option<SeatId> {
        find_seat(&self.seats, name).map(|seat| seat.id)
    }

    /// Handles one event read from the connection.
    pub fn dispatch(&mut self, display: &mut Display, event: WlEvent) {
        match event {
            WlEvent::SeatGlobal { name, version } => {
                self.handle_seat_global(display, name, version)
            }
            WlEvent::SeatGlobalRemoved(name) => self.handle_seat_global_removed(display, name),
            WlEvent::Seat(name, event) => self.handle_seat_event(display, name, event),
        }
    }

    fn handle_seat_event(&mut self, display: &mut Display, name: GlobalName, event: SeatEvent) {
        match event {
            SeatEvent::Capabilities(caps) => self.handle_capabilities(display, name, caps),
            SeatEvent::Name(seat_name) => {
                if let Some(seat) = find_seat_mut(&mut self.seats, name) {
                    debug!("seat {:?} is named {seat_name:?}", seat.id);
                    seat.seat_name = Some(seat_name);
                }
            }
            SeatEvent::Pointer(event) => self.handle_pointer_event(display, name, event),
            SeatEvent::Keyboard(event) => self.handle_keyboard_event(display, name, event),
            SeatEvent::Touch(event) => self.handle_touch_event(display, name, event),
            SeatEvent::Swipe(event) => self.handle_swipe_event(display, name, event),
            SeatEvent::Pinch(event) => self.handle_pinch_event(display, name, event),
            SeatEvent::TabletAdded(tablet) => self.handle_tablet_added(name, tablet),
            SeatEvent::Tablet(tablet, event) => {
                self.handle_tablet_event(display, name, tablet, event)
            }
            SeatEvent::ToolAdded(tool) => self.handle_tool_added(name, tool),
            SeatEvent::Tool(tool, event) => self.handle_tool_event(display, name, tool, event),
            SeatEvent::PadAdded(pad) => self.handle_pad_added(name, pad),
            SeatEvent::Pad(pad, event) => self.handle_pad_event(display, name, pad, event),
            SeatEvent::PadGroup { pad, group, event } => {
                self.handle_pad_group_event(display, name, pad, group, event)
            }
            SeatEvent::PadRing {
                pad,
                group,
                ring,
                event,
            } => self.handle_pad_ring_event(display, name, pad, group, ring, event),
            SeatEvent::PadStrip {
                pad,
                group,
                strip,
                event,
            } => self.handle_pad_strip_event(display, name, pad, group, strip, event),
            SeatEvent::Selection => self.handle_selection(display, name, false),
            SeatEvent::PrimarySelection => self.handle_selection(display, name, true),
            SeatEvent::RepeatSyncDone => self.handle_repeat_sync_done(display, name),
        }
    }

    /// Runs a timer armed through the scheduler.
    pub fn on_timer(&mut self, kind: TimerKind) {
        self.scheduler.expired(kind);

        match kind {
            TimerKind::KeyRepeat(seat) => self.key_repeat_timeout(seat),
            TimerKind::CursorAnimation(device) => self.update_cursor(device),
        }
    }

    /// Keyboard focus is explicit on Wayland, so crossings never feed the
    /// focus tracker.
    fn deliver(&self, display: &mut Display, event: Event) {
        display.process_event(self, event);
    }

    fn deliver_all(&self, display: &mut Display, events: Vec<Event>) {
        for event in events {
            self.deliver(display, event);
        }
    }

    fn is_known_window(display: &Display, window: WindowId) -> bool {
        let windows = display.windows();
        windows.window_type(window).is_some() && !windows.is_destroyed(window)
    }

    fn seat_for_device(&self, device: DeviceId) -> Option<&WaylandSeat> {
        self.seats.iter().find(|seat| seat.owns_master(device))
    }

    fn seat_for_device_mut(&mut self, device: DeviceId) -> Option<&mut WaylandSeat> {
        self.seats.iter_mut().find(|seat| seat.owns_master(device))
    }

    fn is_keyboard_master(&self, device: DeviceId) -> bool {
        self.seats.iter().any(|seat| seat.master_keyboard == device)
    }

    /// Where the cursor of a master pointer is drawn, if anywhere.
    fn cursor_target(seat: &WaylandSeat, device: DeviceId) -> Option<CursorTarget> {
        if device == seat.master_pointer {
            return seat.pointer.map(|_| CursorTarget::Pointer(seat.name));
        }
        seat.tablets
            .iter()
            .find(|tablet| tablet.master == Some(device))
            .and_then(|tablet| tablet.current_tool)
            .map(|tool| CursorTarget::Tool(seat.name, tool))
    }

    /// Pushes the current cursor frame of `device` to the compositor and
    /// arms the timer for the next one.
    fn update_cursor(&mut self, device: DeviceId) {
        let kind = TimerKind::CursorAnimation(device);
        let Some(seat) = self.seats.iter_mut().find(|seat| seat.owns_master(device)) else {
            self.scheduler.cancel(kind);
            return;
        };
        let Some(target) = Self::cursor_target(seat, device) else {
            self.scheduler.cancel(kind);
            return;
        };
        let Some(pointer) = seat.pointer_data_mut(device) else {
            return;
        };

        let buffer = pointer.animation.current_buffer();
        self.compositor
            .set_cursor(target, pointer.enter_serial, buffer);

        match pointer.animation.advance() {
            AnimationStep::Stop => self.scheduler.cancel(kind),
            AnimationStep::Schedule(delay) => {
                self.scheduler
                    .schedule(kind, std::time::Duration::from_millis(u64::from(delay)));
            }
            AnimationStep::Continue => {
                if !self.scheduler.is_scheduled(kind) {
                    let delay = pointer.animation.image_delay();
                    self.scheduler
                        .schedule(kind, std::time::Duration::from_millis(u64::from(delay)));
                }
            }
        }
    }

    fn stop_cursor_animation(&mut self, device: DeviceId) {
        if let Some(pointer) = self
            .seats
            .iter_mut()
            .find_map(|seat| seat.pointer_data_mut(device))
        {
            pointer.animation.stop();
        }
        self.scheduler.cancel(TimerKind::CursorAnimation(device));
    }

    /// Position of `device` relative to `window` and its modifier state.
    fn device_position(
        &self,
        display: &Display,
        device: DeviceId,
        window: WindowId,
    ) -> (f64, f64, ModifierType) {
        let Some(seat) = self.seat_for_device(device) else {
            return (0., 0., ModifierType::empty());
        };
        let state = seat.modifiers(device);
        let Some(pointer) = seat.pointer_data(device) else {
            return (0., 0., state);
        };

        let windows = display.windows();
        let (_, _, x_root, y_root) = pointer.coords(windows);
        let (origin_x, origin_y) = windows.root_coords(window, 0., 0.);
        (x_root - origin_x, y_root - origin_y, state)
    }

    /// Crossings a grab or ungrab causes between `from` and `to` for one
    /// master device.
    fn grab_crossing_events(
        &self,
        display: &Display,
        device: DeviceId,
        from: Option<WindowId>,
        to: Option<WindowId>,
        mode: CrossingMode,
        time: u32,
    ) -> Vec<Event> {
        let seat = self.seat_for_device(device).map(|seat| seat.id);
        let mut events = Vec::new();

        if self.is_keyboard_master(device) {
            let focus = |window, is_in| {
                Event::new(
                    EventType::FocusChange,
                    Some(window),
                    EventData::Focus(FocusEvent { is_in }),
                )
                .with_devices(device, Some(device))
                .with_seat(seat)
            };
            events.extend(from.map(|window| focus(window, false)));
            events.extend(to.map(|window| focus(window, true)));
            return events;
        }

        let windows = display.windows();
        let crossing = |kind, window: WindowId| {
            let (x, y, state) = self.device_position(display, device, window);
            let (x_root, y_root) = windows.root_coords(window, x, y);
            Event::new(
                kind,
                Some(window),
                EventData::Crossing(CrossingEvent {
                    subwindow: None,
                    time,
                    x,
                    y,
                    x_root,
                    y_root,
                    mode,
                    detail: NotifyType::Nonlinear,
                    focus: false,
                    state,
                }),
            )
            .with_devices(device, Some(device))
            .with_seat(seat)
        };
        events.extend(from.map(|window| crossing(EventType::LeaveNotify, window)));
        events.extend(to.map(|window| crossing(EventType::EnterNotify, window)));
        events
    }

    /// Moves the device's focus to `window` for the duration of a grab.
    fn maybe_emit_grab_crossing(
        &self,
        display: &mut Display,
        device: DeviceId,
        window: WindowId,
        time: u32,
    ) {
        let focus = self
            .seat_for_device(device)
            .and_then(|seat| seat.focus(device));
        if focus != Some(window) {
            let events = self.grab_crossing_events(
                display,
                device,
                focus,
                Some(window),
                CrossingMode::Grab,
                time,
            );
            self.deliver_all(display, events);
        }
    }

    /// Ends the last grab of `device` at once and moves it back to its
    /// real focus. Returns the native window of the ended grab.
    fn maybe_emit_ungrab_crossing(
        &self,
        display: &mut Display,
        device: DeviceId,
        time: u32,
    ) -> Option<WindowId> {
        let focus = self
            .seat_for_device(device)
            .and_then(|seat| seat.focus(device));

        let (prev, native) = match display.get_last_device_grab_mut(device) {
            Some(grab) => {
                grab.serial_end = grab.serial_start;
                (Some(grab.window), Some(grab.native_window))
            }
            None => (None, None),
        };

        if focus != native {
            let events =
                self.grab_crossing_events(display, device, prev, focus, CrossingMode::Ungrab, time);
            self.deliver_all(display, events);
        }
        native
    }

    fn end_last_grab_now(display: &mut Display, device: DeviceId) {
        if let Some(grab) = display.get_last_device_grab_mut(device) {
            grab.serial_end = grab.serial_start;
        }
    }
}

impl DeviceBackend for WaylandBackend {
    fn get_state(
        &self,
        display: &Display,
        device: DeviceId,
        window: WindowId,
    ) -> Option<DeviceState> {
        let master = display.devices().master_of(device);
        let (x, y, mask) = self.device_position(display, master, window);
        Some(DeviceState {
            axes: vec![x, y],
            mask,
        })
    }

    fn set_window_cursor(
        &mut self,
        display: &Display,
        device: DeviceId,
        window: WindowId,
        cursor: Option<Cursor>,
    ) {
        let _ = window;
        let is_master = display
            .devices()
            .device(device)
            .is_some_and(|dev| dev.is_master());
        if !is_master {
            return;
        }

        let default_cursor = self.default_cursor.clone();
        let Some(seat) = self.seat_for_device_mut(device) else {
            return;
        };
        // The touch master has no cursor on screen.
        if seat.touch_master == Some(device) {
            return;
        }

        let cursor = seat.grab_cursor.clone().or(cursor).or(default_cursor);
        let Some(pointer) = seat.pointer_data_mut(device) else {
            return;
        };
        match cursor {
            Some(cursor) => {
                if !pointer.animation.set_cursor(cursor) {
                    return;
                }
            }
            None => pointer.animation.clear(),
        }

        self.scheduler.cancel(TimerKind::CursorAnimation(device));
        self.update_cursor(device);
    }

    fn warp(&mut self, _display: &Display, device: DeviceId, x: f64, y: f64) -> GrabStatus {
        trace!("ignoring warp of {device} to ({x}, {y})");
        GrabStatus::Success
    }

    fn query_state(
        &self,
        display: &Display,
        device: DeviceId,
        window: Option<WindowId>,
    ) -> Option<PointerState> {
        let device = display.devices().master_of(device);
        let seat = self.seat_for_device(device)?;
        let pointer = seat.pointer_data(device)?;

        let windows = display.windows();
        let root = windows.root();
        let window = window.unwrap_or(root);
        let child = pointer
            .focus
            .filter(|focus| windows.parent(*focus) == Some(window));
        let (win_x, win_y, root_x, root_y) = pointer.coords(windows);

        Some(PointerState {
            root,
            child,
            root_x,
            root_y,
            win_x,
            win_y,
            mask: seat.modifiers(device),
        })
    }

    fn grab(
        &mut self,
        display: &mut Display,
        device: DeviceId,
        window: WindowId,
        _owner_events: bool,
        _event_mask: EventMask,
        cursor: Option<Cursor>,
        time: u32,
    ) -> GrabStatus {
        let Some(seat) = self.seat_for_device(device) else {
            return GrabStatus::Failed;
        };
        let seat_id = seat.id;

        let windows = display.windows();
        if windows.window_type(window) == Some(WindowType::Temp) && windows.is_visible(window) {
            warn!("grabbing {device} on a visible temp window {window:?}");
        }

        self.maybe_emit_grab_crossing(display, device, window, time);

        if self.is_keyboard_master(device) {
            if display.windows().window_type(window) == Some(WindowType::Toplevel) {
                display.windows_mut().inhibit_shortcuts(window, seat_id);
            }
            return GrabStatus::Success;
        }

        let Some(seat) = self.seat_for_device_mut(device) else {
            return GrabStatus::Failed;
        };
        let Some(pointer) = seat.pointer_data_mut(device) else {
            return GrabStatus::Failed;
        };
        if pointer.grab_window.is_some() && time != 0 && pointer.grab_time > time {
            return GrabStatus::AlreadyGrabbed;
        }
        pointer.grab_window = Some(window);
        pointer.grab_time = if time == 0 { pointer.time } else { time };
        seat.grab_cursor = cursor;

        display.windows_mut().set_grab_seat(window, Some(seat_id));
        self.update_cursor(device);
        GrabStatus::Success
    }

    fn ungrab(&mut self, display: &mut Display, device: DeviceId, time: u32) {
        let Some(seat_id) = self.seat_for_device(device).map(|seat| seat.id) else {
            return;
        };
        let native = self.maybe_emit_ungrab_crossing(display, device, time);

        if self.is_keyboard_master(device) {
            if let Some(native) = native {
                display.windows_mut().restore_shortcuts(native, seat_id);
            }
            return;
        }

        let grab_window = self.seat_for_device_mut(device).and_then(|seat| {
            seat.grab_cursor = None;
            seat.pointer_data_mut(device)
                .and_then(|pointer| pointer.grab_window.take())
        });
        if let Some(grab_window) = grab_window {
            display.windows_mut().set_grab_seat(grab_window, None);
        }
        self.update_cursor(device);
    }

    fn window_at_position(
        &self,
        display: &Display,
        device: DeviceId,
        get_toplevel: bool,
    ) -> Option<WindowAtPosition> {
        let device = display.devices().master_of(device);
        let seat = self.seat_for_device(device)?;
        let pointer = seat.pointer_data(device)?;
        let focus = pointer.focus?;

        let windows = display.windows();
        let (window, x, y) = if get_toplevel {
            let toplevel = windows.toplevel(focus);
            let (x, y) = windows.translate_coords(focus, toplevel, pointer.surface_x, pointer.surface_y);
            (toplevel, x, y)
        } else {
            (focus, pointer.surface_x, pointer.surface_y)
        };

        Some(WindowAtPosition {
            window,
            x,
            y,
            mask: seat.modifiers(device),
        })
    }

    fn select_window_events(&mut self, _display: &Display, _window: WindowId, _event_mask: EventMask) {}

    fn seat_grab(
        &mut self,
        display: &mut Display,
        seat: SeatId,
        window: WindowId,
        capabilities: SeatCapabilities,
        owner_events: bool,
        cursor: Option<Cursor>,
        time: u32,
    ) -> Option<GrabStatus> {
        let index = self.seats.iter().position(|wl_seat| wl_seat.id == seat)?;
        let Some(native) = display.windows().native_toplevel(window) else {
            return Some(GrabStatus::NotViewable);
        };

        let grab = |display: &mut Display, device: DeviceId| {
            let serial = display.next_serial();
            display.add_device_grab(
                device,
                window,
                native,
                GrabOwnership::None,
                owner_events,
                EventMask::ALL_EVENTS,
                serial,
                time,
                false,
            );
        };

        let wl_seat = &self.seats[index];
        let (master_pointer, master_keyboard, touch_master) = (
            wl_seat.master_pointer,
            wl_seat.master_keyboard,
            wl_seat.touch_master,
        );
        let tablet_masters: Vec<_> = wl_seat.tablets.iter().filter_map(|tablet| tablet.master).collect();

        if capabilities.contains(SeatCapabilities::POINTER) {
            self.maybe_emit_grab_crossing(display, master_pointer, native, time);
            grab(display, master_pointer);
            self.seats[index].grab_cursor = cursor;
            self.update_cursor(master_pointer);
        }

        if capabilities.contains(SeatCapabilities::TOUCH) {
            if let Some(touch_master) = touch_master {
                self.maybe_emit_grab_crossing(display, touch_master, native, time);
                grab(display, touch_master);
            }
        }

        if capabilities.contains(SeatCapabilities::KEYBOARD) {
            self.maybe_emit_grab_crossing(display, master_keyboard, native, time);
            grab(display, master_keyboard);

            if capabilities == SeatCapabilities::KEYBOARD
                && display.windows().window_type(native) == Some(WindowType::Toplevel)
            {
                display.windows_mut().inhibit_shortcuts(native, seat);
            }
        }

        if capabilities.contains(SeatCapabilities::TABLET_STYLUS) {
            for master in tablet_masters {
                self.maybe_emit_grab_crossing(display, master, native, time);
                grab(display, master);
                self.update_cursor(master);
            }
        }

        Some(GrabStatus::Success)
    }

    fn seat_ungrab(&mut self, display: &mut Display, seat: SeatId) -> bool {
        let Some(index) = self.seats.iter().position(|wl_seat| wl_seat.id == seat) else {
            return false;
        };

        let wl_seat = &mut self.seats[index];
        wl_seat.grab_cursor = None;
        let (master_pointer, master_keyboard, touch_master) = (
            wl_seat.master_pointer,
            wl_seat.master_keyboard,
            wl_seat.touch_master,
        );
        let tablet_masters: Vec<_> = wl_seat.tablets.iter().filter_map(|tablet| tablet.master).collect();

        self.maybe_emit_ungrab_crossing(display, master_pointer, 0);
        self.update_cursor(master_pointer);

        if let Some(native) = self.maybe_emit_ungrab_crossing(display, master_keyboard, 0) {
            display.windows_mut().restore_shortcuts(native, seat);
        }

        if let Some(touch_master) = touch_master {
            Self::end_last_grab_now(display, touch_master);
        }
        for master in tablet_masters {
            Self::end_last_grab_now(display, master);
        }

        true
    }
}

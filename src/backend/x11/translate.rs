//! XI2 device and crossing events to [`Event`]s.

use tracing::{trace, warn};

use crate::device::{AxisUse, DeviceId, DeviceType, InputMode};
use crate::display::{Display, FocusDetail, FocusMode};
use crate::event::{
    ButtonEvent, CrossingEvent, CrossingMode, Event, EventData, EventSequence, EventType,
    KeyEvent, ModifierType, MotionEvent, NotifyType, ScrollDirection, ScrollEvent, TouchEvent,
};
use crate::keymap::{keysyms, translate_keyboard_string};
use crate::window::{WindowId, WindowType};

use super::device::translate_state;
use super::protocol::{
    ValuatorState, XiDeviceEvent, XiEnterEvent, XiEventType, XiNotifyDetail, XiNotifyMode,
    POINTER_EMULATED, TOUCH_EMULATING_POINTER,
};
use super::{device_id, X11Backend};

pub(super) fn crossing_mode(mode: XiNotifyMode) -> Option<CrossingMode> {
    match mode {
        XiNotifyMode::Normal => Some(CrossingMode::Normal),
        XiNotifyMode::Grab | XiNotifyMode::PassiveGrab => Some(CrossingMode::Grab),
        XiNotifyMode::Ungrab | XiNotifyMode::PassiveUngrab => Some(CrossingMode::Ungrab),
        XiNotifyMode::WhileGrabbed => None,
    }
}

pub(super) fn notify_type(detail: XiNotifyDetail) -> NotifyType {
    match detail {
        XiNotifyDetail::Ancestor => NotifyType::Ancestor,
        XiNotifyDetail::Virtual => NotifyType::Virtual,
        XiNotifyDetail::Inferior => NotifyType::Inferior,
        XiNotifyDetail::Nonlinear => NotifyType::Nonlinear,
        XiNotifyDetail::NonlinearVirtual => NotifyType::NonlinearVirtual,
        XiNotifyDetail::Pointer | XiNotifyDetail::PointerRoot | XiNotifyDetail::DetailNone => {
            NotifyType::Unknown
        }
    }
}

pub(super) fn focus_detail(detail: XiNotifyDetail) -> FocusDetail {
    match detail {
        XiNotifyDetail::Ancestor => FocusDetail::Ancestor,
        XiNotifyDetail::Virtual => FocusDetail::Virtual,
        XiNotifyDetail::Inferior => FocusDetail::Inferior,
        XiNotifyDetail::Nonlinear => FocusDetail::Nonlinear,
        XiNotifyDetail::NonlinearVirtual => FocusDetail::NonlinearVirtual,
        XiNotifyDetail::Pointer => FocusDetail::Pointer,
        XiNotifyDetail::PointerRoot => FocusDetail::PointerRoot,
        XiNotifyDetail::DetailNone => FocusDetail::DetailNone,
    }
}

pub(super) fn focus_mode(mode: XiNotifyMode) -> FocusMode {
    match mode {
        XiNotifyMode::Normal => FocusMode::Normal,
        XiNotifyMode::Grab => FocusMode::Grab,
        XiNotifyMode::Ungrab => FocusMode::Ungrab,
        XiNotifyMode::WhileGrabbed => FocusMode::WhileGrabbed,
        XiNotifyMode::PassiveGrab => FocusMode::PassiveGrab,
        XiNotifyMode::PassiveUngrab => FocusMode::PassiveUngrab,
    }
}

/// Event and root coordinates of one event, in window units.
#[derive(Debug, Clone, Copy)]
struct Coords {
    x: f64,
    y: f64,
    x_root: f64,
    y_root: f64,
}

impl X11Backend {
    fn coords(&self, event_x: f64, event_y: f64, root_x: f64, root_y: f64) -> Coords {
        let scale = self.window_scale;
        Coords {
            x: event_x / scale,
            y: event_y / scale,
            x_root: root_x / scale,
            y_root: root_y / scale,
        }
    }

    /// The window an event is reported on. Key events go to the grab
    /// window unless the grab reports events to their owner and the event
    /// window belongs to it.
    fn event_window(
        display: &Display,
        xev: &XiDeviceEvent,
        device: DeviceId,
    ) -> Option<WindowId> {
        let window = xev.event;
        if !Self::is_known_window(display, window) {
            return None;
        }

        if matches!(xev.evtype, XiEventType::KeyPress | XiEventType::KeyRelease) {
            if let Some(grab) = display.has_device_grab(device, display.serial() + 1) {
                if !grab.owner_events || !display.windows().is_event_parent_of(grab.window, window)
                {
                    return Some(grab.window);
                }
            }
        }

        Some(window)
    }

    pub(super) fn translate_device_event(
        &mut self,
        display: &mut Display,
        xev: &XiDeviceEvent,
    ) -> Option<Event> {
        let device = device_id(xev.deviceid);
        let source = device_id(xev.sourceid);
        if !display.devices().contains(device) || !display.devices().contains(source) {
            trace!("dropping XI2 event of unknown device {device}");
            return None;
        }

        let window = Self::event_window(display, xev, device)?;
        let seat = display.devices().device(device).and_then(|dev| dev.seat());

        let (kind, data) = match xev.evtype {
            XiEventType::KeyPress | XiEventType::KeyRelease => {
                self.translate_key(display, xev, window)?
            }
            XiEventType::ButtonPress | XiEventType::ButtonRelease => {
                self.translate_button(display, xev, window, device)?
            }
            XiEventType::Motion => self.translate_motion(display, xev, window, device, source),
            XiEventType::TouchBegin | XiEventType::TouchUpdate | XiEventType::TouchEnd => {
                self.translate_touch(display, xev, window, device)
            }
            evtype => {
                trace!("ignoring XI2 {evtype:?} as a device event");
                return None;
            }
        };

        let mut event = Event::new(kind, Some(window), data)
            .with_devices(device, Some(source))
            .with_seat(seat);
        event.send_event = xev.send_event;

        match event.kind {
            EventType::ButtonPress | EventType::ButtonRelease | EventType::MotionNotify => {
                event.tool = display
                    .devices()
                    .device(source)
                    .and_then(|dev| dev.last_tool().cloned());
            }
            _ => (),
        }
        event.pointer_emulated = match &event.data {
            EventData::Touch(touch) => touch.emulating_pointer,
            _ => xev.flags & POINTER_EMULATED != 0,
        };

        Some(event)
    }

    fn set_user_time(&mut self, display: &Display, window: WindowId, time: u32) {
        if time == 0 {
            return;
        }
        let toplevel = display.windows().toplevel(window);
        self.server.set_user_time(toplevel, time);
    }

    fn translate_key(
        &mut self,
        display: &Display,
        xev: &XiDeviceEvent,
        window: WindowId,
    ) -> Option<(EventType, EventData)> {
        let kind = if xev.evtype == XiEventType::KeyPress {
            EventType::KeyPress
        } else {
            EventType::KeyRelease
        };

        let state = translate_state(Some(&xev.mods), Some(&xev.buttons), Some(&xev.group));
        let group = xev.group.effective;

        let keyval = self
            .keymap
            .translate_keyboard_state(xev.detail, state, group)
            .map_or(keysyms::VOID_SYMBOL, |translation| translation.keyval);
        let state = self.keymap.add_virtual_modifiers(state);
        let is_modifier = self.keymap.key_is_modifier(xev.detail);
        let string = translate_keyboard_string(&*self.keymap, keyval, state);

        let Ok(hardware_keycode) = u16::try_from(xev.detail) else {
            warn!("keycode {} out of range", xev.detail);
            return None;
        };

        if kind == EventType::KeyPress {
            self.set_user_time(display, window, xev.time);
        }

        let data = EventData::Key(KeyEvent {
            time: xev.time,
            state,
            keyval,
            string,
            hardware_keycode,
            group,
            is_modifier,
        });
        Some((kind, data))
    }

    fn translate_button(
        &mut self,
        display: &Display,
        xev: &XiDeviceEvent,
        window: WindowId,
        device: DeviceId,
    ) -> Option<(EventType, EventData)> {
        let press = xev.evtype == XiEventType::ButtonPress;
        let state = translate_state(Some(&xev.mods), Some(&xev.buttons), Some(&xev.group));
        let Coords {
            mut x,
            mut y,
            x_root,
            y_root,
        } = self.coords(xev.event_x, xev.event_y, xev.root_x, xev.root_y);

        // Legacy wheel buttons.
        if (4..=7).contains(&xev.detail) {
            if !press {
                return None;
            }

            let direction = match xev.detail {
                4 => ScrollDirection::Up,
                5 => ScrollDirection::Down,
                6 => ScrollDirection::Left,
                _ => ScrollDirection::Right,
            };
            let data = EventData::Scroll(ScrollEvent {
                time: xev.time,
                x,
                y,
                state,
                direction,
                x_root,
                y_root,
                delta_x: 0.,
                delta_y: 0.,
                is_stop: false,
            });
            return Some((EventType::Scroll, data));
        }

        let axes = self.translate_axes(display, device, window, &xev.valuators, x, y);
        if let Some(axes) = &axes {
            self.window_mode_coords(display, device, axes, &mut x, &mut y);
        }

        let kind = if press {
            self.set_user_time(display, window, xev.time);
            EventType::ButtonPress
        } else {
            EventType::ButtonRelease
        };

        let data = EventData::Button(ButtonEvent {
            time: xev.time,
            x,
            y,
            axes,
            state,
            button: xev.detail,
            x_root,
            y_root,
        });
        Some((kind, data))
    }

    fn translate_motion(
        &mut self,
        display: &Display,
        xev: &XiDeviceEvent,
        window: WindowId,
        device: DeviceId,
        source: DeviceId,
    ) -> (EventType, EventData) {
        let state = translate_state(Some(&xev.mods), Some(&xev.buttons), Some(&xev.group));
        let Coords {
            mut x,
            mut y,
            x_root,
            y_root,
        } = self.coords(xev.event_x, xev.event_y, xev.root_x, xev.root_y);

        let is_slave = display
            .devices()
            .device(device)
            .is_some_and(|dev| dev.device_type() == DeviceType::Slave);
        if !is_slave {
            if let Some((delta_x, delta_y)) = self.scroll_valuators_changed(source, &xev.valuators)
            {
                trace!("smooth scroll on {source}: {delta_x} {delta_y}");
                let data = EventData::Scroll(ScrollEvent {
                    time: xev.time,
                    x,
                    y,
                    state,
                    direction: ScrollDirection::Smooth,
                    x_root,
                    y_root,
                    delta_x,
                    delta_y,
                    is_stop: delta_x == 0. && delta_y == 0.,
                });
                return (EventType::Scroll, data);
            }
        }

        let axes = self.translate_axes(display, device, window, &xev.valuators, x, y);
        if let Some(axes) = &axes {
            self.window_mode_coords(display, device, axes, &mut x, &mut y);
        }

        let data = EventData::Motion(MotionEvent {
            time: xev.time,
            x,
            y,
            axes,
            state,
            is_hint: false,
            x_root,
            y_root,
        });
        (EventType::MotionNotify, data)
    }

    fn translate_touch(
        &mut self,
        display: &Display,
        xev: &XiDeviceEvent,
        window: WindowId,
        device: DeviceId,
    ) -> (EventType, EventData) {
        let mut state = translate_state(Some(&xev.mods), Some(&xev.buttons), Some(&xev.group));
        let kind = match xev.evtype {
            XiEventType::TouchBegin => {
                self.set_user_time(display, window, xev.time);
                EventType::TouchBegin
            }
            XiEventType::TouchUpdate => EventType::TouchUpdate,
            _ => EventType::TouchEnd,
        };
        // A touch down acts as the primary button.
        if kind != EventType::TouchEnd {
            state |= ModifierType::BUTTON1;
        }

        let Coords {
            mut x,
            mut y,
            x_root,
            y_root,
        } = self.coords(xev.event_x, xev.event_y, xev.root_x, xev.root_y);

        let axes = self.translate_axes(display, device, window, &xev.valuators, x, y);
        if let Some(axes) = &axes {
            self.window_mode_coords(display, device, axes, &mut x, &mut y);
        }

        let data = EventData::Touch(TouchEvent {
            time: xev.time,
            x,
            y,
            axes,
            state,
            sequence: EventSequence(u64::from(xev.detail)),
            emulating_pointer: xev.flags & TOUCH_EMULATING_POINTER != 0,
            x_root,
            y_root,
        });
        (kind, data)
    }

    /// Feeds the set valuators through the scroll valuators of `source`.
    /// Returns the accumulated deltas when any of them is a scroll valuator.
    fn scroll_valuators_changed(
        &mut self,
        source: DeviceId,
        valuators: &ValuatorState,
    ) -> Option<(f64, f64)> {
        let xi_device = self.devices.get_mut(&source)?;

        let mut changed = false;
        let (mut delta_x, mut delta_y) = (0., 0.);
        for (n_valuator, value) in valuators.iter() {
            let Some((direction, delta)) = xi_device.get_scroll_delta(n_valuator, value) else {
                continue;
            };
            changed = true;
            match direction {
                ScrollDirection::Up | ScrollDirection::Down => delta_y = delta,
                _ => delta_x = delta,
            }
        }

        changed.then_some((delta_x, delta_y))
    }

    /// Axis values for an event. Valuators missing from the event keep the
    /// value last reported by the device.
    fn translate_axes(
        &mut self,
        display: &Display,
        device: DeviceId,
        window: WindowId,
        valuators: &ValuatorState,
        x: f64,
        y: f64,
    ) -> Option<Vec<f64>> {
        let dev = display.devices().device(device)?;
        let n_axes = dev.n_axes();
        if n_axes == 0 {
            return None;
        }

        let xi_device = self.devices.entry(device).or_default();
        let mut axes: Vec<f64> = (0..n_axes).map(|i| xi_device.last_axis_value(i)).collect();
        let space = Self::coord_space(display, window);

        for (index, value) in valuators.iter() {
            let Some(axis) = axes.get_mut(index) else {
                break;
            };

            let translated = match dev.axis_use(index) {
                axis_use @ (AxisUse::X | AxisUse::Y) => {
                    if dev.mode() == InputMode::Window {
                        dev.translate_window_coord(index, value, space)
                    } else if axis_use == AxisUse::X {
                        Some(x)
                    } else {
                        Some(y)
                    }
                }
                _ => dev.translate_axis(index, value),
            };
            if let Some(translated) = translated {
                *axis = translated;
            }
        }

        xi_device.store_axes(Some(&axes));
        Some(axes)
    }

    /// Window-mode devices report their position through their axes.
    fn window_mode_coords(
        &self,
        display: &Display,
        device: DeviceId,
        axes: &[f64],
        x: &mut f64,
        y: &mut f64,
    ) {
        let Some(dev) = display.devices().device(device) else {
            return;
        };
        if dev.mode() != InputMode::Window {
            return;
        }
        if let Some(value) = dev.get_axis(axes, AxisUse::X) {
            *x = value;
        }
        if let Some(value) = dev.get_axis(axes, AxisUse::Y) {
            *y = value;
        }
    }

    // =========================================================================
    // Crossing and focus
    // =========================================================================

    pub(super) fn translate_enter_event(
        &mut self,
        display: &mut Display,
        xev: &XiEnterEvent,
    ) -> Option<Event> {
        let device = device_id(xev.deviceid);
        let source = device_id(xev.sourceid);
        if !display.devices().contains(device) {
            return None;
        }
        if !Self::is_known_window(display, xev.event) {
            return None;
        }
        let window = xev.event;

        if matches!(xev.evtype, XiEventType::FocusIn | XiEventType::FocusOut) {
            display.handle_focus(
                window,
                xev.event,
                device,
                Some(source),
                xev.evtype == XiEventType::FocusIn,
                focus_detail(xev.detail),
                focus_mode(xev.mode),
            );
            return None;
        }

        let kind = match xev.evtype {
            XiEventType::Enter => EventType::EnterNotify,
            XiEventType::Leave => EventType::LeaveNotify,
            evtype => {
                trace!("ignoring XI2 {evtype:?} as a crossing");
                return None;
            }
        };

        let Some(mode) = crossing_mode(xev.mode) else {
            warn!("unexpected crossing mode {:?}", xev.mode);
            return None;
        };
        let detail = notify_type(xev.detail);

        if kind == EventType::EnterNotify
            && xev.detail != XiNotifyDetail::Inferior
            && xev.mode != XiNotifyMode::PassiveUngrab
            && display.windows().window_type(window) == Some(WindowType::Toplevel)
        {
            self.reset_scroll_valuators_of(display, source);
        }

        let Coords {
            x,
            y,
            x_root,
            y_root,
        } = self.coords(xev.event_x, xev.event_y, xev.root_x, xev.root_y);

        let subwindow = xev
            .child
            .filter(|child| Self::is_known_window(display, *child));
        let seat = display.devices().device(device).and_then(|dev| dev.seat());

        let data = EventData::Crossing(CrossingEvent {
            subwindow,
            time: xev.time,
            x,
            y,
            x_root,
            y_root,
            mode,
            detail,
            focus: xev.focus,
            state: translate_state(Some(&xev.mods), Some(&xev.buttons), Some(&xev.group)),
        });

        let mut event = Event::new(kind, Some(window), data)
            .with_devices(device, Some(source))
            .with_seat(seat);
        event.send_event = xev.send_event;
        Some(event)
    }

    /// Scrolling restarts from zero after the pointer enters a toplevel; a
    /// master stands for all of its slaves.
    fn reset_scroll_valuators_of(&mut self, display: &Display, source: DeviceId) {
        let Some(dev) = display.devices().device(source) else {
            return;
        };

        if dev.device_type() == DeviceType::Master {
            for slave in dev.list_slave_devices() {
                if let Some(xi_device) = self.devices.get_mut(slave) {
                    xi_device.reset_scroll_valuators();
                }
            }
        } else if let Some(xi_device) = self.devices.get_mut(&source) {
            xi_device.reset_scroll_valuators();
        }
    }
}

//! Core protocol input events.
//!
//! With XI2 selected the server reports input through XI2 only. Core events
//! still arrive when another client sends them, and for the keycode 0 key
//! events input methods use to commit text. They are attributed to the
//! client pointer and its paired keyboard.

use crate::device::DeviceId;
use crate::display::Display;
use crate::event::{
    ButtonEvent, CrossingEvent, Event, EventData, EventType, KeyEvent, ModifierType,
    MotionEvent, ScrollDirection, ScrollEvent,
};
use crate::keymap::{keysyms, translate_keyboard_string};

use super::protocol::{CoreEvent, CoreEventType};
use super::translate::{crossing_mode, focus_detail, focus_mode, notify_type};
use super::{device_id, X11Backend};

/// Which master a core event belongs to, if it is handled at all.
fn core_event_device(xev: &CoreEvent, pointer: DeviceId, keyboard: DeviceId) -> Option<DeviceId> {
    let is_key = matches!(
        xev.event_type,
        CoreEventType::KeyPress | CoreEventType::KeyRelease
    );
    if is_key && (xev.detail == 0 || xev.serial == 0) {
        return Some(keyboard);
    }

    if !xev.send_event {
        return None;
    }

    match xev.event_type {
        CoreEventType::KeyPress
        | CoreEventType::KeyRelease
        | CoreEventType::FocusIn
        | CoreEventType::FocusOut => Some(keyboard),
        CoreEventType::ButtonPress
        | CoreEventType::ButtonRelease
        | CoreEventType::MotionNotify
        | CoreEventType::EnterNotify
        | CoreEventType::LeaveNotify => Some(pointer),
    }
}

impl X11Backend {
    pub(super) fn translate_core_event(
        &mut self,
        display: &mut Display,
        xev: &CoreEvent,
    ) -> Option<Event> {
        let pointer = device_id(self.server.client_pointer());
        let keyboard = display.devices().device(pointer)?.associated_device()?;
        let device = core_event_device(xev, pointer, keyboard)?;

        if !Self::is_known_window(display, xev.window) {
            return None;
        }
        let window = xev.window;

        let state = ModifierType::from_bits_retain(xev.state);
        let scale = self.window_scale;
        let (x, y) = (xev.x / scale, xev.y / scale);
        let (x_root, y_root) = (xev.x_root / scale, xev.y_root / scale);

        let (kind, data) = match xev.event_type {
            CoreEventType::KeyPress | CoreEventType::KeyRelease => {
                let group = ((xev.state >> 13) & 3) as u8;
                let keyval = self
                    .keymap
                    .translate_keyboard_state(xev.detail, state, group)
                    .map_or(keysyms::VOID_SYMBOL, |translation| translation.keyval);
                let state = self.keymap.add_virtual_modifiers(state);
                let kind = if xev.event_type == CoreEventType::KeyPress {
                    EventType::KeyPress
                } else {
                    EventType::KeyRelease
                };

                let data = EventData::Key(KeyEvent {
                    time: xev.time,
                    state,
                    keyval,
                    string: translate_keyboard_string(&*self.keymap, keyval, state),
                    hardware_keycode: u16::try_from(xev.detail).unwrap_or(0),
                    group,
                    is_modifier: self.keymap.key_is_modifier(xev.detail),
                });
                (kind, data)
            }
            CoreEventType::ButtonPress | CoreEventType::ButtonRelease => {
                let press = xev.event_type == CoreEventType::ButtonPress;
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
                    (EventType::Scroll, data)
                } else {
                    let kind = if press {
                        EventType::ButtonPress
                    } else {
                        EventType::ButtonRelease
                    };
                    let data = EventData::Button(ButtonEvent {
                        time: xev.time,
                        x,
                        y,
                        axes: None,
                        state,
                        button: xev.detail,
                        x_root,
                        y_root,
                    });
                    (kind, data)
                }
            }
            CoreEventType::MotionNotify => {
                let data = EventData::Motion(MotionEvent {
                    time: xev.time,
                    x,
                    y,
                    axes: None,
                    state,
                    is_hint: xev.is_hint,
                    x_root,
                    y_root,
                });
                (EventType::MotionNotify, data)
            }
            CoreEventType::EnterNotify | CoreEventType::LeaveNotify => {
                let mode = crossing_mode(xev.mode)?;
                let kind = if xev.event_type == CoreEventType::EnterNotify {
                    EventType::EnterNotify
                } else {
                    EventType::LeaveNotify
                };
                let data = EventData::Crossing(CrossingEvent {
                    subwindow: xev
                        .subwindow
                        .filter(|child| Self::is_known_window(display, *child)),
                    time: xev.time,
                    x,
                    y,
                    x_root,
                    y_root,
                    mode,
                    detail: notify_type(xev.notify_detail),
                    focus: xev.focus,
                    state,
                });
                (kind, data)
            }
            CoreEventType::FocusIn | CoreEventType::FocusOut => {
                display.handle_focus(
                    window,
                    window,
                    device,
                    None,
                    xev.event_type == CoreEventType::FocusIn,
                    focus_detail(xev.notify_detail),
                    focus_mode(xev.mode),
                );
                return None;
            }
        };

        let seat = display.devices().device(device).and_then(|dev| dev.seat());
        let mut event = Event::new(kind, Some(window), data)
            .with_devices(device, None)
            .with_seat(seat);
        event.send_event = xev.send_event;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::x11::protocol::{XiNotifyDetail, XiNotifyMode};
    use crate::window::WindowId;

    fn core(event_type: CoreEventType) -> CoreEvent {
        CoreEvent {
            event_type,
            serial: 7,
            send_event: false,
            time: 10,
            window: WindowId(10),
            subwindow: None,
            x: 0.,
            y: 0.,
            x_root: 0.,
            y_root: 0.,
            state: 0,
            detail: 38,
            is_hint: false,
            mode: XiNotifyMode::Normal,
            notify_detail: XiNotifyDetail::Nonlinear,
            focus: false,
        }
    }

    #[test]
    fn routing() {
        let (pointer, keyboard) = (DeviceId(2), DeviceId(3));

        // Server-generated input is covered by XI2.
        let key = core(CoreEventType::KeyPress);
        assert_eq!(core_event_device(&key, pointer, keyboard), None);

        let commit = CoreEvent {
            detail: 0,
            ..core(CoreEventType::KeyPress)
        };
        assert_eq!(core_event_device(&commit, pointer, keyboard), Some(keyboard));

        let sent = CoreEvent {
            send_event: true,
            ..core(CoreEventType::EnterNotify)
        };
        assert_eq!(core_event_device(&sent, pointer, keyboard), Some(pointer));

        let sent = CoreEvent {
            send_event: true,
            ..core(CoreEventType::FocusOut)
        };
        assert_eq!(core_event_device(&sent, pointer, keyboard), Some(keyboard));
    }
}

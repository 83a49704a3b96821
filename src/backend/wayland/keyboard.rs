//! `wl_keyboard` events and client-side key repeat.
//!
//! The compositor never repeats keys, so the backend does. Each repeat waits
//! for a round trip to the compositor before firing, so a stalled client
//! does not replay a burst of stale repeats once it catches up.

use std::time::Duration;

use inputcore_config::Keyboard;
use tracing::{debug, trace, warn};

use crate::backend::TimerKind;
use crate::display::Display;
use crate::event::{Event, EventData, EventType, FocusEvent, KeyEvent, ModifierType};
use crate::keymap::translate_keyboard_string;
use crate::seat::SeatId;
use crate::selection::{OwnerChangeInfo, CLIPBOARD, PRIMARY};
use crate::signals::Signal;
use crate::window::WindowId;

use super::protocol::{GlobalName, KeyState, KeyboardEvent};
use super::seat::WaylandSeat;
use super::{find_seat_mut, WaylandBackend};

/// Repeat settings sent with `wl_keyboard.repeat_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ServerRepeat {
    /// Keys per second; 0 disables repeat.
    pub rate: i32,
    /// Milliseconds before the first repeat.
    pub delay: i32,
}

#[derive(Debug, Default)]
pub(super) struct KeyRepeat {
    /// Keycode being repeated, 0 for none.
    pub key: u32,
    pub count: u32,
    /// When the last repeat was due, on the display clock.
    pub deadline: Duration,
    /// A repeat is due and waits for the compositor round trip.
    pub awaiting_sync: bool,
    /// `None` until the compositor sends its settings.
    pub server: Option<ServerRepeat>,
}

impl KeyRepeat {
    pub fn stop(&mut self) {
        self.awaiting_sync = false;
    }

    /// Delay before the first repeat and interval between the following
    /// ones, or `None` when keys do not repeat.
    pub fn settings(&self, config: &Keyboard) -> Option<(Duration, Duration)> {
        match self.server {
            Some(server) => {
                if server.rate <= 0 {
                    return None;
                }
                let delay = Duration::from_millis(u64::from(server.delay.max(0).unsigned_abs()));
                let interval = Duration::from_millis(u64::from((1000 / server.rate).unsigned_abs()));
                Some((delay, interval))
            }
            None => config
                .repeat()
                .then(|| (config.repeat_delay(), config.repeat_interval())),
        }
    }

    /// Moves the deadline to the next repeat and returns it.
    fn advance(&mut self, now: Duration, delay: Duration, interval: Duration) -> Duration {
        self.count += 1;
        self.deadline = if self.count == 1 {
            now + delay
        } else if self.deadline + interval > now {
            self.deadline + interval
        } else {
            // Running late; do not try to catch up.
            now
        };
        self.deadline
    }
}

fn focus_event(seat: &WaylandSeat, window: WindowId, is_in: bool) -> Event {
    Event::new(
        EventType::FocusChange,
        Some(window),
        EventData::Focus(FocusEvent { is_in }),
    )
    .with_devices(seat.master_keyboard, seat.keyboard)
    .with_seat(Some(seat.id))
}

impl WaylandBackend {
    pub(super) fn handle_keyboard_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        event: KeyboardEvent,
    ) {
        match event {
            KeyboardEvent::Keymap { format, data } => self.keyboard_keymap(display, format, &data),
            KeyboardEvent::Enter { surface, .. } => self.keyboard_enter(display, name, surface),
            KeyboardEvent::Leave { .. } => self.keyboard_leave(display, name),
            KeyboardEvent::Key {
                time, key, state, ..
            } => {
                // evdev codes are offset by 8 from xkb keycodes.
                let Some(keycode) = key.checked_add(8) else {
                    warn!("ignoring out of range key {key}");
                    return;
                };
                let Some(seat) = find_seat_mut(&mut self.seats, name) else {
                    return;
                };
                seat.keyboard_time = time;
                seat.repeat.count = 0;
                self.deliver_key(display, name, time, keycode, state == KeyState::Pressed, false);
            }
            KeyboardEvent::Modifiers {
                depressed,
                latched,
                locked,
                group,
                ..
            } => {
                let direction = self.keymap.direction();
                self.keymap.update_mask(depressed, latched, locked, group);
                let modifiers = self.keymap.modifier_state();
                if let Some(seat) = find_seat_mut(&mut self.seats, name) {
                    seat.key_modifiers = modifiers;
                }
                trace!("modifiers now {modifiers:?}");

                let devices = display.devices_mut();
                devices.emit(Signal::StateChanged);
                if direction != self.keymap.direction() {
                    devices.emit(Signal::DirectionChanged);
                }
            }
            KeyboardEvent::RepeatInfo { rate, delay } => {
                if let Some(seat) = find_seat_mut(&mut self.seats, name) {
                    debug!("seat {:?} repeats at {rate}/s after {delay} ms", seat.id);
                    seat.repeat.server = Some(ServerRepeat { rate, delay });
                }
            }
        }
    }

    fn keyboard_keymap(&mut self, display: &mut Display, format: u32, data: &[u8]) {
        let direction = self.keymap.direction();
        if !self.keymap.update_from_data(format, data) {
            warn!("ignoring keymap in format {format} ({} bytes)", data.len());
            return;
        }

        let devices = display.devices_mut();
        devices.emit(Signal::KeysChanged);
        devices.emit(Signal::StateChanged);
        if direction != self.keymap.direction() {
            devices.emit(Signal::DirectionChanged);
        }
    }

    fn keyboard_enter(&mut self, display: &mut Display, name: GlobalName, surface: WindowId) {
        if !Self::is_known_window(display, surface) {
            return;
        }
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };

        seat.keyboard_focus = Some(surface);
        seat.repeat.key = 0;
        trace!("keyboard focus on {surface:?}");

        let event = focus_event(seat, surface, true);
        self.deliver(display, event);

        if let Some(seat) = find_seat_mut(&mut self.seats, name) {
            let (device, source) = (seat.master_keyboard, seat.keyboard);
            seat.pending_selection
                .focus_in(display, surface, device, source);
        }
    }

    fn keyboard_leave(&mut self, display: &mut Display, name: GlobalName) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(focus) = seat.keyboard_focus.take() else {
            return;
        };

        seat.repeat.stop();
        seat.repeat.key = 0;
        seat.key_modifiers = ModifierType::empty();
        self.scheduler.cancel(TimerKind::KeyRepeat(seat.id));
        trace!("keyboard focus left {focus:?}");

        let event = focus_event(seat, focus, false);
        self.deliver(display, event);
    }

    /// Emits a key event and keeps the repeat state in step with it.
    fn deliver_key(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        time: u32,
        key: u32,
        pressed: bool,
        from_repeat: bool,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        seat.repeat.stop();
        self.scheduler.cancel(TimerKind::KeyRepeat(seat.id));

        let Some(keyval) = self.keymap.key_get_one_sym(key) else {
            return;
        };
        seat.pointer_info.time = time;
        seat.key_modifiers = self.keymap.modifier_state();

        if let Some(window) = seat.keyboard_focus {
            let state = seat.modifiers(seat.master_pointer);
            let kind = if pressed {
                EventType::KeyPress
            } else {
                EventType::KeyRelease
            };
            let event = Event::new(
                kind,
                Some(window),
                EventData::Key(KeyEvent {
                    time,
                    state,
                    keyval,
                    string: translate_keyboard_string(&*self.keymap, keyval, state),
                    hardware_keycode: u16::try_from(key).unwrap_or(0),
                    group: 0,
                    is_modifier: self.keymap.key_is_modifier(key),
                }),
            )
            .with_devices(seat.master_keyboard, seat.keyboard)
            .with_seat(Some(seat.id));
            trace!(
                "key {} {key} (keyval {keyval:#x}){}",
                if pressed { "press" } else { "release" },
                if from_repeat { ", repeated" } else { "" }
            );
            self.deliver(display, event);
        }

        if !self.keymap.key_repeats(key) {
            return;
        }
        let now = display.clock().now();
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some((delay, interval)) = seat.repeat.settings(&display.config().keyboard) else {
            return;
        };

        let repeat = &mut seat.repeat;
        if !from_repeat {
            if pressed {
                repeat.key = key;
            } else if repeat.key == key {
                repeat.key = 0;
            }
        }
        if repeat.key == 0 {
            return;
        }

        let deadline = repeat.advance(now, delay, interval);
        self.scheduler
            .schedule(TimerKind::KeyRepeat(seat.id), deadline.saturating_sub(now));
    }

    /// The repeat delay ran out: ask the compositor for a round trip before
    /// emitting the repeat.
    pub(super) fn key_repeat_timeout(&mut self, seat: SeatId) {
        let Some(seat) = self.seats.iter_mut().find(|wl_seat| wl_seat.id == seat) else {
            return;
        };
        if seat.repeat.key == 0 {
            return;
        }
        seat.repeat.awaiting_sync = true;
        self.compositor.repeat_sync(seat.name);
    }

    pub(super) fn handle_repeat_sync_done(&mut self, display: &mut Display, name: GlobalName) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        if !seat.repeat.awaiting_sync {
            return;
        }
        seat.repeat.awaiting_sync = false;

        let (time, key) = (seat.keyboard_time, seat.repeat.key);
        self.deliver_key(display, name, time, key, true, true);
    }

    /// The selection changed owner. Clipboard changes are held until a
    /// window has the keyboard focus; primary selection changes without one
    /// are dropped.
    pub(super) fn handle_selection(&mut self, display: &mut Display, name: GlobalName, primary: bool) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let (device, source) = (seat.master_keyboard, seat.keyboard);

        if primary {
            if let Some(focus) = seat.keyboard_focus {
                display.emit_owner_change(focus, device, source, OwnerChangeInfo::new_owner(PRIMARY));
            }
            return;
        }

        let focus = seat.keyboard_focus;
        seat.pending_selection.notify(
            display,
            focus,
            device,
            source,
            OwnerChangeInfo::new_owner(CLIPBOARD),
        );
    }
}

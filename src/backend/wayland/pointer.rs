//! `wl_pointer` events.
//!
//! Since seat version 5 pointer events come in frames. A non-scroll event
//! is held until the frame ends; scroll contributions accumulate and turn
//! into at most one discrete and one smooth scroll event per frame. Older
//! compositors get every event flushed as it arrives.

use tracing::{debug, trace};

use crate::device::DeviceId;
use crate::display::Display;
use crate::event::{
    ButtonEvent, CrossingEvent, CrossingMode, Event, EventData, EventType, ModifierType,
    MotionEvent, NotifyType, ScrollDirection, ScrollEvent, BUTTON_MIDDLE, BUTTON_PRIMARY,
    BUTTON_SECONDARY,
};
use crate::window::WindowId;

use super::protocol::{buttons, Axis, ButtonState, GlobalName, PointerEvent, POINTER_HAS_FRAME};
use super::seat::WaylandSeat;
use super::{find_seat, find_seat_mut, WaylandBackend};

/// Button number for an evdev button code. Buttons past the first three
/// are numbered after the legacy scroll buttons 4 to 7.
pub(super) fn button_number(code: u32) -> u32 {
    match code {
        buttons::BTN_LEFT => BUTTON_PRIMARY,
        buttons::BTN_MIDDLE => BUTTON_MIDDLE,
        buttons::BTN_RIGHT => BUTTON_SECONDARY,
        _ => code.saturating_sub(buttons::BTN_LEFT - 1) + 4,
    }
}

/// A crossing of the seat pointer on `window`, at the current pointer
/// position.
fn crossing_event(
    seat: &WaylandSeat,
    display: &Display,
    kind: EventType,
    window: WindowId,
    time: u32,
) -> Event {
    let (x, y, x_root, y_root) = seat.pointer_info.coords(display.windows());
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
            mode: CrossingMode::Normal,
            detail: NotifyType::Nonlinear,
            focus: true,
            state: ModifierType::empty(),
        }),
    )
    .with_devices(seat.master_pointer, seat.pointer)
    .with_seat(Some(seat.id))
}

#[allow(clippy::too_many_arguments)]
fn scroll_event(
    seat: &WaylandSeat,
    display: &Display,
    source: Option<DeviceId>,
    direction: ScrollDirection,
    delta_x: f64,
    delta_y: f64,
    is_stop: bool,
    emulated: bool,
) -> Option<Event> {
    let pointer = &seat.pointer_info;
    let window = pointer.focus?;
    let (x, y, x_root, y_root) = pointer.coords(display.windows());

    let mut event = Event::new(
        EventType::Scroll,
        Some(window),
        EventData::Scroll(ScrollEvent {
            time: pointer.time,
            x,
            y,
            state: seat.modifiers(seat.master_pointer),
            direction,
            x_root,
            y_root,
            delta_x,
            delta_y,
            is_stop,
        }),
    )
    .with_devices(seat.master_pointer, source)
    .with_seat(Some(seat.id));
    event.pointer_emulated = emulated;
    Some(event)
}

impl WaylandBackend {
    pub(super) fn handle_pointer_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        event: PointerEvent,
    ) {
        match event {
            PointerEvent::Enter {
                serial,
                surface,
                surface_x,
                surface_y,
            } => self.pointer_enter(display, name, serial, surface, surface_x, surface_y),
            PointerEvent::Leave { surface, .. } => self.pointer_leave(display, name, surface),
            PointerEvent::Motion {
                time,
                surface_x,
                surface_y,
            } => self.pointer_motion(display, name, time, surface_x, surface_y),
            PointerEvent::Button {
                serial,
                time,
                button,
                state,
            } => self.pointer_button(display, name, serial, time, button, state),
            PointerEvent::Axis { time, axis, value } => {
                self.pointer_axis(display, name, time, axis, value)
            }
            PointerEvent::Frame => self.flush_pointer_frame(display, name),
            PointerEvent::AxisSource(source) => {
                if let Some(seat) = find_seat_mut(&mut self.seats, name) {
                    if seat.pointer_info.focus.is_some() {
                        seat.pointer_info.frame.source = Some(source);
                    }
                }
            }
            PointerEvent::AxisStop { time, axis } => {
                let Some(seat) = find_seat_mut(&mut self.seats, name) else {
                    return;
                };
                if seat.pointer_info.focus.is_none() {
                    return;
                }
                seat.pointer_info.time = time;
                let frame = &mut seat.pointer_info.frame;
                match axis {
                    Axis::VerticalScroll => frame.delta_y = 0.,
                    Axis::HorizontalScroll => frame.delta_x = 0.,
                }
                frame.is_scroll_stop = true;
                self.flush_unframed(display, name);
            }
            PointerEvent::AxisDiscrete { axis, discrete } => {
                let Some(seat) = find_seat_mut(&mut self.seats, name) else {
                    return;
                };
                if seat.pointer_info.focus.is_none() {
                    return;
                }
                let frame = &mut seat.pointer_info.frame;
                match axis {
                    Axis::VerticalScroll => frame.discrete_y = discrete,
                    Axis::HorizontalScroll => frame.discrete_x = discrete,
                }
                self.flush_unframed(display, name);
            }
        }
    }

    fn pointer_enter(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        serial: u32,
        surface: WindowId,
        surface_x: f64,
        surface_y: f64,
    ) {
        if !Self::is_known_window(display, surface) {
            return;
        }
        let time = display.clock().now_ms();
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };

        let pointer = &mut seat.pointer_info;
        pointer.focus = Some(surface);
        pointer.button_modifiers = ModifierType::empty();
        pointer.surface_x = surface_x;
        pointer.surface_y = surface_y;
        pointer.enter_serial = serial;
        trace!("pointer entered {surface:?} at ({surface_x}, {surface_y})");

        let master = seat.master_pointer;
        let event = crossing_event(seat, display, EventType::EnterNotify, surface, time);
        self.queue_pointer_event(display, name, event);
        self.update_cursor(master);
        self.flush_unframed(display, name);
    }

    fn pointer_leave(&mut self, display: &mut Display, name: GlobalName, surface: WindowId) {
        let time = display.clock().now_ms();
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(focus) = seat.pointer_info.focus else {
            return;
        };
        if focus != surface {
            debug!("pointer left {surface:?} while focused on {focus:?}");
        }

        let master = seat.master_pointer;
        let event = crossing_event(seat, display, EventType::LeaveNotify, focus, time);
        seat.pointer_info.focus = None;
        trace!("pointer left {focus:?}");

        self.queue_pointer_event(display, name, event);
        self.stop_cursor_animation(master);
        self.flush_unframed(display, name);
    }

    fn pointer_motion(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        time: u32,
        surface_x: f64,
        surface_y: f64,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(window) = seat.pointer_info.focus else {
            return;
        };

        let pointer = &mut seat.pointer_info;
        pointer.time = time;
        pointer.surface_x = surface_x;
        pointer.surface_y = surface_y;
        let (x, y, x_root, y_root) = pointer.coords(display.windows());

        let event = Event::new(
            EventType::MotionNotify,
            Some(window),
            EventData::Motion(MotionEvent {
                time,
                x,
                y,
                axes: None,
                state: seat.modifiers(seat.master_pointer),
                is_hint: false,
                x_root,
                y_root,
            }),
        )
        .with_devices(seat.master_pointer, seat.pointer)
        .with_seat(Some(seat.id));

        self.queue_pointer_event(display, name, event);
        self.flush_unframed(display, name);
    }

    fn pointer_button(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        serial: u32,
        time: u32,
        code: u32,
        state: ButtonState,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(window) = seat.pointer_info.focus else {
            return;
        };

        let button = button_number(code);
        let pressed = state == ButtonState::Pressed;
        seat.pointer_info.time = time;
        if pressed {
            seat.pointer_info.press_serial = serial;
        }

        let (x, y, x_root, y_root) = seat.pointer_info.coords(display.windows());
        let kind = if pressed {
            EventType::ButtonPress
        } else {
            EventType::ButtonRelease
        };
        let event = Event::new(
            kind,
            Some(window),
            EventData::Button(ButtonEvent {
                time,
                x,
                y,
                axes: None,
                state: seat.modifiers(seat.master_pointer),
                button,
                x_root,
                y_root,
            }),
        )
        .with_devices(seat.master_pointer, seat.pointer)
        .with_seat(Some(seat.id));

        let modifier = ModifierType::for_button(button);
        if pressed {
            seat.pointer_info.button_modifiers |= modifier;
        } else {
            seat.pointer_info.button_modifiers &= !modifier;
        }
        trace!("button {button} {} on {window:?}", if pressed { "press" } else { "release" });

        self.queue_pointer_event(display, name, event);
        self.flush_unframed(display, name);
    }

    fn pointer_axis(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        time: u32,
        axis: Axis,
        value: f64,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        if seat.pointer_info.focus.is_none() {
            return;
        }

        seat.pointer_info.time = time;
        // Axis values are in surface pixels; ten of them make one scroll step.
        let frame = &mut seat.pointer_info.frame;
        match axis {
            Axis::VerticalScroll => frame.delta_y = value / 10.,
            Axis::HorizontalScroll => frame.delta_x = value / 10.,
        }
        trace!("scroll {axis:?} by {value}");

        self.flush_unframed(display, name);
    }

    /// Holds `event` until the end of the frame, flushing a pending event of
    /// another type first.
    fn queue_pointer_event(&mut self, display: &mut Display, name: GlobalName, event: Event) {
        let pending = find_seat(&self.seats, name)
            .and_then(|seat| seat.pointer_info.frame.event.as_ref())
            .map(|pending| pending.kind);
        if pending.is_some_and(|kind| kind != event.kind) {
            self.flush_pointer_frame(display, name);
        }

        if let Some(seat) = find_seat_mut(&mut self.seats, name) {
            seat.pointer_info.frame.event = Some(event);
        }
    }

    /// Flushes at once when the compositor does not send frames.
    fn flush_unframed(&mut self, display: &mut Display, name: GlobalName) {
        if find_seat(&self.seats, name).is_some_and(|seat| seat.version < POINTER_HAS_FRAME) {
            self.flush_pointer_frame(display, name);
        }
    }

    pub(super) fn flush_pointer_frame(&mut self, display: &mut Display, name: GlobalName) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };

        if let Some(event) = seat.pointer_info.frame.event.take() {
            self.deliver(display, event);
            return;
        }

        self.flush_scroll(display, name);
        if let Some(seat) = find_seat_mut(&mut self.seats, name) {
            seat.pointer_info.frame.source = None;
        }
    }

    fn flush_scroll(&mut self, display: &mut Display, name: GlobalName) {
        let Some(seat) = find_seat(&self.seats, name) else {
            return;
        };
        let frame = &seat.pointer_info.frame;
        let has_discrete = frame.discrete_x != 0 || frame.discrete_y != 0;
        let has_smooth = frame.is_scroll_stop || frame.delta_x != 0. || frame.delta_y != 0.;
        if !has_discrete && !has_smooth {
            return;
        }
        let source = frame.source;

        let device = self.scroll_device(display, name, source);
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        // Axes can stop independently; a stop on one axis with a delta on
        // the other is not a stop.
        let frame = std::mem::take(&mut seat.pointer_info.frame);

        let mut events = Vec::new();
        if has_discrete {
            let direction = if frame.discrete_x > 0 {
                ScrollDirection::Left
            } else if frame.discrete_x < 0 {
                ScrollDirection::Right
            } else if frame.discrete_y > 0 {
                ScrollDirection::Down
            } else {
                ScrollDirection::Up
            };
            events.extend(scroll_event(seat, display, device, direction, 0., 0., false, true));
        }

        if has_smooth {
            let is_stop = frame.is_scroll_stop && frame.delta_x == 0. && frame.delta_y == 0.;
            events.extend(scroll_event(
                seat,
                display,
                device,
                ScrollDirection::Smooth,
                frame.delta_x,
                frame.delta_y,
                is_stop,
                false,
            ));
        }

        self.deliver_all(display, events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evdev_buttons() {
        assert_eq!(button_number(buttons::BTN_LEFT), 1);
        assert_eq!(button_number(buttons::BTN_MIDDLE), 2);
        assert_eq!(button_number(buttons::BTN_RIGHT), 3);
        // BTN_SIDE and BTN_EXTRA land after the scroll buttons.
        assert_eq!(button_number(0x113), 8);
        assert_eq!(button_number(0x114), 9);
    }
}

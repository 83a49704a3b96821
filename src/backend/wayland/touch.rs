//! Touch points and touchpad gestures.
//!
//! The first finger down drives the touch master like a pointer: it gets
//! crossings and its position is mirrored into the master's pointer state.
//! Fingers that land while it is down never take over, even after it lifts.

use tracing::{debug, trace};

use crate::device::DeviceId;
use crate::display::Display;
use crate::event::{
    CrossingEvent, CrossingMode, Event, EventData, EventSequence, EventType, ModifierType,
    NotifyType, TouchEvent, TouchpadGesturePhase, TouchpadPinchEvent, TouchpadSwipeEvent,
};
use crate::window::WindowId;

use super::protocol::{GlobalName, PinchEvent, SwipeEvent, TouchEvent as WlTouchEvent};
use super::seat::{TouchData, WaylandSeat};
use super::{find_seat_mut, WaylandBackend};

fn touch_event(
    seat: &WaylandSeat,
    display: &Display,
    master: DeviceId,
    touch: &TouchData,
    kind: EventType,
    time: u32,
) -> Event {
    let (x_root, y_root) = display.windows().root_coords(touch.window, touch.x, touch.y);
    let mut event = Event::new(
        kind,
        Some(touch.window),
        EventData::Touch(TouchEvent {
            time,
            x: touch.x,
            y: touch.y,
            axes: None,
            state: seat.modifiers(master),
            sequence: EventSequence(u64::from(touch.id as u32)),
            emulating_pointer: touch.initial,
            x_root,
            y_root,
        }),
    )
    .with_devices(master, seat.touch)
    .with_seat(Some(seat.id));
    event.pointer_emulated = touch.initial;
    event
}

/// A crossing of the touch master on `window`, at the position of `touch`.
fn touch_crossing(
    seat: &WaylandSeat,
    display: &Display,
    master: DeviceId,
    window: WindowId,
    touch: &TouchData,
    kind: EventType,
    time: u32,
) -> Event {
    let (x_root, y_root) = display.windows().root_coords(touch.window, touch.x, touch.y);
    Event::new(
        kind,
        Some(window),
        EventData::Crossing(CrossingEvent {
            subwindow: None,
            time,
            x: touch.x,
            y: touch.y,
            x_root,
            y_root,
            mode: CrossingMode::Normal,
            detail: NotifyType::Nonlinear,
            focus: true,
            state: ModifierType::empty(),
        }),
    )
    .with_devices(master, seat.touch)
    .with_seat(Some(seat.id))
}

impl WaylandBackend {
    pub(super) fn handle_touch_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        event: WlTouchEvent,
    ) {
        match event {
            WlTouchEvent::Down {
                serial,
                time,
                surface,
                id,
                x,
                y,
            } => self.touch_down(display, name, serial, time, surface, id, (x, y)),
            WlTouchEvent::Up { time, id, .. } => self.touch_up(display, name, time, id),
            WlTouchEvent::Motion { time, id, x, y } => {
                self.touch_motion(display, name, time, id, (x, y))
            }
            // Every touch event is complete on its own.
            WlTouchEvent::Frame => (),
            WlTouchEvent::Cancel => self.touch_cancel(display, name),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn touch_down(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        serial: u32,
        time: u32,
        surface: WindowId,
        id: i32,
        (x, y): (f64, f64),
    ) {
        if !Self::is_known_window(display, surface) {
            return;
        }
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(master) = seat.touch_master else {
            return;
        };

        let touch = TouchData {
            id,
            window: surface,
            x,
            y,
            down_serial: serial,
            initial: seat.touches.is_empty(),
        };
        seat.touches.insert(id, touch.clone());

        let mut events = Vec::new();
        if touch.initial {
            let focus = seat.touch_info.focus;
            if focus != Some(surface) {
                if let Some(old) = focus {
                    events.push(touch_crossing(
                        seat,
                        display,
                        master,
                        old,
                        &touch,
                        EventType::LeaveNotify,
                        time,
                    ));
                }
                events.push(touch_crossing(
                    seat,
                    display,
                    master,
                    surface,
                    &touch,
                    EventType::EnterNotify,
                    time,
                ));
            }

            let info = &mut seat.touch_info;
            info.focus = Some(surface);
            info.press_serial = touch.down_serial;
            info.enter_serial = touch.down_serial;
            info.surface_x = x;
            info.surface_y = y;
            info.time = time;
        }
        events.push(touch_event(seat, display, master, &touch, EventType::TouchBegin, time));
        trace!("touch {id} down on {surface:?} at ({x}, {y})");

        self.deliver_all(display, events);
    }

    fn touch_up(&mut self, display: &mut Display, name: GlobalName, time: u32, id: i32) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(master) = seat.touch_master else {
            return;
        };
        let Some(touch) = seat.touches.remove(&id) else {
            return;
        };

        let mut events = vec![touch_event(seat, display, master, &touch, EventType::TouchEnd, time)];
        if touch.initial {
            events.push(touch_crossing(
                seat,
                display,
                master,
                touch.window,
                &touch,
                EventType::LeaveNotify,
                time,
            ));
            seat.touch_info.focus = None;
            seat.touch_info.time = time;
        }
        trace!("touch {id} up");

        self.deliver_all(display, events);
    }

    fn touch_motion(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        time: u32,
        id: i32,
        (x, y): (f64, f64),
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(master) = seat.touch_master else {
            return;
        };
        let Some(touch) = seat.touches.get_mut(&id) else {
            return;
        };
        touch.x = x;
        touch.y = y;
        let touch = touch.clone();

        if touch.initial {
            let info = &mut seat.touch_info;
            info.surface_x = x;
            info.surface_y = y;
            info.time = time;
        }

        let event = touch_event(seat, display, master, &touch, EventType::TouchUpdate, time);
        self.deliver(display, event);
    }

    fn touch_cancel(&mut self, display: &mut Display, name: GlobalName) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(master) = seat.touch_master else {
            return;
        };

        let touches = std::mem::take(&mut seat.touches);
        let events: Vec<_> = touches
            .values()
            .map(|touch| touch_event(seat, display, master, touch, EventType::TouchCancel, 0))
            .collect();
        if touches.values().any(|touch| touch.initial) {
            seat.touch_info.focus = None;
        }
        debug!("{} touches cancelled", events.len());

        self.deliver_all(display, events);
    }

    pub(super) fn handle_swipe_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        event: SwipeEvent,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(window) = seat.pointer_info.focus else {
            return;
        };

        let (phase, time, dx, dy) = match event {
            SwipeEvent::Begin { time, fingers, .. } => {
                seat.gesture_n_fingers = fingers;
                (TouchpadGesturePhase::Begin, time, 0., 0.)
            }
            SwipeEvent::Update { time, dx, dy } => (TouchpadGesturePhase::Update, time, dx, dy),
            SwipeEvent::End {
                time, cancelled, ..
            } => {
                let phase = if cancelled {
                    TouchpadGesturePhase::Cancel
                } else {
                    TouchpadGesturePhase::End
                };
                (phase, time, 0., 0.)
            }
        };
        seat.pointer_info.time = time;

        let (x, y, x_root, y_root) = seat.pointer_info.coords(display.windows());
        let event = Event::new(
            EventType::TouchpadSwipe,
            Some(window),
            EventData::TouchpadSwipe(TouchpadSwipeEvent {
                phase,
                n_fingers: seat.gesture_n_fingers,
                time,
                x,
                y,
                dx,
                dy,
                x_root,
                y_root,
                state: seat.modifiers(seat.master_pointer),
            }),
        )
        .with_devices(seat.master_pointer, seat.pointer)
        .with_seat(Some(seat.id));
        trace!("swipe {phase:?} with {} fingers", seat.gesture_n_fingers);

        self.deliver(display, event);
    }

    pub(super) fn handle_pinch_event(
        &mut self,
        display: &mut Display,
        name: GlobalName,
        event: PinchEvent,
    ) {
        let Some(seat) = find_seat_mut(&mut self.seats, name) else {
            return;
        };
        let Some(window) = seat.pointer_info.focus else {
            return;
        };

        let (phase, time, dx, dy, scale, angle_delta) = match event {
            PinchEvent::Begin { time, fingers, .. } => {
                seat.gesture_n_fingers = fingers;
                (TouchpadGesturePhase::Begin, time, 0., 0., 1., 0.)
            }
            PinchEvent::Update {
                time,
                dx,
                dy,
                scale,
                rotation,
            } => (
                TouchpadGesturePhase::Update,
                time,
                dx,
                dy,
                scale,
                rotation.to_radians(),
            ),
            PinchEvent::End {
                time, cancelled, ..
            } => {
                let phase = if cancelled {
                    TouchpadGesturePhase::Cancel
                } else {
                    TouchpadGesturePhase::End
                };
                (phase, time, 0., 0., 1., 0.)
            }
        };
        seat.pointer_info.time = time;

        let (x, y, x_root, y_root) = seat.pointer_info.coords(display.windows());
        let event = Event::new(
            EventType::TouchpadPinch,
            Some(window),
            EventData::TouchpadPinch(TouchpadPinchEvent {
                phase,
                n_fingers: seat.gesture_n_fingers,
                time,
                x,
                y,
                dx,
                dy,
                angle_delta,
                scale,
                x_root,
                y_root,
                state: seat.modifiers(seat.master_pointer),
            }),
        )
        .with_devices(seat.master_pointer, seat.pointer)
        .with_seat(Some(seat.id));
        trace!("pinch {phase:?} with {} fingers", seat.gesture_n_fingers);

        self.deliver(display, event);
    }
}

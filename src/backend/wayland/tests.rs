use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use insta::assert_debug_snapshot;

use super::protocol::*;
use super::*;
use crate::backend::ManualScheduler;
use crate::cursor::{CursorBuffer, CursorImage};
use crate::device::{AxisUse, DeviceToolType, InputSource};
use crate::event::{EventSequence, ScrollDirection, TouchpadGesturePhase};
use crate::selection::{CLIPBOARD, PRIMARY};
use crate::signals::{Signal, SignalKind};
use crate::tests::fixture::{
    bare_display, crossing_summary, kinds, TestKeymap, TestTree, SHIFT_KEYCODE,
};

const NAME: GlobalName = GlobalName(1);
const TOPLEVEL: WindowId = WindowId(10);
const CHILD: WindowId = WindowId(20);
const TABLET: TabletId = TabletId(1);
const PEN: ToolId = ToolId(1);
const PAD: PadId = PadId(1);

/// evdev code of the key producing keysym 'a' in the test keymap.
const KEY_A: u32 = 0x61 - 8;
/// evdev code of the test keymap's Shift.
const KEY_SHIFT: u32 = SHIFT_KEYCODE - 8;

#[derive(Debug, Default)]
struct CompositorState {
    gestures: bool,
    syncs: Vec<GlobalName>,
    /// Target, serial and buffer handle of every cursor change.
    cursors: Vec<(CursorTarget, u32, Option<u64>)>,
}

#[derive(Debug, Clone)]
struct FakeCompositor(Rc<RefCell<CompositorState>>);

impl Compositor for FakeCompositor {
    fn has_pointer_gestures(&self) -> bool {
        self.0.borrow().gestures
    }

    fn repeat_sync(&mut self, seat: GlobalName) {
        self.0.borrow_mut().syncs.push(seat);
    }

    fn set_cursor(&mut self, target: CursorTarget, serial: u32, buffer: Option<CursorBuffer>) {
        self.0
            .borrow_mut()
            .cursors
            .push((target, serial, buffer.map(|buffer| buffer.buffer)));
    }
}

#[derive(Debug, Clone, Default)]
struct SharedScheduler(Rc<RefCell<ManualScheduler>>);

impl Scheduler for SharedScheduler {
    fn schedule(&mut self, kind: TimerKind, after: Duration) {
        self.0.borrow_mut().schedule(kind, after);
    }

    fn cancel(&mut self, kind: TimerKind) {
        self.0.borrow_mut().cancel(kind);
    }

    fn expired(&mut self, kind: TimerKind) {
        self.0.borrow_mut().expired(kind);
    }

    fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.0.borrow().is_scheduled(kind)
    }
}

/// Cursor whose frames are numbered from 0 and shown for `delays[i]` ms.
#[derive(Debug)]
struct Frames(Vec<u32>);

impl CursorImage for Frames {
    fn buffer(&self, index: usize) -> Option<CursorBuffer> {
        Some(CursorBuffer {
            buffer: index as u64,
            hotspot_x: 0,
            hotspot_y: 0,
            width: 32,
            height: 32,
            scale: 1,
        })
    }

    fn next_image_index(&self, current: usize) -> (usize, u32) {
        if self.0.len() <= 1 {
            return (current, 0);
        }
        ((current + 1) % self.0.len(), self.0[current])
    }

    fn set_scale(&self, _scale: i32) {}
}

struct Harness {
    backend: WaylandBackend,
    display: Display,
    tree: Rc<RefCell<TestTree>>,
    compositor: Rc<RefCell<CompositorState>>,
    scheduler: Rc<RefCell<ManualScheduler>>,
    serial: u32,
}

impl Harness {
    fn new() -> Self {
        Self::with_version(7)
    }

    fn with_version(version: u32) -> Self {
        let (display, tree) = bare_display();
        let compositor = Rc::new(RefCell::new(CompositorState {
            gestures: true,
            ..CompositorState::default()
        }));
        let scheduler = SharedScheduler::default();
        let backend = WaylandBackend::new(
            Box::new(FakeCompositor(compositor.clone())),
            Box::new(TestKeymap::default()),
            Box::new(scheduler.clone()),
        );

        let mut h = Self {
            backend,
            display,
            tree,
            compositor,
            scheduler: scheduler.0,
            serial: 10,
        };
        h.backend.dispatch(
            &mut h.display,
            WlEvent::SeatGlobal {
                name: NAME,
                version,
            },
        );
        h.seat_event(SeatEvent::Capabilities(Capability::all()));
        h
    }

    fn seat_event(&mut self, event: SeatEvent) {
        self.backend
            .dispatch(&mut self.display, WlEvent::Seat(NAME, event));
    }

    fn next_serial(&mut self) -> u32 {
        self.serial += 1;
        self.serial
    }

    fn seat(&self) -> SeatId {
        self.backend.seat_id(NAME).unwrap()
    }

    fn wl_seat(&self) -> &WaylandSeat {
        &self.backend.seats[0]
    }

    fn pointer_enter(&mut self, surface: WindowId, x: f64, y: f64) {
        let serial = self.next_serial();
        self.seat_event(SeatEvent::Pointer(PointerEvent::Enter {
            serial,
            surface,
            surface_x: x,
            surface_y: y,
        }));
        self.seat_event(SeatEvent::Pointer(PointerEvent::Frame));
    }

    fn keyboard_enter(&mut self, surface: WindowId) {
        let serial = self.next_serial();
        self.seat_event(SeatEvent::Keyboard(KeyboardEvent::Enter {
            serial,
            surface,
            keys: Vec::new(),
        }));
    }

    fn key(&mut self, key: u32, state: KeyState, time: u32) {
        let serial = self.next_serial();
        self.seat_event(SeatEvent::Keyboard(KeyboardEvent::Key {
            serial,
            time,
            key,
            state,
        }));
    }

    fn pending(&self, kind: TimerKind) -> Option<Duration> {
        self.scheduler.borrow().pending(kind)
    }

    fn record_signals(&mut self) -> Rc<RefCell<Vec<Signal>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        self.display
            .devices_mut()
            .signals()
            .connect_all(move |signal| log2.borrow_mut().push(signal.clone()));
        log
    }

    /// Announces a pen tablet and a pressure and tilt capable pen.
    fn add_tablet(&mut self) {
        self.seat_event(SeatEvent::TabletAdded(TABLET));
        for event in [
            TabletEvent::Name(String::from("Wacom Intuos Pro M")),
            TabletEvent::Id {
                vid: 0x056a,
                pid: 0x0357,
            },
            TabletEvent::Done,
        ] {
            self.seat_event(SeatEvent::Tablet(TABLET, event));
        }

        self.seat_event(SeatEvent::ToolAdded(PEN));
        for event in [
            ToolEvent::Type(ToolType::Pen),
            ToolEvent::HardwareSerial { hi: 0, lo: 0x1234 },
            ToolEvent::Capability(ToolCapability::Pressure),
            ToolEvent::Capability(ToolCapability::Tilt),
            ToolEvent::Done,
        ] {
            self.seat_event(SeatEvent::Tool(PEN, event));
        }
    }

    fn tool_events(&mut self, events: impl IntoIterator<Item = ToolEvent>) {
        for event in events {
            self.seat_event(SeatEvent::Tool(PEN, event));
        }
    }

    /// Announces a pad with one group of two buttons, a ring, a strip and
    /// two modes.
    fn add_pad(&mut self) -> DeviceId {
        self.seat_event(SeatEvent::PadAdded(PAD));
        for event in [
            PadEvent::Path(String::from("/dev/input/event7")),
            PadEvent::Buttons(2),
            PadEvent::Group { group: 0 },
        ] {
            self.seat_event(SeatEvent::Pad(PAD, event));
        }
        for event in [
            PadGroupEvent::Buttons(vec![0, 1]),
            PadGroupEvent::Ring,
            PadGroupEvent::Strip,
            PadGroupEvent::Modes(2),
            PadGroupEvent::Done,
        ] {
            self.seat_event(SeatEvent::PadGroup {
                pad: PAD,
                group: 0,
                event,
            });
        }
        self.seat_event(SeatEvent::Pad(PAD, PadEvent::Done));
        self.wl_seat().pad(PAD).unwrap().device.unwrap()
    }
}

// =============================================================================

#[test]
fn capabilities_build_the_hierarchy() {
    let h = Harness::new();
    let devices = h.display.devices();
    let seat = h.wl_seat();

    let pointer = devices.device(seat.master_pointer).unwrap();
    assert!(pointer.is_master());
    assert_eq!(pointer.associated_device(), Some(seat.master_keyboard));

    let mouse = devices.device(seat.pointer.unwrap()).unwrap();
    assert_eq!(mouse.name(), "Wayland Pointer");
    assert_eq!(mouse.associated_device(), Some(seat.master_pointer));

    let keyboard = devices.device(seat.keyboard.unwrap()).unwrap();
    assert_eq!(keyboard.source(), InputSource::Keyboard);
    assert_eq!(keyboard.associated_device(), Some(seat.master_keyboard));

    let touch_master = seat.touch_master.unwrap();
    let touchscreen = devices.device(seat.touch.unwrap()).unwrap();
    assert_eq!(touchscreen.source(), InputSource::Touchscreen);
    assert_eq!(touchscreen.associated_device(), Some(touch_master));
    assert_eq!(
        devices.device(touch_master).unwrap().associated_device(),
        Some(seat.master_keyboard)
    );
    assert!(seat.has_gestures);
}

#[test]
fn dropped_capabilities_remove_slaves() {
    let mut h = Harness::new();
    let mouse = h.wl_seat().pointer.unwrap();
    let touch_master = h.wl_seat().touch_master.unwrap();

    h.seat_event(SeatEvent::Capabilities(Capability::KEYBOARD));

    let devices = h.display.devices();
    assert!(devices.device(mouse).is_none());
    assert!(devices.device(touch_master).is_none());
    assert!(devices.device(h.wl_seat().master_pointer).is_some());
    assert!(h.wl_seat().keyboard.is_some());
}

#[test]
fn removed_seat_takes_its_devices() {
    let mut h = Harness::new();
    let (pointer, keyboard) = (h.wl_seat().master_pointer, h.wl_seat().master_keyboard);

    h.backend
        .dispatch(&mut h.display, WlEvent::SeatGlobalRemoved(NAME));

    assert_eq!(h.backend.seat_id(NAME), None);
    assert!(h.display.devices().device(pointer).is_none());
    assert!(h.display.devices().device(keyboard).is_none());
}

#[test]
fn pointer_events_wait_for_the_frame() {
    let mut h = Harness::new();
    h.pointer_enter(CHILD, 5., 5.);
    h.display.drain_events();

    h.seat_event(SeatEvent::Pointer(PointerEvent::Motion {
        time: 1100,
        surface_x: 8.,
        surface_y: 9.,
    }));
    h.seat_event(SeatEvent::Pointer(PointerEvent::Button {
        serial: 40,
        time: 1110,
        button: buttons::BTN_LEFT,
        state: ButtonState::Pressed,
    }));
    // The button pushed the motion out of the frame.
    assert_eq!(kinds(&h.display.drain_events()), [EventType::MotionNotify]);

    h.seat_event(SeatEvent::Pointer(PointerEvent::Frame));
    let events = h.display.drain_events();
    assert_eq!(kinds(&events), [EventType::ButtonPress]);
    assert_eq!(events[0].button(), Some(1));
    assert_eq!(events[0].coords(), Some((8., 9.)));
    assert_eq!(h.wl_seat().pointer_info.press_serial, 40);
    assert!(h
        .wl_seat()
        .modifiers(h.wl_seat().master_pointer)
        .contains(ModifierType::BUTTON1));
}

#[test]
fn old_seats_deliver_without_frames() {
    let mut h = Harness::with_version(4);
    let serial = h.next_serial();
    h.seat_event(SeatEvent::Pointer(PointerEvent::Enter {
        serial,
        surface: TOPLEVEL,
        surface_x: 20.,
        surface_y: 30.,
    }));
    h.seat_event(SeatEvent::Pointer(PointerEvent::Motion {
        time: 1100,
        surface_x: 21.,
        surface_y: 30.,
    }));

    let events = h.display.drain_events();
    assert_eq!(
        kinds(&events),
        [EventType::EnterNotify, EventType::MotionNotify]
    );
    assert_eq!(events[1].root_coords(), Some((121., 130.)));
}

#[test]
fn scroll_frame_coalescing() {
    let mut h = Harness::new();
    h.pointer_enter(TOPLEVEL, 20., 30.);
    h.display.drain_events();

    h.seat_event(SeatEvent::Pointer(PointerEvent::AxisSource(AxisSource::Wheel)));
    h.seat_event(SeatEvent::Pointer(PointerEvent::AxisDiscrete {
        axis: Axis::VerticalScroll,
        discrete: 1,
    }));
    h.seat_event(SeatEvent::Pointer(PointerEvent::Axis {
        time: 1200,
        axis: Axis::VerticalScroll,
        value: 120.,
    }));
    h.seat_event(SeatEvent::Pointer(PointerEvent::Frame));

    let events = h.display.drain_events();
    assert_eq!(kinds(&events), [EventType::Scroll, EventType::Scroll]);

    let discrete = events[0].scroll().unwrap();
    assert_eq!(discrete.direction, ScrollDirection::Down);
    assert!(events[0].pointer_emulated);

    let smooth = events[1].scroll().unwrap();
    assert_eq!(smooth.direction, ScrollDirection::Smooth);
    assert_abs_diff_eq!(smooth.delta_y, 12.);
    assert!(!smooth.is_stop);
    assert!(!events[1].pointer_emulated);

    let wheel = h.wl_seat().wheel_scrolling.unwrap();
    assert_eq!(events[1].source_device, Some(wheel));
    assert_eq!(
        h.display.devices().device(wheel).unwrap().source(),
        InputSource::Mouse
    );

    h.seat_event(SeatEvent::Pointer(PointerEvent::AxisStop {
        time: 1300,
        axis: Axis::VerticalScroll,
    }));
    h.seat_event(SeatEvent::Pointer(PointerEvent::Frame));

    let events = h.display.drain_events();
    assert_eq!(kinds(&events), [EventType::Scroll]);
    let stop = events[0].scroll().unwrap();
    assert_eq!(stop.direction, ScrollDirection::Smooth);
    assert_eq!((stop.delta_x, stop.delta_y), (0., 0.));
    assert!(stop.is_stop);
}

#[test]
fn finger_scrolling_gets_its_own_slave() {
    let mut h = Harness::new();
    h.pointer_enter(TOPLEVEL, 20., 30.);

    h.seat_event(SeatEvent::Pointer(PointerEvent::AxisSource(AxisSource::Finger)));
    h.seat_event(SeatEvent::Pointer(PointerEvent::Axis {
        time: 1200,
        axis: Axis::HorizontalScroll,
        value: -15.,
    }));
    h.seat_event(SeatEvent::Pointer(PointerEvent::Frame));

    let finger = h.wl_seat().finger_scrolling.unwrap();
    assert_eq!(
        h.display.devices().device(finger).unwrap().source(),
        InputSource::Touchpad
    );
    let events = h.display.drain_events();
    let scroll = events.iter().find_map(Event::scroll).unwrap();
    assert_abs_diff_eq!(scroll.delta_x, -1.5);
    assert!(h.wl_seat().wheel_scrolling.is_none());
}

#[test]
fn touch_pointer_emulation() {
    let mut h = Harness::new();
    let touch_master = h.wl_seat().touch_master.unwrap();

    for (id, x) in [(1, 10.), (2, 50.)] {
        let serial = h.next_serial();
        h.seat_event(SeatEvent::Touch(TouchEvent::Down {
            serial,
            time: 100,
            surface: TOPLEVEL,
            id,
            x,
            y: 10.,
        }));
        h.seat_event(SeatEvent::Touch(TouchEvent::Frame));
    }
    let serial = h.next_serial();
    h.seat_event(SeatEvent::Touch(TouchEvent::Up {
        serial,
        time: 150,
        id: 1,
    }));
    h.seat_event(SeatEvent::Touch(TouchEvent::Motion {
        time: 160,
        id: 2,
        x: 55.,
        y: 12.,
    }));

    let events = h.display.drain_events();
    assert_eq!(
        kinds(&events),
        [
            EventType::EnterNotify,
            EventType::TouchBegin,
            EventType::TouchBegin,
            EventType::TouchEnd,
            EventType::LeaveNotify,
            EventType::TouchUpdate,
        ]
    );

    let first = events[1].touch().unwrap();
    assert_eq!(first.sequence, EventSequence(1));
    assert!(first.emulating_pointer);
    assert!(events[1].pointer_emulated);

    let second = events[2].touch().unwrap();
    assert_eq!(second.sequence, EventSequence(2));
    assert!(!second.emulating_pointer);

    let leave = &events[4];
    assert_eq!(leave.device, Some(touch_master));
    assert_eq!(leave.crossing().unwrap().mode, CrossingMode::Normal);

    // The second touch never takes over the emulated pointer.
    assert!(!events[5].touch().unwrap().emulating_pointer);
    let info = &h.wl_seat().touch_info;
    assert_eq!(info.focus, None);
    assert_eq!(info.surface_x, 10.);
}

#[test]
fn touch_cancel_ends_every_sequence() {
    let mut h = Harness::new();
    for id in [3, 4] {
        let serial = h.next_serial();
        h.seat_event(SeatEvent::Touch(TouchEvent::Down {
            serial,
            time: 100,
            surface: TOPLEVEL,
            id,
            x: 10.,
            y: 10.,
        }));
    }
    h.display.drain_events();

    h.seat_event(SeatEvent::Touch(TouchEvent::Cancel));

    let events = h.display.drain_events();
    assert_eq!(
        kinds(&events),
        [EventType::TouchCancel, EventType::TouchCancel]
    );
    assert!(h.wl_seat().touches.is_empty());
    assert_eq!(h.wl_seat().touch_info.focus, None);
}

#[test]
fn touchpad_gestures() {
    let mut h = Harness::new();
    h.pointer_enter(TOPLEVEL, 20., 30.);
    h.display.drain_events();

    for event in [
        SwipeEvent::Begin {
            serial: 50,
            time: 1000,
            surface: TOPLEVEL,
            fingers: 3,
        },
        SwipeEvent::Update {
            time: 1010,
            dx: 4.,
            dy: -2.,
        },
        SwipeEvent::End {
            serial: 51,
            time: 1020,
            cancelled: true,
        },
    ] {
        h.seat_event(SeatEvent::Swipe(event));
    }
    h.seat_event(SeatEvent::Pinch(PinchEvent::Update {
        time: 1030,
        dx: 0.,
        dy: 0.,
        scale: 1.5,
        rotation: 90.,
    }));

    let events = h.display.drain_events();
    let phases: Vec<_> = events
        .iter()
        .filter_map(|ev| match &ev.data {
            EventData::TouchpadSwipe(swipe) => Some((swipe.phase, swipe.n_fingers, swipe.dx)),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        [
            (TouchpadGesturePhase::Begin, 3, 0.),
            (TouchpadGesturePhase::Update, 3, 4.),
            (TouchpadGesturePhase::Cancel, 3, 0.),
        ]
    );

    let EventData::TouchpadPinch(pinch) = &events[3].data else {
        panic!("expected a pinch, got {:?}", events[3].kind);
    };
    assert_abs_diff_eq!(pinch.angle_delta, std::f64::consts::FRAC_PI_2);
    assert_abs_diff_eq!(pinch.scale, 1.5);
}

#[test]
fn keys_follow_the_keyboard_focus() {
    let mut h = Harness::new();
    h.key(KEY_A, KeyState::Pressed, 900);
    // No focus, nothing to deliver to.
    assert!(h.display.drain_events().is_empty());

    h.keyboard_enter(TOPLEVEL);
    h.key(KEY_A, KeyState::Released, 950);

    let events = h.display.drain_events();
    assert_eq!(kinds(&events), [EventType::FocusChange, EventType::KeyRelease]);
    assert!(events[0].focus().unwrap().is_in);
    let key = events[1].key().unwrap();
    assert_eq!(key.keyval, 0x61);
    assert_eq!(key.hardware_keycode, 0x61);
    assert_eq!(events[1].source_device, h.wl_seat().keyboard);

    let serial = h.next_serial();
    h.seat_event(SeatEvent::Keyboard(KeyboardEvent::Leave {
        serial,
        surface: TOPLEVEL,
    }));
    let events = h.display.drain_events();
    assert_eq!(kinds(&events), [EventType::FocusChange]);
    assert!(!events[0].focus().unwrap().is_in);
}

#[test]
fn out_of_range_keys_are_dropped() {
    let mut h = Harness::new();
    h.keyboard_enter(TOPLEVEL);
    h.display.drain_events();

    h.key(u32::MAX - 3, KeyState::Pressed, 1000);
    assert!(h.display.drain_events().is_empty());
    assert_eq!(h.pending(TimerKind::KeyRepeat(h.seat())), None);

    h.key(KEY_A, KeyState::Pressed, 1010);
    assert_eq!(kinds(&h.display.drain_events()), [EventType::KeyPress]);
}

#[test]
fn modifiers_and_keymaps_signal() {
    let mut h = Harness::new();
    let log = h.record_signals();
    h.keyboard_enter(TOPLEVEL);

    h.seat_event(SeatEvent::Keyboard(KeyboardEvent::Modifiers {
        serial: 30,
        depressed: ModifierType::SHIFT.bits(),
        latched: 0,
        locked: 0,
        group: 0,
    }));
    h.key(KEY_A, KeyState::Pressed, 1000);
    let event = h.display.drain_events().pop().unwrap();
    assert!(event.key().unwrap().state.contains(ModifierType::SHIFT));

    h.seat_event(SeatEvent::Keyboard(KeyboardEvent::Keymap {
        format: 1,
        data: b"xkb_keymap {};".to_vec(),
    }));
    // Rejected keymaps change nothing.
    h.seat_event(SeatEvent::Keyboard(KeyboardEvent::Keymap {
        format: 0,
        data: Vec::new(),
    }));

    let kinds: Vec<_> = log.borrow().iter().map(Signal::kind).collect();
    assert_eq!(
        kinds,
        [
            SignalKind::StateChanged,
            SignalKind::KeysChanged,
            SignalKind::StateChanged,
        ]
    );
}

#[test]
fn key_repeat_waits_for_the_compositor() {
    let mut h = Harness::new();
    let timer = TimerKind::KeyRepeat(h.seat());
    h.keyboard_enter(TOPLEVEL);
    h.display.drain_events();

    h.key(KEY_A, KeyState::Pressed, 1000);
    assert_eq!(kinds(&h.display.drain_events()), [EventType::KeyPress]);
    assert_eq!(h.pending(timer), Some(Duration::from_millis(400)));

    h.display.clock().advance(Duration::from_millis(400));
    h.backend.on_timer(timer);
    assert_eq!(h.compositor.borrow().syncs, [NAME]);
    assert!(h.display.drain_events().is_empty());

    h.seat_event(SeatEvent::RepeatSyncDone);
    let events = h.display.drain_events();
    assert_eq!(kinds(&events), [EventType::KeyPress]);
    assert_eq!(events[0].key().unwrap().keyval, 0x61);
    assert_eq!(h.pending(timer), Some(Duration::from_millis(80)));

    // A stray sync does not repeat.
    h.seat_event(SeatEvent::RepeatSyncDone);
    assert!(h.display.drain_events().is_empty());

    h.key(KEY_A, KeyState::Released, 1500);
    assert_eq!(kinds(&h.display.drain_events()), [EventType::KeyRelease]);
    assert_eq!(h.pending(timer), None);
}

#[test]
fn repeat_follows_compositor_settings() {
    let mut h = Harness::new();
    let timer = TimerKind::KeyRepeat(h.seat());
    h.keyboard_enter(TOPLEVEL);

    h.seat_event(SeatEvent::Keyboard(KeyboardEvent::RepeatInfo {
        rate: 25,
        delay: 600,
    }));
    h.key(KEY_A, KeyState::Pressed, 1000);
    assert_eq!(h.pending(timer), Some(Duration::from_millis(600)));
    h.key(KEY_A, KeyState::Released, 1010);

    h.seat_event(SeatEvent::Keyboard(KeyboardEvent::RepeatInfo {
        rate: 0,
        delay: 600,
    }));
    h.key(KEY_A, KeyState::Pressed, 1020);
    assert_eq!(h.pending(timer), None);
}

#[test]
fn modifier_keys_do_not_repeat() {
    let mut h = Harness::new();
    let timer = TimerKind::KeyRepeat(h.seat());
    h.keyboard_enter(TOPLEVEL);

    h.key(KEY_SHIFT, KeyState::Pressed, 1000);
    assert_eq!(h.pending(timer), None);
    let event = h.display.drain_events().pop().unwrap();
    assert!(event.key().unwrap().is_modifier);
}

#[test]
fn clipboard_changes_wait_for_focus() {
    let mut h = Harness::new();

    h.seat_event(SeatEvent::Selection);
    // Primary selection changes without a focus are dropped.
    h.seat_event(SeatEvent::PrimarySelection);
    assert!(h.display.drain_events().is_empty());

    h.keyboard_enter(TOPLEVEL);
    h.seat_event(SeatEvent::PrimarySelection);

    let selections: Vec<_> = h
        .display
        .drain_events()
        .iter()
        .filter_map(|ev| match &ev.data {
            EventData::OwnerChange(change) => Some((ev.window, change.selection.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        selections,
        [
            (Some(TOPLEVEL), String::from(CLIPBOARD)),
            (Some(TOPLEVEL), String::from(PRIMARY)),
        ]
    );
}

#[test]
fn tablet_proximity() {
    let mut h = Harness::new();
    h.add_tablet();

    let tablet = h.wl_seat().tablet(TABLET).unwrap();
    let (master, stylus) = (tablet.master.unwrap(), tablet.stylus.unwrap());
    let stylus_device = h.display.devices().device(stylus).unwrap();
    assert_eq!(stylus_device.source(), InputSource::Pen);
    assert_eq!(stylus_device.vendor_id(), Some("056a"));
    assert_eq!(stylus_device.associated_device(), Some(master));
    assert_eq!(h.display.devices().seat(h.seat()).unwrap().tools().len(), 1);

    let log = h.record_signals();
    let serial = h.next_serial();
    h.tool_events([
        ToolEvent::ProximityIn {
            serial,
            tablet: TABLET,
            surface: TOPLEVEL,
        },
        ToolEvent::Motion { x: 20., y: 30. },
        ToolEvent::Pressure(32767),
        ToolEvent::Tilt { x: 45., y: 0. },
        ToolEvent::Frame { time: 1100 },
    ]);

    let tool_changes: Vec<_> = log
        .borrow()
        .iter()
        .filter_map(|signal| match signal {
            Signal::ToolChanged { device, tool } => Some((*device, tool.as_ref().map(|tool| tool.serial()))),
            _ => None,
        })
        .collect();
    assert_eq!(tool_changes, [(stylus, Some(0x1234)), (master, Some(0x1234))]);

    let events = h.display.drain_events();
    let master_device = h.display.devices().device(master).unwrap();
    assert_eq!(master_device.n_axes(), 5);
    assert_eq!(master_device.axis_use(4), AxisUse::Pressure);
    assert_eq!(
        master_device.last_tool().unwrap().tool_type(),
        DeviceToolType::Pen
    );

    assert_eq!(
        kinds(&events),
        [
            EventType::EnterNotify,
            EventType::ProximityIn,
            EventType::MotionNotify,
        ]
    );
    assert_eq!(events[1].window, Some(TOPLEVEL));
    assert_eq!(events[1].tool.as_ref().unwrap().serial(), 0x1234);

    let motion = &events[2];
    assert_eq!(motion.source_device, Some(stylus));
    assert_eq!(motion.coords(), Some((20., 30.)));
    let axes = motion.axes().unwrap();
    let pressure = master_device.get_axis(axes, AxisUse::Pressure).unwrap();
    assert_abs_diff_eq!(pressure, 0.5, epsilon = 1e-4);
    assert!((0. ..=1.).contains(&pressure));
    assert_abs_diff_eq!(
        master_device.get_axis(axes, AxisUse::XTilt).unwrap(),
        0.5,
        epsilon = 1e-9
    );
}

#[test]
fn tablet_proximity_out() {
    let mut h = Harness::new();
    h.add_tablet();
    let master = h.wl_seat().tablet(TABLET).unwrap().master.unwrap();
    let serial = h.next_serial();
    h.tool_events([
        ToolEvent::ProximityIn {
            serial,
            tablet: TABLET,
            surface: TOPLEVEL,
        },
        ToolEvent::Frame { time: 1100 },
    ]);
    h.display.drain_events();

    h.tool_events([ToolEvent::ProximityOut, ToolEvent::Frame { time: 1200 }]);

    let events = h.display.drain_events();
    assert_eq!(
        kinds(&events),
        [EventType::LeaveNotify, EventType::ProximityOut]
    );
    assert_eq!(events[1].time(), 1200);
    assert!(h.display.devices().device(master).unwrap().last_tool().is_none());
    let tablet = h.wl_seat().tablet(TABLET).unwrap();
    assert_eq!(tablet.current_tool, None);
    assert_eq!(tablet.pointer.focus, None);
}

#[test]
fn stylus_buttons_and_wheel() {
    let mut h = Harness::new();
    h.add_tablet();
    let serial = h.next_serial();
    h.tool_events([
        ToolEvent::ProximityIn {
            serial,
            tablet: TABLET,
            surface: TOPLEVEL,
        },
        ToolEvent::Frame { time: 1100 },
    ]);
    h.display.drain_events();

    h.tool_events([
        ToolEvent::Button {
            serial: 60,
            button: buttons::BTN_STYLUS,
            state: ButtonState::Pressed,
        },
        ToolEvent::Frame { time: 1110 },
        ToolEvent::Wheel {
            degrees: 15.,
            clicks: -1,
        },
    ]);

    let events = h.display.drain_events();
    assert_eq!(
        kinds(&events),
        [EventType::ButtonPress, EventType::Scroll, EventType::Scroll]
    );
    assert_eq!(events[0].button(), Some(3));
    assert_eq!(events[1].scroll().unwrap().direction, ScrollDirection::Smooth);
    assert_abs_diff_eq!(events[1].scroll().unwrap().delta_y, -1.);
    assert_eq!(events[2].scroll().unwrap().direction, ScrollDirection::Up);
    assert!(events[2].pointer_emulated);
}

#[test]
fn removed_tablet_takes_its_devices() {
    let mut h = Harness::new();
    h.add_tablet();
    let tablet = h.wl_seat().tablet(TABLET).unwrap();
    let devices = [tablet.master.unwrap(), tablet.stylus.unwrap(), tablet.eraser.unwrap()];

    h.seat_event(SeatEvent::Tablet(TABLET, TabletEvent::Removed));

    for device in devices {
        assert!(h.display.devices().device(device).is_none());
    }
    assert!(h.wl_seat().tablets.is_empty());
}

#[test]
fn pad_buttons_rings_and_modes() {
    let mut h = Harness::new();
    let pad = h.add_pad();
    assert_eq!(
        h.display.devices().device(pad).unwrap().source(),
        InputSource::TabletPad
    );
    h.keyboard_enter(TOPLEVEL);
    h.display.drain_events();

    h.seat_event(SeatEvent::Pad(
        PAD,
        PadEvent::Button {
            time: 1100,
            button: 1,
            state: ButtonState::Pressed,
        },
    ));
    h.seat_event(SeatEvent::PadGroup {
        pad: PAD,
        group: 0,
        event: PadGroupEvent::ModeSwitch {
            time: 1200,
            serial: 55,
            mode: 1,
        },
    });
    for event in [PadRingEvent::Angle(90.), PadRingEvent::Frame { time: 1300 }] {
        h.seat_event(SeatEvent::PadRing {
            pad: PAD,
            group: 0,
            ring: 0,
            event,
        });
    }
    for event in [
        PadStripEvent::Position(65535),
        PadStripEvent::Frame { time: 1400 },
    ] {
        h.seat_event(SeatEvent::PadStrip {
            pad: PAD,
            group: 0,
            strip: 0,
            event,
        });
    }

    let events = h.display.drain_events();
    assert!(events.iter().all(|ev| ev.device == Some(pad)));
    assert_debug_snapshot!(events.iter().map(|ev| &ev.data).collect::<Vec<_>>(), @r#"
    [
        PadButton(
            PadButtonEvent {
                time: 1100,
                group: 0,
                button: 1,
                mode: 0,
            },
        ),
        PadGroupMode(
            PadGroupModeEvent {
                time: 1200,
                group: 0,
                mode: 1,
            },
        ),
        PadAxis(
            PadAxisEvent {
                time: 1300,
                group: 0,
                index: 0,
                mode: 1,
                value: 90.0,
            },
        ),
        PadAxis(
            PadAxisEvent {
                time: 1400,
                group: 0,
                index: 0,
                mode: 1,
                value: 1.0,
            },
        ),
    ]
    "#);
    assert_eq!(
        kinds(&events),
        [
            EventType::PadButtonPress,
            EventType::PadGroupMode,
            EventType::PadRing,
            EventType::PadStrip,
        ]
    );
    assert_eq!(h.backend.pad_mode_switch_serial(pad, 0), Some(55));

    h.seat_event(SeatEvent::Pad(PAD, PadEvent::Removed));
    assert!(h.display.devices().device(pad).is_none());
    assert_eq!(h.backend.pad_mode_switch_serial(pad, 0), None);
}

#[test]
fn pad_enter_links_the_tablet() {
    let mut h = Harness::new();
    h.add_tablet();
    h.add_pad();

    h.seat_event(SeatEvent::Pad(
        PAD,
        PadEvent::Enter {
            serial: 70,
            tablet: TABLET,
            surface: TOPLEVEL,
        },
    ));
    assert_eq!(h.wl_seat().tablet(TABLET).unwrap().pads, [PAD]);
    assert_eq!(h.wl_seat().pad(PAD).unwrap().current_tablet, Some(TABLET));

    h.seat_event(SeatEvent::Pad(
        PAD,
        PadEvent::Leave {
            serial: 71,
            surface: TOPLEVEL,
        },
    ));
    assert!(h.wl_seat().tablet(TABLET).unwrap().pads.is_empty());
}

#[test]
fn pointer_grab_crossings() {
    let mut h = Harness::new();
    h.pointer_enter(CHILD, 5., 5.);
    h.display.drain_events();
    let pointer = h.wl_seat().master_pointer;

    let status = h.backend.grab(
        &mut h.display,
        pointer,
        TOPLEVEL,
        false,
        EventMask::ALL_EVENTS,
        None,
        1500,
    );
    assert_eq!(status, GrabStatus::Success);
    let events = h.display.drain_events();
    assert_debug_snapshot!(crossing_summary(&events), @r#"
    [
        "LeaveNotify WindowId(20) Nonlinear sub=None (5.0, 5.0)",
        "EnterNotify WindowId(10) Nonlinear sub=None (15.0, 15.0)",
    ]
    "#);
    assert!(events
        .iter()
        .all(|ev| ev.crossing().unwrap().mode == CrossingMode::Grab));
    assert_eq!(h.tree.borrow().grab_seats[&TOPLEVEL], Some(h.seat()));

    // An older grab request loses.
    let status = h.backend.grab(
        &mut h.display,
        pointer,
        CHILD,
        false,
        EventMask::ALL_EVENTS,
        None,
        1400,
    );
    assert_eq!(status, GrabStatus::AlreadyGrabbed);

    h.backend.ungrab(&mut h.display, pointer, 1600);
    assert_eq!(h.tree.borrow().grab_seats[&TOPLEVEL], None);
    assert_eq!(h.wl_seat().pointer_info.grab_window, None);
}

#[test]
fn keyboard_grab_inhibits_shortcuts() {
    let mut h = Harness::new();
    let (seat, keyboard) = (h.seat(), h.wl_seat().master_keyboard);

    let status = h.display.device_grab(
        &mut h.backend,
        keyboard,
        TOPLEVEL,
        GrabOwnership::None,
        false,
        EventMask::KEY_PRESS | EventMask::KEY_RELEASE,
        None,
        1500,
    );
    assert_eq!(status, GrabStatus::Success);
    assert_eq!(h.tree.borrow().inhibited, [(TOPLEVEL, seat)]);
    let focus: Vec<_> = h
        .display
        .drain_events()
        .iter()
        .filter_map(|ev| Some((ev.window?, ev.focus()?.is_in)))
        .collect();
    assert_eq!(focus, [(TOPLEVEL, true)]);

    h.display.device_ungrab(&mut h.backend, keyboard, 1600);
    assert!(h.tree.borrow().inhibited.is_empty());
}

#[test]
fn seat_grab_covers_every_master() {
    let mut h = Harness::new();
    h.add_tablet();
    let seat = h.seat();
    let wl_seat = h.wl_seat();
    let masters = [
        wl_seat.master_pointer,
        wl_seat.master_keyboard,
        wl_seat.touch_master.unwrap(),
        wl_seat.tablet(TABLET).unwrap().master.unwrap(),
    ];

    let status = h.display.seat_grab(
        &mut h.backend,
        seat,
        CHILD,
        SeatCapabilities::ALL,
        true,
        None,
        1500,
        None,
    );
    assert_eq!(status, GrabStatus::Success);
    for master in masters {
        assert!(h.display.device_is_grabbed(master), "{master} not grabbed");
    }
    // Shortcuts stay on unless only the keyboard is grabbed.
    assert!(h.tree.borrow().inhibited.is_empty());

    h.display.seat_ungrab(&mut h.backend, seat);
    let now = h.display.serial();
    for master in masters {
        assert!(h.display.has_device_grab(master, now).is_none());
    }
}

#[test]
fn keyboard_seat_grab_inhibits_shortcuts() {
    let mut h = Harness::new();
    let seat = h.seat();

    let status = h.display.seat_grab(
        &mut h.backend,
        seat,
        CHILD,
        SeatCapabilities::KEYBOARD,
        false,
        None,
        1500,
        None,
    );
    assert_eq!(status, GrabStatus::Success);
    assert_eq!(h.tree.borrow().inhibited, [(TOPLEVEL, seat)]);

    h.display.seat_ungrab(&mut h.backend, seat);
    assert!(h.tree.borrow().inhibited.is_empty());
}

#[test]
fn animated_cursor_follows_the_timer() {
    let mut h = Harness::new();
    h.pointer_enter(TOPLEVEL, 20., 30.);
    let enter_serial = h.wl_seat().pointer_info.enter_serial;
    let pointer = h.wl_seat().master_pointer;
    let timer = TimerKind::CursorAnimation(pointer);

    h.backend.set_window_cursor(
        &h.display,
        pointer,
        TOPLEVEL,
        Some(Cursor::new(Frames(vec![50, 50]))),
    );
    assert_eq!(
        h.compositor.borrow().cursors.last(),
        Some(&(CursorTarget::Pointer(NAME), enter_serial, Some(0)))
    );
    assert_eq!(h.pending(timer), Some(Duration::from_millis(50)));

    h.backend.on_timer(timer);
    assert_eq!(
        h.compositor.borrow().cursors.last(),
        Some(&(CursorTarget::Pointer(NAME), enter_serial, Some(1)))
    );
    assert_eq!(h.pending(timer), Some(Duration::from_millis(50)));

    let serial = h.next_serial();
    h.seat_event(SeatEvent::Pointer(PointerEvent::Leave {
        serial,
        surface: TOPLEVEL,
    }));
    h.seat_event(SeatEvent::Pointer(PointerEvent::Frame));
    assert_eq!(h.pending(timer), None);
}

#[test]
fn touch_master_has_no_cursor() {
    let mut h = Harness::new();
    let touch_master = h.wl_seat().touch_master.unwrap();
    let before = h.compositor.borrow().cursors.len();

    h.backend.set_window_cursor(
        &h.display,
        touch_master,
        TOPLEVEL,
        Some(Cursor::new(Frames(vec![0]))),
    );
    assert_eq!(h.compositor.borrow().cursors.len(), before);
}

#[test]
fn queries_answer_from_the_pointer_focus() {
    let mut h = Harness::new();
    h.pointer_enter(CHILD, 5., 6.);
    let pointer = h.wl_seat().master_pointer;

    let state = h.backend.query_state(&h.display, pointer, Some(TOPLEVEL)).unwrap();
    assert_eq!(state.child, Some(CHILD));
    assert_eq!((state.root_x, state.root_y), (115., 116.));

    let at = h.backend.window_at_position(&h.display, pointer, true).unwrap();
    assert_eq!(at.window, TOPLEVEL);
    assert_eq!((at.x, at.y), (15., 16.));

    let at = h.backend.window_at_position(&h.display, pointer, false).unwrap();
    assert_eq!((at.window, at.x, at.y), (CHILD, 5., 6.));

    let state = h.backend.get_state(&h.display, pointer, TOPLEVEL).unwrap();
    assert_eq!(state.axes, [15., 16.]);
}

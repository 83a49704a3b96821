//! Per-device grab stacks.
//!
//! Each device has a list of grabs ordered by start serial. Consecutive
//! entries touch: an entry ends where the next one starts. Only the entry
//! covering the current serial is in effect; older entries are retired by
//! [`Display::device_grab_update`] as events with newer serials arrive, which
//! is when grab crossings and grab-broken events are produced.

use tracing::{debug, trace};

use crate::backend::DeviceBackend;
use crate::device::{DeviceId, DeviceType, InputSource};
use crate::event::{
    CrossingMode, Event, EventData, EventMask, EventSequence, EventType, GrabBrokenEvent,
};
use crate::window::{WindowId, WindowType};

use super::Display;

/// How strongly a grab suppresses the events of other devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GrabOwnership {
    /// Events of other devices are unaffected.
    None,
    /// Other devices cannot send events to the grab window.
    Window,
    /// Other devices cannot send events anywhere in the application.
    Application,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrabInfo {
    pub window: WindowId,
    /// Native toplevel receiving the events for `window`.
    pub native_window: WindowId,
    pub serial_start: u64,
    /// Exclusive; `u64::MAX` while the grab is open-ended.
    pub serial_end: u64,
    pub event_mask: EventMask,
    pub time: u32,
    pub ownership: GrabOwnership,
    pub owner_events: bool,
    pub implicit: bool,
    /// Grab crossings were emitted.
    pub activated: bool,
    /// The grab ended without a release, e.g. the window went away.
    pub implicit_ungrab: bool,
}

impl GrabInfo {
    pub fn covers(&self, serial: u64) -> bool {
        self.serial_start <= serial && serial < self.serial_end
    }
}

/// Implicit grab of one touch sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchGrabInfo {
    pub device: DeviceId,
    pub sequence: EventSequence,
    pub window: WindowId,
    pub native_window: WindowId,
    pub serial: u64,
    pub event_mask: EventMask,
    pub time: u32,
}

impl Display {
    /// Inserts a grab into the device's stack, after any grab with the same
    /// start serial, and stitches the neighbouring ranges.
    #[allow(clippy::too_many_arguments)]
    pub fn add_device_grab(
        &mut self,
        device: DeviceId,
        window: WindowId,
        native_window: WindowId,
        ownership: GrabOwnership,
        owner_events: bool,
        event_mask: EventMask,
        serial_start: u64,
        time: u32,
        implicit: bool,
    ) {
        trace!(
            "adding {} grab for {device} on {window:?} at serial {serial_start}",
            if implicit { "implicit" } else { "explicit" }
        );

        let mut info = GrabInfo {
            window,
            native_window,
            serial_start,
            serial_end: u64::MAX,
            event_mask,
            time,
            ownership,
            owner_events,
            implicit,
            activated: false,
            implicit_ungrab: false,
        };

        let grabs = self.device_grabs.entry(device).or_default();
        let index = grabs
            .iter()
            .position(|other| serial_start < other.serial_start)
            .unwrap_or(grabs.len());

        if let Some(next) = grabs.get(index) {
            info.serial_end = next.serial_start;
        }
        if let Some(prev) = index.checked_sub(1).and_then(|i| grabs.get_mut(i)) {
            prev.serial_end = serial_start;
        }

        grabs.insert(index, info);
    }

    /// The most recently started grab, whether or not it is in effect yet.
    pub fn get_last_device_grab(&self, device: DeviceId) -> Option<&GrabInfo> {
        self.device_grabs.get(&device)?.last()
    }

    pub(crate) fn get_last_device_grab_mut(&mut self, device: DeviceId) -> Option<&mut GrabInfo> {
        self.device_grabs.get_mut(&device)?.last_mut()
    }

    /// The grab in effect at `serial`.
    pub fn has_device_grab(&self, device: DeviceId, serial: u64) -> Option<&GrabInfo> {
        self.device_grabs
            .get(&device)?
            .iter()
            .find(|grab| grab.covers(serial))
    }

    /// Ends the grab in effect at `serial`, provided its window is inside
    /// `if_child` (or unconditionally when `if_child` is `None`).
    ///
    /// Returns whether the ended grab was the last one on the stack.
    pub fn end_device_grab(
        &mut self,
        device: DeviceId,
        serial: u64,
        if_child: Option<WindowId>,
        implicit: bool,
    ) -> bool {
        let Some(grabs) = self.device_grabs.get_mut(&device) else {
            return false;
        };
        let Some(index) = grabs.iter().position(|grab| grab.covers(serial)) else {
            return false;
        };

        let grab_window = grabs[index].window;
        if let Some(if_child) = if_child {
            if !self.windows.is_event_parent_of(if_child, grab_window) {
                return false;
            }
        }

        let grab = &mut grabs[index];
        grab.serial_end = serial;
        grab.implicit_ungrab = implicit;
        index + 1 == grabs.len()
    }

    /// Retires grabs that ended at or before `current_serial` and activates
    /// the one now in effect.
    pub fn device_grab_update(
        &mut self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
        source_device: Option<DeviceId>,
        current_serial: u64,
    ) {
        let time = self.last_event_time;
        let is_keyboard = self.is_keyboard(device);

        loop {
            let Some(grabs) = self.device_grabs.get(&device) else {
                return;
            };
            let Some(current) = grabs.first().cloned() else {
                self.device_grabs.remove(&device);
                return;
            };

            if current.serial_start > current_serial {
                // Not started yet.
                return;
            }

            if current.serial_end > current_serial {
                if !current.activated && !is_keyboard {
                    self.switch_to_pointer_grab(
                        backend,
                        device,
                        source_device,
                        Some(&current),
                        None,
                        time,
                        current_serial,
                    );
                    self.mark_first_grab_activated(device);
                }
                return;
            }

            let next = grabs
                .get(1)
                .filter(|next| next.serial_start <= current_serial)
                .cloned();

            if let Some(next) = &next {
                self.break_touch_grabs(device, next.window);
            }

            let broken = match &next {
                None => current.implicit_ungrab,
                Some(next) => next.window != current.window,
            };
            if broken {
                self.generate_grab_broken(
                    current.window,
                    device,
                    current.implicit,
                    next.as_ref().map(|next| next.window),
                );
            }

            if let Some(grabs) = self.device_grabs.get_mut(&device) {
                grabs.remove(0);
                if grabs.is_empty() {
                    self.device_grabs.remove(&device);
                }
            }

            if !is_keyboard {
                self.switch_to_pointer_grab(
                    backend,
                    device,
                    source_device,
                    next.as_ref(),
                    Some(&current),
                    time,
                    current_serial,
                );
                if next.is_some() {
                    self.mark_first_grab_activated(device);
                }
            }
        }
    }

    fn mark_first_grab_activated(&mut self, device: DeviceId) {
        if let Some(grab) = self
            .device_grabs
            .get_mut(&device)
            .and_then(|grabs| grabs.first_mut())
        {
            grab.activated = true;
        }
    }

    /// Whether events of `device` may be delivered at `serial`: a grab of
    /// higher ownership held by another device of the same kind blocks them.
    pub fn check_grab_ownership(&self, device: DeviceId, serial: u64) -> bool {
        let device_is_keyboard = self.is_keyboard(device);
        let mut higher = GrabOwnership::None;
        let mut own = GrabOwnership::None;

        for (other, grabs) in &self.device_grabs {
            let Some(grab) = grabs.iter().find(|grab| grab.covers(serial)) else {
                continue;
            };
            if self.is_keyboard(*other) != device_is_keyboard {
                continue;
            }

            if *other == device {
                own = grab.ownership;
            } else {
                higher = higher.max(grab.ownership);
            }
        }

        higher <= own
    }

    // =========================================================================
    // Touch grabs
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub fn add_touch_grab(
        &mut self,
        device: DeviceId,
        sequence: EventSequence,
        window: WindowId,
        native_window: WindowId,
        event_mask: EventMask,
        serial: u64,
        time: u32,
    ) {
        trace!("adding touch grab for {device} sequence {sequence:?} on {window:?}");
        self.touch_grabs.push(TouchGrabInfo {
            device,
            sequence,
            window,
            native_window,
            serial,
            event_mask,
            time,
        });
    }

    pub fn end_touch_grab(&mut self, device: DeviceId, sequence: EventSequence) -> bool {
        let Some(index) = self
            .touch_grabs
            .iter()
            .position(|info| info.device == device && info.sequence == sequence)
        else {
            return false;
        };

        self.touch_grabs.swap_remove(index);
        true
    }

    /// The touch grab of `sequence`, if it started at or before `serial`.
    pub fn has_touch_grab(
        &self,
        device: DeviceId,
        sequence: EventSequence,
        serial: u64,
    ) -> Option<&TouchGrabInfo> {
        self.touch_grabs
            .iter()
            .find(|info| info.device == device && info.sequence == sequence)
            .filter(|info| serial >= info.serial)
    }

    pub fn touch_grabs(&self) -> &[TouchGrabInfo] {
        &self.touch_grabs
    }

    fn break_touch_grabs(&mut self, device: DeviceId, new_grab_window: WindowId) {
        let broken: Vec<_> = self
            .touch_grabs
            .iter()
            .filter(|info| info.device == device && info.window != new_grab_window)
            .map(|info| info.window)
            .collect();

        for window in broken {
            self.generate_grab_broken(window, device, true, Some(new_grab_window));
        }
    }

    // =========================================================================
    // Grab transitions
    // =========================================================================

    pub(crate) fn generate_grab_broken(
        &mut self,
        window: WindowId,
        device: DeviceId,
        implicit: bool,
        grab_window: Option<WindowId>,
    ) {
        if self.windows.is_destroyed(window) {
            return;
        }

        debug!("grab of {device} on {window:?} broken, new grab window {grab_window:?}");

        let mut event = Event::new(
            EventType::GrabBroken,
            Some(window),
            EventData::GrabBroken(GrabBrokenEvent {
                keyboard: self.is_keyboard(device),
                implicit,
                grab_window,
            }),
        )
        .with_devices(device, None);
        event.seat = self.devices.device(device).and_then(|device| device.seat());
        self.put_event(event);
    }

    /// Emits the crossings for moving from `last_grab` (or no grab) to `grab`
    /// (or no grab) and updates the window under the pointer.
    #[allow(clippy::too_many_arguments)]
    fn switch_to_pointer_grab(
        &mut self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
        source_device: Option<DeviceId>,
        grab: Option<&GrabInfo>,
        last_grab: Option<&GrabInfo>,
        time: u32,
        serial: u64,
    ) {
        // Crossings below must not be filtered by the grabs being switched.
        let saved = self.device_grabs.remove(&device);

        if let Some(grab) = grab {
            if !grab.implicit {
                let under_pointer = self.pointer_info(device).window_under_pointer;
                let src = last_grab.map(|last| last.window).or(under_pointer);

                if src != Some(grab.window) {
                    self.synthesize_crossing_events(
                        backend,
                        device,
                        source_device,
                        src,
                        Some(grab.window),
                        CrossingMode::Grab,
                        time,
                        serial,
                    );
                }

                // Grabbing a window the pointer is not in: from the grab's
                // point of view the pointer is now outside.
                if !grab.owner_events && under_pointer != Some(grab.window) {
                    self.set_window_under_pointer(device, None);
                }
            }
        }

        if let Some(last_grab) = last_grab {
            let mut new_toplevel = None;

            let switched_to_owner_events =
                !last_grab.owner_events && grab.is_some_and(|grab| grab.owner_events);
            if grab.is_none() || switched_to_owner_events {
                self.pointer_info_mut(device).toplevel_under_pointer = None;

                // Ungrabbed slaves have no position of their own.
                let is_slave = self
                    .devices
                    .device(device)
                    .is_some_and(|device| device.device_type() == DeviceType::Slave);
                if grab.is_some() || !is_slave {
                    new_toplevel = self.get_current_toplevel(backend, device);
                }

                if let Some((toplevel, x, y, state)) = new_toplevel {
                    let info = self.pointer_info_mut(device);
                    info.toplevel_under_pointer = Some(toplevel);
                    info.toplevel_x = f64::from(x);
                    info.toplevel_y = f64::from(y);
                    info.state = state;
                }
            }

            if grab.is_none() {
                let from_touchscreen = source_device
                    .and_then(|source| self.devices.device(source))
                    .is_some_and(|source| source.source() == InputSource::Touchscreen);
                if from_touchscreen {
                    self.pointer_info_mut(device).need_touch_press_enter = true;
                }

                let need_touch_press_enter = self.pointer_info(device).need_touch_press_enter;
                let pointer_window = match new_toplevel {
                    Some((toplevel, x, y, _)) if !need_touch_press_enter => Some(
                        self.windows
                            .find_descendant_at(toplevel, f64::from(x), f64::from(y))
                            .0,
                    ),
                    _ => None,
                };

                if !need_touch_press_enter && pointer_window != Some(last_grab.window) {
                    self.synthesize_crossing_events(
                        backend,
                        device,
                        source_device,
                        Some(last_grab.window),
                        pointer_window,
                        CrossingMode::Ungrab,
                        time,
                        serial,
                    );
                }

                self.set_window_under_pointer(device, pointer_window);
            }
        }

        if let Some(saved) = saved {
            self.device_grabs.insert(device, saved);
        }
    }

    /// The toplevel under the device, with the position in it rounded to
    /// whole pixels.
    fn get_current_toplevel(
        &self,
        backend: &dyn DeviceBackend,
        device: DeviceId,
    ) -> Option<(WindowId, i32, i32, crate::event::ModifierType)> {
        let found = backend.window_at_position(self, device, true)?;
        let window = found.window;

        if self.windows.is_destroyed(window)
            || matches!(
                self.windows.window_type(window),
                Some(WindowType::Root | WindowType::Foreign)
            )
        {
            return None;
        }

        Some((
            window,
            found.x.round() as i32,
            found.y.round() as i32,
            found.mask,
        ))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use proptest_derive::Arbitrary;

    use super::*;
    use crate::tests::fixture::Fixture;

    const W: WindowId = WindowId(10);

    fn add(display: &mut Display, device: DeviceId, start: u64) {
        display.add_device_grab(
            device,
            W,
            W,
            GrabOwnership::None,
            false,
            EventMask::ALL_EVENTS,
            start,
            0,
            false,
        );
    }

    fn ranges(display: &Display, device: DeviceId) -> Vec<(u64, u64)> {
        display.device_grabs[&device]
            .iter()
            .map(|grab| (grab.serial_start, grab.serial_end))
            .collect()
    }

    #[test]
    fn insert_stitches_ranges() {
        let mut f = Fixture::new();
        let pointer = f.pointer;

        add(&mut f.display, pointer, 10);
        add(&mut f.display, pointer, 30);
        add(&mut f.display, pointer, 20);
        add(&mut f.display, pointer, 20);

        assert_eq!(
            ranges(&f.display, pointer),
            [(10, 20), (20, 20), (20, 30), (30, u64::MAX)]
        );
        assert_eq!(f.display.has_device_grab(pointer, 25).unwrap().serial_start, 20);
        assert!(f.display.has_device_grab(pointer, 5).is_none());
    }

    #[test]
    fn end_grab_reports_last() {
        let mut f = Fixture::new();
        let pointer = f.pointer;

        add(&mut f.display, pointer, 10);
        add(&mut f.display, pointer, 20);

        assert!(!f.display.end_device_grab(pointer, 15, None, false));
        assert!(f.display.end_device_grab(pointer, 25, None, false));
        assert!(f.display.has_device_grab(pointer, 25).is_none());
        assert!(f.display.has_device_grab(pointer, 100).is_none());
    }

    #[test]
    fn end_grab_respects_if_child() {
        let mut f = Fixture::new();
        let pointer = f.pointer;
        let (top, child) = (f.toplevel, f.child);

        f.display.add_device_grab(
            pointer,
            child,
            top,
            GrabOwnership::None,
            false,
            EventMask::ALL_EVENTS,
            1,
            0,
            false,
        );

        let other = f.add_toplevel(WindowId(500), (300., 300.), (50., 50.));
        assert!(!f.display.end_device_grab(pointer, 2, Some(other), true));
        assert!(f.display.end_device_grab(pointer, 2, Some(top), true));
        assert!(f.display.get_last_device_grab(pointer).unwrap().implicit_ungrab);
    }

    #[test]
    fn ownership_blocks_same_kind_only() {
        let mut f = Fixture::new();
        let (pointer, keyboard) = (f.pointer, f.keyboard);
        let touch = f.add_touch_master();

        f.display.add_device_grab(
            pointer,
            W,
            W,
            GrabOwnership::Application,
            false,
            EventMask::ALL_EVENTS,
            1,
            0,
            false,
        );

        assert!(f.display.check_grab_ownership(pointer, 2));
        assert!(!f.display.check_grab_ownership(touch, 2));
        assert!(f.display.check_grab_ownership(keyboard, 2));
        // Not in effect yet.
        assert!(f.display.check_grab_ownership(touch, 0));
    }

    #[test]
    fn touch_grab_serial_gate() {
        let mut f = Fixture::new();
        let touch = f.add_touch_master();
        let seq = EventSequence(7);

        f.display
            .add_touch_grab(touch, seq, W, W, EventMask::TOUCH, 5, 0);
        assert!(f.display.has_touch_grab(touch, seq, 4).is_none());
        assert!(f.display.has_touch_grab(touch, seq, 5).is_some());
        assert!(f.display.end_touch_grab(touch, seq));
        assert!(!f.display.end_touch_grab(touch, seq));
    }

    #[test]
    fn update_retires_and_breaks() {
        let mut f = Fixture::new();
        let keyboard = f.keyboard;
        let other = WindowId(11);

        add(&mut f.display, keyboard, 1);
        f.display.add_device_grab(
            keyboard,
            other,
            other,
            GrabOwnership::None,
            false,
            EventMask::ALL_EVENTS,
            3,
            0,
            false,
        );

        let backend = f.backend();
        f.display.device_grab_update(&*backend.borrow(), keyboard, None, 4);

        assert_eq!(ranges(&f.display, keyboard), [(3, u64::MAX)]);
        let events = f.display.drain_events();
        assert_eq!(events.len(), 1);
        let broken = events[0].grab_broken().unwrap();
        assert_eq!(events[0].window, Some(W));
        assert!(broken.keyboard);
        assert_eq!(broken.grab_window, Some(other));
    }

    #[derive(Debug, Clone, Arbitrary)]
    enum GrabOp {
        Add(#[proptest(strategy = "0u64..64")] u64),
        End(#[proptest(strategy = "0u64..64")] u64),
    }

    proptest! {
        #[test]
        fn stack_stays_sorted_and_contiguous(ops in prop::collection::vec(any::<GrabOp>(), 0..24)) {
            let mut f = Fixture::new();
            let keyboard = f.keyboard;

            for op in ops {
                match op {
                    GrabOp::Add(start) => add(&mut f.display, keyboard, start),
                    GrabOp::End(serial) => {
                        f.display.end_device_grab(keyboard, serial, None, false);
                    }
                }
            }

            let Some(grabs) = f.display.device_grabs.get(&keyboard) else {
                return Ok(());
            };
            for pair in grabs.windows(2) {
                prop_assert!(pair[0].serial_start <= pair[1].serial_start);
            }
            // Ending only ever shortens a range.
            for pair in grabs.windows(2) {
                prop_assert!(pair[0].serial_end <= pair[1].serial_start);
            }
        }
    }
}

//! Explicit grabs requested by the toolkit, per device and per seat.

use tracing::{debug, warn};

use crate::backend::DeviceBackend;
use crate::cursor::Cursor;
use crate::device::DeviceId;
use crate::error::GrabStatus;
use crate::event::EventMask;
use crate::seat::{SeatCapabilities, SeatId};
use crate::window::WindowId;

use super::{Display, GrabOwnership};

pub const POINTER_EVENTS: EventMask = EventMask::POINTER_MOTION
    .union(EventMask::BUTTON_PRESS)
    .union(EventMask::BUTTON_RELEASE)
    .union(EventMask::SCROLL)
    .union(EventMask::SMOOTH_SCROLL)
    .union(EventMask::ENTER_NOTIFY)
    .union(EventMask::LEAVE_NOTIFY)
    .union(EventMask::PROXIMITY_IN)
    .union(EventMask::PROXIMITY_OUT);

pub const KEYBOARD_EVENTS: EventMask = EventMask::KEY_PRESS
    .union(EventMask::KEY_RELEASE)
    .union(EventMask::FOCUS_CHANGE);

pub const TOUCH_EVENTS: EventMask = EventMask::TOUCH;

/// Mask the server grab selects: everything crossing synthesis and
/// retargeting need, whatever the toolkit asked for.
pub fn native_grab_mask(event_mask: EventMask) -> EventMask {
    EventMask::POINTER_MOTION
        | EventMask::BUTTON_PRESS
        | EventMask::BUTTON_RELEASE
        | EventMask::ENTER_NOTIFY
        | EventMask::LEAVE_NOTIFY
        | EventMask::SCROLL
        | (event_mask
            & !(EventMask::POINTER_MOTION_HINT
                | EventMask::BUTTON_MOTION
                | EventMask::BUTTON1_MOTION
                | EventMask::BUTTON2_MOTION
                | EventMask::BUTTON3_MOTION))
}

/// Called between resolving the grab window and grabbing, to map it.
pub type PrepareFn<'a> = &'a mut dyn FnMut(&mut Display, WindowId);

impl Display {
    /// Grabs `device` on `window` through the backend and records the grab.
    #[allow(clippy::too_many_arguments)]
    pub fn device_grab(
        &mut self,
        backend: &mut dyn DeviceBackend,
        device: DeviceId,
        window: WindowId,
        ownership: GrabOwnership,
        owner_events: bool,
        event_mask: EventMask,
        cursor: Option<Cursor>,
        time: u32,
    ) -> GrabStatus {
        let Some(native) = self.windows.native_toplevel(window) else {
            debug!("cannot grab {device}: {window:?} is not viewable");
            return GrabStatus::NotViewable;
        };

        let serial = self.next_serial();
        let status = backend.grab(
            self,
            device,
            native,
            owner_events,
            native_grab_mask(event_mask),
            cursor,
            time,
        );

        if status.is_success() {
            self.add_device_grab(
                device,
                window,
                native,
                ownership,
                owner_events,
                event_mask,
                serial,
                time,
                false,
            );
        } else {
            debug!("grab of {device} on {window:?} failed: {status:?}");
        }

        status
    }

    /// Releases the device's grab and brings pointer state up to date.
    pub fn device_ungrab(&mut self, backend: &mut dyn DeviceBackend, device: DeviceId, time: u32) {
        backend.ungrab(self, device, time);
        self.end_last_grab(device, time);

        let serial = self.serial;
        self.device_grab_update(&*backend, device, None, serial);
    }

    /// Ends the most recent grab of `device` unless it started after `time`.
    pub(crate) fn end_last_grab(&mut self, device: DeviceId, time: u32) {
        let serial = self.serial;
        let Some(grab) = self.get_last_device_grab_mut(device) else {
            return;
        };

        let time_ok = time == 0 || grab.time == 0 || !time_is_later(grab.time, time);
        if grab.serial_start <= serial && time_ok {
            grab.serial_end = serial.max(grab.serial_start);
        }
    }

    pub fn pointer_ungrab(&mut self, backend: &mut dyn DeviceBackend, time: u32) {
        let pointers: Vec<_> = self
            .devices
            .seats()
            .iter()
            .flat_map(|seat| seat.get_master_pointers(SeatCapabilities::ALL_POINTING))
            .collect();
        for pointer in pointers {
            self.device_ungrab(backend, pointer, time);
        }
    }

    pub fn keyboard_ungrab(&mut self, backend: &mut dyn DeviceBackend, time: u32) {
        let keyboards: Vec<_> = self
            .devices
            .seats()
            .iter()
            .map(|seat| seat.keyboard())
            .collect();
        for keyboard in keyboards {
            self.device_ungrab(backend, keyboard, time);
        }
    }

    // =========================================================================
    // Seat grabs
    // =========================================================================

    /// Grabs the masters of `seat` covering `capabilities`.
    ///
    /// `prepare` runs before the grab and may show the window; grabbing a
    /// window that is still hidden fails with [`GrabStatus::NotViewable`].
    #[allow(clippy::too_many_arguments)]
    pub fn seat_grab(
        &mut self,
        backend: &mut dyn DeviceBackend,
        seat: SeatId,
        window: WindowId,
        capabilities: SeatCapabilities,
        owner_events: bool,
        cursor: Option<Cursor>,
        time: u32,
        prepare: Option<PrepareFn<'_>>,
    ) -> GrabStatus {
        let Some(seat_ref) = self.devices.seat(seat) else {
            warn!("grab on unknown seat {seat:?}");
            return GrabStatus::Failed;
        };
        let (pointer, keyboard) = (seat_ref.pointer(), seat_ref.keyboard());

        if self.windows.native_toplevel(window).is_none() {
            return GrabStatus::NotViewable;
        }

        if let Some(prepare) = prepare {
            prepare(self, window);
        }
        if !self.windows.is_visible(window) {
            warn!("cannot grab on hidden window {window:?}");
            return GrabStatus::NotViewable;
        }

        let status = match backend.seat_grab(
            self,
            seat,
            window,
            capabilities,
            owner_events,
            cursor.clone(),
            time,
        ) {
            Some(status) => status,
            None => self.seat_grab_masters(
                backend,
                pointer,
                keyboard,
                window,
                capabilities,
                owner_events,
                cursor,
                time,
            ),
        };

        if status.is_success() {
            self.windows.set_grab_seat(window, Some(seat));
            if let Some(seat) = self.devices.seat_mut(seat) {
                seat.set_grabbed(capabilities);
            }
        }

        status
    }

    #[allow(clippy::too_many_arguments)]
    fn seat_grab_masters(
        &mut self,
        backend: &mut dyn DeviceBackend,
        pointer: DeviceId,
        keyboard: DeviceId,
        window: WindowId,
        capabilities: SeatCapabilities,
        owner_events: bool,
        cursor: Option<Cursor>,
        time: u32,
    ) -> GrabStatus {
        let mut status = GrabStatus::Success;

        if capabilities.intersects(SeatCapabilities::ALL_POINTING) {
            // Styli take over the pointer cursor.
            let mut mask = EventMask::empty();
            if capabilities.intersects(SeatCapabilities::POINTER | SeatCapabilities::TABLET_STYLUS) {
                mask |= POINTER_EVENTS;
            }
            if capabilities.contains(SeatCapabilities::TOUCH) {
                mask |= TOUCH_EVENTS;
            }

            status = self.device_grab(
                backend,
                pointer,
                window,
                GrabOwnership::None,
                owner_events,
                mask,
                cursor.clone(),
                time,
            );
        }

        if status.is_success() && capabilities.contains(SeatCapabilities::KEYBOARD) {
            status = self.device_grab(
                backend,
                keyboard,
                window,
                GrabOwnership::None,
                owner_events,
                KEYBOARD_EVENTS,
                cursor,
                time,
            );

            if !status.is_success() && capabilities != SeatCapabilities::KEYBOARD {
                self.device_ungrab(backend, pointer, time);
            }
        }

        status
    }

    /// Releases a seat grab; afterwards no master of the seat has a grab in
    /// effect.
    pub fn seat_ungrab(&mut self, backend: &mut dyn DeviceBackend, seat: SeatId) {
        let Some(seat_ref) = self.devices.seat(seat) else {
            return;
        };
        let mut masters = seat_ref.get_master_pointers(SeatCapabilities::ALL_POINTING);
        masters.push(seat_ref.keyboard());
        let grabbed = seat_ref.grabbed();
        let window = masters
            .iter()
            .find_map(|master| self.device_grab_info(*master))
            .map(|(window, _)| window);

        if !backend.seat_ungrab(self, seat) {
            let time = self.last_event_time;
            for master in &masters {
                if self.get_last_device_grab(*master).is_some() {
                    self.device_ungrab(backend, *master, time);
                }
            }
        }

        // Whatever the backend did, end the stacks synchronously.
        let serial = self.serial;
        for master in masters {
            if self.has_device_grab(master, serial).is_some() {
                self.end_device_grab(master, serial, None, false);
                self.device_grab_update(&*backend, master, None, serial);
            }
        }

        if let Some(window) = window {
            self.windows.set_grab_seat(window, None);
        }

        if !grabbed.is_empty() {
            if let Some(seat) = self.devices.seat_mut(seat) {
                seat.set_grabbed(SeatCapabilities::empty());
            }
        }
    }
}

/// Whether server time `a` is later than `b`, allowing for wrap-around.
fn time_is_later(a: u32, b: u32) -> bool {
    (a > b && a - b < u32::MAX / 2) || (a < b && b - a > u32::MAX / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixture::Fixture;

    #[test]
    fn native_mask_forces_crossing_bits() {
        let mask = native_grab_mask(EventMask::KEY_PRESS | EventMask::BUTTON1_MOTION);
        assert!(mask.contains(EventMask::ENTER_NOTIFY | EventMask::KEY_PRESS));
        assert!(!mask.contains(EventMask::BUTTON1_MOTION));
    }

    #[test]
    fn wrapped_time_is_later() {
        assert!(time_is_later(10, u32::MAX - 10));
        assert!(!time_is_later(u32::MAX - 10, 10));
        assert!(time_is_later(200, 100));
    }

    #[test]
    fn seat_grab_and_ungrab() {
        let mut f = Fixture::new();
        let (seat, pointer, keyboard, child) = (f.seat, f.pointer, f.keyboard, f.child);
        let backend = f.backend();

        let status = f.display.seat_grab(
            &mut *backend.borrow_mut(),
            seat,
            child,
            SeatCapabilities::ALL,
            false,
            None,
            5,
            None,
        );
        assert_eq!(status, GrabStatus::Success);
        assert!(f.display.device_is_grabbed(pointer));
        assert!(f.display.device_is_grabbed(keyboard));
        assert_eq!(
            f.display.devices().seat(seat).unwrap().grabbed(),
            SeatCapabilities::ALL
        );

        f.display.seat_ungrab(&mut *backend.borrow_mut(), seat);
        let now = f.display.serial();
        assert!(f.display.has_device_grab(pointer, now).is_none());
        assert!(f.display.has_device_grab(keyboard, now).is_none());
    }

    #[test]
    fn keyboard_failure_rolls_back_pointer() {
        let mut f = Fixture::new();
        let (seat, pointer, keyboard, child) = (f.seat, f.pointer, f.keyboard, f.child);
        let backend = f.backend();
        backend
            .borrow_mut()
            .grab_results
            .insert(keyboard, GrabStatus::AlreadyGrabbed);

        let status = f.display.seat_grab(
            &mut *backend.borrow_mut(),
            seat,
            child,
            SeatCapabilities::ALL,
            false,
            None,
            5,
            None,
        );
        assert_eq!(status, GrabStatus::AlreadyGrabbed);
        let now = f.display.serial();
        assert!(f.display.has_device_grab(pointer, now).is_none());
    }

    #[test]
    fn prepare_must_show_window() {
        let mut f = Fixture::new();
        let (seat, child) = (f.seat, f.child);
        let backend = f.backend();
        f.tree.borrow_mut().set_visible(child, false);

        let mut prepare = |_: &mut Display, _: WindowId| ();
        let status = f.display.seat_grab(
            &mut *backend.borrow_mut(),
            seat,
            child,
            SeatCapabilities::POINTER,
            false,
            None,
            5,
            Some(&mut prepare as PrepareFn<'_>),
        );
        assert_eq!(status, GrabStatus::NotViewable);
    }

    #[test]
    fn hidden_window_is_not_viewable() {
        let mut f = Fixture::new();
        let (seat, pointer, child) = (f.seat, f.pointer, f.child);
        let backend = f.backend();
        f.tree.borrow_mut().set_visible(child, false);

        let status = f.display.seat_grab(
            &mut *backend.borrow_mut(),
            seat,
            child,
            SeatCapabilities::POINTER,
            false,
            None,
            5,
            None,
        );
        assert_eq!(status, GrabStatus::NotViewable);
        assert!(!f.display.device_is_grabbed(pointer));
        assert!(f.display.devices().seat(seat).unwrap().grabbed().is_empty());
    }

    #[test]
    fn prepare_can_show_window() {
        let mut f = Fixture::new();
        let (seat, pointer, child) = (f.seat, f.pointer, f.child);
        let backend = f.backend();
        let tree = f.tree.clone();
        tree.borrow_mut().set_visible(child, false);

        let mut prepare = |_: &mut Display, window: WindowId| {
            tree.borrow_mut().set_visible(window, true);
        };
        let status = f.display.seat_grab(
            &mut *backend.borrow_mut(),
            seat,
            child,
            SeatCapabilities::POINTER,
            false,
            None,
            5,
            Some(&mut prepare as PrepareFn<'_>),
        );
        assert_eq!(status, GrabStatus::Success);
        assert!(f.display.device_is_grabbed(pointer));
    }
}

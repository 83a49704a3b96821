//! Selection ownership notifications.
//!
//! Content negotiation lives elsewhere; the input core only tells the focused
//! window that a selection changed hands.

use tracing::{debug, trace};

use crate::device::DeviceId;
use crate::display::Display;
use crate::event::{Event, EventData, EventType, OwnerChange, OwnerChangeEvent};
use crate::window::WindowId;

/// The clipboard.
pub const CLIPBOARD: &str = "CLIPBOARD";
/// The primary selection.
pub const PRIMARY: &str = "PRIMARY";

/// One owner change, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerChangeInfo {
    pub selection: String,
    pub owner: Option<WindowId>,
    pub reason: OwnerChange,
    pub time: u32,
    pub selection_time: u32,
}

impl OwnerChangeInfo {
    /// A new owner whose identity the server does not reveal.
    pub fn new_owner(selection: impl Into<String>) -> Self {
        Self {
            selection: selection.into(),
            owner: None,
            reason: OwnerChange::NewOwner,
            time: 0,
            selection_time: 0,
        }
    }
}

impl Display {
    /// Queues an OwnerChange event on `window`.
    pub fn emit_owner_change(
        &mut self,
        window: WindowId,
        device: DeviceId,
        source_device: Option<DeviceId>,
        info: OwnerChangeInfo,
    ) {
        debug!("{} changed owner ({:?})", info.selection, info.reason);

        let seat = self.devices().device(device).and_then(|device| device.seat());
        let event = Event::new(
            EventType::OwnerChange,
            Some(window),
            EventData::OwnerChange(OwnerChangeEvent {
                owner: info.owner,
                reason: info.reason,
                selection: info.selection,
                time: info.time,
                selection_time: info.selection_time,
            }),
        )
        .with_devices(device, source_device)
        .with_seat(seat);
        self.put_event(event);
    }
}

/// Owner changes held back until a keyboard focus exists to receive them.
///
/// Only the latest change is kept.
#[derive(Debug, Default)]
pub struct PendingSelection {
    pending: Option<OwnerChangeInfo>,
}

impl PendingSelection {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Delivers `info` to `focus`, or stashes it when nothing has the
    /// keyboard focus.
    pub fn notify(
        &mut self,
        display: &mut Display,
        focus: Option<WindowId>,
        device: DeviceId,
        source_device: Option<DeviceId>,
        info: OwnerChangeInfo,
    ) {
        match focus {
            Some(window) => display.emit_owner_change(window, device, source_device, info),
            None => {
                trace!("no keyboard focus, holding {} owner change", info.selection);
                self.pending = Some(info);
            }
        }
    }

    /// Re-emits a stashed change on the window that just gained focus.
    pub fn focus_in(
        &mut self,
        display: &mut Display,
        window: WindowId,
        device: DeviceId,
        source_device: Option<DeviceId>,
    ) {
        if let Some(info) = self.pending.take() {
            display.emit_owner_change(window, device, source_device, info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixture::Fixture;

    #[test]
    fn stashed_until_focus_in() {
        let mut f = Fixture::new();
        let (top, keyboard) = (f.toplevel, f.keyboard);
        let mut pending = PendingSelection::default();

        pending.notify(
            &mut f.display,
            None,
            keyboard,
            None,
            OwnerChangeInfo::new_owner(PRIMARY),
        );
        pending.notify(
            &mut f.display,
            None,
            keyboard,
            None,
            OwnerChangeInfo::new_owner(CLIPBOARD),
        );
        assert!(pending.is_pending());
        assert!(!f.display.has_pending());

        pending.focus_in(&mut f.display, top, keyboard, None);
        assert!(!pending.is_pending());

        let events = f.display.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].window, Some(top));
        assert_eq!(events[0].seat, Some(f.seat));
        let EventData::OwnerChange(change) = &events[0].data else {
            panic!("expected an owner change");
        };
        assert_eq!(change.selection, CLIPBOARD);
        assert_eq!(change.reason, OwnerChange::NewOwner);

        pending.focus_in(&mut f.display, top, keyboard, None);
        assert!(!f.display.has_pending());
    }

    #[test]
    fn focused_window_gets_it_directly() {
        let mut f = Fixture::new();
        let (child, keyboard) = (f.child, f.keyboard);
        let mut pending = PendingSelection::default();

        let info = OwnerChangeInfo {
            owner: Some(WindowId(77)),
            reason: OwnerChange::Destroy,
            time: 5,
            selection_time: 3,
            ..OwnerChangeInfo::new_owner(CLIPBOARD)
        };
        pending.notify(&mut f.display, Some(child), keyboard, None, info);

        let event = f.display.get_event().unwrap();
        assert_eq!(event.kind, EventType::OwnerChange);
        assert_eq!(event.time(), 5);
        assert!(!pending.is_pending());
    }
}

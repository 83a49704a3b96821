//! The window tree as seen by the input core.
//!
//! Windows are owned by the windowing layer. The core refers to them by
//! [`WindowId`] and asks the tree about their relations and geometry.

use crate::device::DeviceId;
use crate::event::EventMask;
use crate::seat::SeatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowType {
    Root,
    Toplevel,
    Child,
    /// Override-redirect popup.
    Temp,
    /// Window owned by another client.
    Foreign,
    /// Window rendered off-screen and embedded elsewhere.
    Offscreen,
    Subsurface,
}

pub trait WindowTree {
    fn root(&self) -> WindowId;

    /// `None` for windows the tree does not know.
    fn window_type(&self, window: WindowId) -> Option<WindowType>;

    fn parent(&self, window: WindowId) -> Option<WindowId>;

    /// The embedder of an offscreen window.
    fn offscreen_embedder(&self, window: WindowId) -> Option<WindowId> {
        let _ = window;
        None
    }

    fn is_destroyed(&self, window: WindowId) -> bool;

    /// Mapped, with every ancestor mapped.
    fn is_viewable(&self, window: WindowId) -> bool;

    /// Mapped.
    fn is_visible(&self, window: WindowId) -> bool {
        self.is_viewable(window)
    }

    /// Whether the window has its own native surface.
    fn has_native(&self, window: WindowId) -> bool {
        matches!(
            self.window_type(window),
            Some(WindowType::Root | WindowType::Toplevel | WindowType::Temp | WindowType::Foreign)
        )
    }

    /// Window-relative point converted to root coordinates.
    fn root_coords(&self, window: WindowId, x: f64, y: f64) -> (f64, f64);

    /// Deepest descendant of `window` containing the window-relative point,
    /// with the point converted to that descendant.
    fn find_descendant_at(&self, window: WindowId, x: f64, y: f64) -> (WindowId, f64, f64);

    fn size(&self, window: WindowId) -> (i32, i32);

    fn screen_size(&self) -> (i32, i32);

    fn event_mask(&self, window: WindowId) -> EventMask;

    /// Event mask selected for one device, defaulting to the window mask.
    fn device_event_mask(&self, window: WindowId, device: DeviceId) -> EventMask {
        let _ = device;
        self.event_mask(window)
    }

    /// Records the seat currently grabbing through `window`.
    fn set_grab_seat(&mut self, window: WindowId, seat: Option<SeatId>) {
        let _ = (window, seat);
    }

    fn inhibit_shortcuts(&mut self, window: WindowId, seat: SeatId) {
        let _ = (window, seat);
    }

    fn restore_shortcuts(&mut self, window: WindowId, seat: SeatId) {
        let _ = (window, seat);
    }

    // =========================================================================
    // Derived queries
    // =========================================================================

    /// The toplevel containing `window`, or the window itself when it is a
    /// toplevel or the root.
    fn toplevel(&self, window: WindowId) -> WindowId {
        let mut current = window;
        loop {
            match self.window_type(current) {
                Some(WindowType::Child | WindowType::Subsurface) => (),
                _ => return current,
            }
            match self.parent(current) {
                Some(parent) if self.window_type(parent) != Some(WindowType::Root) => {
                    current = parent
                }
                _ => return current,
            }
        }
    }

    /// Parent in the event hierarchy: offscreen windows propagate to their
    /// embedder.
    fn event_parent(&self, window: WindowId) -> Option<WindowId> {
        match self.window_type(window) {
            Some(WindowType::Offscreen) => self
                .offscreen_embedder(window)
                .or_else(|| self.parent(window)),
            _ => self.parent(window),
        }
    }

    /// Whether `parent` is `child` or an ancestor of it in the event
    /// hierarchy.
    fn is_event_parent_of(&self, parent: WindowId, child: WindowId) -> bool {
        let mut current = Some(child);
        while let Some(window) = current {
            if window == parent {
                return true;
            }
            current = self.event_parent(window);
        }
        false
    }

    /// Closest window that is an event parent of both `a` and `b`.
    fn common_event_ancestor(&self, a: WindowId, b: WindowId) -> Option<WindowId> {
        let mut current = Some(a);
        while let Some(window) = current {
            if self.is_event_parent_of(window, b) {
                return Some(window);
            }
            current = self.event_parent(window);
        }
        None
    }

    /// Whether `ancestor` is a strict ancestor of `window`.
    fn is_ancestor(&self, ancestor: WindowId, window: WindowId) -> bool {
        let mut current = self.parent(window);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// The native toplevel that receives events for `window`, following
    /// offscreen windows to their embedders. `None` when the chain ends in a
    /// missing, destroyed or unviewable embedder.
    fn native_toplevel(&self, window: WindowId) -> Option<WindowId> {
        let mut native = self.toplevel(window);

        while self.window_type(native) == Some(WindowType::Offscreen) {
            let embedder = self.offscreen_embedder(native)?;
            if !self.has_native(embedder) && !self.is_viewable(embedder) {
                return None;
            }
            native = self.toplevel(embedder);
        }

        if self.is_destroyed(native) {
            return None;
        }

        Some(native)
    }

    /// Converts a point relative to `from` into coordinates relative to `to`.
    fn translate_coords(&self, from: WindowId, to: WindowId, x: f64, y: f64) -> (f64, f64) {
        if from == to {
            return (x, y);
        }
        let (root_x, root_y) = self.root_coords(from, x, y);
        let (origin_x, origin_y) = self.root_coords(to, 0., 0.);
        (root_x - origin_x, root_y - origin_y)
    }
}

//! Scoped trapping of asynchronous protocol errors.
//!
//! Protocol errors arrive some time after the request that caused them. A trap
//! remembers the range of request serials issued while it was pushed; errors
//! whose serial falls into that range are recorded on the trap instead of
//! being reported. [`push_error_trap`] returns a guard that pops the trap when
//! dropped, so an early return cannot leave a trap behind.

use std::ops::{Deref, DerefMut};

use tracing::{error, trace, warn};

/// A connection whose errors can be trapped.
pub trait TrapDisplay {
    fn error_traps(&mut self) -> &mut ErrorTraps;

    /// Serial the next request will carry.
    fn next_request(&self) -> u64;

    /// Serial of the last request the server is known to have processed.
    fn last_processed(&self) -> u64;

    /// Round-trips to the server, so that errors for every request sent so
    /// far have been received.
    fn sync(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Trap {
    start: u64,
    /// Set once popped. An ignored trap stays around until the server has
    /// processed its last request, so late errors still land on it.
    end: Option<u64>,
    error_code: Option<u8>,
}

impl Trap {
    fn covers(&self, serial: u64) -> bool {
        serial >= self.start && self.end.map_or(true, |end| serial < end)
    }
}

/// Trap records of one connection, oldest first.
#[derive(Debug, Default)]
pub struct ErrorTraps {
    traps: Vec<Trap>,
}

impl ErrorTraps {
    /// Whether any trap is still pushed.
    pub fn is_active(&self) -> bool {
        self.traps.iter().any(|trap| trap.end.is_none())
    }

    /// Records an error for request `serial` on the innermost trap covering
    /// it. Returns `false` when no trap does, so the caller can report it.
    pub fn record(&mut self, serial: u64, error_code: u8) -> bool {
        let Some(trap) = self.traps.iter_mut().rev().find(|trap| trap.covers(serial)) else {
            return false;
        };
        trace!("trapped protocol error {error_code} for request {serial}");
        trap.error_code = Some(error_code);
        true
    }

    /// Forgets popped traps whose requests have all been processed.
    pub fn delete_outdated(&mut self, last_processed: u64) {
        self.traps
            .retain(|trap| trap.end.map_or(true, |end| end > last_processed + 1));
    }

    fn push(&mut self, start: u64) {
        self.traps.push(Trap {
            start,
            end: None,
            error_code: None,
        });
    }

    fn innermost(&self) -> Option<usize> {
        self.traps.iter().rposition(|trap| trap.end.is_none())
    }
}

/// Handles a protocol error reported by the connection. Errors outside every
/// trap are logged.
pub fn handle_error<D: TrapDisplay + ?Sized>(display: &mut D, serial: u64, error_code: u8) {
    let last_processed = display.last_processed();
    let traps = display.error_traps();
    traps.delete_outdated(last_processed);
    if !traps.record(serial, error_code) {
        error!("unhandled protocol error {error_code} for request {serial}");
    }
}

/// Pushes a trap on `display`. All requests issued through the returned guard
/// until it is popped belong to the trap.
pub fn push_error_trap<D: TrapDisplay + ?Sized>(display: &mut D) -> ErrorTrap<'_, D> {
    let start = display.next_request();
    let last_processed = display.last_processed();
    let traps = display.error_traps();
    traps.delete_outdated(last_processed);
    traps.push(start);

    ErrorTrap {
        display,
        popped: false,
    }
}

/// A pushed trap. Derefs to the display so requests can be issued while the
/// trap is in place.
pub struct ErrorTrap<'a, D: TrapDisplay + ?Sized> {
    display: &'a mut D,
    popped: bool,
}

impl<D: TrapDisplay + ?Sized> ErrorTrap<'_, D> {
    /// Pops the trap and returns the last error code reported for its
    /// requests. Round-trips once if some of them are still unanswered.
    pub fn pop(mut self) -> Option<u8> {
        self.finish(true)
    }

    /// Pops the trap without waiting for the server. Errors reported later
    /// for its requests are dropped silently.
    pub fn pop_ignored(mut self) {
        self.finish(false);
    }

    fn finish(&mut self, need_code: bool) -> Option<u8> {
        if self.popped {
            return None;
        }
        self.popped = true;

        let end = self.display.next_request();
        let Some(index) = self.display.error_traps().innermost() else {
            warn!("no error trap to pop");
            return None;
        };
        self.display.error_traps().traps[index].end = Some(end);

        if !need_code {
            return None;
        }

        // Requests in [start, end) not processed yet may still error out.
        if self.display.last_processed() + 1 < end {
            self.display.sync();
        }

        let traps = self.display.error_traps();
        let index = traps.traps.iter().position(|trap| trap.end == Some(end))?;
        traps.traps.remove(index).error_code
    }
}

impl<D: TrapDisplay + ?Sized> Deref for ErrorTrap<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.display
    }
}

impl<D: TrapDisplay + ?Sized> DerefMut for ErrorTrap<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.display
    }
}

impl<D: TrapDisplay + ?Sized> Drop for ErrorTrap<'_, D> {
    fn drop(&mut self) {
        self.finish(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Connection where every request is answered on `sync`, and errors are
    /// scheduled ahead of time per request serial.
    #[derive(Default)]
    struct Conn {
        traps: ErrorTraps,
        next: u64,
        processed: u64,
        failing: Vec<(u64, u8)>,
        syncs: usize,
    }

    impl Conn {
        fn request(&mut self, error_code: Option<u8>) -> u64 {
            self.next += 1;
            if let Some(code) = error_code {
                self.failing.push((self.next, code));
            }
            self.next
        }
    }

    impl TrapDisplay for Conn {
        fn error_traps(&mut self) -> &mut ErrorTraps {
            &mut self.traps
        }

        fn next_request(&self) -> u64 {
            self.next + 1
        }

        fn last_processed(&self) -> u64 {
            self.processed
        }

        fn sync(&mut self) {
            self.syncs += 1;
            // The sync request itself.
            self.next += 1;
            for (serial, code) in std::mem::take(&mut self.failing) {
                handle_error(self, serial, code);
            }
            self.processed = self.next;
        }
    }

    #[test]
    fn pop_returns_last_error() {
        let mut conn = Conn::default();

        let mut trap = push_error_trap(&mut conn);
        trap.request(Some(3));
        trap.request(None);
        trap.request(Some(8));
        assert_eq!(trap.pop(), Some(8));
        assert_eq!(conn.syncs, 1);
        assert!(!conn.traps.is_active());
    }

    #[test]
    fn clean_region_returns_none() {
        let mut conn = Conn::default();

        let mut trap = push_error_trap(&mut conn);
        trap.request(None);
        assert_eq!(trap.pop(), None);
    }

    #[test]
    fn no_sync_when_everything_is_processed() {
        let mut conn = Conn::default();
        conn.request(None);
        conn.processed = conn.next;

        let trap = push_error_trap(&mut conn);
        assert_eq!(trap.pop(), None);
        assert_eq!(conn.syncs, 0);
    }

    #[test]
    fn nested_traps_keep_their_own_errors() {
        let mut conn = Conn::default();

        let mut outer = push_error_trap(&mut conn);
        outer.request(Some(2));
        {
            let mut inner = push_error_trap(&mut *outer);
            inner.request(Some(9));
            assert_eq!(inner.pop(), Some(9));
        }
        assert_eq!(outer.pop(), Some(2));
    }

    #[test]
    fn dropped_guard_swallows_late_errors() {
        let mut conn = Conn::default();

        {
            let mut trap = push_error_trap(&mut conn);
            trap.request(Some(5));
        }
        assert_eq!(conn.syncs, 0);
        assert!(!conn.traps.is_active());

        // The error arrives after the pop; it still belongs to the trap.
        conn.sync();
        assert_eq!(conn.syncs, 1);

        // Once processed, the ignored trap is forgotten.
        conn.traps.delete_outdated(conn.processed);
        assert!(conn.traps.traps.is_empty());
    }

    #[test]
    fn untrapped_error_is_not_recorded() {
        let mut traps = ErrorTraps::default();
        assert!(!traps.record(4, 1));

        traps.push(10);
        assert!(!traps.record(4, 1));
        assert!(traps.record(10, 1));
    }
}

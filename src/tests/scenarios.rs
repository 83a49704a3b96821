use proptest::prelude::*;
use proptest_derive::Arbitrary;

use super::fixture::{kinds, motion, press, release, Fixture};
use crate::device::{Device, DeviceId, DeviceType, InputMode, InputSource};
use crate::device_manager::DeviceManager;
use crate::display::GrabOwnership;
use crate::event::{EventMask, EventType, ModifierType};
use crate::window::WindowId;

#[test]
fn implicit_grab_follows_the_press() {
    let mut f = Fixture::new();
    let (pointer, top, w) = (f.pointer, f.toplevel, f.child);
    f.tree
        .borrow_mut()
        .set_mask(w, EventMask::BUTTON_PRESS | EventMask::POINTER_MOTION);
    let w2 = f.add_child(WindowId(30), top, (60., 0.), (40., 40.));

    let ev = press(&f, w, 1, 100, (5., 5.));
    f.process(ev);
    let serial = f.display.serial();

    let grab = f.display.has_device_grab(pointer, serial).unwrap().clone();
    assert!(grab.implicit);
    assert_eq!(grab.window, w);
    assert_eq!(grab.serial_start, serial);
    assert_eq!(grab.time, 100);
    assert!(grab
        .event_mask
        .contains(EventMask::POINTER_MOTION | EventMask::BUTTON_RELEASE));
    assert_eq!(kinds(&f.display.drain_events()), [EventType::ButtonPress]);

    let ev = motion(&f, w2, 110, (5., 5.), ModifierType::BUTTON1);
    f.process(ev);
    let events = f.display.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].window, Some(w));
    assert_eq!(events[0].coords(), Some((55., -5.)));

    let (x, y) = f.root_of(w2, 5., 5.);
    f.backend().borrow_mut().set_position(x, y);
    let ev = release(&f, w2, 1, 120, (5., 5.));
    f.process(ev);
    let events = f.display.drain_events();
    assert_eq!(
        kinds(&events),
        [EventType::ButtonRelease, EventType::EnterNotify]
    );
    assert_eq!(events[0].window, Some(w));
    assert_eq!(events[1].window, Some(w2));
    assert!(f.display.has_device_grab(pointer, f.display.serial()).is_none());

    let ev = motion(&f, w2, 130, (6., 5.), ModifierType::empty());
    f.process(ev);
    let events = f.display.drain_events();
    assert_eq!(events[0].window, Some(w2));
    assert_eq!(events[0].coords(), Some((6., 5.)));
}

#[test]
fn withdrawn_grab_window_breaks_the_grab() {
    let mut f = Fixture::new();
    let (pointer, w) = (f.pointer, f.child);
    let backend = f.backend();

    let status = f.display.device_grab(
        &mut *backend.borrow_mut(),
        pointer,
        w,
        GrabOwnership::None,
        false,
        EventMask::ALL_EVENTS,
        None,
        10,
    );
    assert!(status.is_success());

    f.display.withdraw_window(&*backend.borrow(), w);
    f.tree.borrow_mut().destroy(w);

    let events = f.display.drain_events();
    let broken: Vec<_> = events.iter().filter_map(|ev| ev.grab_broken()).collect();
    assert_eq!(broken.len(), 1);
    assert!(!broken[0].implicit);
    assert_eq!(broken[0].grab_window, None);
    assert_eq!(events[0].window, Some(w));

    let ev = motion(&f, w, 20, (1., 1.), ModifierType::empty());
    f.process(ev);
    assert!(!f.display.has_pending());
}

#[test]
fn double_click_timing() {
    let mut f = Fixture::new();
    let w = f.child;

    for (time, is_press) in [(100, true), (120, false), (340, true), (360, false), (900, true)] {
        let ev = if is_press {
            press(&f, w, 1, time, (5., 5.))
        } else {
            release(&f, w, 1, time, (5., 5.))
        };
        f.process(ev);
    }

    assert_eq!(
        kinds(&f.display.drain_events()),
        [
            EventType::ButtonPress,
            EventType::ButtonRelease,
            EventType::ButtonPress,
            EventType::DoubleButtonPress,
            EventType::ButtonRelease,
            EventType::ButtonPress,
        ]
    );
}

#[test]
fn triple_click_sequence() {
    let mut f = Fixture::new();
    let w = f.child;

    for time in [100, 200, 300] {
        let ev = press(&f, w, 1, time, (5., 5.));
        f.process(ev);
        let ev = release(&f, w, 1, time + 20, (5., 5.));
        f.process(ev);
    }

    assert_eq!(
        kinds(&f.display.drain_events()),
        [
            EventType::ButtonPress,
            EventType::ButtonRelease,
            EventType::ButtonPress,
            EventType::DoubleButtonPress,
            EventType::ButtonRelease,
            EventType::ButtonPress,
            EventType::TripleButtonPress,
            EventType::ButtonRelease,
        ]
    );
}

#[test]
fn grab_crossings_name_window_under_pointer_and_grab_window() {
    let mut f = Fixture::new();
    let (pointer, top, child) = (f.pointer, f.toplevel, f.child);
    let other = f.add_child(WindowId(30), top, (60., 0.), (40., 40.));
    let backend = f.backend();

    // Put the pointer inside the child.
    let ev = motion(&f, child, 5, (5., 5.), ModifierType::empty());
    f.process(ev);
    f.display.drain_events();
    f.display
        .pointer_info_mut(pointer)
        .window_under_pointer = Some(child);

    f.display.device_grab(
        &mut *backend.borrow_mut(),
        pointer,
        other,
        GrabOwnership::None,
        false,
        EventMask::ALL_EVENTS,
        None,
        10,
    );
    let ev = motion(&f, child, 11, (6., 5.), ModifierType::empty());
    f.process(ev);

    let events = f.display.drain_events();
    let leave = events
        .iter()
        .find(|ev| ev.kind == EventType::LeaveNotify)
        .unwrap();
    let enter = events
        .iter()
        .find(|ev| ev.kind == EventType::EnterNotify)
        .unwrap();
    assert_eq!(leave.window, Some(child));
    assert_eq!(enter.window, Some(other));
}

// =============================================================================
// Device hierarchy
// =============================================================================

#[derive(Debug, Clone, Arbitrary)]
enum HierarchyOp {
    Attach(
        #[proptest(strategy = "0usize..4")] usize,
        #[proptest(strategy = "0usize..4")] usize,
    ),
    Detach(#[proptest(strategy = "0usize..4")] usize),
    RemoveMaster(#[proptest(strategy = "0usize..4")] usize),
    RemoveSlave(#[proptest(strategy = "0usize..4")] usize),
}

fn hierarchy() -> (DeviceManager, Vec<DeviceId>, Vec<DeviceId>) {
    let mut manager = DeviceManager::new();
    let mut masters = Vec::new();
    for (i, source) in [
        InputSource::Mouse,
        InputSource::Keyboard,
        InputSource::Mouse,
        InputSource::Keyboard,
    ]
    .into_iter()
    .enumerate()
    {
        let id = DeviceId(10 + i as u32);
        masters.push(manager.add_device(Device::new(
            id,
            format!("master {i}"),
            DeviceType::Master,
            source,
            InputMode::Screen,
            source != InputSource::Keyboard,
        )));
    }
    manager.create_seat(masters[0], masters[1]);
    manager.create_seat(masters[2], masters[3]);

    let slaves = (0..4)
        .map(|i| {
            manager.add_device(Device::new(
                DeviceId(20 + i),
                format!("slave {i}"),
                DeviceType::Floating,
                InputSource::Mouse,
                InputMode::Screen,
                false,
            ))
        })
        .collect();
    (manager, masters, slaves)
}

fn check_hierarchy(manager: &DeviceManager) -> Result<(), TestCaseError> {
    for device in manager.devices() {
        match device.device_type() {
            DeviceType::Master => {
                for slave in device.list_slave_devices() {
                    let slave = manager.device(*slave);
                    prop_assert!(slave.is_some());
                    let slave = slave.unwrap();
                    prop_assert_eq!(slave.device_type(), DeviceType::Slave);
                    prop_assert_eq!(slave.associated_device(), Some(device.id()));
                }
            }
            DeviceType::Slave => {
                let master = device.associated_device().and_then(|id| manager.device(id));
                prop_assert!(master.is_some_and(|m| m.list_slave_devices().contains(&device.id())));
            }
            DeviceType::Floating => {
                prop_assert_eq!(device.associated_device(), None);
                prop_assert!(!manager
                    .devices()
                    .any(|m| m.list_slave_devices().contains(&device.id())));
            }
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn hierarchy_stays_consistent(ops in prop::collection::vec(any::<HierarchyOp>(), 0..32)) {
        let (mut manager, masters, slaves) = hierarchy();

        for op in ops {
            match op {
                HierarchyOp::Attach(slave, master) => {
                    manager.attach_slave(slaves[slave], masters[master]);
                }
                HierarchyOp::Detach(slave) => {
                    manager.detach_slave(slaves[slave]);
                }
                HierarchyOp::RemoveMaster(master) => {
                    manager.remove_device(masters[master]);
                }
                HierarchyOp::RemoveSlave(slave) => {
                    manager.remove_device(slaves[slave]);
                }
            }
            check_hierarchy(&manager)?;
        }
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Integration tests for the named inter-process mutex: creator/attacher
// behavior, segment persistence across close, destroy, mutual exclusion
// and owner-death recovery.
//
// POSIX-only: the Windows backend has handle-counted lifetime, so the
// persistence properties below do not hold there.
#![cfg(unix)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use named_mutex::{Error, NamedMutex};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/nmtx_{prefix}_{}_{n}", std::process::id())
}

#[test]
fn init_creates_and_is_valid() {
    let name = unique_name("init");
    NamedMutex::remove_storage(&name);

    let mut m = NamedMutex::init(&name);
    assert!(m.is_valid());
    assert!(m.was_creator());
    assert!(m.init_error().is_none());
    assert_eq!(m.name(), name);

    m.destroy().expect("destroy");
    assert!(!m.is_valid());
}

// Mapping the same mutex more than once in one process EINVALs on macOS
// (pthread internals there are address-relative), so the multi-handle tests
// below are gated off macOS.
#[cfg(not(target_os = "macos"))]
#[test]
fn second_init_attaches_and_contends() {
    let name = unique_name("attach");
    NamedMutex::remove_storage(&name);

    let a = NamedMutex::init(&name);
    assert!(a.was_creator());
    let b = NamedMutex::init(&name);
    assert!(b.is_valid());
    assert!(!b.was_creator());

    // a holds the lock; b must not get it until a releases.
    a.lock().expect("lock a");

    let entered = Arc::new(AtomicBool::new(false));
    let entered_t = Arc::clone(&entered);
    let t = thread::spawn(move || {
        b.lock().expect("lock b");
        entered_t.store(true, Ordering::SeqCst);
        b.unlock().expect("unlock b");
    });

    thread::sleep(Duration::from_millis(100));
    assert!(
        !entered.load(Ordering::SeqCst),
        "b acquired the lock while a still held it"
    );

    a.unlock().expect("unlock a");
    t.join().unwrap();
    assert!(entered.load(Ordering::SeqCst));

    let mut a = a;
    a.destroy().expect("destroy");
}

#[cfg(not(target_os = "macos"))]
#[test]
fn close_then_reinit_attaches() {
    let name = unique_name("reattach");
    NamedMutex::remove_storage(&name);

    let mut a = NamedMutex::init(&name);
    assert!(a.was_creator());
    a.close().expect("close");
    assert!(!a.is_valid());

    // The segment persists: the second init finds it and does not re-create.
    let mut b = NamedMutex::init(&name);
    assert!(b.is_valid());
    assert!(!b.was_creator());

    b.lock().expect("lock after reattach");
    b.unlock().expect("unlock after reattach");
    b.destroy().expect("destroy");
}

#[cfg(not(target_os = "macos"))]
#[test]
fn lock_held_across_close_is_observed_after_reinit() {
    let name = unique_name("held_close");
    NamedMutex::remove_storage(&name);

    let mut a = NamedMutex::init(&name);
    assert!(a.was_creator());
    a.lock().expect("lock a");
    a.close().expect("close a");
    assert!(!a.is_valid());

    // Re-attach: the lock taken through a must still be held.
    let b = NamedMutex::init(&name);
    assert!(b.is_valid());
    assert!(!b.was_creator());

    let entered = Arc::new(AtomicBool::new(false));
    let entered_t = Arc::clone(&entered);
    let name_t = name.clone();
    let t = thread::spawn(move || {
        let c = NamedMutex::init(&name_t);
        assert!(c.is_valid());
        c.lock().expect("lock c");
        entered_t.store(true, Ordering::SeqCst);
        c.unlock().expect("unlock c");
    });

    thread::sleep(Duration::from_millis(200));
    assert!(
        !entered.load(Ordering::SeqCst),
        "lock held before close was lost across re-init"
    );

    // The lock owner is recorded in the shared segment by thread, not by
    // mapping, so this thread can still release it through b.
    b.unlock().expect("unlock through b");
    t.join().unwrap();
    assert!(entered.load(Ordering::SeqCst));

    let mut b = b;
    b.destroy().expect("destroy");
}

#[test]
fn destroy_then_reinit_creates_fresh() {
    let name = unique_name("fresh");
    NamedMutex::remove_storage(&name);

    let mut a = NamedMutex::init(&name);
    assert!(a.was_creator());
    a.destroy().expect("destroy");
    assert!(!a.is_valid());

    let mut b = NamedMutex::init(&name);
    assert!(b.is_valid());
    assert!(b.was_creator(), "destroy must leave nothing to attach to");
    b.destroy().expect("destroy again");
}

#[cfg(not(target_os = "macos"))]
#[test]
fn mutual_exclusion_across_handles() {
    let name = unique_name("mutex");
    NamedMutex::remove_storage(&name);

    // Create before spawning so the unsynchronized first-init never races.
    let mut creator = NamedMutex::init(&name);
    assert!(creator.was_creator());

    let t1_in_cs = Arc::new(AtomicBool::new(false));
    let t2_in_cs = Arc::new(AtomicBool::new(false));
    let violation = Arc::new(AtomicBool::new(false));

    let make_task = |my_flag: Arc<AtomicBool>,
                     other_flag: Arc<AtomicBool>,
                     viol: Arc<AtomicBool>,
                     name: String| {
        thread::spawn(move || {
            let m = NamedMutex::init(&name);
            assert!(m.is_valid());
            for _ in 0..50 {
                m.lock().expect("lock");

                my_flag.store(true, Ordering::SeqCst);
                if other_flag.load(Ordering::SeqCst) {
                    viol.store(true, Ordering::SeqCst);
                }

                thread::sleep(Duration::from_micros(10));

                my_flag.store(false, Ordering::SeqCst);
                m.unlock().expect("unlock");

                thread::yield_now();
            }
        })
    };

    let t1 = make_task(
        Arc::clone(&t1_in_cs),
        Arc::clone(&t2_in_cs),
        Arc::clone(&violation),
        name.clone(),
    );
    let t2 = make_task(
        Arc::clone(&t2_in_cs),
        Arc::clone(&t1_in_cs),
        Arc::clone(&violation),
        name.clone(),
    );

    t1.join().unwrap();
    t2.join().unwrap();

    assert!(
        !violation.load(Ordering::SeqCst),
        "both handles in critical section simultaneously"
    );

    creator.destroy().expect("destroy");
}

// Robust mutexes are disabled on macOS, so owner-death recovery only exists
// on the other Unixes.
#[cfg(not(target_os = "macos"))]
#[test]
fn owner_death_is_recovered() {
    let name = unique_name("robust");
    NamedMutex::remove_storage(&name);

    let m = Arc::new(NamedMutex::init(&name));
    assert!(m.is_valid());

    // The owner thread dies while holding the lock.
    let holder = Arc::clone(&m);
    thread::spawn(move || {
        holder.lock().expect("lock in dying thread");
    })
    .join()
    .unwrap();

    // The next acquisition succeeds instead of hanging, and the mutex is
    // consistent again afterwards.
    m.lock().expect("lock after owner death");
    m.unlock().expect("unlock after recovery");

    m.lock().expect("lock again");
    m.unlock().expect("unlock again");

    let mut m = Arc::try_unwrap(m).ok().expect("sole owner");
    m.destroy().expect("destroy");
}

// Ownership checking on unlock also comes from robustness.
#[cfg(not(target_os = "macos"))]
#[test]
fn unlock_without_holding_is_not_held() {
    let name = unique_name("notheld");
    NamedMutex::remove_storage(&name);

    let mut m = NamedMutex::init(&name);
    assert!(m.is_valid());

    match m.unlock() {
        Err(e @ Error::NotHeld(_)) => {
            assert_eq!(e.raw_os_error(), Some(libc::EPERM));
        }
        other => panic!("expected NotHeld, got {other:?}"),
    }

    m.destroy().expect("destroy");
}

#[test]
fn failed_init_yields_invalid_handle() {
    let m = NamedMutex::init("");
    assert!(!m.is_valid());
    assert!(m.init_error().is_some());

    assert!(matches!(m.lock(), Err(Error::InvalidHandle)));
    assert!(matches!(m.unlock(), Err(Error::InvalidHandle)));

    let mut m = m;
    assert!(matches!(m.destroy(), Err(Error::InvalidHandle)));
}

#[test]
fn oversize_name_fails_init() {
    let name = format!("/{}", "x".repeat(300));
    let m = NamedMutex::init(&name);
    assert!(!m.is_valid());
    let err = m.init_error().expect("recorded error");
    assert!(matches!(err, Error::ResourceUnavailable(_)));
    assert_eq!(err.raw_os_error(), Some(libc::ENAMETOOLONG));
}

#[test]
fn operations_after_close_fail_explicitly() {
    let name = unique_name("closed");
    NamedMutex::remove_storage(&name);

    let mut m = NamedMutex::init(&name);
    assert!(m.is_valid());
    m.close().expect("close");
    assert!(!m.is_valid());

    assert!(matches!(m.lock(), Err(Error::InvalidHandle)));
    assert!(matches!(m.unlock(), Err(Error::InvalidHandle)));

    // Closing again is a no-op, not an error.
    m.close().expect("close again");

    NamedMutex::remove_storage(&name);
}

#[test]
fn lock_cycles_on_one_handle() {
    let name = unique_name("cycles");
    NamedMutex::remove_storage(&name);

    let mut m = NamedMutex::init(&name);
    assert!(m.is_valid());

    for _ in 0..100 {
        m.lock().expect("lock");
        m.unlock().expect("unlock");
    }

    m.destroy().expect("destroy");
}

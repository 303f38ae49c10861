use super::support::{write_entry, Harness};
use cachepatch::coordinator::{RunReport, Trigger};
use cachepatch::events::Event;
use cachepatch::patcher::{LibraryPatcher, PATCHED_MARKER};
use std::fs;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_watcher_and_manual_race_patch_once() {
    let h = Harness::new();
    write_entry(&h.entry("f_000001"), &h.compressed, 5);
    h.coordinator.set_watcher_enabled(true);

    let barrier = Arc::new(Barrier::new(2));
    let watcher = {
        let coordinator = Arc::clone(&h.coordinator);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            coordinator.run(Trigger::Watcher)
        })
    };
    let manual = {
        let coordinator = Arc::clone(&h.coordinator);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            thread::sleep(Duration::from_millis(50));
            coordinator.run(Trigger::Manual {
                force_refresh: false,
            })
        })
    };
    let reports = [watcher.join().unwrap(), manual.join().unwrap()];

    let patched = reports
        .iter()
        .filter(|r| matches!(r, RunReport::Patched(_)))
        .count();
    assert_eq!(patched, 1, "reports: {reports:?}");
    assert!(reports
        .iter()
        .all(|r| matches!(r, RunReport::Patched(_) | RunReport::AlreadyPatched | RunReport::Suppressed)));
    assert_eq!(h.events.notification_count(), 1);
    assert_eq!(fs::read(h.entry("f_000001")).unwrap(), h.patched());
    assert_eq!(h.source.assets(), 1);
    assert!(h.coordinator.watcher_enabled());
}

#[test]
fn test_manual_run_toggles_controls_and_finishes() {
    let h = Harness::new();
    write_entry(&h.entry("f_000001"), &h.compressed, 5);

    h.coordinator.run(Trigger::Manual {
        force_refresh: false,
    });

    let events = h.events.events();
    assert_eq!(events.first(), Some(&Event::Controls(false)));
    let enabled = events
        .iter()
        .position(|e| *e == Event::Controls(true))
        .unwrap();
    let finished = events.iter().position(|e| *e == Event::Finished).unwrap();
    assert!(enabled < finished);
    assert!(h.events.contains("Force scan started."));
}

#[test]
fn test_watcher_trigger_suppressed_during_manual_run() {
    let h = Harness::with_source(|page, body| {
        super::support::FakeSource::new(page, body).with_delay(Duration::from_millis(300))
    });
    write_entry(&h.entry("f_000001"), &h.compressed, 5);
    h.coordinator.set_watcher_enabled(true);

    let manual = {
        let coordinator = Arc::clone(&h.coordinator);
        thread::spawn(move || {
            coordinator.run(Trigger::Manual {
                force_refresh: false,
            })
        })
    };
    thread::sleep(Duration::from_millis(100));
    let watcher_report = h.coordinator.run(Trigger::Watcher);
    let manual_report = manual.join().unwrap();

    assert_eq!(watcher_report, RunReport::Suppressed);
    assert!(matches!(manual_report, RunReport::Patched(_)));
    assert!(h.coordinator.watcher_enabled());
}

#[test]
fn test_library_patched_after_scan() {
    let h = Harness::new();
    let library = h.root.path().join("steamui");
    fs::create_dir_all(library.join("css")).unwrap();
    fs::write(
        library.join("css").join("libraryroot.css"),
        ".library { display: flex; }\n".repeat(50),
    )
    .unwrap();

    let sink: Arc<dyn cachepatch::events::EventSink> = h.events.clone();
    let coordinator = super::support::build_coordinator(
        &h.cache,
        &h.ui,
        Arc::clone(&h.source),
        Arc::clone(&h.host),
        Arc::clone(&h.events),
    )
    .with_library(LibraryPatcher::new(
        &library,
        LibraryPatcher::default_targets(&library, &h.ui, "friends.css"),
        "https://steamloopback.host",
        sink,
    ));
    write_entry(&h.entry("f_000001"), &h.compressed, 5);

    assert!(matches!(
        coordinator.run(Trigger::Manual {
            force_refresh: false
        }),
        RunReport::Patched(_)
    ));
    let root = fs::read_to_string(library.join("css").join("libraryroot.css")).unwrap();
    assert!(root.starts_with(PATCHED_MARKER));
    assert!(library.join("libraryroot.original.css").exists());
}

#[test]
fn test_clear_cache_refused_while_host_runs() {
    let h = Harness::new();
    write_entry(&h.entry("f_000001"), &h.compressed, 5);
    h.host.running.store(true, Ordering::SeqCst);

    assert!(matches!(
        h.coordinator.clear_cache(),
        RunReport::EnvironmentNotReady(_)
    ));
    assert!(h.entry("f_000001").exists());

    h.host.running.store(false, Ordering::SeqCst);
    assert_eq!(h.coordinator.clear_cache(), RunReport::Cleared);
    assert!(!h.cache.exists());
}

#[test]
fn test_clear_cache_removes_patched_library_root() {
    let h = Harness::new();
    let library = h.root.path().join("steamui");
    fs::create_dir_all(library.join("css")).unwrap();
    let root_css = library.join("css").join("libraryroot.css");
    fs::write(&root_css, format!("{PATCHED_MARKER}\n@import url(\"x\");\n")).unwrap();

    let sink: Arc<dyn cachepatch::events::EventSink> = h.events.clone();
    let coordinator = super::support::build_coordinator(
        &h.cache,
        &h.ui,
        Arc::clone(&h.source),
        Arc::clone(&h.host),
        Arc::clone(&h.events),
    )
    .with_library(LibraryPatcher::new(
        &library,
        LibraryPatcher::default_targets(&library, &h.ui, "friends.css"),
        "https://steamloopback.host",
        sink,
    ));

    assert_eq!(coordinator.clear_cache(), RunReport::Cleared);
    assert!(!root_css.exists());
}

#[test]
fn test_network_outage_patches_with_stored_asset() {
    let h = Harness::new();
    h.coordinator.run(Trigger::Manual {
        force_refresh: false,
    });
    assert!(!h.coordinator.store().get().is_empty());

    h.source.fail.store(true, Ordering::SeqCst);
    write_entry(&h.entry("f_000001"), &h.compressed, 5);

    let report = h.coordinator.run(Trigger::Manual {
        force_refresh: true,
    });

    assert!(matches!(report, RunReport::Patched(_)), "{report:?}");
    assert_eq!(fs::read(h.entry("f_000001")).unwrap(), h.patched());
    assert!(h.events.contains("Failed to download stylesheet"));
    assert!(h.events.contains("Using the previously downloaded stylesheet."));
}

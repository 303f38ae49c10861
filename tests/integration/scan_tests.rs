use super::support::{decoy, write_entry, Harness};
use cachepatch::coordinator::{RunReport, Trigger};
use std::fs;
use std::sync::atomic::Ordering;

fn manual() -> Trigger {
    Trigger::Manual {
        force_refresh: false,
    }
}

#[test]
fn test_only_matching_entry_is_patched() {
    let h = Harness::new();
    let n = h.compressed.len();
    assert_ne!(n + 3000, h.patched().len());

    // Newest first: f_000005, f_000004, f_000003 (the match), f_000002, f_000001.
    write_entry(&h.entry("f_000001"), &decoy(n - 1, 1), 50);
    write_entry(&h.entry("f_000002"), &decoy(n, 2), 40);
    write_entry(&h.entry("f_000003"), &h.compressed, 30);
    write_entry(&h.entry("f_000004"), &decoy(n + 3000, 4), 20);
    write_entry(&h.entry("f_000005"), &decoy(n, 5), 10);
    let before: Vec<_> = ["f_000001", "f_000002", "f_000004", "f_000005"]
        .iter()
        .map(|name| fs::read(h.entry(name)).unwrap())
        .collect();

    let report = h.coordinator.run(manual());

    assert_eq!(report, RunReport::Patched(h.entry("f_000003")));
    assert_eq!(fs::read(h.entry("f_000003")).unwrap(), h.patched());
    let after: Vec<_> = ["f_000001", "f_000002", "f_000004", "f_000005"]
        .iter()
        .map(|name| fs::read(h.entry(name)).unwrap())
        .collect();
    assert_eq!(before, after);

    let side = fs::read(h.ui.join("friends.original.css")).unwrap();
    assert_eq!(side, [b"/*8761234*/\n".as_slice(), h.css.as_slice()].concat());
    assert!(h.ui.join("friends.custom.css").exists());
    assert_eq!(h.events.notification_count(), 1);
}

#[test]
fn test_second_run_is_already_patched() {
    let h = Harness::new();
    write_entry(&h.entry("f_00000a"), &h.compressed, 5);

    assert!(matches!(h.coordinator.run(manual()), RunReport::Patched(_)));
    let side_path = h.ui.join("friends.original.css");
    let side_mtime = fs::metadata(&side_path).unwrap().modified().unwrap();
    let entry_mtime = fs::metadata(h.entry("f_00000a")).unwrap().modified().unwrap();

    assert_eq!(h.coordinator.run(manual()), RunReport::AlreadyPatched);

    assert_eq!(fs::read(h.entry("f_00000a")).unwrap(), h.patched());
    assert_eq!(
        fs::metadata(h.entry("f_00000a")).unwrap().modified().unwrap(),
        entry_mtime
    );
    assert_eq!(
        fs::metadata(&side_path).unwrap().modified().unwrap(),
        side_mtime
    );
    assert!(h.events.contains("Cache file is already patched."));
    assert_eq!(h.events.notification_count(), 1);
}

#[test]
fn test_missing_cache_dir_is_environment_not_ready() {
    let h = Harness::new();
    fs::remove_dir_all(&h.cache).unwrap();

    let report = h.coordinator.run(manual());

    assert!(matches!(report, RunReport::EnvironmentNotReady(_)));
    assert!(!h.ui.exists());
    assert!(!h.cache.exists());
}

#[test]
fn test_no_candidates_is_environment_not_ready() {
    let h = Harness::new();
    write_entry(&h.entry("f_000001"), b"tiny", 5);
    write_entry(&h.entry("index"), &h.compressed, 5);

    let report = h.coordinator.run(manual());

    assert!(matches!(report, RunReport::EnvironmentNotReady(_)));
    assert_eq!(fs::read(h.entry("index")).unwrap(), h.compressed);
}

#[test]
fn test_same_length_decoys_are_not_found() {
    let h = Harness::new();
    write_entry(&h.entry("f_000001"), &decoy(h.compressed.len(), 9), 5);

    assert_eq!(h.coordinator.run(manual()), RunReport::NotFound);
    assert!(h.events.contains("Cache file does not exist or is outdated."));
    assert!(!h.ui.join("friends.original.css").exists());
}

#[test]
fn test_custom_file_is_never_overwritten() {
    let h = Harness::new();
    fs::create_dir_all(&h.ui).unwrap();
    fs::write(h.ui.join("friends.custom.css"), "body { background: pink; }").unwrap();
    write_entry(&h.entry("f_000001"), &h.compressed, 5);

    assert!(matches!(h.coordinator.run(manual()), RunReport::Patched(_)));
    assert_eq!(
        fs::read_to_string(h.ui.join("friends.custom.css")).unwrap(),
        "body { background: pink; }"
    );
}

#[test]
fn test_already_patched_restores_missing_side_file() {
    let h = Harness::new();
    write_entry(&h.entry("f_000001"), &h.patched(), 5);

    assert_eq!(h.coordinator.run(manual()), RunReport::AlreadyPatched);

    let side = fs::read(h.ui.join("friends.original.css")).unwrap();
    assert!(side.ends_with(&h.css));
    assert_eq!(fs::read(h.entry("f_000001")).unwrap(), h.patched());
}

#[test]
fn test_running_host_is_reloaded() {
    let h = Harness::new();
    h.host.running.store(true, Ordering::SeqCst);
    write_entry(&h.entry("f_000001"), &h.compressed, 5);

    assert!(matches!(h.coordinator.run(manual()), RunReport::Patched(_)));
    assert_eq!(
        h.host.signals.lock().unwrap().as_slice(),
        ["steam://friends/status/offline", "steam://friends/status/online"]
    );
}

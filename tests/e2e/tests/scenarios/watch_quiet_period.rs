//! Scenario: a file rewritten several times in quick succession produces
//! exactly one ready callback, fired once the configured quiet period has
//! elapsed since the last write, carrying the file's final size.

use chrono::Duration;
use sortai_core::{WatchConfig, WatchManager};

#[test]
fn four_rapid_writes_yield_a_single_ready_callback_with_the_final_size() {
    let mut manager = WatchManager::new(WatchConfig {
        quiet_period: Duration::seconds(3),
        ..Default::default()
    });
    manager.start().unwrap();

    let path = std::path::Path::new("/watched/inbox/report.pdf");
    let t0 = chrono::Utc::now();

    assert!(manager.on_event(path, 100, t0));
    assert!(manager.on_event(path, 140, t0 + Duration::milliseconds(600)));
    assert!(manager.on_event(path, 180, t0 + Duration::milliseconds(1300)));
    assert!(manager.on_event(path, 220, t0 + Duration::milliseconds(2000)));

    assert_eq!(manager.queue_len(), 1, "repeated writes to the same path should coalesce into one queue entry");

    let too_soon = manager.drain_ready(t0 + Duration::milliseconds(2000) + Duration::seconds(2));
    assert!(too_soon.is_empty(), "quiet period has not elapsed since the last write yet");

    let ready = manager.drain_ready(t0 + Duration::milliseconds(2000) + Duration::seconds(3));
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].path, path);
    assert_eq!(ready[0].size, 220);

    assert_eq!(manager.queue_len(), 0);
}

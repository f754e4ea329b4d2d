use crate::harness::{Assertion, Scenario};
use insait_store::SessionManager;

#[test]
fn test_default_cap_evicts_oldest() {
    Scenario::new("default_cap")
        .play_many("/library/video-", 101)
        .assert_history_len(100)
        .assert_history_missing("/library/video-0000.mp4")
        .assert_history_contains("/library/video-0001.mp4")
        .assert_history_contains("/library/video-0100.mp4")
        .run()
        .unwrap();
}

#[test]
fn test_rewatch_protects_entry_from_eviction() {
    Scenario::new("rewatch_protects")
        .with_history_cap(3)
        .play("/a.mp4", 0.0, 0)
        .play("/b.mp4", 0.0, 0)
        .play("/c.mp4", 0.0, 0)
        .play("/a.mp4", 0.5, 10)
        .play("/d.mp4", 0.0, 0)
        .assert_history_order(&["/d.mp4", "/a.mp4", "/c.mp4"])
        .run()
        .unwrap();
}

#[test]
fn test_configured_cap_from_file() {
    Scenario::new("configured_cap")
        .with_history_cap(5)
        .play_many("/clips/", 8)
        .assert_history_len(5)
        .assert_history_missing("/clips/0002.mp4")
        .assert_history_contains("/clips/0003.mp4")
        .crash()
        .restart()
        .play("/clips/extra.mp4", 0.0, 0)
        .assert_history_len(5)
        .assert_history_missing("/clips/0003.mp4")
        .assert(Assertion::Custom(Box::new(|manager: &mut SessionManager| {
            anyhow::ensure!(manager.config().history.max_items == 5);
            Ok(())
        })))
        .run()
        .unwrap();
}

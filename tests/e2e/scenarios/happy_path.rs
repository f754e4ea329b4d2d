use crate::harness::{Assertion, Scenario};
use insait_store::{KeySource, StoreStatus};

#[test]
fn test_first_run_creates_key_and_store() {
    Scenario::new("first_run")
        .assert_status(StoreStatus::Open)
        .assert_key_source(KeySource::Generated)
        .assert(Assertion::FileExists("session.key".into()))
        .assert(Assertion::FileExists("sessions.db".into()))
        .assert_history_len(0)
        .assert_no_session()
        .run()
        .unwrap();
}

#[test]
fn test_session_roundtrip_across_restart() {
    Scenario::new("session_roundtrip")
        .save_session(
            &[
                (1, Some("/home/ana/Movies/Arrival.mkv"), "Arrival"),
                (2, None, "New tab"),
                (3, Some("D:\\Серіали\\Episode 01.mp4"), "Episode 01"),
            ],
            Some(3),
            72,
        )
        .crash()
        .restart()
        .assert_key_source(KeySource::Protected)
        .assert(Assertion::SessionTabCount(3))
        .assert(Assertion::SessionTitles(vec![
            "Arrival".into(),
            "New tab".into(),
            "Episode 01".into(),
        ]))
        .assert(Assertion::SessionPaths(vec![
            Some("/home/ana/Movies/Arrival.mkv".into()),
            None,
            Some("D:\\Серіали\\Episode 01.mp4".into()),
        ]))
        .assert(Assertion::SessionActiveTab(2))
        .assert(Assertion::SessionVolume(72))
        .assert(Assertion::NotOnDisk {
            file: "sessions.db".into(),
            text: "Arrival.mkv".into(),
        })
        .run()
        .unwrap();
}

#[test]
fn test_second_save_replaces_session() {
    Scenario::new("session_replace")
        .save_session(&[(1, Some("/a.mp4"), "A"), (2, Some("/b.mp4"), "B")], None, 80)
        .save_session(&[(7, Some("/c.mp4"), "C")], Some(7), 120)
        .assert(Assertion::SessionTitles(vec!["C".into()]))
        .assert(Assertion::SessionVolume(100))
        .clear_session()
        .assert_no_session()
        .run()
        .unwrap();
}

#[test]
fn test_history_lifecycle() {
    Scenario::new("history_lifecycle")
        .play("/films/Holiday/Beach.mp4", 0.2, 60_000)
        .play("/films/Work/Talk.mkv", 0.9, 1_800_000)
        .play("/films/Holiday/Beach.mp4", 0.6, 180_000)
        .assert_history_order(&["/films/Holiday/Beach.mp4", "/films/Work/Talk.mkv"])
        .assert(Assertion::HistoryEntry {
            path: "/films/Holiday/Beach.mp4".into(),
            position: 0.6,
            time: 180_000,
        })
        .assert(Assertion::SearchFinds {
            query: "holiday".into(),
            count: 1,
        })
        .assert(Assertion::SearchFinds {
            query: "".into(),
            count: 2,
        })
        .crash()
        .restart()
        .assert_history_len(2)
        .delete_history_entry("/films/Work/Talk.mkv")
        .assert_history_missing("/films/Work/Talk.mkv")
        .clear_history()
        .assert_history_len(0)
        .run()
        .unwrap();
}

#[test]
fn test_empty_path_is_ignored() {
    Scenario::new("empty_path")
        .play("", 0.5, 1_000)
        .assert_history_len(0)
        .run()
        .unwrap();
}

use diskstrata_core::{
    AppConfig, ConfigError, FolderNode, NewFolderNode, NodeId, Scan, ScanId, ScanStatus,
    Settings, StatusError,
};
use chrono::{Duration, TimeZone, Utc};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_scan_lifecycle_happy_path() {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut scan = Scan::new(ScanId::new(1), start, ScanStatus::Pending);

    scan.start().unwrap();
    assert_eq!(scan.status, ScanStatus::Running);
    assert!(!scan.is_finished());

    scan.record_folder(2, 150);
    scan.complete(start + Duration::minutes(3)).unwrap();

    assert!(scan.is_finished());
    assert_eq!(scan.duration(), Some(Duration::minutes(3)));
    assert_eq!(scan.total_bytes, 150);
    assert!(scan.error_message.is_none());
}

#[test]
fn test_running_cannot_go_back_to_pending() {
    let mut scan = Scan::new(ScanId::new(1), Utc::now(), ScanStatus::Running);
    assert!(!scan.status.can_transition_to(ScanStatus::Pending));

    scan.cancel(Utc::now()).unwrap();
    let err = scan.start().unwrap_err();
    assert_eq!(
        err,
        StatusError::InvalidTransition {
            scan: ScanId::new(1),
            from: ScanStatus::Cancelled,
            to: ScanStatus::Running,
        }
    );
}

#[test]
fn test_unfinished_statuses_are_not_terminal() {
    for status in ScanStatus::UNFINISHED {
        assert!(!status.is_terminal());
        assert!(status.can_transition_to(ScanStatus::Cancelled));
    }
    assert_eq!(
        ScanStatus::UNFINISHED,
        [ScanStatus::Pending, ScanStatus::Running]
    );
}

#[test]
fn test_new_folder_node_derives_name() {
    let node = NewFolderNode::new("/mnt/media", ScanId::new(3), None, 10, 1, Utc::now());
    assert_eq!(node.name.as_str(), "media");

    let root = NewFolderNode::new("/", ScanId::new(3), None, 0, 0, Utc::now());
    assert_eq!(root.name.as_str(), "/");

    let stored: FolderNode = node.with_id(NodeId::new(9));
    assert_eq!(stored.id, NodeId::new(9));
    assert_eq!(stored.path, PathBuf::from("/mnt/media"));
    assert!(stored.is_root());
}

#[test]
fn test_settings_schedule_bookkeeping() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut settings = Settings::with_root("/data");
    settings.scan_interval_hours = 6;

    assert!(settings.is_due(now));
    settings.record_scan(now);

    assert_eq!(settings.last_scan_time, Some(now));
    assert_eq!(settings.next_scan_time, Some(now + Duration::hours(6)));
    assert!(!settings.is_due(now + Duration::hours(5)));
    assert!(settings.is_due(now + Duration::hours(6)));
}

#[test]
fn test_scan_serializes_status_as_snake_case() {
    let scan = Scan::new(ScanId::new(4), Utc::now(), ScanStatus::Running);
    let json = serde_json::to_string(&scan).unwrap();
    assert!(json.contains("\"status\":\"running\""));
}

#[test]
fn test_app_config_missing_file_is_default() {
    let temp = TempDir::new().unwrap();
    let config = AppConfig::load(&temp.path().join("absent.toml")).unwrap();
    assert_eq!(config, AppConfig::default());
    assert!(config.database_path().ends_with("diskstrata.db"));
}

#[test]
fn test_app_config_from_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(
        &path,
        "database_path = \"/var/lib/diskstrata/snap.db\"\nerror_backoff_secs = 30\n",
    )
    .unwrap();

    let config = AppConfig::load(&path).unwrap();
    assert_eq!(config.database_path(), PathBuf::from("/var/lib/diskstrata/snap.db"));
    assert_eq!(
        config.scheduler_config().error_backoff,
        std::time::Duration::from_secs(30)
    );
    assert_eq!(config.default_settings(), Settings::default());
}

#[test]
fn test_app_config_malformed_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "tick_secs = \"soon\"").unwrap();

    let err = AppConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

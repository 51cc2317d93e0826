//! Config file discovery and environment overlay, end to end into a session.

mod util;

use apod_browse::config::FeedConfig;
use apod_browse::likes::LikedSet;
use apod_browse::model::SortDirection;
use apod_browse::likes::LikesError;
use apod_browse::session::{BrowseSession, SessionError};
use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;
use util::{EnvGuard, day, span};

fn write_config(root: &std::path::Path, body: &str) {
    let dir = root.join("apod");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), body).unwrap();
}

#[test]
#[serial]
fn env_overrides_file_found_under_xdg_config_home() {
    let tmp = TempDir::new().unwrap();
    write_config(
        tmp.path(),
        "api_key = \"FROM_FILE\"\npage_days = 3\ncache_capacity = 50\nstall_after_secs = 4\n",
    );
    let _xdg = EnvGuard::set("XDG_CONFIG_HOME", tmp.path().to_string_lossy());
    let _key = EnvGuard::set("APOD_API_KEY", "FROM_ENV");
    let _days = EnvGuard::set("APOD_PAGE_DAYS", "2");
    let _capacity = EnvGuard::set("APOD_CACHE_CAPACITY", "50");
    let _stall = EnvGuard::set("APOD_STALL_SECS", "4");
    let _preload = EnvGuard::set("APOD_PRELOAD_MEDIA", "no");

    let config = FeedConfig::load().unwrap();
    assert_eq!(config.api_key, "FROM_ENV");
    assert_eq!(config.page_days, 2);
    assert_eq!(config.cache_capacity, 50);
    assert!(!config.preload_media);
    assert_eq!(
        config.pagination_settings().stall_after,
        Duration::from_secs(4)
    );
}

#[test]
#[serial]
fn bad_env_value_names_the_variable() {
    let tmp = TempDir::new().unwrap();
    let _xdg = EnvGuard::set("XDG_CONFIG_HOME", tmp.path().to_string_lossy());
    let _days = EnvGuard::set("APOD_PAGE_DAYS", "several");

    let err = FeedConfig::load().unwrap_err();
    assert!(err.to_string().contains("APOD_PAGE_DAYS"), "{err}");
}

#[tokio::test]
#[serial]
async fn session_from_config_loads_likes_from_configured_path() {
    let tmp = TempDir::new().unwrap();
    let likes_path = tmp.path().join("likes").join("liked.json");
    let mut seeded = LikedSet::load(&likes_path);
    seeded.like(day(4));
    seeded.save().unwrap();

    let _likes = EnvGuard::set("APOD_LIKES_PATH", likes_path.to_string_lossy());
    let mut config = FeedConfig::default();
    config.apply_env().unwrap();
    config.preload_media = false;

    let session = BrowseSession::from_config(&config, span(1, 7), SortDirection::Oldest).unwrap();
    assert!(session.is_liked(day(4)));
    assert!(!session.is_liked(day(5)));
    assert_eq!(session.interval(), span(1, 7));
    assert!(session.records().is_empty());
}

#[test]
#[serial]
fn session_from_config_refuses_corrupt_likes_file() {
    let tmp = TempDir::new().unwrap();
    let likes_path = tmp.path().join("liked.json");
    let corrupt = r#"["2024-01-01","2024-01-02",]"#;
    std::fs::write(&likes_path, corrupt).unwrap();

    let _likes = EnvGuard::set("APOD_LIKES_PATH", likes_path.to_string_lossy());
    let mut config = FeedConfig::default();
    config.apply_env().unwrap();
    config.preload_media = false;

    let err = BrowseSession::from_config(&config, span(1, 7), SortDirection::Newest).unwrap_err();
    assert!(matches!(err, SessionError::Likes(LikesError::Json(_))), "{err}");
    assert_eq!(std::fs::read_to_string(&likes_path).unwrap(), corrupt);
}

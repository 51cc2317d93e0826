//! Browse session: selection over loaded pages, likes persistence, and
//! context changes.

mod util;

use apod_browse::feed::{ControllerState, PaginationSettings};
use apod_browse::likes::LikedSet;
use apod_browse::model::{LikeFilter, SortDirection};
use apod_browse::session::BrowseSession;
use std::sync::Arc;
use tempfile::TempDir;
use util::{ScriptedUpstream, coalescer, day, span};

fn session(
    upstream: Arc<ScriptedUpstream>,
    liked: LikedSet,
    interval: apod_browse::model::DateInterval,
) -> BrowseSession {
    BrowseSession::new(
        coalescer(upstream, 1000),
        liked,
        interval,
        SortDirection::Newest,
        PaginationSettings::default(),
    )
}

fn visible_days(s: &BrowseSession) -> Vec<chrono::NaiveDate> {
    s.visible().iter().map(|r| r.date).collect()
}

#[tokio::test]
async fn visible_follows_sort_and_liked_filter() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let mut s = session(upstream, LikedSet::new(), span(1, 10));
    s.load_pages(None).await;

    s.like(day(3));
    s.like(day(8));
    s.set_like_filter(LikeFilter::Liked);
    assert_eq!(visible_days(&s), vec![day(8), day(3)]);

    s.set_like_filter(LikeFilter::Unliked);
    assert_eq!(s.visible().len(), 8);
    assert!(!visible_days(&s).contains(&day(3)));
}

#[tokio::test]
async fn query_matches_title_literally() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let mut s = session(upstream, LikedSet::new(), span(1, 3));
    s.load_pages(None).await;

    // Titles are "Picture for 2024-01-0N".
    s.set_query("PICTURE FOR 2024-01-02");
    assert_eq!(visible_days(&s), vec![day(2)]);

    s.set_query("2024-01-0.");
    assert!(s.visible().is_empty());

    s.set_query("");
    assert_eq!(s.visible().len(), 3);
}

#[tokio::test]
async fn interval_change_resets_and_reuses_cache() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let mut s = session(upstream.clone(), LikedSet::new(), span(1, 10));
    s.load_pages(None).await;
    assert_eq!(upstream.call_count(), 2);

    assert!(s.set_interval(span(3, 12)));
    assert!(s.records().is_empty());
    assert_eq!(s.state(), ControllerState::Idle);

    s.load_pages(None).await;
    assert_eq!(s.records().len(), 10);
    // Only 11 and 12 were new.
    assert_eq!(upstream.call_count(), 3);
    assert_eq!(upstream.calls()[2], span(11, 12));
}

#[tokio::test]
async fn likes_survive_a_new_session() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("liked.json");

    {
        let upstream = Arc::new(ScriptedUpstream::new());
        let mut s = session(upstream, LikedSet::load(&path), span(1, 5));
        s.load_pages(None).await;
        s.toggle_like(day(2));
        s.like(day(4));
    }

    let upstream = Arc::new(ScriptedUpstream::new());
    let mut s = session(upstream, LikedSet::load(&path), span(1, 5));
    s.load_pages(None).await;
    s.set_like_filter(LikeFilter::Liked);
    s.set_sort(SortDirection::Oldest);
    s.load_pages(None).await;
    assert_eq!(visible_days(&s), vec![day(2), day(4)]);

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, r#"["2024-01-02","2024-01-04"]"#);
}

#[tokio::test]
async fn liking_after_a_corrupt_likes_file_leaves_it_intact() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("liked.json");
    let corrupt = r#"["2024-01-01","2024-01-02","2024-01-03",]"#;
    std::fs::write(&path, corrupt).unwrap();

    let upstream = Arc::new(ScriptedUpstream::new());
    let mut s = session(upstream, LikedSet::load(&path), span(1, 5));
    assert!(s.like(day(9)));
    assert!(s.toggle_like(day(4)));
    assert!(s.is_liked(day(9)));

    assert_eq!(std::fs::read_to_string(&path).unwrap(), corrupt);
}

#[tokio::test]
async fn unrecognized_liked_entries_survive_a_like() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("liked.json");
    std::fs::write(&path, r#"["2024-01-02","not-a-day"]"#).unwrap();

    let upstream = Arc::new(ScriptedUpstream::new());
    let mut s = session(upstream, LikedSet::try_load(&path).unwrap(), span(1, 5));
    s.like(day(3));

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, r#"["2024-01-02","2024-01-03","not-a-day"]"#);
}

#[tokio::test]
async fn selection_inputs_reflect_session() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let mut s = session(upstream, LikedSet::new(), span(1, 2));
    s.set_query("moon");
    s.set_like_filter(LikeFilter::Unliked);
    s.set_sort(SortDirection::Oldest);

    let inputs = s.selection_inputs();
    assert_eq!(inputs.query, "moon");
    assert_eq!(inputs.like_filter, LikeFilter::Unliked);
    assert_eq!(inputs.sort, SortDirection::Oldest);
}

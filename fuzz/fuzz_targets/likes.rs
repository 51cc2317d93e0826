//! Fuzz target for the persisted likes file.
//!
//! Loading must never panic on arbitrary file content, anything that loads
//! must survive a save/load cycle unchanged, and content that does not load
//! is never overwritten.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::fs;
use tempfile::TempDir;

use apod_browse::likes::LikedSet;

#[derive(Arbitrary, Debug)]
struct LikesInput {
    /// Raw file content
    content: String,
    /// Day offsets to toggle after loading
    toggles: Vec<u16>,
}

fuzz_target!(|input: LikesInput| {
    let temp_dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(_) => return,
    };
    let path = temp_dir.path().join("liked.json");
    if fs::write(&path, &input.content).is_err() {
        return;
    }

    let mut liked = LikedSet::load(&path);
    let base = chrono::NaiveDate::from_ymd_opt(1995, 6, 16).unwrap();
    for offset in input.toggles.iter().take(64) {
        if let Some(day) = base.checked_add_days(chrono::Days::new(u64::from(*offset))) {
            liked.toggle(day);
        }
    }

    // Unreadable content loads unbound and must be left on disk as it was.
    if liked.path().is_none() {
        liked.save().expect("unbound save is a no-op");
        let after = fs::read_to_string(&path).expect("file still present");
        assert_eq!(after, input.content);
        return;
    }

    if liked.save().is_ok() {
        let reloaded = LikedSet::try_load(&path).expect("saved likes must reload");
        assert_eq!(
            reloaded.iter().collect::<Vec<_>>(),
            liked.iter().collect::<Vec<_>>()
        );
        assert_eq!(reloaded.unrecognized(), liked.unrecognized());
    }
});

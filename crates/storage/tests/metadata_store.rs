use std::fs;
use std::sync::Arc;
use std::thread;
use storage::{MetadataStore, ProjectMetadata, StoreError, LOCAL_METADATA_FILE};

#[test]
fn centralized_load_initializes_and_persists_default() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("metadata").join("projects_metadata.json");
    let store = MetadataStore::centralized(&file);

    let meta = store.load("SongA", None).unwrap();
    assert!(meta.tags.is_empty());
    assert_eq!(meta.rating, 0);
    assert_eq!(meta.notes, "");
    assert!(meta.last_modified.is_some());

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(raw["SongA"]["rating"], 0);
}

#[test]
fn centralized_round_trip_advances_last_modified() {
    let temp = tempfile::tempdir().unwrap();
    let store = MetadataStore::centralized(temp.path().join("m.json"));

    let before = store.load("SongA", None).unwrap();
    let mut edited = before.clone();
    edited.set_tags(["demo", "rock"]);
    edited.rating = 4;
    edited.notes = "needs vocals".into();
    store.save("SongA", None, edited).unwrap();

    let after = store.load("SongA", None).unwrap();
    assert_eq!(after.tags, vec!["demo", "rock"]);
    assert_eq!(after.rating, 4);
    assert_eq!(after.notes, "needs vocals");
    assert!(after.last_modified > before.last_modified);
}

#[test]
fn out_of_range_rating_is_refused_and_leaves_store_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let store = MetadataStore::centralized(temp.path().join("m.json"));
    store.set_rating("SongA", None, 3).unwrap();

    let err = store.set_rating("SongA", None, 6).unwrap_err();
    assert!(matches!(err, StoreError::InvalidRating(6)));

    let mut bad = store.load("SongA", None).unwrap();
    bad.rating = 9;
    assert!(store.save("SongA", None, bad).is_err());

    assert_eq!(store.load("SongA", None).unwrap().rating, 3);
}

#[test]
fn save_overwrites_the_record_wholesale() {
    let temp = tempfile::tempdir().unwrap();
    let store = MetadataStore::centralized(temp.path().join("m.json"));
    store.set_notes("SongA", None, "old notes").unwrap();
    store.add_tag("SongA", None, "keep?").unwrap();

    let mut replacement = ProjectMetadata::default();
    replacement.rating = 2;
    store.save("SongA", None, replacement).unwrap();

    let meta = store.load("SongA", None).unwrap();
    assert!(meta.tags.is_empty());
    assert_eq!(meta.notes, "");
    assert_eq!(meta.rating, 2);
}

#[test]
fn tag_helpers_and_all_tags() {
    let temp = tempfile::tempdir().unwrap();
    let store = MetadataStore::centralized(temp.path().join("m.json"));
    store.add_tag("SongA", None, "rock").unwrap();
    store.add_tag("SongA", None, "rock").unwrap();
    store.add_tag("SongB", None, "ambient").unwrap();
    store.set_tags("SongC", None, vec!["demo".into(), "ambient".into()]).unwrap();
    store.remove_tag("SongC", None, "demo").unwrap();

    assert_eq!(store.load("SongA", None).unwrap().tags, vec!["rock"]);
    assert_eq!(store.all_tags(&[]).unwrap(), vec!["ambient", "rock"]);
}

#[test]
fn local_mode_requires_an_existing_directory() {
    let temp = tempfile::tempdir().unwrap();
    let store = MetadataStore::local();

    assert!(matches!(
        store.load("SongA", None),
        Err(StoreError::ProjectDirRequired { .. })
    ));
    let missing = temp.path().join("nope");
    assert!(matches!(
        store.save("SongA", Some(&missing), ProjectMetadata::default()),
        Err(StoreError::MissingProjectDir { .. })
    ));
    assert!(!missing.exists());
}

#[test]
fn local_mode_writes_sidecar_inside_project_folder() {
    let temp = tempfile::tempdir().unwrap();
    let dir = temp.path().join("SongA");
    fs::create_dir(&dir).unwrap();
    let store = MetadataStore::local();

    let meta = store.load("SongA", Some(&dir)).unwrap();
    assert_eq!(meta.extra["name"], "SongA");
    assert!(dir.join(LOCAL_METADATA_FILE).exists());

    store.set_rating("SongA", Some(&dir), 5).unwrap();
    store.add_tag("SongA", Some(&dir), "final").unwrap();
    let meta = store.load("SongA", Some(&dir)).unwrap();
    assert_eq!(meta.rating, 5);
    assert_eq!(meta.tags, vec!["final"]);
    assert_eq!(meta.extra["bpm"], 0);

    assert_eq!(store.all_tags(&[dir.clone()]).unwrap(), vec!["final"]);
}

#[test]
fn local_mode_keeps_foreign_fields_and_reads_naive_timestamps() {
    let temp = tempfile::tempdir().unwrap();
    let dir = temp.path().join("SongB");
    fs::create_dir(&dir).unwrap();
    fs::write(
        dir.join(LOCAL_METADATA_FILE),
        r#"{"name":"SongB","bpm":92,"styles":["soul"],"rating":1,"tags":[],"notes":"","last_modified":"2023-05-06T07:08:09.101112"}"#,
    )
    .unwrap();
    let store = MetadataStore::local();

    let meta = store.set_notes("SongB", Some(&dir), "bridge too long").unwrap();
    assert_eq!(meta.extra["bpm"], 92);

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join(LOCAL_METADATA_FILE)).unwrap()).unwrap();
    assert_eq!(raw["styles"][0], "soul");
    assert_eq!(raw["notes"], "bridge too long");
    assert_eq!(raw["rating"], 1);
}

#[test]
fn empty_local_file_is_treated_as_missing() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join(LOCAL_METADATA_FILE), "{}").unwrap();
    let store = MetadataStore::local();
    assert!(store.peek("X", Some(temp.path())).unwrap().is_none());
    let meta = store.load("X", Some(temp.path())).unwrap();
    assert_eq!(meta.extra["name"], "X");
}

#[test]
fn malformed_central_file_is_an_error_not_a_reset() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("m.json");
    fs::write(&file, "{ not json").unwrap();
    let store = MetadataStore::centralized(&file);
    assert!(matches!(store.load("A", None), Err(StoreError::Json { .. })));
    assert_eq!(fs::read_to_string(&file).unwrap(), "{ not json");
}

#[test]
fn one_odd_rating_does_not_break_the_central_file() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("m.json");
    fs::write(
        &file,
        r#"{"A": {"tags": ["x"], "rating": -1}, "B": {"rating": 4}, "C": {"rating": null}}"#,
    )
    .unwrap();
    let store = MetadataStore::centralized(&file);
    assert_eq!(store.load("B", None).unwrap().rating, 4);
    let a = store.load("A", None).unwrap();
    assert_eq!((a.rating, a.tags.clone()), (0, vec!["x".to_string()]));
    assert_eq!(store.peek("C", None).unwrap().unwrap().rating, 0);

    store.add_tag("B", None, "mixed").unwrap();
    assert_eq!(store.peek("B", None).unwrap().unwrap().rating, 4);
}

#[test]
fn concurrent_writers_to_different_projects_do_not_lose_updates() {
    let temp = tempfile::tempdir().unwrap();
    let store = Arc::new(MetadataStore::centralized(temp.path().join("m.json")));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 0..5 {
                    store
                        .add_tag(&format!("Song{i}"), None, &format!("t{n}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for i in 0..8 {
        let meta = store.peek(&format!("Song{i}"), None).unwrap().unwrap();
        assert_eq!(meta.tags.len(), 5, "Song{i} lost tags: {:?}", meta.tags);
    }
}

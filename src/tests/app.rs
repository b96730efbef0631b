use std::sync::Arc;

use serde_json::json;

use crate::app::{App, BOARD_FILE};
use crate::board::{Board, Bookmark, DEFAULT_GROUP, EXPORT_VERSION};
use crate::config::Config;
use crate::metadata::{ProxyPrefs, Resolver};
use crate::storage::{BackendLocal, StorageManager};

/// Creates an isolated App over a unique temp directory. Each test gets its
/// own directory so parallel tests never collide, and no real data is
/// touched. The endpoint-less resolver short-circuits to the hostname
/// fallback, so nothing ever reaches the network.
pub fn create_app() -> (Arc<App>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let app = open_app(&tmp);
    (app, tmp)
}

pub fn open_app(tmp: &tempfile::TempDir) -> Arc<App> {
    let storage = Arc::new(
        BackendLocal::new(tmp.path().to_str().unwrap()).expect("failed to create storage"),
    );
    let resolver = Arc::new(Resolver::with_endpoints(Vec::new(), ProxyPrefs::new()));
    let config = Config {
        background_refresh: false,
        ..Default::default()
    };
    App::load(storage, resolver, config).expect("failed to load app")
}

fn bare_bookmark(url: &str) -> Bookmark {
    Bookmark {
        url: url.to_string(),
        title: String::new(),
        icon: String::new(),
        white_bg: false,
    }
}

#[tokio::test]
async fn add_bookmark_fills_missing_metadata() {
    let (app, _tmp) = create_app();

    let stored = app
        .add_bookmark(DEFAULT_GROUP, bare_bookmark("example.com"))
        .await
        .unwrap();

    assert_eq!(stored.url, "https://example.com");
    assert_eq!(stored.title, "Example");
    assert_eq!(
        stored.icon,
        "https://www.google.com/s2/favicons?domain=example.com&sz=128"
    );
}

#[tokio::test]
async fn provided_metadata_is_kept() {
    let (app, _tmp) = create_app();

    let stored = app
        .add_bookmark(
            DEFAULT_GROUP,
            Bookmark {
                url: "https://example.com".to_string(),
                title: "My Title".to_string(),
                icon: "https://example.com/icon.png".to_string(),
                white_bg: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(stored.title, "My Title");
    assert_eq!(stored.icon, "https://example.com/icon.png");
    assert!(stored.white_bg);
}

#[tokio::test]
async fn board_survives_a_reload() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");

    {
        let app = open_app(&tmp);
        app.add_bookmark(DEFAULT_GROUP, bare_bookmark("example.com"))
            .await
            .unwrap();
        app.add_group("work").unwrap();
    }

    let app = open_app(&tmp);
    let board = app.board();
    assert_eq!(board.group_order, vec!["default", "work"]);
    assert_eq!(board.bookmarks[DEFAULT_GROUP].len(), 1);
    assert_eq!(board.bookmarks[DEFAULT_GROUP][0].url, "https://example.com");
}

#[tokio::test]
async fn board_file_is_written_on_mutation() {
    let (app, tmp) = create_app();
    app.add_group("work").unwrap();

    let storage = BackendLocal::new(tmp.path().to_str().unwrap()).unwrap();
    let raw = storage.read(BOARD_FILE).expect("board file missing");
    let board: Board = serde_json::from_slice(&raw).unwrap();
    assert!(board.bookmarks.contains_key("work"));
}

#[tokio::test]
async fn move_bookmark_across_groups() {
    let (app, _tmp) = create_app();
    app.add_group("work").unwrap();
    app.add_bookmark(DEFAULT_GROUP, bare_bookmark("a.com"))
        .await
        .unwrap();
    app.add_bookmark(DEFAULT_GROUP, bare_bookmark("b.com"))
        .await
        .unwrap();

    app.move_bookmark(DEFAULT_GROUP, 0, "work", 0).unwrap();

    let board = app.board();
    assert_eq!(board.bookmarks[DEFAULT_GROUP].len(), 1);
    assert_eq!(board.bookmarks["work"][0].url, "https://a.com");
}

#[tokio::test]
async fn rename_keeps_bookmarks_and_order() {
    let (app, _tmp) = create_app();
    app.add_group("work").unwrap();
    app.add_bookmark("work", bare_bookmark("a.com"))
        .await
        .unwrap();

    app.rename_group("work", "projects").unwrap();

    let board = app.board();
    assert_eq!(board.group_order, vec!["default", "projects"]);
    assert_eq!(board.bookmarks["projects"].len(), 1);
}

#[tokio::test]
async fn import_versioned_payload_replaces_the_board() {
    let (app, _tmp) = create_app();
    app.add_bookmark(DEFAULT_GROUP, bare_bookmark("old.com"))
        .await
        .unwrap();

    app.import(json!({
        "version": 3,
        "bookmarks": {"work": [{"url": "https://a.com", "title": "A", "icon": ""}]},
        "groupOrder": ["work"],
        "collapsedGroups": ["work"]
    }))
    .unwrap();

    let board = app.board();
    assert_eq!(board.group_order, vec!["work"]);
    assert_eq!(board.collapsed_groups, vec!["work"]);
    assert_eq!(board.bookmarks["work"][0].title, "A");
}

#[tokio::test]
async fn import_bare_array_lands_in_default_group() {
    let (app, _tmp) = create_app();

    app.import(json!([
        {"url": "https://a.com", "title": "A", "icon": ""},
        {"url": "https://b.com", "title": "B", "icon": "", "whiteBg": true}
    ]))
    .unwrap();

    let board = app.board();
    assert_eq!(board.bookmarks[DEFAULT_GROUP].len(), 2);
    assert!(board.bookmarks[DEFAULT_GROUP][1].white_bg);
}

#[tokio::test]
async fn import_legacy_group_map() {
    let (app, _tmp) = create_app();

    app.import(json!({
        "work": [{"url": "https://a.com", "title": "A", "icon": ""}],
        "home": []
    }))
    .unwrap();

    let board = app.board();
    assert_eq!(board.bookmarks.len(), 2);
    assert!(board.group_order.contains(&"work".to_string()));
    assert!(board.group_order.contains(&"home".to_string()));
}

#[tokio::test]
async fn import_rejects_garbage() {
    let (app, _tmp) = create_app();
    assert!(app.import(json!(42)).is_err());
}

#[tokio::test]
async fn export_carries_version_and_filename() {
    let (app, _tmp) = create_app();
    app.add_bookmark(DEFAULT_GROUP, bare_bookmark("a.com"))
        .await
        .unwrap();

    let (filename, payload) = app.export();
    assert!(filename.starts_with("bookmarks "));
    assert!(filename.ends_with(".json"));
    assert_eq!(payload.version, EXPORT_VERSION);
    assert_eq!(payload.bookmarks[DEFAULT_GROUP].len(), 1);
}

#[tokio::test]
async fn clear_resets_to_a_single_default_group() {
    let (app, _tmp) = create_app();
    app.add_group("work").unwrap();
    app.add_bookmark("work", bare_bookmark("a.com"))
        .await
        .unwrap();

    app.clear().unwrap();

    let board = app.board();
    assert_eq!(board.group_order, vec![DEFAULT_GROUP]);
    assert!(board.bookmarks[DEFAULT_GROUP].is_empty());
}

#![allow(dead_code)]

use std::path::PathBuf;

use relay_core::ObservedPost;
use relay_db::Db;
use tempfile::TempDir;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn make_post(username: &str, shortcode: &str) -> ObservedPost {
    ObservedPost {
        username: username.to_string(),
        shortcode: shortcode.to_string(),
        url: relay_core::post_url(shortcode),
        owner_name: None,
        owner_username: None,
        caption: Some(format!("caption for {}", shortcode)),
        image_url: None,
        posted_at: Some("2026-01-10T12:00:00.000Z".to_string()),
    }
}

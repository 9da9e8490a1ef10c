use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

use ragchat_core::loader::{DocumentLoader, SourceDir};
use ragchat_core::Error;

fn loader_for(base: &Path, subdirs: &[&str]) -> DocumentLoader {
    DocumentLoader::new(
        vec![SourceDir { base: base.to_path_buf(), subdirs: subdirs.iter().map(|s| s.to_string()).collect() }],
        vec!["txt".to_string()],
    )
}

#[test]
fn loads_each_category_with_provenance() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path();
    fs::create_dir_all(base.join("web")).unwrap();
    fs::create_dir_all(base.join("mobile/android")).unwrap();
    fs::write(base.join("web/login.txt"), "Reset the password from the login page.").unwrap();
    fs::write(base.join("mobile/android/crash.txt"), "Clear the app cache.").unwrap();
    fs::write(base.join("web/notes.md"), "not a txt file").unwrap();

    let docs = loader_for(base, &["web", "mobile"]).load().expect("load");
    assert_eq!(docs.len(), 2, "only .txt files are loaded");

    let web = docs.iter().find(|d| d.metadata().source_category == "web").expect("web doc");
    assert_eq!(web.metadata().file_name, "login.txt");
    assert_eq!(web.text(), "Reset the password from the login page.");

    let mobile = docs.iter().find(|d| d.metadata().source_category == "mobile").expect("mobile doc");
    assert_eq!(mobile.metadata().file_name, "crash.txt");
    assert_eq!(mobile.doc_id(), "mobile/android/crash.txt");
}

#[test]
fn empty_category_yields_no_documents() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("queries")).unwrap();
    let docs = loader_for(tmp.path(), &["queries"]).load().expect("empty subdir is not an error");
    assert!(docs.is_empty());
}

#[test]
fn missing_category_is_skipped() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("web")).unwrap();
    fs::write(tmp.path().join("web/a.txt"), "alpha").unwrap();
    let docs = loader_for(tmp.path(), &["web", "does-not-exist"]).load().expect("load");
    assert_eq!(docs.len(), 1);
}

#[test]
fn non_utf8_file_is_skipped_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("web");
    fs::create_dir_all(&dir).unwrap();
    let mut f = fs::File::create(dir.join("bad.txt")).unwrap();
    f.write_all(&[0xff, 0xfe, 0x00, 0xc3]).unwrap();
    fs::write(dir.join("good.txt"), "fine").unwrap();

    let docs = loader_for(tmp.path(), &["web"]).load().expect("load");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].metadata().file_name, "good.txt");
}

#[test]
fn missing_base_directory_is_load_error() {
    let tmp = TempDir::new().unwrap();
    let err = loader_for(&tmp.path().join("gone"), &["web"]).load().expect_err("missing root");
    assert!(matches!(err, Error::LoadIo { .. }));
}

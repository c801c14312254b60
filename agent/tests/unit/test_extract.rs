//! Archive extraction tests

use std::fs;
use std::io::Cursor;

use encoding_rs::{BIG5, GBK};
use tokio_test::{assert_err, assert_ok};

use updater_agent::archive::{EncodingCandidates, Extractor};
use updater_agent::errors::AgentError;

use crate::support::{build_zip, build_zip_with_raw_names, read_tree, write_tree};

fn extractor() -> Extractor {
    Extractor::new(EncodingCandidates::with_host(None))
}

#[test]
fn test_extract_utf8_names() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = build_zip(&[
        ("index.html", b"<html>v2</html>"),
        ("資料/說明.txt", b"readme"),
        ("assets/", b""),
    ]);

    let report = assert_ok!(extractor().extract(Cursor::new(archive), tmp.path()));
    assert_eq!(report.encoding, "UTF-8");
    assert_eq!(report.files, 2);
    assert_eq!(report.directories, 1);

    assert_eq!(fs::read(tmp.path().join("index.html")).unwrap(), b"<html>v2</html>");
    assert_eq!(fs::read(tmp.path().join("資料").join("說明.txt")).unwrap(), b"readme");
    assert!(tmp.path().join("assets").is_dir());
}

#[test]
fn test_extract_big5_names() {
    let tmp = tempfile::tempdir().unwrap();
    let (name, _, unmappable) = BIG5.encode("測試.txt");
    assert!(!unmappable);
    let archive = build_zip_with_raw_names(&[(name.into_owned(), b"big5 content")]);

    let report = assert_ok!(extractor().extract(Cursor::new(archive), tmp.path()));
    assert_eq!(report.encoding, "Big5");
    assert_eq!(fs::read(tmp.path().join("測試.txt")).unwrap(), b"big5 content");
}

#[test]
fn test_extract_gbk_names_when_big5_fails() {
    let tmp = tempfile::tempdir().unwrap();
    // 0x80 is the euro sign in GBK and unmapped in Big5
    let (name, _, unmappable) = GBK.encode("价格€.txt");
    assert!(!unmappable);
    let raw = name.into_owned();
    assert!(BIG5.decode_without_bom_handling(&raw).1);

    let archive = build_zip_with_raw_names(&[(raw, b"gbk content")]);

    let report = assert_ok!(extractor().extract(Cursor::new(archive), tmp.path()));
    assert_eq!(report.encoding, "GBK");
    assert!(tmp.path().join("价格€.txt").is_file());
}

#[test]
fn test_extract_fails_when_no_encoding_fits() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = build_zip_with_raw_names(&[(b"bad\x01name.txt".to_vec(), b"x")]);

    let err = assert_err!(extractor().extract(Cursor::new(archive), tmp.path()));
    assert!(matches!(err, AgentError::ExtractError(msg) if msg.contains("GBK")));
    assert!(read_tree(tmp.path()).is_empty());
}

#[test]
fn test_extract_overwrites_existing_files() {
    let tmp = tempfile::tempdir().unwrap();
    write_tree(tmp.path(), &[("index.html", "old"), ("keep.txt", "keep")]);

    let archive = build_zip(&[("index.html", b"new")]);
    assert_ok!(extractor().extract_stream(archive.as_slice(), tmp.path()));

    assert_eq!(fs::read_to_string(tmp.path().join("index.html")).unwrap(), "new");
    assert_eq!(fs::read_to_string(tmp.path().join("keep.txt")).unwrap(), "keep");
}

#[test]
fn test_extract_backslash_separators() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = build_zip(&[("bin\\app.dll", b"dll")]);

    assert_ok!(extractor().extract(Cursor::new(archive), tmp.path()));
    assert_eq!(fs::read(tmp.path().join("bin").join("app.dll")).unwrap(), b"dll");
}

#[test]
fn test_extract_rejects_path_escape() {
    let tmp = tempfile::tempdir().unwrap();
    let dest = tmp.path().join("site");
    let archive = build_zip(&[("../escaped.txt", b"evil")]);

    assert_err!(extractor().extract(Cursor::new(archive), &dest));
    assert!(!tmp.path().join("escaped.txt").exists());
}

#[test]
fn test_extract_file_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let zip_path = tmp.path().join("upload.zip");
    fs::write(&zip_path, build_zip(&[("a/b/c.txt", b"deep")])).unwrap();

    let dest = tmp.path().join("out");
    let report = assert_ok!(extractor().extract_file(&zip_path, &dest));
    assert_eq!(report.files, 1);
    assert_eq!(fs::read(dest.join("a/b/c.txt")).unwrap(), b"deep");
}

//! Integration tests for the resource tree through the public service
//!
//! These run against both backends; the sqlite ones use a temporary
//! database file so persistence across reopen is covered too.

use folio::config::StorageBackend;
use folio::path::{resolve, CanonicalPath};
use folio::storage::MemoryStorage;
use folio::{Config, ErrorKind, ResourceKind, ResourceService, TenantRoot};
use std::io::{Read, Write};
use std::sync::Arc;
use tempfile::TempDir;

fn memory_service() -> ResourceService {
    ResourceService::new(Arc::new(MemoryStorage::new()), Config::default())
        .expect("Failed to build service")
}

fn sqlite_service(dir: &TempDir) -> ResourceService {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.database_path = dir
        .path()
        .join("folio.db")
        .to_string_lossy()
        .into_owned();
    ResourceService::from_config(config).expect("Failed to open sqlite service")
}

fn write(service: &ResourceService, root: &TenantRoot, path: &str, data: &[u8]) {
    let mut writer = service
        .open_output_stream(root, path)
        .unwrap_or_else(|e| panic!("Failed to open {}: {}", path, e));
    writer.write_all(data).expect("Failed to write");
    writer.finish().expect("Failed to finish");
}

fn read(service: &ResourceService, root: &TenantRoot, path: &str) -> Vec<u8> {
    let mut data = Vec::new();
    service
        .open_input_stream(root, path)
        .unwrap_or_else(|e| panic!("Failed to open {}: {}", path, e))
        .read_to_end(&mut data)
        .expect("Failed to read");
    data
}

fn names(service: &ResourceService, root: &TenantRoot, folder: &str) -> Vec<String> {
    service
        .get_resources(root, folder)
        .expect("Failed to list")
        .into_iter()
        .map(|r| r.name)
        .collect()
}

#[test]
fn test_add_folder_twice_fails_and_lists_once() {
    for service in [memory_service(), sqlite_service(&TempDir::new().expect("tempdir"))] {
        let root = TenantRoot::new("acme").expect("tenant");
        service.add_folder(&root, "/", "f").expect("mkdir f");

        service.add_folder(&root, "/f", "x").expect("first mkdir");
        let err = service.add_folder(&root, "/f", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        assert_eq!(names(&service, &root, "/f"), vec!["x"]);
    }
}

#[test]
fn test_concurrent_add_folder_has_one_winner() {
    let service = memory_service();
    let root = TenantRoot::DEFAULT;

    let successes = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| service.add_folder(&root, "/", "race").is_ok()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|ok| *ok)
            .count()
    });

    assert_eq!(successes, 1);
    assert_eq!(names(&service, &root, "/"), vec!["race"]);
}

#[test]
fn test_copy_then_merge() {
    let service = memory_service();
    let root = TenantRoot::DEFAULT;

    service.add_folder(&root, "/", "a").expect("mkdir a");
    service.add_folder(&root, "/a", "sub").expect("mkdir a/sub");
    service.add_folder(&root, "/a", "empty").expect("mkdir a/empty");
    write(&service, &root, "/a/one.txt", b"1");
    write(&service, &root, "/a/sub/two.txt", b"2");

    let copied = service.copy_resource(&root, "/a", "/b").expect("copy");
    assert_eq!(copied.kind, ResourceKind::Folder);
    assert_eq!(names(&service, &root, "/b"), vec!["empty", "one.txt", "sub"]);
    assert_eq!(read(&service, &root, "/b/sub/two.txt"), b"2");

    // Changes in the source merge into the existing copy
    write(&service, &root, "/a/three.txt", b"3");
    write(&service, &root, "/a/one.txt", b"one");
    service.copy_resource(&root, "/a", "/b").expect("merge");

    assert_eq!(
        names(&service, &root, "/b"),
        vec!["empty", "one.txt", "sub", "three.txt"]
    );
    assert_eq!(read(&service, &root, "/b/one.txt"), b"one");
    assert_eq!(names(&service, &root, "/b/sub"), vec!["two.txt"]);
}

#[test]
fn test_copy_rejects_mixed_kinds() {
    let service = memory_service();
    let root = TenantRoot::DEFAULT;
    service.add_folder(&root, "/", "dir").expect("mkdir");
    write(&service, &root, "/file.txt", b"x");

    let err = service.copy_resource(&root, "/file.txt", "/dir").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = service.copy_resource(&root, "/dir", "/file.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = service.copy_resource(&root, "/missing", "/x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_remove_is_recursive() {
    let service = memory_service();
    let root = TenantRoot::DEFAULT;
    service.add_folder(&root, "/", "a").expect("mkdir");
    service.add_folder(&root, "/a", "b").expect("mkdir");
    write(&service, &root, "/a/b/c.txt", b"c");

    service.remove_resource(&root, "/a").expect("remove");
    assert!(service.get_all_resources(&root).expect("list").is_empty());
    assert_eq!(
        service.remove_resource(&root, "/a").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_sqlite_persists_across_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let root = TenantRoot::new("site-1").expect("tenant");

    {
        let service = sqlite_service(&dir);
        service.add_folder(&root, "/", "docs").expect("mkdir");
        write(&service, &root, "/docs/readme.md", b"# hi");
    }

    let service = sqlite_service(&dir);
    let file = service
        .get_resource(&root, "/docs/readme.md")
        .expect("lookup")
        .expect("file survived reopen");
    assert_eq!(file.size, 4);
    assert!(file.last_modified.is_some());
    assert_eq!(read(&service, &root, "/docs/readme.md"), b"# hi");

    let other = TenantRoot::new("site-2").expect("tenant");
    assert!(service.get_all_resources(&other).expect("list").is_empty());
}

#[test]
fn test_resolve_confines_and_is_idempotent() {
    let root = TenantRoot::new("acme").expect("tenant");
    let base = resolve(&root, &CanonicalPath::root(), "site/css").expect("base");

    for escaping in ["../../..", "../../../etc/passwd", "/../x", "a/../../../../b"] {
        assert!(
            resolve(&root, &base, escaping).is_err(),
            "{} escaped",
            escaping
        );
    }

    for inner in ["img/./logo.png", "../js//app.js", "/docs/", "", "a\\b"] {
        let once = resolve(&root, &base, inner).expect("resolves");
        let twice = resolve(&root, &CanonicalPath::root(), once.as_str()).expect("re-resolves");
        assert_eq!(once, twice);
    }
}

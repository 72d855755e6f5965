//! Integration tests for zip extraction and export

use folio::config::FileCollisionPolicy;
use folio::storage::MemoryStorage;
use folio::{Config, ErrorKind, ResourceKind, ResourceService, TenantRoot};
use std::io::{Cursor, Write};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn create_test_service(config: Config) -> (ResourceService, TenantRoot) {
    let service = ResourceService::new(Arc::new(MemoryStorage::new()), config)
        .expect("Failed to build service");
    (service, TenantRoot::new("acme").expect("tenant"))
}

fn write(service: &ResourceService, root: &TenantRoot, path: &str, data: &[u8]) {
    let mut writer = service
        .open_output_stream(root, path)
        .unwrap_or_else(|e| panic!("Failed to open {}: {}", path, e));
    writer.write_all(data).expect("Failed to write");
    writer.finish().expect("Failed to finish");
}

/// Builds a zip from (name, content) pairs; `None` content is a directory
fn build_zip(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        match content {
            Some(content) => {
                writer.start_file(*name, options).expect("start_file");
                writer.write_all(content.as_bytes()).expect("write entry");
            }
            None => writer.add_directory(*name, options).expect("add_directory"),
        }
    }
    writer.finish().expect("finish").into_inner()
}

/// (relative path, kind, content) of everything beneath a folder
fn snapshot(
    service: &ResourceService,
    root: &TenantRoot,
    folder: &str,
) -> Vec<(String, ResourceKind, Vec<u8>)> {
    let folder = service.resolve(root, folder).expect("resolve");
    service
        .tree()
        .list_subtree(root, &folder)
        .expect("list")
        .into_iter()
        .map(|r| {
            let relative = r.path.strip_prefix(&folder).unwrap_or_default().to_string();
            let content = match r.kind {
                ResourceKind::File => service.tree().read_bytes(root, &r.path).expect("read"),
                ResourceKind::Folder => Vec::new(),
            };
            (relative, r.kind, content)
        })
        .collect()
}

#[test]
fn test_export_then_extract_round_trip() {
    let (service, root) = create_test_service(Config::default());

    service.add_folder(&root, "/", "src").expect("mkdir");
    service.add_folder(&root, "/src", "css").expect("mkdir");
    service.add_folder(&root, "/src", "empty").expect("mkdir");
    service.add_folder(&root, "/src/css", "vendor").expect("mkdir");
    write(&service, &root, "/src/index.html", b"<html></html>");
    write(&service, &root, "/src/css/site.css", b"body {}");
    write(&service, &root, "/src/css/vendor/reset.css", b"");

    let bytes = service.export_zip(&root, "/src").expect("export");

    service.add_folder(&root, "/", "fresh").expect("mkdir");
    write(&service, &root, "/fresh/bundle.zip", &bytes);
    let report = service
        .extract_zip(&root, "/fresh/bundle.zip", true, true)
        .expect("extract");

    assert_eq!(report.target.as_str(), "fresh/bundle");
    assert_eq!(report.files_written.len(), 3);
    assert!(report.archive_removed);
    assert!(service
        .get_resource(&root, "/fresh/bundle.zip")
        .expect("lookup")
        .is_none());

    assert_eq!(
        snapshot(&service, &root, "/src"),
        snapshot(&service, &root, "/fresh/bundle")
    );
}

#[test]
fn test_zip_slip_is_rejected_without_side_effects() {
    let (service, root) = create_test_service(Config::default());
    service.add_folder(&root, "/", "target").expect("mkdir");

    let bytes = build_zip(&[("ok.txt", Some("fine")), ("../../evil", Some("pwned"))]);
    write(&service, &root, "/target/evil.zip", &bytes);
    let before = snapshot(&service, &root, "/");

    for create_folder in [false, true] {
        let err = service
            .extract_zip(&root, "/target/evil.zip", create_folder, true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArchive);
        assert_eq!(snapshot(&service, &root, "/"), before);
    }
}

#[test]
fn test_extraction_is_idempotent_on_folders() {
    let (service, root) = create_test_service(Config::default());
    service.add_folder(&root, "/", "site").expect("mkdir");
    service.add_folder(&root, "/site", "img").expect("mkdir");

    let bytes = build_zip(&[("img/", None), ("img/a.png", Some("A")), ("new/", None)]);
    write(&service, &root, "/site/assets.zip", &bytes);

    let report = service
        .extract_zip(&root, "/site/assets.zip", false, false)
        .expect("extract");
    assert_eq!(report.target.as_str(), "site");
    assert_eq!(report.folders_created, 1);
    assert!(!report.archive_removed);

    // Running it again only overwrites files
    service
        .extract_zip(&root, "/site/assets.zip", false, false)
        .expect("extract again");

    let names: Vec<String> = service
        .get_resources(&root, "/site")
        .expect("list")
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["assets.zip", "img", "new"]);
}

#[test]
fn test_create_folder_collision() {
    let (service, root) = create_test_service(Config::default());
    service.add_folder(&root, "/", "bundle").expect("mkdir");
    write(&service, &root, "/bundle.zip", &build_zip(&[("a.txt", Some("a"))]));

    let err = service
        .extract_zip(&root, "/bundle.zip", true, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn test_file_collision_policy() {
    let mut config = Config::default();
    config.archive.file_collision = FileCollisionPolicy::Fail;
    let (service, root) = create_test_service(config);

    write(&service, &root, "/a.txt", b"old");
    write(&service, &root, "/pack.zip", &build_zip(&[("a.txt", Some("new"))]));

    let err = service
        .extract_zip(&root, "/pack.zip", false, true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    // The archive stays when extraction stops early
    assert!(service.get_resource(&root, "/pack.zip").expect("lookup").is_some());
}

#[test]
fn test_corrupt_and_missing_archives() {
    let (service, root) = create_test_service(Config::default());
    write(&service, &root, "/junk.zip", b"definitely not a zip");

    let err = service.extract_zip(&root, "/junk.zip", true, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArchive);

    let err = service.extract_zip(&root, "/none.zip", true, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

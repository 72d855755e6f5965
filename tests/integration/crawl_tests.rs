//! Integration tests for web page ingestion
//!
//! These tests use wiremock to create mock HTTP servers and run whole
//! crawl jobs end-to-end against an in-memory tree.

use folio::storage::MemoryStorage;
use folio::{CrawlOutcome, CrawlReport, FetchError, ResourceService, TenantRoot};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a service with fast-failing fetches and a `site` folder to crawl into
fn create_test_service() -> (ResourceService, TenantRoot) {
    let mut config = folio::Config::default();
    config.crawler.max_retries = 0;
    config.crawler.request_timeout_secs = 5;
    config.crawler.connect_timeout_secs = 2;

    let service = ResourceService::new(Arc::new(MemoryStorage::new()), config)
        .expect("Failed to build service");
    let root = TenantRoot::new("acme").expect("Invalid tenant");
    service
        .add_folder(&root, "/", "site")
        .expect("Failed to create site folder");
    (service, root)
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

fn read_text(service: &ResourceService, root: &TenantRoot, file: &str) -> String {
    let mut content = String::new();
    service
        .open_input_stream(root, file)
        .unwrap_or_else(|e| panic!("Failed to open {}: {}", file, e))
        .read_to_string(&mut content)
        .expect("Failed to read");
    content
}

fn paths(list: &[folio::CanonicalPath]) -> Vec<String> {
    list.iter().map(|p| p.as_str().to_string()).collect()
}

async fn crawl(
    service: &ResourceService,
    root: &TenantRoot,
    url: &str,
    follow_links: bool,
) -> CrawlOutcome {
    service
        .crawl_web_page(root, "/site", url, follow_links)
        .expect("Crawl did not start")
        .wait()
        .await
}

fn expect_done(outcome: CrawlOutcome) -> CrawlReport {
    match outcome {
        CrawlOutcome::Done(report) => report,
        CrawlOutcome::Failed { error, .. } => panic!("Crawl failed: {}", error),
    }
}

#[tokio::test]
async fn test_same_image_twice_is_downloaded_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        format!(
            r#"<html><body><img src="/logo.png"><p>text</p><img src="{}/logo.png"></body></html>"#,
            base
        ),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"PNGDATA".to_vec(), "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let (service, root) = create_test_service();
    let report = expect_done(crawl(&service, &root, &format!("{}/", base), false).await);

    assert_eq!(paths(&report.pages_written), vec!["site/index.html"]);
    assert_eq!(paths(&report.resources_written), vec!["site/logo.png"]);
    assert!(report.failures.is_empty());

    let page = read_text(&service, &root, "/site/index.html");
    assert_eq!(page.matches(r#"src="logo.png""#).count(), 2);
    assert!(!page.contains(&base));
    assert_eq!(read_text(&service, &root, "/site/logo.png"), "PNGDATA");
}

#[tokio::test]
async fn test_seed_failure_fails_job_and_writes_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (service, root) = create_test_service();
    let outcome = crawl(&service, &root, &format!("{}/gone", server.uri()), true).await;

    match outcome {
        CrawlOutcome::Failed { error, .. } => {
            assert!(matches!(error, FetchError::Http { status: 404, .. }))
        }
        other => panic!("Expected failure, got {:?}", other),
    }

    let all = service.get_all_resources(&root).expect("Failed to list");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].path.as_str(), "site");
}

#[tokio::test]
async fn test_follow_links_only_enqueues_same_site() {
    let server = MockServer::start().await;
    let other = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        format!(
            r#"<html><body>
                <a href="/about#team">About</a>
                <a href="{}/page">Elsewhere</a>
            </body></html>"#,
            other.uri()
        ),
    )
    .await;
    mount_page(
        &server,
        "/about",
        r#"<html><body><a href="/">Home</a></body></html>"#.to_string(),
    )
    .await;

    Mock::given(method("GET"))
        .respond_with(html("<html></html>".to_string()))
        .expect(0)
        .mount(&other)
        .await;

    let (service, root) = create_test_service();
    let report = expect_done(crawl(&service, &root, &format!("{}/", base), true).await);

    assert_eq!(
        paths(&report.pages_written),
        vec!["site/about/index.html", "site/index.html"]
    );

    let seed = read_text(&service, &root, "/site/index.html");
    assert!(seed.contains(r#"href="about/index.html#team""#));
    assert!(seed.contains(&format!(r#"href="{}/page""#, other.uri())));

    let about = read_text(&service, &root, "/site/about/index.html");
    assert!(about.contains(r#"href="../index.html""#));

    assert!(service
        .get_resource(&root, "/site/_external")
        .expect("Lookup failed")
        .is_none());
}

#[tokio::test]
async fn test_links_stay_absolute_without_follow_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/about">About</a></body></html>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html("<html></html>".to_string()))
        .expect(0)
        .mount(&server)
        .await;

    let (service, root) = create_test_service();
    let report = expect_done(crawl(&service, &root, &format!("{}/", base), false).await);

    assert_eq!(report.pages_written.len(), 1);
    let seed = read_text(&service, &root, "/site/index.html");
    assert!(seed.contains(&format!(r#"href="{}/about""#, base)));
}

#[tokio::test]
async fn test_failed_resource_is_reported_and_left_absolute() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><head><link rel="stylesheet" href="style.css"></head><body><img src="broken.png"></body></html>"#
            .to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("body {}", "text/css"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (service, root) = create_test_service();
    let report = expect_done(crawl(&service, &root, &format!("{}/", base), false).await);

    assert_eq!(paths(&report.resources_written), vec!["site/style.css"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].url, format!("{}/broken.png", base));
    assert!(matches!(
        report.failures[0].error,
        FetchError::Http { status: 500, .. }
    ));

    let seed = read_text(&service, &root, "/site/index.html");
    assert!(seed.contains(r#"href="style.css""#));
    assert!(seed.contains(&format!(r#"src="{}/broken.png""#, base)));
}

#[tokio::test]
async fn test_links_to_failed_pages_are_repaired() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/missing">Missing</a><a href="/ok">Ok</a></body></html>"#
            .to_string(),
    )
    .await;
    mount_page(&server, "/ok", "<html><body>ok</body></html>".to_string()).await;

    let (service, root) = create_test_service();
    let report = expect_done(crawl(&service, &root, &format!("{}/", base), true).await);

    assert_eq!(report.pages_written.len(), 2);
    assert_eq!(report.failures.len(), 1);

    let seed = read_text(&service, &root, "/site/index.html");
    assert!(seed.contains(&format!(r#"href="{}/missing""#, base)));
    assert!(seed.contains(r#"href="ok/index.html""#));
}

#[tokio::test]
async fn test_page_budget_leaves_extra_links_absolute() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/one">1</a><a href="/two">2</a></body></html>"#.to_string(),
    )
    .await;
    mount_page(&server, "/one", "<html></html>".to_string()).await;
    Mock::given(method("GET"))
        .and(path("/two"))
        .respond_with(html("<html></html>".to_string()))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = folio::Config::default();
    config.crawler.max_pages = 2;
    let service = ResourceService::new(Arc::new(MemoryStorage::new()), config)
        .expect("Failed to build service");
    let root = TenantRoot::DEFAULT;
    service.add_folder(&root, "/", "site").expect("mkdir");

    let report = expect_done(crawl(&service, &root, &format!("{}/", base), true).await);
    assert_eq!(
        paths(&report.pages_written),
        vec!["site/index.html", "site/one/index.html"]
    );

    let seed = read_text(&service, &root, "/site/index.html");
    assert!(seed.contains(r#"href="one/index.html""#));
    assert!(seed.contains(&format!(r#"href="{}/two""#, base)));
}

#[tokio::test]
async fn test_cross_site_resources_go_to_external_folder() {
    let server = MockServer::start().await;
    let cdn = MockServer::start().await;
    let cdn_port = url::Url::parse(&cdn.uri())
        .expect("Failed to parse CDN URL")
        .port()
        .expect("CDN URL has a port");

    mount_page(
        &server,
        "/blog/post",
        format!(
            r#"<html><body><img src="../img/a.png"><script src="{}/lib/app.js"></script></body></html>"#,
            cdn.uri()
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/img/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"A".to_vec(), "image/png"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/lib/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("1;", "application/javascript"))
        .mount(&cdn)
        .await;

    let (service, root) = create_test_service();
    let report = expect_done(
        crawl(&service, &root, &format!("{}/blog/post", server.uri()), false).await,
    );

    let external = format!("site/_external/127.0.0.1-{}/lib/app.js", cdn_port);
    assert_eq!(paths(&report.pages_written), vec!["site/blog/post/index.html"]);
    assert_eq!(
        paths(&report.resources_written),
        vec![external.clone(), "site/img/a.png".to_string()]
    );

    let page = read_text(&service, &root, "/site/blog/post/index.html");
    assert!(page.contains(r#"src="../../img/a.png""#));
    assert!(page.contains(&format!(
        r#"src="../../_external/127.0.0.1-{}/lib/app.js""#,
        cdn_port
    )));
}

#[tokio::test]
async fn test_non_html_seed_is_stored_verbatim() {
    let server = MockServer::start().await;
    let body = r#"{"href": "/x"}"#;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let (service, root) = create_test_service();
    let report = expect_done(crawl(&service, &root, &format!("{}/data", server.uri()), true).await);

    assert_eq!(paths(&report.pages_written), vec!["site/data/index.html"]);
    assert!(report.resources_written.is_empty());
    assert_eq!(read_text(&service, &root, "/site/data/index.html"), body);
}

#[tokio::test]
async fn test_invalid_seed_url_fails_through_handle() {
    let (service, root) = create_test_service();
    let outcome = crawl(&service, &root, "not a url", false).await;

    assert!(matches!(
        outcome,
        CrawlOutcome::Failed {
            error: FetchError::InvalidUrl { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_resource_shared_across_pages_is_downloaded_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><img src="/shared.png"><a href="/about">About</a></body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        &server,
        "/about",
        r#"<html><body><img src="/shared.png"></body></html>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/shared.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"PNG".to_vec(), "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let (service, root) = create_test_service();
    let report = expect_done(crawl(&service, &root, &format!("{}/", base), true).await);

    assert_eq!(
        paths(&report.pages_written),
        vec!["site/about/index.html", "site/index.html"]
    );
    assert_eq!(paths(&report.resources_written), vec!["site/shared.png"]);

    let seed = read_text(&service, &root, "/site/index.html");
    assert!(seed.contains(r#"src="shared.png""#));
    let about = read_text(&service, &root, "/site/about/index.html");
    assert!(about.contains(r#"src="../shared.png""#));
}

#[tokio::test]
async fn test_cancel_stops_scheduling_and_keeps_written_pages() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/slow">1</a><a href="/b">2</a><a href="/c">3</a></body></html>"#
            .to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html></html>".to_string()).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    for route in ["/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html("<html></html>".to_string()))
            .expect(0)
            .mount(&server)
            .await;
    }

    let mut config = folio::Config::default();
    config.crawler.max_retries = 0;
    config.crawler.max_concurrent_pages = 1;
    let service = ResourceService::new(Arc::new(MemoryStorage::new()), config)
        .expect("Failed to build service");
    let root = TenantRoot::DEFAULT;
    service.add_folder(&root, "/", "site").expect("mkdir");

    let handle = service
        .crawl_web_page(&root, "/site", &format!("{}/", base), true)
        .expect("Crawl did not start");

    // Cancel once the seed is stored, while the first linked page is still loading
    let mut seed_stored = false;
    for _ in 0..200 {
        if service
            .get_resource(&root, "/site/index.html")
            .expect("Lookup failed")
            .is_some()
        {
            seed_stored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(seed_stored, "seed page was never stored");
    handle.cancel();

    let report = expect_done(handle.wait().await);
    assert!(report.cancelled);
    assert!(paths(&report.pages_written).contains(&"site/index.html".to_string()));

    let seed = read_text(&service, &root, "/site/index.html");
    assert!(seed.contains(&format!(r#"href="{}/b""#, base)));
    assert!(seed.contains(&format!(r#"href="{}/c""#, base)));
    assert!(service
        .get_resource(&root, "/site/b/index.html")
        .expect("Lookup failed")
        .is_none());
}

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use common::MockTransport;
use fetchcache::config::DEFAULT_USER_AGENT;
use fetchcache::{
    CacheKey, DeleteStatus, FetchConfig, FetchEngine, FetchError, KeyedConcurrencyManager, Method,
    Origin, Payload, RequestIdentity, StorageError, TransportError, TransportErrorKind,
};
use tempfile::TempDir;

const URL: &str = "http://example.test/a";

fn config(dir: &Path) -> FetchConfig {
    FetchConfig {
        cache_dir: dir.to_path_buf(),
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

fn engine(config: FetchConfig, transport: MockTransport) -> FetchEngine<MockTransport> {
    FetchEngine::new(config, transport).unwrap()
}

fn key_for(method: Method, url: &str) -> CacheKey {
    CacheKey::derive(&RequestIdentity::new(method, url).user_agent(DEFAULT_USER_AGENT))
}

fn response_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.starts_with("RESPON-"))
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

fn trust_anchor(dir: &Path) -> PathBuf {
    let path = dir.join("ca.pem");
    fs::write(&path, "-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----\n").unwrap();
    path
}

#[tokio::test]
async fn cacheable_response_is_stored_and_served_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let cache_dir = temp_dir.path().join("cache");
    let url = "https://example.test/a";
    let config = FetchConfig {
        ca_file: Some(trust_anchor(temp_dir.path())),
        ..config(&cache_dir)
    };
    let engine = engine(config, MockTransport::cacheable(3600, "hello"));

    let first = engine.get(url).await.unwrap();
    assert_eq!(first.origin, Origin::New);
    assert_eq!(first.status, 200);
    assert_eq!(first.error_code(), "");

    let expected = format!("RESPON-{}.3600", key_for(Method::Get, url));
    assert_eq!(response_files(&cache_dir), vec![expected.clone()]);
    assert_eq!(first.cache_file, Some(cache_dir.join(&expected)));

    let second = engine.get(url).await.unwrap();
    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(second.body, first.body);
    assert_eq!(second.headers, first.headers);
    assert_eq!(second.status, 200);
    assert_eq!(second.cache_file, Some(cache_dir.join(&expected)));
    assert_eq!(engine.transport().calls(), 1);
}

#[tokio::test]
async fn https_requires_a_readable_trust_anchor() {
    let temp_dir = TempDir::new().unwrap();

    let engine_without = engine(config(temp_dir.path()), MockTransport::cacheable(60, "x"));
    let err = engine_without.get("https://example.test/").await.unwrap_err();
    assert!(matches!(err, FetchError::Configuration(_)));

    let missing = FetchConfig {
        ca_file: Some(temp_dir.path().join("missing.pem")),
        ..config(temp_dir.path())
    };
    let engine_missing = engine(missing, MockTransport::cacheable(60, "x"));
    let err = engine_missing.get("https://example.test/").await.unwrap_err();
    assert!(matches!(err, FetchError::Configuration(_)));

    assert_eq!(engine_without.transport().calls(), 0);
    assert_eq!(engine_missing.transport().calls(), 0);

    // Plain http needs no trust anchor.
    assert!(engine_without.get("http://example.test/").await.is_ok());
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::cacheable(60, "x"));

    for url in ["example.test/a", "http://example.test", "ftp://example.test/", "http://bad_host/"] {
        let err = engine.get(url).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)), "{url}");
    }

    let err = engine
        .fetch_with_method(URL, "PUT", &Payload::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::InvalidRequest(_)));

    assert!(engine.fetch_with_method(URL, "HEAD", &Payload::new(), false).await.is_ok());
    assert_eq!(engine.transport().calls(), 1);
}

#[tokio::test]
async fn invalid_configuration_is_rejected_up_front() {
    let temp_dir = TempDir::new().unwrap();
    let config = FetchConfig {
        max_redirects: 51,
        ..config(temp_dir.path())
    };
    let result = FetchEngine::new(config, MockTransport::cacheable(60, "x"));
    assert!(matches!(result, Err(FetchError::Configuration(_))));
}

#[tokio::test]
async fn no_store_responses_are_not_cached() {
    let temp_dir = TempDir::new().unwrap();
    let transport = MockTransport::ok(200, &[("Cache-Control", "max-age=600, no-store")], "x");
    let engine = engine(config(temp_dir.path()), transport);

    let first = engine.get(URL).await.unwrap();
    let second = engine.get(URL).await.unwrap();

    assert_eq!(first.cache_file, None);
    assert_eq!(second.origin, Origin::New);
    assert_eq!(engine.transport().calls(), 2);
    assert!(response_files(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn only_ok_responses_are_cached() {
    let temp_dir = TempDir::new().unwrap();
    let transport = MockTransport::ok(404, &[("Cache-Control", "max-age=600")], "gone");
    let engine = engine(config(temp_dir.path()), transport);

    let result = engine.get(URL).await.unwrap();
    assert_eq!(result.status, 404);
    assert!(result.is_success());
    assert!(response_files(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn responses_without_caching_signal_are_not_cached() {
    let temp_dir = TempDir::new().unwrap();
    let transport = MockTransport::ok(200, &[("Content-Type", "text/html")], "x");
    let engine = engine(config(temp_dir.path()), transport);

    engine.get(URL).await.unwrap();
    assert!(response_files(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn forced_max_age_extends_header_ttl() {
    let temp_dir = TempDir::new().unwrap();
    let config = FetchConfig {
        forced_max_age: 500,
        ..config(temp_dir.path())
    };
    let engine = engine(config, MockTransport::cacheable(100, "x"));

    engine.get(URL).await.unwrap();
    assert_eq!(
        response_files(temp_dir.path()),
        vec![format!("RESPON-{}.500", key_for(Method::Get, URL))]
    );
}

#[tokio::test]
async fn forced_max_age_respects_no_store_unless_allowed() {
    let no_store = || MockTransport::ok(200, &[("Cache-Control", "no-store")], "x");

    let temp_dir = TempDir::new().unwrap();
    let strict_headers = FetchConfig {
        forced_max_age: 500,
        ..config(temp_dir.path())
    };
    engine(strict_headers, no_store()).get(URL).await.unwrap();
    assert!(response_files(temp_dir.path()).is_empty());

    let permissive = FetchConfig {
        forced_max_age: 500,
        override_forbidden: true,
        ..config(temp_dir.path())
    };
    engine(permissive, no_store()).get(URL).await.unwrap();
    assert_eq!(
        response_files(temp_dir.path()),
        vec![format!("RESPON-{}.500", key_for(Method::Get, URL))]
    );
}

#[tokio::test]
async fn negative_forced_max_age_never_reads_or_writes_the_cache() {
    let temp_dir = TempDir::new().unwrap();

    // Seed a valid entry with caching on.
    let seeding = engine(config(temp_dir.path()), MockTransport::cacheable(3600, "seed"));
    seeding.get(URL).await.unwrap();
    let seeded = response_files(temp_dir.path());
    assert_eq!(seeded.len(), 1);

    let disabled = FetchConfig {
        forced_max_age: -1,
        ..config(temp_dir.path())
    };
    let engine = engine(disabled, MockTransport::cacheable(60, "fresh"));

    for url in [URL, "http://example.test/other"] {
        let result = engine.get(url).await.unwrap();
        assert_eq!(result.origin, Origin::New);
        assert_eq!(result.cache_file, None);
    }
    assert_eq!(engine.transport().calls(), 2);
    assert_eq!(response_files(temp_dir.path()), seeded);
}

#[tokio::test(start_paused = true)]
async fn dns_failures_exhaust_retries_then_degrade() {
    let temp_dir = TempDir::new().unwrap();
    let config = FetchConfig {
        retry_delay: Duration::from_secs(1),
        ..config(temp_dir.path())
    };
    let engine = engine(config, MockTransport::failing(TransportErrorKind::DnsResolution));

    let result = engine.get(URL).await.unwrap();

    assert_eq!(engine.transport().calls(), 21);
    assert_eq!(result.status, 0);
    assert!(result.headers.is_empty());
    assert!(result.body.is_empty());
    assert_eq!(result.error, Some(TransportErrorKind::DnsResolution));
    assert_eq!(result.error_code(), "dns_resolution");
    assert_eq!(result.origin, Origin::New);
    assert!(response_files(temp_dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn dns_failures_in_strict_mode_are_hard_errors() {
    let temp_dir = TempDir::new().unwrap();
    let config = FetchConfig {
        strict: true,
        ..config(temp_dir.path())
    };
    let engine = engine(config, MockTransport::failing(TransportErrorKind::DnsResolution));

    let diagnostic = match engine.get(URL).await {
        Err(FetchError::Transport(diagnostic)) => diagnostic,
        other => panic!("expected a transport error, got {other:?}"),
    };
    assert_eq!(engine.transport().calls(), 21);
    assert_eq!(diagnostic.kind, TransportErrorKind::DnsResolution);
    assert_eq!(diagnostic.retries, 20);
    assert_eq!(diagnostic.url, URL);
    assert!(diagnostic.to_string().contains("dns_resolution"));
    assert_eq!(diagnostic.status, None);
}

#[tokio::test]
async fn strict_diagnostic_carries_last_status() {
    let temp_dir = TempDir::new().unwrap();
    let config = FetchConfig {
        strict: true,
        ..config(temp_dir.path())
    };
    let engine = engine(
        config,
        MockTransport::with(|_| {
            Err(TransportError::new(TransportErrorKind::TooManyRedirects, "more than 5 redirects")
                .with_status(301))
        }),
    );

    let diagnostic = match engine.get(URL).await {
        Err(FetchError::Transport(diagnostic)) => diagnostic,
        other => panic!("expected a transport error, got {other:?}"),
    };
    assert_eq!(engine.transport().calls(), 1);
    assert_eq!(diagnostic.status, Some(301));
    assert!(diagnostic.to_string().contains("status:    301"));
}

#[tokio::test]
async fn other_transport_failures_are_not_retried() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::failing(TransportErrorKind::Connect));

    let result = engine.get(URL).await.unwrap();
    assert_eq!(engine.transport().calls(), 1);
    assert_eq!(result.error_code(), "connect");
}

#[tokio::test]
async fn post_payload_is_form_encoded() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::cacheable(60, "ok"));

    let payload = Payload::new().field("a", "1").field("b", "2 x");
    let result = engine.post(URL, &payload).await.unwrap();

    let request = engine.transport().last_request();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.body.as_deref(), Some("a=1&b=2%20x"));
    assert!(
        request
            .headers
            .contains(&("content-type".to_string(), "application/x-www-form-urlencoded".to_string()))
    );
    assert_eq!(result.request_body, "a=1&b=2%20x");
}

#[tokio::test]
async fn payload_is_ignored_for_get() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::cacheable(60, "ok"));

    let payload = Payload::new().field("ignored", "yes");
    let first = engine.fetch(URL, Method::Get, &payload, false).await.unwrap();
    assert_eq!(engine.transport().last_request().body, None);
    assert_eq!(first.request_body, "");

    // Same key as a GET without payload.
    let second = engine.get(URL).await.unwrap();
    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(engine.transport().calls(), 1);
}

#[tokio::test]
async fn post_and_get_do_not_share_entries() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::cacheable(60, "ok"));

    engine.get(URL).await.unwrap();
    let posted = engine.post(URL, &Payload::new().field("a", "1")).await.unwrap();
    assert_eq!(posted.origin, Origin::New);
    assert_eq!(response_files(temp_dir.path()).len(), 2);
}

#[tokio::test]
async fn bypass_skips_lookup_but_refreshes_entry() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::cacheable(60, "ok"));

    engine.get(URL).await.unwrap();
    let bypassed = engine.fetch(URL, Method::Get, &Payload::new(), true).await.unwrap();
    assert_eq!(bypassed.origin, Origin::New);
    assert_eq!(engine.transport().calls(), 2);
    assert!(bypassed.cache_file.is_some());
    assert_eq!(response_files(temp_dir.path()).len(), 1);
}

#[tokio::test]
async fn configured_headers_and_user_agent_are_sent() {
    let temp_dir = TempDir::new().unwrap();
    let config = FetchConfig {
        headers: vec!["Accept: text/html".into(), "X-Trace: 1".into()],
        user_agent: Some("crawler/2.0".into()),
        ..config(temp_dir.path())
    };
    let engine = engine(config, MockTransport::cacheable(60, "ok"));

    let result = engine.get(URL).await.unwrap();
    let request = engine.transport().last_request();
    assert_eq!(
        request.headers,
        vec![
            ("Accept".to_string(), "text/html".to_string()),
            ("X-Trace".to_string(), "1".to_string()),
        ]
    );
    assert_eq!(request.user_agent, "crawler/2.0");
    assert_eq!(result.user_agent, "crawler/2.0");
}

#[tokio::test]
async fn cookie_file_is_resolved_per_host() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::cacheable(60, "ok"));

    let result = engine.get(URL).await.unwrap();
    let expected = temp_dir.path().join(format!(
        "COOKIE-{}.2592000",
        CacheKey::for_host("example.test")
    ));
    assert_eq!(result.cookie_file, Some(expected.clone()));
    assert_eq!(engine.transport().last_request().cookie_file, Some(expected));
}

#[tokio::test]
async fn cookies_can_be_disabled() {
    let temp_dir = TempDir::new().unwrap();
    let config = FetchConfig {
        cookies_enabled: false,
        ..config(temp_dir.path())
    };
    let engine = engine(config, MockTransport::cacheable(60, "ok"));

    let result = engine.get(URL).await.unwrap();
    assert_eq!(result.cookie_file, None);
    assert_eq!(engine.transport().last_request().cookie_file, None);
}

#[tokio::test]
async fn expired_entries_are_refetched() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::cacheable(10, "ok"));

    let first = engine.get(URL).await.unwrap();
    let path = first.cache_file.unwrap();
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(10)).unwrap();
    drop(file);

    let second = engine.get(URL).await.unwrap();
    assert_eq!(second.origin, Origin::New);
    assert_eq!(engine.transport().calls(), 2);
}

#[tokio::test]
async fn corrupt_entries_are_treated_as_misses() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::cacheable(60, "ok"));

    let first = engine.get(URL).await.unwrap();
    fs::write(first.cache_file.as_ref().unwrap(), b"garbage").unwrap();

    let second = engine.get(URL).await.unwrap();
    assert_eq!(second.origin, Origin::New);
    assert_eq!(engine.transport().calls(), 2);

    let third = engine.get(URL).await.unwrap();
    assert_eq!(third.origin, Origin::Cache);
}

#[tokio::test]
async fn unusable_cache_dir_degrades_to_uncached_fetches() {
    let temp_dir = TempDir::new().unwrap();
    let not_a_dir = temp_dir.path().join("cache");
    fs::write(&not_a_dir, b"plain file").unwrap();
    let config = FetchConfig {
        purge_on_request: true,
        ..config(&not_a_dir)
    };
    let engine = engine(config, MockTransport::cacheable(60, "ok"));

    for _ in 0..2 {
        let result = engine.get(URL).await.unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.origin, Origin::New);
        assert_eq!(result.cache_file, None);
        assert_eq!(result.cookie_file, None);
        assert_eq!(result.error_code(), "");
    }
    assert_eq!(engine.transport().calls(), 2);
    assert_eq!(fs::read(&not_a_dir).unwrap(), b"plain file");
}

#[tokio::test]
async fn purge_on_request_removes_expired_files() {
    let temp_dir = TempDir::new().unwrap();
    let stale = temp_dir
        .path()
        .join(format!("RESPON-{}.5", key_for(Method::Get, "http://example.test/old")));
    fs::write(&stale, b"{}").unwrap();
    let file = fs::File::options().write(true).open(&stale).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(60)).unwrap();
    drop(file);

    let config = FetchConfig {
        purge_on_request: true,
        ..config(temp_dir.path())
    };
    let engine = engine(config, MockTransport::cacheable(60, "ok"));
    engine.get(URL).await.unwrap();

    assert!(!stale.exists());
}

#[tokio::test]
async fn maintenance_operations_delegate_to_the_store() {
    let temp_dir = TempDir::new().unwrap();
    let engine = engine(config(temp_dir.path()), MockTransport::cacheable(60, "ok"));

    let result = engine.get(URL).await.unwrap();
    let name = result
        .cache_file
        .as_ref()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap()
        .to_string();

    assert_eq!(engine.purge_expired().await.unwrap().removed(), 0);
    assert_eq!(engine.delete_entry(&name).await.unwrap(), DeleteStatus::Deleted);
    assert_eq!(engine.delete_entry(&name).await.unwrap(), DeleteStatus::Missing);

    let err = engine.delete_entry("../../etc/passwd").await.unwrap_err();
    assert!(matches!(err, FetchError::Storage(StorageError::InvalidEntryName(_))));
}

#[tokio::test]
async fn duplicate_misses_are_allowed_by_default() {
    let temp_dir = TempDir::new().unwrap();
    let transport = MockTransport::cacheable(60, "ok").delayed(Duration::from_millis(50));
    let engine = engine(config(temp_dir.path()), transport);

    let (a, b) = tokio::join!(engine.get(URL), engine.get(URL));
    assert_eq!(a.unwrap().origin, Origin::New);
    assert_eq!(b.unwrap().origin, Origin::New);
    assert_eq!(engine.transport().calls(), 2);
    assert_eq!(response_files(temp_dir.path()).len(), 1);
}

#[tokio::test]
async fn keyed_single_flight_collapses_concurrent_misses() {
    let temp_dir = TempDir::new().unwrap();
    let transport = MockTransport::cacheable(60, "ok").delayed(Duration::from_millis(50));
    let engine = engine(config(temp_dir.path()), transport)
        .with_concurrency(KeyedConcurrencyManager::new());

    let (a, b) = tokio::join!(engine.get(URL), engine.get(URL));
    let mut origins = vec![a.unwrap().origin, b.unwrap().origin];
    origins.sort_by_key(|o| o.as_str());

    assert_eq!(origins, vec![Origin::Cache, Origin::New]);
    assert_eq!(engine.transport().calls(), 1);
}

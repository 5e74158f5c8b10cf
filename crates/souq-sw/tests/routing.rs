//! Fetch interception across strategies.

mod common;

use common::{config, url, MockFetcher, ORIGIN};
use http::Method;
use souq_sw::{Client, FetchOutcome, FetchStrategy, Registration, Request, ServiceWorkerError};
use url::Url;

const CACHE: &str = "souq-market-cache-v1";

async fn installed(strategy: FetchStrategy) -> (Registration<MockFetcher>, MockFetcher) {
    let fetcher = MockFetcher::with_shell();
    fetcher.route("/assets/app.js", 200, "console.log('souq')");
    let (registration, _rx) = Registration::new(Url::parse(ORIGIN).unwrap(), fetcher.clone());
    registration
        .register(config("v1").with_strategy(strategy))
        .await
        .unwrap();
    fetcher.reset_calls();
    (registration, fetcher)
}

fn respond(outcome: FetchOutcome) -> souq_sw::Response {
    match outcome {
        FetchOutcome::Respond(response) => response,
        FetchOutcome::Passthrough => panic!("expected the worker to respond"),
    }
}

#[tokio::test]
async fn test_cached_subresource_served_without_network() {
    let (registration, fetcher) = installed(FetchStrategy::CacheFirst).await;

    let response = respond(
        registration
            .handle_fetch(Request::get(url("/manifest.json")))
            .await
            .unwrap(),
    );

    assert!(response.from_cache);
    assert_eq!(response.text(), r#"{"name":"souq"}"#);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_uncached_subresource_is_stored() {
    let (registration, fetcher) = installed(FetchStrategy::CacheFirst).await;

    let response = respond(
        registration
            .handle_fetch(Request::get(url("/assets/app.js")))
            .await
            .unwrap(),
    );
    assert!(!response.from_cache);
    assert_eq!(response.body, b"console.log('souq')");
    assert_eq!(fetcher.calls(), 1);

    let entry = registration
        .caches()
        .match_in(CACHE, &url("/assets/app.js"))
        .await
        .unwrap();
    assert_eq!(entry.body, response.body);

    // Second request is a hit.
    let again = respond(
        registration
            .handle_fetch(Request::get(url("/assets/app.js")))
            .await
            .unwrap(),
    );
    assert!(again.from_cache);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_non_200_responses_are_not_stored() {
    let (registration, _fetcher) = installed(FetchStrategy::CacheFirst).await;

    let response = respond(
        registration
            .handle_fetch(Request::get(url("/missing.png")))
            .await
            .unwrap(),
    );
    assert_eq!(response.status, 404);
    assert!(registration
        .caches()
        .match_in(CACHE, &url("/missing.png"))
        .await
        .is_none());
}

#[tokio::test]
async fn test_cross_origin_and_mutating_requests_bypass_cache() {
    let (registration, fetcher) = installed(FetchStrategy::CacheFirst).await;
    let before = registration.caches().stats();

    let api = Request::get(Url::parse("https://project.supabase.co/rest/v1/posts").unwrap());
    assert!(registration.handle_fetch(api).await.unwrap().is_passthrough());

    let post = Request::get(url("/manifest.json")).method(Method::POST);
    assert!(registration.handle_fetch(post).await.unwrap().is_passthrough());

    let delete = Request::get(url("/api/comments/9")).method(Method::DELETE);
    assert!(registration.handle_fetch(delete).await.unwrap().is_passthrough());

    assert_eq!(registration.caches().stats(), before);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_navigation_serves_shell_for_any_path() {
    let (registration, fetcher) = installed(FetchStrategy::CacheFirst).await;

    let response = respond(
        registration
            .handle_fetch(Request::navigate(url("/deep/unknown/path")))
            .await
            .unwrap(),
    );

    assert_eq!(response.text(), "<html>shell</html>");
    assert!(response.from_cache);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_navigation_falls_back_to_live_shell() {
    let (registration, fetcher) = installed(FetchStrategy::CacheFirst).await;
    registration
        .caches()
        .delete_entry(CACHE, &url("/index.html"))
        .await;

    let response = respond(
        registration
            .handle_fetch(Request::navigate(url("/posts/42")))
            .await
            .unwrap(),
    );
    assert_eq!(response.text(), "<html>shell</html>");
    assert!(!response.from_cache);
    assert_eq!(fetcher.requests()[0].0, url("/index.html").to_string());

    fetcher.fail("/index.html");
    let err = registration
        .handle_fetch(Request::navigate(url("/posts/42")))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceWorkerError::NetworkError(_)));
}

#[tokio::test]
async fn test_cache_miss_network_failure_propagates() {
    let (registration, fetcher) = installed(FetchStrategy::CacheFirst).await;
    fetcher.fail("/assets/app.js");

    let err = registration
        .handle_fetch(Request::get(url("/assets/app.js")))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceWorkerError::NetworkError(_)));
}

#[tokio::test]
async fn test_cache_first_never_revalidates() {
    let (registration, fetcher) = installed(FetchStrategy::CacheFirst).await;
    fetcher.route("/manifest.json", 200, r#"{"name":"souq-v2"}"#);

    let response = respond(
        registration
            .handle_fetch(Request::get(url("/manifest.json")))
            .await
            .unwrap(),
    );
    assert_eq!(response.text(), r#"{"name":"souq"}"#);
}

#[tokio::test]
async fn test_network_first_prefers_network_and_falls_back() {
    let (registration, fetcher) = installed(FetchStrategy::NetworkFirst).await;
    fetcher.route("/manifest.json", 200, r#"{"name":"fresh"}"#);

    let fresh = respond(
        registration
            .handle_fetch(Request::get(url("/manifest.json")))
            .await
            .unwrap(),
    );
    assert_eq!(fresh.text(), r#"{"name":"fresh"}"#);
    assert!(!fresh.from_cache);

    fetcher.fail("/manifest.json");
    let offline = respond(
        registration
            .handle_fetch(Request::get(url("/manifest.json")))
            .await
            .unwrap(),
    );
    assert!(offline.from_cache);
    assert_eq!(offline.text(), r#"{"name":"fresh"}"#);
}

#[tokio::test]
async fn test_stale_while_revalidate_refreshes_in_background() {
    let (registration, fetcher) = installed(FetchStrategy::StaleWhileRevalidate).await;
    fetcher.route("/manifest.json", 200, r#"{"name":"fresh"}"#);

    let stale = respond(
        registration
            .handle_fetch(Request::get(url("/manifest.json")))
            .await
            .unwrap(),
    );
    assert_eq!(stale.text(), r#"{"name":"souq"}"#);

    registration.settle().await;
    let entry = registration
        .caches()
        .match_in(CACHE, &url("/manifest.json"))
        .await
        .unwrap();
    assert_eq!(entry.body, br#"{"name":"fresh"}"#);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_background_refreshes_are_reaped() {
    let (registration, fetcher) = installed(FetchStrategy::StaleWhileRevalidate).await;
    let worker = registration.active().await.unwrap();

    for _ in 0..200 {
        registration
            .handle_fetch(Request::get(url("/manifest.json")))
            .await
            .unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(fetcher.calls(), 200);

    // The next hit reaps every finished refresh before queueing its own.
    registration
        .handle_fetch(Request::get(url("/manifest.json")))
        .await
        .unwrap();
    assert_eq!(worker.pending_work().await, 1);

    registration.settle().await;
    assert_eq!(worker.pending_work().await, 0);
}

#[tokio::test]
async fn test_uncontrolled_client_is_not_intercepted() {
    let (registration, fetcher) = installed(FetchStrategy::CacheFirst).await;

    // Opened after activation, so never claimed.
    let page = Client::window(url("/home"));
    let page_id = page.id.clone();
    registration.clients().write().await.add(page);

    let request = Request::get(url("/manifest.json")).from_client(page_id);
    assert!(registration.handle_fetch(request.clone()).await.unwrap().is_passthrough());

    let response = registration.fetch(request).await.unwrap();
    assert!(!response.from_cache);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_no_active_worker_passes_through() {
    let fetcher = MockFetcher::with_shell();
    let (registration, _rx) = Registration::new(Url::parse(ORIGIN).unwrap(), fetcher);

    let outcome = registration
        .handle_fetch(Request::get(url("/index.html")))
        .await
        .unwrap();
    assert!(outcome.is_passthrough());
}

#[tokio::test]
async fn test_concurrent_misses_both_store() {
    let (registration, fetcher) = installed(FetchStrategy::CacheFirst).await;
    let registration = std::sync::Arc::new(registration);

    let a = tokio::spawn({
        let registration = registration.clone();
        async move { registration.handle_fetch(Request::get(url("/assets/app.js"))).await }
    });
    let b = tokio::spawn({
        let registration = registration.clone();
        async move { registration.handle_fetch(Request::get(url("/assets/app.js"))).await }
    });

    for handle in [a, b] {
        let response = respond(handle.await.unwrap().unwrap());
        assert_eq!(response.body, b"console.log('souq')");
    }
    assert!(fetcher.calls() >= 1);
    assert!(registration
        .caches()
        .match_in(CACHE, &url("/assets/app.js"))
        .await
        .is_some());
}

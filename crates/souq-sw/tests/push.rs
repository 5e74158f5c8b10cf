//! Push delivery and notification clicks.

mod common;

use common::{config, url, MockFetcher, ORIGIN};
use souq_sw::{ClickOutcome, Client, NotificationDefaults, PushMessage, Registration, ServiceWorkerError};
use url::Url;

async fn active_registration() -> Registration<MockFetcher> {
    let (registration, _rx) = Registration::new(Url::parse(ORIGIN).unwrap(), MockFetcher::with_shell());
    registration.register(config("v1")).await.unwrap();
    registration
}

#[tokio::test]
async fn test_plain_text_push_uses_fallback_title() {
    let registration = active_registration().await;

    let notification = registration
        .push(PushMessage::new("plain text alert"))
        .await
        .unwrap();

    assert_eq!(notification.title, NotificationDefaults::default().fallback_title);
    assert_eq!(notification.options.body, "plain text alert");
    assert_eq!(notification.options.data.url, "/");
    assert_eq!(registration.notifications().read().await.shown().len(), 1);
}

#[tokio::test]
async fn test_json_push_is_shown_with_fixed_icon() {
    let registration = active_registration().await;

    let notification = registration
        .push(PushMessage::new(
            r#"{"title":"منشور جديد","body":"علّق أحدهم على منشورك","url":"/posts/42"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(notification.title, "منشور جديد");
    assert_eq!(notification.options.icon, "./icons/icon.svg");
    assert_eq!(notification.options.badge, "./icons/icon.svg");
    assert_eq!(notification.options.vibrate, vec![200, 100, 200]);
    assert_eq!(notification.options.data.url, "/posts/42");
}

#[tokio::test]
async fn test_click_focuses_matching_window() {
    let registration = active_registration().await;

    let other = Client::window(url("/home"));
    let page = Client::window(Url::parse("https://souq.example/posts/42?from=feed#comments").unwrap());
    let page_id = page.id.clone();
    {
        let mut clients = registration.clients().write().await;
        clients.add(other);
        clients.add(page);
    }

    let notification = registration
        .push(PushMessage::new(r#"{"url":"/posts/42"}"#))
        .await
        .unwrap();
    let outcome = registration.notification_click(notification.id).await.unwrap();

    assert_eq!(outcome, ClickOutcome::Focused { client_id: page_id.clone() });
    let clients = registration.clients().read().await;
    assert!(clients.get(&page_id).unwrap().focused);
    assert_eq!(clients.len(), 2);
    assert!(registration.notifications().read().await.shown().is_empty());
}

#[tokio::test]
async fn test_click_opens_window_when_nothing_matches() {
    let registration = active_registration().await;
    registration.clients().write().await.add(Client::window(url("/home")));

    let notification = registration
        .push(PushMessage::new(r#"{"url":"/posts/7"}"#))
        .await
        .unwrap();
    let outcome = registration.notification_click(notification.id).await.unwrap();

    match outcome {
        ClickOutcome::Opened { client_id, url: opened } => {
            assert_eq!(opened, url("/posts/7"));
            let clients = registration.clients().read().await;
            assert!(clients.get(&client_id).unwrap().focused);
            assert_eq!(clients.len(), 2);
        }
        other => panic!("expected a new window, got {other:?}"),
    }
}

#[tokio::test]
async fn test_click_matches_uncontrolled_windows_on_origin() {
    let scope = Url::parse("https://souq.example/app/").unwrap();
    let fetcher = MockFetcher::new();
    for path in ["/app/", "/app/index.html", "/app/manifest.json", "/app/icons/icon.svg"] {
        fetcher.route(path, 200, "ok");
    }
    let (registration, _rx) = Registration::new(scope.clone(), fetcher);
    registration
        .register(souq_sw::WorkerConfig::for_scope(scope))
        .await
        .unwrap();

    // Outside the worker's scope, so never controlled.
    let settings = Client::window(url("/settings"));
    let settings_id = settings.id.clone();
    registration.clients().write().await.add(settings);

    let notification = registration
        .push(PushMessage::new(r#"{"url":"/settings"}"#))
        .await
        .unwrap();
    let outcome = registration.notification_click(notification.id).await.unwrap();
    assert_eq!(outcome, ClickOutcome::Focused { client_id: settings_id });
}

#[tokio::test]
async fn test_click_on_dismissed_notification() {
    let registration = active_registration().await;
    let notification = registration.push(PushMessage::empty()).await.unwrap();

    registration.notification_click(notification.id).await.unwrap();
    let err = registration.notification_click(notification.id).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::NotFound(_)));
}

#[tokio::test]
async fn test_push_without_active_worker() {
    let (registration, _rx) = Registration::new(Url::parse(ORIGIN).unwrap(), MockFetcher::with_shell());
    let err = registration.push(PushMessage::new("hi")).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::StateError(_)));
}

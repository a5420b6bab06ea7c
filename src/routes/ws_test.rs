use super::*;
use crate::state::test_helpers;
use tokio::time::{Duration, timeout};

async fn assert_channel_has_event(rx: &mut mpsc::Receiver<Event>) -> Event {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("event receive timed out")
        .expect("channel closed")
}

async fn assert_channel_empty(rx: &mut mpsc::Receiver<Event>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected channel to remain empty"
    );
}

async fn register(state: &AppState, session_id: Uuid, capacity: usize) -> (Uuid, mpsc::Receiver<Event>) {
    let subscriber_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(capacity);
    let mut watchers = state.watchers.write().await;
    watchers.entry(session_id).or_default().insert(subscriber_id, tx);
    (subscriber_id, rx)
}

// =============================================================================
// broadcast
// =============================================================================

#[tokio::test]
async fn broadcast_reaches_every_session_subscriber() {
    let state = test_helpers::test_app_state();
    let session_id = Uuid::new_v4();

    let (_, mut rx_a) = register(&state, session_id, 8).await;
    let (_, mut rx_b) = register(&state, session_id, 8).await;

    broadcast(&state, session_id, &Event::RoutesInvalidated).await;

    assert!(matches!(assert_channel_has_event(&mut rx_a).await, Event::RoutesInvalidated));
    assert!(matches!(assert_channel_has_event(&mut rx_b).await, Event::RoutesInvalidated));
}

#[tokio::test]
async fn broadcast_does_not_cross_sessions() {
    let state = test_helpers::test_app_state();
    let session_a = Uuid::new_v4();
    let session_b = Uuid::new_v4();

    let (_, mut rx_a) = register(&state, session_a, 8).await;
    let (_, mut rx_b) = register(&state, session_b, 8).await;

    broadcast(&state, session_a, &Event::SessionEnded).await;

    assert!(matches!(assert_channel_has_event(&mut rx_a).await, Event::SessionEnded));
    assert_channel_empty(&mut rx_b).await;
}

#[tokio::test]
async fn broadcast_without_subscribers_is_a_no_op() {
    let state = test_helpers::test_app_state();
    broadcast(&state, Uuid::new_v4(), &Event::RoutesInvalidated).await;
}

#[tokio::test]
async fn full_subscriber_channel_is_skipped_not_awaited() {
    let state = test_helpers::test_app_state();
    let session_id = Uuid::new_v4();

    let (_, mut rx_full) = register(&state, session_id, 1).await;
    let (_, mut rx_ok) = register(&state, session_id, 8).await;

    // Fill the one-slot channel, then broadcast twice more.
    broadcast(&state, session_id, &Event::RoutesInvalidated).await;
    broadcast(&state, session_id, &Event::SessionEnded).await;
    broadcast(&state, session_id, &Event::SessionEnded).await;

    // The healthy subscriber got all three; the full one only the first.
    assert!(matches!(assert_channel_has_event(&mut rx_ok).await, Event::RoutesInvalidated));
    assert!(matches!(assert_channel_has_event(&mut rx_ok).await, Event::SessionEnded));
    assert!(matches!(assert_channel_has_event(&mut rx_ok).await, Event::SessionEnded));

    assert!(matches!(assert_channel_has_event(&mut rx_full).await, Event::RoutesInvalidated));
    assert_channel_empty(&mut rx_full).await;
}

// =============================================================================
// deregister
// =============================================================================

#[tokio::test]
async fn deregister_removes_subscriber_and_prunes_empty_sessions() {
    let state = test_helpers::test_app_state();
    let session_id = Uuid::new_v4();

    let (subscriber_id, _rx) = register(&state, session_id, 8).await;
    deregister(&state, session_id, subscriber_id).await;

    let watchers = state.watchers.read().await;
    assert!(!watchers.contains_key(&session_id), "empty session entries are pruned");
}

#[tokio::test]
async fn deregister_keeps_remaining_subscribers() {
    let state = test_helpers::test_app_state();
    let session_id = Uuid::new_v4();

    let (gone_id, _rx_gone) = register(&state, session_id, 8).await;
    let (kept_id, mut rx_kept) = register(&state, session_id, 8).await;

    deregister(&state, session_id, gone_id).await;

    {
        let watchers = state.watchers.read().await;
        let subs = watchers.get(&session_id).expect("session entry remains");
        assert!(subs.contains_key(&kept_id));
        assert!(!subs.contains_key(&gone_id));
    }

    broadcast(&state, session_id, &Event::RoutesInvalidated).await;
    assert!(matches!(assert_channel_has_event(&mut rx_kept).await, Event::RoutesInvalidated));
}

#[tokio::test]
async fn deregister_unknown_session_is_a_no_op() {
    let state = test_helpers::test_app_state();
    deregister(&state, Uuid::new_v4(), Uuid::new_v4()).await;
}

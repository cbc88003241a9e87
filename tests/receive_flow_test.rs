mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use lnwallet::core::{ControllerConfig, ReceiveStatus};
use lnwallet::error::ErrorCategory;
use lnwallet::events::WalletEvent;
use lnwallet::notifications::NoticeKind;
use tokio::time::sleep;

use common::{drain_events, raw_payment, test_wallet, MockRepository, StaticDecoder, TestHarness};

fn event_types(events: &[WalletEvent]) -> Vec<&'static str> {
    events.iter().map(WalletEvent::event_type).collect()
}

fn stop_reasons(events: &[WalletEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            WalletEvent::PollStopped { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_paid_invoice_hides_dialog_stops_poll_and_reconciles() {
    let repository = MockRepository::new();
    let harness = TestHarness::new(repository.clone(), StaticDecoder::new());
    let controller = &harness.controller;
    let mut events = harness.event_bus.subscribe();

    controller.open_receive().await;
    let payment_request = controller.request_invoice(1000, "tip").await.unwrap();
    assert_eq!(payment_request, "lnbcrt1000n1mock1");
    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Success));

    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(repository.status_calls(), 1);
    assert_eq!(repository.list_calls(), 0);

    repository.add_payment(raw_payment("in", 1_000_000, 1_700_000_000, false));
    repository.mark_paid("invoice-hash-1");
    sleep(Duration::from_secs(2)).await;

    let view = controller.view().await;
    let receive = view.receive.expect("receive session");
    assert!(!receive.show);
    assert_eq!(receive.status, ReceiveStatus::Settled);
    assert_eq!(view.payments.len(), 1);
    assert_eq!(view.balance_sat, 1000);
    assert_eq!(repository.list_flags(), vec![false]);

    // Poll is gone
    let calls = repository.status_calls();
    sleep(Duration::from_secs(20)).await;
    assert_eq!(repository.status_calls(), calls);

    let events = drain_events(&mut events);
    assert_eq!(
        event_types(&events),
        vec![
            "invoice_created",
            "poll_started",
            "invoice_paid",
            "payments_reconciled",
            "poll_stopped"
        ]
    );
    assert_eq!(stop_reasons(&events), vec!["settled"]);
}

#[tokio::test(start_paused = true)]
async fn test_payment_inside_grace_window_still_settles() {
    let repository = MockRepository::new();
    let harness = TestHarness::new(repository.clone(), StaticDecoder::new());
    let controller = &harness.controller;
    let mut events = harness.event_bus.subscribe();

    controller.open_receive().await;
    controller.request_invoice(2500, "").await.unwrap();

    sleep(Duration::from_millis(500)).await;
    controller.close_receive().await;

    let receive = controller.view().await.receive.expect("receive session");
    assert!(!receive.show);
    assert_eq!(receive.status, ReceiveStatus::Cancelled);

    sleep(Duration::from_millis(4_500)).await;
    repository.add_payment(raw_payment("late", 2_500_000, 1_700_000_000, false));
    repository.mark_paid("invoice-hash-1");

    sleep(Duration::from_millis(1_100)).await;
    let view = controller.view().await;
    let receive = view.receive.expect("receive session");
    assert!(!receive.show);
    assert_eq!(receive.status, ReceiveStatus::Settled);
    assert_eq!(view.payments.len(), 1);

    // The grace timer fires on an already stopped poll
    sleep(Duration::from_secs(10)).await;
    let events = drain_events(&mut events);
    assert_eq!(stop_reasons(&events), vec!["settled"]);
    assert!(events
        .iter()
        .any(|event| matches!(event, WalletEvent::InvoicePaid { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_poll_after_grace_delay() {
    let repository = MockRepository::new();
    let harness = TestHarness::new(repository.clone(), StaticDecoder::new());
    let controller = &harness.controller;
    let mut events = harness.event_bus.subscribe();

    controller.open_receive().await;
    controller.request_invoice(1000, "").await.unwrap();
    sleep(Duration::from_millis(500)).await;
    controller.close_receive().await;

    // Still polling inside the grace window
    sleep(Duration::from_millis(9_900)).await;
    assert_eq!(repository.status_calls(), 5);

    sleep(Duration::from_millis(200)).await;
    sleep(Duration::from_secs(10)).await;
    assert_eq!(repository.status_calls(), 5);

    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Cancelled));
    assert_eq!(stop_reasons(&drain_events(&mut events)), vec!["grace_expired"]);
}

#[tokio::test(start_paused = true)]
async fn test_late_status_response_after_cancel_is_ignored() {
    let repository = MockRepository::new();
    repository.set_status_delay(Duration::from_millis(1_500));
    let harness = TestHarness::new(repository.clone(), StaticDecoder::new());
    let controller = &harness.controller;
    let mut events = harness.event_bus.subscribe();

    controller.open_receive().await;
    controller.request_invoice(1000, "").await.unwrap();
    sleep(Duration::from_millis(500)).await;
    controller.close_receive().await;

    // The tick started at 10s answers at 11.5s, after the cancel at 10.5s
    sleep(Duration::from_millis(9_700)).await;
    repository.mark_paid("invoice-hash-1");
    sleep(Duration::from_secs(5)).await;

    assert_eq!(repository.status_calls(), 5);
    assert_eq!(repository.list_calls(), 0);
    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Cancelled));
    assert!(!drain_events(&mut events)
        .iter()
        .any(|event| matches!(event, WalletEvent::InvoicePaid { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_status_errors_do_not_stop_poll() {
    let repository = MockRepository::new();
    repository.fail_status.store(true, Ordering::SeqCst);
    let harness = TestHarness::new(repository.clone(), StaticDecoder::new());
    let controller = &harness.controller;

    controller.open_receive().await;
    controller.request_invoice(1000, "").await.unwrap();

    sleep(Duration::from_millis(4_100)).await;
    assert_eq!(repository.status_calls(), 2);
    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Success));
    // Poll failures are logged, not shown
    assert!(harness.notifier.notices().is_empty());

    repository.fail_status.store(false, Ordering::SeqCst);
    repository.mark_paid("invoice-hash-1");
    sleep(Duration::from_secs(2)).await;
    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Settled));
}

#[tokio::test(start_paused = true)]
async fn test_payments_fetch_failure_after_settlement_retries() {
    let repository = MockRepository::new();
    let harness = TestHarness::new(repository.clone(), StaticDecoder::new());
    let controller = &harness.controller;

    controller.open_receive().await;
    controller.request_invoice(1000, "").await.unwrap();
    repository.mark_paid("invoice-hash-1");
    repository.fail_list.store(true, Ordering::SeqCst);

    sleep(Duration::from_millis(2_100)).await;
    // Dialog stays up until the list can be refreshed with it
    let receive = controller.view().await.receive.expect("receive session");
    assert!(receive.show);
    assert_eq!(receive.status, ReceiveStatus::Success);

    repository.fail_list.store(false, Ordering::SeqCst);
    sleep(Duration::from_secs(2)).await;
    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Settled));
    assert_eq!(repository.list_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_create_failure_reverts_to_idle() {
    let repository = MockRepository::new();
    repository.fail_create.store(true, Ordering::SeqCst);
    let harness = TestHarness::new(repository.clone(), StaticDecoder::new());
    let controller = &harness.controller;

    controller.open_receive().await;
    let err = controller.request_invoice(1000, "").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::RepositoryError);
    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Idle));

    let notice = harness.notifier.last().expect("error notice");
    assert_eq!(notice.kind, NoticeKind::Error);
    assert!(notice.message.contains("node offline"));
    assert!(!notice.is_persistent());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(repository.status_calls(), 0);

    // The user can retry from idle
    repository.fail_create.store(false, Ordering::SeqCst);
    assert!(controller.request_invoice(1000, "").await.is_ok());
    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn test_reopening_replaces_previous_poll() {
    let repository = MockRepository::new();
    let harness = TestHarness::new(repository.clone(), StaticDecoder::new());
    let controller = &harness.controller;
    let mut events = harness.event_bus.subscribe();

    controller.open_receive().await;
    controller.request_invoice(1000, "").await.unwrap();
    controller.open_receive().await;

    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Idle));
    sleep(Duration::from_secs(5)).await;
    assert_eq!(repository.status_calls(), 0);
    assert_eq!(stop_reasons(&drain_events(&mut events)), vec!["replaced"]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_poll_interval_still_observes_payment() {
    let repository = MockRepository::new();
    let config = ControllerConfig {
        receive_poll_interval: Duration::ZERO,
        ..ControllerConfig::default()
    };
    let harness =
        TestHarness::with_config(test_wallet(0), repository.clone(), StaticDecoder::new(), config);
    let controller = &harness.controller;

    controller.open_receive().await;
    controller.request_invoice(1000, "").await.unwrap();
    repository.add_payment(raw_payment("in", 1_000_000, 1_700_000_000, false));
    repository.mark_paid("invoice-hash-1");

    sleep(Duration::from_millis(100)).await;
    assert!(repository.status_calls() >= 1);
    assert_eq!(controller.receive_status().await, Some(ReceiveStatus::Settled));
    assert_eq!(controller.view().await.balance_sat, 1000);
}

#[tokio::test]
async fn test_request_invoice_guards() {
    let repository = MockRepository::new();
    let harness = TestHarness::new(repository.clone(), StaticDecoder::new());
    let controller = &harness.controller;

    let err = controller.request_invoice(1000, "").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::InvalidState);

    controller.open_receive().await;
    let err = controller.request_invoice(0, "").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);
    assert_eq!(
        harness.notifier.last().and_then(|n| n.caption),
        Some("400 Bad Request".to_string())
    );

    controller.request_invoice(1000, "").await.unwrap();
    let err = controller.request_invoice(1000, "").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::InvalidState);
    assert_eq!(repository.create_calls.load(Ordering::SeqCst), 1);

    controller.shutdown().await;
}

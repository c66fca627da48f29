mod common;

use chrono::{Duration, Months, Utc};
use uuid::Uuid;

use common::Harness;
use eventhub_server::models::{Transaction, TransactionStatus};
use eventhub_server::services::transactions::CreateTransaction;
use eventhub_server::store::LedgerStore;

fn purchase(event_id: uuid::Uuid, quantity: i32, use_points: bool) -> CreateTransaction {
    CreateTransaction {
        event_id,
        quantity,
        voucher_code: None,
        use_points,
    }
}

#[tokio::test]
async fn test_overdue_payment_expires_exactly_once() {
    let h = Harness::new();
    let event = h.event(100_000, 10, 0).await;
    let buyer = h.user(5_000).await;
    let voucher = h.voucher("EARLYBIRD", 10, None).await;

    let tx = h
        .transactions
        .create(
            buyer.id,
            CreateTransaction {
                voucher_code: Some("EARLYBIRD".to_string()),
                ..purchase(event.id, 3, true)
            },
        )
        .await
        .unwrap();
    assert_eq!(h.ticket_sold(event.id).await, 3);

    let sweeper = h.sweeper();
    let past_deadline = tx.payment_deadline + Duration::minutes(1);

    let report = sweeper.expire_overdue_payments(past_deadline).await.unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.settled, 1);

    let report = sweeper.expire_overdue_payments(past_deadline).await.unwrap();
    assert_eq!(report.candidates, 0);

    let stored = h.store.find_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Expired);
    assert_eq!(h.ticket_sold(event.id).await, 0);
    assert_eq!(h.points(buyer.id).await, 5_000);
    assert!(!h.store.voucher(voucher.id).await.unwrap().is_used);
    assert!(!h.store.notifications_for(buyer.id).await.is_empty());
}

#[tokio::test]
async fn test_payment_within_deadline_is_left_alone() {
    let h = Harness::new();
    let event = h.event(100_000, 10, 0).await;
    let buyer = h.user(0).await;

    let tx = h
        .transactions
        .create(buyer.id, purchase(event.id, 1, false))
        .await
        .unwrap();

    let report = h.sweeper().expire_overdue_payments(Utc::now()).await.unwrap();
    assert_eq!(report.settled, 0);
    let stored = h.store.find_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::PendingPayment);
}

#[tokio::test]
async fn test_stale_confirmation_is_cancelled() {
    let h = Harness::new();
    let event = h.event(100_000, 10, 0).await;
    let buyer = h.user(0).await;

    let fresh = h
        .transactions
        .create(buyer.id, purchase(event.id, 1, false))
        .await
        .unwrap();
    let stale = h
        .transactions
        .create(buyer.id, purchase(event.id, 2, false))
        .await
        .unwrap();
    for tx in [&fresh, &stale] {
        h.transactions
            .upload_proof(buyer.id, tx.id, "proof")
            .await
            .unwrap();
    }
    h.store
        .backdate_transaction(stale.id, Utc::now() - Duration::days(4))
        .await;

    let report = h
        .sweeper()
        .cancel_stale_confirmations(Utc::now())
        .await
        .unwrap();
    assert_eq!(report.settled, 1);

    let stale = h.store.find_transaction(stale.id).await.unwrap().unwrap();
    let fresh = h.store.find_transaction(fresh.id).await.unwrap().unwrap();
    assert_eq!(stale.status, TransactionStatus::Cancelled);
    assert_eq!(fresh.status, TransactionStatus::PendingConfirmation);
    assert_eq!(h.ticket_sold(event.id).await, 1);
}

#[tokio::test]
async fn test_idle_points_expire() {
    let h = Harness::new();
    let idle = h.user(12_000).await;
    let active = h.user(8_000).await;
    h.store
        .backdate_points(idle.id, Utc::now().checked_sub_months(Months::new(4)).unwrap())
        .await;

    let expired = h.rewards.expire_idle_points(Utc::now()).await.unwrap();

    assert_eq!(expired, 1);
    assert_eq!(h.points(idle.id).await, 0);
    assert_eq!(h.points(active.id).await, 8_000);
}

#[tokio::test]
async fn test_run_once_drives_every_job() {
    let h = Harness::new();
    let event = h.event(100_000, 10, 0).await;
    let buyer = h.user(0).await;

    let tx = h
        .transactions
        .create(buyer.id, purchase(event.id, 4, false))
        .await
        .unwrap();

    h.sweeper().run_once(tx.payment_deadline + Duration::seconds(1)).await;

    let stored = h.store.find_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Expired);
    assert_eq!(h.ticket_sold(event.id).await, 0);
}

#[tokio::test]
async fn test_failing_row_does_not_abort_sweep() {
    let h = Harness::new();
    let event = h.event(100_000, 10, 0).await;
    let buyer = h.user(0).await;

    let good = h
        .transactions
        .create(buyer.id, purchase(event.id, 1, false))
        .await
        .unwrap();
    let bad = h
        .transactions
        .create(buyer.id, purchase(event.id, 1, false))
        .await
        .unwrap();
    // A dangling voucher reference makes the restore step fail for this row.
    h.store
        .insert_transaction(Transaction {
            voucher_id: Some(Uuid::new_v4()),
            ..bad.clone()
        })
        .await;
    assert_eq!(h.ticket_sold(event.id).await, 2);

    let past_deadline = good.payment_deadline.max(bad.payment_deadline) + Duration::minutes(1);
    let report = h
        .sweeper()
        .expire_overdue_payments(past_deadline)
        .await
        .unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.settled, 1);
    assert_eq!(report.failed, 1);

    let good = h.store.find_transaction(good.id).await.unwrap().unwrap();
    let bad = h.store.find_transaction(bad.id).await.unwrap().unwrap();
    assert_eq!(good.status, TransactionStatus::Expired);
    assert_eq!(bad.status, TransactionStatus::PendingPayment);
    assert_eq!(h.ticket_sold(event.id).await, 1);
}

#[tokio::test]
async fn test_failing_row_does_not_abort_stale_sweep() {
    let h = Harness::new();
    let event = h.event(100_000, 10, 0).await;
    let buyer = h.user(0).await;

    let good = h
        .transactions
        .create(buyer.id, purchase(event.id, 2, false))
        .await
        .unwrap();
    let bad = h
        .transactions
        .create(buyer.id, purchase(event.id, 3, false))
        .await
        .unwrap();
    for tx in [&good, &bad] {
        h.transactions
            .upload_proof(buyer.id, tx.id, "proof")
            .await
            .unwrap();
    }

    let idle_since = Utc::now() - Duration::days(4);
    h.store.backdate_transaction(good.id, idle_since).await;
    let bad = h.store.find_transaction(bad.id).await.unwrap().unwrap();
    h.store
        .insert_transaction(Transaction {
            voucher_id: Some(Uuid::new_v4()),
            updated_at: idle_since,
            ..bad.clone()
        })
        .await;

    let report = h
        .sweeper()
        .cancel_stale_confirmations(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.settled, 1);
    assert_eq!(report.failed, 1);

    let good = h.store.find_transaction(good.id).await.unwrap().unwrap();
    let bad = h.store.find_transaction(bad.id).await.unwrap().unwrap();
    assert_eq!(good.status, TransactionStatus::Cancelled);
    assert_eq!(bad.status, TransactionStatus::PendingConfirmation);
    assert_eq!(h.ticket_sold(event.id).await, 3);
}

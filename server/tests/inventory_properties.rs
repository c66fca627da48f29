mod common;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use common::Harness;
use eventhub_server::models::TransactionStatus;
use eventhub_server::services::transactions::CreateTransaction;
use eventhub_server::store::LedgerStore;

#[derive(Debug, Clone)]
enum Op {
    Create { quantity: i32, use_points: bool },
    UploadProof(usize),
    Approve(usize),
    Reject(usize),
    Cancel(usize),
    Expire(usize),
    SweepStale(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1..4i32, any::<bool>())
            .prop_map(|(quantity, use_points)| Op::Create { quantity, use_points }),
        2 => any::<usize>().prop_map(Op::UploadProof),
        1 => any::<usize>().prop_map(Op::Approve),
        1 => any::<usize>().prop_map(Op::Reject),
        1 => any::<usize>().prop_map(Op::Cancel),
        1 => any::<usize>().prop_map(Op::Expire),
        1 => any::<usize>().prop_map(Op::SweepStale),
    ]
}

fn pick(ids: &[Uuid], i: usize) -> Option<Uuid> {
    (!ids.is_empty()).then(|| ids[i % ids.len()])
}

async fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let h = Harness::new();
    let event = h.event(10_000, 12, 0).await;
    let buyer = h.user(25_000).await;
    let mut ids: Vec<Uuid> = Vec::new();

    for op in ops {
        let later = Utc::now() + Duration::days(5);

        match op {
            Op::Create { quantity, use_points } => {
                let request = CreateTransaction {
                    event_id: event.id,
                    quantity,
                    voucher_code: None,
                    use_points,
                };
                if let Ok(tx) = h.transactions.create(buyer.id, request).await {
                    ids.push(tx.id);
                }
            }
            Op::UploadProof(i) => {
                if let Some(id) = pick(&ids, i) {
                    let _ = h.transactions.upload_proof(buyer.id, id, "proof").await;
                }
            }
            Op::Approve(i) => {
                if let Some(id) = pick(&ids, i) {
                    let _ = h.transactions.approve(event.organizer_id, id).await;
                }
            }
            Op::Reject(i) => {
                if let Some(id) = pick(&ids, i) {
                    let _ = h.transactions.reject(event.organizer_id, id).await;
                }
            }
            Op::Cancel(i) => {
                if let Some(id) = pick(&ids, i) {
                    let _ = h.transactions.cancel(buyer.id, id).await;
                }
            }
            Op::Expire(i) => {
                if let Some(id) = pick(&ids, i) {
                    let _ = h.transactions.expire_by_deadline(id, later).await;
                }
            }
            Op::SweepStale(i) => {
                if let Some(id) = pick(&ids, i) {
                    let _ = h.transactions.expire_by_inactivity(id, later).await;
                }
            }
        }

        let transactions = h.store.transactions_for_event(event.id).await;
        let held: i32 = transactions
            .iter()
            .filter(|t| t.status.holds_inventory())
            .map(|t| t.quantity)
            .sum();
        let sold = h.ticket_sold(event.id).await;
        prop_assert_eq!(sold, held);
        prop_assert!(sold <= 12);

        // Points still spent are exactly those held by live transactions.
        let spent: i64 = transactions
            .iter()
            .filter(|t| {
                matches!(
                    t.status,
                    TransactionStatus::PendingPayment
                        | TransactionStatus::PendingConfirmation
                        | TransactionStatus::Completed
                )
            })
            .map(|t| t.points_used)
            .sum();
        let balance = h
            .store
            .find_user(buyer.id)
            .await
            .unwrap()
            .expect("buyer exists")
            .points;
        prop_assert_eq!(balance + spent, 25_000);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_inventory_and_points_are_conserved(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(ops))?;
    }
}

use std::sync::Arc;

use futures::future::join_all;
use settlement_ledger::config::SettlementConfig;
use settlement_ledger::persistence::Fault;
use settlement_ledger::{
    Account, AccountNumber, ActivityFeed, LedgerError, LedgerStore, MemoryStore,
    SettlementCoordinator, TransactionKind, TransferStatus, UserId,
};

const ALICE: UserId = 1;
const BOB: UserId = 2;
const CAROL: UserId = 3;

fn setup() -> (MemoryStore, Arc<SettlementCoordinator>) {
    let store = MemoryStore::new();
    let coordinator = Arc::new(SettlementCoordinator::with_defaults(Arc::new(store.clone())));
    (store, coordinator)
}

async fn open_with(coordinator: &SettlementCoordinator, owner: UserId, balance: i64) -> Account {
    let account = coordinator.create_account(owner).await.unwrap();
    if balance > 0 {
        coordinator
            .deposit(&account.account_number, balance, owner)
            .await
            .unwrap();
    }
    account
}

async fn balance_of(store: &MemoryStore, account: &Account) -> i64 {
    store
        .get_account(&account.account_number)
        .await
        .unwrap()
        .unwrap()
        .balance
}

async fn assert_reconciled(coordinator: &SettlementCoordinator, accounts: &[&Account]) {
    for account in accounts {
        let report = coordinator.reconcile(&account.account_number).await.unwrap();
        assert!(
            report.is_balanced(),
            "account {} balance {} != ledger {}",
            account.account_number,
            report.balance,
            report.ledger_sum
        );
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn scenario_a_deposit_onto_existing_balance() {
    let (store, coordinator) = setup();
    let account = open_with(&coordinator, ALICE, 1000).await;

    let balance = coordinator
        .deposit(&account.account_number, 500, ALICE)
        .await
        .unwrap();
    assert_eq!(balance, 1500);

    let entries = coordinator
        .account_transactions(&account.account_number, ALICE)
        .await
        .unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.kind, TransactionKind::Deposit);
    assert_eq!(last.amount, 500);
    assert_eq!(balance_of(&store, &account).await, 1500);
}

#[tokio::test]
async fn scenario_b_overdraw_changes_nothing() {
    let (store, coordinator) = setup();
    let account = open_with(&coordinator, ALICE, 1500).await;
    let before = store.transaction_count();

    let result = coordinator
        .withdraw(&account.account_number, 2000, ALICE)
        .await;
    assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
    assert_eq!(balance_of(&store, &account).await, 1500);
    assert_eq!(store.transaction_count(), before);
}

#[tokio::test]
async fn scenario_c_send_debits_immediately() {
    let (store, coordinator) = setup();
    let a = open_with(&coordinator, ALICE, 1000).await;

    let sent = coordinator
        .send_transfer(&a.account_number, 300, BOB, ALICE)
        .await
        .unwrap();
    assert_eq!(sent.balance, 700);
    assert_eq!(balance_of(&store, &a).await, 700);

    let transfer = &sent.transfer;
    assert_eq!(transfer.status, TransferStatus::Pending);
    assert_eq!(transfer.sender_id, ALICE);
    assert_eq!(transfer.receiver_id, BOB);
    assert_eq!(transfer.amount, 300);

    let entries = coordinator
        .account_transactions(&a.account_number, ALICE)
        .await
        .unwrap();
    let debit = entries.last().unwrap();
    assert_eq!(debit.transaction_id, transfer.transaction_id);
    assert_eq!(debit.kind, TransactionKind::Transfer);
    assert_eq!(debit.signed_amount(), -300);
}

#[tokio::test]
async fn scenario_d_accept_credits_receiver() {
    let (store, coordinator) = setup();
    let a = open_with(&coordinator, ALICE, 1000).await;
    let b = open_with(&coordinator, BOB, 200).await;
    let sent = coordinator
        .send_transfer(&a.account_number, 300, BOB, ALICE)
        .await
        .unwrap();

    let balance = coordinator
        .accept_transfer(&sent.transfer.transaction_id, &b.account_number, BOB)
        .await
        .unwrap();
    assert_eq!(balance, 500);
    assert_eq!(balance_of(&store, &b).await, 500);

    let transfer = coordinator
        .get_transfer(&sent.transfer.transaction_id, BOB)
        .await
        .unwrap();
    assert_eq!(transfer.status, TransferStatus::Accepted);

    let credit = coordinator
        .account_transactions(&b.account_number, BOB)
        .await
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(credit.kind, TransactionKind::Transfer);
    assert_eq!(credit.signed_amount(), 300);
    assert_eq!(transfer.accepted_transaction_id, Some(credit.transaction_id));
    assert_reconciled(&coordinator, &[&a, &b]).await;
}

#[tokio::test]
async fn scenario_e_feed_caps_at_ten_newest_first() {
    let (store, coordinator) = setup();
    let first = coordinator.create_account(ALICE).await.unwrap();
    let second = coordinator.create_account(ALICE).await.unwrap();

    for i in 1..=12 {
        let account = if i % 2 == 0 { &first } else { &second };
        coordinator
            .deposit(&account.account_number, i, ALICE)
            .await
            .unwrap();
    }

    let feed = ActivityFeed::new(Arc::new(store), coordinator.config().feed_limit);
    let entries = feed.feed(ALICE).await.unwrap();
    assert_eq!(entries.len(), 10);
    let amounts: Vec<i64> = entries.iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![12, 11, 10, 9, 8, 7, 6, 5, 4, 3]);
    assert!(entries.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    assert!(feed.feed(CAROL).await.unwrap().is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_withdrawals_never_overdraw() {
    let (store, coordinator) = setup();
    let account = open_with(&coordinator, ALICE, 1000).await;

    let tasks = (0..10).map(|_| {
        let coordinator = coordinator.clone();
        let number = account.account_number.clone();
        tokio::spawn(async move { coordinator.withdraw(&number, 300, ALICE).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. })))
        .count();
    assert_eq!(succeeded, 3);
    assert_eq!(rejected, 7);
    assert_eq!(balance_of(&store, &account).await, 100);
    assert_reconciled(&coordinator, &[&account]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_settle_once() {
    let (store, coordinator) = setup();
    let a = open_with(&coordinator, ALICE, 1000).await;
    let b = open_with(&coordinator, BOB, 0).await;
    let sent = coordinator
        .send_transfer(&a.account_number, 300, BOB, ALICE)
        .await
        .unwrap();

    let tasks = (0..8).map(|_| {
        let coordinator = coordinator.clone();
        let id = sent.transfer.transaction_id;
        let number = b.account_number.clone();
        tokio::spawn(async move { coordinator.accept_transfer(&id, &number, BOB).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(LedgerError::TransferNotPending { .. })))
    );
    assert_eq!(balance_of(&store, &b).await, 300);
    assert_reconciled(&coordinator, &[&a, &b]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfers_between_many_accounts_conserve_money() {
    let (_store, coordinator) = setup();
    let mut accounts = Vec::new();
    for owner in 1..=4 {
        accounts.push(open_with(&coordinator, owner, 1000).await);
    }

    let tasks = (0..40).map(|i| {
        let coordinator = coordinator.clone();
        let from = accounts[i % 4].clone();
        let to = accounts[(i + 1) % 4].clone();
        tokio::spawn(async move {
            let sent = coordinator
                .send_transfer(&from.account_number, 25, to.owner_id, from.owner_id)
                .await?;
            coordinator
                .accept_transfer(&sent.transfer.transaction_id, &to.account_number, to.owner_id)
                .await
        })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let mut total = 0;
    for account in &accounts {
        let report = coordinator.reconcile(&account.account_number).await.unwrap();
        assert!(report.is_balanced());
        total += report.balance;
    }
    assert_eq!(total, 4000);
}

// ============================================================================
// Atomicity
// ============================================================================

#[tokio::test]
async fn failed_sub_write_rolls_back_the_whole_unit() {
    for fault in [Fault::BalanceWrite, Fault::TransactionAppend, Fault::Commit] {
        let (store, coordinator) = setup();
        let account = open_with(&coordinator, ALICE, 1000).await;
        let entries_before = store.transaction_count();

        store.fail_next(fault);
        let result = coordinator
            .withdraw(&account.account_number, 100, ALICE)
            .await;

        assert!(
            matches!(result, Err(LedgerError::PersistenceFailure(_))),
            "{fault:?}"
        );
        assert_eq!(balance_of(&store, &account).await, 1000, "{fault:?}");
        assert_eq!(store.transaction_count(), entries_before, "{fault:?}");
        assert_reconciled(&coordinator, &[&account]).await;

        // Fault is one-shot: the retry goes through
        assert_eq!(
            coordinator
                .withdraw(&account.account_number, 100, ALICE)
                .await,
            Ok(900)
        );
    }
}

#[tokio::test]
async fn failed_accept_leaves_transfer_pending() {
    for fault in [
        Fault::BalanceWrite,
        Fault::TransactionAppend,
        Fault::TransferUpdate,
        Fault::Commit,
    ] {
        let (store, coordinator) = setup();
        let a = open_with(&coordinator, ALICE, 1000).await;
        let b = open_with(&coordinator, BOB, 0).await;
        let sent = coordinator
            .send_transfer(&a.account_number, 300, BOB, ALICE)
            .await
            .unwrap();
        let entries_before = store.transaction_count();

        store.fail_next(fault);
        let result = coordinator
            .accept_transfer(&sent.transfer.transaction_id, &b.account_number, BOB)
            .await;
        assert!(
            matches!(result, Err(LedgerError::PersistenceFailure(_))),
            "{fault:?}"
        );

        let transfer = coordinator
            .get_transfer(&sent.transfer.transaction_id, BOB)
            .await
            .unwrap();
        assert_eq!(transfer.status, TransferStatus::Pending, "{fault:?}");
        assert_eq!(balance_of(&store, &b).await, 0, "{fault:?}");
        assert_eq!(store.transaction_count(), entries_before, "{fault:?}");
        assert_reconciled(&coordinator, &[&a, &b]).await;
    }
}

// ============================================================================
// Transfer rules
// ============================================================================

#[tokio::test]
async fn wrong_receiver_is_rejected_without_side_effects() {
    let (store, coordinator) = setup();
    let a = open_with(&coordinator, ALICE, 1000).await;
    let c = open_with(&coordinator, CAROL, 50).await;
    let sent = coordinator
        .send_transfer(&a.account_number, 300, BOB, ALICE)
        .await
        .unwrap();
    let id = sent.transfer.transaction_id;

    assert_eq!(
        coordinator
            .accept_transfer(&id, &c.account_number, CAROL)
            .await,
        Err(LedgerError::NotReceiver(id))
    );
    assert_eq!(
        coordinator.get_transfer(&id, ALICE).await.unwrap().status,
        TransferStatus::Pending
    );
    assert_eq!(balance_of(&store, &a).await, 700);
    assert_eq!(balance_of(&store, &c).await, 50);
}

#[tokio::test]
async fn send_rejects_non_owner_and_overdraw_without_state() {
    let (store, coordinator) = setup();
    let a = open_with(&coordinator, ALICE, 1000).await;
    let entries_before = store.transaction_count();
    let missing = AccountNumber::generate();

    let rejected = [
        (
            coordinator
                .send_transfer(&a.account_number, 300, CAROL, BOB)
                .await,
            LedgerError::NotOwner(a.account_number.clone()),
        ),
        (
            coordinator
                .send_transfer(&a.account_number, 1001, BOB, ALICE)
                .await,
            LedgerError::InsufficientFunds {
                available: 1000,
                requested: 1001,
            },
        ),
        (
            coordinator.send_transfer(&missing, 10, BOB, ALICE).await,
            LedgerError::AccountNotFound(missing.clone()),
        ),
        (
            coordinator
                .send_transfer(&a.account_number, 0, BOB, ALICE)
                .await,
            LedgerError::InvalidAmount,
        ),
    ];
    for (result, expected) in rejected {
        assert_eq!(result, Err(expected));
    }

    assert_eq!(balance_of(&store, &a).await, 1000);
    assert_eq!(store.transaction_count(), entries_before);
    assert_eq!(store.transfer_count(), 0);
    assert!(coordinator.outgoing_transfers(ALICE).await.unwrap().is_empty());
    assert!(coordinator.outgoing_transfers(BOB).await.unwrap().is_empty());
    assert_reconciled(&coordinator, &[&a]).await;
}

#[tokio::test]
async fn accept_into_missing_account_leaves_pending() {
    let (store, coordinator) = setup();
    let a = open_with(&coordinator, ALICE, 1000).await;
    let b = open_with(&coordinator, BOB, 0).await;
    let sent = coordinator
        .send_transfer(&a.account_number, 300, BOB, ALICE)
        .await
        .unwrap();
    let id = sent.transfer.transaction_id;
    let entries_before = store.transaction_count();
    let missing = AccountNumber::generate();

    assert_eq!(
        coordinator.accept_transfer(&id, &missing, BOB).await,
        Err(LedgerError::AccountNotFound(missing.clone()))
    );

    let transfer = coordinator.get_transfer(&id, BOB).await.unwrap();
    assert_eq!(transfer.status, TransferStatus::Pending);
    assert_eq!(transfer.accepted_account, None);
    assert_eq!(store.transaction_count(), entries_before);
    assert_eq!(store.transfer_count(), 1);
    assert_eq!(balance_of(&store, &a).await, 700);
    assert_eq!(balance_of(&store, &b).await, 0);

    // The transfer is still acceptable into a real account
    assert_eq!(
        coordinator
            .accept_transfer(&id, &b.account_number, BOB)
            .await,
        Ok(300)
    );
    assert_reconciled(&coordinator, &[&a, &b]).await;
}

#[tokio::test]
async fn settled_transfers_cannot_be_accepted_again() {
    let store = MemoryStore::new();
    let short_lived = SettlementCoordinator::new(
        Arc::new(store.clone()),
        SettlementConfig {
            transfer_ttl_secs: 0,
            ..SettlementConfig::default()
        },
    );
    let coordinator = SettlementCoordinator::with_defaults(Arc::new(store.clone()));

    let a = open_with(&coordinator, ALICE, 1000).await;
    let b = open_with(&coordinator, BOB, 0).await;

    let accepted = coordinator
        .send_transfer(&a.account_number, 100, BOB, ALICE)
        .await
        .unwrap()
        .transfer;
    coordinator
        .accept_transfer(&accepted.transaction_id, &b.account_number, BOB)
        .await
        .unwrap();

    let expired = short_lived
        .send_transfer(&a.account_number, 100, BOB, ALICE)
        .await
        .unwrap()
        .transfer;
    assert_eq!(short_lived.expire_overdue(chrono::Utc::now(), 10).await, Ok(1));

    let entries_before = store.transaction_count();
    for (transfer, status) in [
        (&accepted, TransferStatus::Accepted),
        (&expired, TransferStatus::Expired),
    ] {
        assert_eq!(
            coordinator
                .accept_transfer(&transfer.transaction_id, &b.account_number, BOB)
                .await,
            Err(LedgerError::TransferNotPending {
                id: transfer.transaction_id,
                status
            })
        );
    }

    assert_eq!(store.transaction_count(), entries_before);
    assert_eq!(balance_of(&store, &a).await, 800);
    assert_eq!(balance_of(&store, &b).await, 100);
    assert_reconciled(&coordinator, &[&a, &b]).await;
}

#[tokio::test]
async fn listings_track_both_sides() {
    let (_store, coordinator) = setup();
    let a = open_with(&coordinator, ALICE, 1000).await;
    let b = open_with(&coordinator, BOB, 0).await;

    let first = coordinator
        .send_transfer(&a.account_number, 100, BOB, ALICE)
        .await
        .unwrap()
        .transfer;
    coordinator
        .send_transfer(&a.account_number, 200, CAROL, ALICE)
        .await
        .unwrap();
    coordinator
        .accept_transfer(&first.transaction_id, &b.account_number, BOB)
        .await
        .unwrap();

    let outgoing = coordinator.outgoing_transfers(ALICE).await.unwrap();
    assert_eq!(outgoing.len(), 2);
    let incoming = coordinator.incoming_transfers(BOB).await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].status, TransferStatus::Accepted);
    assert_eq!(coordinator.incoming_transfers(CAROL).await.unwrap().len(), 1);
}

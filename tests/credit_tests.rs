// tests/credit_tests.rs

mod common;

use common::*;
use quiz_backend::{
    error::AppError,
    models::credit::{CreditMutation, TransactionType},
    services::{ledger, purchase},
};

#[tokio::test]
async fn new_user_has_zero_balance() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "alice").await;

    assert_eq!(ledger::get_balance(&pool, user).await.unwrap(), 0);
    assert!(ledger::list_transactions(&pool, user).await.unwrap().is_empty());
}

#[tokio::test]
async fn overdraft_changes_nothing() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "alice").await;
    ledger::add_credits(&pool, user, 20, TransactionType::Purchase, None, None)
        .await
        .unwrap();

    let result = ledger::deduct_credits(&pool, user, 50, TransactionType::Usage, None, None).await;
    match result {
        Err(AppError::InsufficientCredits { balance, required }) => {
            assert_eq!(balance, 20);
            assert_eq!(required, 50);
        }
        other => panic!("expected insufficient credits, got {:?}", other),
    }

    assert_eq!(ledger::get_balance(&pool, user).await.unwrap(), 20);
    assert_eq!(count_rows(&pool, "credit_transactions").await, 1);
}

#[tokio::test]
async fn balance_matches_ledger_sum() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "alice").await;

    ledger::add_credits(&pool, user, 100, TransactionType::Purchase, Some("order:1".into()), None)
        .await
        .unwrap();
    ledger::deduct_credits(&pool, user, 30, TransactionType::Usage, None, None)
        .await
        .unwrap();
    ledger::add_credits(&pool, user, 5, TransactionType::Refund, None, None)
        .await
        .unwrap();
    ledger::add_credits(&pool, user, 10, TransactionType::Bonus, None, Some("Welcome".into()))
        .await
        .unwrap();
    let _ = ledger::deduct_credits(&pool, user, 1000, TransactionType::Usage, None, None).await;

    let balance = ledger::get_balance(&pool, user).await.unwrap();
    assert_eq!(balance, 85);
    assert_eq!(ledger_sum(&pool, user).await, balance);

    let log = ledger::list_transactions(&pool, user).await.unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0].transaction_type, TransactionType::Bonus);
    assert!(log.iter().all(|t| t.amount > 0));
}

#[tokio::test]
async fn mutation_direction_must_match_type() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "alice").await;

    let add_usage = ledger::add_credits(&pool, user, 10, TransactionType::Usage, None, None).await;
    assert!(matches!(add_usage, Err(AppError::BadRequest(_))));

    let deduct_bonus = ledger::deduct_credits(&pool, user, 10, TransactionType::Bonus, None, None).await;
    assert!(matches!(deduct_bonus, Err(AppError::BadRequest(_))));

    let zero = ledger::update_credits(
        &pool,
        CreditMutation {
            user_id: user,
            amount: 0,
            transaction_type: TransactionType::Bonus,
            reference_id: None,
            description: None,
        },
    )
    .await;
    assert!(matches!(zero, Err(AppError::BadRequest(_))));

    let negative = ledger::add_credits(&pool, user, -5, TransactionType::Bonus, None, None).await;
    assert!(matches!(negative, Err(AppError::BadRequest(_))));

    assert_eq!(count_rows(&pool, "credit_transactions").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw() {
    let pool = shared_pool().await;
    let user = seed_user(&pool, "alice").await;
    ledger::add_credits(&pool, user, 50, TransactionType::Purchase, None, None)
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                ledger::deduct_credits(&pool, user, 30, TransactionType::Usage, None, None).await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientCredits { .. }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
    assert_eq!(succeeded, 1);

    let balance = ledger::get_balance(&pool, user).await.unwrap();
    assert_eq!(balance, 20);
    assert_eq!(ledger_sum(&pool, user).await, balance);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_purchases_buy_what_the_balance_allows() {
    let pool = shared_pool().await;
    let user = seed_user(&pool, "alice").await;
    let tree = seed_set(&pool, SetSpec::exclusive(30), vec![mcq("Q1")]).await;
    ledger::add_credits(&pool, user, 50, TransactionType::Purchase, None, None)
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let set_id = tree.set.id;
            tokio::spawn(async move { purchase::purchase_question_set(&pool, user, set_id).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientCredits { .. }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(count_rows(&pool, "question_set_purchases").await, 1);
    assert_eq!(ledger::get_balance(&pool, user).await.unwrap(), 20);
    assert_eq!(ledger_sum(&pool, user).await, 20);
}

#[tokio::test]
async fn purchase_debits_and_records_entitlement() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "alice").await;
    let tree = seed_set(&pool, SetSpec::exclusive(30), vec![mcq("Q1")]).await;
    ledger::add_credits(&pool, user, 100, TransactionType::Purchase, None, None)
        .await
        .unwrap();

    let bought = purchase::purchase_question_set(&pool, user, tree.set.id).await.unwrap();

    assert_eq!(bought.user_id, user);
    assert_eq!(bought.question_set_id, tree.set.id);
    assert!(!bought.is_used);
    assert_eq!(bought.question_set_attempt_id, None);
    assert_eq!(ledger::get_balance(&pool, user).await.unwrap(), 70);

    let log = ledger::list_transactions(&pool, user).await.unwrap();
    let usage: Vec<_> = log
        .iter()
        .filter(|t| t.transaction_type == TransactionType::Usage)
        .collect();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].amount, 30);
    assert_eq!(usage[0].id, bought.credit_transaction_id);

    assert!(purchase::has_access(&pool, user, tree.set.id).await.unwrap());
}

#[tokio::test]
async fn purchase_without_funds_is_refused() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "alice").await;
    let tree = seed_set(&pool, SetSpec::exclusive(30), vec![mcq("Q1")]).await;
    ledger::add_credits(&pool, user, 10, TransactionType::Purchase, None, None)
        .await
        .unwrap();

    let result = purchase::purchase_question_set(&pool, user, tree.set.id).await;
    assert!(matches!(
        result,
        Err(AppError::InsufficientCredits { balance: 10, required: 30 })
    ));
    assert_eq!(ledger::get_balance(&pool, user).await.unwrap(), 10);
    assert_eq!(count_rows(&pool, "question_set_purchases").await, 0);
    assert!(!purchase::has_access(&pool, user, tree.set.id).await.unwrap());
}

#[tokio::test]
async fn only_published_exclusive_sets_are_sold() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "alice").await;
    ledger::add_credits(&pool, user, 100, TransactionType::Purchase, None, None)
        .await
        .unwrap();

    let free = seed_set(&pool, SetSpec::free(), vec![mcq("Q1")]).await;
    let result = purchase::purchase_question_set(&pool, user, free.set.id).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert!(purchase::has_access(&pool, user, free.set.id).await.unwrap());

    let missing = purchase::purchase_question_set(&pool, user, 4242).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    let draft = seed_set(
        &pool,
        SetSpec { publish: false, ..SetSpec::exclusive(10) },
        vec![mcq("Q1")],
    )
    .await;
    let result = purchase::purchase_question_set(&pool, user, draft.set.id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    assert_eq!(ledger::get_balance(&pool, user).await.unwrap(), 100);
}

#[tokio::test]
async fn failed_purchase_rolls_back_debit() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "alice").await;
    let tree = seed_set(&pool, SetSpec::exclusive(30), vec![mcq("Q1")]).await;
    ledger::add_credits(&pool, user, 100, TransactionType::Purchase, None, None)
        .await
        .unwrap();

    // Make the insert after the debit fail.
    sqlx::query("DROP TABLE question_set_purchases")
        .execute(&pool)
        .await
        .unwrap();

    let result = purchase::purchase_question_set(&pool, user, tree.set.id).await;
    assert!(matches!(result, Err(AppError::InternalServerError(_))));

    assert_eq!(ledger::get_balance(&pool, user).await.unwrap(), 100);
    assert_eq!(ledger::list_transactions(&pool, user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn each_purchase_buys_one_entitlement() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "alice").await;
    let tree = seed_set(&pool, SetSpec::exclusive(25), vec![mcq("Q1")]).await;
    ledger::add_credits(&pool, user, 60, TransactionType::Bonus, None, None)
        .await
        .unwrap();

    purchase::purchase_question_set(&pool, user, tree.set.id).await.unwrap();
    purchase::purchase_question_set(&pool, user, tree.set.id).await.unwrap();
    let third = purchase::purchase_question_set(&pool, user, tree.set.id).await;

    assert!(matches!(third, Err(AppError::InsufficientCredits { .. })));
    assert_eq!(ledger::get_balance(&pool, user).await.unwrap(), 10);
    assert_eq!(count_rows(&pool, "question_set_purchases").await, 2);
}

//! Behaviour shared by every `LedgerStore` implementation

use chrono::{Duration, Utc};
use vp_core::{Address, DelegatePair, PairCorrection, U256};

use crate::{LedgerStore, StoreError};

fn user(n: u8) -> Address {
    Address::repeat_byte(n)
}

fn id(n: u64) -> U256 {
    U256::from(n)
}

pub async fn upsert_is_idempotent(store: &impl LedgerStore) {
    let deadline = Utc::now() + Duration::hours(1);
    for _ in 0..3 {
        store
            .upsert_allocation(user(1), id(7), id(600), true, deadline)
            .await
            .unwrap();
    }

    let rows = store.list_user_allocations(user(1)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].vp_amount, id(600));
    assert!(rows[0].support);

    // Last write wins, creation time is kept
    let created = rows[0].created_at;
    let updated = store
        .upsert_allocation(user(1), id(7), id(900), false, deadline)
        .await
        .unwrap();
    assert_eq!(updated.vp_amount, id(900));
    assert!(!updated.support);
    assert_eq!(updated.created_at, created);
    assert_eq!(store.list_user_allocations(user(1)).await.unwrap().len(), 1);
}

pub async fn user_allocations_ordered_by_proposal(store: &impl LedgerStore) {
    let deadline = Utc::now() + Duration::hours(1);
    for p in [300u64, 2, 256, 1] {
        store
            .upsert_allocation(user(1), id(p), id(10), true, deadline)
            .await
            .unwrap();
    }
    store
        .upsert_allocation(user(2), id(5), id(10), true, deadline)
        .await
        .unwrap();

    let proposals: Vec<U256> = store
        .list_user_allocations(user(1))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.proposal_id)
        .collect();
    assert_eq!(proposals, vec![id(1), id(2), id(256), id(300)]);
}

pub async fn proposal_cleanup_returns_exact_count(store: &impl LedgerStore) {
    let deadline = Utc::now() + Duration::hours(1);
    for u in 1..=3 {
        store
            .upsert_allocation(user(u), id(7), id(10), true, deadline)
            .await
            .unwrap();
    }
    store
        .upsert_allocation(user(1), id(8), id(10), true, deadline)
        .await
        .unwrap();

    assert_eq!(store.delete_proposal_allocations(id(7)).await.unwrap(), 3);
    assert_eq!(store.delete_proposal_allocations(id(7)).await.unwrap(), 0);

    let remaining = store.list_allocations().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].proposal_id, id(8));

    assert!(store.delete_allocation(user(1), id(8)).await.unwrap());
    assert!(!store.delete_allocation(user(1), id(8)).await.unwrap());
}

pub async fn expired_sweep_keeps_active_rows(store: &impl LedgerStore) {
    let now = Utc::now();
    store
        .upsert_allocation(user(1), id(1), id(10), true, now - Duration::seconds(5))
        .await
        .unwrap();
    store
        .upsert_allocation(user(1), id(2), id(10), true, now)
        .await
        .unwrap();
    store
        .upsert_allocation(user(1), id(3), id(10), true, now + Duration::hours(1))
        .await
        .unwrap();

    assert_eq!(store.delete_expired_allocations(now).await.unwrap(), 2);

    let rows = store.list_user_allocations(user(1)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].proposal_id, id(3));
    // Swept rows are gone from the proposal index as well
    assert_eq!(store.delete_proposal_allocations(id(1)).await.unwrap(), 0);
}

pub async fn delegate_pairs_are_distinct(store: &impl LedgerStore) {
    store.upsert_delegator_power(id(2), user(9), user(1), id(5)).await.unwrap();
    store.upsert_delegator_power(id(2), user(9), user(2), id(6)).await.unwrap();
    store.upsert_delegator_power(id(1), user(9), user(1), id(7)).await.unwrap();
    store.upsert_delegator_power(id(2), user(3), user(1), id(8)).await.unwrap();

    let pairs = store.list_delegate_pairs(None).await.unwrap();
    assert_eq!(
        pairs,
        vec![
            DelegatePair::new(id(1), user(9)),
            DelegatePair::new(id(2), user(3)),
            DelegatePair::new(id(2), user(9)),
        ]
    );

    let scoped = store.list_delegate_pairs(Some(id(1))).await.unwrap();
    assert_eq!(scoped, vec![DelegatePair::new(id(1), user(9))]);

    let rows = store
        .list_delegator_powers(DelegatePair::new(id(2), user(9)))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].delegator, user(1));
    assert_eq!(rows[1].power_used, id(6));
}

pub async fn pair_corrections_apply(store: &impl LedgerStore) {
    let pair = DelegatePair::new(id(4), user(9));
    let deadline = Utc::now() + Duration::hours(1);
    store.upsert_delegator_power(id(4), user(9), user(1), id(100)).await.unwrap();
    store.upsert_delegator_power(id(4), user(9), user(2), id(200)).await.unwrap();
    store.upsert_delegator_power(id(4), user(9), user(3), id(300)).await.unwrap();
    store.upsert_allocation(user(9), id(4), id(600), true, deadline).await.unwrap();

    let outcome = store
        .apply_pair_corrections(
            pair,
            &[
                PairCorrection::DeleteDelegator { delegator: user(1) },
                PairCorrection::SetDelegatorPower {
                    delegator: user(2),
                    power_used: id(150),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(outcome.rows_deleted, 1);
    assert_eq!(outcome.rows_updated, 1);

    let rows = store.list_delegator_powers(pair).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].delegator, user(2));
    assert_eq!(rows[0].power_used, id(150));
    assert_eq!(rows[1].power_used, id(300));

    let outcome = store
        .apply_pair_corrections(pair, &[PairCorrection::DeleteDelegateAllocation])
        .await
        .unwrap();
    assert_eq!(outcome.rows_deleted, 1);
    assert!(store.get_allocation(user(9), id(4)).await.unwrap().is_none());
}

pub async fn pair_corrections_roll_back_on_missing_row(store: &impl LedgerStore) {
    let pair = DelegatePair::new(id(4), user(9));
    store.upsert_delegator_power(id(4), user(9), user(1), id(100)).await.unwrap();

    let err = store
        .apply_pair_corrections(
            pair,
            &[
                PairCorrection::DeleteDelegator { delegator: user(1) },
                PairCorrection::SetDelegatorPower {
                    delegator: user(2),
                    power_used: id(1),
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    // The delete in the same batch must not have landed
    let rows = store.list_delegator_powers(pair).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].power_used, id(100));
}

pub async fn stats_split_active_and_expired(store: &impl LedgerStore) {
    let now = Utc::now();
    store
        .upsert_allocation(user(1), id(1), id(400), true, now + Duration::hours(1))
        .await
        .unwrap();
    store
        .upsert_allocation(user(2), id(1), id(100), false, now + Duration::hours(1))
        .await
        .unwrap();
    store
        .upsert_allocation(user(1), id(2), id(999), true, now - Duration::hours(1))
        .await
        .unwrap();
    store.upsert_delegator_power(id(1), user(3), user(1), id(5)).await.unwrap();

    let stats = store.get_stats(now).await.unwrap();
    assert_eq!(stats.total_allocations, 3);
    assert_eq!(stats.active_allocations, 2);
    assert_eq!(stats.expired_allocations, 1);
    assert_eq!(stats.distinct_users, 2);
    assert_eq!(stats.distinct_proposals, 2);
    assert_eq!(stats.total_active_vp, id(500));
    assert_eq!(stats.delegator_rows, 1);
    assert_eq!(stats.delegate_pairs, 1);
}

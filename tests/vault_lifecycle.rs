mod common;

use common::Harness;
use rust_decimal_macros::dec;
use solana_sdk::pubkey::Pubkey;
use strategy_vault::custody::AssetCustody;
use strategy_vault::vault::VaultEventKind;
use strategy_vault::{RebalanceDirection, RetroactivePolicy, VaultError, VaultStatus};
use tokio_test::{assert_err, assert_ok};

/// An empty vault prices its first deposit 1:1.
#[tokio::test]
async fn first_deposit_mints_one_to_one() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    assert_eq!(h.checked(&vault).await, (0, 0));

    let alice = h.wallet(10_000).await;
    let minted = assert_ok!(h.registry.deposit(&vault.identity, &alice, 1_234).await);

    assert_eq!(minted, 1_234);
    assert_eq!(h.checked(&vault).await, (1_234, 1_234));
    assert_eq!(assert_ok!(h.custody.balance(&alice).await), 10_000 - 1_234);
}

/// Later deposits mint floor(A*S/V) and withdrawals pay floor(s*V/S).
#[tokio::test]
async fn deposit_and_withdraw_follow_share_price() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let alice = h.wallet(10_000).await;
    let bob = h.wallet(10_000).await;

    assert_ok!(h.registry.deposit(&vault.identity, &alice, 1_000).await);
    h.accrue(&vault, 500).await;
    assert_eq!(h.checked(&vault).await, (1_500, 1_000));

    // 300 * 1000 / 1500
    let minted = assert_ok!(h.registry.deposit(&vault.identity, &bob, 300).await);
    assert_eq!(minted, 200);
    assert_eq!(h.checked(&vault).await, (1_800, 1_200));

    // 600 * 1800 / 1200
    let paid = assert_ok!(h.registry.withdraw(&vault.identity, &alice, 600).await);
    assert_eq!(paid, 900);
    assert_eq!(h.checked(&vault).await, (900, 600));

    let handle = h.handle(&vault);
    let vault_ref = handle.lock().await;
    assert_eq!(vault_ref.share_balance(&alice), 400);
    assert_eq!(vault_ref.share_balance(&bob), 200);
    assert_eq!(assert_ok!(vault_ref.share_price().await), dec!(1.5));
}

/// Depositing then immediately withdrawing the minted shares never gains.
#[tokio::test]
async fn round_trip_never_gains() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let seed = h.wallet(10_000).await;
    assert_ok!(h.registry.deposit(&vault.identity, &seed, 1_000).await);
    h.accrue(&vault, 1).await;

    for amount in [7u64, 13, 999, 2_001] {
        let wallet = h.wallet(amount).await;
        let minted = assert_ok!(h.registry.deposit(&vault.identity, &wallet, amount).await);
        let paid = assert_ok!(h.registry.withdraw(&vault.identity, &wallet, minted).await);
        assert!(paid <= amount, "deposited {} got back {}", amount, paid);
        let (value, shares) = h.checked(&vault).await;
        assert!(value > 0 && shares > 0);
    }
}

/// Withdrawing every share empties the vault on both sides.
#[tokio::test]
async fn full_exit_empties_vault() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let alice = h.wallet(1_000).await;

    let minted = assert_ok!(h.registry.deposit(&vault.identity, &alice, 1_000).await);
    assert_ok!(h.registry.withdraw(&vault.identity, &alice, minted).await);

    assert_eq!(h.checked(&vault).await, (0, 0));
    assert_eq!(assert_ok!(h.custody.balance(&alice).await), 1_000);

    // Empty again, so the next depositor is back at 1:1
    let minted = assert_ok!(h.registry.deposit(&vault.identity, &alice, 40).await);
    assert_eq!(minted, 40);
}

/// A deposit worth less than a share and a burn worth nothing are both refused.
#[tokio::test]
async fn zero_effect_operations_are_refused() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let alice = h.wallet(10_000).await;

    assert_ok!(h.registry.deposit(&vault.identity, &alice, 10).await);
    h.accrue(&vault, 90).await;

    // 5 * 10 / 100 rounds to zero shares
    let err = assert_err!(h.registry.deposit(&vault.identity, &alice, 5).await);
    assert!(matches!(err, VaultError::InvalidAmount(_)));
    assert_err!(h.registry.deposit(&vault.identity, &alice, 0).await);
    assert_err!(h.registry.withdraw(&vault.identity, &alice, 0).await);

    assert_eq!(h.checked(&vault).await, (100, 10));
    assert_eq!(assert_ok!(h.custody.balance(&alice).await), 9_990);
}

/// A depositor without enough of the stable asset moves nothing.
#[tokio::test]
async fn insufficient_wallet_balance() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let alice = h.wallet(100).await;

    let err = assert_err!(h.registry.deposit(&vault.identity, &alice, 101).await);
    assert!(matches!(
        err,
        VaultError::InsufficientFunds {
            required: 101,
            available: 100
        }
    ));
    assert_eq!(h.checked(&vault).await, (0, 0));

    let err = assert_err!(h.registry.withdraw(&vault.identity, &alice, 1).await);
    assert!(matches!(err, VaultError::InsufficientFunds { .. }));
}

/// Rebalancing moves custody without changing the vault's value.
#[tokio::test]
async fn rebalance_preserves_value() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let alice = h.wallet(1_000).await;
    assert_ok!(h.registry.deposit(&vault.identity, &alice, 1_000).await);

    let outcome = assert_ok!(
        h.registry
            .rebalance_mango(&vault.identity, &vault.owner, 800, RebalanceDirection::ToMargin)
            .await
    );
    assert_eq!(outcome.before.total_value, 1_000);
    assert_eq!(outcome.after.total_value, 1_000);
    assert_eq!(outcome.after.custody_balance, 200);
    assert_eq!(outcome.after.margin_value, 800);

    // The trigger server may rebalance too
    assert_ok!(
        h.registry
            .rebalance_mango(
                &vault.identity,
                &vault.trigger_server,
                300,
                RebalanceDirection::ToVault
            )
            .await
    );
    let snapshot = assert_ok!(h.registry.valuation(&vault.identity).await);
    assert_eq!(snapshot.custody_balance, 500);
    assert_eq!(snapshot.total_value, 1_000);

    let stranger = Pubkey::new_unique();
    let err = assert_err!(
        h.registry
            .rebalance_mango(&vault.identity, &stranger, 1, RebalanceDirection::ToVault)
            .await
    );
    assert!(matches!(err, VaultError::Unauthorized { .. }));
}

/// Topping up an underwater margin account is value-neutral even though the
/// floored vault value drops.
#[tokio::test]
async fn rebalance_tops_up_underwater_margin_account() {
    let h = Harness::with_prices(RetroactivePolicy::Reject, dec!(2), dec!(10)).await;
    let vault = h.vault().await;
    let alice = h.wallet(100_000).await;
    assert_ok!(h.registry.deposit(&vault.identity, &alice, 100_000).await);
    assert_ok!(
        h.registry
            .rebalance_mango(&vault.identity, &vault.owner, 1_000, RebalanceDirection::ToMargin)
            .await
    );
    assert_ok!(
        h.registry
            .adjust_position_perp(&vault.identity, &vault.trigger_server, -1_000, false)
            .await
    );

    // Short 1000 loses 2 per unit: equity 1000 - 2000 = -1000, floored to zero
    assert_ok!(h.venue.set_perp_price(2, dec!(12)).await);
    let underwater = assert_ok!(h.registry.valuation(&vault.identity).await);
    assert_eq!(underwater.margin_value, 0);
    assert_eq!(underwater.total_value, 99_000);

    let outcome = assert_ok!(
        h.registry
            .rebalance_mango(&vault.identity, &vault.owner, 1_500, RebalanceDirection::ToMargin)
            .await
    );
    assert_eq!(outcome.after.custody_balance, 97_500);
    assert_eq!(outcome.after.margin_value, 500);
    assert_eq!(outcome.after.total_value, 98_000);

    let handle = h.handle(&vault);
    let vault_ref = handle.lock().await;
    let last = vault_ref.events().last().map(|e| e.kind.clone());
    assert!(matches!(
        last,
        Some(VaultEventKind::Rebalanced {
            amount: 1_500,
            total_value: 98_000,
            ..
        })
    ));
}

/// A withdrawal larger than custody fails until funds come back from the margin account.
#[tokio::test]
async fn withdraw_needs_custody_liquidity() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let alice = h.wallet(1_000).await;
    assert_ok!(h.registry.deposit(&vault.identity, &alice, 1_000).await);
    assert_ok!(
        h.registry
            .rebalance_mango(&vault.identity, &vault.owner, 800, RebalanceDirection::ToMargin)
            .await
    );

    let err = assert_err!(h.registry.withdraw(&vault.identity, &alice, 1_000).await);
    assert!(err.is_recoverable());
    assert!(matches!(
        err,
        VaultError::InsufficientLiquidity {
            required: 1_000,
            available: 200
        }
    ));
    assert_eq!(h.handle(&vault).lock().await.share_balance(&alice), 1_000);

    assert_ok!(h.registry.withdraw(&vault.identity, &alice, 200).await);
    assert_ok!(
        h.registry
            .rebalance_mango(&vault.identity, &vault.owner, 800, RebalanceDirection::ToVault)
            .await
    );
    assert_eq!(
        assert_ok!(h.registry.withdraw(&vault.identity, &alice, 800).await),
        800
    );
    assert_eq!(h.checked(&vault).await, (0, 0));
}

/// Only the trigger server may adjust positions; anyone else changes nothing.
#[tokio::test]
async fn position_adjustments_require_trigger_server() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let alice = h.wallet(1_000_000).await;
    assert_ok!(h.registry.deposit(&vault.identity, &alice, 1_000_000).await);
    assert_ok!(
        h.registry
            .rebalance_mango(&vault.identity, &vault.owner, 500_000, RebalanceDirection::ToMargin)
            .await
    );

    let handle = h.handle(&vault);
    let events_before = handle.lock().await.events().len();
    let before = assert_ok!(h.registry.valuation(&vault.identity).await);

    for caller in [vault.owner, alice, Pubkey::new_unique()] {
        let err = assert_err!(
            h.registry
                .adjust_position_spot(&vault.identity, &caller, 100, None)
                .await
        );
        assert!(matches!(err, VaultError::Unauthorized { operation: "adjust_position_spot", .. }));
        let err = assert_err!(
            h.registry
                .adjust_position_perp(&vault.identity, &caller, -100, false)
                .await
        );
        assert!(matches!(err, VaultError::Unauthorized { operation: "adjust_position_perp", .. }));
    }

    let after = assert_ok!(h.registry.valuation(&vault.identity).await);
    assert_eq!(before.margin, after.margin);
    assert_eq!(before.total_value, after.total_value);
    assert_eq!(handle.lock().await.events().len(), events_before);
}

/// Positions are valued at the venue's marks.
#[tokio::test]
async fn positions_mark_to_market() {
    let h = Harness::with_prices(RetroactivePolicy::Reject, dec!(2), dec!(10)).await;
    let vault = h.vault().await;
    let alice = h.wallet(100_000).await;
    assert_ok!(h.registry.deposit(&vault.identity, &alice, 100_000).await);
    assert_ok!(
        h.registry
            .rebalance_mango(&vault.identity, &vault.owner, 50_000, RebalanceDirection::ToMargin)
            .await
    );

    let spot = assert_ok!(
        h.registry
            .adjust_position_spot(&vault.identity, &vault.trigger_server, 1_000, None)
            .await
    );
    assert!(spot.is_filled());
    let perp = assert_ok!(
        h.registry
            .adjust_position_perp(&vault.identity, &vault.trigger_server, -100, false)
            .await
    );
    assert!(perp.is_filled());
    assert_eq!(h.checked(&vault).await, (100_000, 100_000));

    // Spot up 1 per unit on 1000 units, perp short loses 2 per unit on 100 units
    assert_ok!(h.venue.set_spot_price(2, dec!(3)).await);
    assert_ok!(h.venue.set_perp_price(2, dec!(12)).await);
    let snapshot = assert_ok!(h.registry.valuation(&vault.identity).await);
    assert_eq!(snapshot.total_value, 100_000 + 1_000 - 200);
    assert_eq!(snapshot.margin.spot_base_position, 1_000);
    assert_eq!(snapshot.margin.perp_base_position, -100);

    let closed = assert_ok!(
        h.registry
            .adjust_position_perp(&vault.identity, &vault.trigger_server, 500, true)
            .await
    );
    assert_eq!(closed.filled_quantity, 100);
}

/// Initialize creates the venue accounts and every committed operation is logged.
#[tokio::test]
async fn lifecycle_event_log() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let handle = h.handle(&vault);

    let strategy_account = assert_ok!(handle.lock().await.state().strategy_account());
    assert_eq!(
        h.venue.margin_account_owner(&vault.margin_account).await,
        Some(strategy_account)
    );
    assert_eq!(handle.lock().await.status(), VaultStatus::Active);

    let alice = h.wallet(1_000).await;
    assert_ok!(h.registry.deposit(&vault.identity, &alice, 1_000).await);
    assert_err!(h.registry.deposit(&vault.identity, &alice, 1).await);
    assert_ok!(h.registry.withdraw(&vault.identity, &alice, 400).await);

    let vault_ref = handle.lock().await;
    let names: Vec<&str> = vault_ref
        .events()
        .events()
        .iter()
        .map(|e| e.kind.name())
        .collect();
    assert_eq!(names, ["initialized", "deposited", "withdrawn"]);
    let sequences: Vec<u64> = vault_ref.events().events().iter().map(|e| e.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    assert!(matches!(
        vault_ref.events().last().map(|e| &e.kind),
        Some(VaultEventKind::Withdrawn { amount: 400, .. })
    ));
}

/// Venue failures surface unchanged and leave the vault untouched.
#[tokio::test]
async fn venue_failure_is_surfaced() {
    let h = Harness::new(RetroactivePolicy::Reject).await;
    let vault = h.vault().await;
    let alice = h.wallet(1_000).await;
    assert_ok!(h.registry.deposit(&vault.identity, &alice, 1_000).await);

    h.venue.fail_next("venue halted").await;
    let err = assert_err!(
        h.registry
            .rebalance_mango(&vault.identity, &vault.owner, 500, RebalanceDirection::ToMargin)
            .await
    );
    assert!(matches!(&err, VaultError::ExternalVenueFailure(msg) if msg.contains("venue halted")));

    let snapshot = assert_ok!(h.registry.valuation(&vault.identity).await);
    assert_eq!(snapshot.custody_balance, 1_000);
    assert_eq!(snapshot.margin_value, 0);
}

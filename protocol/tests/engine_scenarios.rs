//! End-to-end tests for the vault engine.
//!
//! Each test wires a real `Engine` to its own store, feed oracle, trustline
//! registry, and emitter, then drives it only through `process` /
//! `on_deposit`. Vault state is seeded directly through the store where a
//! scenario starts from an existing position.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pegvault_protocol::amount::Amount;
use pegvault_protocol::config::{EngineConfig, REQUIRED_TRUSTLINE_LIMIT};
use pegvault_protocol::credential::TrustlineRegistry;
use pegvault_protocol::engine::{AcceptCode, ErrorCategory};
use pegvault_protocol::oracle::FeedOracle;
use pegvault_protocol::settlement::{MemoryEmitter, OutboxEmitter, Payout};
use pegvault_protocol::storage::{MemoryVaultStore, VaultDb, VaultStore};
use pegvault_protocol::{AccountId, DepositEvent, Engine, EngineError, SourceTag, Vault, VaultKey};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const ENGINE: AccountId = AccountId([0xEE; 20]);
const ALICE: AccountId = AccountId([0xA1; 20]);
const BOB: AccountId = AccountId([0xB0; 20]);
const CAROL: AccountId = AccountId([0xC0; 20]);

fn amt(s: &str) -> Amount {
    s.parse().unwrap()
}

fn vault(debt: &str, collateral: &str) -> Vault {
    Vault::new(amt(debt), amt(collateral))
}

fn key(account: AccountId, tag: u32) -> VaultKey {
    VaultKey::new(account, SourceTag(tag))
}

struct Harness {
    engine: Engine,
    store: Arc<MemoryVaultStore>,
    oracle: Arc<FeedOracle>,
    emitter: Arc<MemoryEmitter>,
}

impl Harness {
    /// Alice, Bob, and Carol hold sufficient trustlines; the rate is 1.
    fn new() -> Self {
        let store = Arc::new(MemoryVaultStore::new());
        let oracle = Arc::new(FeedOracle::with_rate(Amount::from_integer(1)));
        let trustlines = Arc::new(TrustlineRegistry::new());
        for account in [ALICE, BOB, CAROL] {
            trustlines.set_limit(account, REQUIRED_TRUSTLINE_LIMIT);
        }
        let emitter = Arc::new(MemoryEmitter::new());
        let engine = Engine::new(
            EngineConfig::new(ENGINE),
            store.clone(),
            oracle.clone(),
            trustlines,
            emitter.clone(),
        );
        Self {
            engine,
            store,
            oracle,
            emitter,
        }
    }

    fn seed(&self, key: VaultKey, vault: Vault) {
        self.store.put(&key, &vault).unwrap();
    }

    fn get(&self, key: VaultKey) -> Option<Vault> {
        self.store.get(&key).unwrap()
    }

    fn reserve(&self, sender: AccountId, amount: &str) -> DepositEvent {
        DepositEvent::reserve(sender, amt(amount)).with_tag(1)
    }

    fn usd(&self, sender: AccountId, amount: &str) -> DepositEvent {
        DepositEvent::stablecoin(sender, amt(amount), self.engine.config().stablecoin).with_tag(1)
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_mint_into_new_vault() {
    let h = Harness::new();

    let outcome = h.engine.process(&h.reserve(ALICE, "200")).unwrap();
    assert_eq!(outcome.code, AcceptCode::Minted);
    assert_eq!(h.get(key(ALICE, 1)), Some(vault("100", "200")));

    let sent = h.emitter.last().unwrap();
    assert_eq!(sent.transfer.recipient, ALICE);
    match sent.transfer.payout {
        Payout::Stablecoin { amount, issuer, .. } => {
            assert_eq!(amount, amt("100"));
            assert_eq!(issuer, ENGINE);
        }
        other => panic!("expected stablecoin payout, got {other:?}"),
    }
    assert_eq!(outcome.transfer_id, Some(sent.id));
}

#[test]
fn scenario_full_redemption() {
    let h = Harness::new();
    h.seed(key(ALICE, 1), vault("100", "200"));

    let outcome = h.engine.process(&h.usd(ALICE, "100")).unwrap();
    assert_eq!(outcome.code, AcceptCode::Redeemed);
    assert_eq!(h.get(key(ALICE, 1)), Some(vault("0", "0")));
    assert_eq!(
        h.emitter.last().unwrap().transfer.payout,
        Payout::Reserve { drops: 200_000_000 }
    );
}

#[test]
fn scenario_owner_absorbs_into_underwater_vault() {
    let h = Harness::new();
    h.seed(key(ALICE, 1), vault("100", "50"));

    let outcome = h.engine.process(&h.reserve(ALICE, "10")).unwrap();
    assert_eq!(outcome.code, AcceptCode::AbsorbedReserve);
    assert_eq!(outcome.transfer_id, None);
    assert_eq!(h.get(key(ALICE, 1)), Some(vault("100", "60")));
    assert!(h.emitter.sent().is_empty());
}

#[test]
fn scenario_takeover_relocates_vault() {
    let h = Harness::new();
    h.seed(key(ALICE, 1), vault("100", "100"));

    let event = h.reserve(BOB, "150").taking_over(key(ALICE, 1));
    let outcome = h.engine.process(&event).unwrap();

    assert_eq!(outcome.code, AcceptCode::TakeoverMinted);
    assert_eq!(outcome.previous_key, Some(key(ALICE, 1)));
    assert_eq!(outcome.vault_key, Some(key(BOB, 1)));
    assert_eq!(h.get(key(ALICE, 1)), None);
    assert_eq!(h.get(key(BOB, 1)), Some(vault("125", "250")));

    let sent = h.emitter.last().unwrap();
    assert_eq!(sent.transfer.recipient, BOB);
    assert_eq!(sent.transfer.vault, key(BOB, 1));
}

#[test]
fn scenario_takeover_of_healthy_vault_rejected() {
    let h = Harness::new();
    h.seed(key(ALICE, 1), vault("50", "100"));

    let err = h
        .engine
        .process(&h.reserve(BOB, "500").taking_over(key(ALICE, 1)))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotYetLiquidatable(k) if k == key(ALICE, 1)));
    assert_eq!(h.get(key(ALICE, 1)), Some(vault("50", "100")));
    assert_eq!(h.get(key(BOB, 1)), None);
    assert!(h.emitter.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Redemption and Takeover Paths
// ---------------------------------------------------------------------------

#[test]
fn stablecoin_takeover_redeems_to_liquidator() {
    let h = Harness::new();
    h.seed(key(ALICE, 1), vault("100", "100"));

    let outcome = h
        .engine
        .process(&h.usd(BOB, "60").taking_over(key(ALICE, 1)))
        .unwrap();
    assert_eq!(outcome.code, AcceptCode::TakeoverRedeemed);
    // Debt 40 at price 1 keeps 20 collateral; the other 80 is paid out.
    assert_eq!(h.get(key(BOB, 1)), Some(vault("40", "20")));
    assert_eq!(
        h.emitter.last().unwrap().transfer.payout,
        Payout::Reserve { drops: 80_000_000 }
    );
}

#[test]
fn takeover_after_price_drop() {
    let h = Harness::new();
    h.engine.process(&h.reserve(ALICE, "200")).unwrap();

    // At rate 1 the vault sits at 50%.
    let takeover = h.reserve(BOB, "300").taking_over(key(ALICE, 1));
    assert_eq!(
        h.engine.on_deposit(&takeover).category,
        Some(ErrorCategory::NotYetLiquidatable)
    );

    h.oracle.publish(amt("0.5"));
    let outcome = h.engine.process(&takeover).unwrap();
    assert_eq!(outcome.code, AcceptCode::TakeoverMinted);
    // 500 collateral at 0.5 supports 125 debt; 25 more is minted.
    assert_eq!(h.get(key(BOB, 1)), Some(vault("125", "500")));
}

#[test]
fn concurrent_takeovers_of_one_vault_have_one_winner() {
    let h = Arc::new(Harness::new());
    h.seed(key(ALICE, 1), vault("100", "100"));

    let results: Vec<_> = std::thread::scope(|s| {
        [BOB, CAROL]
            .map(|liquidator| {
                let h = Arc::clone(&h);
                s.spawn(move || {
                    h.engine
                        .on_deposit(&h.reserve(liquidator, "150").taking_over(key(ALICE, 1)))
                })
            })
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let winners = results.iter().filter(|r| r.accepted).count();
    assert_eq!(winners, 1);
    let loser = results.iter().find(|r| !r.accepted).unwrap();
    assert_eq!(loser.category, Some(ErrorCategory::NoSuchVault));
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.emitter.sent().len(), 1);
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

#[test]
fn rejections_leave_every_vault_untouched() {
    let h = Harness::new();
    let seeded = [
        (key(ALICE, 1), vault("100", "200")),
        (key(BOB, 1), vault("100", "100")),
        (key(CAROL, 7), vault("10", "100")),
    ];
    for (k, v) in seeded {
        h.seed(k, v);
    }

    let stranger = AccountId([0x42; 20]);
    let foreign = DepositEvent::stablecoin(
        ALICE,
        amt("10"),
        pegvault_protocol::asset::StablecoinIdentity {
            issuer: stranger,
            currency: h.engine.config().stablecoin.currency,
        },
    )
    .with_tag(1);

    let rejected = [
        h.reserve(stranger, "10"),
        foreign,
        h.usd(CAROL, "10"),
        h.reserve(CAROL, "10").taking_over(key(ALICE, 9)),
        h.reserve(ALICE, "1").taking_over(key(BOB, 1)),
        h.reserve(CAROL, "500").taking_over(key(ALICE, 1)),
    ];

    for event in &rejected {
        let result = h.engine.on_deposit(event);
        assert!(!result.accepted, "{event:?} was accepted");
        assert!(!result.committed);
        for (k, v) in seeded {
            assert_eq!(h.get(k), Some(v), "vault {k} changed after {event:?}");
        }
    }
    assert_eq!(h.store.len(), seeded.len());
    assert!(h.emitter.sent().is_empty());
}

#[test]
fn takeover_overwrites_depositor_vault_at_destination() {
    let h = Harness::new();
    h.seed(key(ALICE, 1), vault("100", "100"));
    h.seed(key(BOB, 1), vault("1", "10"));
    h.seed(key(BOB, 2), vault("3", "30"));

    let outcome = h
        .engine
        .process(&h.reserve(BOB, "150").taking_over(key(ALICE, 1)))
        .unwrap();
    assert_eq!(outcome.code, AcceptCode::TakeoverMinted);
    assert_eq!(h.get(key(ALICE, 1)), None);
    assert_eq!(h.get(key(BOB, 1)), Some(vault("125", "250")));
    // Other tags of the depositor are not touched.
    assert_eq!(h.get(key(BOB, 2)), Some(vault("3", "30")));
    assert_eq!(h.store.len(), 2);
}

// ---------------------------------------------------------------------------
// Vault Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn tags_of_one_account_hold_independent_vaults() {
    let h = Harness::new();

    h.engine
        .process(&DepositEvent::reserve(ALICE, amt("200")).with_tag(1))
        .unwrap();
    h.engine
        .process(&DepositEvent::reserve(ALICE, amt("40")).with_tag(2))
        .unwrap();
    h.engine.process(&DepositEvent::reserve(ALICE, amt("10"))).unwrap();

    assert_eq!(h.get(key(ALICE, 1)), Some(vault("100", "200")));
    assert_eq!(h.get(key(ALICE, 2)), Some(vault("20", "40")));
    assert_eq!(
        h.get(VaultKey::new(ALICE, SourceTag::NONE)),
        Some(vault("5", "10"))
    );

    // Repaying under tag 2 leaves tag 1 alone.
    let repay = DepositEvent::stablecoin(ALICE, amt("20"), h.engine.config().stablecoin).with_tag(2);
    let outcome = h.engine.process(&repay).unwrap();
    assert_eq!(outcome.code, AcceptCode::Redeemed);
    assert_eq!(h.get(key(ALICE, 2)), Some(vault("0", "0")));
    assert_eq!(h.get(key(ALICE, 1)), Some(vault("100", "200")));
}

#[test]
fn fully_redeemed_vault_is_reused_by_next_deposit() {
    let h = Harness::new();
    h.engine.process(&h.reserve(ALICE, "200")).unwrap();
    h.engine.process(&h.usd(ALICE, "100")).unwrap();
    assert_eq!(h.get(key(ALICE, 1)), Some(Vault::EMPTY));

    let outcome = h.engine.process(&h.reserve(ALICE, "60")).unwrap();
    assert_eq!(outcome.code, AcceptCode::Minted);
    assert_eq!(h.get(key(ALICE, 1)), Some(vault("30", "60")));
    assert_eq!(h.store.len(), 1);

    let payouts: Vec<_> = h
        .emitter
        .sent()
        .into_iter()
        .map(|sent| sent.transfer.payout)
        .collect();
    assert_eq!(payouts.len(), 3);
    assert_eq!(payouts[1], Payout::Reserve { drops: 200_000_000 });
    assert!(matches!(payouts[2], Payout::Stablecoin { amount, .. } if amount == amt("30")));
}

#[test]
fn emission_failure_reports_committed_state() {
    let h = Harness::new();
    h.emitter.set_offline(true);

    let result = h.engine.on_deposit(&h.reserve(ALICE, "200"));
    assert!(!result.accepted);
    assert!(result.committed);
    assert_eq!(result.code, 800);
    assert_eq!(result.vault, Some(vault("100", "200")));
    assert_eq!(h.get(key(ALICE, 1)), Some(vault("100", "200")));

    // A follow-up deposit from the owner goes out normally once the emitter
    // is back.
    h.emitter.set_offline(false);
    let outcome = h.engine.process(&h.reserve(ALICE, "2")).unwrap();
    assert_eq!(outcome.code, AcceptCode::Minted);
    assert_eq!(h.get(key(ALICE, 1)), Some(vault("101", "202")));
}

#[test]
fn engine_account_payments_pass_through() {
    let h = Harness::new();
    let result = h.engine.on_deposit(&DepositEvent::reserve(ENGINE, amt("50")));
    assert!(result.accepted);
    assert!(!result.committed);
    assert_eq!(result.note, "Outgoing transaction");
    assert!(h.store.is_empty());
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

/// After every mint the persisted vault is at or below the new-vault ratio,
/// up to one unit in the last of sixteen digits. After every redemption the
/// persisted collateral is exactly `debt / price × NEW_RATIO`.
#[test]
fn persisted_vaults_land_on_their_ceilings() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let h = Harness::new();
    let ceiling = amt("0.5000000000001");
    let new_ratio = h.engine.config().risk.new_ratio;
    let accounts = [ALICE, BOB, CAROL];

    for _ in 0..500 {
        let price = Amount::from_parts(rng.gen_range(1..=400), -2).unwrap();
        h.oracle.publish(price);

        let sender = accounts[rng.gen_range(0..accounts.len())];
        let amount = Amount::from_parts(rng.gen_range(1..=100_000), -2).unwrap();
        let event = if rng.gen_bool(0.6) {
            DepositEvent::reserve(sender, amount)
        } else {
            DepositEvent::stablecoin(sender, amount, h.engine.config().stablecoin)
        };

        let Ok(outcome) = h.engine.process(&event) else {
            continue;
        };
        let key = match outcome.vault_key {
            Some(key) => key,
            None => continue,
        };
        let stored = h.get(key).unwrap();
        assert_eq!(Some(stored), outcome.vault);

        match outcome.code {
            AcceptCode::Minted => {
                let ratio = stored.debt_ratio(price).unwrap().unwrap();
                assert!(ratio <= ceiling, "{key}: {stored:?} at {price} has ratio {ratio}");
            }
            AcceptCode::Redeemed => {
                let expected = stored.debt.checked_div(price).unwrap().scale(new_ratio).unwrap();
                assert_eq!(stored.collateral, expected, "{key}: {stored:?} at {price}");
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn sled_backed_engine_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let written;
    let transfer_id;

    {
        let db = VaultDb::open(dir.path()).unwrap();
        let trustlines = Arc::new(TrustlineRegistry::new());
        trustlines.set_limit(ALICE, REQUIRED_TRUSTLINE_LIMIT);
        let engine = Engine::new(
            EngineConfig::new(ENGINE),
            Arc::new(db.clone()),
            Arc::new(FeedOracle::with_rate(amt("1.25"))),
            trustlines,
            Arc::new(OutboxEmitter::new(db.clone())),
        );

        let outcome = engine
            .process(&DepositEvent::reserve(ALICE, amt("333.333333")).with_tag(4))
            .unwrap();
        written = outcome.vault.unwrap();
        transfer_id = outcome.transfer_id.unwrap();
        db.flush().unwrap();
    }

    let db = VaultDb::open(dir.path()).unwrap();
    let read = db.get(&key(ALICE, 4)).unwrap().unwrap();
    assert_eq!(read.to_bytes(), written.to_bytes());

    let emitted = db.get_transfer(&transfer_id).unwrap().unwrap();
    assert_eq!(emitted.transfer.recipient, ALICE);
    match emitted.transfer.payout {
        Payout::Stablecoin { amount, .. } => assert_eq!(amount, written.debt),
        other => panic!("expected stablecoin payout, got {other:?}"),
    }
}

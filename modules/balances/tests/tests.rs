use chain_primitives::{AccountName, Amount, AssetSymbol, AssetType, Time};
use chain_support::Parameters;
use module_assets::{AssetFlags, AssetRegistryState, SupplyCompartment};
use module_balances::{BalancesState, Compartment};

fn acct(s: &str) -> AccountName {
	AccountName::new(s).unwrap()
}

fn sym(s: &str) -> AssetSymbol {
	AssetSymbol::new(s).unwrap()
}

struct World {
	registry: AssetRegistryState,
	balances: BalancesState,
	params: Parameters,
}

impl World {
	fn new() -> Self {
		let mut registry = AssetRegistryState::new();
		registry
			.create_asset(sym("X"), AssetType::Currency, acct("issuer"), AssetFlags::default(), Time::from_secs(0))
			.unwrap();
		Self {
			registry,
			balances: BalancesState::new(),
			params: Parameters::default(),
		}
	}

	fn fund_liquid(&mut self, owner: AccountName, amount: Amount, now: Time) {
		self.registry.mint(sym("X"), SupplyCompartment::Liquid, amount, now).unwrap();
		self.balances
			.adjust(&mut self.registry, owner, sym("X"), Compartment::Liquid, amount, now)
			.unwrap();
	}
}

// S1. Stake/unstake schedule.
#[test]
fn stake_schedule_completes_over_four_intervals() {
	let mut w = World::new();
	let alice = acct("alice");
	let t0 = Time::from_secs(0);
	w.fund_liquid(alice, Amount(100_000_00000000), t0);

	w.balances
		.stake_asset(&mut w.registry, &w.params, alice, alice, sym("X"), Amount(100_000_00000000), t0)
		.unwrap();

	let balance = w.balances.get(alice, sym("X"));
	assert_eq!(balance.stake_rate, Amount(25_000_00000000));
	assert_eq!(balance.to_stake, Amount(100_000_00000000));
	assert_eq!(balance.total_staked, Amount::ZERO);
	assert_eq!(balance.liquid, Amount::ZERO);

	let mut now = t0;
	for i in 1..=4 {
		now = now.saturating_add_secs(w.params.stake_interval_secs);
		let fired = w.balances.tick_stake(&mut w.registry, &w.params, alice, sym("X"), now).unwrap();
		assert!(fired, "tranche {i} should fire");
	}

	let balance = w.balances.get(alice, sym("X"));
	assert_eq!(balance.staked, Amount(100_000_00000000));
	assert_eq!(balance.to_stake, Amount::ZERO);
	assert_eq!(balance.next_stake_time, Time::MAX);
}

// S2. Delegate then withdraw.
#[test]
fn delegation_expiration_round_trip() {
	let mut w = World::new();
	let alice = acct("alice");
	let bob = acct("bob");
	let t0 = Time::from_secs(0);
	w.fund_liquid(alice, Amount(100_000_00000000), t0);
	w.balances
		.stake_asset(&mut w.registry, &w.params, alice, alice, sym("X"), Amount(100_000_00000000), t0)
		.unwrap();
	let mut now = t0;
	for _ in 0..4 {
		now = now.saturating_add_secs(w.params.stake_interval_secs);
		w.balances.tick_stake(&mut w.registry, &w.params, alice, sym("X"), now).unwrap();
	}

	w.balances
		.delegate(&mut w.registry, &w.params, alice, bob, sym("X"), Amount(1_00000000), now)
		.unwrap();
	assert_eq!(w.balances.get(alice, sym("X")).delegated, Amount(1_00000000));
	assert_eq!(w.balances.get(bob, sym("X")).receiving, Amount(1_00000000));

	w.balances.delegate(&mut w.registry, &w.params, alice, bob, sym("X"), Amount::ZERO, now).unwrap();
	// Still active until the expiration matures.
	assert_eq!(w.balances.get(alice, sym("X")).delegated, Amount(1_00000000));

	let matured = now.saturating_add_secs(w.params.delegation_return_delay_secs);
	let processed = w.balances.process_expired_delegations(&mut w.registry, matured).unwrap();
	assert_eq!(processed, 1);
	assert_eq!(w.balances.get(alice, sym("X")).delegated, Amount::ZERO);
	assert_eq!(w.balances.get(bob, sym("X")).receiving, Amount::ZERO);
}

// S3. Savings withdraw timing.
#[test]
fn savings_withdraw_matures_after_delay() {
	let mut w = World::new();
	let alice = acct("alice");
	let t0 = Time::from_secs(1_000_000);
	w.fund_liquid(alice, Amount(100_000_00000000), t0);
	w.balances
		.transfer_to_savings(&mut w.registry, alice, sym("X"), Amount(100_000_00000000), t0)
		.unwrap();
	assert_eq!(w.balances.get(alice, sym("X")).savings, Amount(100_000_00000000));

	w.balances
		.transfer_from_savings(&mut w.registry, &w.params, alice, alice, sym("X"), Amount(1_00000000), 7, t0)
		.unwrap();
	assert_eq!(w.balances.get(alice, sym("X")).savings, Amount(99_999_00000000));
	assert_eq!(w.balances.get(alice, sym("X")).liquid, Amount::ZERO);

	let before_complete = t0.saturating_add_secs(w.params.savings_delay_secs - 1);
	let completed = w.balances.process_due_savings_withdrawals(&mut w.registry, before_complete).unwrap();
	assert_eq!(completed, 0);
	assert_eq!(w.balances.get(alice, sym("X")).liquid, Amount::ZERO);

	let complete = t0.saturating_add_secs(w.params.savings_delay_secs);
	let completed = w.balances.process_due_savings_withdrawals(&mut w.registry, complete).unwrap();
	assert_eq!(completed, 1);
	assert_eq!(w.balances.get(alice, sym("X")).liquid, Amount(1_00000000));
}

#[test]
fn unstake_route_enforces_positive_percent_and_total_cap() {
	let mut w = World::new();
	let alice = acct("alice");
	let bob = acct("bob");
	let carol = acct("carol");

	let err = w
		.balances
		.unstake_asset_route(alice, bob, sym("X"), 0, false)
		.unwrap_err();
	assert!(matches!(err, chain_support::ChainError::InvariantViolation(_)));

	w.balances.unstake_asset_route(alice, bob, sym("X"), 6_000, false).unwrap();
	let err = w
		.balances
		.unstake_asset_route(alice, carol, sym("X"), 5_000, false)
		.unwrap_err();
	assert!(matches!(err, chain_support::ChainError::InvariantViolation(_)));

	w.balances.unstake_asset_route(alice, carol, sym("X"), 4_000, false).unwrap();
}

#[test]
fn unstake_cannot_reduce_staked_below_delegated() {
	let mut w = World::new();
	let alice = acct("alice");
	let bob = acct("bob");
	let t0 = Time::from_secs(0);
	w.fund_liquid(alice, Amount(10_00000000), t0);
	w.balances
		.stake_asset(&mut w.registry, &w.params, alice, alice, sym("X"), Amount(10_00000000), t0)
		.unwrap();
	let mut now = t0;
	for _ in 0..4 {
		now = now.saturating_add_secs(w.params.stake_interval_secs);
		w.balances.tick_stake(&mut w.registry, &w.params, alice, sym("X"), now).unwrap();
	}
	w.balances
		.delegate(&mut w.registry, &w.params, alice, bob, sym("X"), Amount(10_00000000), now)
		.unwrap();

	let err = w.balances.unstake_asset(&w.params, alice, sym("X"), Amount(1_00000000), now).unwrap_err();
	assert!(matches!(err, chain_support::ChainError::InvariantViolation(_)));
}

#[test]
fn voting_power_matches_staked_minus_delegated_plus_receiving() {
	let mut w = World::new();
	let alice = acct("alice");
	let bob = acct("bob");
	let t0 = Time::from_secs(0);
	w.fund_liquid(alice, Amount(10_00000000), t0);
	w.balances
		.stake_asset(&mut w.registry, &w.params, alice, alice, sym("X"), Amount(10_00000000), t0)
		.unwrap();
	let mut now = t0;
	for _ in 0..4 {
		now = now.saturating_add_secs(w.params.stake_interval_secs);
		w.balances.tick_stake(&mut w.registry, &w.params, alice, sym("X"), now).unwrap();
	}
	w.balances
		.delegate(&mut w.registry, &w.params, alice, bob, sym("X"), Amount(4_00000000), now)
		.unwrap();

	assert_eq!(w.balances.voting_power(alice, sym("X")), Some(Amount(6_00000000)));
	assert_eq!(w.balances.voting_power(bob, sym("X")), Some(Amount(4_00000000)));
}

#[test]
fn voting_proxy_rejects_cycles() {
	let mut w = World::new();
	let alice = acct("alice");
	let bob = acct("bob");
	w.balances.set_voting_proxy(alice, bob).unwrap();
	let err = w.balances.set_voting_proxy(bob, alice).unwrap_err();
	assert!(matches!(err, chain_support::ChainError::InvariantViolation(_)));
}

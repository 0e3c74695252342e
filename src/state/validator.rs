use crate::config::EngineConfig;
use crate::state::generator::{
    check_thread_payment, next_close_thread, next_confirm_pending, next_exchange, next_open_thread,
    next_payment, next_pending_deposit, next_pending_withdrawal, next_thread_payment,
};
use crate::types::{
    ChannelState, ThreadPaymentArgs, ThreadState, UpdateArgs, Violation, ViolationKind,
};
use crate::utils::signature;
use ethers::types::{Address, U256};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Source of the current unix time, in seconds.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

/// Checks a proposed channel state against its predecessor and the update
/// that supposedly produced it.
#[derive(Clone, Debug)]
pub struct Validator {
    hub_address: Address,
    clock: Arc<dyn Clock>,
}

impl Validator {
    pub fn new(hub_address: Address) -> Self {
        Self::with_clock(hub_address, Arc::new(SystemClock))
    }

    pub fn with_clock(hub_address: Address, clock: Arc<dyn Clock>) -> Self {
        Self { hub_address, clock }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.hub_address)
    }

    pub fn hub_address(&self) -> Address {
        self.hub_address
    }

    /// `None` if `proposed` is a valid successor of `previous` under `args`.
    pub fn validate(
        &self,
        previous: &ChannelState,
        proposed: &ChannelState,
        args: &UpdateArgs,
    ) -> Option<Violation> {
        match self.check(previous, proposed, args) {
            Ok(()) => None,
            Err(violation) => {
                debug!(
                    reason = %args.reason(),
                    kind = %violation.kind,
                    tx_count_global = %proposed.tx_count_global,
                    user = ?proposed.user,
                    "rejected channel update: {}",
                    violation.message
                );
                Some(violation.with_states(previous, proposed))
            }
        }
    }

    fn check(
        &self,
        previous: &ChannelState,
        proposed: &ChannelState,
        args: &UpdateArgs,
    ) -> Result<(), Violation> {
        check_global_nonce(previous, proposed)?;
        chain_nonce_step(previous, proposed)?;
        check_identity(previous, proposed)?;
        self.check_signatures(proposed)?;

        match args {
            UpdateArgs::Payment(a) => {
                check_chain_step(previous, proposed, 0)?;
                check_pending_unchanged(previous, proposed)?;
                check_threads_unchanged(previous, proposed)?;
                check_recipient_unchanged(previous, proposed)?;
                check_conservation(previous, proposed)?;
                let expected = next_payment(previous, a)?;
                check_balances(&expected, proposed, ViolationKind::PaymentMismatch)?;
                check_timeout_cleared(proposed)
            }
            UpdateArgs::Exchange(a) => {
                check_chain_step(previous, proposed, 0)?;
                check_pending_unchanged(previous, proposed)?;
                check_threads_unchanged(previous, proposed)?;
                check_recipient_unchanged(previous, proposed)?;
                check_conservation(previous, proposed)?;
                let expected = next_exchange(previous, a)?;
                check_balances(&expected, proposed, ViolationKind::ExchangeMismatch)?;
                check_timeout_cleared(proposed)
            }
            UpdateArgs::ProposePendingDeposit(a) => {
                check_chain_step(previous, proposed, 1)?;
                check_operating_unchanged(previous, proposed)?;
                check_threads_unchanged(previous, proposed)?;
                check_recipient_unchanged(previous, proposed)?;
                let expected = next_pending_deposit(previous, a)?;
                check_pending(&expected, proposed)?;
                self.check_timeout(proposed)
            }
            UpdateArgs::ProposePendingWithdrawal(a) => {
                check_chain_step(previous, proposed, 1)?;
                check_operating_unchanged(previous, proposed)?;
                check_threads_unchanged(previous, proposed)?;
                let expected = next_pending_withdrawal(previous, a)?;
                if proposed.recipient != expected.recipient {
                    return Err(Violation::new(
                        ViolationKind::Identity,
                        format!(
                            "recipient must be {:?}, got {:?}",
                            expected.recipient, proposed.recipient
                        ),
                    ));
                }
                check_pending(&expected, proposed)?;
                self.check_timeout(proposed)
            }
            UpdateArgs::ConfirmPending(a) => {
                check_chain_step(previous, proposed, 0)?;
                check_threads_unchanged(previous, proposed)?;
                check_recipient_unchanged(previous, proposed)?;
                let expected = next_confirm_pending(previous, a)?;
                if let Some(field) = proposed.first_pending_op() {
                    return Err(Violation::new(
                        ViolationKind::ConfirmMismatch,
                        format!("{} must be cleared by the confirmation", field),
                    ));
                }
                if !proposed.timeout.is_zero() {
                    return Err(Violation::new(
                        ViolationKind::ConfirmMismatch,
                        "confirmed state must have timeout 0",
                    ));
                }
                check_balances(&expected, proposed, ViolationKind::ConfirmMismatch)
            }
            UpdateArgs::OpenThread(a) => {
                check_chain_step(previous, proposed, 0)?;
                check_pending_unchanged(previous, proposed)?;
                check_recipient_unchanged(previous, proposed)?;
                let expected = next_open_thread(previous, a)?;
                check_thread_commitment(&expected, proposed)?;
                check_balances(&expected, proposed, ViolationKind::Conservation)?;
                check_timeout_cleared(proposed)
            }
            UpdateArgs::CloseThread(a) => {
                check_chain_step(previous, proposed, 0)?;
                check_pending_unchanged(previous, proposed)?;
                check_recipient_unchanged(previous, proposed)?;
                let expected = next_close_thread(previous, a)?;
                check_thread_commitment(&expected, proposed)?;
                check_balances(&expected, proposed, ViolationKind::Conservation)?;
                check_timeout_cleared(proposed)
            }
        }
    }

    fn check_signatures(&self, proposed: &ChannelState) -> Result<(), Violation> {
        if let Some(sig) = &proposed.sig_user {
            if !signature::verify_channel_signature(proposed, sig, proposed.user) {
                return Err(Violation::new(
                    ViolationKind::Signature,
                    "sigUser does not recover to the channel user",
                ));
            }
        }
        if let Some(sig) = &proposed.sig_hub {
            if !signature::verify_channel_signature(proposed, sig, self.hub_address) {
                return Err(Violation::new(
                    ViolationKind::Signature,
                    "sigHub does not recover to the hub",
                ));
            }
        }
        Ok(())
    }

    fn check_timeout(&self, proposed: &ChannelState) -> Result<(), Violation> {
        let now = U256::from(self.clock.now());
        if !proposed.timeout.is_zero() && proposed.timeout <= now {
            return Err(Violation::new(
                ViolationKind::TimeoutElapsed,
                format!("timeout {} is not after {}", proposed.timeout, now),
            ));
        }
        Ok(())
    }
}

/// `None` if the sender can afford the thread payment.
pub fn validate_thread_payment(previous: &ThreadState, args: &ThreadPaymentArgs) -> Option<Violation> {
    let violation = check_thread_payment(previous, args).err()?;
    debug!(kind = %violation.kind, sender = ?previous.sender, "rejected thread payment: {}", violation.message);
    Some(violation)
}

/// `None` if `proposed` is `previous` after the payment in `args`.
pub fn validate_thread_update(
    previous: &ThreadState,
    proposed: &ThreadState,
    args: &ThreadPaymentArgs,
) -> Option<Violation> {
    let violation = check_thread_update(previous, proposed, args).err()?;
    debug!(kind = %violation.kind, sender = ?previous.sender, "rejected thread update: {}", violation.message);
    Some(violation)
}

fn check_thread_update(
    previous: &ThreadState,
    proposed: &ThreadState,
    args: &ThreadPaymentArgs,
) -> Result<(), Violation> {
    if !previous.same_thread(proposed) {
        return Err(Violation::new(
            ViolationKind::ThreadState,
            "thread participants or contract changed",
        ));
    }
    if previous.tx_count.checked_add(U256::one()) != Some(proposed.tx_count) {
        return Err(Violation::new(
            ViolationKind::GlobalNonce,
            format!(
                "thread txCount must be {} + 1, got {}",
                previous.tx_count, proposed.tx_count
            ),
        ));
    }
    if previous.total_wei() != proposed.total_wei() || previous.total_token() != proposed.total_token() {
        return Err(Violation::new(
            ViolationKind::Conservation,
            "thread balances are not conserved",
        ));
    }
    let expected = next_thread_payment(previous, args)?;
    if expected.balance_wei_sender != proposed.balance_wei_sender
        || expected.balance_token_sender != proposed.balance_token_sender
    {
        return Err(Violation::new(
            ViolationKind::PaymentMismatch,
            "thread balances do not reflect the payment",
        ));
    }
    if let Some(sig) = &proposed.sig_a {
        if !signature::verify_thread_signature(proposed, sig, proposed.sender) {
            return Err(Violation::new(
                ViolationKind::ThreadSignature,
                "sigA does not recover to the thread sender",
            ));
        }
    }
    Ok(())
}

fn check_global_nonce(previous: &ChannelState, proposed: &ChannelState) -> Result<(), Violation> {
    if previous.tx_count_global.checked_add(U256::one()) != Some(proposed.tx_count_global) {
        return Err(Violation::new(
            ViolationKind::GlobalNonce,
            format!(
                "txCountGlobal must be {} + 1, got {}",
                previous.tx_count_global, proposed.tx_count_global
            ),
        ));
    }
    Ok(())
}

fn chain_nonce_step(previous: &ChannelState, proposed: &ChannelState) -> Result<U256, Violation> {
    match proposed.tx_count_chain.checked_sub(previous.tx_count_chain) {
        Some(step) if step <= U256::one() => Ok(step),
        _ => Err(Violation::new(
            ViolationKind::ChainNonce,
            format!(
                "txCountChain may only advance by 0 or 1, went from {} to {}",
                previous.tx_count_chain, proposed.tx_count_chain
            ),
        )),
    }
}

fn check_chain_step(previous: &ChannelState, proposed: &ChannelState, step: u64) -> Result<(), Violation> {
    if chain_nonce_step(previous, proposed)? != U256::from(step) {
        return Err(Violation::new(
            ViolationKind::ChainNonce,
            format!(
                "txCountChain must advance by {} for this update, went from {} to {}",
                step, previous.tx_count_chain, proposed.tx_count_chain
            ),
        ));
    }
    Ok(())
}

fn check_identity(previous: &ChannelState, proposed: &ChannelState) -> Result<(), Violation> {
    if previous.contract_address != proposed.contract_address {
        return Err(Violation::new(
            ViolationKind::Identity,
            "contractAddress cannot change",
        ));
    }
    if previous.user != proposed.user {
        return Err(Violation::new(ViolationKind::Identity, "user cannot change"));
    }
    Ok(())
}

fn check_recipient_unchanged(previous: &ChannelState, proposed: &ChannelState) -> Result<(), Violation> {
    if previous.recipient != proposed.recipient {
        return Err(Violation::new(
            ViolationKind::Identity,
            "recipient only changes with a withdrawal",
        ));
    }
    Ok(())
}

fn check_pending_unchanged(previous: &ChannelState, proposed: &ChannelState) -> Result<(), Violation> {
    if previous.pending_wei_updates() != proposed.pending_wei_updates()
        || previous.pending_token_updates() != proposed.pending_token_updates()
    {
        return Err(Violation::new(
            ViolationKind::PendingChanged,
            "pending balances cannot change in this update",
        ));
    }
    Ok(())
}

fn check_threads_unchanged(previous: &ChannelState, proposed: &ChannelState) -> Result<(), Violation> {
    if previous.thread_root != proposed.thread_root || previous.thread_count != proposed.thread_count {
        return Err(Violation::new(
            ViolationKind::ThreadChanged,
            "threadRoot and threadCount cannot change in this update",
        ));
    }
    Ok(())
}

fn check_operating_unchanged(previous: &ChannelState, proposed: &ChannelState) -> Result<(), Violation> {
    if let Err(field) = same_operating_balances(previous, proposed) {
        return Err(Violation::new(
            ViolationKind::OperatingBalanceChanged,
            format!("{} cannot change while proposing a pending operation", field),
        ));
    }
    Ok(())
}

fn check_conservation(previous: &ChannelState, proposed: &ChannelState) -> Result<(), Violation> {
    let before_wei = previous.balance_wei_hub.checked_add(previous.balance_wei_user);
    let after_wei = proposed.balance_wei_hub.checked_add(proposed.balance_wei_user);
    if before_wei.is_none() || before_wei != after_wei {
        return Err(Violation::new(
            ViolationKind::Conservation,
            "total wei in the channel changed",
        ));
    }
    let before_token = previous.balance_token_hub.checked_add(previous.balance_token_user);
    let after_token = proposed.balance_token_hub.checked_add(proposed.balance_token_user);
    if before_token.is_none() || before_token != after_token {
        return Err(Violation::new(
            ViolationKind::Conservation,
            "total tokens in the channel changed",
        ));
    }
    Ok(())
}

fn check_balances(expected: &ChannelState, proposed: &ChannelState, kind: ViolationKind) -> Result<(), Violation> {
    if let Err(field) = same_operating_balances(expected, proposed) {
        return Err(Violation::new(
            kind,
            format!(
                "{} should be {}",
                field,
                match field {
                    "balanceWeiHub" => expected.balance_wei_hub,
                    "balanceWeiUser" => expected.balance_wei_user,
                    "balanceTokenHub" => expected.balance_token_hub,
                    _ => expected.balance_token_user,
                }
            ),
        ));
    }
    Ok(())
}

fn check_timeout_cleared(proposed: &ChannelState) -> Result<(), Violation> {
    if !proposed.timeout.is_zero() {
        return Err(Violation::new(
            ViolationKind::UnexpectedTimeout,
            format!("timeout must be 0 outside a proposal, got {}", proposed.timeout),
        ));
    }
    Ok(())
}

fn check_pending(expected: &ChannelState, proposed: &ChannelState) -> Result<(), Violation> {
    if expected.pending_wei_updates() != proposed.pending_wei_updates()
        || expected.pending_token_updates() != proposed.pending_token_updates()
    {
        return Err(Violation::new(
            ViolationKind::PendingMismatch,
            "pending balances do not match the requested amounts",
        ));
    }
    if expected.timeout != proposed.timeout {
        return Err(Violation::new(
            ViolationKind::PendingMismatch,
            format!("timeout should be {}, got {}", expected.timeout, proposed.timeout),
        ));
    }
    Ok(())
}

fn check_thread_commitment(expected: &ChannelState, proposed: &ChannelState) -> Result<(), Violation> {
    if expected.thread_count != proposed.thread_count {
        return Err(Violation::new(
            ViolationKind::ThreadCount,
            format!(
                "threadCount should be {}, got {}",
                expected.thread_count, proposed.thread_count
            ),
        ));
    }
    if expected.thread_root != proposed.thread_root {
        return Err(Violation::new(
            ViolationKind::ThreadRoot,
            format!(
                "threadRoot should be {:?}, got {:?}",
                expected.thread_root, proposed.thread_root
            ),
        ));
    }
    Ok(())
}

/// Name of the first operating balance that differs.
fn same_operating_balances(a: &ChannelState, b: &ChannelState) -> Result<(), &'static str> {
    if a.balance_wei_hub != b.balance_wei_hub {
        return Err("balanceWeiHub");
    }
    if a.balance_wei_user != b.balance_wei_user {
        return Err("balanceWeiUser");
    }
    if a.balance_token_hub != b.balance_token_hub {
        return Err("balanceTokenHub");
    }
    if a.balance_token_user != b.balance_token_user {
        return Err("balanceTokenUser");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::generator;
    use crate::testing::{
        channel_with_balances, empty_channel, empty_thread, mk_address, mk_hash, receipt_for,
        signed_thread, test_wallet,
    };
    use crate::types::{
        CloseThreadArgs, ConfirmPendingArgs, DepositArgs, ExchangeArgs, OpenThreadArgs, Party,
        PaymentArgs, WithdrawalArgs,
    };
    use crate::utils::numeric::ExchangeRate;
    use ethers::signers::Signer;

    fn validator() -> Validator {
        Validator::with_clock(mk_address("0x111"), Arc::new(FixedClock(1_000)))
    }

    fn pay(wei: u64, recipient: Party) -> UpdateArgs {
        UpdateArgs::Payment(PaymentArgs {
            amount_wei: U256::from(wei),
            amount_token: U256::zero(),
            recipient,
        })
    }

    fn deposit(wei_user: u64, timeout: u64) -> DepositArgs {
        DepositArgs {
            deposit_wei_hub: U256::zero(),
            deposit_wei_user: U256::from(wei_user),
            deposit_token_hub: U256::zero(),
            deposit_token_user: U256::zero(),
            timeout: U256::from(timeout),
        }
    }

    fn kind_of(
        previous: &ChannelState,
        proposed: &ChannelState,
        args: &UpdateArgs,
    ) -> Option<ViolationKind> {
        validator().validate(previous, proposed, args).map(|v| v.kind)
    }

    #[test]
    fn test_valid_payment() {
        let previous = channel_with_balances(5, 5, 0, 0);
        let mut proposed = previous.clone();
        proposed.balance_wei_hub = U256::from(8);
        proposed.balance_wei_user = U256::from(2);
        proposed.tx_count_global = previous.tx_count_global + 1;

        assert_eq!(kind_of(&previous, &proposed, &pay(3, Party::Hub)), None);
    }

    #[test]
    fn test_payment_violations() {
        let previous = channel_with_balances(5, 5, 0, 0);
        let args = pay(3, Party::Hub);
        let valid = generator::generate(&previous, &args).unwrap();

        let mut wrong_split = valid.clone();
        wrong_split.balance_wei_hub = U256::from(9);
        wrong_split.balance_wei_user = U256::from(1);
        assert_eq!(
            kind_of(&previous, &wrong_split, &args),
            Some(ViolationKind::PaymentMismatch)
        );

        let mut minted = valid.clone();
        minted.balance_wei_hub = U256::from(9);
        assert_eq!(kind_of(&previous, &minted, &args), Some(ViolationKind::Conservation));

        let mut pending = valid.clone();
        pending.pending_deposit_wei_hub = U256::from(1);
        assert_eq!(kind_of(&previous, &pending, &args), Some(ViolationKind::PendingChanged));

        let mut threads = valid.clone();
        threads.thread_count = U256::one();
        assert_eq!(kind_of(&previous, &threads, &args), Some(ViolationKind::ThreadChanged));

        let mut chain = valid.clone();
        chain.tx_count_chain = previous.tx_count_chain + 1;
        assert_eq!(kind_of(&previous, &chain, &args), Some(ViolationKind::ChainNonce));

        let mut moved = valid;
        moved.user = mk_address("0xBBB");
        assert_eq!(kind_of(&previous, &moved, &args), Some(ViolationKind::Identity));
    }

    #[test]
    fn test_nonce_violations() {
        let previous = channel_with_balances(5, 5, 0, 0);
        let args = pay(1, Party::User);
        let valid = generator::generate(&previous, &args).unwrap();

        let mut replay = valid.clone();
        replay.tx_count_global = previous.tx_count_global;
        assert_eq!(kind_of(&previous, &replay, &args), Some(ViolationKind::GlobalNonce));

        let mut skipped = valid.clone();
        skipped.tx_count_global = previous.tx_count_global + 2;
        assert_eq!(kind_of(&previous, &skipped, &args), Some(ViolationKind::GlobalNonce));

        let mut jumped = valid.clone();
        jumped.tx_count_chain = previous.tx_count_chain + 2;
        assert_eq!(kind_of(&previous, &jumped, &args), Some(ViolationKind::ChainNonce));

        let mut rewound = valid;
        rewound.tx_count_chain = previous.tx_count_chain - 1;
        assert_eq!(kind_of(&previous, &rewound, &args), Some(ViolationKind::ChainNonce));
    }

    #[test]
    fn test_signatures_are_checked() {
        let user = test_wallet(20);
        let hub = test_wallet(21);
        let validator = Validator::with_clock(hub.address(), Arc::new(FixedClock(0)));

        let mut previous = channel_with_balances(5, 5, 0, 0);
        previous.user = user.address();
        let args = pay(2, Party::Hub);
        let proposed = generator::generate(&previous, &args).unwrap();

        let user_sig = signature::sign_channel_state(&proposed, &user).unwrap();
        let hub_sig = signature::sign_channel_state(&proposed, &hub).unwrap();
        let signed = proposed.with_sig_user(user_sig).with_sig_hub(hub_sig);
        assert_eq!(validator.validate(&previous, &signed, &args), None);
        assert!(signed.is_fully_signed(hub.address()));

        // hub signature in the user's slot
        let swapped = proposed.with_sig_user(hub_sig);
        let violation = validator.validate(&previous, &swapped, &args).unwrap();
        assert_eq!(violation.kind, ViolationKind::Signature);
        assert_eq!(violation.proposed.as_deref(), Some(&swapped));

        let mut garbage = proposed;
        garbage.sig_hub = Some(vec![1u8; 65].into());
        assert_eq!(
            validator.validate(&previous, &garbage, &args).map(|v| v.kind),
            Some(ViolationKind::Signature)
        );
    }

    #[test]
    fn test_exchange_mismatch() {
        let previous = channel_with_balances(10, 10, 100, 0);
        let args = UpdateArgs::Exchange(ExchangeArgs {
            wei_to_sell: U256::from(2),
            tokens_to_sell: U256::zero(),
            exchange_rate: ExchangeRate::from_integer(5).unwrap(),
            seller: Party::User,
        });
        let valid = generator::generate(&previous, &args).unwrap();
        assert_eq!(kind_of(&previous, &valid, &args), None);

        let mut short = valid;
        short.balance_token_user = U256::from(9);
        short.balance_token_hub = U256::from(91);
        assert_eq!(kind_of(&previous, &short, &args), Some(ViolationKind::ExchangeMismatch));
    }

    #[test]
    fn test_deposit_rules() {
        let previous = empty_channel();
        let args = UpdateArgs::ProposePendingDeposit(deposit(10, 0));
        let valid = generator::generate(&previous, &args).unwrap();
        assert_eq!(kind_of(&previous, &valid, &args), None);

        let mut no_chain_bump = valid.clone();
        no_chain_bump.tx_count_chain = previous.tx_count_chain;
        assert_eq!(kind_of(&previous, &no_chain_bump, &args), Some(ViolationKind::ChainNonce));

        let mut credited = valid.clone();
        credited.balance_wei_user = U256::from(10);
        assert_eq!(
            kind_of(&previous, &credited, &args),
            Some(ViolationKind::OperatingBalanceChanged)
        );

        let mut wrong_amount = valid;
        wrong_amount.pending_deposit_wei_user = U256::from(11);
        assert_eq!(
            kind_of(&previous, &wrong_amount, &args),
            Some(ViolationKind::PendingMismatch)
        );
    }

    #[test]
    fn test_deposit_timeout() {
        let previous = empty_channel();

        let expired = UpdateArgs::ProposePendingDeposit(deposit(10, 1_000));
        let proposed = generator::generate(&previous, &expired).unwrap();
        assert_eq!(
            kind_of(&previous, &proposed, &expired),
            Some(ViolationKind::TimeoutElapsed)
        );

        let live = UpdateArgs::ProposePendingDeposit(deposit(10, 1_001));
        let proposed = generator::generate(&previous, &live).unwrap();
        assert_eq!(kind_of(&previous, &proposed, &live), None);
    }

    #[test]
    fn test_timeout_only_on_proposals() {
        let sender = test_wallet(23);
        let mut previous = channel_with_balances(10, 10, 100, 0);
        previous.user = sender.address();

        let exchange = UpdateArgs::Exchange(ExchangeArgs {
            wei_to_sell: U256::from(2),
            tokens_to_sell: U256::zero(),
            exchange_rate: ExchangeRate::from_integer(5).unwrap(),
            seller: Party::User,
        });
        let thread = signed_thread(&previous, &sender, mk_address("0x333"), 3, 0);
        let open = UpdateArgs::OpenThread(OpenThreadArgs {
            thread_state: thread.clone(),
            initial_thread_states: vec![],
        });
        let opened = generator::generate(&previous, &open).unwrap();
        let close = UpdateArgs::CloseThread(CloseThreadArgs {
            thread_state: thread.clone(),
            initial_thread_states: vec![thread],
        });

        let cases = [
            (previous.clone(), pay(3, Party::Hub)),
            (previous.clone(), exchange),
            (previous, open),
            (opened, close),
        ];
        for (before, args) in &cases {
            let valid = generator::generate(before, args).unwrap();
            assert!(valid.timeout.is_zero());
            assert_eq!(kind_of(before, &valid, args), None, "{}", args.reason());

            for timeout in [1_001u64, 5] {
                let mut timed = valid.clone();
                timed.timeout = U256::from(timeout);
                assert_eq!(
                    kind_of(before, &timed, args),
                    Some(ViolationKind::UnexpectedTimeout),
                    "{} with timeout {}",
                    args.reason(),
                    timeout
                );
            }
        }
    }

    #[test]
    fn test_payment_clears_proposal_timeout() {
        let previous = channel_with_balances(5, 5, 0, 0);
        let pending = generator::generate(
            &previous,
            &UpdateArgs::ProposePendingDeposit(deposit(10, 2_000)),
        )
        .unwrap();
        assert_eq!(pending.timeout, U256::from(2_000));

        let args = pay(1, Party::Hub);
        let paid = generator::generate(&pending, &args).unwrap();
        assert!(paid.timeout.is_zero());
        assert_eq!(paid.pending_deposit_wei_user, U256::from(10));
        assert_eq!(kind_of(&pending, &paid, &args), None);
    }

    #[test]
    fn test_any_pending_field_blocks_new_proposals() {
        let setters: [fn(&mut ChannelState); 8] = [
            |s| s.pending_deposit_wei_hub = U256::one(),
            |s| s.pending_deposit_wei_user = U256::one(),
            |s| s.pending_deposit_token_hub = U256::one(),
            |s| s.pending_deposit_token_user = U256::one(),
            |s| s.pending_withdrawal_wei_hub = U256::one(),
            |s| s.pending_withdrawal_wei_user = U256::one(),
            |s| s.pending_withdrawal_token_hub = U256::one(),
            |s| s.pending_withdrawal_token_user = U256::one(),
        ];
        let proposals = [
            UpdateArgs::ProposePendingDeposit(deposit(10, 0)),
            UpdateArgs::ProposePendingWithdrawal(WithdrawalArgs {
                withdrawal_wei_hub: U256::zero(),
                withdrawal_wei_user: U256::from(1),
                withdrawal_token_hub: U256::zero(),
                withdrawal_token_user: U256::zero(),
                recipient: None,
                timeout: U256::zero(),
            }),
        ];

        for (i, set) in setters.iter().enumerate() {
            let mut previous = channel_with_balances(5, 5, 5, 5);
            set(&mut previous);
            let mut proposed = previous.clone();
            proposed.tx_count_global = previous.tx_count_global + 1;
            proposed.tx_count_chain = previous.tx_count_chain + 1;

            for args in &proposals {
                assert!(generator::generate(&previous, args).is_err());
                assert_eq!(
                    kind_of(&previous, &proposed, args),
                    Some(ViolationKind::PendingExists),
                    "{} with pending field {}",
                    args.reason(),
                    i
                );
            }
        }
    }

    #[test]
    fn test_withdrawal_recipient() {
        let previous = channel_with_balances(5, 5, 0, 0);
        let args = UpdateArgs::ProposePendingWithdrawal(WithdrawalArgs {
            withdrawal_wei_hub: U256::zero(),
            withdrawal_wei_user: U256::from(5),
            withdrawal_token_hub: U256::zero(),
            withdrawal_token_user: U256::zero(),
            recipient: None,
            timeout: U256::zero(),
        });
        let valid = generator::generate(&previous, &args).unwrap();
        assert_eq!(kind_of(&previous, &valid, &args), None);

        let mut redirected = valid;
        redirected.recipient = mk_address("0xEEE");
        assert_eq!(kind_of(&previous, &redirected, &args), Some(ViolationKind::Identity));
    }

    #[test]
    fn test_confirm_rules() {
        let previous = empty_channel();
        let pending = generator::generate(&previous, &UpdateArgs::ProposePendingDeposit(deposit(10, 0)))
            .unwrap();
        let args = UpdateArgs::ConfirmPending(ConfirmPendingArgs {
            receipt: receipt_for(&pending, Party::User),
        });
        let valid = generator::generate(&pending, &args).unwrap();
        assert_eq!(kind_of(&pending, &valid, &args), None);

        let mut kept_pending = valid.clone();
        kept_pending.pending_deposit_wei_user = U256::from(10);
        assert_eq!(
            kind_of(&pending, &kept_pending, &args),
            Some(ViolationKind::ConfirmMismatch)
        );

        let mut short = valid;
        short.balance_wei_user = U256::from(9);
        assert_eq!(kind_of(&pending, &short, &args), Some(ViolationKind::ConfirmMismatch));

        let stale = UpdateArgs::ConfirmPending(ConfirmPendingArgs {
            receipt: receipt_for(&previous, Party::User),
        });
        assert_eq!(
            validator().validate(&pending, &kept_pending, &stale).map(|v| v.kind),
            Some(ViolationKind::ReceiptMismatch)
        );
    }

    #[test]
    fn test_open_thread_root_must_match() {
        let sender = test_wallet(22);
        let mut previous = channel_with_balances(0, 10, 0, 0);
        previous.user = sender.address();
        let thread = signed_thread(&previous, &sender, mk_address("0x333"), 3, 0);
        let args = UpdateArgs::OpenThread(OpenThreadArgs {
            thread_state: thread,
            initial_thread_states: vec![],
        });
        let valid = generator::generate(&previous, &args).unwrap();
        assert_eq!(kind_of(&previous, &valid, &args), None);

        let mut wrong_root = valid.clone();
        wrong_root.thread_root = mk_hash("0x1");
        assert_eq!(kind_of(&previous, &wrong_root, &args), Some(ViolationKind::ThreadRoot));

        let mut no_debit = valid;
        no_debit.balance_wei_user = U256::from(10);
        assert_eq!(kind_of(&previous, &no_debit, &args), Some(ViolationKind::Conservation));
    }

    #[test]
    fn test_thread_payment_validation() {
        let mut thread = empty_thread();
        thread.balance_wei_sender = U256::from(3);
        let args = ThreadPaymentArgs {
            amount_wei: U256::from(2),
            amount_token: U256::zero(),
        };
        assert!(validate_thread_payment(&thread, &args).is_none());

        let next = generator::thread_payment(&thread, &args).unwrap();
        assert!(validate_thread_update(&thread, &next, &args).is_none());

        let mut inflated = next.clone();
        inflated.balance_wei_receiver = U256::from(3);
        assert_eq!(
            validate_thread_update(&thread, &inflated, &args).map(|v| v.kind),
            Some(ViolationKind::Conservation)
        );

        let mut replay = next;
        replay.tx_count = thread.tx_count;
        assert_eq!(
            validate_thread_update(&thread, &replay, &args).map(|v| v.kind),
            Some(ViolationKind::GlobalNonce)
        );

        let too_much = ThreadPaymentArgs {
            amount_wei: U256::from(4),
            amount_token: U256::zero(),
        };
        assert_eq!(
            validate_thread_payment(&thread, &too_much).map(|v| v.kind),
            Some(ViolationKind::InsufficientBalance)
        );
    }
}

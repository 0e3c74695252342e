//! Next-state construction for every update reason.
//!
//! Each generator returns a fresh, unsigned state with `txCountGlobal`
//! advanced by one. The argument checks here are the same ones the
//! [`Validator`](crate::state::Validator) runs, so a generated state always
//! validates against its own arguments.

use crate::types::{
    Balances, ChannelState, ChannelUpdateEvent, ConfirmPendingArgs, DepositArgs, EngineError,
    ExchangeArgs, OpenThreadArgs, CloseThreadArgs, Party, PaymentArgs, ThreadPaymentArgs,
    ThreadState, UpdateArgs, Violation, ViolationKind, WithdrawalArgs,
};
use crate::utils::{merkle, signature};
use ethers::types::U256;
use tracing::trace;

pub fn payment(previous: &ChannelState, args: &PaymentArgs) -> Result<ChannelState, EngineError> {
    Ok(next_payment(previous, args)?)
}

pub fn exchange(previous: &ChannelState, args: &ExchangeArgs) -> Result<ChannelState, EngineError> {
    Ok(next_exchange(previous, args)?)
}

pub fn propose_pending_deposit(
    previous: &ChannelState,
    args: &DepositArgs,
) -> Result<ChannelState, EngineError> {
    Ok(next_pending_deposit(previous, args)?)
}

pub fn propose_pending_withdrawal(
    previous: &ChannelState,
    args: &WithdrawalArgs,
) -> Result<ChannelState, EngineError> {
    Ok(next_pending_withdrawal(previous, args)?)
}

pub fn confirm_pending(
    previous: &ChannelState,
    args: &ConfirmPendingArgs,
) -> Result<ChannelState, EngineError> {
    Ok(next_confirm_pending(previous, args)?)
}

pub fn open_thread(previous: &ChannelState, args: &OpenThreadArgs) -> Result<ChannelState, EngineError> {
    Ok(next_open_thread(previous, args)?)
}

pub fn close_thread(
    previous: &ChannelState,
    args: &CloseThreadArgs,
) -> Result<ChannelState, EngineError> {
    Ok(next_close_thread(previous, args)?)
}

/// Build the next channel state for any update.
pub fn generate(previous: &ChannelState, args: &UpdateArgs) -> Result<ChannelState, EngineError> {
    let next = next_state(previous, args)?;
    trace!(
        reason = %args.reason(),
        tx_count_global = %next.tx_count_global,
        "generated channel update"
    );
    Ok(next)
}

/// Next thread state after the sender pays the receiver.
pub fn thread_payment(
    previous: &ThreadState,
    args: &ThreadPaymentArgs,
) -> Result<ThreadState, EngineError> {
    Ok(next_thread_payment(previous, args)?)
}

pub(crate) fn next_state(previous: &ChannelState, args: &UpdateArgs) -> Result<ChannelState, Violation> {
    match args {
        UpdateArgs::Payment(a) => next_payment(previous, a),
        UpdateArgs::Exchange(a) => next_exchange(previous, a),
        UpdateArgs::ProposePendingDeposit(a) => next_pending_deposit(previous, a),
        UpdateArgs::ProposePendingWithdrawal(a) => next_pending_withdrawal(previous, a),
        UpdateArgs::ConfirmPending(a) => next_confirm_pending(previous, a),
        UpdateArgs::OpenThread(a) => next_open_thread(previous, a),
        UpdateArgs::CloseThread(a) => next_close_thread(previous, a),
    }
}

pub(crate) fn next_payment(previous: &ChannelState, args: &PaymentArgs) -> Result<ChannelState, Violation> {
    let mut next = advance(previous)?;
    transfer(&mut next, args.recipient.other(), args.amount_wei, args.amount_token)?;
    Ok(next)
}

pub(crate) fn next_exchange(previous: &ChannelState, args: &ExchangeArgs) -> Result<ChannelState, Violation> {
    let seller = args.seller;
    let buyer = seller.other();
    let rate = &args.exchange_rate;
    let mut next = advance(previous)?;

    match (args.wei_to_sell.is_zero(), args.tokens_to_sell.is_zero()) {
        (false, true) => {
            let tokens = rate
                .wei_to_tokens(args.wei_to_sell)
                .ok_or_else(|| invalid_args("exchange amount overflows"))?;
            if tokens.is_zero() {
                return Err(invalid_args(format!(
                    "selling {} wei at {} buys no tokens",
                    args.wei_to_sell, rate
                )));
            }
            transfer(&mut next, seller, args.wei_to_sell, U256::zero())?;
            transfer(&mut next, buyer, U256::zero(), tokens)?;
        }
        (true, false) => {
            let wei = rate
                .tokens_to_wei(args.tokens_to_sell)
                .ok_or_else(|| invalid_args("exchange amount overflows"))?;
            if wei.is_zero() {
                return Err(invalid_args(format!(
                    "selling {} tokens at {} buys no wei",
                    args.tokens_to_sell, rate
                )));
            }
            transfer(&mut next, seller, U256::zero(), args.tokens_to_sell)?;
            transfer(&mut next, buyer, wei, U256::zero())?;
        }
        _ => {
            return Err(invalid_args(
                "exactly one of weiToSell and tokensToSell must be nonzero",
            ))
        }
    }
    Ok(next)
}

pub(crate) fn next_pending_deposit(
    previous: &ChannelState,
    args: &DepositArgs,
) -> Result<ChannelState, Violation> {
    require_no_pending(previous)?;
    let amounts = [
        args.deposit_wei_hub,
        args.deposit_wei_user,
        args.deposit_token_hub,
        args.deposit_token_user,
    ];
    if amounts.iter().all(U256::is_zero) {
        return Err(invalid_args("deposit amounts are all zero"));
    }

    let mut next = advance_chain(previous)?;
    next.pending_deposit_wei_hub = args.deposit_wei_hub;
    next.pending_deposit_wei_user = args.deposit_wei_user;
    next.pending_deposit_token_hub = args.deposit_token_hub;
    next.pending_deposit_token_user = args.deposit_token_user;
    next.timeout = args.timeout;
    Ok(next)
}

pub(crate) fn next_pending_withdrawal(
    previous: &ChannelState,
    args: &WithdrawalArgs,
) -> Result<ChannelState, Violation> {
    require_no_pending(previous)?;
    let amounts = [
        args.withdrawal_wei_hub,
        args.withdrawal_wei_user,
        args.withdrawal_token_hub,
        args.withdrawal_token_user,
    ];
    if amounts.iter().all(U256::is_zero) {
        return Err(invalid_args("withdrawal amounts are all zero"));
    }

    let requested = [
        (Party::Hub, args.withdrawal_wei_hub, args.withdrawal_token_hub),
        (Party::User, args.withdrawal_wei_user, args.withdrawal_token_user),
    ];
    for (party, wei, token) in requested {
        require_funds(party, "wei", previous.balance_wei(party), wei)?;
        require_funds(party, "token", previous.balance_token(party), token)?;
    }

    let mut next = advance_chain(previous)?;
    next.pending_withdrawal_wei_hub = args.withdrawal_wei_hub;
    next.pending_withdrawal_wei_user = args.withdrawal_wei_user;
    next.pending_withdrawal_token_hub = args.withdrawal_token_hub;
    next.pending_withdrawal_token_user = args.withdrawal_token_user;
    next.recipient = args.recipient.unwrap_or(previous.recipient);
    next.timeout = args.timeout;
    Ok(next)
}

pub(crate) fn next_confirm_pending(
    previous: &ChannelState,
    args: &ConfirmPendingArgs,
) -> Result<ChannelState, Violation> {
    if !previous.has_pending_ops() {
        return Err(invalid_args("there is no pending operation to confirm"));
    }
    reconcile_receipt(previous, &args.receipt.log_event)?;

    let mut next = advance(previous)?;
    for party in [Party::Hub, Party::User] {
        let Balances {
            balance_wei,
            balance_token,
        } = previous.balances(party);
        let deposit = previous.pending_deposit(party);
        let withdrawal = previous.pending_withdrawal(party);

        let wei = credit(balance_wei, deposit.balance_wei)?;
        let token = credit(balance_token, deposit.balance_token)?;
        require_funds(party, "wei", wei, withdrawal.balance_wei)?;
        require_funds(party, "token", token, withdrawal.balance_token)?;
        next.set_balances(
            party,
            wei - withdrawal.balance_wei,
            token - withdrawal.balance_token,
        );
    }
    clear_pending(&mut next);
    next.timeout = U256::zero();
    Ok(next)
}

pub(crate) fn next_open_thread(
    previous: &ChannelState,
    args: &OpenThreadArgs,
) -> Result<ChannelState, Violation> {
    check_thread_set(previous, &args.initial_thread_states)?;
    let thread = &args.thread_state;

    if thread.contract_address != previous.contract_address {
        return Err(thread_violation("thread belongs to a different contract"));
    }
    let bonder = bonding_party(previous, thread)?;
    if args
        .initial_thread_states
        .iter()
        .any(|open| open.same_thread(thread))
    {
        return Err(thread_violation("thread is already open in this channel"));
    }
    if !thread.tx_count.is_zero() {
        return Err(thread_violation("initial thread state must have txCount 0"));
    }
    if !thread.balance_wei_receiver.is_zero() || !thread.balance_token_receiver.is_zero() {
        return Err(thread_violation("initial thread state must not credit the receiver"));
    }
    require_thread_signature(thread)?;

    let mut next = advance(previous)?;
    let available = previous.available(bonder);
    require_funds(bonder, "wei", available.balance_wei, thread.balance_wei_sender)?;
    require_funds(bonder, "token", available.balance_token, thread.balance_token_sender)?;
    next.set_balances(
        bonder,
        previous.balance_wei(bonder) - thread.balance_wei_sender,
        previous.balance_token(bonder) - thread.balance_token_sender,
    );

    let mut open = args.initial_thread_states.clone();
    open.push(thread.unsigned());
    next.thread_count = credit(previous.thread_count, U256::one())?;
    next.thread_root = merkle::build_root(&open);
    Ok(next)
}

pub(crate) fn next_close_thread(
    previous: &ChannelState,
    args: &CloseThreadArgs,
) -> Result<ChannelState, Violation> {
    check_thread_set(previous, &args.initial_thread_states)?;
    let thread = &args.thread_state;

    let position = args
        .initial_thread_states
        .iter()
        .position(|open| open.same_thread(thread))
        .ok_or_else(|| thread_violation("thread is not open in this channel"))?;
    let initial = &args.initial_thread_states[position];

    require_thread_signature(thread)?;
    if thread.tx_count < initial.tx_count {
        return Err(thread_violation(format!(
            "final txCount {} is below the initial {}",
            thread.tx_count, initial.tx_count
        )));
    }
    if thread.total_wei() != initial.total_wei() || thread.total_token() != initial.total_token() {
        return Err(thread_violation(
            "final thread balances do not add up to the bonded amounts",
        ));
    }

    let (user_share, hub_share) = close_thread_shares(previous, thread)?;
    let mut next = advance(previous)?;
    for (party, share) in [(Party::User, user_share), (Party::Hub, hub_share)] {
        let wei = credit(previous.balance_wei(party), share.balance_wei)?;
        let token = credit(previous.balance_token(party), share.balance_token)?;
        next.set_balances(party, wei, token);
    }

    let mut remaining = args.initial_thread_states.clone();
    remaining.remove(position);
    next.thread_count = previous.thread_count - U256::one();
    next.thread_root = merkle::build_root(&remaining);
    Ok(next)
}

/// How the final balances of a closing thread flow back into the channel:
/// `(user share, hub share)`. The channel user takes its own side of the
/// thread and the hub takes the other.
pub fn close_thread_shares(
    channel: &ChannelState,
    thread: &ThreadState,
) -> Result<(Balances, Balances), Violation> {
    let sender = Balances {
        balance_wei: thread.balance_wei_sender,
        balance_token: thread.balance_token_sender,
    };
    let receiver = Balances {
        balance_wei: thread.balance_wei_receiver,
        balance_token: thread.balance_token_receiver,
    };
    match bonding_party(channel, thread)? {
        Party::User => Ok((sender, receiver)),
        Party::Hub => Ok((receiver, sender)),
    }
}

pub(crate) fn next_thread_payment(
    previous: &ThreadState,
    args: &ThreadPaymentArgs,
) -> Result<ThreadState, Violation> {
    check_thread_payment(previous, args)?;
    let mut next = previous.unsigned();
    next.balance_wei_sender = previous.balance_wei_sender - args.amount_wei;
    next.balance_token_sender = previous.balance_token_sender - args.amount_token;
    next.balance_wei_receiver = credit(previous.balance_wei_receiver, args.amount_wei)?;
    next.balance_token_receiver = credit(previous.balance_token_receiver, args.amount_token)?;
    next.tx_count = credit(previous.tx_count, U256::one())?;
    Ok(next)
}

pub(crate) fn check_thread_payment(
    previous: &ThreadState,
    args: &ThreadPaymentArgs,
) -> Result<(), Violation> {
    if args.amount_wei > previous.balance_wei_sender {
        return Err(Violation::new(
            ViolationKind::InsufficientBalance,
            format!(
                "thread sender has {} wei, cannot pay {}",
                previous.balance_wei_sender, args.amount_wei
            ),
        ));
    }
    if args.amount_token > previous.balance_token_sender {
        return Err(Violation::new(
            ViolationKind::InsufficientBalance,
            format!(
                "thread sender has {} tokens, cannot pay {}",
                previous.balance_token_sender, args.amount_token
            ),
        ));
    }
    Ok(())
}

/// Compare a receipt against the state the contract recorded.
pub(crate) fn reconcile_receipt(
    recorded: &ChannelState,
    event: &ChannelUpdateEvent,
) -> Result<(), Violation> {
    if event.sender_idx > U256::one() {
        return Err(Violation::new(
            ViolationKind::ReceiptMismatch,
            format!("senderIdx must be 0 or 1, got {}", event.sender_idx),
        ));
    }
    let expected = ChannelUpdateEvent::from_state(recorded, Party::Hub);
    let fields = [
        ("user", event.user == expected.user),
        ("weiBalances", event.wei_balances == expected.wei_balances),
        ("tokenBalances", event.token_balances == expected.token_balances),
        (
            "pendingWeiUpdates",
            event.pending_wei_updates == expected.pending_wei_updates,
        ),
        (
            "pendingTokenUpdates",
            event.pending_token_updates == expected.pending_token_updates,
        ),
        ("txCount", event.tx_count == expected.tx_count),
        ("threadRoot", event.thread_root == expected.thread_root),
        ("threadCount", event.thread_count == expected.thread_count),
    ];
    match fields.into_iter().find(|(_, matches)| !matches) {
        Some((field, _)) => Err(Violation::new(
            ViolationKind::ReceiptMismatch,
            format!("receipt {} does not match the pending state", field),
        )),
        None => Ok(()),
    }
}

/// The supplied open threads reproduce the channel's commitment.
pub(crate) fn check_thread_set(previous: &ChannelState, threads: &[ThreadState]) -> Result<(), Violation> {
    if U256::from(threads.len()) != previous.thread_count {
        return Err(Violation::new(
            ViolationKind::ThreadCount,
            format!(
                "{} initial thread states supplied, channel has threadCount {}",
                threads.len(),
                previous.thread_count
            ),
        ));
    }
    let root = merkle::build_root(threads);
    if root != previous.thread_root {
        return Err(Violation::new(
            ViolationKind::ThreadRoot,
            format!(
                "initial thread states hash to {:?}, channel has {:?}",
                root, previous.thread_root
            ),
        ));
    }
    Ok(())
}

pub(crate) fn require_no_pending(previous: &ChannelState) -> Result<(), Violation> {
    match previous.first_pending_op() {
        Some(field) => Err(Violation::new(
            ViolationKind::PendingExists,
            format!("{} is nonzero, the pending operation must be confirmed first", field),
        )),
        None => Ok(()),
    }
}

/// Which side of the channel bonds the thread: the user when it sends,
/// the hub when the user receives.
fn bonding_party(channel: &ChannelState, thread: &ThreadState) -> Result<Party, Violation> {
    if thread.sender == thread.receiver {
        return Err(thread_violation("thread sender and receiver are the same"));
    }
    if thread.sender == channel.user {
        Ok(Party::User)
    } else if thread.receiver == channel.user {
        Ok(Party::Hub)
    } else {
        Err(thread_violation("channel user is neither thread sender nor receiver"))
    }
}

fn require_thread_signature(thread: &ThreadState) -> Result<(), Violation> {
    let sig = thread.sig_a.as_ref().ok_or_else(|| {
        Violation::new(ViolationKind::ThreadSignature, "thread state has no sigA")
    })?;
    if !signature::verify_thread_signature(thread, sig, thread.sender) {
        return Err(Violation::new(
            ViolationKind::ThreadSignature,
            "sigA does not recover to the thread sender",
        ));
    }
    Ok(())
}

/// Move `wei` and `token` from `from` to the other party.
fn transfer(state: &mut ChannelState, from: Party, wei: U256, token: U256) -> Result<(), Violation> {
    let to = from.other();
    let available = state.available(from);
    require_funds(from, "wei", available.balance_wei, wei)?;
    require_funds(from, "token", available.balance_token, token)?;

    let to_wei = credit(state.balance_wei(to), wei)?;
    let to_token = credit(state.balance_token(to), token)?;
    let from_wei = state.balance_wei(from) - wei;
    let from_token = state.balance_token(from) - token;
    state.set_balances(from, from_wei, from_token);
    state.set_balances(to, to_wei, to_token);
    Ok(())
}

fn require_funds(party: Party, currency: &str, available: U256, amount: U256) -> Result<(), Violation> {
    if amount > available {
        return Err(Violation::new(
            ViolationKind::InsufficientBalance,
            format!(
                "{:?} has {} {} available, needs {}",
                party, available, currency, amount
            ),
        ));
    }
    Ok(())
}

fn credit(balance: U256, amount: U256) -> Result<U256, Violation> {
    balance
        .checked_add(amount)
        .ok_or_else(|| invalid_args("balance overflows 256 bits"))
}

fn advance(previous: &ChannelState) -> Result<ChannelState, Violation> {
    let mut next = previous.unsigned();
    next.tx_count_global = previous
        .tx_count_global
        .checked_add(U256::one())
        .ok_or_else(|| Violation::new(ViolationKind::GlobalNonce, "txCountGlobal overflows"))?;
    next.timeout = U256::zero();
    Ok(next)
}

fn advance_chain(previous: &ChannelState) -> Result<ChannelState, Violation> {
    let mut next = advance(previous)?;
    next.tx_count_chain = previous
        .tx_count_chain
        .checked_add(U256::one())
        .ok_or_else(|| Violation::new(ViolationKind::ChainNonce, "txCountChain overflows"))?;
    Ok(next)
}

fn clear_pending(state: &mut ChannelState) {
    state.pending_deposit_wei_hub = U256::zero();
    state.pending_deposit_wei_user = U256::zero();
    state.pending_deposit_token_hub = U256::zero();
    state.pending_deposit_token_user = U256::zero();
    state.pending_withdrawal_wei_hub = U256::zero();
    state.pending_withdrawal_wei_user = U256::zero();
    state.pending_withdrawal_token_hub = U256::zero();
    state.pending_withdrawal_token_user = U256::zero();
}

fn invalid_args(message: impl Into<String>) -> Violation {
    Violation::new(ViolationKind::InvalidArgs, message)
}

fn thread_violation(message: impl Into<String>) -> Violation {
    Violation::new(ViolationKind::ThreadState, message)
}

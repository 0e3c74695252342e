//! Fixtures shared by unit and integration tests.
//!
//! Helpers panic on malformed literals; they are meant for test code only.

use crate::types::{ChannelState, ChannelUpdateEvent, ChannelUpdateReceipt, Party, ThreadState};
use crate::utils::signature;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};

/// Address built by right-padding a hex prefix with zeros, e.g. `0xAAA000…`.
pub fn mk_address(prefix: &str) -> Address {
    let padded = format!("{:0<42}", prefix);
    padded
        .parse()
        .unwrap_or_else(|e| panic!("invalid address prefix {}: {}", prefix, e))
}

/// 32-byte hash built by right-padding a hex prefix with zeros.
pub fn mk_hash(prefix: &str) -> H256 {
    let padded = format!("{:0<66}", prefix);
    padded
        .parse()
        .unwrap_or_else(|e| panic!("invalid hash prefix {}: {}", prefix, e))
}

/// Open channel with nothing in it yet.
pub fn empty_channel() -> ChannelState {
    let mut state = ChannelState::genesis(mk_address("0xCCC"), mk_address("0xAAA"));
    state.recipient = mk_address("0x222");
    state.tx_count_global = U256::one();
    state.tx_count_chain = U256::one();
    state
}

/// Channel with every numeric field set to a distinct value.
pub fn full_channel() -> ChannelState {
    ChannelState {
        balance_wei_hub: U256::from(1),
        balance_wei_user: U256::from(2),
        balance_token_hub: U256::from(3),
        balance_token_user: U256::from(4),
        pending_deposit_wei_hub: U256::from(4),
        pending_deposit_wei_user: U256::from(5),
        pending_deposit_token_hub: U256::from(6),
        pending_deposit_token_user: U256::from(7),
        pending_withdrawal_wei_hub: U256::from(8),
        pending_withdrawal_wei_user: U256::from(9),
        pending_withdrawal_token_hub: U256::from(10),
        pending_withdrawal_token_user: U256::from(11),
        tx_count_global: U256::from(13),
        tx_count_chain: U256::from(12),
        thread_root: mk_hash("0x141414"),
        thread_count: U256::from(14),
        timeout: U256::from(15),
        ..empty_channel()
    }
}

pub fn channel_with_balances(wei_hub: u64, wei_user: u64, token_hub: u64, token_user: u64) -> ChannelState {
    ChannelState {
        balance_wei_hub: U256::from(wei_hub),
        balance_wei_user: U256::from(wei_user),
        balance_token_hub: U256::from(token_hub),
        balance_token_user: U256::from(token_user),
        ..empty_channel()
    }
}

pub fn empty_thread() -> ThreadState {
    ThreadState::initial(
        mk_address("0xCCC"),
        mk_address("0xAAA"),
        mk_address("0x222"),
        mk_address("0x333"),
        U256::zero(),
        U256::zero(),
    )
}

/// Initial thread state from `sender` inside `channel`, signed by `sender`.
pub fn signed_thread(
    channel: &ChannelState,
    sender: &LocalWallet,
    receiver: Address,
    wei: u64,
    token: u64,
) -> ThreadState {
    let thread = ThreadState::initial(
        channel.contract_address,
        channel.user,
        sender.address(),
        receiver,
        U256::from(wei),
        U256::from(token),
    );
    let sig = signature::sign_thread_state(&thread, sender)
        .unwrap_or_else(|e| panic!("signing thread state: {}", e));
    thread.with_sig_a(sig)
}

/// Receipt the contract would emit for `state` submitted by `sender`.
pub fn receipt_for(state: &ChannelState, sender: Party) -> ChannelUpdateReceipt {
    ChannelUpdateReceipt {
        transaction_hash: mk_hash("0x7e"),
        log_event: ChannelUpdateEvent::from_state(state, sender),
    }
}

/// Deterministic wallet; distinct seeds give distinct keys. `seed` must be nonzero.
pub fn test_wallet(seed: u8) -> LocalWallet {
    LocalWallet::from_bytes(&[seed; 32])
        .unwrap_or_else(|e| panic!("invalid wallet seed {}: {}", seed, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::merkle::EMPTY_ROOT_HASH;

    #[test]
    fn test_fixture_padding() {
        assert_eq!(
            format!("{:?}", mk_address("0xAAA")),
            "0xaaa0000000000000000000000000000000000000"
        );
        assert_eq!(mk_hash("0x0"), EMPTY_ROOT_HASH);
        assert_eq!(empty_channel().thread_root, EMPTY_ROOT_HASH);
        assert_ne!(test_wallet(1).address(), test_wallet(2).address());
    }
}

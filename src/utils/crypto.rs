use crate::types::{ChannelState, ThreadState};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

pub trait U256Ext {
    fn to_be_bytes_vec(&self) -> Vec<u8>;
}

impl U256Ext for U256 {
    fn to_be_bytes_vec(&self) -> Vec<u8> {
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        bytes.to_vec()
    }
}

/// Address as an array element: left-padded to a full word.
fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn extend_words(message: &mut Vec<u8>, values: &[U256]) {
    for value in values {
        message.extend_from_slice(&value.to_be_bytes_vec());
    }
}

/// `abi.encodePacked` of a channel state, in the order the contract hashes it.
pub fn pack_channel_state(state: &ChannelState) -> Vec<u8> {
    let mut message = Vec::with_capacity(628);
    message.extend_from_slice(state.contract_address.as_bytes());
    message.extend_from_slice(&address_word(&state.user));
    message.extend_from_slice(&address_word(&state.recipient));
    extend_words(&mut message, &[state.balance_wei_hub, state.balance_wei_user]);
    extend_words(&mut message, &[state.balance_token_hub, state.balance_token_user]);
    extend_words(&mut message, &state.pending_wei_updates());
    extend_words(&mut message, &state.pending_token_updates());
    extend_words(&mut message, &[state.tx_count_global, state.tx_count_chain]);
    message.extend_from_slice(state.thread_root.as_bytes());
    extend_words(&mut message, &[state.thread_count, state.timeout]);
    message
}

/// `abi.encodePacked` of a thread state.
pub fn pack_thread_state(state: &ThreadState) -> Vec<u8> {
    let mut message = Vec::with_capacity(240);
    message.extend_from_slice(state.contract_address.as_bytes());
    message.extend_from_slice(state.user.as_bytes());
    message.extend_from_slice(state.sender.as_bytes());
    message.extend_from_slice(state.receiver.as_bytes());
    extend_words(
        &mut message,
        &[
            state.balance_wei_sender,
            state.balance_wei_receiver,
            state.balance_token_sender,
            state.balance_token_receiver,
            state.tx_count,
        ],
    );
    message
}

/// Hash both parties sign for a channel state. Signatures are not part of it.
pub fn hash_channel_state(state: &ChannelState) -> H256 {
    H256::from(keccak256(pack_channel_state(state)))
}

pub fn hash_thread_state(state: &ThreadState) -> H256 {
    H256::from(keccak256(pack_thread_state(state)))
}

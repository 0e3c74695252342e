use crate::types::channel::empty_signature_as_none;
use crate::utils::{crypto, numeric::decimal};
use ethers::types::{Address, Bytes, Signature, H256, U256};
use serde::{Deserialize, Serialize};

/// Unidirectional virtual channel bonded inside a parent channel.
///
/// Only the sender signs thread states; opening and closing are
/// co-signed through the parent channel updates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadState {
    pub contract_address: Address,
    pub user: Address,
    pub sender: Address,
    pub receiver: Address,

    #[serde(with = "decimal")]
    pub balance_wei_sender: U256,
    #[serde(with = "decimal")]
    pub balance_wei_receiver: U256,
    #[serde(with = "decimal")]
    pub balance_token_sender: U256,
    #[serde(with = "decimal")]
    pub balance_token_receiver: U256,

    #[serde(with = "decimal")]
    pub tx_count: U256,

    #[serde(
        default,
        deserialize_with = "empty_signature_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub sig_a: Option<Bytes>,
}

impl ThreadState {
    /// Initial state of a thread bonding `wei` and `token` from the sender.
    pub fn initial(
        contract_address: Address,
        user: Address,
        sender: Address,
        receiver: Address,
        wei: U256,
        token: U256,
    ) -> Self {
        Self {
            contract_address,
            user,
            sender,
            receiver,
            balance_wei_sender: wei,
            balance_wei_receiver: U256::zero(),
            balance_token_sender: token,
            balance_token_receiver: U256::zero(),
            tx_count: U256::zero(),
            sig_a: None,
        }
    }

    pub fn hash(&self) -> H256 {
        crypto::hash_thread_state(self)
    }

    pub fn with_sig_a(&self, sig: Signature) -> Self {
        Self {
            sig_a: Some(Bytes::from(sig.to_vec())),
            ..self.clone()
        }
    }

    pub fn unsigned(&self) -> Self {
        Self {
            sig_a: None,
            ..self.clone()
        }
    }

    /// Two states describe the same thread.
    pub fn same_thread(&self, other: &ThreadState) -> bool {
        self.contract_address == other.contract_address
            && self.user == other.user
            && self.sender == other.sender
            && self.receiver == other.receiver
    }

    pub fn total_wei(&self) -> Option<U256> {
        self.balance_wei_sender.checked_add(self.balance_wei_receiver)
    }

    pub fn total_token(&self) -> Option<U256> {
        self.balance_token_sender.checked_add(self.balance_token_receiver)
    }
}

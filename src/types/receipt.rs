use crate::types::channel::{ChannelState, Party};
use crate::types::error::EngineError;
use crate::utils::numeric::{decimal, decimal_array};
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, Log, TransactionReceipt, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// Signature of the event the contract emits for every channel update.
/// `user` is indexed, everything else is in the log data.
pub const DID_UPDATE_CHANNEL: &str = "DidUpdateChannel(address,uint256,uint256[2],uint256[2],uint256[4],uint256[4],uint256[2],bytes32,uint256)";

pub fn did_update_channel_topic() -> H256 {
    H256::from(keccak256(DID_UPDATE_CHANNEL.as_bytes()))
}

fn event_data_types() -> Vec<ParamType> {
    let words = |n| ParamType::FixedArray(Box::new(ParamType::Uint(256)), n);
    vec![
        ParamType::Uint(256),
        words(2),
        words(2),
        words(4),
        words(4),
        words(2),
        ParamType::FixedBytes(32),
        ParamType::Uint(256),
    ]
}

/// Decoded `DidUpdateChannel` event. Pending arrays are ordered
/// deposit hub, withdrawal hub, deposit user, withdrawal user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdateEvent {
    pub user: Address,
    #[serde(with = "decimal")]
    pub sender_idx: U256,
    #[serde(with = "decimal_array")]
    pub wei_balances: [U256; 2],
    #[serde(with = "decimal_array")]
    pub token_balances: [U256; 2],
    #[serde(with = "decimal_array")]
    pub pending_wei_updates: [U256; 4],
    #[serde(with = "decimal_array")]
    pub pending_token_updates: [U256; 4],
    #[serde(with = "decimal_array")]
    pub tx_count: [U256; 2],
    pub thread_root: H256,
    #[serde(with = "decimal")]
    pub thread_count: U256,
}

/// Evidence that a channel update landed on-chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdateReceipt {
    pub transaction_hash: H256,
    pub log_event: ChannelUpdateEvent,
}

impl ChannelUpdateEvent {
    /// The event the contract emits when `state` is submitted by `sender`.
    pub fn from_state(state: &ChannelState, sender: Party) -> Self {
        Self {
            user: state.user,
            sender_idx: U256::from(sender.index()),
            wei_balances: [state.balance_wei_hub, state.balance_wei_user],
            token_balances: [state.balance_token_hub, state.balance_token_user],
            pending_wei_updates: state.pending_wei_updates(),
            pending_token_updates: state.pending_token_updates(),
            tx_count: [state.tx_count_global, state.tx_count_chain],
            thread_root: state.thread_root,
            thread_count: state.thread_count,
        }
    }

    pub fn from_log(log: &Log) -> Result<Self, EngineError> {
        if log.topics.first() != Some(&did_update_channel_topic()) {
            return Err(EngineError::Decode(
                "log is not a DidUpdateChannel event".to_string(),
            ));
        }
        let user_topic = log
            .topics
            .get(1)
            .ok_or_else(|| EngineError::Decode("missing indexed user topic".to_string()))?;
        let user = Address::from_slice(&user_topic.as_bytes()[12..]);

        let mut tokens = abi::decode(&event_data_types(), &log.data)?.into_iter();
        Ok(Self {
            user,
            sender_idx: next_uint(&mut tokens)?,
            wei_balances: next_uints(&mut tokens)?,
            token_balances: next_uints(&mut tokens)?,
            pending_wei_updates: next_uints(&mut tokens)?,
            pending_token_updates: next_uints(&mut tokens)?,
            tx_count: next_uints(&mut tokens)?,
            thread_root: next_bytes32(&mut tokens)?,
            thread_count: next_uint(&mut tokens)?,
        })
    }

    /// Encode as the log `contract` would emit.
    pub fn to_log(&self, contract: Address) -> Log {
        let uints = |values: &[U256]| Token::FixedArray(values.iter().copied().map(Token::Uint).collect());
        let data = abi::encode(&[
            Token::Uint(self.sender_idx),
            uints(&self.wei_balances),
            uints(&self.token_balances),
            uints(&self.pending_wei_updates),
            uints(&self.pending_token_updates),
            uints(&self.tx_count),
            Token::FixedBytes(self.thread_root.as_bytes().to_vec()),
            Token::Uint(self.thread_count),
        ]);

        let mut user_word = [0u8; 32];
        user_word[12..].copy_from_slice(self.user.as_bytes());

        Log {
            address: contract,
            topics: vec![did_update_channel_topic(), H256::from(user_word)],
            data: Bytes::from(data),
            ..Default::default()
        }
    }
}

impl ChannelUpdateReceipt {
    /// Pick the `DidUpdateChannel` log emitted by `contract` out of a
    /// transaction receipt. `Ok(None)` if there is none.
    pub fn from_transaction_receipt(
        receipt: &TransactionReceipt,
        contract: Address,
    ) -> Result<Option<Self>, EngineError> {
        let topic = did_update_channel_topic();
        let log = receipt
            .logs
            .iter()
            .find(|log| log.address == contract && log.topics.first() == Some(&topic));

        match log {
            Some(log) => Ok(Some(Self {
                transaction_hash: receipt.transaction_hash,
                log_event: ChannelUpdateEvent::from_log(log)?,
            })),
            None => Ok(None),
        }
    }
}

fn next_uint(tokens: &mut impl Iterator<Item = Token>) -> Result<U256, EngineError> {
    tokens
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| EngineError::Decode("expected uint256 in event data".to_string()))
}

fn next_uints<const N: usize>(
    tokens: &mut impl Iterator<Item = Token>,
) -> Result<[U256; N], EngineError> {
    let items = tokens
        .next()
        .and_then(Token::into_fixed_array)
        .ok_or_else(|| EngineError::Decode(format!("expected uint256[{}] in event data", N)))?;
    if items.len() != N {
        return Err(EngineError::Decode(format!(
            "expected {} array items, got {}",
            N,
            items.len()
        )));
    }
    let mut out = [U256::zero(); N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .into_uint()
            .ok_or_else(|| EngineError::Decode("expected uint256 array item".to_string()))?;
    }
    Ok(out)
}

fn next_bytes32(tokens: &mut impl Iterator<Item = Token>) -> Result<H256, EngineError> {
    let bytes = tokens
        .next()
        .and_then(Token::into_fixed_bytes)
        .ok_or_else(|| EngineError::Decode("expected bytes32 in event data".to_string()))?;
    if bytes.len() != 32 {
        return Err(EngineError::Decode(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(H256::from_slice(&bytes))
}

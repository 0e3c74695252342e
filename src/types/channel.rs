use crate::utils::{crypto, merkle::EMPTY_ROOT_HASH, numeric::decimal, signature};
use ethers::types::{Address, Bytes, Signature, H256, U256};
use serde::{Deserialize, Deserializer, Serialize};

/// One side of a user <-> hub channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Hub,
    User,
}

impl Party {
    pub fn other(&self) -> Self {
        match self {
            Party::Hub => Party::User,
            Party::User => Party::Hub,
        }
    }

    /// Index used by the contract's `senderIdx`.
    pub fn index(&self) -> u64 {
        match self {
            Party::Hub => 0,
            Party::User => 1,
        }
    }
}

/// A wei/token pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balances {
    #[serde(with = "decimal")]
    pub balance_wei: U256,
    #[serde(with = "decimal")]
    pub balance_token: U256,
}

/// Pending amounts of a channel grouped by party and direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBalances {
    pub hub_deposit: Balances,
    pub user_deposit: Balances,
    pub hub_withdrawal: Balances,
    pub user_withdrawal: Balances,
}

/// Bilateral ledger between one user and the hub.
///
/// Values are snapshots: a transition always builds a new `ChannelState`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    pub contract_address: Address,
    pub user: Address,
    pub recipient: Address,

    #[serde(with = "decimal")]
    pub balance_wei_hub: U256,
    #[serde(with = "decimal")]
    pub balance_wei_user: U256,
    #[serde(with = "decimal")]
    pub balance_token_hub: U256,
    #[serde(with = "decimal")]
    pub balance_token_user: U256,

    #[serde(with = "decimal")]
    pub pending_deposit_wei_hub: U256,
    #[serde(with = "decimal")]
    pub pending_deposit_wei_user: U256,
    #[serde(with = "decimal")]
    pub pending_deposit_token_hub: U256,
    #[serde(with = "decimal")]
    pub pending_deposit_token_user: U256,
    #[serde(with = "decimal")]
    pub pending_withdrawal_wei_hub: U256,
    #[serde(with = "decimal")]
    pub pending_withdrawal_wei_user: U256,
    #[serde(with = "decimal")]
    pub pending_withdrawal_token_hub: U256,
    #[serde(with = "decimal")]
    pub pending_withdrawal_token_user: U256,

    #[serde(with = "decimal")]
    pub tx_count_global: U256,
    #[serde(with = "decimal")]
    pub tx_count_chain: U256,

    pub thread_root: H256,
    #[serde(with = "decimal")]
    pub thread_count: U256,

    #[serde(with = "decimal")]
    pub timeout: U256,

    #[serde(
        default,
        deserialize_with = "empty_signature_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub sig_user: Option<Bytes>,
    #[serde(
        default,
        deserialize_with = "empty_signature_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub sig_hub: Option<Bytes>,
}

/// Stored states from older clients carry `""` for a missing signature.
pub(crate) fn empty_signature_as_none<'de, D>(deserializer: D) -> Result<Option<Bytes>, D::Error>
where
    D: Deserializer<'de>,
{
    let sig = Option::<Bytes>::deserialize(deserializer)?;
    Ok(sig.filter(|s| !s.is_empty()))
}

impl ChannelState {
    /// The zero state a channel starts from.
    pub fn genesis(contract_address: Address, user: Address) -> Self {
        Self {
            contract_address,
            user,
            recipient: user,
            balance_wei_hub: U256::zero(),
            balance_wei_user: U256::zero(),
            balance_token_hub: U256::zero(),
            balance_token_user: U256::zero(),
            pending_deposit_wei_hub: U256::zero(),
            pending_deposit_wei_user: U256::zero(),
            pending_deposit_token_hub: U256::zero(),
            pending_deposit_token_user: U256::zero(),
            pending_withdrawal_wei_hub: U256::zero(),
            pending_withdrawal_wei_user: U256::zero(),
            pending_withdrawal_token_hub: U256::zero(),
            pending_withdrawal_token_user: U256::zero(),
            tx_count_global: U256::zero(),
            tx_count_chain: U256::zero(),
            thread_root: EMPTY_ROOT_HASH,
            thread_count: U256::zero(),
            timeout: U256::zero(),
            sig_user: None,
            sig_hub: None,
        }
    }

    pub fn balance_wei(&self, party: Party) -> U256 {
        match party {
            Party::Hub => self.balance_wei_hub,
            Party::User => self.balance_wei_user,
        }
    }

    pub fn balance_token(&self, party: Party) -> U256 {
        match party {
            Party::Hub => self.balance_token_hub,
            Party::User => self.balance_token_user,
        }
    }

    pub fn balances(&self, party: Party) -> Balances {
        Balances {
            balance_wei: self.balance_wei(party),
            balance_token: self.balance_token(party),
        }
    }

    pub fn pending_deposit(&self, party: Party) -> Balances {
        match party {
            Party::Hub => Balances {
                balance_wei: self.pending_deposit_wei_hub,
                balance_token: self.pending_deposit_token_hub,
            },
            Party::User => Balances {
                balance_wei: self.pending_deposit_wei_user,
                balance_token: self.pending_deposit_token_user,
            },
        }
    }

    pub fn pending_withdrawal(&self, party: Party) -> Balances {
        match party {
            Party::Hub => Balances {
                balance_wei: self.pending_withdrawal_wei_hub,
                balance_token: self.pending_withdrawal_token_hub,
            },
            Party::User => Balances {
                balance_wei: self.pending_withdrawal_wei_user,
                balance_token: self.pending_withdrawal_token_user,
            },
        }
    }

    /// Operating balance not already claimed by a pending withdrawal.
    pub fn available(&self, party: Party) -> Balances {
        let withdrawal = self.pending_withdrawal(party);
        Balances {
            balance_wei: self.balance_wei(party).saturating_sub(withdrawal.balance_wei),
            balance_token: self
                .balance_token(party)
                .saturating_sub(withdrawal.balance_token),
        }
    }

    pub(crate) fn set_balances(&mut self, party: Party, wei: U256, token: U256) {
        match party {
            Party::Hub => {
                self.balance_wei_hub = wei;
                self.balance_token_hub = token;
            }
            Party::User => {
                self.balance_wei_user = wei;
                self.balance_token_user = token;
            }
        }
    }

    /// Pending wei in contract order: deposit hub, withdrawal hub,
    /// deposit user, withdrawal user.
    pub fn pending_wei_updates(&self) -> [U256; 4] {
        [
            self.pending_deposit_wei_hub,
            self.pending_withdrawal_wei_hub,
            self.pending_deposit_wei_user,
            self.pending_withdrawal_wei_user,
        ]
    }

    /// Pending tokens in the same order as [`Self::pending_wei_updates`].
    pub fn pending_token_updates(&self) -> [U256; 4] {
        [
            self.pending_deposit_token_hub,
            self.pending_withdrawal_token_hub,
            self.pending_deposit_token_user,
            self.pending_withdrawal_token_user,
        ]
    }

    pub fn pending_balances(&self) -> PendingBalances {
        PendingBalances {
            hub_deposit: Balances {
                balance_wei: self.pending_deposit_wei_hub,
                balance_token: self.pending_deposit_token_hub,
            },
            user_deposit: Balances {
                balance_wei: self.pending_deposit_wei_user,
                balance_token: self.pending_deposit_token_user,
            },
            hub_withdrawal: Balances {
                balance_wei: self.pending_withdrawal_wei_hub,
                balance_token: self.pending_withdrawal_token_hub,
            },
            user_withdrawal: Balances {
                balance_wei: self.pending_withdrawal_wei_user,
                balance_token: self.pending_withdrawal_token_user,
            },
        }
    }

    /// Name of the first nonzero pending field, if any.
    pub fn first_pending_op(&self) -> Option<&'static str> {
        let fields = [
            ("pendingDepositWeiHub", self.pending_deposit_wei_hub),
            ("pendingDepositTokenHub", self.pending_deposit_token_hub),
            ("pendingDepositWeiUser", self.pending_deposit_wei_user),
            ("pendingDepositTokenUser", self.pending_deposit_token_user),
            ("pendingWithdrawalWeiHub", self.pending_withdrawal_wei_hub),
            ("pendingWithdrawalTokenHub", self.pending_withdrawal_token_hub),
            ("pendingWithdrawalWeiUser", self.pending_withdrawal_wei_user),
            ("pendingWithdrawalTokenUser", self.pending_withdrawal_token_user),
        ];
        fields
            .into_iter()
            .find(|(_, value)| !value.is_zero())
            .map(|(name, _)| name)
    }

    pub fn has_pending_ops(&self) -> bool {
        self.first_pending_op().is_some()
    }

    /// Same state with both signatures stripped.
    pub fn unsigned(&self) -> Self {
        Self {
            sig_user: None,
            sig_hub: None,
            ..self.clone()
        }
    }

    pub fn with_sig_user(&self, sig: Signature) -> Self {
        Self {
            sig_user: Some(Bytes::from(sig.to_vec())),
            ..self.clone()
        }
    }

    pub fn with_sig_hub(&self, sig: Signature) -> Self {
        Self {
            sig_hub: Some(Bytes::from(sig.to_vec())),
            ..self.clone()
        }
    }

    /// Canonical hash that both parties (and the contract) sign.
    pub fn hash(&self) -> H256 {
        crypto::hash_channel_state(self)
    }

    /// Both signatures are present and recover to the user and the hub.
    pub fn is_fully_signed(&self, hub: Address) -> bool {
        match (&self.sig_user, &self.sig_hub) {
            (Some(sig_user), Some(sig_hub)) => {
                let hash = self.hash();
                signature::verify_bytes(hash, sig_user, self.user)
                    && signature::verify_bytes(hash, sig_hub, hub)
            }
            _ => false,
        }
    }
}

use crate::types::channel::{ChannelState, Party};
use crate::types::receipt::ChannelUpdateReceipt;
use crate::types::thread::ThreadState;
use crate::utils::numeric::{decimal, ExchangeRate};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which transition rule set applies to an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateReason {
    Payment,
    Exchange,
    ProposePendingDeposit,
    ProposePendingWithdrawal,
    ConfirmPending,
    OpenThread,
    CloseThread,
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentArgs {
    #[serde(with = "decimal")]
    pub amount_wei: U256,
    #[serde(with = "decimal")]
    pub amount_token: U256,
    /// Party whose balances increase.
    pub recipient: Party,
}

impl PaymentArgs {
    /// Recover the payment encoded by a proposed state. The recipient is
    /// the side whose balances did not decrease.
    pub fn infer(previous: &ChannelState, proposed: &ChannelState) -> Option<Self> {
        let user_to_hub = previous.balance_token_hub <= proposed.balance_token_hub
            && previous.balance_wei_hub <= proposed.balance_wei_hub;
        let payer = if user_to_hub { Party::User } else { Party::Hub };
        Some(Self {
            amount_wei: previous
                .balance_wei(payer)
                .checked_sub(proposed.balance_wei(payer))?,
            amount_token: previous
                .balance_token(payer)
                .checked_sub(proposed.balance_token(payer))?,
            recipient: payer.other(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeArgs {
    #[serde(with = "decimal")]
    pub wei_to_sell: U256,
    #[serde(with = "decimal")]
    pub tokens_to_sell: U256,
    pub exchange_rate: ExchangeRate,
    pub seller: Party,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositArgs {
    #[serde(with = "decimal")]
    pub deposit_wei_hub: U256,
    #[serde(with = "decimal")]
    pub deposit_wei_user: U256,
    #[serde(with = "decimal")]
    pub deposit_token_hub: U256,
    #[serde(with = "decimal")]
    pub deposit_token_user: U256,
    #[serde(with = "decimal")]
    pub timeout: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalArgs {
    #[serde(with = "decimal")]
    pub withdrawal_wei_hub: U256,
    #[serde(with = "decimal")]
    pub withdrawal_wei_user: U256,
    #[serde(with = "decimal")]
    pub withdrawal_token_hub: U256,
    #[serde(with = "decimal")]
    pub withdrawal_token_user: U256,
    /// New withdrawal target; `None` keeps the channel's recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Address>,
    #[serde(with = "decimal")]
    pub timeout: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPendingArgs {
    pub receipt: ChannelUpdateReceipt,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenThreadArgs {
    /// Initial state of the new thread, signed by its sender.
    pub thread_state: ThreadState,
    /// Initial states of the threads already open in the channel.
    pub initial_thread_states: Vec<ThreadState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseThreadArgs {
    /// Latest thread state, signed by its sender.
    pub thread_state: ThreadState,
    pub initial_thread_states: Vec<ThreadState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPaymentArgs {
    #[serde(with = "decimal")]
    pub amount_wei: U256,
    #[serde(with = "decimal")]
    pub amount_token: U256,
}

/// A typed update intent. Adding a reason here forces every consumer to
/// handle it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "args")]
pub enum UpdateArgs {
    Payment(PaymentArgs),
    Exchange(ExchangeArgs),
    ProposePendingDeposit(DepositArgs),
    ProposePendingWithdrawal(WithdrawalArgs),
    ConfirmPending(ConfirmPendingArgs),
    OpenThread(OpenThreadArgs),
    CloseThread(CloseThreadArgs),
}

impl UpdateArgs {
    pub fn reason(&self) -> UpdateReason {
        match self {
            UpdateArgs::Payment(_) => UpdateReason::Payment,
            UpdateArgs::Exchange(_) => UpdateReason::Exchange,
            UpdateArgs::ProposePendingDeposit(_) => UpdateReason::ProposePendingDeposit,
            UpdateArgs::ProposePendingWithdrawal(_) => UpdateReason::ProposePendingWithdrawal,
            UpdateArgs::ConfirmPending(_) => UpdateReason::ConfirmPending,
            UpdateArgs::OpenThread(_) => UpdateReason::OpenThread,
            UpdateArgs::CloseThread(_) => UpdateReason::CloseThread,
        }
    }
}

pub mod args;
pub mod channel;
pub mod error;
pub mod receipt;
pub mod thread;

pub use args::{
    CloseThreadArgs, ConfirmPendingArgs, DepositArgs, ExchangeArgs, OpenThreadArgs, PaymentArgs,
    ThreadPaymentArgs, UpdateArgs, UpdateReason, WithdrawalArgs,
};
pub use channel::{Balances, ChannelState, Party, PendingBalances};
pub use error::{EngineError, Violation, ViolationKind};
pub use receipt::{ChannelUpdateEvent, ChannelUpdateReceipt};
pub use thread::ThreadState;

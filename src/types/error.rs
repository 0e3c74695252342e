use crate::types::channel::ChannelState;
use crate::utils::numeric::NumericError;
use std::fmt;
use thiserror::Error;

/// Category of a rejected state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    GlobalNonce,
    ChainNonce,
    Identity,
    Signature,
    PendingChanged,
    Conservation,
    PaymentMismatch,
    ExchangeMismatch,
    ThreadChanged,
    InvalidArgs,
    InsufficientBalance,
    PendingExists,
    OperatingBalanceChanged,
    PendingMismatch,
    TimeoutElapsed,
    UnexpectedTimeout,
    ConfirmMismatch,
    ReceiptMismatch,
    ThreadRoot,
    ThreadCount,
    ThreadState,
    ThreadSignature,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::GlobalNonce => "global nonce",
            ViolationKind::ChainNonce => "chain nonce",
            ViolationKind::Identity => "channel identity",
            ViolationKind::Signature => "signature",
            ViolationKind::PendingChanged => "pending balances changed",
            ViolationKind::Conservation => "conservation",
            ViolationKind::PaymentMismatch => "payment mismatch",
            ViolationKind::ExchangeMismatch => "exchange mismatch",
            ViolationKind::ThreadChanged => "threads changed",
            ViolationKind::InvalidArgs => "invalid args",
            ViolationKind::InsufficientBalance => "insufficient balance",
            ViolationKind::PendingExists => "pending operation exists",
            ViolationKind::OperatingBalanceChanged => "operating balances changed",
            ViolationKind::PendingMismatch => "pending mismatch",
            ViolationKind::TimeoutElapsed => "timeout",
            ViolationKind::UnexpectedTimeout => "unexpected timeout",
            ViolationKind::ConfirmMismatch => "confirmation mismatch",
            ViolationKind::ReceiptMismatch => "receipt mismatch",
            ViolationKind::ThreadRoot => "thread root",
            ViolationKind::ThreadCount => "thread count",
            ViolationKind::ThreadState => "thread state",
            ViolationKind::ThreadSignature => "thread signature",
        };
        f.write_str(name)
    }
}

/// A rejected update. Returned as a value: a bad counterparty state is
/// expected input, not a bug.
#[derive(Error, Clone, Debug, PartialEq)]
#[error("{kind}: {message}")]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    pub previous: Option<Box<ChannelState>>,
    pub proposed: Option<Box<ChannelState>>,
}

impl Violation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            previous: None,
            proposed: None,
        }
    }

    /// Attach the transition the violation was found in.
    pub fn with_states(mut self, previous: &ChannelState, proposed: &ChannelState) -> Self {
        self.previous = Some(Box::new(previous.clone()));
        self.proposed = Some(Box::new(proposed.clone()));
        self
    }
}

/// Structural, configuration and transport failures. These indicate a
/// caller bug or an unreachable collaborator, unlike a [`Violation`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Update rejected: {0}")]
    Violation(#[from] Violation),
    #[error("Numeric error: {0}")]
    Numeric(#[from] NumericError),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Chain error: {0}")]
    Chain(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Cannot create a Merkle tree with 0 leaves")]
    EmptyTree,
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Decode(error.to_string())
    }
}

impl From<ethers::abi::Error> for EngineError {
    fn from(error: ethers::abi::Error) -> Self {
        EngineError::Decode(error.to_string())
    }
}

impl EngineError {
    /// The violation behind this error, if it is one.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            EngineError::Violation(v) => Some(v),
            _ => None,
        }
    }
}

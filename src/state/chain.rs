use crate::state::validator::Validator;
use crate::types::{
    ChannelState, ChannelUpdateReceipt, ConfirmPendingArgs, EngineError, UpdateArgs, Violation,
    ViolationKind,
};
use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Middleware, Provider};
use ethers::types::{Transaction, TransactionReceipt, H256, U64};
use tracing::{info, warn};

/// Read access to the settlement chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn transaction(&self, hash: H256) -> Result<Option<Transaction>, EngineError>;
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, EngineError>;
}

#[async_trait]
impl<P: JsonRpcClient + 'static> ChainReader for Provider<P> {
    async fn transaction(&self, hash: H256) -> Result<Option<Transaction>, EngineError> {
        self.get_transaction(hash)
            .await
            .map_err(|e| EngineError::Chain(e.to_string()))
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, EngineError> {
        self.get_transaction_receipt(hash)
            .await
            .map_err(|e| EngineError::Chain(e.to_string()))
    }
}

/// Confirms pending operations against what actually landed on-chain.
pub struct ChainConfirmer<R> {
    reader: R,
    validator: Validator,
}

impl<R: ChainReader> ChainConfirmer<R> {
    pub fn new(reader: R, validator: Validator) -> Self {
        Self { reader, validator }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Fetch the `DidUpdateChannel` receipt of `tx_hash`, which must have
    /// submitted the pending state `previous`.
    pub async fn confirmation_args(
        &self,
        previous: &ChannelState,
        tx_hash: H256,
    ) -> Result<ConfirmPendingArgs, EngineError> {
        let tx = self
            .reader
            .transaction(tx_hash)
            .await?
            .ok_or_else(|| receipt_violation(format!("transaction {:?} not found", tx_hash)))?;

        if tx.to != Some(previous.contract_address) {
            return Err(receipt_violation(format!(
                "transaction {:?} was not sent to the channel contract",
                tx_hash
            )));
        }
        if tx.from != previous.user && tx.from != self.validator.hub_address() {
            return Err(receipt_violation(format!(
                "transaction sender {:?} is neither the channel user nor the hub",
                tx.from
            )));
        }

        let receipt = self
            .reader
            .transaction_receipt(tx_hash)
            .await?
            .ok_or_else(|| receipt_violation(format!("no receipt for {:?}", tx_hash)))?;
        if receipt.status != Some(U64::one()) {
            return Err(receipt_violation(format!("transaction {:?} failed", tx_hash)));
        }

        let receipt = ChannelUpdateReceipt::from_transaction_receipt(&receipt, previous.contract_address)?
            .ok_or_else(|| {
                receipt_violation(format!("transaction {:?} emitted no DidUpdateChannel", tx_hash))
            })?;

        info!(tx = ?tx_hash, user = ?previous.user, "fetched channel update receipt");
        Ok(ConfirmPendingArgs { receipt })
    }

    /// Validate a `ConfirmPending` update whose evidence is transaction `tx_hash`.
    pub async fn validate_confirm_pending(
        &self,
        previous: &ChannelState,
        proposed: &ChannelState,
        tx_hash: H256,
    ) -> Result<Option<Violation>, EngineError> {
        let args = match self.confirmation_args(previous, tx_hash).await {
            Ok(args) => UpdateArgs::ConfirmPending(args),
            Err(EngineError::Violation(violation)) => {
                warn!(tx = ?tx_hash, "cannot confirm pending operation: {}", violation);
                return Ok(Some(violation.with_states(previous, proposed)));
            }
            Err(e) => return Err(e),
        };
        Ok(self.validator.validate(previous, proposed, &args))
    }
}

fn receipt_violation(message: String) -> EngineError {
    Violation::new(ViolationKind::ReceiptMismatch, message).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{generator, FixedClock};
    use crate::testing::{empty_channel, mk_address, mk_hash};
    use crate::types::{ChannelUpdateEvent, DepositArgs, Party};
    use ethers::types::{Address, U256};
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct MockChain {
        transactions: HashMap<H256, Transaction>,
        receipts: HashMap<H256, TransactionReceipt>,
        offline: bool,
    }

    #[async_trait]
    impl ChainReader for MockChain {
        async fn transaction(&self, hash: H256) -> Result<Option<Transaction>, EngineError> {
            if self.offline {
                return Err(EngineError::Chain("connection refused".to_string()));
            }
            Ok(self.transactions.get(&hash).cloned())
        }

        async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, EngineError> {
            if self.offline {
                return Err(EngineError::Chain("connection refused".to_string()));
            }
            Ok(self.receipts.get(&hash).cloned())
        }
    }

    fn hub() -> Address {
        mk_address("0x111")
    }

    fn pending_deposit() -> ChannelState {
        generator::propose_pending_deposit(
            &empty_channel(),
            &DepositArgs {
                deposit_wei_hub: U256::zero(),
                deposit_wei_user: U256::from(10),
                deposit_token_hub: U256::zero(),
                deposit_token_user: U256::zero(),
                timeout: U256::zero(),
            },
        )
        .unwrap()
    }

    fn chain_with(pending: &ChannelState, tx_hash: H256, from: Address, status: u64) -> MockChain {
        let mut chain = MockChain::default();
        chain.transactions.insert(
            tx_hash,
            Transaction {
                hash: tx_hash,
                from,
                to: Some(pending.contract_address),
                ..Default::default()
            },
        );
        let log = ChannelUpdateEvent::from_state(pending, Party::User).to_log(pending.contract_address);
        chain.receipts.insert(
            tx_hash,
            TransactionReceipt {
                transaction_hash: tx_hash,
                status: Some(U64::from(status)),
                logs: vec![log],
                ..Default::default()
            },
        );
        chain
    }

    fn confirmer(chain: MockChain) -> ChainConfirmer<MockChain> {
        ChainConfirmer::new(chain, Validator::with_clock(hub(), Arc::new(FixedClock(0))))
    }

    #[tokio::test]
    async fn test_confirms_from_chain() {
        let pending = pending_deposit();
        let tx_hash = mk_hash("0x7e");
        let confirmer = confirmer(chain_with(&pending, tx_hash, pending.user, 1));

        let args = confirmer.confirmation_args(&pending, tx_hash).await.unwrap();
        assert_eq!(args.receipt.transaction_hash, tx_hash);
        assert_eq!(args.receipt.log_event.user, pending.user);

        let proposed =
            generator::generate(&pending, &UpdateArgs::ConfirmPending(args)).unwrap();
        assert_eq!(proposed.balance_wei_user, U256::from(10));
        let result = confirmer
            .validate_confirm_pending(&pending, &proposed, tx_hash)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_hub_may_submit() {
        let pending = pending_deposit();
        let tx_hash = mk_hash("0x7e");
        let confirmer = confirmer(chain_with(&pending, tx_hash, hub(), 1));
        assert!(confirmer.confirmation_args(&pending, tx_hash).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_bad_evidence() {
        let pending = pending_deposit();
        let tx_hash = mk_hash("0x7e");

        let stranger = confirmer(chain_with(&pending, tx_hash, mk_address("0x999"), 1));
        let err = stranger.confirmation_args(&pending, tx_hash).await.unwrap_err();
        assert_eq!(err.violation().map(|v| v.kind), Some(ViolationKind::ReceiptMismatch));

        let failed = confirmer(chain_with(&pending, tx_hash, pending.user, 0));
        assert!(failed.confirmation_args(&pending, tx_hash).await.unwrap_err().violation().is_some());

        let missing = confirmer(MockChain::default());
        let result = missing
            .validate_confirm_pending(&pending, &pending, tx_hash)
            .await
            .unwrap();
        assert_eq!(result.map(|v| v.kind), Some(ViolationKind::ReceiptMismatch));

        let mut wrong_contract = chain_with(&pending, tx_hash, pending.user, 1);
        if let Some(tx) = wrong_contract.transactions.get_mut(&tx_hash) {
            tx.to = Some(mk_address("0xDDD"));
        }
        assert!(confirmer(wrong_contract)
            .confirmation_args(&pending, tx_hash)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_rpc_failure_is_an_error() {
        let pending = pending_deposit();
        let confirmer = confirmer(MockChain {
            offline: true,
            ..Default::default()
        });
        let err = confirmer
            .validate_confirm_pending(&pending, &pending, mk_hash("0x7e"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Chain(_)));
    }
}

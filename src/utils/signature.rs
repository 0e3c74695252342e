//! Personal-sign signatures over canonical state hashes.
//!
//! The signed digest is `keccak256("\x19Ethereum Signed Message:\n32" ++ hash)`,
//! which is what `eth_sign` produces and what the contract's `ecrecover`
//! checks against.

use crate::types::{ChannelState, EngineError, ThreadState};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, RecoveryMessage, Signature, SignatureError, H256};
use ethers::utils::hash_message;

pub fn sign_hash(hash: H256, wallet: &LocalWallet) -> Result<Signature, EngineError> {
    wallet
        .sign_hash(hash_message(hash.as_bytes()))
        .map_err(|e| EngineError::Signing(e.to_string()))
}

/// Address that produced `signature` over `hash`.
pub fn recover(hash: H256, signature: &Signature) -> Result<Address, SignatureError> {
    // `Data` applies the personal-sign prefix before recovering
    let recoverable = RecoveryMessage::Data(hash.as_bytes().to_vec());
    signature.recover(recoverable)
}

pub fn recover_bytes(hash: H256, signature: &[u8]) -> Result<Address, SignatureError> {
    let signature = Signature::try_from(signature)?;
    recover(hash, &signature)
}

/// True only if `signature` parses and recovers to `expected`.
pub fn verify_bytes(hash: H256, signature: &[u8], expected: Address) -> bool {
    match recover_bytes(hash, signature) {
        Ok(recovered) => recovered == expected,
        Err(e) => {
            tracing::trace!(error = %e, "signature recovery failed");
            false
        }
    }
}

pub fn verify_channel_signature(state: &ChannelState, signature: &[u8], expected: Address) -> bool {
    verify_bytes(state.hash(), signature, expected)
}

pub fn verify_thread_signature(state: &ThreadState, signature: &[u8], expected: Address) -> bool {
    verify_bytes(state.hash(), signature, expected)
}

pub fn sign_channel_state(state: &ChannelState, wallet: &LocalWallet) -> Result<Signature, EngineError> {
    sign_hash(state.hash(), wallet)
}

pub fn sign_thread_state(state: &ThreadState, wallet: &LocalWallet) -> Result<Signature, EngineError> {
    sign_hash(state.hash(), wallet)
}

pub fn address_of(wallet: &LocalWallet) -> Address {
    wallet.address()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{empty_channel, empty_thread, mk_hash, test_wallet};
    use std::str::FromStr;

    #[test]
    fn test_sign_and_recover() {
        let wallet = test_wallet(1);
        let hash = mk_hash("0xabc");

        let signature = sign_hash(hash, &wallet).unwrap();
        assert_eq!(signature.to_vec().len(), 65);
        assert_eq!(recover(hash, &signature).unwrap(), address_of(&wallet));
        assert!(verify_bytes(hash, &signature.to_vec(), wallet.address()));

        let other = mk_hash("0xabd");
        assert!(!verify_bytes(other, &signature.to_vec(), wallet.address()));
    }

    #[test]
    fn test_signatures_use_legacy_v() {
        let wallet = LocalWallet::from_str(
            "1234567890123456789012345678901234567890123456789012345678901234",
        )
        .unwrap();
        let hash = H256::repeat_byte(0x11);
        let signature = sign_hash(hash, &wallet).unwrap();
        assert!(signature.v == 27 || signature.v == 28);
        assert_eq!(recover(hash, &signature).unwrap(), wallet.address());
    }

    #[test]
    fn test_invalid_signature() {
        let wallet = test_wallet(2);
        let hash = mk_hash("0xabc");

        // Create an obviously invalid signature
        assert!(!verify_bytes(hash, &[1u8; 65], wallet.address()));
        // Wrong length
        assert!(recover_bytes(hash, &[0u8; 64]).is_err());
        assert!(!verify_bytes(hash, &[], wallet.address()));
    }

    #[test]
    fn test_channel_and_thread_signatures() {
        let user = test_wallet(3);
        let mut state = empty_channel();
        state.user = user.address();
        let signature = sign_channel_state(&state, &user).unwrap();
        assert!(verify_channel_signature(&state, &signature.to_vec(), user.address()));

        let mut thread = empty_thread();
        thread.sender = user.address();
        let signature = sign_thread_state(&thread, &user).unwrap();
        assert!(verify_thread_signature(&thread, &signature.to_vec(), thread.sender));
        assert!(!verify_thread_signature(&thread, &signature.to_vec(), thread.receiver));
    }

    #[test]
    fn test_address_comparison_ignores_hex_case() {
        let wallet = test_wallet(4);
        let hash = mk_hash("0x1");
        let signature = sign_hash(hash, &wallet).unwrap();

        let upper = format!("{:?}", wallet.address()).to_uppercase().replace("0X", "0x");
        let parsed = Address::from_str(&upper).unwrap();
        assert!(verify_bytes(hash, &signature.to_vec(), parsed));
    }
}

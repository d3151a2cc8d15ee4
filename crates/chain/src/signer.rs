//! Signing agent for liquidation extrinsics.
//!
//! The agent is an sr25519 keypair derived from a secret URI: a mnemonic
//! phrase, a hex seed, or dev junctions such as `//Alice//stash`.

use crate::error::ChainError;
use crate::types::AccountId;
use std::str::FromStr;
use subxt_signer::sr25519::Keypair;
use subxt_signer::SecretUri;

/// Keypair that signs liquidations, plus its cached account id.
#[derive(Clone)]
pub struct Agent {
    keypair: Keypair,
    account: AccountId,
}

impl Agent {
    /// Derive the agent from a secret URI.
    pub fn from_seed(seed: &str) -> Result<Self, ChainError> {
        let uri =
            SecretUri::from_str(seed.trim()).map_err(|e| ChainError::InvalidSeed(e.to_string()))?;
        let keypair = Keypair::from_uri(&uri).map_err(|e| ChainError::InvalidSeed(e.to_string()))?;
        let account = keypair.public_key().to_account_id();
        Ok(Self { keypair, account })
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account
    }

    pub(crate) fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("account", &self.account.to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_seed_derives_known_account() {
        let agent = Agent::from_seed("//Alice").unwrap();
        assert_eq!(
            agent.account_id().to_string(),
            "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
        );
    }

    #[test]
    fn test_derivation_path_changes_account() {
        let alice = Agent::from_seed("//Alice").unwrap();
        let stash = Agent::from_seed("//Alice//stash").unwrap();
        assert_ne!(alice.account_id(), stash.account_id());
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let err = Agent::from_seed("not a valid mnemonic phrase").unwrap_err();
        assert!(matches!(err, ChainError::InvalidSeed(_)));
    }

    #[test]
    fn test_debug_hides_keypair() {
        let agent = Agent::from_seed("//Bob").unwrap();
        let rendered = format!("{agent:?}");
        assert!(rendered.contains("Agent"));
        assert!(!rendered.contains("keypair"));
    }
}

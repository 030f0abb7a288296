//! Transaction Verifier (`spec.md` §4.9). Built on the tagged
//! `VerboseTxOutput` sum type from `cashflow-types` (`spec.md` §9).

use crate::chain::ChainAdapter;
use crate::error::VerifyError;
use crate::keys;
use cashflow_types::{NftCapability, Sats, VerboseTxOutput};

pub struct PerCallVerification {
    pub verified: bool,
    pub amount_sats: Sats,
}

pub struct SubscriptionFundingVerification {
    pub verified: bool,
    pub amount_sats: Sats,
    pub commitment_hex: String,
}

/// Fetches the verbose tx and looks for any output paying the merchant's
/// locking bytecode at least `required_sats` (`spec.md` §4.9).
pub async fn verify_per_call(
    chain: &dyn ChainAdapter,
    txid: &str,
    merchant_address: &str,
    required_sats: Sats,
) -> Result<PerCallVerification, VerifyError> {
    let tx = chain.get_raw_tx(txid).await?;
    let expected_bytecode = keys::address_to_locking_bytecode(merchant_address)
        .map(hex::encode)
        .map_err(|_| VerifyError::NoMatchingOutput)?;

    for output in &tx.outputs {
        if output.locking_bytecode_hex().eq_ignore_ascii_case(&expected_bytecode)
            && output.value().as_u64() >= required_sats.as_u64()
        {
            return Ok(PerCallVerification {
                verified: true,
                amount_sats: output.value(),
            });
        }
    }
    Err(VerifyError::NoMatchingOutput)
}

/// Confirms the genesis/funding tx pays the contract's token address with
/// the expected category, a mutable NFT, and sufficient value
/// (`spec.md` §4.9).
pub async fn verify_subscription_funding(
    chain: &dyn ChainAdapter,
    txid: &str,
    contract_token_address: &str,
    expected_token_category: &str,
    min_funding_sats: Sats,
) -> Result<SubscriptionFundingVerification, VerifyError> {
    let tx = chain.get_raw_tx(txid).await?;
    let expected_bytecode = keys::address_to_locking_bytecode(contract_token_address)
        .map(hex::encode)
        .map_err(|_| VerifyError::NoMatchingOutput)?;

    let output = tx
        .outputs
        .iter()
        .find(|o| o.locking_bytecode_hex().eq_ignore_ascii_case(&expected_bytecode))
        .ok_or(VerifyError::NoMatchingOutput)?;

    let token_data = match output {
        VerboseTxOutput::Token { token_data, .. } => token_data,
        VerboseTxOutput::Plain { .. } => return Err(VerifyError::MissingTokenData),
    };

    if !token_data
        .category
        .eq_ignore_ascii_case(expected_token_category)
    {
        return Err(VerifyError::CategoryMismatch);
    }

    let nft = token_data.nft.as_ref().ok_or(VerifyError::MissingTokenData)?;
    if nft.capability != NftCapability::Mutable {
        return Err(VerifyError::NotMutableNft);
    }

    if output.value().as_u64() < min_funding_sats.as_u64() {
        return Err(VerifyError::InsufficientValue);
    }

    Ok(SubscriptionFundingVerification {
        verified: true,
        amount_sats: output.value(),
        commitment_hex: nft.commitment.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainAdapter;
    use cashflow_types::{NftData, TokenData, VerboseTx};

    fn locking_bytecode_hex(address: &str) -> String {
        hex::encode(keys::address_to_locking_bytecode(address).unwrap())
    }

    #[tokio::test]
    async fn per_call_matches_output_paying_merchant_at_least_the_required_sats() {
        let adapter = MockChainAdapter::new();
        let merchant = "bchtest:qpum00000000000000000000000000000shj478";
        adapter.insert_tx(VerboseTx {
            txid: "abc".into(),
            outputs: vec![VerboseTxOutput::Plain {
                locking_bytecode_hex: locking_bytecode_hex(merchant),
                value: Sats::new(100),
            }],
            confirmations: Some(0),
        });
        let result = verify_per_call(&adapter, "abc", merchant, Sats::new(100))
            .await
            .unwrap();
        assert!(result.verified);
        assert_eq!(result.amount_sats, Sats::new(100));
    }

    #[tokio::test]
    async fn subscription_funding_rejects_non_mutable_capability() {
        let adapter = MockChainAdapter::new();
        let contract = "bchtest:qpum00000000000000000000000000000shj478";
        adapter.insert_tx(VerboseTx {
            txid: "def".into(),
            outputs: vec![VerboseTxOutput::Token {
                locking_bytecode_hex: locking_bytecode_hex(contract),
                value: Sats::new(10_000),
                token_data: TokenData {
                    category: "cafe".repeat(8),
                    amount: None,
                    nft: Some(NftData {
                        capability: NftCapability::Minting,
                        commitment: "00".repeat(8),
                    }),
                },
            }],
            confirmations: Some(0),
        });
        let err = verify_subscription_funding(
            &adapter,
            "def",
            contract,
            &"cafe".repeat(8),
            Sats::new(1_000),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, VerifyError::NotMutableNft));
    }
}

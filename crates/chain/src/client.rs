//! Parachain client over a WebSocket RPC connection.
//!
//! Storage is read through dynamic addresses and SCALE-decoded into the
//! types in [`crate::types`]; the loans and oracle custom RPCs go through the
//! raw RPC client.

use crate::api::{LoansApi, TxStatusStream};
use crate::error::ChainError;
use crate::signer::Agent;
use crate::tx::{ExtrinsicEvent, LoansCall, TxStatusUpdate};
use crate::types::{
    AccountId, AssetMetadata, BorrowSnapshot, CurrencyId, Deposits, Market, Rate,
    ThresholdLiquidity, TimestampedValue,
};
use async_trait::async_trait;
use codec::{Decode, DecodeAll};
use futures::{stream, StreamExt};
use subxt::backend::legacy::LegacyRpcMethods;
use subxt::backend::rpc::{rpc_params, RpcClient};
use subxt::config::DefaultExtrinsicParamsBuilder;
use subxt::dynamic::{DecodedValueThunk, Value};
use subxt::tx::{TxProgress, TxStatus};
use subxt::{OnlineClient, PolkadotConfig};
use tracing::{debug, error, info, instrument};

type Api = OnlineClient<PolkadotConfig>;

/// Oracle data provider queried for prices.
const ORACLE_PROVIDER: &str = "Aggregated";

/// Connection to a parachain node exposing the loans pallet.
#[derive(Clone)]
pub struct ParachainClient {
    api: Api,
    rpc: RpcClient,
    legacy: LegacyRpcMethods<PolkadotConfig>,
    endpoint: String,
}

impl ParachainClient {
    /// Connect to `endpoint` and log the node identity.
    pub async fn connect(endpoint: &str) -> Result<Self, ChainError> {
        info!(endpoint = endpoint, "Connecting to parachain node");

        let rpc = RpcClient::from_url(endpoint).await?;
        let api = Api::from_rpc_client(rpc.clone()).await?;
        let legacy = LegacyRpcMethods::<PolkadotConfig>::new(rpc.clone());

        let (chain, name, version) = futures::try_join!(
            legacy.system_chain(),
            legacy.system_name(),
            legacy.system_version()
        )?;
        info!(
            chain = %chain,
            node = %name,
            version = %version,
            "Connected to chain"
        );

        Ok(Self {
            api,
            rpc,
            legacy,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch a storage value, or `None` when the entry is absent.
    async fn fetch_raw(
        &self,
        pallet: &'static str,
        entry: &'static str,
        keys: Vec<Value>,
    ) -> Result<Option<DecodedValueThunk>, ChainError> {
        let address = subxt::dynamic::storage(pallet, entry, keys);
        let value = self.api.storage().at_latest().await?.fetch(&address).await?;
        Ok(value)
    }

    /// Fetch and decode a value-query entry, falling back to its default.
    async fn fetch_or_default<T: Decode + Default>(
        &self,
        pallet: &'static str,
        entry: &'static str,
        keys: Vec<Value>,
        what: &'static str,
    ) -> Result<T, ChainError> {
        match self.fetch_raw(pallet, entry, keys).await? {
            Some(thunk) => decode_exact(thunk.encoded(), what),
            None => Ok(T::default()),
        }
    }
}

/// Trailing bytes are a layout mismatch, not a successful decode.
fn decode_exact<T: Decode>(mut bytes: &[u8], what: &'static str) -> Result<T, ChainError> {
    T::decode_all(&mut bytes).map_err(|e| ChainError::decode(what, e))
}

fn currency_key(currency: CurrencyId) -> Value {
    Value::u128(currency as u128)
}

fn account_key(account: &AccountId) -> Value {
    Value::from_bytes(account.0)
}

/// Trailing 4 bytes of a `Blake2_128Concat` map key holding a `CurrencyId`.
fn currency_from_key(key: &[u8]) -> Result<CurrencyId, ChainError> {
    let start = key
        .len()
        .checked_sub(4)
        .ok_or_else(|| ChainError::decode("market key", "key shorter than 4 bytes"))?;
    decode_exact(&key[start..], "market key")
}

/// Trailing 32 bytes of a double-map key whose second key is an account.
fn account_from_key(key: &[u8]) -> Result<AccountId, ChainError> {
    let start = key
        .len()
        .checked_sub(32)
        .ok_or_else(|| ChainError::decode("borrow key", "key shorter than 32 bytes"))?;
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&key[start..]);
    Ok(AccountId::from(raw))
}

fn call_payload(call: &LoansCall) -> subxt::tx::DynamicPayload {
    match call {
        LoansCall::LiquidateBorrow {
            borrower,
            liquidate_token,
            repay_amount,
            collateral_token,
        } => subxt::dynamic::tx(
            call.pallet(),
            call.call_name(),
            vec![
                account_key(borrower),
                currency_key(*liquidate_token),
                Value::u128(*repay_amount),
                currency_key(*collateral_token),
            ],
        ),
    }
}

/// Map one subxt status into a pipeline update; `None` for statuses the
/// lifecycle does not track (no-longer-in-best-block, broadcast peers).
async fn status_update(
    status: TxStatus<PolkadotConfig, Api>,
) -> Option<Result<TxStatusUpdate, ChainError>> {
    match status {
        TxStatus::Validated => Some(Ok(TxStatusUpdate::Ready)),
        TxStatus::InBestBlock(block) | TxStatus::InFinalizedBlock(block) => {
            let block_hash = format!("{:?}", block.block_hash());
            let update = block
                .fetch_events()
                .await
                .map_err(ChainError::from)
                .and_then(|events| {
                    events
                        .iter()
                        .map(|event| {
                            let event = event?;
                            Ok(classify_event(
                                event.pallet_name(),
                                event.variant_name(),
                                event.field_bytes(),
                            ))
                        })
                        .collect::<Result<Vec<_>, ChainError>>()
                })
                .map(|events| TxStatusUpdate::InBlock { block_hash, events });
            Some(update)
        }
        TxStatus::Error { message }
        | TxStatus::Invalid { message }
        | TxStatus::Dropped { message } => Some(Ok(TxStatusUpdate::Dropped { reason: message })),
        _ => None,
    }
}

fn classify_event(pallet: &str, variant: &str, fields: &[u8]) -> ExtrinsicEvent {
    match (pallet, variant) {
        ("System", "ExtrinsicSuccess") => ExtrinsicEvent::Success,
        ("System", "ExtrinsicFailed") => ExtrinsicEvent::Failed {
            payload: format!("0x{}", hex::encode(fields)),
        },
        _ => ExtrinsicEvent::Other {
            pallet: pallet.to_string(),
            variant: variant.to_string(),
        },
    }
}

fn status_stream(progress: TxProgress<PolkadotConfig, Api>) -> TxStatusStream {
    stream::unfold(progress, |mut progress| async move {
        loop {
            match progress.next().await? {
                Ok(status) => {
                    if let Some(update) = status_update(status).await {
                        return Some((update, progress));
                    }
                }
                Err(e) => return Some((Err(ChainError::from(e)), progress)),
            }
        }
    })
    .boxed()
}

#[async_trait]
impl LoansApi for ParachainClient {
    #[instrument(skip(self))]
    async fn markets(&self) -> Result<Vec<(CurrencyId, Market)>, ChainError> {
        let address = subxt::dynamic::storage("Loans", "Markets", ());
        let mut iter = self.api.storage().at_latest().await?.iter(address).await?;

        let mut markets = Vec::new();
        while let Some(kv) = iter.next().await {
            let kv = kv?;
            let currency = currency_from_key(&kv.key_bytes)?;
            let market: Market = decode_exact(kv.value.encoded(), "market").inspect_err(|e| {
                error!(currency, error = %e, "Market does not match the expected loans layout")
            })?;
            markets.push((currency, market));
        }
        // storage iteration order is hash order; keep a stable registry order
        markets.sort_by_key(|(currency, _)| *currency);

        debug!(count = markets.len(), "Markets fetched");
        Ok(markets)
    }

    #[instrument(skip(self))]
    async fn borrower_accounts(&self) -> Result<Vec<AccountId>, ChainError> {
        let address = subxt::dynamic::storage("Loans", "AccountBorrows", ());
        let mut iter = self.api.storage().at_latest().await?.iter(address).await?;

        let mut accounts = Vec::new();
        while let Some(kv) = iter.next().await {
            let kv = kv?;
            accounts.push(account_from_key(&kv.key_bytes)?);
        }

        debug!(count = accounts.len(), "Borrow snapshot keys fetched");
        Ok(accounts)
    }

    async fn account_deposits(
        &self,
        currency: CurrencyId,
        account: &AccountId,
    ) -> Result<Deposits, ChainError> {
        self.fetch_or_default(
            "Loans",
            "AccountDeposits",
            vec![currency_key(currency), account_key(account)],
            "deposits",
        )
        .await
    }

    async fn account_borrows(
        &self,
        currency: CurrencyId,
        account: &AccountId,
    ) -> Result<BorrowSnapshot, ChainError> {
        self.fetch_or_default(
            "Loans",
            "AccountBorrows",
            vec![currency_key(currency), account_key(account)],
            "borrow snapshot",
        )
        .await
    }

    async fn borrow_index(&self, currency: CurrencyId) -> Result<Rate, ChainError> {
        self.fetch_or_default(
            "Loans",
            "BorrowIndex",
            vec![currency_key(currency)],
            "borrow index",
        )
        .await
    }

    async fn exchange_rate(&self, currency: CurrencyId) -> Result<Rate, ChainError> {
        self.fetch_or_default(
            "Loans",
            "ExchangeRate",
            vec![currency_key(currency)],
            "exchange rate",
        )
        .await
    }

    async fn oracle_price(&self, currency: CurrencyId) -> Result<u128, ChainError> {
        let value: Option<TimestampedValue> = self
            .rpc
            .request("oracle_getValue", rpc_params![ORACLE_PROVIDER, currency])
            .await?;
        Ok(value.map(|v| v.value).unwrap_or_default())
    }

    async fn asset_decimals(&self, currency: CurrencyId) -> Result<u8, ChainError> {
        let metadata: AssetMetadata = self
            .fetch_or_default(
                "Assets",
                "Metadata",
                vec![currency_key(currency)],
                "asset metadata",
            )
            .await?;
        Ok(metadata.decimals)
    }

    async fn threshold_liquidity(
        &self,
        account: &AccountId,
    ) -> Result<ThresholdLiquidity, ChainError> {
        let at: Option<String> = None;
        let liquidity = self
            .rpc
            .request(
                "loans_getLiquidationThresholdLiquidity",
                rpc_params![account.to_string(), at],
            )
            .await?;
        Ok(liquidity)
    }

    async fn next_nonce(&self, account: &AccountId) -> Result<u64, ChainError> {
        Ok(self.legacy.system_account_next_index(account).await?)
    }

    #[instrument(skip(self, agent), fields(call = call.call_name()))]
    async fn submit(
        &self,
        call: LoansCall,
        agent: &Agent,
        nonce: u64,
    ) -> Result<TxStatusStream, ChainError> {
        let payload = call_payload(&call);
        let params = DefaultExtrinsicParamsBuilder::<PolkadotConfig>::new()
            .nonce(nonce)
            .build();
        let progress = self
            .api
            .tx()
            .sign_and_submit_then_watch(&payload, agent.keypair(), params)
            .await?;

        debug!(
            nonce = nonce,
            tx_hash = ?progress.extrinsic_hash(),
            "Extrinsic submitted"
        );
        Ok(status_stream(progress))
    }
}

impl std::fmt::Debug for ParachainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParachainClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::Encode;

    #[test]
    fn test_currency_from_market_key() {
        // prefix (32) + blake2_128 (16) + currency id
        let mut key = vec![0u8; 48];
        key.extend(100u32.encode());
        assert_eq!(currency_from_key(&key).unwrap(), 100);
    }

    #[test]
    fn test_account_from_borrow_key() {
        let mut key = vec![0u8; 32];
        key.extend([1u8; 16]);
        key.extend(5u32.encode());
        key.extend([2u8; 16]);
        key.extend([9u8; 32]);
        assert_eq!(account_from_key(&key).unwrap(), AccountId::from([9u8; 32]));
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            account_from_key(&[0u8; 10]),
            Err(ChainError::Decode { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        assert_eq!(decode_exact::<u32>(&[1, 0, 0, 0], "value").unwrap(), 1);
        assert!(matches!(
            decode_exact::<u32>(&[1, 0, 0, 0, 9], "value"),
            Err(ChainError::Decode { what: "value", .. })
        ));
    }

    #[test]
    fn test_classify_events() {
        assert_eq!(
            classify_event("System", "ExtrinsicSuccess", &[]),
            ExtrinsicEvent::Success
        );
        assert_eq!(
            classify_event("System", "ExtrinsicFailed", &[3, 6]),
            ExtrinsicEvent::Failed {
                payload: "0x0306".into()
            }
        );
        assert!(matches!(
            classify_event("Loans", "LiquidatedBorrow", &[]),
            ExtrinsicEvent::Other { .. }
        ));
    }

    #[tokio::test]
    #[ignore] // Requires a running node
    async fn test_connect_local_node() {
        let client = ParachainClient::connect("ws://127.0.0.1:9948").await.unwrap();
        let markets = client.markets().await.unwrap();
        assert!(!markets.is_empty());
    }
}

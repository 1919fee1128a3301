use alchemy_client::{AssetTransfersResult, JsonRpcResponse};
use rust_decimal::Decimal;
use std::str::FromStr;
use trade_core::{
    group_swap_candidates, EvmChain, RawTransfer, SwapClassifier, TradeDirection, ValidatedTransfer,
    ZERO_ADDRESS,
};

const WALLET: &str = "0x742d35cc6131b2f6e7f4c3b5e8a8c8d8f0b4c4e3";

fn load(body: &str) -> (Vec<RawTransfer>, Option<String>) {
    let response: JsonRpcResponse<AssetTransfersResult> = serde_json::from_str(body).unwrap();
    assert!(response.error.is_none());
    let result = response.result.unwrap();
    let page_key = result.page_key.clone();
    (
        result.transfers.into_iter().map(|t| t.into_raw()).collect(),
        page_key,
    )
}

fn validated(raw: Vec<RawTransfer>) -> Vec<ValidatedTransfer> {
    raw.into_iter()
        .map(|r| ValidatedTransfer::try_from_raw(r).unwrap())
        .collect()
}

#[test]
fn test_outgoing_page_maps_to_raw_transfers() {
    let (raw, page_key) = load(include_str!("fixtures/transfers_from_wallet.json"));
    assert!(page_key.is_none());
    assert_eq!(raw.len(), 1);

    let weth = &raw[0];
    assert_eq!(weth.asset_symbol.as_deref(), Some("WETH"));
    assert_eq!(weth.raw_value.as_deref(), Some("0xde0b6b3a7640000"));
    assert_eq!(weth.log_index, Some(5));
    assert_eq!(weth.block_number.as_deref(), Some("0x12a05f2"));

    let validated = ValidatedTransfer::try_from_raw(weth.clone()).unwrap();
    // Checksummed input comes out lower-cased
    assert_eq!(validated.from, WALLET);
    assert_eq!(validated.decimals, 18);
    assert_eq!(validated.normalized_amount().unwrap(), Decimal::ONE);
}

#[test]
fn test_incoming_page_handles_missing_symbol_and_precision() {
    let (raw, page_key) = load(include_str!("fixtures/transfers_to_wallet.json"));
    assert!(page_key.is_some());
    assert_eq!(raw.len(), 2);

    let transfers = validated(raw);
    assert_eq!(transfers[0].symbol, "USDC");
    assert_eq!(transfers[0].normalized_amount().unwrap(), Decimal::from(2500));

    let mint = &transfers[1];
    assert_eq!(mint.symbol, "UNKNOWN");
    assert_eq!(mint.decimals, 18);
    assert_eq!(mint.from, ZERO_ADDRESS);
    assert_eq!(mint.normalized_amount().unwrap(), Decimal::from(42));
}

#[test]
fn test_captured_swap_reconstructs_as_sell() {
    let (sent, _) = load(include_str!("fixtures/transfers_from_wallet.json"));
    let (received, _) = load(include_str!("fixtures/transfers_to_wallet.json"));

    let outcome = group_swap_candidates(WALLET, validated(sent), validated(received));
    // The mint-only transaction is one-sided and never a candidate
    assert_eq!(outcome.candidates.len(), 1);

    let trade = SwapClassifier::new(WALLET, EvmChain::Ethereum)
        .classify(&outcome.candidates[0])
        .unwrap()
        .unwrap();

    assert_eq!(trade.direction, TradeDirection::Sell);
    assert_eq!(trade.token_out.symbol, "WETH");
    assert_eq!(trade.token_in.symbol, "USDC");
    assert_eq!(trade.price, Some(Decimal::from_str("2500").unwrap()));
}

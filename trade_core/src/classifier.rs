use crate::chain::EvmChain;
use crate::grouping::TransferGroup;
use crate::transfer::{RawTransfer, ValidatedTransfer};
use crate::valuation::is_stablecoin;
use crate::{CanonicalTrade, Result, SwapError, TradeDirection, TradeLeg, ZERO_ADDRESS};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

/// A side's transfers below this share of the side's largest transfer are dust
const DUST_DIVISOR: u32 = 100;

/// Primary leg as seen by the direction rules
#[derive(Debug, Clone, PartialEq)]
pub struct LegView {
    pub symbol: String,
    pub amount: Decimal,
    pub is_native: bool,
    pub is_stablecoin: bool,
}

impl LegView {
    pub fn new(symbol: &str, amount: Decimal, chain: EvmChain) -> Self {
        Self {
            symbol: symbol.to_string(),
            amount,
            is_native: chain.is_native_symbol(symbol),
            is_stablecoin: is_stablecoin(symbol),
        }
    }
}

/// One rung of the direction ladder. `applies` receives `(incoming, outgoing)`.
pub struct DirectionRule {
    pub name: &'static str,
    pub applies: fn(&LegView, &LegView) -> bool,
    pub verdict: TradeDirection,
}

/// Evaluated in order, first match wins. The last rule always matches.
pub const DIRECTION_RULES: &[DirectionRule] = &[
    DirectionRule { name: "stablecoin_received", applies: stablecoin_received, verdict: TradeDirection::Sell },
    DirectionRule { name: "stablecoin_paid", applies: stablecoin_paid, verdict: TradeDirection::Buy },
    DirectionRule { name: "incoming_ratio", applies: incoming_dominates, verdict: TradeDirection::Buy },
    DirectionRule { name: "outgoing_ratio", applies: outgoing_dominates, verdict: TradeDirection::Sell },
    DirectionRule { name: "native_paid", applies: native_paid, verdict: TradeDirection::Buy },
    DirectionRule { name: "native_received", applies: native_received, verdict: TradeDirection::Sell },
    DirectionRule { name: "larger_incoming", applies: larger_incoming, verdict: TradeDirection::Buy },
    DirectionRule { name: "larger_outgoing", applies: larger_outgoing, verdict: TradeDirection::Sell },
    DirectionRule { name: "tie_default", applies: always, verdict: TradeDirection::Buy },
];

fn stablecoin_received(incoming: &LegView, outgoing: &LegView) -> bool {
    incoming.is_stablecoin && !outgoing.is_stablecoin
}

fn stablecoin_paid(incoming: &LegView, outgoing: &LegView) -> bool {
    outgoing.is_stablecoin && !incoming.is_stablecoin
}

fn incoming_dominates(incoming: &LegView, outgoing: &LegView) -> bool {
    exceeds_tenfold(incoming.amount, outgoing.amount)
}

fn outgoing_dominates(incoming: &LegView, outgoing: &LegView) -> bool {
    exceeds_tenfold(outgoing.amount, incoming.amount)
}

fn native_paid(incoming: &LegView, outgoing: &LegView) -> bool {
    outgoing.is_native && !incoming.is_native
}

fn native_received(incoming: &LegView, outgoing: &LegView) -> bool {
    incoming.is_native && !outgoing.is_native
}

fn larger_incoming(incoming: &LegView, outgoing: &LegView) -> bool {
    incoming.amount > outgoing.amount
}

fn larger_outgoing(incoming: &LegView, outgoing: &LegView) -> bool {
    outgoing.amount > incoming.amount
}

fn always(_: &LegView, _: &LegView) -> bool {
    true
}

/// `a / b > 10` without dividing; a zero `b` with positive `a` counts as dominating
fn exceeds_tenfold(a: Decimal, b: Decimal) -> bool {
    b.checked_mul(Decimal::TEN).map_or(false, |scaled| a > scaled)
}

/// Run the ladder, returning the verdict and the name of the rule that fired
pub fn classify_direction(incoming: &LegView, outgoing: &LegView) -> (TradeDirection, &'static str) {
    DIRECTION_RULES
        .iter()
        .find(|rule| (rule.applies)(incoming, outgoing))
        .map(|rule| (rule.verdict, rule.name))
        .unwrap_or((TradeDirection::Buy, "tie_default"))
}

/// `counter / display` when both are positive
pub fn compute_price(counter_amount: Decimal, display_amount: Decimal) -> Option<Decimal> {
    if counter_amount > Decimal::ZERO && display_amount > Decimal::ZERO {
        counter_amount.checked_div(display_amount)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
struct Measured<'a> {
    transfer: &'a ValidatedTransfer,
    amount: Decimal,
}

/// Drop entries below 1% of the side's maximum; returns survivors and the drop count
fn drop_dust(side: Vec<Measured<'_>>) -> (Vec<Measured<'_>>, usize) {
    let max = side.iter().map(|m| m.amount).max().unwrap_or(Decimal::ZERO);
    let threshold = max / Decimal::from(DUST_DIVISOR);
    let before = side.len();
    let kept: Vec<Measured<'_>> = side.into_iter().filter(|m| m.amount >= threshold).collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Largest survivor; the first one wins on equal amounts
fn primary<'s, 'a>(side: &'s [Measured<'a>]) -> Option<&'s Measured<'a>> {
    let mut best: Option<&'s Measured<'a>> = None;
    for candidate in side {
        if best.map_or(true, |current| candidate.amount > current.amount) {
            best = Some(candidate);
        }
    }
    best
}

fn to_leg(measured: &Measured<'_>) -> TradeLeg {
    TradeLeg {
        address: measured.transfer.token_address.clone(),
        symbol: measured.transfer.symbol.clone(),
        decimals: measured.transfer.decimals,
        normalized_amount: measured.amount,
    }
}

fn leg_summary(side: &[Measured<'_>]) -> Vec<serde_json::Value> {
    side.iter()
        .map(|m| json!({ "symbol": m.transfer.symbol, "amount": m.amount.to_string() }))
        .collect()
}

/// Turns one transaction's transfers into at most one canonical trade
#[derive(Debug, Clone)]
pub struct SwapClassifier {
    wallet: String,
    chain: EvmChain,
}

impl SwapClassifier {
    pub fn new(wallet: &str, chain: EvmChain) -> Self {
        Self {
            wallet: wallet.trim().to_lowercase(),
            chain,
        }
    }

    /// `Ok(None)` means the group is not a swap for this wallet, which is not an error.
    /// The returned trade carries no USD fields yet.
    pub fn classify(&self, group: &TransferGroup) -> Result<Option<CanonicalTrade>> {
        let live: Vec<&ValidatedTransfer> = group
            .transfers
            .iter()
            .filter(|t| !t.touches_zero_address())
            .collect();

        let outgoing: Vec<&ValidatedTransfer> =
            live.iter().copied().filter(|t| t.is_sent_by(&self.wallet)).collect();
        let mut incoming: Vec<&ValidatedTransfer> =
            live.iter().copied().filter(|t| t.is_received_by(&self.wallet)).collect();

        // Bot/proxy settlement: the wallet pays an intermediary which then receives
        // the bought asset on the wallet's behalf.
        let mut settled_by_proxy = false;
        if incoming.is_empty() && !outgoing.is_empty() {
            let interacted: HashSet<&str> = outgoing
                .iter()
                .map(|t| t.to.as_str())
                .filter(|to| *to != self.wallet && *to != ZERO_ADDRESS)
                .collect();
            incoming = live
                .iter()
                .copied()
                .filter(|t| interacted.contains(t.to.as_str()) && !t.is_sent_by(&self.wallet))
                .collect();
            settled_by_proxy = !incoming.is_empty();
        }

        if incoming.is_empty() || outgoing.is_empty() {
            debug!(
                "Tx {} has {} incoming / {} outgoing transfers after filtering, not a swap",
                group.tx_hash,
                incoming.len(),
                outgoing.len()
            );
            return Ok(None);
        }

        let incoming = measure(&incoming)?;
        let outgoing = measure(&outgoing)?;
        let (incoming, incoming_dust) = drop_dust(incoming);
        let (outgoing, outgoing_dust) = drop_dust(outgoing);

        let (Some(primary_in), Some(primary_out)) = (primary(&incoming), primary(&outgoing)) else {
            return Ok(None);
        };

        let in_view = LegView::new(&primary_in.transfer.symbol, primary_in.amount, self.chain);
        let out_view = LegView::new(&primary_out.transfer.symbol, primary_out.amount, self.chain);
        let (direction, rule) = classify_direction(&in_view, &out_view);

        let token_in = to_leg(primary_in);
        let token_out = to_leg(primary_out);
        let (display_leg, counter_leg) = match direction {
            TradeDirection::Buy => (&token_in, &token_out),
            TradeDirection::Sell => (&token_out, &token_in),
        };
        let price = compute_price(counter_leg.normalized_amount, display_leg.normalized_amount);

        let timestamp = group.block_timestamp().ok_or_else(|| {
            SwapError::InvalidTransfer(format!("tx {} has no transfers", group.tx_hash))
        })?;

        debug!(
            "Tx {}: {} {} {} for {} {} (rule {}, price {:?})",
            group.tx_hash,
            direction,
            display_leg.normalized_amount,
            display_leg.symbol,
            counter_leg.normalized_amount,
            counter_leg.symbol,
            rule,
            price
        );

        let source_transfers: Vec<&RawTransfer> = group.transfers.iter().map(|t| &t.raw).collect();
        let raw_payload = json!({
            "transfers": source_transfers,
            "classification": {
                "rule": rule,
                "settled_by_proxy": settled_by_proxy,
                "dust_dropped": { "incoming": incoming_dust, "outgoing": outgoing_dust },
                "incoming_legs": leg_summary(&incoming),
                "outgoing_legs": leg_summary(&outgoing),
            },
        });

        Ok(Some(CanonicalTrade {
            wallet_address: self.wallet.clone(),
            chain: self.chain,
            tx_hash: group.tx_hash.clone(),
            tx_index: None,
            direction,
            token_in,
            token_out,
            price,
            native_price_usd: None,
            usd_price_per_token: None,
            usd_value: None,
            timestamp,
            raw_payload,
        }))
    }
}

fn measure<'a>(side: &[&'a ValidatedTransfer]) -> Result<Vec<Measured<'a>>> {
    side.iter()
        .map(|&transfer| {
            transfer
                .normalized_amount()
                .map(|amount| Measured { transfer, amount })
        })
        .collect()
}

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Blocks re-scanned below the stored cursor to absorb upstream indexing lag
pub const SAFETY_MARGIN_BLOCKS: u64 = 5;

/// Stored cursor values that mean "never synced"
const UNSET_CURSORS: [&str; 2] = ["0", "0x0"];

/// Closed block window `[from_block, to_block]` scanned by one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockRange {
    /// `from = cursor - margin` (floored at 0) when a cursor exists, otherwise the
    /// chain's launch floor or 0. `to` is always the freshly fetched chain tip.
    pub fn resolve(cursor: Option<u64>, launch_floor: Option<u64>, chain_tip: u64, safety_margin: u64) -> Self {
        let from_block = match cursor {
            Some(block) => block.saturating_sub(safety_margin),
            None => launch_floor.unwrap_or(0),
        };
        Self {
            from_block,
            to_block: chain_tip,
        }
    }

    /// Nothing to fetch; the cycle short-circuits but still advances the cursor
    pub fn is_empty(&self) -> bool {
        self.from_block >= self.to_block
    }
}

/// Parse a stored cursor. Sentinels, blanks and garbage all mean "no cursor".
pub fn parse_cursor(cursor: Option<&str>) -> Option<u64> {
    let cursor = cursor?.trim();
    if cursor.is_empty() || UNSET_CURSORS.contains(&cursor) {
        return None;
    }

    let parsed = match cursor.strip_prefix("0x").or_else(|| cursor.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => cursor.parse::<u64>().ok(),
    };

    if parsed.is_none() {
        warn!("Ignoring unparseable sync cursor '{}'", cursor);
    }
    parsed
}

/// Hex encoding used for stored cursors
pub fn format_cursor(block: u64) -> String {
    format!("{:#x}", block)
}

/// Cursor after a successful cycle: the range's upper bound, never below the previous cursor
pub fn next_cursor(previous: Option<u64>, range: &BlockRange) -> u64 {
    previous.map_or(range.to_block, |prev| prev.max(range.to_block))
}

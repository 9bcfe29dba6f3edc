//! Item identity, zero-value detection and kind/direction filtering.

use crate::chains::ChainConfig;
use crate::models::{Direction, DirectionFilter, HistoryItem, HistoryPage, KindFilter};

/// Composite identity of a history item.
///
/// `tx_hash` alone is not enough: one transaction can move several assets for the same wallet
/// (both legs of a swap), and each leg must survive deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemIdentity<'a> {
    pub tx_hash: &'a str,
    pub asset_symbol: &'a str,
    pub direction: Direction,
    pub value_raw: &'a str,
    pub timestamp_sec: i64,
}

impl HistoryItem {
    pub fn identity(&self) -> ItemIdentity<'_> {
        ItemIdentity {
            tx_hash: &self.tx_hash,
            asset_symbol: &self.asset_symbol,
            direction: self.direction,
            value_raw: &self.value_raw,
            timestamp_sec: self.timestamp_sec,
        }
    }
}

/// True when `raw` is an integer amount equal to zero.
///
/// Accepts decimal strings and `0x`-prefixed hex. Anything that does not parse as an integer
/// is not considered zero.
pub fn is_zero_value(raw: &str) -> bool {
    let raw = raw.trim();
    let digits = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => {
            if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return false;
            }
            hex
        }
        None => {
            let unsigned = raw.strip_prefix(['+', '-']).unwrap_or(raw);
            if unsigned.is_empty() || !unsigned.chars().all(|c| c.is_ascii_digit()) {
                return false;
            }
            unsigned
        }
    };
    digits.chars().all(|c| c == '0')
}

/// Drops items whose raw amount is zero (bare approvals and other non-transfers).
pub fn drop_zero_value(items: Vec<HistoryItem>) -> Vec<HistoryItem> {
    items
        .into_iter()
        .filter(|item| !is_zero_value(&item.value_raw))
        .collect()
}

pub fn matches_kind(chain: &ChainConfig, item: &HistoryItem, kind: KindFilter) -> bool {
    match kind {
        KindFilter::All => true,
        KindFilter::Native => chain.is_native_symbol(&item.asset_symbol),
        KindFilter::Token => !chain.is_native_symbol(&item.asset_symbol),
    }
}

pub fn matches_direction(item: &HistoryItem, direction: DirectionFilter) -> bool {
    match direction {
        DirectionFilter::All => true,
        DirectionFilter::In => item.direction == Direction::In,
        DirectionFilter::Out => item.direction == Direction::Out,
    }
}

pub fn filter_items<'a>(
    chain: &'a ChainConfig,
    items: &'a [HistoryItem],
    kind: KindFilter,
    direction: DirectionFilter,
) -> impl Iterator<Item = &'a HistoryItem> + 'a {
    items
        .iter()
        .filter(move |item| matches_kind(chain, item, kind) && matches_direction(item, direction))
}

/// Slices `[offset, offset + limit)` out of an already filtered, complete-as-known sequence.
///
/// `next_offset` is set only when the sequence holds items past the page, or when the caller
/// knows the sequence was truncated (`source_has_more`) and the page came back full.
pub fn page_from_items(
    filtered: Vec<HistoryItem>,
    offset: usize,
    limit: usize,
    source_has_more: bool,
) -> HistoryPage {
    let end = offset.saturating_add(limit);
    let has_more_known = filtered.len() > end;
    let items: Vec<HistoryItem> = filtered.into_iter().skip(offset).take(limit).collect();
    let full_page = items.len() == limit;

    let next_offset = (has_more_known || (source_has_more && full_page)).then_some(end);
    HistoryPage { items, next_offset }
}

#[cfg(test)]
mod tests {
    use crate::chains::chain_by_key;

    use super::*;

    fn item(hash: &str, ts: i64, symbol: &str, direction: Direction, value: &str) -> HistoryItem {
        HistoryItem {
            tx_hash: hash.into(),
            timestamp_sec: ts,
            from: "0xfrom".into(),
            to: "0xto".into(),
            value_raw: value.into(),
            is_error: false,
            asset_symbol: symbol.into(),
            asset_decimals: 18,
            direction,
            tx_link: String::new(),
        }
    }

    #[test]
    fn zero_value_detection() {
        assert!(is_zero_value("0"));
        assert!(is_zero_value("000"));
        assert!(is_zero_value(" 0 "));
        assert!(is_zero_value("0x0"));
        assert!(is_zero_value("0x0000"));
        assert!(!is_zero_value("1"));
        assert!(!is_zero_value("1000000000000000000000000000000"));
        assert!(!is_zero_value("0x1"));
        assert!(!is_zero_value(""));
        assert!(!is_zero_value("0.0"));
        assert!(!is_zero_value("abc"));
    }

    #[test]
    fn drop_zero_value_keeps_transfers() {
        let items = vec![
            item("0x1", 1, "ETH", Direction::In, "0"),
            item("0x2", 2, "ETH", Direction::In, "5"),
        ];
        let kept = drop_zero_value(items);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].tx_hash, "0x2");
    }

    #[test]
    fn swap_legs_have_distinct_identities() {
        let sold = item("0xswap", 10, "USDC", Direction::Out, "100");
        let bought = item("0xswap", 10, "ETH", Direction::In, "1");
        assert_ne!(sold.identity(), bought.identity());
        assert_eq!(sold.identity(), sold.clone().identity());
    }

    #[test]
    fn kind_filter_uses_native_symbols() {
        let eth = chain_by_key("eth").unwrap();
        let native = item("0x1", 1, "eth", Direction::In, "1");
        let token = item("0x2", 1, "USDT", Direction::In, "1");

        assert!(matches_kind(eth, &native, KindFilter::Native));
        assert!(!matches_kind(eth, &token, KindFilter::Native));
        assert!(matches_kind(eth, &token, KindFilter::Token));
        assert!(matches_kind(eth, &token, KindFilter::All));
    }

    #[test]
    fn direction_filter() {
        let incoming = item("0x1", 1, "ETH", Direction::In, "1");
        let unknown = item("0x2", 1, "ETH", Direction::Unknown, "1");

        assert!(matches_direction(&incoming, DirectionFilter::In));
        assert!(!matches_direction(&incoming, DirectionFilter::Out));
        assert!(!matches_direction(&unknown, DirectionFilter::In));
        assert!(matches_direction(&unknown, DirectionFilter::All));
    }

    #[test]
    fn page_infers_next_offset_from_remaining_items() {
        let items: Vec<HistoryItem> = (0..5)
            .map(|i| item(&format!("0x{i}"), 100 - i, "ETH", Direction::In, "1"))
            .collect();

        let first = page_from_items(items.clone(), 0, 2, false);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_offset, Some(2));

        let last = page_from_items(items.clone(), 4, 2, false);
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.next_offset, None);

        let exact = page_from_items(items, 3, 2, false);
        assert_eq!(exact.items.len(), 2);
        assert_eq!(exact.next_offset, None, "no item known past the page");
    }

    #[test]
    fn page_trusts_truncated_source_only_when_full() {
        let items: Vec<HistoryItem> = (0..4)
            .map(|i| item(&format!("0x{i}"), 100 - i, "ETH", Direction::In, "1"))
            .collect();

        assert_eq!(page_from_items(items.clone(), 2, 2, true).next_offset, Some(4));
        assert_eq!(page_from_items(items, 3, 2, true).next_offset, None);
    }

    #[test]
    fn page_past_end_is_empty() {
        let items = vec![item("0x1", 1, "ETH", Direction::In, "1")];
        let page = page_from_items(items, 10, 5, true);
        assert!(page.items.is_empty());
        assert_eq!(page.next_offset, None);
    }
}

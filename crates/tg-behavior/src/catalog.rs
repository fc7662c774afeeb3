use tg_schemas::{BehaviorInfo, TagScope};

/// Static description of one behavior code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub code: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    /// `outcome` or `behavior`.
    pub category: &'static str,
    pub is_positive: bool,
    pub scope: TagScope,
}

const fn entry(
    code: &'static str,
    label: &'static str,
    description: &'static str,
    category: &'static str,
    is_positive: bool,
    scope: TagScope,
) -> CatalogEntry {
    CatalogEntry {
        code,
        label,
        description,
        category,
        is_positive,
        scope,
    }
}

pub const CATALOG: &[CatalogEntry] = &[
    // trade scope
    entry(
        "outcome_win",
        "Win",
        "Realized PnL above the $1 tolerance.",
        "outcome",
        true,
        TagScope::Trade,
    ),
    entry(
        "outcome_loss",
        "Loss",
        "Realized PnL below the -$1 tolerance.",
        "outcome",
        false,
        TagScope::Trade,
    ),
    entry(
        "outcome_breakeven",
        "Breakeven",
        "Realized PnL within $1 of zero.",
        "outcome",
        false,
        TagScope::Trade,
    ),
    entry(
        "large_win",
        "Large Win",
        "Top-decile win for this trader.",
        "behavior",
        true,
        TagScope::Trade,
    ),
    entry(
        "large_loss",
        "Large Loss",
        "Worst-decile loss for this trader.",
        "behavior",
        false,
        TagScope::Trade,
    ),
    entry(
        "revenge_immediate",
        "Revenge Trade",
        "Re-entry right after a losing trade on the same day.",
        "behavior",
        false,
        TagScope::Trade,
    ),
    entry(
        "size_inconsistency",
        "Size Inconsistency",
        "Notional at least 2 robust sigma above the trader's median.",
        "behavior",
        false,
        TagScope::Trade,
    ),
    entry(
        "follow_through_win_immediate",
        "Follow Through Win",
        "Next trade right after a win on the same day.",
        "behavior",
        true,
        TagScope::Trade,
    ),
    entry(
        "disciplined_after_loss_immediate",
        "Disciplined After Loss",
        "Re-entry after a loss without sizing up.",
        "behavior",
        true,
        TagScope::Trade,
    ),
    entry(
        "consistent_size",
        "Consistent Size",
        "Notional within 0.5 robust sigma of the median.",
        "behavior",
        true,
        TagScope::Trade,
    ),
    // day scope
    entry(
        "overtrading_day",
        "Overtrading Day",
        "Five or more trades in one day.",
        "behavior",
        false,
        TagScope::Day,
    ),
    entry(
        "revenge_day",
        "Revenge Day",
        "Loss-anchored high-activity day.",
        "behavior",
        false,
        TagScope::Day,
    ),
    entry(
        "chop_day",
        "Chop Day",
        "High activity with a flat day PnL.",
        "behavior",
        false,
        TagScope::Day,
    ),
    entry(
        "ticker_bias_lifetime",
        "Ticker Bias (Lifetime)",
        "Ticker with a negative lifetime expectancy.",
        "behavior",
        false,
        TagScope::Day,
    ),
    entry(
        "ticker_bias_recent",
        "Ticker Bias (Recent)",
        "Ticker whose last five trades lose on average.",
        "behavior",
        false,
        TagScope::Day,
    ),
    entry(
        "focused_day",
        "Focused Day",
        "Trading concentrated on a single ticker.",
        "behavior",
        true,
        TagScope::Day,
    ),
    entry(
        "green_day_low_activity",
        "Green Day Low Activity",
        "Profitable day with at most two trades.",
        "behavior",
        true,
        TagScope::Day,
    ),
];

pub fn lookup(code: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.code == code)
}

/// Catalog entry in the shape served next to stored tags.
pub fn behavior_info(code: &str) -> Option<BehaviorInfo> {
    lookup(code).map(|e| BehaviorInfo {
        code: e.code.to_string(),
        label: e.label.to_string(),
        description: Some(e.description.to_string()),
        category: e.category.to_string(),
        is_positive: e.is_positive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique() {
        let codes: HashSet<&str> = CATALOG.iter().map(|e| e.code).collect();
        assert_eq!(codes.len(), CATALOG.len());
        assert_eq!(CATALOG.len(), 17);
    }

    #[test]
    fn lookup_and_info() {
        let e = lookup("revenge_immediate").unwrap();
        assert_eq!(e.label, "Revenge Trade");
        assert!(!e.is_positive);

        let info = behavior_info("focused_day").unwrap();
        assert_eq!(info.category, "behavior");
        assert!(info.is_positive);

        assert!(lookup("nope").is_none());
    }
}

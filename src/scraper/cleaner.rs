use crate::models::{AuctionRecord, AuctionResult, AustralianState, RawListing, Source, SuburbContext};
use chrono::NaiveDate;
use tracing::debug;

pub const DEFAULT_PROPERTY_TYPE: &str = "House";

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Parse a dollar amount into whole dollars. Cents are dropped.
/// "$1,250,000" → 1250000 | "$1.25m" → 1250000 | "$850k" → 850000
pub fn parse_price(s: &str) -> Option<i64> {
    let s = s.trim().to_lowercase().replace([',', '$', ' '], "");
    if s.is_empty() || s == "n/a" || s == "-" || s.contains("undisclosed") {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("million") {
        (n, 1_000_000.0)
    } else if let Some(n) = s.strip_suffix("mil") {
        (n, 1_000_000.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 1_000_000.0)
    } else if let Some(n) = s.strip_suffix('k') {
        (n, 1_000.0)
    } else {
        // Plain amount: keep whole dollars only
        let whole = s.split('.').next().unwrap_or("");
        let cleaned: String = whole.chars().filter(|c| c.is_ascii_digit()).collect();
        return cleaned.parse().ok().filter(|p: &i64| *p > 0);
    };

    let num: f64 = num_str.trim().parse().ok()?;
    let value = (num * multiplier).round() as i64;
    (value > 0).then_some(value)
}

/// Map a result keyword to the closed result set.
///
/// No keyword with a positive price is read as a sale: the result pages
/// only print a price for sold lots. No keyword and no price falls back to
/// passed in.
pub fn normalise_result(keyword: Option<&str>, price: Option<i64>) -> AuctionResult {
    let kw = keyword.map(|k| k.trim().to_lowercase()).unwrap_or_default();

    if kw.contains("sold") {
        AuctionResult::Sold
    } else if kw.contains("withdrawn") || kw.contains("cancelled") {
        AuctionResult::Withdrawn
    } else if kw.contains("pass") {
        AuctionResult::PassedIn
    } else if price.is_some_and(|p| p > 0) {
        AuctionResult::Sold
    } else {
        AuctionResult::PassedIn
    }
}

/// "st kilda EAST" → "St Kilda East", "bald-hills" → "Bald-Hills"
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            word.split('-')
                .map(|part| {
                    let mut chars = part.chars();
                    match chars.next() {
                        Some(first) => {
                            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                        }
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_state(s: &str) -> Option<AustralianState> {
    s.parse().ok()
}

/// Parse dates: ISO first, then the formats the result pages print.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d/%m/%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d %b %Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d %B %Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%a %d %b %Y") {
        return Some(d);
    }

    None
}

/// Collapse inner whitespace and strip trailing separators.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ',' || c == '|' || c == '-' || c.is_whitespace())
        .to_string()
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| clean_text(&v)).filter(|v| !v.is_empty())
}

// ── RawListing → AuctionRecord ────────────────────────────────────────────────

/// Turn extracted fields into a canonical record. Returns `None` when the
/// address is missing or the state cannot be determined.
pub fn to_auction_record(
    raw: RawListing,
    ctx: &SuburbContext,
    auction_date: NaiveDate,
    source: Source,
) -> Option<AuctionRecord> {
    let address = non_empty(raw.address)?;

    let state = ctx
        .state
        .or_else(|| raw.state.as_deref().and_then(parse_state));
    let Some(state) = state else {
        debug!("Dropping {:?}: no state in page context or text", address);
        return None;
    };

    let price = if raw.price_undisclosed {
        None
    } else {
        raw.price.as_deref().and_then(parse_price)
    };
    let result = normalise_result(raw.result.as_deref(), price);

    // Prices on passed-in / withdrawn lots are vendor bids or guides
    let price = match result {
        AuctionResult::Sold => price,
        _ => None,
    };

    let suburb = ctx
        .suburb
        .as_deref()
        .map(title_case)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let postcode = ctx
        .postcode
        .clone()
        .or(raw.postcode)
        .unwrap_or_default();

    let property_type = raw
        .property_type
        .as_deref()
        .map(title_case)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_PROPERTY_TYPE.to_string());

    Some(AuctionRecord {
        address,
        suburb,
        state,
        postcode,
        price,
        result,
        auction_date,
        source,
        property_type,
        bedrooms: raw.bedrooms,
        bathrooms: raw.bathrooms,
        car_spaces: raw.car_spaces,
        agent_name: non_empty(raw.agent_name),
        agency_name: non_empty(raw.agency_name),
        listing_url: raw.listing_url,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn sydney() -> SuburbContext {
        SuburbContext {
            suburb: Some("surry hills".into()),
            state: Some(AustralianState::Nsw),
            postcode: Some("2010".into()),
        }
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$1,250,000"), Some(1_250_000));
        assert_eq!(parse_price("$1,250,000.00"), Some(1_250_000));
        assert_eq!(parse_price("$1.25m"), Some(1_250_000));
        assert_eq!(parse_price("$850k"), Some(850_000));
        assert_eq!(parse_price("$2.1 million"), Some(2_100_000));
        assert_eq!(parse_price("Undisclosed"), None);
        assert_eq!(parse_price("$0"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_normalise_result() {
        assert_eq!(normalise_result(Some("Sold"), None), AuctionResult::Sold);
        assert_eq!(normalise_result(Some("passed"), Some(900_000)), AuctionResult::PassedIn);
        assert_eq!(normalise_result(Some("cancelled"), None), AuctionResult::Withdrawn);
        assert_eq!(normalise_result(Some("WITHDRAWN"), None), AuctionResult::Withdrawn);
        assert_eq!(normalise_result(None, None), AuctionResult::PassedIn);
        assert_eq!(normalise_result(Some(""), Some(1_250_000)), AuctionResult::Sold);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("st kilda EAST"), "St Kilda East");
        assert_eq!(title_case("  paddington "), "Paddington");
        assert_eq!(title_case("bald-hills"), "Bald-Hills");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-01-15"), Some(date()));
        assert_eq!(parse_date("15/01/2024"), Some(date()));
        assert_eq!(parse_date("15 Jan 2024"), Some(date()));
        assert_eq!(parse_date("Sat 13 Jan 2024"), NaiveDate::from_ymd_opt(2024, 1, 13));
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn test_implicit_sale_from_price() {
        let raw = RawListing {
            address: Some("12 George St".into()),
            price: Some("$1,250,000".into()),
            result: None,
            ..Default::default()
        };
        let rec = to_auction_record(raw, &sydney(), date(), Source::Domain).unwrap();
        assert_eq!(rec.result, AuctionResult::Sold);
        assert_eq!(rec.price, Some(1_250_000));
        assert_eq!(rec.suburb, "Surry Hills");
        assert_eq!(rec.property_type, "House");
    }

    #[test]
    fn test_undisclosed_sale_has_no_price() {
        let raw = RawListing {
            address: Some("3/8 Crown Street".into()),
            price: Some("$1,100,000".into()),
            result: Some("sold".into()),
            price_undisclosed: true,
            ..Default::default()
        };
        let rec = to_auction_record(raw, &sydney(), date(), Source::Rea).unwrap();
        assert_eq!(rec.result, AuctionResult::Sold);
        assert_eq!(rec.price, None);
    }

    #[test]
    fn test_passed_in_drops_bid_price() {
        let raw = RawListing {
            address: Some("7 Bourke Road".into()),
            price: Some("$990,000".into()),
            result: Some("passed".into()),
            ..Default::default()
        };
        let rec = to_auction_record(raw, &sydney(), date(), Source::Domain).unwrap();
        assert_eq!(rec.result, AuctionResult::PassedIn);
        assert_eq!(rec.price, None);
    }

    #[test]
    fn test_missing_address_or_state_drops_record() {
        let no_addr = RawListing { price: Some("$1".into()), ..Default::default() };
        assert!(to_auction_record(no_addr, &sydney(), date(), Source::Domain).is_none());

        let no_state = RawListing { address: Some("1 Main St".into()), ..Default::default() };
        assert!(to_auction_record(no_state, &SuburbContext::default(), date(), Source::Domain).is_none());

        let state_in_text = RawListing {
            address: Some("1 Main St".into()),
            state: Some("QLD".into()),
            postcode: Some("4000".into()),
            ..Default::default()
        };
        let rec = to_auction_record(state_in_text, &SuburbContext::default(), date(), Source::Domain).unwrap();
        assert_eq!(rec.state, AustralianState::Qld);
        assert_eq!(rec.postcode, "4000");
        assert_eq!(rec.suburb, "Unknown");
    }
}

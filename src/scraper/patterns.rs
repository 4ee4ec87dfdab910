//! Text patterns shared by the container locator and the field extractor.
//!
//! Update these when the result pages change their wording.

use regex::Regex;
use std::sync::LazyLock;

/// Street suffixes accepted as the end of an address line.
const STREET_SUFFIXES: &str = "street|st|road|rd|avenue|ave|drive|dr|lane|ln|court|ct|place|pl|way|crescent|cres|parade|pde|boulevard|blvd|terrace|tce|close|cl|highway|hwy|grove|gr|circuit|cct|esplanade|esp";

/// `<number> ... <street suffix>` on a single line.
pub static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\d+.*\b({})\b", STREET_SUFFIXES)).unwrap()
});

/// Stricter form used to validate text from address selectors.
pub static ADDRESS_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d").unwrap());

/// Dollar amount, with optional cents or k/m shorthand.
pub static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s?\d[\d,]*(?:\.\d+)?(?:\s?(?:million|mil|m|k)\b)?").unwrap()
});

pub static PRICE_SIGNAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[\d,]+").unwrap());

pub static UNDISCLOSED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bundisclosed\b").unwrap());

pub static POSTCODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{4}\b").unwrap());

pub static STATE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(NSW|VIC|QLD|WA|SA|TAS|ACT|NT)\b").unwrap());

/// Locator signal: sold / passed / withdrawn.
pub static RESULT_SIGNAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(sold|passed|withdrawn)\b").unwrap());

/// Extractor keyword: the signal words plus "cancelled".
pub static RESULT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(sold|passed|withdrawn|cancelled)\b").unwrap());

pub static FEATURE_SIGNAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d+\s*(bed|bath|car)").unwrap());

pub static BEDROOMS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*bed").unwrap());
pub static BATHROOMS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*bath").unwrap());
pub static CAR_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*car").unwrap());

pub static PROPERTY_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(house|apartment|unit|townhouse|villa|duplex)\b").unwrap()
});

pub static PERSON_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]+ [A-Z][a-z]+$").unwrap());

/// Result and price wording that can look like "First Last".
pub static STATUS_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(sold|passed|withdrawn|cancelled|undisclosed|withheld|prior|auction|price)\b").unwrap()
});

pub static AGENCY_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(real estate|realty|properties|property|group|ltd|pty)\b").unwrap()
});

/// Suburb link text with a trailing postcode: "Surry Hills 2010".
pub static SUBURB_LINK_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<suburb>[A-Za-z][A-Za-z' -]*?),?\s+(?P<postcode>\d{4})$").unwrap()
});

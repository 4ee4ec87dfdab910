//! Field extractor: one best-effort `RawListing` per candidate container.
//!
//! Each field is an independent pass over the container. A miss leaves the
//! field empty; only the address is required later on.

use scraper::{ElementRef, Selector};
use std::sync::LazyLock;

use super::cleaner::clean_text;
use super::locator::Candidate;
use super::patterns;
use super::sites::SiteProfile;
use crate::models::RawListing;

static ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Addresses outside this length range are treated as missing.
const ADDRESS_CHARS: std::ops::Range<usize> = 6..200;

pub fn extract_listing(profile: &SiteProfile, candidate: &Candidate<'_>) -> RawListing {
    let text = candidate.text.as_str();
    let el = candidate.element;

    RawListing {
        address: extract_address(profile, el, text),
        price: extract_price(text),
        result: extract_result(text),
        property_type: extract_property_type(text),
        bedrooms: extract_count(&patterns::BEDROOMS, text),
        bathrooms: extract_count(&patterns::BATHROOMS, text),
        car_spaces: extract_count(&patterns::CAR_SPACES, text),
        agent_name: extract_agent(profile, el, text),
        agency_name: extract_agency(profile, el, text),
        listing_url: extract_listing_url(profile, el),
        postcode: patterns::POSTCODE.find(text).map(|m| m.as_str().to_string()),
        state: patterns::STATE_CODE.find(text).map(|m| m.as_str().to_string()),
        price_undisclosed: patterns::UNDISCLOSED.is_match(text),
    }
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// First text among `selector` matches inside `el` that passes `accept`.
fn first_selected(el: ElementRef<'_>, selector: &Selector, accept: impl Fn(&str) -> bool) -> Option<String> {
    el.select(selector)
        .map(|e| clean_text(&e.text().collect::<Vec<_>>().join(" ")))
        .find(|t| accept(t.as_str()))
}

// ── Address ───────────────────────────────────────────────────────────────────

pub fn looks_like_address(text: &str) -> bool {
    patterns::ADDRESS_START.is_match(text)
        && patterns::ADDRESS.is_match(text)
        && (10..100).contains(&text.chars().count())
}

/// Address selectors first, then the first street-like line, then the
/// first non-empty line.
pub fn extract_address(profile: &SiteProfile, el: ElementRef<'_>, text: &str) -> Option<String> {
    let address = first_selected(el, &profile.address, looks_like_address)
        .or_else(|| lines(text).find(|l| patterns::ADDRESS.is_match(l)).map(clean_text))
        .or_else(|| lines(text).next().map(clean_text))?;

    ADDRESS_CHARS
        .contains(&address.chars().count())
        .then_some(address)
}

// ── Price / result / type / counts ────────────────────────────────────────────

pub fn extract_price(text: &str) -> Option<String> {
    patterns::PRICE.find(text).map(|m| m.as_str().to_string())
}

pub fn extract_result(text: &str) -> Option<String> {
    patterns::RESULT_KEYWORD
        .captures(text)
        .map(|c| c[1].to_lowercase())
}

pub fn extract_property_type(text: &str) -> Option<String> {
    patterns::PROPERTY_TYPE
        .captures(text)
        .map(|c| c[1].to_lowercase())
}

pub fn extract_count(pattern: &regex::Regex, text: &str) -> Option<u8> {
    pattern.captures(text).and_then(|c| c[1].parse().ok())
}

// ── Agent / agency ────────────────────────────────────────────────────────────

/// Two capitalised words that are neither an agency nor result wording
/// ("Passed In", "Price Withheld").
pub fn looks_like_person_name(text: &str) -> bool {
    patterns::PERSON_NAME.is_match(text)
        && (6..50).contains(&text.chars().count())
        && !patterns::AGENCY_KEYWORD.is_match(text)
        && !patterns::STATUS_WORDS.is_match(text)
}

pub fn looks_like_agency_name(text: &str) -> bool {
    patterns::AGENCY_KEYWORD.is_match(text) && (6..100).contains(&text.chars().count())
}

pub fn extract_agent(profile: &SiteProfile, el: ElementRef<'_>, text: &str) -> Option<String> {
    first_selected(el, &profile.agent, looks_like_person_name)
        .or_else(|| lines(text).find(|l| looks_like_person_name(l)).map(str::to_string))
}

pub fn extract_agency(profile: &SiteProfile, el: ElementRef<'_>, text: &str) -> Option<String> {
    first_selected(el, &profile.agency, looks_like_agency_name)
        .or_else(|| lines(text).find(|l| looks_like_agency_name(l)).map(str::to_string))
}

// ── Listing URL ───────────────────────────────────────────────────────────────

/// First anchor pointing at a listing page, made absolute on the site.
pub fn extract_listing_url(profile: &SiteProfile, el: ElementRef<'_>) -> Option<String> {
    el.select(&ANCHORS)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| profile.is_listing_href(href))
        .find_map(|href| profile.absolute_url(href))
}

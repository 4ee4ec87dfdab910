use chrono::NaiveDate;
use scraper::Html;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::cleaner::{clean_text, title_case, to_auction_record};
use super::extractor::extract_listing;
use super::locator::locate;
use super::patterns;
use super::sites::{Region, SiteProfile};
use crate::models::{AuctionRecord, SuburbContext};

/// Phrases that only appear on bot-check interstitials.
pub const CHALLENGE_PHRASES: [&str; 8] = [
    "verify you are human",
    "are you a robot",
    "pardon our interruption",
    "access denied",
    "checking your browser before accessing",
    "attention required! | cloudflare",
    "_incapsula_resource",
    "request unsuccessful",
];

// ── Region page ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SuburbLink {
    pub name: String,
    pub url: String,
    pub ctx: SuburbContext,
}

/// Suburb links on a city/state page, in page order, without duplicates.
pub fn parse_region_page(profile: &SiteProfile, html: &str, region: &Region) -> Vec<SuburbLink> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for a in doc.select(&profile.suburb_links) {
        let Some(href) = a.value().attr("href") else { continue };
        let Some(url) = profile.resolve(&region.url, href) else { continue };
        if url.trim_end_matches('/') == region.url.trim_end_matches('/') {
            continue;
        }

        let text = clean_text(&a.text().collect::<Vec<_>>().join(" "));
        let ctx = context_from_url(profile, &url)
            .or_else(|| {
                profile
                    .suburb_from_link_text
                    .then(|| context_from_link_text(&text))
                    .flatten()
            });
        let Some(mut ctx) = ctx else { continue };
        ctx.state = ctx.state.or(Some(region.state));

        if !seen.insert(url.clone()) {
            continue;
        }

        links.push(SuburbLink {
            name: ctx.suburb.clone().unwrap_or_default(),
            url,
            ctx,
        });
    }

    debug!("{}: {} suburb links", region.name, links.len());
    links
}

/// Suburb, state and postcode from a suburb page URL.
pub fn context_from_url(profile: &SiteProfile, url: &str) -> Option<SuburbContext> {
    let caps = profile.suburb_url.captures(url)?;
    Some(SuburbContext {
        suburb: Some(title_case(&caps["suburb"].replace('-', " "))),
        state: caps.name("state").and_then(|m| m.as_str().parse().ok()),
        postcode: caps.name("postcode").map(|m| m.as_str().to_string()),
    })
}

/// "Surry Hills 2010" / "Surry Hills, 2010"
pub fn context_from_link_text(text: &str) -> Option<SuburbContext> {
    let caps = patterns::SUBURB_LINK_TEXT.captures(text)?;
    Some(SuburbContext {
        suburb: Some(title_case(&caps["suburb"])),
        state: None,
        postcode: Some(caps["postcode"].to_string()),
    })
}

// ── Results page ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ResultsPage {
    pub records: Vec<AuctionRecord>,
    /// Plausible containers found before de-duplication.
    pub candidates: usize,
    /// Containers that did not yield a usable record.
    pub dropped: usize,
    pub strategy: Option<String>,
    pub next_url: Option<String>,
}

/// Locate, extract and normalise every result on one page.
///
/// Nested containers can describe the same property; only the one with the
/// shortest text is kept per address.
pub fn parse_results_page(
    profile: &SiteProfile,
    html: &str,
    page_url: &str,
    ctx: &SuburbContext,
    auction_date: NaiveDate,
) -> ResultsPage {
    let doc = Html::parse_document(html);
    let located = locate(&doc, &profile.container_strategies);
    let candidates = located.candidates.len();

    // address (lower-case) → index into `kept`
    let mut by_address: HashMap<String, usize> = HashMap::new();
    let mut kept = Vec::new();
    let mut dropped = 0usize;

    for cand in &located.candidates {
        let raw = extract_listing(profile, cand);
        let Some(address) = raw.address.clone() else {
            dropped += 1;
            continue;
        };
        let len = cand.char_len();
        let key = address.to_lowercase();

        match by_address.get(&key) {
            Some(&i) => {
                let (prev_len, _) = &kept[i];
                if len < *prev_len {
                    kept[i] = (len, raw);
                }
            }
            None => {
                by_address.insert(key, kept.len());
                kept.push((len, raw));
            }
        }
    }

    let records: Vec<AuctionRecord> = kept
        .into_iter()
        .filter_map(|(_, raw)| {
            let rec = to_auction_record(raw, ctx, auction_date, profile.source);
            if rec.is_none() {
                dropped += 1;
            }
            rec
        })
        .collect();

    let next_url = doc
        .select(&profile.next_page)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| profile.resolve(page_url, href))
        .filter(|next| next != page_url);

    debug!(
        "{}: {} candidates via {:?} → {} records, {} dropped",
        page_url,
        candidates,
        located.strategy,
        records.len(),
        dropped
    );

    ResultsPage {
        records,
        candidates,
        dropped,
        strategy: located.strategy,
        next_url,
    }
}

// ── Challenge guard ───────────────────────────────────────────────────────────

/// The phrase that gave away a bot-check page, if any.
pub fn detect_challenge(html: &str) -> Option<&'static str> {
    let lower = html.to_lowercase();
    CHALLENGE_PHRASES.into_iter().find(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuctionResult, AustralianState, Source};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    const DOMAIN_REGION: &str = r#"
        <html><body>
          <ul>
            <li class="suburb-results__suburb-item"><a href="/auction-results/melbourne/fitzroy-vic-3065/">Fitzroy</a></li>
            <li class="suburb-results__suburb-item"><a href="/auction-results/melbourne/st-kilda-east-vic-3183/">St Kilda East</a></li>
            <li class="suburb-results__suburb-item"><a href="/auction-results/melbourne/fitzroy-vic-3065/">Fitzroy again</a></li>
          </ul>
          <a href="/auction-results/melbourne/">Melbourne</a>
          <a href="/auction-results/sydney/">Sydney</a>
        </body></html>"#;

    #[test]
    fn test_domain_region_links() {
        let profile = SiteProfile::domain().unwrap();
        let region = profile.regions[1].clone();
        let links = parse_region_page(&profile, DOMAIN_REGION, &region);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].name, "Fitzroy");
        assert_eq!(links[0].url, "https://www.domain.com.au/auction-results/melbourne/fitzroy-vic-3065/");
        assert_eq!(links[1].ctx.suburb.as_deref(), Some("St Kilda East"));
        assert_eq!(links[1].ctx.state, Some(AustralianState::Vic));
        assert_eq!(links[1].ctx.postcode.as_deref(), Some("3183"));
    }

    #[test]
    fn test_rea_region_links_from_text() {
        let profile = SiteProfile::rea().unwrap();
        let region = profile.regions[0].clone();
        let html = r#"
            <main>
              <a href="/auction-results/nsw/surry-hills-2010">Surry Hills 2010</a>
              <a href="/auction-results/nsw/suburb?id=991">Bondi Beach, 2026</a>
              <a href="/auction-results/nsw">New South Wales</a>
              <a href="/auction-results/vic">Victoria</a>
            </main>"#;
        let links = parse_region_page(&profile, html, &region);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].ctx.postcode.as_deref(), Some("2010"));
        assert_eq!(links[1].name, "Bondi Beach");
        assert_eq!(links[1].ctx.state, Some(AustralianState::Nsw));
        assert_eq!(links[1].ctx.postcode.as_deref(), Some("2026"));
    }

    const DOMAIN_RESULTS: &str = r#"
        <html><body>
          <section>
            <article data-testid="listing-card">
              <h3>12 Brunswick Street</h3>
              <span>Sold</span><span>$850,000</span><span>2 bed 1 bath</span>
            </article>
            <article data-testid="listing-card">
              <h3>4 Gore Street</h3>
              <span>Passed in</span><span>$1,900,000</span><span>4 bed</span>
            </article>
            <article data-testid="listing-card">
              <p>Sold</p><p>Price undisclosed</p><p>Apartment with views</p>
            </article>
          </section>
          <a rel="next" href="/auction-results/melbourne/fitzroy-vic-3065/?page=2">Next</a>
        </body></html>"#;

    #[test]
    fn test_domain_results_page() {
        let profile = SiteProfile::domain().unwrap();
        let url = "https://www.domain.com.au/auction-results/melbourne/fitzroy-vic-3065/";
        let ctx = context_from_url(&profile, url).unwrap();
        let page = parse_results_page(&profile, DOMAIN_RESULTS, url, &ctx, date());

        assert_eq!(page.candidates, 3);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.dropped, 1);
        assert_eq!(
            page.next_url.as_deref(),
            Some("https://www.domain.com.au/auction-results/melbourne/fitzroy-vic-3065/?page=2")
        );

        let sold = &page.records[0];
        assert_eq!(sold.address, "12 Brunswick Street");
        assert_eq!(sold.suburb, "Fitzroy");
        assert_eq!(sold.state, AustralianState::Vic);
        assert_eq!(sold.postcode, "3065");
        assert_eq!(sold.price, Some(850_000));
        assert_eq!(sold.bedrooms, Some(2));
        assert_eq!(sold.source, Source::Domain);

        let passed = &page.records[1];
        assert_eq!(passed.result, AuctionResult::PassedIn);
        assert_eq!(passed.price, None);
    }

    #[test]
    fn test_nested_containers_keep_shortest() {
        // No site markup: the scored strategy sees the outer div and the
        // inner div for the same property.
        let html = r#"
            <div class="wrapper">
              <div><p>7 Smith Street</p><p>Sold $1,100,000</p><p>3 bed</p></div>
              <p>Fitzroy auction results 3065</p>
            </div>"#;
        let profile = SiteProfile::domain().unwrap();
        let ctx = SuburbContext {
            suburb: Some("fitzroy".into()),
            state: Some(AustralianState::Vic),
            postcode: Some("3065".into()),
        };
        let page = parse_results_page(&profile, html, "https://x/", &ctx, date());

        assert_eq!(page.strategy.as_deref(), Some("scored"));
        assert!(page.candidates >= 2);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].address, "7 Smith Street");
        assert_eq!(page.records[0].price, Some(1_100_000));
    }

    #[test]
    fn test_empty_page_is_not_an_error() {
        let profile = SiteProfile::rea().unwrap();
        let page = parse_results_page(
            &profile,
            "<html><body><p>No results this week</p></body></html>",
            "https://www.realestate.com.au/auction-results/nsw/surry-hills-2010",
            &SuburbContext::default(),
            date(),
        );
        assert!(page.records.is_empty());
        assert!(page.strategy.is_none());
        assert!(page.next_url.is_none());
    }

    #[test]
    fn test_detect_challenge() {
        assert_eq!(
            detect_challenge("<title>Attention Required! | Cloudflare</title>"),
            Some("attention required! | cloudflare")
        );
        assert_eq!(detect_challenge("<p>Please verify you are human</p>"), Some("verify you are human"));
        assert_eq!(detect_challenge(DOMAIN_RESULTS), None);
    }
}

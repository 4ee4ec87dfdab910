//! Per-site configuration for the two result sites.
//!
//! Everything that differs between Domain and realestate.com.au lives here:
//! entry pages, link shapes, selector lists and listing URL markers. The
//! navigation and extraction code is shared.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use scraper::Selector;
use url::Url;

use super::locator::Strategy;
use crate::error::ScrapeError;
use crate::models::{AustralianState, Source};

/// A city or state results page that links to its suburbs.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub url: String,
    pub state: AustralianState,
}

impl Region {
    pub fn new(name: &str, url: &str, state: AustralianState) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            state,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub source: Source,
    pub base_url: Url,
    pub regions: Vec<Region>,

    /// Anchors on a region page that may point at suburb pages.
    pub suburb_links: Selector,
    /// Suburb URL shape with `suburb`, `state` and `postcode` groups.
    pub suburb_url: Regex,
    /// Fall back to "Suburb 1234" link text when the URL does not match.
    pub suburb_from_link_text: bool,

    /// Selectors a rendering fetcher waits for.
    pub region_ready: String,
    pub results_ready: String,

    pub container_strategies: Vec<Strategy>,
    pub address: Selector,
    pub agent: Selector,
    pub agency: Selector,
    pub listing_markers: Vec<&'static str>,
    pub next_page: Selector,
}

fn join_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

fn sel(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!(ScrapeError::Selector(format!("{}: {:?}", css, e))))
}

impl SiteProfile {
    pub fn for_source(source: Source) -> Result<Self> {
        match source {
            Source::Domain => Self::domain(),
            Source::Rea => Self::rea(),
        }
    }

    /// domain.com.au: capital city pages → `/auction-results/<city>/<suburb>-<state>-<postcode>`
    pub fn domain() -> Result<Self> {
        use AustralianState::*;

        let base = "https://www.domain.com.au";
        let regions = [
            ("Sydney", "sydney", Nsw),
            ("Melbourne", "melbourne", Vic),
            ("Brisbane", "brisbane", Qld),
            ("Adelaide", "adelaide", Sa),
            ("Canberra", "canberra", Act),
            ("Perth", "perth", Wa),
        ]
        .into_iter()
        .map(|(name, slug, state)| Region::new(name, &format!("{}/auction-results/{}/", base, slug), state))
        .collect();

        let specific = ".css-1b38kx6, .css-kz9pbu, article[data-testid=\"listing-card\"], \
                        div[data-testid=\"property-card\"], .auction-results__property, .property-listing";
        let test_ids = "[data-testid*=\"auction\"], [data-testid*=\"result\"], [data-testid*=\"property\"]";
        let class_patterns = "div[class*=\"property\"][class*=\"card\"], article[class*=\"listing\"], \
                              .auction-result, .result-card, .auction-card, .property-card";

        Ok(Self {
            source: Source::Domain,
            base_url: Url::parse(base).context("domain base url")?,
            regions,
            suburb_links: sel(".suburb-results__suburb-item a, a[href*=\"/auction-results/\"]")?,
            suburb_url: Regex::new(
                r"(?i)/auction-results/[^/]+/(?P<suburb>[a-z0-9-]+?)-(?P<state>nsw|vic|qld|sa|wa|act|tas|nt)-(?P<postcode>\d{4})",
            )?,
            suburb_from_link_text: false,
            region_ready: ".suburb-results__suburb-item a, a[href*=\"/auction-results/\"]".to_string(),
            results_ready: specific.to_string(),
            container_strategies: vec![
                Strategy::selector(specific)?,
                Strategy::selector(test_ids)?,
                Strategy::selector(class_patterns)?,
                Strategy::Scored,
            ],
            address: sel(
                "[data-testid=\"address\"], [data-testid*=\"address\"], .property-address, \
                 .listing-address, .address, h2, h3, a[href*=\"/property/\"]",
            )?,
            agent: sel(".agent-name, .listing-agent, [data-testid=\"agent-name\"], [data-testid*=\"agent\"], .agent")?,
            agency: sel(".agency-name, .listing-agency, [data-testid=\"agency-name\"], [data-testid*=\"agency\"], .agency")?,
            listing_markers: vec!["/property/", "/property-profile/", "/sale/", "/sold/"],
            next_page: sel("a[rel=\"next\"], a[aria-label*=\"Next\"], a[aria-label*=\"next\"], .pagination__next a")?,
        })
    }

    /// realestate.com.au: state pages → suburb pages, postcode in URL or link text.
    pub fn rea() -> Result<Self> {
        let base = "https://www.realestate.com.au";
        let regions = AustralianState::ALL
            .into_iter()
            .map(|st| {
                Region::new(
                    st.full_name(),
                    &format!("{}/auction-results/{}", base, st.code().to_lowercase()),
                    st,
                )
            })
            .collect();

        let specific = "article[data-testid*=\"result\"], [data-testid*=\"auction-result\"], \
                        .auction-results-list li, article.property";

        Ok(Self {
            source: Source::Rea,
            base_url: Url::parse(base).context("rea base url")?,
            regions,
            suburb_links: sel("a[href*=\"auction-results\"]")?,
            suburb_url: Regex::new(
                r"(?i)/auction-results/(?P<state>nsw|vic|qld|sa|wa|act|tas|nt)/(?P<suburb>[a-z0-9-]+?)-(?P<postcode>\d{4})(?:[/?#]|$)",
            )?,
            suburb_from_link_text: true,
            region_ready: "main, [role=\"main\"], .suburb-list, ul, nav".to_string(),
            results_ready: "main, [role=\"main\"], .auction-results-list, article, .property".to_string(),
            container_strategies: vec![Strategy::selector(specific)?, Strategy::Scored],
            address: sel("[data-testid*=\"address\"], .property-address, .address, h2, h3")?,
            agent: sel(".agent-name, [data-testid*=\"agent-name\"], .agent")?,
            agency: sel(".agency-name, [data-testid*=\"agency\"], .agency")?,
            listing_markers: vec!["/property-", "/property/", "/sold/", "/buy/"],
            next_page: sel("a[rel=\"next\"], a[aria-label*=\"Next\"], a[aria-label*=\"next\"], .pagination__next a")?,
        })
    }

    /// Replace the entry pages (tests, single-region runs).
    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.regions = regions;
        self
    }

    /// Resolve `href` against the site, the way a browser would.
    /// "/x" → "https://site/x", "//host/x" → "https://host/x"
    pub fn absolute_url(&self, href: &str) -> Option<String> {
        join_href(&self.base_url, href)
    }

    /// Like `absolute_url`, but relative to the page the link was found on
    /// ("?page=2" stays on the suburb page).
    pub fn resolve(&self, page_url: &str, href: &str) -> Option<String> {
        match Url::parse(page_url) {
            Ok(page) => join_href(&page, href),
            Err(_) => self.absolute_url(href),
        }
    }

    pub fn is_listing_href(&self, href: &str) -> bool {
        !href.contains("/auction-results/") && self.listing_markers.iter().any(|m| href.contains(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_build() {
        let domain = SiteProfile::domain().unwrap();
        assert_eq!(domain.regions.len(), 6);
        assert_eq!(domain.regions[1].state, AustralianState::Vic);

        let rea = SiteProfile::rea().unwrap();
        assert_eq!(rea.regions.len(), 8);
        assert_eq!(rea.regions[0].url, "https://www.realestate.com.au/auction-results/nsw");
    }

    #[test]
    fn test_absolute_url() {
        let p = SiteProfile::domain().unwrap();
        assert_eq!(
            p.absolute_url("/property-profile/12-george-st").as_deref(),
            Some("https://www.domain.com.au/property-profile/12-george-st")
        );
        assert_eq!(
            p.absolute_url("//www.domain.com.au/sale/x").as_deref(),
            Some("https://www.domain.com.au/sale/x")
        );
        assert_eq!(
            p.absolute_url("https://www.domain.com.au/sold/y").as_deref(),
            Some("https://www.domain.com.au/sold/y")
        );
        assert_eq!(p.absolute_url("#top"), None);

        let page = "https://www.domain.com.au/auction-results/melbourne/fitzroy-vic-3065/";
        assert_eq!(
            p.resolve(page, "?page=2").as_deref(),
            Some("https://www.domain.com.au/auction-results/melbourne/fitzroy-vic-3065/?page=2")
        );
        assert_eq!(
            p.resolve("not a url", "/sold/y").as_deref(),
            Some("https://www.domain.com.au/sold/y")
        );
    }

    #[test]
    fn test_suburb_url_patterns() {
        let domain = SiteProfile::domain().unwrap();
        let caps = domain
            .suburb_url
            .captures("/auction-results/melbourne/st-kilda-east-vic-3183/")
            .unwrap();
        assert_eq!(&caps["suburb"], "st-kilda-east");
        assert_eq!(&caps["state"], "vic");
        assert_eq!(&caps["postcode"], "3183");

        let rea = SiteProfile::rea().unwrap();
        let caps = rea
            .suburb_url
            .captures("https://www.realestate.com.au/auction-results/nsw/surry-hills-2010")
            .unwrap();
        assert_eq!(&caps["suburb"], "surry-hills");
        assert!(rea.suburb_url.captures("https://www.realestate.com.au/auction-results/nsw").is_none());
    }
}

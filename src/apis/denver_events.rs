use super::base::{
    absolute_url, clean_text, days_ahead_at, dedup_by_title, dedup_by_url, finish_draft, first_attr, first_text,
    inner_text, local_date, next_annual, truncate_chars,
};
use super::classifier::KeywordClassifier;
use crate::constants::{DEFAULT_CITY, DENVER_EVENTS_SOURCE, DENVER_LATITUDE, DENVER_LONGITUDE};
use crate::domain::{AgeGroup, Event, EventDraft, PriceType};
use crate::infra::SourceClient;
use crate::types::{EventSource, ScrapeOutcome};
use chrono::{DateTime, Datelike, Duration, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{error, info, instrument, warn};

const BASE_URL: &str = "https://www.denver.org";
const MAIN_PATHS: [&str; 3] = ["/events/", "/events/this-weekend/", "/things-to-do/"];
const ANNUAL_PATH: &str = "/events/annual-events/";
const FAMILY_PATHS: [&str; 2] = ["/things-to-do/family/", "/things-to-do/attractions/"];

const CONTAINERS_PER_PAGE: usize = 2;
const MAX_ANNUAL: usize = 2;
const ATTRACTION_LINKS_SCANNED: usize = 5;
const MAX_EVENTS: usize = 6;
const MIN_LIVE: usize = 1;

const CONTAINER_CLASS_TERMS: &[&str] = &["event", "listing", "card", "item"];
const ANNUAL_TERMS: &[&str] = &["festival", "fair", "market", "celebration"];
const ATTRACTION_TERMS: &[&str] = &["museum", "zoo", "park", "center"];

static CONTAINER: Lazy<Selector> = Lazy::new(|| Selector::parse("div, article").expect("valid container selector"));
static HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5").expect("valid heading selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("valid anchor selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("valid paragraph selector"));
static IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").expect("valid image selector"));

/// How a denver.org listing was found; decides its lead category and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    /// Event card: five days out, 19:00 for three hours
    Regular,
    /// Annual festival: next July 15, 10:00, three days
    Annual,
    /// Family attraction: tomorrow 09:00 for eight hours
    Attraction,
}

impl ListingKind {
    fn lead_category(&self) -> &'static str {
        match self {
            ListingKind::Regular => "events",
            ListingKind::Annual => "festivals",
            ListingKind::Attraction => "attractions",
        }
    }

    fn slot(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            ListingKind::Regular => {
                let start = days_ahead_at(now, 5, 19, 0);
                (start, start + Duration::hours(3))
            }
            ListingKind::Annual => {
                let start = next_annual(now, 7, 15, 10, 0);
                (start, start + Duration::days(3))
            }
            ListingKind::Attraction => {
                let start = days_ahead_at(now, 1, 9, 0);
                (start, start + Duration::hours(8))
            }
        }
    }
}

/// A link or card pulled from a page, before classification.
#[derive(Debug, Clone)]
pub struct Listing {
    pub kind: ListingKind,
    pub title: String,
    pub description: String,
    pub url: String,
    pub image_url: Option<String>,
}

impl Listing {
    pub fn into_event(self, now: DateTime<Utc>, classifier: &KeywordClassifier) -> Option<Event> {
        let title = clean_text(&self.title);
        if title.chars().count() < 5 {
            return None;
        }
        let text = format!("{} {}", title, self.description);
        let (date_start, date_end) = self.kind.slot(now);
        finish_draft(
            EventDraft {
                age_group: classifier.age_group(&text),
                categories: classifier.categories_led_by(Some(self.kind.lead_category()), &text),
                price_type: classifier.price_type(&text),
                title,
                description: self.description,
                date_start,
                date_end,
                location_name: "Denver, CO".to_string(),
                address: "Denver, Colorado".to_string(),
                city: DEFAULT_CITY.to_string(),
                latitude: DENVER_LATITUDE,
                longitude: DENVER_LONGITUDE,
                source_url: self.url,
                image_url: self.image_url,
            },
            DENVER_EVENTS_SOURCE,
        )
    }
}

fn has_container_class(el: &ElementRef<'_>) -> bool {
    el.value()
        .attr("class")
        .map(|class| {
            let class = class.to_lowercase();
            CONTAINER_CLASS_TERMS.iter().any(|t| class.contains(t))
        })
        .unwrap_or(false)
}

/// Site-relative or absolute http links only.
fn site_link(href: &str) -> Option<String> {
    if href.starts_with('/') {
        Some(format!("{}{}", BASE_URL, href))
    } else if href.starts_with("http") {
        Some(href.to_string())
    } else {
        None
    }
}

fn container_listing(container: ElementRef<'_>) -> Option<Listing> {
    let title = first_text(&container, &HEADING).or_else(|| first_text(&container, &ANCHOR))?;
    if title.chars().count() < 5 {
        return None;
    }
    let url = first_attr(&container, &LINK, "href")
        .and_then(|href| absolute_url(BASE_URL, &href))
        .unwrap_or_else(|| format!("{}/events/", BASE_URL));
    let description = first_text(&container, &PARAGRAPH).unwrap_or_else(|| inner_text(container));
    let image_url = first_attr(&container, &IMAGE, "src").and_then(|src| absolute_url(BASE_URL, &src));
    Some(Listing {
        kind: ListingKind::Regular,
        title,
        description: truncate_chars(&description, 200),
        url,
        image_url,
    })
}

/// Event cards from a listing page; only the first few containers are read.
pub fn extract_container_listings(html: &str) -> Vec<Listing> {
    let doc = Html::parse_document(html);
    doc.select(&CONTAINER)
        .filter(has_container_class)
        .take(CONTAINERS_PER_PAGE)
        .filter_map(container_listing)
        .collect()
}

/// Festival, fair and market links on the annual events page.
pub fn extract_annual_listings(html: &str) -> Vec<Listing> {
    let doc = Html::parse_document(html);
    doc.select(&LINK)
        .filter_map(|a| {
            let text = inner_text(a);
            let lower = text.to_lowercase();
            if text.chars().count() <= 10 || !ANNUAL_TERMS.iter().any(|t| lower.contains(t)) {
                return None;
            }
            let url = site_link(a.value().attr("href")?)?;
            Some(Listing {
                kind: ListingKind::Annual,
                description: format!("Annual {} celebration in Denver", text),
                title: text,
                url,
                image_url: None,
            })
        })
        .take(MAX_ANNUAL)
        .collect()
}

/// Museum, zoo and park links among the first links of a family page.
pub fn extract_attraction_listings(html: &str) -> Vec<Listing> {
    let doc = Html::parse_document(html);
    doc.select(&LINK)
        .take(ATTRACTION_LINKS_SCANNED)
        .filter_map(|a| {
            let text = inner_text(a);
            let lower = text.to_lowercase();
            if text.chars().count() <= 15 || !ATTRACTION_TERMS.iter().any(|t| lower.contains(t)) {
                return None;
            }
            let url = site_link(a.value().attr("href")?)?;
            Some(Listing {
                kind: ListingKind::Attraction,
                description: format!("Family-friendly activities and programs at {}", text),
                title: format!("{} Family Programs", text),
                url,
                image_url: None,
            })
        })
        .collect()
}

struct CuratedEvent {
    title: String,
    description: &'static str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    location: &'static str,
    address: &'static str,
    coords: (f64, f64),
    age_group: AgeGroup,
    categories: [&'static str; 3],
    price_type: PriceType,
    source_url: &'static str,
    image_key: &'static str,
}

/// Yearly festivals land on their next occurrence; ongoing programs are
/// placed a fixed number of days out.
pub fn curated_events(now: DateTime<Utc>) -> Vec<Event> {
    let cherry = next_annual(now, 6, 28, 10, 0);
    let beer = next_annual(now, 10, 2, 12, 0);
    let restaurant = next_annual(now, 2, 21, 17, 0);
    let year = |dt: DateTime<Utc>| local_date(dt).year();

    let curated = [
        CuratedEvent {
            title: format!("Denver Cherry Blossom Festival {}", year(cherry)),
            description: "Annual celebration of Japanese culture with food, performances, and beautiful cherry blossoms in Sakura Square.",
            start: cherry,
            end: cherry + Duration::hours(32),
            location: "Sakura Square",
            address: "1255 19th St, Denver, CO 80202",
            coords: (39.7503, -104.9942),
            age_group: AgeGroup::Kid,
            categories: ["festivals", "cultural", "family"],
            price_type: PriceType::Free,
            source_url: "https://www.cherryblossomdenver.org/",
            image_key: "cherry",
        },
        CuratedEvent {
            title: format!("Great American Beer Festival {}", year(beer)),
            description: "Premier beer festival featuring craft breweries from across America with family-friendly areas.",
            start: beer,
            end: beer + Duration::hours(58),
            location: "Colorado Convention Center",
            address: "700 14th St, Denver, CO 80202",
            coords: (39.7434, -104.9951),
            age_group: AgeGroup::Youth,
            categories: ["festivals", "food", "family"],
            price_type: PriceType::Paid,
            source_url: "https://www.greatamericanbeerfestival.com/",
            image_key: "beer",
        },
        CuratedEvent {
            title: format!("Denver Restaurant Week {}", year(restaurant)),
            description: "Annual dining event featuring special menus at Denver's best restaurants, with family-friendly options.",
            start: restaurant,
            end: restaurant + Duration::days(9) + Duration::hours(4),
            location: "Multiple Denver Restaurants",
            address: "Various Locations, Denver, CO",
            coords: (DENVER_LATITUDE, DENVER_LONGITUDE),
            age_group: AgeGroup::Kid,
            categories: ["food", "family", "dining"],
            price_type: PriceType::Paid,
            source_url: "https://www.denver.org/restaurants/denver-restaurant-week/",
            image_key: "restaurant",
        },
        CuratedEvent {
            title: "Denver Art Museum Family Programs".to_string(),
            description: "Ongoing family-friendly art programs, workshops, and interactive exhibits designed for children and families.",
            start: days_ahead_at(now, 2, 10, 0),
            end: days_ahead_at(now, 2, 16, 0),
            location: "Denver Art Museum",
            address: "1100 W 14th Ave Pkwy, Denver, CO 80204",
            coords: (39.7364, -104.9897),
            age_group: AgeGroup::Kid,
            categories: ["arts", "museum", "family"],
            price_type: PriceType::Paid,
            source_url: "https://www.denverartmuseum.org/en/visit/families",
            image_key: "art",
        },
        CuratedEvent {
            title: "Denver Museum of Nature & Science Explorer Programs".to_string(),
            description: "Interactive science programs and planetarium shows designed for curious minds of all ages.",
            start: days_ahead_at(now, 8, 9, 0),
            end: days_ahead_at(now, 8, 17, 0),
            location: "Denver Museum of Nature & Science",
            address: "2001 Colorado Blvd, Denver, CO 80205",
            coords: (39.7475, -104.9428),
            age_group: AgeGroup::Kid,
            categories: ["science", "museum", "education"],
            price_type: PriceType::Paid,
            source_url: "https://www.dmns.org/visit/families/",
            image_key: "science",
        },
        CuratedEvent {
            title: "Denver Zoo Wild Encounters".to_string(),
            description: "Special animal encounters and educational programs designed for families with young children.",
            start: days_ahead_at(now, 15, 10, 0),
            end: days_ahead_at(now, 15, 15, 0),
            location: "Denver Zoo",
            address: "2300 Steele St, Denver, CO 80205",
            coords: (39.7516, -104.9512),
            age_group: AgeGroup::Kid,
            categories: ["animals", "education", "outdoor"],
            price_type: PriceType::Paid,
            source_url: "https://denverzoo.org/animals/wild-encounters/",
            image_key: "zooanimals",
        },
    ];

    curated
        .into_iter()
        .filter_map(|c| {
            finish_draft(
                EventDraft {
                    title: c.title,
                    description: c.description.to_string(),
                    date_start: c.start,
                    date_end: c.end,
                    location_name: c.location.to_string(),
                    address: c.address.to_string(),
                    city: DEFAULT_CITY.to_string(),
                    latitude: c.coords.0,
                    longitude: c.coords.1,
                    age_group: c.age_group,
                    categories: c.categories.iter().map(|s| s.to_string()).collect(),
                    price_type: c.price_type,
                    source_url: c.source_url.to_string(),
                    image_url: Some(format!("https://picsum.photos/400/300?random={}", c.image_key)),
                },
                DENVER_EVENTS_SOURCE,
            )
        })
        .collect()
}

pub struct DenverEventsCrawler {
    client: SourceClient,
    classifier: KeywordClassifier,
}

impl DenverEventsCrawler {
    pub fn new(client: SourceClient) -> Self {
        Self { client, classifier: KeywordClassifier::tourism() }
    }

    async fn main_listings(&self) -> Vec<Listing> {
        for path in MAIN_PATHS {
            let url = format!("{}{}", BASE_URL, path);
            info!("🔍 Scraping main events from: {}", url);
            match self.client.get_text(&url).await {
                Ok(html) => {
                    let listings = extract_container_listings(&html);
                    if !listings.is_empty() {
                        return listings;
                    }
                }
                Err(e) => warn!("Could not scrape {}: {}", url, e),
            }
            self.client.polite_delay().await;
        }
        Vec::new()
    }

    async fn annual_listings(&self) -> Vec<Listing> {
        let url = format!("{}{}", BASE_URL, ANNUAL_PATH);
        info!("🎪 Scraping annual events from: {}", url);
        match self.client.get_text(&url).await {
            Ok(html) => extract_annual_listings(&html),
            Err(e) => {
                error!("❌ Error scraping annual events: {}", e);
                Vec::new()
            }
        }
    }

    /// The first family page that loads is the only one read.
    async fn attraction_listings(&self) -> Vec<Listing> {
        for path in FAMILY_PATHS {
            let url = format!("{}{}", BASE_URL, path);
            info!("👨‍👩‍👧‍👦 Scraping family events from: {}", url);
            match self.client.get_text(&url).await {
                Ok(html) => return extract_attraction_listings(&html),
                Err(e) => warn!("Could not scrape family events from {}: {}", url, e),
            }
        }
        Vec::new()
    }
}

#[async_trait::async_trait]
impl EventSource for DenverEventsCrawler {
    fn name(&self) -> &'static str {
        DENVER_EVENTS_SOURCE
    }

    #[instrument(skip(self))]
    async fn scrape(&self) -> ScrapeOutcome {
        info!("🕷️ Starting Denver.org scraping...");
        let now = Utc::now();

        let mut listings = self.main_listings().await;
        self.client.polite_delay().await;
        listings.extend(self.annual_listings().await);
        self.client.polite_delay().await;
        listings.extend(self.attraction_listings().await);

        let live: Vec<Event> = listings
            .into_iter()
            .filter_map(|listing| listing.into_event(now, &self.classifier))
            .collect();
        let mut live = dedup_by_title(dedup_by_url(live));
        live.truncate(MAX_EVENTS);

        let urls: HashSet<String> = live.iter().map(|e| e.source_url.clone()).collect();
        let titles: HashSet<String> = live.iter().map(|e| e.title.clone()).collect();
        let curated: Vec<Event> = curated_events(now)
            .into_iter()
            .filter(|e| !urls.contains(&e.source_url) && !titles.contains(&e.title))
            .take(MAX_EVENTS.saturating_sub(live.len()))
            .collect();

        info!("✅ Denver.org: {} live, {} curated", live.len(), curated.len());
        ScrapeOutcome::from_parts(live, curated, MIN_LIVE, DENVER_EVENTS_SOURCE)
    }
}

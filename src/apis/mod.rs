//! Source adapters, one per external listing site.

pub mod base;
pub mod classifier;
pub mod denver_events;
pub mod denver_library;
pub mod kids_out_about;

use crate::infra::SourceClient;
use crate::types::EventSource;
use std::sync::Arc;

pub use classifier::KeywordClassifier;
pub use denver_events::DenverEventsCrawler;
pub use denver_library::DenverLibraryCrawler;
pub use kids_out_about::KidsOutAboutCrawler;

/// Every adapter in registration order; cycles scrape them in this order.
pub fn registered_sources(client: &SourceClient) -> Vec<Arc<dyn EventSource>> {
    vec![
        Arc::new(DenverLibraryCrawler::new(client.clone())),
        Arc::new(KidsOutAboutCrawler::new(client.clone())),
        Arc::new(DenverEventsCrawler::new(client.clone())),
    ]
}

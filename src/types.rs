use crate::domain::Event;
use serde::Serialize;

/// What one adapter call produced.
#[derive(Debug, Clone)]
pub enum ScrapeOutcome {
    /// Live extraction met the source's minimum yield
    Ok(Vec<Event>),
    /// Some or all events came from curated fallback data
    Degraded { events: Vec<Event>, reason: String },
    /// Nothing usable
    Empty { reason: String },
}

impl ScrapeOutcome {
    pub fn into_events(self) -> Vec<Event> {
        match self {
            ScrapeOutcome::Ok(events) | ScrapeOutcome::Degraded { events, .. } => events,
            ScrapeOutcome::Empty { .. } => Vec::new(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            ScrapeOutcome::Ok(_) => OutcomeKind::Ok,
            ScrapeOutcome::Degraded { .. } => OutcomeKind::Degraded,
            ScrapeOutcome::Empty { .. } => OutcomeKind::Empty,
        }
    }

    /// Classifies what an adapter gathered: `live` is extracted, `curated` is fallback.
    pub fn from_parts(live: Vec<Event>, curated: Vec<Event>, min_live: usize, source: &str) -> Self {
        match (live.is_empty(), curated.is_empty()) {
            (true, true) => ScrapeOutcome::Empty { reason: format!("{}: no live or curated events", source) },
            (_, true) if live.len() >= min_live => ScrapeOutcome::Ok(live),
            (_, true) => ScrapeOutcome::Degraded {
                reason: format!("{}: only {} live events (minimum {})", source, live.len(), min_live),
                events: live,
            },
            (_, false) => {
                let reason = format!("{}: {} live events, {} curated added", source, live.len(), curated.len());
                let mut events = live;
                events.extend(curated);
                ScrapeOutcome::Degraded { events, reason }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Ok,
    Degraded,
    Empty,
}

/// Core trait every listing source implements.
///
/// `scrape` never fails past its own boundary: extraction problems reduce
/// yield or switch to curated data, and are reported through the outcome.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Registry key and statistics label
    fn name(&self) -> &'static str;

    async fn scrape(&self) -> ScrapeOutcome;
}

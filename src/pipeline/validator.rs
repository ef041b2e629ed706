use crate::domain::Event;

/// Why the validator turned an event away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    MissingTitle,
    MissingDescription,
    MissingLocation,
    MissingAddress,
    MissingImage,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::MissingTitle => "missing_title",
            RejectionReason::MissingDescription => "missing_description",
            RejectionReason::MissingLocation => "missing_location",
            RejectionReason::MissingAddress => "missing_address",
            RejectionReason::MissingImage => "missing_image",
        }
    }
}

/// Completeness policy applied to every adapter event before it may be stored.
///
/// Stricter than the schema: an event without an image or description is a
/// valid [`Event`] but is never persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn validate(&self, event: &Event) -> bool {
        self.rejection_reason(event).is_none()
    }

    pub fn rejection_reason(&self, event: &Event) -> Option<RejectionReason> {
        let blank = |s: &str| s.trim().is_empty();
        if blank(&event.title) {
            return Some(RejectionReason::MissingTitle);
        }
        if blank(&event.description) {
            return Some(RejectionReason::MissingDescription);
        }
        if blank(&event.location_name) {
            return Some(RejectionReason::MissingLocation);
        }
        if blank(&event.address) {
            return Some(RejectionReason::MissingAddress);
        }
        match event.image_url.as_deref() {
            Some(url) if !blank(url) => None,
            _ => Some(RejectionReason::MissingImage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgeGroup, EventDraft, PriceType};
    use chrono::{Duration, TimeZone, Utc};

    fn event(description: &str, image: Option<&str>) -> Event {
        let start = Utc.with_ymd_and_hms(2026, 11, 7, 17, 0, 0).unwrap();
        EventDraft {
            title: "Family Art Day".into(),
            description: description.into(),
            date_start: start,
            date_end: start + Duration::hours(2),
            location_name: "Denver Art Museum".into(),
            address: "100 W 14th Ave Pkwy, Denver, CO 80204".into(),
            city: "Denver".into(),
            latitude: 39.7372,
            longitude: -104.9893,
            age_group: AgeGroup::Kid,
            categories: vec!["art".into()],
            price_type: PriceType::Paid,
            source_url: "https://denver.org/event/family-art-day".into(),
            image_url: image.map(str::to_string),
        }
        .into_event()
        .unwrap()
    }

    #[test]
    fn test_complete_event_passes() {
        assert!(Validator.validate(&event("Hands-on art", Some("https://img.example/a.jpg"))));
    }

    #[test]
    fn test_missing_image_rejected_but_schema_valid() {
        let e = event("Hands-on art", None);
        assert_eq!(Validator.rejection_reason(&e), Some(RejectionReason::MissingImage));
    }

    #[test]
    fn test_empty_description_rejected() {
        let e = event("", Some("https://img.example/a.jpg"));
        assert_eq!(Validator.rejection_reason(&e), Some(RejectionReason::MissingDescription));
    }

    #[test]
    fn test_blank_address_rejected() {
        let mut e = event("Hands-on art", Some("https://img.example/a.jpg"));
        e.address = "   ".into();
        assert!(!Validator.validate(&e));
    }
}

use crate::domain::{AgeGroup, PriceType};

type AgeRule = (AgeGroup, &'static [&'static str]);
type CategoryRule = (&'static str, &'static [&'static str]);

/// Deterministic keyword tables mapping listing text to age group,
/// categories and price. Each adapter composes one of the presets.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    age_rules: &'static [AgeRule],
    category_rules: &'static [CategoryRule],
    max_categories: usize,
    default_category: &'static str,
}

const LIBRARY_AGES: &[AgeRule] = &[
    (AgeGroup::Baby, &["baby", "infant", "0-6", "0-12", "0-18"]),
    (AgeGroup::Toddler, &["toddler", "preschool", "2-", "18m", "18 m"]),
    (AgeGroup::Youth, &["teen", "youth", "13-", "12-", "teenager"]),
];

const LIBRARY_CATEGORIES: &[CategoryRule] = &[
    ("Book Clubs & Storytime", &["story", "book", "read", "literacy"]),
    ("STEM & Technology", &["stem", "science", "tech", "maker", "coding"]),
    ("Creating & Making", &["craft", "art", "create", "making"]),
    ("Early Learners (0-5)", &["baby", "toddler", "early", "0-", "2-"]),
    ("Community Resources", &["community", "resource", "support"]),
    ("Language Learning", &["language", "spanish", "bilingual"]),
    ("Community Programs", &["game", "play", "activity", "fun"]),
    ("Movement & Performance", &["music", "sing", "dance", "performance"]),
];

const LISTING_AGES: &[AgeRule] = &[
    (AgeGroup::Baby, &["baby", "infant", "0-2", "newborn"]),
    (AgeGroup::Toddler, &["toddler", "2-4", "preschool", "early"]),
    (AgeGroup::Youth, &["teen", "youth", "13-", "high school"]),
];

const LISTING_CATEGORIES: &[CategoryRule] = &[
    ("music", &["music", "concert", "sing"]),
    ("art", &["art", "craft", "paint", "draw"]),
    ("outdoor", &["outdoor", "park", "nature", "hike"]),
    ("reading", &["story", "book", "read"]),
    ("education", &["science", "stem", "tech"]),
    ("active", &["sport", "game", "play"]),
    ("museum", &["museum", "exhibit"]),
    ("festival", &["festival", "celebration"]),
];

const TOURISM_AGES: &[AgeRule] = &[
    (AgeGroup::Baby, &["baby", "infant", "0-", "newborn"]),
    (AgeGroup::Toddler, &["toddler", "preschool", "2-", "3-", "family"]),
    (AgeGroup::Youth, &["teen", "youth", "13-", "teenage"]),
];

const TOURISM_CATEGORIES: &[CategoryRule] = &[
    ("music", &["music", "concert", "festival"]),
    ("arts", &["art", "museum", "gallery"]),
    ("outdoor", &["outdoor", "park", "nature"]),
    ("food", &["food", "dining", "restaurant"]),
    ("sports", &["sports", "game", "athletics"]),
    ("family", &["family", "kids", "children"]),
];

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

impl KeywordClassifier {
    /// Library programs: LibCal category names, two at most.
    pub fn library() -> Self {
        Self {
            age_rules: LIBRARY_AGES,
            category_rules: LIBRARY_CATEGORIES,
            max_categories: 2,
            default_category: "Community Programs",
        }
    }

    /// Community listing sites.
    pub fn listings() -> Self {
        Self {
            age_rules: LISTING_AGES,
            category_rules: LISTING_CATEGORIES,
            max_categories: 3,
            default_category: "family",
        }
    }

    /// City tourism pages.
    pub fn tourism() -> Self {
        Self {
            age_rules: TOURISM_AGES,
            category_rules: TOURISM_CATEGORIES,
            max_categories: 2,
            default_category: "entertainment",
        }
    }

    /// First matching rule wins; `kid` when nothing matches.
    pub fn age_group(&self, text: &str) -> AgeGroup {
        let text = text.to_lowercase();
        self.age_rules
            .iter()
            .find(|(_, words)| contains_any(&text, words))
            .map(|(group, _)| *group)
            .unwrap_or(AgeGroup::Kid)
    }

    pub fn categories(&self, text: &str) -> Vec<String> {
        self.categories_led_by(None, text)
    }

    /// Like [`categories`](Self::categories) with `lead` always first.
    pub fn categories_led_by(&self, lead: Option<&str>, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        let mut categories: Vec<String> = lead.map(str::to_string).into_iter().collect();
        categories.extend(
            self.category_rules
                .iter()
                .filter(|(_, words)| contains_any(&text, words))
                .map(|(name, _)| name.to_string()),
        );
        categories.truncate(self.max_categories);
        if categories.is_empty() {
            categories.push(self.default_category.to_string());
        }
        categories
    }

    pub fn price_type(&self, text: &str) -> PriceType {
        if text.to_lowercase().contains("free") {
            PriceType::Free
        } else {
            PriceType::Paid
        }
    }
}

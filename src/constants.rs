/// Source adapter names, used as registry keys and statistics labels
pub const DENVER_LIBRARY_SOURCE: &str = "denver_library";
pub const KIDS_OUT_ABOUT_SOURCE: &str = "kids_out_about";
pub const DENVER_EVENTS_SOURCE: &str = "denver_events";

// Scheduled job ids and display names
pub const DAILY_SCRAPING_JOB: &str = "daily_scraping";
pub const DAILY_CLEANUP_JOB: &str = "daily_cleanup";
pub const WEEKLY_CLEANUP_JOB: &str = "weekly_cleanup";

pub const DAILY_SCRAPING_NAME: &str = "Daily Event Scraping";
pub const DAILY_CLEANUP_NAME: &str = "Daily Event Cleanup";
pub const WEEKLY_CLEANUP_NAME: &str = "Weekly Database Cleanup";

/// Calendar every synthesized listing time and cron trigger is anchored to
pub const DEFAULT_TIMEZONE: &str = "America/Denver";

pub const DEFAULT_CITY: &str = "Denver";
pub const DENVER_LATITUDE: f64 = 39.7392;
pub const DENVER_LONGITUDE: f64 = -104.9903;

pub const NO_EVENTS_FOUND: &str = "No events found from any source";

pub mod calendars;
pub mod check;
pub mod domain_config;
pub mod merge;

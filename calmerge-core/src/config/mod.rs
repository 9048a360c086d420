//! Configuration types for calmerge.

mod settings;

pub use settings::{
    BudgetSettings, DomainConfigSettings, FetchSettings, MeetupSettings, MergeSettings, Settings,
    SiteSettings,
};

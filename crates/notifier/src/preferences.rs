//! Per-category channel preference resolution.
//!
//! A stored preference overrides the category default key by key; categories
//! with no stored entry use the default triple as-is.

use beacon_common::types::{Category, ChannelPreference, Recipient};

/// Fallback for categories without a default entry.
pub const GLOBAL_DEFAULT: ChannelPreference = ChannelPreference::new(true, false, false);

/// Default channel toggles for a category.
pub fn category_default(category: &Category) -> ChannelPreference {
    match category {
        Category::Account => ChannelPreference::new(true, false, false),
        Category::StaffAlerts => ChannelPreference::new(true, true, true),
        Category::Tickets => ChannelPreference::new(true, false, false),
        Category::Meetings => ChannelPreference::new(true, false, true),
        Category::Announcements => ChannelPreference::new(true, false, false),
        Category::Brig => ChannelPreference::new(true, false, true),
        Category::Community => ChannelPreference::new(false, false, true),
        Category::Unknown(_) => GLOBAL_DEFAULT,
    }
}

/// Pure resolver; holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferenceResolver;

impl PreferenceResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, recipient: &Recipient, category: &Category) -> ChannelPreference {
        let defaults = category_default(category);
        match recipient.stored_preference(category) {
            Some(stored) => stored.merge_over(defaults),
            None => defaults,
        }
    }
}

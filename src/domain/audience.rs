use std::collections::{BTreeMap, BTreeSet};

/// Interest group name -> opted in / targeted.
///
/// Used both for a subscriber's preferences and a campaign's target groups.
pub type GroupFlags = BTreeMap<String, bool>;

/// Who a campaign is delivered to, among active and verified subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every known group is targeted: preferences are not consulted at all.
    Everyone,
    /// Subscribers opted into at least one of these groups.
    AnyOf(BTreeSet<String>),
}

impl Audience {
    pub fn from_target_groups(target_groups: &GroupFlags, known_groups: &[String]) -> Self {
        let selects_every_known_group = known_groups
            .iter()
            .all(|group| target_groups.get(group).copied().unwrap_or(false));
        if selects_every_known_group {
            return Audience::Everyone;
        }
        Audience::AnyOf(selected_groups(target_groups))
    }

    pub fn admits(&self, preferences: &GroupFlags) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::AnyOf(groups) => groups
                .iter()
                .any(|group| preferences.get(group).copied().unwrap_or(false)),
        }
    }

    /// Group names a store has to match against, `None` for everyone.
    pub fn groups(&self) -> Option<Vec<String>> {
        match self {
            Audience::Everyone => None,
            Audience::AnyOf(groups) => Some(groups.iter().cloned().collect()),
        }
    }
}

/// A subscriber matches when any group set to `true` in `target_groups`
/// is also `true` in their `preferences`.
pub fn matches_target_groups(target_groups: &GroupFlags, preferences: &GroupFlags) -> bool {
    Audience::AnyOf(selected_groups(target_groups)).admits(preferences)
}

/// Names in `groups` that are not part of `known_groups`.
pub fn unknown_groups(groups: &GroupFlags, known_groups: &[String]) -> Vec<String> {
    groups
        .keys()
        .filter(|group| !known_groups.contains(*group))
        .cloned()
        .collect()
}

fn selected_groups(target_groups: &GroupFlags) -> BTreeSet<String> {
    target_groups
        .iter()
        .filter(|(_, selected)| **selected)
        .map(|(group, _)| group.clone())
        .collect()
}

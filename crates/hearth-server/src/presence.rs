//! Presence projection: who is active in a household.

use std::collections::HashSet;

use hearth_core::{Identity, PresenceEntry};

/// Project session identities onto a presence list.
///
/// Deduplicated by user id; the first identity seen for a user wins, so
/// callers pass sessions in join order to get stable display data.
pub fn project<'a>(identities: impl IntoIterator<Item = &'a Identity>) -> Vec<PresenceEntry> {
    let mut seen = HashSet::new();
    identities
        .into_iter()
        .filter(|identity| seen.insert(&identity.user_id))
        .map(PresenceEntry::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty() {
        assert!(project(std::iter::empty()).is_empty());
    }

    #[test]
    fn multi_tab_user_appears_once() {
        let tabs = [
            Identity::new("u1", "Ada"),
            Identity::new("u2", "Bo"),
            Identity::new("u1", "Ada"),
        ];
        let presence = project(&tabs);
        assert_eq!(presence.len(), 2);
        assert_eq!(presence[0].user_id.as_str(), "u1");
        assert_eq!(presence[1].user_id.as_str(), "u2");
    }

    #[test]
    fn first_identity_wins() {
        let tabs = [
            Identity::new("u1", "Ada").with_avatar("old.png"),
            Identity::new("u1", "Ada L.").with_avatar("new.png"),
        ];
        let presence = project(&tabs);
        assert_eq!(presence.len(), 1);
        assert_eq!(presence[0].display_name, "Ada");
        assert_eq!(presence[0].avatar.as_deref(), Some("old.png"));
    }
}

// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Cookie holding the persisted override list.
pub const EXPERIMENT_COOKIE: &str = "AMP_EXP";

/// Ordered `[-]name` override entries parsed from the experiment cookie.
///
/// A leading `-` marks the experiment off, a bare name marks it on. Each name
/// appears once; a later duplicate overwrites the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideList {
    entries: Vec<(String, bool)>,
}

impl OverrideList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses cookie text. Absent or malformed text yields an empty list.
    pub fn parse(raw: Option<&str>) -> Self {
        let mut list = Self::new();
        let Some(raw) = raw else {
            return list;
        };
        for token in raw.split(',').map(str::trim) {
            let (name, on) = match token.strip_prefix('-') {
                Some(rest) => (rest.trim(), false),
                None => (token, true),
            };
            if name.is_empty() {
                continue;
            }
            list.set(name, on);
        }
        list
    }

    /// Whether `name` survives a serialize/parse round trip as a single entry.
    pub fn can_hold(name: &str) -> bool {
        !name.is_empty() && !name.starts_with('-') && !name.contains(',') && name.trim() == name
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, on)| *on)
    }

    /// Sets `name`, keeping its original position if already present.
    pub fn set(&mut self, name: &str, on: bool) {
        match self.entries.iter_mut().find(|(entry, _)| entry == name) {
            Some(slot) => slot.1 = on,
            None => self.entries.push((name.to_string(), on)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(name, on)| (name.as_str(), *on))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cookie value form: `exp1,-exp2`.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OverrideList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (name, on)) in self.entries.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            if !on {
                f.write_str("-")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn only_plain_names_fit_in_the_cookie() {
        assert!(OverrideList::can_hold("exp-1"));
        assert!(!OverrideList::can_hold(""));
        assert!(!OverrideList::can_hold("-exp"));
        assert!(!OverrideList::can_hold("b,-a"));
        assert!(!OverrideList::can_hold(" exp"));
    }

    #[test]
    fn parses_on_and_off_entries() {
        let list = OverrideList::parse(Some("-exp3,exp4,exp5"));
        assert_eq!(list.get("exp3"), Some(false));
        assert_eq!(list.get("exp4"), Some(true));
        assert_eq!(list.get("exp5"), Some(true));
        assert_eq!(list.get("exp1"), None);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn tolerates_whitespace_and_empty_entries() {
        let list = OverrideList::parse(Some(" a , -b ,, - ,,c"));
        assert_eq!(list.serialize(), "a,-b,c");
    }

    #[test]
    fn absent_or_empty_yields_nothing() {
        assert!(OverrideList::parse(None).is_empty());
        assert!(OverrideList::parse(Some("")).is_empty());
        assert!(OverrideList::parse(Some(" , ,")).is_empty());
    }

    #[test]
    fn later_duplicate_wins_without_duplicating() {
        let list = OverrideList::parse(Some("a,b,-a"));
        assert_eq!(list.get("a"), Some(false));
        assert_eq!(list.serialize(), "-a,b");
    }

    #[test]
    fn set_preserves_unrelated_entries() {
        let mut list = OverrideList::parse(Some("x,-y,z"));
        list.set("y", true);
        list.set("w", false);
        assert_eq!(list.serialize(), "x,y,z,-w");
    }

    proptest! {
        #[test]
        fn parse_is_total_and_reparse_is_stable(raw in "[a-z,\\- ]{0,64}") {
            let list = OverrideList::parse(Some(&raw));
            let reparsed = OverrideList::parse(Some(&list.serialize()));
            prop_assert_eq!(list, reparsed);
        }
    }
}

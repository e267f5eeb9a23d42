use std::collections::BTreeSet;

/// A set of unique strings that always iterates in sorted order.
///
/// Used for the run-wide set of declared outputs (which dependency discovery
/// matches against) and for glob results, which must come back deduplicated.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UniqueStrings {
    seen: BTreeSet<String>,
}

impl UniqueStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string; adding one already present is a no-op.
    pub fn add<S: Into<String>>(&mut self, s: S) {
        self.seen.insert(s.into());
    }

    pub fn contains(&self, s: &str) -> bool {
        self.seen.contains(s)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Iterate in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }

    /// Consume the set, returning its contents sorted.
    pub fn into_sorted(self) -> Vec<String> {
        self.seen.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for UniqueStrings {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for s in iter {
            set.add(s);
        }
        set
    }
}

impl<S: Into<String>> Extend<S> for UniqueStrings {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for s in iter {
            self.add(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupes_and_sorts() {
        let mut us = UniqueStrings::new();
        assert!(us.is_empty());

        us.add("b");
        us.add("a");
        assert_eq!(us.len(), 2);

        us.add("b");
        us.add("a");
        assert_eq!(us.len(), 2);

        // twice, to make sure iteration doesn't consume anything:
        assert_eq!(us.iter().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(us.iter().collect::<Vec<_>>(), ["a", "b"]);
        assert!(us.contains("a"));
        assert!(!us.contains("c"));
        assert_eq!(us.into_sorted(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn test_collect() {
        let us: UniqueStrings = ["z", "y", "z"].into_iter().collect();
        assert_eq!(us.into_sorted(), vec!["y".to_owned(), "z".to_owned()]);
    }
}

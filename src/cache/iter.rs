//! Key iteration over a namespace.

use std::iter::FusedIterator;
use std::vec;

/// Iterator over the keys that were live in the current namespace when it
/// was created.
///
/// The keys are a snapshot: entries written, removed or expiring afterwards
/// do not change what the iterator yields. Keys come out in sorted order.
#[derive(Debug)]
pub struct KeyIter {
    keys: vec::IntoIter<String>,
}

impl KeyIter {
    pub(crate) fn new(mut keys: Vec<String>) -> Self {
        keys.sort_unstable();
        Self {
            keys: keys.into_iter(),
        }
    }
}

impl Iterator for KeyIter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.keys.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl ExactSizeIterator for KeyIter {}

impl FusedIterator for KeyIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_iter_sorted_and_exhausts() {
        let mut iter = KeyIter::new(vec!["b".to_string(), "a".to_string()]);
        assert_eq!(iter.len(), 2);
        assert_eq!(iter.next().as_deref(), Some("a"));
        assert_eq!(iter.next().as_deref(), Some("b"));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }
}

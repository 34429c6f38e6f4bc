use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Remembers the byte ranges of written items, so that an item whose bytes
/// were already written can point at the earlier copy instead.
#[derive(Debug, Default)]
pub struct Deduper {
    enabled: bool,
    ranges: HashMap<u64, Vec<(u32, u32)>>,
}

impl Deduper {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ranges: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Looks up `data[start..end]` among previously recorded ranges whose
    /// offset is a multiple of `alignment`. Returns the offset of the match,
    /// or records the range and returns `None`.
    pub fn dedupe(&mut self, data: &[u8], start: u32, end: u32, alignment: u32) -> Option<u32> {
        if !self.enabled || end <= start {
            return None;
        }
        let item = &data[start as usize..end as usize];

        let mut hasher = DefaultHasher::new();
        item.hash(&mut hasher);
        let bucket = self.ranges.entry(hasher.finish()).or_default();

        let found = bucket.iter().find(|(off, len)| {
            *len == end - start
                && off % alignment == 0
                && &data[*off as usize..(*off + *len) as usize] == item
        });
        match found {
            Some((off, _)) => Some(*off),
            None => {
                bucket.push((start, end - start));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_identical_ranges() {
        let data = [1, 2, 3, 0, 1, 2, 3, 0, 9, 1, 2, 3];
        let mut dedupe = Deduper::new(true);
        assert_eq!(dedupe.dedupe(&data, 0, 3, 1), None);
        assert_eq!(dedupe.dedupe(&data, 4, 7, 1), Some(0));
        assert_eq!(dedupe.dedupe(&data, 8, 9, 1), None);
        assert_eq!(dedupe.dedupe(&data, 9, 12, 4), Some(0));
    }

    #[test]
    fn respects_alignment() {
        let data = [0, 5, 6, 0, 5, 6];
        let mut dedupe = Deduper::new(true);
        assert_eq!(dedupe.dedupe(&data, 1, 3, 1), None);
        assert_eq!(dedupe.dedupe(&data, 4, 6, 4), None);
    }

    #[test]
    fn disabled_never_matches() {
        let data = [7, 7];
        let mut dedupe = Deduper::new(false);
        assert_eq!(dedupe.dedupe(&data, 0, 1, 1), None);
        assert_eq!(dedupe.dedupe(&data, 1, 2, 1), None);
    }
}

//! Result map of a multi-file extraction

use indexmap::IndexMap;

/// Extracted entries keyed by their path inside the archive, in the order they
/// were encountered in the stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFiles {
    entries: IndexMap<String, Vec<u8>>,
}

impl ExtractedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; a path seen before keeps its position and gets the new bytes
    pub fn insert(&mut self, path: String, data: Vec<u8>) -> Option<Vec<u8>> {
        self.entries.insert(path, data)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Remove an entry, keeping the order of the others
    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.entries.shift_remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of buffered bytes
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|data| data.len() as u64).sum()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(path, data)| (path.as_str(), data.as_slice()))
    }
}

impl IntoIterator for ExtractedFiles {
    type Item = (String, Vec<u8>);
    type IntoIter = indexmap::map::IntoIter<String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_encounter_order() {
        let mut files = ExtractedFiles::new();
        files.insert("b.txt".into(), b"b".to_vec());
        files.insert("a.txt".into(), b"a".to_vec());
        assert_eq!(files.paths().collect::<Vec<_>>(), vec!["b.txt", "a.txt"]);
    }

    #[test]
    fn reinsert_replaces_in_place() {
        let mut files = ExtractedFiles::new();
        files.insert("x".into(), b"old".to_vec());
        files.insert("y".into(), b"y".to_vec());
        let previous = files.insert("x".into(), b"new".to_vec());
        assert_eq!(previous.as_deref(), Some(&b"old"[..]));
        assert_eq!(files.len(), 2);
        assert_eq!(files.get("x"), Some(&b"new"[..]));
        assert_eq!(files.paths().next(), Some("x"));
        assert_eq!(files.total_size(), 4);
    }

    #[test]
    fn remove_and_lookup() {
        let mut files = ExtractedFiles::new();
        files.insert("data/app.db".into(), vec![1, 2, 3]);
        assert!(files.contains("data/app.db"));
        assert!(!files.contains("app.db"));
        assert_eq!(files.remove("data/app.db"), Some(vec![1, 2, 3]));
        assert!(files.is_empty());
    }

    #[test]
    fn remove_keeps_order_of_the_rest() {
        let mut files = ExtractedFiles::new();
        for name in ["a", "b", "c"] {
            files.insert(name.into(), name.as_bytes().to_vec());
        }
        files.remove("a");
        assert_eq!(files.paths().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn many_entries_stay_ordered_and_addressable() {
        let mut files = ExtractedFiles::new();
        for i in 0..20_000 {
            files.insert(format!("dir/{i}.txt"), vec![1]);
        }
        assert_eq!(files.len(), 20_000);
        assert_eq!(files.paths().nth(12_345), Some("dir/12345.txt"));
        assert!(files.contains("dir/19999.txt"));
        assert_eq!(files.total_size(), 20_000);
    }
}

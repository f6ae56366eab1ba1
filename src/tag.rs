//! Schema annotation tag parsing.
//!
//! Annotations are `;`-separated `key` or `key:value` segments. Only the
//! first `:` splits a segment, so values may contain colons and commas
//! (`foreign_key:teams.id`, `default:now():text` would keep `now():text`
//! intact). Duplicate keys are meaningful at table level (`index:` may
//! repeat), so pairs are kept in insertion order rather than collapsed
//! into a map.

/// An ordered list of `key -> value` pairs parsed from one annotation
/// string. Flags (segments without `:`) carry an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    pairs: Vec<(String, String)>,
}

impl TagSet {
    /// Parse an annotation string. Empty segments are skipped; keys and
    /// values are trimmed.
    pub fn parse(input: &str) -> Self {
        let mut pairs = Vec::new();
        for segment in input.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            match segment.split_once(':') {
                Some((key, value)) => {
                    let key = key.trim();
                    if !key.is_empty() {
                        pairs.push((key.to_string(), value.trim().to_string()));
                    }
                }
                None => pairs.push((segment.to_string(), String::new())),
            }
        }
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// First value recorded for `key`, if any. Flags yield `Some("")`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True if `key` appears at all (as a flag or with a value).
    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// All values recorded for `key`, in insertion order.
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append all pairs from `other`, preserving order. Used to merge the
    /// annotations of several sentinel fields into one table-level set.
    pub fn extend(&mut self, other: TagSet) {
        self.pairs.extend(other.pairs);
    }
}

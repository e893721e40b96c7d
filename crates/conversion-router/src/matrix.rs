//! Conversion matrix: input format to the ordered set of reachable output formats.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Normalize a format name for matrix lookups.
pub fn normalize_format(format: &str) -> String {
    format.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Mapping from input format to the output formats it can be converted into.
///
/// Format names are stored lowercase. Output lists keep insertion order and
/// never contain duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionMatrix {
    entries: BTreeMap<String, Vec<String>>,
}

impl ConversionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `outputs` as reachable from `input`.
    pub fn with_outputs<I, S>(mut self, input: &str, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert(input, outputs);
        self
    }

    pub fn insert<I, S>(&mut self, input: &str, outputs: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets = self.entries.entry(normalize_format(input)).or_default();
        for output in outputs {
            let output = normalize_format(output.as_ref());
            if !targets.contains(&output) {
                targets.push(output);
            }
        }
    }

    /// Union `other` into this matrix, keeping existing order first.
    pub fn merge(&mut self, other: &ConversionMatrix) {
        for (input, outputs) in &other.entries {
            self.insert(input, outputs);
        }
    }

    /// Case-insensitive membership check.
    pub fn contains(&self, input: &str, output: &str) -> bool {
        let output = normalize_format(output);
        self.entries
            .get(&normalize_format(input))
            .is_some_and(|targets| targets.contains(&output))
    }

    pub fn outputs_for(&self, input: &str) -> &[String] {
        self.entries
            .get(&normalize_format(input))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Inputs that have at least one entry, sorted.
    pub fn inputs(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Every output format reachable from any input, sorted and deduplicated.
    pub fn outputs(&self) -> Vec<String> {
        self.entries
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Iterate `(input, output)` pairs in matrix order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(input, outputs)| {
            outputs
                .iter()
                .map(move |output| (input.as_str(), output.as_str()))
        })
    }

    /// Number of input formats.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.entries.clone()
    }
}

impl From<BTreeMap<String, Vec<String>>> for ConversionMatrix {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        let mut matrix = Self::new();
        for (input, outputs) in map {
            matrix.insert(&input, outputs);
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_normalizes_and_dedups() {
        let matrix = ConversionMatrix::new()
            .with_outputs("PDF", ["txt", "TXT", ".docx"])
            .with_outputs("pdf", ["png"]);

        assert_eq!(matrix.outputs_for("pdf"), ["txt", "docx", "png"]);
        assert!(matrix.contains("Pdf", "DOCX"));
        assert!(!matrix.contains("docx", "pdf"));
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut a = ConversionMatrix::new().with_outputs("docx", ["txt"]);
        let b = ConversionMatrix::new()
            .with_outputs("docx", ["pdf", "txt"])
            .with_outputs("csv", ["html"]);
        a.merge(&b);

        assert_eq!(a.outputs_for("docx"), ["txt", "pdf"]);
        assert_eq!(a.inputs(), vec!["csv".to_string(), "docx".to_string()]);
        assert_eq!(a.outputs(), vec!["html", "pdf", "txt"]);
    }

    #[test]
    fn test_pairs() {
        let matrix = ConversionMatrix::new().with_outputs("txt", ["html"]);
        let pairs: Vec<_> = matrix.pairs().collect();
        assert_eq!(pairs, vec![("txt", "html")]);
    }

    #[test]
    fn test_from_map() {
        let mut map = BTreeMap::new();
        map.insert("XLSX".to_string(), vec!["csv".to_string(), "CSV".to_string()]);
        let matrix = ConversionMatrix::from(map);
        assert_eq!(matrix.outputs_for("xlsx"), ["csv"]);
    }
}

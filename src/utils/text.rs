/// Collapse every run of whitespace into a single space and trim the ends.
pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_at_char_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Drops sentence punctuation that speech transcripts tend to append.
pub fn trim_trailing_punctuation(text: &str) -> &str {
    text.trim_end_matches(['.', '!', '?']).trim_end()
}

/// Lowercased view of a string that remembers where each byte came from,
/// so a range found in the lowercase copy can be cut out of the original.
pub struct FoldedText<'a> {
    original: &'a str,
    folded: String,
    origin: Vec<usize>,
}

impl<'a> FoldedText<'a> {
    pub fn new(original: &'a str) -> Self {
        let mut folded = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len());

        for (idx, ch) in original.char_indices() {
            for lower in ch.to_lowercase() {
                let before = folded.len();
                folded.push(lower);
                origin.extend(std::iter::repeat(idx).take(folded.len() - before));
            }
        }

        Self { original, folded, origin }
    }

    pub fn folded(&self) -> &str {
        &self.folded
    }

    pub fn original(&self) -> &'a str {
        self.original
    }

    /// Original text covering the folded byte range `start..end`.
    pub fn original_slice(&self, start: usize, end: usize) -> &'a str {
        let from = self.origin_at(start);
        let to = self.origin_at(end).max(from);
        &self.original[from..to]
    }

    fn origin_at(&self, folded_idx: usize) -> usize {
        self.origin
            .get(folded_idx)
            .copied()
            .unwrap_or(self.original.len())
    }
}

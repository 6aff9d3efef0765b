// relay-core/src/utils.rs

//! Character-based text helpers. All limits count `char`s, never bytes.

pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Keeps the first `max_chars` characters and appends [`TRUNCATION_MARKER`]
/// when anything was cut.
pub fn clip_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{}", &input[..byte_index], TRUNCATION_MARKER),
        None => input.to_string(),
    }
}

/// The first `max_chars` characters, without a marker.
pub fn take_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &input[..byte_index],
        None => input,
    }
}

/// Splits `text` into consecutive chunks of at most `max_chars` characters.
/// Empty input yields one empty chunk.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;
    loop {
        let head = take_chars(rest, max_chars);
        chunks.push(head.to_string());
        rest = &rest[head.len()..];
        if rest.is_empty() {
            return chunks;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// Zero-based, already clamped.
    pub index: usize,
    pub total_pages: usize,
}

impl<T> Page<'_, T> {
    pub fn has_previous(&self) -> bool {
        self.index > 0
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.total_pages
    }
}

/// Returns page `index` of `items`, clamping out-of-range indexes to the last page.
pub fn paginate<T>(items: &[T], index: usize, page_size: usize) -> Page<'_, T> {
    let page_size = page_size.max(1);
    let total_pages = items.len().div_ceil(page_size).max(1);
    let index = index.min(total_pages - 1);
    let start = index * page_size;
    let end = (start + page_size).min(items.len());
    Page {
        items: &items[start..end],
        index,
        total_pages,
    }
}

use tracing::{debug, trace};

use refinery_core::item::{ExtractionItem, MatchType, SourceLocation};
use refinery_core::stage::Stage;

/// Shortest common run accepted as a fuzzy match.
const FUZZY_MIN_CHARS: usize = 4;
/// Fraction of the (whitespace-stripped) item text the common run must cover.
const FUZZY_MIN_COVERAGE: f64 = 0.6;

/// Locates each item's text inside the full source document.
///
/// Offsets are character offsets; lines are 1-indexed.
pub struct SourceGrounder {
    document: String,
    chars: Vec<char>,
    /// Character index of every `\n` in the document, ascending.
    newlines: Vec<usize>,
    /// The document with all whitespace removed ...
    stripped: Vec<char>,
    /// ... and, per stripped character, its index in `chars`.
    stripped_origin: Vec<usize>,
}

impl SourceGrounder {
    pub fn new(document: impl Into<String>) -> Self {
        let document = document.into();
        let chars: Vec<char> = document.chars().collect();

        let newlines = chars
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == '\n')
            .map(|(i, _)| i)
            .collect();

        let (stripped_origin, stripped) = chars
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_whitespace())
            .map(|(i, c)| (i, *c))
            .unzip();

        Self {
            document,
            chars,
            newlines,
            stripped,
            stripped_origin,
        }
    }

    /// Ground a single piece of text. Returns `None` for empty text.
    pub fn locate(&self, text: &str) -> Option<SourceLocation> {
        if text.is_empty() {
            return None;
        }

        let location = self
            .exact(text)
            .or_else(|| self.normalized(text))
            .or_else(|| self.fuzzy(text))
            .map(|(match_type, start, end)| {
                SourceLocation::located(match_type, start, end, self.line_at(start))
            })
            .unwrap_or_else(SourceLocation::unmatched);

        Some(location)
    }

    fn exact(&self, text: &str) -> Option<(MatchType, usize, usize)> {
        let byte_start = self.document.find(text)?;
        let start = self.document[..byte_start].chars().count();
        Some((MatchType::Exact, start, start + text.chars().count()))
    }

    /// Match with all whitespace removed on both sides.
    fn normalized(&self, text: &str) -> Option<(MatchType, usize, usize)> {
        let needle: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        if needle.is_empty() {
            return None;
        }
        let first = self
            .stripped
            .windows(needle.len())
            .position(|window| window == needle.as_slice())?;
        let last = first + needle.len() - 1;
        Some((
            MatchType::Normalized,
            self.stripped_origin[first],
            self.stripped_origin[last] + 1,
        ))
    }

    /// Longest common run between the stripped text and the stripped document.
    fn fuzzy(&self, text: &str) -> Option<(MatchType, usize, usize)> {
        let needle: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let (doc_end, len) = longest_common_run(&self.stripped, &needle)?;

        let coverage = len as f64 / needle.len() as f64;
        if len < FUZZY_MIN_CHARS || coverage < FUZZY_MIN_COVERAGE {
            trace!(len, coverage, "Fuzzy candidate below acceptance bar");
            return None;
        }

        let first = doc_end + 1 - len;
        Some((
            MatchType::Fuzzy,
            self.stripped_origin[first],
            self.stripped_origin[doc_end] + 1,
        ))
    }

    fn line_at(&self, char_start: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < char_start) + 1
    }

    pub fn document_len(&self) -> usize {
        self.chars.len()
    }
}

/// Longest common substring of `haystack` and `needle`.
///
/// Returns the index in `haystack` of the run's last character and the run
/// length; the earliest run wins ties.
fn longest_common_run(haystack: &[char], needle: &[char]) -> Option<(usize, usize)> {
    if haystack.is_empty() || needle.is_empty() {
        return None;
    }

    let mut prev = vec![0usize; needle.len() + 1];
    let mut curr = vec![0usize; needle.len() + 1];
    let mut best: Option<(usize, usize)> = None;

    for (i, h) in haystack.iter().enumerate() {
        for (j, n) in needle.iter().enumerate() {
            curr[j + 1] = if h == n { prev[j] + 1 } else { 0 };
            if curr[j + 1] > best.map_or(0, |(_, len)| len) {
                best = Some((i, curr[j + 1]));
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    best
}

impl Stage for SourceGrounder {
    fn name(&self) -> &'static str {
        "source_grounding"
    }

    fn process(&self, items: &[ExtractionItem]) -> Vec<ExtractionItem> {
        let mut tiers = [0usize; 4];

        let grounded: Vec<ExtractionItem> = items
            .iter()
            .map(|item| {
                let mut grounded = item.clone();
                if let Some(location) = self.locate(&item.text) {
                    if let Some(match_type) = location.match_type {
                        tiers[match_type as usize] += 1;
                    }
                    if location.match_type == Some(MatchType::Unmatched) {
                        trace!(kind = %item.kind, text = %item.text, "Text not found in source document");
                    }
                    grounded.source_location = Some(location);
                }
                grounded
            })
            .collect();

        debug!(
            items = grounded.len(),
            document_chars = self.document_len(),
            exact = tiers[MatchType::Exact as usize],
            normalized = tiers[MatchType::Normalized as usize],
            fuzzy = tiers[MatchType::Fuzzy as usize],
            none = tiers[MatchType::Unmatched as usize],
            "Source grounding complete"
        );

        grounded
    }
}

//! Removes literal URLs and raw citations leaking into generated prose.

use regex::Regex;

/// Past this much held-back text an unclosed `[Source:` span is released anyway.
const MAX_PENDING_BYTES: usize = 512;

pub struct CitationScrubber {
    url: Regex,
    raw_citation: Regex,
    empty_brackets: Regex,
    spaces: Regex,
}

impl CitationScrubber {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            url: Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"')\]]+"#)?,
            raw_citation: Regex::new(r"(?i)[\[(]\s*source\s*:[^\])]*[\])]")?,
            empty_brackets: Regex::new(r"\(\s*\)|\[\s*\]")?,
            spaces: Regex::new(r"[ \t]{2,}")?,
        })
    }

    /// Full-text cleanup for blocking answers.
    pub fn scrub(&self, text: &str) -> String {
        let cleaned = self.strip_patterns(text);
        let cleaned = self.spaces.replace_all(&cleaned, " ");
        cleaned
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Per-chunk cleanup for streams; leaves surrounding whitespace alone so
    /// chunk concatenation stays faithful.
    pub fn scrub_chunk(&self, chunk: &str) -> String {
        self.strip_patterns(chunk)
    }

    pub fn chunk_buffer(&self) -> ChunkBuffer<'_> {
        ChunkBuffer {
            scrubber: self,
            pending: String::new(),
        }
    }

    fn strip_patterns(&self, text: &str) -> String {
        let text = self.raw_citation.replace_all(text, "");
        let text = self.url.replace_all(&text, "");
        self.empty_brackets.replace_all(&text, "").into_owned()
    }
}

/// Streaming cleanup that holds back the unfinished trailing token, so a URL
/// or citation split across provider chunks is matched as a whole.
pub struct ChunkBuffer<'a> {
    scrubber: &'a CitationScrubber,
    pending: String,
}

impl ChunkBuffer<'_> {
    /// Returns the scrubbed text that is safe to emit; may be empty.
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let split = release_point(&self.pending);
        if split == 0 {
            return String::new();
        }
        let rest = self.pending.split_off(split);
        let ready = std::mem::replace(&mut self.pending, rest);
        self.scrubber.scrub_chunk(&ready)
    }

    /// Scrubs and returns whatever is still held back.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        self.scrubber.scrub_chunk(&rest)
    }
}

/// Byte offset just past the last whitespace, pulled back to the start of an
/// unclosed citation span.
fn release_point(pending: &str) -> usize {
    let Some((idx, ws)) = pending.char_indices().rev().find(|(_, c)| c.is_whitespace()) else {
        return 0;
    };
    let split = idx + ws.len_utf8();
    if pending.len() > MAX_PENDING_BYTES {
        return split;
    }
    match open_citation_start(pending) {
        Some(open) => split.min(open),
        None => split,
    }
}

fn open_citation_start(text: &str) -> Option<usize> {
    const KEYWORD: &str = "source";
    text.match_indices(['[', '('])
        .map(|(open, _)| open)
        .find(|&open| {
            let tail = &text[open + 1..];
            if tail.contains([']', ')']) {
                return false;
            }
            let head = tail.trim_start().to_ascii_lowercase();
            if head.len() >= KEYWORD.len() {
                head.starts_with(KEYWORD)
            } else {
                KEYWORD.starts_with(head.as_str())
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_urls_and_raw_citations() {
        let scrubber = CitationScrubber::new().unwrap();
        let text = "Zheng He sailed in 1405 (https://example.org/ming) [Source: Ming Annals].  \
                    See www.example.com for more. [Document 1] stays.";

        assert_eq!(
            scrubber.scrub(text),
            "Zheng He sailed in 1405 . See for more. [Document 1] stays."
        );
    }

    #[test]
    fn chunk_scrub_keeps_plain_chunks_intact() {
        let scrubber = CitationScrubber::new().unwrap();
        for chunk in ["Zheng ", "He ", "was...", "\n\n"] {
            assert_eq!(scrubber.scrub_chunk(chunk), chunk);
        }
        assert_eq!(scrubber.scrub_chunk("see https://x.y/z "), "see  ");
    }

    fn stream(chunks: &[&str]) -> Vec<String> {
        let scrubber = CitationScrubber::new().unwrap();
        let mut buffer = scrubber.chunk_buffer();
        let mut out: Vec<String> = chunks.iter().map(|c| buffer.push(c)).collect();
        out.push(buffer.finish());
        out
    }

    #[test]
    fn buffer_catches_urls_split_across_chunks() {
        let out = stream(&["See ", "https://", "archive.example.org/zheng-he", " for more."]);
        let text = out.concat();
        assert!(!text.contains("example.org"), "{text}");
        assert_eq!(text, "See  for more.");
    }

    #[test]
    fn buffer_holds_open_source_spans_until_closed() {
        let out = stream(&["Ming fleet ", "[Sou", "rce: Ming ", "Annals] sailed."]);
        assert_eq!(out.concat(), "Ming fleet  sailed.");
        assert_eq!(out[0], "Ming fleet ");
        assert_eq!(out[1], "");
        assert_eq!(out[2], "");
    }

    #[test]
    fn buffer_passes_word_aligned_chunks_unchanged() {
        assert_eq!(stream(&["Zheng ", "He ", "was..."]), vec!["Zheng ", "He ", "", "was..."]);
        assert_eq!(stream(&["[Document 1] ", "led"]), vec!["[Document 1] ", "", "led"]);
    }
}

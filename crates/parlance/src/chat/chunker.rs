//! Adaptive content chunker.
//!
//! Buffers streamed text deltas and decides when the accumulated text is
//! safe to flush as one network-visible chunk. Markdown tables and fenced
//! code blocks are never split mid-block: a table flushes only once its row
//! block has visibly ended, a fence only once its closing marker's line is
//! complete, and the size threshold defers while the buffer tail is still
//! inside an open fence or a growing table.

/// Flush threshold for normal prose.
const CHUNK_SIZE: usize = 500;

/// Flush threshold once a table has been observed in the run.
const TABLE_CHUNK_SIZE: usize = 1000;

const FENCE: &str = "```";

/// Buffering state machine for one run's generated text.
#[derive(Debug, Default)]
pub struct ContentChunker {
    buffer: String,
    /// Sticky for the rest of the run once any table is observed.
    table_mode: bool,
}

impl ContentChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return a chunk if one is ready to flush.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        self.buffer.push_str(delta);

        if self.table_lines_observed() {
            self.table_mode = true;
        }

        if let Some(end) = self.completed_table_end() {
            return Some(self.split_front(end));
        }

        if let Some(end) = self.closed_fence_end() {
            return Some(self.split_front(end));
        }

        if let Some(end) = self.paragraph_break_end() {
            return Some(self.split_front(end));
        }

        let threshold = if self.table_mode {
            TABLE_CHUNK_SIZE
        } else {
            CHUNK_SIZE
        };
        if self.buffer.chars().count() >= threshold
            && !self.inside_open_fence()
            && !self.inside_growing_table()
        {
            let cut = char_boundary(&self.buffer, threshold);
            return Some(self.split_front(cut));
        }

        None
    }

    /// Flush any residual buffered text. Called on run completion or
    /// cancellation; no text is ever dropped.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn split_front(&mut self, end: usize) -> String {
        let tail = self.buffer.split_off(end);
        std::mem::replace(&mut self.buffer, tail)
    }

    /// Byte offset just past the last line of the first completed table
    /// block: at least three consecutive `|`-bounded complete lines
    /// followed by a complete non-table line.
    fn completed_table_end(&self) -> Option<usize> {
        let mut run_len = 0usize;
        let mut run_end = 0usize;
        for (line, end) in complete_lines(&self.buffer) {
            if is_table_line(line) {
                run_len += 1;
                run_end = end;
            } else {
                if run_len >= 3 {
                    return Some(run_end);
                }
                run_len = 0;
            }
        }
        // A trailing run with no line after it may still be growing.
        None
    }

    /// True once the buffer holds at least three consecutive complete
    /// table lines, whether or not the block has ended.
    fn table_lines_observed(&self) -> bool {
        let mut run_len = 0usize;
        for (line, _) in complete_lines(&self.buffer) {
            if is_table_line(line) {
                run_len += 1;
                if run_len >= 3 {
                    return true;
                }
            } else {
                run_len = 0;
            }
        }
        false
    }

    /// Byte offset just past the closing fence's newline, when the buffer
    /// holds a matched pair of fence markers and the closing line is
    /// complete.
    fn closed_fence_end(&self) -> Option<usize> {
        let open = self.buffer.find(FENCE)?;
        let close_rel = self.buffer[open + FENCE.len()..].find(FENCE)?;
        let close = open + FENCE.len() + close_rel;
        let newline_rel = self.buffer[close..].find('\n')?;
        Some(close + newline_rel + 1)
    }

    /// Byte offset just past the first blank-line paragraph break that is
    /// not inside an open fence.
    fn paragraph_break_end(&self) -> Option<usize> {
        for (pos, _) in self.buffer.match_indices("\n\n") {
            let fences_before = self.buffer[..pos].matches(FENCE).count();
            if fences_before % 2 == 0 {
                return Some(pos + 2);
            }
        }
        None
    }

    fn inside_open_fence(&self) -> bool {
        self.buffer.matches(FENCE).count() % 2 == 1
    }

    /// The buffer tail looks like a table row still streaming in.
    fn inside_growing_table(&self) -> bool {
        let last_line = self.buffer.rsplit('\n').next().unwrap_or("");
        let tail = if last_line.trim().is_empty() {
            // Complete final line; look at the one before it.
            self.buffer
                .trim_end_matches('\n')
                .rsplit('\n')
                .next()
                .unwrap_or("")
        } else {
            last_line
        };
        tail.trim_start().starts_with('|')
    }
}

/// Complete (newline-terminated) lines with the byte offset just past each
/// line's newline.
fn complete_lines(buffer: &str) -> impl Iterator<Item = (&str, usize)> {
    buffer.match_indices('\n').scan(0usize, |start, (nl, _)| {
        let line = &buffer[*start..nl];
        let end = nl + 1;
        *start = end;
        Some((line, end))
    })
}

fn is_table_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 2 && trimmed.starts_with('|') && trimmed.ends_with('|')
}

/// Byte index of the `n`th character, clamped to the buffer length.
fn char_boundary(buffer: &str, n: usize) -> usize {
    buffer
        .char_indices()
        .nth(n)
        .map(|(idx, _)| idx)
        .unwrap_or(buffer.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(chunker: &mut ContentChunker, deltas: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        for delta in deltas {
            if let Some(chunk) = chunker.push(delta) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    #[test]
    fn test_short_text_flushes_only_at_finish() {
        let mut chunker = ContentChunker::new();
        let chunks = drive(&mut chunker, &["Hello ", "world"]);
        assert!(chunks.is_empty());
        assert_eq!(chunker.finish().unwrap(), "Hello world");
        assert!(chunker.finish().is_none());
    }

    #[test]
    fn test_paragraph_break_flushes() {
        let mut chunker = ContentChunker::new();
        let chunks = drive(&mut chunker, &["first paragraph\n", "\nsecond"]);
        assert_eq!(chunks, vec!["first paragraph\n\n".to_string()]);
        assert_eq!(chunker.finish().unwrap(), "second");
    }

    #[test]
    fn test_threshold_flush() {
        let mut chunker = ContentChunker::new();
        let long = "a".repeat(600);
        let chunk = chunker.push(&long).unwrap();
        assert_eq!(chunk.len(), 500);
        assert_eq!(chunker.finish().unwrap().len(), 100);
    }

    #[test]
    fn test_threshold_is_char_based() {
        let mut chunker = ContentChunker::new();
        let long = "é".repeat(600);
        let chunk = chunker.push(&long).unwrap();
        assert_eq!(chunk.chars().count(), 500);
        // The cut must land on a char boundary.
        assert!(chunk.is_char_boundary(chunk.len()));
    }

    #[test]
    fn test_table_block_flushes_whole() {
        let mut chunker = ContentChunker::new();
        let table = "| a | b |\n| - | - |\n| 1 | 2 |\n";
        assert!(chunker.push(table).is_none());
        // The block is only considered ended once a non-table line lands.
        let chunk = chunker.push("done\n").unwrap();
        assert_eq!(chunk, table);
        assert_eq!(chunker.finish().unwrap(), "done\n");
    }

    #[test]
    fn test_no_boundary_inside_table_rows() {
        let mut chunker = ContentChunker::new();
        let mut chunks = Vec::new();
        let rows = [
            "intro\n\n",
            "| h1 | h2 |\n",
            "| -- | -- |\n",
            "| r1 | r2 |\n",
            "| r3 ",
            "| r4 |\n",
            "\ntail",
        ];
        for delta in rows {
            chunks.extend(chunker.push(delta));
        }
        chunks.extend(chunker.finish());

        let table = "| h1 | h2 |\n| -- | -- |\n| r1 | r2 |\n| r3 | r4 |\n";
        let joined = chunks.concat();
        assert_eq!(joined, rows.concat());
        // The whole row block must live inside a single chunk.
        assert!(chunks.iter().any(|c| c.contains(table)));
    }

    #[test]
    fn test_table_mode_raises_threshold() {
        let mut chunker = ContentChunker::new();
        let flushed = chunker.push("| a |\n| - |\n| 1 |\nafter table\n");
        assert!(flushed.is_some());
        assert!(chunker.table_mode);
        // 600 chars would flush in normal mode but not in table mode.
        assert!(chunker.push(&"x".repeat(600)).is_none());
        assert!(chunker.push(&"x".repeat(500)).is_some());
    }

    #[test]
    fn test_fenced_block_flushes_whole() {
        let mut chunker = ContentChunker::new();
        assert!(chunker.push("```rust\nfn main() {}\n").is_none());
        let chunk = chunker.push("```\n").unwrap();
        assert_eq!(chunk, "```rust\nfn main() {}\n```\n");
    }

    #[test]
    fn test_blank_line_inside_fence_does_not_flush() {
        let mut chunker = ContentChunker::new();
        assert!(chunker.push("```\nlet a = 1;\n\nlet b = 2;\n").is_none());
        let chunk = chunker.push("```\nrest").unwrap();
        assert_eq!(chunk, "```\nlet a = 1;\n\nlet b = 2;\n```\n");
        assert_eq!(chunker.finish().unwrap(), "rest");
    }

    #[test]
    fn test_threshold_defers_inside_open_fence() {
        let mut chunker = ContentChunker::new();
        let body = format!("```\n{}", "x".repeat(700));
        assert!(chunker.push(&body).is_none());
        let chunk = chunker.push("\n```\n").unwrap();
        assert!(chunk.ends_with("```\n"));
    }

    #[test]
    fn test_concatenation_law() {
        let mut chunker = ContentChunker::new();
        let deltas = [
            "Some intro text.\n\n",
            "```python\nprint('hi')\n```\n",
            "| a | b |\n| - | - |\n",
            "| 1 | 2 |\nclosing ",
            "words here.",
        ];
        let mut output = Vec::new();
        for delta in deltas {
            output.extend(chunker.push(delta));
        }
        output.extend(chunker.finish());
        assert_eq!(output.concat(), deltas.concat());
    }
}

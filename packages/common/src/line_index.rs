/// Line table for converting between byte offsets and `(line, column)` positions
///
/// Lines and columns are 0-indexed; columns count characters, not bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );

        Self {
            line_starts,
            len: source.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset where `line` starts
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// Byte offset one past the last character of `line`, excluding its newline
    pub fn line_end(&self, line: usize) -> Option<usize> {
        let _ = self.line_starts.get(line)?;
        Some(match self.line_starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.len,
        })
    }

    /// Line containing `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        }
    }

    /// Convert byte offset to `(line, column)`
    ///
    /// Offsets past the end clamp to the end of the buffer.
    pub fn position_of(&self, source: &str, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.len);
        let line = self.line_of(offset);
        let start = self.line_starts[line];
        let column = source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);
        (line, column)
    }

    /// Convert `(line, column)` to a byte offset
    ///
    /// Returns `None` when the line does not exist or the column lies past the
    /// end of the line.
    pub fn offset_of(&self, source: &str, line: usize, column: usize) -> Option<usize> {
        let start = self.line_start(line)?;
        let end = self.line_end(line)?;
        let text = source.get(start..end)?;

        if column == text.chars().count() {
            return Some(end);
        }

        text.char_indices().nth(column).map(|(i, _)| start + i)
    }
}

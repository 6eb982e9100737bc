/// A line and column within grammar input, both counted from one. Columns
/// count bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Locate a byte offset within `input`. Offsets past the end are clamped
    /// to the end of input.
    pub fn locate(input: &[u8], offset: usize) -> Self {
        let before = &input[..offset.min(input.len())];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |idx| idx + 1);
        Position {
            line,
            column: before.len() - line_start + 1,
        }
    }
}

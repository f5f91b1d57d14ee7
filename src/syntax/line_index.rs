use super::Point;

/// Byte offsets of line starts, for converting between offsets and (row, column) points.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        LineIndex {
            line_starts,
            len: text.len(),
        }
    }

    pub fn point(&self, offset: usize) -> Point {
        let row = match self.line_starts.binary_search(&offset) {
            Ok(row) => row,
            Err(next) => next - 1,
        };
        Point {
            row,
            column: offset - self.line_starts[row],
        }
    }

    pub fn offset(&self, point: Point) -> Option<usize> {
        let line_start = *self.line_starts.get(point.row)?;
        let line_end = self
            .line_starts
            .get(point.row + 1)
            .copied()
            .unwrap_or(self.len + 1);
        let offset = line_start + point.column;
        (offset < line_end).then_some(offset)
    }

    pub fn line_start(&self, row: usize) -> Option<usize> {
        self.line_starts.get(row).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_and_offsets() {
        let index = LineIndex::new("ab\ncde\n\nf");
        assert_eq!(index.point(0), Point { row: 0, column: 0 });
        assert_eq!(index.point(4), Point { row: 1, column: 1 });
        assert_eq!(index.point(7), Point { row: 2, column: 0 });
        assert_eq!(index.point(9), Point { row: 3, column: 1 });
        assert_eq!(index.offset(Point { row: 1, column: 2 }), Some(5));
        assert_eq!(index.offset(Point { row: 3, column: 1 }), Some(9));
        assert_eq!(index.offset(Point { row: 0, column: 7 }), None);
        assert_eq!(index.offset(Point { row: 9, column: 0 }), None);
    }
}

use serde::{Deserialize, Serialize};

/// COO sparse structure: one `(row, col)` pair per edge, rows are sources
/// and columns are destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coo {
    pub num_rows: usize,
    pub num_cols: usize,
    pub row: Vec<usize>,
    pub col: Vec<usize>,
}

impl Coo {
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Coo { num_rows, num_cols, row: Vec::new(), col: Vec::new() }
    }

    pub fn nnz(&self) -> usize {
        self.row.len()
    }

    /// Number of entries per row (out-degree when rows are sources).
    pub fn row_counts(&self) -> Vec<usize> {
        bincount(&self.row, self.num_rows)
    }

    /// Number of entries per column (in-degree when columns are destinations).
    pub fn col_counts(&self) -> Vec<usize> {
        bincount(&self.col, self.num_cols)
    }

    /// Append the entries of `other`, shifting its ids by the given offsets.
    pub fn extend_shifted(&mut self, other: &Coo, row_offset: usize, col_offset: usize) {
        self.row.extend(other.row.iter().map(|&r| r + row_offset));
        self.col.extend(other.col.iter().map(|&c| c + col_offset));
    }
}

fn bincount(ids: &[usize], len: usize) -> Vec<usize> {
    let mut counts = vec![0usize; len];
    for &id in ids {
        if let Some(c) = counts.get_mut(id) {
            *c += 1;
        }
    }
    counts
}

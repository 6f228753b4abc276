/// Dense column-major matrix of expression values. Rows are features shared
/// across sites, columns are site-local samples. Column-major storage keeps
/// each sample contiguous for the per-column kernels.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n_rows: usize,
    n_cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            data: vec![0.0; n_rows * n_cols],
        }
    }

    /// Builds from row-major rows, as produced by line-oriented parsers.
    /// Returns None when the rows are ragged.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != n_cols) {
            return None;
        }
        let mut m = Self::zeros(n_rows, n_cols);
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                m.set(i, j, v);
            }
        }
        Some(m)
    }

    pub fn from_columns(columns: &[Vec<f64>]) -> Option<Self> {
        let n_cols = columns.len();
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != n_rows) {
            return None;
        }
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for col in columns {
            data.extend_from_slice(col);
        }
        Some(Self {
            n_rows,
            n_cols,
            data,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0 || self.n_cols == 0
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[col * self.n_rows + row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[col * self.n_rows + row] = value;
    }

    pub fn column(&self, col: usize) -> &[f64] {
        let start = col * self.n_rows;
        &self.data[start..start + self.n_rows]
    }

    pub fn column_mut(&mut self, col: usize) -> &mut [f64] {
        let start = col * self.n_rows;
        &mut self.data[start..start + self.n_rows]
    }

    pub fn row(&self, row: usize) -> Vec<f64> {
        (0..self.n_cols).map(|j| self.get(row, j)).collect()
    }

    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|v| v.is_nan())
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/matrix.rs"]
mod tests;

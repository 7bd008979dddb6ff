use crate::error::Result;
use crate::snc::gf_tables::Field;

/// A normalised pivot row: zero before its pivot column, one on it.
pub(crate) struct PivotRow {
    pub coefficients: Vec<u8>,
    pub message: Vec<u8>,
}

/// Upper-triangular elimination state over a fixed set of columns.
///
/// Row `c` (if present) has its pivot in column `c`. Pinned columns belong to
/// symbols already known from elsewhere; they never hold a pivot and every
/// stored row is zero in them.
pub(crate) struct RunningMatrix {
    field: Field,
    rows: Vec<Option<PivotRow>>,
    pinned: Vec<bool>,
    pinned_count: usize,
    rank: usize,
}

impl RunningMatrix {
    pub fn new(field: Field, width: usize) -> Self {
        Self {
            field,
            rows: (0..width).map(|_| None).collect(),
            pinned: vec![false; width],
            pinned_count: 0,
            rank: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.rows.len()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn is_complete(&self) -> bool {
        self.rank + self.pinned_count == self.width()
    }

    /// Reduces `coefficients` against the stored rows and keeps the remainder
    /// as a new pivot row if it is nonzero. Returns whether the row was
    /// innovative. Pinned columns of `coefficients` must already be zero.
    pub fn insert(
        &mut self,
        mut coefficients: Vec<u8>,
        mut message: Vec<u8>,
        ops: &mut u64,
    ) -> Result<bool> {
        let field = self.field;
        for col in 0..self.width() {
            let c = coefficients[col];
            if c == 0 {
                continue;
            }
            debug_assert!(!self.pinned[col], "unmasked pinned column {col}");
            match &self.rows[col] {
                Some(row) => {
                    field.mul_add_region(&mut coefficients[col..], &row.coefficients[col..], c);
                    field.mul_add_region(&mut message, &row.message, c);
                    *ops += (self.width() - col + message.len()) as u64;
                }
                None => {
                    let inv = field.inv(c)?;
                    field.scale_region(&mut coefficients[col..], inv);
                    field.scale_region(&mut message, inv);
                    *ops += (self.width() - col + message.len()) as u64;
                    self.rows[col] = Some(PivotRow {
                        coefficients,
                        message,
                    });
                    self.rank += 1;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Substitutes a known value for column `col`.
    pub fn pin(&mut self, col: usize, value: &[u8], ops: &mut u64) -> Result<()> {
        if self.pinned[col] {
            return Ok(());
        }
        self.pinned[col] = true;
        self.pinned_count += 1;

        let field = self.field;
        let displaced = self.rows[col].take();
        for row in self.rows.iter_mut().flatten() {
            let c = row.coefficients[col];
            if c != 0 {
                field.mul_add_region(&mut row.message, value, c);
                row.coefficients[col] = 0;
                *ops += row.message.len() as u64;
            }
        }
        if let Some(mut row) = displaced {
            self.rank -= 1;
            field.mul_add_region(&mut row.message, value, row.coefficients[col]);
            row.coefficients[col] = 0;
            *ops += row.message.len() as u64;
            self.insert(row.coefficients, row.message, ops)?;
        }
        Ok(())
    }

    /// Back-substitutes a complete matrix and returns `(column, value)` for
    /// every column that was not pinned. Leaves the matrix empty.
    pub fn solve(&mut self, ops: &mut u64) -> Vec<(usize, Vec<u8>)> {
        let field = self.field;
        for col in (0..self.width()).rev() {
            let (head, tail) = self.rows.split_at_mut(col);
            let Some(pivot) = tail[0].as_ref() else {
                continue;
            };
            for row in head.iter_mut().flatten() {
                let c = row.coefficients[col];
                if c != 0 {
                    field.mul_add_region(&mut row.message, &pivot.message, c);
                    row.coefficients[col] = 0;
                    *ops += pivot.message.len() as u64;
                }
            }
        }
        self.take_rows()
            .into_iter()
            .map(|(col, row)| (col, row.message))
            .collect()
    }

    /// Removes every stored row, leaving pinned columns as they are.
    pub fn take_rows(&mut self) -> Vec<(usize, PivotRow)> {
        self.rank = 0;
        self.rows
            .iter_mut()
            .enumerate()
            .filter_map(|(col, r)| r.take().map(|row| (col, row)))
            .collect()
    }
}

//! In-memory tabular data model
//!
//! A [`Table`] is an ordered set of named columns plus rows of tagged
//! [`Value`]s. Matching columns are normalized to strings elsewhere
//! ([`crate::normalize`]); the original values stay untouched here so output
//! projection can reproduce the input faithfully.

use chrono::NaiveDate;

/// A single cell value.
///
/// Loaders coerce whatever the container format stores into one of these
/// variants; the engine never inspects anything beyond the matching columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Empty,
}

impl Value {
    /// True for `Empty` and for all-whitespace strings.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Str(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the value the way a loader would have read it back.
    ///
    /// `Empty` renders as the empty string; dates render ISO (`%Y-%m-%d`).
    pub fn to_display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Empty => String::new(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_display())
    }
}

/// An ordered sequence of records with a stable column order.
///
/// Column names are whitespace-trimmed on construction. Rows shorter than the
/// header are padded with [`Value::Empty`]; longer rows are truncated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Table {
            columns: columns
                .into_iter()
                .map(|c| c.as_ref().trim().to_string())
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> &[Value] {
        &self.rows[idx]
    }

    /// Index of a column by exact (trimmed) name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at `(row, column name)`, if the column exists.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        self.column_index(name).map(|c| &self.rows[row][c])
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Empty);
        self.rows.push(row);
    }

    /// New table with the same columns and the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Project onto a subset of columns (silently skipping unknown names).
    pub fn project(&self, columns: &[String]) -> Table {
        let picks: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        Table {
            columns: picks.iter().map(|&c| self.columns[c].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| picks.iter().map(|&c| row[c].clone()).collect())
                .collect(),
        }
    }

    /// Append a column. `values` must have one entry per row.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(name.trim().to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Append another table's rows, aligning by column name.
    ///
    /// Columns unseen so far are added (existing rows padded with `Empty`);
    /// the other table's missing columns become `Empty` cells.
    pub fn append(&mut self, other: &Table) {
        for col in other.columns() {
            if !self.has_column(col) {
                let blanks = vec![Value::Empty; self.rows.len()];
                self.add_column(col, blanks);
            }
        }
        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|c| other.column_index(c))
            .collect();
        for row in other.rows() {
            let aligned: Vec<Value> = mapping
                .iter()
                .map(|m| m.map(|c| row[c].clone()).unwrap_or(Value::Empty))
                .collect();
            self.rows.push(aligned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new(["  Cust_Id ", "first_name"]);
        t.push_row(vec![Value::Int(1), Value::Str("Ann".into())]);
        t.push_row(vec![Value::Int(2), Value::Str("Bob".into())]);
        t
    }

    #[test]
    fn test_column_names_trimmed_on_ingest() {
        let t = sample();
        assert_eq!(t.columns(), &["Cust_Id", "first_name"]);
        assert_eq!(t.column_index("Cust_Id"), Some(0));
        assert_eq!(t.column_index(" first_name "), Some(1));
    }

    #[test]
    fn test_short_rows_padded() {
        let mut t = Table::new(["a", "b", "c"]);
        t.push_row(vec![Value::Int(1)]);
        assert_eq!(t.row(0), &[Value::Int(1), Value::Empty, Value::Empty]);
    }

    #[test]
    fn test_select_preserves_order() {
        let t = sample();
        let picked = t.select(&[1, 0]);
        assert_eq!(picked.get(0, "Cust_Id"), Some(&Value::Int(2)));
        assert_eq!(picked.get(1, "Cust_Id"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_project_skips_unknown_columns() {
        let t = sample();
        let p = t.project(&["first_name".to_string(), "nope".to_string()]);
        assert_eq!(p.columns(), &["first_name"]);
        assert_eq!(p.row_count(), 2);
    }

    #[test]
    fn test_append_aligns_by_name() {
        let mut a = sample();
        let mut b = Table::new(["first_name", "city"]);
        b.push_row(vec![Value::Str("Cyd".into()), Value::Str("Berlin".into())]);
        a.append(&b);
        assert_eq!(a.columns(), &["Cust_Id", "first_name", "city"]);
        assert_eq!(a.row_count(), 3);
        assert_eq!(a.get(0, "city"), Some(&Value::Empty));
        assert_eq!(a.get(2, "Cust_Id"), Some(&Value::Empty));
        assert_eq!(a.get(2, "city"), Some(&Value::Str("Berlin".into())));
    }

    #[test]
    fn test_display_values() {
        assert_eq!(Value::Empty.to_display(), "");
        assert_eq!(Value::Int(7).to_display(), "7");
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()).to_display(),
            "2024-06-01"
        );
    }
}

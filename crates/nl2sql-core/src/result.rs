//! Tabular results and their transport-neutral record form

use std::collections::HashSet;

use serde_json::{Map, Number, Value};

/// A single cell as materialized by an executor
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers outside the i64 range, kept exact as text
    BigInt(String),
    Float(f64),
    /// Fixed-point value in its decimal text form
    Decimal(String),
    Text(String),
    /// ISO-8601 date, time or timestamp
    Temporal(String),
}

impl Scalar {
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::BigInt(s) => Value::String(s.clone()),
            Scalar::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Scalar::Decimal(s) => s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(s.clone())),
            Scalar::Text(s) | Scalar::Temporal(s) => Value::String(s.clone()),
        }
    }
}

/// Ordered rows sharing one column list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl ResultSet {
    /// Repeated column names get a numeric suffix (`x`, `x_1`, ...) so every
    /// column keeps its own key in the record form
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns: unique_names(columns),
            rows: Vec::new(),
        }
    }

    /// Append a row; its width must match the column list
    pub fn push_row(&mut self, row: Vec<Scalar>) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "row has {} values but result has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn unique_names(columns: Vec<String>) -> Vec<String> {
    let reserved: HashSet<String> = columns.iter().cloned().collect();
    let mut seen = HashSet::with_capacity(columns.len());
    let mut assigned = HashSet::with_capacity(columns.len());
    let mut unique = Vec::with_capacity(columns.len());
    for name in columns {
        let chosen = if seen.insert(name.clone()) {
            name
        } else {
            (1..)
                .map(|n| format!("{}_{}", name, n))
                .find(|c| !reserved.contains(c) && !assigned.contains(c))
                .unwrap_or_default()
        };
        assigned.insert(chosen.clone());
        unique.push(chosen);
    }
    unique
}

/// One record per row, keyed by column name
pub fn format_records(result: &ResultSet) -> Vec<Map<String, Value>> {
    if result.columns.is_empty() {
        return Vec::new();
    }

    result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .zip(row)
                .map(|(name, cell)| (name.clone(), cell.to_json()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_records() {
        let mut result = ResultSet::new(vec!["product_name".to_string(), "total".to_string()]);
        result
            .push_row(vec![Scalar::Text("A".to_string()), Scalar::Int(5)])
            .unwrap();
        result
            .push_row(vec![Scalar::Null, Scalar::Decimal("12.50".to_string())])
            .unwrap();

        let records = format_records(&result);
        assert_eq!(records.len(), 2);
        assert_eq!(Value::Object(records[0].clone()), json!({"product_name": "A", "total": 5}));
        assert_eq!(Value::Object(records[1].clone()), json!({"product_name": null, "total": 12.5}));
    }

    #[test]
    fn test_zero_rows_and_zero_columns() {
        assert!(format_records(&ResultSet::new(vec!["a".to_string()])).is_empty());
        assert!(format_records(&ResultSet::default()).is_empty());

        let mut no_columns = ResultSet::default();
        no_columns.push_row(Vec::new()).unwrap();
        assert!(format_records(&no_columns).is_empty());
    }

    #[test]
    fn test_row_width_enforced() {
        let mut result = ResultSet::new(vec!["a".to_string()]);
        assert!(result.push_row(vec![Scalar::Int(1), Scalar::Int(2)]).is_err());
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_scalar_json() {
        assert_eq!(Scalar::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(
            Scalar::BigInt("170141183460469231731687303715884105727".to_string()).to_json(),
            json!("170141183460469231731687303715884105727")
        );
        assert_eq!(
            Scalar::Temporal("2024-01-31T10:00:00".to_string()).to_json(),
            json!("2024-01-31T10:00:00")
        );
        assert_eq!(Scalar::Bool(true).to_json(), json!(true));
    }

    #[test]
    fn test_duplicate_column_names_keep_every_value() {
        let columns = ["x", "x", "x_1", "y"].map(String::from).to_vec();
        let mut result = ResultSet::new(columns);
        assert_eq!(result.columns(), ["x", "x_2", "x_1", "y"]);

        result
            .push_row(vec![
                Scalar::Int(1),
                Scalar::Int(2),
                Scalar::Int(3),
                Scalar::Int(4),
            ])
            .unwrap();
        let records = format_records(&result);
        assert_eq!(
            serde_json::Value::Object(records[0].clone()),
            json!({"x": 1, "x_2": 2, "x_1": 3, "y": 4})
        );
    }
}

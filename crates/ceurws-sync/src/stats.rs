//! Percentage tables and simple descriptive statistics for evaluation reports.

use serde::Serialize;

use crate::table::{Table, TableFormat};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentageRow {
    pub title: String,
    pub value: f64,
    pub percentage: f64,
}

/// Counts relative to a fixed total; the first row is always `Total` at 100%.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentageTable {
    column_title: String,
    total: f64,
    digits: usize,
    rows: Vec<PercentageRow>,
}

impl PercentageTable {
    pub fn new(column_title: impl Into<String>, total: f64, digits: usize) -> Self {
        Self {
            column_title: column_title.into(),
            total,
            digits,
            rows: vec![PercentageRow {
                title: "Total".to_string(),
                value: total,
                percentage: 100.0,
            }],
        }
    }

    pub fn add_value(&mut self, title: impl Into<String>, value: f64) {
        let percentage = if self.total == 0.0 {
            0.0
        } else {
            round_to(value / self.total * 100.0, self.digits)
        };
        self.rows.push(PercentageRow {
            title: title.into(),
            value,
            percentage,
        });
    }

    pub fn rows(&self) -> &[PercentageRow] {
        &self.rows
    }

    pub fn generate_table(&self, format: TableFormat) -> String {
        let mut table = Table::new([self.column_title.as_str(), "#", "%"]);
        for row in &self.rows {
            table.push_row([
                row.title.clone(),
                self.format_number(row.value),
                format!("{:.*}", self.digits, row.percentage),
            ]);
        }
        table.render(format)
    }

    fn format_number(&self, value: f64) -> String {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else {
            format!("{:.*}", self.digits, value)
        }
    }
}

fn round_to(value: f64, digits: usize) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListStats {
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
}

impl ListStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };
        Some(Self {
            count,
            sum,
            min: sorted[0],
            max: sorted[count - 1],
            avg: sum / count as f64,
            median,
        })
    }
}

/// Share of `available` in `total` as a percentage; 0 for an empty total.
pub fn availability(total: usize, available: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        available as f64 / total as f64 * 100.0
    }
}

//! Plain-text tables for status and summary reports.

use std::fmt;
use std::str::FromStr;

use crate::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    Grid,
    Github,
    Plain,
}

impl TableFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Github => "github",
            Self::Plain => "plain",
        }
    }
}

impl FromStr for TableFormat {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(Self::Grid),
            "github" | "pipe" => Ok(Self::Github),
            "plain" | "simple" => Ok(Self::Plain),
            _ => Err(SyncError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    aligns: Option<Vec<Align>>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            aligns: None,
            rows: Vec::new(),
        }
    }

    /// Fix column alignment; without it numeric columns align right and the rest left.
    pub fn with_alignments(mut self, aligns: &[Align]) -> Self {
        self.aligns = Some(aligns.to_vec());
        self
    }

    pub fn push_row<S: Into<String>>(&mut self, cells: impl IntoIterator<Item = S>) {
        let mut row = cells.into_iter().map(Into::into).collect::<Vec<String>>();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self, format: TableFormat) -> String {
        let widths = self.column_widths();
        let aligns = self.column_alignments();
        match format {
            TableFormat::Grid => self.render_grid(&widths, &aligns),
            TableFormat::Github => self.render_github(&widths, &aligns),
            TableFormat::Plain => self.render_plain(&widths, &aligns),
        }
    }

    fn column_widths(&self) -> Vec<usize> {
        (0..self.headers.len())
            .map(|col| {
                std::iter::once(&self.headers[col])
                    .chain(self.rows.iter().map(|row| &row[col]))
                    .map(|cell| display_width(cell))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    fn column_alignments(&self) -> Vec<Align> {
        (0..self.headers.len())
            .map(|col| {
                if let Some(align) = self.aligns.as_ref().and_then(|a| a.get(col)) {
                    return *align;
                }
                let numeric = !self.rows.is_empty()
                    && self
                        .rows
                        .iter()
                        .all(|row| row[col].trim().parse::<f64>().is_ok());
                if numeric {
                    Align::Right
                } else {
                    Align::Left
                }
            })
            .collect()
    }

    fn render_grid(&self, widths: &[usize], aligns: &[Align]) -> String {
        let border = |fill: char| {
            let mut line = String::from("+");
            for width in widths {
                line.extend(std::iter::repeat(fill).take(width + 2));
                line.push('+');
            }
            line
        };
        let mut lines = vec![border('-'), boxed_row(&self.headers, widths, aligns), border('=')];
        for row in &self.rows {
            lines.push(boxed_row(row, widths, aligns));
            lines.push(border('-'));
        }
        if self.rows.is_empty() {
            lines.pop();
            lines.push(border('-'));
        }
        lines.join("\n")
    }

    fn render_github(&self, widths: &[usize], aligns: &[Align]) -> String {
        let mut rule = String::from("|");
        for (width, align) in widths.iter().zip(aligns) {
            let dashes = "-".repeat(*width);
            let cell = match align {
                Align::Left => format!(":{dashes}-"),
                Align::Center => format!(":{dashes}:"),
                Align::Right => format!("-{dashes}:"),
            };
            rule.push_str(&cell);
            rule.push('|');
        }
        let mut lines = vec![boxed_row(&self.headers, widths, aligns), rule];
        lines.extend(self.rows.iter().map(|row| boxed_row(row, widths, aligns)));
        lines.join("\n")
    }

    fn render_plain(&self, widths: &[usize], aligns: &[Align]) -> String {
        std::iter::once(&self.headers)
            .chain(self.rows.iter())
            .map(|row| {
                row.iter()
                    .zip(widths.iter().zip(aligns))
                    .map(|(cell, (width, align))| pad(cell, *width, *align))
                    .collect::<Vec<_>>()
                    .join("  ")
                    .trim_end()
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn boxed_row(cells: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let mut line = String::from("|");
    for ((cell, width), align) in cells.iter().zip(widths).zip(aligns) {
        line.push(' ');
        line.push_str(&pad(cell, *width, *align));
        line.push_str(" |");
    }
    line
}

fn display_width(text: &str) -> usize {
    text.chars().count()
}

fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(display_width(text));
    let (left, right) = match align {
        Align::Left => (0, fill),
        Align::Right => (fill, 0),
        Align::Center => (fill / 2, fill - fill / 2),
    };
    format!("{}{text}{}", " ".repeat(left), " ".repeat(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(["name", "#"]);
        table.push_row(["local", "12"]);
        table.push_row(["wikidata", "3"]);
        table
    }

    #[test]
    fn grid_boxes_every_row() {
        let expected = "\
+----------+----+
| name     |  # |
+==========+====+
| local    | 12 |
+----------+----+
| wikidata |  3 |
+----------+----+";
        assert_eq!(sample().render(TableFormat::Grid), expected);
    }

    #[test]
    fn github_marks_alignment() {
        let expected = "\
| name     |  # |
|:---------|---:|
| local    | 12 |
| wikidata |  3 |";
        assert_eq!(sample().render(TableFormat::Github), expected);
    }

    #[test]
    fn plain_pads_columns_without_borders() {
        let expected = "name       #\nlocal     12\nwikidata   3";
        assert_eq!(sample().render(TableFormat::Plain), expected);
    }

    #[test]
    fn center_alignment_counts_arrow_glyphs_as_one_column() {
        let mut table = Table::new(["↔"]).with_alignments(&[Align::Center]);
        table.push_row(["←"]);
        table.push_row(["both"]);
        let rendered = table.render(TableFormat::Github);
        assert!(rendered.contains("|  ←   |"), "{rendered}");
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert_eq!("pipe".parse::<TableFormat>(), Ok(TableFormat::Github));
        assert_eq!(
            "latexx".parse::<TableFormat>(),
            Err(SyncError::InvalidFormat("latexx".to_string()))
        );
    }
}

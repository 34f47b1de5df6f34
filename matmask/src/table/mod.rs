//! # Table Module
//!
//! Reads labelled numeric tables from delimited text: a header row of column labels,
//! then one row per record whose first cell is the row label.
//!
//! ```text
//! ,math,english
//! alice,80,72.5
//! bob,64,90
//! ```

use crate::errors::MatMaskError;
use crate::linalg::Matrix;

use itertools::Itertools;

use std::fs;
use std::path::Path;

pub const DEFAULT_DELIMITER: char = ',';

/// A numeric table together with the labels stripped from its edges.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable {
    /// Header cells after the corner cell.
    pub column_labels: Vec<String>,
    /// First cell of each data row.
    pub row_labels: Vec<String>,
    pub values: Matrix,
}

/// Reads and parses the table stored at `path`.
pub fn read_table(path: impl AsRef<Path>, delimiter: char) -> Result<LabeledTable, MatMaskError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    parse_table(&text, delimiter).map_err(|e| match e {
        MatMaskError::MalformedInput(msg) => {
            MatMaskError::MalformedInput(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Parses delimited text into a [`LabeledTable`].
///
/// Blank lines are skipped and cells are trimmed. A cell wrapped in double quotes may
/// contain the delimiter, and `""` inside it stands for one quote; quoted cells keep
/// their inner whitespace and cannot span lines.
///
/// # Errors
///
/// Returns `MatMaskError::MalformedInput` if there is no header or no data row, if a
/// row's cell count differs from the header's, if a quote is left open, or if a value
/// cell is not a number.
/// No partial table is returned.
pub fn parse_table(text: &str, delimiter: char) -> Result<LabeledTable, MatMaskError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| MatMaskError::MalformedInput("table is empty".to_string()))?;
    let (header_index, header) = header;
    let header = split_cells(header, delimiter, header_index + 1)?;
    if header.len() < 2 {
        return Err(MatMaskError::MalformedInput(
            "header must contain a corner cell and at least one column label".to_string(),
        ));
    }
    let column_labels = header[1..].to_vec();

    let mut row_labels = Vec::new();
    let mut rows = Vec::new();
    for (index, line) in lines {
        let line_no = index + 1;
        let cells = split_cells(line, delimiter, line_no)?;
        if cells.len() != header.len() {
            return Err(MatMaskError::MalformedInput(format!(
                "line {} has {} cells but the header has {}",
                line_no,
                cells.len(),
                header.len()
            )));
        }

        let values = cells[1..]
            .iter()
            .enumerate()
            .map(|(col, cell)| parse_cell(cell, line_no, &column_labels[col]))
            .collect::<Result<Vec<f64>, _>>()?;

        row_labels.push(cells[0].clone());
        rows.push(values);
    }

    if rows.is_empty() {
        return Err(MatMaskError::MalformedInput(
            "table has a header but no data rows".to_string(),
        ));
    }

    Ok(LabeledTable {
        column_labels,
        row_labels,
        values: Matrix::from_rows(rows)?,
    })
}

fn split_cells(line: &str, delimiter: char, line_no: usize) -> Result<Vec<String>, MatMaskError> {
    let mut cells = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.next_if(|&c| c != delimiter && c.is_whitespace()).is_some() {}

        let cell = if chars.next_if_eq(&'"').is_some() {
            let mut cell = String::new();
            loop {
                match chars.next() {
                    Some('"') if chars.next_if_eq(&'"').is_some() => cell.push('"'),
                    Some('"') => break,
                    Some(c) => cell.push(c),
                    None => {
                        return Err(MatMaskError::MalformedInput(format!(
                            "line {}: quoted cell is not closed",
                            line_no
                        )));
                    }
                }
            }
            while chars.next_if(|&c| c != delimiter && c.is_whitespace()).is_some() {}
            if chars.peek().is_some_and(|&c| c != delimiter) {
                return Err(MatMaskError::MalformedInput(format!(
                    "line {}: unexpected text after quoted cell '{}'",
                    line_no, cell
                )));
            }
            cell
        } else {
            chars
                .peeking_take_while(|&c| c != delimiter)
                .collect::<String>()
                .trim()
                .to_string()
        };
        cells.push(cell);

        // Anything left starts with the delimiter.
        if chars.next().is_none() {
            return Ok(cells);
        }
    }
}

fn parse_cell(cell: &str, line_no: usize, column: &str) -> Result<f64, MatMaskError> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            MatMaskError::MalformedInput(format!(
                "line {}, column '{}': '{}' is not a number",
                line_no, column, cell
            ))
        })
}

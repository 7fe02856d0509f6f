//! # Table loading and matrix output
//!
//! Reads delimited numeric tables into the `ndarray` layout consumed by the
//! estimator and writes the labelled covariance matrix back out.
//!
//! - The first row is a header naming every feature.
//! - Empty cells and the tokens `NA`, `N/A`, `NaN`, `null` and `.` (any case)
//!   are missing and become NaN. Everything else must parse as a number.
//! - Paths ending in `.gz` are decompressed on the fly; `-` reads stdin.

use flate2::read::MultiGzDecoder;
use ndarray::{Array2, ArrayView2};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

const MISSING_TOKENS: [&[u8]; 6] = [b"", b"na", b"n/a", b"nan", b"null", b"."];

/// A validated table ready for estimation.
#[derive(Debug)]
pub struct LoadedTable {
    /// Feature names from the header row.
    pub columns: Vec<String>,
    /// Shape: [n_rows, n_features]. Missing entries are NaN.
    pub values: Array2<f64>,
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Error from the CSV reader: {0}")]
    Csv(#[from] csv::Error),
    #[error("The input '{0}' has no header row naming its columns.")]
    NoColumns(String),
    #[error("Line {line} has {found} fields, but the header declares {expected}.")]
    RaggedRow {
        line: u64,
        found: usize,
        expected: usize,
    },
    #[error("Could not parse '{value}' on line {line}, column '{column}', as a number.")]
    InvalidNumber {
        line: u64,
        column: String,
        value: String,
    },
    #[error("Table shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("A {rows}x{cols} matrix cannot be labelled with {labels} column names.")]
    LabelMismatch {
        rows: usize,
        cols: usize,
        labels: usize,
    },
}

fn open_input(path: &Path) -> Result<Box<dyn Read>, DataError> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

fn parse_cell(raw: &[u8]) -> Option<f64> {
    let trimmed = raw.trim_ascii();
    if MISSING_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        return Some(f64::NAN);
    }
    lexical_core::parse::<f64>(trimmed).ok()
}

/// Loads a delimited table with a header row.
pub fn load_table(path: &Path, delimiter: u8) -> Result<LoadedTable, DataError> {
    let input = open_input(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    if columns.is_empty() || columns.iter().all(String::is_empty) {
        return Err(DataError::NoColumns(path.display().to_string()));
    }
    let n_features = columns.len();

    let mut values = Vec::new();
    let mut n_rows = 0usize;
    let mut record = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let line = record.position().map_or(0, |position| position.line());
        if record.len() != n_features {
            return Err(DataError::RaggedRow {
                line,
                found: record.len(),
                expected: n_features,
            });
        }
        for (field, column) in record.iter().zip(columns.iter()) {
            let value = parse_cell(field).ok_or_else(|| DataError::InvalidNumber {
                line,
                column: column.clone(),
                value: String::from_utf8_lossy(field).into_owned(),
            })?;
            values.push(value);
        }
        n_rows += 1;
    }

    log::info!(
        "Loaded {n_rows} rows and {n_features} columns from {}",
        path.display()
    );

    Ok(LoadedTable {
        columns,
        values: Array2::from_shape_vec((n_rows, n_features), values)?,
    })
}

/// Writes `matrix` as a tab-separated table labelled by `columns` on both axes.
pub fn write_covariance<W: Write>(
    writer: W,
    columns: &[String],
    matrix: ArrayView2<'_, f64>,
) -> Result<(), DataError> {
    let (rows, cols) = matrix.dim();
    if rows != columns.len() || cols != columns.len() {
        return Err(DataError::LabelMismatch {
            rows,
            cols,
            labels: columns.len(),
        });
    }

    let mut writer = BufWriter::new(writer);
    write!(writer, "feature")?;
    for name in columns {
        write!(writer, "\t{name}")?;
    }
    writeln!(writer)?;

    let mut buffer = ryu::Buffer::new();
    for (name, row) in columns.iter().zip(matrix.rows()) {
        writer.write_all(name.as_bytes())?;
        for &value in row.iter() {
            writer.write_all(b"\t")?;
            writer.write_all(buffer.format(value).as_bytes())?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

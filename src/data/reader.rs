use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::config::IngestOptions;
use crate::error::IngestError;

use super::accumulator::{ChunkAccumulator, FinalizedTable};

/// Source identifier used for streams that are not backed by a path.
pub const IN_MEMORY_SOURCE: &str = "in-memory";

// ---------------------------------------------------------------------------
// Delimiter / header detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
    Whitespace,
}

impl Delimiter {
    /// Comma wins over tab, tab over generic whitespace.
    pub fn detect(line: &str) -> Self {
        if line.contains(',') {
            Delimiter::Comma
        } else if line.contains('\t') {
            Delimiter::Tab
        } else {
            Delimiter::Whitespace
        }
    }

    fn byte(self) -> Option<u8> {
        match self {
            Delimiter::Comma => Some(b','),
            Delimiter::Tab => Some(b'\t'),
            Delimiter::Whitespace => None,
        }
    }
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// A header token is text that is not itself a number (`1e-3`, `nan` and
/// `inf` all contain letters but are data).
fn looks_like_label(token: &str) -> bool {
    let token = token.trim();
    token.chars().any(char::is_alphabetic) && token.parse::<f64>().is_err()
}

pub(crate) fn parse_cell(cell: &str) -> f64 {
    cell.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Blank names become positional, repeated names get a `.N` suffix.
fn unique_names(tokens: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let base = if token.trim().is_empty() {
                format!("col{i}")
            } else {
                token.trim().to_string()
            };
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                name = format!("{base}.{n}");
                n += 1;
            }
            name
        })
        .collect()
}

fn csv_builder(delimiter: u8) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'));
    builder
}

// ---------------------------------------------------------------------------
// StreamingTableReader
// ---------------------------------------------------------------------------

/// One column-major block of at most `chunk_size` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableChunk {
    /// `values[c][r]`: cell of column `c` in row `r`; NaN where coercion failed.
    pub values: Vec<Vec<f64>>,
    pub rows: usize,
}

enum Rows<R> {
    Delimited(csv::Reader<R>),
    Whitespace(R),
}

/// Reads a delimited text table in bounded-memory chunks.
///
/// The first non-comment line decides the delimiter and whether a header is
/// present; everything after it is streamed, never materialised as a whole.
pub struct StreamingTableReader<R: BufRead> {
    rows: Rows<R>,
    columns: Vec<String>,
    delimiter: Delimiter,
    has_header: bool,
    chunk_size: usize,
    source: String,
    first_row: Option<Vec<String>>,
    record: csv::StringRecord,
    line: String,
    finished: bool,
}

impl StreamingTableReader<BufReader<File>> {
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self, IngestError> {
        let file = File::open(path)?;
        Self::from_reader(
            BufReader::new(file),
            path.display().to_string(),
            chunk_size,
        )
    }
}

impl<R: BufRead> StreamingTableReader<R> {
    pub fn from_reader(
        mut reader: R,
        source: impl Into<String>,
        chunk_size: usize,
    ) -> Result<Self, IngestError> {
        let source = source.into();
        let mut line = String::new();
        let first_line = loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break None;
            }
            if !is_skippable(&line) {
                break Some(line.trim_end_matches(['\r', '\n']).to_string());
            }
        };

        let Some(first_line) = first_line else {
            return Ok(Self {
                rows: Rows::Whitespace(reader),
                columns: Vec::new(),
                delimiter: Delimiter::Whitespace,
                has_header: false,
                chunk_size: chunk_size.max(1),
                source,
                first_row: None,
                record: csv::StringRecord::new(),
                line,
                finished: true,
            });
        };

        let delimiter = Delimiter::detect(&first_line);
        let tokens: Vec<String> = match delimiter.byte() {
            Some(byte) => {
                let mut record = csv::StringRecord::new();
                csv_builder(byte)
                    .from_reader(first_line.as_bytes())
                    .read_record(&mut record)?;
                record.iter().map(str::to_string).collect()
            }
            None => first_line.split_whitespace().map(str::to_string).collect(),
        };

        let has_header = tokens.iter().any(|t| looks_like_label(t));
        let (columns, first_row) = if has_header {
            (unique_names(&tokens), None)
        } else {
            let names = (0..tokens.len()).map(|i| format!("col{i}")).collect();
            (names, Some(tokens))
        };
        debug!(
            "{source}: {delimiter:?} delimited, {} columns, header: {has_header}",
            columns.len()
        );

        let rows = match delimiter.byte() {
            Some(byte) => Rows::Delimited(csv_builder(byte).from_reader(reader)),
            None => Rows::Whitespace(reader),
        };

        Ok(Self {
            rows,
            columns,
            delimiter,
            has_header,
            chunk_size: chunk_size.max(1),
            source,
            first_row,
            record: csv::StringRecord::new(),
            line,
            finished: false,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Next block of rows, or `None` once the input is exhausted.
    ///
    /// Short rows are padded with NaN, surplus cells are ignored.
    pub fn next_chunk(&mut self) -> Result<Option<TableChunk>, IngestError> {
        if self.finished {
            return Ok(None);
        }

        let width = self.columns.len();
        let mut values = vec![Vec::with_capacity(self.chunk_size.min(65_536)); width];
        let mut rows = 0;

        if let Some(first) = self.first_row.take() {
            push_row(&mut values, first.iter().map(String::as_str));
            rows += 1;
        }

        while rows < self.chunk_size {
            match &mut self.rows {
                Rows::Delimited(reader) => {
                    if !reader.read_record(&mut self.record)? {
                        self.finished = true;
                        break;
                    }
                    let first = self.record.get(0).unwrap_or("");
                    // A lone empty field is a blank line; `,,` is a row of NaNs.
                    let blank = self.record.len() <= 1 && first.is_empty();
                    if first.starts_with('#') || blank {
                        continue;
                    }
                    push_row(&mut values, self.record.iter());
                }
                Rows::Whitespace(reader) => {
                    self.line.clear();
                    if reader.read_line(&mut self.line)? == 0 {
                        self.finished = true;
                        break;
                    }
                    if is_skippable(&self.line) {
                        continue;
                    }
                    push_row(&mut values, self.line.split_whitespace());
                }
            }
            rows += 1;
        }

        if rows == 0 {
            return Ok(None);
        }
        Ok(Some(TableChunk { values, rows }))
    }
}

fn push_row<'a>(values: &mut [Vec<f64>], cells: impl Iterator<Item = &'a str>) {
    let mut cells = cells;
    for column in values.iter_mut() {
        column.push(cells.next().map_or(f64::NAN, parse_cell));
    }
}

/// Stream every chunk of `reader` through a fresh accumulator.
///
/// Fails on empty input and on input without any numeric column; skipped
/// columns are reported as warnings.
pub fn read_table<R: BufRead>(
    mut reader: StreamingTableReader<R>,
    options: &IngestOptions,
) -> Result<FinalizedTable, IngestError> {
    let mut accumulator = ChunkAccumulator::new(&options.tier_capacities, options.seed);
    let columns = reader.columns().to_vec();

    let mut chunks = 0usize;
    while let Some(chunk) = reader.next_chunk()? {
        accumulator.process_chunk(&columns, &chunk.values);
        chunks += 1;
        debug!(
            "{}: chunk {chunks} ({} rows, {} total)",
            reader.source(),
            chunk.rows,
            accumulator.row_count()
        );
    }

    accumulator.finalize().validate(reader.source())
}

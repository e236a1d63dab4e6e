use crate::error::{BuildError, Result};
use csv::StringRecord;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

/// An in-memory tabular source: header row plus string records.
#[derive(Debug, Clone)]
pub struct Table {
    pub source_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl Table {
    pub fn column(&self, name: &str) -> Result<usize> {
        self.find_column(name)
            .ok_or_else(|| BuildError::schema(&self.source_name, name))
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Line number of a row in its source file, for error messages.
    pub fn line_of(&self, row: usize) -> u64 {
        self.rows
            .get(row)
            .and_then(|r| r.position())
            .map(|p| p.line())
            .unwrap_or(0)
    }

    /// Left join on `key`: every row of `self` is kept, extended with the
    /// first matching row of `right` (or empty cells when there is none).
    /// Columns of `right` whose name already exists on the left are skipped.
    pub fn left_join(self, right: &Table, key: &str) -> Result<Table> {
        let left_key = self.column(key)?;
        let right_key = right.column(key)?;

        let existing: HashSet<&str> = self.headers.iter().map(String::as_str).collect();
        let carried: Vec<usize> = right
            .headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != right_key && !existing.contains(h.as_str()))
            .map(|(i, _)| i)
            .collect();

        let mut lookup: HashMap<&str, usize> = HashMap::with_capacity(right.rows.len());
        for (i, row) in right.rows.iter().enumerate() {
            if let Some(id) = row.get(right_key) {
                lookup.entry(id.trim()).or_insert(i);
            }
        }

        let mut headers = self.headers.clone();
        headers.extend(carried.iter().map(|&i| right.headers[i].clone()));

        // extend the left records in place
        let mut rows = self.rows;
        for row in &mut rows {
            let matched = row
                .get(left_key)
                .and_then(|id| lookup.get(id.trim()))
                .map(|&i| &right.rows[i]);
            for &col in &carried {
                row.push_field(matched.and_then(|r| r.get(col)).unwrap_or(""));
            }
        }

        Ok(Table {
            source_name: format!("{}+{}", self.source_name, right.source_name),
            headers,
            rows,
        })
    }
}

/// Streams delimited text files record by record.
pub struct CsvTableReader {
    pub delimiter: u8,
}

impl Default for CsvTableReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvTableReader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    /// Visit every record of `path` without buffering the file. Returns the
    /// header row.
    pub fn stream<F>(&self, path: &Path, source_name: &str, mut visit: F) -> Result<Vec<String>>
    where
        F: FnMut(&StringRecord) -> Result<()>,
    {
        if !path.is_file() {
            return Err(BuildError::missing(source_name, path));
        }
        let file = File::open(path).map_err(|_| BuildError::missing(source_name, path))?;

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(file);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| BuildError::csv(source_name, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut record = StringRecord::new();
        loop {
            match rdr.read_record(&mut record) {
                Ok(true) => visit(&record)?,
                Ok(false) => break,
                Err(e) => return Err(BuildError::csv(source_name, e)),
            }
        }

        Ok(headers)
    }

    /// Read a whole table. Rows with fewer fields than the header are
    /// rejected.
    pub fn read_table(&self, path: &Path, source_name: &str) -> Result<Table> {
        let mut rows = Vec::new();
        let headers = self.stream(path, source_name, |record| {
            rows.push(record.clone());
            Ok(())
        })?;

        for row in &rows {
            if row.len() < headers.len() {
                return Err(BuildError::MalformedRecord {
                    source_name: source_name.to_string(),
                    line: row.position().map(|p| p.line()).unwrap_or(0),
                    detail: format!("expected {} fields, found {}", headers.len(), row.len()),
                });
            }
        }

        Ok(Table {
            source_name: source_name.to_string(),
            headers,
            rows,
        })
    }
}

//! Decoding of `--format "table ..."` output
//!
//! Docker prints a header line followed by one delimited row per record. The
//! number of columns drifts between CLI versions, so rows shorter than the
//! caller's minimum are dropped instead of being partially populated. Numeric
//! helpers never fail: anything unparsable becomes zero.

/// Marker docker puts in front of the name column of a history row
pub const CHILD_ROW_MARKER: &str = "\\_";

/// Field delimiter used by every table format string dockhand issues
pub const FIELD_DELIMITER: char = '|';

/// Decode a header-first table into records, skipping rows with fewer than `min_fields` fields
pub fn decode_table<T, S, F>(lines: &[S], delimiter: char, min_fields: usize, row_mapper: F) -> Vec<T>
where
    S: AsRef<str>,
    F: FnMut(&[&str]) -> T,
{
    TableDecoder::new(delimiter, min_fields).decode(lines, row_mapper)
}

#[derive(Debug, Clone, Copy)]
pub struct TableDecoder {
    delimiter: char,
    min_fields: usize,
}

impl TableDecoder {
    pub fn new(delimiter: char, min_fields: usize) -> Self {
        Self {
            delimiter,
            min_fields,
        }
    }

    /// Pipe-delimited decoder
    pub fn piped(min_fields: usize) -> Self {
        Self::new(FIELD_DELIMITER, min_fields)
    }

    fn rows<'a, S: AsRef<str>>(&self, lines: &'a [S]) -> impl Iterator<Item = Vec<&'a str>> + 'a {
        let delimiter = self.delimiter;
        let min_fields = self.min_fields;
        lines
            .iter()
            .skip(1)
            .map(move |line| line.as_ref().split(delimiter).collect::<Vec<_>>())
            .filter(move |fields| {
                let keep = fields.len() >= min_fields;
                if !keep {
                    tracing::trace!("Skipping table row with {} fields", fields.len());
                }
                keep
            })
    }

    pub fn decode<T, S, F>(&self, lines: &[S], mut row_mapper: F) -> Vec<T>
    where
        S: AsRef<str>,
        F: FnMut(&[&str]) -> T,
    {
        self.rows(lines).map(|fields| row_mapper(&fields)).collect()
    }

    /// Decode a table whose `key_column` may carry [`CHILD_ROW_MARKER`].
    ///
    /// Marked rows are mapped with the marker stripped from the key field and
    /// handed to `attach` together with the most recent top-level record.
    /// Marked rows that appear before any top-level record are dropped.
    pub fn decode_grouped<T, S, F, A>(
        &self,
        lines: &[S],
        key_column: usize,
        mut row_mapper: F,
        mut attach: A,
    ) -> Vec<T>
    where
        S: AsRef<str>,
        F: FnMut(&[&str]) -> T,
        A: FnMut(&mut T, T),
    {
        let mut records: Vec<T> = Vec::new();

        for mut fields in self.rows(lines) {
            let child_key = fields
                .get(key_column)
                .copied()
                .and_then(|key| key.trim_start().strip_prefix(CHILD_ROW_MARKER))
                .map(str::trim);

            match child_key {
                Some(key) => {
                    fields[key_column] = key;
                    let child = row_mapper(&fields);
                    match records.last_mut() {
                        Some(parent) => attach(parent, child),
                        None => tracing::trace!("Dropping child row without a parent"),
                    }
                }
                None => records.push(row_mapper(&fields)),
            }
        }

        records
    }
}

/// Integer value of a field, zero when it is not numeric
pub fn parse_int(field: &str) -> i64 {
    field.trim().parse().unwrap_or(0)
}

/// Float value of a field with an optional trailing `%`, zero when it is not numeric
pub fn parse_float(field: &str) -> f64 {
    let trimmed = field.trim();
    trimmed
        .strip_suffix('%')
        .unwrap_or(trimmed)
        .trim()
        .parse()
        .unwrap_or(0.0)
}

/// Split a `current/total` column; a missing side is zero
pub fn parse_ratio(field: &str) -> (i64, i64) {
    let mut sides = field.splitn(2, '/');
    let current = sides.next().map(parse_int).unwrap_or(0);
    let total = sides.next().map(parse_int).unwrap_or(0);
    (current, total)
}

/// Field at `index`, or an empty string
pub fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

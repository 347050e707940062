//! `TabSeparatedWithNamesAndTypes` decoding shared by both transports

use crate::error::{OrmError, OrmResult};
use crate::fields::{parse_type_name_lenient, split_tsv_line, FieldType};

use super::parse_exception;

/// Column names and types from the two header lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultHeader {
    pub names: Vec<String>,
    pub types: Vec<FieldType>,
}

impl ResultHeader {
    pub fn parse(names_line: &str, types_line: &str, statement: &str) -> OrmResult<Self> {
        for line in [names_line, types_line] {
            if let Some(err) = exception_line(line, statement) {
                return Err(err);
            }
        }

        let names: Vec<String> = split_tsv_line(names_line)
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let types: Vec<FieldType> = split_tsv_line(types_line)
            .into_iter()
            .map(|t| parse_type_name_lenient(&t.unwrap_or_default()))
            .collect();

        if names.len() != types.len() {
            return Err(OrmError::decode(
                "<header>",
                Some(types_line),
                format!("{} column names but {} types", names.len(), types.len()),
            )
            .with_statement(statement));
        }
        Ok(Self { names, types })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// A server exception written into the body in place of a line
fn exception_line(line: &str, statement: &str) -> Option<OrmError> {
    if !line.starts_with("Code: ") || !line.contains("DB::Exception") {
        return None;
    }
    parse_exception(line).map(|(code, message)| OrmError::Server {
        code,
        message,
        statement: statement.to_string(),
    })
}

/// Split one data line into raw cells; `None` is SQL NULL
pub(crate) fn decode_row(
    line: &str,
    header: &ResultHeader,
    statement: &str,
) -> OrmResult<Vec<Option<String>>> {
    let cells = split_tsv_line(line);
    // A well-formed row may hold exception text. Single-column results
    // cannot tell the two apart, so there the exception wins.
    if cells.len() != header.len() || header.len() == 1 {
        if let Some(err) = exception_line(line, statement) {
            return Err(err);
        }
    }
    if cells.len() != header.len() {
        let column = header
            .names
            .get(cells.len().min(header.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| "<row>".to_string());
        return Err(OrmError::decode(
            column,
            Some(line),
            format!("expected {} cells, got {}", header.len(), cells.len()),
        )
        .with_statement(statement));
    }
    Ok(cells)
}

/// Strip the line terminator and validate UTF-8
pub(crate) fn line_from_bytes(mut bytes: Vec<u8>) -> OrmResult<String> {
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes)
        .map_err(|e| OrmError::transport_from("response is not valid UTF-8", e))
}

/// Collects body chunks and hands out complete lines
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
    /// Start of the first unread line in `pending`
    start: usize,
}

impl LineBuffer {
    pub(crate) fn extend(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.pending.drain(..self.start);
            self.start = 0;
        }
        self.pending.extend_from_slice(chunk);
    }

    /// Next complete line, if one is buffered
    pub(crate) fn pop_line(&mut self) -> OrmResult<Option<String>> {
        let unread = &self.pending[self.start..];
        match unread.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let line = unread[..=pos].to_vec();
                self.start += pos + 1;
                line_from_bytes(line).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Whatever is left once the body has ended
    pub(crate) fn finish(&mut self) -> OrmResult<Option<String>> {
        let rest = self.pending.split_off(self.start);
        self.pending.clear();
        self.start = 0;
        if rest.is_empty() {
            return Ok(None);
        }
        line_from_bytes(rest).map(Some)
    }
}

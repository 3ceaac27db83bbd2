//! Workbook (xlsx) reading for the tabular extractor.
//!
//! An xlsx file is a ZIP archive of SpreadsheetML parts. This module reads
//! each worksheet into a 2-D table of cell strings and renders the tables
//! as row-major text: one line per row, cells joined by ` | `.

use std::io::Read;

use quick_xml::events::Event;
use quick_xml::Reader;

/// Maximum sheets to process in a workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Columns in a worksheet (`A` through `XFD`).
const XLSX_MAX_COLUMNS: usize = 16_384;

/// Cell separator used when rendering a row.
pub const CELL_SEPARATOR: &str = " | ";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("not a readable workbook: {0}")]
    Archive(String),
    #[error("malformed spreadsheet XML: {0}")]
    Xml(String),
}

/// One worksheet as rows of cell strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

/// Read every worksheet of an xlsx workbook.
pub fn read_workbook(bytes: &[u8]) -> Result<Vec<Table>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Archive(e.to_string()))?;

    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        let xml = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?;
        read_shared_strings(&xml)?
    } else {
        Vec::new()
    };

    let sheet_names = if archive.file_names().any(|n| n == "xl/workbook.xml") {
        let xml = read_zip_entry_bounded(&mut archive, "xl/workbook.xml")?;
        read_sheet_names(&xml)?
    } else {
        Vec::new()
    };

    let parts = list_worksheet_parts(&archive);
    if parts.is_empty() {
        return Err(ExtractError::Archive("workbook has no worksheets".into()));
    }

    let mut tables = Vec::new();
    for (idx, part) in parts.into_iter().take(XLSX_MAX_SHEETS).enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, &part)?;
        let rows = read_sheet_rows(&xml, &shared_strings)?;
        let name = sheet_names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", idx + 1));
        tables.push(Table { name, rows });
    }
    Ok(tables)
}

/// Render tables as human-readable row-major text.
///
/// Sheet headings (`# name`) are only emitted for multi-sheet workbooks.
/// Trailing empty cells are dropped; fully empty rows are skipped.
pub fn render_tables(tables: &[Table]) -> String {
    let with_headings = tables.len() > 1;
    let mut blocks = Vec::new();

    for table in tables {
        let mut lines = Vec::new();
        if with_headings {
            lines.push(format!("# {}", table.name));
        }
        for row in &table.rows {
            let last = row.iter().rposition(|c| !c.is_empty());
            if let Some(last) = last {
                lines.push(row[..=last].join(CELL_SEPARATOR));
            }
        }
        blocks.push(lines.join("\n"));
    }

    blocks.join("\n\n")
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Archive(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Archive(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Archive(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn list_worksheet_parts(archive: &Archive<'_>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Shared string table; rich-text runs inside one `<si>` are concatenated.
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = current.is_some(),
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                let text = te.unescape().map_err(|e| ExtractError::Xml(e.to_string()))?;
                if let Some(s) = current.as_mut() {
                    s.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    if let Some(s) = current.take() {
                        strings.push(s);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn read_sheet_names(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut names = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"name" {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| ExtractError::Xml(e.to_string()))?;
                        names.push(value.into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

/// Column index from a cell reference such as `"B7"` (`A` = 0).
///
/// `Ok(None)` when the reference has no column letters; an error when the
/// column lies past `XFD`.
fn column_index(cell_ref: &str) -> Result<Option<usize>, ExtractError> {
    let letters = cell_ref.bytes().take_while(|b| b.is_ascii_alphabetic());
    let mut col = 0usize;
    for b in letters {
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(digit))
            .filter(|c| *c <= XLSX_MAX_COLUMNS)
            .ok_or_else(|| ExtractError::Xml(format!("cell reference {} out of range", cell_ref)))?;
    }
    Ok(col.checked_sub(1))
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    SharedString,
    Boolean,
    Plain,
}

fn read_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row: Option<Vec<String>> = None;
    let mut cell_col = 0usize;
    let mut cell_kind = CellKind::Plain;
    let mut cell_text = String::new();
    let mut in_cell = false;
    let mut capture = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => {
                    let next_col = row.as_ref().map(|r| r.len()).unwrap_or(0);
                    cell_col = next_col;
                    cell_kind = CellKind::Plain;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => {
                                let value = String::from_utf8_lossy(&attr.value).into_owned();
                                cell_col = column_index(&value)?.unwrap_or(next_col);
                            }
                            b"t" => {
                                cell_kind = match attr.value.as_ref() {
                                    b"s" => CellKind::SharedString,
                                    b"b" => CellKind::Boolean,
                                    _ => CellKind::Plain,
                                };
                            }
                            _ => {}
                        }
                    }
                    cell_text.clear();
                    in_cell = true;
                }
                b"v" | b"t" if in_cell => capture = true,
                _ => {}
            },
            Ok(Event::Text(te)) if capture => {
                let text = te.unescape().map_err(|e| ExtractError::Xml(e.to_string()))?;
                cell_text.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    in_cell = false;
                    let value = resolve_cell(cell_kind, cell_text.trim(), shared_strings);
                    if let Some(r) = row.as_mut() {
                        if r.len() <= cell_col {
                            r.resize(cell_col + 1, String::new());
                        }
                        r[cell_col] = value;
                        cell_count += 1;
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        rows.push(r);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

fn resolve_cell(kind: CellKind, raw: &str, shared_strings: &[String]) -> String {
    match kind {
        CellKind::SharedString => raw
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i).cloned())
            .unwrap_or_default(),
        CellKind::Boolean => match raw {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        CellKind::Plain => raw.to_string(),
    }
}

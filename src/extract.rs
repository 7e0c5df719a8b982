//! Plain-text extraction for uploaded documents.
//!
//! | Content type | Method |
//! |--------------|--------|
//! | `application/pdf` | `pdf-extract` |
//! | DOCX | `<w:t>` runs from `word/document.xml`, paragraphs on new lines |
//! | PPTX | `<a:t>` runs from each `ppt/slides/slideN.xml`, slides in order |
//! | XLSX | shared-string cells from each worksheet |
//! | `text/*`, JSON, CSV | UTF-8, invalid sequences replaced |
//!
//! Uploads often arrive without a useful MIME type, so [`infer_content_type`]
//! falls back to the filename extension.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_OCTET: &str = "application/octet-stream";

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Decompressed size cap per ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(e: zip::result::ZipError) -> Self {
        ExtractError::Ooxml(e.to_string())
    }
}

impl From<quick_xml::Error> for ExtractError {
    fn from(e: quick_xml::Error) -> Self {
        ExtractError::Ooxml(e.to_string())
    }
}

/// Extract UTF-8 text from `bytes` of the given content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    let mime = essence(content_type);
    match mime.as_str() {
        MIME_PDF => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string())),
        MIME_DOCX => extract_docx(bytes),
        MIME_PPTX => extract_pptx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        m if is_text_like(m) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        _ => Err(ExtractError::UnsupportedContentType(content_type.to_string())),
    }
}

/// Resolve the effective content type of an upload.
///
/// A declared type wins unless it is missing, empty, or
/// `application/octet-stream`; then the filename extension decides.
pub fn infer_content_type(filename: &str, declared: Option<&str>) -> String {
    if let Some(ct) = declared.map(str::trim).filter(|ct| !ct.is_empty()) {
        if essence(ct) != MIME_OCTET {
            return ct.to_string();
        }
    }
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "xlsx" => MIME_XLSX,
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        _ => MIME_OCTET,
    }
    .to_string()
}

/// Short label for reports: `pdf`, `docx`, `text`, ...
pub fn file_type_label(content_type: &str) -> &'static str {
    match essence(content_type).as_str() {
        MIME_PDF => "pdf",
        MIME_DOCX => "docx",
        MIME_PPTX => "pptx",
        MIME_XLSX => "xlsx",
        m if is_text_like(m) => "text",
        _ => "unknown",
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_text_like(mime: &str) -> bool {
    mime.starts_with("text/")
        || matches!(
            mime,
            "application/json" | "application/xml" | "application/x-yaml" | "application/yaml"
        )
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    Ok(zip::ZipArchive::new(Cursor::new(bytes))?)
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "{} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Numbered part names under `prefix` (`prefix1.xml`, `prefix2.xml`, ...) in numeric order.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Concatenate the text of every `<t>` element. A newline is emitted at the
/// end of each `block` element so paragraphs stay separated.
fn collect_runs(xml: &[u8], block: &[u8]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_run = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_run = true,
            Event::Text(t) if in_run => {
                out.push_str(&t.unescape().unwrap_or_default());
            }
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_run = false;
                } else if name.as_ref() == block && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    collect_runs(&xml, b"p")
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_parts(&archive, "ppt/slides/slide") {
        let xml = read_entry(&mut archive, &name)?;
        let text = collect_runs(&xml, b"p")?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml") {
        Ok(xml) => shared_strings(&xml)?,
        Err(_) => Vec::new(),
    };
    let mut sheets = Vec::new();
    for name in numbered_parts(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_entry(&mut archive, &name)?;
        let cells = sheet_cells(&xml, &shared)?;
        if !cells.is_empty() {
            sheets.push(cells);
        }
    }
    Ok(sheets.join("\n"))
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_run = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_run = true,
                _ => {}
            },
            Event::Text(t) if in_run => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_run = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn sheet_cells(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cells: Vec<&str> = Vec::new();
    let mut shared_cell = false;
    let mut in_value = false;
    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                shared_cell = e
                    .attributes()
                    .flatten()
                    .any(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s");
            }
            Event::Start(e) if e.local_name().as_ref() == b"v" => in_value = true,
            Event::Text(t) if in_value && shared_cell => {
                let raw = t.unescape().unwrap_or_default();
                if let Some(s) = raw.trim().parse::<usize>().ok().and_then(|i| shared.get(i)) {
                    cells.push(s);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"c" => shared_cell = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ooxml(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, body) in parts {
                zip.start_file(*name, options).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_unsupported_content_type() {
        let err = extract_text(b"foo", MIME_OCTET).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn test_invalid_pdf() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_invalid_zip_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn test_text_is_decoded_lossy() {
        let text = extract_text(b"Acme sells \xffwidgets", "text/plain; charset=utf-8").unwrap();
        assert!(text.starts_with("Acme sells "));
        assert!(text.ends_with("widgets"));
    }

    #[test]
    fn test_docx_paragraphs() {
        let doc = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>Pricing starts at </w:t></w:r><w:r><w:t>$10.</w:t></w:r></w:p>
<w:p><w:r><w:t>Support is 24/7.</w:t></w:r></w:p>
</w:body></w:document>"#;
        let bytes = ooxml(&[("word/document.xml", doc)]);
        let text = extract_text(&bytes, MIME_DOCX).unwrap();
        assert_eq!(text, "Pricing starts at $10.\nSupport is 24/7.");
    }

    #[test]
    fn test_pptx_slide_order() {
        let slide = |s: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>"#,
                s
            )
        };
        let (s1, s2, s10) = (slide("one"), slide("two"), slide("ten"));
        let bytes = ooxml(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
        ]);
        assert_eq!(extract_text(&bytes, MIME_PPTX).unwrap(), "one\n\ntwo\n\nten");
    }

    #[test]
    fn test_xlsx_shared_strings() {
        let shared = r#"<sst><si><t>Region</t></si><si><t>EMEA</t></si></sst>"#;
        let sheet = r#"<worksheet><sheetData><row>
<c r="A1" t="s"><v>0</v></c><c r="B1"><v>42</v></c><c r="C1" t="s"><v>1</v></c>
</row></sheetData></worksheet>"#;
        let bytes = ooxml(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        assert_eq!(extract_text(&bytes, MIME_XLSX).unwrap(), "Region EMEA");
    }

    #[test]
    fn test_infer_content_type() {
        assert_eq!(infer_content_type("deck.PDF", None), MIME_PDF);
        assert_eq!(infer_content_type("notes.md", Some(MIME_OCTET)), "text/markdown");
        assert_eq!(infer_content_type("notes.md", Some("")), "text/markdown");
        assert_eq!(infer_content_type("x.bin", Some("text/plain")), "text/plain");
        assert_eq!(infer_content_type("noext", None), MIME_OCTET);
    }

    #[test]
    fn test_file_type_label() {
        assert_eq!(file_type_label(MIME_PDF), "pdf");
        assert_eq!(file_type_label("text/csv"), "text");
        assert_eq!(file_type_label(MIME_OCTET), "unknown");
    }
}

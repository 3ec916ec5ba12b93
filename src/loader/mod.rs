
use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto};
use std::io::Read;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::QaError;

/// A source document with its extracted plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    /// Path of the source file relative to the documents directory
    pub source: String,
    /// Extracted text with paragraph/slide/row order preserved. May be
    /// empty or whitespace-only; that is still a successfully parsed file.
    pub text: String,
}

pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "pptx", "xlsx", "txt"];

/// Recursively scan a directory and extract text from every supported file.
///
/// Unsupported extensions are skipped silently. A file that fails to parse
/// is logged and skipped; it never aborts the batch. Files are visited in
/// lexicographic path order so corpus construction is deterministic.
#[inline]
pub fn load_documents(dir: &Path) -> Result<Vec<LoadedDocument>, QaError> {
    if !dir.is_dir() {
        return Err(QaError::Ingest(format!(
            "Documents directory not found: {}",
            dir.display()
        )));
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable directory entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let Some(extension) = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
        else {
            continue;
        };
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            debug!("Skipping unsupported file: {}", path.display());
            continue;
        }

        let source = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        match extract_text(path, &extension) {
            Ok(text) => {
                debug!("Extracted {} chars from {}", text.len(), source);
                documents.push(LoadedDocument { source, text });
            }
            Err(e) => {
                warn!("Skipping {}: {:#}", source, e);
            }
        }
    }

    info!(
        "Loaded {} documents from {}",
        documents.len(),
        dir.display()
    );
    Ok(documents)
}

/// Extract plain text from a single file, dispatching on its extension
fn extract_text(path: &Path, extension: &str) -> Result<String> {
    match extension {
        "pdf" => extract_pdf_text(path),
        "docx" => extract_docx_text(path),
        "pptx" => extract_pptx_text(path),
        "xlsx" => extract_xlsx_text(path),
        "txt" => extract_txt_text(path),
        _ => unreachable!("dispatch is limited to SUPPORTED_EXTENSIONS"),
    }
}

fn extract_txt_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).context("Failed to read text file")?;
    // Normalize whatever encoding we got to valid UTF-8
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// PDF text via pdf-extract, falling back to a raw lopdf content-stream
/// scan. pdf-extract handles font encodings better but panics on some
/// malformed files, so both paths run under `catch_unwind`.
fn extract_pdf_text(path: &Path) -> Result<String> {
    let primary = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path)));

    match primary {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => {
            warn!(
                "pdf-extract failed for {}, trying lopdf fallback: {}",
                path.display(),
                e
            );
            extract_pdf_text_via_lopdf(path)
        }
        Err(_) => {
            warn!(
                "pdf-extract panicked for {}, trying lopdf fallback",
                path.display()
            );
            extract_pdf_text_via_lopdf(path)
        }
    }
}

/// Tolerant PDF extraction: walk each page's content stream and collect the
/// text-showing operators. Less accurate for complex fonts than pdf-extract
/// but survives malformed files.
fn extract_pdf_text_via_lopdf(path: &Path) -> Result<String> {
    use lopdf::{Document, Object};

    let doc = Document::load(path).context("Failed to load PDF")?;

    let mut all_text = String::new();
    for (_page_num, page_id) in doc.get_pages() {
        let Ok(content) = doc.get_page_content(page_id) else {
            continue;
        };
        let operations = lopdf::content::Content::decode(&content)
            .map(|c| c.operations)
            .unwrap_or_default();

        for op in operations {
            match op.operator.as_str() {
                // Tj: show text string
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        all_text.push_str(&decode_pdf_string(bytes));
                    }
                }
                // TJ: show text array (with kerning)
                "TJ" => {
                    if let Some(Object::Array(arr)) = op.operands.first() {
                        for item in arr {
                            if let Object::String(bytes, _) = item {
                                all_text.push_str(&decode_pdf_string(bytes));
                            }
                        }
                    }
                }
                // Text positioning that indicates a new line
                "Td" | "TD" | "T*" | "'" | "\"" => {
                    if !all_text.ends_with('\n') && !all_text.ends_with(' ') {
                        all_text.push(' ');
                    }
                }
                "ET" => {
                    if !all_text.ends_with('\n') {
                        all_text.push('\n');
                    }
                }
                _ => {}
            }
        }
        all_text.push('\n');
    }

    Ok(all_text)
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    // UTF-8 first, Latin-1 fallback
    String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect())
}

/// Word document text: read `word/document.xml` out of the OOXML archive
/// and collect the `w:t` text runs, one line per `w:p` paragraph.
fn extract_docx_text(path: &Path) -> Result<String> {
    let xml = read_zip_part(path, "word/document.xml")?;
    Ok(collect_xml_runs(&xml, "w:t", "w:p"))
}

/// Presentation text: collect the `a:t` text runs from every
/// `ppt/slides/slideN.xml` part, in slide-number order.
fn extract_pptx_text(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path).context("Failed to open archive")?;
    let mut archive = zip::ZipArchive::new(file).context("Invalid OOXML archive")?;

    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|name| {
            name.starts_with("ppt/slides/slide") && name.ends_with(".xml")
        })
        .map(str::to_string)
        .collect();
    slide_names.sort_by_key(|name| slide_number(name));

    let mut text = String::new();
    for name in slide_names {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .with_context(|| format!("Missing slide part: {name}"))?
            .read_to_string(&mut xml)
            .with_context(|| format!("Failed to read slide part: {name}"))?;

        let slide_text = collect_xml_runs(&xml, "a:t", "a:p");
        if !slide_text.trim().is_empty() {
            text.push_str(&slide_text);
            if !text.ends_with('\n') {
                text.push('\n');
            }
        }
    }

    Ok(text)
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(u32::MAX)
}

/// Spreadsheet text via calamine: one line per row, cells joined by tabs,
/// sheets in workbook order.
fn extract_xlsx_text(path: &Path) -> Result<String> {
    let mut workbook = open_workbook_auto(path).context("Failed to open workbook")?;

    let mut text = String::new();
    for sheet_name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .with_context(|| format!("Failed to read sheet: {sheet_name}"))?;

        for row in range.rows() {
            let line = row
                .iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\t");
            if !line.trim().is_empty() {
                text.push_str(line.trim_end());
                text.push('\n');
            }
        }
    }

    Ok(text)
}

fn read_zip_part(path: &Path, part: &str) -> Result<String> {
    let file = std::fs::File::open(path).context("Failed to open archive")?;
    let mut archive = zip::ZipArchive::new(file).context("Invalid OOXML archive")?;

    let mut content = String::new();
    archive
        .by_name(part)
        .with_context(|| format!("Missing archive part: {part}"))?
        .read_to_string(&mut content)
        .with_context(|| format!("Failed to read archive part: {part}"))?;

    Ok(content)
}

/// Collect the character content of `<run_tag>` elements, emitting a
/// newline at the close of each `<para_tag>` element. Handles the handful
/// of predefined XML entities; OOXML text runs contain nothing fancier.
fn collect_xml_runs(xml: &str, run_tag: &str, para_tag: &str) -> String {
    let close_run = format!("/{run_tag}");
    let close_para = format!("/{para_tag}");

    let mut result = String::new();
    let mut in_text = false;
    let mut chars = xml.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '<' {
            let mut tag = String::new();
            for tc in chars.by_ref() {
                if tc == '>' {
                    break;
                }
                tag.push(tc);
            }

            let name = tag.split_whitespace().next().unwrap_or("");
            if name == run_tag && !tag.ends_with('/') {
                in_text = true;
            } else if name == close_run {
                in_text = false;
            } else if name == close_para && !result.ends_with('\n') {
                result.push('\n');
            }
        } else if in_text {
            result.push(c);
        }
    }

    decode_xml_entities(&result)
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

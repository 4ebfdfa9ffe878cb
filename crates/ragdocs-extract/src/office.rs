//! Extractor for ZIP-packaged office and e-book formats.
//!
//! `.docx`, `.pptx`, `.odt` and `.epub` are all ZIP containers holding XML.
//! We pull the parts that carry body text and reduce the markup to plain
//! text, turning paragraph-level elements into line breaks.

use async_trait::async_trait;
use ragdocs_core::{ContentExtractor, ExtractError};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Element names (without namespace prefix) that end a line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "h", "h1", "h2", "h3", "h4", "h5", "h6", "br", "div", "li", "tr", "title",
];

/// Elements whose content is never body text.
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Package {
    Docx,
    Pptx,
    Odt,
    Epub,
}

impl Package {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "odt" => Some(Self::Odt),
            "epub" => Some(Self::Epub),
            _ => None,
        }
    }

    /// Archive entries holding body text, in reading order.
    fn text_parts(self, names: &[String]) -> Vec<String> {
        match self {
            Self::Docx => names
                .iter()
                .filter(|n| n.as_str() == "word/document.xml")
                .cloned()
                .collect(),
            Self::Odt => names
                .iter()
                .filter(|n| n.as_str() == "content.xml")
                .cloned()
                .collect(),
            Self::Pptx => {
                let mut slides: Vec<(u32, String)> = names
                    .iter()
                    .filter_map(|n| {
                        let number = n
                            .strip_prefix("ppt/slides/slide")?
                            .strip_suffix(".xml")?
                            .parse()
                            .ok()?;
                        Some((number, n.clone()))
                    })
                    .collect();
                slides.sort();
                slides.into_iter().map(|(_, n)| n).collect()
            }
            Self::Epub => names
                .iter()
                .filter(|n| {
                    let lower = n.to_ascii_lowercase();
                    lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
                })
                .cloned()
                .collect(),
        }
    }
}

/// Extractor for `.docx`, `.pptx`, `.odt` and `.epub`.
pub struct OfficeExtractor;

impl OfficeExtractor {
    /// Create a new office extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for OfficeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for OfficeExtractor {
    fn extensions(&self) -> &[&str] {
        &["docx", "pptx", "odt", "epub"]
    }

    async fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let package = Package::from_path(path)
            .ok_or_else(|| ExtractError::UnsupportedType(path.display().to_string()))?;
        debug!("Extracting {:?} package: {:?}", package, path);

        let bytes = tokio::fs::read(path).await?;
        tokio::task::spawn_blocking(move || extract_package(package, bytes))
            .await
            .map_err(|e| ExtractError::Failed(format!("task join error: {e}")))?
    }
}

fn extract_package(package: Package, bytes: Vec<u8>) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::Parse(format!("not a valid archive: {e}")))?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();

    let parts = package.text_parts(&names);
    if parts.is_empty() {
        return Err(ExtractError::Parse(format!(
            "no text parts found in {package:?} archive"
        )));
    }

    let mut sections = Vec::with_capacity(parts.len());
    for name in parts {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(|e| ExtractError::Parse(format!("{name}: {e}")))?
            .read_to_string(&mut xml)?;
        let text = markup_to_text(&xml);
        if !text.is_empty() {
            sections.push(text);
        }
    }
    Ok(sections.join("\n\n"))
}

/// Strip tags, decode entities and turn block elements into line breaks.
pub(crate) fn markup_to_text(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 2);
    let mut skip_depth = 0usize;
    let mut rest = xml;

    while let Some(open) = rest.find('<') {
        if skip_depth == 0 {
            out.push_str(&decode_entities(&rest[..open]));
        }
        let Some(close) = rest[open..].find('>') else {
            rest = "";
            break;
        };
        let tag = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        if tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }
        let closing = tag.starts_with('/');
        let self_closing = tag.ends_with('/');
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");
        let local = name.rsplit(':').next().unwrap_or(name).to_ascii_lowercase();

        if SKIPPED_ELEMENTS.contains(&local.as_str()) {
            if closing {
                skip_depth = skip_depth.saturating_sub(1);
            } else if !self_closing {
                skip_depth += 1;
            }
            continue;
        }
        if skip_depth > 0 {
            continue;
        }
        match local.as_str() {
            "tab" if self_closing => out.push('\t'),
            "br" => out.push('\n'),
            l if closing && BLOCK_ELEMENTS.contains(&l) => out.push('\n'),
            _ => {}
        }
    }
    if skip_depth == 0 {
        out.push_str(&decode_entities(rest));
    }

    out.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after.find(';').and_then(|semi| {
            let entity = &after[..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

//! # Document Rendering Module
//!
//! Turns a [`MipDocument`] into bytes in a target format. Each format is an
//! independent renderer behind one trait so the assembly step can attempt
//! them in isolation; one format failing never blocks another.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use docx_rs::{AlignmentType, Docx, Pic, Run};
use genpdf::elements::{Break, Paragraph};
use genpdf::style::{Style, StyledString};
use genpdf::{Margins, SimplePageDecorator};
use tracing::warn;

use crate::document::{DocumentFormat, MipDocument};

/// Heading printed at the top of every rendered document.
const DOCUMENT_HEADING: &str = "PROCEDURE INSTRUCTION DOCUMENT (MIP)";

/// Page margins for PDF output, in mm.
const PDF_MARGIN_MM: f64 = 20.0;
const PDF_TITLE_SIZE: u8 = 16;
const PDF_HEADING_SIZE: u8 = 13;
const PDF_BODY_SIZE: u8 = 11;

/// Errors raised while rendering a document.
#[derive(Debug, Clone)]
pub enum RenderError {
    /// Font assets for PDF output could not be loaded.
    Font(String),
    /// The format back end failed to produce output.
    Encode(String),
    /// Filesystem failure while reading referenced images.
    Io(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Font(msg) => write!(f, "Font error: {msg}"),
            RenderError::Encode(msg) => write!(f, "Render error: {msg}"),
            RenderError::Io(msg) => write!(f, "Render I/O error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

/// A single-format document renderer.
pub trait DocumentRenderer: Send + Sync {
    fn format(&self) -> DocumentFormat;
    fn render(&self, doc: &MipDocument) -> Result<Vec<u8>, RenderError>;
}

/// Look up the built-in renderer for a format.
pub fn renderer_for(
    format: DocumentFormat,
    pdf_font_dir: &Path,
    pdf_font_name: &str,
) -> Box<dyn DocumentRenderer> {
    match format {
        DocumentFormat::Pdf => Box::new(PdfRenderer {
            font_dir: pdf_font_dir.to_path_buf(),
            font_name: pdf_font_name.to_string(),
        }),
        DocumentFormat::Docx => Box::new(DocxRenderer),
        DocumentFormat::Html => Box::new(HtmlRenderer),
        DocumentFormat::Rtf => Box::new(RtfRenderer),
        DocumentFormat::Text => Box::new(TextRenderer),
    }
}

/// PDF output via genpdf, with step images embedded.
pub struct PdfRenderer {
    pub font_dir: PathBuf,
    pub font_name: String,
}

impl DocumentRenderer for PdfRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn render(&self, doc: &MipDocument) -> Result<Vec<u8>, RenderError> {
        let font_family = genpdf::fonts::from_files(&self.font_dir, &self.font_name, None)
            .map_err(|e| RenderError::Font(e.to_string()))?;

        let mut pdf = genpdf::Document::new(font_family);
        pdf.set_title(&doc.title);

        let mut decorator = SimplePageDecorator::new();
        decorator.set_margins(Margins::trbl(
            PDF_MARGIN_MM,
            PDF_MARGIN_MM,
            PDF_MARGIN_MM,
            PDF_MARGIN_MM,
        ));
        pdf.set_page_decorator(decorator);

        let heading_style = Style::new().bold().with_font_size(PDF_TITLE_SIZE);
        pdf.push(Paragraph::new(StyledString::new(
            DOCUMENT_HEADING,
            heading_style,
        )));
        pdf.push(Break::new(0.5));
        pdf.push(Paragraph::new(StyledString::new(
            doc.title.clone(),
            Style::new().bold().with_font_size(PDF_HEADING_SIZE),
        )));
        pdf.push(Break::new(1.0));
        pdf.push(Paragraph::new(StyledString::new(
            format!("Generated on {}", doc.created_at.format("%d/%m/%Y %H:%M")),
            Style::new().with_font_size(PDF_BODY_SIZE),
        )));
        pdf.push(Break::new(1.0));

        for (i, item) in doc.items.iter().enumerate() {
            pdf.push(Paragraph::new(StyledString::new(
                format!("{}. {}", i + 1, item.text),
                Style::new().with_font_size(PDF_BODY_SIZE),
            )));
            pdf.push(Break::new(0.5));

            if let Some(path) = &item.image {
                // A broken image reference downgrades to a text-only step.
                match genpdf::elements::Image::from_path(path) {
                    Ok(image) => {
                        pdf.push(image);
                        pdf.push(Break::new(0.5));
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unloadable step image");
                    }
                }
            }
        }

        let mut bytes = Vec::new();
        pdf.render(&mut bytes)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(bytes)
    }
}

/// Editable DOCX output via docx-rs, with step images embedded.
pub struct DocxRenderer;

// OOXML measures drawings in EMU.
const EMU_PER_PX: u32 = 9525;
// Display width cap inside the page body, in pixels.
const DOCX_MAX_IMAGE_WIDTH_PX: u32 = 540;

impl DocumentRenderer for DocxRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn render(&self, doc: &MipDocument) -> Result<Vec<u8>, RenderError> {
        let mut docx = Docx::new()
            .add_paragraph(
                docx_rs::Paragraph::new()
                    .align(AlignmentType::Center)
                    .add_run(Run::new().add_text(DOCUMENT_HEADING).bold().size(28)),
            )
            .add_paragraph(
                docx_rs::Paragraph::new()
                    .align(AlignmentType::Center)
                    .add_run(Run::new().add_text(doc.title.as_str()).bold().size(24)),
            )
            .add_paragraph(docx_rs::Paragraph::new());

        for (i, item) in doc.items.iter().enumerate() {
            docx = docx.add_paragraph(docx_rs::Paragraph::new().add_run(
                Run::new()
                    .add_text(format!("{}. {}", i + 1, item.text))
                    .bold()
                    .size(20),
            ));

            if let Some(path) = &item.image {
                match step_pic(path) {
                    Ok(pic) => {
                        docx = docx.add_paragraph(
                            docx_rs::Paragraph::new().add_run(Run::new().add_image(pic)),
                        );
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unloadable step image");
                    }
                }
            }
            docx = docx.add_paragraph(docx_rs::Paragraph::new());
        }

        let mut cursor = std::io::Cursor::new(Vec::new());
        docx.build()
            .pack(&mut cursor)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Load a step image as an inline picture, bounded to the page body width.
fn step_pic(path: &Path) -> Result<Pic, RenderError> {
    let bytes = std::fs::read(path).map_err(|e| RenderError::Io(e.to_string()))?;
    let (width, height) =
        image::image_dimensions(path).map_err(|e| RenderError::Io(e.to_string()))?;

    let shown_width = width.min(DOCX_MAX_IMAGE_WIDTH_PX);
    let shown_height = height * shown_width / width.max(1);
    Ok(Pic::new(&bytes).size(shown_width * EMU_PER_PX, shown_height * EMU_PER_PX))
}

/// Self-contained HTML output; step images are inlined as data URIs.
pub struct HtmlRenderer;

impl DocumentRenderer for HtmlRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Html
    }

    fn render(&self, doc: &MipDocument) -> Result<Vec<u8>, RenderError> {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("    <meta charset=\"UTF-8\">\n");
        html.push_str(&format!(
            "    <title>MIP - {}</title>\n",
            escape_html(&doc.title)
        ));
        html.push_str(
            "    <style>\n\
                     body { font-family: Arial, sans-serif; line-height: 1.6; margin: 40px; color: #333; }\n\
                     .title { text-align: center; font-size: 24px; font-weight: bold; color: #00517C; }\n\
                     .subtitle { text-align: center; font-size: 18px; font-weight: bold; color: #00517C; margin-bottom: 30px; }\n\
                     .step { margin-bottom: 20px; }\n\
                     .step-title { font-size: 14px; font-weight: bold; color: #00517C; }\n\
                     img { max-width: 100%; border: 1px solid #ccc; margin-top: 10px; }\n\
                 </style>\n</head>\n<body>\n",
        );
        html.push_str(&format!(
            "    <div class=\"title\">{}</div>\n",
            escape_html(DOCUMENT_HEADING)
        ));
        html.push_str(&format!(
            "    <div class=\"subtitle\">{}</div>\n",
            escape_html(&doc.title)
        ));

        for (i, item) in doc.items.iter().enumerate() {
            html.push_str("    <div class=\"step\">\n");
            html.push_str(&format!(
                "        <div class=\"step-title\">{}. {}</div>\n",
                i + 1,
                escape_html(&item.text)
            ));
            if let Some(path) = &item.image {
                match std::fs::read(path) {
                    Ok(bytes) => {
                        html.push_str(&format!(
                            "        <img src=\"data:image/jpeg;base64,{}\" alt=\"Step {}\">\n",
                            BASE64.encode(&bytes),
                            i + 1
                        ));
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable step image");
                    }
                }
            }
            html.push_str("    </div>\n");
        }

        html.push_str("</body>\n</html>\n");
        Ok(html.into_bytes())
    }
}

/// RTF output: highly compatible with Word and Google Docs imports.
pub struct RtfRenderer;

impl DocumentRenderer for RtfRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Rtf
    }

    fn render(&self, doc: &MipDocument) -> Result<Vec<u8>, RenderError> {
        let mut rtf = String::new();
        rtf.push_str("{\\rtf1\\ansi\\deff0 {\\fonttbl {\\f0 Times New Roman;}}\n\\f0\\fs24\n");
        rtf.push_str(&format!(
            "{{\\qc\\b\\fs28 {}\\par}}\n",
            escape_rtf(DOCUMENT_HEADING)
        ));
        rtf.push_str(&format!(
            "{{\\qc\\b\\fs24 {}\\par}}\n\\par\n",
            escape_rtf(&doc.title)
        ));

        for (i, item) in doc.items.iter().enumerate() {
            rtf.push_str(&format!(
                "{{\\b\\fs20 {}. {}\\par}}\n",
                i + 1,
                escape_rtf(&item.text)
            ));
            if let Some(path) = &item.image {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                rtf.push_str(&format!("{{\\i Photo: {}\\par}}\n", escape_rtf(&name)));
            }
            rtf.push_str("\\par\n");
        }

        rtf.push('}');
        Ok(rtf.into_bytes())
    }
}

/// Plain-text output.
pub struct TextRenderer;

impl DocumentRenderer for TextRenderer {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Text
    }

    fn render(&self, doc: &MipDocument) -> Result<Vec<u8>, RenderError> {
        let mut text = String::new();
        text.push_str(DOCUMENT_HEADING);
        text.push_str("\n\n");
        text.push_str(&doc.title);
        text.push_str("\n\n");
        for (i, item) in doc.items.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, item.text));
        }
        Ok(text.into_bytes())
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_rtf(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '{' => escaped.push_str("\\{"),
            '}' => escaped.push_str("\\}"),
            c if (c as u32) > 127 => {
                escaped.push_str(&format!("\\u{}?", c as u32 as i32));
            }
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn test_escape_rtf_control_chars_and_unicode() {
        assert_eq!(escape_rtf("{x}"), "\\{x\\}");
        assert_eq!(escape_rtf("não"), "n\\u227?o");
    }

    #[test]
    fn test_renderer_lookup() {
        let dir = Path::new("/tmp");
        assert_eq!(
            renderer_for(DocumentFormat::Html, dir, "x").format(),
            DocumentFormat::Html
        );
        assert_eq!(
            renderer_for(DocumentFormat::Docx, dir, "x").format(),
            DocumentFormat::Docx
        );
    }
}

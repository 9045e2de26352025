//! Content model handed to the document renderers: a title plus an ordered
//! list of steps, each optionally illustrated by one image.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Local};

/// Target output format for a rendered MIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Html,
    Rtf,
    Text,
}

impl DocumentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Html => "html",
            DocumentFormat::Rtf => "rtf",
            DocumentFormat::Text => "txt",
        }
    }

    /// Caption attached to the outbound file message.
    pub fn caption(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "📄 MIP (PDF)",
            DocumentFormat::Docx => "📝 Editable MIP (DOCX)",
            DocumentFormat::Html => "🌐 MIP (HTML)",
            DocumentFormat::Rtf => "📝 MIP (RTF)",
            DocumentFormat::Text => "📄 MIP (plain text)",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "html" => Ok(DocumentFormat::Html),
            "rtf" => Ok(DocumentFormat::Rtf),
            "text" | "txt" => Ok(DocumentFormat::Text),
            other => Err(format!("unknown document format: {other}")),
        }
    }
}

/// One procedure step with its optional illustration.
#[derive(Debug, Clone)]
pub struct MipItem {
    pub text: String,
    pub image: Option<PathBuf>,
}

/// The assembled procedure document content.
#[derive(Debug, Clone)]
pub struct MipDocument {
    pub title: String,
    pub items: Vec<MipItem>,
    pub created_at: DateTime<Local>,
}

impl MipDocument {
    /// Pair steps with images positionally: `items[i]` carries `images[i]`
    /// when it exists, otherwise no image. Surplus images beyond the step
    /// count are dropped.
    pub fn from_steps(title: impl Into<String>, steps: &[String], images: &[PathBuf]) -> Self {
        let items = steps
            .iter()
            .enumerate()
            .map(|(i, step)| MipItem {
                text: step.clone(),
                image: images.get(i).map(|p| p.to_path_buf()),
            })
            .collect();

        Self {
            title: title.into(),
            items,
            created_at: Local::now(),
        }
    }
}

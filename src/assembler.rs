//! # Document Assembly Module
//!
//! The final stage of a session: render the collected material in every
//! configured format and dispatch the files through the originating
//! channel. Formats are attempted independently; the session is cleared by
//! the caller afterwards no matter how many formats succeeded.

use std::sync::Arc;

use chrono::Local;
use tokio::time::timeout;
use tracing::{error, info};

use crate::channel::ChannelApi;
use crate::config::Config;
use crate::document::MipDocument;
use crate::render::renderer_for;

/// Outcome of one assembly-and-dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
}

impl DispatchReport {
    /// User-facing summary; zero deliveries is a hard failure.
    pub fn summary(&self) -> String {
        if self.delivered > 0 {
            format!(
                "✅ MIP generated! {} of {} file(s) delivered.\n\nUse /new to create another MIP.",
                self.delivered, self.attempted
            )
        } else {
            "❌ The MIP could not be generated in any format. Please try again.".to_string()
        }
    }
}

/// Render `doc` in each configured format and send the results to
/// `recipient` over `channel`.
///
/// Rendering runs on the blocking pool (PDF generation is CPU-bound) and
/// both rendering and sending are bounded by the configured timeouts. A
/// failure in one format is logged and the next format is attempted.
pub async fn assemble_and_dispatch(
    channel: &dyn ChannelApi,
    recipient: &str,
    doc: MipDocument,
    config: &Config,
) -> DispatchReport {
    let doc = Arc::new(doc);
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let mut report = DispatchReport {
        attempted: 0,
        delivered: 0,
    };

    for format in &config.output_formats {
        let format = *format;
        report.attempted += 1;

        let renderer = renderer_for(format, &config.pdf_font_dir, &config.pdf_font_name);

        let render_doc = Arc::clone(&doc);
        let rendered = timeout(
            config.render_timeout(),
            tokio::task::spawn_blocking(move || renderer.render(&render_doc)),
        )
        .await;

        let bytes = match rendered {
            Ok(Ok(Ok(bytes))) => bytes,
            Ok(Ok(Err(e))) => {
                error!(%format, error = %e, "Rendering failed");
                continue;
            }
            Ok(Err(e)) => {
                error!(%format, error = %e, "Render task panicked");
                continue;
            }
            Err(_) => {
                error!(%format, "Rendering timed out");
                continue;
            }
        };

        let output_path = config
            .output_dir
            .join(format!("mip_{timestamp}.{}", format.extension()));
        if let Err(e) = tokio::fs::write(&output_path, &bytes).await {
            error!(%format, path = %output_path.display(), error = %e, "Failed to write output file");
            continue;
        }

        match timeout(
            config.send_timeout(),
            channel.send_document(recipient, &output_path, format.caption()),
        )
        .await
        {
            Ok(Ok(())) => {
                info!(%format, path = %output_path.display(), "Document delivered");
                report.delivered += 1;
            }
            Ok(Err(e)) => {
                error!(%format, error = %e, "Document dispatch failed");
            }
            Err(_) => {
                error!(%format, "Document dispatch timed out");
            }
        }
    }

    info!(
        attempted = report.attempted,
        delivered = report.delivered,
        "Assembly finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_reports_hard_failure_on_zero_deliveries() {
        let report = DispatchReport {
            attempted: 3,
            delivered: 0,
        };
        assert!(report.summary().contains("could not be generated"));
    }

    #[test]
    fn test_summary_counts_partial_success() {
        let report = DispatchReport {
            attempted: 3,
            delivered: 2,
        };
        assert!(report.summary().contains("2 of 3"));
    }
}

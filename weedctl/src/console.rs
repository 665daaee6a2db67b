//! Terminal rendering for the CLI.
//!
//! [`Console`] applies effects to a [`SharedPage`] and echoes what a user would have seen: messages
//! and results on stdout, alerts on stderr. Downloads stay on the page until
//! [`save_downloads`] writes them to disk.

use crate::errors::Result;
use crate::page::{Effect, EffectSink, SharedPage};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct Console<W> {
    page: SharedPage,
    out: parking_lot::Mutex<W>,
}

impl Console<std::io::Stdout> {
    pub fn stdout(page: SharedPage) -> Self {
        Self::new(page, std::io::stdout())
    }
}

impl<W: Write + Send> Console<W> {
    pub fn new(page: SharedPage, out: W) -> Self {
        Self {
            page,
            out: parking_lot::Mutex::new(out),
        }
    }

    pub fn page(&self) -> &SharedPage {
        &self.page
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn line(&self, text: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{text}") {
            tracing::warn!(error = %e, "Failed to write to console");
        }
    }
}

impl<W: Write + Send> EffectSink for Console<W> {
    fn apply(&self, effect: Effect) {
        match &effect {
            Effect::Alert(message) => eprintln!("{message}"),
            Effect::SetProgress(percent) => tracing::info!(progress = %format!("{percent}%"), "Upload progress"),
            Effect::AppendParagraph { text, .. } | Effect::SetText { text, .. } => self.line(text),
            Effect::AppendLink { text, href, .. } => self.line(&format!("{text}: {href}")),
            Effect::Navigate(location) => self.line(&format!("Navigating to {location}")),
            Effect::Download { filename, body } => {
                tracing::info!(filename = %filename, size = body.len(), "Download ready");
            }
            Effect::ShowProgress | Effect::Clear(_) => {}
        }
        self.page.apply(effect);
    }
}

/// Write every pending download on the page into `dir`, returning the paths written.
pub async fn save_downloads(page: &SharedPage, dir: &Path) -> Result<Vec<PathBuf>> {
    let downloads = page.with(|page| page.take_downloads());
    let mut written = Vec::with_capacity(downloads.len());

    if !downloads.is_empty() {
        tokio::fs::create_dir_all(dir).await?;
    }
    for download in downloads {
        let path = dir.join(&download.filename);
        tokio::fs::write(&path, &download.body).await?;
        tracing::info!(path = %path.display(), size = download.body.len(), "Saved download");
        written.push(path);
    }
    Ok(written)
}

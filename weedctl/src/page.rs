//! Page state and the effects handlers apply to it.
//!
//! Handlers never touch the page directly. They produce [`Effect`] values which a driver hands to an
//! [`EffectSink`]. [`Page`] is an in-memory model of the client's document: a message region, a
//! result region, a progress bar, the current location, pending alerts and triggered downloads.
//!
//! Text in the regions is stored exactly as received. [`Page::render_html`] escapes it, since push
//! messages and server responses are untrusted.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Named display areas on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Status area fed by the push channel, the archive upload and registration
    Message,
    /// Output area of the coordinate upload form
    Result,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Paragraph(String),
    Text(String),
    Link { text: String, href: String },
}

/// A single page mutation requested by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Blocking alert dialog
    Alert(String),
    ShowProgress,
    /// Set the progress bar's text and width to `n%`
    SetProgress(u8),
    Clear(Region),
    AppendParagraph { region: Region, text: String },
    /// Replace the region's content with plain text
    SetText { region: Region, text: String },
    AppendLink { region: Region, text: String, href: String },
    /// Save `body` under `filename` through a transient object URL
    Download { filename: String, body: Bytes },
    Navigate(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressBar {
    pub visible: bool,
    pub percent: u8,
}

impl ProgressBar {
    pub fn text(&self) -> String {
        format!("{}%", self.percent)
    }

    pub fn width(&self) -> String {
        format!("{}%", self.percent)
    }
}

/// A download triggered on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    /// Object URL the download was triggered through; revoked by the time this is recorded
    pub url: String,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct Page {
    location: String,
    regions: HashMap<Region, Vec<Node>>,
    progress: ProgressBar,
    alerts: Vec<String>,
    downloads: Vec<Download>,
    object_urls: HashMap<String, Bytes>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Page {
    pub fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            regions: HashMap::new(),
            progress: ProgressBar::default(),
            alerts: Vec::new(),
            downloads: Vec::new(),
            object_urls: HashMap::new(),
        }
    }

    pub fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Alert(message) => self.alerts.push(message),
            Effect::ShowProgress => self.progress.visible = true,
            Effect::SetProgress(percent) => self.progress.percent = percent.min(100),
            Effect::Clear(region) => self.region_mut(region).clear(),
            Effect::AppendParagraph { region, text } => self.region_mut(region).push(Node::Paragraph(text)),
            Effect::SetText { region, text } => *self.region_mut(region) = vec![Node::Text(text)],
            Effect::AppendLink { region, text, href } => self.region_mut(region).push(Node::Link { text, href }),
            Effect::Download { filename, body } => {
                let url = self.create_object_url(body.clone());
                self.downloads.push(Download {
                    filename,
                    url: url.clone(),
                    body,
                });
                self.revoke_object_url(&url);
            }
            Effect::Navigate(location) => self.location = location,
        }
    }

    fn region_mut(&mut self, region: Region) -> &mut Vec<Node> {
        self.regions.entry(region).or_default()
    }

    fn create_object_url(&mut self, body: Bytes) -> String {
        let url = format!("blob:weedctl/{}", Uuid::new_v4());
        self.object_urls.insert(url.clone(), body);
        url
    }

    fn revoke_object_url(&mut self, url: &str) {
        self.object_urls.remove(url);
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    pub fn downloads(&self) -> &[Download] {
        &self.downloads
    }

    /// Remove and return downloads not yet handed out.
    pub fn take_downloads(&mut self) -> Vec<Download> {
        std::mem::take(&mut self.downloads)
    }

    /// Number of object URLs still alive.
    pub fn live_object_urls(&self) -> usize {
        self.object_urls.len()
    }

    pub fn nodes(&self, region: Region) -> &[Node] {
        self.regions.get(&region).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn paragraphs(&self, region: Region) -> Vec<&str> {
        self.nodes(region)
            .iter()
            .filter_map(|node| match node {
                Node::Paragraph(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// `(text, href)` of every link in the region.
    pub fn links(&self, region: Region) -> Vec<(&str, &str)> {
        self.nodes(region)
            .iter()
            .filter_map(|node| match node {
                Node::Link { text, href } => Some((text.as_str(), href.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text content of the region, the way `textContent` reads it.
    pub fn text(&self, region: Region) -> String {
        self.nodes(region)
            .iter()
            .map(|node| match node {
                Node::Paragraph(text) | Node::Text(text) => text.as_str(),
                Node::Link { text, .. } => text.as_str(),
            })
            .collect()
    }

    /// HTML for the region with every piece of text escaped.
    pub fn render_html(&self, region: Region) -> String {
        self.nodes(region)
            .iter()
            .map(|node| match node {
                Node::Paragraph(text) => format!("<p>{}</p>", escape_html(text)),
                Node::Text(text) => escape_html(text),
                Node::Link { text, href } => {
                    format!("<a href=\"{}\">{}</a>", escape_html(href), escape_html(text))
                }
            })
            .collect()
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Destination for the effects a handler produces.
pub trait EffectSink: Send + Sync {
    fn apply(&self, effect: Effect);

    fn apply_all(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.apply(effect);
        }
    }
}

/// A [`Page`] shared between the driver that mutates it and whoever observes it.
#[derive(Debug, Clone, Default)]
pub struct SharedPage(Arc<Mutex<Page>>);

impl SharedPage {
    pub fn new(page: Page) -> Self {
        Self(Arc::new(Mutex::new(page)))
    }

    pub fn snapshot(&self) -> Page {
        self.0.lock().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Page) -> R) -> R {
        f(&mut self.0.lock())
    }
}

impl EffectSink for SharedPage {
    fn apply(&self, effect: Effect) {
        self.0.lock().apply(effect);
    }
}

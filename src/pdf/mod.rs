//! Branded A4 exports.
//!
//! A [`ReportDocument`] lays text out page by page in PDF points (origin at
//! the bottom-left corner). The first page opens with the letterhead; every
//! page gets a footer produced by the document's [`FooterHook`] once the
//! total page count is known. The finished [`Layout`] is turned into bytes by
//! a [`PdfRenderer`].

pub mod dlog;
pub mod recap;
pub mod render;

use std::sync::Arc;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::warn;

use crate::locale;

pub use render::PdfiumRenderer;

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 50.0;
pub const FOOTER_BASELINE: f32 = 30.0;
const CONTENT_BOTTOM: f32 = 70.0;
const AVERAGE_GLYPH_WIDTH: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Letterhead {
    pub organization: String,
    pub subtitle: String,
    pub contact: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    Letterhead,
    Title,
    Heading,
    Body,
    Muted,
}

impl TextStyle {
    pub fn font_size(&self) -> f32 {
        match self {
            TextStyle::Letterhead => 16.0,
            TextStyle::Title => 15.0,
            TextStyle::Heading => 12.0,
            TextStyle::Body => 10.0,
            TextStyle::Muted => 8.0,
        }
    }

    pub fn leading(&self) -> f32 {
        match self {
            TextStyle::Letterhead => 22.0,
            TextStyle::Title => 24.0,
            TextStyle::Heading => 18.0,
            TextStyle::Body => 14.0,
            TextStyle::Muted => 11.0,
        }
    }

    pub fn is_bold(&self) -> bool {
        matches!(
            self,
            TextStyle::Letterhead | TextStyle::Title | TextStyle::Heading
        )
    }

    fn max_chars(&self) -> usize {
        let usable = PAGE_WIDTH - 2.0 * MARGIN;
        (usable / (self.font_size() * AVERAGE_GLYPH_WIDTH)).floor() as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    /// Baseline, measured from the bottom of the page.
    pub y: f32,
    pub style: TextStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: usize,
    pub lines: Vec<PlacedLine>,
    pub footer: Option<PlacedLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub title: String,
    pub pages: Vec<Page>,
}

impl Layout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Plain-text view of the layout, one page after another.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for page in &self.pages {
            for line in &page.lines {
                out.push_str(&line.text);
                out.push('\n');
            }
            if let Some(footer) = &page.footer {
                out.push_str(&footer.text);
                out.push('\n');
            }
        }
        out
    }
}

pub struct FooterContext<'a> {
    pub page_number: usize,
    pub total_pages: usize,
    pub letterhead: &'a Letterhead,
    pub generated_at: NaiveDateTime,
}

pub type FooterHook = Box<dyn Fn(&FooterContext<'_>) -> String + Send + Sync>;

pub fn default_footer() -> FooterHook {
    Box::new(|ctx: &FooterContext<'_>| {
        format!(
            "{} | Page {} / {} | Généré le {} (UTC)",
            ctx.letterhead.organization,
            ctx.page_number,
            ctx.total_pages,
            locale::format_datetime(ctx.generated_at)
        )
    })
}

pub struct DocumentOptions {
    pub title: String,
    pub letterhead: Letterhead,
    pub generated_at: NaiveDateTime,
    pub footer: Option<FooterHook>,
}

impl DocumentOptions {
    pub fn new(title: impl Into<String>, letterhead: Letterhead, generated_at: NaiveDateTime) -> Self {
        Self {
            title: title.into(),
            letterhead,
            generated_at,
            footer: None,
        }
    }

    pub fn with_footer(mut self, footer: FooterHook) -> Self {
        self.footer = Some(footer);
        self
    }
}

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("détails illisibles: {0}")]
    MalformedDetails(String),
    #[error("données incohérentes: {0}")]
    Inconsistent(String),
}

/// Collects the lines of one entry so a failing entry leaves no partial output.
#[derive(Default)]
pub struct EntryWriter {
    lines: Vec<(TextStyle, String)>,
}

impl EntryWriter {
    pub fn field(&mut self, label: &str, value: impl AsRef<str>) {
        self.lines
            .push((TextStyle::Body, format!("{label} : {}", value.as_ref())));
    }

    pub fn text(&mut self, value: impl Into<String>) {
        self.lines.push((TextStyle::Body, value.into()));
    }

    pub fn note(&mut self, value: impl Into<String>) {
        self.lines.push((TextStyle::Muted, value.into()));
    }
}

pub struct ReportDocument {
    title: String,
    letterhead: Letterhead,
    generated_at: NaiveDateTime,
    footer: FooterHook,
    pages: Vec<Page>,
    cursor: f32,
    skipped_entries: usize,
}

/// Opens a document whose first page already carries the letterhead and title.
pub fn create_document_with_header(options: DocumentOptions) -> ReportDocument {
    let DocumentOptions {
        title,
        letterhead,
        generated_at,
        footer,
    } = options;

    let mut document = ReportDocument {
        title,
        letterhead,
        generated_at,
        footer: footer.unwrap_or_else(default_footer),
        pages: vec![Page {
            number: 1,
            lines: Vec::new(),
            footer: None,
        }],
        cursor: PAGE_HEIGHT - MARGIN,
        skipped_entries: 0,
    };
    document.write_letterhead();
    document
}

impl ReportDocument {
    fn write_letterhead(&mut self) {
        let organization = self.letterhead.organization.clone();
        let subtitle = self.letterhead.subtitle.clone();
        let contact = self.letterhead.contact.clone();
        let stamp = format!(
            "Document généré le {} (UTC)",
            locale::format_datetime(self.generated_at)
        );
        let title = self.title.clone();

        self.push_line(TextStyle::Letterhead, organization);
        self.push_line(TextStyle::Body, subtitle);
        self.push_line(TextStyle::Muted, contact);
        self.push_line(TextStyle::Muted, stamp);
        self.spacer();
        self.push_wrapped(TextStyle::Title, &title);
        self.spacer();
    }

    fn current_page(&mut self) -> &mut Page {
        let index = self.pages.len() - 1;
        &mut self.pages[index]
    }

    fn break_page(&mut self) {
        let number = self.pages.len() + 1;
        self.pages.push(Page {
            number,
            lines: Vec::new(),
            footer: None,
        });
        self.cursor = PAGE_HEIGHT - MARGIN;
        let running_header = format!("{} | {}", self.letterhead.organization, self.title);
        self.push_line(TextStyle::Muted, running_header);
        self.spacer();
    }

    fn push_line(&mut self, style: TextStyle, text: String) {
        if self.cursor - style.leading() < CONTENT_BOTTOM {
            self.break_page();
        }
        self.cursor -= style.leading();
        let y = self.cursor;
        self.current_page().lines.push(PlacedLine {
            text: sanitize(&text),
            x: MARGIN,
            y,
            style,
        });
    }

    fn push_wrapped(&mut self, style: TextStyle, text: &str) {
        for line in wrap(text, style.max_chars()) {
            self.push_line(style, line);
        }
    }

    pub fn heading(&mut self, text: &str) {
        // Keep a heading on the same page as at least one following body line.
        let needed = TextStyle::Heading.leading() + TextStyle::Body.leading();
        if self.cursor - needed < CONTENT_BOTTOM {
            self.break_page();
        }
        self.push_wrapped(TextStyle::Heading, text);
    }

    pub fn paragraph(&mut self, text: &str) {
        self.push_wrapped(TextStyle::Body, text);
    }

    pub fn field(&mut self, label: &str, value: impl AsRef<str>) {
        self.push_wrapped(TextStyle::Body, &format!("{label} : {}", value.as_ref()));
    }

    pub fn note(&mut self, text: &str) {
        self.push_wrapped(TextStyle::Muted, text);
    }

    pub fn spacer(&mut self) {
        self.cursor -= TextStyle::Body.leading() / 2.0;
    }

    /// Appends one titled entry. When `render` fails the entry is replaced by
    /// a visible placeholder and the document carries on.
    pub fn entry<F>(&mut self, title: &str, render: F)
    where
        F: FnOnce(&mut EntryWriter) -> Result<(), EntryError>,
    {
        let mut writer = EntryWriter::default();
        match render(&mut writer) {
            Ok(()) => {
                self.heading(title);
                for (style, text) in writer.lines {
                    self.push_wrapped(style, &text);
                }
            }
            Err(err) => {
                warn!(entry = %title, error = %err, "skipping entry in PDF export");
                self.skipped_entries += 1;
                self.heading(&format!("{title} : entrée ignorée"));
                self.note(&format!("Cette entrée n'a pas pu être affichée ({err})."));
            }
        }
        self.spacer();
    }

    pub fn skipped_entries(&self) -> usize {
        self.skipped_entries
    }

    pub fn finish(self) -> Layout {
        let ReportDocument {
            title,
            letterhead,
            generated_at,
            footer,
            mut pages,
            ..
        } = self;

        let total_pages = pages.len();
        for page in &mut pages {
            let context = FooterContext {
                page_number: page.number,
                total_pages,
                letterhead: &letterhead,
                generated_at,
            };
            page.footer = Some(PlacedLine {
                text: sanitize(&footer(&context)),
                x: MARGIN,
                y: FOOTER_BASELINE,
                style: TextStyle::Muted,
            });
        }

        Layout { title, pages }
    }
}

/// Turns a finished layout into PDF bytes.
pub trait PdfRenderer: Send + Sync + 'static {
    fn render(&self, layout: &Layout) -> anyhow::Result<Vec<u8>>;
}

/// Renders on the blocking pool; PDF backends are synchronous.
pub async fn render_blocking(
    renderer: Arc<dyn PdfRenderer>,
    layout: Layout,
) -> anyhow::Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || renderer.render(&layout))
        .await
        .map_err(|err| anyhow::anyhow!("PDF render task failed: {err}"))?
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}

fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for raw_line in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;

        for word in raw_line.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current_len == 0 {
                word.len()
            } else {
                current_len + 1 + word.len()
            };
            if needed > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }

        if current_len > 0 || lines.is_empty() {
            lines.push(current);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn options(title: &str) -> DocumentOptions {
        let generated_at = NaiveDate::from_ymd_opt(2024, 12, 26)
            .and_then(|date| date.and_hms_opt(8, 15, 0))
            .unwrap();
        DocumentOptions::new(
            title,
            Letterhead {
                organization: "Paw Legal".to_string(),
                subtitle: "Cabinet d'avocats".to_string(),
                contact: "contact@pawlegal.fr".to_string(),
            },
            generated_at,
        )
    }

    #[test]
    fn first_page_starts_with_letterhead() {
        let layout = create_document_with_header(options("Récapitulatif")).finish();
        let first = &layout.pages[0];
        assert_eq!(first.lines[0].text, "Paw Legal");
        assert_eq!(first.lines[0].style, TextStyle::Letterhead);
        assert!(first
            .lines
            .iter()
            .any(|line| line.text == "Document généré le 26/12/2024 à 08:15 (UTC)"));
        assert!(first.lines.iter().any(|line| line.text == "Récapitulatif"));
    }

    #[test]
    fn every_page_gets_a_numbered_footer() {
        let mut document = create_document_with_header(options("Journal"));
        for index in 0..150 {
            document.paragraph(&format!("Ligne {index}"));
        }
        let layout = document.finish();

        assert!(layout.page_count() > 1);
        let total = layout.page_count();
        for page in &layout.pages {
            let footer = page.footer.as_ref().expect("footer on every page");
            assert!(footer
                .text
                .contains(&format!("Page {} / {}", page.number, total)));
            assert!(page
                .lines
                .iter()
                .all(|line| line.y >= CONTENT_BOTTOM && line.y <= PAGE_HEIGHT - MARGIN));
        }
        assert!(layout.pages[1].lines[0].text.starts_with("Paw Legal | Journal"));
    }

    #[test]
    fn custom_footer_hook_is_invoked_per_page() {
        let mut document = create_document_with_header(
            options("Journal").with_footer(Box::new(|ctx: &FooterContext<'_>| {
                format!("p{}/{}", ctx.page_number, ctx.total_pages)
            })),
        );
        for index in 0..80 {
            document.paragraph(&format!("Ligne {index}"));
        }
        let layout = document.finish();
        let footers: Vec<String> = layout
            .pages
            .iter()
            .filter_map(|page| page.footer.as_ref().map(|f| f.text.clone()))
            .collect();
        assert_eq!(footers.len(), layout.page_count());
        assert_eq!(footers[0], format!("p1/{}", layout.page_count()));
    }

    #[test]
    fn failing_entry_is_replaced_by_marker() {
        let mut document = create_document_with_header(options("Journal"));
        document.entry("Action #1", |writer| {
            writer.field("Action", "connexion");
            Ok(())
        });
        document.entry("Action #2", |writer| {
            writer.field("Action", "partiel");
            Err(EntryError::MalformedDetails("tableau inattendu".to_string()))
        });
        assert_eq!(document.skipped_entries(), 1);

        let text = document.finish().text();
        assert!(text.contains("Action #1\nAction : connexion"));
        assert!(text.contains("Action #2 : entrée ignorée"));
        assert!(!text.contains("partiel"));
        assert_eq!(text.matches("Action #").count(), 2);
    }

    #[test]
    fn wraps_long_text_on_word_boundaries() {
        let lines = wrap("alpha beta gamma delta", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta"]);

        let lines = wrap("abcdefghijkl", 5);
        assert_eq!(lines, vec!["abcde", "fghij", "kl"]);

        assert_eq!(wrap("", 10), vec![String::new()]);
    }

    #[test]
    fn control_characters_are_blanked() {
        assert_eq!(sanitize("a\tb\u{7}c"), "a b c");
    }
}

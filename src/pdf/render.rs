use std::sync::Mutex;

use anyhow::anyhow;
use pdfium_render::prelude::*;
use tracing::debug;

use super::{Layout, PdfRenderer};

/// Draws layouts with PDFium's built-in Helvetica faces.
///
/// PDFium is bound for each render and calls are serialised: the library is
/// not safe to drive from several threads at once.
pub struct PdfiumRenderer {
    library_path: Option<String>,
    lock: Mutex<()>,
}

impl PdfiumRenderer {
    pub fn new(library_path: Option<String>) -> Self {
        Self {
            library_path,
            lock: Mutex::new(()),
        }
    }

    fn bind(&self) -> anyhow::Result<Pdfium> {
        let bindings = match self.library_path.as_deref() {
            Some(path) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|err| anyhow!("failed to load PDFium: {err}"))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfRenderer for PdfiumRenderer {
    fn render(&self, layout: &Layout) -> anyhow::Result<Vec<u8>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("PDFium renderer lock poisoned"))?;

        let pdfium = self.bind()?;
        let mut document = pdfium
            .create_new_pdf()
            .map_err(|err| anyhow!("create pdf: {err}"))?;

        let regular = document.fonts_mut().helvetica();
        let bold = document.fonts_mut().helvetica_bold();

        for page_layout in &layout.pages {
            let mut page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::a4())
                .map_err(|err| anyhow!("create page {}: {err}", page_layout.number))?;

            let lines = page_layout.lines.iter().chain(page_layout.footer.iter());
            for line in lines {
                if line.text.trim().is_empty() {
                    continue;
                }
                let font = if line.style.is_bold() { bold } else { regular };
                page.objects_mut()
                    .create_text_object(
                        PdfPoints::new(line.x),
                        PdfPoints::new(line.y),
                        &line.text,
                        font,
                        PdfPoints::new(line.style.font_size()),
                    )
                    .map_err(|err| anyhow!("draw text on page {}: {err}", page_layout.number))?;
            }
        }

        let bytes = document
            .save_to_bytes()
            .map_err(|err| anyhow!("serialise pdf: {err}"))?;

        debug!(
            title = %layout.title,
            pages = layout.pages.len(),
            size = bytes.len(),
            "rendered pdf"
        );
        Ok(bytes)
    }
}

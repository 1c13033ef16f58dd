use crate::decoder::pdf::utils::{create_fit_matrix, mupdf_to_pixels};
use crate::decoder::{Decoder, DocumentHandle, PageHandle, PageInfo};
use crate::error::OpenError;
use anyhow::Result;
use log::{debug, info};
use mupdf::{Colorspace, Device, Document, Page, Pixmap, Rect};

const PDF_MAGIC: &str = "application/pdf";

/// 基于 mupdf 的解码器
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfDecoder;

impl PdfDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for PdfDecoder {
    fn open_document(
        &self,
        bytes: &[u8],
        password: Option<&str>,
    ) -> Result<Box<dyn DocumentHandle>, OpenError> {
        info!("[PDF] Opening document: {} bytes", bytes.len());
        let mut document = Document::from_bytes(bytes, PDF_MAGIC).map_err(OpenError::unreadable)?;

        if document.needs_password().map_err(OpenError::unreadable)? {
            let Some(password) = password else {
                info!("[PDF] Document is encrypted, password required");
                return Err(OpenError::PasswordRequired);
            };
            if !document.authenticate(password).map_err(OpenError::unreadable)? {
                info!("[PDF] Password rejected");
                return Err(OpenError::PasswordIncorrect);
            }
        }

        let page_count = document.page_count().map_err(OpenError::unreadable)?.max(0) as usize;
        info!("[PDF] Document opened with {} pages", page_count);

        // 预加载所有页面尺寸
        let mut pages_info = Vec::with_capacity(page_count);
        for i in 0..page_count {
            let page = document.load_page(i as i32).map_err(OpenError::unreadable)?;
            let bounds = page.bounds().map_err(OpenError::unreadable)?;
            pages_info.push(PageInfo::new(i, bounds.x1 - bounds.x0, bounds.y1 - bounds.y0));
        }

        Ok(Box::new(PdfDocument {
            document,
            pages_info,
        }))
    }
}

pub struct PdfDocument {
    document: Document,
    pages_info: Vec<PageInfo>,
}

impl DocumentHandle for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages_info.len()
    }

    fn page_size(&self, index: usize) -> Result<(f32, f32)> {
        let Some(page) = self.pages_info.get(index) else {
            anyhow::bail!("Page index {} out of bounds", index);
        };
        Ok(page.size())
    }

    fn get_all_pages(&self) -> Result<Vec<PageInfo>> {
        Ok(self.pages_info.clone())
    }

    fn open_page(&self, index: usize) -> Result<Box<dyn PageHandle + '_>> {
        debug!("[PDF] Loading page {}", index);
        let page = self.document.load_page(index as i32)?;
        let bounds = page.bounds()?;
        Ok(Box::new(PdfPage { page, bounds }))
    }
}

impl Drop for PdfDocument {
    fn drop(&mut self) {
        // Document 会在 Drop 时自动关闭
        debug!("[PDF] Closing document ({} pages)", self.pages_info.len());
    }
}

pub struct PdfPage {
    page: Page,
    bounds: Rect,
}

impl PageHandle for PdfPage {
    fn size(&self) -> (f32, f32) {
        (
            self.bounds.x1 - self.bounds.x0,
            self.bounds.y1 - self.bounds.y0,
        )
    }

    fn render(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        let matrix = create_fit_matrix(&self.bounds, width, height);

        let colorspace = Colorspace::device_rgb();
        let mut pixmap = Pixmap::new(&colorspace, 0, 0, width as i32, height as i32, false)?;
        pixmap.clear_with(255)?;

        {
            let device = Device::from_pixmap(&pixmap)?;
            self.page.run(&device, &matrix)?;
        }

        let (pixels, out_width, out_height) = mupdf_to_pixels(&pixmap);
        if out_width != width || out_height != height {
            anyhow::bail!(
                "pixmap is {}x{}, expected {}x{}",
                out_width,
                out_height,
                width,
                height
            );
        }
        Ok(pixels)
    }
}

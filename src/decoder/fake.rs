//! 测试用的假解码后端
//!
//! 文档内容是一段很短的文本描述，例如：
//!
//! ```text
//! %FAKEPDF
//! page 10 20
//! page 10 20
//! password abc
//! ```
//!
//! `FakeProbe` 统计句柄的打开和关闭次数，`DecodeGate` 可以把打开或光栅化卡住来模拟慢速解码。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::decoder::{Decoder, DocumentHandle, PageHandle};
use crate::error::OpenError;

const HEADER: &str = "%FAKEPDF";
const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// 假文档描述
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeDocument {
    pub pages: Vec<(f32, f32)>,
    pub password: Option<String>,
    pub render_fails: bool,
}

impl FakeDocument {
    /// `count` 页，每页 10x20 点
    pub fn with_pages(count: usize) -> Self {
        Self {
            pages: vec![(10.0, 20.0); count],
            ..Self::default()
        }
    }

    pub fn page_size(mut self, width: f32, height: f32) -> Self {
        for page in &mut self.pages {
            *page = (width, height);
        }
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn render_fails(mut self) -> Self {
        self.render_fails = true;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::from(HEADER);
        out.push('\n');
        for (width, height) in &self.pages {
            out.push_str(&format!("page {} {}\n", width, height));
        }
        if let Some(password) = &self.password {
            out.push_str(&format!("password {}\n", password));
        }
        if self.render_fails {
            out.push_str("render-fails\n");
        }
        out.into_bytes()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, OpenError> {
        let text = std::str::from_utf8(bytes).map_err(OpenError::unreadable)?;
        let mut lines = text.lines();
        if lines.next() != Some(HEADER) {
            return Err(OpenError::Unreadable("missing header".to_string()));
        }

        let mut doc = FakeDocument::default();
        for line in lines {
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("page") => {
                    let width = parse_dimension(parts.next())?;
                    let height = parse_dimension(parts.next())?;
                    doc.pages.push((width, height));
                }
                Some("password") => {
                    doc.password = parts.next().map(str::to_string);
                }
                Some("render-fails") => doc.render_fails = true,
                None => {}
                Some(other) => {
                    return Err(OpenError::Unreadable(format!("unknown directive {other}")));
                }
            }
        }
        Ok(doc)
    }
}

fn parse_dimension(value: Option<&str>) -> Result<f32, OpenError> {
    value
        .and_then(|v| v.parse::<f32>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| OpenError::Unreadable("bad page size".to_string()))
}

/// 句柄计数器，在测试线程和解码线程之间共享
#[derive(Debug, Default)]
pub struct FakeProbe {
    open_calls: AtomicUsize,
    live_documents: AtomicUsize,
    max_live_documents: AtomicUsize,
    closed_documents: AtomicUsize,
    live_pages: AtomicUsize,
    opened_pages: AtomicUsize,
    render_calls: AtomicUsize,
}

impl FakeProbe {
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn live_documents(&self) -> usize {
        self.live_documents.load(Ordering::SeqCst)
    }

    pub fn max_live_documents(&self) -> usize {
        self.max_live_documents.load(Ordering::SeqCst)
    }

    pub fn closed_documents(&self) -> usize {
        self.closed_documents.load(Ordering::SeqCst)
    }

    pub fn live_pages(&self) -> usize {
        self.live_pages.load(Ordering::SeqCst)
    }

    pub fn opened_pages(&self) -> usize {
        self.opened_pages.load(Ordering::SeqCst)
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    fn document_opened(&self) {
        let live = self.live_documents.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live_documents.fetch_max(live, Ordering::SeqCst);
    }

    fn document_closed(&self) {
        self.live_documents.fetch_sub(1, Ordering::SeqCst);
        self.closed_documents.fetch_add(1, Ordering::SeqCst);
    }
}

/// 测试侧持有的闸门：等待解码线程进入被卡住的操作，再放行
pub struct DecodeGate {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl DecodeGate {
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered.recv_timeout(timeout).is_ok()
    }

    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

struct GateSide {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl GateSide {
    /// 放行返回 true，超时返回 false
    fn pass(&self) -> bool {
        let _ = self.entered.send(());
        self.release.recv_timeout(GATE_TIMEOUT).is_ok()
    }
}

fn gate_pair() -> (Arc<GateSide>, DecodeGate) {
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let side = GateSide {
        entered: entered_tx,
        release: release_rx,
    };
    let gate = DecodeGate {
        entered: entered_rx,
        release: release_tx,
    };
    (Arc::new(side), gate)
}

pub struct FakeDecoder {
    probe: Arc<FakeProbe>,
    open_gate: Option<Arc<GateSide>>,
    render_gate: Option<Arc<GateSide>>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(FakeProbe::default()),
            open_gate: None,
            render_gate: None,
        }
    }

    /// 每次 open 都会先通知 `DecodeGate` 然后等待放行
    pub fn gated() -> (Self, DecodeGate) {
        let (side, gate) = gate_pair();
        let decoder = Self {
            open_gate: Some(side),
            ..Self::new()
        };
        (decoder, gate)
    }

    /// 每次光栅化都会先通知 `DecodeGate` 然后等待放行
    pub fn render_gated() -> (Self, DecodeGate) {
        let (side, gate) = gate_pair();
        let decoder = Self {
            render_gate: Some(side),
            ..Self::new()
        };
        (decoder, gate)
    }

    pub fn probe(&self) -> Arc<FakeProbe> {
        Arc::clone(&self.probe)
    }
}

impl Default for FakeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FakeDecoder {
    fn open_document(
        &self,
        bytes: &[u8],
        password: Option<&str>,
    ) -> Result<Box<dyn DocumentHandle>, OpenError> {
        self.probe.open_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.open_gate {
            if !gate.pass() {
                return Err(OpenError::Unreadable("gate never released".to_string()));
            }
        }

        let doc = FakeDocument::parse(bytes)?;
        if let Some(expected) = &doc.password {
            match password {
                None => return Err(OpenError::PasswordRequired),
                Some(candidate) if candidate != expected => {
                    return Err(OpenError::PasswordIncorrect)
                }
                Some(_) => {}
            }
        }

        self.probe.document_opened();
        Ok(Box::new(FakeDocumentHandle {
            probe: Arc::clone(&self.probe),
            render_gate: self.render_gate.clone(),
            doc,
        }))
    }
}

struct FakeDocumentHandle {
    probe: Arc<FakeProbe>,
    render_gate: Option<Arc<GateSide>>,
    doc: FakeDocument,
}

impl DocumentHandle for FakeDocumentHandle {
    fn page_count(&self) -> usize {
        self.doc.pages.len()
    }

    fn page_size(&self, index: usize) -> Result<(f32, f32)> {
        match self.doc.pages.get(index) {
            Some(size) => Ok(*size),
            None => anyhow::bail!("Page index {} out of bounds", index),
        }
    }

    fn open_page(&self, index: usize) -> Result<Box<dyn PageHandle + '_>> {
        let size = self.page_size(index)?;
        self.probe.live_pages.fetch_add(1, Ordering::SeqCst);
        self.probe.opened_pages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            probe: &self.probe,
            gate: self.render_gate.as_deref(),
            index,
            size,
            fails: self.doc.render_fails,
        }))
    }
}

impl Drop for FakeDocumentHandle {
    fn drop(&mut self) {
        self.probe.document_closed();
    }
}

struct FakePage<'a> {
    probe: &'a FakeProbe,
    gate: Option<&'a GateSide>,
    index: usize,
    size: (f32, f32),
    fails: bool,
}

impl PageHandle for FakePage<'_> {
    fn size(&self) -> (f32, f32) {
        self.size
    }

    fn render(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        self.probe.render_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gate {
            if !gate.pass() {
                anyhow::bail!("gate never released");
            }
        }
        if self.fails {
            anyhow::bail!("simulated rasterizer failure on page {}", self.index);
        }
        let shade = (self.index % 256) as u8;
        Ok([shade, shade, shade, 255].repeat(width as usize * height as usize))
    }
}

impl Drop for FakePage<'_> {
    fn drop(&mut self) {
        self.probe.live_pages.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_what_it_writes() {
        let doc = FakeDocument::with_pages(2).page_size(30.0, 40.0).password("abc");
        assert_eq!(FakeDocument::parse(&doc.to_bytes()).unwrap(), doc);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            FakeDocument::parse(b"%PDF-1.7 garbage"),
            Err(OpenError::Unreadable(_))
        ));
        assert!(matches!(
            FakeDocument::parse(b"%FAKEPDF\npage ten 20\n"),
            Err(OpenError::Unreadable(_))
        ));
    }

    #[test]
    fn checks_password() {
        let decoder = FakeDecoder::new();
        let bytes = FakeDocument::with_pages(1).password("abc").to_bytes();
        assert_eq!(
            decoder.open_document(&bytes, None).err(),
            Some(OpenError::PasswordRequired)
        );
        assert_eq!(
            decoder.open_document(&bytes, Some("nope")).err(),
            Some(OpenError::PasswordIncorrect)
        );
        let handle = decoder.open_document(&bytes, Some("abc")).unwrap();
        assert_eq!(handle.page_count(), 1);
        assert_eq!(decoder.probe().live_documents(), 1);
        drop(handle);
        assert_eq!(decoder.probe().live_documents(), 0);
        assert_eq!(decoder.probe().closed_documents(), 1);
    }
}

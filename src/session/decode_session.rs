use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::cache::RenderedPage;
use crate::decoder::{Decoder, DocumentHandle, PageInfo};
use crate::error::{OpenError, SessionError};
use crate::session::{PasswordAttempt, SessionState};
use crate::source::DocumentSource;

/// 解码会话：唯一持有打开的文档句柄
///
/// 任何时刻最多只有一个文档句柄。换文档前先关闭旧句柄，
/// 页面句柄只在 [`DecodeSession::render_page`] 内部存在。
/// `dispose` 之后所有操作都返回 [`SessionError::SessionClosed`]。
pub struct DecodeSession {
    // 字段按声明顺序析构，句柄先于解码器释放
    handle: Option<Box<dyn DocumentHandle>>,
    decoder: Box<dyn Decoder>,
    /// 等待密码时保留的文档字节
    bytes: Option<Arc<[u8]>>,
    source_name: Option<String>,
    state: SessionState,
    pages: Vec<PageInfo>,
    last_error: Option<SessionError>,
    attempt: Option<PasswordAttempt>,
    closed: bool,
}

impl DecodeSession {
    pub fn new(decoder: Box<dyn Decoder>) -> Self {
        Self {
            handle: None,
            decoder,
            bytes: None,
            source_name: None,
            state: SessionState::Idle,
            pages: Vec::new(),
            last_error: None,
            attempt: None,
            closed: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn page_count(&self) -> usize {
        self.state.page_count()
    }

    pub fn pages(&self) -> &[PageInfo] {
        &self.pages
    }

    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// 最近一次被拒绝的密码尝试
    pub fn password_attempt(&self) -> Option<&PasswordAttempt> {
        self.attempt.as_ref()
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn has_document(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 打开新的文档来源
    ///
    /// 旧句柄先关闭再打开新文档。`None` 表示来源解析失败。
    /// 返回页数；失败时状态已经切换到 `PasswordRequired` 或 `Failed`。
    pub fn open(&mut self, source: Option<&DocumentSource>) -> Result<usize, SessionError> {
        self.ensure_open()?;
        self.close_document();
        self.state = SessionState::Loading;

        let Some(source) = source else {
            warn!("[DecodeSession] No document source");
            return Err(self.fail(SessionError::SourceUnavailable));
        };
        self.source_name = Some(source.display_name());
        info!("[DecodeSession] Opening {:?}", source);

        let bytes = match source.read_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("[DecodeSession] Failed to read {:?}: {}", source, e);
                return Err(self.fail(SessionError::Unreadable(e.to_string())));
            }
        };
        self.bytes = Some(bytes);
        self.try_open(None)
    }

    /// 用候选密码重试，只在 `PasswordRequired` 状态下有效
    pub fn submit_password(&mut self, candidate: &str) -> Result<usize, SessionError> {
        self.ensure_open()?;
        if !self.state.is_password_required() {
            return Err(self.invalid("submit_password"));
        }
        self.attempt = Some(PasswordAttempt::new(candidate));
        self.state = SessionState::Loading;
        self.try_open(Some(candidate))
    }

    /// 用户取消输入密码
    pub fn cancel_password(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if !self.state.is_password_required() {
            return Err(self.invalid("cancel_password"));
        }
        info!("[DecodeSession] Password entry cancelled");
        self.attempt = None;
        self.bytes = None;
        self.fail(SessionError::Cancelled);
        Ok(())
    }

    /// 关闭当前文档，回到 `Idle`；来源被替换时调用
    pub fn close_document(&mut self) {
        if let Some(handle) = self.handle.take() {
            info!(
                "[DecodeSession] Closing {:?} ({} pages)",
                self.source_name,
                handle.page_count()
            );
        }
        self.bytes = None;
        self.source_name = None;
        self.pages.clear();
        self.attempt = None;
        self.last_error = None;
        self.state = SessionState::Idle;
    }

    /// 把一页渲染到 width x height
    ///
    /// 页面句柄在返回前释放，失败路径也一样。
    pub fn render_page(
        &self,
        index: usize,
        width: u32,
        height: u32,
    ) -> Result<RenderedPage, SessionError> {
        self.ensure_open()?;
        let handle = match (&self.state, &self.handle) {
            (SessionState::Ready { .. }, Some(handle)) => handle,
            _ => return Err(self.invalid("render_page")),
        };
        let page_count = self.page_count();
        if index >= page_count {
            return Err(SessionError::OutOfRange { index, page_count });
        }
        if width == 0 || height == 0 {
            return Err(SessionError::Render(format!(
                "empty target {}x{}",
                width, height
            )));
        }

        let start_time = Instant::now();
        let pixels = {
            let page = handle.open_page(index).map_err(render_error)?;
            page.render(width, height).map_err(render_error)?
        };
        debug!(
            "[DecodeSession] Page {} rendered at {}x{} in {:?}",
            index,
            width,
            height,
            start_time.elapsed()
        );

        RenderedPage::from_rgba(index, width, height, pixels).ok_or_else(|| {
            SessionError::Render(format!("pixel buffer does not match {}x{}", width, height))
        })
    }

    /// 释放文档句柄；可以重复调用
    pub fn dispose(&mut self) {
        if self.closed {
            return;
        }
        info!("[DecodeSession] Disposing session");
        self.close_document();
        self.closed = true;
    }

    fn try_open(&mut self, password: Option<&str>) -> Result<usize, SessionError> {
        let Some(bytes) = self.bytes.clone() else {
            return Err(self.fail(SessionError::SourceUnavailable));
        };

        let start_time = Instant::now();
        match self.decoder.open_document(&bytes, password) {
            Ok(handle) => {
                let pages = match handle.get_all_pages() {
                    Ok(pages) => pages,
                    Err(e) => {
                        drop(handle);
                        return Err(self.fail(SessionError::Unreadable(format!("{:#}", e))));
                    }
                };
                let page_count = pages.len();
                info!(
                    "[DecodeSession] Opened {:?}: {} pages in {:?}",
                    self.source_name,
                    page_count,
                    start_time.elapsed()
                );

                self.handle = Some(handle);
                self.pages = pages;
                self.bytes = None;
                self.attempt = None;
                self.last_error = None;
                self.state = SessionState::Ready { page_count };
                Ok(page_count)
            }
            Err(OpenError::PasswordRequired) => {
                info!("[DecodeSession] Document is encrypted");
                self.state = SessionState::PasswordRequired {
                    last_rejected: false,
                };
                self.last_error = Some(SessionError::PasswordRequired);
                Err(SessionError::PasswordRequired)
            }
            Err(OpenError::PasswordIncorrect) => {
                info!("[DecodeSession] Password rejected");
                if let Some(attempt) = self.attempt.as_mut() {
                    attempt.reject();
                }
                self.state = SessionState::PasswordRequired {
                    last_rejected: true,
                };
                self.last_error = Some(SessionError::PasswordIncorrect);
                Err(SessionError::PasswordIncorrect)
            }
            Err(OpenError::Unreadable(msg)) => {
                warn!("[DecodeSession] Unreadable document: {}", msg);
                self.bytes = None;
                Err(self.fail(SessionError::Unreadable(msg)))
            }
        }
    }

    fn fail(&mut self, reason: SessionError) -> SessionError {
        self.state = SessionState::Failed(reason.clone());
        self.last_error = Some(reason.clone());
        reason
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            Err(SessionError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state.name(),
        }
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn render_error(err: anyhow::Error) -> SessionError {
    SessionError::Render(format!("{:#}", err))
}

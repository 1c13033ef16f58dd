use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::cache::{RenderCache, RenderKey, RenderedPage};
use crate::config::ViewerConfig;
use crate::decoder::{DecodeResult, DecodeService, DecodeTask, Decoder, PageInfo};
use crate::error::SessionError;
use crate::page::{target_resolution, PageNavigator, ViewTransform, ZoomPolicy};
use crate::session::{AttemptOutcome, SessionState};
use crate::source::DocumentSource;

/// 给界面层的只读快照
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerSnapshot {
    pub state: SessionState,
    pub page_count: usize,
    pub page_index: usize,
    pub transform: ViewTransform,
    /// 最近一次渲染好的当前页，没有时为 None
    pub page: Option<Arc<RenderedPage>>,
    pub source_name: Option<String>,
    pub last_render_error: Option<SessionError>,
    /// 正在检查或刚被拒绝的密码尝试
    pub password_attempt: Option<AttemptOutcome>,
    pub has_previous: bool,
    pub has_next: bool,
    /// 还有打开或渲染任务没完成
    pub busy: bool,
}

impl ViewerSnapshot {
    pub fn page_label(&self) -> String {
        if self.page_count == 0 {
            "Page: 0/0".to_string()
        } else {
            format!("Page: {}/{}", self.page_index + 1, self.page_count)
        }
    }

    /// 每个状态都有可以展示给用户的文字
    pub fn status_message(&self) -> String {
        match &self.state {
            SessionState::Idle => "Open a PDF document to start reading.".to_string(),
            SessionState::Loading => match self.password_attempt {
                Some(AttemptOutcome::Pending) => "Checking password...".to_string(),
                _ => "Loading document...".to_string(),
            },
            SessionState::PasswordRequired {
                last_rejected: false,
            } => "This document is password protected. Enter the password.".to_string(),
            SessionState::PasswordRequired {
                last_rejected: true,
            } => "Incorrect password. Try again.".to_string(),
            SessionState::Ready { page_count: 0 } => "Document contains no pages.".to_string(),
            SessionState::Ready { .. } => match &self.last_render_error {
                Some(e) => format!("Failed to render page: {}", e),
                None => self.page_label(),
            },
            SessionState::Failed(SessionError::SourceUnavailable) => {
                "The document could not be found.".to_string()
            }
            SessionState::Failed(SessionError::Cancelled) => {
                "Password entry cancelled.".to_string()
            }
            SessionState::Failed(reason) => format!("Unable to open document: {}", reason),
        }
    }
}

/// 查看器状态：接收界面命令，把解码工作交给后台线程，在前台合并结果
///
/// 所有命令都不阻塞；调用 [`ViewerState::poll`] 应用后台结果。
pub struct ViewerState {
    service: DecodeService,
    policy: ZoomPolicy,
    state: SessionState,
    pages: Vec<PageInfo>,
    navigator: PageNavigator,
    transform: ViewTransform,
    cache: RenderCache,
    current: Option<Arc<RenderedPage>>,
    source_name: Option<String>,
    generation: u64,
    pending_open: bool,
    pending_render: Option<RenderKey>,
    last_render_error: Option<SessionError>,
    password_attempt: Option<AttemptOutcome>,
    disposed: bool,
}

impl ViewerState {
    pub fn new<D: Decoder + 'static>(decoder: D, config: &ViewerConfig) -> Self {
        let service = DecodeService::spawn(decoder);
        let generation = service.current_generation();
        Self {
            service,
            policy: config.zoom_policy(),
            state: SessionState::Idle,
            pages: Vec::new(),
            navigator: PageNavigator::default(),
            transform: ViewTransform::identity(),
            cache: RenderCache::new(config.cache_capacity),
            current: None,
            source_name: None,
            generation,
            pending_open: false,
            pending_render: None,
            last_render_error: None,
            password_attempt: None,
            disposed: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn page_count(&self) -> usize {
        self.navigator.page_count()
    }

    pub fn page_index(&self) -> usize {
        self.navigator.index()
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub fn policy(&self) -> &ZoomPolicy {
        &self.policy
    }

    pub fn current_page(&self) -> Option<Arc<RenderedPage>> {
        self.current.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.pending_open || self.pending_render.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        ViewerSnapshot {
            state: self.state.clone(),
            page_count: self.page_count(),
            page_index: self.page_index(),
            transform: self.transform,
            page: self.current.clone(),
            source_name: self.source_name.clone(),
            last_render_error: self.last_render_error.clone(),
            password_attempt: self.password_attempt,
            has_previous: self.navigator.has_previous(),
            has_next: self.navigator.has_next(),
            busy: self.is_busy(),
        }
    }

    /// 打开新文档，之前的文档和所有未完成的结果作废
    ///
    /// `None` 表示来源解析失败，会话进入 `Failed(SourceUnavailable)`。
    pub fn open(&mut self, source: Option<DocumentSource>) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.reset_document();
        self.source_name = source.as_ref().map(DocumentSource::display_name);
        self.state = SessionState::Loading;
        self.pending_open = true;
        info!(
            "[ViewerState] Open {:?} (generation {})",
            self.source_name, self.generation
        );
        self.submit(DecodeTask::Open {
            generation: self.generation,
            source,
        });
        Ok(())
    }

    /// 关闭当前文档回到欢迎状态
    pub fn close(&mut self) -> Result<(), SessionError> {
        self.ensure_alive()?;
        self.reset_document();
        self.state = SessionState::Idle;
        self.submit(DecodeTask::Close {
            generation: self.generation,
        });
        Ok(())
    }

    pub fn submit_password(&mut self, candidate: &str) -> Result<(), SessionError> {
        self.ensure_alive()?;
        if !self.state.is_password_required() {
            return Err(self.invalid("submit_password"));
        }
        self.state = SessionState::Loading;
        self.pending_open = true;
        self.password_attempt = Some(AttemptOutcome::Pending);
        self.submit(DecodeTask::SubmitPassword {
            generation: self.generation,
            candidate: candidate.to_string(),
        });
        Ok(())
    }

    pub fn cancel_password(&mut self) -> Result<(), SessionError> {
        self.ensure_alive()?;
        if !self.state.is_password_required() {
            return Err(self.invalid("cancel_password"));
        }
        self.state = SessionState::Failed(SessionError::Cancelled);
        self.password_attempt = None;
        self.submit(DecodeTask::CancelPassword {
            generation: self.generation,
        });
        Ok(())
    }

    /// 跳转到指定页；越界时返回 `OutOfRange`，当前页不变
    pub fn go_to_page(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_alive()?;
        if !self.state.is_ready() {
            return Err(self.invalid("go_to_page"));
        }
        match self.navigator.go_to(index) {
            None => Err(self.rejected(SessionError::OutOfRange {
                index,
                page_count: self.navigator.page_count(),
            })),
            Some(changed) => {
                if changed {
                    self.page_changed();
                }
                Ok(())
            }
        }
    }

    /// 下一页，到最后一页时不动
    pub fn next(&mut self) -> bool {
        if !self.can_navigate() || !self.navigator.next() {
            return false;
        }
        self.page_changed();
        true
    }

    pub fn previous(&mut self) -> bool {
        if !self.can_navigate() || !self.navigator.previous() {
            return false;
        }
        self.page_changed();
        true
    }

    pub fn zoom_by(&mut self, factor: f32) -> bool {
        if self.disposed || !self.transform.zoom_by(factor, &self.policy) {
            return false;
        }
        self.request_render();
        true
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        if self.disposed {
            return;
        }
        self.transform.pan_by(dx, dy);
    }

    pub fn double_tap_zoom(&mut self) {
        if self.disposed {
            return;
        }
        self.transform.double_tap(&self.policy);
        self.request_render();
    }

    /// 释放会话，可以重复调用
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        info!("[ViewerState] Dispose");
        self.disposed = true;
        self.reset_document();
        self.state = SessionState::Idle;
        self.service.destroy();
    }

    /// 应用所有已经完成的后台结果（非阻塞），返回是否有变化
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Some(result) = self.service.try_recv_result() {
            changed |= self.apply(result);
        }
        changed
    }

    /// 阻塞直到没有未完成的打开和渲染任务；超时返回 false
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.poll();
        while self.is_busy() {
            let now = Instant::now();
            if now >= deadline {
                warn!("[ViewerState] wait_idle timed out");
                return false;
            }
            match self.service.recv_result_timeout(deadline - now) {
                Some(result) => {
                    self.apply(result);
                }
                None => {
                    if Instant::now() < deadline {
                        // 解码线程已经退出
                        warn!("[ViewerState] Decode service stopped");
                        self.pending_open = false;
                        self.pending_render = None;
                    }
                }
            }
        }
        true
    }

    fn apply(&mut self, result: DecodeResult) -> bool {
        if result.generation() != self.generation || self.disposed {
            debug!(
                "[ViewerState] Discard result of generation {} (current {})",
                result.generation(),
                self.generation
            );
            return false;
        }

        match result {
            DecodeResult::StateChanged {
                state,
                pages,
                attempt,
                ..
            } => {
                self.pending_open = false;
                self.password_attempt = attempt;
                info!("[ViewerState] Session {}", state);
                if state.is_ready() {
                    self.navigator = PageNavigator::new(pages.len());
                    self.pages = pages;
                    self.transform.reset();
                    self.state = state;
                    self.request_render();
                } else {
                    self.pages.clear();
                    self.navigator = PageNavigator::default();
                    self.state = state;
                }
                true
            }
            DecodeResult::Rendered { key, result, .. } => {
                let wanted = self.pending_render == Some(key);
                match result {
                    Ok(page) => {
                        let page = self.cache.put(key, page);
                        if wanted {
                            self.current = Some(page);
                            self.pending_render = None;
                            self.last_render_error = None;
                        }
                    }
                    Err(e) => {
                        warn!("[ViewerState] Render {:?} failed: {}", key, e);
                        if wanted {
                            self.pending_render = None;
                            self.last_render_error = Some(e);
                        }
                    }
                }
                wanted
            }
        }
    }

    /// 当前页和缩放对应的渲染键，没有可渲染的页面时为 None
    fn wanted_key(&self) -> Option<RenderKey> {
        if !self.state.is_ready() {
            return None;
        }
        let info = self.pages.get(self.navigator.index())?;
        let (width, height) = target_resolution(
            info.width,
            info.height,
            self.transform.scale(),
            self.policy.base_render_factor,
        );
        Some(RenderKey::new(info.index, width, height))
    }

    fn request_render(&mut self) {
        let Some(key) = self.wanted_key() else {
            return;
        };

        // 排队中其他键的渲染都不再需要
        self.service.set_wanted_render(Some(key));
        if let Some(page) = self.cache.get(&key) {
            debug!("[ViewerState] Cache hit {:?}", key);
            self.current = Some(page);
            self.pending_render = None;
            return;
        }
        if self.pending_render == Some(key) {
            return;
        }

        debug!("[ViewerState] Cache miss {:?}", key);
        // 同一页换分辨率时先保留旧图
        if self
            .current
            .as_ref()
            .is_some_and(|page| page.index != key.page_index)
        {
            self.current = None;
        }
        self.pending_render = Some(key);
        self.submit(DecodeTask::Render {
            generation: self.generation,
            key,
        });
    }

    fn page_changed(&mut self) {
        self.transform.reset();
        self.last_render_error = None;
        self.request_render();
    }

    fn can_navigate(&self) -> bool {
        !self.disposed && self.state.is_ready()
    }

    fn reset_document(&mut self) {
        self.generation = self.service.begin_generation();
        self.service.set_wanted_render(None);
        self.pages.clear();
        self.navigator = PageNavigator::default();
        self.transform.reset();
        self.cache.clear();
        self.current = None;
        self.source_name = None;
        self.pending_open = false;
        self.pending_render = None;
        self.last_render_error = None;
        self.password_attempt = None;
    }

    fn submit(&mut self, task: DecodeTask) {
        if !self.service.submit(task) {
            warn!("[ViewerState] Decode service is gone");
            self.pending_open = false;
            self.pending_render = None;
        }
    }

    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.disposed {
            Err(self.rejected(SessionError::SessionClosed))
        } else {
            Ok(())
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        self.rejected(SessionError::InvalidState {
            operation,
            state: self.state.name(),
        })
    }

    /// 调用方用错了接口时记一条警告
    fn rejected(&self, e: SessionError) -> SessionError {
        if e.is_programming_error() {
            warn!("[ViewerState] Command rejected in state {}: {}", self.state, e);
        }
        e
    }
}

impl Drop for ViewerState {
    fn drop(&mut self) {
        self.dispose();
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::cache::{RenderKey, RenderedPage};
use crate::decoder::{Decoder, PageInfo};
use crate::error::SessionError;
use crate::session::{AttemptOutcome, DecodeSession, PasswordAttempt, SessionState};
use crate::source::DocumentSource;

/// 解码任务，都带着发出时的代数
pub enum DecodeTask {
    /// 打开文档；`None` 表示来源解析失败
    Open {
        generation: u64,
        source: Option<DocumentSource>,
    },
    SubmitPassword {
        generation: u64,
        candidate: String,
    },
    CancelPassword {
        generation: u64,
    },
    /// 渲染页面
    Render {
        generation: u64,
        key: RenderKey,
    },
    /// 关闭当前文档
    Close {
        generation: u64,
    },
    /// 关闭服务
    Shutdown,
}

impl DecodeTask {
    fn generation(&self) -> Option<u64> {
        match self {
            DecodeTask::Open { generation, .. }
            | DecodeTask::SubmitPassword { generation, .. }
            | DecodeTask::CancelPassword { generation }
            | DecodeTask::Render { generation, .. }
            | DecodeTask::Close { generation } => Some(*generation),
            DecodeTask::Shutdown => None,
        }
    }
}

/// 解码结果，可以跨线程传递
#[derive(Debug)]
pub enum DecodeResult {
    /// 会话状态变化（打开、密码重试、取消之后）
    StateChanged {
        generation: u64,
        state: SessionState,
        pages: Vec<PageInfo>,
        /// 还保留着的密码尝试；进入 `Ready` 或取消后为 None
        attempt: Option<AttemptOutcome>,
    },
    Rendered {
        generation: u64,
        key: RenderKey,
        result: Result<RenderedPage, SessionError>,
    },
}

impl DecodeResult {
    pub fn generation(&self) -> u64 {
        match self {
            DecodeResult::StateChanged { generation, .. }
            | DecodeResult::Rendered { generation, .. } => *generation,
        }
    }
}

/// 解码服务 - 单线程解码，通过channel通信
///
/// 解码线程独占 [`DecodeSession`]，文档句柄不会离开这个线程。
/// 每次换文档或释放都会推进代数，旧代数的任务直接跳过，
/// 旧代数打开的句柄立即关闭。
/// 前台随时可以改写“想要的渲染键”，排队中不再需要的渲染任务不做光栅化。
pub struct DecodeService {
    task_sender: Sender<DecodeTask>,
    result_receiver: Mutex<Receiver<DecodeResult>>,
    generation: Arc<AtomicU64>,
    wanted_render: Arc<Mutex<Option<RenderKey>>>,
    decode_thread: Option<JoinHandle<()>>,
}

impl DecodeService {
    pub fn spawn<D: Decoder + 'static>(decoder: D) -> Self {
        let (task_tx, task_rx) = unbounded::<DecodeTask>();
        let (result_tx, result_rx) = unbounded::<DecodeResult>();
        let generation = Arc::new(AtomicU64::new(0));
        let worker_generation = Arc::clone(&generation);
        let wanted_render = Arc::new(Mutex::new(None));
        let worker_wanted = Arc::clone(&wanted_render);

        // 启动解码线程
        let decode_thread = thread::spawn(move || {
            let session = DecodeSession::new(Box::new(decoder));
            Self::decode_loop(session, worker_generation, worker_wanted, task_rx, result_tx);
        });

        Self {
            task_sender: task_tx,
            result_receiver: Mutex::new(result_rx),
            generation,
            wanted_render,
            decode_thread: Some(decode_thread),
        }
    }

    /// 解码线程主循环
    fn decode_loop(
        mut session: DecodeSession,
        current_generation: Arc<AtomicU64>,
        wanted_render: Arc<Mutex<Option<RenderKey>>>,
        task_rx: Receiver<DecodeTask>,
        result_tx: Sender<DecodeResult>,
    ) {
        let is_current = |g: u64| current_generation.load(Ordering::SeqCst) == g;
        // None 表示没有限制
        let is_wanted = |key: &RenderKey| {
            wanted_render
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .map_or(true, |wanted| wanted == *key)
        };

        loop {
            let task = match task_rx.recv() {
                Ok(task) => task,
                Err(_) => {
                    info!("[DecodeService] Task channel closed");
                    break;
                }
            };

            if let Some(task_generation) = task.generation() {
                if !is_current(task_generation) {
                    debug!(
                        "[DecodeService] Skip task of superseded generation {}",
                        task_generation
                    );
                    continue;
                }
            }

            let result = match task {
                DecodeTask::Open { generation, source } => {
                    if let Err(e) = session.open(source.as_ref()) {
                        Self::log_session_error("Open", &e);
                    }
                    Self::state_result(&mut session, generation, &is_current)
                }
                DecodeTask::SubmitPassword {
                    generation,
                    candidate,
                } => {
                    if let Err(e) = session.submit_password(&candidate) {
                        Self::log_session_error("Password attempt", &e);
                    }
                    Self::state_result(&mut session, generation, &is_current)
                }
                DecodeTask::CancelPassword { generation } => {
                    if let Err(e) = session.cancel_password() {
                        warn!("[DecodeService] Cancel password ignored: {}", e);
                    }
                    Self::state_result(&mut session, generation, &is_current)
                }
                DecodeTask::Render { generation, key } => {
                    if !is_wanted(&key) {
                        debug!("[DecodeService] Skip render {:?}, no longer wanted", key);
                        continue;
                    }
                    let start_time = Instant::now();
                    let result = session.render_page(key.page_index, key.width, key.height);
                    match &result {
                        Ok(_) => info!(
                            "[DecodeService] 页面 {} 解码完成 {}x{}，耗时: {:?}",
                            key.page_index,
                            key.width,
                            key.height,
                            start_time.elapsed()
                        ),
                        Err(e) if e.is_programming_error() => {
                            error!("[DecodeService] 页面 {} 请求无效: {}", key.page_index, e)
                        }
                        Err(e) => warn!("[DecodeService] 页面 {} 解码失败: {}", key.page_index, e),
                    }
                    Some(DecodeResult::Rendered {
                        generation,
                        key,
                        result,
                    })
                }
                DecodeTask::Close { .. } => {
                    session.close_document();
                    None
                }
                DecodeTask::Shutdown => {
                    info!("[DecodeService] Shutting down decode thread");
                    break;
                }
            };

            if let Some(result) = result {
                if result_tx.send(result).is_err() {
                    info!("[DecodeService] Result channel closed");
                    break;
                }
            }
        }

        session.dispose();
    }

    /// 打开期间代数已经变化时，新句柄立即关闭，不上报结果
    fn state_result(
        session: &mut DecodeSession,
        generation: u64,
        is_current: &impl Fn(u64) -> bool,
    ) -> Option<DecodeResult> {
        if !is_current(generation) {
            info!(
                "[DecodeService] Generation {} superseded during open, releasing document",
                generation
            );
            session.close_document();
            return None;
        }
        Some(DecodeResult::StateChanged {
            generation,
            state: session.state().clone(),
            pages: session.pages().to_vec(),
            attempt: session.password_attempt().map(PasswordAttempt::outcome),
        })
    }

    /// 可以重试的错误（要密码、密码错误）是正常流程，其他的记警告
    fn log_session_error(operation: &str, e: &SessionError) {
        if e.is_retryable() {
            debug!("[DecodeService] {}: {}", operation, e);
        } else {
            warn!("[DecodeService] {} failed: {}", operation, e);
        }
    }

    /// 推进代数，之前发出的任务和结果全部作废
    pub fn begin_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// 设置前台当前想要的渲染键，其他键的排队任务会被跳过；None 表示全部渲染
    pub fn set_wanted_render(&self, key: Option<RenderKey>) {
        *self
            .wanted_render
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = key;
    }

    /// 提交任务（异步，不等待）；解码线程已经退出时返回 false
    pub fn submit(&self, task: DecodeTask) -> bool {
        self.task_sender.send(task).is_ok()
    }

    /// 尝试接收解码结果（非阻塞）
    pub fn try_recv_result(&self) -> Option<DecodeResult> {
        self.result_receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }

    /// 等待解码结果；超时或解码线程退出时返回 None
    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<DecodeResult> {
        match self
            .result_receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv_timeout(timeout)
        {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("[DecodeService] Result channel disconnected");
                None
            }
        }
    }

    /// 关闭服务
    pub fn destroy(&mut self) {
        info!("[DecodeService] Destroying decoder service");
        self.generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.task_sender.send(DecodeTask::Shutdown);
    }
}

impl Drop for DecodeService {
    fn drop(&mut self) {
        self.destroy();
        if let Some(handle) = self.decode_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::fake::{FakeDecoder, FakeDocument};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn source(doc: FakeDocument) -> Option<DocumentSource> {
        Some(DocumentSource::memory("doc.pdf", doc.to_bytes()))
    }

    #[test]
    fn open_then_render() {
        let decoder = FakeDecoder::new();
        let probe = decoder.probe();
        let service = DecodeService::spawn(decoder);

        let generation = service.begin_generation();
        assert!(service.submit(DecodeTask::Open {
            generation,
            source: source(FakeDocument::with_pages(2)),
        }));
        match service.recv_result_timeout(TIMEOUT) {
            Some(DecodeResult::StateChanged { state, pages, .. }) => {
                assert_eq!(state, SessionState::Ready { page_count: 2 });
                assert_eq!(pages.len(), 2);
            }
            other => panic!("unexpected result {:?}", other),
        }

        let key = RenderKey::new(1, 8, 6);
        service.submit(DecodeTask::Render { generation, key });
        match service.recv_result_timeout(TIMEOUT) {
            Some(DecodeResult::Rendered {
                key: rendered_key,
                result: Ok(page),
                ..
            }) => {
                assert_eq!(rendered_key, key);
                assert_eq!(page.key(), key);
            }
            other => panic!("unexpected result {:?}", other),
        }

        drop(service);
        assert_eq!(probe.live_documents(), 0);
    }

    #[test]
    fn renders_no_longer_wanted_are_skipped() {
        let (decoder, gate) = FakeDecoder::render_gated();
        let probe = decoder.probe();
        let service = DecodeService::spawn(decoder);

        let generation = service.begin_generation();
        service.submit(DecodeTask::Open {
            generation,
            source: source(FakeDocument::with_pages(1)),
        });
        assert!(service.recv_result_timeout(TIMEOUT).is_some());

        let first = RenderKey::new(0, 10, 20);
        let stale = RenderKey::new(0, 12, 24);
        let latest = RenderKey::new(0, 14, 28);
        service.set_wanted_render(Some(first));
        service.submit(DecodeTask::Render {
            generation,
            key: first,
        });
        assert!(gate.wait_entered(TIMEOUT));

        // 第一张还在光栅化时，前台已经换了两次目标
        service.submit(DecodeTask::Render {
            generation,
            key: stale,
        });
        service.submit(DecodeTask::Render {
            generation,
            key: latest,
        });
        service.set_wanted_render(Some(latest));
        gate.release();
        assert!(gate.wait_entered(TIMEOUT));
        gate.release();

        let keys: Vec<RenderKey> = (0..2)
            .filter_map(|_| match service.recv_result_timeout(TIMEOUT) {
                Some(DecodeResult::Rendered { key, .. }) => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![first, latest]);
        assert_eq!(probe.render_calls(), 2);
    }

    #[test]
    fn password_outcome_travels_with_state() {
        let service = DecodeService::spawn(FakeDecoder::new());
        let generation = service.begin_generation();
        service.submit(DecodeTask::Open {
            generation,
            source: source(FakeDocument::with_pages(1).password("abc")),
        });
        match service.recv_result_timeout(TIMEOUT) {
            Some(DecodeResult::StateChanged { attempt, .. }) => assert_eq!(attempt, None),
            other => panic!("unexpected result {:?}", other),
        }

        service.submit(DecodeTask::SubmitPassword {
            generation,
            candidate: "nope".to_string(),
        });
        match service.recv_result_timeout(TIMEOUT) {
            Some(DecodeResult::StateChanged { state, attempt, .. }) => {
                assert!(state.is_password_required());
                assert_eq!(attempt, Some(AttemptOutcome::Rejected));
            }
            other => panic!("unexpected result {:?}", other),
        }

        service.submit(DecodeTask::SubmitPassword {
            generation,
            candidate: "abc".to_string(),
        });
        match service.recv_result_timeout(TIMEOUT) {
            Some(DecodeResult::StateChanged { state, attempt, .. }) => {
                assert!(state.is_ready());
                assert_eq!(attempt, None);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn superseded_tasks_are_skipped() {
        let decoder = FakeDecoder::new();
        let probe = decoder.probe();
        let service = DecodeService::spawn(decoder);

        let stale = service.begin_generation();
        let current = service.begin_generation();
        service.submit(DecodeTask::Open {
            generation: stale,
            source: source(FakeDocument::with_pages(1)),
        });
        service.submit(DecodeTask::Open {
            generation: current,
            source: source(FakeDocument::with_pages(5)),
        });

        let result = service.recv_result_timeout(TIMEOUT).unwrap();
        assert_eq!(result.generation(), current);
        assert_eq!(probe.open_calls(), 1);
    }

    #[test]
    fn handle_opened_for_superseded_generation_is_released() {
        let (decoder, gate) = FakeDecoder::gated();
        let probe = decoder.probe();
        let service = DecodeService::spawn(decoder);

        let generation = service.begin_generation();
        service.submit(DecodeTask::Open {
            generation,
            source: source(FakeDocument::with_pages(3)),
        });
        assert!(gate.wait_entered(TIMEOUT));
        service.begin_generation();
        gate.release();

        assert!(service
            .recv_result_timeout(Duration::from_millis(300))
            .is_none());
        assert_eq!(probe.live_documents(), 0);
        assert_eq!(probe.closed_documents(), 1);
    }
}

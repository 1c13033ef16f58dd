use std::fmt;

use crate::error::SessionError;

/// 解码会话状态
///
/// `Ready` 和 `Failed` 会一直保持到文档来源改变。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// 还没有文档
    #[default]
    Idle,
    /// 正在打开文档（或正在用候选密码重试）
    Loading,
    /// 文档加密，等待用户输入密码；`last_rejected` 表示上一次密码被拒绝
    PasswordRequired { last_rejected: bool },
    Ready { page_count: usize },
    Failed(SessionError),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::PasswordRequired { .. } => "password required",
            SessionState::Ready { .. } => "ready",
            SessionState::Failed(_) => "failed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready { .. })
    }

    pub fn is_password_required(&self) -> bool {
        matches!(self, SessionState::PasswordRequired { .. })
    }

    /// 只有 `Ready` 时才有页数
    pub fn page_count(&self) -> usize {
        match self {
            SessionState::Ready { page_count } => *page_count,
            _ => 0,
        }
    }

    pub fn failure(&self) -> Option<&SessionError> {
        match self {
            SessionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Ready { page_count } => write!(f, "ready ({} pages)", page_count),
            SessionState::PasswordRequired {
                last_rejected: true,
            } => write!(f, "password required (last attempt rejected)"),
            SessionState::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// 密码尝试的进度；被接受的尝试直接丢弃，不再单独记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Rejected,
}

/// 一次密码尝试，不落盘，进入 `Ready` 或取消后丢弃
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordAttempt {
    candidate: String,
    outcome: AttemptOutcome,
}

impl PasswordAttempt {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            outcome: AttemptOutcome::Pending,
        }
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    pub fn outcome(&self) -> AttemptOutcome {
        self.outcome
    }

    pub fn reject(&mut self) {
        self.outcome = AttemptOutcome::Rejected;
    }
}

// 密码不能出现在日志里
impl fmt::Debug for PasswordAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordAttempt")
            .field("candidate", &"<redacted>")
            .field("outcome", &self.outcome)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_only_when_ready() {
        assert_eq!(SessionState::Ready { page_count: 3 }.page_count(), 3);
        assert_eq!(SessionState::Loading.page_count(), 0);
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(
            SessionState::Ready { page_count: 2 }.to_string(),
            "ready (2 pages)"
        );
        assert_eq!(
            SessionState::Failed(SessionError::Cancelled).to_string(),
            "failed: password entry cancelled"
        );
        assert_eq!(SessionState::Idle.to_string(), "idle");
    }

    #[test]
    fn debug_redacts_candidate() {
        let mut attempt = PasswordAttempt::new("hunter2");
        attempt.reject();
        let debug = format!("{:?}", attempt);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("Rejected"));
        assert_eq!(attempt.candidate(), "hunter2");
    }
}

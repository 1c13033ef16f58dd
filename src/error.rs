use thiserror::Error;

/// 会话对外暴露的错误分类
///
/// `PasswordRequired` / `PasswordIncorrect` 可以通过重新输入密码恢复；
/// `SourceUnavailable` / `Unreadable` 对当前文档来源是终止性的；
/// `OutOfRange` / `SessionClosed` 表示调用方违反了约定。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("document source unavailable")]
    SourceUnavailable,

    #[error("document is password protected")]
    PasswordRequired,

    #[error("incorrect password")]
    PasswordIncorrect,

    #[error("unreadable document: {0}")]
    Unreadable(String),

    #[error("page {index} out of range (page count {page_count})")]
    OutOfRange { index: usize, page_count: usize },

    #[error("session closed")]
    SessionClosed,

    #[error("password entry cancelled")]
    Cancelled,

    #[error("{operation} is not valid while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("render failed: {0}")]
    Render(String),
}

impl SessionError {
    /// 用户重新提交密码即可恢复
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::PasswordRequired | SessionError::PasswordIncorrect
        )
    }

    /// 调用方错误：开发期应该暴露出来，而不是当成文档问题展示给用户
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            SessionError::OutOfRange { .. }
                | SessionError::SessionClosed
                | SessionError::InvalidState { .. }
        )
    }
}

/// 解码能力在打开文档时只区分三种失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("password required")]
    PasswordRequired,

    #[error("password incorrect")]
    PasswordIncorrect,

    #[error("{0}")]
    Unreadable(String),
}

impl OpenError {
    pub fn unreadable(err: impl std::fmt::Display) -> Self {
        OpenError::Unreadable(err.to_string())
    }
}

impl From<OpenError> for SessionError {
    fn from(err: OpenError) -> Self {
        match err {
            OpenError::PasswordRequired => SessionError::PasswordRequired,
            OpenError::PasswordIncorrect => SessionError::PasswordIncorrect,
            OpenError::Unreadable(msg) => SessionError::Unreadable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_errors_keep_their_kind() {
        assert_eq!(
            SessionError::from(OpenError::PasswordRequired),
            SessionError::PasswordRequired
        );
        assert_eq!(
            SessionError::from(OpenError::PasswordIncorrect),
            SessionError::PasswordIncorrect
        );
        assert_eq!(
            SessionError::from(OpenError::unreadable("bad xref")),
            SessionError::Unreadable("bad xref".to_string())
        );
    }

    #[test]
    fn classifies_errors() {
        assert!(SessionError::PasswordIncorrect.is_retryable());
        assert!(!SessionError::Unreadable(String::new()).is_retryable());
        assert!(SessionError::SessionClosed.is_programming_error());
        assert!(SessionError::OutOfRange {
            index: 3,
            page_count: 3
        }
        .is_programming_error());
        assert!(!SessionError::SourceUnavailable.is_programming_error());
    }

    #[test]
    fn messages_are_user_readable() {
        assert_eq!(
            SessionError::OutOfRange {
                index: 5,
                page_count: 3
            }
            .to_string(),
            "page 5 out of range (page count 3)"
        );
        assert_eq!(
            SessionError::Unreadable("not a pdf".into()).to_string(),
            "unreadable document: not a pdf"
        );
    }
}

pub mod decode_session;
pub mod session_state;

pub use decode_session::DecodeSession;
pub use session_state::{AttemptOutcome, PasswordAttempt, SessionState};

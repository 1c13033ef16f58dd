pub mod cache;
pub mod config;
pub mod decoder;
pub mod error;
pub mod page;
pub mod session;
pub mod source;
pub mod state;

pub use cache::{RenderCache, RenderKey, RenderedPage};
pub use config::ViewerConfig;
pub use error::{OpenError, SessionError};
pub use page::{target_resolution, PageNavigator, ViewTransform, ZoomPolicy};
pub use session::{AttemptOutcome, DecodeSession, PasswordAttempt, SessionState};
pub use source::{CacheDirResolver, DocumentSource, SourceReference, SourceResolver};
pub use state::{ViewerSnapshot, ViewerState};

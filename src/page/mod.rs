pub mod view_state;

pub use view_state::{target_resolution, PageNavigator, ViewTransform, ZoomPolicy};

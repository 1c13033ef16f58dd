pub mod cache;

pub use cache::{RenderCache, RenderKey, RenderedPage};

pub mod state;

pub use state::{ViewerSnapshot, ViewerState};

mod durable;
mod playback;
mod vote;

pub use durable::*;
pub use playback::*;
pub use vote::*;

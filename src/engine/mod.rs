// Card-to-record pipeline: debounce repeat reads, resolve the holder, toggle
// their presence, and hand the outcome to notification and display.

mod debounce;
mod poller;
mod resolver;

pub use debounce::CardDebouncer;
pub use poller::ReaderLoop;
pub use resolver::{AccessStateResolver, Resolution};

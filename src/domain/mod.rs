pub mod item;
pub mod verdict;

pub use item::{message_identity, Identity, MediaItem, MessageItem};
pub use verdict::{MediaVerdict, MessageVerdict, Verdict};

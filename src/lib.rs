pub mod config;
pub mod error;
pub mod splitter;
pub mod streaming;

pub use crate::config::{Delimiter, SplitConfig};
pub use crate::error::SplitError;
pub use crate::splitter::{split_file, TextFileSplitter};
pub use crate::streaming::{SplitEvent, SplitSummary};

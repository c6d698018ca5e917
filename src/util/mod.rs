//! Text helpers shared by the feed parser and command output.
//!
//! - **Entity decoding**: feed titles and descriptions frequently carry HTML
//!   character references that survive XML decoding
//! - **Sanitizing**: control characters and ANSI escapes removed before
//!   feed text reaches the terminal
//! - **Truncation**: Unicode-aware width truncation for `browse` output

mod text;

pub use text::{decode_html_entities, strip_control_chars, truncate_to_width};

//! Mutable XML element trees for appliance configuration documents.
//!
//! Documents are parsed into a plain [`XmlNode`] tree, edited in place, and
//! written back atomically. Elements the caller never touches are carried through
//! unchanged.

pub mod parser;
pub mod tree;
pub mod writer;

pub use parser::{parse, parse_file, parse_str, ParseError};
pub use tree::XmlNode;
pub use writer::{write, write_file, WriteError};

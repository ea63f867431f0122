//! The profile document and its loader. Parsing the document into this
//! in-memory shape is explicitly out of scope for the matcher/propagator
//! core — that work is delegated to `serde_yaml`, the same way the rest of
//! this crate's lineage delegates varint/zlib decoding to library crates
//! rather than hand-rolling them.

pub mod types;

use std::fs;
use std::io;
use std::path::Path;

pub use types::{
    CallSite, Flags, HashFunction, Header, ProfileDocument, ProfiledBlock, ProfiledFunction,
    Successor, COUNT_NO_PROFILE, SCHEMA_VERSION,
};

/// Probes whether `path` looks like a profile document, i.e. begins with the
/// literal `"---\n"` YAML document marker. Not finding the marker is not an
/// error; it just means this isn't a profile document.
pub fn is_yaml(path: impl AsRef<Path>) -> io::Result<bool> {
    let contents = fs::read(path)?;
    Ok(contents.starts_with(b"---\n"))
}

/// Loads and deserializes a profile document. Schema-version and
/// single-event validation happen in `reader::preprocess_profile`, not here
/// — this function's only job is "parse or report a syntax error", per the
/// conforming-loader contract in the core's external interfaces.
pub fn load(path: impl AsRef<Path>) -> Result<ProfileDocument, crate::error::Error> {
    let text = fs::read_to_string(path)?;
    let doc = serde_yaml::from_str(&text)?;
    Ok(doc)
}

//! Tag name negotiation: the process-wide name ↔ id service.

use crate::entry::Tag;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Errors from tag negotiation.
#[derive(Debug, Error)]
pub enum TagError {
    /// Name is empty or contains characters outside the tag alphabet.
    #[error("invalid tag name {0:?}")]
    InvalidName(String),

    /// All 65536 tag ids are in use.
    #[error("tag space exhausted")]
    Exhausted,
}

/// Process-wide tag service. Implementations must be thread-safe; the
/// pipeline shares one instance across every processor set.
pub trait Tagger: Send + Sync {
    /// Maps a name to its id, allocating one on first sight. Idempotent:
    /// repeated calls with the same name yield the same id.
    fn negotiate(&self, name: &str) -> Result<Tag, TagError>;

    /// Reverse lookup of a negotiated id.
    fn lookup(&self, tag: Tag) -> Option<String>;

    /// Every name negotiated so far, in allocation order.
    fn known_tags(&self) -> Vec<String>;
}

/// Returns true when `name` is non-empty and uses only the tag alphabet:
/// ASCII letters, digits, `_`, `-`.
pub fn valid_tag_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_tag_byte)
}

/// Rewrites every byte outside the tag alphabet to `_`.
pub fn sanitize_tag_name(name: &str) -> String {
    name.bytes()
        .map(|b| if is_tag_byte(b) { b as char } else { '_' })
        .collect()
}

fn is_tag_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

#[derive(Default)]
struct TagTable {
    by_name: HashMap<String, Tag>,
    names: Vec<String>,
}

/// In-memory [`Tagger`] for hosts and tests. Ids are allocated sequentially
/// from zero.
#[derive(Default)]
pub struct MemoryTagger {
    table: RwLock<TagTable>,
}

impl MemoryTagger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tagger for MemoryTagger {
    fn negotiate(&self, name: &str) -> Result<Tag, TagError> {
        if !valid_tag_name(name) {
            return Err(TagError::InvalidName(name.to_string()));
        }
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        if let Some(tag) = table.by_name.get(name) {
            return Ok(*tag);
        }
        let next = table.names.len();
        if next > u16::MAX as usize {
            return Err(TagError::Exhausted);
        }
        let tag = Tag(next as u16);
        table.by_name.insert(name.to_string(), tag);
        table.names.push(name.to_string());
        Ok(tag)
    }

    fn lookup(&self, tag: Tag) -> Option<String> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.names.get(tag.0 as usize).cloned()
    }

    fn known_tags(&self) -> Vec<String> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.names.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_is_idempotent() {
        let tagger = MemoryTagger::new();
        let a = tagger.negotiate("syslog").unwrap();
        let b = tagger.negotiate("syslog").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_lookup_and_known_tags() {
        let tagger = MemoryTagger::new();
        let a = tagger.negotiate("alpha").unwrap();
        let b = tagger.negotiate("beta").unwrap();
        assert_eq!(tagger.lookup(a).as_deref(), Some("alpha"));
        assert_eq!(tagger.lookup(b).as_deref(), Some("beta"));
        assert_eq!(tagger.known_tags(), vec!["alpha", "beta"]);
        assert_eq!(tagger.lookup(Tag(99)), None);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let tagger = MemoryTagger::new();
        assert!(tagger.negotiate("").is_err());
        assert!(tagger.negotiate("foo!bar").is_err());
        assert!(tagger.negotiate("white space").is_err());
        assert!(tagger.negotiate("ok-name_2").is_ok());
    }

    #[test]
    fn test_sanitize_tag_name() {
        assert_eq!(sanitize_tag_name("foo!bar#baz"), "foo_bar_baz");
        assert_eq!(sanitize_tag_name("box"), "box");
        assert_eq!(sanitize_tag_name("a.b c"), "a_b_c");
    }
}

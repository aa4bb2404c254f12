//! The `${name}` template mini-language used by the regex extractor and the
//! routers.
//!
//! A template compiles in a single pass into a fixed node sequence: constant
//! bytes, one of the intrinsics `_SRC_` / `_DATA_` / `_TS_`, or a lookup.
//! Lookups are bound to regex capture indices at construction (mode A) or
//! resolved by name against an accessor at render time (mode B).

use crate::entry::Record;
use std::borrow::Cow;
use thiserror::Error;

const INTRINSIC_SRC: &str = "_SRC_";
const INTRINSIC_DATA: &str = "_DATA_";
const INTRINSIC_TS: &str = "_TS_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("template lookup ${{ is missing its closing }}")]
    Unterminated,

    #[error("empty lookup name in template")]
    EmptyLookup,

    #[error("template references unknown name {0:?}")]
    UnknownName(String),
}

#[derive(Debug, Clone)]
enum Node {
    Const(Vec<u8>),
    Src,
    Data,
    Ts,
    Lookup { name: String, idx: Option<usize> },
}

/// By-name field accessor for mode-B rendering (syslog router).
pub trait NamedFields {
    fn field(&self, name: &str) -> Option<Cow<'_, [u8]>>;
}

/// A compiled template. Rendering accumulates into a reusable internal
/// buffer; the returned bytes are always a fresh copy.
#[derive(Debug, Clone)]
pub struct Formatter {
    nodes: Vec<Node>,
    buf: Vec<u8>,
}

impl Formatter {
    /// Compiles a template. `\${` escapes a literal `${`; an unterminated
    /// lookup is a compile error.
    pub fn compile(tmpl: &str) -> Result<Self, FormatError> {
        let bytes = tmpl.as_bytes();
        let mut nodes = Vec::new();
        let mut lit = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b'\\' && bytes[i..].starts_with(b"\\${") {
                lit.extend_from_slice(b"${");
                i += 3;
                continue;
            }
            if bytes[i..].starts_with(b"${") {
                let rest = &tmpl[i + 2..];
                let end = rest.find('}').ok_or(FormatError::Unterminated)?;
                let name = &rest[..end];
                if name.is_empty() {
                    return Err(FormatError::EmptyLookup);
                }
                if !lit.is_empty() {
                    nodes.push(Node::Const(std::mem::take(&mut lit)));
                }
                nodes.push(match name {
                    INTRINSIC_SRC => Node::Src,
                    INTRINSIC_DATA => Node::Data,
                    INTRINSIC_TS => Node::Ts,
                    _ => Node::Lookup {
                        name: name.to_string(),
                        idx: None,
                    },
                });
                i += 2 + end + 1;
                continue;
            }
            lit.push(bytes[i]);
            i += 1;
        }
        if !lit.is_empty() {
            nodes.push(Node::Const(lit));
        }

        Ok(Self {
            nodes,
            buf: Vec::new(),
        })
    }

    /// Names of every lookup node, in template order.
    pub fn lookup_names(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Lookup { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True when the template contains no lookups or intrinsics.
    pub fn is_const(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n, Node::Const(_)))
    }

    /// Binds every lookup node to an index (mode A). Fails on the first
    /// name the resolver does not know.
    pub fn bind<F>(&mut self, mut resolve: F) -> Result<(), FormatError>
    where
        F: FnMut(&str) -> Option<usize>,
    {
        for node in self.nodes.iter_mut() {
            if let Node::Lookup { name, idx } = node {
                match resolve(name) {
                    Some(i) => *idx = Some(i),
                    None => return Err(FormatError::UnknownName(name.clone())),
                }
            }
        }
        Ok(())
    }

    /// Renders against an indexed match array (mode A). Unbound lookups and
    /// absent matches render empty.
    pub fn render_indexed(&mut self, rec: &Record, matches: &[Option<&[u8]>]) -> Vec<u8> {
        self.buf.clear();
        for node in &self.nodes {
            match node {
                Node::Const(bytes) => self.buf.extend_from_slice(bytes),
                Node::Src => self.buf.extend_from_slice(rec.src.to_string().as_bytes()),
                Node::Data => self.buf.extend_from_slice(&rec.data),
                Node::Ts => self
                    .buf
                    .extend_from_slice(rec.ts.rfc3339_nano().as_bytes()),
                Node::Lookup { idx, .. } => {
                    if let Some(Some(bytes)) = idx.map(|i| matches.get(i).copied().flatten()) {
                        self.buf.extend_from_slice(bytes);
                    }
                }
            }
        }
        self.buf.clone()
    }

    /// Renders against a by-name accessor (mode B). Unknown fields render
    /// empty.
    pub fn render_named(&mut self, rec: &Record, fields: &dyn NamedFields) -> Vec<u8> {
        self.buf.clear();
        for node in &self.nodes {
            match node {
                Node::Const(bytes) => self.buf.extend_from_slice(bytes),
                Node::Src => self.buf.extend_from_slice(rec.src.to_string().as_bytes()),
                Node::Data => self.buf.extend_from_slice(&rec.data),
                Node::Ts => self
                    .buf
                    .extend_from_slice(rec.ts.rfc3339_nano().as_bytes()),
                Node::Lookup { name, .. } => {
                    if let Some(bytes) = fields.field(name) {
                        self.buf.extend_from_slice(&bytes);
                    }
                }
            }
        }
        self.buf.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Tag, Timestamp};
    use std::collections::HashMap;

    struct MapFields(HashMap<&'static str, &'static str>);

    impl NamedFields for MapFields {
        fn field(&self, name: &str) -> Option<Cow<'_, [u8]>> {
            self.0.get(name).map(|v| Cow::Borrowed(v.as_bytes()))
        }
    }

    fn rec() -> Record {
        Record::new(
            Tag(1),
            "10.0.0.1".parse().unwrap(),
            Timestamp::new(1_065_910_455, 3_000_000),
            b"payload".to_vec(),
        )
    }

    #[test]
    fn test_constant_template_is_lossless() {
        let mut f = Formatter::compile("plain text, no lookups").unwrap();
        assert!(f.is_const());
        let out = f.render_indexed(&rec(), &[]);
        assert_eq!(out, b"plain text, no lookups");
    }

    #[test]
    fn test_escaped_lookup_is_literal() {
        let mut f = Formatter::compile(r"cost \${price}").unwrap();
        assert!(f.is_const());
        assert_eq!(f.render_indexed(&rec(), &[]), b"cost ${price}");
    }

    #[test]
    fn test_unterminated_lookup_fails() {
        assert_eq!(
            Formatter::compile("broken ${name").unwrap_err(),
            FormatError::Unterminated
        );
    }

    #[test]
    fn test_intrinsics_render_record_fields() {
        let mut f = Formatter::compile("${_SRC_}|${_DATA_}|${_TS_}").unwrap();
        let out = f.render_indexed(&rec(), &[]);
        assert_eq!(
            out,
            b"10.0.0.1|payload|2003-10-11T22:14:15.003000000Z".to_vec()
        );
    }

    #[test]
    fn test_bind_unknown_name_fails() {
        let mut f = Formatter::compile("${host}-${nope}").unwrap();
        let err = f
            .bind(|name| if name == "host" { Some(1) } else { None })
            .unwrap_err();
        assert_eq!(err, FormatError::UnknownName("nope".into()));
    }

    #[test]
    fn test_render_indexed_lookups() {
        let mut f = Formatter::compile("${a}-${b}").unwrap();
        f.bind(|name| match name {
            "a" => Some(0),
            "b" => Some(1),
            _ => None,
        })
        .unwrap();
        let out = f.render_indexed(&rec(), &[Some(b"left"), Some(b"right")]);
        assert_eq!(out, b"left-right");

        // An absent submatch renders empty.
        let out = f.render_indexed(&rec(), &[Some(b"left"), None]);
        assert_eq!(out, b"left-");
    }

    #[test]
    fn test_render_named_lookups() {
        let mut f = Formatter::compile("${Hostname}-${Appname}").unwrap();
        let mut map = HashMap::new();
        map.insert("Hostname", "foobar");
        map.insert("Appname", "su");
        let out = f.render_named(&rec(), &MapFields(map));
        assert_eq!(out, b"foobar-su");
    }
}

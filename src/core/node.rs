//! Tree model for binary frames.
//!
//! A [`Node`] carries a descriptor, ordered string attributes and exactly one
//! [`Content`] variant. Nodes are built by the decoder, owned by whoever asked
//! for the decode, and never mutated afterwards by this crate.

use bytes::Bytes;
use std::fmt;

/// Payload carried by a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Content {
    /// No content; the declared element count was odd.
    #[default]
    Empty,
    /// Token, JID or packed text.
    Text(String),
    /// Decimal-packed content holding a canonical integer.
    Integer(i64),
    /// Child nodes, in wire order.
    List(Vec<Node>),
    /// Opaque blob, usually an encrypted or serialized sub-payload.
    Binary(Bytes),
}

impl Content {
    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }

    fn kind(&self) -> &'static str {
        match self {
            Content::Empty => "empty",
            Content::Text(_) => "text",
            Content::Integer(_) => "integer",
            Content::List(_) => "list",
            Content::Binary(_) => "binary",
        }
    }
}

/// One element of the binary tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub content: Content,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            content: Content::Empty,
        }
    }

    /// Append an attribute, keeping insertion order.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    pub fn with_children(self, children: Vec<Node>) -> Self {
        self.with_content(Content::List(children))
    }

    /// First value stored under `key`.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Child nodes, or an empty slice when the content is not a list.
    pub fn children(&self) -> &[Node] {
        match &self.content {
            Content::List(children) => children,
            _ => &[],
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.content {
            Content::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Number of elements the wire form declares for this node:
    /// descriptor, two per attribute, and one for any content.
    pub fn declared_count(&self) -> usize {
        1 + 2 * self.attrs.len() + usize::from(!self.content.is_empty())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (key, value) in &self.attrs {
            write!(f, " {key}=\"{value}\"")?;
        }
        match &self.content {
            Content::Empty => write!(f, "/>"),
            Content::Text(text) => write!(f, ">{text}</{}>", self.tag),
            Content::Integer(n) => write!(f, ">{n}</{}>", self.tag),
            Content::Binary(bytes) => write!(f, ">[{} bytes]</{}>", bytes.len(), self.tag),
            Content::List(children) => {
                write!(f, ">")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, "</{}>", self.tag)
            }
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

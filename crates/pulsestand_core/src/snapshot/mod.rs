//! Pulse status documents built from directive scripts.
//!
//! # Responsibility
//! - Apply a decoded pulse document (a directive script) to an empty
//!   `<snapshot/>` element tree.
//! - Extract the tags published under `/snapshot/tags/tag`.
//! - Render the tree as XML for presentation callers.
//!
//! # Invariants
//! - Parsing is pure: the same script always yields the same tree or error.
//! - A script that is incomplete or impossible to apply is an error, never a
//!   partially applied tree.
//! - Tags lacking `label` or `level`, or with an invalid label or unknown
//!   level, are excluded silently.

mod directive;
mod tree;

pub use directive::{parse_script, Directive};

use crate::model::tag::{is_valid_tag_label, Level, Tag, DEFAULT_TAG_DATA};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter, Write};
use tree::{Tree, ROOT};

pub const ROOT_ELEMENT: &str = "snapshot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Script text cannot be tokenized into directives.
    Syntax { position: usize, message: String },
    /// Directives are well-formed but cannot be applied to the tree.
    Impossible(String),
}

impl SnapshotError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax { position, message } => {
                write!(f, "directive syntax error at byte {position}: {message}")
            }
            Self::Impossible(message) => write!(f, "impossible modification: {message}"),
        }
    }
}

impl Error for SnapshotError {}

/// Element tree produced by one document.
#[derive(Debug, Clone)]
pub struct Snapshot {
    tree: Tree,
}

impl Snapshot {
    pub fn parse(script: &str) -> Result<Self, SnapshotError> {
        let directives = parse_script(script)?;
        let mut tree = Tree::new(ROOT_ELEMENT);
        tree.apply(&directives)?;
        Ok(Self { tree })
    }

    /// Tags published under `/snapshot/tags/tag[label and level]`.
    pub fn tags(&self) -> BTreeSet<Tag> {
        let mut tags = BTreeSet::new();
        for group in self.tree.children_named(ROOT, "tags") {
            for node in self.tree.children_named(group, "tag") {
                if let Some(tag) = self.tag_at(node) {
                    tags.insert(tag);
                }
            }
        }
        tags
    }

    fn tag_at(&self, node: usize) -> Option<Tag> {
        let label = self.tree.child_text(node, "label")?.trim();
        let level = Level::parse(self.tree.child_text(node, "level")?)?;
        if !is_valid_tag_label(label) {
            return None;
        }
        let data = self.tree.child_text(node, "data").unwrap_or(DEFAULT_TAG_DATA);
        let markdown = self.tree.child_text(node, "markdown").unwrap_or_default();
        Some(
            Tag::new(label, level)
                .with_data(data)
                .with_markdown(markdown),
        )
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        self.render(ROOT, &mut xml);
        xml
    }

    fn render(&self, id: usize, out: &mut String) {
        let node = self.tree.node(id);
        out.push('<');
        out.push_str(&node.name);
        for (name, value) in &node.attrs {
            let _ = write!(out, " {name}=\"{}\"", escape_xml(value));
        }
        if node.text.is_empty() && node.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape_xml(&node.text));
        for &child in &node.children {
            self.render(child, out);
        }
        let _ = write!(out, "</{}>", node.name);
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

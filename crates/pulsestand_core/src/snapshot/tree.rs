//! Arena-backed element tree with a directive cursor.

use super::directive::Directive;
use super::SnapshotError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static ELEMENT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9._-]*$").expect("valid element name regex"));

pub(crate) const ROOT: usize = 0;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new(root: &str) -> Self {
        Self {
            nodes: vec![Node {
                name: root.to_string(),
                parent: None,
                children: Vec::new(),
                attrs: BTreeMap::new(),
                text: String::new(),
            }],
        }
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    /// Children of `parent` named `name`, in document order.
    pub fn children_named<'a>(
        &'a self,
        parent: usize,
        name: &'a str,
    ) -> impl Iterator<Item = usize> + 'a {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .filter(move |&child| self.nodes[child].name == name)
    }

    pub fn child_text(&self, parent: usize, name: &str) -> Option<&str> {
        self.children_named(parent, name)
            .next()
            .map(|child| self.nodes[child].text.as_str())
    }

    /// Applies directives in order, starting with the cursor on the root.
    pub fn apply(&mut self, directives: &[Directive]) -> Result<(), SnapshotError> {
        let mut cursor = vec![ROOT];
        for directive in directives {
            cursor = self.step(cursor, directive)?;
        }
        Ok(())
    }

    fn step(&mut self, cursor: Vec<usize>, directive: &Directive) -> Result<Vec<usize>, SnapshotError> {
        match directive {
            Directive::Add(name) => {
                ensure_element_name(name)?;
                Ok(cursor
                    .into_iter()
                    .map(|parent| self.add_child(parent, name))
                    .collect())
            }
            Directive::AddIf(name) => {
                ensure_element_name(name)?;
                Ok(cursor
                    .into_iter()
                    .map(|parent| {
                        let existing = self.children_named(parent, name).last();
                        match existing {
                            Some(id) => id,
                            None => self.add_child(parent, name),
                        }
                    })
                    .collect())
            }
            Directive::Set(text) => {
                for &id in &cursor {
                    let node = &mut self.nodes[id];
                    node.children.clear();
                    node.text = text.clone();
                }
                Ok(cursor)
            }
            Directive::Up => {
                let mut parents = Vec::new();
                for id in cursor {
                    let parent = self.nodes[id].parent.ok_or_else(|| {
                        SnapshotError::Impossible("UP from the root element".to_string())
                    })?;
                    push_unique(&mut parents, parent);
                }
                Ok(parents)
            }
            Directive::Attr(name, value) => {
                ensure_element_name(name)?;
                for &id in &cursor {
                    self.nodes[id].attrs.insert(name.clone(), value.clone());
                }
                Ok(cursor)
            }
            Directive::XPath(path) => self.select(&cursor, path),
            Directive::Remove => {
                let mut parents = Vec::new();
                for id in cursor {
                    let parent = self.nodes[id].parent.ok_or_else(|| {
                        SnapshotError::Impossible("cannot REMOVE the root element".to_string())
                    })?;
                    self.nodes[parent].children.retain(|&child| child != id);
                    push_unique(&mut parents, parent);
                }
                Ok(parents)
            }
            Directive::Strict(expected) => {
                if cursor.len() == *expected {
                    Ok(cursor)
                } else {
                    Err(SnapshotError::Impossible(format!(
                        "STRICT expected {expected} node(s), cursor has {}",
                        cursor.len()
                    )))
                }
            }
        }
    }

    fn add_child(&mut self, parent: usize, name: &str) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            attrs: BTreeMap::new(),
            text: String::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Evaluates a location path of element steps (`name`, `*`, `.`, `..`).
    /// An absolute path starts at the document, so its first step must match
    /// the root element.
    fn select(&self, cursor: &[usize], path: &str) -> Result<Vec<usize>, SnapshotError> {
        let trimmed = path.trim();
        let (mut current, steps) = match trimmed.strip_prefix('/') {
            Some(rest) => {
                let mut steps = rest.split('/');
                let first = steps.next().unwrap_or_default();
                let root_matches = first == "*" || self.nodes[ROOT].name == first;
                let start = if root_matches { vec![ROOT] } else { Vec::new() };
                (start, steps.collect::<Vec<_>>())
            }
            None => (cursor.to_vec(), trimmed.split('/').collect::<Vec<_>>()),
        };
        for step in steps {
            let mut next = Vec::new();
            match step {
                "" => {
                    return Err(SnapshotError::Impossible(format!(
                        "unsupported XPATH `{path}`"
                    )))
                }
                "." => next = current.clone(),
                ".." => {
                    for &id in &current {
                        if let Some(parent) = self.nodes[id].parent {
                            push_unique(&mut next, parent);
                        }
                    }
                }
                "*" => {
                    for &id in &current {
                        next.extend(self.nodes[id].children.iter().copied());
                    }
                }
                name => {
                    ensure_element_name(name)?;
                    for &id in &current {
                        next.extend(self.children_named(id, name));
                    }
                }
            }
            current = next;
        }
        Ok(current)
    }
}

fn ensure_element_name(name: &str) -> Result<(), SnapshotError> {
    if ELEMENT_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SnapshotError::Impossible(format!(
            "invalid element name `{name}`"
        )))
    }
}

fn push_unique(ids: &mut Vec<usize>, id: usize) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

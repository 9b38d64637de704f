//! Arena-backed DOM for in-place rewriting.
//!
//! html5ever's RcDom is lowered into a flat `Vec` of nodes addressed by
//! index, with explicit parent/child links. Stripping a node (promoting
//! its children) and deleting a subtree are both cheap index surgery;
//! nothing owns anything across the tree, so mutation during traversal
//! needs no pointer gymnastics.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Index of the document root in every arena.
pub const DOCUMENT: usize = 0;

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Element {
        /// Lowercased tag name.
        tag: String,
        /// Lowercased attribute names with original values, in source order.
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse HTML and lower the resulting RcDom into an arena.
    ///
    /// Comments, doctypes and processing instructions are dropped during
    /// lowering; the transcoder never needs them.
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
        let mut arena = Self::new();
        arena.lower(&dom.document, DOCUMENT);
        arena
    }

    fn lower(&mut self, handle: &Handle, parent: usize) {
        for child in handle.children.borrow().iter() {
            match &child.data {
                NodeData::Element { name, attrs, .. } => {
                    let tag = name.local.as_ref().to_ascii_lowercase();
                    let attrs = attrs
                        .borrow()
                        .iter()
                        .map(|a| {
                            (
                                a.name.local.as_ref().to_ascii_lowercase(),
                                a.value.to_string(),
                            )
                        })
                        .collect();
                    let id = self.push(
                        NodeKind::Element { tag, attrs },
                        parent,
                    );
                    self.lower(child, id);
                }
                NodeData::Text { contents } => {
                    let text = contents.borrow().to_string();
                    if !text.is_empty() {
                        self.push(NodeKind::Text(text), parent);
                    }
                }
                _ => {}
            }
        }
    }

    fn push(&mut self, kind: NodeKind, parent: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Create a detached element node.
    pub fn new_element(&mut self, tag: &str, attrs: Vec<(String, String)>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Element {
                tag: tag.to_string(),
                attrs,
            },
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Create a detached text node.
    pub fn new_text(&mut self, text: &str) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn children(&self, id: usize) -> &[usize] {
        &self.nodes[id].children
    }

    /// Lowercased tag name, if `id` is an element.
    pub fn tag(&self, id: usize) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attr(&self, id: usize, name: &str) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: usize, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            if let Some(slot) = attrs.iter_mut().find(|(n, _)| n == name) {
                slot.1 = value.to_string();
            } else {
                attrs.push((name.to_string(), value.to_string()));
            }
        }
    }

    /// Replace the whole attribute list (the filtered survivors).
    pub fn set_attrs(&mut self, id: usize, new_attrs: Vec<(String, String)>) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            *attrs = new_attrs;
        }
    }

    pub fn append_child(&mut self, parent: usize, child: usize) {
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Delete the child at `index` under `parent`, subtree included.
    pub fn delete_child(&mut self, parent: usize, index: usize) {
        let child = self.nodes[parent].children.remove(index);
        self.nodes[child].parent = None;
    }

    /// Strip the child at `index`: the node goes away, its children are
    /// spliced into `parent` at the same position.
    pub fn splice_children(&mut self, parent: usize, index: usize) {
        let child = self.nodes[parent].children.remove(index);
        self.nodes[child].parent = None;
        let grandchildren = std::mem::take(&mut self.nodes[child].children);
        for (offset, &g) in grandchildren.iter().enumerate() {
            self.nodes[g].parent = Some(parent);
            self.nodes[parent].children.insert(index + offset, g);
        }
    }

    /// Replace the child at `index` with an arbitrary node sequence.
    pub fn replace_child(&mut self, parent: usize, index: usize, replacement: Vec<usize>) {
        let child = self.nodes[parent].children.remove(index);
        self.nodes[child].parent = None;
        for (offset, &r) in replacement.iter().enumerate() {
            self.nodes[r].parent = Some(parent);
            self.nodes[parent].children.insert(index + offset, r);
        }
    }

    /// Replace a node (found via its parent link) with a text node, or
    /// delete it when no text is given.
    pub fn replace_with_text(&mut self, id: usize, text: Option<&str>) {
        let Some(parent) = self.nodes[id].parent else {
            return;
        };
        let Some(index) = self.nodes[parent].children.iter().position(|&c| c == id) else {
            return;
        };
        match text {
            Some(t) if !t.trim().is_empty() => {
                let replacement = self.new_text(t);
                self.replace_child(parent, index, vec![replacement]);
            }
            _ => self.delete_child(parent, index),
        }
    }

    /// Concatenated text of a subtree.
    pub fn text_content(&self, id: usize) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: usize, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Text(t) => out.push_str(t),
            _ => {
                for &c in &self.nodes[id].children {
                    self.collect_text(c, out);
                }
            }
        }
    }

    /// True if any descendant element carries the given tag.
    pub fn has_descendant(&self, id: usize, tag: &str) -> bool {
        self.nodes[id].children.iter().any(|&c| {
            matches!(&self.nodes[c].kind, NodeKind::Element { tag: t, .. } if t == tag)
                || self.has_descendant(c, tag)
        })
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element(arena: &Arena, tag: &str) -> Option<usize> {
        (0..arena.nodes.len()).find(|&i| arena.tag(i) == Some(tag))
    }

    #[test]
    fn parses_into_arena() {
        let arena = Arena::parse("<html><body><p id=x>Hello <b>world</b></p></body></html>");
        let p = first_element(&arena, "p").unwrap();
        assert_eq!(arena.attr(p, "id"), Some("x"));
        assert_eq!(arena.text_content(p), "Hello world");
    }

    #[test]
    fn splice_promotes_children() {
        let mut arena = Arena::parse("<body><div><i>a</i><i>b</i></div></body>");
        let body = first_element(&arena, "body").unwrap();
        let div = first_element(&arena, "div").unwrap();
        let index = arena
            .children(body)
            .iter()
            .position(|&c| c == div)
            .unwrap();
        arena.splice_children(body, index);
        let tags: Vec<_> = arena
            .children(body)
            .iter()
            .filter_map(|&c| arena.tag(c))
            .collect();
        assert_eq!(tags, vec!["i", "i"]);
    }

    #[test]
    fn delete_drops_subtree() {
        let mut arena = Arena::parse("<body><div><i>a</i></div><p>keep</p></body>");
        let body = first_element(&arena, "body").unwrap();
        arena.delete_child(body, 0);
        assert_eq!(arena.text_content(body), "keep");
    }

    #[test]
    fn detects_nested_descendants() {
        let arena =
            Arena::parse("<body><table><tr><td><table></table></td></tr></table></body>");
        let outer = first_element(&arena, "table").unwrap();
        assert!(arena.has_descendant(outer, "table"));
    }
}

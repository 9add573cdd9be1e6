//! Newick trees and the statistics used as true values.
//!
//! Only what the coverage check needs: clade structure, labels and branch
//! lengths. Bracketed comments such as BEAST's `[&rate=1.0]` are skipped.

use crate::models::TreeStatistic;
use thiserror::Error;

/// Errors from parsing a Newick string.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("newick parse error at byte {offset}: {reason}")]
pub struct TreeParseError {
    pub offset: usize,
    pub reason: String,
}

/// A clade: optional label, optional branch length, children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewickNode {
    pub label: Option<String>,
    pub branch_length: Option<f64>,
    pub children: Vec<NewickNode>,
}

impl NewickNode {
    fn length(&self) -> f64 {
        self.branch_length.unwrap_or(0.0)
    }

    fn max_depth(&self) -> f64 {
        self.children
            .iter()
            .map(|c| c.length() + c.max_depth())
            .fold(0.0, f64::max)
    }

    fn sum_lengths(&self) -> f64 {
        self.length() + self.children.iter().map(NewickNode::sum_lengths).sum::<f64>()
    }

    fn collect_leaf_labels<'a>(&'a self, out: &mut Vec<Option<&'a str>>) {
        if self.children.is_empty() {
            out.push(self.label.as_deref());
        }
        for child in &self.children {
            child.collect_leaf_labels(out);
        }
    }
}

/// A rooted tree.
#[derive(Debug, Clone, PartialEq)]
pub struct NewickTree {
    pub root: NewickNode,
}

impl NewickTree {
    /// Parse a single tree, with or without the trailing `;`.
    pub fn parse(text: &str) -> Result<Self, TreeParseError> {
        let mut parser = Parser {
            bytes: text.as_bytes(),
            text,
            pos: 0,
        };
        parser.skip_ignored()?;
        let root = parser.clade()?;
        parser.skip_ignored()?;
        if parser.peek() == Some(b';') {
            parser.pos += 1;
            parser.skip_ignored()?;
        }
        if parser.pos < parser.bytes.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self { root })
    }

    /// Largest distance from the root to any node.
    ///
    /// The root's own branch length counts; absent lengths count as zero.
    pub fn height(&self) -> f64 {
        self.root.length() + self.root.max_depth()
    }

    /// Sum of every branch length, the root's included.
    pub fn total_length(&self) -> f64 {
        self.root.sum_lengths()
    }

    /// Labels of the leaves in left-to-right order.
    pub fn leaf_labels(&self) -> Vec<Option<&str>> {
        let mut labels = Vec::new();
        self.root.collect_leaf_labels(&mut labels);
        labels
    }

    pub fn statistic(&self, statistic: TreeStatistic) -> f64 {
        match statistic {
            TreeStatistic::Height => self.height(),
            TreeStatistic::Length => self.total_length(),
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    text: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> TreeParseError {
        TreeParseError {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    /// Skip whitespace and `[...]` comments.
    fn skip_ignored(&mut self) -> Result<(), TreeParseError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'[') => {
                    let start = self.pos;
                    match self.bytes[start..].iter().position(|&b| b == b']') {
                        Some(end) => self.pos = start + end + 1,
                        None => return Err(self.error("unterminated comment")),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn clade(&mut self) -> Result<NewickNode, TreeParseError> {
        let mut node = NewickNode::default();

        if self.peek() == Some(b'(') {
            self.pos += 1;
            loop {
                self.skip_ignored()?;
                node.children.push(self.clade()?);
                self.skip_ignored()?;
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    Some(_) => return Err(self.error("expected ',' or ')'")),
                    None => return Err(self.error("unbalanced parentheses")),
                }
            }
            self.skip_ignored()?;
        }

        node.label = self.label()?;
        self.skip_ignored()?;

        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_ignored()?;
            node.branch_length = Some(self.number()?);
            self.skip_ignored()?;
        }

        Ok(node)
    }

    fn label(&mut self) -> Result<Option<String>, TreeParseError> {
        if self.peek() == Some(b'\'') {
            self.pos += 1;
            let mut label = String::new();
            let mut start = self.pos;
            loop {
                match self.bytes[self.pos..].iter().position(|&b| b == b'\'') {
                    None => return Err(self.error("unterminated quoted label")),
                    Some(rel) => {
                        let quote = self.pos + rel;
                        label.push_str(&self.text[start..quote]);
                        // '' inside a quoted label is an escaped quote.
                        if self.bytes.get(quote + 1) == Some(&b'\'') {
                            label.push('\'');
                            self.pos = quote + 2;
                            start = self.pos;
                        } else {
                            self.pos = quote + 1;
                            return Ok(Some(label));
                        }
                    }
                }
            }
        }

        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'(' | b')' | b',' | b':' | b';' | b'[') || b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            Ok(None)
        } else {
            Ok(Some(self.text[start..self.pos].replace('_', " ")))
        }
    }

    fn number(&mut self) -> Result<f64, TreeParseError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let token = &self.text[start..self.pos];
        token.parse::<f64>().map_err(|_| TreeParseError {
            offset: start,
            reason: format!("invalid branch length '{}'", token),
        })
    }
}

/// Find the `newick` attribute of the XML element whose `id` is `node_id`.
///
/// BEAST XML embeds the generating tree as
/// `<stateNode id="phi" ... newick="((A:1,B:1):0.5,C:1.5);"/>`. Entities in
/// the attribute value are decoded.
pub fn extract_newick_attribute(xml: &str, node_id: &str) -> Option<String> {
    let needles = [format!("id=\"{}\"", node_id), format!("id='{}'", node_id)];
    let mut search_from = 0;

    while search_from < xml.len() {
        let (found, needle_len) = needles
            .iter()
            .filter_map(|n| xml[search_from..].find(n.as_str()).map(|i| (i, n.len())))
            .min_by_key(|(i, _)| *i)?;
        let at = search_from + found;

        // Must be a whole attribute name, not e.g. `spec_id="phi"`.
        let preceded_by_space = xml[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if preceded_by_space {
            if let Some(value) = enclosing_tag(xml, at).and_then(|tag| attribute(tag, "newick")) {
                return Some(decode_entities(value));
            }
        }
        search_from = at + needle_len;
    }
    None
}

/// The tag text around byte `at`, or `None` when `at` lies in text content.
fn enclosing_tag(xml: &str, at: usize) -> Option<&str> {
    let start = xml[..at].rfind('<')?;
    if xml[start..at].contains('>') {
        return None;
    }
    let end = at + xml[at..].find('>')?;
    Some(&xml[start..end])
}

/// Value of `name="..."` (or single-quoted) inside one start tag.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = tag;
    while let Some(i) = rest.find(name) {
        let before = rest[..i].chars().next_back();
        let after = rest[i + name.len()..].trim_start();
        if before.is_some_and(char::is_whitespace) {
            if let Some(after_eq) = after.strip_prefix('=') {
                let after_eq = after_eq.trim_start();
                let quote = after_eq.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let body = &after_eq[1..];
                    let end = body.find(quote)?;
                    return Some(&body[..end]);
                }
            }
        }
        rest = &rest[i + name.len()..];
    }
    None
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Read a tree from either a bare Newick file or XML holding it in `node_id`.
pub fn tree_from_document(text: &str, node_id: &str) -> Result<NewickTree, TreeParseError> {
    if text.trim_start().starts_with('<') {
        let newick = extract_newick_attribute(text, node_id).ok_or_else(|| TreeParseError {
            offset: 0,
            reason: format!("no element with id '{}' and a newick attribute", node_id),
        })?;
        NewickTree::parse(&newick)
    } else {
        NewickTree::parse(text)
    }
}

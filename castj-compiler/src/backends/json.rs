// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON backend.
//!
//! Each syntax node becomes an object with the fields `kind`, `name`,
//! `value` and `children`, in this order. `value` is only present for
//! integer literals whose extent holds a token, and `children` only
//! for nodes with at least one child.
//!
//! Traversal and rendering use explicit stacks, so arbitrarily deep
//! trees are handled without growing the native stack.

use crate::ast::{self, NodeId, SyntaxNode};
use crate::lexer::{self, TokenExtractor};
use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use std::collections::HashSet;
use std::io;

/// Type of JSON generation errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the syntax tree has no root node")]
    MissingRoot,
    #[error("node {0} is reached more than once, the syntax tree is cyclic")]
    CyclicTree(NodeId),
    #[error("node {parent} references the missing node {child}")]
    DanglingNode { parent: NodeId, child: NodeId },
    #[error("could not write JSON document: {0}")]
    Io(#[from] io::Error),
}

/// Indentation width of pretty printed documents.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Indent {
    #[default]
    Two,
    Four,
}

/// Rendering options.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Options {
    pub pretty: bool,
    pub indent: Indent,
}

/// JSON view of one syntax node.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct DocumentNode {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentNode>,
}

impl Default for Options {
    fn default() -> Options {
        Options { pretty: true, indent: Indent::Two }
    }
}

impl Indent {
    fn as_bytes(&self) -> &'static [u8] {
        match self {
            Indent::Two => b"  ",
            Indent::Four => b"    ",
        }
    }
}

impl std::str::FromStr for Indent {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "2" => Ok(Indent::Two),
            "4" => Ok(Indent::Four),
            _ => Err(format!("could not parse {input:?}, valid options are '2' and '4'.")),
        }
    }
}

// Children are torn down from a worklist; the default drop glue would
// recurse once per tree level.
impl Drop for DocumentNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Build the document for a single node from its already built
/// children.
pub fn build_document(
    kind: &str,
    name: &str,
    value: Option<String>,
    children: Vec<DocumentNode>,
) -> DocumentNode {
    DocumentNode { kind: kind.to_owned(), name: name.to_owned(), value, children }
}

struct Frame<'t> {
    id: NodeId,
    node: &'t SyntaxNode,
    next_child: usize,
    children: Vec<DocumentNode>,
}

impl<'t> Frame<'t> {
    fn enter(
        tree: &'t ast::Tree,
        id: NodeId,
        parent: Option<NodeId>,
        visited: &mut HashSet<NodeId>,
    ) -> Result<Frame<'t>, Error> {
        let node = tree.get(id).ok_or(match parent {
            Some(parent) => Error::DanglingNode { parent, child: id },
            None => Error::MissingRoot,
        })?;
        if !visited.insert(id) {
            return Err(Error::CyclicTree(id));
        }
        Ok(Frame { id, node, next_child: 0, children: Vec::with_capacity(node.children.len()) })
    }

    fn finish(self, tokens: &impl TokenExtractor) -> DocumentNode {
        let value = if self.node.kind.is_literal_bearing() {
            extract_value(self.id, self.node, tokens)
        } else {
            None
        };
        build_document(self.node.kind.as_str(), &self.node.spelling, value, self.children)
    }
}

fn extract_value(id: NodeId, node: &SyntaxNode, tokens: &impl TokenExtractor) -> Option<String> {
    match tokens.first_token_spelling(&node.loc) {
        Ok(Some(spelling)) => Some(spelling),
        Ok(None) => {
            tracing::debug!(node = %id, kind = %node.kind, "literal extent holds no token");
            None
        }
        Err(err @ lexer::Error::InvalidSpan { .. }) => {
            tracing::warn!(node = %id, kind = %node.kind, "omitting literal value: {err}");
            None
        }
    }
}

/// Serialize the subtree rooted at `root`.
///
/// Nodes are visited in pre-order, children from left to right. A
/// node's document is completed once all of its children are.
pub fn serialize_node(
    tree: &ast::Tree,
    root: NodeId,
    tokens: &impl TokenExtractor,
) -> Result<DocumentNode, Error> {
    let mut visited = HashSet::new();
    let mut stack = vec![Frame::enter(tree, root, None, &mut visited)?];
    let mut document = None;

    while let Some(mut frame) = stack.pop() {
        if let Some(&child) = frame.node.children.get(frame.next_child) {
            frame.next_child += 1;
            let child = Frame::enter(tree, child, Some(frame.id), &mut visited)?;
            stack.push(frame);
            stack.push(child);
            continue;
        }
        let node = frame.finish(tokens);
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => document = Some(node),
        }
    }

    tracing::debug!(nodes = visited.len(), "serialized syntax tree");
    document.ok_or(Error::MissingRoot)
}

enum Step<'d> {
    Node { node: &'d DocumentNode, position: Option<bool> },
    CloseChildren { position: Option<bool> },
}

fn write_field<W, F>(writer: &mut W, formatter: &mut F, key: &str, value: &str, first: bool) -> io::Result<()>
where
    W: io::Write,
    F: Formatter,
{
    formatter.begin_object_key(writer, first)?;
    write_str(writer, key)?;
    formatter.end_object_key(writer)?;
    formatter.begin_object_value(writer)?;
    write_str(writer, value)?;
    formatter.end_object_value(writer)
}

fn write_str<W: io::Write>(writer: &mut W, value: &str) -> io::Result<()> {
    serde_json::to_writer(writer, value).map_err(io::Error::from)
}

fn close_node<W, F>(writer: &mut W, formatter: &mut F, position: Option<bool>) -> io::Result<()>
where
    W: io::Write,
    F: Formatter,
{
    formatter.end_object(writer)?;
    if position.is_some() {
        formatter.end_array_value(writer)?;
    }
    Ok(())
}

/// Emit `root` through `formatter`.
///
/// `position` tracks whether an object is an array element, and if
/// so, whether it is the first one.
fn emit<W, F>(writer: &mut W, formatter: &mut F, root: &DocumentNode) -> io::Result<()>
where
    W: io::Write,
    F: Formatter,
{
    let mut stack = vec![Step::Node { node: root, position: None }];
    while let Some(step) = stack.pop() {
        match step {
            Step::Node { node, position } => {
                if let Some(first) = position {
                    formatter.begin_array_value(writer, first)?;
                }
                formatter.begin_object(writer)?;
                write_field(writer, formatter, "kind", &node.kind, true)?;
                write_field(writer, formatter, "name", &node.name, false)?;
                if let Some(value) = &node.value {
                    write_field(writer, formatter, "value", value, false)?;
                }
                if node.children.is_empty() {
                    close_node(writer, formatter, position)?;
                    continue;
                }
                formatter.begin_object_key(writer, false)?;
                write_str(writer, "children")?;
                formatter.end_object_key(writer)?;
                formatter.begin_object_value(writer)?;
                formatter.begin_array(writer)?;
                stack.push(Step::CloseChildren { position });
                for (index, child) in node.children.iter().enumerate().rev() {
                    stack.push(Step::Node { node: child, position: Some(index == 0) });
                }
            }
            Step::CloseChildren { position } => {
                formatter.end_array(writer)?;
                formatter.end_object_value(writer)?;
                close_node(writer, formatter, position)?;
            }
        }
    }
    Ok(())
}

/// Write the document to `writer`.
pub fn write_document<W: io::Write>(
    mut writer: W,
    root: &DocumentNode,
    options: &Options,
) -> Result<(), Error> {
    if options.pretty {
        emit(&mut writer, &mut PrettyFormatter::with_indent(options.indent.as_bytes()), root)?;
    } else {
        emit(&mut writer, &mut CompactFormatter, root)?;
    }
    Ok(())
}

/// Render the document as JSON text.
pub fn render(root: &DocumentNode, pretty: bool) -> Result<String, Error> {
    render_with(root, &Options { pretty, ..Options::default() })
}

/// Render the document as JSON text with explicit options.
pub fn render_with(root: &DocumentNode, options: &Options) -> Result<String, Error> {
    let mut buffer = Vec::new();
    write_document(&mut buffer, root, options)?;
    String::from_utf8(buffer).map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
}

/// Turn the syntax tree into a JSON representation.
pub fn generate(
    sources: &ast::SourceDatabase,
    tree: &ast::Tree,
    options: &Options,
) -> Result<String, Error> {
    let root = tree.root().ok_or(Error::MissingRoot)?;
    let document = serialize_node(tree, root, &lexer::Lexer::new(sources))?;
    render_with(&document, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeKind, SourceRange, Tree};
    use crate::parser;
    use googletest::prelude::{assert_that, eq};

    fn leaf(kind: &str, name: &str, value: Option<&str>) -> DocumentNode {
        build_document(kind, name, value.map(str::to_owned), vec![])
    }

    /// Build a tree over `source` where every integer literal covers
    /// the given byte range.
    fn literal(tree: &mut Tree, file: ast::FileId, start: usize, end: usize) -> NodeId {
        tree.add(NodeKind::IntegerLiteral, "", SourceRange::new(file, start, end, &[0]), vec![])
    }

    fn database(source: &str) -> (ast::SourceDatabase, ast::FileId) {
        let mut db = ast::SourceDatabase::new();
        let file = db.add("test.c".to_owned(), source.to_owned());
        (db, file)
    }

    fn no_tokens(_: &SourceRange) -> Result<Option<String>, lexer::Error> {
        Ok(None)
    }

    #[test]
    fn test_integer_literal_root() {
        let (db, file) = database("42");
        let mut tree = Tree::new();
        let root = literal(&mut tree, file, 0, 2);
        tree.set_root(root);

        let document = serialize_node(&tree, root, &lexer::Lexer::new(&db)).unwrap();
        assert_that!(
            render(&document, false).unwrap(),
            eq(r#"{"kind":"IntegerLiteral","name":"","value":"42"}"#)
        );
    }

    #[test]
    fn test_binary_operator_children() {
        let (db, file) = database("1 + 2");
        let mut tree = Tree::new();
        let lhs = literal(&mut tree, file, 0, 1);
        let rhs = literal(&mut tree, file, 4, 5);
        let root = tree.add(NodeKind::BinaryOperator, "+", SourceRange::new(file, 0, 5, &[0]), vec![lhs, rhs]);
        tree.set_root(root);

        let json = generate(&db, &tree, &Options { pretty: false, ..Options::default() }).unwrap();
        assert_that!(
            json,
            eq(concat!(
                r#"{"kind":"BinaryOperator","name":"+","children":["#,
                r#"{"kind":"IntegerLiteral","name":"","value":"1"},"#,
                r#"{"kind":"IntegerLiteral","name":"","value":"2"}]}"#
            ))
        );
    }

    #[test]
    fn test_literal_without_tokens_omits_value() {
        let (db, file) = database("  ");
        let mut tree = Tree::new();
        let root = literal(&mut tree, file, 1, 1);
        tree.set_root(root);

        let json = generate(&db, &tree, &Options { pretty: false, ..Options::default() }).unwrap();
        assert_eq!(json, r#"{"kind":"IntegerLiteral","name":""}"#);
    }

    #[test]
    fn test_invalid_span_degrades_to_missing_value() {
        let (db, file) = database("7");
        let mut tree = Tree::new();
        let broken = literal(&mut tree, file, 0, 99);
        let fine = literal(&mut tree, file, 0, 1);
        let root = tree.add(NodeKind::InitListExpr, "", SourceRange::default(), vec![broken, fine]);
        tree.set_root(root);

        let document = serialize_node(&tree, root, &lexer::Lexer::new(&db)).unwrap();
        assert_eq!(document.children[0].value, None);
        assert_eq!(document.children[1].value.as_deref(), Some("7"));
    }

    #[test]
    fn test_only_integer_literals_carry_values() {
        let mut db = ast::SourceDatabase::new();
        let tree =
            parser::parse_inline(&mut db, "test.c", "double d = 1.5; int i = 0x1F;".to_owned())
                .unwrap();
        let document = serialize_node(&tree, tree.root().unwrap(), &lexer::Lexer::new(&db)).unwrap();
        assert_eq!(document.children[0].children[0], leaf("FloatingLiteral", "", None));
        assert_eq!(document.children[1].children[0], leaf("IntegerLiteral", "", Some("0x1F")));
    }

    #[test]
    fn test_children_order_and_leaf_omission() {
        let mut tree = Tree::new();
        let a = tree.add(NodeKind::DeclRefExpr, "a", SourceRange::default(), vec![]);
        let b = tree.add(NodeKind::DeclRefExpr, "b", SourceRange::default(), vec![]);
        let c = tree.add(NodeKind::DeclRefExpr, "c", SourceRange::default(), vec![]);
        let call = tree.add(NodeKind::CallExpr, "c", SourceRange::default(), vec![c, b, a]);
        tree.set_root(call);

        let document = serialize_node(&tree, call, &no_tokens).unwrap();
        let names: Vec<_> = document.children.iter().map(|child| child.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);

        let json = render(&document, false).unwrap();
        assert_eq!(json.matches("children").count(), 1);
    }

    #[test]
    fn test_pretty_output_matches_serde() {
        let mut db = ast::SourceDatabase::new();
        let tree = parser::parse_inline(
            &mut db,
            "test.c",
            include_str!("../../tests/data/unary_ops.c").to_owned(),
        )
        .unwrap();
        let document = serialize_node(&tree, tree.root().unwrap(), &lexer::Lexer::new(&db)).unwrap();

        assert_eq!(render(&document, true).unwrap(), serde_json::to_string_pretty(&document).unwrap());
        assert_eq!(render(&document, false).unwrap(), serde_json::to_string(&document).unwrap());
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let document = build_document(
            "BinaryOperator",
            "+",
            None,
            vec![leaf("IntegerLiteral", "", Some("1")), leaf("IntegerLiteral", "", Some("2"))],
        );
        for pretty in [true, false] {
            assert_eq!(render(&document, pretty).unwrap(), render(&document, pretty).unwrap());
        }
    }

    #[test]
    fn test_four_space_indent() {
        let document = build_document("ParenExpr", "", None, vec![leaf("IntegerLiteral", "", Some("1"))]);
        let json = render_with(&document, &Options { pretty: true, indent: Indent::Four }).unwrap();
        assert_eq!(
            json,
            [
                "{",
                r#"    "kind": "ParenExpr","#,
                r#"    "name": "","#,
                r#"    "children": ["#,
                "        {",
                r#"            "kind": "IntegerLiteral","#,
                r#"            "name": "","#,
                r#"            "value": "1""#,
                "        }",
                "    ]",
                "}",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_strings_are_escaped() {
        let document = leaf("StringLiteral", "\"a\\b\"\n\u{1}", None);
        assert_eq!(
            render(&document, false).unwrap(),
            r#"{"kind":"StringLiteral","name":"\"a\\b\"\n\u0001"}"#
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut tree = Tree::new();
        let inner = tree.add(NodeKind::ParenExpr, "", SourceRange::default(), vec![]);
        let outer = tree.add(NodeKind::ParenExpr, "", SourceRange::default(), vec![inner]);
        assert!(tree.push_child(inner, outer));
        tree.set_root(outer);

        assert!(matches!(serialize_node(&tree, outer, &no_tokens), Err(Error::CyclicTree(id)) if id == outer));
    }

    #[test]
    fn test_dangling_child_is_rejected() {
        let mut tree = Tree::new();
        let root = tree.add(NodeKind::CompoundStmt, "", SourceRange::default(), vec![NodeId(7)]);
        tree.set_root(root);

        assert!(matches!(
            serialize_node(&tree, root, &no_tokens),
            Err(Error::DanglingNode { parent, child: NodeId(7) }) if parent == root
        ));
    }

    #[test]
    fn test_shared_child_is_rejected() {
        let mut tree = Tree::new();
        let shared = tree.add(NodeKind::DeclRefExpr, "x", SourceRange::default(), vec![]);
        let lhs = tree.add(NodeKind::ParenExpr, "", SourceRange::default(), vec![shared]);
        let rhs = tree.add(NodeKind::ParenExpr, "", SourceRange::default(), vec![shared]);
        let root = tree.add(NodeKind::BinaryOperator, "+", SourceRange::default(), vec![lhs, rhs]);
        tree.set_root(root);

        assert!(matches!(
            serialize_node(&tree, root, &no_tokens),
            Err(Error::CyclicTree(id)) if id == shared
        ));
    }

    struct FailingWriter;

    impl io::Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_reported() {
        let document = build_document("ParenExpr", "", None, vec![leaf("IntegerLiteral", "", Some("1"))]);
        for pretty in [true, false] {
            let options = Options { pretty, ..Options::default() };
            match write_document(FailingWriter, &document, &options) {
                Err(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn test_many_literals_extract_quickly() {
        const LITERALS: usize = 20_000;
        let source = format!("int a[] = {{{}}};\n", vec!["1"; LITERALS].join(",\n"));
        let mut db = ast::SourceDatabase::new();
        let tree = parser::parse_inline(&mut db, "test.c", source).unwrap();

        let start = std::time::Instant::now();
        let json = generate(&db, &tree, &Options { pretty: false, ..Options::default() }).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(json.matches(r#""value":"1""#).count(), LITERALS);
        assert!(elapsed < std::time::Duration::from_secs(10), "extraction took {:?}", elapsed);
    }

    #[test]
    fn test_missing_root() {
        let db = ast::SourceDatabase::new();
        assert!(matches!(generate(&db, &Tree::new(), &Options::default()), Err(Error::MissingRoot)));
    }

    #[test]
    fn test_deeply_nested_tree() {
        const DEPTH: usize = 10_000;
        let mut tree = Tree::new();
        let mut node = tree.add(NodeKind::DeclRefExpr, "x", SourceRange::default(), vec![]);
        for _ in 0..DEPTH {
            let lhs = tree.add(NodeKind::IntegerLiteral, "", SourceRange::default(), vec![]);
            node = tree.add(NodeKind::BinaryOperator, "+", SourceRange::default(), vec![lhs, node]);
        }
        tree.set_root(node);

        let one = |_: &SourceRange| -> Result<Option<String>, lexer::Error> { Ok(Some("1".to_owned())) };
        let document = serialize_node(&tree, node, &one).unwrap();
        let compact = render(&document, false).unwrap();
        assert_eq!(compact.matches("BinaryOperator").count(), DEPTH);
        assert_eq!(compact.matches(r#""value":"1""#).count(), DEPTH);
        assert!(compact.ends_with(&"]}".repeat(DEPTH)));

        let pretty = render(&document, true).unwrap();
        assert!(pretty.contains(r#""name": "x""#));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::CyclicTree(NodeId(3)).to_string(), "node #3 is reached more than once, the syntax tree is cyclic");
        assert_eq!("4".parse::<Indent>(), Ok(Indent::Four));
        assert!("3".parse::<Indent>().is_err());
    }
}

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

use codespan_reporting::files;
use std::fmt;
use std::ops;

/// File identifier.
/// References a source file in the source database.
pub type FileId = usize;

/// Source database.
/// Stores the source file contents for reference.
pub type SourceDatabase = files::SimpleFiles<String, String>;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceLocation {
    /// Byte offset into the file (counted from zero).
    pub offset: usize,
    /// Line number (counted from zero).
    pub line: usize,
    /// Column number (counted from zero)
    pub column: usize,
}

#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub file: FileId,
    pub start: SourceLocation,
    pub end: SourceLocation,
}

/// Index of a node in a [`Tree`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Grammatical category of a syntax node.
///
/// The string form of each kind matches the cursor kind spelling used
/// by libclang, so documents produced from this tree line up with the
/// ones downstream tools already know how to read.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    TranslationUnit,
    FunctionDecl,
    ParmDecl,
    VarDecl,
    CompoundStmt,
    DeclStmt,
    ReturnStmt,
    IfStmt,
    WhileStmt,
    DoStmt,
    ForStmt,
    BreakStmt,
    ContinueStmt,
    NullStmt,
    BinaryOperator,
    CompoundAssignOperator,
    UnaryOperator,
    ConditionalOperator,
    CallExpr,
    DeclRefExpr,
    MemberRefExpr,
    ArraySubscriptExpr,
    ParenExpr,
    CStyleCastExpr,
    UnaryExprOrTypeTraitExpr,
    InitListExpr,
    IntegerLiteral,
    FloatingLiteral,
    CharacterLiteral,
    StringLiteral,
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// Display name of the node, empty for most structural nodes.
    pub spelling: String,
    pub loc: SourceRange,
    /// Children in source order.
    pub children: Vec<NodeId>,
}

/// Arena holding the nodes of one parsed translation unit.
///
/// Nodes refer to their children by [`NodeId`]. Nothing prevents a
/// producer from creating a cycle or referencing a missing node, so
/// consumers walking the tree have to check for both.
#[derive(Debug, Default, Clone)]
pub struct Tree {
    nodes: Vec<SyntaxNode>,
    root: Option<NodeId>,
}

impl SourceLocation {
    /// Construct a new source location.
    ///
    /// The `line_starts` indicates the byte offsets where new lines
    /// start in the file. The first element should thus be `0` since
    /// every file has at least one line starting at offset `0`.
    pub fn new(offset: usize, line_starts: &[usize]) -> SourceLocation {
        let mut loc = SourceLocation { offset, line: 0, column: offset };
        for (line, start) in line_starts.iter().enumerate() {
            if *start > offset {
                break;
            }
            loc = SourceLocation { offset, line, column: offset - start };
        }
        loc
    }
}

impl SourceRange {
    /// Construct a range from byte offsets.
    pub fn new(file: FileId, start: usize, end: usize, line_starts: &[usize]) -> SourceRange {
        SourceRange {
            file,
            start: SourceLocation::new(start, line_starts),
            end: SourceLocation::new(end, line_starts),
        }
    }

    /// Byte range covered in the source file.
    pub fn offsets(&self) -> ops::Range<usize> {
        self.start.offset..self.end.offset
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(f, "{}:{}-{}", self.start.line, self.start.column, self.end.column)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}

impl fmt::Debug for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRange")
            .field("file", &self.file)
            .field("offsets", &self.offsets())
            .finish()
    }
}

impl ops::Add<SourceRange> for SourceRange {
    type Output = SourceRange;

    fn add(self, rhs: SourceRange) -> SourceRange {
        assert_eq!(self.file, rhs.file);
        SourceRange {
            file: self.file,
            start: self.start.min(rhs.start),
            end: self.end.max(rhs.end),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::TranslationUnit => "TranslationUnit",
            NodeKind::FunctionDecl => "FunctionDecl",
            NodeKind::ParmDecl => "ParmDecl",
            NodeKind::VarDecl => "VarDecl",
            NodeKind::CompoundStmt => "CompoundStmt",
            NodeKind::DeclStmt => "DeclStmt",
            NodeKind::ReturnStmt => "ReturnStmt",
            NodeKind::IfStmt => "IfStmt",
            NodeKind::WhileStmt => "WhileStmt",
            NodeKind::DoStmt => "DoStmt",
            NodeKind::ForStmt => "ForStmt",
            NodeKind::BreakStmt => "BreakStmt",
            NodeKind::ContinueStmt => "ContinueStmt",
            NodeKind::NullStmt => "NullStmt",
            NodeKind::BinaryOperator => "BinaryOperator",
            NodeKind::CompoundAssignOperator => "CompoundAssignOperator",
            NodeKind::UnaryOperator => "UnaryOperator",
            NodeKind::ConditionalOperator => "ConditionalOperator",
            NodeKind::CallExpr => "CallExpr",
            NodeKind::DeclRefExpr => "DeclRefExpr",
            NodeKind::MemberRefExpr => "MemberRefExpr",
            NodeKind::ArraySubscriptExpr => "ArraySubscriptExpr",
            NodeKind::ParenExpr => "ParenExpr",
            NodeKind::CStyleCastExpr => "CStyleCastExpr",
            NodeKind::UnaryExprOrTypeTraitExpr => "UnaryExprOrTypeTraitExpr",
            NodeKind::InitListExpr => "InitListExpr",
            NodeKind::IntegerLiteral => "IntegerLiteral",
            NodeKind::FloatingLiteral => "FloatingLiteral",
            NodeKind::CharacterLiteral => "CharacterLiteral",
            NodeKind::StringLiteral => "StringLiteral",
        }
    }

    /// Return true if documents for this kind carry the spelling of
    /// the first source token as their value.
    pub fn is_literal_bearing(&self) -> bool {
        matches!(self, NodeKind::IntegerLiteral)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Tree {
    pub fn new() -> Tree {
        Tree::default()
    }

    /// Append a node to the arena and return its identifier.
    /// The children must have been added beforehand.
    pub fn add(
        &mut self,
        kind: NodeKind,
        spelling: impl Into<String>,
        loc: SourceRange,
        children: Vec<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SyntaxNode { kind, spelling: spelling.into(), loc, children });
        id
    }

    /// Append `child` to the children of `parent`.
    /// Returns false if `parent` is not a node of this tree.
    pub fn push_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        match self.nodes.get_mut(parent.0) {
            Some(node) => {
                node.children.push(child);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&SyntaxNode> {
        self.nodes.get(id.0)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

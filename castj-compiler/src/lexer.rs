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

//! Token extraction over sub-ranges of the source files.

use crate::ast::{self, SourceLocation, SourceRange};
use crate::parser::{CParser, Rule};
use codespan_reporting::files::{self, Files};
use pest::Parser;

/// Type of token extraction errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("source range {range} does not map to text in file {}", .range.file)]
    InvalidSpan { range: SourceRange },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Literal,
    Punctuation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'s> {
    pub kind: TokenKind,
    pub spelling: &'s str,
    pub range: SourceRange,
}

/// Tokens of one source range.
/// The buffer borrows the source text and is released when dropped.
#[derive(Debug, Default)]
pub struct Tokens<'s> {
    tokens: Vec<Token<'s>>,
}

/// Capability to read the first token of a node extent.
pub trait TokenExtractor {
    /// Return the spelling of the first token in `range`, or `None`
    /// when the range holds no token.
    fn first_token_spelling(&self, range: &SourceRange) -> Result<Option<String>, Error>;
}

impl<F> TokenExtractor for F
where
    F: Fn(&SourceRange) -> Result<Option<String>, Error>,
{
    fn first_token_spelling(&self, range: &SourceRange) -> Result<Option<String>, Error> {
        self(range)
    }
}

/// Lexer over the files of a source database.
pub struct Lexer<'a> {
    sources: &'a ast::SourceDatabase,
}

impl<'s> Tokens<'s> {
    pub fn first(&self) -> Option<&Token<'s>> {
        self.tokens.first()
    }
}

impl<'a> Lexer<'a> {
    pub fn new(sources: &'a ast::SourceDatabase) -> Lexer<'a> {
        Lexer { sources }
    }

    /// Tokenize the text covered by `range`, and only that text.
    ///
    /// Lexing stops at the first character that cannot start a token;
    /// the tokens read up to that point are returned.
    pub fn tokenize(&self, range: &SourceRange) -> Result<Tokens<'a>, Error> {
        let invalid = || Error::InvalidSpan { range: *range };
        let source = self.sources.source(range.file).map_err(|_| invalid())?;
        let text = source.get(range.offsets()).ok_or_else(invalid)?;

        let stream = CParser::parse(Rule::tokens, text)
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)?;
        let mut tokens = vec![];
        for pair in stream.into_inner() {
            let kind = match pair.as_rule() {
                Rule::keyword => TokenKind::Keyword,
                Rule::identifier => TokenKind::Identifier,
                Rule::integer_literal
                | Rule::floating_literal
                | Rule::character_literal
                | Rule::string_literal => TokenKind::Literal,
                Rule::punctuator => TokenKind::Punctuation,
                _ => continue,
            };
            let span = pair.as_span();
            let start = self.location(range, range.start.offset + span.start())?;
            let end = self.location(range, range.start.offset + span.end())?;
            tokens.push(Token {
                kind,
                spelling: span.as_str(),
                range: SourceRange { file: range.file, start, end },
            });
        }
        Ok(Tokens { tokens })
    }

    /// Resolve a byte offset of the file of `range` to a location.
    /// Line lookups use the line table computed once per file by the
    /// source database.
    fn location(&self, range: &SourceRange, offset: usize) -> Result<SourceLocation, Error> {
        let invalid = |_: files::Error| Error::InvalidSpan { range: *range };
        let line = self.sources.line_index(range.file, offset).map_err(invalid)?;
        let line_start = self.sources.line_range(range.file, line).map_err(invalid)?.start;
        Ok(SourceLocation { offset, line, column: offset - line_start })
    }
}

impl TokenExtractor for Lexer<'_> {
    fn first_token_spelling(&self, range: &SourceRange) -> Result<Option<String>, Error> {
        let tokens = self.tokenize(range)?;
        Ok(tokens.first().map(|token| token.spelling.to_owned()))
    }
}

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

use crate::ast::{self, NodeId, NodeKind};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files;
use pest::error::InputLocation;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use std::cell::{Cell, RefCell};
use std::iter::Peekable;

// Generate the C parser.
//
// The grammar covers a subset of C: functions, scalar and array
// declarations, structured control flow and the full expression
// precedence table. Binary, prefix and postfix
// operators are matched flat and folded with a Pratt parser.
//
// The token rules at the top are shared with the lexer, which runs
// `tokens` over a sub-range of the source.
#[derive(pest_derive::Parser)]
#[grammar_inline = r##"
WHITESPACE = _{ " " | "\t" | "\r" | "\n" | "\\\n" }
COMMENT = _{ block_comment | line_comment | preprocessor_directive }

block_comment = _{ "/*" ~ (!"*/" ~ ANY)* ~ "*/" }
line_comment = _{ "//" ~ (!"\n" ~ ANY)* }
preprocessor_directive = _{ "#" ~ (!"\n" ~ ANY)* }

ident_start = _{ ASCII_ALPHA | "_" }
ident_char = _{ ASCII_ALPHANUMERIC | "_" }

keyword = @{
    ("auto" | "break" | "case" | "char" | "const" | "continue" | "default" |
     "double" | "do" | "else" | "enum" | "extern" | "float" | "for" | "goto" |
     "if" | "int" | "long" | "register" | "return" | "short" | "signed" |
     "sizeof" | "static" | "struct" | "switch" | "typedef" | "union" |
     "unsigned" | "void" | "volatile" | "while") ~ !ident_char
}
identifier = @{ !keyword ~ ident_start ~ ident_char* }

integer_suffix = _{
    ("u" | "U") ~ ("ll" | "LL" | "l" | "L")? |
    ("ll" | "LL" | "l" | "L") ~ ("u" | "U")?
}
hex_digits = _{ ("0x" | "0X") ~ ASCII_HEX_DIGIT+ }
binary_digits = _{ ("0b" | "0B") ~ ASCII_BIN_DIGIT+ }
decimal_digits = _{ ASCII_DIGIT+ }
integer_literal = @{
    (hex_digits | binary_digits | decimal_digits) ~ integer_suffix? ~ !(ident_char | ".")
}
exponent = _{ ("e" | "E") ~ ("+" | "-")? ~ ASCII_DIGIT+ }
floating_suffix = _{ "f" | "F" | "l" | "L" }
floating_literal = @{
    ((ASCII_DIGIT+ ~ "." ~ ASCII_DIGIT* | "." ~ ASCII_DIGIT+) ~ exponent? |
     ASCII_DIGIT+ ~ exponent) ~ floating_suffix? ~ !ident_char
}
escape = _{ "\\" ~ ANY }
character_literal = @{ "'" ~ (escape | !("'" | "\\" | "\n") ~ ANY)+ ~ "'" }
string_literal = @{ "\"" ~ (escape | !("\"" | "\\" | "\n") ~ ANY)* ~ "\"" }

punctuator = @{
    "<<=" | ">>=" | "..." | "->" | "++" | "--" | "<<" | ">>" | "<=" | ">=" |
    "==" | "!=" | "&&" | "||" | "*=" | "/=" | "%=" | "+=" | "-=" | "&=" |
    "^=" | "|=" | "[" | "]" | "(" | ")" | "{" | "}" | "." | "&" | "*" |
    "+" | "-" | "~" | "!" | "/" | "%" | "<" | ">" | "^" | "|" | "?" | ":" |
    ";" | "=" | ","
}

token = _{
    floating_literal | integer_literal | character_literal | string_literal |
    keyword | identifier | punctuator
}
tokens = { SOI ~ token* }

BREAK = @{ "break" ~ !ident_char }
CONTINUE = @{ "continue" ~ !ident_char }
DO = @{ "do" ~ !ident_char }
ELSE = @{ "else" ~ !ident_char }
FOR = @{ "for" ~ !ident_char }
IF = @{ "if" ~ !ident_char }
RETURN = @{ "return" ~ !ident_char }
SIZEOF = @{ "sizeof" ~ !ident_char }
VOID = @{ "void" ~ !ident_char }
WHILE = @{ "while" ~ !ident_char }

type_keyword = @{
    ("unsigned" | "signed" | "const" | "volatile" | "static" | "extern" |
     "register" | "long" | "short" | "int" | "char" | "void" | "float" |
     "double") ~ !ident_char
}
type_specifier = { type_keyword+ }
pointer = _{ "*" }

lor = @{ "||" }
land = @{ "&&" }
bor = @{ "|" ~ !("|" | "=") }
bxor = @{ "^" ~ !"=" }
band = @{ "&" ~ !("&" | "=") }
eq = @{ "==" }
ne = @{ "!=" }
le = @{ "<=" }
ge = @{ ">=" }
lt = @{ "<" ~ !("<" | "=") }
gt = @{ ">" ~ !(">" | "=") }
shl = @{ "<<" ~ !"=" }
shr = @{ ">>" ~ !"=" }
add = @{ "+" ~ !("+" | "=") }
sub = @{ "-" ~ !("-" | "=" | ">") }
mul = @{ "*" ~ !"=" }
div = @{ "/" ~ !"=" }
rem = @{ "%" ~ !"=" }
infix_operator = _{
    lor | land | eq | ne | le | ge | shl | shr | lt | gt |
    bor | bxor | band | add | sub | mul | div | rem
}

cast = { "(" ~ type_specifier ~ pointer* ~ ")" }
sizeof_operator = { SIZEOF ~ !("(" ~ type_keyword) }
pre_inc = @{ "++" }
pre_dec = @{ "--" }
unary_plus = @{ "+" }
unary_minus = @{ "-" }
logical_not = @{ "!" }
bitwise_not = @{ "~" }
deref = @{ "*" }
address_of = @{ "&" }
prefix_operator = _{
    cast | sizeof_operator | pre_inc | pre_dec | unary_plus | unary_minus |
    logical_not | bitwise_not | deref | address_of
}

call_arguments = { "(" ~ (assignment_expression ~ ("," ~ assignment_expression)*)? ~ ")" }
subscript = { "[" ~ expression ~ "]" }
post_inc = @{ "++" }
post_dec = @{ "--" }
member_access = { ("->" | ".") ~ identifier }
postfix_operator = _{ call_arguments | subscript | post_inc | post_dec | member_access }

sizeof_type = { SIZEOF ~ "(" ~ type_specifier ~ pointer* ~ ")" }
paren_expression = { "(" ~ expression ~ ")" }
primary_expression = _{
    sizeof_type | floating_literal | integer_literal | character_literal |
    string_literal | identifier | paren_expression
}

unary_term = _{ prefix_operator* ~ primary_expression ~ postfix_operator* }
binary_expression = { unary_term ~ (infix_operator ~ unary_term)* }
conditional_expression = {
    binary_expression ~ ("?" ~ expression ~ ":" ~ conditional_expression)?
}
assignment_operator = @{
    "<<=" | ">>=" | "*=" | "/=" | "%=" | "+=" | "-=" | "&=" | "^=" | "|=" |
    "=" ~ !"="
}
assignment_expression = {
    conditional_expression ~ (assignment_operator ~ assignment_expression)?
}
expression = { assignment_expression ~ ("," ~ assignment_expression)* }

initializer_list = { "{" ~ (initializer ~ ("," ~ initializer)* ~ ","?)? ~ "}" }
initializer = _{ initializer_list | assignment_expression }
array_declarator = { "[" ~ assignment_expression? ~ "]" }
init_declarator = { pointer* ~ identifier ~ array_declarator* ~ ("=" ~ initializer)? }
declaration = { type_specifier ~ init_declarator ~ ("," ~ init_declarator)* ~ ";" }

compound_statement = { "{" ~ statement* ~ "}" }
if_statement = { IF ~ "(" ~ expression ~ ")" ~ statement ~ (ELSE ~ statement)? }
while_statement = { WHILE ~ "(" ~ expression ~ ")" ~ statement }
do_statement = { DO ~ statement ~ WHILE ~ "(" ~ expression ~ ")" ~ ";" }
for_init = { expression? ~ ";" }
for_condition = { expression? }
for_increment = { expression? }
for_statement = {
    FOR ~ "(" ~ (declaration | for_init) ~ for_condition ~ ";" ~ for_increment ~ ")" ~
    statement
}
return_statement = { RETURN ~ expression? ~ ";" }
break_statement = { BREAK ~ ";" }
continue_statement = { CONTINUE ~ ";" }
null_statement = { ";" }
expression_statement = { expression ~ ";" }
statement = _{
    compound_statement | if_statement | while_statement | do_statement |
    for_statement | return_statement | break_statement | continue_statement |
    declaration | null_statement | expression_statement
}

parameter = { type_specifier ~ pointer* ~ identifier? ~ ("[" ~ assignment_expression? ~ "]")* }
parameter_list = { VOID ~ &")" | parameter ~ ("," ~ parameter)* }
function_declaration = {
    type_specifier ~ pointer* ~ identifier ~ "(" ~ parameter_list? ~ ")" ~
    (compound_statement | ";")
}

translation_unit = {
    SOI ~
    (function_declaration | declaration)* ~
    EOI
}
"##]
pub struct CParser;

/// Maximum nesting of statements, initializer lists and
/// sub-expressions accepted by the tree builder.
pub const MAX_NESTING_DEPTH: usize = 256;

type Node<'i> = Pair<'i, Rule>;
type NodeIterator<'i> = Peekable<Pairs<'i, Rule>>;

struct Context<'a> {
    file: ast::FileId,
    line_starts: &'a [usize],
    tree: RefCell<ast::Tree>,
    pratt: PrattParser<Rule>,
    depth: Cell<usize>,
}

/// Nesting level held by the builder, released when dropped.
struct Nesting<'c> {
    depth: &'c Cell<usize>,
    levels: usize,
}

trait Helpers<'i> {
    fn children(self) -> NodeIterator<'i>;
    fn as_loc(&self, context: &Context) -> ast::SourceRange;
    fn as_string(&self) -> String;
}

impl<'a> Context<'a> {
    fn new(file: ast::FileId, line_starts: &'a [usize]) -> Context<'a> {
        // Operators registered later bind tighter.
        let pratt = PrattParser::new()
            .op(Op::infix(Rule::lor, Assoc::Left))
            .op(Op::infix(Rule::land, Assoc::Left))
            .op(Op::infix(Rule::bor, Assoc::Left))
            .op(Op::infix(Rule::bxor, Assoc::Left))
            .op(Op::infix(Rule::band, Assoc::Left))
            .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
            .op(Op::infix(Rule::lt, Assoc::Left)
                | Op::infix(Rule::gt, Assoc::Left)
                | Op::infix(Rule::le, Assoc::Left)
                | Op::infix(Rule::ge, Assoc::Left))
            .op(Op::infix(Rule::shl, Assoc::Left) | Op::infix(Rule::shr, Assoc::Left))
            .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
            .op(Op::infix(Rule::mul, Assoc::Left)
                | Op::infix(Rule::div, Assoc::Left)
                | Op::infix(Rule::rem, Assoc::Left))
            .op(Op::prefix(Rule::cast)
                | Op::prefix(Rule::sizeof_operator)
                | Op::prefix(Rule::pre_inc)
                | Op::prefix(Rule::pre_dec)
                | Op::prefix(Rule::unary_plus)
                | Op::prefix(Rule::unary_minus)
                | Op::prefix(Rule::logical_not)
                | Op::prefix(Rule::bitwise_not)
                | Op::prefix(Rule::deref)
                | Op::prefix(Rule::address_of))
            .op(Op::postfix(Rule::call_arguments)
                | Op::postfix(Rule::subscript)
                | Op::postfix(Rule::post_inc)
                | Op::postfix(Rule::post_dec)
                | Op::postfix(Rule::member_access));
        Context { file, line_starts, tree: RefCell::new(ast::Tree::new()), pratt, depth: Cell::new(0) }
    }

    /// Enter `levels` nested constructs starting at `node`.
    fn nest(&self, node: &Node<'_>, levels: usize) -> Result<Nesting<'_>, String> {
        let depth = self.depth.get() + levels;
        if depth > MAX_NESTING_DEPTH {
            return Err(format!(
                "{}: nesting too deep, the maximum depth is {}",
                node.as_loc(self),
                MAX_NESTING_DEPTH
            ));
        }
        self.depth.set(depth);
        Ok(Nesting { depth: &self.depth, levels })
    }

    fn add(
        &self,
        kind: NodeKind,
        spelling: impl Into<String>,
        loc: ast::SourceRange,
        children: Vec<NodeId>,
    ) -> NodeId {
        self.tree.borrow_mut().add(kind, spelling, loc, children)
    }

    fn loc(&self, id: NodeId) -> ast::SourceRange {
        self.tree.borrow().get(id).map(|node| node.loc).unwrap_or_default()
    }

    fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.tree.borrow().get(id).map(|node| node.kind)
    }

    fn spelling(&self, id: NodeId) -> String {
        self.tree.borrow().get(id).map(|node| node.spelling.clone()).unwrap_or_default()
    }
}

impl Drop for Nesting<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - self.levels);
    }
}

impl<'i> Helpers<'i> for Node<'i> {
    fn children(self) -> NodeIterator<'i> {
        self.into_inner().peekable()
    }

    fn as_loc(&self, context: &Context) -> ast::SourceRange {
        let span = self.as_span();
        ast::SourceRange::new(context.file, span.start(), span.end(), context.line_starts)
    }

    fn as_string(&self) -> String {
        self.as_str().to_owned()
    }
}

fn err_unexpected_rule<T>(expected: Rule, found: Rule) -> Result<T, String> {
    Err(format!("expected rule {:?}, got {:?}", expected, found))
}

fn err_missing_rule<T>(expected: Rule) -> Result<T, String> {
    Err(format!("expected rule {:?}, got nothing", expected))
}

fn expect<'i>(iter: &mut impl Iterator<Item = Node<'i>>, rule: Rule) -> Result<Node<'i>, String> {
    match iter.next() {
        Some(node) if node.as_rule() == rule => Ok(node),
        Some(node) => err_unexpected_rule(rule, node.as_rule()),
        None => err_missing_rule(rule),
    }
}

fn maybe<'i>(iter: &mut NodeIterator<'i>, rule: Rule) -> Option<Node<'i>> {
    iter.next_if(|n| n.as_rule() == rule)
}

fn parse_identifier(iter: &mut NodeIterator<'_>) -> Result<String, String> {
    expect(iter, Rule::identifier).map(|n| n.as_string())
}

fn parse_expression(node: Node<'_>, context: &Context) -> Result<NodeId, String> {
    let loc = node.as_loc(context);
    match node.as_rule() {
        Rule::expression | Rule::assignment_expression => {
            let rule = node.as_rule();
            let mut children = node.children();
            let mut lhs = parse_expression(
                children.next().ok_or_else(|| format!("empty {:?}", rule))?,
                context,
            )?;
            while let Some(next) = children.next() {
                let (kind, spelling, rhs) = if next.as_rule() == Rule::assignment_operator {
                    let operator = next.as_string();
                    let rhs = expect(&mut children, Rule::assignment_expression)?;
                    let kind = if operator == "=" {
                        NodeKind::BinaryOperator
                    } else {
                        NodeKind::CompoundAssignOperator
                    };
                    (kind, operator, rhs)
                } else {
                    (NodeKind::BinaryOperator, ",".to_owned(), next)
                };
                let rhs = parse_expression(rhs, context)?;
                lhs = context.add(kind, spelling, context.loc(lhs) + context.loc(rhs), vec![lhs, rhs]);
            }
            Ok(lhs)
        }
        Rule::conditional_expression => {
            let mut children = node.children();
            let condition = parse_expression(expect(&mut children, Rule::binary_expression)?, context)?;
            match children.next() {
                None => Ok(condition),
                Some(then) => {
                    let then = parse_expression(then, context)?;
                    let otherwise =
                        parse_expression(expect(&mut children, Rule::conditional_expression)?, context)?;
                    Ok(context.add(
                        NodeKind::ConditionalOperator,
                        "",
                        loc,
                        vec![condition, then, otherwise],
                    ))
                }
            }
        }
        Rule::binary_expression => {
            let _nesting = context.nest(&node, 1 + prefix_chain_length(&node))?;
            parse_operators(node.into_inner(), context)
        }
        rule => err_unexpected_rule(Rule::expression, rule),
    }
}

/// Return the length of the longest run of prefix operators in a
/// binary expression. The Pratt parser recurses once per operator of
/// a run.
fn prefix_chain_length(node: &Node<'_>) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for pair in node.clone().into_inner() {
        match pair.as_rule() {
            Rule::cast
            | Rule::sizeof_operator
            | Rule::pre_inc
            | Rule::pre_dec
            | Rule::unary_plus
            | Rule::unary_minus
            | Rule::logical_not
            | Rule::bitwise_not
            | Rule::deref
            | Rule::address_of => {
                current += 1;
                longest = longest.max(current);
            }
            _ => current = 0,
        }
    }
    longest
}

fn parse_operators(pairs: Pairs<'_, Rule>, context: &Context) -> Result<NodeId, String> {
    context
        .pratt
        .map_primary(|primary| parse_primary(primary, context))
        .map_prefix(|op, rhs| {
            let rhs = rhs?;
            let loc = op.as_loc(context) + context.loc(rhs);
            let (kind, spelling) = match op.as_rule() {
                Rule::cast => (NodeKind::CStyleCastExpr, String::new()),
                Rule::sizeof_operator => (NodeKind::UnaryExprOrTypeTraitExpr, "sizeof".to_owned()),
                _ => (NodeKind::UnaryOperator, op.as_string()),
            };
            Ok(context.add(kind, spelling, loc, vec![rhs]))
        })
        .map_postfix(|lhs, op| {
            let lhs = lhs?;
            let loc = context.loc(lhs) + op.as_loc(context);
            match op.as_rule() {
                Rule::call_arguments => {
                    let spelling = match context.kind(lhs) {
                        Some(NodeKind::DeclRefExpr) => context.spelling(lhs),
                        _ => String::new(),
                    };
                    let mut children = vec![lhs];
                    for argument in op.children() {
                        children.push(parse_expression(argument, context)?);
                    }
                    Ok(context.add(NodeKind::CallExpr, spelling, loc, children))
                }
                Rule::subscript => {
                    let mut children = op.children();
                    let index = parse_expression(expect(&mut children, Rule::expression)?, context)?;
                    Ok(context.add(NodeKind::ArraySubscriptExpr, "", loc, vec![lhs, index]))
                }
                Rule::member_access => {
                    let member = parse_identifier(&mut op.children())?;
                    Ok(context.add(NodeKind::MemberRefExpr, member, loc, vec![lhs]))
                }
                _ => Ok(context.add(NodeKind::UnaryOperator, op.as_string(), loc, vec![lhs])),
            }
        })
        .map_infix(|lhs, op, rhs| {
            let (lhs, rhs) = (lhs?, rhs?);
            let loc = context.loc(lhs) + context.loc(rhs);
            Ok(context.add(NodeKind::BinaryOperator, op.as_string(), loc, vec![lhs, rhs]))
        })
        .parse(pairs)
}

fn parse_primary(node: Node<'_>, context: &Context) -> Result<NodeId, String> {
    let loc = node.as_loc(context);
    match node.as_rule() {
        Rule::integer_literal => Ok(context.add(NodeKind::IntegerLiteral, "", loc, vec![])),
        Rule::floating_literal => Ok(context.add(NodeKind::FloatingLiteral, "", loc, vec![])),
        Rule::character_literal => Ok(context.add(NodeKind::CharacterLiteral, "", loc, vec![])),
        Rule::string_literal => {
            Ok(context.add(NodeKind::StringLiteral, node.as_string(), loc, vec![]))
        }
        Rule::identifier => Ok(context.add(NodeKind::DeclRefExpr, node.as_string(), loc, vec![])),
        Rule::sizeof_type => Ok(context.add(NodeKind::UnaryExprOrTypeTraitExpr, "sizeof", loc, vec![])),
        Rule::paren_expression => {
            let mut children = node.children();
            let inner = parse_expression(expect(&mut children, Rule::expression)?, context)?;
            Ok(context.add(NodeKind::ParenExpr, "", loc, vec![inner]))
        }
        rule => Err(format!("expected a primary expression, got {:?}", rule)),
    }
}

fn parse_initializer(node: Node<'_>, context: &Context) -> Result<NodeId, String> {
    if node.as_rule() == Rule::initializer_list {
        let _nesting = context.nest(&node, 1)?;
        let loc = node.as_loc(context);
        let elements = node
            .children()
            .map(|element| parse_initializer(element, context))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(context.add(NodeKind::InitListExpr, "", loc, elements))
    } else {
        parse_expression(node, context)
    }
}

fn parse_init_declarator(node: Node<'_>, context: &Context) -> Result<NodeId, String> {
    if node.as_rule() != Rule::init_declarator {
        return err_unexpected_rule(Rule::init_declarator, node.as_rule());
    }
    let loc = node.as_loc(context);
    let mut children = node.children();
    let id = parse_identifier(&mut children)?;
    let mut nested = vec![];
    while let Some(array) = maybe(&mut children, Rule::array_declarator) {
        if let Some(size) = array.children().next() {
            nested.push(parse_expression(size, context)?);
        }
    }
    if let Some(initializer) = children.next() {
        nested.push(parse_initializer(initializer, context)?);
    }
    Ok(context.add(NodeKind::VarDecl, id, loc, nested))
}

/// Parse a declaration into one `VarDecl` per declarator.
fn parse_declaration(node: Node<'_>, context: &Context) -> Result<Vec<NodeId>, String> {
    if node.as_rule() != Rule::declaration {
        return err_unexpected_rule(Rule::declaration, node.as_rule());
    }
    let mut children = node.children();
    expect(&mut children, Rule::type_specifier)?;
    children.map(|declarator| parse_init_declarator(declarator, context)).collect()
}

fn parse_statement(node: Node<'_>, context: &Context) -> Result<NodeId, String> {
    let _nesting = context.nest(&node, 1)?;
    let loc = node.as_loc(context);
    let rule = node.as_rule();
    if rule == Rule::declaration {
        let declarations = parse_declaration(node, context)?;
        return Ok(context.add(NodeKind::DeclStmt, "", loc, declarations));
    }
    let mut children = node.children();
    match rule {
        Rule::compound_statement => {
            let statements = children
                .map(|statement| parse_statement(statement, context))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(context.add(NodeKind::CompoundStmt, "", loc, statements))
        }
        Rule::if_statement => {
            expect(&mut children, Rule::IF)?;
            let mut nested =
                vec![parse_expression(expect(&mut children, Rule::expression)?, context)?];
            nested.push(parse_statement(
                children.next().ok_or_else(|| "expected statement, got nothing".to_owned())?,
                context,
            )?);
            if maybe(&mut children, Rule::ELSE).is_some() {
                nested.push(parse_statement(
                    children.next().ok_or_else(|| "expected statement, got nothing".to_owned())?,
                    context,
                )?);
            }
            Ok(context.add(NodeKind::IfStmt, "", loc, nested))
        }
        Rule::while_statement => {
            expect(&mut children, Rule::WHILE)?;
            let condition = parse_expression(expect(&mut children, Rule::expression)?, context)?;
            let body = parse_statement(
                children.next().ok_or_else(|| "expected statement, got nothing".to_owned())?,
                context,
            )?;
            Ok(context.add(NodeKind::WhileStmt, "", loc, vec![condition, body]))
        }
        Rule::do_statement => {
            expect(&mut children, Rule::DO)?;
            let body = parse_statement(
                children.next().ok_or_else(|| "expected statement, got nothing".to_owned())?,
                context,
            )?;
            expect(&mut children, Rule::WHILE)?;
            let condition = parse_expression(expect(&mut children, Rule::expression)?, context)?;
            Ok(context.add(NodeKind::DoStmt, "", loc, vec![body, condition]))
        }
        Rule::for_statement => {
            expect(&mut children, Rule::FOR)?;
            let mut nested = vec![];
            match children.next() {
                Some(init) if init.as_rule() == Rule::declaration => {
                    let init_loc = init.as_loc(context);
                    let declarations = parse_declaration(init, context)?;
                    nested.push(context.add(NodeKind::DeclStmt, "", init_loc, declarations));
                }
                Some(init) if init.as_rule() == Rule::for_init => {
                    if let Some(expression) = init.children().next() {
                        nested.push(parse_expression(expression, context)?);
                    }
                }
                Some(init) => return err_unexpected_rule(Rule::for_init, init.as_rule()),
                None => return err_missing_rule(Rule::for_init),
            }
            for clause in [Rule::for_condition, Rule::for_increment] {
                if let Some(expression) = expect(&mut children, clause)?.children().next() {
                    nested.push(parse_expression(expression, context)?);
                }
            }
            nested.push(parse_statement(
                children.next().ok_or_else(|| "expected statement, got nothing".to_owned())?,
                context,
            )?);
            Ok(context.add(NodeKind::ForStmt, "", loc, nested))
        }
        Rule::return_statement => {
            expect(&mut children, Rule::RETURN)?;
            let value = children.next().map(|value| parse_expression(value, context)).transpose()?;
            Ok(context.add(NodeKind::ReturnStmt, "", loc, value.into_iter().collect()))
        }
        Rule::break_statement => Ok(context.add(NodeKind::BreakStmt, "", loc, vec![])),
        Rule::continue_statement => Ok(context.add(NodeKind::ContinueStmt, "", loc, vec![])),
        Rule::null_statement => Ok(context.add(NodeKind::NullStmt, "", loc, vec![])),
        Rule::expression_statement => {
            parse_expression(expect(&mut children, Rule::expression)?, context)
        }
        _ => Err(format!("expected rule *_statement, got {:?}", rule)),
    }
}

fn parse_parameter(node: Node<'_>, context: &Context) -> Result<NodeId, String> {
    let loc = node.as_loc(context);
    let mut children = node.children();
    expect(&mut children, Rule::type_specifier)?;
    let id = maybe(&mut children, Rule::identifier).map(|n| n.as_string()).unwrap_or_default();
    let sizes = children
        .map(|size| parse_expression(size, context))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(context.add(NodeKind::ParmDecl, id, loc, sizes))
}

fn parse_function(node: Node<'_>, context: &Context) -> Result<NodeId, String> {
    let loc = node.as_loc(context);
    let mut children = node.children();
    expect(&mut children, Rule::type_specifier)?;
    let id = parse_identifier(&mut children)?;
    let mut nested = vec![];
    if let Some(parameters) = maybe(&mut children, Rule::parameter_list) {
        for parameter in parameters.children() {
            match parameter.as_rule() {
                Rule::VOID => (),
                Rule::parameter => nested.push(parse_parameter(parameter, context)?),
                rule => return err_unexpected_rule(Rule::parameter, rule),
            }
        }
    }
    if let Some(body) = maybe(&mut children, Rule::compound_statement) {
        nested.push(parse_statement(body, context)?);
    }
    Ok(context.add(NodeKind::FunctionDecl, id, loc, nested))
}

fn parse_toplevel(root: Node<'_>, name: &str, context: &Context) -> Result<NodeId, String> {
    let loc = root.as_loc(context);
    let mut declarations = vec![];
    for node in root.children() {
        match node.as_rule() {
            Rule::function_declaration => declarations.push(parse_function(node, context)?),
            Rule::declaration => declarations.extend(parse_declaration(node, context)?),
            Rule::EOI => (),
            rule => return Err(format!("expected a declaration, got {:?}", rule)),
        }
    }
    Ok(context.add(NodeKind::TranslationUnit, name, loc, declarations))
}

/// Parse C source code from a string.
///
/// The file is added to the compilation database under the provided
/// name.
pub fn parse_inline(
    sources: &mut ast::SourceDatabase,
    name: &str,
    source: String,
) -> Result<ast::Tree, Diagnostic<ast::FileId>> {
    let line_starts: Vec<_> = files::line_starts(&source).collect();
    let file = sources.add(name.to_owned(), source.clone());
    let root = CParser::parse(Rule::translation_unit, &source)
        .map_err(|e| {
            let range = match e.location {
                InputLocation::Pos(pos) => pos..pos,
                InputLocation::Span((start, end)) => start..end,
            };
            Diagnostic::error()
                .with_message(format!("failed to parse input file '{}'", name))
                .with_labels(vec![Label::primary(file, range).with_message(e.variant.message())])
        })?
        .next()
        .ok_or_else(|| Diagnostic::error().with_message("parser produced no translation unit"))?;
    let context = Context::new(file, &line_starts);
    let root = parse_toplevel(root, name, &context).map_err(|e| Diagnostic::error().with_message(e))?;
    let mut tree = context.tree.into_inner();
    tree.set_root(root);
    tracing::debug!(file = name, nodes = tree.len(), "parsed translation unit");
    Ok(tree)
}

/// Parse a new source file.
///
/// The source file is fully read and added to the compilation
/// database. Returns the constructed syntax tree, or a descriptive
/// error message in case of syntax error.
pub fn parse_file(
    sources: &mut ast::SourceDatabase,
    name: &str,
) -> Result<ast::Tree, Diagnostic<ast::FileId>> {
    let source = std::fs::read_to_string(name).map_err(|e| {
        Diagnostic::error().with_message(format!("failed to read input file '{}': {}", name, e))
    })?;
    parse_inline(sources, name, source)
}

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

//! C syntax tree parser and JSON serializer.

pub mod ast;
pub mod backends;
pub mod lexer;
pub mod parser;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn json_output_is_deterministic() {
        let src = include_str!("../tests/data/unary_ops.c").to_owned();

        let mut sources1 = ast::SourceDatabase::new();
        let mut sources2 = ast::SourceDatabase::new();

        let tree1 = parser::parse_inline(&mut sources1, "unary_ops.c", src.clone()).unwrap();
        let tree2 = parser::parse_inline(&mut sources2, "unary_ops.c", src).unwrap();

        let options = backends::json::Options::default();
        let result1 = backends::json::generate(&sources1, &tree1, &options).unwrap();
        let result2 = backends::json::generate(&sources2, &tree2, &options).unwrap();
        let result3 = backends::json::generate(&sources2, &tree2, &options).unwrap();

        assert_eq!(result1, result2);
        assert_eq!(result2, result3);
    }

    #[test]
    fn unary_ops_document() {
        let src = include_str!("../tests/data/unary_ops.c").to_owned();
        let mut sources = ast::SourceDatabase::new();
        let tree = parser::parse_inline(&mut sources, "unary_ops.c", src).unwrap();
        let json = backends::json::generate(
            &sources,
            &tree,
            &backends::json::Options { pretty: false, ..Default::default() },
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["kind"], "TranslationUnit");
        assert_eq!(value["name"], "unary_ops.c");
        let main = &value["children"][0];
        assert_eq!(main["kind"], "FunctionDecl");
        assert_eq!(main["name"], "main");
        assert!(json.contains(r#"{"kind":"IntegerLiteral","name":"","value":"5"}"#));
        assert!(json.contains(r#"{"kind":"UnaryOperator","name":"~","children":[{"kind":"DeclRefExpr","name":"a"}]}"#));
        assert!(json.contains(r#""kind":"ReturnStmt""#));
    }
}

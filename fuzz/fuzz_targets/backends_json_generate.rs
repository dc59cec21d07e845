#![no_main]

use castj_compiler::{ast, backends, parser};
use libfuzzer_sys::fuzz_target;

// Fuzz castj_compiler::backends::json::generate.
fuzz_target!(|source: String| {
    let mut sources = ast::SourceDatabase::new();
    let Ok(tree) = parser::parse_inline(&mut sources, "input.c", source) else {
        return;
    };
    let json = backends::json::generate(&sources, &tree, &backends::json::Options::default())
        .expect("parsed trees are acyclic and fully linked");
    assert!(serde_json::from_str::<serde_json::Value>(&json).is_ok());
});

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

//! C syntax tree to JSON converter.

use argh::FromArgs;
use codespan_reporting::term::{self, termcolor};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use castj_compiler::backends::json::{self, Indent};
use castj_compiler::{ast, parser};

const EXIT_USAGE: u8 = 1;
const EXIT_INPUT: u8 = 2;
const EXIT_OUTPUT: u8 = 3;

/// Permissions of written documents. Temporary files are created
/// private to the user.
#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

#[derive(FromArgs, Debug)]
/// Parse a C source file and write its syntax tree as JSON.
struct Opt {
    #[argh(switch)]
    /// print tool version and exit.
    version: bool,

    #[argh(option, short = 'o', default = "String::from(\"output.json\")")]
    /// path of the generated JSON document.
    /// Use "-" to print the document on stdout.
    output: String,

    #[argh(switch)]
    /// emit the document on a single line.
    compact: bool,

    #[argh(option, default = "Indent::Two")]
    /// number of spaces per indentation level of the pretty printed
    /// document ("2", "4").
    indent: Indent,

    #[argh(positional)]
    /// input file.
    input_file: Option<String>,
}

/// Failure of one of the conversion stages, with the process exit
/// code it maps to.
struct Failure {
    code: u8,
    message: String,
}

impl Failure {
    fn input(message: impl Into<String>) -> Failure {
        Failure { code: EXIT_INPUT, message: message.into() }
    }

    fn output(message: impl Into<String>) -> Failure {
        Failure { code: EXIT_OUTPUT, message: message.into() }
    }
}

/// Write `contents` to `output`.
///
/// The document is first written to a temporary file next to the
/// destination, then renamed over it, so readers never observe a
/// partially written file.
fn write_output(output: &str, contents: &str) -> Result<(), Failure> {
    if output == "-" {
        let mut stdout = std::io::stdout().lock();
        return writeln!(stdout, "{}", contents)
            .and_then(|_| stdout.flush())
            .map_err(|err| Failure::output(format!("could not write to stdout: {err}")));
    }

    let path = Path::new(output);
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let fail = |err: std::io::Error| Failure::output(format!("could not write '{output}': {err}"));
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    file.write_all(contents.as_bytes()).map_err(fail)?;
    file.write_all(b"\n").map_err(fail)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(OUTPUT_MODE);
        file.as_file().set_permissions(permissions).map_err(fail)?;
    }
    file.persist(path).map_err(|err| fail(err.error))?;
    Ok(())
}

fn generate_backend(opt: &Opt, input_file: &str) -> Result<(), Failure> {
    let mut sources = ast::SourceDatabase::new();
    let tree = match parser::parse_file(&mut sources, input_file) {
        Ok(tree) => tree,
        Err(err) => {
            let writer = termcolor::StandardStream::stderr(termcolor::ColorChoice::Auto);
            let config = term::Config::default();
            if let Err(emit_err) = term::emit(&mut writer.lock(), &config, &sources, &err) {
                tracing::error!("could not print diagnostic: {emit_err}");
            }
            return Err(Failure::input("error while parsing input"));
        }
    };

    let options = json::Options { pretty: !opt.compact, indent: opt.indent };
    let document = json::generate(&sources, &tree, &options)
        .map_err(|err| Failure::output(format!("could not generate JSON document: {err}")))?;
    write_output(&opt.output, &document)?;

    tracing::info!(input = input_file, output = %opt.output, "wrote JSON document");
    if opt.output != "-" {
        eprintln!("AST written to {}", opt.output);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let opt: Opt = argh::from_env();

    if opt.version {
        println!("castj {}\nCopyright (C) 2026 Google LLC", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let Some(input_file) = opt.input_file.as_ref() else {
        eprintln!("No input file is specified");
        return ExitCode::from(EXIT_USAGE);
    };

    match generate_backend(&opt, input_file) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure { code, message }) => {
            eprintln!("Error: {message}");
            ExitCode::from(code)
        }
    }
}

//! Script compilers: CoffeeScript, LiveScript and Dart.
//!
//! None of them track imports, so their outputs only go stale when the
//! source itself changes.

use super::CompilerSpec;

pub static COFFEE: CompilerSpec = CompilerSpec {
    label: "coffee",
    extensions: &["coffee"],
    target: "js",
    program: "coffee",
    command: "{program} -c --print {infile}",
    stdin: false,
    imports: None,
};

pub static LIVESCRIPT: CompilerSpec = CompilerSpec {
    label: "livescript",
    extensions: &["ls"],
    target: "js",
    program: "lsc",
    command: "{program} -c --print {infile}",
    stdin: false,
    imports: None,
};

/// `dart2js` writes the output file itself.
pub static DART: CompilerSpec = CompilerSpec {
    label: "dart",
    extensions: &["dart"],
    target: "js",
    program: "dart2js",
    command: "{program} -o {outfile} {infile}",
    stdin: false,
    imports: None,
};

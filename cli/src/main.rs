mod args;

use args::parse_args;
use compiler::Compiler;
use parser::Parser;
use std::{fs, process::exit};
use vm::Vm;

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            exit(exitcode::USAGE);
        }
    };

    let source = match fs::read_to_string(&args.source_file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}: {err}", args.source_file.display());
            exit(exitcode::NOINPUT);
        }
    };

    let mut parser = Parser::new(&source);
    let ast = match parser.parse() {
        Ok(ast) => ast,
        Err(errors) => {
            for err in errors {
                eprintln!("{err}");
            }
            exit(exitcode::DATAERR);
        }
    };

    let chunk = match Compiler::new().compile(&ast, parser.eof()) {
        Ok(chunk) => chunk,
        Err(errors) => {
            for err in errors {
                eprintln!("{err}");
            }
            exit(exitcode::DATAERR);
        }
    };

    #[cfg(feature = "debug-compiler")]
    eprint!("{chunk:?}");

    if let Err(err) = Vm::new().run(chunk) {
        eprintln!("{err}");
        exit(exitcode::SOFTWARE);
    }
}

use latte_lang::{
    diagnostics,
    harness::{self, CompileError},
    runtime::{value::Value, Interpreter},
};
use std::{env, fs, path::Path, process};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() != 3 {
        eprintln!("Usage: latte-lang [run|check] <file.latte>");
        process::exit(1);
    }

    let command = &args[1];
    let filename = &args[2];

    if !filename.ends_with(".latte") {
        eprintln!("Invalid file extension. Only .latte files are allowed.");
        process::exit(1);
    }

    let path = Path::new(filename);
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            diagnostics::report_io_error(path, &err);
            process::exit(1);
        }
    };
    let unit_name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string());

    let unit = match harness::compile(&unit_name, path.to_path_buf(), &source) {
        Ok(unit) => unit,
        Err(CompileError::Type(errors)) => {
            diagnostics::emit_type_errors(&source, &errors);
            process::exit(1);
        }
        Err(err) => {
            if let Some(errors) = err.syntax_errors() {
                diagnostics::emit_syntax_errors(path, &source, &errors.errors);
            }
            process::exit(1);
        }
    };

    match command.as_str() {
        "check" => {
            println!("{}: ok", path.display());
        }
        "run" => {
            let mut interpreter = Interpreter::new(&unit);
            match interpreter.invoke("main", Vec::new()) {
                Ok(Value::Unit) => {}
                Ok(value) => println!("{value}"),
                Err(err) => {
                    diagnostics::report_runtime_error(&err);
                    process::exit(1);
                }
            }
        }
        _ => {
            eprintln!("Invalid command. Usage: latte-lang [run|check] <file.latte>");
            process::exit(1);
        }
    }
}

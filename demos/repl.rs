use redlisp::ast::Value;
use redlisp::parser::parse_program;
use redlisp::{Config, Environment, Error, FileSourceProvider, Interpreter, SyntaxErrorKind};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::env;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive
const LOG_ENV: &str = "REDLISP_LOG";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| match parse_args(env::args().skip(1)) {
        Ok(Mode::Interactive) => run_repl(),
        Ok(Mode::File(file)) => run_file(&file),
        Err(usage) => {
            eprintln!("{usage}");
            process::exit(2);
        }
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

const USAGE: &str = "usage: repl [FILE]";

/// What the command line asked for
#[derive(Debug, PartialEq)]
enum Mode {
    Interactive,
    File(String),
}

/// Interpret the arguments after the program name
fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Mode, &'static str> {
    let args: Vec<String> = args.into_iter().collect();
    match args.as_slice() {
        [] => Ok(Mode::Interactive),
        // `--help` and unknown flags both get the usage line
        [flag] if flag.starts_with('-') => Err(USAGE),
        [file] => Ok(Mode::File(file.clone())),
        _ => Err(USAGE),
    }
}

/// Run FILE as the entry package; its imports resolve relative to it
fn run_file(file: &str) {
    let mut interp = Interpreter::new(FileSourceProvider::new("."));
    if let Err(e) = interp.run_package(file) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Whether `source` is an unfinished form that should continue on the next line
fn is_incomplete(source: &str, config: &Config) -> bool {
    match parse_program(source, config) {
        Err(Error::LexError(err)) => err.kind == SyntaxErrorKind::UnterminatedString,
        Err(Error::ParseError(err)) => err.kind == SyntaxErrorKind::UnclosedOpen,
        _ => false,
    }
}

fn run_repl() {
    println!("redlisp interpreter");
    println!("Enter forms like: (defn square x (* x x)) (square 12)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let mut interp = Interpreter::new(FileSourceProvider::new("."));
    let scope = interp.program_scope();
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "redlisp> " } else { "    ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }

                    // Handle special commands
                    match command {
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(&scope, interp.library());
                            continue;
                        }
                        ":packages" => {
                            for name in interp.packages().names() {
                                println!("  {name}");
                            }
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                // The newline terminates the last atom on the line
                pending.push_str(&line);
                pending.push('\n');
                if is_incomplete(&pending, interp.config()) {
                    continue;
                }

                let _ = rl.add_history_entry(pending.trim_end());
                match interp.run_in(&pending, &scope) {
                    // Forms evaluated for effect print nothing
                    Ok(Value::Nothing) => {}
                    Ok(result) => println!("{result}"),
                    Err(e) => println!("Error: {e}"),
                }
                pending.clear();
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("redlisp REPL:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :packages  - List cached packages");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Forms continue across lines until their parentheses balance.");
    println!("Set {LOG_ENV}=debug (or trace) to see package loading and evaluation.");
    println!();
    println!("Special forms: if fn macro let def defn import");
    println!("Functions: eval apply head tail list print typeof = + - * /");
    println!();
    println!("Examples:");
    println!("  (def total (+ 1.50 2.25))");
    println!("  (let a 2 b 3 (* a b))");
    println!("  ((macro x (eval x)) (list 1 2))");
    println!("  (import \"lib.lisp\" (some-function 1))");
    println!();
}

fn print_environment(scope: &Environment, library: &Environment) {
    let builtins = library.local_names();
    println!("Built-in bindings ({}):", builtins.len());
    // Print in columns for readability
    let mut col = 0;
    for name in builtins {
        print!("  {name:<10}");
        col += 1;
        if col % 6 == 0 {
            println!();
        }
    }
    if col % 6 != 0 {
        println!();
    }
    println!();

    let user_defined = scope.local_names();
    if user_defined.is_empty() {
        println!("No user-defined values.");
        return;
    }

    println!("User-defined values ({}):", user_defined.len());
    for name in user_defined {
        if let Some(value) = scope.lookup(&name) {
            println!("  {name} = {value}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let cases = vec![
            (args(&[]), Ok(Mode::Interactive)),
            (args(&["main.lisp"]), Ok(Mode::File("main.lisp".into()))),
            (args(&["--help"]), Err(USAGE)),
            (args(&["-v"]), Err(USAGE)),
            (args(&["a.lisp", "b.lisp"]), Err(USAGE)),
        ];

        for (i, (input, expected)) in cases.into_iter().enumerate() {
            assert_eq!(parse_args(input), expected, "case #{}", i + 1);
        }
    }

    #[test]
    fn test_is_incomplete() {
        let config = Config::default();
        assert!(is_incomplete("(defn square x\n", &config));
        assert!(is_incomplete("(print \"open\n", &config));
        assert!(!is_incomplete("(+ 1 2)\n", &config));
        assert!(!is_incomplete(")\n", &config));
    }
}

//! Entry point for the `diffs` command-line tool.

use std::io;

use diffs::cli::{self, Console};
use diffs::signal;

#[tokio::main]
async fn main() {
    let stdin = io::stdin();
    let mut console = Console {
        input: stdin.lock(),
        output: io::stdout(),
        errors: io::stderr(),
    };
    let code = cli::run(std::env::args_os().skip(1), &mut console, signal::process_exit()).await;
    std::process::exit(code);
}

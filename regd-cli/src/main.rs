// Clippy exceptions for the binary entry point: a CLI signals failure to
// the shell by printing the error and exiting non-zero.
#![allow(clippy::exit, clippy::print_stderr)]

#[tokio::main]
async fn main() {
    if let Err(e) = regd_cli::cli::run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

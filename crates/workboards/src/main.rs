/// CLI module - command-line interface for workboards
mod cli;

fn main() {
    cli::run_cli();
}

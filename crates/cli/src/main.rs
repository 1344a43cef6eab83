use std::process::ExitCode;

fn main() -> ExitCode {
    deckgen_cli::run()
}

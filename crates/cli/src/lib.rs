pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "deckgen",
    about = "Deckgen operator CLI",
    long_about = "Generate slide decks from outline briefs and inspect effective configuration.",
    after_help = "Examples:\n  deckgen generate --theme \"Quarterly review\"\n  deckgen generate --outline outline.json --output deck.pptx\n  deckgen config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Generate a deck, from the generation endpoint or an existing outline file"
    )]
    Generate(GenerateArgs),
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

#[derive(Debug, Args, Default)]
pub struct GenerateArgs {
    #[arg(long, help = "Presentation theme for the outline brief")]
    pub theme: Option<String>,
    #[arg(long, help = "Target audience for the outline brief")]
    pub audience: Option<String>,
    #[arg(long, help = "Goal the deck should accomplish")]
    pub goal: Option<String>,
    #[arg(
        long,
        help = "Assemble from a JSON outline file instead of calling the generation endpoint"
    )]
    pub outline: Option<PathBuf>,
    #[arg(long, help = "Write the deck to this path (defaults to the timestamped artifact name)")]
    pub output: Option<PathBuf>,
    #[arg(long, help = "Also publish the deck to the configured blob container")]
    pub upload: bool,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Generate(args) => commands::generate::run(args),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

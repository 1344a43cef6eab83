use std::path::PathBuf;
use std::sync::Arc;

use deckgen_agent::{OpenAiChatClient, OutlineBrief, OutlineGenerator, RetryPolicy};
use deckgen_core::config::{AppConfig, LoadOptions};
use deckgen_core::outline::Outline;
use deckgen_pptx::{generation_stamp, DeckBuilder};

use crate::commands::CommandResult;
use crate::GenerateArgs;

pub fn run(args: GenerateArgs) -> CommandResult {
    let mut options = LoadOptions::default();
    if args.outline.is_some() {
        // Offline assembly never touches the generation endpoint; satisfy
        // config validation even when no LLM settings are present.
        options.overrides.llm_api_key = Some("offline".to_string());
        options.overrides.llm_endpoint = Some("https://offline.invalid".to_string());
    }

    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "generate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "generate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let outline = match &args.outline {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|error| ("outline_read", error.to_string(), 4u8))?;
                Outline::from_reply(&raw)
                    .map_err(|error| ("outline_parse", error.to_string(), 4u8))?
            }
            None => {
                let chat = Arc::new(
                    OpenAiChatClient::from_config(&config.llm)
                        .map_err(|error| ("llm_client", error.to_string(), 5u8))?,
                );
                let generator =
                    OutlineGenerator::new(chat, RetryPolicy::from_config(&config.llm.retry))
                        .with_max_completion_tokens(config.llm.max_completion_tokens);
                let brief = brief_from_args(&args);
                generator
                    .generate(&brief)
                    .await
                    .map_err(|error| ("generation", error.to_string(), 5u8))?
            }
        };

        let stamp = generation_stamp(config.deck.timezone_offset_hours);
        let deck = DeckBuilder::from_config(&config.deck)
            .assemble(&outline, &stamp)
            .map_err(|error| ("assembly", error.to_string(), 6u8))?;

        let output: PathBuf = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{stamp}_auto_docs.pptx")));
        tokio::fs::write(&output, &deck)
            .await
            .map_err(|error| ("output_write", error.to_string(), 7u8))?;

        let mut message = format!(
            "wrote {} ({} slides, {} bytes)",
            output.display(),
            outline.len(),
            deck.len()
        );

        if args.upload {
            let publisher = deckgen_storage::from_config(&config.storage)
                .map_err(|error| ("storage_config", error.to_string(), 8u8))?;
            let filename = output
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("{stamp}_auto_docs.pptx"));
            let outcome = publisher.publish(&deck, &filename).await;
            message.push_str(&format!("; upload: {}", outcome.status_line()));
        }

        Ok::<String, (&'static str, String, u8)>(message)
    });

    match result {
        Ok(message) => CommandResult::success("generate", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("generate", error_class, message, exit_code)
        }
    }
}

fn brief_from_args(args: &GenerateArgs) -> OutlineBrief {
    let defaults = OutlineBrief::default();
    OutlineBrief {
        theme: args.theme.clone().unwrap_or(defaults.theme),
        audience: args.audience.clone().unwrap_or(defaults.audience),
        goal: args.goal.clone().unwrap_or(defaults.goal),
    }
}

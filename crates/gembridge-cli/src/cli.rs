//! CLI argument and command definitions.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gembridge", version, about = "Gemini chat-completion bridge")]
pub struct Cli {
    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override the API base URL.
    #[arg(long, env = "GEMINI_API_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available models.
    Models,

    /// Send a one-shot chat completion.
    Chat {
        /// The prompt to send.
        prompt: String,

        /// Model to use.
        #[arg(long, default_value = "gemini-pro")]
        model: String,

        /// Sampling temperature.
        #[arg(long)]
        temperature: Option<f64>,

        /// Maximum output tokens.
        #[arg(long)]
        max_output_tokens: Option<u32>,

        /// Stream the response as it is generated.
        #[arg(long)]
        stream: bool,

        /// Print the boundary wire format (completion JSON / SSE frames)
        /// instead of plain text.
        #[arg(long)]
        raw: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_chat_args() {
        let cli = Cli::try_parse_from([
            "gembridge",
            "chat",
            "hi",
            "--model",
            "gemini-pro",
            "--stream",
            "--temperature",
            "0.2",
        ])
        .unwrap();

        match cli.command {
            Commands::Chat {
                prompt,
                model,
                temperature,
                stream,
                raw,
                ..
            } => {
                assert_eq!(prompt, "hi");
                assert_eq!(model, "gemini-pro");
                assert_eq!(temperature, Some(0.2));
                assert!(stream);
                assert!(!raw);
            }
            _ => panic!("expected chat command"),
        }
    }

    #[test]
    fn test_parse_models_with_key_flag() {
        let cli = Cli::try_parse_from(["gembridge", "--api-key", "k", "models"]).unwrap();
        assert_eq!(cli.api_key.as_deref(), Some("k"));
        assert!(matches!(cli.command, Commands::Models));
    }

    #[test]
    fn test_chat_requires_prompt() {
        assert!(Cli::try_parse_from(["gembridge", "chat"]).is_err());
    }
}

//! gembridge — bridge generic chat-completion calls to the Gemini API.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use futures::StreamExt;
use gembridge_client::{
    sse, ChatMessage, GeminiClient, GeminiConfig, GenerationRequest, SharedConfig, StreamEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("gembridge=debug")
            .init();
    }

    let mut config = GeminiConfig::from_env();
    if let Some(ref key) = cli.api_key {
        config.api_key = key.clone();
    }
    if let Some(ref url) = cli.base_url {
        config.api_base_url = url.clone();
    }
    let shared = SharedConfig::new(config);

    match cli.command {
        Commands::Models => {
            let client = GeminiClient::from_shared(&shared)?;
            let models = client.list_models().await?;
            if models.is_empty() {
                println!("No models available.");
            } else {
                for m in &models {
                    let limit = m
                        .token_limit
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{} | {} | {}", m.id, m.display_name, limit);
                }
            }
        }
        Commands::Chat {
            prompt,
            model,
            temperature,
            max_output_tokens,
            stream,
            raw,
        } => {
            let client = GeminiClient::from_shared(&shared)?;
            let request = GenerationRequest {
                model: model.clone(),
                messages: vec![ChatMessage::user(prompt)],
                temperature,
                max_output_tokens,
                stream,
            };

            if stream {
                let events = client.generate_stream(&request).await?;
                if raw {
                    let mut frames = sse::encode_sse(model, events);
                    while let Some(frame) = frames.next().await {
                        print!("{frame}");
                    }
                } else {
                    let mut events = events;
                    while let Some(event) = events.next().await {
                        match event {
                            StreamEvent::Chunk(chunk) => {
                                if let Some(choice) = chunk.choices.first() {
                                    print!("{}", choice.message.content);
                                }
                            }
                            StreamEvent::Error { message, .. } => {
                                eprintln!();
                                anyhow::bail!("stream failed: {message}");
                            }
                            StreamEvent::Done => break,
                        }
                    }
                    println!();
                }
            } else {
                let completion = client.generate(&request).await?;
                if raw {
                    let response = sse::ChatCompletionResponse::new(&model, completion);
                    println!("{}", serde_json::to_string_pretty(&response)?);
                } else if let Some(choice) = completion.choices.first() {
                    println!("{}", choice.message.content);
                }
            }
        }
    }

    Ok(())
}

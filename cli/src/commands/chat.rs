use crate::commands::resolve_metrics;
use crate::error::Result;
use crate::output::OutputManager;
use clap::Args;
use hftmon_engine::advisor::{OllamaBackend, ThresholdChat};
use hftmon_engine::config::EngineConfig;
use hftmon_engine::sections::SectionsCatalog;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Metrics whose thresholds the assistant should know about (default: all dynamic)
    #[arg(short, long = "metric")]
    pub metrics: Vec<String>,

    /// Ask a single question and exit
    #[arg(short = 'M', long)]
    pub message: Option<String>,
}

pub async fn run(args: ChatArgs, config: EngineConfig, output: OutputManager) -> Result<()> {
    let catalog = SectionsCatalog::load(&config.paths.sections_file)?;
    let monitored: Vec<String> = resolve_metrics(&catalog, &args.metrics)?
        .into_iter()
        .map(|m| m.name.clone())
        .collect();

    let backend = Arc::new(OllamaBackend::new(&config.advisor)?);
    let mut chat = ThresholdChat::new(backend, &catalog, &monitored);

    if let Some(message) = args.message {
        let spinner = output.create_spinner("Thinking...");
        let reply = chat.send(&message).await.content.clone();
        spinner.finish_and_clear();
        println!("{}", reply);
        return Ok(());
    }

    if let Some(welcome) = chat.messages().first() {
        println!("{}\n", welcome.content);
    }
    output.print_info("Type /clear to reset the conversation, /exit to leave")?;

    loop {
        let Some(line) = output.prompt_input("you>")? else {
            break;
        };

        match line.as_str() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                chat.clear();
                output.print_info("Conversation cleared")?;
                continue;
            }
            _ => {}
        }

        let spinner = output.create_spinner("Thinking...");
        let reply = chat.send(&line).await.content.clone();
        spinner.finish_and_clear();
        println!("\n{}\n", reply);
    }

    Ok(())
}

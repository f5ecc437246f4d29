//! Interactive chat loop for requirements selection

use super::{is_low_confidence, reasoning, ChatSession, LlmFields, INTERACTIVE_PROMPT_SUFFIX};
use crate::context::RunContext;
use crate::error::LaunchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

/// Source of user input lines; `None` signals end of input
#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Reads lines from the process stdin
pub struct StdinLines {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinLines {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinLines {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LineSource for StdinLines {
    async fn next_line(&mut self, prompt: &str) -> Result<Option<String>> {
        print!("{}", prompt);
        std::io::stdout().flush().context("Failed to flush stdout")?;
        self.lines.next_line().await.context("Failed to read input")
    }
}

enum Command {
    Exit,
    Generate,
    Skip,
    Message(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        Command::Skip
    } else if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        Command::Exit
    } else if line.eq_ignore_ascii_case("generate") {
        Command::Generate
    } else {
        Command::Message(line.to_string())
    }
}

async fn read_line(
    ctx: &RunContext,
    input: &mut dyn LineSource,
    prompt: &str,
) -> Result<String, LaunchError> {
    let line = ctx
        .run(async {
            input
                .next_line(prompt)
                .await
                .map_err(|e| LaunchError::configuration(format!("{:#}", e)))
        })
        .await?;
    line.ok_or(LaunchError::Cancelled)
}

/// Chat until the user asks to generate; returns the fields of the last recommendation
///
/// `exit`/`quit` and end of input abort the session. A failed request is
/// reported and the conversation continues.
pub async fn run_interactive(
    ctx: &RunContext,
    session: &mut ChatSession,
    input: &mut dyn LineSource,
) -> Result<LlmFields, LaunchError> {
    let ui = ctx.ui();
    ui.info("\n=== Interactive LLM Session ===");
    ui.info("Ask questions about network configuration or describe your requirements.");
    ui.info("Type 'generate' to generate manifests based on the recommended profile.");
    ui.info("Type 'exit' or 'quit' to cancel.");
    ui.info("================================\n");

    loop {
        let line = read_line(ctx, input, "You: ").await?;

        match parse_command(&line) {
            Command::Skip => continue,
            Command::Exit => {
                info!("Interactive session cancelled by user");
                return Err(LaunchError::configuration("session cancelled by user"));
            }
            Command::Generate => {
                ui.info("\nExtracting profile from last response...");
                let fields = match session.extract_profile() {
                    Ok(fields) => fields,
                    Err(e) => {
                        ui.error(&format!("Error: {}", e));
                        ui.info("Please ask a question first to get a profile recommendation.");
                        continue;
                    }
                };

                if is_low_confidence(&fields) {
                    ui.warning("The LLM has low confidence in this recommendation.");
                    ui.info(&format!("Reason: {}", reasoning(&fields)));
                    let confirm =
                        read_line(ctx, input, "Do you want to proceed anyway? (yes/no): ").await?;
                    let confirm = confirm.trim().to_lowercase();
                    if confirm != "yes" && confirm != "y" {
                        ui.info("Cancelled. Ask another question or refine your requirements.");
                        continue;
                    }
                }

                ui.info("\nProceeding with profile generation...");
                return Ok(fields);
            }
            Command::Message(text) => {
                let progress = ui.start_progress("Waiting for AI response");
                match session.send_message(ctx, &text).await {
                    Ok(response) => {
                        progress.success("Response received");
                        ui.info(&format!("\nAssistant: {}{}\n", response, INTERACTIVE_PROMPT_SUFFIX));
                    }
                    Err(LaunchError::Cancelled) => {
                        progress.fail("Cancelled");
                        return Err(LaunchError::Cancelled);
                    }
                    Err(e) => {
                        progress.fail("AI request failed");
                        ui.error(&format!("Error: {}", e));
                    }
                }
            }
        }
    }
}

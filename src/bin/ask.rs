//! Interactive question-answering shell
//!
//! A small REPL over the pipeline, connecting to a live graph and the
//! OpenAI API from environment configuration.
//!
//! ```bash
//! NEO4J_URI=bolt://localhost:7687 \
//! NEO4J_USER=neo4j \
//! NEO4J_PASSWORD=secret \
//! OPENAI_API_KEY=sk-... \
//! cargo run --bin ask
//! ```
//!
//! When a turn pauses for author disambiguation, the candidates are
//! printed as a numbered menu and the selection re-enters the pipeline
//! with the continuation token from the paused turn.

use anyhow::{Context, Result};
use scholarqa::ai::{ChatMessage, LlmConfig, OpenAiClient};
use scholarqa::graph::Neo4jStore;
use scholarqa::pipeline::{Pipeline, TurnRequest, TurnResponse};
use scholarqa::PipelineConfig;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scholarqa=info")),
        )
        .init();

    let uri = std::env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".to_string());
    let user = std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string());
    let password = std::env::var("NEO4J_PASSWORD").context("NEO4J_PASSWORD must be set")?;

    let graph = Neo4jStore::connect(&uri, &user, &password)
        .await
        .with_context(|| format!("connecting to graph at {}", uri))?;
    let llm = Arc::new(OpenAiClient::new(LlmConfig::default()).context("configuring OpenAI client")?);

    let pipeline = Pipeline::new(
        Arc::new(graph),
        llm.clone(),
        llm,
        PipelineConfig::default(),
    );

    println!("Research publication Q&A. Ask a question, or 'quit' to exit.");
    let stdin = io::stdin();
    let mut history: Vec<ChatMessage> = Vec::new();

    loop {
        print!("? ");
        io::stdout().flush()?;

        let Some(line) = stdin.lock().lines().next() else {
            break;
        };
        let question = line?.trim().to_string();
        if question.is_empty() {
            continue;
        }
        if question == "quit" || question == "exit" {
            break;
        }

        let request = TurnRequest::new(question.clone()).with_history(history.clone());
        match pipeline.answer(request).await {
            Ok(response) if !response.candidates.is_empty() => {
                match select_candidate(&stdin, &pipeline, &response).await {
                    Ok(Some(resolved)) => {
                        print_answer(&resolved);
                        history.push(ChatMessage::user(question));
                        history.push(ChatMessage::assistant(resolved.answer));
                    }
                    Ok(None) => println!("Selection cancelled."),
                    Err(e) => eprintln!("Error: {:#}", e),
                }
            }
            Ok(response) => {
                print_answer(&response);
                history.push(ChatMessage::user(question));
                history.push(ChatMessage::assistant(response.answer));
            }
            Err(e) => eprintln!("Error [{}]: {}", e.stage(), e),
        }
    }

    Ok(())
}

/// Print the disambiguation menu and run the follow-up turn for the
/// chosen candidate. Returns None when the user backs out.
async fn select_candidate(
    stdin: &io::Stdin,
    pipeline: &Pipeline,
    paused: &TurnResponse,
) -> Result<Option<TurnResponse>> {
    println!("{}", paused.answer);
    for (i, candidate) in paused.candidates.iter().enumerate() {
        let departments = if candidate.departments.is_empty() {
            String::new()
        } else {
            format!(" ({})", candidate.departments.join(", "))
        };
        println!(
            "  {}. {}{} [score {:.2}]",
            i + 1,
            candidate.canonical_name,
            departments,
            candidate.match_score
        );
    }
    print!("Select 1-{} or press Enter to cancel: ", paused.candidates.len());
    io::stdout().flush()?;

    let Some(line) = stdin.lock().lines().next() else {
        return Ok(None);
    };
    let choice = line?.trim().to_string();
    let Ok(index) = choice.parse::<usize>() else {
        return Ok(None);
    };
    if index == 0 || index > paused.candidates.len() {
        return Ok(None);
    }

    let token = paused
        .continuation
        .clone()
        .context("paused turn carried no continuation token")?;
    let request = TurnRequest::new("").with_selection(paused.candidates[index - 1].id.clone(), token);
    let response = pipeline.answer(request).await?;
    Ok(Some(response))
}

fn print_answer(response: &TurnResponse) {
    println!("\n{}\n", response.answer);
    println!(
        "[{} | path: {:?} | {} rows, {} hits | {} ms]",
        response.intent.category.name(),
        response.trace.resolution_path,
        response.rows.len(),
        response.hits.len(),
        response.trace.total_ms
    );
}

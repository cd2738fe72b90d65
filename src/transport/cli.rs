//! CLI command implementations

use crate::api::{ChatClient, CreateChatSessionRequest};
use crate::auth::{FileSessionStore, SessionStore};
use crate::config::Config;
use crate::stream::ChatEvent;
use anyhow::{Context, Result};
use colored::Colorize;
use futures::StreamExt;
use std::io::{self, Write};
use std::sync::Arc;

async fn client(config: &Config) -> Result<ChatClient> {
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new()?);
    ChatClient::from_config(config, store).await
}

pub async fn run_login(config: &Config, email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            print!("Password: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let client = client(config).await?;
    let response = client
        .sign_in(email, &password)
        .await
        .context("Sign-in failed")?;

    println!("{} {}", "Signed in as".bold(), email.green());
    println!("Session expires at {}", response.expires_at);
    Ok(())
}

pub async fn run_logout(config: &Config) -> Result<()> {
    client(config).await?.logout().await?;
    println!("{}", "Signed out".green());
    Ok(())
}

pub async fn run_status(config: &Config) -> Result<()> {
    let client = client(config).await?;
    let session = client.gateway().session();

    println!("{}", "=== qbank Session ===".bold().cyan());
    println!("  API:      {}", client.gateway().base_url());
    if !session.is_signed_in() {
        println!("  Status:   {}", "Not signed in".red());
        return Ok(());
    }

    let now = chrono::Utc::now();
    let status = if session.is_expired(now) {
        "Expired".yellow()
    } else {
        "Signed in".green()
    };
    println!("  Status:   {}", status);
    if let Some(at) = session.expires_at {
        println!("  Expires:  {}", at);
    }
    println!(
        "  Refresh:  {}",
        if session.refresh_token.is_some() {
            "available"
        } else {
            "none"
        }
    );
    Ok(())
}

pub async fn run_session_create(
    config: &Config,
    question: Option<String>,
    answer: Option<String>,
    solution: Option<String>,
) -> Result<()> {
    let client = client(config).await?;
    let session = client
        .create_chat_session(&CreateChatSessionRequest {
            html_question_content: question,
            html_solution_content: solution,
            answer,
            selections: None,
        })
        .await?;
    println!("{}", session.id);
    Ok(())
}

pub async fn run_session_show(config: &Config, session_id: &str) -> Result<()> {
    let session = client(config).await?.get_chat_session(session_id).await?;
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

pub async fn run_session_events(config: &Config, session_id: &str) -> Result<()> {
    let events = client(config)
        .await?
        .get_chat_session_events(session_id)
        .await?;
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

/// Stream one turn: deltas to stdout, progress to stderr
pub async fn run_chat(
    config: &Config,
    session_id: &str,
    message: &str,
    image_file_ids: &[String],
) -> Result<()> {
    let client = client(config).await?;
    let mut turn = client.send_message(session_id, message, image_file_ids).await;
    let mut stdout = io::stdout();
    let mut failure = None;

    while let Some(event) = turn.next().await {
        match event {
            ChatEvent::PartialContent(delta) => {
                write!(stdout, "{}", delta)?;
                stdout.flush()?;
            }
            ChatEvent::TaskUpdate(task) => {
                if let Some(text) = task.state().status_text() {
                    eprintln!("{}", text.dimmed());
                }
            }
            ChatEvent::QuestionGenerated(question) => {
                println!();
                println!("{}", "=== Generated question ===".bold().cyan());
                println!("{}\n", question.question);
                if let Some(selections) = &question.selections {
                    for (i, selection) in selections.iter().enumerate() {
                        println!("  {}. {}", i + 1, selection);
                    }
                    println!();
                }
                println!("{} {}", "Answer:".bold(), question.answer);
                println!("{}\n{}", "Solution:".bold(), question.solution);
            }
            ChatEvent::Complete(_) => println!(),
            ChatEvent::Error(e) => {
                if e.is_session_expired() {
                    eprintln!("{}", "Session expired. Run `qbank login` again.".red());
                }
                failure = Some(e);
            }
        }
    }

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

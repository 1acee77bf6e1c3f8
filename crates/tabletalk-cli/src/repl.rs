//! Interactive chat loop.
//!
//! Plain questions go through the full translation pipeline; `:`-prefixed
//! commands inspect the session. Line editing uses rustyline when the
//! `repl-rustyline` feature is on, with a plain stdin fallback for
//! restricted builds.

use crate::table;
use anyhow::Result;
use colored::Colorize;
use tabletalk_core::{Analyst, Role, Session};

pub async fn run(analyst: Analyst, mut session: Session) -> Result<()> {
    println!(
        "{}",
        "TableTalk: ask about your data in plain language. :help for commands.".bold()
    );
    let mut input = LineReader::new()?;

    loop {
        let line = match input.read_line("ask> ") {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix(':') {
            match command.split_whitespace().next().unwrap_or("") {
                "quit" | "q" | "exit" => break,
                "help" | "h" => print_help(),
                "schema" => crate::print_schema(&session),
                "history" => print_history(&session),
                "sql" => {
                    let statement = command.trim_start_matches("sql").trim();
                    if statement.is_empty() {
                        println!("usage: :sql <statement>");
                        continue;
                    }
                    if let Err(err) =
                        crate::run_query(&session, statement, analyst.config()).await
                    {
                        eprintln!("{} {err}", "error:".red().bold());
                    }
                }
                other => println!("unknown command :{other}; try :help"),
            }
            continue;
        }

        match analyst.ask(line, &mut session).await {
            Ok(outcome) => crate::print_outcome(&outcome),
            Err(err) => eprintln!("{} {err}", "error:".red().bold()),
        }
    }

    println!("bye");
    Ok(())
}

fn print_help() {
    println!(
        "  :schema        show tables and columns\n\
         \x20 :history       show the conversation so far\n\
         \x20 :sql <stmt>    run SQL through the validator and engine\n\
         \x20 :quit          leave"
    );
}

fn print_history(session: &Session) {
    for turn in session.history() {
        let role = match turn.role {
            Role::User => "you".green(),
            Role::Assistant => "tabletalk".cyan(),
        };
        println!("{role}: {}", turn.text);
        if let Some(query) = &turn.query {
            println!("  {}", query.dimmed());
        }
        if let Some(summary) = &turn.result_summary {
            println!("  {}", summary.dimmed());
        }
    }
    if session.history().is_empty() {
        println!("{}", "(no turns yet)".dimmed());
    }
}

#[cfg(feature = "repl-rustyline")]
struct LineReader {
    editor: rustyline::DefaultEditor,
}

#[cfg(feature = "repl-rustyline")]
impl LineReader {
    fn new() -> Result<Self> {
        Ok(Self {
            editor: rustyline::DefaultEditor::new()?,
        })
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                let _ = self.editor.add_history_entry(&line);
                Some(line)
            }
            Err(_) => None,
        }
    }
}

#[cfg(not(feature = "repl-rustyline"))]
struct LineReader;

#[cfg(not(feature = "repl-rustyline"))]
impl LineReader {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        use std::io::{BufRead, Write};
        print!("{prompt}");
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}

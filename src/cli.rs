use crate::commands::{describe, App, Command};
use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// One shell line, parsed with the same grammar as the process arguments
#[derive(Parser)]
#[command(no_binary_name = true, name = "recyclo", disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

enum LineOutcome {
    Run(Command),
    Handled,
    Exit,
}

pub fn run_repl(app: &mut App) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("recyclo - type help for commands, exit to quit");
    if let Some(user) = app.session().user() {
        println!("Signed in as {}", user);
    }

    loop {
        match rl.readline("recyclo> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                match parse_line(line) {
                    LineOutcome::Exit => break,
                    LineOutcome::Handled => {}
                    LineOutcome::Run(Command::Shell) => println!("Already in the shell"),
                    LineOutcome::Run(command) => {
                        if let Err(e) = app.run(&command) {
                            eprintln!("Error: {}", describe(&e));
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

fn parse_line(line: &str) -> LineOutcome {
    let words = match shell_words::split(line) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("Cannot parse line: {}", e);
            return LineOutcome::Handled;
        }
    };

    match words.first().map(String::as_str) {
        Some("exit" | "quit") => return LineOutcome::Exit,
        Some("help") if words.len() == 1 => {
            print_help();
            return LineOutcome::Handled;
        }
        _ => {}
    }

    match ShellLine::try_parse_from(&words) {
        Ok(parsed) => LineOutcome::Run(parsed.command),
        Err(e) => {
            // clap renders help and usage errors itself
            let _ = e.print();
            LineOutcome::Handled
        }
    }
}

fn print_help() {
    println!("Account:");
    println!("  login <email> [--password P]        - sign in");
    println!("  register <name> <email>             - create an account");
    println!("  logout                              - sign out");
    println!("  whoami                              - show the signed-in user");
    println!("  profile                             - points and recycling history");
    println!("  ranking                             - points ranking");
    println!("Recycling:");
    println!("  classify <image> [--keep]           - classify a photo");
    println!("  pending list|summary|clear|submit   - pending items");
    println!("  pending remove <id>                 - drop one pending item");
    println!("  stats                               - recycling statistics");
    println!("Rewards:");
    println!("  rewards list                        - reward catalogue");
    println!("  rewards redeem <id>                 - redeem a reward");
    println!("Admin:");
    println!("  admin create|rewards|history        - accounts, rewards, redemptions");
    println!("  admin reward|toggle-reward <id>     - inspect or toggle a reward");
    println!("  admin add-reward|update-reward      - edit the catalogue");
    println!("  admin scan|validate <id_canje>      - confirm a redemption");
    println!("Shell:");
    println!("  help                                - show commands");
    println!("  exit                                - quit");
    println!("Append --help to any command for details.");
}

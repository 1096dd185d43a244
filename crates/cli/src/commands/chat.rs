//! `microclaw chat`: interactive session with persistent history.

use std::io::{BufRead, Write};

use microclaw_agent::{ConversationStore, CycleResult};

use super::setup;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = setup::load_config()?;
    let mut agent = setup::build_agent(&config)?;
    let mut history = ConversationStore::from_config(&config);

    println!();
    println!("  MicroClaw: interactive mode");
    println!();
    println!("  Model:     {}", config.model);
    println!("  Tools:     {}", agent.tools().names().join(", "));
    println!(
        "  History:   {} entries / {} bytes",
        history.max_entries(),
        history.max_bytes()
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  '/clear' forgets the conversation, '/stats' shows usage, 'exit' quits.");
    println!();

    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                history.clear();
                history.reclaim();
                println!("  (history cleared)");
                continue;
            }
            "/stats" => {
                let stats = agent.stats();
                println!(
                    "  calls={} tokens={} in / {} out, history={} entries (~{} tokens)",
                    stats.api_calls,
                    stats.input_tokens,
                    stats.output_tokens,
                    history.len(),
                    history.estimated_tokens()
                );
                continue;
            }
            _ => {}
        }

        eprint!("  ...");
        let result = agent.prompt(&mut history, input).await;
        eprint!("\r     \r");

        match result {
            CycleResult::Done { text, .. } => {
                println!();
                for line in text.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            CycleResult::Failed { kind, message } => {
                eprintln!("  [{kind} error] {message}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

//! timekeep-cli: command-line front end for the timekeep service.
//!
//! # Subcommands
//! - `start <fact> [--start EPOCH] [--end EPOCH]` - add a fact
//! - `stop`                                       - stop the running fact
//! - `today` / `facts`                            - list facts
//! - `categories` / `activities` / `tags`         - list entities
//! - `toggle` / `quit`                            - control the service
//! - `watch`                                      - print change signals
//! - `methods`                                    - print the RPC table

use clap::{Parser, Subcommand};
use serde::Deserialize;
use timekeep_core::ipc::TimekeepRequest;
use timekeep_core::{Client, FactRecord};

const DEFAULT_SOCKET: &str = "/tmp/timekeep.sock";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "timekeep-cli", version, about = "Talk to the timekeep tracking service")]
struct Cli {
    /// Service socket (overrides TIMEKEEP_SOCKET env var)
    #[arg(long, env = "TIMEKEEP_SOCKET", default_value = DEFAULT_SOCKET)]
    socket: String,

    /// Print raw JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start tracking, e.g. `start "coding@work, reviews #rust"`
    Start {
        fact: String,

        /// Start time as epoch seconds (default: now)
        #[arg(long, default_value_t = 0)]
        start: i64,

        /// End time as epoch seconds (default: still running)
        #[arg(long, default_value_t = 0)]
        end: i64,
    },

    /// Stop the running fact
    Stop,

    /// Facts for today
    Today,

    /// Facts in a date range
    Facts {
        /// Start date as epoch seconds (default: today)
        #[arg(long, default_value_t = 0)]
        from: u32,

        /// End date as epoch seconds (default: open-ended)
        #[arg(long, default_value_t = 0)]
        to: u32,

        #[arg(long, default_value = "")]
        search: String,

        /// Exclude matches instead of keeping them
        #[arg(long)]
        reverse: bool,
    },

    Categories,

    Activities {
        #[arg(default_value = "")]
        search: String,
    },

    Tags {
        /// Only autocomplete-eligible tags
        #[arg(long)]
        autocomplete: bool,
    },

    /// Ask front ends to show or hide themselves
    Toggle,

    /// Stop the service
    Quit,

    /// Print change signals as they arrive
    Watch,

    /// Print the RPC method table
    Methods,
}

// ============================================================================
// Output
// ============================================================================

fn format_duration(seconds: i64) -> String {
    format!("{}h {:02}m", seconds / 3600, (seconds % 3600) / 60)
}

fn format_epoch_with(epoch: i64, pattern: &str) -> String {
    chrono::DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.naive_utc().format(pattern).to_string())
        .unwrap_or_else(|| epoch.to_string())
}

fn format_epoch(epoch: i64) -> String {
    format_epoch_with(epoch, "%Y-%m-%d %H:%M")
}

fn print_fact(record: &FactRecord) {
    let end = match record.end_time() {
        0 => "...".to_string(),
        e => format_epoch_with(e, "%H:%M"),
    };
    let mut line = format!(
        "{:>5}  {} - {:<5}  {:>8}  {}",
        record.id(),
        format_epoch(record.start_time()),
        end,
        format_duration(record.delta()),
        record.activity()
    );
    if !record.category().is_empty() {
        line.push_str(&format!("@{}", record.category()));
    }
    if !record.description().is_empty() {
        line.push_str(&format!(", {}", record.description()));
    }
    for tag in record.tags() {
        line.push_str(&format!(" #{}", tag));
    }
    println!("{}", line);
}

async fn invoke<T>(client: &mut Client, request: TimekeepRequest) -> anyhow::Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    Ok(client.invoke(&request).await?)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut client = Client::connect(&cli.socket)
        .await
        .map_err(|e| anyhow::anyhow!("cannot reach timekeep service at {}: {}", cli.socket, e))?;

    match cli.command {
        Commands::Start { fact, start, end } => {
            let id: i64 = invoke(
                &mut client,
                TimekeepRequest::AddFact {
                    fact,
                    start_time: start,
                    end_time: end,
                    temporary: false,
                },
            )
            .await?;
            if id == 0 {
                anyhow::bail!("fact rejected");
            }
            println!("{}", id);
        }
        Commands::Stop => {
            let id: i64 = invoke(&mut client, TimekeepRequest::StopTracking { end_time: 0 }).await?;
            if id == 0 {
                println!("nothing is running");
            } else {
                println!("stopped {}", id);
            }
        }
        Commands::Today => {
            let facts: Vec<FactRecord> = invoke(&mut client, TimekeepRequest::GetTodaysFacts).await?;
            print_facts(&facts, cli.json)?;
        }
        Commands::Facts {
            from,
            to,
            search,
            reverse,
        } => {
            let facts: Vec<FactRecord> = invoke(
                &mut client,
                TimekeepRequest::GetFacts {
                    start_date: from,
                    end_date: to,
                    search_terms: search,
                    reverse_search_terms: reverse,
                },
            )
            .await?;
            print_facts(&facts, cli.json)?;
        }
        Commands::Categories => {
            let categories: Vec<(i64, String)> =
                invoke(&mut client, TimekeepRequest::GetCategories).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&categories)?);
            } else {
                for (id, name) in categories {
                    println!("{:>5}  {}", id, name);
                }
            }
        }
        Commands::Activities { search } => {
            let activities: Vec<(String, String)> =
                invoke(&mut client, TimekeepRequest::GetActivities { search }).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&activities)?);
            } else {
                for (name, category) in activities {
                    println!("{}@{}", name, category);
                }
            }
        }
        Commands::Tags { autocomplete } => {
            let tags: Vec<(i64, String, bool)> = invoke(
                &mut client,
                TimekeepRequest::GetTags {
                    only_autocomplete: autocomplete,
                },
            )
            .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else {
                for (id, name, autocomplete) in tags {
                    let marker = if autocomplete { "*" } else { " " };
                    println!("{:>5} {} {}", id, marker, name);
                }
            }
        }
        Commands::Toggle => {
            let _: () = invoke(&mut client, TimekeepRequest::Toggle).await?;
        }
        Commands::Quit => {
            let _: () = invoke(&mut client, TimekeepRequest::Quit).await?;
            println!("service stopped");
        }
        Commands::Watch => {
            client.subscribe().await?;
            loop {
                let signal = client.next_signal().await?;
                println!("{}", signal.name());
            }
        }
        Commands::Methods => {
            let methods: Vec<MethodSignatureRow> =
                invoke(&mut client, TimekeepRequest::Introspect).await?;
            for m in methods {
                println!("{}({}) -> {}", m.name, m.input, m.output);
            }
        }
    }

    Ok(())
}

/// Owned form of an `Introspect` entry.
#[derive(Debug, Deserialize)]
struct MethodSignatureRow {
    name: String,
    input: String,
    output: String,
}

fn print_facts(facts: &[FactRecord], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(facts)?);
        return Ok(());
    }
    if facts.is_empty() {
        println!("no facts");
        return Ok(());
    }
    for fact in facts {
        print_fact(fact);
    }
    let total: i64 = facts.iter().map(|f| f.delta()).sum();
    println!("total {}", format_duration(total));
    Ok(())
}

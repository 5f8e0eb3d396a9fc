//! timeranger CLI
//!
//! Read-only inspection of a timeranger database.

use clap::{Parser, Subcommand};
use serde_json::json;
use timeranger::{Database, Filter, Key, KeyType};
use tracing_subscriber::{fmt, EnvFilter};

/// timeranger CLI
#[derive(Parser, Debug)]
#[command(name = "tranger-cli")]
#[command(about = "Inspect a timeranger database")]
#[command(version)]
struct Args {
    /// Root directory
    #[arg(short, long, default_value = "./tranger_data")]
    path: String,

    /// Database name
    #[arg(short, long, default_value = "tranger")]
    database: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List topics with their sizes
    Topics,

    /// Print a topic descriptor
    Desc {
        /// Topic name
        topic: String,
    },

    /// Print matching records as JSON lines
    Dump {
        /// Topic name
        topic: String,

        /// First rowid (negative counts from the end)
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        from_rowid: i64,

        /// Last rowid (negative counts from the end)
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        to_rowid: i64,

        /// Only records with this key
        #[arg(short, long)]
        key: Option<String>,

        /// Newest first
        #[arg(short, long)]
        backward: bool,

        /// Print metadata only
        #[arg(long)]
        only_md: bool,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,timeranger=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> timeranger::Result<()> {
    let mut db = Database::open_path(std::path::Path::new(&args.path), &args.database, false)?;

    match args.command {
        Commands::Topics => {
            for name in db.list_topics()? {
                let size = db.topic_size(&name)?;
                println!("{}\t{}", name, size);
            }
        }
        Commands::Desc { topic } => {
            let (desc, cols, var) = {
                let t = db.open_topic(&topic)?;
                (t.desc().clone(), t.cols().clone(), t.var().clone())
            };
            let out = json!({ "desc": desc, "cols": cols, "var": var });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Dump {
            topic,
            from_rowid,
            to_rowid,
            key,
            backward,
            only_md,
        } => {
            let mut filter = Filter::new()
                .from_rowid(from_rowid)
                .to_rowid(to_rowid)
                .backward(backward)
                .only_md(only_md);

            if let Some(k) = key {
                let key_type = db.open_topic(&topic)?.key_type();
                filter = match key_type {
                    KeyType::Str => filter.key(Key::Str(k)),
                    KeyType::Int | KeyType::Rowid => {
                        let v = k.parse::<u64>().map_err(|_| {
                            timeranger::TrangerError::Parameter(format!("integer key expected: {}", k))
                        })?;
                        filter.key(v)
                    }
                };
            }

            let list = db.open_list(&topic, filter, None)?;
            list.with_items(|items| {
                for item in items {
                    let line = match &item.payload {
                        Some(payload) => payload.clone(),
                        None => item.md.to_metadata(),
                    };
                    println!("{}", line);
                }
            });
            db.close_list(&list)?;
        }
    }

    db.close()
}

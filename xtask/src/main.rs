//! Build automation tasks for Shardline
//!
//! Currently generates the CLI reference from the clap definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for Shardline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<shardline_cli::Cli>();

    let content = format!(
        r#"# Shardline CLI Reference

Generated from the CLI source code on {}.

## Environment Variables

| Variable | Default | Meaning |
|----------|---------|---------|
| `SHARDLINE_SHARD_COUNT` | `2` | Number of shards keys are routed across |
| `SHARDLINE_CHUNK_SIZE` | `50` | Records per transaction |
| `SHARDLINE_CONCURRENCY` | shard count | Maximum shards loading at once |
| `SHARDLINE_DEADLINE_MS` | none | Overall deadline for a load run |
| `SHARDLINE_STRATEGY` | `hash_modulo` | Routing strategy |
| `SHARDLINE_SHARD_URLS` | none | Comma-separated Postgres URLs, one per shard |
| `SHARDLINE_DB_MAX_CONNECTIONS` | `4` | Pool size per shard |
| `SHARDLINE_DB_CONNECT_TIMEOUT` | `10` | Connect timeout in seconds |
| `LOG_LEVEL` | `warn` | `trace`, `debug`, `info`, `warn` or `error` |
| `LOG_FORMAT` | `text` | `text` or `json` |

## Exit Codes

- `0` every shard committed
- `1` a shard failed or timed out, or the run could not finish
- `2` invalid arguments or configuration

## Commands

{}

---

*To update, run `cargo run -p xtask -- generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}

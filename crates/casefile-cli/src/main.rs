use casefile_core::{IndexConfig, MetadataFilter};
use casefile_index::{evaluation, HybridIndex, JsonlSource, SearchHit, SearchRequest};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "casefile", about = "Casefile: hybrid retrieval over patent-law corpora")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "casefile.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a JSONL corpus and persist it
    Build {
        /// Corpus file, one chunk or raw document per line
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Run a hybrid search against the persisted index
    Search {
        /// Natural-language query
        query: String,
        /// Number of results (capped by max_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Candidate pool size before reranking
        #[arg(long)]
        retrieve_k: Option<usize>,
        /// Metadata filter as JSON, e.g. '{"op":"source","sources":["MPEP"]}'
        #[arg(long)]
        filter: Option<String>,
        /// Skip query expansion
        #[arg(long)]
        no_expand: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// List chunks whose section label contains a pattern
    Section {
        /// Section pattern, e.g. "MPEP 2173"
        pattern: String,
        /// Maximum chunks to print
        #[arg(long, default_value_t = 50)]
        max: usize,
    },
    /// Show statistics about the persisted index
    Info,
    /// Measure hit rate and MRR against a golden question set
    Evaluate {
        /// JSON array of {query, expected_section}
        #[arg(long)]
        cases: PathBuf,
        /// Cutoff for a hit
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
    },
}

async fn read_config(path: &Path) -> anyhow::Result<IndexConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(IndexConfig::from_toml_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "Config file not found, using defaults");
            Ok(IndexConfig::default())
        }
        Err(e) => Err(anyhow::anyhow!(
            "Failed to read config file '{}': {e}",
            path.display()
        )),
    }
}

async fn open_index(config: &IndexConfig) -> anyhow::Result<HybridIndex> {
    let index = HybridIndex::from_config(config);
    if !index.load().await? {
        anyhow::bail!(
            "No index found in '{}'. Run `casefile build --input <corpus.jsonl>` first.",
            config.index_dir.display()
        );
    }
    Ok(index)
}

fn print_hit(rank: usize, hit: &SearchHit) {
    println!(
        "{rank}. [{}] {} (score {:.4}, fusion {:.4})",
        hit.metadata.source, hit.metadata.section, hit.score, hit.fusion_score
    );
    let preview: String = hit.text.chars().take(240).collect();
    println!("   {preview}");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = read_config(&cli.config).await?;

    match cli.command {
        Commands::Build { input } => {
            info!(input = %input.display(), index_dir = %config.index_dir.display(), "Building index");
            let index = HybridIndex::from_config(&config);
            let stats = index.build(&JsonlSource::new(input)).await?;
            println!(
                "Indexed {} chunks ({} sections) into {}",
                stats.chunks,
                stats.sections,
                config.index_dir.display()
            );
            for (source, count) in &stats.sources {
                println!("  {source}: {count}");
            }
        }
        Commands::Search {
            query,
            top_k,
            retrieve_k,
            filter,
            no_expand,
            json,
        } => {
            let index = open_index(&config).await?;
            let mut request = SearchRequest::new(query).with_top_k(config.effective_top_k(top_k));
            request.retrieve_k = retrieve_k;
            request.expand = config.use_expansion && !no_expand;
            if let Some(raw) = filter {
                let filter: MetadataFilter = serde_json::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("Invalid --filter JSON: {e}"))?;
                request = request.with_filter(filter);
            }

            let hits = index.search(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No results.");
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    print_hit(i + 1, hit);
                }
            }
        }
        Commands::Section { pattern, max } => {
            let index = open_index(&config).await?;
            let listing = index.section_chunks(&pattern, max).await?;
            if listing.total == 0 {
                println!("No content found for section '{pattern}'.");
            } else {
                println!(
                    "Section '{pattern}': {} chunk(s), showing {}",
                    listing.total,
                    listing.chunks.len()
                );
                for chunk in &listing.chunks {
                    println!("--- #{} [{}]", chunk.chunk_id, chunk.metadata.section);
                    println!("{}", chunk.text);
                }
            }
        }
        Commands::Info => {
            let index = open_index(&config).await?;
            let stats = index.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Evaluate { cases, top_k } => {
            let index = open_index(&config).await?;
            let cases = evaluation::load_cases(&cases).await?;
            let report = evaluation::evaluate(&index, &cases, top_k).await?;
            for result in &report.results {
                match result.rank {
                    Some(rank) => println!("  hit @{rank}  {}", result.query),
                    None => println!("  miss     {}", result.query),
                }
            }
            println!(
                "\nCases: {}  Hit rate@{}: {:.3}  MRR: {:.3}",
                report.cases, report.top_k, report.hit_rate, report.mrr
            );
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_args_parse() {
        let cli = Cli::try_parse_from([
            "casefile",
            "search",
            "antecedent basis",
            "-k",
            "3",
            "--no-expand",
            "--filter",
            r#"{"op":"source","sources":["MPEP"]}"#,
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                query,
                top_k,
                no_expand,
                filter,
                ..
            } => {
                assert_eq!(query, "antecedent basis");
                assert_eq!(top_k, Some(3));
                assert!(no_expand);
                assert!(filter.is_some());
            }
            _ => panic!("expected search command"),
        }
        assert_eq!(cli.config, PathBuf::from("casefile.toml"));
    }

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config(&dir.path().join("casefile.toml")).await.unwrap();
        assert_eq!(config, IndexConfig::default());
    }

    #[tokio::test]
    async fn test_open_index_without_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig {
            index_dir: dir.path().join("index"),
            ..IndexConfig::default()
        };
        let err = open_index(&config).await.err().unwrap();
        assert!(err.to_string().contains("casefile build"));
    }
}

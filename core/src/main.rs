use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pantry_core::assistant::{Assistant, SqliteCatalog};
use pantry_core::config::Config;
use pantry_core::db::Database;
use pantry_core::executor::SqliteExecutor;
use pantry_core::generate::openai::OpenAiGenerator;
use pantry_core::judge::Judge;
use pantry_core::matcher::{self, parse_user_ingredients};
use pantry_core::schema::SchemaDescriptor;

#[derive(Parser)]
#[command(name = "pantry", about = "Recipe assistant with a guarded text-to-SQL pipeline")]
struct Cli {
    /// Config file (defaults to ~/.pantry/pantry.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and migrate the recipe database
    Init {
        /// Insert the sample recipes into an empty database
        #[arg(long)]
        seed: bool,
    },
    /// Answer one or more questions; each runs as its own session
    Ask {
        #[arg(required = true)]
        questions: Vec<String>,
    },
    /// Judge a query against the schema and print the verdict as JSON
    Judge { sql: String },
    /// Search recipes without the language model
    Search {
        /// Comma-separated ingredients
        #[arg(long, conflicts_with = "name")]
        ingredients: Option<String>,
        /// Substring of the recipe name
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the schema documentation given to the model
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pantry=info".parse()?)
                .add_directive("pantry_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let schema = load_schema(&config)?;

    match cli.command {
        Command::Init { seed } => init(&config, &schema, seed),
        Command::Ask { questions } => ask(config, schema, questions).await,
        Command::Judge { sql } => {
            let verdict = Judge::new(config.judge.ambiguous_columns).judge(&sql, &schema);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(())
        }
        Command::Search { ingredients, name } => search(&config, ingredients, name),
        Command::Schema => {
            println!("{}", schema.documentation());
            Ok(())
        }
    }
}

/// Registry load failures are fatal; nothing runs against a schema we could
/// not read.
fn load_schema(config: &Config) -> anyhow::Result<SchemaDescriptor> {
    match &config.schema.path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading schema registry");
            SchemaDescriptor::load(path)
                .with_context(|| format!("failed to load schema registry {}", path.display()))
        }
        None => Ok(SchemaDescriptor::recipes()),
    }
}

fn db_path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn init(config: &Config, schema: &SchemaDescriptor, seed: bool) -> anyhow::Result<()> {
    let path = &config.database.path;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    tracing::info!(db = %path.display(), "opening database");
    let db = Database::open(&db_path_str(path))?;
    db.verify_schema(schema)?;

    if seed {
        let inserted = db.seed_sample_recipes()?;
        tracing::info!(inserted, "seeded sample recipes");
    }
    println!(
        "Database ready at {} ({} recipes)",
        path.display(),
        db.recipe_count()?
    );
    Ok(())
}

async fn ask(config: Config, schema: SchemaDescriptor, questions: Vec<String>) -> anyhow::Result<()> {
    let path = db_path_str(&config.database.path);
    let busy_timeout = Duration::from_millis(config.database.busy_timeout_ms);
    {
        let db = Database::open_read_only(&path, busy_timeout)
            .context("database missing; run `pantry init --seed` first")?;
        db.verify_schema(&schema)?;
    }

    let generator = OpenAiGenerator::from_env(
        config.llm.endpoint.clone(),
        config.llm.model.clone(),
        &config.llm.api_key_env,
        Duration::from_secs(config.llm.timeout_secs),
    )?;
    let executor = SqliteExecutor::new(&config.database.path)
        .with_busy_timeout(busy_timeout);

    let assistant = Arc::new(
        Assistant::new(
            Arc::new(schema),
            Arc::new(generator),
            Arc::new(executor),
            Arc::new(SqliteCatalog::new(&config.database.path).with_busy_timeout(busy_timeout)),
        )
        .with_judge(Judge::new(config.judge.ambiguous_columns))
        .with_settings(config.controller_settings())
        .with_match_options(config.match_options()),
    );

    tracing::info!(count = questions.len(), model = %config.llm.model, "answering questions");
    let handles: Vec<_> = questions
        .into_iter()
        .map(|question| {
            let assistant = Arc::clone(&assistant);
            tokio::task::spawn_blocking(move || {
                let answer = assistant.answer(&question);
                (question, answer)
            })
        })
        .collect();

    let multiple = handles.len() > 1;
    for handle in handles {
        let (question, answer) = handle.await?;
        if multiple {
            println!("> {question}");
        }
        match answer {
            Ok(answer) => println!("{}\n", answer.text),
            Err(e) => {
                tracing::error!(error = %e, "request failed");
                println!("Sorry, I couldn't process that request right now.\n");
            }
        }
    }
    Ok(())
}

fn search(config: &Config, ingredients: Option<String>, name: Option<String>) -> anyhow::Result<()> {
    let busy_timeout = Duration::from_millis(config.database.busy_timeout_ms);
    let db = Database::open_read_only(&db_path_str(&config.database.path), busy_timeout)
        .context("database missing; run `pantry init --seed` first")?;
    let recipes = db.all_recipes()?;
    let options = config.match_options();

    let matches = match (ingredients, name) {
        (Some(list), _) => {
            let have = parse_user_ingredients(&list);
            matcher::match_ingredients(&have, &recipes, &options)
        }
        (None, Some(term)) => matcher::match_name(&term, &recipes, options.max_results),
        (None, None) => anyhow::bail!("pass --ingredients or --name"),
    };
    println!("{}", matcher::summarize(&matches, &recipes, options.max_results));
    Ok(())
}

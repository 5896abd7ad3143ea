//! relorm CLI - Compile and run model queries
//!
//! Usage:
//!   relorm sql --schema <schema.toml> --query <query.toml> [--dialect <dialect>]
//!   relorm count --schema <schema.toml> --query <query.toml>
//!   relorm run --schema <schema.toml> --query <query.toml> [--database <db.sqlite>]
//!   relorm graph --schema <schema.toml>
//!
//! Examples:
//!   relorm sql --schema monitoring.toml --query failing_services.toml --dialect postgres
//!   relorm run --schema monitoring.toml --query failing_services.toml --database icinga.db
//!   relorm graph --schema monitoring.toml | dot -Tsvg > relations.svg

use clap::{Parser, Subcommand, ValueEnum};
use relorm::config::Settings;
use relorm::model::Schema;
use relorm::orm::{Connection, Query, QueryOptions, QuerySpec, SqliteConnection};
use relorm::sql::Dialect;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relorm")]
#[command(about = "relorm - Relation-aware query compilation for model graphs over SQL")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to RELORM_CONFIG, ./relorm.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SQL of a query
    Sql {
        #[command(flatten)]
        input: QueryInput,

        /// SQL dialect to generate (defaults to the configured one)
        #[arg(short, long)]
        dialect: Option<DialectArg>,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        output: OutputFormat,
    },

    /// Print the SQL counting the rows of a query
    Count {
        #[command(flatten)]
        input: QueryInput,

        /// SQL dialect to generate (defaults to the configured one)
        #[arg(short, long)]
        dialect: Option<DialectArg>,
    },

    /// Run a query against a SQLite database and print instances as JSON
    Run {
        #[command(flatten)]
        input: QueryInput,

        /// SQLite database (defaults to [database] path in the settings)
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Print the relation graph of a schema in DOT format
    Graph {
        /// Path to the schema file
        #[arg(short, long)]
        schema: PathBuf,
    },
}

#[derive(clap::Args)]
struct QueryInput {
    /// Path to the schema file
    #[arg(short, long)]
    schema: PathBuf,

    /// Path to the query file
    #[arg(short, long)]
    query: PathBuf,
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Postgres,
    Mysql,
    Tsql,
    Duckdb,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Tsql => Dialect::TSql,
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Output SQL only
    Sql,
    /// Output SQL with comments
    Verbose,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RELORM_LOG")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Sql {
            input,
            dialect,
            output,
        } => cmd_sql(&settings, &input, dialect, output),
        Commands::Count { input, dialect } => cmd_count(&settings, &input, dialect),
        Commands::Run { input, database } => cmd_run(&settings, &input, database),
        Commands::Graph { schema } => cmd_graph(&schema),
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, relorm::config::SettingsError> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
}

fn load_query(settings: &Settings, input: &QueryInput) -> Result<Query, String> {
    let schema = Schema::from_file(&input.schema)
        .map_err(|e| format!("Error loading schema '{}': {}", input.schema.display(), e))?;
    let spec = QuerySpec::from_file(&input.query)
        .map_err(|e| format!("Error loading query '{}': {}", input.query.display(), e))?;
    spec.to_query(Rc::new(schema), QueryOptions::from(settings))
        .map_err(|e| format!("Query error: {}", e))
}

fn cmd_sql(
    settings: &Settings,
    input: &QueryInput,
    dialect: Option<DialectArg>,
    output: OutputFormat,
) -> ExitCode {
    let query = match load_query(settings, input) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let dialect = dialect.map(Dialect::from).unwrap_or(settings.query.dialect);

    match query.to_sql(dialect) {
        Ok(sql) => {
            match output {
                OutputFormat::Sql => {
                    println!("{}", sql);
                }
                OutputFormat::Verbose => {
                    println!("-- relorm compiled SQL");
                    println!("-- Schema: {}", input.schema.display());
                    println!("-- Query: {}", input.query.display());
                    println!("-- Model: {}", query.model().name());
                    println!("-- Dialect: {:?}", dialect);
                    println!();
                    println!("{}", sql);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_count(settings: &Settings, input: &QueryInput, dialect: Option<DialectArg>) -> ExitCode {
    let query = match load_query(settings, input) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let dialect = dialect.map(Dialect::from).unwrap_or(settings.query.dialect);

    match query.count_sql(dialect) {
        Ok(sql) => {
            println!("{}", sql);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(settings: &Settings, input: &QueryInput, database: Option<PathBuf>) -> ExitCode {
    let query = match load_query(settings, input) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let path = match database {
        Some(path) => path,
        None => match settings.database.resolved_path() {
            Ok(Some(path)) => path,
            Ok(None) => {
                eprintln!("No database given: pass --database or set [database] path");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("Error in database settings: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    let conn = match SqliteConnection::open(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error opening database '{}': {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match run(&query, &conn) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Query error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(query: &Query, conn: &dyn Connection) -> Result<String, Box<dyn std::error::Error>> {
    let instances = query.execute(conn)?.collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_string_pretty(&instances)?)
}

fn cmd_graph(schema: &Path) -> ExitCode {
    let graph = match Schema::from_file(schema).and_then(|s| s.relation_graph()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error loading schema '{}': {}", schema.display(), e);
            return ExitCode::FAILURE;
        }
    };

    print!("{}", graph.to_dot());
    ExitCode::SUCCESS
}

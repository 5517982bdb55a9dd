mod logger;

use bson::Document;
use clap::Parser;
use docsql::{
    ir::Statement, materializer::Materializer, CaseSensitivity, TranslateOptions, Value,
};
use itertools::Itertools;
use log::info;
use std::{fs, path::PathBuf};

#[derive(Debug)]
struct CliError(String);

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T> From<T> for CliError
where
    T: std::error::Error,
{
    fn from(e: T) -> Self {
        CliError(e.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about=None)]
struct Cli {
    #[arg(index = 1, help = "A JSON file holding the statement to translate")]
    statement: PathBuf,
    #[arg(
        short,
        long,
        help = "Make LIKE, Contains, StartsWith and EndsWith case sensitive"
    )]
    case_sensitive: bool,
    #[arg(
        short,
        long,
        help = "A JSON array of result documents to materialize into rows"
    )]
    results: Option<PathBuf>,
}

fn main() -> Result<(), CliError> {
    logger::init_logger();
    let args = Cli::parse();

    let statement: Statement = serde_json::from_str(&fs::read_to_string(&args.statement)?)?;
    let options = TranslateOptions::new(CaseSensitivity::from(args.case_sensitive));
    let translation = docsql::translate(&statement, options)?;
    info!(
        "translated {} into {} stages",
        args.statement.display(),
        translation.plan.stages.len()
    );

    println!("collection: {}\npipeline:", translation.plan.collection);
    for stage in translation.plan.pipeline() {
        println!("    {}", stage);
    }

    if let Some(results) = args.results {
        let documents: Vec<Document> = serde_json::from_str(&fs::read_to_string(results)?)?;
        print_rows(&Materializer::for_statement(&statement), &documents);
    }
    Ok(())
}

fn print_rows(materializer: &Materializer, documents: &[Document]) {
    let header = materializer
        .columns()
        .iter()
        .map(|column| format!("{} ({:?})", column.alias, column.column_type))
        .join(" | ");
    println!("rows:\n    {header}");
    for row in materializer.materialize(documents) {
        println!("    {}", row.iter().map(display_value).join(" | "));
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::DateTime(d) => d.to_rfc3339(),
        Value::Date(d) => d.to_string(),
        Value::Time(t) => t.to_string(),
        Value::Document(d) => d.to_string(),
        other => format!("{other:?}"),
    }
}

//! Compile a query against an OBML model file and print the rendered SQL.
//!
//! Usage: print_sql <model.yaml> <query.json> [dialect]

use std::{env, fs};

use obml::{compile, Query, SemanticModel};

fn usage() {
    eprintln!("Usage: print_sql <model.yaml> <query.json> [dialect]");
}

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let model_path = args.remove(0);
    let query_path = args.remove(0);
    let dialect = args.first().cloned().unwrap_or_else(|| "postgres".to_string());

    let model: SemanticModel = serde_yaml::from_str(&fs::read_to_string(model_path)?)?;
    let query: Query = serde_json::from_str(&fs::read_to_string(query_path)?)?;

    let result = compile(&model, &query, &dialect)?;
    println!("{}", result.sql);
    Ok(())
}

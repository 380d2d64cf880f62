//! Register an OBML model (running it through reference resolution and
//! semantic validation once) and compile a query against it, printing the
//! compiled artifact's shape alongside the rendered SQL.
//!
//! Usage: run_query <model.yaml> <query.json> [dialect]

use std::{env, fs};

use obml::{compile, ModelRegistry, Query};

fn usage() {
    eprintln!("Usage: run_query <model.yaml> <query.json> [dialect]");
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

    let registry = ModelRegistry::new();
    let raw_model = fs::read_to_string(model_path)?;
    let model_id = registry.load(&raw_model)?;
    let model = registry.get(&model_id)?;

    let query: Query = serde_json::from_str(&fs::read_to_string(query_path)?)?;
    let result = compile(&model, &query, &dialect)?;

    println!("dialect:    {}", result.dialect);
    println!("factTables: {:?}", result.fact_tables);
    println!("dimensions: {:?}", result.dimensions);
    println!("measures:   {:?}", result.measures);
    println!("---");
    println!("{}", result.sql);
    Ok(())
}

use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::{
    env,
    fs::File,
    path::{Path, PathBuf},
    process::exit,
};
use vehscraper::{
    config::Config,
    load::{warehouse::read_table, ParquetDestination},
};

const DEFAULT_ROWS: usize = 10;

fn main() {
    // Expect a table name (resolved through the config) or a path to a Parquet file.
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <TABLE|PARQUET_FILE> [ROWS]", args[0]);
        exit(1);
    }
    let rows = match args.get(2).map(|n| n.parse::<usize>()) {
        None => DEFAULT_ROWS,
        Some(Ok(n)) => n,
        Some(Err(e)) => {
            eprintln!("Error: bad row count {:?}: {}", args[2], e);
            exit(1);
        }
    };
    let path = match resolve(&args[1]) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    };
    if let Err(e) = inspect_table(&path, rows) {
        eprintln!("Error: {}", e);
        exit(1);
    }
}

fn resolve(arg: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if arg.ends_with(".parquet") {
        return Ok(PathBuf::from(arg));
    }
    let cfg = Config::load()?;
    Ok(ParquetDestination::from_config(&cfg.destination).table_path(arg))
}

/// Print file metadata, the schema and the first `rows` rows.
fn inspect_table(path: &Path, rows: usize) -> Result<(), Box<dyn std::error::Error>> {
    let reader = SerializedFileReader::new(File::open(path)?)?;
    let meta = reader.metadata();
    let file_meta = meta.file_metadata();

    println!("=== Table: {} ===", path.display());
    println!(
        "Created by:           {}",
        file_meta.created_by().unwrap_or("<unknown>")
    );
    println!("Total rows:           {}", file_meta.num_rows());
    println!("Number of row groups: {}", meta.num_row_groups());
    println!("File-size on disk:    {} bytes", std::fs::metadata(path)?.len());
    println!();

    let (schema, batches) = read_table(path)?;
    println!("=== Schema ===");
    for field in schema.fields() {
        println!(
            "- {:<40} | {:?}{}",
            field.name(),
            field.data_type(),
            if field.is_nullable() { " (nullable)" } else { "" }
        );
    }
    println!();

    println!("=== First {} rows ===", rows);
    let header: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    println!("{}", header.join(" | "));
    print_rows(&batches, rows)?;
    Ok(())
}

fn print_rows(batches: &[RecordBatch], mut remaining: usize) -> Result<(), Box<dyn std::error::Error>> {
    for batch in batches {
        for row in 0..batch.num_rows() {
            if remaining == 0 {
                return Ok(());
            }
            let cells = batch
                .columns()
                .iter()
                .map(|col| array_value_to_string(col.as_ref(), row))
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", cells.join(" | "));
            remaining -= 1;
        }
    }
    Ok(())
}

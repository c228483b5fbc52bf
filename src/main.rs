use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use livepage::{
    Filters, MemoryBackend, PaginationConfig, PaginationController, Projection, Record,
    SortDirection, SortSpec,
};
use serde_json::{Value as JsonValue, json};
use tracing_subscriber::EnvFilter;

const FEED: &str = "tasks";
const STATUSES: [&str; 3] = ["open", "closed", "blocked"];

#[derive(Parser)]
#[command(name = "livepage")]
#[command(about = "Page through a live in-memory feed with a reactive pagination controller")]
struct Cli {
    /// Number of synthetic records in the feed
    #[arg(long, default_value_t = 42)]
    records: u64,

    /// JSON configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    page: Option<u64>,

    #[arg(long)]
    per_page: Option<u64>,

    /// Equality filter, `field=value` (repeatable)
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Sort key, `field` or `field:desc` (repeatable, highest precedence first)
    #[arg(long = "sort")]
    sort: Vec<String>,

    /// Fields to include (repeatable)
    #[arg(long = "field")]
    fields: Vec<String>,

    /// Print every page instead of just the selected one
    #[arg(long)]
    all: bool,

    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let backend = Rc::new(MemoryBackend::new().with_feed(FEED, synthetic_tasks(cli.records)));
    let pager = PaginationController::builder(config)
        .backend(backend.clone())
        .build()?;

    backend.deliver_ready();
    loop {
        let page = pager.get_page()?;
        println!(
            "-- page {}/{} ({} total) --",
            pager.current_page(),
            pager.total_pages(),
            pager.total_items().unwrap_or_default()
        );
        print_records(&page);

        if !cli.all || !pager.has_next_page() {
            break;
        }
        pager.next_page();
        pager.flush();
        backend.deliver_ready();
    }

    pager.dispose();
    Ok(())
}

fn build_config(cli: &Cli) -> Result<PaginationConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            PaginationConfig::from_json(&raw)?
        }
        None => PaginationConfig::new(FEED),
    };
    config.name = FEED.to_string();

    if let Some(page) = cli.page {
        config = config.page(page);
    }
    if let Some(per_page) = cli.per_page {
        config = config.per_page(per_page);
    }
    if !cli.filters.is_empty() {
        config = config.filters(parse_filters(&cli.filters)?);
    }
    if !cli.sort.is_empty() {
        config = config.sort(parse_sort(&cli.sort)?);
    }
    if !cli.fields.is_empty() {
        let fields = cli
            .fields
            .iter()
            .fold(Projection::new(), |projection, field| projection.include(field.as_str()));
        config = config.fields(fields);
    }
    if cli.debug {
        config = config.debug(true);
    }
    Ok(config)
}

fn parse_filters(raw: &[String]) -> Result<Filters> {
    raw.iter().try_fold(Filters::new(), |filters, entry| {
        let (field, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("filter '{entry}' must look like field=value"))?;
        // Numbers and booleans parse as JSON; anything else is a string.
        let value = serde_json::from_str::<JsonValue>(value)
            .unwrap_or_else(|_| JsonValue::String(value.to_string()));
        Ok(filters.with(field, value))
    })
}

fn parse_sort(raw: &[String]) -> Result<SortSpec> {
    raw.iter().try_fold(SortSpec::empty(), |spec, entry| {
        let (field, direction) = match entry.split_once(':') {
            Some((field, "desc")) => (field, SortDirection::Descending),
            Some((field, "asc")) => (field, SortDirection::Ascending),
            Some((_, other)) => return Err(anyhow!("unknown sort direction '{other}'")),
            None => (entry.as_str(), SortDirection::Ascending),
        };
        Ok(spec.then(field, direction))
    })
}

fn synthetic_tasks(count: u64) -> Vec<Record> {
    (1..=count)
        .filter_map(|i| {
            let status = STATUSES[(i % STATUSES.len() as u64) as usize];
            json!({
                "id": i,
                "title": format!("task #{i}"),
                "status": status,
                "priority": (i * 7) % 5,
            })
            .as_object()
            .cloned()
        })
        .collect()
}

fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!("Empty page");
        return;
    }

    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for field in record.keys() {
            if !columns.contains(&field.as_str()) {
                columns.push(field);
            }
        }
    }

    let cell = |record: &Record, column: &str| match record.get(column) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(value) => value.to_string(),
        None => String::new(),
    };

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for record in records {
        for (i, column) in columns.iter().enumerate() {
            widths[i] = widths[i].max(cell(record, column).len());
        }
    }

    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{:width$}", col, width = widths[i]))
        .collect();
    println!("{}", header.join(" | "));

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join("-+-");
    println!("{}", separator);

    for record in records {
        let row: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{:width$}", cell(record, column), width = widths[i]))
            .collect();
        println!("{}", row.join(" | "));
    }

    println!("\n{} row(s)", records.len());
}

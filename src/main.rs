use clap::{Args, Parser, Subcommand};
use heatlink::cluster::cluster;
use heatlink::pipeline;
use heatlink::render::{HeatmapPlot, ImageFormat, JsonPayload, Renderer};
use heatlink::table::{load_table, write_table};
use heatlink::{format_time_used, Logger, PipelineConfig, VERSION};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster, annotate and reshape a matrix; write heatmap data and plot
    Heatmap(HeatmapArgs),
    /// Cluster rows only and write the table in leaf order
    Order(OrderArgs),
}

/// Options shared by every subcommand; unset flags fall back to the config file.
#[derive(Args, Debug)]
struct InputArgs {
    /// Input table (tab-separated by default)
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// TOML configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,
    /// Identifier column
    #[arg(long = "id")]
    pub id_column: Option<String>,
    /// Measurement columns, comma-separated (default: all numeric columns)
    #[arg(long = "values")]
    pub values: Option<String>,
    /// Distance metric: euclidean, manhattan, maximum
    #[arg(short = 'd', long = "distance")]
    pub metric: Option<String>,
    /// Linkage method: ward, complete, single, average
    #[arg(short = 'm', long = "linkage")]
    pub linkage: Option<String>,
    /// Log file path (optional)
    #[arg(short = 'l', long = "log")]
    pub log: Option<String>,
}

#[derive(Args, Debug)]
struct HeatmapArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output directory
    #[arg(short = 'o', long = "output")]
    pub output: String,
    /// Descriptor column holding composite positions
    #[arg(long = "descriptor")]
    pub descriptor_column: Option<String>,
    /// Category display order, comma-separated
    #[arg(long = "order")]
    pub order: Option<String>,
    /// Split rule DELIM=field,field (repeatable, applied in order)
    #[arg(long = "split")]
    pub split: Vec<String>,
    /// Link template with {field} placeholders
    #[arg(long = "link")]
    pub link: Option<String>,
    /// Tooltip template with {field}, {category} and {value} placeholders
    #[arg(long = "tooltip")]
    pub tooltip: Option<String>,
    /// Gap between heatmap grid and dendrogram
    #[arg(long = "padding")]
    pub padding: Option<f64>,
    /// Dendrogram height shrink exponent (h / h^e)
    #[arg(long = "shrink")]
    pub shrink: Option<f64>,
    /// Skip the dendrogram
    #[arg(long = "no-dendrogram", default_value_t = false)]
    pub no_dendrogram: bool,
    /// Plot format: svg or png
    #[arg(short = 'f', long = "format", default_value = "svg")]
    pub format: String,
    /// Plot width in pixels
    #[arg(long = "width", default_value_t = 1000)]
    pub width: u32,
    /// Plot height in pixels
    #[arg(long = "height", default_value_t = 800)]
    pub height: u32,
    /// Plot title
    #[arg(long = "title")]
    pub title: Option<String>,
}

#[derive(Args, Debug)]
struct OrderArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output table path
    #[arg(short = 'o', long = "output")]
    pub output: String,
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Validate shared input arguments
fn validate_input_args(args: &InputArgs) -> Result<(), Box<dyn Error>> {
    if args.input.trim().is_empty() {
        return Err("Error: Input file path cannot be empty".into());
    }
    if !Path::new(&args.input).exists() {
        return Err(format!("Error: Input file does not exist: {}", args.input).into());
    }
    if let Some(config) = &args.config {
        if !Path::new(config).exists() {
            return Err(format!("Error: Config file does not exist: {}", config).into());
        }
    }
    if let Some(values) = &args.values {
        if split_list(values).is_empty() {
            return Err("Error: --values must name at least one column".into());
        }
    }
    Ok(())
}

/// Validate heatmap command arguments
fn validate_heatmap_args(args: &HeatmapArgs) -> Result<(), Box<dyn Error>> {
    validate_input_args(&args.input)?;
    if args.output.trim().is_empty() {
        return Err("Error: Output directory path cannot be empty".into());
    }
    args.format.parse::<ImageFormat>()?;
    if args.width == 0 || args.height == 0 {
        return Err(format!(
            "Error: Plot size must be positive, current: {}x{}",
            args.width, args.height
        )
        .into());
    }
    if let Some(padding) = args.padding {
        if !(padding >= 0.0) {
            return Err(format!("Error: Padding must be non-negative, current: {}", padding).into());
        }
    }
    if let Some(shrink) = args.shrink {
        if !(shrink < 1.0) {
            return Err(format!("Error: Shrink exponent must be below 1, current: {}", shrink).into());
        }
    }
    Ok(())
}

/// Validate order command arguments
fn validate_order_args(args: &OrderArgs) -> Result<(), Box<dyn Error>> {
    validate_input_args(&args.input)?;
    if args.output.trim().is_empty() {
        return Err("Error: Output file path cannot be empty".into());
    }
    Ok(())
}

/// Config file + environment, then command line overrides.
fn resolve_config(args: &InputArgs) -> Result<PipelineConfig, Box<dyn Error>> {
    let mut config = PipelineConfig::load(args.config.as_deref().map(Path::new))?;
    if let Some(id) = &args.id_column {
        config.id_column = id.clone();
    }
    if let Some(values) = &args.values {
        config.value_columns = split_list(values);
    }
    if let Some(metric) = &args.metric {
        config.metric = metric.clone();
    }
    if let Some(linkage) = &args.linkage {
        config.linkage = linkage.clone();
    }
    Ok(config)
}

fn open_logger(path: &Option<String>, default: &str) -> Result<Logger, Box<dyn Error>> {
    let log_file = match path {
        Some(log_path) => std::fs::File::create(log_path)?,
        None => std::fs::File::create(default)?,
    };
    Ok(Logger::new(log_file))
}

fn run_heatmap(args: &HeatmapArgs) -> Result<(), Box<dyn Error>> {
    validate_heatmap_args(args)?;
    let start_time = Instant::now();

    let mut config = resolve_config(&args.input)?;
    if let Some(descriptor) = &args.descriptor_column {
        config.descriptor_column = descriptor.clone();
    }
    if let Some(order) = &args.order {
        config.category_order = split_list(order);
    }
    if !args.split.is_empty() {
        config.split = args.split.clone();
    }
    if let Some(link) = &args.link {
        config.link_template = link.clone();
    }
    if let Some(tooltip) = &args.tooltip {
        config.tooltip_template = Some(tooltip.clone());
    }
    if let Some(padding) = args.padding {
        config.dendrogram.padding = padding;
    }
    if let Some(shrink) = args.shrink {
        config.dendrogram.shrink_exponent = shrink;
    }
    if args.no_dendrogram {
        config.dendrogram.enabled = false;
    }

    std::fs::create_dir_all(&args.output)?;
    let mut logger = open_logger(&args.input.log, &format!("{}/heatlink.log", args.output))?;

    logger.log("=== heatlink Heatmap Log ===")?;
    logger.log(&format!("Software Version: v{}", VERSION))?;
    logger.log(&format!("Runtime: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")))?;
    logger.log(&format!("Input File: {}", args.input.input))?;
    logger.log(&format!("Output Directory: {}", args.output))?;
    logger.log(&format!("Distance: {}, Linkage: {}", config.metric, config.linkage))?;
    logger.log(&format!("Split Rules: {}", config.split.join(" ")))?;
    logger.log(&format!("Link Template: {}", config.link_template))?;

    let table = load_table(Path::new(&args.input.input), &config.load_options()?)?;
    logger.log(&format!(
        "Loaded {} rows, {} columns",
        table.n_rows(),
        table.headers().len()
    ))?;

    let result = pipeline::run(&config, &table, &mut logger);
    let output = match result {
        Ok(output) => output,
        Err(e) => {
            logger.log(&format!("Pipeline failed: {}", e))?;
            return Err(e.into());
        }
    };

    let out_dir = PathBuf::from(&args.output);
    let clustered_path = out_dir.join("clustered.tsv");
    write_table(&output.annotated.table, &clustered_path, b'\t')?;

    let renderers: Vec<Box<dyn Renderer>> = vec![
        Box::new(JsonPayload {
            path: out_dir.join("heatmap.json"),
        }),
        Box::new(HeatmapPlot {
            path: out_dir.join(format!("heatmap.{}", args.format.to_lowercase())),
            size: (args.width, args.height),
            format: args.format.parse()?,
            title: args.title.clone(),
        }),
    ];
    for renderer in &renderers {
        renderer.render(
            &output.long,
            &output.annotated.action_column,
            output.segments.as_ref(),
        )?;
    }
    logger.log(&format!("Clustered table: {}", clustered_path.display()))?;

    let elapsed = start_time.elapsed();
    logger.log(&format_time_used(elapsed))?;
    println!("{}", format_time_used(elapsed));
    Ok(())
}

fn run_order(args: &OrderArgs) -> Result<(), Box<dyn Error>> {
    validate_order_args(args)?;
    let start_time = Instant::now();
    let config = resolve_config(&args.input)?;
    let mut logger = open_logger(&args.input.log, "order.log")?;

    logger.log("=== heatlink Order Log ===")?;
    logger.log(&format!("Software Version: v{}", VERSION))?;
    logger.log(&format!("Input File: {}", args.input.input))?;
    logger.log(&format!("Output File: {}", args.output))?;

    let table = load_table(Path::new(&args.input.input), &config.load_options()?)?;
    let values = pipeline::value_columns(&config, &table);
    logger.log(&format!("Value Columns: {}", values.join(",")))?;
    let clustering = cluster(&table, &values, config.metric()?, config.linkage()?)?;
    write_table(&clustering.reorder(&table)?, Path::new(&args.output), b'\t')?;

    let elapsed = start_time.elapsed();
    logger.log(&format!("Wrote {} rows in leaf order", table.n_rows()))?;
    logger.log(&format_time_used(elapsed))?;
    println!("{}", format_time_used(elapsed));
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Heatmap(args) => run_heatmap(&args),
        Commands::Order(args) => run_order(&args),
    }
}

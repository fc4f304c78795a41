use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use hybridjoin_dw::logging::init_logging;
use hybridjoin_dw::{
    load_dimensions, run_etl, ConfigBuilder, ConfigManager, ConfigSource, EtlConfig, Result,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// HYBRIDJOIN warehouse loader
///
/// - `run`: load the dimensions and build `Sales_Fact`
/// - `load`: load the dimensions only
/// - `config`: print the effective configuration

fn main() {
    let matches = create_cli().get_matches();

    if let Err(e) = run_command(matches) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn source_args() -> Vec<Arg> {
    vec![
        Arg::new("transactions")
            .help("Transactions CSV file")
            .long("transactions")
            .value_parser(value_parser!(PathBuf)),
        Arg::new("master-data")
            .help("Master data CSV file")
            .long("master-data")
            .value_parser(value_parser!(PathBuf)),
        Arg::new("config")
            .help("JSON configuration file")
            .long("config")
            .short('c')
            .value_parser(value_parser!(PathBuf)),
    ]
}

fn pipeline_args() -> Vec<Arg> {
    vec![
        Arg::new("batch-size")
            .help("Records per batch")
            .long("batch-size")
            .value_parser(value_parser!(usize)),
        Arg::new("pace-ms")
            .help("Minimum milliseconds between batch dispatches")
            .long("pace-ms")
            .value_parser(value_parser!(u64)),
        Arg::new("channel-capacity")
            .help("Batches buffered between producer and join engine")
            .long("channel-capacity")
            .value_parser(value_parser!(usize)),
        Arg::new("max-attempts")
            .help("Attempts per lookup or sink call")
            .long("max-attempts")
            .value_parser(value_parser!(u32)),
    ]
}

fn output_args() -> Vec<Arg> {
    vec![
        Arg::new("log-json")
            .help("Emit logs as JSON")
            .long("log-json")
            .action(ArgAction::SetTrue),
        Arg::new("report-json")
            .help("Print the report as JSON")
            .long("report-json")
            .action(ArgAction::SetTrue),
        Arg::new("verbose")
            .help("Log at debug level")
            .long("verbose")
            .short('v')
            .action(ArgAction::SetTrue),
    ]
}

fn create_cli() -> Command {
    Command::new("hybridjoin")
        .about("Streaming HYBRIDJOIN star-schema loader")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Load dimensions and build the fact table")
                .args(source_args())
                .args(pipeline_args())
                .args(output_args()),
        )
        .subcommand(
            Command::new("load")
                .about("Load dimensions only")
                .args(source_args())
                .args(output_args()),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as JSON")
                .args(source_args())
                .args(pipeline_args()),
        )
}

fn run_command(matches: ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("run", sub)) => cmd_run(sub),
        Some(("load", sub)) => cmd_load(sub),
        Some(("config", sub)) => cmd_config(sub),
        _ => Ok(()),
    }
}

/// Defaults, then `--config`, then `HYBRIDJOIN_*` variables, then flags.
fn resolve_config(matches: &ArgMatches) -> Result<EtlConfig> {
    let mut manager = ConfigManager::new();
    if let Some(path) = matches.get_one::<PathBuf>("config") {
        manager.load_from_source(ConfigSource::File(path.clone()))?;
    }
    manager.load_from_source(ConfigSource::Environment)?;

    let mut builder = ConfigBuilder::from_config(manager.get_config());
    if let Some(path) = matches.get_one::<PathBuf>("transactions") {
        builder = builder.transactions_path(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("master-data") {
        builder = builder.master_data_path(path.clone());
    }
    if let Ok(Some(size)) = matches.try_get_one::<usize>("batch-size") {
        builder = builder.batch_size(*size);
    }
    if let Ok(Some(ms)) = matches.try_get_one::<u64>("pace-ms") {
        builder = builder.pace(Duration::from_millis(*ms));
    }
    if let Ok(Some(capacity)) = matches.try_get_one::<usize>("channel-capacity") {
        builder = builder.channel_capacity(*capacity);
    }
    if let Ok(Some(attempts)) = matches.try_get_one::<u32>("max-attempts") {
        builder = builder.max_attempts(*attempts);
    }
    builder.build()
}

fn setup_logging(matches: &ArgMatches) -> Result<()> {
    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_logging(level, matches.get_flag("log-json"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_run(matches: &ArgMatches) -> Result<()> {
    setup_logging(matches)?;
    let config = resolve_config(matches)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(run_etl(config))?;

    if matches.get_flag("report-json") {
        print_json(&report)?;
    } else {
        print!("{}", report.load);
        println!("{}", report.run);
        println!("Sales_Fact rows: {}", report.tables.sales_facts);
    }
    Ok(())
}

fn cmd_load(matches: &ArgMatches) -> Result<()> {
    setup_logging(matches)?;
    let config = resolve_config(matches)?;
    let (warehouse, report) = load_dimensions(&config)?;

    if matches.get_flag("report-json") {
        print_json(&report)?;
    } else {
        print!("{}", report);
        let counts = warehouse.table_counts();
        println!(
            "Totals: {} suppliers, {} products, {} customers, {} time rows, {} stores",
            counts.suppliers, counts.products, counts.customers, counts.time_rows, counts.stores
        );
    }
    Ok(())
}

fn cmd_config(matches: &ArgMatches) -> Result<()> {
    let config = resolve_config(matches)?;
    print_json(&config)
}

//! CLI tool for rootport

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use colored::Colorize;
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "rootport")]
#[command(about = "Discover PCIe GPUs and the root ports they sit behind", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML); also read from ROOTPORT_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Attribute source: sysfs, setpci or snapshot
    #[arg(short, long, global = true)]
    backend: Option<String>,

    /// Snapshot file to replay (implies --backend snapshot)
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Threads used to probe devices
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Bridges climbed before a trace is treated as cyclic
    #[arg(long, global = true)]
    max_hops: Option<usize>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Resolve every GPU to its root port (default)
    Discover {
        /// Output format (json or text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Capture raw device attributes as JSON for offline replay
    Snapshot {
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a sample configuration file
    Config,
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use rootport::RootPortConfig;

    let cli = Cli::parse();

    if let Some(Commands::Config) = &cli.command {
        print!("{}", RootPortConfig::sample_toml());
        return Ok(());
    }

    let config = load_config(&cli)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_filter()),
    )
    .init();

    match &cli.command {
        Some(Commands::Snapshot { output }) => handle_snapshot(&config, output.as_ref())?,
        Some(Commands::Discover { format }) => handle_discover(&config, format)?,
        // Default: discover with text output
        _ => handle_discover(&config, "text")?,
    }

    Ok(())
}

/// Config file, then command-line overrides.
#[cfg(feature = "cli")]
fn load_config(cli: &Cli) -> Result<rootport::RootPortConfig, Box<dyn std::error::Error>> {
    use rootport::{Backend, RootPortConfig};

    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("ROOTPORT_CONFIG").map(PathBuf::from));
    let mut config = match path {
        Some(path) => RootPortConfig::from_toml_file(path)?,
        None => RootPortConfig::default(),
    };

    if let Some(backend) = &cli.backend {
        config.source.backend = backend.parse::<Backend>()?;
    }
    if let Some(snapshot) = &cli.snapshot {
        config.source.snapshot = Some(snapshot.clone());
        if cli.backend.is_none() {
            config.source.backend = Backend::Snapshot;
        }
    }
    if let Some(workers) = cli.workers {
        config.discovery.workers = workers;
    }
    if let Some(max_hops) = cli.max_hops {
        config.discovery.max_hops = max_hops;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(feature = "cli")]
fn handle_discover(
    config: &rootport::RootPortConfig,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    use rootport::Discovery;

    let source = config.source.open()?;
    let report = Discovery::with_config(source, config.discovery.clone()).run()?;

    match format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => print_report(&report),
        _ => {
            eprintln!("Unknown format '{}'. Supported: text, json", format);
            return Err("Invalid format".into());
        }
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn handle_snapshot(
    config: &rootport::RootPortConfig,
    output: Option<&PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    use rootport::Snapshot;

    let source = config.source.open()?;
    let snapshot = Snapshot::capture(&source)?;
    let json = snapshot.to_json()?;

    if let Some(path) = output {
        std::fs::write(path, &json)?;
        eprintln!(
            "[+] Snapshot of {} devices written to: {}",
            snapshot.devices.len(),
            path.display()
        );
    } else {
        println!("{}", json);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn print_report(report: &rootport::DiscoveryReport) {
    println!("{}", "═══ GPU Root Ports ═══".cyan().bold());
    println!(
        "  {} {} ({} devices, {} bridges)",
        "Source:".white().bold(),
        report.source.green(),
        report.devices_enumerated,
        report.bridges_indexed
    );

    if !report.classes.is_empty() {
        let classes: Vec<String> = report
            .classes
            .iter()
            .map(|c| format!("{} {}", c.count, c.class))
            .collect();
        println!("  {} {}", "Classes:".white().bold(), classes.join(", "));
    }

    if report.results.is_empty() {
        println!("  {}", "No GPUs detected".yellow());
    }

    for (i, result) in report.results.iter().enumerate() {
        let port = if result.is_self_mapped() {
            format!("{} (no upstream bridge)", result.root_port).yellow()
        } else {
            result.root_port.to_string().green()
        };
        let marker = if result.is_degraded() { "!".red() } else { "▶".green() };
        println!(
            "  {} GPU {:<2} {} {}  {} {}  {} {}",
            marker,
            i,
            "BDF:".white().bold(),
            result.gpu.to_string().cyan(),
            "Root Port:".white().bold(),
            port,
            "Hops:".white().bold(),
            result.hops
        );
    }

    let ports = report.root_ports();
    if ports.len() < report.results.len() {
        println!("\n{}", "═══ Shared Root Ports ═══".cyan().bold());
        for port in ports {
            let gpus = report.gpus_behind(port);
            if gpus.len() > 1 {
                let list: Vec<String> = gpus.iter().map(|g| g.to_string()).collect();
                println!("  {} {} → {}", "▶".green(), port, list.join(", "));
            }
        }
    }

    if !report.anomalies.is_empty() {
        println!("\n{}", "═══ Topology Anomalies ═══".red().bold());
        for anomaly in &report.anomalies {
            println!("  {} {}", "[WARN]".yellow(), anomaly);
        }
    }

    if !report.skipped.is_empty() {
        println!("\n{}", "═══ Skipped Devices ═══".yellow().bold());
        for skipped in &report.skipped {
            println!(
                "  {} {} ({}: {})",
                "-".dimmed(),
                skipped.address,
                skipped.attribute,
                skipped.reason
            );
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}

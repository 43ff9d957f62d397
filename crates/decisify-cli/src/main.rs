//! `decisify` – runs the decision engine from the command line.
//!
//! 1. Initialises tracing (optionally exporting spans over OTLP).
//! 2. Loads `~/.decisify/config.toml` plus `DECISIFY_*` overrides.
//! 3. Runs the orchestrator over the built-in simulated sources until
//!    Ctrl-C or `max_cycles`.
//! 4. Prints the final status and metrics as JSON.
//!
//! `decisify --init` writes a default config file and exits.

mod config;

use colored::Colorize;
use decisify_perception::default_sources;
use decisify_runtime::{Orchestrator, Readout, init_tracing};
use tracing::warn;

fn main() {
    let _telemetry = init_tracing("decisify");

    print_banner();

    let arg = std::env::args().nth(1);
    match arg.as_deref() {
        Some("--help") | Some("-h") => {
            print_usage();
            return;
        }
        Some("--init") => {
            let path = config::config_path();
            match config::save_to(&config::Settings::default(), &path) {
                Ok(()) => println!(
                    "  {} Config saved to {}\n",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => {
                    println!("{}: {}", "Error saving config".red(), e);
                    std::process::exit(1);
                }
            }
            return;
        }
        Some(other) => {
            println!("{}: {}\n", "Unknown argument".red(), other);
            print_usage();
            std::process::exit(2);
        }
        None => {}
    }

    let settings = match config::load() {
        Ok(s) => {
            println!(
                "  Config: {}",
                config::config_path().display().to_string().dimmed()
            );
            s
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut s = config::Settings::default();
            config::apply_env_overrides(&mut s);
            s
        }
    };

    if let Err(e) = run(settings) {
        println!("{}: {}", "Decisify stopped with an error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(settings: config::Settings) -> Result<(), String> {
    let orchestrator_config = settings.to_orchestrator_config().map_err(|e| e.to_string())?;
    let metrics = orchestrator_config.new_metrics();
    let orchestrator = Orchestrator::new(orchestrator_config, default_sources(), metrics)
        .map_err(|e| e.to_string())?;
    let handle = orchestrator.handle();

    let ctrlc_handle = handle.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – finishing the current cycle …".yellow().bold()
        );
        ctrlc_handle.stop();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop with max_cycles instead");
    }

    println!(
        "  Running every {:.1}s  (temperature {}, {} fusion)\n",
        settings.cycle_interval_secs,
        settings.agent_temperature,
        format!("{:?}", settings.fusion_variant).to_lowercase()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start the Tokio runtime: {}", e))?;
    let outcome = runtime.block_on(orchestrator.run());

    print_summary(&handle);
    outcome.map_err(|e| e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(handle: &decisify_runtime::OrchestratorHandle) {
    let api = handle.read_api();
    println!();
    match api.status() {
        Readout::Ready(report) => {
            println!(
                "  {} after {} cycle(s): {}",
                "Last decision".bold(),
                report.cycle_count,
                if report.thought.is_safe {
                    report.thought.action.to_string().green().bold()
                } else {
                    report.thought.action.to_string().yellow().bold()
                }
            );
            print_json("status", &report);
        }
        Readout::NotReady => println!("  {}", "No cycle completed.".dimmed()),
    }
    print_json("metrics", &api.metrics());
    println!("  {}", "✓ Exiting Decisify.".green());
}

fn print_json<T: serde::Serialize>(label: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("\n  {}\n{}", label.bold().cyan(), json),
        Err(e) => warn!(error = %e, label, "Failed to serialize summary"),
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"    ___           _      _  ____     "#.bold().cyan());
    println!("{}", r#"   / _ \___ ____(_)__ (_)/ _/_ __   "#.bold().cyan());
    println!("{}", r#"  / // / -_) __/ (_-</ / _/ // /   "#.bold().cyan());
    println!("{}", r#" /____/\__/\__/_/___/_/_/ \_, /    "#.bold().cyan());
    println!("{}", r#"                         /___/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Decisify".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Signal fusion with a safety gate");
    println!();
}

fn print_usage() {
    println!("  Usage: decisify [--init | --help]");
    println!();
    println!(
        "    {}   write a default config to {}",
        "--init".bold(),
        config::config_path().display()
    );
    println!("    {}   show this message", "--help".bold());
    println!();
    println!("  Settings are read from the config file, then overridden by");
    println!("  DECISIFY_* environment variables (see DECISIFY_CYCLE_INTERVAL,");
    println!("  DECISIFY_AGENT_TEMPERATURE, DECISIFY_MAX_CYCLES, ...).");
}

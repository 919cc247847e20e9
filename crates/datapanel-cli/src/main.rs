//! `datapanel` command line front end

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use datapanel_engine::{EngineConfig, Evaluator, PanelResult, ProjectController};
use datapanel_model::{normalize_with_report, PanelInfo, ProjectState};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Longest value preview printed per panel
const PREVIEW_CHARS: usize = 120;

fn cli() -> Command {
    Command::new("datapanel")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run and maintain DataPanel project documents")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration file (TOML)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("new")
                .about("Write the example project")
                .arg(out_arg()),
        )
        .subcommand(
            Command::new("normalize")
                .about("Bring a project document up to the current schema")
                .arg(file_arg())
                .arg(out_arg()),
        )
        .subcommand(
            Command::new("run")
                .about("Run one panel or a whole page")
                .arg(file_arg())
                .arg(
                    Arg::new("page")
                        .long("page")
                        .default_value("0")
                        .value_parser(value_parser!(usize))
                        .help("Page position"),
                )
                .arg(
                    Arg::new("panel")
                        .long("panel")
                        .value_parser(value_parser!(usize))
                        .help("Panel position (default: every panel in order)"),
                ),
        )
}

fn file_arg() -> Arg {
    Arg::new("file")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Project document (JSON)")
}

fn out_arg() -> Arg {
    Arg::new("out")
        .long("out")
        .value_parser(value_parser!(PathBuf))
        .help("Output file (default: stdout)")
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<EngineConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn read_document(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_output(out: Option<&PathBuf>, text: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => std::fs::write(path, format!("{text}\n"))
            .with_context(|| format!("writing {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn preview(value: &serde_json::Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= PREVIEW_CHARS {
        text
    } else {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}

/// One line per panel: position, name, kind, then outcome
fn render_result(index: usize, panel: &PanelInfo, result: &PanelResult) -> String {
    let outcome = match (&result.exception, &result.value) {
        (Some(exception), _) => format!("error: {exception}"),
        (None, Some(value)) => preview(value),
        (None, None) => "not run".to_string(),
    };
    let when = result
        .last_run
        .map(|t| format!(" (last run {})", t.to_rfc3339()))
        .unwrap_or_default();
    format!("[{index}] {} <{}>{when}: {outcome}", panel.name, panel.kind())
}

fn cmd_new(args: &ArgMatches) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(&ProjectState::example())?;
    write_output(args.get_one::<PathBuf>("out"), &text)
}

fn cmd_normalize(args: &ArgMatches) -> anyhow::Result<()> {
    let Some(file) = args.get_one::<PathBuf>("file") else {
        bail!("missing project file");
    };
    let normalized = normalize_with_report(&read_document(file)?);
    for issue in &normalized.issues {
        eprintln!("repaired {issue}");
    }
    let text = serde_json::to_string_pretty(&normalized.state)?;
    write_output(args.get_one::<PathBuf>("out"), &text)
}

async fn cmd_run(args: &ArgMatches, config: EngineConfig) -> anyhow::Result<()> {
    let Some(file) = args.get_one::<PathBuf>("file") else {
        bail!("missing project file");
    };
    let raw = read_document(file)?;
    let controller = ProjectController::from_raw(&raw, Evaluator::new(config));

    let state = controller.snapshot();
    let page_index = args.get_one::<usize>("page").copied().unwrap_or(0);
    let Some(page) = state.pages.get(page_index) else {
        bail!("project has {} pages, no page {page_index}", state.pages.len());
    };

    let results = match args.get_one::<usize>("panel").copied() {
        Some(index) => {
            controller.run_panel(&page.id, index).await?;
            controller.results(&page.id)?
        }
        None => controller.run_page(&page.id).await?,
    };

    println!("{} / {}", state.project_name, page.name);
    for (index, (panel, result)) in page.panels.iter().zip(&results).enumerate() {
        println!("{}", render_result(index, panel, result));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));

    let outcome = match load_config(&matches) {
        Ok(config) => match matches.subcommand() {
            Some(("new", args)) => cmd_new(args),
            Some(("normalize", args)) => cmd_normalize(args),
            Some(("run", args)) => cmd_run(args, config).await,
            _ => Err(anyhow::anyhow!("unknown command")),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        tracing::error!(error = %format!("{e:#}"), "command failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

use std::path::PathBuf;
use std::time::Duration;

use geoview_lib::bus::payloads::Section;
use geoview_lib::{
    init_tracing, HistoryEntry, HistoryFilter, Mirror, MirrorSnapshot, SchedulerStats, ViewState, Viewer,
    ViewerConfig,
};
use serde::{Deserialize, Serialize};

const DEFAULT_SETTLE_MS: u64 = 1_000;

/// One scripted step. `action` selects the variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ScriptStep {
    SelectNodes {
        node_ids: Vec<String>,
        #[serde(default)]
        additive: bool,
    },
    DeselectNodes {
        node_ids: Vec<String>,
    },
    ClearSelection,
    FocusNode {
        node_id: String,
    },
    ExitFocus,
    SelectSection {
        section_id: String,
    },
    DeselectSection {
        section_id: String,
    },
    IsolateSections {
        section_ids: Vec<String>,
    },
    ClearIsolation,
    HighlightSection {
        section_id: String,
        #[serde(default = "default_true")]
        highlighted: bool,
    },
    ToggleNode {
        node_id: String,
    },
    SetVisibility {
        node_ids: Vec<String>,
        visible: bool,
    },
    Search {
        query: String,
    },
    UpdateViewport {
        camera: serde_json::Value,
    },
    BeginModelLoad {
        model_id: String,
        #[serde(default)]
        source: Option<String>,
    },
    CompleteModelLoad {
        model_id: String,
        #[serde(default)]
        sections: Vec<Section>,
    },
    FailModelLoad {
        model_id: String,
        #[serde(default)]
        error: String,
    },
    UnloadModel {
        #[serde(default)]
        model_id: Option<String>,
    },
    Snapshot,
    Restore,
    Wait {
        ms: u64,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    steps: usize,
    rejected_steps: Vec<usize>,
    history: Vec<HistoryEntry>,
    state: Mirror,
    view: ViewState,
    stats: SchedulerStats,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(error) = run().await {
        eprintln!("event replay failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let mut script_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut settle_ms = DEFAULT_SETTLE_MS;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(());
        }

        if let Some(value) = arg.strip_prefix("--script=") {
            script_path = Some(PathBuf::from(value));
            continue;
        }
        if arg == "--script" {
            let value = args.next().ok_or_else(|| "--script requires a value".to_string())?;
            script_path = Some(PathBuf::from(value));
            continue;
        }

        if let Some(value) = arg.strip_prefix("--config=") {
            config_path = Some(PathBuf::from(value));
            continue;
        }
        if arg == "--config" {
            let value = args.next().ok_or_else(|| "--config requires a value".to_string())?;
            config_path = Some(PathBuf::from(value));
            continue;
        }

        if let Some(value) = arg.strip_prefix("--output=") {
            output_path = Some(PathBuf::from(value));
            continue;
        }
        if arg == "--output" {
            let value = args.next().ok_or_else(|| "--output requires a value".to_string())?;
            output_path = Some(PathBuf::from(value));
            continue;
        }

        if let Some(value) = arg.strip_prefix("--settle-ms=") {
            settle_ms = parse_millis(value)?;
            continue;
        }
        if arg == "--settle-ms" {
            let value = args.next().ok_or_else(|| "--settle-ms requires a value".to_string())?;
            settle_ms = parse_millis(&value)?;
            continue;
        }

        return Err(format!("unknown argument '{arg}'. Use --help for usage"));
    }

    let script_path = script_path.ok_or_else(|| "--script is required".to_string())?;
    let config = ViewerConfig::load(config_path.as_deref()).map_err(|error| error.to_string())?;
    init_tracing(&config.log_filter);

    let raw = std::fs::read_to_string(&script_path)
        .map_err(|error| format!("failed to read '{}': {error}", script_path.display()))?;
    let steps: Vec<ScriptStep> = serde_json::from_str(&raw)
        .map_err(|error| format!("failed to parse script '{}': {error}", script_path.display()))?;

    let viewer = Viewer::new(&config).map_err(|error| error.to_string())?;
    let mut snapshot: Option<MirrorSnapshot> = None;
    let mut rejected_steps = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        tracing::debug!(step = index, ?step, "replaying");
        let accepted = match step {
            ScriptStep::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                true
            }
            ScriptStep::Snapshot => {
                snapshot = Some(viewer.coordinator.create_snapshot());
                true
            }
            ScriptStep::Restore => match &snapshot {
                Some(snapshot) => {
                    viewer.coordinator.restore_snapshot(snapshot);
                    true
                }
                None => {
                    tracing::warn!(step = index, "restore without a prior snapshot");
                    false
                }
            },
            other => apply_action(&viewer, other),
        };
        if !accepted {
            rejected_steps.push(index);
        }
    }

    tokio::time::sleep(Duration::from_millis(settle_ms)).await;

    let report = ReplayReport {
        steps: steps.len(),
        rejected_steps,
        history: viewer.scheduler.history(&HistoryFilter::default()),
        state: viewer.coordinator.current_state(),
        view: viewer.actions.view_state(),
        stats: viewer.scheduler.stats(),
    };
    viewer.shutdown();

    let output_json = serde_json::to_string_pretty(&report)
        .map_err(|error| format!("failed to serialize replay output: {error}"))?;
    match output_path {
        Some(path) => {
            std::fs::write(&path, output_json)
                .map_err(|error| format!("failed to write '{}': {error}", path.display()))?;
            println!("Saved replay output to {}", path.display());
        }
        None => println!("{output_json}"),
    }
    Ok(())
}

fn apply_action(viewer: &Viewer, step: &ScriptStep) -> bool {
    let actions = &viewer.actions;
    match step {
        ScriptStep::SelectNodes { node_ids, additive } => actions.select_nodes(node_ids.iter().cloned(), *additive),
        ScriptStep::DeselectNodes { node_ids } => actions.deselect_nodes(node_ids.iter().cloned()),
        ScriptStep::ClearSelection => actions.clear_selection(),
        ScriptStep::FocusNode { node_id } => actions.focus_node(node_id),
        ScriptStep::ExitFocus => actions.exit_focus(),
        ScriptStep::SelectSection { section_id } => actions.select_section(section_id),
        ScriptStep::DeselectSection { section_id } => actions.deselect_section(section_id),
        ScriptStep::IsolateSections { section_ids } => actions.isolate_sections(section_ids.iter().cloned()),
        ScriptStep::ClearIsolation => actions.clear_isolation(),
        ScriptStep::HighlightSection {
            section_id,
            highlighted,
        } => actions.highlight_section(section_id, *highlighted),
        ScriptStep::ToggleNode { node_id } => actions.toggle_node(node_id),
        ScriptStep::SetVisibility { node_ids, visible } => actions.set_visibility(node_ids.iter().cloned(), *visible),
        ScriptStep::Search { query } => actions.search(query),
        ScriptStep::UpdateViewport { camera } => actions.update_viewport(camera.clone()),
        ScriptStep::BeginModelLoad { model_id, source } => actions.begin_model_load(model_id, source.as_deref()),
        ScriptStep::CompleteModelLoad { model_id, sections } => {
            actions.complete_model_load(model_id, sections.clone())
        }
        ScriptStep::FailModelLoad { model_id, error } => actions.fail_model_load(model_id, error),
        ScriptStep::UnloadModel { model_id } => actions.unload_model(model_id.as_deref()),
        ScriptStep::Snapshot | ScriptStep::Restore | ScriptStep::Wait { .. } => true,
    }
}

fn parse_millis(value: &str) -> Result<u64, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid millisecond value '{value}'"))
}

fn print_help() {
    println!("Replay a scripted sequence of viewer actions");
    println!();
    println!("Usage:");
    println!("  cargo run --bin event_replay -- --script <file.json> [options]");
    println!();
    println!("Options:");
    println!("  --script <file>      JSON array of steps, e.g. {{\"action\": \"search\", \"query\": \"bolt\"}}");
    println!("  --config <file>      Viewer config JSON (default: $GEOVIEW_CONFIG or built-in defaults)");
    println!("  --output <file>      Write the report here instead of stdout");
    println!("  --settle-ms <n>      Time to let timers finish after the last step (default: 1000)");
    println!("  -h, --help           Show this help");
}

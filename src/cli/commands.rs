use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    app::{get_config_dir, init_config, BackendKind, CacheSettings, Config},
    board::{load_tasks, BoardSummary, Dashboard, DashboardStores, MoodMessage, Task},
    cache::{
        CacheEntry, FileBackend, Fingerprint, KeyValueStore, MemoryBackend, PendingPolicy,
        Resolution,
    },
    models::{Model, UnifiedModel},
    utils::InsightCacheError,
};

use super::{Artifact, Cli, Commands, OutputFormat};

/// Handle CLI subcommands
///
/// Returns `false` when any requested artifact failed to generate.
pub async fn handle_command(cli: &Cli, config: &Config) -> Result<bool> {
    match &cli.command {
        Commands::Resolve {
            tasks,
            artifact,
            stale_while_pending,
        } => {
            let tasks = load_tasks(tasks)?;
            let mut dashboard = build_dashboard(config)?;
            if *stale_while_pending {
                dashboard = dashboard.with_pending_policy(PendingPolicy::Stale);
            }

            let report = resolve_artifacts(&dashboard, &tasks, *artifact).await;
            println!("{}", format_report(&report, cli.output_format));
            Ok(!report.has_failures())
        }
        Commands::Fingerprint { tasks, artifact } => {
            let tasks = load_tasks(tasks)?;
            let dashboard = build_dashboard(config)?;
            show_fingerprints(&dashboard, &tasks, *artifact, cli.output_format)?;
            Ok(true)
        }
        Commands::Show { artifact } => {
            let dashboard = build_dashboard(config)?;
            show_stored(&dashboard, *artifact, cli.output_format);
            Ok(true)
        }
        Commands::Clear { artifact } => {
            let dashboard = build_dashboard(config)?;
            if artifact.includes_insight() {
                dashboard.clear_insight();
                println!("Cleared insight");
            }
            if artifact.includes_mood() {
                dashboard.clear_mood();
                println!("Cleared mood message");
            }
            Ok(true)
        }
        Commands::Summary { tasks } => {
            let tasks = load_tasks(tasks)?;
            let summary = BoardSummary::of(&tasks, Local::now().naive_local());
            match cli.output_format {
                OutputFormat::Json => println!("{}", to_json(&summary)),
                OutputFormat::Text => println!("{}", format_summary(&summary)),
            }
            Ok(true)
        }
        Commands::Status => {
            show_status(config).await?;
            Ok(true)
        }
        Commands::Init => {
            println!("Initializing insight-cache configuration...");
            let (path, created) = init_config()?;
            if created {
                println!("Configuration written to {}", path.display());
            } else {
                println!("Configuration already exists at {}", path.display());
            }
            Ok(true)
        }
    }
}

/// Open the configured key-value backend
///
/// An unusable cache directory degrades to an in-memory backend: the
/// dashboard keeps working, it just regenerates on the next run.
pub fn open_backend(settings: &CacheSettings) -> Result<Arc<dyn KeyValueStore>> {
    match settings.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::File => {
            let dir = settings.resolved_dir()?;
            match FileBackend::open(dir.clone()) {
                Ok(backend) => Ok(Arc::new(backend)),
                Err(e) => {
                    warn!(
                        "Cache directory {} unusable ({}), keeping entries in memory",
                        dir.display(),
                        e
                    );
                    Ok(Arc::new(MemoryBackend::new()))
                }
            }
        }
    }
}

/// Dashboard wired to the configured store and model proxy
pub fn build_dashboard(config: &Config) -> Result<Dashboard> {
    if config.cache.namespace.trim().is_empty() {
        return Err(
            InsightCacheError::ConfigError("cache.namespace must not be empty".to_string()).into(),
        );
    }

    let backend = open_backend(&config.cache)?;
    let stores = DashboardStores::persistent(backend, &config.cache.namespace, config.cache.encoding);
    let model: Arc<dyn Model> =
        Arc::new(UnifiedModel::new(&config.model).context("Failed to create model client")?);

    Ok(Dashboard::with_model(
        stores,
        model,
        config.model.completion_options(),
        config.model.timeout(),
    )
    .with_pending_policy(config.cache.pending))
}

/// One artifact's outcome, as printed by `resolve`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReport<V> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<V>,
    /// The value predates the current fingerprint
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<V: Clone> ArtifactReport<V> {
    pub fn new(resolution: &Resolution<V>, fingerprint: Option<&Fingerprint>) -> Self {
        let error = match resolution {
            Resolution::MissFailed { error, .. } => Some(error.to_string()),
            _ => None,
        };
        let stale = matches!(
            resolution,
            Resolution::MissFailed { stale: Some(_), .. } | Resolution::Pending { stale: Some(_) }
        );

        Self {
            status: resolution.status(),
            fingerprint: fingerprint.map(Fingerprint::digest),
            value: resolution.value().cloned(),
            stale,
            error,
        }
    }

    fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of a `resolve` run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReport {
    pub summary: BoardSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight: Option<ArtifactReport<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<ArtifactReport<MoodMessage>>,
}

impl ResolveReport {
    pub fn has_failures(&self) -> bool {
        self.insight.as_ref().is_some_and(ArtifactReport::failed)
            || self.mood.as_ref().is_some_and(ArtifactReport::failed)
    }
}

pub async fn resolve_artifacts(
    dashboard: &Dashboard,
    tasks: &[Task],
    artifact: Artifact,
) -> ResolveReport {
    let insight_fingerprint = dashboard.insight_fingerprint(tasks).ok();
    let mood_fingerprint = dashboard.mood_fingerprint(tasks).ok();

    let (summary, insight, mood) = match artifact {
        Artifact::All => {
            let report = dashboard.refresh(tasks).await;
            (report.summary, Some(report.insight), Some(report.mood))
        }
        Artifact::Insight => (
            BoardSummary::of(tasks, Local::now().naive_local()),
            Some(dashboard.insight(tasks).await),
            None,
        ),
        Artifact::Mood => (
            BoardSummary::of(tasks, Local::now().naive_local()),
            None,
            Some(dashboard.mood(tasks).await),
        ),
    };

    let report = ResolveReport {
        summary,
        insight: insight.map(|r| ArtifactReport::new(&r, insight_fingerprint.as_ref())),
        mood: mood.map(|r| ArtifactReport::new(&r, mood_fingerprint.as_ref())),
    };
    info!("Resolved {} tasks, failures: {}", tasks.len(), report.has_failures());
    report
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize result: {}\"}}", e))
}

fn format_summary(summary: &BoardSummary) -> String {
    format!(
        "Board: {} tasks ({} todo, {} in progress, {} done, {} overdue), {}% complete",
        summary.total,
        summary.todo,
        summary.in_progress,
        summary.done,
        summary.overdue,
        summary.completion_rate
    )
}

fn status_label(status: &str) -> String {
    let label = format!("[{}]", status.to_uppercase());
    match status {
        "hit" => label.green().to_string(),
        "miss-resolved" => label.cyan().to_string(),
        "miss-failed" => label.red().to_string(),
        "pending" | "superseded" | "uncached" => label.yellow().to_string(),
        _ => label.dimmed().to_string(),
    }
}

fn format_artifact<V>(
    name: &str,
    report: &ArtifactReport<V>,
    render: impl Fn(&V) -> String,
) -> String {
    let mut output = format!(
        "{} {} {}\n",
        status_label(report.status),
        name.bold(),
        report.fingerprint.as_deref().map_or("-", |digest| &digest[..12])
    );
    if let Some(error) = &report.error {
        output.push_str(&format!("  error: {}\n", error));
    }
    if let Some(value) = &report.value {
        let prefix = if report.stale { "  (stale) " } else { "  " };
        output.push_str(&format!("{}{}\n", prefix, render(value)));
    }
    output
}

pub fn format_report(report: &ResolveReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Text => {
            let mut output = format_summary(&report.summary);
            output.push_str("\n\n");
            if let Some(insight) = &report.insight {
                output.push_str(&format_artifact("insight", insight, |text| text.clone()));
            }
            if let Some(mood) = &report.mood {
                output.push_str(&format_artifact("mood", mood, |m| {
                    format!("{} [{}]", m.message, m.mood)
                }));
            }
            output.trim_end().to_string()
        }
    }
}

fn show_fingerprints(
    dashboard: &Dashboard,
    tasks: &[Task],
    artifact: Artifact,
    format: OutputFormat,
) -> Result<()> {
    let mut fingerprints = Vec::new();
    if artifact.includes_insight() {
        let fp = dashboard
            .insight_fingerprint(tasks)
            .context("Failed to fingerprint tasks for insight")?;
        fingerprints.push(("insight", fp));
    }
    if artifact.includes_mood() {
        let fp = dashboard
            .mood_fingerprint(tasks)
            .context("Failed to fingerprint tasks for mood")?;
        fingerprints.push(("mood", fp));
    }

    match format {
        OutputFormat::Json => {
            let body: serde_json::Map<String, serde_json::Value> = fingerprints
                .iter()
                .map(|(name, fp)| {
                    (
                        name.to_string(),
                        json!({ "digest": fp.digest(), "canonical": fp.as_str() }),
                    )
                })
                .collect();
            println!("{}", to_json(&body));
        }
        OutputFormat::Text => {
            for (name, fp) in &fingerprints {
                println!("{:<8} {}", name, fp.digest());
            }
        }
    }
    Ok(())
}

fn format_entry<V>(name: &str, entry: Option<&CacheEntry<V>>, render: impl Fn(&V) -> String) -> String {
    match entry {
        Some(entry) => format!(
            "{} {} (stored {})\n  {}",
            name.bold(),
            entry.fingerprint,
            entry.stored_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            render(&entry.value)
        ),
        None => format!("{} {}", name.bold(), "not cached".dimmed()),
    }
}

fn show_stored(dashboard: &Dashboard, artifact: Artifact, format: OutputFormat) {
    let insight = artifact
        .includes_insight()
        .then(|| dashboard.stored_insight());
    let mood = artifact.includes_mood().then(|| dashboard.stored_mood());

    match format {
        OutputFormat::Json => {
            let mut body = serde_json::Map::new();
            if let Some(entry) = &insight {
                body.insert("insight".to_string(), json!(entry));
            }
            if let Some(entry) = &mood {
                body.insert("mood".to_string(), json!(entry));
            }
            println!("{}", to_json(&body));
        }
        OutputFormat::Text => {
            if let Some(entry) = &insight {
                println!("{}", format_entry("insight", entry.as_ref(), |text| text.clone()));
            }
            if let Some(entry) = &mood {
                println!(
                    "{}",
                    format_entry("mood", entry.as_ref(), |m| format!("{} [{}]", m.message, m.mood))
                );
            }
        }
    }
}

/// Show configuration, storage and proxy health
async fn show_status(config: &Config) -> Result<()> {
    println!("insight-cache Status:");
    println!();

    let config_path = get_config_dir()?.join("config.toml");
    if config_path.exists() {
        println!("  [OK] Configuration: {}", config_path.display());
    } else {
        println!("  [WARNING] Configuration: Not found (using defaults)");
    }

    match config.cache.backend {
        BackendKind::Memory => println!("  [OK] Cache: in memory (nothing persists)"),
        BackendKind::File => {
            let dir = config.cache.resolved_dir()?;
            match FileBackend::open(dir.clone()) {
                Ok(backend) => println!("  [OK] Cache: {}", backend.cache_dir().display()),
                Err(e) => println!("  [ERROR] Cache: {} ({})", dir.display(), e),
            }
        }
    }
    println!("      namespace: {}", config.cache.namespace);

    let model = UnifiedModel::new(&config.model)?;
    if model.validate_connection().await.unwrap_or(false) {
        println!("  [OK] Model proxy: Running at {}", model.proxy_url());
    } else {
        println!("  [ERROR] Model proxy: Not reachable at {}", model.proxy_url());
    }
    println!("      model: {}", model.name());

    if std::env::var(&config.model.master_key_env).is_ok() {
        println!("      {}: Set", config.model.master_key_env);
    } else {
        println!("      {}: Not set", config.model.master_key_env);
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Mood, TaskStatus};
    use crate::cache::{CacheStore, GenerationError, PersistentStore};
    use crate::constants::MOOD_CACHE_KEY;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    fn file_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.cache.dir = Some(dir.to_path_buf());
        config.cache.namespace = "test".to_string();
        config
    }

    fn write_tasks(dir: &Path, tasks: &[Task]) -> String {
        let path = dir.join("tasks.json");
        std::fs::write(&path, serde_json::to_string(tasks).unwrap()).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_artifact_report_for_failure_keeps_stale_value() {
        let fp = Fingerprint::compute(&[1u32][..], &|n: &u32| json!(n)).unwrap();
        let resolution: Resolution<String> = Resolution::MissFailed {
            error: GenerationError::Failed("proxy down".to_string()),
            stale: Some("old insight".to_string()),
        };

        let report = ArtifactReport::new(&resolution, Some(&fp));
        assert_eq!(report.status, "miss-failed");
        assert_eq!(report.value.as_deref(), Some("old insight"));
        assert!(report.stale);
        assert_eq!(report.error.as_deref(), Some("generation failed: proxy down"));
        assert_eq!(report.fingerprint, Some(fp.digest()));
    }

    #[test]
    fn test_report_failure_detection_and_json() {
        let fp = Fingerprint::compute(&[1u32][..], &|n: &u32| json!(n)).unwrap();
        let report = ResolveReport {
            summary: BoardSummary::of(&[], Local::now().naive_local()),
            insight: Some(ArtifactReport::new(
                &Resolution::Hit { value: "fine".to_string() },
                Some(&fp),
            )),
            mood: Some(ArtifactReport::new(
                &Resolution::MissFailed {
                    error: GenerationError::Malformed("no JSON".to_string()),
                    stale: None::<MoodMessage>,
                },
                Some(&fp),
            )),
        };
        assert!(report.has_failures());

        let parsed: serde_json::Value =
            serde_json::from_str(&format_report(&report, OutputFormat::Json)).unwrap();
        assert_eq!(parsed["insight"]["status"], json!("hit"));
        assert_eq!(parsed["insight"]["stale"], json!(false));
        assert_eq!(parsed["mood"]["status"], json!("miss-failed"));
        assert!(parsed["mood"].get("value").is_none());
    }

    #[test]
    fn test_unusable_cache_dir_falls_back_to_memory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let config = file_config(&blocker.join("cache"));
        let backend = open_backend(&config.cache).unwrap();
        backend.set("k", b"v").unwrap();
        assert_eq!(backend.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_empty_namespace_is_rejected() {
        let mut config = Config::default();
        config.cache.backend = BackendKind::Memory;
        config.cache.namespace = "  ".to_string();
        assert!(build_dashboard(&config).is_err());
    }

    #[tokio::test]
    async fn test_resolve_empty_board_succeeds_without_model() {
        let temp_dir = TempDir::new().unwrap();
        let tasks = write_tasks(temp_dir.path(), &[]);
        let config = file_config(&temp_dir.path().join("cache"));

        let cli = Cli::parse_from(["insight-cache", "resolve", "--tasks", &tasks]);
        assert!(handle_command(&cli, &config).await.unwrap());

        let dashboard = build_dashboard(&config).unwrap();
        let report = resolve_artifacts(&dashboard, &[], Artifact::All).await;
        assert_eq!(report.insight.unwrap().status, "empty");
        assert_eq!(report.mood.unwrap().status, "empty");
    }

    #[tokio::test]
    async fn test_clear_removes_stored_entries() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path().join("cache");
        let config = file_config(&cache_dir);
        let tasks = vec![Task::new("1", "Item 1", TaskStatus::Todo)];

        let dashboard = build_dashboard(&config).unwrap();
        let backend: Arc<dyn KeyValueStore> = Arc::new(FileBackend::open(cache_dir).unwrap());
        let store = PersistentStore::<MoodMessage>::new(backend, "test");
        store.set(&CacheEntry::new(
            MOOD_CACHE_KEY,
            dashboard.mood_fingerprint(&tasks).unwrap(),
            MoodMessage {
                message: "Keep going.".to_string(),
                mood: Mood::Motivational,
            },
        ));
        assert!(dashboard.stored_mood().is_some());

        let cli = Cli::parse_from(["insight-cache", "clear", "--artifact", "mood"]);
        assert!(handle_command(&cli, &config).await.unwrap());
        assert!(dashboard.stored_mood().is_none());
    }

    #[tokio::test]
    async fn test_fingerprint_and_summary_commands() {
        let temp_dir = TempDir::new().unwrap();
        let tasks = write_tasks(
            temp_dir.path(),
            &[Task::new("1", "Item 1", TaskStatus::Done)],
        );
        let config = file_config(&temp_dir.path().join("cache"));

        for args in [
            vec!["insight-cache", "fingerprint", "--tasks", tasks.as_str()],
            vec!["insight-cache", "--output-format", "json", "summary", "--tasks", tasks.as_str()],
            vec!["insight-cache", "show"],
        ] {
            let cli = Cli::parse_from(args);
            assert!(handle_command(&cli, &config).await.unwrap());
        }
    }
}

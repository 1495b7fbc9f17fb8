mod api;
mod catalog;
mod cli;
mod config;
mod db;
mod export;
mod leaderboard;
mod profile;
mod progress;
mod remote;

use crate::catalog::QuestCatalog;
use crate::cli::onboard::run_onboarding;
use crate::cli::{Cli, Commands, ConfigCommands, ProfileCommands, SettingsCommands};
use crate::config::Config;
use crate::leaderboard::LeaderboardRange;
use crate::profile::store::{ProfileStore, SettingsUpdate};
use crate::progress::badges;
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            let _ = run_onboarding()?;
            Ok(())
        }
        Commands::Config { command } => handle_config_command(command),
        Commands::Profile { command } => handle_profile_command(command),
        Commands::Quests { category } => handle_quests(category),
        Commands::Complete { quest_id, person } => handle_complete(&quest_id, person),
        Commands::Status { person } => handle_status(person),
        Commands::History { person, date } => handle_history(person, date),
        Commands::Settings { person, command } => handle_settings_command(person, command),
        Commands::Export { person, output } => handle_export(person, output),
        Commands::Leaderboard { range } => handle_leaderboard(&range),
        Commands::Serve => handle_serve().await,
        Commands::Doctor => handle_doctor(),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if key.contains("api_key") {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_or_default_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_profile_command(command: ProfileCommands) -> Result<()> {
    let config = load_or_default_config()?;
    let store = open_store(&config)?;

    match command {
        ProfileCommands::List => {
            let profiles = store.profiles()?;
            if profiles.is_empty() {
                println!("No profiles yet. Add one with `questlog profile add <name>`.");
            }
            profiles.iter().for_each(|name| println!("{name}"));
        }
        ProfileCommands::Add { name } => {
            let state = store.add_profile(&name)?;
            println!(
                "Profile ready: {} (level {}, {} xp)",
                state.name, state.level, state.xp
            );
        }
        ProfileCommands::Remove { name } => {
            if store.remove_profile(&name)? {
                println!("Removed {name} from the list. Saved progress is kept.");
            } else {
                println!("{name} is not in the profile list");
            }
        }
    }

    store.close()
}

fn handle_quests(category: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let catalog = load_catalog(&config)?;

    println!("Categories: {}", catalog.categories().join(", "));
    for quest in catalog.filtered(category.as_deref()) {
        println!(
            "{} {:<32} {:>4} pts  [{}]  id={}",
            quest.icon, quest.title, quest.points, quest.category, quest.id
        );
    }

    Ok(())
}

fn handle_complete(quest_id: &str, person: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let store = open_store(&config)?;
    let sink = remote::connect(&config);
    let name = store.resolve_person(person.as_deref())?;
    let today = Local::now().date_naive();

    let completion = store.complete_quest(&name, quest_id, today)?;
    store.close()?;

    println!(
        "+{} {} ({})",
        completion.entry.points, completion.entry.title, completion.entry.category
    );
    print_stats(&completion.state, today);

    sink.write(&completion.remote_activity());
    Ok(())
}

fn handle_status(person: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let store = open_store(&config)?;
    let name = store.resolve_person(person.as_deref())?;
    let state = store.load(&name)?;
    store.close()?;

    let today = Local::now().date_naive();
    println!("{name}");
    print_stats(&state, today);

    println!("Badges:");
    for badge in badges::evaluate(&state) {
        let mark = if badge.earned { "x" } else { " " };
        println!("  [{mark}] {} {}", badge.icon, badge.label);
    }

    println!(
        "Focus timer: work {}m, short break {}m, long break {}m",
        state.settings.work_minutes,
        state.settings.short_break_minutes,
        state.settings.long_break_minutes
    );

    Ok(())
}

fn handle_history(person: Option<String>, date: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let store = open_store(&config)?;
    let name = store.resolve_person(person.as_deref())?;
    let state = store.load(&name)?;
    store.close()?;

    let entries = match date {
        Some(raw) => progress::log::entries_on(&state.history, parse_date(&raw)?),
        None => state.history.clone(),
    };

    if entries.is_empty() {
        println!("No activity yet. Complete a quest!");
    }

    for entry in entries {
        println!(
            "{} {} {} {:<32} +{}",
            entry.date.format("%Y-%m-%d"),
            export::local_time(entry.timestamp),
            entry.icon,
            entry.title,
            entry.points
        );
    }

    Ok(())
}

fn handle_settings_command(person: Option<String>, command: SettingsCommands) -> Result<()> {
    let config = load_or_default_config()?;
    let store = open_store(&config)?;
    let name = store.resolve_person(person.as_deref())?;

    let settings = match command {
        SettingsCommands::Get => store.load(&name)?.settings,
        SettingsCommands::Set { key, value } => {
            let update = settings_update(&key, &value)?;
            let state = store.update_settings(&name, &update)?;
            println!("Settings saved for {name}");
            state.settings
        }
    };
    store.close()?;

    println!("daily_goal = {}", settings.daily_goal);
    println!("work_minutes = {}", settings.work_minutes);
    println!("short_break_minutes = {}", settings.short_break_minutes);
    println!("long_break_minutes = {}", settings.long_break_minutes);

    Ok(())
}

fn handle_export(person: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let config = load_or_default_config()?;
    let store = open_store(&config)?;
    let name = store.resolve_person(person.as_deref())?;
    let state = store.load(&name)?;
    store.close()?;

    let export_dir = output.unwrap_or_else(|| config.export_dir.clone());
    let path = export::write_history_csv(
        &name,
        &state.history,
        &export_dir,
        Local::now().date_naive(),
    )?;

    println!("Exported {} entries: {}", state.history.len(), path.display());
    Ok(())
}

fn handle_leaderboard(range: &str) -> Result<()> {
    let config = load_or_default_config()?;
    let range = range.parse::<LeaderboardRange>()?;
    let start = range.start_date(Local::now().date_naive());
    let sink = remote::connect(&config);

    let rows = leaderboard::leaderboard_since(sink.as_ref(), start);
    println!("Leaderboard since {start} ({range})");

    if rows.is_empty() {
        println!("No data yet.");
    }

    for (index, row) in rows.iter().enumerate() {
        println!("{:>3}. {:<24} {:>6}", index + 1, row.name, row.points);
    }

    Ok(())
}

async fn handle_serve() -> Result<()> {
    let config = load_or_default_config()?;
    let store = open_store(&config)?;
    let sink = remote::connect(&config);

    info!(backend = %sink.describe(), "starting dashboard");
    println!("Dashboard URL: http://127.0.0.1:{}", config.api_port);

    api::run_server(Arc::new(config), store, sink).await
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    match load_catalog(&config) {
        Ok(catalog) => println!(
            "[OK] quest catalog loaded: {} quests from {}",
            catalog.quests.len(),
            config.quests_path.display()
        ),
        Err(error) => {
            println!("[WARN] quest catalog invalid: {error}");
            issues.push("quest catalog invalid".to_string());
        }
    }

    match open_store(&config) {
        Ok(store) => {
            let listed = store.profiles().map(|names| names.len()).unwrap_or_default();
            let stored = store
                .stored_profile_names()
                .map(|names| names.len())
                .unwrap_or_default();
            println!(
                "[OK] SQLite reachable: {} ({listed} listed, {stored} stored profiles)",
                config.db_path.display()
            );
            store.close()?;
        }
        Err(error) => {
            println!("[WARN] SQLite check failed: {error}");
            issues.push("db unreachable".to_string());
        }
    }

    if config.export_dir.exists() {
        println!("[OK] export dir exists: {}", config.export_dir.display());
    } else {
        println!("[WARN] export dir missing: {}", config.export_dir.display());
        issues.push("export dir missing".to_string());
    }

    if config.remote_configured() {
        match remote::firestore::FirestoreSink::from_config(&config)
            .and_then(|sink| sink.session_token())
        {
            Ok(_) => println!("[OK] remote leaderboard reachable (anonymous session ready)"),
            Err(error) => {
                println!("[WARN] remote leaderboard unreachable: {error}");
                issues.push("remote unreachable".to_string());
            }
        }
    } else {
        println!("[OK] remote leaderboard disabled (local-only)");
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

fn print_stats(state: &profile::ProfileState, today: NaiveDate) {
    let stats = progress::stats(state, today);

    println!(
        "Today: {} / {} pts ({}%)",
        stats.today_points, stats.daily_goal, stats.goal_progress_percent
    );
    println!(
        "Level {} ({} / {} xp to next), total {} xp",
        stats.level, stats.xp_into_level, stats.xp_for_next_level, stats.xp
    );
    println!(
        "Current streak: {} day{}",
        stats.streak,
        if stats.streak == 1 { "" } else { "s" }
    );
    println!("Last 7 active days: {} pts", stats.last_7_active_days_points);
}

fn settings_update(key: &str, value: &str) -> Result<SettingsUpdate> {
    let number = || -> Result<i64> {
        value
            .trim()
            .parse::<i64>()
            .with_context(|| format!("{key} must be a number"))
    };

    let update = match key {
        "daily_goal" | "goal" => SettingsUpdate {
            daily_goal: Some(i64::from(progress::parse_daily_goal(value))),
            ..SettingsUpdate::default()
        },
        "work_minutes" | "timer.work" => SettingsUpdate {
            work_minutes: Some(number()?),
            ..SettingsUpdate::default()
        },
        "short_break_minutes" | "timer.short" => SettingsUpdate {
            short_break_minutes: Some(number()?),
            ..SettingsUpdate::default()
        },
        "long_break_minutes" | "timer.long" => SettingsUpdate {
            long_break_minutes: Some(number()?),
            ..SettingsUpdate::default()
        },
        _ => bail!(
            "Unsupported settings key: {key}. Supported keys: daily_goal|goal, work_minutes|timer.work, short_break_minutes|timer.short, long_break_minutes|timer.long"
        ),
    };

    Ok(update)
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format: {input}. Example: 2024-01-31"))
}

fn load_catalog(config: &Config) -> Result<QuestCatalog> {
    QuestCatalog::load(&config.quests_path).with_context(|| {
        format!(
            "Failed to load quest catalog: {}",
            config.quests_path.display()
        )
    })
}

fn open_store(config: &Config) -> Result<ProfileStore> {
    let catalog = load_catalog(config)?;
    ProfileStore::open(&config.db_path, catalog, config.default_daily_goal)
}

fn load_or_default_config() -> Result<Config> {
    let config = Config::load().or_else(|_| {
        let config = Config::default();
        config.save()?;
        Ok::<_, anyhow::Error>(config)
    })?;
    config.ensure_bootstrap_files()?;

    Ok(config)
}

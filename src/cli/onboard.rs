use crate::catalog::QuestCatalog;
use crate::config::{Config, default_export_dir, expand_home};
use crate::profile::store::ProfileStore;
use crate::progress::{MAX_DAILY_GOAL, MIN_DAILY_GOAL};
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, theme::ColorfulTheme};

pub fn run_onboarding() -> Result<Config> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to QuestLog onboarding.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();

    println!("\n[1/4] First profile");
    let name: String = Input::with_theme(&theme)
        .with_prompt("  Who is playing?")
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if input.trim().is_empty() {
                Err("Name must not be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()
        .context("Failed to read profile name")?;
    let name = name.trim().to_string();
    println!("  ✓ Profile: {name}");

    println!("\n[2/4] Daily goal");
    let daily_goal: u32 = Input::with_theme(&theme)
        .with_prompt(format!(
            "  Points per day ({MIN_DAILY_GOAL}-{MAX_DAILY_GOAL})"
        ))
        .default(100)
        .interact_text()
        .context("Failed to read daily goal")?;
    let daily_goal = crate::progress::clamp_daily_goal(i64::from(daily_goal));
    println!("  ✓ Daily goal: {daily_goal} pts");

    println!("\n[3/4] Export directory");
    let export_dir_input: String = Input::with_theme(&theme)
        .with_prompt("  Folder where CSV exports will be saved")
        .default(default_export_dir().display().to_string())
        .interact_text()
        .context("Failed to read export directory")?;
    let export_dir = expand_home(&export_dir_input);
    println!("  ✓ {}", export_dir.display());

    println!("\n[4/4] Shared leaderboard (optional)");
    println!("  Completions can be mirrored to a Firestore project for a team leaderboard.");

    let use_remote = Confirm::with_theme(&theme)
        .with_prompt("  Configure a Firestore project now?")
        .default(false)
        .interact()
        .context("Failed to read leaderboard choice")?;

    let mut config = Config {
        default_daily_goal: daily_goal,
        export_dir,
        ..Config::default()
    };

    if use_remote {
        let project: String = Input::with_theme(&theme)
            .with_prompt("  Firestore project id")
            .interact_text()
            .context("Failed to read project id")?;
        let api_key: String = Input::with_theme(&theme)
            .with_prompt("  Web API key")
            .interact_text()
            .context("Failed to read API key")?;

        config.set_value("remote.project_id", &project)?;
        config.set_value("remote.api_key", &api_key)?;
        println!("  ✓ Remote leaderboard configured");
    } else {
        println!("  ✓ Running local-only");
    }

    config.ensure_bootstrap_files()?;
    config.save()?;

    let catalog = QuestCatalog::load(&config.quests_path)?;
    let store = ProfileStore::open(&config.db_path, catalog, config.default_daily_goal)?;
    store.add_profile(&name)?;
    store.close()?;

    println!("\n──────────────────────────────────────────");
    println!("  Onboarding complete!");
    println!("  Run `questlog quests` to see what you can complete.");
    println!("──────────────────────────────────────────");

    Ok(config)
}

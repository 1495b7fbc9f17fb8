pub mod onboard;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "questlog",
    about = "Gamified activity tracker: quests, levels, streaks and leaderboards"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Onboard,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    Quests {
        #[arg(long)]
        category: Option<String>,
    },
    Complete {
        quest_id: String,
        #[arg(long)]
        person: Option<String>,
    },
    Status {
        #[arg(long)]
        person: Option<String>,
    },
    History {
        #[arg(long)]
        person: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
    Settings {
        #[arg(long)]
        person: Option<String>,
        #[command(subcommand)]
        command: SettingsCommands,
    },
    Export {
        #[arg(long)]
        person: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Leaderboard {
        #[arg(long, default_value = "week")]
        range: String,
    },
    Serve,
    Doctor,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    List,
    Add { name: String },
    Remove { name: String },
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommands {
    Set { key: String, value: String },
    Get,
}

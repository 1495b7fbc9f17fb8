pub mod store;

use crate::catalog::Quest;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DAILY_GOAL: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub daily_goal: u32,
    pub work_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daily_goal: DEFAULT_DAILY_GOAL,
            work_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
        }
    }
}

/// One completed quest. Title, points and category are copied from the
/// quest so history stays stable when the catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub date: NaiveDate,
    pub quest_id: String,
    pub title: String,
    pub category: String,
    pub icon: String,
    pub points: u32,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileState {
    pub name: String,
    pub settings: Settings,
    pub quests: Vec<Quest>,
    /// Newest first.
    pub history: Vec<ActivityEntry>,
    pub xp: u64,
    pub level: u32,
    pub streak: u32,
    pub last_goal_met_date: Option<NaiveDate>,
}

impl ProfileState {
    pub fn fresh(name: &str, quests: &[Quest], daily_goal: u32) -> Self {
        Self {
            name: name.to_string(),
            settings: Settings {
                daily_goal,
                ..Settings::default()
            },
            quests: quests.to_vec(),
            history: Vec::new(),
            xp: 0,
            level: 1,
            streak: 0,
            last_goal_met_date: None,
        }
    }

    pub fn find_quest(&self, id: &str) -> Option<&Quest> {
        self.quests.iter().find(|quest| quest.id == id)
    }
}

use crate::catalog::QuestCatalog;
use crate::db::Database;
use crate::profile::{ActivityEntry, ProfileState};
use crate::progress::{self, clamp_daily_goal, clamp_timer_minutes};
use crate::remote::RemoteActivity;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Deserialize;
use std::cmp::Ordering;
use std::path::Path;
use tracing::{info, warn};

const PROFILE_KEY_PREFIX: &str = "questlog:profile:";
const PROFILES_KEY: &str = "questlog:profiles";

#[derive(Debug, Clone)]
pub struct Completion {
    pub state: ProfileState,
    pub entry: ActivityEntry,
}

impl Completion {
    pub fn remote_activity(&self) -> RemoteActivity {
        RemoteActivity {
            name: self.state.name.clone(),
            title: self.entry.title.clone(),
            points: u64::from(self.entry.points),
            category: self.entry.category.clone(),
            date: self.entry.date.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub daily_goal: Option<i64>,
    pub work_minutes: Option<i64>,
    pub short_break_minutes: Option<i64>,
    pub long_break_minutes: Option<i64>,
}

/// Profile states keyed by name, plus the ordered list of visible names.
pub struct ProfileStore {
    database: Database,
    catalog: QuestCatalog,
    default_daily_goal: u32,
}

impl ProfileStore {
    pub fn open(path: &Path, catalog: QuestCatalog, default_daily_goal: u32) -> Result<Self> {
        let database = Database::open(path)?;
        info!(path = %path.display(), "profile store opened");

        Ok(Self {
            database,
            catalog,
            default_daily_goal: clamp_daily_goal(i64::from(default_daily_goal)),
        })
    }

    pub fn close(self) -> Result<()> {
        self.database.close()
    }

    pub fn catalog(&self) -> &QuestCatalog {
        &self.catalog
    }

    pub fn profiles(&self) -> Result<Vec<String>> {
        let Some(raw) = self.database.get(PROFILES_KEY)? else {
            return Ok(Vec::new());
        };

        Ok(serde_json::from_str::<Vec<String>>(&raw).unwrap_or_else(|error| {
            warn!(error = %error, "profile list is corrupt. starting from an empty list");
            Vec::new()
        }))
    }

    /// Explicit name if given, otherwise the first known profile.
    pub fn resolve_person(&self, requested: Option<&str>) -> Result<String> {
        if let Some(name) = requested.map(str::trim).filter(|name| !name.is_empty()) {
            return Ok(name.to_string());
        }

        self.profiles()?
            .into_iter()
            .next()
            .context("No profiles yet. Add one with `questlog profile add <name>`.")
    }

    pub fn add_profile(&self, name: &str) -> Result<ProfileState> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Profile name must not be empty");
        }

        let mut names = self.profiles()?;
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
            names.sort_by(|left, right| compare_names(left, right));
            self.save_profiles(&names)?;
            info!(profile = %name, "profile added");
        }

        match self.database.get(&profile_key(name))? {
            Some(_) => self.load(name),
            None => {
                let state = self.fresh_state(name);
                self.save(&state)?;
                Ok(state)
            }
        }
    }

    /// Detaches `name` from the visible list. Its stored state is kept.
    pub fn remove_profile(&self, name: &str) -> Result<bool> {
        let mut names = self.profiles()?;
        let before = names.len();
        names.retain(|existing| existing != name);

        if names.len() == before {
            return Ok(false);
        }

        self.save_profiles(&names)?;
        info!(profile = %name, "profile removed from list");
        Ok(true)
    }

    pub fn is_known(&self, name: &str) -> Result<bool> {
        Ok(self.profiles()?.iter().any(|existing| existing == name))
    }

    pub fn load(&self, name: &str) -> Result<ProfileState> {
        let Some(raw) = self.database.get(&profile_key(name))? else {
            return Ok(self.fresh_state(name));
        };

        match serde_json::from_str::<ProfileState>(&raw) {
            Ok(state) => Ok(state),
            Err(error) => {
                warn!(profile = %name, error = %error, "stored profile is corrupt. using a fresh state");
                Ok(self.fresh_state(name))
            }
        }
    }

    pub fn save(&self, state: &ProfileState) -> Result<()> {
        let content = serde_json::to_string(state).context("Failed to serialize profile state")?;
        self.database.put(&profile_key(&state.name), &content)
    }

    pub fn complete_quest(
        &self,
        name: &str,
        quest_id: &str,
        today: NaiveDate,
    ) -> Result<Completion> {
        if !self.is_known(name)? {
            bail!("Unknown profile: {name}. Add it first with `questlog profile add {name}`.");
        }

        let state = self.load(name)?;
        let quest = state
            .find_quest(quest_id)
            .or_else(|| self.catalog.find(quest_id))
            .cloned()
            .with_context(|| format!("Unknown quest: {quest_id}"))?;

        let mut next = progress::apply_completion(&state, &quest, today);
        next.name = name.to_string();
        self.save(&next)?;

        let entry = next
            .history
            .first()
            .cloned()
            .context("Completed quest is missing from history")?;

        info!(
            profile = %name,
            quest = %quest.id,
            points = quest.points,
            xp = next.xp,
            level = next.level,
            streak = next.streak,
            "quest completed"
        );

        Ok(Completion { state: next, entry })
    }

    pub fn update_settings(&self, name: &str, update: &SettingsUpdate) -> Result<ProfileState> {
        if !self.is_known(name)? {
            bail!("Unknown profile: {name}. Add it first with `questlog profile add {name}`.");
        }

        let mut state = self.load(name)?;

        if let Some(value) = update.daily_goal {
            state.settings.daily_goal = clamp_daily_goal(value);
        }
        if let Some(value) = update.work_minutes {
            state.settings.work_minutes = clamp_timer_minutes(value);
        }
        if let Some(value) = update.short_break_minutes {
            state.settings.short_break_minutes = clamp_timer_minutes(value);
        }
        if let Some(value) = update.long_break_minutes {
            state.settings.long_break_minutes = clamp_timer_minutes(value);
        }

        self.save(&state)?;
        Ok(state)
    }

    /// Every stored profile, including ones detached from the list.
    pub fn stored_profile_names(&self) -> Result<Vec<String>> {
        Ok(self
            .database
            .keys_with_prefix(PROFILE_KEY_PREFIX)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(PROFILE_KEY_PREFIX).map(ToOwned::to_owned))
            .collect())
    }

    fn save_profiles(&self, names: &[String]) -> Result<()> {
        let content = serde_json::to_string(names).context("Failed to serialize profile list")?;
        self.database.put(PROFILES_KEY, &content)
    }

    fn fresh_state(&self, name: &str) -> ProfileState {
        ProfileState::fresh(name, &self.catalog.quests, self.default_daily_goal)
    }

    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        self.database.put(key, value)
    }
}

fn profile_key(name: &str) -> String {
    format!("{PROFILE_KEY_PREFIX}{name}")
}

fn compare_names(left: &str, right: &str) -> Ordering {
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &tempfile::TempDir) -> ProfileStore {
        ProfileStore::open(
            &dir.path().join("profiles.db"),
            QuestCatalog::default(),
            100,
        )
        .expect("store opened")
    }

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn profiles_are_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&dir);

        store.add_profile("mia").expect("added");
        store.add_profile("  Ben ").expect("added");
        store.add_profile("mia").expect("added");
        store.add_profile("alex").expect("added");

        assert_eq!(store.profiles().expect("profiles"), vec!["alex", "Ben", "mia"]);
        assert!(store.add_profile("   ").is_err());
    }

    #[test]
    fn removing_a_profile_keeps_its_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&dir);

        store.add_profile("ana").expect("added");
        store
            .complete_quest("ana", "close-deal", day("2024-06-01"))
            .expect("completed");

        assert!(store.remove_profile("ana").expect("removed"));
        assert!(!store.remove_profile("ana").expect("already removed"));
        assert!(store.profiles().expect("profiles").is_empty());
        assert_eq!(store.stored_profile_names().expect("names"), vec!["ana"]);

        let restored = store.add_profile("ana").expect("re-added");
        assert_eq!(restored.xp, 75);
        assert_eq!(restored.history.len(), 1);
    }

    #[test]
    fn corrupt_state_falls_back_to_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&dir);

        store
            .put_raw(&profile_key("ana"), "{not json")
            .expect("raw write");
        let state = store.load("ana").expect("loaded");

        assert_eq!(state.name, "ana");
        assert_eq!(state.xp, 0);
        assert_eq!(state.level, 1);
        assert_eq!(state.settings.daily_goal, 100);
        assert_eq!(state.quests.len(), QuestCatalog::default().quests.len());

        store.put_raw(PROFILES_KEY, "42").expect("raw write");
        assert!(store.profiles().expect("profiles").is_empty());
    }

    #[test]
    fn completion_persists_and_copies_quest_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&dir);
        store.add_profile("ana").expect("added");

        let completion = store
            .complete_quest("ana", "offer-accepted", day("2024-06-01"))
            .expect("completed");
        assert_eq!(completion.entry.title, "Offer accepted");
        assert_eq!(completion.state.streak, 1);

        let reloaded = store.load("ana").expect("loaded");
        assert_eq!(reloaded, completion.state);
        assert_eq!(reloaded.level, 2);

        let remote = completion.remote_activity();
        assert_eq!(remote.name, "ana");
        assert_eq!(remote.points, 100);
        assert_eq!(remote.date, "2024-06-01");
    }

    #[test]
    fn completion_requires_known_profile_and_quest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&dir);

        assert!(store
            .complete_quest("ghost", "close-deal", day("2024-06-01"))
            .is_err());

        store.add_profile("ana").expect("added");
        assert!(store
            .complete_quest("ana", "no-such-quest", day("2024-06-01"))
            .is_err());
    }

    #[test]
    fn settings_updates_are_clamped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&dir);
        store.add_profile("ana").expect("added");

        let update = SettingsUpdate {
            daily_goal: Some(2),
            work_minutes: Some(0),
            long_break_minutes: Some(30),
            ..SettingsUpdate::default()
        };
        let state = store.update_settings("ana", &update).expect("updated");

        assert_eq!(state.settings.daily_goal, 10);
        assert_eq!(state.settings.work_minutes, 1);
        assert_eq!(state.settings.short_break_minutes, 5);
        assert_eq!(state.settings.long_break_minutes, 30);
        assert_eq!(store.load("ana").expect("loaded").settings, state.settings);
    }

    #[test]
    fn settings_for_unknown_profile_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&dir);
        store.add_profile("ana").expect("added");

        let update = SettingsUpdate {
            daily_goal: Some(50),
            ..SettingsUpdate::default()
        };
        assert!(store.update_settings("anna", &update).is_err());
        assert_eq!(store.stored_profile_names().expect("names"), vec!["ana"]);
        assert_eq!(store.profiles().expect("profiles"), vec!["ana"]);
    }

    #[test]
    fn resolve_person_defaults_to_first_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(&dir);
        assert!(store.resolve_person(None).is_err());

        store.add_profile("zoe").expect("added");
        store.add_profile("ana").expect("added");
        assert_eq!(store.resolve_person(None).expect("resolved"), "ana");
        assert_eq!(store.resolve_person(Some("zoe")).expect("resolved"), "zoe");
    }
}

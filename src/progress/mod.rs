pub mod badges;
pub mod log;

use crate::catalog::Quest;
use crate::profile::{ActivityEntry, ProfileState};
use chrono::{NaiveDate, Utc};
use serde::Serialize;

pub const BASE_LEVEL_COST: u64 = 100;
pub const LEVEL_COST_STEP: u64 = 75;
pub const MIN_DAILY_GOAL: u32 = 10;
pub const MAX_DAILY_GOAL: u32 = 10_000;
pub const MIN_TIMER_MINUTES: u32 = 1;
pub const MAX_TIMER_MINUTES: u32 = 180;
const ACTIVE_DAYS_WINDOW: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileStats {
    pub today_points: u64,
    pub daily_goal: u32,
    pub goal_progress_percent: u32,
    pub streak: u32,
    pub level: u32,
    pub xp: u64,
    pub xp_into_level: u64,
    pub xp_for_next_level: u64,
    pub last_7_active_days_points: u64,
}

/// XP needed to go from `level` to `level + 1`.
pub fn level_cost(level: u32) -> u64 {
    BASE_LEVEL_COST + u64::from(level.max(1) - 1) * LEVEL_COST_STEP
}

/// Total XP spent reaching `level` from level 1.
pub fn cumulative_cost(level: u32) -> u64 {
    (1..level.max(1)).map(level_cost).sum()
}

/// Advances `level` while the XP left over past its threshold covers the
/// next level's cost. Never moves a level down.
pub fn level_after(level: u32, xp: u64) -> u32 {
    let mut level = level.max(1);
    let mut remainder = xp.saturating_sub(cumulative_cost(level));

    while remainder >= level_cost(level) {
        remainder -= level_cost(level);
        level += 1;
    }

    level
}

pub fn apply_completion(state: &ProfileState, quest: &Quest, today: NaiveDate) -> ProfileState {
    apply_completion_at(state, quest, today, Utc::now().timestamp_millis())
}

pub fn apply_completion_at(
    state: &ProfileState,
    quest: &Quest,
    today: NaiveDate,
    timestamp: i64,
) -> ProfileState {
    let entry = ActivityEntry {
        id: uuid::Uuid::new_v4().to_string(),
        date: today,
        quest_id: quest.id.clone(),
        title: quest.title.clone(),
        category: quest.category.clone(),
        icon: quest.icon.clone(),
        points: quest.points,
        timestamp,
    };

    let mut history = Vec::with_capacity(state.history.len() + 1);
    history.push(entry);
    history.extend(state.history.iter().cloned());

    let xp = state.xp + u64::from(quest.points);
    let level = level_after(state.level, xp);

    let total_today = log::total_for_date(&history, today);
    let (streak, last_goal_met_date) = if total_today >= u64::from(state.settings.daily_goal)
        && state.last_goal_met_date != Some(today)
    {
        let continued = state.last_goal_met_date.is_some()
            && state.last_goal_met_date == today.pred_opt();
        let streak = if continued { state.streak + 1 } else { 1 };
        (streak, Some(today))
    } else {
        (state.streak, state.last_goal_met_date)
    };

    ProfileState {
        history,
        xp,
        level,
        streak,
        last_goal_met_date,
        ..state.clone()
    }
}

pub fn clamp_daily_goal(raw: i64) -> u32 {
    raw.clamp(i64::from(MIN_DAILY_GOAL), i64::from(MAX_DAILY_GOAL)) as u32
}

/// Unparsable input counts as zero, which clamps up to the minimum goal.
pub fn parse_daily_goal(raw: &str) -> u32 {
    clamp_daily_goal(raw.trim().parse::<i64>().unwrap_or(0))
}

pub fn clamp_timer_minutes(raw: i64) -> u32 {
    raw.clamp(i64::from(MIN_TIMER_MINUTES), i64::from(MAX_TIMER_MINUTES)) as u32
}

pub fn stats(state: &ProfileState, today: NaiveDate) -> ProfileStats {
    let today_points = log::total_for_date(&state.history, today);
    let daily_goal = state.settings.daily_goal.max(1);
    let goal_progress_percent =
        ((today_points as f64 / f64::from(daily_goal)) * 100.0).round().clamp(0.0, 100.0) as u32;
    let level = state.level.max(1);

    ProfileStats {
        today_points,
        daily_goal: state.settings.daily_goal,
        goal_progress_percent,
        streak: state.streak,
        level,
        xp: state.xp,
        xp_into_level: state.xp.saturating_sub(cumulative_cost(level)),
        xp_for_next_level: level_cost(level),
        last_7_active_days_points: log::total_for_last_n_active_days(
            &state.history,
            ACTIVE_DAYS_WINDOW,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QuestCatalog;

    fn quest(points: u32) -> Quest {
        Quest {
            id: format!("q{points}"),
            title: format!("Quest worth {points}"),
            points,
            category: "Sales".to_string(),
            icon: String::new(),
        }
    }

    fn fresh_state() -> ProfileState {
        ProfileState::fresh("ana", &QuestCatalog::default().quests, 100)
    }

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn level_cost_grows_linearly() {
        assert_eq!(level_cost(1), 100);
        assert_eq!(level_cost(2), 175);
        assert_eq!(level_cost(3), 250);
        assert_eq!(cumulative_cost(1), 0);
        assert_eq!(cumulative_cost(3), 275);
    }

    #[test]
    fn exactly_one_hundred_points_reaches_level_two() {
        let state = [60, 40]
            .into_iter()
            .fold(fresh_state(), |state, points| {
                apply_completion_at(&state, &quest(points), day("2024-03-01"), 0)
            });

        assert_eq!(state.level, 2);
        assert_eq!(state.xp, 100);
        assert_eq!(stats(&state, day("2024-03-01")).xp_into_level, 0);
    }

    #[test]
    fn xp_is_the_sum_of_completed_points() {
        let points = [5, 15, 20, 75, 10, 100, 5];
        let state = points.iter().fold(fresh_state(), |state, &value| {
            apply_completion_at(&state, &quest(value), day("2024-03-01"), 0)
        });

        assert_eq!(state.xp, points.iter().map(|&value| u64::from(value)).sum::<u64>());
        assert_eq!(state.history.len(), points.len());
        assert_eq!(
            state.history.iter().map(|entry| u64::from(entry.points)).sum::<u64>(),
            state.xp
        );
    }

    #[test]
    fn level_is_order_independent_and_monotonic() {
        let forward = [100, 5, 75, 20, 200];
        let backward = [200, 20, 75, 5, 100];

        let mut levels = Vec::new();
        let end_forward = forward.iter().fold(fresh_state(), |state, &value| {
            let next = apply_completion_at(&state, &quest(value), day("2024-03-01"), 0);
            levels.push(next.level);
            next
        });
        let end_backward = backward.iter().fold(fresh_state(), |state, &value| {
            apply_completion_at(&state, &quest(value), day("2024-03-01"), 0)
        });

        assert!(levels.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(end_forward.level, end_backward.level);
        assert_eq!(end_forward.level, level_after(1, end_forward.xp));
    }

    #[test]
    fn zero_extra_points_never_change_the_level() {
        let level = level_after(1, 400);
        assert_eq!(level, 3);
        assert_eq!(level_after(level, 400), level);
        assert_eq!(level_after(level_after(level, 400), 400), level);
    }

    #[test]
    fn streak_counts_consecutive_goal_days() {
        let big = quest(100);
        let state = ["2024-01-01", "2024-01-02", "2024-01-03"]
            .into_iter()
            .fold(fresh_state(), |state, date| {
                apply_completion_at(&state, &big, day(date), 0)
            });

        assert_eq!(state.streak, 3);
        assert_eq!(state.last_goal_met_date, Some(day("2024-01-03")));
    }

    #[test]
    fn missed_day_resets_streak_to_one() {
        let big = quest(100);
        let state = ["2024-01-01", "2024-01-02", "2024-01-04"]
            .into_iter()
            .fold(fresh_state(), |state, date| {
                apply_completion_at(&state, &big, day(date), 0)
            });

        assert_eq!(state.streak, 1);
        assert_eq!(state.last_goal_met_date, Some(day("2024-01-04")));
    }

    #[test]
    fn second_completion_after_goal_keeps_streak() {
        let today = day("2024-01-02");
        let first = apply_completion_at(&fresh_state(), &quest(100), day("2024-01-01"), 0);
        let met = apply_completion_at(&first, &quest(120), today, 0);
        let again = apply_completion_at(&met, &quest(5), today, 0);

        assert_eq!(met.streak, 2);
        assert_eq!(again.streak, met.streak);
        assert_eq!(again.last_goal_met_date, met.last_goal_met_date);
    }

    #[test]
    fn goal_is_reached_by_summing_the_day() {
        let today = day("2024-05-10");
        let partial = apply_completion_at(&fresh_state(), &quest(60), today, 0);
        assert_eq!(partial.streak, 0);
        assert_eq!(partial.last_goal_met_date, None);

        let done = apply_completion_at(&partial, &quest(40), today, 0);
        assert_eq!(done.streak, 1);
        assert_eq!(done.last_goal_met_date, Some(today));
    }

    #[test]
    fn completion_prepends_a_copied_entry() {
        let state = apply_completion_at(&fresh_state(), &quest(5), day("2024-05-10"), 10);
        let state = apply_completion_at(&state, &quest(15), day("2024-05-10"), 20);

        let newest = &state.history[0];
        assert_eq!(newest.points, 15);
        assert_eq!(newest.quest_id, "q15");
        assert_eq!(newest.timestamp, 20);
        assert_ne!(state.history[0].id, state.history[1].id);
        assert_eq!(state.settings, fresh_state().settings);
    }

    #[test]
    fn goal_and_timer_inputs_are_clamped() {
        assert_eq!(clamp_daily_goal(-5), MIN_DAILY_GOAL);
        assert_eq!(clamp_daily_goal(250), 250);
        assert_eq!(clamp_daily_goal(50_000), MAX_DAILY_GOAL);
        assert_eq!(parse_daily_goal("not a number"), MIN_DAILY_GOAL);
        assert_eq!(parse_daily_goal(" 150 "), 150);
        assert_eq!(clamp_timer_minutes(0), MIN_TIMER_MINUTES);
        assert_eq!(clamp_timer_minutes(999), MAX_TIMER_MINUTES);
    }

    #[test]
    fn stats_cap_progress_at_one_hundred_percent() {
        let today = day("2024-05-10");
        let state = apply_completion_at(&fresh_state(), &quest(150), today, 0);
        let summary = stats(&state, today);

        assert_eq!(summary.today_points, 150);
        assert_eq!(summary.goal_progress_percent, 100);
        assert_eq!(summary.level, 2);
        assert_eq!(summary.xp_into_level, 50);
        assert_eq!(summary.xp_for_next_level, 175);
    }
}

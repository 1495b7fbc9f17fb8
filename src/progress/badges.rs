use crate::profile::ProfileState;
use crate::progress::log::totals_by_date;
use serde::Serialize;

const HUNDRED_POINT_DAY: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub id: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    pub earned: bool,
}

pub fn evaluate(state: &ProfileState) -> Vec<Badge> {
    let titled = |needle: &str| {
        state
            .history
            .iter()
            .filter(|entry| entry.title.to_lowercase().contains(needle))
            .count()
    };
    let best_day = totals_by_date(&state.history)
        .into_values()
        .max()
        .unwrap_or_default();

    vec![
        Badge {
            id: "starter",
            label: "Getting Started",
            icon: "🚀",
            earned: !state.history.is_empty(),
        },
        Badge {
            id: "caller10",
            label: "Call Cadet (10 calls)",
            icon: "📞",
            earned: titled("call") >= 10,
        },
        Badge {
            id: "closer1",
            label: "Closer (1 deal)",
            icon: "🏆",
            earned: titled("close a deal") >= 1,
        },
        Badge {
            id: "content5",
            label: "Content Creator (5 posts)",
            icon: "📝",
            earned: titled("linkedin post") >= 5,
        },
        Badge {
            id: "level5",
            label: "Level 5+",
            icon: "🥇",
            earned: state.level >= 5,
        },
        Badge {
            id: "hundred",
            label: "Hit 100+ day",
            icon: "💯",
            earned: best_day >= HUNDRED_POINT_DAY,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::evaluate;
    use crate::catalog::QuestCatalog;
    use crate::profile::ProfileState;
    use crate::progress::apply_completion_at;
    use chrono::NaiveDate;

    fn earned(state: &ProfileState) -> Vec<&'static str> {
        evaluate(state)
            .into_iter()
            .filter(|badge| badge.earned)
            .map(|badge| badge.id)
            .collect()
    }

    #[test]
    fn fresh_profile_has_no_badges() {
        let catalog = QuestCatalog::default();
        let state = ProfileState::fresh("ana", &catalog.quests, 100);
        assert!(earned(&state).is_empty());
    }

    #[test]
    fn ten_calls_earn_call_cadet() {
        let catalog = QuestCatalog::default();
        let call = catalog.find("prospecting-call").expect("quest").clone();
        let day = NaiveDate::from_ymd_opt(2024, 4, 1).expect("date");

        let mut state = ProfileState::fresh("ana", &catalog.quests, 100);
        for index in 0..10 {
            state = apply_completion_at(&state, &call, day, index);
        }

        let ids = earned(&state);
        assert!(ids.contains(&"starter"));
        assert!(ids.contains(&"caller10"));
        assert!(!ids.contains(&"hundred"));
    }

    #[test]
    fn hundred_point_day_and_closer() {
        let catalog = QuestCatalog::default();
        let close = catalog.find("close-deal").expect("quest").clone();
        let proposal = catalog.find("send-proposal").expect("quest").clone();
        let newsletter = catalog.find("email-newsletter").expect("quest").clone();
        let day = NaiveDate::from_ymd_opt(2024, 4, 1).expect("date");

        let state = ProfileState::fresh("ana", &catalog.quests, 100);
        let state = apply_completion_at(&state, &close, day, 1);
        let state = apply_completion_at(&state, &proposal, day, 2);
        assert!(!earned(&state).contains(&"hundred"));

        let state = apply_completion_at(&state, &newsletter, day, 3);
        let ids = earned(&state);
        assert!(ids.contains(&"closer1"));
        assert!(ids.contains(&"hundred"));
    }
}

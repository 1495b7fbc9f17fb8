use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub points: u32,
    pub category: String,
    pub icon: String,
}

impl Quest {
    fn new(id: &str, title: &str, points: u32, category: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            points,
            category: category.to_string(),
            icon: icon.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestCatalog {
    pub quests: Vec<Quest>,
}

impl Default for QuestCatalog {
    fn default() -> Self {
        let quests = vec![
            Quest::new("prospecting-call", "Prospecting call", 5, "Sales", "📞"),
            Quest::new("book-meeting", "Book a meeting", 15, "Sales", "📅"),
            Quest::new("send-proposal", "Send proposal/quote", 20, "Sales", "📨"),
            Quest::new("close-deal", "Close a deal", 75, "Sales", "🏁"),
            Quest::new("linkedin-post", "LinkedIn post", 10, "Marketing", "📝"),
            Quest::new("meaningful-comments", "5 meaningful comments", 5, "Marketing", "💬"),
            Quest::new("email-newsletter", "Email newsletter", 20, "Marketing", "📧"),
            Quest::new("source-candidates", "Source 5 candidates", 10, "Recruitment", "🧲"),
            Quest::new("screen-candidate", "Screen candidate", 10, "Recruitment", "🗣️"),
            Quest::new("client-intake", "Client intake call", 15, "Recruitment", "🎧"),
            Quest::new(
                "candidate-submitted",
                "Candidate submitted to client",
                15,
                "Recruitment",
                "📤",
            ),
            Quest::new("offer-accepted", "Offer accepted", 100, "Recruitment", "🤝"),
            Quest::new("crm-leads", "Add 10 leads to CRM", 10, "Ops", "🗂️"),
            Quest::new("update-pipeline", "Update pipeline", 5, "Ops", "♻️"),
        ];

        Self { quests }
    }
}

impl QuestCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read quests file: {}", path.display()))?;
        let parsed: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse quests file: {}", path.display()))?;

        parsed.validated()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create quests directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize quest catalog")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write quests file: {}", path.display()))
    }

    pub fn find(&self, id: &str) -> Option<&Quest> {
        self.quests.iter().find(|quest| quest.id == id)
    }

    /// "All" followed by each distinct category in catalog order.
    pub fn categories(&self) -> Vec<String> {
        let mut categories = vec![ALL_CATEGORIES.to_string()];
        for quest in &self.quests {
            if !categories.contains(&quest.category) {
                categories.push(quest.category.clone());
            }
        }
        categories
    }

    pub fn filtered(&self, category: Option<&str>) -> Vec<&Quest> {
        self.quests
            .iter()
            .filter(|quest| match category {
                None | Some(ALL_CATEGORIES) => true,
                Some(wanted) => quest.category.eq_ignore_ascii_case(wanted),
            })
            .collect()
    }

    fn validated(self) -> Result<Self> {
        if self.quests.is_empty() {
            bail!("Quest catalog is empty");
        }

        for quest in &self.quests {
            if quest.id.trim().is_empty() {
                bail!("Quest \"{}\" has an empty id", quest.title);
            }
            if quest.points == 0 {
                bail!("Quest \"{}\" must award at least one point", quest.id);
            }
        }

        let mut ids = self
            .quests
            .iter()
            .map(|quest| quest.id.as_str())
            .collect::<Vec<_>>();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            bail!("Duplicate quest id in catalog: {}", pair[0]);
        }

        Ok(self)
    }
}

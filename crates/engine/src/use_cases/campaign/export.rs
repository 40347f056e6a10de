//! Story export.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use worldarchitect_domain::{Actor, Campaign, CampaignId, StoryTurn, UserId};

use crate::infrastructure::ports::CampaignRepo;

use super::{load_owned, CampaignError};

/// Document formats a story can be exported to. Only plain text is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Txt,
    Pdf,
    Docx,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "txt" | "text" => Ok(Self::Txt),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            other => Err(CampaignError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedStory {
    pub filename: String,
    pub content: String,
}

pub struct ExportCampaign {
    repo: Arc<dyn CampaignRepo>,
}

impl ExportCampaign {
    pub fn new(repo: Arc<dyn CampaignRepo>) -> Self {
        Self { repo }
    }

    pub async fn execute(
        &self,
        id: CampaignId,
        user_id: &UserId,
        format: ExportFormat,
    ) -> Result<ExportedStory, CampaignError> {
        let campaign = load_owned(self.repo.as_ref(), id, user_id).await?;

        if format != ExportFormat::Txt {
            return Err(CampaignError::UnsupportedFormat(format.as_str().to_string()));
        }

        let turns = self.repo.list_turns(id).await?;
        tracing::debug!(campaign_id = %id, turns = turns.len(), "Exporting story");

        Ok(ExportedStory {
            filename: format!("{}.txt", file_stem(&campaign.title)),
            content: render_text(&campaign, &turns),
        })
    }
}

fn render_text(campaign: &Campaign, turns: &[StoryTurn]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", campaign.title);
    let _ = writeln!(out, "{}", "=".repeat(campaign.title.chars().count()));
    if !campaign.prompt.is_empty() {
        let _ = writeln!(out, "\n{}", campaign.prompt);
    }

    for turn in turns {
        let speaker = match turn.actor {
            Actor::User => "Player",
            Actor::Narrator => "Story",
            Actor::System => "System",
        };
        let _ = writeln!(out, "\n{speaker}: {}", turn.text.trim());
    }
    out
}

fn file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "story".to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MockCampaignRepo;
    use chrono::{TimeZone, Utc};
    use worldarchitect_domain::{InteractionMode, TurnStructuredFields};

    fn owner() -> UserId {
        UserId::new("owner").expect("valid user")
    }

    fn repo_with_story(campaign: Campaign) -> MockCampaignRepo {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut repo = MockCampaignRepo::new();
        repo.expect_get_campaign()
            .returning(move |_| Ok(Some(campaign.clone())));
        repo.expect_list_turns().returning(move |_| {
            Ok(vec![
                StoryTurn::narrator(
                    0,
                    InteractionMode::Character,
                    "The gate creaks open.",
                    now,
                    TurnStructuredFields::default(),
                ),
                StoryTurn::user(1, InteractionMode::Character, "I step inside.", now),
            ])
        });
        repo
    }

    #[tokio::test]
    async fn text_export_lists_turns_in_order() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let campaign = Campaign::new(owner(), "Iron Gate", "", now).expect("valid campaign");
        let id = campaign.id;

        let export = ExportCampaign::new(Arc::new(repo_with_story(campaign)));
        let story = export
            .execute(id, &owner(), ExportFormat::Txt)
            .await
            .expect("exported");

        assert_eq!(story.filename, "Iron_Gate.txt");
        let gate = story.content.find("Story: The gate creaks open.").expect("narrator turn");
        let step = story.content.find("Player: I step inside.").expect("user turn");
        assert!(gate < step);
    }

    #[tokio::test]
    async fn document_formats_are_unsupported() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let campaign = Campaign::new(owner(), "Iron Gate", "", now).expect("valid campaign");
        let id = campaign.id;

        let export = ExportCampaign::new(Arc::new(repo_with_story(campaign)));
        let result = export.execute(id, &owner(), ExportFormat::Pdf).await;

        assert!(matches!(result, Err(CampaignError::UnsupportedFormat(f)) if f == "pdf"));
    }

    #[test]
    fn format_parsing() {
        assert_eq!("TXT".parse::<ExportFormat>().ok(), Some(ExportFormat::Txt));
        assert_eq!("docx".parse::<ExportFormat>().ok(), Some(ExportFormat::Docx));
        assert!("rtf".parse::<ExportFormat>().is_err());
    }
}

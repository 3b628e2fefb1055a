use crate::scheduler::CardScheduleState;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// A flashcard with its scheduling state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: i64,
    pub user_id: String,
    /// Prompt side, e.g. a phrase in the learner's native language
    pub front: String,
    /// Answer side
    pub back: String,
    #[serde(flatten)]
    pub schedule: CardScheduleState,
}

/// A card read from an import file, not yet stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewCard {
    pub user_id: String,
    pub front: String,
    pub back: String,
}

/// Load cards from a TSV file
/// Format: front<TAB>back
/// Lines starting with # are comments (or a `# user: name` directive that sets
/// the owner of the cards that follow)
/// Empty lines are skipped
pub fn load_cards(path: &Path, default_user: &str) -> Result<Vec<NewCard>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read card file: {}", path.display()))?;

    let mut cards = Vec::new();
    let mut user = default_user.to_string();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('#') {
            if let Some(name) = rest.trim().strip_prefix("user:") {
                let name = name.trim();
                if name.is_empty() {
                    anyhow::bail!(
                        "Empty user directive on line {} in {}",
                        line_num + 1,
                        path.display()
                    );
                }
                user = name.to_string();
            }
            continue;
        }

        let Some((front, back)) = line.split_once('\t') else {
            anyhow::bail!(
                "Invalid line {} in {}: expected front<TAB>back",
                line_num + 1,
                path.display()
            );
        };

        let (front, back) = (front.trim(), back.trim());
        if front.is_empty() || back.is_empty() {
            anyhow::bail!(
                "Invalid line {} in {}: front and back must not be empty",
                line_num + 1,
                path.display()
            );
        }

        cards.push(NewCard {
            user_id: user.clone(),
            front: front.to_string(),
            back: back.to_string(),
        });
    }

    Ok(cards)
}

/// Write cards and their schedules as TSV
pub fn export_cards(path: &Path, cards: &[Card]) -> Result<()> {
    let mut out = String::from(
        "front\tback\tinterval\tease_factor\treview_count\tlast_reviewed\tnext_review_date\n",
    );

    for card in cards {
        let s = &card.schedule;
        writeln!(
            out,
            "{}\t{}\t{}\t{:.2}\t{}\t{}\t{}",
            clean_field(&card.front),
            clean_field(&card.back),
            s.interval,
            s.ease_factor,
            s.review_count,
            s.last_reviewed.map(|t| t.to_rfc3339()).unwrap_or_default(),
            s.next_review_date.map(|t| t.to_rfc3339()).unwrap_or_default(),
        )?;
    }

    std::fs::write(path, out)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;
    Ok(())
}

// Tabs and newlines would break the row layout
fn clean_field(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

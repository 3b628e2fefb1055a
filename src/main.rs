mod app;
mod clock;
mod config;
mod deck;
mod error;
mod review;
mod scheduler;
mod selector;
mod storage;
mod ui;

use anyhow::{Context, Result};
use app::App;
use chrono::Utc;
use clap::{Parser, Subcommand};
use clock::{Clock, SystemClock};
use config::Config;
use review::ReviewService;
use std::path::PathBuf;
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Review language-practice flashcards with spaced repetition
#[derive(Parser, Debug)]
#[command(name = "phrasedeck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to <config dir>/phrasedeck/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Review due cards in the terminal
    Review {
        /// Learner to review (skips the learner list)
        #[arg(long)]
        user: Option<String>,
    },
    /// Print the next due card as JSON
    Next {
        #[arg(long)]
        user: Option<String>,
    },
    /// Grade a card: again, hard, good or easy (or 1-4)
    Grade { card_id: i64, grade: String },
    /// Import cards from a front<TAB>back file
    Import { file: PathBuf },
    /// Export a learner's cards and schedules as TSV
    Export {
        file: PathBuf,
        #[arg(long)]
        user: Option<String>,
    },
    /// Show a card's grading history
    History { card_id: i64 },
    /// Delete a card and its history
    Delete { card_id: i64 },
    /// Show card counts per learner
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.ensure_dirs()?;

    // Logs go to a file so they never draw over the review screen
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "phrasedeck.log");
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    let storage = Storage::open(&config.db_path)?;

    match cli.command.unwrap_or(Commands::Review { user: None }) {
        Commands::Review { user } => {
            let app = App::new(config, storage);
            let mut terminal = ratatui::init();
            let result = app.run(&mut terminal, user);
            ratatui::restore();
            result
        }
        Commands::Next { user } => {
            let user = user.unwrap_or_else(|| config.default_user.clone());
            let service = ReviewService::new(storage, SystemClock);
            println!("{}", service.next_card(&user)?.to_json()?);
            Ok(())
        }
        Commands::Grade { card_id, grade } => {
            let service = ReviewService::new(storage, SystemClock);
            let outcome = service.grade_card_str(card_id, &grade)?;
            println!(
                "card {} graded {}: next review in {} day(s) on {}, ease {:.2}, {} review(s)",
                outcome.card_id,
                outcome.grade,
                outcome.update.interval,
                outcome.update.next_review_date.format("%Y-%m-%d"),
                outcome.update.ease_factor,
                outcome.state.review_count
            );
            Ok(())
        }
        Commands::Import { file } => {
            let cards = deck::load_cards(&file, &config.default_user)?;
            for card in &cards {
                storage
                    .upsert_card(&card.user_id, &card.front, &card.back)
                    .with_context(|| format!("Failed to import card '{}'", card.front))?;
            }
            info!(path = %file.display(), count = cards.len(), "imported cards");
            println!("Imported {} card(s) from {}", cards.len(), file.display());
            Ok(())
        }
        Commands::Export { file, user } => {
            let user = user.unwrap_or_else(|| config.default_user.clone());
            let cards = storage.load_cards_for_user(&user)?;
            deck::export_cards(&file, &cards)?;
            println!("Exported {} card(s) to {}", cards.len(), file.display());
            Ok(())
        }
        Commands::History { card_id } => {
            let card = storage
                .get_card(card_id)?
                .with_context(|| format!("Card {} not found", card_id))?;
            println!("{} -> {}", card.front, card.back);
            for review in storage.get_reviews_for_card(card_id)? {
                println!(
                    "{}  grade {}  interval {}  ease {:.3}",
                    review.reviewed_at.format("%Y-%m-%d %H:%M"),
                    review.grade,
                    review.interval,
                    review.ease_factor
                );
            }
            Ok(())
        }
        Commands::Delete { card_id } => {
            if storage.delete_card(card_id)? {
                info!(card_id, "deleted card");
                println!("Deleted card {}", card_id);
            } else {
                println!("Card {} not found", card_id);
            }
            Ok(())
        }
        Commands::Stats => {
            let now = SystemClock.now().with_timezone(&Utc);
            let stats = storage.get_user_stats(config.mastered_interval_days, now)?;
            if stats.is_empty() {
                println!("No cards yet");
            }
            for user in stats {
                println!(
                    "{}: {} due / {} total / {} mastered",
                    user.user_id, user.due_cards, user.total_cards, user.mastered_cards
                );
            }
            Ok(())
        }
    }
}

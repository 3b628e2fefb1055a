use crate::clock::SystemClock;
use crate::config::Config;
use crate::deck::Card;
use crate::review::ReviewService;
use crate::scheduler::Grade;
use crate::storage::{Storage, UserStats};
use crate::ui;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{DefaultTerminal, Frame};
use std::time::{Duration, Instant};
use tracing::warn;

/// Application state phases
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    UserSelection,
    Question,
    Answer,
    Summary,
}

/// Study session statistics
struct SessionStats {
    /// Grades given, indexed by grade - 1
    grades: [usize; 4],
    start_time: Instant,
    end_time: Option<Instant>,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            grades: [0; 4],
            start_time: Instant::now(),
            end_time: None,
        }
    }
}

/// Main application state
pub struct App {
    config: Config,
    service: ReviewService<SystemClock>,
    phase: Phase,
    // User selection state
    users: Vec<UserStats>,
    selected_user_idx: usize,
    // Review state
    user: String,
    current: Option<Card>,
    remaining: usize,
    message: Option<String>,
    stats: SessionStats,
    should_exit: bool,
}

impl App {
    /// Create a new application
    pub fn new(config: Config, storage: Storage) -> Self {
        Self {
            service: ReviewService::new(storage, SystemClock),
            phase: Phase::UserSelection,
            users: Vec::new(),
            selected_user_idx: 0,
            user: config.default_user.clone(),
            current: None,
            remaining: 0,
            message: None,
            stats: SessionStats::new(),
            should_exit: false,
            config,
        }
    }

    /// Run the application, starting straight in a session if `user` is given
    pub fn run(mut self, terminal: &mut DefaultTerminal, user: Option<String>) -> Result<()> {
        self.load_users()?;

        if let Some(user) = user {
            self.start_session(user)?;
        }

        while !self.should_exit {
            terminal.draw(|frame| self.render(frame))?;
            self.handle_events()?;
        }

        Ok(())
    }

    /// Reload learners and their counts from the database
    fn load_users(&mut self) -> Result<()> {
        self.users = self
            .service
            .storage()
            .get_user_stats(self.config.mastered_interval_days, self.service.now())?;

        self.selected_user_idx = self
            .users
            .iter()
            .position(|u| u.user_id == self.user)
            .unwrap_or(0);

        Ok(())
    }

    /// Start reviewing a learner's due cards
    fn start_session(&mut self, user: String) -> Result<()> {
        self.user = user;
        self.stats = SessionStats::new();
        self.message = None;
        self.advance()
    }

    /// Fetch the next due card, or finish the session
    fn advance(&mut self) -> Result<()> {
        let next = self.service.next_card(&self.user)?;
        self.remaining = next.remaining_count;
        self.current = next.card;

        if self.current.is_some() {
            self.phase = Phase::Question;
        } else {
            self.finish_session();
        }

        Ok(())
    }

    fn finish_session(&mut self) {
        self.stats.end_time = Some(Instant::now());
        self.current = None;
        self.phase = Phase::Summary;
    }

    /// Render the UI
    fn render(&self, frame: &mut Frame) {
        match self.phase {
            Phase::UserSelection => {
                ui::render_user_selection(
                    frame,
                    &self.users,
                    self.selected_user_idx,
                    self.message.as_deref(),
                );
            }
            Phase::Question | Phase::Answer => {
                if let Some(card) = &self.current {
                    let view = ui::CardView {
                        user: &self.user,
                        front: &card.front,
                        back: (self.phase == Phase::Answer).then_some(card.back.as_str()),
                        remaining: self.remaining,
                        review_count: card.schedule.review_count,
                        mastered: card
                            .schedule
                            .is_mastered(self.config.mastered_interval_days),
                        message: self.message.as_deref(),
                    };
                    ui::render_card(frame, &view);
                }
            }
            Phase::Summary => {
                let elapsed = self
                    .stats
                    .end_time
                    .map(|end| end.duration_since(self.stats.start_time))
                    .unwrap_or_else(|| self.stats.start_time.elapsed());
                ui::render_summary(frame, &self.stats.grades, elapsed.as_secs());
            }
        }
    }

    /// Handle input events
    fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
        {
            // Only handle key press events
            if key.kind != KeyEventKind::Press {
                return Ok(());
            }

            match self.phase {
                Phase::UserSelection => self.handle_user_selection(key)?,
                Phase::Question => self.handle_question(key),
                Phase::Answer => self.handle_answer(key)?,
                Phase::Summary => self.handle_summary(key)?,
            }
        }

        Ok(())
    }

    /// Handle user selection input
    fn handle_user_selection(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_user_idx = self.selected_user_idx.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected_user_idx + 1 < self.users.len() {
                    self.selected_user_idx += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(user) = self.users.get(self.selected_user_idx) {
                    let user = user.user_id.clone();
                    self.start_session(user)?;
                }
            }
            KeyCode::Esc | KeyCode::Char('q') => {
                self.should_exit = true;
            }
            _ => {}
        }
        Ok(())
    }

    /// Handle input while only the front is shown
    fn handle_question(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(' ') | KeyCode::Enter => {
                self.message = None;
                self.phase = Phase::Answer;
            }
            KeyCode::Esc => self.finish_session(),
            _ => {}
        }
    }

    /// Handle grading input once the answer is revealed
    fn handle_answer(&mut self, key: KeyEvent) -> Result<()> {
        let grade = match key.code {
            KeyCode::Esc => {
                self.finish_session();
                return Ok(());
            }
            KeyCode::Char(c) => match c.to_string().parse::<Grade>() {
                Ok(grade) => grade,
                Err(_) => return Ok(()),
            },
            _ => return Ok(()),
        };

        let Some(card_id) = self.current.as_ref().map(|c| c.id) else {
            return Ok(());
        };

        match self.service.grade_card(card_id, grade) {
            Ok(_) => {
                self.stats.grades[grade.as_u32() as usize - 1] += 1;
                self.message = None;
            }
            Err(e) => {
                // The card is re-fetched below, so the user can grade it again
                warn!(card_id, error = %e, "grading failed");
                self.message = Some(format!("Could not save grade: {}", e));
            }
        }

        self.advance()
    }

    /// Handle summary input
    fn handle_summary(&mut self, key: KeyEvent) -> Result<()> {
        if key.code == KeyCode::Char('q') {
            self.should_exit = true;
        } else {
            self.phase = Phase::UserSelection;
            self.load_users()?;
        }
        Ok(())
    }
}

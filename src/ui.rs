use crate::scheduler::Grade;
use crate::storage::UserStats;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

/// UI state for rendering a card
pub struct CardView<'a> {
    /// Owner of the session
    pub user: &'a str,
    /// Prompt side of the card
    pub front: &'a str,
    /// Answer side, shown once revealed
    pub back: Option<&'a str>,
    /// Other cards still due after this one
    pub remaining: usize,
    /// Times this card has been graded
    pub review_count: u32,
    pub mastered: bool,
    /// Error or status line
    pub message: Option<&'a str>,
}

/// Render the current card
pub fn render_card(frame: &mut Frame, view: &CardView) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Fill(1),   // Top spacer
        Constraint::Length(1), // User and progress
        Constraint::Length(3), // Front
        Constraint::Length(3), // Back
        Constraint::Length(1), // Hint
        Constraint::Length(1), // Message
        Constraint::Fill(1),   // Bottom spacer
    ])
    .split(area);

    let label = if view.review_count == 0 {
        " · new card"
    } else if view.mastered {
        " · mastered"
    } else {
        ""
    };
    let header = format!("{}{} · {} more due", view.user, label, view.remaining);
    let header = Paragraph::new(header)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(header, chunks[1]);

    let front = Paragraph::new(view.front)
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center);
    frame.render_widget(front, chunks[2]);

    let hint = match view.back {
        Some(back) => {
            let back = Paragraph::new(back)
                .style(Style::default().fg(Color::Cyan))
                .alignment(Alignment::Center);
            frame.render_widget(back, chunks[3]);
            grade_hint()
        }
        None => Line::from(Span::styled(
            "Press space to show the answer",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(Paragraph::new(hint).alignment(Alignment::Center), chunks[4]);

    if let Some(msg) = view.message {
        let message = Paragraph::new(msg)
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        frame.render_widget(message, chunks[5]);
    }
}

fn grade_hint() -> Line<'static> {
    let mut spans = Vec::new();
    for grade in Grade::ALL {
        let color = match grade {
            Grade::Again => Color::Red,
            Grade::Hard => Color::Yellow,
            Grade::Good => Color::Green,
            Grade::Easy => Color::Cyan,
        };
        if !spans.is_empty() {
            spans.push(Span::raw("   "));
        }
        spans.push(Span::styled(
            format!("{} {}", grade.as_u32(), grade),
            Style::default().fg(color),
        ));
    }
    Line::from(spans)
}

/// Render user selection screen
pub fn render_user_selection(
    frame: &mut Frame,
    users: &[UserStats],
    selected: usize,
    message: Option<&str>,
) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(2),
        Constraint::Length((users.len() + 1) as u16),
        Constraint::Length(1),
        Constraint::Fill(1),
    ])
    .split(area);

    let title = Paragraph::new("Select a learner")
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center);
    frame.render_widget(title, chunks[1]);

    let mut lines: Vec<Line> = Vec::new();

    if users.is_empty() {
        lines.push(Line::from(Span::styled(
            "No cards yet. Add some with `phrasedeck import <file>`",
            Style::default().fg(Color::DarkGray),
        )));
    }

    for (i, user) in users.iter().enumerate() {
        let prefix = if i == selected { "> " } else { "  " };
        let style = if i == selected {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::White)
        };

        lines.push(Line::from(Span::styled(
            format!(
                "{}{} ({} due / {} total / {} mastered)",
                prefix, user.user_id, user.due_cards, user.total_cards, user.mastered_cards
            ),
            style,
        )));
    }

    let list = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(list, chunks[2]);

    if let Some(msg) = message {
        let message = Paragraph::new(msg)
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        frame.render_widget(message, chunks[3]);
    }
}

/// Render session summary
pub fn render_summary(frame: &mut Frame, grades: &[usize; 4], total_time_secs: u64) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(8),
        Constraint::Fill(1),
    ])
    .split(area);

    let reviewed: usize = grades.iter().sum();
    let recalled = reviewed - grades[0];
    let accuracy = if reviewed > 0 {
        (recalled as f64 / reviewed as f64) * 100.0
    } else {
        0.0
    };

    let lines = vec![
        Line::from(Span::styled(
            "Session Complete",
            Style::default().fg(Color::Green),
        )),
        Line::from(""),
        Line::from(format!("Cards reviewed: {}", reviewed)),
        Line::from(format!("Recalled: {} ({:.0}%)", recalled, accuracy)),
        Line::from(format!(
            "again {} · hard {} · good {} · easy {}",
            grades[0], grades[1], grades[2], grades[3]
        )),
        Line::from(format!("Time: {}s", total_time_secs)),
        Line::from(""),
        Line::from(Span::styled(
            "Press q to quit or any other key to return to the learners",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let summary = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(summary, chunks[1]);
}

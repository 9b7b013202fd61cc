use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Chart, Dataset, GraphType, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::celebration::{CelebrationEvent, CelebrationPayload};
use crate::pet::{EmotionalState, PetState};
use crate::practice::{Outcome, PracticeRound};
use crate::session::SessionSummary;
use crate::time_series::TimeSeriesPoint;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

pub fn face(mood: EmotionalState) -> &'static str {
    match mood {
        EmotionalState::Ecstatic => "(^o^)",
        EmotionalState::Happy => "(^_^)",
        EmotionalState::Neutral => "(-_-)",
        EmotionalState::Sad => "(;_;)",
        EmotionalState::Distressed => "(T_T)",
    }
}

pub fn celebration_text(event: &CelebrationEvent) -> String {
    match &event.payload {
        CelebrationPayload::Achievement { name, reward, .. } => match reward {
            Some(reward) => format!("Achievement unlocked: {name}! You earned the {reward}."),
            None => format!("Achievement unlocked: {name}!"),
        },
        CelebrationPayload::Milestone(milestone) => format!("Milestone reached: {milestone}"),
        CelebrationPayload::PersonalBest {
            category,
            value,
            improvement_pct,
        } => format!("New personal best for {category}: {value:.1} (+{improvement_pct:.0}%)"),
        CelebrationPayload::Evolution { from, to } => format!("Your {from} grew into a {to}!"),
    }
}

/// Everything the practice screen draws, borrowed for one frame.
pub struct PracticeView<'a> {
    pub round: &'a PracticeRound,
    pub pet: &'a PetState,
    pub mood: EmotionalState,
    pub celebration: Option<&'a CelebrationEvent>,
    /// Present once the round is over.
    pub summary: Option<&'a SessionSummary>,
    pub timeline: &'a [TimeSeriesPoint],
}

impl PracticeView<'_> {
    fn pet_line(&self) -> Line<'static> {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        Line::from(vec![
            Span::styled(face(self.mood).to_string(), bold.fg(Color::Yellow)),
            Span::raw(format!(
                "  {} · {} · happiness {:.0} · {} words fed",
                self.pet.evolution_form, self.mood, self.pet.happiness, self.pet.words_fed_total
            )),
        ])
    }

    fn prompt_line(&self) -> Line<'static> {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let green_bold_style = bold_style.fg(Color::Green);
        let red_bold_style = bold_style.fg(Color::Red);
        let dim_bold_style = bold_style.add_modifier(Modifier::DIM);
        let underlined_dim_bold_style = dim_bold_style.add_modifier(Modifier::UNDERLINED);

        let input = self.round.input();
        let mut spans: Vec<Span> = input
            .iter()
            .enumerate()
            .map(|(idx, typed)| match typed.outcome {
                Outcome::Correct => Span::styled(
                    self.round.expected_char(idx).unwrap_or(typed.char).to_string(),
                    green_bold_style,
                ),
                Outcome::Incorrect => Span::styled(
                    match typed.char {
                        ' ' => "·".to_owned(),
                        c => c.to_string(),
                    },
                    red_bold_style,
                ),
            })
            .collect();

        let rest: String = self.round.prompt().chars().skip(input.len()).collect();
        let mut rest = rest.chars();
        if let Some(cursor) = rest.next() {
            spans.push(Span::styled(cursor.to_string(), underlined_dim_bold_style));
        }
        spans.push(Span::styled(rest.collect::<String>(), dim_bold_style));
        Line::from(spans)
    }

    fn footer(&self) -> Paragraph<'static> {
        let hint = match self.celebration {
            Some(event) => Span::styled(
                format!("★ {} ★  (enter)", celebration_text(event)),
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ),
            None => Span::styled(
                "(esc) quit",
                Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM),
            ),
        };
        Paragraph::new(hint)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
    }

    fn render_timeline(&self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let tuples: Vec<(f64, f64)> = self.timeline.iter().map(|p| (p.t, p.wpm)).collect();
        let duration = tuples.last().map(|p| p.0).unwrap_or(1.0).max(1.0);
        let highest_wpm = tuples.iter().map(|p| p.1).fold(1.0_f64, f64::max).ceil();

        let datasets = vec![Dataset::default()
            .marker(Marker::Braille)
            .style(Style::default().fg(Color::Magenta))
            .graph_type(GraphType::Line)
            .data(&tuples)];
        Chart::new(datasets)
            .x_axis(
                Axis::default()
                    .title("seconds")
                    .bounds([1.0, duration])
                    .labels(vec![
                        Span::styled("1", bold_style),
                        Span::styled(format!("{duration:.0}"), bold_style),
                    ]),
            )
            .y_axis(
                Axis::default()
                    .title("wpm")
                    .bounds([0.0, highest_wpm])
                    .labels(vec![
                        Span::styled("0", bold_style),
                        Span::styled(format!("{highest_wpm:.0}"), bold_style),
                    ]),
            )
            .render(area, buf);
    }

    fn stats_line(summary: &SessionSummary) -> String {
        let mut line = format!(
            "{:.0} wpm   {:.0}% acc   {:.2} sd",
            summary.wpm, summary.accuracy_pct, summary.consistency
        );
        if let Some(change) = summary.improvement_from_prev {
            line.push_str(&format!("   {change:+.0}% vs last"));
        }
        line
    }
}

impl Widget for &PracticeView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
        let prompt_width = self.round.prompt().width() as u16;
        let prompt_lines = prompt_width.div_ceil(max_chars_per_line).max(1);

        let middle = match self.summary {
            Some(_) => Constraint::Min(3),
            None => Constraint::Length(prompt_lines),
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                middle,
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(2),
            ])
            .split(area);

        Paragraph::new(self.pet_line())
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        match self.summary {
            None => Paragraph::new(self.prompt_line())
                .alignment(if prompt_lines == 1 {
                    Alignment::Center
                } else {
                    Alignment::Left
                })
                .wrap(Wrap { trim: true })
                .render(chunks[2], buf),
            Some(summary) => {
                self.render_timeline(chunks[2], buf);
                Paragraph::new(Span::styled(
                    PracticeView::stats_line(summary),
                    Style::default().add_modifier(Modifier::BOLD),
                ))
                .alignment(Alignment::Center)
                .render(chunks[3], buf);
            }
        }

        self.footer().render(chunks[5], buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celebration::Priority;
    use crate::pet::EvolutionForm;

    fn text(buf: &Buffer) -> String {
        buf.content().iter().map(|cell| cell.symbol()).collect()
    }

    fn render(view: &PracticeView) -> String {
        let area = Rect::new(0, 0, 80, 14);
        let mut buf = Buffer::empty(area);
        view.render(area, &mut buf);
        text(&buf)
    }

    #[test]
    fn typing_screen_shows_prompt_and_pet() {
        let mut round = PracticeRound::new("the cat");
        round.write('t');
        round.write('x');
        let pet = PetState::default();
        let out = render(&PracticeView {
            round: &round,
            pet: &pet,
            mood: EmotionalState::Neutral,
            celebration: None,
            summary: None,
            timeline: &[],
        });
        assert!(out.contains("(-_-)"));
        assert!(out.contains("Egg"));
        assert!(out.contains("txe cat"));
        assert!(out.contains("(esc) quit"));
    }

    #[test]
    fn celebration_banner_replaces_help() {
        let round = PracticeRound::new("go");
        let pet = PetState::default();
        let event = CelebrationEvent {
            id: 1,
            priority: Priority::High,
            payload: CelebrationPayload::Evolution {
                from: EvolutionForm::Egg,
                to: EvolutionForm::Baby,
            },
        };
        let out = render(&PracticeView {
            round: &round,
            pet: &pet,
            mood: EmotionalState::Happy,
            celebration: Some(&event),
            summary: None,
            timeline: &[],
        });
        assert!(out.contains("Your Egg grew into a Baby!"));
        assert!(!out.contains("(esc) quit"));
    }

    #[test]
    fn faces_differ_per_mood() {
        let faces: std::collections::HashSet<_> = [
            EmotionalState::Ecstatic,
            EmotionalState::Happy,
            EmotionalState::Neutral,
            EmotionalState::Sad,
            EmotionalState::Distressed,
        ]
        .into_iter()
        .map(face)
        .collect();
        assert_eq!(faces.len(), 5);
    }
}

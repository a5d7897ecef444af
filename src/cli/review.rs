use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{LineGauge, Paragraph},
    Frame,
};

use crate::error::Result;
use crate::fmt::money;
use crate::models::{Decision, ReviewStatus};
use crate::store::SqliteStore;
use crate::triage::TriageEngine;
use crate::tui::{
    install_panic_hook, money_span, wrap_text, FOOTER_STYLE, HEADER_STYLE, KEPT_STYLE, MEDICAL_STYLE,
    SKIPPED_STYLE,
};

use super::open_db;

struct TriageScreen<'c> {
    engine: TriageEngine<SqliteStore<'c>>,
    message: Option<(String, Style)>,
}

enum HandleResult {
    Continue,
    Quit,
}

impl<'c> TriageScreen<'c> {
    fn new(engine: TriageEngine<SqliteStore<'c>>) -> Self {
        Self {
            engine,
            message: None,
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let [header_area, progress_area, detail_area, message_area, hints_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(area);

        let header = Line::from(vec![
            Span::styled("Review transactions", HEADER_STYLE),
            Span::raw(format!("   reviewed this session: {}", self.engine.reviewed_count())),
        ]);
        frame.render_widget(Paragraph::new(header), header_area);

        let total = self.engine.queue().len();
        let decided = self
            .engine
            .queue()
            .iter()
            .filter(|t| t.review_status != ReviewStatus::Pending)
            .count();
        let ratio = if total > 0 { decided as f64 / total as f64 } else { 1.0 };
        let gauge = LineGauge::default()
            .label(format!("{decided} of {total}"))
            .ratio(ratio)
            .filled_style(Style::default().fg(Color::Green).bold())
            .unfilled_style(Style::default().fg(Color::DarkGray))
            .line_set(ratatui::symbols::line::THICK);
        frame.render_widget(gauge, progress_area);

        let detail_lines = match self.engine.current() {
            Some(txn) if !self.engine.is_done() => {
                let width = detail_area.width.saturating_sub(15) as usize;
                let (description, _) = wrap_text(&txn.description, width);
                let mut lines = vec![
                    Line::from(""),
                    Line::from(format!("  Date:        {}", txn.date)),
                ];
                for (i, part) in description.lines().enumerate() {
                    let label = if i == 0 { "  Description: " } else { "               " };
                    lines.push(Line::from(format!("{label}{part}")));
                }
                lines.push(Line::from(format!(
                    "  Merchant:    {}",
                    txn.merchant_name.as_deref().unwrap_or("-")
                )));
                lines.push(Line::from(vec![
                    Span::raw("  Amount:      "),
                    money_span(txn.amount, txn.is_refund),
                ]));
                let suggestion = if txn.is_potential_medical {
                    Span::styled(format!("{} (likely medical)", txn.suggested_category), MEDICAL_STYLE)
                } else {
                    Span::raw(txn.suggested_category.label())
                };
                lines.push(Line::from(vec![Span::raw("  Suggested:   "), suggestion]));
                if txn.pending {
                    lines.push(Line::from(Span::styled("  (still pending at the bank)", FOOTER_STYLE)));
                }
                let status = match txn.review_status {
                    ReviewStatus::Pending => Span::raw("pending"),
                    ReviewStatus::Kept => Span::styled("kept", KEPT_STYLE),
                    ReviewStatus::Skipped => Span::styled("skipped", SKIPPED_STYLE),
                };
                lines.push(Line::from(vec![Span::raw("  Status:      "), status]));
                lines
            }
            _ => vec![
                Line::from(""),
                Line::from("  All caught up. Press u to undo the last decision or q to quit."),
            ],
        };
        frame.render_widget(Paragraph::new(detail_lines), detail_area);

        if let Some((text, style)) = &self.message {
            frame.render_widget(Paragraph::new(format!("  {text}")).style(*style), message_area);
        }

        let hints = if self.engine.can_undo() {
            "k=keep, s=skip, u=undo, \u{2190}/\u{2192}=navigate, q=quit"
        } else {
            "k=keep, s=skip, \u{2190}/\u{2192}=navigate, q=quit"
        };
        frame.render_widget(Paragraph::new(hints).style(FOOTER_STYLE), hints_area);
    }

    fn handle_key(&mut self, code: KeyCode) -> HandleResult {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return HandleResult::Quit,
            KeyCode::Left => {
                self.engine.previous();
            }
            KeyCode::Right => {
                self.engine.next();
            }
            KeyCode::Char('k') | KeyCode::Char('K') => self.keep(),
            KeyCode::Char('s') | KeyCode::Char('S') => self.skip(),
            KeyCode::Char('u') | KeyCode::Char('U') => self.undo(),
            _ => {}
        }
        HandleResult::Continue
    }

    fn keep(&mut self) {
        if self.engine.is_done() {
            return;
        }
        self.message = Some(match self.engine.keep_current() {
            Ok(expense) => (
                format!(
                    "Kept as expense {} ({} {})",
                    expense.id,
                    money(expense.amount),
                    expense.category
                ),
                KEPT_STYLE,
            ),
            Err(e) => (e.to_string(), Style::default().fg(Color::Red)),
        });
    }

    fn skip(&mut self) {
        if self.engine.is_done() {
            return;
        }
        self.message = Some(match self.engine.skip_current() {
            Ok(()) => ("Skipped".to_string(), SKIPPED_STYLE),
            Err(e) => (e.to_string(), Style::default().fg(Color::Red)),
        });
    }

    fn undo(&mut self) {
        self.message = Some(match self.engine.undo() {
            Ok(Some(record)) => {
                let what = match record.decision {
                    Decision::Keep => "keep (expense removed)",
                    Decision::Skip => "skip",
                };
                (format!("Undid {what}"), Style::default().fg(Color::Yellow))
            }
            Ok(None) => ("Nothing to undo".to_string(), FOOTER_STYLE),
            Err(e) => (e.to_string(), Style::default().fg(Color::Red)),
        });
    }
}

pub fn run() -> Result<()> {
    let (settings, conn) = open_db()?;
    let engine = TriageEngine::resume(
        SqliteStore::new(&conn),
        &settings.user_id,
        settings.review_batch_size,
    )?;

    if engine.queue().is_empty() {
        println!("No transactions waiting for review.");
        return Ok(());
    }
    println!("{} transactions to review", engine.queue().len());

    let mut screen = TriageScreen::new(engine);
    install_panic_hook();
    let mut terminal = ratatui::init();

    let result: Result<()> = loop {
        if let Err(e) = terminal.draw(|frame| screen.draw(frame)) {
            break Err(e.into());
        }

        match event::read() {
            Err(e) => break Err(e.into()),
            Ok(Event::Key(key)) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    break Ok(());
                }
                match screen.handle_key(key.code) {
                    HandleResult::Continue => {}
                    HandleResult::Quit => break Ok(()),
                }
            }
            _ => {}
        }
    };

    drop(terminal);
    ratatui::restore();

    match &result {
        Ok(()) => println!("Reviewed {} transactions.", screen.engine.reviewed_count()),
        Err(e) => eprintln!("Review error: {e}"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::db::test_db;
    use crate::ingest::ingest;
    use crate::models::RawProviderTransaction;
    use crate::store::ExpenseStore;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use rust_decimal::Decimal;

    fn seed(conn: &rusqlite::Connection) {
        let rows: Vec<RawProviderTransaction> = ["CVS PHARMACY", "LYFT RIDE", "GROCERY OUTLET"]
            .iter()
            .enumerate()
            .map(|(i, name)| RawProviderTransaction {
                external_transaction_id: Some(format!("t{i}")),
                amount_signed: Some(Decimal::new(1000 + i as i64, 2)),
                date: Some("2025-05-01".to_string()),
                name: name.to_string(),
                ..RawProviderTransaction::default()
            })
            .collect();
        ingest(&mut SqliteStore::new(conn), "u1", None, &rows, &Classifier::builtin()).unwrap();
    }

    #[test]
    fn test_keys_drive_the_engine() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let engine = TriageEngine::load(SqliteStore::new(&conn), "u1", 10).unwrap();
        let mut screen = TriageScreen::new(engine);

        assert!(matches!(screen.handle_key(KeyCode::Char('k')), HandleResult::Continue));
        assert!(matches!(screen.handle_key(KeyCode::Char('s')), HandleResult::Continue));
        assert_eq!(screen.engine.reviewed_count(), 2);
        assert_eq!(screen.engine.store().list_expenses("u1").unwrap().len(), 1);

        screen.handle_key(KeyCode::Char('u'));
        screen.handle_key(KeyCode::Char('u'));
        assert_eq!(screen.engine.reviewed_count(), 0);
        assert!(screen.engine.store().list_expenses("u1").unwrap().is_empty());

        screen.handle_key(KeyCode::Char('u'));
        assert_eq!(screen.message.as_ref().map(|(m, _)| m.as_str()), Some("Nothing to undo"));
        assert!(matches!(screen.handle_key(KeyCode::Char('q')), HandleResult::Quit));
    }

    #[test]
    fn test_draw_shows_current_transaction() {
        let (_dir, conn) = test_db();
        seed(&conn);
        let engine = TriageEngine::load(SqliteStore::new(&conn), "u1", 10).unwrap();
        let screen = TriageScreen::new(engine);

        let mut terminal = Terminal::new(TestBackend::new(80, 14)).unwrap();
        terminal.draw(|frame| screen.draw(frame)).unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("CVS PHARMACY"));
        assert!(text.contains("k=keep, s=skip, \u{2190}"));
    }
}

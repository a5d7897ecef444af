use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use rust_decimal::Decimal;

use crate::fmt::money;

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Yellow)
    .add_modifier(Modifier::BOLD);

pub const FOOTER_STYLE: Style = Style::new().fg(Color::DarkGray);

pub const AMOUNT_POS_STYLE: Style = Style::new().fg(Color::Red);
pub const AMOUNT_NEG_STYLE: Style = Style::new().fg(Color::Yellow);

pub const MEDICAL_STYLE: Style = Style::new()
    .fg(Color::Cyan)
    .add_modifier(Modifier::BOLD);

pub const KEPT_STYLE: Style = Style::new().fg(Color::Green);
pub const SKIPPED_STYLE: Style = Style::new().fg(Color::DarkGray);

/// Amounts are stored as magnitudes; the provider's sign is shown as it came.
pub fn money_span(amount: Decimal, is_refund: bool) -> Span<'static> {
    let (text, style) = if is_refund {
        (format!("-{}", money(amount)), AMOUNT_NEG_STYLE)
    } else {
        (money(amount), AMOUNT_POS_STYLE)
    };
    Span::styled(text, style)
}

/// Wrap text to a given width. Returns (wrapped_string, line_count).
pub fn wrap_text(text: &str, width: usize) -> (String, u16) {
    if width == 0 {
        return (text.to_string(), 1);
    }
    let wrapped = textwrap::fill(text, width);
    let lines = wrapped.lines().count().max(1) as u16;
    (wrapped, lines)
}

/// Restore the terminal before the default panic output runs.
pub fn install_panic_hook() {
    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        ratatui::restore();
        hook(info);
    }));
}

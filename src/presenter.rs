//! Presentation adapter
//!
//! The engine never builds UI. It reports state through [`Presenter`], so
//! any visual skin is a thin adapter over the same orchestration core.

use std::io::Write;

use crate::config::Theme;
use crate::history::{Role, Turn};
use crate::session::CallStatus;

/// Visual call indicator (call button state)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Idle,
    Connecting,
    Listening,
    Speaking,
    Paused,
    Ended,
}

impl From<CallStatus> for Indicator {
    fn from(status: CallStatus) -> Self {
        match status {
            CallStatus::Idle => Self::Idle,
            CallStatus::Connecting => Self::Connecting,
            CallStatus::Listening => Self::Listening,
            CallStatus::Speaking => Self::Speaking,
            CallStatus::Suspended => Self::Paused,
            CallStatus::Ended => Self::Ended,
        }
    }
}

/// State-change notifications consumed by a visual skin
pub trait Presenter {
    /// Show a conversation turn
    fn render_turn(&mut self, turn: &Turn);

    /// Show an apology in place of an assistant reply
    fn render_apology(&mut self, text: &str);

    /// Replace the status line
    fn set_status(&mut self, text: &str);

    fn set_indicator(&mut self, indicator: Indicator);

    /// A remote request is pending (typing indicator)
    fn set_loading(&mut self, loading: bool);

    fn set_persistent_mode(&mut self, enabled: bool);
}

/// ANSI terminal skin used by the CLI
pub struct TerminalPresenter<W: Write> {
    out: W,
    theme: Theme,
}

impl TerminalPresenter<std::io::Stdout> {
    #[must_use]
    pub fn stdout(theme: Theme) -> Self {
        Self::new(std::io::stdout(), theme)
    }
}

impl<W: Write> TerminalPresenter<W> {
    pub const fn new(out: W, theme: Theme) -> Self {
        Self { out, theme }
    }

    /// Consume the presenter, returning the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    const fn palette(&self) -> Palette {
        match self.theme {
            Theme::Light => Palette {
                user: "\x1b[34m",
                assistant: "\x1b[35m",
                status: "\x1b[90m",
            },
            Theme::Dark => Palette {
                user: "\x1b[96m",
                assistant: "\x1b[95m",
                status: "\x1b[37m",
            },
        }
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{text}\x1b[0m") {
            tracing::debug!(error = %e, "terminal write failed");
        }
    }
}

struct Palette {
    user: &'static str,
    assistant: &'static str,
    status: &'static str,
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn render_turn(&mut self, turn: &Turn) {
        let palette = self.palette();
        let (color, label) = match turn.role {
            Role::User => (palette.user, "you"),
            Role::Assistant => (palette.assistant, "assistant"),
        };
        self.line(&format!("{color}{label}> {}", turn.content));
    }

    fn render_apology(&mut self, text: &str) {
        let color = self.palette().assistant;
        self.line(&format!("{color}assistant> {text}"));
    }

    fn set_status(&mut self, text: &str) {
        let color = self.palette().status;
        self.line(&format!("{color}[{text}]"));
    }

    fn set_indicator(&mut self, indicator: Indicator) {
        let label = match indicator {
            Indicator::Idle => "idle",
            Indicator::Connecting => "connecting",
            Indicator::Listening => "listening",
            Indicator::Speaking => "speaking",
            Indicator::Paused => "paused",
            Indicator::Ended => "call ended",
        };
        let color = self.palette().status;
        self.line(&format!("{color}({label})"));
    }

    fn set_loading(&mut self, loading: bool) {
        if loading {
            let color = self.palette().status;
            self.line(&format!("{color}..."));
        }
    }

    fn set_persistent_mode(&mut self, enabled: bool) {
        let color = self.palette().status;
        let state = if enabled { "on" } else { "off" };
        self.line(&format!("{color}[persistent call mode {state}]"));
    }
}

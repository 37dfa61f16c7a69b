use crate::ui::{Phase, UiEvent};
use std::io::{self, Write};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Owns the status line. Only the interactive loop holds one.
pub struct Renderer<W: Write = io::Stdout> {
    out: W,
    phase: Phase,
    frame: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Renderer<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            phase: Phase::Idle,
            frame: 0,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn handle(&mut self, event: &UiEvent) {
        match event {
            UiEvent::Phase(phase) => {
                self.phase = phase.clone();
                self.frame = 0;
                self.render_status();
            }
            UiEvent::Heard(text) => {
                // Raw mode needs an explicit carriage return
                let _ = write!(self.out, "\r\x1b[K> {}\r\n", text);
                self.render_status();
            }
            UiEvent::Tick => {
                if !self.phase.is_busy() {
                    return;
                }
                self.frame += 1;
                self.render_status();
            }
            UiEvent::Transcript(_) => return,
        }
        self.out.flush().ok();
    }

    /// Leave the terminal on a fresh line
    pub fn finish(&mut self) {
        let _ = write!(self.out, "\r\x1b[K\r\n");
        self.out.flush().ok();
    }

    fn render_status(&mut self) {
        let _ = match &self.phase {
            Phase::Idle => write!(
                self.out,
                "\r\x1b[K\x1b[90m[space] listen  [q] quit\x1b[0m"
            ),
            phase if phase.is_busy() => {
                let spinner = SPINNER[self.frame % SPINNER.len()];
                write!(self.out, "\r\x1b[K\x1b[33m{} {}\x1b[0m", spinner, phase)
            }
            phase @ Phase::Done(_) => write!(self.out, "\r\x1b[K\x1b[32m✓ {}\x1b[0m", phase),
            phase @ Phase::Failed(_) => write!(self.out, "\r\x1b[K\x1b[31m✗ {}\x1b[0m", phase),
            phase => write!(self.out, "\r\x1b[K\x1b[90m{}\x1b[0m", phase),
        };
    }
}

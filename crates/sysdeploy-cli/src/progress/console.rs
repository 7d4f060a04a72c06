use std::io::{self, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::ConsoleAction;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Destination for everything a command shows the user.
pub(crate) trait Console {
    fn render(&mut self, action: &ConsoleAction) -> io::Result<()>;

    /// Writes a line of command output to stdout.
    fn line(&mut self, text: &str) -> io::Result<()>;

    /// Writes a line of status chatter to stderr.
    fn notice(&mut self, text: &str) -> io::Result<()>;
}

struct ActiveTask {
    label: String,
    bar: Option<ProgressBar>,
}

/// Renders tasks with `indicatif` on a terminal and as plain lines otherwise.
pub(crate) struct TerminalConsole<'a, W: Write, E: Write> {
    stdout: &'a mut W,
    stderr: &'a mut E,
    interactive: bool,
    task: Option<ActiveTask>,
}

impl<'a, W: Write, E: Write> TerminalConsole<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E, interactive: bool) -> Self {
        Self {
            stdout,
            stderr,
            interactive,
            task: None,
        }
    }

    fn begin(&mut self, label: &str, template: &str, length: Option<u64>) -> io::Result<()> {
        self.end(None)?;
        let bar = if self.interactive {
            let bar = ProgressBar::with_draw_target(length, ProgressDrawTarget::stdout());
            if let Ok(style) = ProgressStyle::with_template(template) {
                bar.set_style(style);
            }
            bar.set_message(label.to_owned());
            if length.is_none() {
                bar.enable_steady_tick(TICK_INTERVAL);
            }
            Some(bar)
        } else {
            writeln!(self.stdout, "{label}...")?;
            None
        };
        self.task = Some(ActiveTask {
            label: label.to_owned(),
            bar,
        });
        Ok(())
    }

    fn end(&mut self, suffix: Option<&str>) -> io::Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        if let Some(bar) = task.bar {
            bar.finish_and_clear();
        }
        writeln!(
            self.stdout,
            "{}... {}",
            task.label,
            suffix.unwrap_or("done")
        )
    }

    fn print(&mut self, text: &str) -> io::Result<()> {
        let stdout = &mut *self.stdout;
        match self.task.as_ref().and_then(|task| task.bar.as_ref()) {
            Some(bar) => bar.suspend(|| writeln!(stdout, "{text}")),
            None => writeln!(stdout, "{text}"),
        }
    }
}

impl<W: Write, E: Write> Console for TerminalConsole<'_, W, E> {
    fn render(&mut self, action: &ConsoleAction) -> io::Result<()> {
        match action {
            ConsoleAction::Print(text) => self.print(text),
            ConsoleAction::BeginTask(label) => self.begin(label, "{spinner} {msg}", None),
            ConsoleAction::BeginPercent(label) => {
                self.begin(label, "{msg} [{bar:30}] {pos:>3}%", Some(100))
            }
            ConsoleAction::SetPercent(percent) => {
                if let Some(bar) = self.task.as_ref().and_then(|task| task.bar.as_ref()) {
                    bar.set_position(u64::from(*percent));
                }
                Ok(())
            }
            ConsoleAction::SetMessage(text) => {
                if let Some(task) = self.task.as_mut() {
                    if let Some(bar) = task.bar.as_ref() {
                        bar.set_message(text.clone());
                    }
                    task.label.clone_from(text);
                }
                Ok(())
            }
            ConsoleAction::EndTask(suffix) => self.end(suffix.as_deref()),
        }
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        self.print(text)
    }

    fn notice(&mut self, text: &str) -> io::Result<()> {
        match self.task.as_ref().and_then(|task| task.bar.as_ref()) {
            Some(bar) => bar.suspend(|| writeln!(self.stderr, "{text}")),
            None => writeln!(self.stderr, "{text}"),
        }
    }
}

impl<W: Write, E: Write> Drop for TerminalConsole<'_, W, E> {
    fn drop(&mut self) {
        if let Some(bar) = self.task.take().and_then(|task| task.bar) {
            bar.abandon();
        }
    }
}

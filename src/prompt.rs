// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Interactive step selection.
//!
//! Provisioning asks a sequence of yes/no questions to decide which steps to
//! run. Unattended runs, e.g., cloud-init, CI, or `ssh host hostprep run`
//! without a terminal, must never hang waiting on an answer that will never
//! come. Thus, the [`Selector`] only ever reads input when it has been told
//! that it is interactive. Otherwise, it answers every question with its
//! configured default.

use inquire::{Confirm, InquireError};
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::{info, warn};

/// Source of yes/no answers.
pub trait Prompter {
    /// Ask yes/no question with a default answer.
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;
}

impl<P> Prompter for Box<P>
where
    P: Prompter + ?Sized,
{
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        (**self).confirm(prompt, default)
    }
}

/// Parse yes/no answer.
///
/// Empty input selects the default. Returns `None` for anything that is
/// neither yes nor no.
pub fn parse_answer(input: &str, default: bool) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Hint showing the default answer.
pub fn default_hint(default: bool) -> &'static str {
    if default {
        "[Y/n]"
    } else {
        "[y/N]"
    }
}

/// Question followed by the hint showing its default answer.
pub fn question(prompt: &str, default: bool) -> String {
    format!("{prompt} {}", default_hint(default))
}

/// Terminal prompter through inquire.
///
/// Inquire's own default rendering is left off, so the hint reads the same
/// as [`LinePrompter`]'s. Empty input still selects the default through
/// [`parse_answer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let message = question(prompt, default);
        let answer = Confirm::new(&message)
            .with_parser(&|input| parse_answer(input, default).ok_or(()))
            .with_error_message("answer y, yes, n, or no")
            .prompt();

        match answer {
            Ok(answer) => Ok(answer),
            Err(InquireError::NotTTY) => {
                warn!("terminal went away, using default for {prompt:?}");
                Ok(default)
            }
            Err(InquireError::OperationCanceled) => Ok(default),
            Err(InquireError::OperationInterrupted) => Err(PromptError::Interrupted),
            Err(error) => Err(PromptError::Inquire(error)),
        }
    }
}

/// Plain line-based prompter.
///
/// Used for dumb terminals that cannot render inquire's prompts.
#[derive(Debug)]
pub struct LinePrompter<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> LinePrompter<R, W>
where
    R: BufRead,
    W: Write,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R, W> Prompter for LinePrompter<R, W>
where
    R: BufRead,
    W: Write,
{
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        loop {
            write!(self.writer, "{} ", question(prompt, default))?;
            self.writer.flush()?;

            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                // INVARIANT: End of input means nobody will ever answer.
                writeln!(self.writer)?;
                return Ok(default);
            }

            match parse_answer(&line, default) {
                Some(answer) => return Ok(answer),
                None => writeln!(self.writer, "answer y, yes, n, or no")?,
            }
        }
    }
}

/// Pick the prompter that suits the current terminal.
pub fn terminal_prompter() -> Box<dyn Prompter> {
    let dumb = std::env::var("TERM").map(|term| term == "dumb").unwrap_or(false);
    if dumb {
        Box::new(LinePrompter::new(io::stdin().lock(), io::stdout()))
    } else {
        Box::new(InquirePrompter)
    }
}

/// Check if standard input is attached to a terminal.
pub fn stdin_is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// Step selector.
///
/// Toggles step flags through yes/no questions, falling back to defaults
/// whenever it is not interactive.
#[derive(Debug)]
pub struct Selector<P>
where
    P: Prompter,
{
    prompter: P,
    interactive: bool,
}

impl<P> Selector<P>
where
    P: Prompter,
{
    /// Construct new step selector.
    pub fn new(prompter: P, interactive: bool) -> Self {
        Self {
            prompter,
            interactive,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    /// Ask yes/no question.
    ///
    /// Returns the default without touching the prompter when not
    /// interactive.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError`] if the prompter fails or is interrupted.
    pub fn ask(&mut self, prompt: &str, default_yes: bool) -> Result<bool> {
        if !self.interactive {
            return Ok(default_yes);
        }

        self.prompter.confirm(prompt, default_yes)
    }

    /// Ask yes/no question unless the condition it guards is satisfied.
    ///
    /// A satisfied condition is reported, and answers "no" without asking.
    ///
    /// # Errors
    ///
    /// - Return [`PromptError`] if the prompter fails or is interrupted.
    pub fn choose(
        &mut self,
        prompt: &str,
        default_yes: bool,
        satisfied: Option<String>,
    ) -> Result<bool> {
        if let Some(condition) = satisfied {
            info!("{condition}, skipping");
            return Ok(false);
        }

        self.ask(prompt, default_yes)
    }
}

/// Prompt error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// User interrupted the prompt.
    #[error("prompt interrupted by user")]
    Interrupted,

    /// Inquire failed to prompt.
    #[error(transparent)]
    Inquire(#[from] InquireError),

    /// Reading or writing prompt failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    /// Prompter that counts how often it is asked.
    #[derive(Debug, Default)]
    struct Spy {
        asked: usize,
        answer: bool,
    }

    impl Prompter for Spy {
        fn confirm(&mut self, _prompt: &str, _default: bool) -> Result<bool> {
            self.asked += 1;
            Ok(self.answer)
        }
    }

    #[test_case("", true, Some(true); "empty takes default yes")]
    #[test_case("", false, Some(false); "empty takes default no")]
    #[test_case("y", false, Some(true); "short yes")]
    #[test_case("YES", false, Some(true); "upper yes")]
    #[test_case("  Yes \n", false, Some(true); "padded yes")]
    #[test_case("n", true, Some(false); "short no")]
    #[test_case("No", true, Some(false); "mixed no")]
    #[test_case("maybe", true, None; "garbage")]
    #[test_case("yess", true, None; "near miss")]
    #[test]
    fn parse_answers(input: &str, default: bool, expect: Option<bool>) {
        assert_eq!(parse_answer(input, default), expect);
    }

    #[test_case(true, "Harden SSH daemon? [Y/n]"; "default yes")]
    #[test_case(false, "Harden SSH daemon? [y/N]"; "default no")]
    #[test]
    fn question_shows_bracketed_default(default: bool, expect: &str) {
        assert_eq!(question("Harden SSH daemon?", default), expect);
    }

    #[test_case(true; "default yes")]
    #[test_case(false; "default no")]
    #[test]
    fn non_interactive_returns_default_without_reading(default: bool) -> anyhow::Result<()> {
        let mut selector = Selector::new(Spy::default(), false);
        assert_eq!(selector.ask("Install base packages?", default)?, default);
        assert_eq!(selector.prompter().asked, 0);
        Ok(())
    }

    #[test]
    fn interactive_asks_prompter() -> anyhow::Result<()> {
        let spy = Spy {
            answer: true,
            ..Default::default()
        };
        let mut selector = Selector::new(spy, true);
        assert!(selector.ask("Harden SSH?", false)?);
        assert_eq!(selector.prompter().asked, 1);
        Ok(())
    }

    #[test]
    fn satisfied_condition_short_circuits() -> anyhow::Result<()> {
        let mut selector = Selector::new(Spy::default(), true);
        let answer = selector.choose(
            "Generate locale?",
            true,
            Some("locale en_US.UTF-8 already generated".into()),
        )?;
        assert!(!answer);
        assert_eq!(selector.prompter().asked, 0);
        Ok(())
    }

    #[test]
    fn line_prompter_reprompts_until_valid() -> anyhow::Result<()> {
        let input = b"what\nsure\nyes\n";
        let mut output = Vec::new();
        let answer = LinePrompter::new(&input[..], &mut output).confirm("Enable swap?", false)?;

        assert!(answer);
        let shown = String::from_utf8(output)?;
        assert_eq!(shown.matches("Enable swap? [y/N]").count(), 3);
        assert_eq!(shown.matches("answer y, yes, n, or no").count(), 2);
        Ok(())
    }

    #[test]
    fn line_prompter_empty_line_takes_default() -> anyhow::Result<()> {
        let mut output = Vec::new();
        let answer = LinePrompter::new(&b"\n"[..], &mut output).confirm("Install docker?", true)?;
        assert!(answer);
        assert!(String::from_utf8(output)?.contains("[Y/n]"));
        Ok(())
    }

    #[test]
    fn line_prompter_eof_takes_default() -> anyhow::Result<()> {
        let mut output = Vec::new();
        let answer = LinePrompter::new(&b""[..], &mut output).confirm("Install docker?", true)?;
        assert!(answer);
        Ok(())
    }
}

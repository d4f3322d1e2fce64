// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed block editing.
//!
//! Some files hostprep must touch are not its own, e.g., a user's
//! `~/.bashrc`, or `/etc/fstab`. Overwriting them wholesale would clobber
//! whatever the user or the distribution put there. Instead hostprep owns a
//! single __managed block__ inside such files:
//!
//! ```text
//! # BEGIN hostprep shell
//! [ -f ~/.config/hostprep/shell.sh ] && . ~/.config/hostprep/shell.sh
//! # END hostprep shell
//! ```
//!
//! Everything outside the markers is left alone. Applying the same block
//! twice changes nothing.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Block of lines owned by hostprep inside a foreign file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ManagedBlock {
    name: String,
    body: String,
    at_top: bool,
}

impl ManagedBlock {
    /// Construct new managed block.
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            at_top: false,
        }
    }

    /// Insert block at the top of the file instead of the bottom.
    ///
    /// For files where the first occurrence of a setting wins, e.g.,
    /// `sshd_config`.
    pub fn at_top(mut self) -> Self {
        self.at_top = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn begin_marker(&self) -> String {
        format!("# BEGIN hostprep {}", self.name)
    }

    pub fn end_marker(&self) -> String {
        format!("# END hostprep {}", self.name)
    }
}

impl Display for ManagedBlock {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "{}", self.begin_marker())?;
        for line in self.body.lines() {
            writeln!(fmt, "{line}")?;
        }
        writeln!(fmt, "{}", self.end_marker())
    }
}

/// Managed block editor.
///
/// # Invariant
///
/// - At most one copy of a named block.
/// - Lines outside the block keep their order and content.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockEdit {
    lines: Vec<String>,
    changed: bool,
}

impl BlockEdit {
    /// Construct new empty block editor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if any edit changed the content.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Insert block, or replace it in place if it already exists.
    pub fn upsert(&mut self, block: &ManagedBlock) {
        let rendered = block
            .to_string()
            .lines()
            .map(str::to_owned)
            .collect::<Vec<_>>();

        match self.find(block) {
            Some((begin, end)) => {
                if self.lines[begin..=end] != rendered[..] {
                    self.lines.splice(begin..=end, rendered);
                    self.changed = true;
                }
            }
            None if block.at_top => {
                self.lines.splice(0..0, rendered);
                self.changed = true;
            }
            None => {
                self.lines.extend(rendered);
                self.changed = true;
            }
        }
    }

    /// Remove block if present.
    pub fn remove(&mut self, block: &ManagedBlock) {
        if let Some((begin, end)) = self.find(block) {
            self.lines.drain(begin..=end);
            self.changed = true;
        }
    }

    /// Check if block exists exactly as given.
    pub fn contains(&self, block: &ManagedBlock) -> bool {
        let rendered = block.to_string();
        self.find(block)
            .map(|(begin, end)| {
                self.lines[begin..=end]
                    .iter()
                    .map(String::as_str)
                    .eq(rendered.lines())
            })
            .unwrap_or(false)
    }

    fn find(&self, block: &ManagedBlock) -> Option<(usize, usize)> {
        let begin_marker = block.begin_marker();
        let end_marker = block.end_marker();
        let begin = self
            .lines
            .iter()
            .position(|line| line.trim_end() == begin_marker)?;
        let end = self.lines[begin..]
            .iter()
            .position(|line| line.trim_end() == end_marker)?;

        Some((begin, begin + end))
    }
}

impl Display for BlockEdit {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        for line in &self.lines {
            writeln!(fmt, "{line}")?;
        }

        Ok(())
    }
}

impl From<&str> for BlockEdit {
    fn from(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_owned).collect(),
            changed: false,
        }
    }
}

impl From<String> for BlockEdit {
    fn from(content: String) -> Self {
        Self::from(content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn block_edit_appends_missing_block() {
        let mut editor = BlockEdit::from(indoc! {r#"
            # ~/.bashrc
            alias ls='ls --color=auto'
        "#});
        editor.upsert(&ManagedBlock::new("shell", ". ~/.config/hostprep/shell.sh"));

        let expect = indoc! {r#"
            # ~/.bashrc
            alias ls='ls --color=auto'
            # BEGIN hostprep shell
            . ~/.config/hostprep/shell.sh
            # END hostprep shell
        "#};
        assert!(editor.changed());
        assert_eq!(editor.to_string(), expect);
    }

    #[test]
    fn block_edit_replaces_block_in_place() {
        let mut editor = BlockEdit::from(indoc! {r#"
            UUID=abc / ext4 defaults 0 1
            # BEGIN hostprep swap
            /swapfile none swap sw 0 0
            # END hostprep swap
            tmpfs /tmp tmpfs defaults 0 0
        "#});
        editor.upsert(&ManagedBlock::new("swap", "/swap.img none swap sw 0 0"));

        let expect = indoc! {r#"
            UUID=abc / ext4 defaults 0 1
            # BEGIN hostprep swap
            /swap.img none swap sw 0 0
            # END hostprep swap
            tmpfs /tmp tmpfs defaults 0 0
        "#};
        assert_eq!(editor.to_string(), expect);
    }

    #[test]
    fn block_edit_same_block_is_unchanged() {
        let block = ManagedBlock::new("swap", "/swapfile none swap sw 0 0");
        let mut editor = BlockEdit::from(block.to_string());
        editor.upsert(&block);

        assert!(!editor.changed());
        assert!(editor.contains(&block));
        assert_eq!(editor.to_string(), block.to_string());
    }

    #[test]
    fn block_edit_inserts_top_block_first() {
        let mut editor = BlockEdit::from("Port 22\nUsePAM yes\n");
        let block = ManagedBlock::new("ssh", "Include /etc/ssh/sshd_config.d/*.conf").at_top();
        editor.upsert(&block);
        editor.upsert(&block);

        let expect = indoc! {r#"
            # BEGIN hostprep ssh
            Include /etc/ssh/sshd_config.d/*.conf
            # END hostprep ssh
            Port 22
            UsePAM yes
        "#};
        assert_eq!(editor.to_string(), expect);
    }

    #[test]
    fn block_edit_removes_block() {
        let block = ManagedBlock::new("locale", "en_US.UTF-8 UTF-8");
        let mut editor = BlockEdit::from(format!("# locales\n{block}C.UTF-8 UTF-8\n"));
        editor.remove(&block);

        assert!(editor.changed());
        assert_eq!(editor.to_string(), "# locales\nC.UTF-8 UTF-8\n");
    }
}

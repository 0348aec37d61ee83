//! Interactive admin menu.
//!
//! Reads commands line by line from any `BufRead` and writes to any `Write`,
//! so a session can be scripted in tests. Destructive commands ask for an
//! explicit `yes` before touching the store.

use std::io::{self, BufRead, Write};

use chatstore_core::{DocumentStore, StoreError};

use crate::render;

const MENU: &str = "\
Admin Menu
1) List users
2) Delete user
3) Change username
4) Change contact number
5) List chats
6) Delete chat
7) Backup current data file
9) Save now
0) Exit";

/// How the menu loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuExit {
    /// Operator chose `0`
    Requested,
    /// Input closed (EOF)
    EndOfInput,
}

/// Ask `question` and return true only for an explicit `yes`.
///
/// End of input counts as a refusal.
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> io::Result<bool> {
    write!(output, "{question} (yes/NO): ")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(false);
    }
    Ok(line.trim().eq_ignore_ascii_case("yes"))
}

pub struct Menu<'a, R, W> {
    store: &'a DocumentStore,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> Menu<'a, R, W> {
    pub fn new(store: &'a DocumentStore, input: R, output: W) -> Self {
        Self {
            store,
            input,
            output,
        }
    }

    /// Run until the operator exits or input ends.
    ///
    /// Store errors are reported and the loop continues; only terminal I/O
    /// errors end it early.
    pub fn run(&mut self) -> io::Result<MenuExit> {
        loop {
            writeln!(self.output, "\n{MENU}")?;
            let Some(choice) = self.prompt("Select> ")? else {
                return Ok(MenuExit::EndOfInput);
            };

            match choice.as_str() {
                "1" => self.list_users()?,
                "2" => self.delete_user()?,
                "3" => self.rename_user()?,
                "4" => self.change_contact()?,
                "5" => self.list_chats()?,
                "6" => self.delete_chat()?,
                "7" => self.backup()?,
                "9" => self.save()?,
                "0" => return Ok(MenuExit::Requested),
                _ => writeln!(self.output, "Unknown option.")?,
            }
        }
    }

    /// Trimmed line, or `None` at end of input
    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Like [`prompt`](Self::prompt), but empty answers also yield `None`
    fn ask(&mut self, label: &str) -> io::Result<Option<String>> {
        Ok(self.prompt(label)?.filter(|s| !s.is_empty()))
    }

    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let confirmed = confirm(&mut self.input, &mut self.output, question)?;
        if !confirmed {
            writeln!(self.output, "Aborted.")?;
        }
        Ok(confirmed)
    }

    fn report(&mut self, err: &StoreError) -> io::Result<()> {
        if err.is_rejection() {
            tracing::debug!(error = %err, "command rejected");
        } else {
            tracing::warn!(error = %err, "command failed");
        }
        writeln!(self.output, "{}", render::error_message(err))
    }

    fn list_users(&mut self) -> io::Result<()> {
        let users = self.store.list_users();
        writeln!(self.output, "Users:")?;
        if users.is_empty() {
            writeln!(self.output, "(none)")?;
        }
        for user in &users {
            writeln!(self.output, "{}", render::user_line(user))?;
        }
        Ok(())
    }

    fn list_chats(&mut self) -> io::Result<()> {
        let chats = self.store.list_chats();
        writeln!(self.output, "Chats:")?;
        if chats.is_empty() {
            writeln!(self.output, "(none)")?;
        }
        for chat in &chats {
            writeln!(self.output, "{}", render::chat_line(chat))?;
        }
        Ok(())
    }

    fn delete_user(&mut self) -> io::Result<()> {
        let Some(name) = self.ask("Username to delete: ")? else {
            return Ok(());
        };
        // Checked before asking, so a typo does not cost a confirmation.
        if !self.store.has_user(&name) {
            return writeln!(self.output, "User not found.");
        }
        if !self.confirm(&format!(
            "Confirm delete user '{name}' and all related chats/requests?"
        ))? {
            return Ok(());
        }

        match self.store.delete_user(&name) {
            Ok(report) => writeln!(self.output, "{}", render::delete_user_summary(&name, &report)),
            Err(e) => self.report(&e),
        }
    }

    fn rename_user(&mut self) -> io::Result<()> {
        let Some(old) = self.ask("Old username: ")? else {
            return Ok(());
        };
        let Some(new) = self.ask("New username: ")? else {
            return Ok(());
        };
        if !self.confirm(&format!("Confirm rename '{old}' -> '{new}'?"))? {
            return Ok(());
        }

        match self.store.rename_user(&old, &new) {
            Ok(report) => writeln!(self.output, "{}", render::rename_summary(&old, &new, &report)),
            Err(e) => self.report(&e),
        }
    }

    fn change_contact(&mut self) -> io::Result<()> {
        let Some(user) = self.ask("Username: ")? else {
            return Ok(());
        };
        let Some(contact) = self.ask("New contact number (e.g., C-123456): ")? else {
            return Ok(());
        };
        if !self.confirm(&format!("Confirm set contact number of '{user}' to {contact}?"))? {
            return Ok(());
        }

        match self.store.change_contact_number(&user, &contact) {
            Ok(previous) => writeln!(
                self.output,
                "Contact number for '{}' changed from {} to {}.",
                user,
                previous.as_deref().unwrap_or("(none)"),
                contact
            ),
            Err(e) => self.report(&e),
        }
    }

    fn delete_chat(&mut self) -> io::Result<()> {
        let Some(chat_id) = self.ask("Chat ID to delete: ")? else {
            return Ok(());
        };
        if !self.store.has_chat(&chat_id) {
            return writeln!(self.output, "Chat not found.");
        }
        if !self.confirm(&format!("Confirm delete chat '{chat_id}'?"))? {
            return Ok(());
        }

        match self.store.delete_chat(&chat_id) {
            Ok(removed) => writeln!(self.output, "Deleted chat '{chat_id}'. removed={removed}"),
            Err(e) => self.report(&e),
        }
    }

    fn backup(&mut self) -> io::Result<()> {
        match self.store.backup("manual backup") {
            Ok(record) => writeln!(self.output, "Backup written: {}", record.path.display()),
            Err(e) => self.report(&e),
        }
    }

    fn save(&mut self) -> io::Result<()> {
        writeln!(self.output, "Forcing save...")?;
        match self.store.force_save() {
            Ok(()) => writeln!(self.output, "Saved."),
            Err(e) => self.report(&e),
        }
    }
}

//! The menu a connection sees before it enters the world.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::auth::{Authenticator, CredentialError, MAX_EMAIL_LEN, MAX_NAME_LEN, MAX_PASSWORD_LEN};
use crate::transport::{ansi, OutputHandle, TelnetReader, TransportError};

use super::line::{Echo, LineEditor};

const BANNER: [&str; 5] = [
    r" __  __ __  __  ___  ___  ___   ___ _   _ ___ ",
    r"|  \/  |  \/  |/ _ \| _ \/ _ \ / __| | | | __|",
    r"| |\/| | |\/| | (_) |   / (_) | (_ | |_| | _| ",
    r"|_|  |_|_|  |_|\___/|_|_\\___/ \___|\___/|___|",
    r"",
];

const FORM_X: usize = 1;
const FORM_Y: usize = 10;
const FORM_WIDTH: usize = 40;

/// How the login conversation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(String),
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Menu,
    LogIn,
    CreateAccount,
}

/// Runs the menu, login form, and account form until the user logs in or
/// leaves. Credential failures re-prompt; only transport failures end it
/// early.
pub struct LoginFlow<'a, R> {
    reader: &'a mut TelnetReader<R>,
    editor: &'a mut LineEditor,
    auth: Arc<dyn Authenticator>,
    output: OutputHandle,
}

impl<'a, R: AsyncRead + Unpin> LoginFlow<'a, R> {
    pub fn new(
        reader: &'a mut TelnetReader<R>,
        editor: &'a mut LineEditor,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        let output = reader.output().clone();
        Self {
            reader,
            editor,
            auth,
            output,
        }
    }

    pub async fn run(mut self) -> Result<LoginOutcome, TransportError> {
        self.output.write(ansi::CLEAR_SCREEN);
        for (row, line) in BANNER.iter().enumerate() {
            self.output.write_at(12, row + 1, line.as_bytes());
        }
        self.output.write(ansi::cursor_visibility(true));

        let mut step = Step::Menu;
        let outcome = loop {
            step = match step {
                Step::Menu => match self.menu().await? {
                    Some(next) => next,
                    None => break LoginOutcome::Disconnect,
                },
                Step::LogIn => match self.log_in().await? {
                    Some(name) => break LoginOutcome::Authenticated(name),
                    None => Step::Menu,
                },
                Step::CreateAccount => {
                    self.create_account().await?;
                    Step::Menu
                }
            };
        };

        self.output.write(ansi::CLEAR_SCREEN);
        self.output.write(ansi::cursor_visibility(false));
        Ok(outcome)
    }

    fn line(&self, row: usize, text: &str) {
        self.output.write_at(FORM_X, FORM_Y + row, text.as_bytes());
    }

    fn clear_rows(&self, first: usize, count: usize) {
        let blank = " ".repeat(FORM_WIDTH);
        for row in first..first + count {
            self.line(row, &blank);
        }
    }

    /// Rewrite `row` as `text` padded over whatever was there.
    fn prompt(&self, row: usize, text: &str) {
        self.line(row, &format!("{text:<width$}", width = FORM_WIDTH));
        self.line(row, text);
    }

    async fn read(&mut self, max: usize, echo: Echo) -> Result<String, TransportError> {
        self.editor.read_line(&mut *self.reader, max, echo).await
    }

    /// `None` means the user chose to disconnect.
    async fn menu(&mut self) -> Result<Option<Step>, TransportError> {
        loop {
            self.clear_rows(0, 5);
            self.line(0, "1. Log in");
            self.line(1, "2. Create account");
            self.line(2, "3. Disconnect");
            self.line(4, "Selection: ");
            let choice = self.read(1, Echo::Visible).await?;
            match choice.as_str() {
                "1" => {
                    self.clear_rows(0, 5);
                    return Ok(Some(Step::LogIn));
                }
                "2" => {
                    self.clear_rows(0, 5);
                    return Ok(Some(Step::CreateAccount));
                }
                "3" => return Ok(None),
                _ => {}
            }
        }
    }

    async fn log_in(&mut self) -> Result<Option<String>, TransportError> {
        self.clear_rows(0, 3);
        self.prompt(0, "User name: ");
        let name = self.read(MAX_NAME_LEN, Echo::Visible).await?;
        self.prompt(1, "Password: ");
        let password = self.read(MAX_PASSWORD_LEN, Echo::Hidden).await?;

        let auth = Arc::clone(&self.auth);
        let user = name.clone();
        let accepted = tokio::task::spawn_blocking(move || auth.authenticate(&user, &password))
            .await
            .unwrap_or_else(|err| {
                warn!(target: "mmorogue::session", error = %err, "credential check panicked");
                false
            });

        if accepted {
            info!(target: "mmorogue::session", user = %name, "login succeeded");
            self.clear_rows(0, 3);
            Ok(Some(name))
        } else {
            info!(target: "mmorogue::session", user = %name, "login failed");
            self.clear_rows(0, 2);
            self.prompt(2, "Invalid credentials");
            Ok(None)
        }
    }

    async fn create_account(&mut self) -> Result<(), TransportError> {
        self.clear_rows(0, 5);

        let name = loop {
            self.prompt(0, "User name: ");
            let name = self.read(MAX_NAME_LEN, Echo::Visible).await?;
            if name.is_empty() {
                continue;
            }
            if !self.auth.user_exists(&name) {
                self.clear_rows(1, 3);
                break name;
            }
            self.prompt(2, "User already exists");
        };

        let password = loop {
            self.prompt(1, "Password: ");
            let password = self.read(MAX_PASSWORD_LEN, Echo::Hidden).await?;
            if password.is_empty() {
                self.prompt(3, "I'd prefer a longer password");
                continue;
            }
            self.prompt(2, "Repeat password: ");
            let repeated = self.read(MAX_PASSWORD_LEN, Echo::Hidden).await?;
            if password == repeated {
                self.clear_rows(2, 2);
                break password;
            }
            self.prompt(3, "Passwords do not match");
            self.clear_rows(2, 1);
        };

        self.prompt(3, "E-mail for password recovery: ");
        let email = self.read(MAX_EMAIL_LEN, Echo::Visible).await?;

        let auth = Arc::clone(&self.auth);
        let user = name.clone();
        let created = tokio::task::spawn_blocking(move || auth.create_user(&user, &password, &email))
            .await
            .unwrap_or_else(|err| Err(CredentialError::Hash(err.to_string())));

        self.clear_rows(0, 5);
        match created {
            Ok(()) => {
                self.prompt(6, "Account created, please log in");
                info!(target: "mmorogue::session", user = %name, "account created");
            }
            Err(err) => {
                self.prompt(6, &format!("Account creation failed: {err}"));
                warn!(target: "mmorogue::session", user = %name, error = %err, "account creation failed");
            }
        }
        Ok(())
    }
}

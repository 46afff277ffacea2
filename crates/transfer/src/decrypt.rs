//! The external decryption command and its secret key

use sluice_errors::{Error, TransferError};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Extension required of secret key files
const SECRET_KEY_EXTENSION: &str = "sec";

/// How to run the decryption tool for one transfer
///
/// The secret key may be plaintext material produced just for this run; the
/// piped transfer deletes it when it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionContext {
    binary_path: PathBuf,
    secret_key_path: PathBuf,
    shell: Vec<String>,
}

impl DecryptionContext {
    /// # Errors
    ///
    /// Returns `InvalidSecretKey` if the key is missing or lacks the `.sec`
    /// extension, and `InvalidRequest` for an empty shell argv.
    pub fn new(
        binary_path: impl Into<PathBuf>,
        secret_key_path: impl Into<PathBuf>,
        shell: Vec<String>,
    ) -> Result<Self, Error> {
        let secret_key_path = secret_key_path.into();
        let rejected = |message: &str| TransferError::InvalidSecretKey {
            path: secret_key_path.display().to_string(),
            message: message.to_string(),
        };

        if secret_key_path.extension().and_then(|e| e.to_str()) != Some(SECRET_KEY_EXTENSION) {
            return Err(rejected("expected a .sec file").into());
        }
        if !secret_key_path.is_file() {
            return Err(rejected("no such file").into());
        }
        if shell.first().is_none_or(String::is_empty) {
            return Err(TransferError::InvalidRequest {
                message: "decrypt shell must name an interpreter".to_string(),
            }
            .into());
        }

        Ok(Self {
            binary_path: binary_path.into(),
            secret_key_path,
            shell,
        })
    }

    #[must_use]
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    #[must_use]
    pub fn secret_key_path(&self) -> &Path {
        &self.secret_key_path
    }

    #[must_use]
    pub fn shell(&self) -> &[String] {
        &self.shell
    }

    /// `<binary> decrypt --sk <key> > <destination>`
    #[must_use]
    pub fn decrypt_command(&self, destination: &Path) -> String {
        format!(
            "{} decrypt --sk {} > {}",
            shell_quote(&self.binary_path.to_string_lossy()),
            shell_quote(&self.secret_key_path.to_string_lossy()),
            shell_quote(&destination.to_string_lossy()),
        )
    }

    /// The shell invocation with stdin and stderr piped
    ///
    /// The shell's own stdout is discarded; the tool's output goes to the
    /// destination through the redirect inside the command string.
    pub(crate) fn command(&self, destination: &Path) -> Command {
        let mut command = Command::new(&self.shell[0]);
        command
            .args(&self.shell[1..])
            .arg(self.decrypt_command(destination))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Single-quote `arg` unless it is made only of shell-safe characters
fn shell_quote(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c));
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

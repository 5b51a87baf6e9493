//! Terminal confirmation in front of the local signing key

use async_trait::async_trait;
use datalic_core::{Error, Result};
use datalic_reveal::{HmacSigner, MessageSigner, Signature};
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Opens the reader the answer comes from. Called on the prompt thread.
pub type InputSource = Arc<dyn Fn() -> Box<dyn BufRead> + Send + Sync>;

/// Shows the attestation message and signs only if the user says yes
pub struct PromptSigner {
    inner: HmacSigner,
    auto_approve: bool,
    input: InputSource,
}

impl PromptSigner {
    pub fn new(inner: HmacSigner, auto_approve: bool) -> Self {
        Self::with_input(inner, auto_approve, Arc::new(stdin_input))
    }

    pub fn with_input(inner: HmacSigner, auto_approve: bool, input: InputSource) -> Self {
        Self {
            inner,
            auto_approve,
            input,
        }
    }

    /// Ask on a detached thread. A blocked read must not outlive an abandoned
    /// request in the runtime's blocking pool, or shutdown waits for Enter.
    async fn ask(&self, message: &str) -> Result<bool> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let input = Arc::clone(&self.input);
        let message = message.to_string();

        std::thread::Builder::new()
            .name("datalic-prompt".into())
            .spawn(move || {
                let mut reader = input();
                let mut stderr = std::io::stderr();
                let _ = tx.send(confirm(&message, &mut reader, &mut stderr));
            })
            .map_err(|e| Error::Unknown(format!("could not start prompt: {}", e)))?;

        rx.await
            .map_err(|_| Error::Unknown("prompt ended without an answer".into()))
    }
}

fn stdin_input() -> Box<dyn BufRead> {
    Box::new(std::io::stdin().lock())
}

#[async_trait]
impl MessageSigner for PromptSigner {
    async fn sign_message(&self, message: &str) -> Result<Signature> {
        if !self.auto_approve && !self.ask(message).await? {
            return Err(Error::UserRejected);
        }
        self.inner.sign(message)
    }
}

/// Render the request and read a y/N answer. EOF or a read error counts as no.
pub fn confirm(message: &str, input: &mut impl BufRead, out: &mut impl Write) -> bool {
    let _ = writeln!(out, "Signature requested for:\n");
    for line in message.lines() {
        let _ = writeln!(out, "  {}", abbreviate(line));
    }
    let _ = write!(out, "\nSign this message? [y/N] ");
    let _ = out.flush();

    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
    }
}

/// The public key line is 2000 hex digits; keep the prompt readable
fn abbreviate(line: &str) -> String {
    const KEEP: usize = 24;
    let chars: Vec<char> = line.chars().collect();
    if chars.len() <= KEEP * 2 + 3 {
        return line.to_string();
    }
    let head: String = chars[..KEEP].iter().collect();
    let tail: String = chars[chars.len() - KEEP..].iter().collect();
    format!("{}...{}", head, tail)
}

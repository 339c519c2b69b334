use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::theme::{BOLD, CYAN, DIM, RESET, YELLOW};

pub const MAX_PRODUCT_NAME_CHARS: usize = 100;
/// Names longer than this many words get a "continue anyway?" prompt.
pub const LONG_NAME_WORDS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductNameError {
    #[error("product name cannot be empty")]
    Empty,
    #[error("product name is too long ({chars} characters); use at most {max}", max = MAX_PRODUCT_NAME_CHARS)]
    TooLong { chars: usize },
}

/// Trim and check a product name. Returns the trimmed name.
pub fn validate_product_name(raw: &str) -> Result<String, ProductNameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ProductNameError::Empty);
    }
    let chars = name.chars().count();
    if chars > MAX_PRODUCT_NAME_CHARS {
        return Err(ProductNameError::TooLong { chars });
    }
    Ok(name.to_string())
}

pub fn is_wordy(name: &str) -> bool {
    name.split_whitespace().count() > LONG_NAME_WORDS
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Line-oriented prompts over any reader/writer pair.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{text}").context("failed to write to stdout")
    }

    /// `None` once input is closed.
    pub fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{prompt}").context("failed to write to stdout")?;
        self.output.flush().context("failed to flush stdout")?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("failed to read input from stdin")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(self
            .ask(&format!("{question} (y/n): "))?
            .is_some_and(|answer| is_yes(&answer)))
    }

    /// Prompt until a valid, confirmed product name is entered.
    pub fn read_product_name(&mut self) -> Result<String> {
        loop {
            let Some(raw) = self.ask(&format!("\n{BOLD}Enter the product name to analyze:{RESET} "))?
            else {
                return Err(anyhow::anyhow!(
                    "no product name entered; failed to read input before end of stream"
                ));
            };

            let name = match validate_product_name(&raw) {
                Ok(name) => name,
                Err(err) => {
                    self.say(&format!("{YELLOW}✗{RESET} {err}"))?;
                    continue;
                }
            };

            if is_wordy(&name) {
                self.say(&format!(
                    "{DIM}Consider a shorter, more specific product name for better results.{RESET}"
                ))?;
                if !self.confirm("Continue anyway?")? {
                    continue;
                }
            }

            self.say(&format!("\nYou want to analyze: {CYAN}'{name}'{RESET}"))?;
            if self.confirm("Start analysis?")? {
                return Ok(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn validation_trims_and_bounds_names() {
        assert_eq!(validate_product_name("  Solar Kettle \n"), Ok("Solar Kettle".to_string()));
        assert_eq!(validate_product_name("   "), Err(ProductNameError::Empty));
        assert_eq!(
            validate_product_name(&"a".repeat(101)),
            Err(ProductNameError::TooLong { chars: 101 })
        );
        assert!(validate_product_name(&"é".repeat(100)).is_ok());
    }

    #[test]
    fn wordy_names_need_more_than_five_words() {
        assert!(!is_wordy("one two three four five"));
        assert!(is_wordy("one two three four five six"));
    }

    #[test]
    fn invalid_entries_are_reprompted() {
        let mut console = console("\n\nSolar Kettle\nyes\n");
        let name = console.read_product_name().expect("name should be accepted");
        assert_eq!(name, "Solar Kettle");
        let transcript = String::from_utf8(console.output).expect("utf8");
        assert_eq!(transcript.matches("product name cannot be empty").count(), 2);
    }

    #[test]
    fn declining_wordy_or_final_confirmation_starts_over() {
        let mut console = console(
            "a very long name with many words\nn\nKettle\nno\nKettle\ny\n",
        );
        assert_eq!(console.read_product_name().expect("name"), "Kettle");
        let transcript = String::from_utf8(console.output).expect("utf8");
        assert!(transcript.contains("Continue anyway? (y/n)"));
        assert_eq!(transcript.matches("Start analysis? (y/n)").count(), 2);
    }

    #[test]
    fn closed_input_is_an_error() {
        let mut console = console("");
        let err = console.read_product_name().unwrap_err();
        assert!(err.to_string().contains("failed to read input"));
        assert!(!console.confirm("Save?").expect("confirm on EOF"));
    }
}

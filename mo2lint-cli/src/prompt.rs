//! Interactive confirmation prompts.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm as ConfirmPrompt, Select};
use mo2lint::confirm::Confirm;

/// Terminal implementation of [`Confirm`].
///
/// A failed or aborted prompt counts as "no".
pub struct ConsolePrompt {
    theme: ColorfulTheme,
}

impl ConsolePrompt {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for ConsolePrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Confirm for ConsolePrompt {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        ConfirmPrompt::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()
            .unwrap_or(false)
    }

    fn choose(&self, prompt: &str, options: &[&str], default: usize) -> Option<usize> {
        Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(options)
            .default(default)
            .interact_opt()
            .ok()
            .flatten()
    }
}

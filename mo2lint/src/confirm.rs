//! Confirmation capability for destructive or ambiguous operations.
//!
//! The library never reads from a terminal. Callers inject a [`Confirm`]
//! implementation; the CLI provides one backed by interactive prompts.

/// How to dispose of an instance's installed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalChoice {
    /// Move into the user's trash.
    Trash,
    /// Remove permanently.
    Delete,
    /// Leave the files in place.
    Keep,
}

impl RemovalChoice {
    pub const ALL: [RemovalChoice; 3] = [Self::Trash, Self::Delete, Self::Keep];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Trash => "Move to trash",
            Self::Delete => "Delete permanently",
            Self::Keep => "Keep files",
        }
    }
}

/// Answers yes/no and multiple-choice questions.
pub trait Confirm {
    /// Ask a yes/no question. `default` is the answer when the user just
    /// accepts the prompt.
    fn confirm(&self, prompt: &str, default: bool) -> bool;

    /// Pick one of `options`, returning its position. `None` means the user
    /// backed out.
    fn choose(&self, prompt: &str, options: &[&str], default: usize) -> Option<usize>;

    /// Ask how to remove an install directory.
    fn removal(&self, prompt: &str) -> RemovalChoice {
        let labels: Vec<&str> = RemovalChoice::ALL.iter().map(|c| c.label()).collect();
        self.choose(prompt, &labels, 0)
            .and_then(|i| RemovalChoice::ALL.get(i).copied())
            .unwrap_or(RemovalChoice::Keep)
    }
}

impl<C: Confirm + ?Sized> Confirm for &C {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        (**self).confirm(prompt, default)
    }

    fn choose(&self, prompt: &str, options: &[&str], default: usize) -> Option<usize> {
        (**self).choose(prompt, options, default)
    }
}

/// Non-interactive answers.
///
/// `Unattended::refuse()` declines every destructive action, which keeps
/// batch runs safe. `Unattended::accept()` takes the defaults.
#[derive(Debug, Clone, Copy)]
pub struct Unattended {
    accept: bool,
}

impl Unattended {
    pub fn accept() -> Self {
        Self { accept: true }
    }

    pub fn refuse() -> Self {
        Self { accept: false }
    }
}

impl Confirm for Unattended {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        let answer = self.accept && default;
        tracing::debug!(prompt, answer, "Unattended confirmation");
        answer
    }

    fn choose(&self, prompt: &str, options: &[&str], default: usize) -> Option<usize> {
        let answer = (self.accept && default < options.len()).then_some(default);
        tracing::debug!(prompt, ?answer, "Unattended choice");
        answer
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned answers and records every prompt.
    #[derive(Default)]
    pub struct ScriptedConfirm {
        answers: RefCell<VecDeque<bool>>,
        choices: RefCell<VecDeque<usize>>,
        pub prompts: RefCell<Vec<String>>,
    }

    impl ScriptedConfirm {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn answer(self, yes: bool) -> Self {
            self.answers.borrow_mut().push_back(yes);
            self
        }

        pub fn pick(self, choice: RemovalChoice) -> Self {
            let index = RemovalChoice::ALL
                .iter()
                .position(|c| *c == choice)
                .unwrap();
            self.choices.borrow_mut().push_back(index);
            self
        }
    }

    impl Confirm for ScriptedConfirm {
        fn confirm(&self, prompt: &str, _default: bool) -> bool {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.answers.borrow_mut().pop_front().unwrap_or(false)
        }

        fn choose(&self, prompt: &str, _options: &[&str], _default: usize) -> Option<usize> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.choices.borrow_mut().pop_front()
        }
    }

    #[test]
    fn test_unattended_refuse_declines() {
        let confirm = Unattended::refuse();
        assert!(!confirm.confirm("Overwrite?", true));
        assert_eq!(confirm.removal("Remove?"), RemovalChoice::Keep);
    }

    #[test]
    fn test_unattended_accept_takes_default() {
        let confirm = Unattended::accept();
        assert!(confirm.confirm("Overwrite?", true));
        assert!(!confirm.confirm("Overwrite?", false));
        assert_eq!(confirm.removal("Remove?"), RemovalChoice::Trash);
    }

    #[test]
    fn test_removal_maps_choice() {
        let confirm = ScriptedConfirm::new().pick(RemovalChoice::Delete);
        assert_eq!(confirm.removal("Remove?"), RemovalChoice::Delete);
        assert_eq!(confirm.prompts.borrow().len(), 1);
    }

    #[test]
    fn test_removal_out_of_range_keeps() {
        struct Wild;
        impl Confirm for Wild {
            fn confirm(&self, _: &str, _: bool) -> bool {
                true
            }
            fn choose(&self, _: &str, _: &[&str], _: usize) -> Option<usize> {
                Some(42)
            }
        }
        assert_eq!(Wild.removal("Remove?"), RemovalChoice::Keep);
    }
}

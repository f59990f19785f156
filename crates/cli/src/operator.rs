//! Interactive terminal operator.

use broker::{Decision, Operator, Prompt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Answers prompts from standard input.
pub struct TerminalOperator {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalOperator {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Operator for TerminalOperator {
    async fn decide(&mut self, prompt: &Prompt) -> Option<Decision> {
        println!();
        println!("[{}/{}] {}", prompt.index + 1, prompt.total, prompt.label);
        println!("{}", prompt.message);

        loop {
            if prompt.remember_affordance {
                print!("  (a)llow, (d)eny, deny and (n)ever ask again, (q)uit > ");
            } else {
                print!("  (a)llow, (d)eny, (q)uit > ");
            }
            // A failed flush only loses the prompt text.
            let _ = std::io::stdout().flush();

            // EOF or a broken stdin dismisses the prompt.
            let line = self.lines.next_line().await.ok().flatten()?;
            match parse_answer(&line, prompt.remember_affordance) {
                Some(Answer::Allow) => return Some(Decision::grant(&prompt.unit)),
                Some(Answer::Deny) => return Some(Decision::deny(&prompt.unit)),
                Some(Answer::Never) => return Some(Decision::deny(&prompt.unit).remembered()),
                Some(Answer::Quit) => return None,
                None => println!("  unrecognized answer '{}'", line.trim()),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Allow,
    Deny,
    Never,
    Quit,
}

fn parse_answer(line: &str, remember_affordance: bool) -> Option<Answer> {
    match line.trim().to_ascii_lowercase().as_str() {
        "a" | "allow" | "y" | "yes" => Some(Answer::Allow),
        "d" | "deny" | "no" => Some(Answer::Deny),
        "n" | "never" if remember_affordance => Some(Answer::Never),
        "q" | "quit" => Some(Answer::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_answers() {
        assert_eq!(parse_answer(" A ", false), Some(Answer::Allow));
        assert_eq!(parse_answer("deny", false), Some(Answer::Deny));
        assert_eq!(parse_answer("q", true), Some(Answer::Quit));
        assert_eq!(parse_answer("maybe", true), None);
    }

    #[test]
    fn never_requires_remember_affordance() {
        assert_eq!(parse_answer("n", false), None);
        assert_eq!(parse_answer("never", true), Some(Answer::Never));
    }
}

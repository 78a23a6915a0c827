//! Interactive console reviewer.
//!
//! Shows the fused result, the per-source breakdown and every warning,
//! then reads one command:
//! - `a` accept as shown
//! - `r [reason]` reject
//! - `e` edit category, subcategories and confidence (blank keeps a value)

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::Mutex;

use crate::core::{ReviewCandidate, ReviewDecision, ReviewError, ReviewOverride, Reviewer};
use crate::domain::{CategoryId, ReviewMode, SourceStatus, SubcategoryId};

/// Text of a candidate as shown to the operator
pub fn render_candidate(candidate: &ReviewCandidate) -> String {
    let result = &candidate.result;
    let mut out = String::new();

    out.push_str(&format!("Text:       {}\n", candidate.text.as_str()));
    out.push_str(&format!(
        "Category:   {}{}\n",
        result.category,
        if result.fallback { " (fallback)" } else { "" }
    ));
    out.push_str(&format!("Confidence: {:.3}\n", result.confidence));

    if !result.subcategories.is_empty() {
        let subs = result
            .subcategories
            .iter()
            .map(|s| format!("{} ({:.2})", s.id, s.confidence))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("Subcategories: {}\n", subs));
    }

    out.push_str("Sources:\n");
    for source in &result.breakdown {
        match &source.status {
            SourceStatus::Available => {
                let top = source
                    .votes
                    .iter()
                    .take(3)
                    .map(|v| format!("{} {:.2}", v.category, v.score))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!(
                    "  {:<10} weight {:.2}  {}\n",
                    source.source.as_str(),
                    source.effective_weight,
                    if top.is_empty() { "(no votes)".to_string() } else { top }
                ));
            }
            SourceStatus::Degraded { reason } => {
                out.push_str(&format!("  {:<10} degraded: {}\n", source.source.as_str(), reason));
            }
        }
    }

    if !candidate.warnings.is_empty() {
        out.push_str("Warnings:\n");
        for warning in &candidate.warnings {
            out.push_str(&format!("  ! {}\n", warning));
        }
    }

    out
}

/// A parsed operator command
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Accept,
    Reject(Option<String>),
    Edit,
}

pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head.to_lowercase().as_str() {
        "a" | "accept" | "y" | "yes" => Some(ConsoleCommand::Accept),
        "r" | "reject" | "n" | "no" => Some(ConsoleCommand::Reject(
            Some(rest.to_string()).filter(|r| !r.is_empty()),
        )),
        "e" | "edit" => Some(ConsoleCommand::Edit),
        _ => None,
    }
}

/// Build an override from the three edit answers. Blank keeps the fused
/// value; `-` clears the subcategories.
pub fn parse_edit(
    category: &str,
    subcategories: &str,
    confidence: &str,
) -> Result<ReviewOverride, ReviewError> {
    let category = Some(category.trim())
        .filter(|c| !c.is_empty())
        .map(CategoryId::new);

    let subcategories = match subcategories.trim() {
        "" => None,
        "-" => Some(Vec::new()),
        list => Some(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(SubcategoryId::new)
                .collect(),
        ),
    };

    let confidence = match confidence.trim() {
        "" => None,
        value => Some(
            value
                .parse::<f64>()
                .map_err(|_| ReviewError::Reviewer(format!("not a number: {}", value)))?,
        ),
    };

    Ok(ReviewOverride {
        category,
        subcategories,
        confidence,
    })
}

pub struct ConsoleReviewer<R> {
    lines: Mutex<Lines<R>>,
    name: Option<String>,
}

impl ConsoleReviewer<tokio::io::BufReader<tokio::io::Stdin>> {
    /// Review from the terminal
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleReviewer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
            name: std::env::var("USER").ok(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    async fn ask(lines: &mut Lines<R>, prompt: &str) -> Result<String, ReviewError> {
        eprint!("{}", prompt);
        lines
            .next_line()
            .await
            .map_err(|e| ReviewError::Reviewer(e.to_string()))?
            .ok_or_else(|| ReviewError::Reviewer("input closed".to_string()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Reviewer for ConsoleReviewer<R> {
    fn mode(&self) -> ReviewMode {
        ReviewMode::Explicit
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn review(&self, candidate: &ReviewCandidate) -> Result<ReviewDecision, ReviewError> {
        let mut lines = self.lines.lock().await;
        eprintln!("\n{}", render_candidate(candidate));

        loop {
            let answer = Self::ask(&mut lines, "[a]ccept / [r]eject [reason] / [e]dit > ").await?;
            match parse_command(&answer) {
                Some(ConsoleCommand::Accept) => return Ok(ReviewDecision::Accept),
                Some(ConsoleCommand::Reject(reason)) => return Ok(ReviewDecision::Reject { reason }),
                Some(ConsoleCommand::Edit) => {
                    let category = Self::ask(
                        &mut lines,
                        &format!("category [{}]: ", candidate.result.category),
                    )
                    .await?;
                    let subcategories =
                        Self::ask(&mut lines, "subcategories (comma-separated, - for none): ").await?;
                    let confidence = Self::ask(
                        &mut lines,
                        &format!("confidence [{:.3}]: ", candidate.result.confidence),
                    )
                    .await?;

                    match parse_edit(&category, &subcategories, &confidence) {
                        Ok(edit) if edit.is_empty() => return Ok(ReviewDecision::Accept),
                        Ok(edit) => return Ok(ReviewDecision::Override(edit)),
                        Err(e) => eprintln!("{}", e),
                    }
                }
                None => eprintln!("Unrecognised command: {}", answer.trim()),
            }
        }
    }
}

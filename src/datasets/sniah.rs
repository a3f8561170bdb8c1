//! S-NIAH: single needle in a haystack.
//!
//! Each task hides one "secret code" sentence at a random position inside
//! filler prose of a fixed character length and asks for the code back.
//! Generation is seeded, so the same options always give the same tasks.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use super::{Task, TaskSource};
use crate::error::DatasetError;

/// Context lengths, in characters, generated by default.
pub const DEFAULT_CONTEXT_LENGTHS: [usize; 6] = [8192, 16384, 32768, 65536, 131072, 262144];

pub const DEFAULT_TASKS_PER_LENGTH: usize = 8;

pub const DEFAULT_SEED: u64 = 42;

const FILLER_WORDS: &[&str] = &[
    "The", "committee", "discussed", "various", "aspects", "of", "the", "proposed",
    "development", "plan", "including", "budget", "allocations", "timeline", "estimates",
    "resource", "requirements", "and", "potential", "risks", "associated", "with",
    "implementation", "across", "multiple", "departments", "throughout", "organization",
    "Several", "members", "raised", "concerns", "about", "feasibility", "while", "others",
    "expressed", "optimism", "regarding", "expected", "outcomes", "in", "quarterly", "review",
    "session", "management", "presented", "findings", "from", "recent", "analysis",
    "conducted", "by", "external", "consultants", "who", "recommended", "strategic",
    "approach", "for", "achieving", "long", "term", "objectives", "set", "forth", "previous",
    "fiscal", "year", "planning", "documents", "were", "reviewed", "updated", "reflect",
    "current", "market", "conditions", "regulatory", "changes", "that", "could", "impact",
    "operations", "going", "forward", "into", "next", "period", "After", "thorough",
    "deliberation", "group", "agreed", "proceed", "with", "modified", "version", "original",
    "proposal", "incorporating", "feedback", "received", "during", "stakeholder",
    "engagement", "sessions", "held", "over", "past", "several", "weeks", "Additional",
    "research", "was", "requested", "to", "address", "remaining", "questions", "before",
    "final", "decision", "can", "be", "made",
];

const PROJECT_NAMES: &[&str] = &[
    "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India",
    "Juliet", "Kilo", "Lima", "Mike", "November", "Oscar", "Papa", "Quebec", "Romeo",
    "Sierra", "Tango", "Uniform", "Victor", "Whiskey", "Xray",
];

const CODE_ADJECTIVES: &[&str] = &[
    "crimson", "azure", "golden", "silver", "emerald", "cobalt", "amber", "violet", "scarlet",
    "onyx", "ivory", "jade", "coral", "sapphire", "bronze", "copper", "pearl", "ruby",
];

const CODE_NOUNS: &[&str] = &[
    "falcon", "phoenix", "dragon", "eagle", "wolf", "panther", "hawk", "tiger", "cobra",
    "viper", "orca", "raven", "fox", "lion", "bear", "shark", "condor", "mantis",
];

/// Generation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniahOptions {
    pub tasks_per_length: usize,
    pub context_lengths: Vec<usize>,
    pub seed: u64,
}

impl Default for SniahOptions {
    fn default() -> Self {
        Self {
            tasks_per_length: DEFAULT_TASKS_PER_LENGTH,
            context_lengths: DEFAULT_CONTEXT_LENGTHS.to_vec(),
            seed: DEFAULT_SEED,
        }
    }
}

impl SniahOptions {
    pub fn with_tasks_per_length(mut self, n: usize) -> Self {
        self.tasks_per_length = n;
        self
    }

    pub fn with_context_lengths(mut self, lengths: Vec<usize>) -> Self {
        self.context_lengths = lengths;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Deterministic S-NIAH task generator.
#[derive(Debug, Clone, Default)]
pub struct SniahSource {
    options: SniahOptions,
}

impl SniahSource {
    pub fn new(options: SniahOptions) -> Self {
        Self { options }
    }

    /// Generates the task list; never fails.
    pub fn generate(&self) -> Vec<Task> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.options.seed);
        let mut tasks =
            Vec::with_capacity(self.options.context_lengths.len() * self.options.tasks_per_length);

        for &context_len in &self.options.context_lengths {
            for index in 0..self.options.tasks_per_length {
                let needle = Needle::generate(&mut rng);
                let context = build_context(&mut rng, &needle.sentence, context_len);
                let position = context
                    .find(&needle.sentence)
                    .map(|offset| offset as f64 / context.len() as f64)
                    .unwrap_or(0.0);

                tasks.push(
                    Task::new(
                        format!("s-niah-{context_len}-{index}"),
                        format!("What is the secret code for Project {}?", needle.project_id),
                        needle.code,
                    )
                    .with_context(context)
                    .with_metadata("contextLength", context_len)
                    .with_metadata("taskIndex", index)
                    .with_metadata("needlePosition", position),
                );
            }
        }

        tasks
    }
}

impl TaskSource for SniahSource {
    fn name(&self) -> &str {
        "s-niah"
    }

    fn load(&self) -> Result<Vec<Task>, DatasetError> {
        if self.options.tasks_per_length == 0 {
            return Err(DatasetError::InvalidParameter(
                "tasks per length must be at least 1".to_string(),
            ));
        }
        Ok(self.generate())
    }
}

struct Needle {
    sentence: String,
    project_id: String,
    code: String,
}

impl Needle {
    fn generate(rng: &mut ChaCha8Rng) -> Self {
        let project_name = pick(rng, PROJECT_NAMES);
        let project_id = format!("{project_name}{}", rng.random_range(100..1000));

        let code = format!(
            "{}-{}-{}",
            pick(rng, CODE_ADJECTIVES),
            pick(rng, CODE_NOUNS),
            rng.random_range(1000..10000)
        );

        Self {
            sentence: format!("The secret code for Project {project_id} is: {code}"),
            project_id,
            code,
        }
    }
}

fn pick<'a>(rng: &mut ChaCha8Rng, words: &[&'a str]) -> &'a str {
    words[rng.random_range(0..words.len())]
}

/// Filler sentences of 8-22 words until at least `target_chars` are produced.
fn filler_paragraph(rng: &mut ChaCha8Rng, target_chars: usize) -> String {
    let mut sentences = Vec::new();
    let mut total = 0;

    while total < target_chars {
        let word_count = rng.random_range(8..23);
        let mut words: Vec<String> = (0..word_count)
            .map(|_| pick(rng, FILLER_WORDS).to_string())
            .collect();
        if let Some(first) = words.first_mut() {
            *first = capitalize(first);
        }
        let sentence = format!("{}.", words.join(" "));
        total += sentence.len() + 1;
        sentences.push(sentence);
    }

    sentences.join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Places `needle` on its own line at a random fraction of the filler.
fn build_context(rng: &mut ChaCha8Rng, needle: &str, target_len: usize) -> String {
    let fraction: f64 = rng.random();

    let filler_chars = target_len.saturating_sub(needle.len() + 2);
    let before_chars = (filler_chars as f64 * fraction).floor() as usize;
    let after_chars = filler_chars - before_chars;

    let before = filler_paragraph(rng, before_chars);
    let after = filler_paragraph(rng, after_chars);

    format!("{before}\n{needle}\n{after}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn small() -> SniahSource {
        SniahSource::new(
            SniahOptions::default()
                .with_tasks_per_length(3)
                .with_context_lengths(vec![2048, 4096]),
        )
    }

    #[test]
    fn test_generates_expected_ids() {
        let tasks = small().generate();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "s-niah-2048-0",
                "s-niah-2048-1",
                "s-niah-2048-2",
                "s-niah-4096-0",
                "s-niah-4096-1",
                "s-niah-4096-2",
            ]
        );
    }

    #[test]
    fn test_deterministic_for_seed() {
        assert_eq!(small().generate(), small().generate());

        let other = SniahSource::new(
            SniahOptions::default()
                .with_tasks_per_length(3)
                .with_context_lengths(vec![2048, 4096])
                .with_seed(7),
        );
        assert_ne!(small().generate(), other.generate());
    }

    #[test]
    fn test_needle_is_embedded_and_answerable() {
        let code_pattern = Regex::new(r"^[a-z]+-[a-z]+-\d{4}$").unwrap();
        let query_pattern =
            Regex::new(r"^What is the secret code for Project [A-Z][a-z]+\d{3}\?$").unwrap();

        for task in small().generate() {
            let context = task.context.as_deref().unwrap();
            assert!(code_pattern.is_match(&task.expected_answer), "{}", task.expected_answer);
            assert!(query_pattern.is_match(&task.query), "{}", task.query);

            let project = task
                .query
                .trim_start_matches("What is the secret code for Project ")
                .trim_end_matches('?');
            let needle = format!(
                "\nThe secret code for Project {project} is: {}\n",
                task.expected_answer
            );
            assert!(context.contains(&needle));

            let position = task.metadata["needlePosition"].as_f64().unwrap();
            assert!((0.0..1.0).contains(&position));
        }
    }

    #[test]
    fn test_context_reaches_target_length() {
        for task in small().generate() {
            let target = task.metadata["contextLength"].as_u64().unwrap() as usize;
            let len = task.context.as_ref().unwrap().len();
            assert!(len + 2 >= target, "context {len} shorter than {target}");
            assert!(len < target + 700, "context {len} far beyond {target}");
        }
    }

    #[test]
    fn test_filler_sentences_are_capitalized() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let paragraph = filler_paragraph(&mut rng, 500);
        for sentence in paragraph.split(". ") {
            let first = sentence.chars().next().unwrap();
            assert!(first.is_uppercase(), "{sentence}");
        }
        assert!(paragraph.ends_with('.'));
        assert!(filler_paragraph(&mut rng, 0).is_empty());
    }

    #[test]
    fn test_load_rejects_zero_tasks_per_length() {
        let source = SniahSource::new(SniahOptions::default().with_tasks_per_length(0));
        assert!(matches!(source.load(), Err(DatasetError::InvalidParameter(_))));
    }
}

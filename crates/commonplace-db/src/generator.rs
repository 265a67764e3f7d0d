//! Synthetic test data generator.
//!
//! Populates the store with a handful of editors and randomly shaped content
//! items: lorem-ipsum text, optional titles, random tag subsets, timestamps
//! skewed towards the present, and a mix of public, scheduled, private and
//! deleted items. The random source is passed in, so a seeded RNG gives a
//! reproducible data set.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, warn};

use commonplace_core::{ContentSink, Error, NewContent, NewNote, Progress, Result, Slug, TagSet};

/// Editors created before any content.
pub const SEED_USERS: &[&str] = &["ambv", "1st1", "elprans"];

/// Tags drawn from when tagging generated content.
pub const TAG_VOCABULARY: &[&str] = &[
    "articles",
    "bookmarks",
    "fiction",
    "guitar",
    "inspirations",
    "journal",
    "learning",
    "philosophy",
    "python",
    "quotes",
];

pub const DEFAULT_CONTENT_COUNT: usize = 100;

const LOREM_WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "reprehenderit",
    "voluptate", "velit", "esse", "cillum", "fugiat", "nulla", "pariatur", "excepteur", "sint",
    "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui", "officia", "deserunt",
    "mollit", "anim", "id", "est", "laborum",
];

const MIN_WORDS: usize = 3;
const MAX_WORDS: usize = 20;
const TITLE_WORDS: usize = 5;
const SENTENCE_BREAK_PROBABILITY: f64 = 0.15;
const TITLE_PROBABILITY: f64 = 0.2;
const DELETED_PROBABILITY: f64 = 0.1;
const NAME_TOKEN_LEN: usize = 8;
const NAME_TOKENS: usize = 3;
const MAX_OFFSET_SECONDS: f64 = 3.0 * 365.0 * 24.0 * 3600.0;

/// Generator settings.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Content items to attempt.
    pub content_count: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            content_count: DEFAULT_CONTENT_COUNT,
        }
    }
}

/// Result of one insertion attempt.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Inserted under this name.
    Inserted(Slug),
    /// Always `Error::InsertFailed`.
    Failed(Error),
}

impl ItemOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, ItemOutcome::Inserted(_))
    }
}

/// What a generator run produced.
#[derive(Debug)]
pub struct GenerationReport {
    /// Editors available to the generated content.
    pub users: Vec<Slug>,
    /// One entry per attempted item, in attempt order.
    pub outcomes: Vec<ItemOutcome>,
}

impl GenerationReport {
    pub fn inserted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_inserted()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.inserted()
    }
}

/// Create the seed editors and `config.content_count` content items.
///
/// Editors that already exist are reused. Every item gets exactly one
/// insertion attempt; failures are recorded and reported, and generation
/// carries on. Errors creating editors are fatal.
pub async fn generate_test_data<S, R>(
    sink: &S,
    rng: &mut R,
    config: &GeneratorConfig,
    progress: &Progress,
) -> Result<GenerationReport>
where
    S: ContentSink + ?Sized,
    R: Rng + ?Sized,
{
    let mut users = Vec::with_capacity(SEED_USERS.len());
    for name in SEED_USERS {
        let slug = Slug::parse(*name)?;
        match sink.create_user(&slug).await {
            Ok(_) => progress.emit(format!("Created user {}", slug)),
            Err(Error::ConstraintViolation(_)) => {
                progress.emit(format!("User {} already exists", slug))
            }
            Err(e) => return Err(e),
        }
        users.push(slug);
    }

    progress.emit(format!("Creating {} content items", config.content_count));
    let now = Utc::now();
    let mut outcomes = Vec::with_capacity(config.content_count);

    for i in 0..config.content_count {
        let item = build_item(rng, &users, now)?;
        let name = item.name.clone();
        progress.emit(format!(
            "{}/{}: inserting content {}",
            i + 1,
            config.content_count,
            name
        ));
        match sink.publish(item).await {
            Ok(_) => outcomes.push(ItemOutcome::Inserted(name)),
            Err(e) => {
                let failure = Error::InsertFailed {
                    item: name.to_string(),
                    reason: e.to_string(),
                };
                warn!(
                    subsystem = "maintenance",
                    component = "generator",
                    content_name = %name,
                    error = %e,
                    "Insert failed"
                );
                progress.emit(failure.to_string());
                outcomes.push(ItemOutcome::Failed(failure));
            }
        }
    }

    let report = GenerationReport { users, outcomes };
    info!(
        subsystem = "maintenance",
        component = "generator",
        result_count = report.inserted(),
        failed = report.failed(),
        "Test data generated"
    );
    progress.emit(format!(
        "Done generating test data: {} inserted, {} failed",
        report.inserted(),
        report.failed()
    ));
    Ok(report)
}

/// One random content item attributed to one of `editors`.
pub fn build_item<R>(rng: &mut R, editors: &[Slug], now: DateTime<Utc>) -> Result<NewContent>
where
    R: Rng + ?Sized,
{
    let editor = editors
        .choose(rng)
        .cloned()
        .ok_or_else(|| Error::InvalidInput("No editors to attribute content to".to_string()))?;

    let word_count = rng.gen_range(MIN_WORDS..=MAX_WORDS);
    let text = lorem_ipsum(rng, word_count);
    let title = rng
        .gen_bool(TITLE_PROBABILITY)
        .then(|| lorem_ipsum(rng, TITLE_WORDS));
    let name = random_slug(rng)?;
    let tags = random_tags(rng);

    let offset = Duration::seconds(random_offset_seconds(rng));
    let (since, until) = visibility_window(rng.gen::<f64>(), now, offset);
    let deleted = rng.gen_bool(DELETED_PROBABILITY);

    let mut item = NewContent::new(name, NewNote::new(text, editor).at(now - offset))
        .with_tags(tags)
        .public_between(since, until)
        .deleted(deleted);
    if let Some(title) = title {
        item = item.with_title(title);
    }
    Ok(item)
}

/// `word_count` lorem-ipsum words split into capitalized sentences, ending
/// with a period.
pub fn lorem_ipsum<R>(rng: &mut R, word_count: usize) -> String
where
    R: Rng + ?Sized,
{
    let mut text = String::new();
    let mut sentence_start = true;
    for i in 0..word_count {
        let word = LOREM_WORDS.choose(rng).copied().unwrap_or("lorem");
        if i > 0 {
            text.push(' ');
        }
        if sentence_start {
            text.push_str(&capitalize(word));
            sentence_start = false;
        } else {
            text.push_str(word);
        }
        let last = i + 1 == word_count;
        if !last && rng.gen_bool(SENTENCE_BREAK_PROBABILITY) {
            text.push('.');
            sentence_start = true;
        }
    }
    if !text.is_empty() {
        text.push('.');
    }
    text
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Three random 8-character alphanumeric tokens joined by `-`, lowercased.
pub fn random_slug<R>(rng: &mut R) -> Result<Slug>
where
    R: Rng + ?Sized,
{
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let tokens: Vec<String> = (0..NAME_TOKENS)
        .map(|_| {
            (0..NAME_TOKEN_LEN)
                .map(|_| {
                    let idx = rng.gen_range(0..CHARSET.len());
                    CHARSET[idx] as char
                })
                .collect()
        })
        .collect();
    Slug::parse(tokens.join("-").to_lowercase())
}

/// A random subset of the vocabulary, of random size `0..=len`.
pub fn random_tags<R>(rng: &mut R) -> TagSet
where
    R: Rng + ?Sized,
{
    let amount = rng.gen_range(0..=TAG_VOCABULARY.len());
    TagSet::normalize(TAG_VOCABULARY.choose_multiple(rng, amount).copied())
}

/// `uniform(0, uniform(0, uniform(0, 3 years)))` seconds, skewed towards zero.
pub fn random_offset_seconds<R>(rng: &mut R) -> i64
where
    R: Rng + ?Sized,
{
    let outer = rng.gen::<f64>() * MAX_OFFSET_SECONDS;
    let middle = rng.gen::<f64>() * outer;
    (rng.gen::<f64>() * middle) as i64
}

/// Publication window for a toss `p` in `[0, 1)`.
///
/// Below 0.25 the item went public `offset` ago and stops being public now,
/// below 0.5 it becomes public `offset` from now, otherwise it is private.
pub fn visibility_window(
    p: f64,
    now: DateTime<Utc>,
    offset: Duration,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    if p < 0.25 {
        (Some(now - offset), Some(now))
    } else if p < 0.5 {
        (Some(now + offset), None)
    } else {
        (None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use commonplace_core::progress::drain;
    use commonplace_core::{Content, Note, User};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    /// Records published items; fails every `fail_every`-th publish.
    #[derive(Default)]
    struct FakeSink {
        users: Mutex<Vec<String>>,
        published: Mutex<Vec<NewContent>>,
        fail_every: Option<usize>,
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl ContentSink for FakeSink {
        async fn create_user(&self, name: &Slug) -> Result<User> {
            let mut users = self.users.lock().unwrap();
            if users.iter().any(|u| u == name.as_str()) {
                return Err(Error::ConstraintViolation(format!(
                    "duplicate user {}",
                    name
                )));
            }
            users.push(name.to_string());
            Ok(User {
                id: Uuid::new_v4(),
                name: name.clone(),
            })
        }

        async fn publish(&self, req: NewContent) -> Result<Content> {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            if let Some(n) = self.fail_every {
                if *attempts % n == 0 {
                    return Err(Error::ConstraintViolation("duplicate name".to_string()));
                }
            }
            let content = Content {
                id: Uuid::new_v4(),
                name: req.name.clone(),
                title: req.title.clone(),
                tags: req.tags.clone(),
                latest: Note {
                    id: Uuid::new_v4(),
                    hash: req.note.hash(),
                    text: req.note.text.clone(),
                    ts: req.note.ts,
                    editor: Uuid::new_v4(),
                },
                public_since: req.public_since,
                public_until: req.public_until,
                deleted: req.deleted,
            };
            self.published.lock().unwrap().push(req);
            Ok(content)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_generates_requested_count() {
        let sink = FakeSink::default();
        let mut rng = StdRng::seed_from_u64(7);
        let config = GeneratorConfig { content_count: 10 };

        let report = generate_test_data(&sink, &mut rng, &config, &Progress::log_only())
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 10);
        assert_eq!(report.inserted(), 10);
        assert_eq!(report.users.len(), 3);
        assert_eq!(*sink.users.lock().unwrap(), vec!["ambv", "1st1", "elprans"]);

        let published = sink.published.lock().unwrap();
        for item in published.iter() {
            assert!(SEED_USERS.contains(&item.note.editor.as_str()));
        }
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_raised() {
        let sink = FakeSink {
            fail_every: Some(3),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let (progress, mut rx) = Progress::channel();
        let config = GeneratorConfig { content_count: 10 };

        let report = generate_test_data(&sink, &mut rng, &config, &progress)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 10);
        assert_eq!(report.failed(), 3);
        for outcome in &report.outcomes {
            if let ItemOutcome::Failed(e) = outcome {
                assert!(matches!(e, Error::InsertFailed { .. }));
            }
        }
        let messages = drain(&mut rx);
        assert_eq!(
            messages
                .iter()
                .filter(|m| m.starts_with("Insert failed for "))
                .count(),
            3
        );
        assert_eq!(
            messages.last().unwrap(),
            "Done generating test data: 7 inserted, 3 failed\n"
        );
    }

    #[tokio::test]
    async fn test_every_item_reports_progress() {
        let sink = FakeSink {
            fail_every: Some(4),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let (progress, mut rx) = Progress::channel();
        let config = GeneratorConfig { content_count: 10 };

        generate_test_data(&sink, &mut rng, &config, &progress)
            .await
            .unwrap();

        let messages = drain(&mut rx);
        let items: Vec<&String> = messages
            .iter()
            .filter(|m| m.contains(": inserting content "))
            .collect();
        assert_eq!(items.len(), 10);
        assert!(items[0].starts_with("1/10: inserting content "));
        assert!(items[9].starts_with("10/10: inserting content "));

        let published = sink.published.lock().unwrap();
        assert_eq!(
            *items[0],
            format!("1/10: inserting content {}\n", published[0].name)
        );
    }

    #[tokio::test]
    async fn test_existing_users_are_reused() {
        let sink = FakeSink::default();
        let config = GeneratorConfig { content_count: 1 };
        let mut rng = StdRng::seed_from_u64(1);
        generate_test_data(&sink, &mut rng, &config, &Progress::log_only())
            .await
            .unwrap();

        let report = generate_test_data(&sink, &mut rng, &config, &Progress::log_only())
            .await
            .unwrap();
        assert_eq!(report.users.len(), 3);
        assert_eq!(sink.users.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_seeded_runs_are_reproducible() {
        let config = GeneratorConfig { content_count: 5 };
        let names = |sink: &FakeSink| -> Vec<String> {
            sink.published
                .lock()
                .unwrap()
                .iter()
                .map(|item| item.name.to_string())
                .collect()
        };

        let a = FakeSink::default();
        let b = FakeSink::default();
        generate_test_data(&a, &mut StdRng::seed_from_u64(42), &config, &Progress::log_only())
            .await
            .unwrap();
        generate_test_data(&b, &mut StdRng::seed_from_u64(42), &config, &Progress::log_only())
            .await
            .unwrap();

        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn test_lorem_ipsum_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        for count in MIN_WORDS..=MAX_WORDS {
            let text = lorem_ipsum(&mut rng, count);
            assert_eq!(text.split_whitespace().count(), count);
            assert!(text.ends_with('.'));
            assert!(!text.ends_with(".."));
            assert!(text.chars().next().unwrap().is_uppercase());
            for sentence in text.split(". ") {
                assert!(sentence.chars().next().unwrap().is_uppercase());
            }
        }
    }

    #[test]
    fn test_random_slug_shape() {
        let mut rng = StdRng::seed_from_u64(5);
        let slug = random_slug(&mut rng).unwrap();
        let tokens: Vec<&str> = slug.as_str().split('-').collect();
        assert_eq!(tokens.len(), 3);
        for token in tokens {
            assert_eq!(token.len(), 8);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_random_tags_from_vocabulary() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut sizes = HashSet::new();
        for _ in 0..200 {
            let tags = random_tags(&mut rng);
            assert!(tags.len() <= TAG_VOCABULARY.len());
            assert!(tags.iter().all(|t| TAG_VOCABULARY.contains(&t)));
            sizes.insert(tags.len());
        }
        assert!(sizes.len() > 5);
    }

    #[test]
    fn test_offset_within_three_years() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..1000 {
            let offset = random_offset_seconds(&mut rng);
            assert!((0..=MAX_OFFSET_SECONDS as i64).contains(&offset));
        }
    }

    #[test]
    fn test_visibility_window_bands() {
        let offset = Duration::days(3);
        assert_eq!(
            visibility_window(0.1, now(), offset),
            (Some(now() - offset), Some(now()))
        );
        assert_eq!(
            visibility_window(0.3, now(), offset),
            (Some(now() + offset), None)
        );
        assert_eq!(visibility_window(0.7, now(), offset), (None, None));
    }

    #[test]
    fn test_build_item_needs_editors() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(build_item(&mut rng, &[], now()).is_err());
    }

    #[test]
    fn test_build_item_timestamp_not_in_future() {
        let mut rng = StdRng::seed_from_u64(17);
        let editors = vec![Slug::parse("ambv").unwrap()];
        for _ in 0..100 {
            let item = build_item(&mut rng, &editors, now()).unwrap();
            assert!(item.note.ts <= now());
            assert_eq!(item.note.editor.as_str(), "ambv");
        }
    }
}

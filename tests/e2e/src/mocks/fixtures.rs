//! Fixture Histories
//!
//! Repeatable commit histories for end-to-end tests:
//! - Small hand-written histories for the acceptance scenarios
//! - Larger generated histories for result-set properties

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chronoscope_core::{MemoryCommit, MemoryProvider};

use crate::harness::{CommitSpec, TestRepo};

/// Authors used by [`generated_history`]
pub const AUTHORS: &[&str] = &["alice", "bob", "carol", "dave", "erin"];

/// Vocabulary for generated messages and file contents
pub const WORDS: &[&str] = &[
    "parser", "lexer", "cache", "index", "query", "render", "config", "token", "buffer", "stream",
    "merge", "branch", "commit", "signal", "worker", "socket", "schema", "client", "server", "fixup",
];

const EXTENSIONS: &[&str] = &["rs", "md", "toml", "py", "txt"];

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Five commits, two by alice, touching Rust, Markdown and a binary file
pub fn five_commit_history(repo: &TestRepo) -> Vec<String> {
    vec![
        repo.commit(
            CommitSpec::new("alice", 1_700_000_000, "Add parser module")
                .file("src/parser.rs", "fn parse() {\n    tokenize();\n}\n")
                .file("README.md", "# Parser\n"),
        ),
        repo.commit(
            CommitSpec::new("bob", 1_700_086_400, "Fix lexer bug")
                .file("src/lexer.rs", "fn lex() {\n    scan();\n}\n"),
        ),
        repo.commit(
            CommitSpec::new("carol", 1_700_172_800, "Update docs")
                .file("README.md", "# Parser\n\nUsage notes\n"),
        ),
        repo.commit(
            CommitSpec::new("alice", 1_700_259_200, "Refactor parser")
                .file("src/parser.rs", "fn parse_all() {\n    tokenize();\n    validate();\n}\n")
                .file("assets/logo.png", b"\x89PNG\r\n\x1a\n\0\0\0binary"),
        ),
        repo.commit(
            CommitSpec::new("dave", 1_700_345_600, "Remove lexer").delete("src/lexer.rs"),
        ),
    ]
}

/// One file whose lines hold the tokens "foo" and "fooo"
pub fn foo_fooo_history(repo: &TestRepo) -> String {
    repo.commit(
        CommitSpec::new("alice", 1_700_000_000, "Add helpers")
            .file("src/helpers.rs", "fn a() {\n    foo();\n}\n\nfn b() {\n    fooo();\n}\n"),
    )
}

/// Small deterministic generator so generated histories never change
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next() % items.len() as u64) as usize]
    }
}

/// `count` commits with authors, messages and files drawn from fixed
/// vocabularies, one day apart
pub fn generated_history(count: usize, seed: u64) -> Arc<MemoryProvider> {
    let provider = MemoryProvider::new(format!("generated-{seed}"));
    let mut rng = XorShift(seed.max(1));

    for i in 0..count {
        let message = format!("{} {} {}", rng.pick(WORDS), rng.pick(WORDS), rng.pick(WORDS));
        let mut commit = MemoryCommit::new(
            rng.pick(AUTHORS),
            at(1_600_000_000 + i as i64 * 86_400),
            &message,
        );
        let files = 1 + rng.next() % 3;
        for _ in 0..files {
            let path = format!("{}/{}.{}", rng.pick(WORDS), rng.pick(WORDS), rng.pick(EXTENSIONS));
            let body: Vec<&str> = (0..6).map(|_| rng.pick(WORDS)).collect();
            commit = commit.file(&path, format!("{}\n{}\n", body[..3].join(" "), body[3..].join(" ")));
        }
        provider
            .commit(commit)
            .expect("Failed to append generated commit");
    }

    Arc::new(provider)
}

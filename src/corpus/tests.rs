use super::*;
use std::fs;
use tempfile::TempDir;

/// Deterministic offline encoder: [length, word count] per text
struct StubEncoder;

impl TextEncoder for StubEncoder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                vec![
                    text.chars().count() as f32,
                    text.split_whitespace().count() as f32,
                ]
            })
            .collect())
    }
}

fn config_for(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.documents.dir = dir.path().to_path_buf();
    config
}

#[test]
fn build_aligns_chunks_and_index() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("a.txt"), "alpha beta gamma").expect("write");
    fs::write(dir.path().join("b.txt"), "delta epsilon").expect("write");

    let corpus = build_corpus(&config_for(&dir), &StubEncoder).expect("build should succeed");

    assert_eq!(corpus.stats.documents_loaded, 2);
    assert_eq!(corpus.stats.chunks_created, corpus.chunks.len());
    assert_eq!(corpus.index.len(), corpus.chunks.len());
    assert_eq!(corpus.stats.vector_dimension, 2);

    assert_eq!(corpus.chunks[0].source, "a.txt");
    assert_eq!(corpus.chunks[0].text, "alpha beta gamma");
    assert_eq!(corpus.chunks[1].source, "b.txt");
}

#[test]
fn long_documents_split_into_multiple_chunks() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("long.txt"), "word ".repeat(1000)).expect("write");

    let mut config = config_for(&dir);
    config.chunking.max_chars = 500;
    config.chunking.overlap_chars = 50;

    let corpus = build_corpus(&config, &StubEncoder).expect("build should succeed");

    assert!(corpus.chunks.len() > 1);
    assert_eq!(corpus.index.len(), corpus.chunks.len());
    for chunk in &corpus.chunks {
        assert_eq!(chunk.source, "long.txt");
        assert!(chunk.text.chars().count() <= 500);
    }
}

#[test]
fn empty_directory_is_an_empty_corpus_error() {
    let dir = TempDir::new().expect("tempdir");

    let err = build_corpus(&config_for(&dir), &StubEncoder).expect_err("must not build");
    assert!(matches!(err, QaError::EmptyCorpus));
}

#[test]
fn documents_with_no_text_are_an_empty_corpus_error() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("empty.txt"), "").expect("write");

    let err = build_corpus(&config_for(&dir), &StubEncoder).expect_err("must not build");
    assert!(matches!(err, QaError::EmptyCorpus));
}

#[tokio::test]
async fn shared_corpus_starts_not_ready() {
    let shared = SharedCorpus::new();
    assert!(shared.get().await.is_none());
}

#[tokio::test]
async fn shared_corpus_swaps_whole_builds() {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("one.txt"), "only document").expect("write");
    let config = config_for(&dir);

    let shared = SharedCorpus::new();
    shared
        .replace(build_corpus(&config, &StubEncoder).expect("build"))
        .await;
    let first = shared.get().await.expect("corpus should be ready");
    assert_eq!(first.stats.documents_loaded, 1);

    // Readers holding the old Arc keep a consistent snapshot across a swap
    fs::write(dir.path().join("two.txt"), "second document").expect("write");
    shared
        .replace(build_corpus(&config, &StubEncoder).expect("rebuild"))
        .await;

    assert_eq!(first.stats.documents_loaded, 1);
    let second = shared.get().await.expect("corpus should be ready");
    assert_eq!(second.stats.documents_loaded, 2);
}

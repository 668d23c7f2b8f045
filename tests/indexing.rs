//! Repository indexing through the chat graph and index persistence.

mod common;

use common::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use folio_chat::store::CodeIndex;

fn portfolio_host() -> FakeHost {
    FakeHost::default()
        .with_repo(
            "tokenizer",
            &[
                ("src/lexer.rs", "pub fn lex() {}"),
                ("src/parser.rs", "pub fn parse() {}"),
            ],
        )
        .with_broken_repo("private-notes")
        .with_repo("kamin-ai", &[("app/main.py", "def main(): pass")])
        .with_repo("empty-repo", &[])
}

#[tokio::test]
async fn one_failing_repository_is_skipped() {
    let h = harness(
        portfolio_host(),
        Arc::new(MemoryArticles::default()),
        ScriptedModel::routing_to("RESPONSE_GENERATOR"),
    );

    let report = h.graph.index_repositories().await.unwrap();

    assert_eq!(report.repositories_indexed, 2);
    assert_eq!(report.total_files, 3);
    assert_eq!(report.repositories, vec!["tokenizer", "kamin-ai"]);
    assert_eq!(report.repositories_skipped.len(), 1);
    assert_eq!(report.repositories_skipped[0].name, "private-notes");
    assert!(report.repositories_skipped[0].error.contains("unavailable"));

    let stats = h.index.stats().await;
    assert_eq!(stats.total_documents, 3);
    assert!(!stats.projects.contains("empty-repo"));
}

#[tokio::test]
async fn reindexing_replaces_instead_of_duplicating() {
    let h = harness(
        portfolio_host(),
        Arc::new(MemoryArticles::default()),
        ScriptedModel::routing_to("RESPONSE_GENERATOR"),
    );

    h.graph.index_repositories().await.unwrap();
    h.graph.index_repositories().await.unwrap();

    assert_eq!(h.index.stats().await.total_documents, 3);
}

#[tokio::test]
async fn initialization_indexes_an_empty_index_once() {
    let h = harness(
        portfolio_host(),
        Arc::new(MemoryArticles::default()),
        ScriptedModel::routing_to("RESPONSE_GENERATOR"),
    );

    h.graph.chat("Hi", vec![]).await.unwrap();
    h.graph.chat("Hi again", vec![]).await.unwrap();

    assert_eq!(h.host.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.index.stats().await.total_documents, 3);
}

#[tokio::test]
async fn initialization_skips_indexing_when_documents_exist() {
    let h = harness(
        portfolio_host(),
        Arc::new(MemoryArticles::default()),
        ScriptedModel::routing_to("RESPONSE_GENERATOR"),
    );
    h.index
        .add_documents(vec![document("existing", "lib.rs", "fn existing() {}")])
        .await
        .unwrap();

    h.graph.initialize().await;

    assert_eq!(h.host.list_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.index.stats().await.total_documents, 1);
}

#[tokio::test]
async fn embedding_outage_skips_repositories_without_partial_writes() {
    let h = harness(
        portfolio_host(),
        Arc::new(MemoryArticles::default()),
        ScriptedModel::routing_to("RESPONSE_GENERATOR"),
    );
    h.embedder.fail.store(true, Ordering::SeqCst);

    let report = h.graph.index_repositories().await.unwrap();

    assert_eq!(report.repositories_indexed, 0);
    assert_eq!(report.repositories_skipped.len(), 3);
    assert_eq!(h.index.stats().await.total_documents, 0);
}

#[tokio::test]
async fn index_survives_a_restart() {
    let h = harness(
        portfolio_host(),
        Arc::new(MemoryArticles::default()),
        ScriptedModel::routing_to("RESPONSE_GENERATOR"),
    );
    h.graph.index_repositories().await.unwrap();

    let reopened = CodeIndex::new(h.embedder.clone(), h.dir.path().join("index"), DIMS);
    reopened.initialize().await;

    let stats = reopened.stats().await;
    assert_eq!(stats.total_documents, 3);
    assert_eq!(
        stats.projects.into_iter().collect::<Vec<_>>(),
        vec!["kamin-ai", "tokenizer"]
    );

    let hits = reopened
        .search("pub fn parse", 1, Some("tokenizer"), None)
        .await
        .unwrap();
    assert_eq!(hits[0].document.file_name, "parser.rs");
    assert_eq!(
        hits[0].document.file_url,
        "https://github.com/ada/tokenizer/blob/main/src/parser.rs"
    );
}

#[tokio::test]
async fn search_respects_k_and_filters() {
    let h = harness(
        portfolio_host(),
        Arc::new(MemoryArticles::default()),
        ScriptedModel::routing_to("RESPONSE_GENERATOR"),
    );
    h.graph.index_repositories().await.unwrap();

    let all = h.index.search("pub fn", 2, None, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].score >= all[1].score);

    let python = h.index.search("main", 5, None, Some(".py")).await.unwrap();
    assert_eq!(python.len(), 1);
    assert_eq!(python[0].document.project_name, "kamin-ai");

    assert!(h.index.search("main", 0, None, None).await.unwrap().is_empty());
    assert!(h
        .index
        .search("main", 5, Some("missing"), None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn searches_during_rebuilds_see_whole_commits() {
    let h = Arc::new(harness(
        portfolio_host(),
        Arc::new(MemoryArticles::default()),
        ScriptedModel::routing_to("RESPONSE_GENERATOR"),
    ));
    h.graph.index_repositories().await.unwrap();

    // Every state a reader may observe: empty after a clear, then one
    // repository committed at a time.
    let tokenizer = ["tokenizer/src/lexer.rs", "tokenizer/src/parser.rs"];
    let everything = [
        "tokenizer/src/lexer.rs",
        "tokenizer/src/parser.rs",
        "kamin-ai/app/main.py",
    ];
    let snapshots: Vec<BTreeSet<String>> = vec![
        BTreeSet::new(),
        tokenizer.iter().map(|p| p.to_string()).collect(),
        everything.iter().map(|p| p.to_string()).collect(),
    ];

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let h = h.clone();
        let done = done.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                h.graph.index_repositories().await.unwrap();
                h.index.clear().await.unwrap();
            }
            h.graph.index_repositories().await.unwrap();
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut observed = 0;
    loop {
        let finished = done.load(Ordering::SeqCst);

        let results = h.index.search("pub fn main", 10, None, None).await.unwrap();
        let seen: BTreeSet<String> = results
            .iter()
            .map(|r| format!("{}/{}", r.document.project_name, r.document.path()))
            .collect();
        assert_eq!(seen.len(), results.len(), "duplicate hits: {:?}", seen);
        assert!(snapshots.contains(&seen), "partial snapshot: {:?}", seen);

        let total = h.index.stats().await.total_documents;
        assert!([0, 2, 3].contains(&total), "partial stats: {}", total);

        observed += 1;
        if finished {
            break;
        }
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
    assert!(observed > 0);
    assert_eq!(h.index.stats().await.total_documents, 3);
}

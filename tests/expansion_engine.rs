// =============================================================================
// Expansion engine against an in-memory fetcher
// =============================================================================

mod support;

use oxigraph::model::{Graph, TermRef};
use proptest::prelude::*;
use shacl_validator::expansion::{ExpansionEngine, ExpansionLimits};
use shacl_validator::fetch::FetchOutcome;
use shacl_validator::rdf::{import_count, merge_into};
use std::sync::Arc;
use std::time::Duration;
use support::{Canned, MemoryFetcher, engine, ex, turtle};

fn three_triples(subject: &str) -> String {
    format!(
        r#"
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
        <{subject}> a rdfs:Class ;
            rdfs:label "Label" ;
            rdfs:comment "Comment" .
        "#
    )
}

fn chain_document(subject: &str, next: Option<&str>) -> String {
    let import = next
        .map(|next| format!("<{subject}> <http://www.w3.org/2002/07/owl#imports> <{next}> ."))
        .unwrap_or_default();
    format!(
        "<{subject}> a <http://www.w3.org/2002/07/owl#Ontology> .\n\
         <{subject}#Term> <http://www.w3.org/2000/01/rdf-schema#label> \"term\" .\n\
         {import}\n"
    )
}

fn with_shared_blank_label(subject: &str, extra: &str) -> String {
    format!(
        "<{subject}> <http://www.w3.org/2000/01/rdf-schema#label> \"{subject}\" .\n\
         _:b0 <http://www.w3.org/2000/01/rdf-schema#label> \"same\" .\n\
         {extra}\n"
    )
}

fn same_labels(graph: &Graph) -> usize {
    graph
        .iter()
        .filter(|triple| matches!(triple.object, TermRef::Literal(l) if l.value() == "same"))
        .count()
}

// =============================================================================
// Object expansion
// =============================================================================

#[tokio::test]
async fn expands_single_object_into_ontology() {
    let fetcher = Arc::new(MemoryFetcher::new().with_turtle(ex("Theme"), three_triples(&ex("Theme"))));
    let data = turtle(&format!(
        "<{}> <http://www.w3.org/ns/dcat#theme> <{}> .",
        ex("ds"),
        ex("Theme")
    ));
    let mut ontology = Graph::new();

    let report = engine(fetcher.clone()).expand_objects(&data, &mut ontology).await;

    assert_eq!(ontology.len(), 3);
    assert_eq!(report.merged(), 3);
    assert_eq!(report.fetched(), 1);
    assert_eq!(fetcher.calls(), vec![(ex("Theme"), true)]);
}

#[tokio::test]
async fn skips_types_literals_blank_nodes_and_described_iris() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let data = turtle(&format!(
        r#"
        <{ds}> a <{cls}> ;
            <{p}> "literal" ;
            <{p}> [ <{p}> "nested" ] ;
            <{p}> <{local}> ;
            <{p}> <{known}> .
        <{local}> <{p}> "described in data" .
        "#,
        ds = ex("ds"),
        cls = ex("Dataset"),
        p = ex("p"),
        local = ex("local"),
        known = ex("known"),
    ));
    let mut ontology = turtle(&format!("<{}> <{}> \"described in ontology\" .", ex("known"), ex("p")));

    let report = engine(fetcher.clone()).expand_objects(&data, &mut ontology).await;

    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(ontology.len(), 1);
}

#[tokio::test]
async fn object_referenced_many_times_is_fetched_once() {
    let target = ex("Publisher");
    let fetcher = Arc::new(MemoryFetcher::new().with_turtle(&target, three_triples(&target)));
    let data = turtle(&format!(
        "<{a}> <{p}> <{t}> . <{b}> <{p}> <{t}> . <{c}> <{q}> <{t}> .",
        a = ex("a"),
        b = ex("b"),
        c = ex("c"),
        p = ex("p"),
        q = ex("q"),
        t = target,
    ));
    let mut ontology = Graph::new();

    engine(fetcher.clone()).expand_objects(&data, &mut ontology).await;

    assert_eq!(fetcher.calls_for(&target), 1);
}

#[tokio::test]
async fn one_failure_does_not_block_the_rest() {
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_turtle(ex("ok1"), three_triples(&ex("ok1")))
            .with(ex("missing"), Canned::Status(404))
            .with(ex("flaky"), Canned::Transient)
            .with(ex("garbage"), Canned::Garbage)
            .with_turtle(ex("ok2"), three_triples(&ex("ok2"))),
    );
    let data = turtle(&format!(
        "<{s}> <{p}> <{a}>, <{b}>, <{c}>, <{d}>, <{e}> .",
        s = ex("s"),
        p = ex("p"),
        a = ex("ok1"),
        b = ex("missing"),
        c = ex("flaky"),
        d = ex("garbage"),
        e = ex("ok2"),
    ));
    let mut ontology = Graph::new();

    let report = engine(fetcher).expand_objects(&data, &mut ontology).await;

    assert_eq!(ontology.len(), 6);
    assert_eq!(report.batch.succeeded.len(), 2);
    assert_eq!(report.batch.failed.len(), 3);
    assert!(report.batch.is_partial_success());
    assert_eq!(report.batch.failed_with(FetchOutcome::NotFound).count(), 1);
    assert_eq!(report.batch.failed_with(FetchOutcome::TransientError).count(), 1);
    assert_eq!(report.batch.failed_with(FetchOutcome::ParseError).count(), 1);
}

#[tokio::test]
async fn merged_triples_are_not_expanded_further() {
    let first = ex("first");
    let second = ex("second");
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_turtle(&first, format!("<{first}> <{}> <{second}> .", ex("seeAlso")))
            .with_turtle(&second, three_triples(&second)),
    );
    let data = turtle(&format!("<{}> <{}> <{first}> .", ex("s"), ex("p")));
    let mut ontology = Graph::new();

    engine(fetcher.clone()).expand_objects(&data, &mut ontology).await;

    assert_eq!(fetcher.calls_for(&second), 0);
    assert_eq!(ontology.len(), 1);
}

#[tokio::test]
async fn slow_fetches_overlap() {
    let delay = Duration::from_millis(200);
    let mut fetcher = MemoryFetcher::new();
    let mut objects = Vec::new();
    for i in 0..5 {
        let uri = ex(&format!("slow{i}"));
        fetcher = fetcher
            .with_turtle(&uri, three_triples(&uri))
            .with_delay(&uri, delay);
        objects.push(format!("<{uri}>"));
    }
    let data = turtle(&format!("<{}> <{}> {} .", ex("s"), ex("p"), objects.join(", ")));
    let mut ontology = Graph::new();

    let started = std::time::Instant::now();
    engine(Arc::new(fetcher)).expand_objects(&data, &mut ontology).await;

    assert_eq!(ontology.len(), 15);
    assert!(started.elapsed() < delay * 3, "fetches ran sequentially");
}

#[tokio::test]
async fn blank_nodes_of_different_documents_stay_distinct() {
    let (x, y) = (ex("x"), ex("y"));
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_turtle(&x, with_shared_blank_label(&x, ""))
            .with_turtle(&y, with_shared_blank_label(&y, "")),
    );
    let data = turtle(&format!("<{ds}> <{p}> <{x}> , <{y}> .", ds = ex("ds"), p = ex("p")));
    let mut ontology = Graph::new();

    let report = engine(fetcher).expand_objects(&data, &mut ontology).await;

    assert_eq!(report.batch.succeeded.len(), 2);
    assert_eq!(same_labels(&ontology), 2);
    assert_eq!(ontology.len(), 4);
}

// =============================================================================
// Import resolution
// =============================================================================

#[tokio::test]
async fn two_level_import_chain_from_data_graph() {
    let (a, b) = (ex("vocab/a"), ex("vocab/b"));
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_turtle(&a, chain_document(&a, Some(&b)))
            .with_turtle(&b, chain_document(&b, None)),
    );
    let data = turtle(&format!(
        "<{}> <http://www.w3.org/2002/07/owl#imports> <{a}> .",
        ex("catalog")
    ));
    let mut ontology = Graph::new();

    let report = engine(fetcher.clone()).resolve_imports(&data, &mut ontology).await;

    assert_eq!(import_count(&ontology), 0);
    assert_eq!(report.batch.succeeded, vec![a.clone(), b.clone()]);
    assert_eq!(report.rounds, 3);
    assert!(!report.truncated);
    assert_eq!(ontology.len(), 4);
    assert_eq!(import_count(&data), 1, "data graph must stay untouched");
}

#[tokio::test]
async fn n_chained_imports_take_n_plus_one_rounds() {
    let n = 6;
    let uris: Vec<String> = (0..=n).map(|i| ex(&format!("chain/{i}"))).collect();
    let mut fetcher = MemoryFetcher::new();
    for (i, uri) in uris.iter().enumerate().skip(1) {
        fetcher = fetcher.with_turtle(uri, chain_document(uri, uris.get(i + 1).map(String::as_str)));
    }
    let fetcher = Arc::new(fetcher);
    let mut ontology = turtle(&format!(
        "<{}> <http://www.w3.org/2002/07/owl#imports> <{}> .",
        uris[0], uris[1]
    ));

    let report = engine(fetcher.clone())
        .resolve_imports(&Graph::new(), &mut ontology)
        .await;

    assert_eq!(report.rounds, n as u32 + 1);
    assert_eq!(report.fetched(), n);
    assert_eq!(fetcher.call_count(), n);
    assert_eq!(import_count(&ontology), 0);
}

#[tokio::test]
async fn import_cycle_terminates_and_fetches_each_uri_once() {
    let (a, b) = (ex("cycle/a"), ex("cycle/b"));
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_turtle(&a, format!("<{}> <http://www.w3.org/2002/07/owl#imports> <{b}> .", ex("x")))
            .with_turtle(&b, format!("<{}> <http://www.w3.org/2002/07/owl#imports> <{a}> .", ex("y"))),
    );
    let mut ontology = turtle(&format!(
        "<{}> <http://www.w3.org/2002/07/owl#imports> <{a}> .",
        ex("root")
    ));

    let report = engine(fetcher.clone())
        .resolve_imports(&Graph::new(), &mut ontology)
        .await;

    assert_eq!(fetcher.calls_for(&a), 1);
    assert_eq!(fetcher.calls_for(&b), 1);
    assert!(!report.truncated);
    assert_eq!(import_count(&ontology), 0);
}

#[tokio::test]
async fn round_limit_truncates_and_drops_leftover_imports() {
    let uris: Vec<String> = (0..6).map(|i| ex(&format!("deep/{i}"))).collect();
    let mut fetcher = MemoryFetcher::new();
    for (i, uri) in uris.iter().enumerate() {
        fetcher = fetcher.with_turtle(uri, chain_document(uri, uris.get(i + 1).map(String::as_str)));
    }
    let fetcher = Arc::new(fetcher);
    let engine = ExpansionEngine::new(fetcher.clone(), ExpansionLimits { max_import_rounds: 2 });
    let mut ontology = turtle(&format!(
        "<{}> <http://www.w3.org/2002/07/owl#imports> <{}> .",
        ex("root"),
        uris[0]
    ));

    let report = engine.resolve_imports(&Graph::new(), &mut ontology).await;

    assert!(report.truncated);
    assert_eq!(report.rounds, 2);
    assert_eq!(fetcher.call_count(), 2);
    assert_eq!(import_count(&ontology), 0);
}

#[tokio::test]
async fn import_target_described_by_data_is_not_fetched() {
    let vocab = ex("vocab");
    let fetcher = Arc::new(MemoryFetcher::new().with_turtle(&vocab, three_triples(&vocab)));
    let data = turtle(&format!("<{vocab}> <{}> \"local copy\" .", ex("p")));
    let mut ontology = turtle(&format!(
        "<{}> <http://www.w3.org/2002/07/owl#imports> <{vocab}> .",
        ex("ontology")
    ));

    let report = engine(fetcher.clone()).resolve_imports(&data, &mut ontology).await;

    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(import_count(&ontology), 0);
}

#[tokio::test]
async fn failed_import_is_tolerated() {
    let (good, bad) = (ex("good"), ex("bad"));
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_turtle(&good, three_triples(&good))
            .with(&bad, Canned::Status(500)),
    );
    let mut ontology = turtle(&format!(
        "<{o}> <http://www.w3.org/2002/07/owl#imports> <{good}>, <{bad}> .",
        o = ex("ontology")
    ));

    let report = engine(fetcher).resolve_imports(&Graph::new(), &mut ontology).await;

    assert_eq!(report.batch.succeeded, vec![good]);
    assert_eq!(report.batch.failed.len(), 1);
    assert_eq!(report.batch.failed[0].uri, bad);
    assert_eq!(ontology.len(), 3);
}

#[tokio::test]
async fn imported_blank_nodes_do_not_collide() {
    let (a, b) = (ex("vocab/a"), ex("vocab/b"));
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_turtle(
                &a,
                with_shared_blank_label(&a, &format!("<{a}> <http://www.w3.org/2002/07/owl#imports> <{b}> .")),
            )
            .with_turtle(&b, with_shared_blank_label(&b, "")),
    );
    let data = turtle(&format!("<{}> <http://www.w3.org/2002/07/owl#imports> <{a}> .", ex("ds")));
    let mut ontology = Graph::new();

    engine(fetcher).resolve_imports(&data, &mut ontology).await;

    assert_eq!(same_labels(&ontology), 2);
    assert_eq!(import_count(&ontology), 0);
}

// =============================================================================
// Merge properties
// =============================================================================

fn arbitrary_graph() -> impl Strategy<Value = Graph> {
    prop::collection::vec((0u8..6, 0u8..3, 0u8..6), 0..12).prop_map(|triples| {
        let text: String = triples
            .into_iter()
            .map(|(s, p, o)| format!("<{}> <{}> <{}> .\n", ex(&format!("s{s}")), ex(&format!("p{p}")), ex(&format!("o{o}"))))
            .collect();
        turtle(&text)
    })
}

fn sorted(graph: &Graph) -> Vec<String> {
    let mut triples: Vec<String> = graph.iter().map(|triple| triple.to_string()).collect();
    triples.sort();
    triples
}

proptest! {
    #[test]
    fn merging_twice_equals_merging_once(base in arbitrary_graph(), extra in arbitrary_graph()) {
        let mut once = base.clone();
        merge_into(&mut once, &extra);
        let mut twice = once.clone();
        let added = merge_into(&mut twice, &extra);
        prop_assert_eq!(added, 0);
        prop_assert_eq!(sorted(&once), sorted(&twice));
    }

    #[test]
    fn merge_order_does_not_matter(graphs in prop::collection::vec(arbitrary_graph(), 1..5)) {
        let mut forward = Graph::new();
        for graph in &graphs {
            merge_into(&mut forward, graph);
        }
        let mut backward = Graph::new();
        for graph in graphs.iter().rev() {
            merge_into(&mut backward, graph);
        }
        prop_assert_eq!(sorted(&forward), sorted(&backward));
    }
}

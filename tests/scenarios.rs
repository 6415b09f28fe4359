//! Integration coverage for the concrete scenarios in spec.md §8 (S1, S3,
//! S5), exercised through [`Engine::bootstrap`] against a fixture tree on
//! disk, the same path `retrieval-enginectl` takes.

use retrieval_engine::config::EngineConfig;
use retrieval_engine::domain::types::{DependencyEdge, ExtractedUnit, RelationKind, StrategyTag, UnitMetadata, UnitType};
use retrieval_engine::Engine;
use std::path::Path;

async fn write_unit(output_dir: &Path, type_dir: &str, unit: &ExtractedUnit) {
    let dir = output_dir.join(type_dir);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let bytes = serde_json::to_vec(unit).unwrap();
    tokio::fs::write(dir.join(format!("{}.json", unit.identifier)), bytes).await.unwrap();
}

fn base_unit(identifier: &str, unit_type: UnitType, loc: usize) -> ExtractedUnit {
    let source_code = std::iter::repeat_n("  puts 'line'", loc.max(1)).collect::<Vec<_>>().join("\n");
    let source_hash = retrieval_engine::domain::types::sha256_hex(source_code.as_bytes());
    ExtractedUnit {
        identifier: identifier.to_string(),
        unit_type,
        file_path: format!("app/{identifier}.rb"),
        namespace: String::new(),
        source_code: Some(source_code),
        metadata: UnitMetadata::default(),
        dependencies: vec![],
        dependents: vec![],
        chunks: vec![],
        source_hash,
        estimated_tokens: loc as u32,
    }
}

async fn bootstrap(output_dir: &Path) -> Engine {
    let mut config = EngineConfig::default();
    config.output_dir = output_dir.to_string_lossy().to_string();
    Engine::bootstrap(config).await.unwrap()
}

/// S1: `retrieve("How does checkout work")` surfaces the primary unit, a
/// supporting unit pulled in by graph expansion, and a dependency trailer,
/// all within the requested token budget.
#[tokio::test]
async fn s1_retrieve_checkout_returns_primary_supporting_and_dependency_trailer() {
    let dir = tempfile::tempdir().unwrap();

    let mut checkout = base_unit("CheckoutService", UnitType::Service, 20);
    checkout.metadata.associations = vec!["Order".to_string(), "PaymentGateway".to_string()];
    checkout.dependencies = vec![
        DependencyEdge { target_identifier: "Order".to_string(), relation_kind: RelationKind::Associates },
        DependencyEdge { target_identifier: "PaymentGateway".to_string(), relation_kind: RelationKind::Calls },
    ];
    write_unit(dir.path(), "services", &checkout).await;

    let order = base_unit("Order", UnitType::Model, 20);
    write_unit(dir.path(), "models", &order).await;

    let gateway = base_unit("PaymentGateway", UnitType::Service, 20);
    write_unit(dir.path(), "services", &gateway).await;

    let engine = bootstrap(dir.path()).await;
    engine.indexer.index_all().await.unwrap();

    let result = engine.retriever.retrieve("How does checkout work", Some(6000)).await.unwrap();

    assert!(result.tokens_used <= 6000);
    let ids: Vec<&str> = result.attributed_sources.iter().map(|s| s.identifier.as_str()).collect();
    assert!(ids.contains(&"CheckoutService"), "primary unit missing: {ids:?}");
    assert!(ids.contains(&"Order"), "supporting unit missing: {ids:?}");
    assert!(
        result.context.contains("CheckoutService -> Order, PaymentGateway")
            || result.context.contains("CheckoutService, Order, PaymentGateway"),
        "dependency trailer missing from:\n{}",
        result.context
    );
}

/// S3: `dependencies("OrdersController", depth=1)` returns exactly the
/// fixture's direct dependents, `Order` and `Account`.
#[tokio::test]
async fn s3_dependencies_depth_one_returns_direct_edges_only() {
    let dir = tempfile::tempdir().unwrap();

    let mut controller = base_unit("OrdersController", UnitType::Controller, 20);
    controller.dependencies = vec![
        DependencyEdge { target_identifier: "Order".to_string(), relation_kind: RelationKind::References },
        DependencyEdge { target_identifier: "Account".to_string(), relation_kind: RelationKind::References },
    ];
    write_unit(dir.path(), "controllers", &controller).await;
    write_unit(dir.path(), "models", &base_unit("Order", UnitType::Model, 20)).await;
    write_unit(dir.path(), "models", &base_unit("Account", UnitType::Model, 20)).await;

    let engine = bootstrap(dir.path()).await;
    engine.indexer.index_all().await.unwrap();

    let result = engine.retriever.dependencies("OrdersController", 1, None).await.unwrap();
    let mut ids: Vec<&str> = result.attributed_sources.iter().map(|s| s.identifier.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["Account", "Order"]);
}

/// S5: after changing only `User`'s validations, an incremental reindex
/// re-embeds exactly the validations chunk — the summary and body chunks,
/// whose content didn't change, are skipped.
#[tokio::test]
async fn s5_incremental_reindex_reembeds_only_the_changed_chunk() {
    let dir = tempfile::tempdir().unwrap();

    let mut user = base_unit("User", UnitType::Model, 150);
    user.metadata.validations = vec!["presence: true".to_string()];
    write_unit(dir.path(), "models", &user).await;

    let engine = bootstrap(dir.path()).await;
    let first = engine.indexer.index_all().await.unwrap();
    assert_eq!(first.chunks_embedded, 3, "expected summary+validations+body chunks on first pass");

    user.metadata.validations = vec!["uniqueness: true".to_string()];
    user.source_hash = "changed-validations-only".to_string();
    write_unit(dir.path(), "models", &user).await;

    let second = engine.indexer.index_incremental(&["User".to_string()]).await.unwrap();
    assert_eq!(second.chunks_embedded, 1, "only the validations chunk should re-embed");
    assert_eq!(second.chunks_skipped, 2, "summary and body chunks should be skipped");
}

/// Property 2: a no-op full reindex (nothing changed since the checkpoint)
/// re-embeds zero chunks.
#[tokio::test]
async fn noop_full_reindex_embeds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "models", &base_unit("Order", UnitType::Model, 150)).await;
    write_unit(dir.path(), "services", &base_unit("CheckoutService", UnitType::Service, 600)).await;

    let engine = bootstrap(dir.path()).await;
    let first = engine.indexer.index_all().await.unwrap();
    assert!(first.chunks_embedded > 0, "first pass should embed something");

    let second = engine.indexer.index_all().await.unwrap();
    assert_eq!(second.chunks_embedded, 0, "unchanged units must not be re-embedded");
    assert_eq!(second.chunks_skipped, first.chunks_embedded);
}

/// S2: `lookup("Order")` returns the unit directly attributed with full
/// confidence, without ever dispatching the classifier or ranker.
#[tokio::test]
async fn s2_lookup_is_direct_and_skips_the_ranker() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "models", &base_unit("Order", UnitType::Model, 20)).await;

    let engine = bootstrap(dir.path()).await;
    engine.indexer.index_all().await.unwrap();

    let result = engine.retriever.lookup("Order", None).await.unwrap();

    assert!(result.classification.is_none(), "lookup must not run the classifier");
    assert_eq!(result.strategy, Some(StrategyTag::DirectThenGraph));
    assert_eq!(result.attributed_sources.len(), 1);
    assert_eq!(result.attributed_sources[0].identifier, "Order");
    assert_eq!(result.attributed_sources[0].score, 1.0);
}

/// S4: a linear chain `A -> B -> C` has two bridges; closing the loop with
/// `C -> A` removes both.
#[tokio::test]
async fn s4_bridges_detected_on_a_chain_and_absent_once_it_cycles() {
    let dir = tempfile::tempdir().unwrap();

    let mut a = base_unit("A", UnitType::Service, 20);
    a.dependencies = vec![DependencyEdge { target_identifier: "B".to_string(), relation_kind: RelationKind::Calls }];
    write_unit(dir.path(), "services", &a).await;
    let mut b = base_unit("B", UnitType::Service, 20);
    b.dependencies = vec![DependencyEdge { target_identifier: "C".to_string(), relation_kind: RelationKind::Calls }];
    write_unit(dir.path(), "services", &b).await;
    write_unit(dir.path(), "services", &base_unit("C", UnitType::Service, 20)).await;

    let engine = bootstrap(dir.path()).await;
    engine.indexer.index_all().await.unwrap();
    let chain_report = engine.graph.analyze(20, 10_000);
    assert_eq!(chain_report.bridges.len(), 2);
    assert!(!chain_report.bridges_sampled);

    let mut c = base_unit("C", UnitType::Service, 20);
    c.dependencies = vec![DependencyEdge { target_identifier: "A".to_string(), relation_kind: RelationKind::Calls }];
    c.source_hash = "closed-the-loop".to_string();
    write_unit(dir.path(), "services", &c).await;
    engine.indexer.index_incremental(&["C".to_string()]).await.unwrap();

    let cycle_report = engine.graph.analyze(20, 10_000);
    assert!(cycle_report.bridges.is_empty(), "closing the loop should remove both bridges");
    assert_eq!(cycle_report.cycles.len(), 1);
}

/// S6: a query naming a known framework (`Rails`) and an option keyword is
/// classified with `framework_context=true`, dispatched through the
/// Framework strategy, and surfaces the framework-typed unit.
#[tokio::test]
async fn s6_framework_query_dispatches_framework_strategy() {
    let dir = tempfile::tempdir().unwrap();

    let validates = base_unit("ActiveModel::Validations#validates", UnitType::Framework, 20);
    write_unit(dir.path(), "framework", &validates).await;

    let engine = bootstrap(dir.path()).await;
    engine.indexer.index_all().await.unwrap();

    let result = engine.retriever.retrieve("validates options Rails", None).await.unwrap();

    let classification = result.classification.as_ref().expect("classification recorded");
    assert!(classification.framework_context);
    assert_eq!(result.strategy, Some(StrategyTag::Framework));
    assert!(result
        .attributed_sources
        .iter()
        .any(|s| s.unit_type == UnitType::Framework));
}

mod common;

use common::*;
use journey_actions::bridge::{ElementHandle, QueryOutcome};
use journey_actions::engine::{LocatorMetrics, LocatorResolver, ResolverPolicy, Severity};
use journey_actions::workflow::{LocatorPack, LocatorSpec, Strategy, Tier};

fn resolver(pack: LocatorPack) -> LocatorResolver {
    let mut resolver = LocatorResolver::new(ResolverPolicy::from(&fast_config().timeouts));
    resolver.add_pack(pack);
    resolver
}

fn tiered() -> LocatorSpec {
    LocatorSpec {
        primary: Some(test_id("save")),
        secondary: vec![
            Strategy::Role {
                role: "button".into(),
                name: Some("Save".into()),
            },
            Strategy::Name("save".into()),
        ],
        tertiary: Some(Strategy::Text("Save".into())),
    }
}

fn role() -> Strategy {
    Strategy::Role {
        role: "button".into(),
        name: Some("Save".into()),
    }
}

#[tokio::test]
async fn test_primary_hit_short_circuits() {
    let pack = LocatorPack::new("app").with_element("save", tiered());
    let backend = ScriptedBackend::new()
        .element(test_id("save"), "h-primary")
        .element(role(), "h-role")
        .element(Strategy::Text("Save".into()), "h-text");
    let mut session = backend.clone();
    let mut metrics = LocatorMetrics::default();

    let resolved = resolver(pack)
        .resolve(&mut session, "app", "save", &mut metrics)
        .await
        .unwrap();

    assert_eq!(resolved.tier, Tier::Primary);
    assert_eq!(resolved.handle, ElementHandle::new("h-primary"));
    assert!(resolved.diagnostic.is_none());
    assert_eq!(backend.queries(&test_id("save")), 1);
    assert_eq!(backend.queries(&role()), 0);
    assert_eq!(backend.queries(&Strategy::Text("Save".into())), 0);
    assert_eq!(metrics.primary, 1);
    assert_eq!(metrics.attempts, 1);
}

#[tokio::test]
async fn test_secondary_strategies_tried_in_order() {
    let pack = LocatorPack::new("app").with_element("save", tiered());
    let backend = ScriptedBackend::new().element(Strategy::Name("save".into()), "h-name");
    let mut session = backend.clone();
    let mut metrics = LocatorMetrics::default();

    let resolved = resolver(pack)
        .resolve(&mut session, "app", "save", &mut metrics)
        .await
        .unwrap();

    assert_eq!(resolved.tier, Tier::Secondary);
    assert_eq!(resolved.strategy, Strategy::Name("save".into()));
    assert_eq!(resolved.diagnostic.unwrap().severity, Severity::Low);
    assert_eq!(backend.queries(&role()), 1);
    assert_eq!(backend.queries(&Strategy::Text("Save".into())), 0);
    assert_eq!(metrics.secondary, 1);
}

#[tokio::test]
async fn test_ambiguous_tertiary_is_rejected() {
    let pack = LocatorPack::new("app").with_element("save", tiered());
    let backend = ScriptedBackend::new().script(
        Strategy::Text("Save".into()),
        vec![QueryOutcome::Many(2)],
    );
    let mut session = backend.clone();
    let mut metrics = LocatorMetrics::default();

    let failure = resolver(pack)
        .resolve(&mut session, "app", "save", &mut metrics)
        .await
        .unwrap_err();

    assert_eq!(failure.logical_key, "save");
    assert_eq!(
        failure.attempted_tiers,
        vec![Tier::Primary, Tier::Secondary, Tier::Tertiary]
    );
    assert!(failure.last_error.contains("ambiguous"), "{}", failure.last_error);
    assert_eq!(metrics.failures, 1);
    assert_eq!(metrics.tertiary, 0);
}

#[tokio::test]
async fn test_ambiguous_primary_falls_through() {
    let pack = LocatorPack::new("app").with_element("save", tiered());
    let backend = ScriptedBackend::new()
        .script(test_id("save"), vec![QueryOutcome::Many(3)])
        .element(role(), "h-role");
    let mut session = backend.clone();
    let mut metrics = LocatorMetrics::default();

    let resolved = resolver(pack)
        .resolve(&mut session, "app", "save", &mut metrics)
        .await
        .unwrap();
    assert_eq!(resolved.tier, Tier::Secondary);
    assert!(resolved.diagnostic.unwrap().message.contains("3 matches"));
}

#[tokio::test]
async fn test_only_declared_tiers_attempted() {
    let pack = LocatorPack::new("app").with_element("save", primary("save"));
    let mut backend = ScriptedBackend::new();
    let mut metrics = LocatorMetrics::default();

    let failure = resolver(pack)
        .resolve(&mut backend, "app", "save", &mut metrics)
        .await
        .unwrap_err();
    assert_eq!(failure.attempted_tiers, vec![Tier::Primary]);
}

#[tokio::test]
async fn test_unknown_key_and_pack() {
    let pack = LocatorPack::new("app").with_element("save", primary("save"));
    let resolver = resolver(pack);
    let mut backend = ScriptedBackend::new();
    let mut metrics = LocatorMetrics::default();

    let failure = resolver
        .resolve(&mut backend, "app", "nope", &mut metrics)
        .await
        .unwrap_err();
    assert!(failure.attempted_tiers.is_empty());

    let failure = resolver
        .resolve(&mut backend, "other", "save", &mut metrics)
        .await
        .unwrap_err();
    assert!(failure.last_error.contains("other"));
    assert_eq!(metrics.attempts, 2);
    assert_eq!(metrics.failures, 2);
}

#[tokio::test]
async fn test_packs_with_same_id_merge() {
    let mut resolver = resolver(LocatorPack::new("app").with_element("save", primary("save")));
    resolver.add_pack(LocatorPack::new("app").with_element("open", primary("open")));
    assert_eq!(resolver.pack_ids(), vec!["app"]);

    let mut backend = ScriptedBackend::new().element(test_id("open"), "h-open");
    let mut metrics = LocatorMetrics::default();
    let resolved = resolver
        .resolve(&mut backend, "app", "open", &mut metrics)
        .await
        .unwrap();
    assert_eq!(resolved.handle.as_str(), "h-open");
}

#[tokio::test]
async fn test_failure_marks_absence() {
    let pack = LocatorPack::new("app").with_element("save", tiered());
    let mut metrics = LocatorMetrics::default();

    let mut empty = ScriptedBackend::new();
    let failure = resolver(pack.clone())
        .resolve(&mut empty, "app", "save", &mut metrics)
        .await
        .unwrap_err();
    assert!(failure.absent);
    assert!(failure.inert.is_none());

    let mut crowded = ScriptedBackend::new().script(role(), vec![QueryOutcome::Many(2)]);
    let failure = resolver(pack.clone())
        .resolve(&mut crowded, "app", "save", &mut metrics)
        .await
        .unwrap_err();
    assert!(!failure.absent);

    let failure = resolver(pack)
        .resolve(&mut empty, "app", "nope", &mut metrics)
        .await
        .unwrap_err();
    assert!(!failure.absent);
}

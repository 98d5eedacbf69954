use ordinal_harness::evaluation::kendall_tau_b;
use ordinal_harness::{BradleyTerryModel, Comparison, ItemId, ModelFitError, Strength};

fn ids(names: &[&str]) -> Vec<ItemId> {
    names.iter().map(|n| ItemId::from(*n)).collect()
}

#[test]
fn single_round_robin_gives_ground_truth_order() {
    let items = ids(&["A", "B", "C", "D"]);
    let log = vec![
        Comparison::new("A", "B"),
        Comparison::new("A", "C"),
        Comparison::new("A", "D"),
        Comparison::new("B", "C"),
        Comparison::new("B", "D"),
        Comparison::new("C", "D"),
    ];

    let model = BradleyTerryModel::default().fit(&log, &items).unwrap();
    assert_eq!(model.ranking(), items);

    let fitted: Vec<f64> = items
        .iter()
        .map(|id| model.strength(id).value_or_neutral())
        .collect();
    assert!((kendall_tau_b(&fitted, &[4.0, 3.0, 2.0, 1.0]) - 1.0).abs() < 1e-12);
}

#[test]
fn round_robin_recovers_total_order() {
    let items = ids(&["a", "b", "c", "d"]);
    let mut log = Vec::new();
    for (i, winner) in items.iter().enumerate() {
        for loser in &items[i + 1..] {
            // Two rounds so every pair carries repeated evidence.
            log.push(Comparison::new(winner.clone(), loser.clone()));
            log.push(Comparison::new(winner.clone(), loser.clone()));
        }
    }
    // One upset keeps the fit away from the degenerate boundary.
    log.push(Comparison::new("d", "a"));

    let model = BradleyTerryModel::default().fit(&log, &items).unwrap();
    assert_eq!(model.ranking(), items);
    assert_eq!(model.component_count(), 1);

    let fitted: Vec<f64> = items
        .iter()
        .map(|id| model.strength(id).value_or_neutral())
        .collect();
    let truth = [4.0, 3.0, 2.0, 1.0];
    assert!((kendall_tau_b(&fitted, &truth) - 1.0).abs() < 1e-12);

    let sum: f64 = fitted.iter().sum();
    assert!(sum.abs() < 1e-6, "log-strengths should be centred, got {sum}");
    assert!(model.win_probability(&items[0], &items[3]) > 0.5);
    assert!(
        (model.win_probability(&items[1], &items[2]) + model.win_probability(&items[2], &items[1])
            - 1.0)
            .abs()
            < 1e-12
    );
}

#[test]
fn disconnected_components_rank_within_themselves() {
    let items = ids(&["a", "b", "c", "d", "e"]);
    let log = vec![
        Comparison::new("a", "b"),
        Comparison::new("a", "b"),
        Comparison::new("c", "d"),
        Comparison::new("d", "c"),
        Comparison::new("c", "d"),
    ];
    let model = BradleyTerryModel::default().fit(&log, &items).unwrap();

    assert_eq!(model.component_count(), 3);
    assert!(!model.same_component(&ItemId::from("a"), &ItemId::from("c")));
    assert_eq!(model.win_probability(&ItemId::from("a"), &ItemId::from("c")), 0.5);
    assert!(model.strength(&ItemId::from("a")).value_or_neutral() > 0.0);
    assert!(model.strength(&ItemId::from("c")).value_or_neutral() > 0.0);
    assert_eq!(model.strength(&ItemId::from("e")), Strength::Undefined);
    assert!((model.coverage(&ItemId::from("a")) - 0.25).abs() < 1e-12);
    assert_eq!(model.coverage(&ItemId::from("e")), 0.0);
}

#[test]
fn fit_rejects_entries_for_unregistered_items() {
    let items = ids(&["a", "b"]);
    let log = vec![Comparison::new("a", "zzz")];
    let err = BradleyTerryModel::default().fit(&log, &items).unwrap_err();
    assert!(matches!(err, ModelFitError::UnknownItem(id) if id.as_str() == "zzz"));
}

#[test]
fn refitting_the_same_log_is_deterministic() {
    let items = ids(&["a", "b", "c"]);
    let log = vec![
        Comparison::new("a", "b"),
        Comparison::new("b", "c"),
        Comparison::new("c", "a"),
        Comparison::new("a", "c"),
    ];
    let fitter = BradleyTerryModel::default();
    let first = fitter.fit(&log, &items).unwrap();
    let second = fitter.fit(&log, &items).unwrap();
    assert_eq!(first.strengths(), second.strengths());
}

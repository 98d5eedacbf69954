use ordinal_harness::evaluation::{run_synthetic_case, run_synthetic_suite, synthetic_cases};
use ordinal_harness::DriverStopReason;

#[tokio::test]
async fn suite_returns_every_case_in_order() {
    let names: Vec<&str> = synthetic_cases().iter().map(|c| c.name).collect();
    let results = run_synthetic_suite(None, 3).await;
    assert_eq!(results.len(), names.len());

    for (result, (name, case)) in results.iter().zip(names.iter().zip(synthetic_cases())) {
        let result = result.as_ref().unwrap();
        assert_eq!(result.case_name, *name);
        assert_eq!(result.metrics.comparisons_used, case.comparison_budget);
        assert_eq!(
            result.metrics.stop_reason,
            Some(DriverStopReason::BudgetExhausted)
        );
        assert_eq!(result.confidence_trajectory.len(), case.comparison_budget);
        assert!(result
            .confidence_trajectory
            .iter()
            .all(|c| (0.0..=1.0).contains(c)));
        assert!((-1.0..=1.0).contains(&result.metrics.kendall_tau));
    }
}

#[tokio::test]
async fn clean_case_recovers_the_order() {
    let case = synthetic_cases()
        .into_iter()
        .find(|c| c.name == "clean_ordering_8")
        .unwrap();
    let result = run_synthetic_case(&case).await.unwrap();
    assert!(
        result.metrics.kendall_tau > 0.6,
        "kendall tau {}",
        result.metrics.kendall_tau
    );
    assert!(result.metrics.spearman_rho > 0.7);
    assert!(result.metrics.passes_completed >= 1);
}

#[tokio::test]
async fn filter_selects_matching_cases() {
    let results = run_synthetic_suite(Some("diversity"), 1).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().case_name, "diversity_10");
    assert!(run_synthetic_suite(Some("no_such_case"), 2).await.is_empty());
}

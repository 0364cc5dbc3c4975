use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serial_test::serial;

use autosel_runtime::config::GlobalConfig;
use autosel_runtime::config::autotune::AutotuneLevel;
use autosel_runtime::counters;
use autosel_runtime::tune::{
    AlgorithmSelector, AutotuneError, Choice, FallbackChoice, Selection,
};

type TestSelector = AlgorithmSelector<String, (), Vec<i32>>;

/// Point the persistent cache at a per-process temp location so reruns never
/// observe winners from a previous test process.
fn setup() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        #[allow(unused_mut)]
        let mut config = GlobalConfig::default();
        #[cfg(feature = "autotune-cache")]
        {
            config.autotune.cache = autosel_runtime::config::autotune::AutotuneCache::File(
                std::env::temp_dir().join(format!("autosel-test-{}", std::process::id())),
            );
        }
        GlobalConfig::set(config);
    });
    counters::clear();
}

fn unique_name(test: &str) -> String {
    format!("{test}-{}", std::process::id())
}

fn addition_choice(values: Vec<i32>, increment: i32) -> Arc<dyn Choice<(), Vec<i32>>> {
    Arc::new(FallbackChoice::new(
        format!("addition_{increment}"),
        move |_| Ok(values.iter().map(|v| v + increment).collect()),
    ))
}

/// A candidate producing wrong values, to be disqualified by verification.
fn wrong_choice(values: Vec<i32>) -> Arc<dyn Choice<(), Vec<i32>>> {
    Arc::new(FallbackChoice::new("addition_wrong", move |_| {
        Ok(values.clone())
    }))
}

#[test_log::test]
#[serial]
fn autotune_counts_one_event_per_site() {
    setup();
    let selector = TestSelector::new(&unique_name("one_event"));
    let values = vec![0, 1, 2];

    let choices = vec![
        addition_choice(values.clone(), 4),
        addition_choice(values.clone(), 4),
    ];
    let result = selector
        .select("add", "add-3".to_string(), choices, (), None)
        .unwrap();

    assert_eq!(result.output().unwrap(), vec![4, 5, 6]);
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 1);
}

#[test_log::test]
#[serial]
fn autotune_cache_hit_does_not_count_again() {
    setup();
    let selector = TestSelector::new(&unique_name("cache_hit"));
    let values = vec![0, 1, 2];

    for _ in 0..3 {
        let choices = vec![
            addition_choice(values.clone(), 4),
            addition_choice(values.clone(), 4),
        ];
        selector
            .select("add", "add-3".to_string(), choices, (), None)
            .unwrap();
    }

    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 1);
}

#[test_log::test]
#[serial]
fn distinct_sites_count_separately() {
    setup();
    let selector = TestSelector::new(&unique_name("distinct_sites"));
    let values = vec![0, 1, 2];

    for key in ["add-small", "add-large"] {
        let choices = vec![
            addition_choice(values.clone(), 4),
            addition_choice(values.clone(), 4),
        ];
        selector
            .select("add", key.to_string(), choices, (), None)
            .unwrap();
    }

    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 2);
}

#[test_log::test]
#[serial]
fn single_choice_skips_benchmarking() {
    setup();
    let selector = TestSelector::new(&unique_name("single_choice"));

    let result = selector
        .select(
            "add",
            "add-3".to_string(),
            vec![addition_choice(vec![0, 1, 2], 4)],
            (),
            None,
        )
        .unwrap();

    assert_eq!(result.output().unwrap(), vec![4, 5, 6]);
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 0);
}

#[test_log::test]
#[serial]
fn preprocessing_to_single_choice_skips_benchmarking() {
    setup();
    let mut selector = TestSelector::new(&unique_name("preprocessing_single"));

    let func_called = Arc::new(AtomicBool::new(false));
    let func_called_in_fn = func_called.clone();
    selector.add_preprocessing_fn(move |choices| {
        func_called_in_fn.store(true, Ordering::Relaxed);
        choices.into_iter().take(1).collect()
    });

    let values = vec![0, 1, 2];
    let choices = vec![
        addition_choice(values.clone(), 4),
        wrong_choice(values.clone()),
    ];
    let result = selector
        .select("add", "add-3".to_string(), choices, (), None)
        .unwrap();

    // The surviving first choice runs without any benchmarking.
    assert_eq!(result.output().unwrap(), vec![4, 5, 6]);
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 0);
    assert!(func_called.load(Ordering::Relaxed));
}

#[test_log::test]
#[serial]
fn preprocessing_functions_apply_in_registration_order() {
    setup();
    let mut selector = TestSelector::new(&unique_name("preprocessing_order"));

    // First drop the wrong candidate, then keep at most one entry.
    selector.add_preprocessing_fn(|choices| {
        choices
            .into_iter()
            .filter(|choice| !choice.name().contains("wrong"))
            .collect()
    });
    selector.add_preprocessing_fn(|choices| choices.into_iter().take(1).collect());

    let values = vec![0, 1, 2];
    let choices = vec![
        wrong_choice(values.clone()),
        addition_choice(values.clone(), 4),
    ];
    let result = selector
        .select("add", "add-3".to_string(), choices, (), None)
        .unwrap();

    assert_eq!(result.output().unwrap(), vec![4, 5, 6]);
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 0);
}

#[test_log::test]
#[serial]
fn clearing_preprocessing_functions_removes_them() {
    setup();
    let mut selector = TestSelector::new(&unique_name("preprocessing_clear"));

    selector.add_preprocessing_fn(|choices| choices.into_iter().take(1).collect());
    selector.clear_preprocessing_fns();

    let values = vec![0, 1, 2];
    let choices = vec![
        addition_choice(values.clone(), 4),
        addition_choice(values.clone(), 4),
    ];
    selector
        .select("add", "add-3".to_string(), choices, (), None)
        .unwrap();

    // Both choices survived, so benchmarking ran.
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 1);
}

#[test_log::test]
#[serial]
fn empty_choice_list_selects_nothing() {
    setup();
    let mut selector = TestSelector::new(&unique_name("empty_list"));
    selector.add_preprocessing_fn(|_choices| Vec::new());

    let result = selector
        .select(
            "add",
            "add-3".to_string(),
            vec![addition_choice(vec![0, 1, 2], 4)],
            (),
            None,
        )
        .unwrap();

    assert!(matches!(result, Selection::NothingToSelect));
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 0);
}

#[test_log::test]
#[serial]
fn verification_disqualifies_wrong_choice() {
    setup();
    let selector = TestSelector::new(&unique_name("disqualify"));
    let values = vec![0, 1, 2];
    let expected = vec![4, 5, 6];

    // The wrong candidate is cheaper, but verification must reject it.
    let choices = vec![
        wrong_choice(values.clone()),
        addition_choice(values.clone(), 4),
    ];
    let verify = |output: &Vec<i32>| {
        if output == &expected {
            Ok(())
        } else {
            Err(AutotuneError::Unknown("wrong output".to_string()))
        }
    };

    let result = selector
        .select("add", "add-3".to_string(), choices, (), Some(&verify))
        .unwrap();

    assert_eq!(result.output().unwrap(), vec![4, 5, 6]);
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 1);
}

#[test_log::test]
#[serial]
fn all_choices_disqualified_is_an_error() {
    setup();
    let selector = TestSelector::new(&unique_name("all_disqualified"));
    let values = vec![0, 1, 2];

    let choices = vec![wrong_choice(values.clone()), wrong_choice(values.clone())];
    let verify = |_output: &Vec<i32>| -> Result<(), AutotuneError> {
        Err(AutotuneError::Unknown("always rejected".to_string()))
    };

    let result = selector.select("add", "add-3".to_string(), choices, (), Some(&verify));

    assert!(matches!(result, Err(AutotuneError::NoValidChoice(_))));
}

#[test_log::test]
#[serial]
fn minimal_level_bypasses_benchmarking() {
    setup();
    let selector =
        TestSelector::new(&unique_name("minimal_level")).with_level(AutotuneLevel::Minimal);
    let values = vec![0, 1, 2];

    let choices = vec![
        addition_choice(values.clone(), 4),
        addition_choice(values.clone(), 7),
    ];
    let result = selector
        .select("add", "add-3".to_string(), choices, (), None)
        .unwrap();

    // The first choice runs directly and no event is recorded.
    assert_eq!(result.output().unwrap(), vec![4, 5, 6]);
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 0);
}

#[test_log::test]
#[serial]
fn concurrent_selects_share_one_benchmarking_pass() {
    setup();
    let selector = Arc::new(TestSelector::new(&unique_name("concurrent")));
    let values = vec![0, 1, 2];

    let runs = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let selector = selector.clone();
            let values = values.clone();
            let runs = runs.clone();
            scope.spawn(move || {
                let choices = vec![
                    addition_choice(values.clone(), 4),
                    addition_choice(values.clone(), 4),
                ];
                let result = selector
                    .select("add", "add-3".to_string(), choices, (), None)
                    .unwrap();
                assert_eq!(result.output().unwrap(), vec![4, 5, 6]);
                runs.fetch_add(1, Ordering::Relaxed);
            });
        }
    });

    assert_eq!(runs.load(Ordering::Relaxed), 4);
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 1);
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serial_test::serial;

use autosel_common::tolerance::{Tolerance, compare_approx};
use autosel_linalg::ops::{self, ConvOptions, ConvSelector, IntMmSelector, MatmulSelector};
use autosel_linalg::reference::{self, ConvParams};
use autosel_linalg::{FloatElement, Tensor};
use autosel_runtime::counters;

fn setup() {
    counters::clear();
}

/// Unique per process, so a winner persisted by a previous test run can never
/// short-circuit the benchmarking pass under observation.
fn selector_name(test: &str) -> String {
    format!("{test}-{}", std::process::id())
}

fn autotune_count() -> u64 {
    counters::get(counters::SELECT_ALGORITHM_AUTOTUNE)
}

fn assert_close<E: FloatElement>(expected: &Tensor<E>, actual: &Tensor<E>, tolerance: Tolerance) {
    assert_eq!(expected.shape(), actual.shape());
    compare_approx(&expected.to_vec(), &actual.to_vec(), tolerance).unwrap();
}

#[test_log::test]
#[serial]
fn test_linear_relu() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_linear_relu"));

    let input = Tensor::<f32>::sample(vec![64, 32], 1);
    let weight = Tensor::<f32>::sample(vec![16, 32], 2);
    let bias = Tensor::<f32>::sample(vec![1, 16], 3);

    let out = ops::linear_relu(&selector, &input, &weight, &bias).unwrap();

    let expected = reference::relu(&reference::addmm(&bias, &input, &weight.t()));
    assert_close(&expected, &out, Tolerance::default());
    // Autotuning checks correctness of each version.
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_addmm() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_addmm"));

    let a = Tensor::<f32>::sample(vec![20, 33], 1);
    let b = Tensor::<f32>::sample(vec![33, 16], 2);
    let bias = Tensor::<f32>::sample(vec![20, 16], 3);

    let out = ops::addmm(&selector, &bias, &a, &b).unwrap();

    assert_close(&reference::addmm(&bias, &a, &b), &out, Tolerance::default());
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_preprocessing_single_choice() {
    setup();
    let mut selector =
        MatmulSelector::<f32>::new(&selector_name("test_preprocessing_single_choice"));

    // Share a flag with the preprocessing function to assert that it was
    // actually called.
    let func_called = Arc::new(AtomicBool::new(false));
    let func_called_in_fn = func_called.clone();

    // Returning only the first choice makes autotuning a no-op, so the
    // counter must not be bumped.
    selector.add_preprocessing_fn(move |choices| {
        func_called_in_fn.store(true, Ordering::Relaxed);
        choices.into_iter().take(1).collect()
    });

    let a = Tensor::<f32>::sample(vec![20, 33], 1);
    let b = Tensor::<f32>::sample(vec![33, 16], 2);
    let bias = Tensor::<f32>::sample(vec![20, 16], 3);

    let out = ops::addmm(&selector, &bias, &a, &b).unwrap();

    assert_close(&reference::addmm(&bias, &a, &b), &out, Tolerance::default());
    // Since we only have one choice, autotuning should be skipped.
    assert_eq!(autotune_count(), 0);
    assert!(func_called.load(Ordering::Relaxed));
}

#[test_log::test]
#[serial]
fn test_addmm_fp16() {
    setup();
    let selector = MatmulSelector::<half::f16>::new(&selector_name("test_addmm_fp16"))
        .with_tolerance(Tolerance::new(5e-2, 5e-2));

    let a = Tensor::<half::f16>::sample(vec![2, 320], 1);
    let b = Tensor::<half::f16>::sample(vec![320, 320], 2).t();
    let bias = Tensor::<half::f16>::sample(vec![320], 3);

    let out = ops::addmm(&selector, &bias, &a, &b).unwrap();

    assert_close(
        &reference::addmm(&bias, &a, &b),
        &out,
        Tolerance::new(5e-2, 5e-2),
    );
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_mm() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_mm"));

    let a = Tensor::<f32>::sample(vec![8, 32], 1);
    let b = Tensor::<f32>::sample(vec![32, 8], 2);

    let out = ops::matmul(&selector, &a, &b).unwrap();

    assert_close(&reference::matmul(&a, &b), &out, Tolerance::default());
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_int_mm() {
    setup();
    let selector = IntMmSelector::new(&selector_name("test_int_mm"));

    let a = Tensor::<i8>::sample_int(vec![64, 32], 1, -10, 10);
    let b = Tensor::<i8>::sample_int(vec![32, 64], 2, -10, 10);

    let out = ops::int_mm(&selector, &a, &b).unwrap();

    assert_eq!(reference::int_mm(&a, &b).to_vec(), out.to_vec());
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_mm_skip() {
    setup();
    let selector = MatmulSelector::<f64>::new(&selector_name("test_mm_skip"));

    let a = Tensor::<f64>::sample(vec![8, 32], 1);
    let b = Tensor::<f64>::sample(vec![32, 8], 2);

    let out = ops::matmul(&selector, &a, &b).unwrap();

    // 64-bit floats are not supported by the tuned templates; only the
    // fallback remains and no autotune event is recorded.
    assert_close(&reference::matmul(&a, &b), &out, Tolerance::default());
    assert_eq!(autotune_count(), 0);
}

#[test_log::test]
#[serial]
fn test_bmm() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_bmm"));

    let a = Tensor::<f32>::sample(vec![2, 8, 32], 1);
    let b = Tensor::<f32>::sample(vec![2, 32, 8], 2);

    let out = ops::bmm(&selector, &a, &b).unwrap();

    assert_close(&reference::matmul(&a, &b), &out, Tolerance::default());
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_mm_not_even_k() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_mm_not_even_k"));

    let a = Tensor::<f32>::sample(vec![11, 22], 1);
    let b = Tensor::<f32>::sample(vec![22, 33], 2);

    let out = ops::matmul(&selector, &a, &b).unwrap();

    assert_close(&reference::matmul(&a, &b), &out, Tolerance::default());
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_baddbmm() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_baddbmm"));

    let a = Tensor::<f32>::sample(vec![2, 8, 32], 1);
    let b = Tensor::<f32>::sample(vec![2, 32, 8], 2);
    let bias = Tensor::<f32>::sample(vec![2, 1, 8], 3);

    let out = ops::baddbmm(&selector, &bias, &a, &b).unwrap();

    assert_close(&reference::baddbmm(&bias, &a, &b), &out, Tolerance::default());
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_mm_plus_mm() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_mm_plus_mm"));

    let a = Tensor::<f32>::sample(vec![32, 32], 1);
    let b = Tensor::<f32>::sample(vec![32, 32], 2);
    let c = Tensor::<f32>::sample(vec![32, 32], 3);
    let d = Tensor::<f32>::sample(vec![32, 32], 4);

    let out = ops::mm_plus_mm(&selector, &a, &b, &c, &d).unwrap();

    assert_close(
        &reference::mm_plus_mm(&a, &b, &c, &d),
        &out,
        Tolerance::default(),
    );
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_mm_plus_mm2() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_mm_plus_mm2"));

    let a = Tensor::<f32>::sample(vec![128, 128], 1);
    let b = Tensor::<f32>::sample(vec![128, 128], 2);
    let c = Tensor::<f32>::sample(vec![128, 128], 3);
    let d = Tensor::<f32>::sample(vec![128, 128], 4);

    let out = ops::mm_plus_mm(&selector, &a, &b, &c, &d).unwrap();

    assert_close(
        &reference::mm_plus_mm(&a, &b, &c, &d),
        &out,
        Tolerance::default(),
    );
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_mm_dup_args() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_mm_dup_args"));

    let a = Tensor::<f32>::sample(vec![32, 32], 1);

    let out = ops::matmul(&selector, &a, &a).unwrap();

    assert_close(&reference::matmul(&a, &a), &out, Tolerance::default());
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_mm_dup_args_view() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_mm_dup_args_view"));

    let a = Tensor::<f32>::sample(vec![64, 64], 1);
    let q = a.narrow(0, 0, 32);
    let k = a.narrow(0, 32, 32).t();

    let out = ops::matmul(&selector, &q, &k).unwrap();

    assert_close(&reference::matmul(&q, &k), &out, Tolerance::default());
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_convolution1() {
    setup();
    let selector = ConvSelector::<f32>::new(&selector_name("test_convolution1"));

    let x = Tensor::<f32>::sample(vec![2, 17, 18, 21], 1);
    let w = Tensor::<f32>::sample(vec![18, 17, 3, 3], 2);
    let b = Tensor::<f32>::sample(vec![18], 3);
    let params = ConvParams {
        stride: (2, 3),
        padding: (4, 5),
        dilation: (1, 1),
    };

    // Fused scalar add on the input, then the tuned convolution.
    let x = reference::add_scalar(&x, 1.0);
    let out = ops::conv2d(
        &selector,
        &x,
        &w,
        Some(&b),
        params,
        ConvOptions::default(),
    )
    .unwrap();

    assert_close(
        &reference::conv2d(&x, &w, Some(&b), params),
        &out,
        Tolerance::default(),
    );
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_mm_dropout() {
    setup();
    let selector = MatmulSelector::<half::f16>::new(&selector_name("test_mm_dropout"))
        .with_tolerance(Tolerance::new(1e-2, 1e-2));

    let x1 = Tensor::<half::f16>::sample(vec![128, 192], 1);
    let x2 = Tensor::<half::f16>::sample(vec![96, 128], 2);

    let out = ops::mm_rand_mask(&selector, &x2, &x1, 12345).unwrap();

    let mask = reference::rand_mask::<half::f16>(vec![96, 192], 12345);
    let expected = reference::broadcast_mul(&reference::matmul(&x2, &x1), &mask);
    assert_close(&expected, &out, Tolerance::new(1e-2, 1e-2));
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_convolution2() {
    setup();
    let selector = ConvSelector::<f32>::new(&selector_name("test_convolution2"));

    let x = Tensor::<f32>::sample(vec![1, 33, 16, 16], 1);
    let w = Tensor::<f32>::sample(vec![34, 33, 1, 1], 2);
    let b = Tensor::<f32>::sample(vec![34], 3);

    // 1x1 kernel but the matmul-equivalent path disabled: the direct
    // convolution candidates are tuned.
    let out = ops::conv2d(
        &selector,
        &x,
        &w,
        Some(&b),
        ConvParams::default(),
        ConvOptions {
            conv_1x1_as_mm: false,
        },
    )
    .unwrap();

    assert_close(
        &reference::conv2d(&x, &w, Some(&b), ConvParams::default()),
        &out,
        Tolerance::default(),
    );
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_convolution_as_mm() {
    setup();
    let selector = ConvSelector::<f32>::new(&selector_name("test_convolution_as_mm"));

    let x = Tensor::<f32>::sample(vec![2, 33, 16, 16], 1);
    let w = Tensor::<f32>::sample(vec![34, 33, 1, 1], 2);
    let b = Tensor::<f32>::sample(vec![34], 3);

    let x = reference::add_scalar(&x, 1.0);
    let out = ops::conv2d(
        &selector,
        &x,
        &w,
        Some(&b),
        ConvParams::default(),
        ConvOptions {
            conv_1x1_as_mm: true,
        },
    )
    .unwrap();

    assert_close(
        &reference::conv2d(&x, &w, Some(&b), ConvParams::default()),
        &out,
        Tolerance::default(),
    );
    assert_eq!(autotune_count(), 1);
}

#[test_log::test]
#[serial]
fn test_counter_not_bumped_on_cache_hit() {
    setup();
    let selector = MatmulSelector::<f32>::new(&selector_name("test_cache_hit"));

    let a = Tensor::<f32>::sample(vec![8, 32], 1);
    let b = Tensor::<f32>::sample(vec![32, 8], 2);

    ops::matmul(&selector, &a, &b).unwrap();
    ops::matmul(&selector, &a, &b).unwrap();

    // Same operation site: the second call reuses the cached winner.
    assert_eq!(autotune_count(), 1);
}

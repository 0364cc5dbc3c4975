use std::sync::Arc;

use serial_test::serial;

use autosel_linalg::{Tensor, reference};
use autosel_runtime::counters;
use autosel_runtime::template::{
    HookTable, KernelTemplate, TemplateKernel, TemplateValue,
};
use autosel_runtime::tune::{
    AlgorithmSelector, Choice, Selection, TemplateBenchRequest, TemplateChoice, TuningParams,
};

const HOOK_IDENTIFIER: &str = "// CUSTOM_HOOK";

const ADD_TEMPLATE: KernelTemplate = KernelTemplate {
    name: "add",
    source: r#"
{{def_kernel("A", "B")}} {
    {{gen_defines()}}
    {{custom_hook()}}
    int xindex = 0;
    bool xmask = xindex < XBLOCK;
    float tmp0 = {{load_input("A", "xindex")}};
    float tmp1 = {{load_input("B", "xindex")}};
    float tmp2 = tmp0 + tmp1;
    {{store_output("xindex", "tmp2", "xmask")}}
}
"#,
};

/// Renderer extended with a custom hook generator that defers its fragment
/// to finalize time.
fn extension_kernel(a: &Tensor<f32>, b: &Tensor<f32>, out: &Tensor<f32>) -> TemplateKernel {
    TemplateKernel::new("add_kernel", vec![a.meta("A"), b.meta("B")], out.layout())
        .with_define("XBLOCK", 32)
        .with_generator(
            "custom_hook",
            Arc::new(|hooks: &mut HookTable, _args: &[TemplateValue]| {
                assert!(!hooks.is_registered("<CUSTOM_HOOK>"));
                hooks.register("<CUSTOM_HOOK>", || HOOK_IDENTIFIER.to_string())?;
                Ok("<CUSTOM_HOOK>".to_string())
            }),
        )
}

#[test_log::test]
fn test_custom_hook_is_finalized() {
    let a = Tensor::<f32>::zeros(vec![32]);
    let b = Tensor::<f32>::zeros(vec![32]);
    let out = Tensor::<f32>::zeros(vec![32]);

    let render = extension_kernel(&a, &b, &out).render(&ADD_TEMPLATE).unwrap();
    assert!(render.code().contains("<CUSTOM_HOOK>"));

    let source = render.finalize_all().unwrap();
    assert!(source.contains(HOOK_IDENTIFIER));
    assert!(!source.contains("<CUSTOM_HOOK>"));
}

#[test_log::test]
fn test_custom_hook_finalized_manually() {
    let a = Tensor::<f32>::zeros(vec![32]);
    let b = Tensor::<f32>::zeros(vec![32]);
    let out = Tensor::<f32>::zeros(vec![32]);

    let mut render = extension_kernel(&a, &b, &out).render(&ADD_TEMPLATE).unwrap();

    // The caller finalizes the custom hook itself; the remaining built-in
    // hooks are resolved by finalize_all.
    render.finalize_hook("<CUSTOM_HOOK>").unwrap();
    assert!(render.code().contains(HOOK_IDENTIFIER));

    let source = render.finalize_all().unwrap();
    assert!(source.contains(HOOK_IDENTIFIER));
    assert!(source.contains("if (xmask) out[xindex] = tmp2;"));
}

#[test_log::test]
#[serial]
fn test_selection_keeps_custom_hook_output_in_kernel_source() {
    counters::clear();

    let a = Tensor::<f32>::sample(vec![32], 1);
    let b = Tensor::<f32>::sample(vec![32], 2);
    let out = Tensor::<f32>::zeros(vec![32]);

    let source = extension_kernel(&a, &b, &out)
        .render(&ADD_TEMPLATE)
        .unwrap()
        .finalize_all()
        .unwrap();

    assert!(source.contains(HOOK_IDENTIFIER));
    assert!(!source.contains("<CUSTOM_HOOK>"));

    let bench_request = TemplateBenchRequest::new(
        Some("add_kernel.c".to_string()),
        Some("add_kernel".to_string()),
        Some("add_kernel".to_string()),
        None,
        TuningParams::new(Some(1), Some(2), None, None),
        Some(vec![a.meta("A"), b.meta("B")]),
        Some(out.layout()),
    );
    let (a_run, b_run) = (a.clone(), b.clone());
    let choice: Arc<dyn Choice<(), Tensor<f32>>> = Arc::new(TemplateChoice::new(
        "add_kernel",
        "extra",
        bench_request,
        Some(source),
        move |_| Ok(reference::broadcast_add(&a_run, &b_run)),
    ));

    let selector: AlgorithmSelector<String, (), Tensor<f32>> =
        AlgorithmSelector::new(&format!("template_render-{}", std::process::id()));
    let result = selector
        .select("add", "add-32".to_string(), vec![choice], (), None)
        .unwrap();

    let expected = reference::broadcast_add(&a, &b);
    match result {
        Selection::Executed(output) => assert_eq!(output.to_vec(), expected.to_vec()),
        Selection::NothingToSelect => panic!("one choice should have executed"),
    }

    // A single choice executes without an autotune event.
    assert_eq!(counters::get(counters::SELECT_ALGORITHM_AUTOTUNE), 0);
}

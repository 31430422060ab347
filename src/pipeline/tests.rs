use std::sync::Arc;

use petgraph::algo::toposort;

use super::*;
use crate::config::ParametrizationPolicy;
use crate::engine::{MethodCollection, Stage, StaticTask};
use crate::params::{PropertySpec, TypeToken};

fn vec3(name: &str) -> PropertySpec {
    PropertySpec::new(name, TypeToken::named("vec3"))
}

fn vec4(name: &str) -> PropertySpec {
    PropertySpec::new(name, TypeToken::named("vec4"))
}

fn list(specs: impl IntoIterator<Item = PropertySpec>) -> PropertyList {
    specs.into_iter().collect()
}

fn names(list: &PropertyList) -> Vec<String> {
    let mut names: Vec<_> = list.names().map(|name| name.to_string()).collect();
    names.sort();
    names
}

fn item_names(pipeline: &Pipeline) -> Vec<String> {
    pipeline
        .items()
        .iter()
        .map(|task| task.name().to_string())
        .collect()
}

/// Const → Transform → Shade, registered in reverse to show that
/// registration order does not decide execution order.
fn forward_method(shade_filters_color: bool) -> Method {
    let constant = StaticTask::define("Const").output(vec3("pos")).finish();
    let transform = StaticTask::define("Transform")
        .input(vec3("pos"))
        .output(vec3("worldPos"))
        .finish();
    let shade = StaticTask::define("Shade").input(vec3("worldPos"));
    let shade = if shade_filters_color {
        shade.filter(vec4("color"))
    } else {
        shade.input(vec4("color"))
    };

    Method::builder("Forward")
        .task(shade.output(vec4("litColor")).finish())
        .task(transform)
        .task(constant)
        .finish()
}

fn build_forward(shade_filters_color: bool) -> Pipeline {
    let method = forward_method(shade_filters_color);
    let desired = list([vec4("litColor")]);
    let aliases = ParamAliases::new();

    PipelineBuilder::new(&method, &desired, &aliases)
        .fixed_inputs(list([vec4("color")]))
        .build()
        .unwrap()
}

#[test]
fn test_forward_scenario() {
    let pipeline = build_forward(false);

    assert_eq!(item_names(&pipeline), ["Const", "Transform", "Shade"]);
    assert_eq!(names(pipeline.input_specs()), ["color"]);
    assert_eq!(names(pipeline.output_specs()), ["litColor"]);
    assert_eq!(names(pipeline.local_specs()), ["pos", "worldPos"]);
    assert!(pipeline.filter_specs().is_empty());
    assert!(pipeline.consuming_specs().is_empty());
    assert!(pipeline.pipethrough_specs().is_empty());
    assert!(pipeline.used_aliases().is_empty());
    assert!(pipeline.require_outputs().is_ok());
}

#[test]
fn test_filtered_color_becomes_filter() {
    let pipeline = build_forward(true);

    assert_eq!(item_names(&pipeline), ["Const", "Transform", "Shade"]);
    assert_eq!(names(pipeline.filter_specs()), ["color"]);
    assert!(pipeline.input_specs().is_empty());
    assert_eq!(pipeline.role_of("color"), Some(Role::Filter));
}

#[test]
fn test_resolution_is_deterministic() {
    let one = build_forward(true);
    let two = build_forward(true);

    assert_eq!(item_names(&one), item_names(&two));
    for ((role, a), (_, b)) in one.roles().into_iter().zip(two.roles()) {
        assert_eq!(a, b, "{role} lists differ");
    }
    assert_eq!(one.pipeline_id(), two.pipeline_id());
}

#[test]
fn test_every_property_has_exactly_one_role() {
    let pipeline = build_forward(true);
    let touched = ["color", "pos", "worldPos", "litColor"];

    for name in touched {
        let count = pipeline
            .roles()
            .iter()
            .filter(|(_, specs)| specs.contains(name))
            .count();
        assert_eq!(count, 1, "'{name}' is in {count} roles");
    }
}

#[test]
fn test_items_are_topologically_ordered() {
    let pipeline = build_forward(false);
    assert!(pipeline.verify_order());

    let graph = pipeline.dependency_graph();
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);

    let order: Vec<usize> = toposort(&graph, None)
        .unwrap()
        .into_iter()
        .map(|node| graph[node])
        .collect();
    assert_eq!(order, [0, 1, 2]);
}

#[test]
fn test_bindings_follow_items() {
    let pipeline = build_forward(true);
    let bindings = pipeline.bindings();

    assert_eq!(bindings.len(), pipeline.items().len());
    assert!(bindings[0].outputs.contains("pos"));
    assert!(bindings[2].filters.contains("color"));
    assert!(bindings[2].inputs.contains("worldPos"));
}

#[test]
fn test_untouched_desired_output_is_pipethrough() {
    let method = forward_method(false);
    let desired = list([vec4("litColor"), vec4("color")]);

    let pipeline = Pipeline::build(&method, &desired, &ParamAliases::new()).unwrap();

    assert_eq!(names(pipeline.pipethrough_specs()), ["color"]);
    assert_eq!(names(pipeline.output_specs()), ["litColor"]);
    assert!(pipeline.input_specs().is_empty());

    let err = pipeline.require_outputs().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Classification { role: Role::Pipethrough, .. }
    ));
}

#[test]
fn test_consumed_property_is_produced_again() {
    let produce = StaticTask::define("P").output(vec3("a")).finish();
    let consume = StaticTask::define("C")
        .consume(vec3("a"))
        .output(vec3("b"))
        .finish();
    let read = StaticTask::define("R")
        .input(vec3("a"))
        .output(vec3("d"))
        .finish();
    let method = Method::builder("Main").tasks([produce, consume, read]).finish();
    let desired = list([vec3("b"), vec3("d")]);

    let pipeline = Pipeline::build(&method, &desired, &ParamAliases::new()).unwrap();

    assert_eq!(item_names(&pipeline), ["P", "C", "P", "R"]);
    assert_eq!(names(pipeline.local_specs()), ["a"]);
    assert_eq!(names(pipeline.output_specs()), ["b", "d"]);
    assert!(pipeline.verify_order());
}

#[test]
fn test_external_consumed_property_is_consuming() {
    let consume = StaticTask::define("C")
        .consume(vec3("a"))
        .output(vec3("b"))
        .finish();
    let method = Method::builder("Main").task(consume).finish();
    let desired = list([vec3("b")]);

    let pipeline = Pipeline::build(&method, &desired, &ParamAliases::new()).unwrap();

    assert_eq!(names(pipeline.consuming_specs()), ["a"]);
    assert_eq!(pipeline.role_of("a"), Some(Role::Consuming));
}

#[test]
fn test_consumed_then_required() {
    let consume = StaticTask::define("C")
        .consume(vec3("x"))
        .output(vec3("b"))
        .finish();
    let read = StaticTask::define("R")
        .input(vec3("x"))
        .output(vec3("d"))
        .finish();
    let method = Method::builder("Main").tasks([consume, read]).finish();
    let desired = list([vec3("b"), vec3("d")]);

    let err = Pipeline::build(&method, &desired, &ParamAliases::new()).unwrap_err();

    match err {
        PipelineError::ConsumedThenRequired { name, by } => {
            assert_eq!(name.as_ref(), "x");
            assert_eq!(by, "task 'R'");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_type_mismatch_names_both_users() {
    let producer = StaticTask::define("T1").output(vec3("pos")).finish();
    let consumer = StaticTask::define("T2")
        .input(vec4("pos"))
        .output(vec4("x"))
        .finish();
    let method = Method::builder("Main").tasks([producer, consumer]).finish();
    let desired = list([vec4("x")]);

    let err = Pipeline::build(&method, &desired, &ParamAliases::new()).unwrap_err();

    match &err {
        PipelineError::TypeMismatch {
            name,
            first_by,
            later_by,
            ..
        } => {
            assert_eq!(name.as_ref(), "pos");
            assert_eq!(first_by, "task 'T1'");
            assert_eq!(later_by, "task 'T2'");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("vec3"));
}

#[test]
fn test_type_mismatch_through_shared_provider() {
    let blend = StaticTask::define("Blend")
        .input(vec3("a"))
        .input(vec4("b"))
        .output(vec4("blended"))
        .finish();
    let method = Method::builder("Main").task(blend).finish();
    let desired = list([vec4("blended")]);
    let aliases = ParamAliases::from_pairs([("a", "x"), ("b", "x")]);

    let err = Pipeline::build(&method, &desired, &aliases).unwrap_err();

    match err {
        PipelineError::TypeMismatch { name, first_by, later_by, .. } => {
            assert_eq!(name.as_ref(), "x");
            assert_eq!(first_by, "task 'Blend'");
            assert_eq!(later_by, "task 'Blend'");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_shared_provider_with_matching_types() {
    let blend = StaticTask::define("Blend")
        .input(vec3("a"))
        .input(vec3("b"))
        .output(vec3("blended"))
        .finish();
    let method = Method::builder("Main").task(blend).finish();
    let desired = list([vec3("blended")]);
    let aliases = ParamAliases::from_pairs([("a", "x"), ("b", "x")]);

    let pipeline = Pipeline::build(&method, &desired, &aliases).unwrap();

    assert_eq!(names(pipeline.input_specs()), ["x"]);
    assert_eq!(names(&pipeline.bindings()[0].inputs), ["x"]);
}

#[test]
fn test_dependency_cycle_is_reported() {
    let a = StaticTask::define("A").input(vec3("b")).output(vec3("a")).finish();
    let b = StaticTask::define("B").input(vec3("a")).output(vec3("b")).finish();
    let method = Method::builder("Main").tasks([a, b]).finish();
    let desired = list([vec3("a")]);

    let err = Pipeline::build(&method, &desired, &ParamAliases::new()).unwrap_err();

    match err {
        PipelineError::DependencyCycle { name, path } => {
            assert_eq!(name.as_ref(), "a");
            let path: Vec<_> = path.iter().map(|name| name.to_string()).collect();
            assert_eq!(path, ["a", "b", "a"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_alias_cycle_is_reported() {
    let method = forward_method(false);
    let desired = list([vec4("litColor")]);
    let aliases = ParamAliases::from_pairs([("litColor", "x"), ("x", "litColor")]);

    let err = Pipeline::build(&method, &desired, &aliases).unwrap_err();
    assert!(matches!(err, PipelineError::Alias(_)));
}

#[test]
fn test_strict_mode_rejects_unknown_leaves() {
    let method = forward_method(false);
    let desired = list([vec4("litColor")]);
    let aliases = ParamAliases::new();
    let strict = PlanOptions::default().strict(true);

    let err = PipelineBuilder::new(&method, &desired, &aliases)
        .options(strict)
        .build()
        .unwrap_err();
    assert!(matches!(err, PipelineError::MissingProducer { name } if name.as_ref() == "color"));

    let pipeline = PipelineBuilder::new(&method, &desired, &aliases)
        .fixed_inputs(list([vec4("color")]))
        .options(strict)
        .build()
        .unwrap();
    assert_eq!(names(pipeline.input_specs()), ["color"]);
}

#[test]
fn test_strict_mode_allows_pipethrough() {
    let method = Method::empty("Empty");
    let desired = list([vec4("color")]);
    let aliases = ParamAliases::new();

    let pipeline = PipelineBuilder::new(&method, &desired, &aliases)
        .options(PlanOptions::default().strict(true))
        .build()
        .unwrap();

    assert!(pipeline.items().is_empty());
    assert_eq!(names(pipeline.pipethrough_specs()), ["color"]);
}

#[test]
fn test_aliases_select_producer() {
    let phong = StaticTask::define("Phong")
        .input(vec3("normal"))
        .output(vec4("shade_phong"))
        .finish();
    let toon = StaticTask::define("Toon")
        .input(vec3("normal"))
        .output(vec4("shade_toon"))
        .finish();
    let compose = StaticTask::define("Compose")
        .input(vec4("shade"))
        .output(vec4("litColor"))
        .finish();
    let method = Method::builder("Main").tasks([phong, toon, compose]).finish();
    let desired = list([vec4("litColor")]);

    let aliases = ParamAliases::from_pairs([("shade", "shade_toon")]);
    let pipeline = Pipeline::build(&method, &desired, &aliases).unwrap();

    assert_eq!(item_names(&pipeline), ["Toon", "Compose"]);
    assert_eq!(names(pipeline.local_specs()), ["shade_toon"]);
    assert!(pipeline.bindings()[1].inputs.contains("shade_toon"));
    assert_eq!(
        pipeline.used_aliases().direct_choice_for("shade").as_deref(),
        Some("shade_toon")
    );
}

#[test]
fn test_aliased_desired_output() {
    let method = forward_method(false);
    let desired = list([vec4("display")]);
    let aliases = ParamAliases::from_pairs([("display", "litColor")]);

    let pipeline = Pipeline::build(&method, &desired, &aliases).unwrap();

    assert_eq!(names(pipeline.output_specs()), ["litColor"]);
    assert_eq!(names(pipeline.desired_specs()), ["litColor"]);
    assert!(pipeline.pipeline_id().ends_with("_display-litColor"));
}

/// Normal and Light feed Shade; only Light depends on the seed.
fn partial_method() -> Method {
    let normal = StaticTask::define("Normal").output(vec3("normal")).finish();
    let light = StaticTask::define("Light")
        .input(vec4("camera"))
        .output(vec4("light"))
        .finish();
    let shade = StaticTask::define("Shade")
        .input(vec3("normal"))
        .input(vec4("light"))
        .output(vec4("shade"))
        .finish();

    Method::builder("Main").tasks([normal, light, shade]).finish()
}

fn build_partial(desired: &PropertyList, policy: ParametrizationPolicy) -> Pipeline {
    let method = partial_method();
    let aliases = ParamAliases::new();

    PipelineBuilder::new(&method, desired, &aliases)
        .partial(["camera"])
        .options(PlanOptions::default().policy(policy))
        .build()
        .unwrap()
}

#[test]
fn test_partial_skips_unparametrized_dependencies() {
    let desired = list([vec4("shade")]);
    let pipeline = build_partial(&desired, ParametrizationPolicy::ParametrizedOrDirectDependencies);

    assert_eq!(item_names(&pipeline), ["Light", "Shade"]);
    assert_eq!(names(pipeline.input_specs()), ["camera", "normal"]);
}

#[test]
fn test_partial_direct_outputs_depend_on_policy() {
    let desired = list([vec3("normal"), vec4("shade")]);

    let direct = build_partial(&desired, ParametrizationPolicy::ParametrizedOrDirectDependencies);
    assert_eq!(item_names(&direct), ["Normal", "Light", "Shade"]);
    assert_eq!(names(direct.output_specs()), ["normal", "shade"]);

    let strict = build_partial(&desired, ParametrizationPolicy::ParametrizedDependencies);
    assert_eq!(item_names(&strict), ["Light", "Shade"]);
    assert_eq!(names(strict.pipethrough_specs()), ["normal"]);
}

#[test]
fn test_partial_all_dependencies() {
    let desired = list([vec4("shade")]);
    let pipeline = build_partial(&desired, ParametrizationPolicy::AllDependencies);

    assert_eq!(item_names(&pipeline), ["Normal", "Light", "Shade"]);
    assert_eq!(names(pipeline.input_specs()), ["camera"]);
}

#[test]
fn test_partial_reports_unsatisfied_outputs() {
    let desired = list([vec3("normal"), vec4("shade"), vec3("tangent")]);

    let direct = build_partial(&desired, ParametrizationPolicy::ParametrizedOrDirectDependencies);
    assert_eq!(names(direct.unsatisfied_outputs()), ["tangent"]);
    let satisfied: Vec<_> = direct.satisfied_outputs().map(|spec| spec.name.to_string()).collect();
    assert_eq!(satisfied, ["normal", "shade"]);

    let strict = build_partial(&desired, ParametrizationPolicy::ParametrizedDependencies);
    assert_eq!(names(strict.unsatisfied_outputs()), ["normal", "tangent"]);
    let satisfied: Vec<_> = strict.satisfied_outputs().map(|spec| spec.name.to_string()).collect();
    assert_eq!(satisfied, ["shade"]);
}

#[test]
fn test_full_resolution_satisfies_every_output() {
    let pipeline = build_forward(false);

    assert!(pipeline.unsatisfied_outputs().is_empty());
    assert_eq!(pipeline.satisfied_outputs().count(), 1);
}

#[test]
fn test_partial_without_parametrized_tasks() {
    let method = partial_method();
    let desired = list([vec3("normal")]);

    let pipeline = Pipeline::build_partial(&method, ["unused"], &desired, &ParamAliases::new()).unwrap();

    // the direct producer is still included under the default policy
    assert_eq!(item_names(&pipeline), ["Normal"]);
}

#[test]
fn test_cache_reuses_and_invalidates() {
    let method = forward_method(false);
    let desired = list([vec4("litColor")]);
    let plain = ParamAliases::new();
    let renamed = ParamAliases::from_pairs([("color", "albedo")]);
    let cache = PipelineCache::new();

    let first = cache.get_or_build(&PipelineBuilder::new(&method, &desired, &plain)).unwrap();
    let again = cache.get_or_build(&PipelineBuilder::new(&method, &desired, &plain)).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(cache.len(), 1);

    let other = cache.get_or_build(&PipelineBuilder::new(&method, &desired, &renamed)).unwrap();
    assert!(other.input_specs().contains("albedo"));
    assert_eq!(cache.len(), 2);

    assert!(cache.invalidate(&PipelineBuilder::new(&method, &desired, &renamed).key()));
    assert_eq!(cache.len(), 1);

    cache.invalidate_all();
    assert!(cache.is_empty());
}

#[test]
fn test_cache_separates_parent_order() {
    let first = StaticTask::define("First").output(vec3("first")).finish();
    let second = StaticTask::define("Second").output(vec3("second")).finish();
    let method = Method::builder("Main").tasks([first, second]).finish();
    let desired = list([vec3("c")]);
    let p1 = ParamAliases::from_pairs([("c", "first")]);
    let p2 = ParamAliases::from_pairs([("c", "second")]);
    let a = ParamAliases::builder().parent(&p1).parent(&p2).build();
    let b = ParamAliases::builder().parent(&p2).parent(&p1).build();
    let cache = PipelineCache::new();

    let for_a = cache.get_or_build(&PipelineBuilder::new(&method, &desired, &a)).unwrap();
    let for_b = cache.get_or_build(&PipelineBuilder::new(&method, &desired, &b)).unwrap();

    assert_eq!(item_names(&for_a), ["First"]);
    assert_eq!(item_names(&for_b), ["Second"]);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_cache_separates_repeated_parent_entry() {
    let method = forward_method(false);
    let desired = list([vec4("litColor")]);
    let plain = ParamAliases::new();
    let parent = ParamAliases::from_pairs([("color", "albedo")]);
    let child = ParamAliases::builder()
        .parent(&parent)
        .alias("color", "albedo")
        .build();
    let cache = PipelineCache::new();

    let unaliased = cache.get_or_build(&PipelineBuilder::new(&method, &desired, &plain)).unwrap();
    let aliased = cache.get_or_build(&PipelineBuilder::new(&method, &desired, &child)).unwrap();

    assert!(unaliased.input_specs().contains("color"));
    assert!(aliased.input_specs().contains("albedo"));
    assert!(!aliased.input_specs().contains("color"));
}

#[test]
fn test_cache_key_distinguishes_repeated_seeds() {
    let method = forward_method(false);
    let desired = list([vec4("litColor")]);
    let aliases = ParamAliases::new();
    let key = |seeds: &[&str]| {
        PipelineBuilder::new(&method, &desired, &aliases)
            .partial(seeds.iter().copied())
            .key()
    };

    assert_ne!(key(&["color", "color"]), key(&[]));
    assert_eq!(key(&["color", "color"]), key(&["color"]));
    assert_eq!(key(&["color", "pos"]), key(&["pos", "color"]));
}

#[test]
fn test_cache_key_tracks_method_snapshot() {
    let collection = MethodCollection::new();
    collection.register_task(
        StaticTask::define("Shade").input(vec3("normal")).output(vec4("shade")).finish(),
        [Stage::Fragment],
    );
    let desired = list([vec4("shade")]);
    let aliases = ParamAliases::new();

    let before = collection.method(Stage::Fragment);
    let before_key = PipelineBuilder::new(&before, &desired, &aliases).key();

    collection.register_task(
        StaticTask::define("Normal").output(vec3("normal")).finish(),
        [Stage::Fragment],
    );
    let after = collection.method(Stage::Fragment);
    let after_key = PipelineBuilder::new(&after, &desired, &aliases).key();

    assert_ne!(before_key, after_key);
    assert_eq!(Pipeline::build(&before, &desired, &aliases).unwrap().items().len(), 1);
    assert_eq!(Pipeline::build(&after, &desired, &aliases).unwrap().items().len(), 2);
}

#[test]
fn test_cache_key_ignores_construction_order() {
    let method = forward_method(false);
    let one = list([vec4("litColor"), vec4("color")]);
    let two = list([vec4("color"), vec4("litColor")]);
    let aliases = ParamAliases::new();

    assert_eq!(
        PipelineBuilder::new(&method, &one, &aliases).key(),
        PipelineBuilder::new(&method, &two, &aliases).key()
    );
    assert_ne!(
        PipelineBuilder::new(&method, &one, &aliases).key(),
        PipelineBuilder::new(&method, &one, &aliases).partial(["color"]).key()
    );
}

#[test]
fn test_cache_warm_builds_in_parallel() {
    let method = forward_method(false);
    let lit = list([vec4("litColor")]);
    let world = list([vec3("worldPos")]);
    let aliases = ParamAliases::new();
    let cache = PipelineCache::new();

    let builders = [
        PipelineBuilder::new(&method, &lit, &aliases),
        PipelineBuilder::new(&method, &world, &aliases),
    ];

    assert_eq!(cache.warm(&builders).unwrap(), 2);
    assert_eq!(cache.warm(&builders).unwrap(), 0);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&builders[1].key()).unwrap().items().len(), 2);
}

#[test]
fn test_mermaid_export() {
    let pipeline = build_forward(false);
    let mermaid = pipeline.to_mermaid();

    assert!(mermaid.starts_with("graph LR\n"));
    assert!(mermaid.contains(r#"t0["Const"]"#));
    assert!(mermaid.contains(r#"t0 -- "pos: vec3" --> t1"#));
    assert!(mermaid.contains(r#"p0(["color"])"#));
    assert!(mermaid.contains(r#"p0 -- "color: vec4" --> t2"#));
    assert!(mermaid.contains(r#"t2 -- "litColor: vec4" --> Output"#));
    assert!(mermaid.trim_end().ends_with("Output[Output]"));
}

#[test]
fn test_summary_json() {
    let pipeline = build_forward(false);
    let summary = pipeline.summary();

    assert_eq!(summary.items, ["Const", "Transform", "Shade"]);
    assert_eq!(summary.inputs[0].name, "color");
    assert_eq!(summary.inputs[0].ty, "vec4");
    assert!(summary.id.ends_with("_litColor"));
    assert_eq!(summary.id.len(), "000000_litColor".len());

    let json = pipeline.to_json().unwrap();
    assert!(json.contains(r#""type":"vec4""#));
    let parsed: PipelineSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, summary);
}

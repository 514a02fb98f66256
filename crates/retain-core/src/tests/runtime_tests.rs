use super::*;
use crate::context::{BuildContext, StateHandle};
use crate::error::BuildError;
use crate::memory_renderer::MemoryRenderer;
use crate::observable::Observable;
use crate::patch::PatchOp;
use crate::platform::TestHost;
use crate::widget::{host, BuildResult, StatefulWidget, StatelessWidget, WidgetState};
use std::cell::RefCell;
use std::time::Duration;

fn runtime() -> Runtime {
    let _ = env_logger::builder().is_test(true).try_init();
    Runtime::builder()
        .renderer(MemoryRenderer::new())
        .config(RuntimeConfig::default().with_error_indicator(false))
        .build()
        .unwrap_or_else(|err| panic!("runtime: {err}"))
}

fn markup(runtime: &Runtime) -> String {
    runtime
        .with_renderer_as::<MemoryRenderer, _>(|renderer| renderer.markup())
        .unwrap_or_default()
}

#[derive(PartialEq)]
struct Label {
    text: &'static str,
}

impl StatelessWidget for Label {
    fn build(&self, _cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError> {
        Ok(host("p").child(self.text).into())
    }
}

type Events = Rc<RefCell<Vec<String>>>;

#[derive(PartialEq)]
struct Probe {
    label: &'static str,
    events: Events,
}

struct ProbeState {
    value: i64,
    events: Events,
}

impl WidgetState<Probe> for ProbeState {
    fn build(&mut self, widget: &Probe, _cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError> {
        self.events.borrow_mut().push(format!("build {}", widget.label));
        Ok(host("span").child(format!("{}={}", widget.label, self.value)).into())
    }

    fn on_init(&mut self, widget: &Probe, _cx: &mut BuildContext<'_>) {
        self.events.borrow_mut().push(format!("init {}", widget.label));
    }

    fn on_mounted(&mut self, _cx: &mut BuildContext<'_>) {
        self.events.borrow_mut().push("mounted".into());
    }

    fn on_widget_updated(&mut self, old: &Probe, new: &Probe) {
        self.events
            .borrow_mut()
            .push(format!("updated {} -> {}", old.label, new.label));
    }

    fn on_dispose(&mut self) {
        self.events.borrow_mut().push("dispose".into());
    }
}

impl StatefulWidget for Probe {
    type State = ProbeState;

    fn create_state(&self) -> ProbeState {
        ProbeState {
            value: 0,
            events: self.events.clone(),
        }
    }
}

#[test]
fn builder_requires_a_renderer() {
    assert!(matches!(
        Runtime::builder().build(),
        Err(ConfigError::MissingRenderer)
    ));
}

#[test]
fn mount_root_commits_output() {
    let runtime = runtime();
    let root = runtime
        .mount_root(WidgetRef::stateless(Label { text: "hello" }))
        .expect("mount");
    assert_eq!(markup(&runtime), "<p>hello</p>");
    assert_eq!(runtime.lifecycle(root), Some(Lifecycle::Mounted));
    assert_eq!(runtime.root(), Some(root));
    let info = runtime.element(root).expect("element");
    assert_eq!(info.widget, "Label");
    assert_eq!(info.depth, 0);
    assert!(info.output.is_some());
}

#[test]
fn children_get_parent_depth_plus_one() {
    let runtime = runtime();
    let root = runtime
        .mount_root(WidgetRef::composed("Page", |_| {
            Ok(host("main")
                .child(WidgetRef::composed("Section", |_| {
                    Ok(WidgetRef::stateless(Label { text: "deep" }).into())
                }))
                .into())
        }))
        .expect("mount");
    let section = runtime.element(root).expect("root").children[0];
    let label = runtime.element(section).expect("section").children[0];
    assert_eq!(runtime.element(section).map(|info| info.depth), Some(1));
    assert_eq!(runtime.element(label).map(|info| info.depth), Some(2));
    assert_eq!(markup(&runtime), "<main><p>deep</p></main>");
}

#[test]
fn double_mount_is_reported_and_ignored() {
    let runtime = runtime();
    let id = runtime.create(WidgetRef::stateless(Label { text: "once" }));
    runtime.mount(id).expect("first mount");
    runtime.mount(id).expect("second mount is a no-op");
    assert_eq!(markup(&runtime), "<p>once</p>");
    assert_eq!(
        runtime.take_diagnostics(),
        vec![Diagnostic::DoubleMount { element: id }]
    );
}

#[test]
fn operations_on_unmounted_elements_are_noops() {
    let runtime = runtime();
    let root = runtime
        .mount_root(WidgetRef::stateless(Label { text: "x" }))
        .expect("mount");
    runtime.unmount(root);
    assert_eq!(runtime.lifecycle(root), None);
    assert!(!runtime.mark_dirty(root));
    assert_eq!(runtime.rebuild(root), Ok(RebuildOutcome::Rejected));
    runtime.unmount(root);
    assert_eq!(
        runtime.take_diagnostics(),
        vec![
            Diagnostic::MarkDirtyUnmounted { element: root },
            Diagnostic::RebuildUnmounted { element: root },
            Diagnostic::UnmountUnmounted { element: root },
        ]
    );
    assert_eq!(markup(&runtime), "");
}

#[test]
fn reentrant_rebuild_is_rejected() {
    let runtime = runtime();
    let outcome: Rc<RefCell<Option<Result<RebuildOutcome, RebuildError>>>> =
        Rc::new(RefCell::new(None));
    let seen = outcome.clone();
    let root = runtime
        .mount_root(WidgetRef::composed("Recursive", move |cx| {
            let nested = cx.handle().rebuild(cx.element());
            *seen.borrow_mut() = Some(nested);
            Ok("done".into())
        }))
        .expect("mount");
    assert_eq!(
        outcome.borrow_mut().take(),
        Some(Ok(RebuildOutcome::Rejected))
    );
    assert_eq!(
        runtime.take_diagnostics(),
        vec![Diagnostic::ReentrantRebuild { element: root }]
    );
    assert_eq!(runtime.lifecycle(root), Some(Lifecycle::Mounted));

    assert_eq!(runtime.rebuild(root), Ok(RebuildOutcome::Rebuilt { patches: 0 }));
    assert_eq!(runtime.lifecycle(root), Some(Lifecycle::Mounted));
}

#[test]
fn stateful_hooks_run_in_order() {
    let runtime = runtime();
    let events: Events = Rc::default();
    let label = Rc::new(Cell::new("a"));
    let (probe_events, current) = (events.clone(), label.clone());
    let root = runtime
        .mount_root(WidgetRef::composed("Host", move |_| {
            Ok(WidgetRef::stateful(Probe {
                label: current.get(),
                events: probe_events.clone(),
            })
            .into())
        }))
        .expect("mount");
    assert_eq!(*events.borrow(), vec!["init a", "build a", "mounted"]);

    label.set("b");
    runtime.mark_dirty(root);
    runtime.tick();
    assert_eq!(markup(&runtime), "<span>b=0</span>");

    runtime.unmount(root);
    assert_eq!(
        *events.borrow(),
        vec![
            "init a",
            "build a",
            "mounted",
            "updated a -> b",
            "build b",
            "dispose"
        ]
    );
}

#[test]
fn unchanged_child_is_not_rebuilt() {
    let runtime = runtime();
    let events: Events = Rc::default();
    let probe_events = events.clone();
    let root = runtime
        .mount_root(WidgetRef::composed("Host", move |_| {
            Ok(host("div")
                .child(WidgetRef::stateful(Probe {
                    label: "same",
                    events: probe_events.clone(),
                }))
                .into())
        }))
        .expect("mount");
    events.borrow_mut().clear();
    runtime.mark_dirty(root);
    let report = runtime.tick();
    assert_eq!(report.rebuilt, vec![root]);
    assert!(report.patches.is_empty());
    assert!(events.borrow().is_empty(), "{:?}", events.borrow());
}

#[test]
fn update_requested_mid_build_is_queued() {
    #[derive(PartialEq)]
    struct SelfUpdating;

    struct Counter(i64);

    impl WidgetState<SelfUpdating> for Counter {
        fn build(&mut self, _widget: &SelfUpdating, cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError> {
            if self.0 == 0 {
                cx.state_handle::<Counter>().request_update(|state| state.0 = 10);
            }
            Ok(self.0.into())
        }
    }

    impl StatefulWidget for SelfUpdating {
        type State = Counter;

        fn create_state(&self) -> Counter {
            Counter(0)
        }
    }

    let runtime = runtime();
    let root = runtime
        .mount_root(WidgetRef::stateful(SelfUpdating))
        .expect("mount");
    assert_eq!(markup(&runtime), "0");
    assert_eq!(runtime.lifecycle(root), Some(Lifecycle::Dirty));
    assert!(runtime.needs_tick());

    let report = runtime.tick();
    assert_eq!(report.rebuilt, vec![root]);
    assert_eq!(markup(&runtime), "10");
    assert!(!report.follow_up_scheduled);
    assert_eq!(runtime.lifecycle(root), Some(Lifecycle::Mounted));
}

#[test]
fn state_handle_on_a_stateless_element_is_reported() {
    let runtime = runtime();
    let slot: Rc<RefCell<Option<StateHandle<String>>>> = Rc::default();
    let captured = slot.clone();
    let root = runtime
        .mount_root(WidgetRef::composed("Plain", move |cx| {
            *captured.borrow_mut() = Some(cx.state_handle::<String>());
            Ok("plain".into())
        }))
        .expect("mount");
    let handle = slot.borrow_mut().take().expect("handle");
    assert!(!handle.request_update(|text| text.push('!')));
    assert_eq!(
        runtime.take_diagnostics(),
        vec![Diagnostic::StateTypeMismatch { element: root }]
    );
    assert_eq!(runtime.lifecycle(root), Some(Lifecycle::Mounted));
}

#[test]
fn dirty_marks_request_one_host_tick_per_batch() {
    let host = Arc::new(TestHost::default());
    let runtime = Runtime::builder()
        .renderer(MemoryRenderer::new())
        .host(host.clone())
        .build()
        .unwrap_or_else(|err| panic!("runtime: {err}"));
    let first = runtime
        .mount_root(WidgetRef::stateless(Label { text: "1" }))
        .expect("mount");
    let second = runtime
        .mount_root(WidgetRef::stateless(Label { text: "2" }))
        .expect("mount");
    assert_eq!(host.requests(), 0);

    assert!(runtime.mark_dirty(first));
    assert!(runtime.mark_dirty(second));
    assert!(!runtime.mark_dirty(first), "already dirty");
    assert_eq!(host.requests(), 1);

    let report = runtime.tick();
    assert_eq!(report.rebuilt, vec![first, second]);
    assert!(!report.follow_up_scheduled);
    assert_eq!(host.requests(), 1);

    runtime.mark_dirty(first);
    assert_eq!(host.requests(), 2);
}

#[test]
fn parent_rebuild_covers_dirty_child() {
    let runtime = runtime();
    let state = runtime.state_object();
    let outer = state.property("outer", 0);
    let inner = state.property("inner", 0);
    let (outer_read, inner_read) = (outer.clone(), inner.clone());
    let root = runtime
        .mount_root(WidgetRef::composed("Parent", move |_| {
            let inner_read = inner_read.clone();
            Ok(host("div")
                .child(outer_read.get())
                .child(WidgetRef::composed("Child", move |_| Ok(inner_read.get().into())))
                .into())
        }))
        .expect("mount");
    let child = runtime.element(root).expect("root").children[0];
    assert_eq!(runtime.element(child).map(|info| info.builds), Some(1));

    inner.set(2);
    outer.set(1);
    let report = runtime.tick();
    assert_eq!(report.rebuilt, vec![root]);
    assert_eq!(report.skipped, vec![child]);
    assert_eq!(runtime.element(child).map(|info| info.builds), Some(2));
    assert_eq!(markup(&runtime), "<div>12</div>");
}

#[test]
fn dependencies_follow_the_latest_build() {
    let runtime = runtime();
    let state = runtime.state_object();
    let flag = state.property("flag", true);
    let detail = state.property("detail", "x".to_string());
    let (flag_read, detail_read) = (flag.clone(), detail.clone());
    let root = runtime
        .mount_root(WidgetRef::composed("Conditional", move |_| {
            if flag_read.get() {
                Ok(detail_read.get().into())
            } else {
                Ok("hidden".into())
            }
        }))
        .expect("mount");
    assert_eq!(runtime.element_dependencies(root).len(), 2);

    flag.set(false);
    runtime.tick();
    assert_eq!(
        runtime.element_dependencies(root),
        vec![flag.dependency().clone()]
    );
    assert_eq!(detail.set("y".into()), 0);
    assert!(!runtime.needs_tick());
    assert_eq!(markup(&runtime), "hidden");
}

#[test]
fn untracked_reads_record_nothing() {
    let runtime = runtime();
    let state = runtime.state_object();
    let count = state.property("count", 1);
    let read = count.clone();
    let root = runtime
        .mount_root(WidgetRef::composed("Peek", move |cx| {
            let value = cx.untracked(|| read.get());
            Ok(value.into())
        }))
        .expect("mount");
    assert!(runtime.element_dependencies(root).is_empty());
    assert_eq!(count.set(5), 0);
    assert_eq!(runtime.lifecycle(root), Some(Lifecycle::Mounted));
    assert_eq!(runtime.untracked(|| count.get()), 5);
}

#[test]
fn dependencies_changed_hook_fires_before_rebuild() {
    struct Watcher {
        source: Observable<i64>,
        log: Events,
    }

    impl PartialEq for Watcher {
        fn eq(&self, other: &Self) -> bool {
            self.source.dependency() == other.source.dependency() && Rc::ptr_eq(&self.log, &other.log)
        }
    }

    struct WatcherState;

    impl WidgetState<Watcher> for WatcherState {
        fn build(&mut self, widget: &Watcher, _cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError> {
            widget.log.borrow_mut().push("build".into());
            Ok(widget.source.get().into())
        }

        fn on_dependencies_changed(&mut self, widget: &Watcher) {
            widget.log.borrow_mut().push("dependencies changed".into());
        }
    }

    impl StatefulWidget for Watcher {
        type State = WatcherState;

        fn create_state(&self) -> WatcherState {
            WatcherState
        }
    }

    let runtime = runtime();
    let source = runtime.state_object().property("value", 1i64);
    let log: Events = Rc::default();
    runtime
        .mount_root(WidgetRef::stateful(Watcher {
            source: source.clone(),
            log: log.clone(),
        }))
        .expect("mount");
    source.set(2);
    runtime.tick();
    assert_eq!(*log.borrow(), vec!["build", "dependencies changed", "build"]);
    assert_eq!(markup(&runtime), "2");
}

#[test]
fn nested_unmount_detaches_and_dirties_parent() {
    let runtime = runtime();
    let root = runtime
        .mount_root(WidgetRef::composed("List", |_| {
            Ok(host("ul")
                .child(WidgetRef::stateless(Label { text: "a" }))
                .into())
        }))
        .expect("mount");
    let child = runtime.element(root).expect("root").children[0];
    runtime.unmount(child);
    assert_eq!(runtime.lifecycle(child), None);
    assert_eq!(runtime.lifecycle(root), Some(Lifecycle::Dirty));
    assert!(runtime.element(root).expect("root").children.is_empty());

    runtime.tick();
    let replacement = runtime.element(root).expect("root").children[0];
    assert_ne!(replacement, child);
    assert_eq!(markup(&runtime), "<ul><p>a</p></ul>");
}

#[test]
fn nested_failure_keeps_previous_child_output() {
    let runtime = runtime();
    let state = runtime.state_object();
    let broken = state.property("broken", false);
    let title = state.property("title", "t1");
    let (broken_read, title_read) = (broken.clone(), title.clone());
    let root = runtime
        .mount_root(WidgetRef::composed("Card", move |_| {
            let broken_read = broken_read.clone();
            Ok(host("div")
                .child(title_read.get())
                .child(WidgetRef::composed("Body", move |_| {
                    if broken_read.get() {
                        Err(BuildError::new("body exploded"))
                    } else {
                        Ok("body".into())
                    }
                }))
                .into())
        }))
        .expect("mount");
    broken.set(true);
    title.set("t2");
    let report = runtime.tick();
    assert_eq!(report.rebuilt, vec![root]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].element(), runtime.element(root).expect("root").children[0]);
    assert_eq!(markup(&runtime), "<div>t2body</div>");
}

#[test]
fn aborted_resolution_rolls_back_child_configuration() {
    let runtime = runtime();
    let events: Events = Rc::default();
    let step = runtime.state_object().property("step", 1i64);
    let (read, probe_events) = (step.clone(), events.clone());
    let root = runtime
        .mount_root(WidgetRef::composed("Frame", move |_| {
            let second = read.get() == 2;
            let inner = Probe {
                label: if second { "second" } else { "first" },
                events: probe_events.clone(),
            };
            let broken = second
                .then(|| WidgetRef::composed("Broken", |_| Err(BuildError::new("boom"))));
            Ok(host("div").child(WidgetRef::stateful(inner)).child(broken).into())
        }))
        .expect("mount");
    let child = runtime.element(root).expect("root").children[0];
    events.borrow_mut().clear();

    step.set(2);
    let report = runtime.tick();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(markup(&runtime), "<div><span>first=0</span></div>");
    assert_eq!(runtime.element(root).expect("root").children, vec![child]);

    runtime.run_until_idle();
    assert_eq!(
        *events.borrow(),
        [
            "updated first -> second",
            "build second",
            "updated second -> first",
            "build first",
        ]
    );
    assert_eq!(runtime.lifecycle(child), Some(Lifecycle::Mounted));
    assert_eq!(markup(&runtime), "<div><span>first=0</span></div>");
}

#[test]
fn listeners_are_dispatched_and_replaced_on_rebuild() {
    let runtime = runtime();
    let clicks = Rc::new(Cell::new(0));
    let counter = clicks.clone();
    let root = runtime
        .mount_root(WidgetRef::composed("Button", move |cx| {
            let counter = counter.clone();
            cx.add_listener("click", move |_| counter.set(counter.get() + 1));
            Ok(host("button").child("ok").into())
        }))
        .expect("mount");
    assert_eq!(runtime.dispatch(root, "click", true), 1);
    assert_eq!(runtime.dispatch(root, "hover", true), 0);
    runtime.rebuild(root).expect("rebuild");
    assert_eq!(runtime.listener_count(root), 1);
    runtime.dispatch(root, "click", Primitive::Int(2));
    assert_eq!(clicks.get(), 2);
}

#[test]
fn dispose_runs_outstanding_cleanups_once() {
    let cleaned = Rc::new(Cell::new(0));
    let counter = cleaned.clone();
    let runtime = runtime();
    runtime
        .mount_root(WidgetRef::composed("Owner", move |cx| {
            let counter = counter.clone();
            cx.on_cleanup(move || counter.set(counter.get() + 1));
            Ok(BuildResult::Empty)
        }))
        .expect("mount");
    let stray = runtime.create(WidgetRef::stateless(Label { text: "never mounted" }));
    assert!(runtime.is_registered(stray));
    runtime.dispose();
    runtime.dispose();
    assert_eq!(cleaned.get(), 1);
    assert_eq!(runtime.element_count(), 0);
    assert!(!runtime.is_registered(stray));
    drop(runtime);
    assert_eq!(cleaned.get(), 1);
}

#[test]
fn sweep_flags_registered_but_unmounted_elements() {
    let clock = ManualClock::new();
    let runtime = Runtime::builder()
        .renderer(MemoryRenderer::new())
        .clock(clock.clone())
        .config(RuntimeConfig::default().with_leak_age(Duration::from_secs(30)))
        .build()
        .unwrap_or_else(|err| panic!("runtime: {err}"));
    runtime
        .mount_root(WidgetRef::stateless(Label { text: "live" }))
        .expect("mount");
    let orphan = runtime.create(WidgetRef::stateless(Label { text: "orphan" }));

    clock.advance_millis(29_999);
    assert!(runtime.sweep_leaks().is_empty());
    clock.advance_millis(1);
    let reports = runtime.sweep_leaks();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].element, orphan);
    assert_eq!(reports[0].widget, "Label");
    assert!(runtime.is_registered(orphan), "sweep never frees");
    assert!(matches!(
        runtime.take_diagnostics().as_slice(),
        [Diagnostic::ProbableLeak { element, .. }] if *element == orphan
    ));
}

#[test]
fn dump_tree_lists_elements_by_depth() {
    let runtime = runtime();
    runtime
        .mount_root(WidgetRef::composed("App", |_| {
            Ok(host("div")
                .child(WidgetRef::stateless(Label { text: "a" }))
                .into())
        }))
        .expect("mount");
    let dump = runtime.dump_tree();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("[#0.0] App state=Mounted depth=0"), "{dump}");
    assert!(lines[1].starts_with("  [#1.0] Label state=Mounted depth=1"), "{dump}");
}

#[test]
fn root_patch_records_land_in_tick_report() {
    let runtime = runtime();
    let state = runtime.state_object();
    let text = state.property("text", "a");
    let read = text.clone();
    runtime
        .mount_root(WidgetRef::composed("Text", move |_| Ok(read.get().into())))
        .expect("mount");
    text.set("b");
    let report = runtime.tick();
    assert_eq!(
        report.patches,
        vec![Patch::new(Vec::new(), PatchOp::UpdateText(Rc::from("b")))]
    );
}

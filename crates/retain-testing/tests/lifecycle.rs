use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use retain_testing::prelude::*;

fn rule() -> RetainTestRule {
    rule_with(RuntimeConfig::default().with_error_indicator(false))
}

fn rule_with(config: RuntimeConfig) -> RetainTestRule {
    let _ = env_logger::builder().is_test(true).try_init();
    RetainTestRule::with_config(config)
}

#[test]
fn failed_build_keeps_output_and_spares_siblings() {
    let mut rule = rule();
    let state = rule.runtime().state_object();
    let broken = state.property("broken", false);
    let label = state.property("label", "b1");
    let broken_read = broken.clone();
    let failing = rule
        .set_content(WidgetRef::composed("Fragile", move |_| {
            if broken_read.get() {
                Err(BuildError::new("boom"))
            } else {
                Ok(host("p").child("a").into())
            }
        }))
        .expect("mount fragile");
    let label_read = label.clone();
    let sibling = rule
        .runtime()
        .mount_root(WidgetRef::composed("Sibling", move |_| {
            Ok(host("p").child(label_read.get()).into())
        }))
        .expect("mount sibling");

    broken.set(true);
    label.set("b2");
    let report = rule.tick();
    assert_eq!(report.rebuilt, vec![sibling]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].element(), failing);
    assert!(!report.failures[0].is_patch_failure());
    assert_eq!(rule.markup(), "<p>a</p><p>b2</p>");
    assert_eq!(rule.runtime().lifecycle(failing), Some(Lifecycle::Mounted));
    assert!(!rule.runtime().needs_tick());

    broken.set(false);
    let report = rule.tick();
    assert_eq!(report.rebuilt, vec![failing]);
    assert!(report.patches.is_empty());
}

#[test]
fn error_indicator_replaces_failed_output() {
    let mut rule = rule_with(RuntimeConfig::default().with_error_indicator(true));
    let broken = rule.runtime().state_object().property("broken", false);
    let read = broken.clone();
    let root = rule
        .set_content(WidgetRef::composed("Fragile", move |_| {
            if read.get() {
                Err(BuildError::new("boom"))
            } else {
                Ok(host("p").child("fine").into())
            }
        }))
        .expect("mount");

    broken.set(true);
    let report = rule.tick();
    assert_eq!(report.rebuilt, vec![root]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(rule.markup(), r#"<retain-error message="boom"></retain-error>"#);

    broken.set(false);
    rule.tick();
    assert_eq!(rule.markup(), "<p>fine</p>");
}

#[test]
fn rejected_patch_is_retried_next_tick() {
    let mut rule = rule();
    let count = rule.runtime().state_object().property("count", 0);
    let read = count.clone();
    let root = rule
        .set_content(WidgetRef::composed("Counter", move |_| Ok(host("b").child(read.get()).into())))
        .expect("mount");

    rule.renderer_mut(|renderer| renderer.fail_next_patch("offline"));
    count.set(1);
    let report = rule.tick();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].is_patch_failure());
    assert!(report.follow_up_scheduled);
    assert!(rule.take_tick_request());
    assert_eq!(rule.runtime().lifecycle(root), Some(Lifecycle::Dirty));
    assert_eq!(rule.markup(), "<b>0</b>");

    let report = rule.tick();
    assert!(report.failures.is_empty());
    assert_eq!(report.rebuilt, vec![root]);
    assert_eq!(rule.markup(), "<b>1</b>");
    assert_eq!(rule.runtime().lifecycle(root), Some(Lifecycle::Mounted));
}

#[test]
fn partially_applied_patch_list_is_replaced_on_retry() {
    fn list(read: Observable<Vec<&'static str>>) -> WidgetRef {
        WidgetRef::composed("List", move |_| Ok(host("div").children(read.get()).into()))
    }

    let mut rule = rule();
    let items = rule.runtime().state_object().property("items", vec!["a", "b"]);
    let root = rule.set_content(list(items.clone())).expect("mount");

    rule.renderer_mut(|renderer| renderer.fail_patch_after(1, "offline"));
    items.set(vec!["a", "b", "c", "d"]);
    let report = rule.tick();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].is_patch_failure());
    assert_eq!(rule.markup(), "<div>abc</div>", "the first insert landed");

    let reports = rule.pump_until_idle();
    assert!(reports.iter().all(|report| report.failures.is_empty()));
    let retry = reports.last().expect("a retry tick ran");
    assert_eq!(retry.patches.len(), 1);
    assert_eq!(retry.patch_count(PatchKind::Replace), 1);
    assert_eq!(rule.runtime().lifecycle(root), Some(Lifecycle::Mounted));

    let mut fresh = RetainTestRule::new();
    let settled = fresh.runtime().state_object().property("items", vec!["a", "b", "c", "d"]);
    fresh.set_content(list(settled)).expect("mount fresh");
    assert_eq!(rule.markup(), fresh.markup());
    assert_eq!(rule.markup(), "<div>abcd</div>");

    items.set(vec!["a", "b", "c", "d", "e"]);
    let report = rule.tick();
    assert_eq!(report.patches.len(), 1);
    assert_eq!(report.patch_count(PatchKind::Insert), 1);
    assert_eq!(rule.markup(), "<div>abcde</div>");
}

#[test]
fn failed_build_keeps_reading_its_previous_state() {
    let mut rule = rule();
    let state = rule.runtime().state_object();
    let broken = state.property("broken", false);
    let count = state.property("count", 0);
    let (broken_read, count_read) = (broken.clone(), count.clone());
    let root = rule
        .set_content(WidgetRef::composed("Gauge", move |cx| {
            cx.add_listener("press", |_| {});
            // Untracked, so the failure happens before anything is read.
            if broken_read.peek() {
                return Err(BuildError::new("offline"));
            }
            Ok(host("b").child(count_read.get()).into())
        }))
        .expect("mount");
    assert_eq!(rule.runtime().element_dependencies(root), vec![count.dependency().clone()]);

    broken.set(true);
    assert!(rule.runtime().rebuild(root).is_err());
    assert_eq!(rule.markup(), "<b>0</b>");
    assert_eq!(rule.runtime().element_dependencies(root), vec![count.dependency().clone()]);
    assert_eq!(rule.runtime().listener_count(root), 1);
    assert_eq!(rule.runtime().lifecycle(root), Some(Lifecycle::Mounted));

    broken.set(false);
    assert_eq!(count.set(5), 1);
    let report = rule.tick();
    assert_eq!(report.rebuilt, vec![root]);
    assert_eq!(rule.markup(), "<b>5</b>");
}

#[test]
fn unmount_releases_everything_the_subtree_held() {
    let mut rule = rule();
    let tracked = rule.runtime().state_object().property("tracked", 1);
    let cleanups = Rc::new(Cell::new(0));
    let (read, counter) = (tracked.clone(), cleanups.clone());
    let root = rule
        .set_content(WidgetRef::composed("Shell", move |_| {
            let (read, counter) = (read.clone(), counter.clone());
            Ok(host("div")
                .child(WidgetRef::composed("Resourceful", move |cx| {
                    let counter = counter.clone();
                    cx.add_listener("press", |_| {});
                    cx.on_cleanup(move || counter.set(counter.get() + 1));
                    Ok(read.get().into())
                }))
                .into())
        }))
        .expect("mount");
    let child = rule.runtime().element(root).expect("root").children[0];
    assert_eq!(rule.runtime().listener_count(child), 1);
    assert_eq!(rule.runtime().element_dependencies(child).len(), 1);

    rule.runtime().unmount(root);
    assert_eq!(cleanups.get(), 1);
    for id in [root, child] {
        assert_eq!(rule.runtime().lifecycle(id), None);
        assert!(!rule.runtime().is_registered(id));
        assert_eq!(rule.runtime().listener_count(id), 0);
        assert!(rule.runtime().element_dependencies(id).is_empty());
    }
    assert_eq!(rule.markup(), "");
    assert_eq!(tracked.set(2), 0);
    assert_eq!(rule.runtime().dispatch(child, "press", true), 0);
    assert_eq!(cleanups.get(), 1);
}

#[test]
fn hidden_child_is_unmounted_and_cleaned_up() {
    let mut rule = rule();
    let visible = rule.runtime().state_object().property("visible", true);
    let cleanups = Rc::new(Cell::new(0));
    let (read, counter) = (visible.clone(), cleanups.clone());
    let root = rule
        .set_content(WidgetRef::composed("Toggle", move |_| {
            let counter = counter.clone();
            let detail = read.get().then(|| {
                WidgetRef::composed("Detail", move |cx| {
                    let counter = counter.clone();
                    cx.on_cleanup(move || counter.set(counter.get() + 1));
                    Ok(host("em").child("detail").into())
                })
            });
            Ok(host("div").child("head").child(detail).into())
        }))
        .expect("mount");
    let detail = rule.runtime().element(root).expect("root").children[0];
    assert_eq!(rule.markup(), "<div>head<em>detail</em></div>");

    visible.set(false);
    let report = rule.tick();
    assert_eq!(report.patch_count(PatchKind::Remove), 1);
    assert_eq!(rule.runtime().lifecycle(detail), None);
    assert_eq!(cleanups.get(), 1);
    assert_eq!(rule.markup(), "<div>head</div>");

    visible.set(true);
    rule.tick();
    let shown = rule.runtime().element(root).expect("root").children[0];
    assert_ne!(shown, detail);
    assert_eq!(rule.markup(), "<div>head<em>detail</em></div>");
}

#[test]
fn abandoned_elements_surface_in_the_leak_sweep() {
    let mut rule = rule();
    rule.set_content(WidgetRef::composed("Live", |_| Ok("live".into())))
        .expect("mount");
    let orphan = rule
        .runtime()
        .create(WidgetRef::composed("Orphan", |_| Ok("never shown".into())));

    rule.advance_time(Duration::from_secs(10));
    assert!(rule.runtime().sweep_leaks().is_empty());

    rule.advance_time(Duration::from_secs(21));
    let leaks = rule.runtime().sweep_leaks();
    assert_eq!(leaks.len(), 1);
    assert_eq!(leaks[0].element, orphan);
    assert_eq!(leaks[0].widget, "Orphan");
    assert_eq!(leaks[0].age, Duration::from_secs(31));

    let diagnostics = rule.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].element(), orphan);

    rule.runtime().mount(orphan).expect("late mount");
    assert!(rule.runtime().sweep_leaks().is_empty());
    assert_eq!(rule.markup(), "livenever shown");
}

#[test]
fn dirty_marks_coalesce_into_one_host_request() {
    let mut rule = rule();
    let state = rule.runtime().state_object();
    let a = state.property("a", 0);
    let b = state.property("b", 0);
    let (a_read, b_read) = (a.clone(), b.clone());
    rule.set_content(WidgetRef::composed("Pair", move |_| {
        Ok(host("div").child(a_read.get()).child(b_read.get()).into())
    }))
    .expect("mount");
    assert!(!rule.take_tick_request());

    a.set(1);
    b.set(2);
    assert_eq!(a.set(3), 0, "already dirty elements are not counted again");
    assert!(rule.take_tick_request());
    assert!(!rule.take_tick_request());

    let reports = rule.pump_until_idle();
    assert_eq!(reports.len(), 1);
    assert_eq!(rule.markup(), "<div>32</div>");
}

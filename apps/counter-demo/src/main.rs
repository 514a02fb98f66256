use std::process::ExitCode;

use retain_core::{
    host, BuildContext, BuildError, BuildResult, MemoryRenderer, Observable, StatefulWidget,
    WidgetRef, WidgetState,
};
use retain_runtime_std::StdRuntime;

#[derive(PartialEq)]
struct CounterButton {
    label: &'static str,
}

struct CounterState {
    presses: i64,
}

impl WidgetState<CounterButton> for CounterState {
    fn build(&mut self, widget: &CounterButton, cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError> {
        let handle = cx.state_handle::<CounterState>();
        cx.add_listener("click", move |_| {
            handle.request_update(|state| state.presses += 1);
        });
        Ok(host("button")
            .attr("presses", self.presses)
            .child(widget.label)
            .into())
    }
}

impl StatefulWidget for CounterButton {
    type State = CounterState;

    fn create_state(&self) -> CounterState {
        CounterState { presses: 0 }
    }
}

fn app(count: Observable<i64>) -> WidgetRef {
    WidgetRef::composed("CounterApp", move |_| {
        Ok(host("main")
            .child(host("h1").child(format!("Count: {}", count.get())))
            .child(WidgetRef::stateful(CounterButton { label: "+1" }))
            .into())
    })
}

fn markup(runtime: &StdRuntime) -> String {
    runtime
        .runtime()
        .with_renderer_as::<MemoryRenderer, _>(|renderer| renderer.markup())
        .unwrap_or_default()
}

fn main() -> ExitCode {
    env_logger::init();

    let runtime = match StdRuntime::new(MemoryRenderer::new()) {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    let count = runtime.runtime().state_object().property("count", 0i64);
    let root = match runtime.runtime().mount_root(app(count.clone())) {
        Ok(root) => root,
        Err(err) => {
            log::error!("initial build failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    println!("{}", markup(&runtime));

    let Some(button) = runtime
        .runtime()
        .element(root)
        .and_then(|info| info.children.first().copied())
    else {
        log::error!("counter button was not mounted");
        return ExitCode::FAILURE;
    };

    for step in 1..=3 {
        count.update(|value| *value += step);
        runtime.runtime().dispatch(button, "click", true);
        for report in runtime.pump() {
            log::info!(
                "tick: {} rebuilt, {} patches",
                report.rebuilt.len(),
                report.patches.len()
            );
            for failure in &report.failures {
                log::warn!("{failure}");
            }
        }
        println!("{}", markup(&runtime));
    }

    print!("{}", runtime.runtime().dump_tree());
    ExitCode::SUCCESS
}

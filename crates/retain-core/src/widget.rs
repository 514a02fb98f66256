//! Widget declarations and what their builds may return.
//!
//! A widget is an immutable description. The runtime dispatches on its
//! [`WidgetKind`]: stateless and composed widgets build from their own
//! configuration, stateful widgets build through a state object that lives
//! as long as the element that created it.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::context::BuildContext;
use crate::error::{BuildError, ConfigError};
use crate::key::Key;
use crate::vnode::{Attributes, Primitive, VNode};

/// Which build protocol a widget follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Stateless,
    Stateful,
    Composed,
}

pub trait StatelessWidget: PartialEq + 'static {
    fn build(&self, cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError>;

    fn key(&self) -> Option<Key> {
        None
    }
}

pub trait StatefulWidget: PartialEq + Sized + 'static {
    type State: WidgetState<Self>;

    fn create_state(&self) -> Self::State;

    fn key(&self) -> Option<Key> {
        None
    }
}

/// State owned by one element of a [`StatefulWidget`].
///
/// Every hook has an empty default. `on_init` runs once before the first
/// build, `on_mounted` after the first build resolved, `on_dispose` right
/// before the element's children are unmounted.
pub trait WidgetState<W>: 'static {
    fn build(&mut self, widget: &W, cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError>;

    fn on_init(&mut self, _widget: &W, _cx: &mut BuildContext<'_>) {}

    fn on_mounted(&mut self, _cx: &mut BuildContext<'_>) {}

    /// A state property read by the last build changed.
    fn on_dependencies_changed(&mut self, _widget: &W) {}

    /// The parent rebuilt with a different configuration of the same type.
    fn on_widget_updated(&mut self, _old: &W, _new: &W) {}

    fn on_dispose(&mut self) {}
}

type ComposedBuild = Rc<dyn Fn(&mut BuildContext<'_>) -> Result<BuildResult, BuildError>>;

pub(crate) trait AnyWidget {
    fn kind(&self) -> WidgetKind;
    fn key(&self) -> Option<Key>;
    fn type_name(&self) -> &'static str;
    fn widget_type(&self) -> TypeId;
    fn same_config(&self, other: &dyn AnyWidget) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn build(&self, cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError>;
    fn create_state(&self) -> Option<Box<dyn ErasedState>>;
}

/// Object-safe view of a stateful widget's state.
pub(crate) trait ErasedState {
    fn build(&mut self, widget: &dyn AnyWidget, cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError>;
    fn init(&mut self, widget: &dyn AnyWidget, cx: &mut BuildContext<'_>);
    fn mounted(&mut self, cx: &mut BuildContext<'_>);
    fn dependencies_changed(&mut self, widget: &dyn AnyWidget);
    fn widget_updated(&mut self, old: &dyn AnyWidget, new: &dyn AnyWidget);
    fn dispose(&mut self);
    fn state_mut(&mut self) -> &mut dyn Any;
}

struct Stateless<W>(W);

impl<W: StatelessWidget> AnyWidget for Stateless<W> {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Stateless
    }

    fn key(&self) -> Option<Key> {
        self.0.key()
    }

    fn type_name(&self) -> &'static str {
        short_type_name::<W>()
    }

    fn widget_type(&self) -> TypeId {
        TypeId::of::<W>()
    }

    fn same_config(&self, other: &dyn AnyWidget) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| other.0 == self.0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn build(&self, cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError> {
        self.0.build(cx)
    }

    fn create_state(&self) -> Option<Box<dyn ErasedState>> {
        None
    }
}

struct Stateful<W>(W);

impl<W: StatefulWidget> AnyWidget for Stateful<W> {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Stateful
    }

    fn key(&self) -> Option<Key> {
        self.0.key()
    }

    fn type_name(&self) -> &'static str {
        short_type_name::<W>()
    }

    fn widget_type(&self) -> TypeId {
        TypeId::of::<W>()
    }

    fn same_config(&self, other: &dyn AnyWidget) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| other.0 == self.0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn build(&self, _cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError> {
        Err(BuildError::new("stateful widget built without its state"))
    }

    fn create_state(&self) -> Option<Box<dyn ErasedState>> {
        Some(Box::new(StateCell::<W> {
            state: self.0.create_state(),
        }))
    }
}

struct StateCell<W: StatefulWidget> {
    state: W::State,
}

fn stateful_config<W: StatefulWidget>(widget: &dyn AnyWidget) -> Option<&W> {
    widget
        .as_any()
        .downcast_ref::<Stateful<W>>()
        .map(|adapter| &adapter.0)
}

impl<W: StatefulWidget> ErasedState for StateCell<W> {
    fn build(&mut self, widget: &dyn AnyWidget, cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError> {
        let widget = stateful_config::<W>(widget)
            .ok_or_else(|| BuildError::new("state is bound to a different widget type"))?;
        self.state.build(widget, cx)
    }

    fn init(&mut self, widget: &dyn AnyWidget, cx: &mut BuildContext<'_>) {
        if let Some(widget) = stateful_config::<W>(widget) {
            self.state.on_init(widget, cx);
        }
    }

    fn mounted(&mut self, cx: &mut BuildContext<'_>) {
        self.state.on_mounted(cx);
    }

    fn dependencies_changed(&mut self, widget: &dyn AnyWidget) {
        if let Some(widget) = stateful_config::<W>(widget) {
            self.state.on_dependencies_changed(widget);
        }
    }

    fn widget_updated(&mut self, old: &dyn AnyWidget, new: &dyn AnyWidget) {
        if let (Some(old), Some(new)) = (stateful_config::<W>(old), stateful_config::<W>(new)) {
            self.state.on_widget_updated(old, new);
        }
    }

    fn dispose(&mut self) {
        self.state.on_dispose();
    }

    fn state_mut(&mut self) -> &mut dyn Any {
        &mut self.state
    }
}

struct Composed {
    name: &'static str,
    key: Option<Key>,
    build: ComposedBuild,
}

impl AnyWidget for Composed {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Composed
    }

    fn key(&self) -> Option<Key> {
        self.key.clone()
    }

    fn type_name(&self) -> &'static str {
        self.name
    }

    fn widget_type(&self) -> TypeId {
        TypeId::of::<Composed>()
    }

    // Closures have no structural equality; the same closure instance is
    // the only proof of an unchanged configuration.
    fn same_config(&self, other: &dyn AnyWidget) -> bool {
        other.as_any().downcast_ref::<Composed>().map_or(false, |other| {
            Rc::ptr_eq(&self.build, &other.build) && self.key == other.key
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn build(&self, cx: &mut BuildContext<'_>) -> Result<BuildResult, BuildError> {
        (self.build)(cx)
    }

    fn create_state(&self) -> Option<Box<dyn ErasedState>> {
        None
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

/// Shared, type-erased widget.
#[derive(Clone)]
pub struct WidgetRef(Rc<dyn AnyWidget>);

impl WidgetRef {
    pub fn stateless<W: StatelessWidget>(widget: W) -> Self {
        Self(Rc::new(Stateless(widget)))
    }

    pub fn stateful<W: StatefulWidget>(widget: W) -> Self {
        Self(Rc::new(Stateful(widget)))
    }

    /// Widget built from a closure. Composed widgets of the same name are
    /// the same type for reuse purposes.
    pub fn composed<F>(name: &'static str, build: F) -> Self
    where
        F: Fn(&mut BuildContext<'_>) -> Result<BuildResult, BuildError> + 'static,
    {
        Self(Rc::new(Composed {
            name,
            key: None,
            build: Rc::new(build),
        }))
    }

    pub fn builder(name: &'static str) -> ComposedBuilder {
        ComposedBuilder {
            name,
            key: None,
            build: None,
        }
    }

    pub fn kind(&self) -> WidgetKind {
        self.0.kind()
    }

    pub fn key(&self) -> Option<Key> {
        self.0.key()
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Whether an element built for `self` can be reused for `other`.
    pub fn same_type(&self, other: &WidgetRef) -> bool {
        self.0.widget_type() == other.0.widget_type()
            && (self.kind() != WidgetKind::Composed || self.type_name() == other.type_name())
    }

    pub fn same_config(&self, other: &WidgetRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0.same_config(other.0.as_ref())
    }

    /// Typed access to the configuration of a stateless or stateful widget.
    pub fn downcast_ref<W: 'static>(&self) -> Option<&W> {
        let any = self.0.as_any();
        any.downcast_ref::<Stateless<W>>()
            .map(|adapter| &adapter.0)
            .or_else(|| any.downcast_ref::<Stateful<W>>().map(|adapter| &adapter.0))
    }

    pub(crate) fn inner(&self) -> &dyn AnyWidget {
        self.0.as_ref()
    }
}

impl fmt::Debug for WidgetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetRef")
            .field("type", &self.type_name())
            .field("kind", &self.kind())
            .field("key", &self.key())
            .finish()
    }
}

/// Builder for closure-based widgets that validates the configuration.
pub struct ComposedBuilder {
    name: &'static str,
    key: Option<Key>,
    build: Option<ComposedBuild>,
}

impl ComposedBuilder {
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn build_with<F>(mut self, build: F) -> Self
    where
        F: Fn(&mut BuildContext<'_>) -> Result<BuildResult, BuildError> + 'static,
    {
        self.build = Some(Rc::new(build));
        self
    }

    pub fn finish(self) -> Result<WidgetRef, ConfigError> {
        let build = self
            .build
            .ok_or(ConfigError::MissingBuild { widget: self.name })?;
        Ok(WidgetRef(Rc::new(Composed {
            name: self.name,
            key: self.key,
            build,
        })))
    }
}

/// Anything a build may return.
#[derive(Clone, Debug)]
pub enum BuildResult {
    Widget(WidgetRef),
    VNode(VNode),
    Host(HostNode),
    Primitive(Primitive),
    Empty,
}

impl From<WidgetRef> for BuildResult {
    fn from(widget: WidgetRef) -> Self {
        BuildResult::Widget(widget)
    }
}

impl From<VNode> for BuildResult {
    fn from(node: VNode) -> Self {
        BuildResult::VNode(node)
    }
}

impl From<HostNode> for BuildResult {
    fn from(node: HostNode) -> Self {
        BuildResult::Host(node)
    }
}

impl From<Primitive> for BuildResult {
    fn from(value: Primitive) -> Self {
        BuildResult::Primitive(value)
    }
}

impl From<&str> for BuildResult {
    fn from(value: &str) -> Self {
        BuildResult::Primitive(value.into())
    }
}

impl From<String> for BuildResult {
    fn from(value: String) -> Self {
        BuildResult::Primitive(value.into())
    }
}

impl From<i64> for BuildResult {
    fn from(value: i64) -> Self {
        BuildResult::Primitive(value.into())
    }
}

impl From<i32> for BuildResult {
    fn from(value: i32) -> Self {
        BuildResult::Primitive(value.into())
    }
}

impl<T: Into<BuildResult>> From<Option<T>> for BuildResult {
    fn from(value: Option<T>) -> Self {
        value.map_or(BuildResult::Empty, Into::into)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum HostKind {
    Element(Rc<str>),
    Fragment,
}

/// Host output whose children may still be widgets.
#[derive(Clone, Debug)]
pub struct HostNode {
    pub(crate) kind: HostKind,
    pub(crate) key: Option<Key>,
    pub(crate) attributes: Attributes,
    pub(crate) children: Vec<BuildResult>,
}

impl HostNode {
    fn with_kind(kind: HostKind) -> Self {
        Self {
            kind,
            key: None,
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<Rc<str>>, value: impl Into<Primitive>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: impl Into<BuildResult>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<BuildResult>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

/// Host element node, e.g. `host("div")`.
pub fn host(tag: impl Into<Rc<str>>) -> HostNode {
    HostNode::with_kind(HostKind::Element(tag.into()))
}

/// Host node that groups its children without an element of its own.
pub fn host_fragment() -> HostNode {
    HostNode::with_kind(HostKind::Fragment)
}

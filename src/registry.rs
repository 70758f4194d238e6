//! The tree of registered test groups and cases.
//!
//! Grading suites describe themselves once, up front: a tree of named
//! [`Group`]s with [`Case`] leaves, each case carrying an opaque body and a
//! point weight. The tree is assembled before the first run and read-only
//! afterwards; the driver walks it, the isolate runner executes its leaves.
//!
//! # Registering tests
//!
//! The closure-scoped builder mirrors the nesting of the suite in the
//! nesting of the source:
//!
//! ```no_run
//! use proctor::expect;
//! use proctor::registry;
//!
//! registry::global().group("Priority queue", |g| {
//!     g.make_public();
//!     g.require_file("PQueue.h");
//!
//!     g.case("new queue is empty", || {
//!         expect!(true);
//!     });
//!
//!     g.group("Stress", |g| {
//!         g.case_worth("ten thousand inserts", 5, || {
//!             // ...
//!         });
//!     });
//! });
//! ```
//!
//! Nodes can also be installed at an explicit path with
//! [`Registry::install`], which is what the builder does under the hood.
//!
//! # The global registry
//!
//! A process hosts one registry, [`global()`], matching the one-binary,
//! one-suite deployment model. All registration happens during startup,
//! before the driver runs; nothing mutates the tree afterwards. Library
//! users (and this crate's tests) can also build private [`Registry`]
//! values and hand them to the driver directly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use crate::fatal::emergency_abort;
use crate::outcome::Points;

/// The opaque action a test case runs inside its isolate.
pub type TestBody = Box<dyn Fn() + Send + Sync>;

/// Errors raised while assembling the test tree.
///
/// Registration happens once at startup, so callers of the convenience
/// builder never see these: there, any of them is a defect in the grading
/// suite itself and aborts the process.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two siblings were registered under the same name.
    #[error("duplicate test name: {0}")]
    DuplicateName(String),

    /// A scope path names a child that was never registered.
    #[error("no test named {0:?} in group {1:?}")]
    NotFound(String, String),

    /// A scope path descends through a test case.
    #[error("{0:?} is a test case, not a group")]
    NotAGroup(String),

    /// A case was given [`Points::DetermineAutomatically`].
    #[error("cannot determine the number of points in a test case automatically")]
    AutoPointsCase,
}

/// Whether a group's failures may be named in the student-visible report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Failed child tests are listed by name.
    Public,
    /// Failures are redacted to a fixed opaque phrase.
    #[default]
    Private,
}

/// A single runnable test: a name, a body, and a point weight.
pub struct Case {
    name: String,
    points: u64,
    body: TestBody,
}

impl Case {
    /// Creates a test case worth a concrete number of points.
    ///
    /// A case must know its weight at construction;
    /// [`Points::DetermineAutomatically`] is an error.
    pub fn new(
        name: impl Into<String>,
        points: Points,
        body: TestBody,
    ) -> Result<Case, RegistryError> {
        let Some(points) = points.fixed() else {
            return Err(RegistryError::AutoPointsCase);
        };
        Ok(Case {
            name: name.into(),
            points,
            body,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points_possible(&self) -> u64 {
        self.points
    }

    /// The body to hand to the isolate runner.
    pub fn body(&self) -> &(dyn Fn() + Send + Sync) {
        &*self.body
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("name", &self.name)
            .field("points", &self.points)
            .finish_non_exhaustive()
    }
}

/// A named collection of tests with shared visibility, an optional point
/// cap, and file-submission prerequisites.
#[derive(Debug)]
pub struct Group {
    name: String,
    children: BTreeMap<String, TestNode>,
    points: Points,
    visibility: Visibility,
    required_files: BTreeSet<String>,
}

impl Group {
    /// Creates a group. With [`Points::DetermineAutomatically`] the group is
    /// worth the sum of its children; a fixed value caps and rescales them.
    pub fn new(name: impl Into<String>, points: Points) -> Group {
        Group {
            name: name.into(),
            children: BTreeMap::new(),
            points,
            visibility: Visibility::default(),
            required_files: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn points_cap(&self) -> Points {
        self.points
    }

    /// Adds a child, rejecting name collisions.
    pub fn add_child(&mut self, node: TestNode) -> Result<(), RegistryError> {
        let name = node.name().to_string();
        if self.children.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.children.insert(name, node);
        Ok(())
    }

    /// Marks this group's failures as student-visible.
    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;
    }

    /// Replaces this group's point cap.
    pub fn set_points_cap(&mut self, points: Points) {
        self.points = points;
    }

    /// Requires the named file to have been submitted for this group to run.
    pub fn add_required_file(&mut self, name: impl Into<String>) {
        self.required_files.insert(name.into());
    }

    /// The files that must be present for this group to run.
    pub fn required_files(&self) -> impl Iterator<Item = &str> {
        self.required_files.iter().map(String::as_str)
    }

    /// This group's children, in name order.
    pub fn children(&self) -> impl Iterator<Item = &TestNode> {
        self.children.values()
    }

    /// Looks up an immediate child by name.
    pub fn child(&self, name: &str) -> Option<&TestNode> {
        self.children.get(name)
    }

    /// Walks a scope path (outermost group first) down from this group.
    pub fn find(&self, path: &[&str]) -> Option<&TestNode> {
        let (first, rest) = path.split_first()?;
        let child = self.child(first)?;
        if rest.is_empty() {
            return Some(child);
        }
        match child {
            TestNode::Group(group) => group.find(rest),
            TestNode::Case(_) => None,
        }
    }

    fn find_group_mut(&mut self, path: &[&str]) -> Result<&mut Group, RegistryError> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(self);
        };
        match self.children.get_mut(*first) {
            Some(TestNode::Group(group)) => group.find_group_mut(rest),
            Some(TestNode::Case(_)) => Err(RegistryError::NotAGroup((*first).to_string())),
            None => Err(RegistryError::NotFound(
                (*first).to_string(),
                self.name.clone(),
            )),
        }
    }

    /// The points this group is worth: its cap if one is set, otherwise the
    /// sum of its children.
    pub fn points_possible(&self) -> u64 {
        match self.points.fixed() {
            Some(cap) => cap,
            None => self.children().map(TestNode::points_possible).sum(),
        }
    }
}

/// One node of the test tree.
#[derive(Debug)]
pub enum TestNode {
    Case(Case),
    Group(Group),
}

impl TestNode {
    pub fn name(&self) -> &str {
        match self {
            TestNode::Case(case) => case.name(),
            TestNode::Group(group) => group.name(),
        }
    }

    pub fn points_possible(&self) -> u64 {
        match self {
            TestNode::Case(case) => case.points_possible(),
            TestNode::Group(group) => group.points_possible(),
        }
    }
}

/// A tree of registered tests rooted at a single group named `root`.
pub struct Registry {
    root: Mutex<Group>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Registry {
        Registry {
            root: Mutex::new(Group::new("root", Points::DetermineAutomatically)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Group> {
        self.root.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a node under the group addressed by `scope_path`, a sequence
    /// of group names starting from the root. An empty path installs a
    /// top-level test.
    pub fn install(&self, scope_path: &[&str], node: TestNode) -> Result<(), RegistryError> {
        self.lock().find_group_mut(scope_path)?.add_child(node)
    }

    /// Runs `f` against the root group.
    ///
    /// The registry stays locked for the duration, which is how the
    /// single-threaded driver holds the tree steady across a whole run.
    pub fn with_root<R>(&self, f: impl FnOnce(&Group) -> R) -> R {
        f(&self.lock())
    }

    /// Registers a top-level group worth the sum of its children.
    pub fn group(&self, name: impl Into<String>, f: impl FnOnce(&mut GroupBuilder)) {
        self.install_group(name, Points::DetermineAutomatically, f);
    }

    /// Registers a top-level group with a fixed point cap.
    pub fn group_worth(
        &self,
        name: impl Into<String>,
        points: u64,
        f: impl FnOnce(&mut GroupBuilder),
    ) {
        self.install_group(name, Points::Fixed(points), f);
    }

    /// Registers a top-level test case worth one point.
    pub fn case(&self, name: impl Into<String>, body: impl Fn() + Send + Sync + 'static) {
        self.case_worth(name, 1, body);
    }

    /// Registers a top-level test case with an explicit weight.
    pub fn case_worth(
        &self,
        name: impl Into<String>,
        points: u64,
        body: impl Fn() + Send + Sync + 'static,
    ) {
        let case = build_case(name, points, body);
        if let Err(error) = self.install(&[], TestNode::Case(case)) {
            emergency_abort(error);
        }
    }

    fn install_group(
        &self,
        name: impl Into<String>,
        points: Points,
        f: impl FnOnce(&mut GroupBuilder),
    ) {
        let mut builder = GroupBuilder {
            group: Group::new(name, points),
        };
        f(&mut builder);
        if let Err(error) = self.install(&[], TestNode::Group(builder.group)) {
            emergency_abort(error);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("root", &*self.lock())
            .finish()
    }
}

/// Scoped handle used to populate a [`Group`] during registration.
///
/// Handed to the closures passed to [`Registry::group`] and
/// [`GroupBuilder::group`]; each nested closure builds one group, so the
/// lexical nesting of the registration code is the nesting of the tree.
pub struct GroupBuilder {
    group: Group,
}

impl GroupBuilder {
    /// Makes this group's failures student-visible.
    pub fn make_public(&mut self) {
        self.group.set_visibility(Visibility::Public);
    }

    /// Requires the named file to have been submitted for this group to run.
    pub fn require_file(&mut self, name: impl Into<String>) {
        self.group.add_required_file(name);
    }

    /// Adds a test case worth one point.
    pub fn case(&mut self, name: impl Into<String>, body: impl Fn() + Send + Sync + 'static) {
        self.case_worth(name, 1, body);
    }

    /// Adds a test case with an explicit weight.
    pub fn case_worth(
        &mut self,
        name: impl Into<String>,
        points: u64,
        body: impl Fn() + Send + Sync + 'static,
    ) {
        let case = build_case(name, points, body);
        if let Err(error) = self.group.add_child(TestNode::Case(case)) {
            emergency_abort(error);
        }
    }

    /// Adds a nested group worth the sum of its children.
    pub fn group(&mut self, name: impl Into<String>, f: impl FnOnce(&mut GroupBuilder)) {
        self.group_with(name, Points::DetermineAutomatically, f);
    }

    /// Adds a nested group with a fixed point cap.
    pub fn group_worth(
        &mut self,
        name: impl Into<String>,
        points: u64,
        f: impl FnOnce(&mut GroupBuilder),
    ) {
        self.group_with(name, Points::Fixed(points), f);
    }

    fn group_with(
        &mut self,
        name: impl Into<String>,
        points: Points,
        f: impl FnOnce(&mut GroupBuilder),
    ) {
        let mut builder = GroupBuilder {
            group: Group::new(name, points),
        };
        f(&mut builder);
        if let Err(error) = self.group.add_child(TestNode::Group(builder.group)) {
            emergency_abort(error);
        }
    }
}

fn build_case(
    name: impl Into<String>,
    points: u64,
    body: impl Fn() + Send + Sync + 'static,
) -> Case {
    match Case::new(name, Points::Fixed(points), Box::new(body)) {
        Ok(case) => case,
        Err(error) => emergency_abort(error),
    }
}

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The process-wide registry the CLI driver runs.
pub fn global() -> &'static Registry {
    &GLOBAL
}

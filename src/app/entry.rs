//! Entry-point markers of a reloadable code unit.
//!
//! A loaded code unit declares up to two capability tags, each backed by a
//! factory: [`EntryTag::Main`] builds the application root, optionally
//! around a page built by [`EntryTag::Root`]. The host's [`CodeLoader`]
//! returns the unit's [`EntryRegistry`]; nothing inspects type metadata.

use std::fmt;
use std::sync::Arc;

use super::{Application, Page};
use crate::error::RelayError;

/// Capability tag declared by a type in a code unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryTag {
    /// Becomes the application root, receiving the root-tagged page if any.
    Main,
    /// The first content page of the application.
    Root,
}

/// Builds the main page, given the root-tagged page when one is declared.
pub type MainFactory =
    Arc<dyn Fn(Option<Arc<dyn Page>>) -> anyhow::Result<Arc<dyn Page>> + Send + Sync>;

/// Builds the root-tagged page.
pub type RootFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Page>> + Send + Sync>;

/// Factories declared by one code unit, keyed by tag.
#[derive(Clone, Default)]
pub struct EntryRegistry {
    main: Option<MainFactory>,
    root: Option<RootFactory>,
}

impl fmt::Debug for EntryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Pages built from an [`EntryRegistry`].
#[derive(Debug)]
pub struct Composition {
    /// Object to install as the new application root.
    pub root: Arc<dyn Page>,
    /// Newly created top-level pages, to register and re-apply.
    pub pages: Vec<Arc<dyn Page>>,
}

impl EntryRegistry {
    /// Creates a registry with no declared entry point.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the [`EntryTag::Main`] factory.
    #[must_use]
    pub fn with_main<F>(mut self, factory: F) -> Self
    where
        F: Fn(Option<Arc<dyn Page>>) -> anyhow::Result<Arc<dyn Page>> + Send + Sync + 'static,
    {
        self.main = Some(Arc::new(factory));
        self
    }

    /// Declares the [`EntryTag::Root`] factory.
    #[must_use]
    pub fn with_root<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn Page>> + Send + Sync + 'static,
    {
        self.root = Some(Arc::new(factory));
        self
    }

    /// Declared tags, main first.
    #[must_use]
    pub fn tags(&self) -> Vec<EntryTag> {
        let mut tags = Vec::with_capacity(2);
        if self.main.is_some() {
            tags.push(EntryTag::Main);
        }
        if self.root.is_some() {
            tags.push(EntryTag::Root);
        }
        tags
    }

    /// Builds the new root from the declared factories.
    ///
    /// - main only: the main page is the root.
    /// - root only: the root page wrapped in the navigation container.
    /// - both: the root page is passed to the main factory.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ReloadConfiguration`] if neither tag is
    /// declared, or [`RelayError::Apply`] if a factory fails.
    pub fn compose(&self, app: &dyn Application) -> Result<Composition, RelayError> {
        match (&self.main, &self.root) {
            (None, None) => Err(RelayError::ReloadConfiguration(
                "no main or root entry point declared".to_string(),
            )),
            (Some(main), None) => {
                let page = main(None).map_err(|e| RelayError::apply(&e))?;
                Ok(Composition {
                    root: Arc::clone(&page),
                    pages: vec![page],
                })
            }
            (None, Some(root)) => {
                let page = root().map_err(|e| RelayError::apply(&e))?;
                let container = app
                    .wrap_in_navigation(Arc::clone(&page))
                    .map_err(|e| RelayError::apply(&e))?;
                Ok(Composition {
                    root: container,
                    pages: vec![page],
                })
            }
            (Some(main), Some(root)) => {
                let inner = root().map_err(|e| RelayError::apply(&e))?;
                let page = main(Some(Arc::clone(&inner))).map_err(|e| RelayError::apply(&e))?;
                Ok(Composition {
                    root: Arc::clone(&page),
                    pages: vec![page, inner],
                })
            }
        }
    }
}

/// A code unit after loading.
#[derive(Debug, Clone)]
pub struct LoadedUnit {
    /// Version string the unit declares.
    pub version: String,
    /// Entry points the unit declares.
    pub entries: EntryRegistry,
}

/// Loads compiled code units. The binary format is the host's business.
pub trait CodeLoader: Send + Sync + fmt::Debug {
    /// Loads the unit `name` from its decompressed image.
    ///
    /// # Errors
    ///
    /// Returns the host's failure to load the image.
    fn load(&self, name: &str, image: &[u8]) -> anyhow::Result<LoadedUnit>;
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::app::testing::{FakeApp, FakePage};

    fn main_factory(
        received: Arc<std::sync::Mutex<Option<String>>>,
    ) -> impl Fn(Option<Arc<dyn Page>>) -> anyhow::Result<Arc<dyn Page>> + Send + Sync + 'static {
        move |inner| {
            if let (Some(inner), Ok(mut slot)) = (inner, received.lock()) {
                *slot = Some(inner.unit_id().to_string());
            }
            Ok(FakePage::shared("Views.Main"))
        }
    }

    #[test]
    fn neither_marker_is_a_configuration_error() {
        let app = FakeApp::new("App");
        let result = EntryRegistry::new().compose(&app);
        assert!(matches!(result, Err(RelayError::ReloadConfiguration(_))));
    }

    #[test]
    fn root_only_is_wrapped_in_navigation() {
        let app = FakeApp::new("App");
        let registry = EntryRegistry::new().with_root(|| Ok(FakePage::shared("Views.Home")));
        let Ok(composition) = registry.compose(&app) else {
            panic!("compose failed");
        };
        assert_eq!(composition.root.unit_id().as_str(), "Navigation");
        let units: Vec<&str> = composition.pages.iter().map(|p| p.unit_id().as_str()).collect();
        assert_eq!(units, vec!["Views.Home"]);
    }

    #[test]
    fn both_markers_pass_root_into_main() {
        let app = FakeApp::new("App");
        let received = Arc::new(std::sync::Mutex::new(None));
        let registry = EntryRegistry::new()
            .with_main(main_factory(Arc::clone(&received)))
            .with_root(|| Ok(FakePage::shared("Views.Home")));
        assert_eq!(registry.tags(), vec![EntryTag::Main, EntryTag::Root]);
        let Ok(composition) = registry.compose(&app) else {
            panic!("compose failed");
        };
        assert_eq!(composition.root.unit_id().as_str(), "Views.Main");
        let received = received.lock().map(|r| r.clone()).unwrap_or_default();
        assert_eq!(received.as_deref(), Some("Views.Home"));
        assert_eq!(composition.pages.len(), 2);
    }

    #[test]
    fn factory_failure_is_an_apply_error() {
        let app = FakeApp::new("App");
        let registry = EntryRegistry::new().with_main(|_| Err(anyhow::anyhow!("ctor threw")));
        let result = registry.compose(&app);
        assert!(matches!(result, Err(RelayError::Apply(msg)) if msg.contains("ctor threw")));
    }
}

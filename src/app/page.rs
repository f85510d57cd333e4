//! Host-side UI abstractions the applier mutates.
//!
//! The crate never renders anything itself. A host implements [`Page`] for
//! each reloadable UI object and [`Application`] for the object owning the
//! current root. All methods are called on the UI thread.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::unit::UnitId;

/// Post-reload hook declared by a page.
pub enum ReloadHook {
    /// Nothing to run after a reload.
    None,
    /// Runs synchronously right after the content is rebuilt.
    Sync(Box<dyn FnOnce() -> anyhow::Result<()> + Send>),
    /// Awaited right after the content is rebuilt.
    Async(BoxFuture<'static, anyhow::Result<()>>),
}

impl fmt::Debug for ReloadHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::None => "None",
            Self::Sync(_) => "Sync",
            Self::Async(_) => "Async",
        };
        f.write_str(kind)
    }
}

impl ReloadHook {
    /// Runs the hook, awaiting it if it is asynchronous.
    ///
    /// # Errors
    ///
    /// Propagates the hook's own failure.
    pub async fn run(self) -> anyhow::Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Sync(hook) => hook(),
            Self::Async(hook) => hook.await,
        }
    }
}

/// A live, reloadable UI page.
pub trait Page: Send + Sync + fmt::Debug {
    /// Unit whose payload describes this page.
    fn unit_id(&self) -> &UnitId;

    /// Returns `true` while the page is part of the active containment tree.
    fn is_attached(&self) -> bool;

    /// Drops transient decorations (toolbar items, local resources) the page
    /// accumulated since it was built.
    fn clear_decorations(&self);

    /// Clears the declarative content and rebuilds it from `markup`.
    ///
    /// # Errors
    ///
    /// Returns the host's failure to parse or instantiate the markup.
    fn load_content(&self, markup: &str) -> anyhow::Result<()>;

    /// Hook to run after every successful [`Page::load_content`].
    fn reload_hook(&self) -> ReloadHook {
        ReloadHook::None
    }
}

/// The application object: owner of the root page and of the composition
/// unit (application-wide markup).
pub trait Application: Send + Sync + fmt::Debug {
    /// Composition unit of the application itself.
    fn unit_id(&self) -> &UnitId;

    /// Reloads the application-wide markup in place.
    ///
    /// # Errors
    ///
    /// Returns the host's failure to parse the markup.
    fn load_content(&self, markup: &str) -> anyhow::Result<()>;

    /// Current root page, if any.
    fn root(&self) -> Option<Arc<dyn Page>>;

    /// Replaces the current root page.
    fn set_root(&self, root: Arc<dyn Page>);

    /// Wraps `page` in the standard navigation container.
    ///
    /// # Errors
    ///
    /// Returns the host's failure to build the container.
    fn wrap_in_navigation(&self, page: Arc<dyn Page>) -> anyhow::Result<Arc<dyn Page>>;
}

/// Applies `markup` to `page`: clear decorations, rebuild, run the hook.
pub(crate) async fn reload_page(page: &dyn Page, markup: &str) -> anyhow::Result<()> {
    page.clear_decorations();
    page.load_content(markup)?;
    page.reload_hook().run().await
}

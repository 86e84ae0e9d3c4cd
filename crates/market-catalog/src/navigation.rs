//! Site Navigation
//!
//! A maintainer's site is a set of pages. Navigation exposes only published
//! (non-draft) pages, in the order they were created.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use market_core::{MarketError, Page, PageId, RequestContext, Result, Store, UserId, retry_read};

/// Where the navigation is rendered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavContext {
    /// The maintainer's own site
    #[default]
    Site,

    /// An embed on a third-party page; links point back through the embed route
    Embed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavItem {
    pub title: String,
    pub href: String,
}

/// Pages and the navigation derived from them
#[derive(Clone)]
pub struct SiteNavigation {
    store: Arc<dyn Store>,
}

impl SiteNavigation {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a page for the acting user's site
    pub async fn create_page(
        &self,
        ctx: &RequestContext,
        title: &str,
        slug: &str,
        draft: bool,
    ) -> Result<Page> {
        let owner = ctx.require_actor()?;
        let mut page = Page::new(owner, title, slug)?;
        page.draft = draft;
        self.store.insert_page(&page).await?;
        tracing::info!(page_id = %page.id, slug = %page.slug, draft, "Created page");
        Ok(page)
    }

    /// Publish (`draft = false`) or unpublish a page
    pub async fn set_page_draft(
        &self,
        ctx: &RequestContext,
        page_id: PageId,
        draft: bool,
    ) -> Result<Page> {
        let mut page = self
            .store
            .get_page(page_id)
            .await?
            .ok_or_else(|| MarketError::not_found("page", page_id))?;
        ctx.require_owner(page.owner, "page")?;
        page.draft = draft;
        self.store.update_page(&page).await?;
        Ok(page)
    }

    /// Navigation entries for `owner`'s published pages
    pub async fn site_navigation(
        &self,
        owner: UserId,
        context: NavContext,
    ) -> Result<Vec<NavItem>> {
        let pages = retry_read("pages_by_owner", || self.store.pages_by_owner(owner)).await?;
        Ok(pages
            .into_iter()
            .filter(|p| !p.draft)
            .map(|p| NavItem {
                href: match context {
                    NavContext::Site => format!("/{}", p.slug),
                    NavContext::Embed => format!("/embed/{owner}/{}", p.slug),
                },
                title: p.title,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::MemoryStore;

    #[tokio::test]
    async fn test_only_published_pages_are_listed() {
        let nav = SiteNavigation::new(Arc::new(MemoryStore::new()));
        let owner = UserId::new();
        let ctx = RequestContext::for_user(owner);

        nav.create_page(&ctx, "Sponsor", "sponsor", false).await.unwrap();
        let roadmap = nav.create_page(&ctx, "Roadmap", "roadmap", true).await.unwrap();

        let items = nav.site_navigation(owner, NavContext::Site).await.unwrap();
        assert_eq!(
            items,
            vec![NavItem {
                title: "Sponsor".into(),
                href: "/sponsor".into()
            }]
        );

        nav.set_page_draft(&ctx, roadmap.id, false).await.unwrap();
        let items = nav.site_navigation(owner, NavContext::Embed).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].href, format!("/embed/{owner}/roadmap"));
    }

    #[tokio::test]
    async fn test_cannot_publish_someone_elses_page() {
        let nav = SiteNavigation::new(Arc::new(MemoryStore::new()));
        let ctx = RequestContext::for_user(UserId::new());
        let page = nav.create_page(&ctx, "About", "about", true).await.unwrap();

        let other = RequestContext::for_user(UserId::new());
        let err = nav.set_page_draft(&other, page.id, false).await.unwrap_err();
        assert!(matches!(err, MarketError::Authorization(_)));
    }

    #[test]
    fn test_nav_context_wire_format() {
        let ctx: NavContext = serde_json::from_str("\"embed\"").unwrap();
        assert_eq!(ctx, NavContext::Embed);
    }
}

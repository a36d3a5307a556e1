//! Authenticated shell around every dashboard page: session gate, header
//! and the secondary navigation of the current route.

use crate::app::client::{ClientError, SessionApi};
use crate::app::route::{active_tab, PageCategory, Route, TabId};
use crate::routes::auth::Session;

pub const SITE_TITLE: &str = "Platforms on Vercel by Ade inspired by NextJs";
pub const SITE_DESCRIPTION: &str = "Create a fullstack application with multi-tenancy and custom domains support using Next.js, Prisma, and PostgreSQL";
pub const SITE_LOGO: &str = "/favicon.ico";
pub const THEME_COLOR: &str = "#7b46f6";
pub const TWITTER_SITE: &str = "@Vercel";
pub const TWITTER_CREATOR: &str = "@addegbenga";

/// Session as seen by the shell.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Loading,
    Unauthenticated,
    Authenticated(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

impl From<Option<Session>> for SessionState {
    fn from(session: Option<Session>) -> Self {
        match session {
            Some(session) => SessionState::Authenticated(session),
            None => SessionState::Unauthenticated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavLink {
    pub label: &'static str,
    pub href: String,
    pub tab: TabId,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackLink {
    Link { label: &'static str, href: String },
    /// Shown when the parent site of a post is not known.
    Static { label: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavBar {
    pub category: PageCategory,
    pub back: Option<BackLink>,
    pub links: Vec<NavLink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub home_href: &'static str,
    pub logo: &'static str,
    pub avatar: Option<Avatar>,
    pub user_name: Option<String>,
}

/// Document head metadata shared by every dashboard page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
    pub logo: String,
    pub theme_color: &'static str,
    /// Share image for OpenGraph and Twitter cards.
    pub image: String,
    pub twitter_site: &'static str,
    pub twitter_creator: &'static str,
}

impl Default for PageMeta {
    fn default() -> Self {
        Self {
            title: SITE_TITLE.to_string(),
            description: SITE_DESCRIPTION.to_string(),
            logo: SITE_LOGO.to_string(),
            theme_color: THEME_COLOR,
            image: SITE_LOGO.to_string(),
            twitter_site: TWITTER_SITE,
            twitter_creator: TWITTER_CREATOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellView {
    /// Session unresolved or absent; nothing else is rendered.
    Loading,
    Ready { header: Header, nav: NavBar },
}

fn link(label: &'static str, route: Route, active: TabId) -> NavLink {
    let tab = active_tab(&route);
    NavLink {
        label,
        href: route.href(),
        tab,
        active: tab == active,
    }
}

/// Secondary navigation for `route`. `site_hint` names the parent site of
/// a post page, which its URL does not carry.
pub fn nav_bar(route: &Route, site_hint: Option<&str>) -> NavBar {
    let active = active_tab(route);

    match route {
        Route::Site { id, .. } => {
            let site = |tab| Route::Site { id: id.clone(), tab };
            NavBar {
                category: PageCategory::Site,
                back: Some(BackLink::Link {
                    label: "All Sites",
                    href: Route::Dashboard.href(),
                }),
                links: vec![
                    link("Posts", site(TabId::Default), active),
                    link("Drafts", site(TabId::Drafts), active),
                    link("Settings", site(TabId::Settings), active),
                ],
            }
        }
        Route::Post { id, .. } => {
            let post = |tab| Route::Post { id: id.clone(), tab };
            let back = match site_hint.filter(|hint| !hint.is_empty()) {
                Some(site_id) => BackLink::Link {
                    label: "All Posts",
                    href: Route::Site {
                        id: site_id.to_string(),
                        tab: TabId::Default,
                    }
                    .href(),
                },
                None => BackLink::Static { label: "All Posts" },
            };
            NavBar {
                category: PageCategory::Post,
                back: Some(back),
                links: vec![
                    link("Editor", post(TabId::Default), active),
                    link("Settings", post(TabId::Settings), active),
                ],
            }
        }
        Route::Dashboard | Route::AccountSettings | Route::Other(_) => NavBar {
            category: PageCategory::Root,
            back: None,
            links: vec![
                link("My Sites", Route::Dashboard, active),
                link("Settings", Route::AccountSettings, active),
            ],
        },
    }
}

pub fn header(session: &Session) -> Header {
    let user = &session.user;
    Header {
        home_href: "/",
        logo: SITE_LOGO,
        avatar: user.image.as_ref().map(|src| Avatar {
            src: src.clone(),
            alt: user.name.clone().unwrap_or_else(|| "User avatar".to_string()),
        }),
        user_name: user.name.clone(),
    }
}

/// Shell state of one page instance.
#[derive(Debug, Clone)]
pub struct Shell {
    route: Route,
    site_hint: Option<String>,
    session: SessionState,
    meta: PageMeta,
}

impl Shell {
    pub fn new(path: &str, site_hint: Option<String>) -> Self {
        Self {
            route: Route::parse(path),
            site_hint,
            session: SessionState::Loading,
            meta: PageMeta::default(),
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn meta(&self) -> &PageMeta {
        &self.meta
    }

    /// Re-derive the route after a navigation.
    pub fn navigate(&mut self, path: &str) {
        self.route = Route::parse(path);
    }

    pub fn set_site_hint(&mut self, site_hint: Option<String>) {
        self.site_hint = site_hint;
    }

    pub fn set_session(&mut self, session: SessionState) {
        self.session = session;
    }

    /// Ask the session collaborator who is signed in. A failed lookup counts
    /// as signed out.
    pub async fn resolve_session(&mut self, api: &dyn SessionApi) {
        self.session = match api.session().await {
            Ok(session) => SessionState::from(session),
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed");
                SessionState::Unauthenticated
            }
        };
    }

    pub fn view(&self) -> ShellView {
        match &self.session {
            SessionState::Authenticated(session) => ShellView::Ready {
                header: header(session),
                nav: nav_bar(&self.route, self.site_hint.as_deref()),
            },
            SessionState::Loading | SessionState::Unauthenticated => ShellView::Loading,
        }
    }

    /// Logout trigger. Session refresh and redirect are the caller's job.
    pub async fn logout(&self, api: &dyn SessionApi) -> Result<(), ClientError> {
        api.sign_out().await.inspect_err(|e| {
            tracing::error!(error = %e, "sign out failed");
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::routes::auth::SessionUser;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn ada(image: Option<&str>) -> Session {
        Session {
            user: SessionUser {
                id: "u1".to_string(),
                name: Some("Ada".to_string()),
                email: "ada@example.com".to_string(),
                image: image.map(str::to_string),
            },
        }
    }

    struct FakeSessionApi {
        session: Result<Option<Session>, StatusCode>,
        sign_outs: AtomicUsize,
    }

    impl FakeSessionApi {
        fn new(session: Result<Option<Session>, StatusCode>) -> Self {
            Self {
                session,
                sign_outs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionApi for FakeSessionApi {
        async fn session(&self) -> Result<Option<Session>, ClientError> {
            self.session.clone().map_err(ClientError::Status)
        }

        async fn sign_out(&self) -> Result<(), ClientError> {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn active_labels(bar: &NavBar) -> Vec<&'static str> {
        bar.links.iter().filter(|l| l.active).map(|l| l.label).collect()
    }

    #[test]
    fn test_root_nav() {
        let bar = nav_bar(&Route::parse("/"), None);
        assert_eq!(bar.category, PageCategory::Root);
        assert_eq!(bar.back, None);
        assert_eq!(active_labels(&bar), vec!["My Sites"]);

        let bar = nav_bar(&Route::parse("/settings"), None);
        assert_eq!(active_labels(&bar), vec!["Settings"]);
        assert_eq!(bar.links[1].href, "/settings");

        let bar = nav_bar(&Route::parse("/billing"), None);
        assert!(active_labels(&bar).is_empty());
    }

    #[test]
    fn test_site_nav() {
        let bar = nav_bar(&Route::parse("/site/7/drafts"), None);
        assert_eq!(bar.category, PageCategory::Site);
        assert_eq!(
            bar.back,
            Some(BackLink::Link {
                label: "All Sites",
                href: "/".to_string()
            })
        );
        let hrefs: Vec<&str> = bar.links.iter().map(|l| l.href.as_str()).collect();
        assert_eq!(hrefs, vec!["/site/7", "/site/7/drafts", "/site/7/settings"]);
        assert_eq!(active_labels(&bar), vec!["Drafts"]);

        let bar = nav_bar(&Route::parse("/site/7/analytics"), None);
        assert!(active_labels(&bar).is_empty());
    }

    #[test]
    fn test_post_nav_uses_site_hint() {
        let bar = nav_bar(&Route::parse("/post/42/settings"), Some("7"));
        assert_eq!(bar.category, PageCategory::Post);
        assert_eq!(
            bar.back,
            Some(BackLink::Link {
                label: "All Posts",
                href: "/site/7".to_string()
            })
        );
        assert_eq!(active_labels(&bar), vec!["Settings"]);
        assert_eq!(bar.links[0].href, "/post/42");
    }

    #[test]
    fn test_post_nav_without_site_is_static() {
        let bar = nav_bar(&Route::parse("/post/42"), None);
        assert_eq!(bar.back, Some(BackLink::Static { label: "All Posts" }));
        assert_eq!(active_labels(&bar), vec!["Editor"]);
    }

    #[test]
    fn test_header_avatar_alt_text() {
        let with_name = header(&ada(Some("https://cdn.example.com/ada.png")));
        assert_eq!(with_name.avatar.unwrap().alt, "Ada");

        let mut anonymous = ada(Some("https://cdn.example.com/ada.png"));
        anonymous.user.name = None;
        let h = header(&anonymous);
        assert_eq!(h.avatar.unwrap().alt, "User avatar");
        assert_eq!(h.user_name, None);

        assert_eq!(header(&ada(None)).avatar, None);
    }

    #[tokio::test]
    async fn test_shell_gates_on_session() {
        let mut shell = Shell::new("/site/7", None);
        assert_eq!(shell.view(), ShellView::Loading);

        shell.resolve_session(&FakeSessionApi::new(Ok(None))).await;
        assert_eq!(shell.session(), &SessionState::Unauthenticated);
        assert_eq!(shell.view(), ShellView::Loading);

        shell.resolve_session(&FakeSessionApi::new(Err(StatusCode::BAD_GATEWAY))).await;
        assert_eq!(shell.view(), ShellView::Loading);

        shell.resolve_session(&FakeSessionApi::new(Ok(Some(ada(None))))).await;
        let ShellView::Ready { nav, .. } = shell.view() else {
            panic!("shell should render once authenticated");
        };
        assert_eq!(nav.category, PageCategory::Site);
    }

    #[test]
    fn test_navigate_reparses_route() {
        let mut shell = Shell::new("/", None);
        shell.set_session(SessionState::Authenticated(ada(None)));
        shell.navigate("/post/42");
        shell.set_site_hint(Some("7".to_string()));
        assert_eq!(shell.route().category(), PageCategory::Post);
        let ShellView::Ready { nav, .. } = shell.view() else {
            panic!("ready expected");
        };
        assert_eq!(
            nav.back,
            Some(BackLink::Link {
                label: "All Posts",
                href: "/site/7".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_logout_calls_sign_out() {
        let api = FakeSessionApi::new(Ok(None));
        let shell = Shell::new("/", None);
        shell.logout(&api).await.unwrap();
        assert_eq!(api.sign_outs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_page_meta_defaults() {
        let meta = PageMeta::default();
        assert_eq!(meta.theme_color, "#7b46f6");
        assert_eq!(meta.logo, "/favicon.ico");
        assert_eq!(meta.title, SITE_TITLE);
        assert_eq!(meta.image, meta.logo);
        assert_eq!(meta.twitter_site, "@Vercel");
    }
}

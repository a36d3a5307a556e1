//! Route table for the authenticated dashboard.
//!
//! A path is parsed once per navigation into a [`Route`]; the page category
//! and active tab are pure functions of that value.

/// Which tab of the secondary navigation a route selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabId {
    /// The landing tab of a bar: sites list, site posts, post editor.
    Default,
    Drafts,
    Settings,
    /// A sub-page no tab of the bar links to.
    Unknown,
}

/// Which secondary navigation bar a route shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCategory {
    Root,
    Site,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/`
    Dashboard,
    /// `/settings`
    AccountSettings,
    /// `/site/{id}[/{tab}]`
    Site { id: String, tab: TabId },
    /// `/post/{id}[/{tab}]`
    Post { id: String, tab: TabId },
    /// Any other path, kept as given.
    Other(String),
}

const SITE_TABS: &[(&str, TabId)] = &[
    ("drafts", TabId::Drafts),
    ("settings", TabId::Settings),
];

const POST_TABS: &[(&str, TabId)] = &[("settings", TabId::Settings)];

fn lookup_tab(table: &[(&str, TabId)], segment: Option<&str>) -> TabId {
    match segment {
        None => TabId::Default,
        Some(segment) => table
            .iter()
            .find(|(name, _)| *name == segment)
            .map(|(_, tab)| *tab)
            .unwrap_or(TabId::Unknown),
    }
}

fn tab_segment(table: &[(&'static str, TabId)], tab: TabId) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, candidate)| *candidate == tab)
        .map(|(name, _)| *name)
}

impl Route {
    /// Parse a browser path. Query string and fragment are ignored, as are
    /// empty segments (`//` or a trailing `/`).
    pub fn parse(path: &str) -> Self {
        let path_only = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path_only.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Route::Dashboard,
            ["settings"] => Route::AccountSettings,
            ["site", id, rest @ ..] => Route::Site {
                id: (*id).to_string(),
                tab: lookup_tab(SITE_TABS, rest.first().copied()),
            },
            ["post", id, rest @ ..] => Route::Post {
                id: (*id).to_string(),
                tab: lookup_tab(POST_TABS, rest.first().copied()),
            },
            _ => Route::Other(path_only.to_string()),
        }
    }

    pub fn category(&self) -> PageCategory {
        match self {
            Route::Site { .. } => PageCategory::Site,
            Route::Post { .. } => PageCategory::Post,
            Route::Dashboard | Route::AccountSettings | Route::Other(_) => PageCategory::Root,
        }
    }

    /// Canonical path of this route. Unknown tabs collapse to the default
    /// page of their site or post.
    pub fn href(&self) -> String {
        match self {
            Route::Dashboard => "/".to_string(),
            Route::AccountSettings => "/settings".to_string(),
            Route::Site { id, tab } => match tab_segment(SITE_TABS, *tab) {
                Some(segment) => format!("/site/{}/{}", id, segment),
                None => format!("/site/{}", id),
            },
            Route::Post { id, tab } => match tab_segment(POST_TABS, *tab) {
                Some(segment) => format!("/post/{}/{}", id, segment),
                None => format!("/post/{}", id),
            },
            Route::Other(path) => path.clone(),
        }
    }
}

/// The tab a route marks as active.
pub fn active_tab(route: &Route) -> TabId {
    match route {
        Route::Dashboard => TabId::Default,
        Route::AccountSettings => TabId::Settings,
        Route::Site { tab, .. } | Route::Post { tab, .. } => *tab,
        Route::Other(_) => TabId::Unknown,
    }
}

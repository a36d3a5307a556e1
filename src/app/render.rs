//! HTML for dashboard pages. Markup lives in the askama templates under
//! `templates/`; every interpolated value is escaped by the template engine.

use askama::Template;

use crate::app::settings::{SettingsForm, SettingsScreen, Thumbnail};
use crate::app::shell::{BackLink, Header, NavLink, PageMeta, ShellView};

#[derive(Template)]
#[template(path = "page.html")]
struct PageTemplate<'a> {
    meta: &'a PageMeta,
    body: &'a str,
}

#[derive(Template)]
#[template(path = "loading.html")]
struct LoadingTemplate;

/// Back link of a nav bar; `href` is absent for the static variant.
struct ParentLink<'a> {
    label: &'a str,
    href: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "shell.html")]
struct ShellTemplate<'a> {
    header: &'a Header,
    back: Option<ParentLink<'a>>,
    links: &'a [NavLink],
    body: &'a str,
}

#[derive(Template)]
#[template(path = "post_settings.html")]
struct PostSettingsTemplate<'a> {
    form: &'a SettingsForm,
    image: Option<&'a str>,
    blur: Option<&'a str>,
}

/// A complete document: metadata head around `body`.
pub fn render_page(meta: &PageMeta, body: &str) -> askama::Result<String> {
    PageTemplate { meta, body }.render()
}

/// Wrap `body` in the shell. Until the session is authenticated only the
/// loading indicator is emitted.
pub fn render_shell(view: &ShellView, body: &str) -> askama::Result<String> {
    match view {
        ShellView::Loading => LoadingTemplate.render(),
        ShellView::Ready { header, nav } => {
            let back = nav.back.as_ref().map(|back| match back {
                BackLink::Link { label, href } => ParentLink {
                    label: *label,
                    href: Some(href.as_str()),
                },
                BackLink::Static { label } => ParentLink {
                    label: *label,
                    href: None,
                },
            });
            ShellTemplate {
                header,
                back,
                links: &nav.links,
                body,
            }
            .render()
        }
    }
}

pub fn render_settings(screen: &SettingsScreen) -> askama::Result<String> {
    let form = match screen {
        SettingsScreen::Loading => return LoadingTemplate.render(),
        SettingsScreen::Form(form) => form,
    };
    let (image, blur) = match &form.thumbnail {
        Thumbnail::Empty => (None, None),
        Thumbnail::Image { src, blur_data_url } => (Some(src.as_str()), blur_data_url.as_deref()),
    };
    PostSettingsTemplate { form, image, blur }.render()
}

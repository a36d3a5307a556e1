//! Dashboard page logic: the authenticated shell and the post settings view,
//! independent of any UI framework. Pages talk to this server through the
//! traits in [`client`].

pub mod client;
pub mod render;
pub mod route;
pub mod settings;
pub mod shell;

pub use client::{ClientConfig, ClientError, HttpClient, Navigator, Notifier, PostApi, SessionApi};
pub use route::{active_tab, PageCategory, Route, TabId};
pub use settings::{DeleteTicket, FailurePolicy, LoadTicket, PostSettingsView, SaveTicket, SettingsScreen};
pub use shell::{SessionState, Shell, ShellView};

/// Full HTML document of the post settings page inside the shell.
pub fn render_post_settings_page(
    shell: &Shell,
    view: &PostSettingsView,
    root_domain: &str,
) -> askama::Result<String> {
    let settings = render::render_settings(&view.screen(root_domain))?;
    let body = render::render_shell(&shell.view(), &settings)?;
    render::render_page(shell.meta(), &body)
}

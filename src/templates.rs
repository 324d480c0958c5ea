use askama::Template;
use askama_web::WebTemplate;

/// Shown in place of the table until one was fetched successfully.
#[derive(Template, WebTemplate)]
#[template(path = "table_unavailable.html")]
pub(crate) struct TableUnavailableTemplate {
    pub(crate) app_name: &'static str,
    pub(crate) error: Option<String>,
}

use std::collections::HashMap;

use axum::response::Html;
use serde::Serialize;
use tera::{Context, Tera, Value};

use crate::errors::AppResult;

/// Page templates compiled into the binary, keyed by the name handlers render them with.
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("includes/paginator.html", include_str!("../templates/includes/paginator.html")),
    ("includes/post_card.html", include_str!("../templates/includes/post_card.html")),
    ("includes/field_errors.html", include_str!("../templates/includes/field_errors.html")),
    ("blog/index.html", include_str!("../templates/blog/index.html")),
    ("blog/detail.html", include_str!("../templates/blog/detail.html")),
    ("blog/category.html", include_str!("../templates/blog/category.html")),
    ("blog/profile.html", include_str!("../templates/blog/profile.html")),
    ("blog/create.html", include_str!("../templates/blog/create.html")),
    ("blog/comment.html", include_str!("../templates/blog/comment.html")),
    ("blog/user.html", include_str!("../templates/blog/user.html")),
    (
        "registration/registration_form.html",
        include_str!("../templates/registration/registration_form.html"),
    ),
    ("registration/login.html", include_str!("../templates/registration/login.html")),
    ("admin/categories.html", include_str!("../templates/admin/categories.html")),
    ("admin/locations.html", include_str!("../templates/admin/locations.html")),
];

/// Templates
///
/// The Tera environment shared by all handlers.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> tera::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        tera.autoescape_on(vec![".html"]);
        tera.register_filter("linebreaksbr", linebreaksbr_filter);
        Ok(Self { tera })
    }

    /// Renders `name` with `context` serialized into the template scope.
    pub fn render<C: Serialize>(&self, name: &str, context: &C) -> AppResult<Html<String>> {
        let context = Context::from_serialize(context)?;
        Ok(Html(self.tera.render(name, &context)?))
    }
}

/// HTML-escapes the text and turns newlines into `<br>`. Output is meant for `| safe`.
fn linebreaksbr_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("linebreaksbr expects a string"))?;
    let escaped = tera::escape_html(text).replace("\r\n", "\n").replace('\n', "<br>");
    Ok(Value::String(escaped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_templates_compile() {
        Templates::new().expect("templates should parse");
    }

    #[test]
    fn linebreaksbr_escapes_before_breaking() {
        let out = linebreaksbr_filter(&Value::String("<b>hi</b>\nthere".into()), &HashMap::new())
            .unwrap();
        assert_eq!(out, Value::String("&lt;b&gt;hi&lt;&#x2F;b&gt;<br>there".into()));
    }
}

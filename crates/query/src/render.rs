//! Rendering pipeline.
//!
//! Precedence: explicit templates (`_tpl`/`_tplOuter`) always beat the named
//! view fallback. Template names resolve against the host's reusable chunks
//! first; a string the host does not recognize is treated as an inline
//! formatting template.

use crate::error::QueryResult;
use crate::host::Host;
use crate::normalize::Record;
use crate::pagination::PaginationState;
use crate::properties::ControlParams;

/// Render the result set per the control parameters.
pub async fn render(
    rows: &[Record],
    ctrl: &ControlParams,
    pagination: &PaginationState,
    host: &Host,
) -> QueryResult<String> {
    let mut out = String::new();

    if ctrl.tpl.is_none() && ctrl.tpl_outer.is_none() {
        return host.views.render_view(&ctrl.view, rows, pagination).await;
    }

    if let Some(tpl) = &ctrl.tpl {
        let named = host.chunks.exists(tpl).await;
        for row in rows {
            let rendered = if named {
                host.chunks.render_named(tpl, row).await?
            } else {
                host.chunks.render_inline(tpl, row).await?
            };
            out.push_str(&rendered);
        }
    }

    if let Some(tpl_outer) = &ctrl.tpl_outer {
        let mut vars = Record::new();
        vars.insert("content".to_string(), serde_json::Value::String(out));
        out = if host.chunks.exists(tpl_outer).await {
            host.chunks.render_named(tpl_outer, &vars).await?
        } else {
            host.chunks.render_inline(tpl_outer, &vars).await?
        };
    }

    Ok(out)
}

/// Minimal HTML escaping for placeholder publication.
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(
            html_escape(r#"<a href="x">&'y'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;y&#39;&lt;/a&gt;"
        );
        assert_eq!(html_escape("plain"), "plain");
    }
}

//! Pagination calculation and link-style bundles.
//!
//! The calculator only produces numbers; the styled link structure itself is
//! built by the host's link-builder capability from a named style bundle of
//! seven template fragments.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::host::{LinkBuilder, RequestInput};

/// Computed pagination facts for one invocation. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginationState {
    pub record_count: u64,
    pub limit: u64,
    pub offset: u64,
    /// Number of pages; 1 when pagination is skipped.
    pub page_count: u64,
    /// Styled link structure, empty when pagination is skipped.
    pub links: String,
}

impl PaginationState {
    /// Whether links should be produced at all: a limit is configured and
    /// more records matched than fit on one page.
    pub fn is_paginated(&self) -> bool {
        self.limit > 0 && self.record_count > self.limit
    }
}

/// Compute pagination for a result set. Without a limit everything is one
/// page; with one, `page_count = ceil(record_count / limit)` once the count
/// exceeds the limit.
pub fn paginate(record_count: u64, limit: u64, offset: u64) -> PaginationState {
    let page_count = if limit > 0 && record_count > limit {
        record_count.div_ceil(limit)
    } else {
        1
    };
    PaginationState {
        record_count,
        limit,
        offset,
        page_count,
        links: String::new(),
    }
}

/// Compute pagination and, when warranted, build the styled links through
/// the host capability.
pub fn paginate_with_links(
    record_count: u64,
    limit: u64,
    offset: u64,
    style: &PaginationStyle,
    links: &dyn LinkBuilder,
    request: &dyn RequestInput,
) -> PaginationState {
    let mut state = paginate(record_count, limit, offset);
    if state.is_paginated() {
        state.links = links.links(&request.base_url(), record_count, offset, limit, style);
    }
    state
}

/// A named bundle of pagination template fragments.
///
/// Assembled by the link builder in the usual order:
///
/// ```text
/// << First < Prev 1 2 3 Next > Last >>
/// \______/ \____/ ^ ^ ^ \____/ \_____/
///  first    prev  | | |  next    last
///            page_tpl + current_page_tpl
/// ```
///
/// wrapped by `outer_tpl`, which carries the content slot plus current-page,
/// page-count, and record-range placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationStyle {
    pub first_tpl: String,
    pub prev_tpl: String,
    pub page_tpl: String,
    pub current_page_tpl: String,
    pub next_tpl: String,
    pub last_tpl: String,
    pub outer_tpl: String,
}

impl Default for PaginationStyle {
    fn default() -> Self {
        Self {
            first_tpl: r#"<a href="[[+url]]&offset=0">&laquo; First</a> &nbsp;"#.to_string(),
            prev_tpl: r#"<a href="[[+url]]&offset=[[+offset]]">&lsaquo; Prev.</a>&nbsp;"#
                .to_string(),
            page_tpl: r#"&nbsp;<a href="[[+url]]&offset=[[+offset]]">[[+page_number]]</a>&nbsp;"#
                .to_string(),
            current_page_tpl: "&nbsp;<span>[[+page_number]]</span>&nbsp;".to_string(),
            next_tpl: r#"&nbsp;<a href="[[+url]]&offset=[[+offset]]">Next &rsaquo;</a>"#
                .to_string(),
            last_tpl: r#"&nbsp;<a href="[[+url]]&offset=[[+offset]]">Last &raquo;</a>"#
                .to_string(),
            outer_tpl: r#"<div id="pagination">[[+content]]<br/>
	Page [[+current_page]] of [[+page_count]]<br/>
	Displaying records [[+first_record]] thru [[+last_record]] of [[+record_count]]
</div>"#
                .to_string(),
        }
    }
}

/// Named pagination styles, loadable at runtime. Ships with `"default"`.
pub struct StyleRegistry {
    styles: DashMap<String, PaginationStyle>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        let styles = DashMap::new();
        styles.insert("default".to_string(), PaginationStyle::default());
        Self { styles }
    }

    /// Register or replace a named style.
    pub fn register(&self, name: impl Into<String>, style: PaginationStyle) {
        self.styles.insert(name.into(), style);
    }

    /// Look up a style; unknown names fall back to the default with a
    /// warning.
    pub fn get(&self, name: &str) -> PaginationStyle {
        if let Some(style) = self.styles.get(name) {
            return style.clone();
        }
        tracing::warn!(style = %name, "unknown pagination style, using default");
        PaginationStyle::default()
    }
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reduce a `_config`/`_style` value to a bare bundle name: path components
/// and a trailing `.config.php` are stripped, mirroring the original
/// file-based bundles.
pub fn sanitize_style_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    base.strip_suffix(".config.php").unwrap_or(base).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn page_count_is_ceiling_of_count_over_limit() {
        let state = paginate(25, 10, 0);
        assert_eq!(state.page_count, 3);
        assert!(state.is_paginated());

        let state = paginate(30, 10, 0);
        assert_eq!(state.page_count, 3);
    }

    #[test]
    fn pagination_skipped_when_count_fits_one_page() {
        let state = paginate(10, 10, 0);
        assert_eq!(state.page_count, 1);
        assert!(!state.is_paginated());
    }

    #[test]
    fn pagination_skipped_without_limit() {
        let state = paginate(1000, 0, 0);
        assert_eq!(state.page_count, 1);
        assert!(!state.is_paginated());
    }

    #[test]
    fn style_registry_falls_back_to_default() {
        let registry = StyleRegistry::new();
        assert_eq!(registry.get("default"), PaginationStyle::default());
        assert_eq!(registry.get("missing"), PaginationStyle::default());

        let custom = PaginationStyle {
            outer_tpl: "[[+content]]".to_string(),
            ..PaginationStyle::default()
        };
        registry.register("mini", custom.clone());
        assert_eq!(registry.get("mini"), custom);
    }

    #[test]
    fn style_names_are_sanitized() {
        assert_eq!(sanitize_style_name("default"), "default");
        assert_eq!(sanitize_style_name("default.config.php"), "default");
        assert_eq!(sanitize_style_name("../etc/fancy.config.php"), "fancy");
    }
}

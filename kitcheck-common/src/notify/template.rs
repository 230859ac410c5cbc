//! Notification template rendering
//!
//! Templates are HTML with bracketed placeholders. Only the names listed in
//! [`Placeholder`] (and their legacy French spellings) are substituted; any
//! other bracketed text is left as is.
//! Substitution is a single left-to-right pass, so placeholder syntax inside a
//! substituted value (an operator comment, say) is never expanded. Every
//! value is HTML-escaped.

/// Allow-listed placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Submitter,
    Date,
    Status,
    RecordId,
    Comment,
    MissingItems,
    FailingItems,
}

impl Placeholder {
    pub const ALL: [Placeholder; 7] = [
        Placeholder::Submitter,
        Placeholder::Date,
        Placeholder::Status,
        Placeholder::RecordId,
        Placeholder::Comment,
        Placeholder::MissingItems,
        Placeholder::FailingItems,
    ];

    /// Name between the brackets
    pub fn token(&self) -> &'static str {
        match self {
            Placeholder::Submitter => "SUBMITTER",
            Placeholder::Date => "DATE",
            Placeholder::Status => "STATUS",
            Placeholder::RecordId => "RECORD_ID",
            Placeholder::Comment => "COMMENT",
            Placeholder::MissingItems => "MISSING_ITEMS",
            Placeholder::FailingItems => "FAILING_ITEMS",
        }
    }

    /// Name used by templates written for the earlier French mailer
    pub fn legacy_token(&self) -> &'static str {
        match self {
            Placeholder::Submitter => "USER",
            Placeholder::Date => "DATE_FR",
            Placeholder::Status => "STATUS",
            Placeholder::RecordId => "CHECKLIST_ID",
            Placeholder::Comment => "COMMENTAIRE",
            Placeholder::MissingItems => "ITEMS_MANQUANTS",
            Placeholder::FailingItems => "ITEMS_DEFAILLANTS",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.token() == token || p.legacy_token() == token)
    }
}

/// Values substituted into a template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    pub submitter: String,
    pub date: String,
    pub status: String,
    pub record_id: String,
    pub comment: String,
    pub missing: Vec<String>,
    pub failing: Vec<String>,
}

impl TemplateValues {
    fn render(&self, placeholder: Placeholder) -> String {
        match placeholder {
            Placeholder::Submitter => escape_html(&self.submitter),
            Placeholder::Date => escape_html(&self.date),
            Placeholder::Status => escape_html(&self.status),
            Placeholder::RecordId => escape_html(&self.record_id),
            Placeholder::Comment => {
                if self.comment.trim().is_empty() {
                    "Aucun".to_string()
                } else {
                    escape_html(&self.comment).replace('\n', "<br>\n")
                }
            }
            Placeholder::MissingItems => render_list(&self.missing),
            Placeholder::FailingItems => render_list(&self.failing),
        }
    }
}

/// Substitute every allow-listed placeholder in one pass
pub fn render(template: &str, values: &TemplateValues) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let placeholder = after
            .find(']')
            .and_then(|close| Placeholder::from_token(&after[..close]).map(|p| (p, close)));

        match placeholder {
            Some((placeholder, close)) => {
                out.push_str(&values.render(placeholder));
                rest = &after[close + 1..];
            }
            None => {
                out.push('[');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// `<ul><li>..</li></ul>`, or "Aucun" for an empty list
pub fn render_list(items: &[String]) -> String {
    if items.is_empty() {
        return "Aucun".to_string();
    }
    let mut html = String::from("<ul>");
    for item in items {
        html.push_str("<li>");
        html.push_str(&escape_html(item));
        html.push_str("</li>");
    }
    html.push_str("</ul>");
    html
}

/// Escape text for inclusion in HTML content or attribute values
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
